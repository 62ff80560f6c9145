//! Discount calculators, one per market plan. A malformed expression never fails a quote; the customer is charged the
//! original price and the problem is logged.
use std::str::FromStr;

use log::warn;
use rust_decimal::Decimal;

use crate::db_types::{MarketPlan, Money};

/// The price to pay for goods priced at `original` under `plan`. The result never exceeds `original`, and never drops
/// below [`Money::MIN_PAYABLE`] unless the original price was lower to begin with.
pub fn calculate_pay_price(plan: MarketPlan, expr: &str, original: Money) -> Money {
    let result = match plan {
        MarketPlan::DirectReduction => direct_reduction(expr, original),
        MarketPlan::FullReduction => full_reduction(expr, original),
        MarketPlan::Percentage => percentage(expr, original),
        MarketPlan::FixedPrice => fixed_price(expr, original),
    };
    result.unwrap_or_else(|| {
        warn!("🧮️ Could not apply {plan} discount '{expr}' to {original}. Charging the original price.");
        original
    })
}

fn parse_amount(s: &str) -> Option<Money> {
    Money::from_str(s).ok().filter(|m| m.value() >= 0)
}

fn reduce(original: Money, reduction: Money) -> Money {
    if original <= Money::MIN_PAYABLE {
        return original;
    }
    (original - reduction).max(Money::MIN_PAYABLE)
}

fn direct_reduction(expr: &str, original: Money) -> Option<Money> {
    parse_amount(expr).map(|reduction| reduce(original, reduction))
}

fn full_reduction(expr: &str, original: Money) -> Option<Money> {
    let (threshold, reduction) = expr.split_once(',')?;
    let threshold = parse_amount(threshold)?;
    let reduction = parse_amount(reduction)?;
    if original < threshold {
        return Some(original);
    }
    Some(reduce(original, reduction))
}

fn percentage(expr: &str, original: Money) -> Option<Money> {
    let rate = Decimal::from_str(expr.trim()).ok()?;
    if rate <= Decimal::ZERO || rate > Decimal::ONE {
        return None;
    }
    if original <= Money::MIN_PAYABLE {
        return Some(original);
    }
    let discounted = Money::from_decimal_floor(original.to_decimal() * rate).ok()?;
    Some(discounted.max(Money::MIN_PAYABLE))
}

fn fixed_price(expr: &str, original: Money) -> Option<Money> {
    parse_amount(expr).filter(|price| price.is_positive() && *price <= original)
}

#[cfg(test)]
mod test {
    use super::*;

    fn yuan(s: &str) -> Money {
        s.parse().unwrap()
    }

    #[test]
    fn direct_reduction_floors_at_one_fen() {
        assert_eq!(calculate_pay_price(MarketPlan::DirectReduction, "20", yuan("100")), yuan("80"));
        assert_eq!(calculate_pay_price(MarketPlan::DirectReduction, "120", yuan("100")), yuan("0.01"));
        assert_eq!(calculate_pay_price(MarketPlan::DirectReduction, "-10", yuan("100")), yuan("100"));
        assert_eq!(calculate_pay_price(MarketPlan::DirectReduction, "abc", yuan("100")), yuan("100"));
    }

    #[test]
    fn oversized_expressions_charge_the_original_price() {
        let huge = "79228162514264337593543950335";
        assert_eq!(calculate_pay_price(MarketPlan::DirectReduction, huge, yuan("100")), yuan("100"));
        assert_eq!(calculate_pay_price(MarketPlan::FixedPrice, huge, yuan("100")), yuan("100"));
        let threshold = format!("{huge},20");
        assert_eq!(calculate_pay_price(MarketPlan::FullReduction, &threshold, yuan("100")), yuan("100"));
    }

    #[test]
    fn full_reduction_needs_threshold() {
        assert_eq!(calculate_pay_price(MarketPlan::FullReduction, "100,20", yuan("150")), yuan("130"));
        assert_eq!(calculate_pay_price(MarketPlan::FullReduction, "100,20", yuan("100")), yuan("80"));
        assert_eq!(calculate_pay_price(MarketPlan::FullReduction, "100,20", yuan("99.99")), yuan("99.99"));
        assert_eq!(calculate_pay_price(MarketPlan::FullReduction, "100", yuan("150")), yuan("150"));
        assert_eq!(calculate_pay_price(MarketPlan::FullReduction, "", yuan("150")), yuan("150"));
    }

    #[test]
    fn percentage_rounds_down_to_the_fen() {
        assert_eq!(calculate_pay_price(MarketPlan::Percentage, "0.8", yuan("100")), yuan("80"));
        assert_eq!(calculate_pay_price(MarketPlan::Percentage, "0.33", yuan("100.01")), yuan("33.00"));
        assert_eq!(calculate_pay_price(MarketPlan::Percentage, "0.5", yuan("0.03")), yuan("0.01"));
        assert_eq!(calculate_pay_price(MarketPlan::Percentage, "0.01", yuan("1")), yuan("0.01"));
        assert_eq!(calculate_pay_price(MarketPlan::Percentage, "10.5.5", yuan("100")), yuan("100"));
        assert_eq!(calculate_pay_price(MarketPlan::Percentage, "1.5", yuan("100")), yuan("100"));
        assert_eq!(calculate_pay_price(MarketPlan::Percentage, "0", yuan("100")), yuan("100"));
    }

    #[test]
    fn fixed_price_never_raises_the_price() {
        assert_eq!(calculate_pay_price(MarketPlan::FixedPrice, "9.90", yuan("100")), yuan("9.90"));
        assert_eq!(calculate_pay_price(MarketPlan::FixedPrice, "120", yuan("100")), yuan("100"));
        assert_eq!(calculate_pay_price(MarketPlan::FixedPrice, "0", yuan("100")), yuan("100"));
        assert_eq!(calculate_pay_price(MarketPlan::FixedPrice, "free", yuan("100")), yuan("100"));
    }
}
