use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{Activity, Discount, FlowSwitches, Money, Sku};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialRequest {
    pub user_id: String,
    pub goods_id: String,
    pub source: String,
    pub channel: String,
    /// Restricts the quote to this activity, if given.
    pub activity_id: Option<i64>,
    /// Caller-supplied correlation id, echoed back in the result.
    pub trace_id: Option<String>,
}

impl TrialRequest {
    pub fn new<S: Into<String>>(user_id: S, goods_id: S, source: S, channel: S) -> Self {
        Self {
            user_id: user_id.into(),
            goods_id: goods_id.into(),
            source: source.into(),
            channel: channel.into(),
            activity_id: None,
            trace_id: None,
        }
    }

    pub fn with_activity_id(mut self, activity_id: i64) -> Self {
        self.activity_id = Some(activity_id);
        self
    }

    pub fn with_trace_id<S: Into<String>>(mut self, trace_id: S) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrialStage {
    ParameterValidation,
    FlowControl,
    DiscountCalculation,
    CrowdTagValidation,
    ResultAssembly,
    ErrorHandling,
}

impl Display for TrialStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ParameterValidation => "parameter_validation",
            Self::FlowControl => "flow_control",
            Self::DiscountCalculation => "discount_calculation",
            Self::CrowdTagValidation => "crowd_tag_validation",
            Self::ResultAssembly => "result_assembly",
            Self::ErrorHandling => "error_handling",
        };
        f.write_str(name)
    }
}

/// Stable failure codes of the price trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrialErrorCode {
    InvalidParameter,
    ActivityNotFound,
    SkuNotFound,
    DiscountNotFound,
    /// The store failed unexpectedly.
    SystemBusy,
}

impl TrialErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidParameter => "A0400",
            Self::ActivityNotFound => "A0404-ACTIVITY",
            Self::SkuNotFound => "A0404-SKU",
            Self::DiscountNotFound => "A0404-DISCOUNT",
            Self::SystemBusy => "B0001",
        }
    }
}

impl Display for TrialErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialQuote {
    pub goods_id: String,
    pub goods_name: String,
    pub original_price: Money,
    pub deduction_price: Money,
    pub pay_price: Money,
    pub activity_id: Option<i64>,
    pub activity_name: Option<String>,
    pub target_count: Option<i64>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub visible: bool,
    pub participable: bool,
    /// The quote bypassed group-buy pricing (downgrade switch, or outside the traffic split).
    pub fallback: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialOutcome {
    Quote(TrialQuote),
    Failure { code: TrialErrorCode, message: String },
}

/// The verdict of a price trial. It carries no clock or random data, so identical inputs give identical results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialResult {
    pub trace_id: Option<String>,
    /// The stages that ran, in order
    pub trace: Vec<TrialStage>,
    pub outcome: TrialOutcome,
}

impl TrialResult {
    pub fn quote(&self) -> Option<&TrialQuote> {
        match &self.outcome {
            TrialOutcome::Quote(q) => Some(q),
            TrialOutcome::Failure { .. } => None,
        }
    }

    pub fn error_code(&self) -> Option<TrialErrorCode> {
        match &self.outcome {
            TrialOutcome::Quote(_) => None,
            TrialOutcome::Failure { code, .. } => Some(*code),
        }
    }

    pub fn is_participable(&self) -> bool {
        self.quote().is_some_and(|q| q.participable)
    }
}

/// Everything the stages have learned so far about a single trial request. The runner loads data from the store
/// between stages; the stages themselves never do I/O.
#[derive(Debug, Clone)]
pub struct TrialContext {
    pub request: TrialRequest,
    pub trace: Vec<TrialStage>,
    pub switches: FlowSwitches,
    pub sku: Option<Sku>,
    pub activity: Option<Activity>,
    pub discount: Option<Discount>,
    /// Membership of the discount's tag, for `TAG` discounts
    pub in_discount_tag: Option<bool>,
    /// Membership of the activity's audience tag
    pub in_activity_tag: Option<bool>,
    pub pay_price: Option<Money>,
    pub deduction_price: Option<Money>,
    pub visible: bool,
    pub participable: bool,
}

impl TrialContext {
    pub fn new(request: TrialRequest) -> Self {
        Self {
            request,
            trace: Vec::new(),
            switches: FlowSwitches::default(),
            sku: None,
            activity: None,
            discount: None,
            in_discount_tag: None,
            in_activity_tag: None,
            pay_price: None,
            deduction_price: None,
            visible: false,
            participable: false,
        }
    }

    pub fn enter(&mut self, stage: TrialStage) {
        self.trace.push(stage);
    }
}

/// What a stage decided: carry on with the next stage, or stop here with a final result.
#[derive(Debug, Clone)]
pub enum StageOutcome {
    Continue(TrialContext),
    ShortCircuit(TrialResult),
}
