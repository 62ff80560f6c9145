//! # Price trial
//!
//! A fixed pipeline of decision stages that turns a trial request into a price quote and an eligibility verdict:
//!
//! 1. parameter validation
//! 2. flow control (downgrade switch and traffic split)
//! 3. discount calculation
//! 4. audience (crowd tag) validation
//! 5. result assembly
//!
//! Any stage may short-circuit. Failures end in the error handling stage, which yields a stable error code rather
//! than an error value. The stages are pure; [`crate::TrialApi`] loads what each stage needs from the store.
mod calculators;
pub mod stages;
mod trial_objects;

pub use calculators::calculate_pay_price;
pub use trial_objects::{
    StageOutcome,
    TrialContext,
    TrialErrorCode,
    TrialOutcome,
    TrialQuote,
    TrialRequest,
    TrialResult,
    TrialStage,
};
