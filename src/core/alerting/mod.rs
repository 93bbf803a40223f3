//! Leader-gated threshold alerting

pub mod conditions;
pub mod evaluator;
pub mod notifier;
pub mod payload;
pub mod service;

pub use conditions::{ScalingCondition, SessionsCondition};
pub use evaluator::{AlertCondition, AlertEvaluator, AlertOptions, AlertState, EvaluationOutcome};
pub use notifier::Notifier;
pub use payload::{AlertMessage, AlertPayload};
pub use service::AlertingService;
