//! One module per trigger kind. Each evaluator inspects stored or live state
//! and returns the users a trigger should fire for, capped to avoid floods.

pub mod churn_risk;
pub mod competitor_outflow;
pub mod cross_promotion;
pub mod first_visit;
pub mod post_session;
pub mod segment_upgrade;
pub mod vip_no_tip;

pub use first_visit::FirstVisitEvaluator;
pub use segment_upgrade::{SegmentTransition, SegmentUpgradeEvaluator};

use livespot_common::models::TriggerContext;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationResult {
    pub should_fire: bool,
    pub targets: Vec<TriggerContext>,
    /// Why nothing fired, when that is not just "no matches".
    pub reason: Option<String>,
}

impl EvaluationResult {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self { reason: Some(reason.into()), ..Self::default() }
    }

    /// Fires when `targets` is non-empty, truncated to `cap`.
    pub fn capped(mut targets: Vec<TriggerContext>, cap: usize) -> Self {
        targets.truncate(cap);
        Self {
            should_fire: !targets.is_empty(),
            targets,
            reason: None,
        }
    }
}
