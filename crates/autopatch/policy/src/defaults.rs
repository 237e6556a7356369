//! Built-in policy set

use autopatch_types::{PolicyAction, PolicyCondition, UpdateDecision, UpdatePolicy};
use serde_json::json;

/// The default rules, highest priority first.
pub fn default_policies() -> Vec<UpdatePolicy> {
    vec![
        UpdatePolicy::new(
            "critical-fast-track",
            100,
            PolicyAction::new(UpdateDecision::Approve)
                .with_reason("Critical update passed simulation - fast-track approval"),
        )
        .with_description("Approve critical updates immediately once simulation succeeds")
        .with_condition("priority", PolicyCondition::Equals(json!("critical")))
        .with_condition("simulation_status", PolicyCondition::Equals(json!("success"))),
        UpdatePolicy::new(
            "breaking-changes-review",
            90,
            PolicyAction::new(UpdateDecision::ManualReview)
                .with_reason("Update contains breaking changes - manual review required"),
        )
        .with_description("Send updates with breaking changes to an operator")
        .with_condition("breaking_changes", PolicyCondition::Equals(json!(true))),
        UpdatePolicy::new(
            "failed-simulation-reject",
            80,
            PolicyAction::new(UpdateDecision::Reject)
                .with_reason("Simulation failed - update rejected"),
        )
        .with_description("Reject updates whose simulation failed")
        .with_condition("simulation_status", PolicyCondition::Equals(json!("failed"))),
        UpdatePolicy::new(
            "performance-degradation-reject",
            70,
            PolicyAction::new(UpdateDecision::Reject)
                .with_reason("Performance degradation detected - update rejected"),
        )
        .with_description("Reject updates that regress performance metrics")
        .with_condition("performance_degradation", PolicyCondition::Equals(json!(true))),
        UpdatePolicy::new(
            "off-hours-defer",
            60,
            PolicyAction::new(UpdateDecision::Defer)
                .with_reason("Outside business hours and maintenance window - deferred"),
        )
        .with_description("Hold non-critical updates outside deployment hours")
        .with_condition(
            "priority",
            PolicyCondition::OneOf(vec![json!("high"), json!("medium"), json!("low")]),
        )
        .with_condition("in_business_hours", PolicyCondition::Equals(json!(false)))
        .with_condition("in_maintenance_window", PolicyCondition::Equals(json!(false))),
        UpdatePolicy::new(
            "high-success-auto-approve",
            50,
            PolicyAction::new(UpdateDecision::Approve)
                .with_reason("Simulation success rate at or above 95% - auto-approved"),
        )
        .with_description("Approve non-breaking updates with a high simulation pass rate")
        .with_condition("simulation_success_rate", PolicyCondition::AtLeast(0.95))
        .with_condition("breaking_changes", PolicyCondition::Equals(json!(false))),
    ]
}
