//! Update policies, decisions and evaluations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Decision produced by evaluating an update against the policy set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateDecision {
    Approve,
    Reject,
    Defer,
    ManualReview,
}

impl UpdateDecision {
    /// Whether this decision ends policy evaluation when a policy fires.
    pub fn is_terminating(&self) -> bool {
        !matches!(self, Self::Defer)
    }
}

impl fmt::Display for UpdateDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Approve => "APPROVE",
            Self::Reject => "REJECT",
            Self::Defer => "DEFER",
            Self::ManualReview => "MANUAL_REVIEW",
        };
        f.write_str(s)
    }
}

/// Qualitative risk of applying an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Band a numeric risk score: ≥7 critical, ≥5 high, ≥3 medium.
    pub fn from_score(score: u32) -> Self {
        match score {
            s if s >= 7 => Self::Critical,
            s if s >= 5 => Self::High,
            s if s >= 3 => Self::Medium,
            _ => Self::Low,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

// ── Conditions ─────────────────────────────────────────────────────────

/// Expectation on a single key of the evaluation context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyCondition {
    /// Exact equality (numbers compare by value)
    Equals(Value),
    /// Membership in a list
    OneOf(Vec<Value>),
    /// Numeric value greater than or equal to a threshold
    AtLeast(f64),
}

impl PolicyCondition {
    /// Whether the context value satisfies this condition. A missing key
    /// never matches.
    pub fn matches(&self, actual: Option<&Value>) -> bool {
        let Some(actual) = actual else {
            return false;
        };
        match self {
            Self::Equals(expected) => values_equal(expected, actual),
            Self::OneOf(options) => options.iter().any(|o| values_equal(o, actual)),
            Self::AtLeast(threshold) => actual.as_f64().is_some_and(|v| v >= *threshold),
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// What happens when a policy fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyAction {
    pub decision: UpdateDecision,
    #[serde(default)]
    pub reason: Option<String>,
    /// Notification targets (channels, addresses)
    #[serde(default)]
    pub notify: Vec<String>,
}

impl PolicyAction {
    pub fn new(decision: UpdateDecision) -> Self {
        Self {
            decision,
            reason: None,
            notify: Vec::new(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Named, prioritized rule mapping a condition set to a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatePolicy {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Higher priorities are evaluated first
    pub priority: i32,
    #[serde(default)]
    pub conditions: BTreeMap<String, PolicyCondition>,
    pub action: PolicyAction,
}

fn default_enabled() -> bool {
    true
}

impl UpdatePolicy {
    pub fn new(name: impl Into<String>, priority: i32, action: PolicyAction) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            enabled: true,
            priority,
            conditions: BTreeMap::new(),
            action,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_condition(mut self, key: impl Into<String>, condition: PolicyCondition) -> Self {
        self.conditions.insert(key.into(), condition);
        self
    }

    /// A policy fires when every condition matches the context.
    pub fn fires(&self, context: &serde_json::Map<String, Value>) -> bool {
        self.conditions
            .iter()
            .all(|(key, condition)| condition.matches(context.get(key)))
    }
}

// ── Evaluation ─────────────────────────────────────────────────────────

/// Kind of deployment window attached to an approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowKind {
    Immediate,
    BusinessHours,
    Maintenance,
}

/// Time range in which an approved update should be deployed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentWindow {
    pub kind: WindowKind,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DeploymentWindow {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }
}

/// Result of evaluating one update against the policy set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyEvaluation {
    pub component: String,
    pub version: String,
    pub decision: UpdateDecision,
    pub risk_level: RiskLevel,
    pub risk_score: u32,
    pub matched_policies: Vec<String>,
    pub reasons: Vec<String>,
    pub deployment_window: Option<DeploymentWindow>,
    pub evaluated_at: DateTime<Utc>,
}

impl PolicyEvaluation {
    pub fn is_approved(&self) -> bool {
        self.decision == UpdateDecision::Approve
    }
}
