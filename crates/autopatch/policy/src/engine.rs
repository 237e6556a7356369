//! Policy engine - ordered rule evaluation

use crate::context::build_context;
use crate::defaults::default_policies;
use crate::error::{PolicyError, Result};
use crate::risk::risk_score;
use crate::window::deployment_window;
use autopatch_types::{
    PolicyAction, PolicyCondition, PolicyEvaluation, SimulationResult, SimulationStatus,
    UpdateDecision, UpdatePolicy, VersionComparison,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

/// Partial update of an existing policy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyUpdate {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub conditions: Option<BTreeMap<String, PolicyCondition>>,
    #[serde(default, alias = "actions")]
    pub action: Option<PolicyAction>,
}

/// Evaluation counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyStatistics {
    pub policies: usize,
    pub enabled_policies: usize,
    pub evaluations: u64,
    pub approved: u64,
    pub rejected: u64,
    pub deferred: u64,
    pub manual_review: u64,
}

#[derive(Debug, Clone)]
struct PolicyEntry {
    seq: u64,
    policy: UpdatePolicy,
}

#[derive(Debug, Default)]
struct PolicySet {
    entries: Vec<PolicyEntry>,
    next_seq: u64,
}

impl PolicySet {
    /// Descending priority, insertion order on ties
    fn sort(&mut self) {
        self.entries
            .sort_by_key(|e| (Reverse(e.policy.priority), e.seq));
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.policy.name == name)
    }
}

/// Applies prioritized business rules to validated updates
#[derive(Debug)]
pub struct UpdatePolicyEngine {
    policies: RwLock<PolicySet>,
    stats: RwLock<PolicyStatistics>,
}

impl Default for UpdatePolicyEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl UpdatePolicyEngine {
    /// Engine loaded with [`default_policies`]
    pub fn new() -> Self {
        Self::with_policies(default_policies())
    }

    /// Engine with exactly `policies`; later duplicates of a name are dropped
    pub fn with_policies(policies: Vec<UpdatePolicy>) -> Self {
        let mut set = PolicySet::default();
        for policy in policies {
            if set.position(&policy.name).is_some() {
                continue;
            }
            set.entries.push(PolicyEntry {
                seq: set.next_seq,
                policy,
            });
            set.next_seq += 1;
        }
        set.sort();
        Self {
            policies: RwLock::new(set),
            stats: RwLock::new(PolicyStatistics::default()),
        }
    }

    // ── Policy Management ──────────────────────────────────────────────

    pub async fn add_policy(&self, policy: UpdatePolicy) -> Result<()> {
        if policy.name.trim().is_empty() {
            return Err(PolicyError::Invalid("policy name must not be empty".into()));
        }
        let mut set = self.policies.write().await;
        if set.position(&policy.name).is_some() {
            return Err(PolicyError::AlreadyExists(policy.name));
        }
        info!(policy = %policy.name, priority = policy.priority, "Policy added");
        let seq = set.next_seq;
        set.next_seq += 1;
        set.entries.push(PolicyEntry { seq, policy });
        set.sort();
        Ok(())
    }

    pub async fn remove_policy(&self, name: &str) -> Result<UpdatePolicy> {
        let mut set = self.policies.write().await;
        let index = set
            .position(name)
            .ok_or_else(|| PolicyError::NotFound(name.to_string()))?;
        info!(policy = %name, "Policy removed");
        Ok(set.entries.remove(index).policy)
    }

    pub async fn update_policy(&self, name: &str, update: PolicyUpdate) -> Result<UpdatePolicy> {
        let mut set = self.policies.write().await;
        let index = set
            .position(name)
            .ok_or_else(|| PolicyError::NotFound(name.to_string()))?;

        let policy = &mut set.entries[index].policy;
        if let Some(enabled) = update.enabled {
            policy.enabled = enabled;
        }
        if let Some(priority) = update.priority {
            policy.priority = priority;
        }
        if let Some(description) = update.description {
            policy.description = description;
        }
        if let Some(conditions) = update.conditions {
            policy.conditions = conditions;
        }
        if let Some(action) = update.action {
            policy.action = action;
        }
        let updated = policy.clone();
        set.sort();
        info!(policy = %name, enabled = updated.enabled, priority = updated.priority, "Policy updated");
        Ok(updated)
    }

    /// Policies in evaluation order
    pub async fn list_policies(&self) -> Vec<UpdatePolicy> {
        self.policies
            .read()
            .await
            .entries
            .iter()
            .map(|e| e.policy.clone())
            .collect()
    }

    pub async fn get_policy(&self, name: &str) -> Option<UpdatePolicy> {
        let set = self.policies.read().await;
        set.position(name).map(|i| set.entries[i].policy.clone())
    }

    // ── Evaluation ─────────────────────────────────────────────────────

    pub async fn evaluate_update(
        &self,
        comparison: &VersionComparison,
        simulation: &SimulationResult,
    ) -> PolicyEvaluation {
        self.evaluate_update_at(Utc::now(), comparison, simulation)
            .await
    }

    /// Evaluate as if the current time were `now`
    #[instrument(skip(self, comparison, simulation), fields(component = %comparison.component, version = %comparison.available_version))]
    pub async fn evaluate_update_at(
        &self,
        now: DateTime<Utc>,
        comparison: &VersionComparison,
        simulation: &SimulationResult,
    ) -> PolicyEvaluation {
        let context = build_context(comparison, simulation, now);
        let (score, risk_level) = risk_score(comparison, simulation);

        let mut matched = Vec::new();
        let mut reasons = Vec::new();
        let mut terminal = None;
        let mut deferred = false;
        {
            let set = self.policies.read().await;
            for entry in set.entries.iter().filter(|e| e.policy.enabled) {
                let policy = &entry.policy;
                if !policy.fires(&context) {
                    continue;
                }
                debug!(policy = %policy.name, decision = %policy.action.decision, "Policy fired");
                matched.push(policy.name.clone());
                reasons.push(
                    policy
                        .action
                        .reason
                        .clone()
                        .unwrap_or_else(|| format!("policy {} matched", policy.name)),
                );
                if !policy.action.notify.is_empty() {
                    info!(policy = %policy.name, notify = ?policy.action.notify, "Policy notification requested");
                }
                if policy.action.decision.is_terminating() {
                    terminal = Some(policy.action.decision);
                    break;
                }
                deferred = true;
            }
        }

        let mut decision = match terminal {
            Some(decision) => decision,
            None if deferred => UpdateDecision::Defer,
            None => {
                reasons.push("No policy reached a decision - manual review required".to_string());
                UpdateDecision::ManualReview
            }
        };

        if decision == UpdateDecision::Approve && simulation.status == SimulationStatus::Failed {
            reasons.push("Approval overridden: simulation failed".to_string());
            decision = UpdateDecision::Reject;
        }

        let deployment_window = (decision == UpdateDecision::Approve)
            .then(|| deployment_window(comparison.priority, now));

        self.record(decision).await;
        info!(
            decision = %decision,
            risk = %risk_level,
            matched = matched.len(),
            "Update evaluated"
        );

        PolicyEvaluation {
            component: comparison.component.clone(),
            version: comparison.available_version.clone(),
            decision,
            risk_level,
            risk_score: score,
            matched_policies: matched,
            reasons,
            deployment_window,
            evaluated_at: now,
        }
    }

    async fn record(&self, decision: UpdateDecision) {
        let mut stats = self.stats.write().await;
        stats.evaluations += 1;
        match decision {
            UpdateDecision::Approve => stats.approved += 1,
            UpdateDecision::Reject => stats.rejected += 1,
            UpdateDecision::Defer => stats.deferred += 1,
            UpdateDecision::ManualReview => stats.manual_review += 1,
        }
    }

    pub async fn statistics(&self) -> PolicyStatistics {
        let mut stats = self.stats.read().await.clone();
        let set = self.policies.read().await;
        stats.policies = set.entries.len();
        stats.enabled_policies = set.entries.iter().filter(|e| e.policy.enabled).count();
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autopatch_types::{
        RiskLevel, SourceKind, UpdatePriority, VersionInfo, WindowKind,
    };
    use chrono::TimeZone;
    use proptest::prelude::*;
    use serde_json::json;

    fn comparison(priority: UpdatePriority, breaking: bool) -> VersionComparison {
        let candidate = VersionInfo::new("svc", "1.1.0", SourceKind::GenericApi)
            .with_priority(priority)
            .with_breaking_changes(breaking);
        VersionComparison::between("1.0.0", candidate)
    }

    fn simulation(status: SimulationStatus, run: u32, failed: u32) -> SimulationResult {
        let mut sim = SimulationResult::new("svc", "1.1.0");
        sim.status = status;
        sim.tests_run = run;
        sim.tests_failed = failed;
        sim.tests_passed = run - failed;
        sim
    }

    /// Monday 10:00 UTC
    fn business_hours() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 10, 0, 0).unwrap()
    }

    /// Wednesday 22:00 UTC
    fn off_hours() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 21, 22, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn default_order_is_by_priority() {
        let engine = UpdatePolicyEngine::new();
        let names: Vec<String> = engine
            .list_policies()
            .await
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(
            names,
            vec![
                "critical-fast-track",
                "breaking-changes-review",
                "failed-simulation-reject",
                "performance-degradation-reject",
                "off-hours-defer",
                "high-success-auto-approve",
            ]
        );
    }

    #[tokio::test]
    async fn high_success_rate_is_approved() {
        let engine = UpdatePolicyEngine::new();
        let eval = engine
            .evaluate_update_at(
                business_hours(),
                &comparison(UpdatePriority::Medium, false),
                &simulation(SimulationStatus::Success, 100, 0),
            )
            .await;
        assert_eq!(eval.decision, UpdateDecision::Approve);
        assert_eq!(eval.risk_level, RiskLevel::Low);
        assert_eq!(eval.matched_policies, vec!["high-success-auto-approve"]);
        let window = eval.deployment_window.unwrap();
        assert_eq!(window.kind, WindowKind::Maintenance);
    }

    #[tokio::test]
    async fn defer_is_recorded_but_evaluation_continues() {
        let engine = UpdatePolicyEngine::new();
        let eval = engine
            .evaluate_update_at(
                off_hours(),
                &comparison(UpdatePriority::Medium, false),
                &simulation(SimulationStatus::Success, 100, 0),
            )
            .await;
        assert_eq!(eval.decision, UpdateDecision::Approve);
        assert_eq!(
            eval.matched_policies,
            vec!["off-hours-defer", "high-success-auto-approve"]
        );

        // Below the approval threshold only the deferral fires
        let mut sim = simulation(SimulationStatus::Success, 100, 0);
        sim.tests_passed = 90;
        let eval = engine
            .evaluate_update_at(off_hours(), &comparison(UpdatePriority::Low, false), &sim)
            .await;
        assert_eq!(eval.decision, UpdateDecision::Defer);
        assert!(eval.deployment_window.is_none());
    }

    #[tokio::test]
    async fn breaking_changes_need_review() {
        let engine = UpdatePolicyEngine::new();
        let eval = engine
            .evaluate_update_at(
                business_hours(),
                &comparison(UpdatePriority::High, true),
                &simulation(SimulationStatus::Success, 100, 0),
            )
            .await;
        assert_eq!(eval.decision, UpdateDecision::ManualReview);
        assert_eq!(eval.risk_level, RiskLevel::Medium);
        assert_eq!(eval.matched_policies, vec!["breaking-changes-review"]);
    }

    #[tokio::test]
    async fn critical_fast_track_gets_immediate_window() {
        let engine = UpdatePolicyEngine::new();
        let now = off_hours();
        let eval = engine
            .evaluate_update_at(
                now,
                &comparison(UpdatePriority::Critical, true),
                &simulation(SimulationStatus::Success, 100, 0),
            )
            .await;
        assert_eq!(eval.decision, UpdateDecision::Approve);
        let window = eval.deployment_window.unwrap();
        assert_eq!(window.kind, WindowKind::Immediate);
        assert_eq!(window.start, now);
    }

    #[tokio::test]
    async fn failed_simulation_is_rejected() {
        let engine = UpdatePolicyEngine::new();
        let eval = engine
            .evaluate_update_at(
                business_hours(),
                &comparison(UpdatePriority::Critical, false),
                &simulation(SimulationStatus::Failed, 100, 10),
            )
            .await;
        assert_eq!(eval.decision, UpdateDecision::Reject);
        assert_eq!(eval.risk_level, RiskLevel::Critical);
        assert_eq!(eval.matched_policies, vec!["failed-simulation-reject"]);
    }

    #[tokio::test]
    async fn nothing_fired_means_manual_review() {
        let engine = UpdatePolicyEngine::with_policies(vec![]);
        let eval = engine
            .evaluate_update_at(
                business_hours(),
                &comparison(UpdatePriority::Low, false),
                &simulation(SimulationStatus::Success, 10, 0),
            )
            .await;
        assert_eq!(eval.decision, UpdateDecision::ManualReview);
        assert!(eval.matched_policies.is_empty());
    }

    #[tokio::test]
    async fn crud_and_tie_ordering() {
        let engine = UpdatePolicyEngine::with_policies(vec![]);
        let approve = |name: &str, priority| {
            UpdatePolicy::new(name, priority, PolicyAction::new(UpdateDecision::Approve))
        };
        engine.add_policy(approve("a", 5)).await.unwrap();
        engine.add_policy(approve("b", 10)).await.unwrap();
        engine.add_policy(approve("c", 5)).await.unwrap();
        assert_eq!(
            engine.add_policy(approve("a", 1)).await,
            Err(PolicyError::AlreadyExists("a".into()))
        );

        engine
            .update_policy(
                "b",
                PolicyUpdate {
                    priority: Some(5),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let order: Vec<String> = engine
            .list_policies()
            .await
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(order, vec!["a", "b", "c"]);

        engine
            .update_policy(
                "a",
                PolicyUpdate {
                    enabled: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(!engine.get_policy("a").await.unwrap().enabled);
        assert_eq!(engine.remove_policy("c").await.unwrap().name, "c");
        assert!(matches!(
            engine.remove_policy("c").await,
            Err(PolicyError::NotFound(_))
        ));

        let stats = engine.statistics().await;
        assert_eq!((stats.policies, stats.enabled_policies), (2, 1));
    }

    #[tokio::test]
    async fn statistics_count_decisions() {
        let engine = UpdatePolicyEngine::new();
        let cmp = comparison(UpdatePriority::Medium, false);
        engine
            .evaluate_update_at(business_hours(), &cmp, &simulation(SimulationStatus::Success, 100, 0))
            .await;
        engine
            .evaluate_update_at(business_hours(), &cmp, &simulation(SimulationStatus::Failed, 100, 1))
            .await;
        let stats = engine.statistics().await;
        assert_eq!(stats.evaluations, 2);
        assert_eq!(stats.approved, 1);
        assert_eq!(stats.rejected, 1);
    }

    #[test]
    fn policy_update_accepts_actions_alias() {
        let update: PolicyUpdate =
            serde_json::from_value(json!({"actions": {"decision": "reject"}})).unwrap();
        assert_eq!(update.action.unwrap().decision, UpdateDecision::Reject);
    }

    proptest! {
        #[test]
        fn never_approves_failed_simulation(
            priorities in proptest::collection::vec(-50i32..150, 0..8),
            decisions in proptest::collection::vec(0u8..4, 8),
            breaking in any::<bool>(),
            hour in 0u32..24,
        ) {
            let decision_of = |n: u8| match n {
                0 => UpdateDecision::Approve,
                1 => UpdateDecision::Reject,
                2 => UpdateDecision::Defer,
                _ => UpdateDecision::ManualReview,
            };
            let policies: Vec<UpdatePolicy> = priorities
                .iter()
                .enumerate()
                .map(|(i, p)| UpdatePolicy::new(format!("p{i}"), *p, PolicyAction::new(decision_of(decisions[i]))))
                .collect();
            let engine = UpdatePolicyEngine::with_policies(policies);
            let now = Utc.with_ymd_and_hms(2026, 10, 19, hour, 0, 0).unwrap();
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let eval = runtime.block_on(engine.evaluate_update_at(
                now,
                &comparison(UpdatePriority::Critical, breaking),
                &simulation(SimulationStatus::Failed, 10, 5),
            ));
            prop_assert_ne!(eval.decision, UpdateDecision::Approve);
        }
    }
}
