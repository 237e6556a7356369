//! Rollout configuration, health samples and live rollout state

use crate::error::TransitionError;
use crate::fsm::StateMachine;
use crate::ids::RolloutId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How traffic moves to the new version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RolloutStrategy {
    AllAtOnce,
    Canary,
    BlueGreen,
    Rolling,
}

impl fmt::Display for RolloutStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AllAtOnce => "all_at_once",
            Self::Canary => "canary",
            Self::BlueGreen => "blue_green",
            Self::Rolling => "rolling",
        };
        f.write_str(s)
    }
}

/// Caller-supplied strategy parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RolloutConfig {
    pub strategy: RolloutStrategy,
    pub canary_percentage: u8,
    pub monitoring_duration_seconds: u64,
    /// Seconds between health samples
    pub health_check_interval: u64,
    /// Maximum tolerated error rate (0.0–1.0)
    pub error_threshold: f64,
    pub rollback_enabled: bool,
    pub progressive_steps: Vec<u8>,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            strategy: RolloutStrategy::Canary,
            canary_percentage: 10,
            monitoring_duration_seconds: 300,
            health_check_interval: 30,
            error_threshold: 0.05,
            rollback_enabled: true,
            progressive_steps: vec![10, 25, 50, 100],
        }
    }
}

impl RolloutConfig {
    /// Blue-green with a short monitoring window and a tight threshold.
    pub fn fast_blue_green() -> Self {
        Self {
            strategy: RolloutStrategy::BlueGreen,
            canary_percentage: 0,
            monitoring_duration_seconds: 60,
            health_check_interval: 10,
            error_threshold: 0.01,
            rollback_enabled: true,
            progressive_steps: Vec::new(),
        }
    }

    /// Four-step canary with long monitoring.
    pub fn cautious_canary() -> Self {
        Self {
            strategy: RolloutStrategy::Canary,
            canary_percentage: 5,
            monitoring_duration_seconds: 600,
            health_check_interval: 30,
            error_threshold: 0.02,
            rollback_enabled: true,
            progressive_steps: vec![5, 25, 50, 100],
        }
    }

    /// Five-step rolling update.
    pub fn rolling_update() -> Self {
        Self {
            strategy: RolloutStrategy::Rolling,
            canary_percentage: 0,
            monitoring_duration_seconds: 300,
            health_check_interval: 30,
            error_threshold: 0.05,
            rollback_enabled: true,
            progressive_steps: vec![20, 40, 60, 80, 100],
        }
    }
}

// ── Phase ──────────────────────────────────────────────────────────────

/// Phase of a rollout.
///
/// Preparing → Deploying → Monitoring → (Deploying → Monitoring)* → Complete.
/// Deploying/Monitoring → RollingBack → Failed; any non-terminal → Failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RolloutPhase {
    Preparing,
    Deploying,
    Monitoring,
    Complete,
    RollingBack,
    Failed,
}

impl fmt::Display for RolloutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Preparing => "preparing",
            Self::Deploying => "deploying",
            Self::Monitoring => "monitoring",
            Self::Complete => "complete",
            Self::RollingBack => "rolling_back",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl StateMachine for RolloutPhase {
    const MACHINE: &'static str = "rollout";

    fn can_transition_to(&self, next: &Self) -> bool {
        use RolloutPhase::*;
        match self {
            Preparing => matches!(next, Deploying | Failed),
            Deploying => matches!(next, Monitoring | RollingBack | Failed),
            Monitoring => matches!(next, Deploying | Complete | RollingBack | Failed),
            RollingBack => matches!(next, Failed),
            Complete | Failed => false,
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

/// One health sample taken while monitoring a rollout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthMetrics {
    /// Fraction of failed requests (0.0–1.0)
    pub error_rate: f64,
    pub response_time_ms: f64,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    /// Requests per second
    pub request_rate: f64,
    pub sampled_at: DateTime<Utc>,
}

impl HealthMetrics {
    pub fn new(error_rate: f64, response_time_ms: f64) -> Self {
        Self {
            error_rate,
            response_time_ms,
            cpu_percent: 0.0,
            memory_percent: 0.0,
            request_rate: 0.0,
            sampled_at: Utc::now(),
        }
    }

    /// Describe why this sample breaches the limits, if it does.
    pub fn breach(&self, error_threshold: f64, response_ceiling_ms: f64) -> Option<String> {
        if self.error_rate > error_threshold {
            Some(format!(
                "error rate {:.4} exceeds threshold {:.4}",
                self.error_rate, error_threshold
            ))
        } else if self.response_time_ms > response_ceiling_ms {
            Some(format!(
                "response time {:.1}ms exceeds ceiling {:.1}ms",
                self.response_time_ms, response_ceiling_ms
            ))
        } else {
            None
        }
    }
}

// ── Status ─────────────────────────────────────────────────────────────

/// Live state of one rollout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolloutStatus {
    pub id: RolloutId,
    pub component: String,
    pub version: String,
    pub config: RolloutConfig,
    pub phase: RolloutPhase,
    pub current_percentage: u8,
    pub target_percentage: u8,
    /// Most recent health sample
    pub health_metrics: Option<HealthMetrics>,
    pub samples_taken: u32,
    pub errors: Vec<String>,
    pub rollback_triggered: bool,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl RolloutStatus {
    pub fn new(component: impl Into<String>, version: impl Into<String>, config: RolloutConfig) -> Self {
        let now = Utc::now();
        Self {
            id: RolloutId::generate(),
            component: component.into(),
            version: version.into(),
            config,
            phase: RolloutPhase::Preparing,
            current_percentage: 0,
            target_percentage: 100,
            health_metrics: None,
            samples_taken: 0,
            errors: Vec::new(),
            rollback_triggered: false,
            started_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn transition_to(&mut self, next: RolloutPhase) -> Result<(), TransitionError> {
        self.phase.transition_to(next)?;
        if next == RolloutPhase::RollingBack {
            self.rollback_triggered = true;
        }
        self.touch();
        if next.is_terminal() {
            self.completed_at = Some(self.updated_at);
        }
        Ok(())
    }

    /// Set the traffic percentage; decreases are only legal while rolling back.
    pub fn set_percentage(&mut self, percentage: u8) -> Result<(), TransitionError> {
        if percentage > 100 {
            return Err(TransitionError::PercentageOutOfRange(percentage));
        }
        if percentage < self.current_percentage && self.phase != RolloutPhase::RollingBack {
            return Err(TransitionError::PercentageDecrease {
                from: self.current_percentage,
                to: percentage,
            });
        }
        self.current_percentage = percentage;
        self.touch();
        Ok(())
    }

    pub fn record_health(&mut self, metrics: HealthMetrics) {
        self.health_metrics = Some(metrics);
        self.samples_taken += 1;
        self.touch();
    }

    /// Force the rollout to Failed from any non-terminal phase.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
        if !self.phase.is_terminal() {
            self.phase = RolloutPhase::Failed;
            self.touch();
            self.completed_at = Some(self.updated_at);
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    pub fn is_complete(&self) -> bool {
        self.phase == RolloutPhase::Complete
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn phase_machine_allows_repeated_promotion() {
        let mut phase = RolloutPhase::Preparing;
        for next in [
            RolloutPhase::Deploying,
            RolloutPhase::Monitoring,
            RolloutPhase::Deploying,
            RolloutPhase::Monitoring,
            RolloutPhase::Complete,
        ] {
            phase.transition_to(next).unwrap();
        }
        assert!(phase.is_terminal());
        assert!(!RolloutPhase::Preparing.can_transition_to(&RolloutPhase::RollingBack));
        assert!(!RolloutPhase::RollingBack.can_transition_to(&RolloutPhase::Complete));
    }

    #[test]
    fn percentage_bounds_and_monotonicity() {
        let mut status = RolloutStatus::new("svc", "1.1.0", RolloutConfig::default());
        status.transition_to(RolloutPhase::Deploying).unwrap();
        assert_eq!(
            status.set_percentage(101),
            Err(TransitionError::PercentageOutOfRange(101))
        );
        status.set_percentage(40).unwrap();
        assert!(status.set_percentage(20).is_err());

        status.transition_to(RolloutPhase::RollingBack).unwrap();
        assert!(status.rollback_triggered);
        status.set_percentage(20).unwrap();
        status.set_percentage(0).unwrap();
        status.transition_to(RolloutPhase::Failed).unwrap();
        assert!(status.completed_at.is_some());
    }

    #[test]
    fn breach_checks_error_rate_then_latency() {
        assert!(HealthMetrics::new(0.01, 120.0).breach(0.05, 500.0).is_none());
        assert!(HealthMetrics::new(0.06, 120.0)
            .breach(0.05, 500.0)
            .unwrap()
            .contains("error rate"));
        assert!(HealthMetrics::new(0.0, 501.0)
            .breach(0.05, 500.0)
            .unwrap()
            .contains("response time"));
    }

    #[test]
    fn profiles() {
        assert_eq!(RolloutConfig::cautious_canary().progressive_steps.len(), 4);
        assert_eq!(RolloutConfig::rolling_update().progressive_steps.len(), 5);
        assert_eq!(RolloutConfig::fast_blue_green().strategy, RolloutStrategy::BlueGreen);
    }

    proptest! {
        #[test]
        fn percentage_stays_bounded_and_monotone(steps in proptest::collection::vec(0u8..=255, 1..20)) {
            let mut status = RolloutStatus::new("svc", "1.0.0", RolloutConfig::default());
            status.transition_to(RolloutPhase::Deploying).unwrap();
            let mut last = status.current_percentage;
            for step in steps {
                let _ = status.set_percentage(step);
                prop_assert!(status.current_percentage <= 100);
                prop_assert!(status.current_percentage >= last);
                last = status.current_percentage;
            }
        }
    }
}
