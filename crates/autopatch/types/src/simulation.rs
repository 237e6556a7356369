//! Simulation configuration and results

use crate::fsm::StateMachine;
use crate::ids::SimulationId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Category of validation tests run against a candidate version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestCategory {
    Unit,
    Integration,
    Performance,
    Regression,
    Compatibility,
    Security,
}

impl TestCategory {
    pub const ALL: [TestCategory; 6] = [
        Self::Unit,
        Self::Integration,
        Self::Performance,
        Self::Regression,
        Self::Compatibility,
        Self::Security,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unit => "unit",
            Self::Integration => "integration",
            Self::Performance => "performance",
            Self::Regression => "regression",
            Self::Compatibility => "compatibility",
            Self::Security => "security",
        }
    }
}

impl fmt::Display for TestCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-supplied parameters of one simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub test_categories: Vec<TestCategory>,
    /// Whole-run timeout in seconds
    pub timeout_secs: u64,
    /// Baseline values for `*_time_ms` and `throughput_*` metrics
    pub performance_baseline: Option<HashMap<String, f64>>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            test_categories: TestCategory::ALL.to_vec(),
            timeout_secs: 1800,
            performance_baseline: None,
        }
    }
}

// ── Status ─────────────────────────────────────────────────────────────

/// Lifecycle of a simulation run.
///
/// Pending → Running → {Success, Failed, Cancelled}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationStatus {
    Pending,
    Running,
    Success,
    Failed,
    Cancelled,
}

impl fmt::Display for SimulationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

impl StateMachine for SimulationStatus {
    const MACHINE: &'static str = "simulation";

    fn can_transition_to(&self, next: &Self) -> bool {
        use SimulationStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Running, Success)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Cancelled)
    }
}

// ── Result ─────────────────────────────────────────────────────────────

/// Outcome of one simulation run, produced exactly once per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub id: SimulationId,
    pub component: String,
    pub version: String,
    pub status: SimulationStatus,
    pub tests_run: u32,
    pub tests_passed: u32,
    pub tests_failed: u32,
    pub performance_metrics: HashMap<String, f64>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub recommendation: String,
    pub performance_degradation: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SimulationResult {
    pub fn new(component: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: SimulationId::generate(),
            component: component.into(),
            version: version.into(),
            status: SimulationStatus::Pending,
            tests_run: 0,
            tests_passed: 0,
            tests_failed: 0,
            performance_metrics: HashMap::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            recommendation: String::new(),
            performance_degradation: false,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Passed tests over tests run; zero when nothing ran.
    pub fn success_rate(&self) -> f64 {
        if self.tests_run == 0 {
            0.0
        } else {
            f64::from(self.tests_passed) / f64::from(self.tests_run)
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == SimulationStatus::Success
    }

    pub fn duration_secs(&self) -> Option<f64> {
        self.completed_at
            .map(|end| (end - self.started_at).num_milliseconds() as f64 / 1000.0)
    }
}
