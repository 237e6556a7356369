//! Test runners executed inside simulation environments

use crate::environment::SimulationEnvironment;
use crate::error::{Result, SimulatorError};
use async_trait::async_trait;
use autopatch_types::{SimulationConfig, TestCategory, VersionInfo};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Counts and measurements from one test category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSuiteOutcome {
    pub category: TestCategory,
    pub tests_run: u32,
    pub tests_passed: u32,
    pub tests_failed: u32,
    pub metrics: HashMap<String, f64>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl TestSuiteOutcome {
    pub fn new(category: TestCategory) -> Self {
        Self {
            category,
            tests_run: 0,
            tests_passed: 0,
            tests_failed: 0,
            metrics: HashMap::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Outcome for a category whose runner could not execute at all
    pub fn errored(category: TestCategory, error: impl Into<String>) -> Self {
        let mut outcome = Self::new(category);
        outcome.errors.push(error.into());
        outcome
    }
}

/// Runs one test category against a candidate version.
#[async_trait]
pub trait TestRunner: Send + Sync {
    async fn run(
        &self,
        category: TestCategory,
        env: &SimulationEnvironment,
        version: &VersionInfo,
        config: &SimulationConfig,
    ) -> Result<TestSuiteOutcome>;
}

/// Whether a reported key is a performance metric
pub fn is_metric_key(key: &str) -> bool {
    key.ends_with("_time_ms") || key.starts_with("throughput_")
}

// ── Command Runner ─────────────────────────────────────────────────────

/// Runs a shell command per category inside the environment directory.
///
/// Exit status 0 passes the category. `key=value` lines on stdout are
/// interpreted: `tests_run`, `tests_passed` and `tests_failed` override the
/// single pass/fail count, and metric keys (`*_time_ms`, `throughput_*`)
/// are collected.
#[derive(Debug, Clone)]
pub struct CommandTestRunner {
    commands: HashMap<TestCategory, String>,
    shell: String,
}

impl CommandTestRunner {
    pub fn new(commands: HashMap<TestCategory, String>) -> Self {
        Self {
            commands,
            shell: "sh".to_string(),
        }
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }
}

#[async_trait]
impl TestRunner for CommandTestRunner {
    async fn run(
        &self,
        category: TestCategory,
        env: &SimulationEnvironment,
        version: &VersionInfo,
        _config: &SimulationConfig,
    ) -> Result<TestSuiteOutcome> {
        let mut outcome = TestSuiteOutcome::new(category);
        let Some(command) = self.commands.get(&category) else {
            outcome
                .warnings
                .push(format!("no command configured for {category} tests"));
            return Ok(outcome);
        };

        debug!(category = %category, command = %command, "Running test command");
        let output = Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .current_dir(&env.root)
            .env("AUTOPATCH_COMPONENT", &version.component)
            .env("AUTOPATCH_VERSION", &version.version)
            .env("AUTOPATCH_ENV_DIR", &env.root)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| SimulatorError::Runner {
                category,
                reason: e.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut counts: HashMap<&str, u32> = HashMap::new();
        for line in stdout.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let (key, value) = (key.trim(), value.trim());
            match key {
                "tests_run" | "tests_passed" | "tests_failed" => {
                    if let Ok(n) = value.parse() {
                        counts.insert(key, n);
                    }
                }
                _ if is_metric_key(key) => {
                    if let Ok(v) = value.parse::<f64>() {
                        outcome.metrics.insert(key.to_string(), v);
                    }
                }
                _ => {}
            }
        }

        let success = output.status.success();
        if counts.is_empty() {
            outcome.tests_run = 1;
            outcome.tests_passed = u32::from(success);
            outcome.tests_failed = u32::from(!success);
        } else {
            outcome.tests_passed = counts.get("tests_passed").copied().unwrap_or(0);
            outcome.tests_failed = counts.get("tests_failed").copied().unwrap_or(0);
            outcome.tests_run = counts
                .get("tests_run")
                .copied()
                .unwrap_or(outcome.tests_passed + outcome.tests_failed);
        }

        if !success {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
            outcome.errors.push(format!(
                "{category} tests exited with {}: {}",
                output.status,
                tail.into_iter().rev().collect::<Vec<_>>().join(" | ")
            ));
        }
        Ok(outcome)
    }
}

// ── Synthetic Runner ───────────────────────────────────────────────────

/// Deterministic runner for dry runs and tests.
///
/// Reports a fixed number of tests per category (100 across all six) and
/// fixed performance metrics. Failures, metrics and per-category latency
/// can be adjusted.
#[derive(Debug, Clone)]
pub struct SyntheticTestRunner {
    failures: HashMap<TestCategory, u32>,
    errors: HashMap<TestCategory, String>,
    metrics: HashMap<String, f64>,
    delay: Duration,
}

impl Default for SyntheticTestRunner {
    fn default() -> Self {
        let metrics = HashMap::from([
            ("response_time_ms".to_string(), 120.0),
            ("startup_time_ms".to_string(), 850.0),
            ("throughput_rps".to_string(), 1000.0),
        ]);
        Self {
            failures: HashMap::new(),
            errors: HashMap::new(),
            metrics,
            delay: Duration::ZERO,
        }
    }
}

impl SyntheticTestRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tests_in(category: TestCategory) -> u32 {
        match category {
            TestCategory::Unit => 50,
            TestCategory::Integration => 20,
            TestCategory::Performance => 5,
            TestCategory::Regression => 15,
            TestCategory::Compatibility => 5,
            TestCategory::Security => 5,
        }
    }

    pub fn with_failures(mut self, category: TestCategory, failed: u32) -> Self {
        self.failures.insert(category, failed);
        self
    }

    /// Make `category` fail to run with `error`
    pub fn with_error(mut self, category: TestCategory, error: impl Into<String>) -> Self {
        self.errors.insert(category, error.into());
        self
    }

    pub fn with_metric(mut self, key: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(key.into(), value);
        self
    }

    /// Simulated time spent per category
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl TestRunner for SyntheticTestRunner {
    async fn run(
        &self,
        category: TestCategory,
        _env: &SimulationEnvironment,
        _version: &VersionInfo,
        _config: &SimulationConfig,
    ) -> Result<TestSuiteOutcome> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(error) = self.errors.get(&category) {
            return Err(SimulatorError::Runner {
                category,
                reason: error.clone(),
            });
        }

        let total = Self::tests_in(category);
        let failed = self.failures.get(&category).copied().unwrap_or(0).min(total);
        let mut outcome = TestSuiteOutcome::new(category);
        outcome.tests_run = total;
        outcome.tests_failed = failed;
        outcome.tests_passed = total - failed;
        if category == TestCategory::Performance {
            outcome.metrics = self.metrics.clone();
        }
        if failed > 0 {
            outcome
                .warnings
                .push(format!("{failed} {category} test(s) failed"));
        }
        Ok(outcome)
    }
}
