//! Autopatch Simulator - Validates candidate versions before deployment
//!
//! The [`UpdateSimulator`] creates an isolated environment for a candidate
//! version, runs the requested test categories through a pluggable
//! [`TestRunner`], and reports a single [`SimulationResult`] per run.
//! Concurrent runs are bounded by a semaphore; callers beyond the limit
//! wait for a free slot.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod config;
pub mod environment;
pub mod error;
pub mod runner;
pub mod simulator;

pub use config::SimulatorConfig;
pub use environment::{EnvironmentProvider, SimulationEnvironment, TempDirEnvironmentProvider};
pub use error::{Result, SimulatorError};
pub use runner::{CommandTestRunner, SyntheticTestRunner, TestRunner, TestSuiteOutcome};
pub use simulator::{SimulatorStatistics, UpdateSimulator};

pub use autopatch_types::{SimulationConfig, SimulationResult, SimulationStatus, TestCategory};
