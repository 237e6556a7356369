//! Autopatch Orchestrator - Drives candidate updates through the pipeline
//!
//! The [`SelfUpdateOrchestrator`] owns one instance of every pipeline
//! component. Each available update becomes an [`UpdateWorkflow`] that moves
//! strictly through version comparison, simulation, policy evaluation,
//! CI/CD dispatch and rollout, or halts at `failed` / `awaiting_approval`.
//! Halted-for-approval workflows resume through
//! [`SelfUpdateOrchestrator::approve_workflow`].

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod profile;
pub mod snapshot;

pub use config::OrchestratorConfig;
pub use error::{OrchestratorError, Result};
pub use orchestrator::SelfUpdateOrchestrator;
pub use profile::select_rollout_profile;
pub use snapshot::{
    DeploymentSnapshot, OrchestratorSnapshot, RolloutSnapshot, SimulatorSnapshot,
    WorkflowStatistics,
};

pub use autopatch_types::{
    UpdateEvent, UpdateEventEnvelope, UpdateWorkflow, WorkflowId, WorkflowStage,
};
