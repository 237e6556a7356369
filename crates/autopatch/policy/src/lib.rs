//! # Autopatch Policy Engine
//!
//! Decides whether a validated update may be deployed.
//!
//! ## Overview
//!
//! The [`UpdatePolicyEngine`] holds an ordered list of [`UpdatePolicy`]
//! rules, highest priority first. Evaluation builds a flat context from
//! the version comparison and simulation result, then walks the rules:
//!
//! - the first firing rule whose decision is APPROVE, REJECT or
//!   MANUAL_REVIEW ends evaluation
//! - DEFER rules are recorded and evaluation continues
//! - when nothing terminates, the result is DEFER if any rule deferred,
//!   otherwise MANUAL_REVIEW
//!
//! An APPROVE is never returned for a failed simulation, whatever the
//! rule set says. Risk is scored independently of the decision, and an
//! approval carries a [`DeploymentWindow`].

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod context;
pub mod defaults;
pub mod engine;
pub mod error;
pub mod risk;
pub mod window;

pub use context::{build_context, in_business_hours, in_maintenance_window};
pub use defaults::default_policies;
pub use engine::{PolicyStatistics, PolicyUpdate, UpdatePolicyEngine};
pub use error::{PolicyError, Result};
pub use risk::risk_score;
pub use window::deployment_window;

pub use autopatch_types::{
    DeploymentWindow, PolicyAction, PolicyCondition, PolicyEvaluation, RiskLevel, UpdateDecision,
    UpdatePolicy,
};
