//! Autopatch Types - Core type definitions for the update pipeline
//!
//! This crate provides the foundational data model shared by every
//! pipeline component: detected versions and comparisons, simulation
//! results, policies and evaluations, deployment triggers and results,
//! rollout state, and the per-attempt workflow record.
//!
//! Every status field is a finite-state machine implementing
//! [`StateMachine`]; illegal moves are rejected with a [`TransitionError`]
//! instead of overwriting state.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod deployment;
pub mod error;
pub mod events;
pub mod fsm;
pub mod ids;
pub mod lifecycle;
pub mod policy;
pub mod rollout;
pub mod simulation;
pub mod version;
pub mod workflow;

pub use deployment::*;
pub use error::*;
pub use events::*;
pub use fsm::*;
pub use ids::*;
pub use lifecycle::*;
pub use policy::*;
pub use rollout::*;
pub use simulation::*;
pub use version::*;
pub use workflow::*;
