//! Autopatch CI/CD - Hands approved updates to an external build system
//!
//! The [`CicdIntegrator`] accepts deployment requests only for APPROVE
//! evaluations, queues them in strict FIFO order and processes them one at
//! a time: dispatch to the configured [`CicdProvider`], then poll until the
//! pipeline reaches a terminal state or the monitoring horizon elapses.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod config;
pub mod error;
pub mod http;
pub mod integrator;
pub mod provider;

pub use config::CicdConfig;
pub use error::{CicdError, Result};
pub use http::{HttpCicdProvider, ProviderConfig};
pub use integrator::{CicdIntegrator, DeploymentStatistics};
pub use provider::{CicdProvider, DispatchReceipt, InMemoryCicdProvider, PipelineState};
