//! Autopatch daemon library
//!
//! This module provides the pieces `autopatchd` is made of:
//! - Configuration loading
//! - Assembly of the update pipeline
//! - REST control surface
//! - Server lifecycle management

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod api;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod server;

pub use api::{create_router, AppState};
pub use config::DaemonConfig;
pub use error::{ApiError, DaemonError, DaemonResult};
pub use pipeline::build_orchestrator;
pub use server::Server;
