//! Autopatch Rollout - Staged traffic rollout for approved updates
//!
//! The [`RolloutController`] moves traffic to a new version following a
//! [`RolloutStrategy`], samples health through a [`MetricsProvider`] after
//! every step, and walks traffic back down when a sample breaches the
//! configured limits. A background monitor force-fails rollouts that stop
//! making progress.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod config;
pub mod controller;
pub mod error;
pub mod metrics;
pub mod strategy;
pub mod traffic;

pub use config::RolloutControllerConfig;
pub use controller::{RolloutController, RolloutStatistics};
pub use error::{Result, RolloutError};
pub use metrics::{
    HttpMetricsProvider, MetricsProvider, StaticMetricsProvider, SyntheticMetricsProvider,
};
pub use strategy::{deployment_plan, ROLLBACK_STEP};
pub use traffic::{
    LoggingTrafficController, RecordingTrafficController, TrafficController, TrafficShift,
};

pub use autopatch_types::{
    HealthMetrics, RolloutConfig, RolloutId, RolloutPhase, RolloutStatus, RolloutStrategy,
};
