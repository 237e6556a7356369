//! Autopatch Detector - Version discovery for managed components
//!
//! The [`VersionDetector`] polls every registered [`VersionSource`] on a
//! fixed interval, merges what they report into a per-component version
//! list, and compares the best available version against the version
//! currently deployed. A failing source is logged and skipped; the other
//! sources still contribute to the poll.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod config;
pub mod detector;
pub mod error;
pub mod sources;

pub use config::DetectorConfig;
pub use detector::{DetectorSnapshot, PollReport, SourceOutcome, VersionDetector};
pub use error::{DetectorError, Result};
pub use sources::{GitTagSource, HttpEndpoint, HttpVersionSource, StaticVersionSource, VersionSource};
