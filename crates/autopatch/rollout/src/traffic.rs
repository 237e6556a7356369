//! Traffic controller seam

use crate::error::{Result, RolloutError};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

/// Moves live traffic between the current and the new version
#[async_trait]
pub trait TrafficController: Send + Sync {
    /// Route `percentage` percent of traffic for `component` to `version`.
    async fn shift(&self, component: &str, version: &str, percentage: u8) -> Result<()>;
}

/// One recorded traffic move
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrafficShift {
    pub component: String,
    pub version: String,
    pub percentage: u8,
}

/// Keeps every shift in memory
#[derive(Debug, Default)]
pub struct RecordingTrafficController {
    shifts: Mutex<Vec<TrafficShift>>,
    fail_at: Option<u8>,
}

impl RecordingTrafficController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject shifts to `percentage` without recording them
    pub fn with_failure_at(mut self, percentage: u8) -> Self {
        self.fail_at = Some(percentage);
        self
    }

    pub async fn shifts(&self) -> Vec<TrafficShift> {
        self.shifts.lock().await.clone()
    }

    /// Percentages shifted for one component, in order
    pub async fn percentages(&self, component: &str) -> Vec<u8> {
        self.shifts
            .lock()
            .await
            .iter()
            .filter(|s| s.component == component)
            .map(|s| s.percentage)
            .collect()
    }
}

#[async_trait]
impl TrafficController for RecordingTrafficController {
    async fn shift(&self, component: &str, version: &str, percentage: u8) -> Result<()> {
        if self.fail_at == Some(percentage) {
            return Err(RolloutError::Traffic {
                component: component.to_string(),
                reason: format!("load balancer refused {percentage}%"),
            });
        }
        self.shifts.lock().await.push(TrafficShift {
            component: component.to_string(),
            version: version.to_string(),
            percentage,
        });
        Ok(())
    }
}

/// Logs each shift; for environments where traffic is moved out of band
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingTrafficController;

#[async_trait]
impl TrafficController for LoggingTrafficController {
    async fn shift(&self, component: &str, version: &str, percentage: u8) -> Result<()> {
        info!(component, version, percentage, "Traffic shift requested");
        Ok(())
    }
}
