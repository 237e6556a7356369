//! In-memory version source

use super::VersionSource;
use crate::error::{DetectorError, Result};
use async_trait::async_trait;
use autopatch_types::{SourceKind, VersionInfo};
use dashmap::DashMap;
use tokio::sync::RwLock;

/// Serves versions published into it. Can be told to fail to exercise
/// partial-poll behaviour.
#[derive(Debug)]
pub struct StaticVersionSource {
    name: String,
    kind: SourceKind,
    versions: DashMap<String, Vec<VersionInfo>>,
    failure: RwLock<Option<String>>,
}

impl StaticVersionSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_kind(name, SourceKind::GenericApi)
    }

    pub fn with_kind(name: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            name: name.into(),
            kind,
            versions: DashMap::new(),
            failure: RwLock::new(None),
        }
    }

    /// Add or replace a version for its component.
    pub fn publish(&self, info: VersionInfo) {
        let mut entry = self.versions.entry(info.component.clone()).or_default();
        entry.retain(|v| v.version != info.version);
        entry.push(info);
    }

    /// Make subsequent fetches fail with `reason`, or succeed again with `None`.
    pub async fn set_failure(&self, reason: Option<String>) {
        *self.failure.write().await = reason;
    }
}

#[async_trait]
impl VersionSource for StaticVersionSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn fetch_versions(&self, component: &str) -> Result<Vec<VersionInfo>> {
        if let Some(reason) = self.failure.read().await.clone() {
            return Err(DetectorError::SourceUnavailable {
                name: self.name.clone(),
                reason,
            });
        }
        Ok(self
            .versions
            .get(component)
            .map(|v| v.value().clone())
            .unwrap_or_default())
    }
}
