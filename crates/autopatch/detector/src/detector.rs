//! Version detector - polls sources and compares against deployed versions

use crate::config::DetectorConfig;
use crate::error::{DetectorError, Result};
use crate::sources::VersionSource;
use autopatch_types::{BackgroundTask, SourceKind, VersionComparison, VersionInfo};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

/// A source registered for one component
#[derive(Clone)]
struct RegisteredSource {
    component: String,
    source: Arc<dyn VersionSource>,
}

/// Outcome of fetching one source during a poll
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceOutcome {
    pub component: String,
    pub source: String,
    pub kind: SourceKind,
    pub versions_found: usize,
    pub error: Option<String>,
}

/// Summary of one poll across every source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollReport {
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub outcomes: Vec<SourceOutcome>,
}

impl PollReport {
    pub fn failed_sources(&self) -> impl Iterator<Item = &SourceOutcome> {
        self.outcomes.iter().filter(|o| o.error.is_some())
    }

    pub fn total_versions(&self) -> usize {
        self.outcomes.iter().map(|o| o.versions_found).sum()
    }
}

/// Serializable view of the detector state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorSnapshot {
    pub running: bool,
    pub current_versions: BTreeMap<String, String>,
    pub detected_versions: BTreeMap<String, Vec<VersionInfo>>,
    pub sources: Vec<SourceOutcome>,
    pub last_poll: Option<PollReport>,
}

/// Tracks deployed versions and discovers newer ones
pub struct VersionDetector {
    config: DetectorConfig,
    sources: RwLock<Vec<RegisteredSource>>,
    current_versions: DashMap<String, String>,
    /// Per component, keyed by version string
    detected: DashMap<String, BTreeMap<String, VersionInfo>>,
    last_poll: RwLock<Option<PollReport>>,
    task: Mutex<Option<BackgroundTask>>,
}

impl VersionDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            sources: RwLock::new(Vec::new()),
            current_versions: DashMap::new(),
            detected: DashMap::new(),
            last_poll: RwLock::new(None),
            task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Register a source that reports versions of `component`
    pub async fn add_source(&self, component: impl Into<String>, source: Arc<dyn VersionSource>) {
        let component = component.into();
        info!(component = %component, source = %source.name(), kind = %source.kind(), "Version source registered");
        self.sources
            .write()
            .await
            .push(RegisteredSource { component, source });
    }

    /// Record the version currently deployed for `component`
    pub fn set_current_version(&self, component: impl Into<String>, version: impl Into<String>) {
        let component = component.into();
        let version = version.into();
        debug!(component = %component, version = %version, "Current version set");
        self.current_versions.insert(component, version);
    }

    pub fn current_version(&self, component: &str) -> Option<String> {
        self.current_versions.get(component).map(|v| v.value().clone())
    }

    /// Versions detected so far for `component`, in lexical order
    pub fn detected_versions(&self, component: &str) -> Vec<VersionInfo> {
        self.detected
            .get(component)
            .map(|versions| versions.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Poll every source once, merging results. Source failures are logged
    /// and reported but never abort the poll.
    #[instrument(skip(self))]
    pub async fn poll_once(&self) -> PollReport {
        let started_at = Utc::now();
        let sources = self.sources.read().await.clone();
        let timeout = self.config.request_timeout();

        let fetches = sources.iter().map(|registered| async move {
            let name = registered.source.name().to_string();
            let fetched =
                match tokio::time::timeout(timeout, registered.source.fetch_versions(&registered.component)).await {
                    Ok(result) => result,
                    Err(_) => Err(DetectorError::Timeout {
                        name: name.clone(),
                        secs: timeout.as_secs(),
                    }),
                };
            (registered, fetched)
        });
        let results = futures::future::join_all(fetches).await;

        let mut outcomes = Vec::with_capacity(results.len());
        for (registered, fetched) in results {
            let name = registered.source.name().to_string();
            let outcome = match fetched {
                Ok(versions) => {
                    let found = versions.len();
                    self.merge(&registered.component, versions);
                    SourceOutcome {
                        component: registered.component.clone(),
                        source: name,
                        kind: registered.source.kind(),
                        versions_found: found,
                        error: None,
                    }
                }
                Err(e) => {
                    warn!(component = %registered.component, source = %name, error = %e, "Version source failed");
                    SourceOutcome {
                        component: registered.component.clone(),
                        source: name,
                        kind: registered.source.kind(),
                        versions_found: 0,
                        error: Some(e.to_string()),
                    }
                }
            };
            outcomes.push(outcome);
        }

        let report = PollReport {
            started_at,
            completed_at: Utc::now(),
            outcomes,
        };
        info!(
            sources = report.outcomes.len(),
            failed = report.failed_sources().count(),
            versions = report.total_versions(),
            "Version poll complete"
        );
        *self.last_poll.write().await = Some(report.clone());
        report
    }

    fn merge(&self, component: &str, versions: Vec<VersionInfo>) {
        let mut known = self.detected.entry(component.to_string()).or_default();
        for info in versions {
            known.insert(info.version.clone(), info);
        }
    }

    /// Compare the deployed version of `component` with the lexically
    /// greatest detected version. `None` when no current version is
    /// registered or nothing was detected.
    pub fn compare_versions(&self, component: &str) -> Option<VersionComparison> {
        let current = self.current_version(component)?;
        let latest = self
            .detected
            .get(component)
            .and_then(|versions| versions.values().next_back().cloned())?;
        Some(VersionComparison::between(&current, latest))
    }

    /// Comparisons for every component with a registered current version
    pub fn get_all_comparisons(&self) -> Vec<VersionComparison> {
        let mut components: Vec<String> =
            self.current_versions.iter().map(|e| e.key().clone()).collect();
        components.sort();
        components
            .iter()
            .filter_map(|c| self.compare_versions(c))
            .collect()
    }

    /// Available updates flagged critical
    pub fn get_critical_updates(&self) -> Vec<VersionComparison> {
        self.get_all_comparisons()
            .into_iter()
            .filter(VersionComparison::is_critical)
            .collect()
    }

    // ── Lifecycle ──────────────────────────────────────────────────────

    /// Start the background polling loop
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let mut task = self.task.lock().await;
        if task.is_some() {
            return Err(DetectorError::AlreadyRunning);
        }

        let detector = Arc::clone(self);
        *task = Some(BackgroundTask::spawn_periodic(
            "version-detector",
            self.config.poll_interval(),
            move || {
                let detector = Arc::clone(&detector);
                async move {
                    detector.poll_once().await;
                }
            },
        ));
        info!(interval_secs = self.config.poll_interval_secs, "Version detector started");
        Ok(())
    }

    /// Stop the polling loop and wait for it to exit
    pub async fn stop(&self) {
        if let Some(task) = self.task.lock().await.take() {
            task.shutdown().await;
            info!("Version detector stopped");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.task.lock().await.is_some()
    }

    pub async fn snapshot(&self) -> DetectorSnapshot {
        let sources = self
            .sources
            .read()
            .await
            .iter()
            .map(|r| SourceOutcome {
                component: r.component.clone(),
                source: r.source.name().to_string(),
                kind: r.source.kind(),
                versions_found: self
                    .detected
                    .get(&r.component)
                    .map(|v| v.values().filter(|i| i.source == r.source.kind()).count())
                    .unwrap_or(0),
                error: None,
            })
            .collect();

        DetectorSnapshot {
            running: self.is_running().await,
            current_versions: self
                .current_versions
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect(),
            detected_versions: self
                .detected
                .iter()
                .map(|e| (e.key().clone(), e.value().values().cloned().collect()))
                .collect(),
            sources,
            last_poll: self.last_poll.read().await.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::StaticVersionSource;
    use autopatch_types::UpdatePriority;
    use std::time::Duration;

    fn info(version: &str) -> VersionInfo {
        VersionInfo::new("svc", version, SourceKind::GenericApi)
    }

    async fn detector_with(source: Arc<StaticVersionSource>) -> VersionDetector {
        let detector = VersionDetector::new(DetectorConfig::default());
        detector.add_source("svc", source).await;
        detector
    }

    #[tokio::test]
    async fn comparison_requires_current_version() {
        let source = Arc::new(StaticVersionSource::new("static"));
        source.publish(info("1.1.0"));
        let detector = detector_with(source).await;
        detector.poll_once().await;

        assert!(detector.compare_versions("svc").is_none());
        detector.set_current_version("svc", "1.0.0");
        let cmp = detector.compare_versions("svc").unwrap();
        assert!(cmp.update_available);
        assert_eq!(cmp.available_version, "1.1.0");
    }

    #[tokio::test]
    async fn picks_lexically_greatest_version() {
        let source = Arc::new(StaticVersionSource::new("static"));
        for v in ["1.2.0", "1.10.0", "1.3.0"] {
            source.publish(info(v));
        }
        let detector = detector_with(source).await;
        detector.set_current_version("svc", "1.0.0");
        detector.poll_once().await;

        let cmp = detector.compare_versions("svc").unwrap();
        assert_eq!(cmp.available_version, "1.3.0");
        assert_eq!(detector.detected_versions("svc").len(), 3);
    }

    #[tokio::test]
    async fn failing_source_does_not_block_others() {
        let broken = Arc::new(StaticVersionSource::new("broken"));
        broken.set_failure(Some("connection refused".into())).await;
        let healthy = Arc::new(StaticVersionSource::new("healthy"));
        healthy.publish(info("2.0.0"));

        let detector = VersionDetector::new(DetectorConfig::default());
        detector.add_source("svc", broken).await;
        detector.add_source("svc", healthy).await;
        detector.set_current_version("svc", "1.0.0");

        let report = detector.poll_once().await;
        assert_eq!(report.failed_sources().count(), 1);
        assert_eq!(report.total_versions(), 1);
        assert_eq!(detector.compare_versions("svc").unwrap().available_version, "2.0.0");
    }

    #[tokio::test]
    async fn later_fetch_replaces_same_version() {
        let source = Arc::new(StaticVersionSource::new("static"));
        source.publish(info("1.1.0"));
        let detector = detector_with(source.clone()).await;
        detector.set_current_version("svc", "1.0.0");
        detector.poll_once().await;

        source.publish(info("1.1.0").with_priority(UpdatePriority::Critical));
        detector.poll_once().await;

        assert_eq!(detector.detected_versions("svc").len(), 1);
        let critical = detector.get_critical_updates();
        assert_eq!(critical.len(), 1);
        assert!(critical[0].recommendation.contains("immediately"));
    }

    #[tokio::test]
    async fn critical_filter_skips_up_to_date_components() {
        let source = Arc::new(StaticVersionSource::new("static"));
        source.publish(info("1.0.0").with_priority(UpdatePriority::Critical));
        let detector = detector_with(source).await;
        detector.set_current_version("svc", "1.0.0");
        detector.poll_once().await;

        assert_eq!(detector.get_all_comparisons().len(), 1);
        assert!(detector.get_critical_updates().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn background_loop_polls_on_interval() {
        let source = Arc::new(StaticVersionSource::new("static"));
        let detector = Arc::new(
            detector_with_config(
                source.clone(),
                DetectorConfig {
                    poll_interval_secs: 60,
                    request_timeout_secs: 5,
                },
            )
            .await,
        );
        detector.set_current_version("svc", "1.0.0");
        detector.start().await.unwrap();
        assert!(matches!(detector.start().await, Err(DetectorError::AlreadyRunning)));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(detector.compare_versions("svc").is_none());

        source.publish(info("1.0.1"));
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(detector.compare_versions("svc").unwrap().update_available);

        detector.stop().await;
        assert!(!detector.is_running().await);
    }

    async fn detector_with_config(
        source: Arc<StaticVersionSource>,
        config: DetectorConfig,
    ) -> VersionDetector {
        let detector = VersionDetector::new(config);
        detector.add_source("svc", source).await;
        detector
    }
}
