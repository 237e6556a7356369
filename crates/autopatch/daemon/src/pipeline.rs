//! Builds the update pipeline from daemon configuration

use crate::config::{ComponentConfig, DaemonConfig, SourceConfig};
use crate::error::{DaemonError, DaemonResult};
use autopatch_cicd::{CicdIntegrator, CicdProvider, HttpCicdProvider, InMemoryCicdProvider};
use autopatch_detector::{
    GitTagSource, HttpEndpoint, HttpVersionSource, StaticVersionSource, VersionDetector,
    VersionSource,
};
use autopatch_orchestrator::SelfUpdateOrchestrator;
use autopatch_policy::UpdatePolicyEngine;
use autopatch_rollout::{
    HttpMetricsProvider, LoggingTrafficController, MetricsProvider, RolloutController,
    SyntheticMetricsProvider, TrafficController,
};
use autopatch_simulator::{
    CommandTestRunner, SyntheticTestRunner, TempDirEnvironmentProvider, TestRunner,
    UpdateSimulator,
};
use autopatch_types::{SourceKind, VersionInfo};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Capability providers chosen by `dry_run`
struct Capabilities {
    runner: Arc<dyn TestRunner>,
    provider: Arc<dyn CicdProvider>,
    traffic: Arc<dyn TrafficController>,
    metrics: Arc<dyn MetricsProvider>,
}

fn capabilities(config: &DaemonConfig) -> DaemonResult<Capabilities> {
    if config.dry_run {
        return Ok(Capabilities {
            runner: Arc::new(SyntheticTestRunner::new()),
            provider: Arc::new(InMemoryCicdProvider::succeeding()),
            traffic: Arc::new(LoggingTrafficController),
            metrics: Arc::new(SyntheticMetricsProvider::new()),
        });
    }

    let provider_config = config.provider.clone().ok_or_else(|| {
        DaemonError::Config("a [provider] section is required when dry_run = false".to_string())
    })?;
    let timeout = Duration::from_secs(config.cicd.request_timeout_secs.max(1));
    let provider = HttpCicdProvider::new(provider_config, timeout)
        .map_err(|e| DaemonError::Setup(e.to_string()))?;

    let endpoint = config.metrics.endpoint.clone().ok_or_else(|| {
        DaemonError::Config("[metrics] endpoint is required when dry_run = false".to_string())
    })?;
    let mut metrics = HttpMetricsProvider::new(endpoint, config.metrics.request_timeout())
        .map_err(|e| DaemonError::Setup(e.to_string()))?;
    if let Some(token) = &config.metrics.token {
        metrics = metrics.with_bearer_token(token.clone());
    }

    let commands: HashMap<_, _> = config
        .test_commands
        .iter()
        .map(|c| (c.category, c.command.clone()))
        .collect();
    if commands.is_empty() {
        warn!("No test commands configured; simulations will run no tests");
    }

    Ok(Capabilities {
        runner: Arc::new(CommandTestRunner::new(commands)),
        provider: Arc::new(provider),
        traffic: Arc::new(LoggingTrafficController),
        metrics: Arc::new(metrics),
    })
}

fn build_source(
    component: &ComponentConfig,
    source: &SourceConfig,
    timeout: Duration,
) -> DaemonResult<Arc<dyn VersionSource>> {
    let name = format!("{}-{}", component.name, source.kind_name());
    let http = |endpoint: HttpEndpoint, token: &Option<String>| -> DaemonResult<Arc<dyn VersionSource>> {
        let mut source = HttpVersionSource::new(name.clone(), endpoint, timeout)
            .map_err(|e| DaemonError::Setup(e.to_string()))?;
        if let Some(token) = token {
            source = source.with_bearer_token(token.clone());
        }
        Ok(Arc::new(source))
    };

    match source {
        SourceConfig::GitTags {
            repository,
            tag_prefix,
            priority,
        } => {
            let mut git = GitTagSource::new(name.clone(), repository.clone()).with_priority(*priority);
            if let Some(prefix) = tag_prefix {
                git = git.with_tag_prefix(prefix.clone());
            }
            Ok(Arc::new(git))
        }
        SourceConfig::PackageRegistry {
            base_url,
            package,
            token,
        } => http(
            HttpEndpoint::PackageRegistry {
                base_url: base_url.clone(),
                package: package.clone(),
            },
            token,
        ),
        SourceConfig::ContainerRegistry {
            base_url,
            image,
            token,
        } => http(
            HttpEndpoint::ContainerRegistry {
                base_url: base_url.clone(),
                image: image.clone(),
            },
            token,
        ),
        SourceConfig::ArtifactRepository {
            base_url,
            group,
            artifact,
            token,
        } => http(
            HttpEndpoint::ArtifactRepository {
                base_url: base_url.clone(),
                group: group.clone(),
                artifact: artifact.clone(),
            },
            token,
        ),
        SourceConfig::GenericApi { url, token } => {
            http(HttpEndpoint::GenericApi { url: url.clone() }, token)
        }
        SourceConfig::Static { releases } => {
            let fixed = StaticVersionSource::new(name.clone());
            for release in releases {
                let mut info =
                    VersionInfo::new(component.name.clone(), release.version.clone(), SourceKind::GenericApi)
                        .with_priority(release.priority)
                        .with_breaking_changes(release.breaking_changes);
                if let Some(changelog) = &release.changelog {
                    info = info.with_changelog(changelog.clone());
                }
                fixed.publish(info);
            }
            Ok(Arc::new(fixed))
        }
    }
}

/// Build every component and the orchestrator that owns them.
///
/// Nothing is started; see [`SelfUpdateOrchestrator::start`].
pub async fn build_orchestrator(config: &DaemonConfig) -> DaemonResult<Arc<SelfUpdateOrchestrator>> {
    let caps = capabilities(config)?;

    let detector = Arc::new(VersionDetector::new(config.detector.clone()));
    let timeout = config.detector.request_timeout();
    for component in &config.components {
        detector.set_current_version(component.name.clone(), component.current_version.clone());
        for source in &component.sources {
            let source = build_source(component, source, timeout)?;
            detector.add_source(component.name.clone(), source).await;
        }
    }

    let simulator = Arc::new(UpdateSimulator::new(
        config.simulator.clone(),
        Arc::new(TempDirEnvironmentProvider::new()),
        caps.runner,
    ));
    let policy = Arc::new(UpdatePolicyEngine::new());
    let cicd = Arc::new(CicdIntegrator::new(config.cicd.clone(), caps.provider));
    let rollout = Arc::new(RolloutController::new(
        config.rollout.clone(),
        caps.traffic,
        caps.metrics,
    ));

    info!(
        dry_run = config.dry_run,
        components = config.components.len(),
        provider = %cicd.provider_name(),
        "Update pipeline assembled"
    );

    Ok(Arc::new(SelfUpdateOrchestrator::new(
        config.orchestrator.clone(),
        detector,
        simulator,
        policy,
        cicd,
        rollout,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MetricsConfig, StaticRelease};
    use autopatch_cicd::ProviderConfig;
    use autopatch_types::UpdatePriority;

    fn component() -> ComponentConfig {
        ComponentConfig {
            name: "gateway".to_string(),
            current_version: "1.0.0".to_string(),
            sources: vec![SourceConfig::Static {
                releases: vec![StaticRelease {
                    version: "1.1.0".to_string(),
                    priority: UpdatePriority::High,
                    breaking_changes: false,
                    changelog: None,
                }],
            }],
        }
    }

    #[tokio::test]
    async fn test_dry_run_uses_in_memory_provider() {
        let config = DaemonConfig {
            components: vec![component()],
            ..DaemonConfig::default()
        };
        let orchestrator = build_orchestrator(&config).await.unwrap();
        assert_eq!(orchestrator.cicd().provider_name(), "in-memory");
        assert_eq!(
            orchestrator.detector().current_version("gateway").as_deref(),
            Some("1.0.0")
        );

        orchestrator.detector().poll_once().await;
        let comparisons = orchestrator.detector().get_all_comparisons();
        assert_eq!(comparisons.len(), 1);
        assert!(comparisons[0].update_available);
    }

    #[tokio::test]
    async fn test_live_mode_requires_provider() {
        let config = DaemonConfig {
            dry_run: false,
            ..DaemonConfig::default()
        };
        assert!(matches!(
            build_orchestrator(&config).await,
            Err(DaemonError::Config(_))
        ));
    }

    fn live_provider() -> Option<ProviderConfig> {
        Some(ProviderConfig::Internal {
            endpoint: "http://127.0.0.1:9/deploy".to_string(),
            token: None,
        })
    }

    #[tokio::test]
    async fn test_live_mode_requires_metrics_endpoint() {
        let config = DaemonConfig {
            dry_run: false,
            provider: live_provider(),
            ..DaemonConfig::default()
        };
        match build_orchestrator(&config).await {
            Err(DaemonError::Config(message)) => assert!(message.contains("[metrics]")),
            other => panic!("expected a configuration error, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn test_live_mode_uses_http_provider() {
        let config = DaemonConfig {
            dry_run: false,
            provider: live_provider(),
            metrics: MetricsConfig {
                endpoint: Some("http://127.0.0.1:9/health".to_string()),
                token: Some("metrics-token".to_string()),
                ..MetricsConfig::default()
            },
            ..DaemonConfig::default()
        };
        let orchestrator = build_orchestrator(&config).await.unwrap();
        assert_eq!(orchestrator.cicd().provider_name(), "internal");
    }
}
