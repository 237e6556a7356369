//! Configuration for autopatchd

use autopatch_cicd::{CicdConfig, ProviderConfig};
use autopatch_detector::DetectorConfig;
use autopatch_orchestrator::OrchestratorConfig;
use autopatch_rollout::RolloutControllerConfig;
use autopatch_simulator::SimulatorConfig;
use autopatch_types::{TestCategory, UpdatePriority};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Main daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Wire synthetic and in-memory providers instead of running test
    /// commands, calling CI/CD and moving traffic
    #[serde(default = "default_true")]
    pub dry_run: bool,

    /// Start the orchestrator when the daemon starts
    #[serde(default = "default_true")]
    pub auto_start: bool,

    #[serde(default)]
    pub detector: DetectorConfig,

    #[serde(default)]
    pub simulator: SimulatorConfig,

    #[serde(default)]
    pub cicd: CicdConfig,

    /// CI/CD system used outside dry-run
    #[serde(default)]
    pub provider: Option<ProviderConfig>,

    #[serde(default)]
    pub rollout: RolloutControllerConfig,

    /// Health metrics backend sampled during rollouts outside dry-run
    #[serde(default)]
    pub metrics: MetricsConfig,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Shell commands per test category, used outside dry-run
    #[serde(default)]
    pub test_commands: Vec<TestCommandConfig>,

    /// Components to keep up to date
    #[serde(default)]
    pub components: Vec<ComponentConfig>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            dry_run: true,
            auto_start: true,
            detector: DetectorConfig::default(),
            simulator: SimulatorConfig::default(),
            cicd: CicdConfig::default(),
            provider: None,
            rollout: RolloutControllerConfig::default(),
            metrics: MetricsConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            test_commands: Vec::new(),
            components: Vec::new(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration: built-in defaults, then the optional file, then
    /// `AUTOPATCH_`-prefixed environment variables
    /// (`AUTOPATCH_SERVER__LISTEN_ADDR`, `AUTOPATCH_DRY_RUN`, ...).
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        // Start with defaults
        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        // Add config file if specified
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // Add environment variables
        builder = builder.add_source(
            config::Environment::with_prefix("AUTOPATCH")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            enable_cors: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level, used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Health metrics endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// `GET {endpoint}?component=..&version=..&percentage=..`
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub token: Option<String>,

    #[serde(default = "default_metrics_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            token: None,
            request_timeout_secs: default_metrics_timeout_secs(),
        }
    }
}

impl MetricsConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Command run for one test category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCommandConfig {
    pub category: TestCategory,
    pub command: String,
}

/// A managed component, its running version and where releases appear
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentConfig {
    pub name: String,
    pub current_version: String,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

/// Version source for a component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    GitTags {
        repository: String,
        #[serde(default)]
        tag_prefix: Option<String>,
        #[serde(default)]
        priority: UpdatePriority,
    },
    PackageRegistry {
        base_url: String,
        package: String,
        #[serde(default)]
        token: Option<String>,
    },
    ContainerRegistry {
        base_url: String,
        image: String,
        #[serde(default)]
        token: Option<String>,
    },
    ArtifactRepository {
        base_url: String,
        group: String,
        artifact: String,
        #[serde(default)]
        token: Option<String>,
    },
    GenericApi {
        url: String,
        #[serde(default)]
        token: Option<String>,
    },
    /// Releases listed in the configuration itself
    Static {
        #[serde(default)]
        releases: Vec<StaticRelease>,
    },
}

impl SourceConfig {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::GitTags { .. } => "git_tags",
            Self::PackageRegistry { .. } => "package_registry",
            Self::ContainerRegistry { .. } => "container_registry",
            Self::ArtifactRepository { .. } => "artifact_repository",
            Self::GenericApi { .. } => "generic_api",
            Self::Static { .. } => "static",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticRelease {
    pub version: String,
    #[serde(default)]
    pub priority: UpdatePriority,
    #[serde(default)]
    pub breaking_changes: bool,
    #[serde(default)]
    pub changelog: Option<String>,
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, 8080))
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_timeout_secs() -> u64 {
    10
}
