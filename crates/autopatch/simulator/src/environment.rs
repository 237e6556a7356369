//! Isolated environments for simulation runs

use crate::error::{Result, SimulatorError};
use async_trait::async_trait;
use autopatch_types::VersionInfo;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

/// Handle to an environment created for one simulation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationEnvironment {
    pub id: String,
    pub root: PathBuf,
    pub component: String,
    pub version: String,
}

/// Creates and destroys isolated environments.
#[async_trait]
pub trait EnvironmentProvider: Send + Sync {
    async fn create(&self, version: &VersionInfo) -> Result<SimulationEnvironment>;

    async fn teardown(&self, env: &SimulationEnvironment) -> Result<()>;
}

/// One temporary directory per run, removed on teardown.
///
/// The candidate's [`VersionInfo`] is written to `version.json` inside the
/// directory so test commands can inspect it.
#[derive(Debug, Default)]
pub struct TempDirEnvironmentProvider {
    base_dir: Option<PathBuf>,
    dirs: DashMap<String, TempDir>,
}

impl TempDirEnvironmentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create environments under `base` instead of the system temp dir
    pub fn in_dir(base: impl AsRef<Path>) -> Self {
        Self {
            base_dir: Some(base.as_ref().to_path_buf()),
            dirs: DashMap::new(),
        }
    }

    pub fn live_environments(&self) -> usize {
        self.dirs.len()
    }
}

#[async_trait]
impl EnvironmentProvider for TempDirEnvironmentProvider {
    async fn create(&self, version: &VersionInfo) -> Result<SimulationEnvironment> {
        let prefix = format!("autopatch-{}-", version.component);
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);
        let dir = match &self.base_dir {
            Some(base) => builder.tempdir_in(base)?,
            None => builder.tempdir()?,
        };

        let manifest = serde_json::to_vec_pretty(version)?;
        tokio::fs::write(dir.path().join("version.json"), manifest).await?;

        let root = dir.path().to_path_buf();
        let id = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| SimulatorError::Environment("temp dir has no name".into()))?;
        self.dirs.insert(id.clone(), dir);
        debug!(env = %id, root = %root.display(), "Simulation environment created");

        Ok(SimulationEnvironment {
            id,
            root,
            component: version.component.clone(),
            version: version.version.clone(),
        })
    }

    async fn teardown(&self, env: &SimulationEnvironment) -> Result<()> {
        let Some((_, dir)) = self.dirs.remove(&env.id) else {
            return Err(SimulatorError::Environment(format!(
                "unknown environment {}",
                env.id
            )));
        };
        tokio::task::spawn_blocking(move || dir.close())
            .await
            .map_err(|e| SimulatorError::Environment(e.to_string()))??;
        debug!(env = %env.id, "Simulation environment removed");
        Ok(())
    }
}
