//! Git tag source backed by `git ls-remote --tags`

use super::{looks_like_version, VersionSource};
use crate::error::{DetectorError, Result};
use async_trait::async_trait;
use autopatch_types::{SourceKind, UpdatePriority, VersionInfo};
use tokio::process::Command;
use tracing::debug;

/// Lists the tags of a remote git repository.
#[derive(Debug, Clone)]
pub struct GitTagSource {
    name: String,
    repository: String,
    tag_prefix: Option<String>,
    priority: UpdatePriority,
    git_binary: String,
}

impl GitTagSource {
    pub fn new(name: impl Into<String>, repository: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            repository: repository.into(),
            tag_prefix: None,
            priority: UpdatePriority::Medium,
            git_binary: "git".to_string(),
        }
    }

    /// Strip this prefix from tags (`v1.2.3` → `1.2.3`)
    pub fn with_tag_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.tag_prefix = Some(prefix.into());
        self
    }

    pub fn with_priority(mut self, priority: UpdatePriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_git_binary(mut self, binary: impl Into<String>) -> Self {
        self.git_binary = binary.into();
        self
    }
}

#[async_trait]
impl VersionSource for GitTagSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::GitTags
    }

    async fn fetch_versions(&self, component: &str) -> Result<Vec<VersionInfo>> {
        let output = Command::new(&self.git_binary)
            .args(["ls-remote", "--tags", &self.repository])
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(DetectorError::Git {
                repository: self.repository.clone(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let tags = parse_ls_remote(&stdout, self.tag_prefix.as_deref());
        debug!(source = %self.name, repository = %self.repository, tags = tags.len(), "Listed git tags");

        Ok(tags
            .into_iter()
            .map(|tag| {
                let mut info = VersionInfo::new(component, tag, SourceKind::GitTags)
                    .with_priority(self.priority);
                info.metadata.insert(
                    "repository".to_string(),
                    serde_json::Value::String(self.repository.clone()),
                );
                info
            })
            .collect())
    }
}

/// Extract tag names from `git ls-remote --tags` output. Peeled `^{}`
/// refs and non-version tags are skipped; duplicates are dropped.
pub fn parse_ls_remote(output: &str, prefix: Option<&str>) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for line in output.lines() {
        let Some(reference) = line.split_whitespace().nth(1) else {
            continue;
        };
        if reference.ends_with("^{}") {
            continue;
        }
        let Some(tag) = reference.strip_prefix("refs/tags/") else {
            continue;
        };
        let tag = match prefix {
            Some(p) => tag.strip_prefix(p).unwrap_or(tag),
            None => tag,
        };
        if looks_like_version(tag) && !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    const LS_REMOTE: &str = "\
4a1f0c2e\trefs/tags/v1.0.0
9d3e11aa\trefs/tags/v1.0.0^{}
77b0c9de\trefs/tags/v1.1.0
01ab34cd\trefs/tags/nightly
e5f6a7b8\trefs/heads/main
";

    #[test]
    fn parses_tags_and_skips_peeled_refs() {
        let tags = parse_ls_remote(LS_REMOTE, None);
        assert_eq!(tags, vec!["v1.0.0", "v1.1.0"]);
    }

    #[test]
    fn strips_prefix_when_present() {
        let tags = parse_ls_remote(LS_REMOTE, Some("v"));
        assert_eq!(tags, vec!["1.0.0", "1.1.0"]);
    }

    #[tokio::test]
    async fn missing_binary_is_an_error() {
        let source = GitTagSource::new("git", "https://example.invalid/repo.git")
            .with_git_binary("/nonexistent/autopatch-git");
        assert!(source.fetch_versions("svc").await.is_err());
    }
}
