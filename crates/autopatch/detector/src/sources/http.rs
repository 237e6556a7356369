//! HTTP-backed version sources: package registries, container registries,
//! artifact repositories and generic JSON APIs

use super::{looks_like_version, VersionSource};
use crate::error::{DetectorError, Result};
use async_trait::async_trait;
use autopatch_types::{SourceKind, UpdatePriority, VersionInfo};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument};

/// Where an HTTP source finds its version document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpEndpoint {
    /// `GET {base_url}/packages/{package}/versions`
    PackageRegistry { base_url: String, package: String },
    /// Docker Registry v2: `GET {base_url}/v2/{image}/tags/list`
    ContainerRegistry { base_url: String, image: String },
    /// `GET {base_url}/artifacts/{group}/{artifact}/versions`
    ArtifactRepository {
        base_url: String,
        group: String,
        artifact: String,
    },
    /// `GET {url}`; `{component}` in the url is substituted
    GenericApi { url: String },
}

impl HttpEndpoint {
    pub fn kind(&self) -> SourceKind {
        match self {
            Self::PackageRegistry { .. } => SourceKind::PackageRegistry,
            Self::ContainerRegistry { .. } => SourceKind::ContainerRegistry,
            Self::ArtifactRepository { .. } => SourceKind::ArtifactRepository,
            Self::GenericApi { .. } => SourceKind::GenericApi,
        }
    }

    pub fn url_for(&self, component: &str) -> String {
        match self {
            Self::PackageRegistry { base_url, package } => {
                format!("{}/packages/{}/versions", base_url.trim_end_matches('/'), package)
            }
            Self::ContainerRegistry { base_url, image } => {
                format!("{}/v2/{}/tags/list", base_url.trim_end_matches('/'), image)
            }
            Self::ArtifactRepository {
                base_url,
                group,
                artifact,
            } => format!(
                "{}/artifacts/{}/{}/versions",
                base_url.trim_end_matches('/'),
                group,
                artifact
            ),
            Self::GenericApi { url } => url.replace("{component}", component),
        }
    }
}

/// Version source that fetches a JSON version document over HTTP.
#[derive(Debug, Clone)]
pub struct HttpVersionSource {
    name: String,
    endpoint: HttpEndpoint,
    client: Client,
    bearer_token: Option<String>,
    default_priority: UpdatePriority,
}

impl HttpVersionSource {
    pub fn new(name: impl Into<String>, endpoint: HttpEndpoint, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            name: name.into(),
            endpoint,
            client,
            bearer_token: None,
            default_priority: UpdatePriority::Medium,
        })
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Priority for entries that do not carry one
    pub fn with_default_priority(mut self, priority: UpdatePriority) -> Self {
        self.default_priority = priority;
        self
    }

    pub fn endpoint(&self) -> &HttpEndpoint {
        &self.endpoint
    }
}

#[async_trait]
impl VersionSource for HttpVersionSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        self.endpoint.kind()
    }

    #[instrument(skip(self), fields(source = %self.name))]
    async fn fetch_versions(&self, component: &str) -> Result<Vec<VersionInfo>> {
        let url = self.endpoint.url_for(component);
        let mut request = self.client.get(&url);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DetectorError::SourceUnavailable {
                name: self.name.clone(),
                reason: format!("GET {url} returned {status}"),
            });
        }

        let document: serde_json::Value = response.json().await?;
        let versions =
            parse_version_document(component, self.kind(), self.default_priority, document)
                .map_err(|reason| DetectorError::MalformedDocument {
                    name: self.name.clone(),
                    reason,
                })?;
        debug!(url = %url, versions = versions.len(), "Fetched version document");
        Ok(versions)
    }
}

// ── Document Parsing ───────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(untagged)]
enum VersionDocument {
    List(Vec<VersionEntry>),
    Versions { versions: Vec<VersionEntry> },
    Tags { tags: Vec<VersionEntry> },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum VersionEntry {
    Plain(String),
    Detailed(DetailedEntry),
}

#[derive(Deserialize)]
struct DetailedEntry {
    #[serde(alias = "tag", alias = "name")]
    version: String,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    release_date: Option<DateTime<Utc>>,
    #[serde(default)]
    changelog: Option<String>,
    #[serde(default)]
    download_url: Option<String>,
    #[serde(default)]
    checksum: Option<String>,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default)]
    breaking_changes: bool,
    #[serde(default)]
    metadata: HashMap<String, serde_json::Value>,
}

/// Parse a version document: a JSON array, or an object with a `versions`
/// or `tags` array. Entries are version strings or objects.
pub fn parse_version_document(
    component: &str,
    kind: SourceKind,
    default_priority: UpdatePriority,
    document: serde_json::Value,
) -> std::result::Result<Vec<VersionInfo>, String> {
    let document: VersionDocument = serde_json::from_value(document)
        .map_err(|_| "expected an array or an object with `versions` or `tags`".to_string())?;
    let entries = match document {
        VersionDocument::List(entries)
        | VersionDocument::Versions { versions: entries }
        | VersionDocument::Tags { tags: entries } => entries,
    };

    Ok(entries
        .into_iter()
        .map(|entry| match entry {
            VersionEntry::Plain(version) => {
                VersionInfo::new(component, version, kind).with_priority(default_priority)
            }
            VersionEntry::Detailed(detail) => VersionInfo {
                version: detail.version,
                component: component.to_string(),
                source: kind,
                priority: detail
                    .priority
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(default_priority),
                release_date: detail.release_date,
                changelog: detail.changelog.unwrap_or_default(),
                download_url: detail.download_url,
                checksum: detail.checksum,
                dependencies: detail.dependencies,
                breaking_changes: detail.breaking_changes,
                metadata: detail.metadata,
            },
        })
        .filter(|info| looks_like_version(&info.version))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn endpoint_urls() {
        let registry = HttpEndpoint::PackageRegistry {
            base_url: "https://registry.local/".into(),
            package: "svc".into(),
        };
        assert_eq!(registry.url_for("svc"), "https://registry.local/packages/svc/versions");

        let docker = HttpEndpoint::ContainerRegistry {
            base_url: "https://ghcr.local".into(),
            image: "team/svc".into(),
        };
        assert_eq!(docker.url_for("svc"), "https://ghcr.local/v2/team/svc/tags/list");

        let generic = HttpEndpoint::GenericApi {
            url: "https://releases.local/{component}.json".into(),
        };
        assert_eq!(generic.url_for("api"), "https://releases.local/api.json");
    }

    #[test]
    fn parses_plain_and_detailed_entries() {
        let doc = json!({
            "versions": [
                "1.0.0",
                {
                    "version": "1.1.0",
                    "priority": "critical",
                    "breaking_changes": true,
                    "changelog": "fix CVE",
                    "dependencies": ["libfoo>=2"],
                    "release_date": "2026-01-05T10:00:00Z"
                }
            ]
        });
        let versions =
            parse_version_document("svc", SourceKind::PackageRegistry, UpdatePriority::Low, doc)
                .unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].priority, UpdatePriority::Low);
        assert_eq!(versions[1].priority, UpdatePriority::Critical);
        assert!(versions[1].breaking_changes);
        assert!(versions[1].release_date.is_some());
        assert_eq!(versions[1].dependencies, vec!["libfoo>=2"]);
    }

    #[test]
    fn docker_tag_list_drops_floating_tags() {
        let doc = json!({"name": "team/svc", "tags": ["latest", "1.2.0", "1.3.0"]});
        let versions = parse_version_document(
            "svc",
            SourceKind::ContainerRegistry,
            UpdatePriority::Medium,
            doc,
        )
        .unwrap();
        let names: Vec<_> = versions.iter().map(|v| v.version.as_str()).collect();
        assert_eq!(names, vec!["1.2.0", "1.3.0"]);
    }

    #[test]
    fn rejects_unknown_document_shapes() {
        let err = parse_version_document(
            "svc",
            SourceKind::GenericApi,
            UpdatePriority::Medium,
            json!({"releases": 3}),
        )
        .unwrap_err();
        assert!(err.contains("versions"));
    }
}
