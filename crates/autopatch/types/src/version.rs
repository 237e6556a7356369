//! Detected versions and version comparisons

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

// ── Priority ───────────────────────────────────────────────────────────

/// Urgency attached to a released version.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum UpdatePriority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl UpdatePriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for UpdatePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpdatePriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" | "normal" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" | "security" => Ok(Self::Critical),
            other => Err(format!("unknown update priority: {other}")),
        }
    }
}

// ── Source Kind ────────────────────────────────────────────────────────

/// Kind of system a version was discovered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    GitTags,
    PackageRegistry,
    ContainerRegistry,
    ArtifactRepository,
    GenericApi,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::GitTags => "git_tags",
            Self::PackageRegistry => "package_registry",
            Self::ContainerRegistry => "container_registry",
            Self::ArtifactRepository => "artifact_repository",
            Self::GenericApi => "generic_api",
        };
        f.write_str(s)
    }
}

// ── Version Info ───────────────────────────────────────────────────────

/// A version of a component as reported by one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub component: String,
    pub source: SourceKind,
    #[serde(default)]
    pub priority: UpdatePriority,
    #[serde(default)]
    pub release_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub changelog: String,
    /// Where the artifact can be fetched from
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub checksum: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub breaking_changes: bool,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl VersionInfo {
    pub fn new(
        component: impl Into<String>,
        version: impl Into<String>,
        source: SourceKind,
    ) -> Self {
        Self {
            version: version.into(),
            component: component.into(),
            source,
            priority: UpdatePriority::default(),
            release_date: None,
            changelog: String::new(),
            download_url: None,
            checksum: None,
            dependencies: Vec::new(),
            breaking_changes: false,
            metadata: HashMap::new(),
        }
    }

    pub fn with_priority(mut self, priority: UpdatePriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_breaking_changes(mut self, breaking: bool) -> Self {
        self.breaking_changes = breaking;
        self
    }

    pub fn with_changelog(mut self, changelog: impl Into<String>) -> Self {
        self.changelog = changelog.into();
        self
    }

    pub fn with_release_date(mut self, date: DateTime<Utc>) -> Self {
        self.release_date = Some(date);
        self
    }
}

// ── Comparison ─────────────────────────────────────────────────────────

/// Current deployed version compared against the best available one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionComparison {
    pub component: String,
    pub current_version: String,
    pub available_version: String,
    pub update_available: bool,
    pub version_distance: u64,
    pub priority: UpdatePriority,
    pub breaking_changes: bool,
    pub recommendation: String,
    /// Full record of the available version
    pub candidate: VersionInfo,
}

impl VersionComparison {
    /// Compare `current` against the `candidate` version.
    pub fn between(current: &str, candidate: VersionInfo) -> Self {
        let update_available = candidate.version.as_str() > current;
        let distance = version_distance(current, &candidate.version);
        let recommendation = if update_available {
            recommendation_for(candidate.priority, distance, candidate.breaking_changes)
        } else {
            "Up to date".to_string()
        };

        Self {
            component: candidate.component.clone(),
            current_version: current.to_string(),
            available_version: candidate.version.clone(),
            update_available,
            version_distance: distance,
            priority: candidate.priority,
            breaking_changes: candidate.breaking_changes,
            recommendation,
            candidate,
        }
    }

    pub fn is_critical(&self) -> bool {
        self.update_available && self.priority == UpdatePriority::Critical
    }
}

/// Sum of the strictly positive per-segment deltas between two dotted
/// versions. Non-numeric characters inside a segment are ignored and a
/// missing segment counts as zero.
pub fn version_distance(current: &str, available: &str) -> u64 {
    let current = numeric_segments(current);
    let available = numeric_segments(available);
    let len = current.len().max(available.len());

    (0..len)
        .map(|i| {
            let c = current.get(i).copied().unwrap_or(0);
            let a = available.get(i).copied().unwrap_or(0);
            a.saturating_sub(c)
        })
        .fold(0u64, u64::saturating_add)
}

fn numeric_segments(version: &str) -> Vec<u64> {
    version
        .split('.')
        .map(|segment| {
            segment
                .chars()
                .filter(char::is_ascii_digit)
                .fold(0u64, |acc, d| {
                    acc.saturating_mul(10)
                        .saturating_add(u64::from(d as u8 - b'0'))
                })
        })
        .collect()
}

/// Human-readable advice for an available update.
pub fn recommendation_for(priority: UpdatePriority, distance: u64, breaking: bool) -> String {
    if priority == UpdatePriority::Critical {
        "Critical update available - update immediately".to_string()
    } else if breaking {
        "Update contains breaking changes - review before updating".to_string()
    } else if distance > 5 {
        format!("Multiple versions behind ({distance}) - update recommended")
    } else {
        "Update available".to_string()
    }
}
