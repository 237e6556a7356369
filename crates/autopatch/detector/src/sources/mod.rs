//! Version source adapters
//!
//! A source answers one question: which versions of a component exist.

mod fixed;
mod git;
mod http;

pub use fixed::StaticVersionSource;
pub use git::{parse_ls_remote, GitTagSource};
pub use http::{parse_version_document, HttpEndpoint, HttpVersionSource};

use crate::error::Result;
use async_trait::async_trait;
use autopatch_types::{SourceKind, VersionInfo};

/// Something that can list released versions of a component.
#[async_trait]
pub trait VersionSource: Send + Sync {
    /// Source name used in logs and poll reports
    fn name(&self) -> &str;

    /// Kind of system behind this source
    fn kind(&self) -> SourceKind;

    /// Fetch every version currently published for `component`
    async fn fetch_versions(&self, component: &str) -> Result<Vec<VersionInfo>>;
}

/// Tags like `latest` or `stable` are not versions.
pub(crate) fn looks_like_version(tag: &str) -> bool {
    tag.chars().any(|c| c.is_ascii_digit())
}
