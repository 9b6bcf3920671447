//! Package index abstraction and wire types.
//!
//! The package manager resolves releases, dependency metadata, and
//! distribution files through the [`PackageIndex`] trait; [`PyPiClient`] is
//! the real implementation over the PyPI JSON API.

mod client;
pub mod requirement;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use client::{DEFAULT_INDEX_URL, PyPiClient};
pub use requirement::Requirement;

/// Normalize a distribution name per PEP 503: lowercase, runs of `-`, `_`
/// and `.` collapse to a single `-`.
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut prev_sep = false;
    for ch in name.chars() {
        if ch == '-' || ch == '_' || ch == '.' {
            if !prev_sep {
                out.push('-');
            }
            prev_sep = true;
        } else {
            out.push(ch.to_ascii_lowercase());
            prev_sep = false;
        }
    }
    out
}

/// Kind of distribution file published on the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistKind {
    Wheel,
    Sdist,
}

/// One downloadable file of a release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistFile {
    pub filename: String,
    pub url: String,
    pub kind: DistKind,
}

impl DistFile {
    /// True for wheels that run on any platform under Python 3.
    pub fn is_pure_wheel(&self) -> bool {
        self.kind == DistKind::Wheel && self.filename.ends_with("-py3-none-any.whl")
    }
}

/// One release of a distribution, with its direct requirements.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReleaseInfo {
    /// Normalized distribution name.
    pub name: String,
    pub version: String,
    /// Direct requirements that apply to a plain install.
    pub requires: Vec<Requirement>,
    pub files: Vec<DistFile>,
}

impl ReleaseInfo {
    /// Pick the file to install: a pure wheel when available, then any
    /// wheel, then an sdist.
    pub fn pick_file(&self) -> Option<&DistFile> {
        self.files
            .iter()
            .find(|f| f.is_pure_wheel())
            .or_else(|| self.files.iter().find(|f| f.kind == DistKind::Wheel))
            .or_else(|| self.files.iter().find(|f| f.kind == DistKind::Sdist))
    }
}

/// A package index serving release metadata and distribution files.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PackageIndex: Send + Sync {
    /// Base URL of the index API.
    fn index_url(&self) -> &str;

    /// Fetch the latest release of a distribution.
    async fn latest(&self, name: &str) -> Result<ReleaseInfo>;

    /// Fetch a specific release of a distribution.
    async fn release(&self, name: &str, version: &str) -> Result<ReleaseInfo>;

    /// Download a distribution file.
    async fn download(&self, file: &DistFile) -> Result<Vec<u8>>;
}
