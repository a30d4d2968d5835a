//! Build metadata served on `GET /`
//!
//! Values are injected at compile time through the compiler's environment:
//! - `VERSIOND_VERSION` (default `dev`)
//! - `VERSIOND_COMMIT` (default `none`)
//! - `VERSIOND_BUILD_TIME` (default `unknown`)

use serde::{Deserialize, Serialize};

/// Fallback version when none was injected at build time
pub const DEFAULT_VERSION: &str = "dev";

/// Fallback commit when none was injected at build time
pub const DEFAULT_COMMIT: &str = "none";

/// Fallback build time when none was injected at build time
pub const DEFAULT_BUILD_TIME: &str = "unknown";

/// Immutable build metadata
///
/// Built once at startup and handed to the router as state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub commit: String,
    pub build_time: String,
}

impl VersionInfo {
    /// Create version info from explicit values
    pub fn new(
        version: impl Into<String>,
        commit: impl Into<String>,
        build_time: impl Into<String>,
    ) -> Self {
        Self {
            version: version.into(),
            commit: commit.into(),
            build_time: build_time.into(),
        }
    }

    /// Version info baked into this binary at compile time
    pub fn from_build() -> Self {
        Self::new(
            option_env!("VERSIOND_VERSION").unwrap_or(DEFAULT_VERSION),
            option_env!("VERSIOND_COMMIT").unwrap_or(DEFAULT_COMMIT),
            option_env!("VERSIOND_BUILD_TIME").unwrap_or(DEFAULT_BUILD_TIME),
        )
    }
}

#[cfg(test)]
#[path = "version_test.rs"]
mod tests;
