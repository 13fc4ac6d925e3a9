//! Version identifiers for provisioned services
//!
//! A version is an opaque token. The harness only compares versions for
//! equality and resolves the symbolic `latest` to a concrete release when the
//! test-bed tells it which release that is.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Token for the current development build
pub const DEV_BRANCH: &str = "dev";

/// Token for the latest released build
pub const LATEST: &str = "latest";

/// Version parse errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("empty version string")]
    Empty,
    #[error("version contains whitespace: {0:?}")]
    Whitespace(String),
}

/// Version of a server or client build
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Version {
    /// Current development build
    Dev,
    /// Latest released build
    Latest,
    /// A specific release
    Release(String),
}

impl Version {
    /// Returns true for the development build
    pub fn is_dev(&self) -> bool {
        matches!(self, Version::Dev)
    }

    /// Replace `latest` with a concrete release, if one is known
    pub fn resolve(&self, latest_release: Option<&str>) -> Version {
        match (self, latest_release) {
            (Version::Latest, Some(release)) => Version::Release(release.to_string()),
            _ => self.clone(),
        }
    }

    /// String form used in matrix values and launcher templates
    pub fn as_str(&self) -> &str {
        match self {
            Version::Dev => DEV_BRANCH,
            Version::Latest => LATEST,
            Version::Release(v) => v,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(VersionError::Empty);
        }
        if s.chars().any(char::is_whitespace) {
            return Err(VersionError::Whitespace(s.to_string()));
        }
        Ok(match s {
            DEV_BRANCH => Version::Dev,
            LATEST => Version::Latest,
            other => Version::Release(other.to_string()),
        })
    }
}

impl From<Version> for String {
    fn from(v: Version) -> Self {
        v.to_string()
    }
}

impl TryFrom<String> for Version {
    type Error = VersionError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}
