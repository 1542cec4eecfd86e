//! Semantic versions as used by `semver` conditions.
use std::{cmp::Ordering, fmt, str::FromStr};

use crate::{Error, Result};

/// A [Semantic Versioning 2.0.0](https://semver.org/spec/v2.0.0.html) version.
///
/// Ordering follows semver precedence: major, minor, and patch compare numerically, a release is
/// greater than any of its pre-releases, and pre-release identifiers compare field by field.
/// Build metadata is parsed but ignored, so `1.1.3+build.1 == 1.1.3`.
#[derive(Debug, Clone)]
pub struct SemVer(::semver::Version);

impl SemVer {
    /// Parse `version`, ignoring surrounding whitespace.
    ///
    /// ```
    /// # use featureprobe::SemVer;
    /// assert!(SemVer::parse("1.0.0-alpha.1+sha.000100000").is_ok());
    /// assert!(SemVer::parse("1.0").is_err());
    /// ```
    pub fn parse(version: &str) -> Result<SemVer> {
        ::semver::Version::parse(version.trim())
            .map(SemVer)
            .map_err(|_| Error::InvalidSemVer(version.to_owned()))
    }

    #[allow(missing_docs)]
    pub fn major(&self) -> u64 {
        self.0.major
    }

    #[allow(missing_docs)]
    pub fn minor(&self) -> u64 {
        self.0.minor
    }

    #[allow(missing_docs)]
    pub fn patch(&self) -> u64 {
        self.0.patch
    }

    /// Pre-release part of the version, if any.
    pub fn pre_release(&self) -> Option<&str> {
        if self.0.pre.is_empty() {
            None
        } else {
            Some(self.0.pre.as_str())
        }
    }
}

impl FromStr for SemVer {
    type Err = Error;

    fn from_str(s: &str) -> Result<SemVer> {
        SemVer::parse(s)
    }
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl Ord for SemVer {
    fn cmp(&self, other: &Self) -> Ordering {
        // `semver::Version` also orders by build metadata, which semver precedence excludes.
        self.0
            .major
            .cmp(&other.0.major)
            .then(self.0.minor.cmp(&other.0.minor))
            .then(self.0.patch.cmp(&other.0.patch))
            .then_with(|| self.0.pre.cmp(&other.0.pre))
    }
}

impl PartialOrd for SemVer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SemVer {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SemVer {}
