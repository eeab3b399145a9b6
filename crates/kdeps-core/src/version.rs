use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use kdeps_error::{Error, ErrorCode};

/// A three-segment version (major.minor.patch), compared purely numerically
/// per segment — no semver prerelease/build metadata awareness.
///
/// Missing trailing segments are treated as zero, matching
/// [`findLatest`](crate::reference)'s zero-padded comparison rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version {
    /// Major segment.
    pub major: u64,
    /// Minor segment.
    pub minor: u64,
    /// Patch segment.
    pub patch: u64,
}

impl Version {
    /// Construct a version from its three numeric segments.
    #[must_use]
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// The zero version, `0.0.0`.
    #[must_use]
    pub fn zero() -> Self {
        Self::new(0, 0, 0)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = Error;

    /// Parses 1-3 dot-separated numeric segments, zero-padding any missing
    /// trailing segments. Rejects more than three segments or non-numeric
    /// segments.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.is_empty() || parts.len() > 3 {
            return Err(Error::new(
                ErrorCode::IdentityMalformedRef,
                format!("version '{s}' must have 1-3 dot-separated segments"),
            )
            .with_context("raw", s));
        }
        let mut segments = [0u64; 3];
        for (i, part) in parts.iter().enumerate() {
            segments[i] = part.parse::<u64>().map_err(|_| {
                Error::new(
                    ErrorCode::IdentityMalformedRef,
                    format!("version segment '{part}' is not a non-negative integer"),
                )
                .with_context("raw", s)
            })?;
        }
        Ok(Self::new(segments[0], segments[1], segments[2]))
    }
}
