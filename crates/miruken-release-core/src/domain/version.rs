//! Version identifiers and the tag names derived from them.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::{ReleaseError, Result};

/// Prefix every published tag carries. Downstream consumers parse tags with it.
pub const TAG_PREFIX: &str = "v";

/// A semantic version computed from repository history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version(semver::Version);

impl Version {
    /// Parse the single-line output of the versioning tool.
    ///
    /// Trailing whitespace is ignored. Empty output, more than one line, or
    /// anything outside `MAJOR.MINOR.PATCH[-pre][+build]` is rejected.
    pub fn parse_tool_output(raw: &str) -> Result<Self> {
        let invalid = || ReleaseError::InvalidVersionOutput {
            raw: raw.to_string(),
        };

        let line = raw.trim_end();
        if line.is_empty() || line.contains(['\n', '\r']) {
            return Err(invalid());
        }

        semver::Version::parse(line)
            .map(Version)
            .map_err(|_| invalid())
    }

    pub fn semver(&self) -> &semver::Version {
        &self.0
    }

    /// The tag name for this version: `v<semver>`.
    pub fn tag_name(&self) -> TagName {
        TagName(format!("{TAG_PREFIX}{}", self.0))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A git tag name of the form `v<semver>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagName(String);

impl TagName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Fully qualified ref for this tag.
    pub fn git_ref(&self) -> String {
        format!("refs/tags/{}", self.0)
    }
}

impl fmt::Display for TagName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&Version> for TagName {
    fn from(version: &Version) -> Self {
        version.tag_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_newline_is_trimmed_and_prefixed() {
        let version = Version::parse_tool_output("1.4.2\n").unwrap();
        assert_eq!(version.tag_name().as_str(), "v1.4.2");
    }

    #[test]
    fn prerelease_output_is_accepted() {
        let version = Version::parse_tool_output("2.1.0-alpha.3").unwrap();
        assert_eq!(version.to_string(), "2.1.0-alpha.3");
        assert_eq!(version.tag_name().git_ref(), "refs/tags/v2.1.0-alpha.3");
    }

    #[test]
    fn two_lines_are_rejected() {
        let err = Version::parse_tool_output("1.4.2\n1.4.3\n").unwrap_err();
        assert!(matches!(err, ReleaseError::InvalidVersionOutput { raw } if raw == "1.4.2\n1.4.3\n"));
    }

    #[test]
    fn empty_output_is_rejected() {
        assert!(matches!(
            Version::parse_tool_output("  \n"),
            Err(ReleaseError::InvalidVersionOutput { .. })
        ));
    }

    #[test]
    fn non_semver_output_is_rejected() {
        for raw in ["v1.4.2", "1.4", "latest", "1.4.2 extra", " 1.4.2"] {
            assert!(
                Version::parse_tool_output(raw).is_err(),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn tag_name_serializes_as_plain_string() {
        let tag = Version::parse_tool_output("2.0.0").unwrap().tag_name();
        assert_eq!(serde_json::to_string(&tag).unwrap(), "\"v2.0.0\"");
    }
}
