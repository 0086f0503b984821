use crate::manifest::ManifestError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// An immutable reference to one exact revision of an upstream package index
/// or overlay, written `owner/repo/ref`.
///
/// The `ref` part may itself contain slashes (`nixos/nixpkgs/release/24.05`),
/// but no segment may be empty, `.` or `..`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SourcePin {
    owner: String,
    repo: String,
    rev: String,
}

impl SourcePin {
    pub fn parse(input: &str) -> Result<Self, ManifestError> {
        let invalid = |reason: &str| ManifestError::InvalidPin {
            pin: input.to_owned(),
            reason: reason.to_owned(),
        };

        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(invalid("pin is empty"));
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(invalid("pin contains whitespace"));
        }

        let mut parts = trimmed.splitn(3, '/');
        let (Some(owner), Some(repo), Some(rev)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid("expected 'owner/repo/ref'"));
        };

        for segment in trimmed.split('/') {
            if segment.is_empty() {
                return Err(invalid("empty path segment"));
            }
            if segment == "." || segment == ".." {
                return Err(invalid("relative path segment"));
            }
        }

        Ok(Self {
            owner: owner.to_owned(),
            repo: repo.to_owned(),
            rev: rev.to_owned(),
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    pub fn rev(&self) -> &str {
        &self.rev
    }

    /// Relative location of this pin's snapshot inside a store directory.
    pub fn relative_path(&self, extension: &str) -> PathBuf {
        let mut path = PathBuf::from(&self.owner);
        path.push(&self.repo);
        path.push(format!("{}.{extension}", self.rev));
        path
    }
}

impl fmt::Display for SourcePin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.owner, self.repo, self.rev)
    }
}

impl FromStr for SourcePin {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SourcePin {
    type Error = ManifestError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SourcePin> for String {
    fn from(pin: SourcePin) -> Self {
        pin.to_string()
    }
}
