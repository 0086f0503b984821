use crate::manifest::ManifestError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Target platform identifier in `<arch>-<os>` form, e.g. `x86_64-linux`.
///
/// Only used to select applicable package recipes; nothing is cross-compiled.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Platform {
    arch: String,
    os: String,
}

impl Platform {
    pub fn parse(input: &str) -> Result<Self, ManifestError> {
        let trimmed = input.trim();
        let Some((arch, os)) = trimmed.split_once('-') else {
            return Err(ManifestError::InvalidPlatform(input.to_owned()));
        };
        let valid = |s: &str| {
            !s.is_empty()
                && s.bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
        };
        if !valid(arch) || !valid(os) {
            return Err(ManifestError::InvalidPlatform(input.to_owned()));
        }
        Ok(Self {
            arch: arch.to_ascii_lowercase(),
            os: os.to_ascii_lowercase(),
        })
    }

    /// The platform of the running process.
    pub fn host() -> Self {
        let os = match std::env::consts::OS {
            "macos" => "darwin",
            other => other,
        };
        Self {
            arch: std::env::consts::ARCH.to_owned(),
            os: os.to_owned(),
        }
    }

    pub fn arch(&self) -> &str {
        &self.arch
    }

    pub fn os(&self) -> &str {
        &self.os
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.arch, self.os)
    }
}

impl FromStr for Platform {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Platform {
    type Error = ManifestError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Platform> for String {
    fn from(p: Platform) -> Self {
        p.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_arch_and_os() {
        let p = Platform::parse("x86_64-linux").unwrap();
        assert_eq!(p.arch(), "x86_64");
        assert_eq!(p.os(), "linux");
        assert_eq!(p.to_string(), "x86_64-linux");
    }

    #[test]
    fn normalizes_case() {
        let p = Platform::parse("AArch64-Darwin").unwrap();
        assert_eq!(p.to_string(), "aarch64-darwin");
    }

    #[test]
    fn rejects_malformed() {
        assert!(Platform::parse("linux").is_err());
        assert!(Platform::parse("-linux").is_err());
        assert!(Platform::parse("x86_64-").is_err());
        assert!(Platform::parse("x86 64-linux").is_err());
    }

    #[test]
    fn host_round_trips() {
        let host = Platform::host();
        assert_eq!(Platform::parse(&host.to_string()).unwrap(), host);
    }
}
