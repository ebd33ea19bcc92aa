use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

static NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._-]+$").unwrap_or_else(|e| panic!("invalid name pattern: {e}"))
});

/// Names that can never be registered as analysis types.
pub const RESERVED_NAMES: &[&str] = &["registration"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisTypeError {
    #[error("The analysis type name '{0}' does not match the pattern ^[a-zA-Z0-9._-]+$")]
    InvalidName(String),
    #[error("The analysis type name '{0}' is reserved")]
    ReservedName(String),
    #[error("The analysis type version must be greater than 0, but was {0}")]
    InvalidVersion(i32),
    #[error("Malformed analysis type reference '{0}', expected '<name>:<version>'")]
    Malformed(String),
}

pub fn validate_name(name: &str) -> Result<(), AnalysisTypeError> {
    if NAME_PATTERN.is_match(name) {
        Ok(())
    } else {
        Err(AnalysisTypeError::InvalidName(name.to_string()))
    }
}

/// Like [`validate_name`], additionally rejecting reserved names.
pub fn validate_registrable_name(name: &str) -> Result<(), AnalysisTypeError> {
    validate_name(name)?;
    if RESERVED_NAMES.iter().any(|r| r.eq_ignore_ascii_case(name)) {
        return Err(AnalysisTypeError::ReservedName(name.to_string()));
    }
    Ok(())
}

pub fn validate_version(version: i32) -> Result<(), AnalysisTypeError> {
    if version > 0 {
        Ok(())
    } else {
        Err(AnalysisTypeError::InvalidVersion(version))
    }
}

/// Analysis type as named inside a submitted document. The version may be omitted, in which
/// case the latest registered version applies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnalysisTypeId {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i32>,
}

impl AnalysisTypeId {
    pub fn new(name: impl Into<String>, version: Option<i32>) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }
}

impl From<AnalysisTypeRef> for AnalysisTypeId {
    fn from(r: AnalysisTypeRef) -> Self {
        Self {
            name: r.name,
            version: Some(r.version),
        }
    }
}

/// A fully resolved `(name, version)` pair. Externally written as `"<name>:<version>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnalysisTypeRef {
    pub name: String,
    pub version: i32,
}

impl AnalysisTypeRef {
    pub fn new(name: impl Into<String>, version: i32) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }
}

impl fmt::Display for AnalysisTypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}

impl FromStr for AnalysisTypeRef {
    type Err = AnalysisTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, version) = s
            .split_once(':')
            .ok_or_else(|| AnalysisTypeError::Malformed(s.to_string()))?;
        validate_name(name)?;
        if version.is_empty() || !version.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AnalysisTypeError::Malformed(s.to_string()));
        }
        let version: i32 = version
            .parse()
            .map_err(|_| AnalysisTypeError::Malformed(s.to_string()))?;
        validate_version(version)?;
        Ok(Self::new(name, version))
    }
}
