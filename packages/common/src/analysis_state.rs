#[cfg(feature = "sea-orm")]
use sea_orm::prelude::StringLen;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Publication state of an analysis.
///
/// When the `sea-orm` feature is enabled, this enum can be used directly in SeaORM entities.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(
    feature = "sea-orm",
    derive(sea_orm::DeriveActiveEnum, sea_orm::EnumIter),
    sea_orm(rs_type = "String", db_type = "String(StringLen::None)")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisState {
    /// Registered but not yet verified against storage.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "UNPUBLISHED"))]
    Unpublished,
    /// Verified against storage and visible downstream.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "PUBLISHED"))]
    Published,
    /// Administratively retracted. Cannot be unpublished.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "SUPPRESSED"))]
    Suppressed,
}

impl AnalysisState {
    pub const ALL: &'static [AnalysisState] =
        &[Self::Unpublished, Self::Published, Self::Suppressed];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unpublished => "UNPUBLISHED",
            Self::Published => "PUBLISHED",
            Self::Suppressed => "SUPPRESSED",
        }
    }

    /// Parse a comma separated list of states, reporting every invalid entry at once.
    pub fn parse_list(s: &str) -> Result<Vec<AnalysisState>, ParseStateError> {
        let mut states = Vec::new();
        let mut invalid = Vec::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match part.parse::<AnalysisState>() {
                Ok(state) if !states.contains(&state) => states.push(state),
                Ok(_) => {}
                Err(_) => invalid.push(part.to_string()),
            }
        }
        if invalid.is_empty() {
            Ok(states)
        } else {
            Err(ParseStateError {
                invalid: invalid.join(", "),
            })
        }
    }
}

impl fmt::Display for AnalysisState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for AnalysisState {
    fn default() -> Self {
        Self::Unpublished
    }
}

/// Error when parsing an invalid state string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseStateError {
    invalid: String,
}

impl ParseStateError {
    pub fn invalid(&self) -> &str {
        &self.invalid
    }
}

impl fmt::Display for ParseStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid analysis state '{}'. Valid values: {}",
            self.invalid,
            AnalysisState::ALL
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

impl std::error::Error for ParseStateError {}

impl FromStr for AnalysisState {
    type Err = ParseStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UNPUBLISHED" => Ok(Self::Unpublished),
            "PUBLISHED" => Ok(Self::Published),
            "SUPPRESSED" => Ok(Self::Suppressed),
            _ => Err(ParseStateError {
                invalid: s.to_string(),
            }),
        }
    }
}
