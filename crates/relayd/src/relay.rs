//! Relay state model.
//!
//! A relay is commanded to one of two states. Commands arrive as free-form
//! strings from devices and web clients; [`RelayState::from_candidate`] is the
//! one place where such a string becomes a typed state.

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use strum::Display;
use strum::EnumString;
use strum::IntoStaticStr;

/// Raised when a candidate value is not a recognized relay state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("relay state is missing")]
    Missing,

    #[error("invalid relay state: {0:?}")]
    Invalid(String),
}

/// Commanded state of a relay.
///
/// Parsing ignores ASCII case; the canonical form is lowercase.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum RelayState {
    On,
    Off,
}

impl RelayState {
    /// Normalize an optional candidate taken from a query string or a body.
    pub fn from_candidate(candidate: Option<&str>) -> Result<Self, ValidationError> {
        let candidate = candidate.ok_or(ValidationError::Missing)?;
        candidate
            .parse()
            .map_err(|_| ValidationError::Invalid(candidate.to_string()))
    }

    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// Byte written to the serial bridge for this state.
    pub fn serial_byte(&self) -> u8 {
        match self {
            RelayState::On => b'1',
            RelayState::Off => b'0',
        }
    }
}

/// A single accepted command. Records are never modified after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRecord {
    pub state: RelayState,
    pub timestamp: DateTime<Utc>,
}

impl StateRecord {
    /// Create a record stamped with the current time.
    pub fn new(state: RelayState) -> Self {
        Self::at(state, Utc::now())
    }

    pub fn at(state: RelayState, timestamp: DateTime<Utc>) -> Self {
        Self { state, timestamp }
    }
}
