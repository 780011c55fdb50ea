use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use chrono::DateTime;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::payload::{Payload, EVENT_TYPE_FIELD, TIMESTAMP_FIELD};

/// Serialized payloads larger than this are refused before any side effect.
pub const MAX_PAYLOAD_BYTES: usize = 100_000;

const CLUB_EVENT_TYPES: &[&str] = &[
    "goal_team",
    "goal_opposition",
    "yellow_card",
    "red_card",
    "sin_bin",
    "substitution",
    "motm",
    "kick_off",
    "half_time",
    "second_half_kick_off",
    "full_time",
    "postponed",
    "countdown_3",
    "countdown_2",
    "countdown_1",
    "weekly_fixtures",
    "weekly_results",
    "weekly_quotes",
    "weekly_stats",
    "weekly_throwback",
    "monthly_fixtures",
    "monthly_results",
    "player_stats",
    "system_test",
];

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ValidationError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("invalid event type: {0}")]
    InvalidEventType(String),
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
    #[error("payload too large: {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: usize, limit: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    /// Serialized size in bytes, 0 if the payload could not be serialized.
    pub size: usize,
}

impl ValidationReport {
    /// All error messages joined, for log lines and `DeliveryResult::error`.
    pub fn summary(&self) -> String {
        self.errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// The enumeration of event types producers are allowed to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTypes(Vec<String>);

impl EventTypes {
    pub fn new(event_types: Vec<String>) -> Self {
        Self(event_types)
    }

    pub fn club_defaults() -> Self {
        Self(CLUB_EVENT_TYPES.iter().map(|s| s.to_string()).collect())
    }

    pub fn contains(&self, event_type: &str) -> bool {
        self.0.iter().any(|known| known == event_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for EventTypes {
    fn default() -> Self {
        Self::club_defaults()
    }
}

impl FromStr for EventTypes {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let event_types = s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect();

        Ok(Self(event_types))
    }
}

impl fmt::Display for EventTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(","))
    }
}

/// Structural and size checks run before a payload reaches any stateful component.
#[derive(Debug, Clone, Default)]
pub struct PayloadValidator {
    event_types: EventTypes,
}

impl PayloadValidator {
    pub fn new(event_types: EventTypes) -> Self {
        Self { event_types }
    }

    pub fn event_types(&self) -> &EventTypes {
        &self.event_types
    }

    /// Collect every problem with `payload`. Never mutates and performs no I/O.
    pub fn validate(&self, payload: &Payload) -> ValidationReport {
        let mut errors = Vec::new();

        match payload.get(EVENT_TYPE_FIELD) {
            None | Some(Value::Null) => errors.push(ValidationError::MissingField(EVENT_TYPE_FIELD)),
            Some(Value::String(event_type)) if self.event_types.contains(event_type) => {}
            Some(Value::String(event_type)) => {
                errors.push(ValidationError::InvalidEventType(event_type.clone()))
            }
            Some(other) => errors.push(ValidationError::InvalidEventType(other.to_string())),
        }

        match payload.get(TIMESTAMP_FIELD) {
            None | Some(Value::Null) => errors.push(ValidationError::MissingField(TIMESTAMP_FIELD)),
            Some(Value::String(timestamp)) => {
                if DateTime::parse_from_rfc3339(timestamp).is_err() {
                    errors.push(ValidationError::InvalidTimestamp(timestamp.clone()));
                }
            }
            Some(other) => errors.push(ValidationError::InvalidTimestamp(other.to_string())),
        }

        // A map of JSON values always serializes; 0 only if that ever changes.
        let size = serde_json::to_vec(payload).map(|b| b.len()).unwrap_or(0);
        if size > MAX_PAYLOAD_BYTES {
            errors.push(ValidationError::PayloadTooLarge {
                size,
                limit: MAX_PAYLOAD_BYTES,
            });
        }

        ValidationReport {
            valid: errors.is_empty(),
            errors,
            size,
        }
    }
}
