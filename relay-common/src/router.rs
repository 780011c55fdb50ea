//! # Router
//!
//! Maps event types to the logical lane a payload is annotated with, and classifies
//! payloads into delivery priorities. Lanes are hints for the receiver's scenario
//! routing, not network destinations.
use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::payload::Payload;
use crate::validation::EventTypes;

/// Lane reported for any event type missing from the table.
pub const DEFAULT_LANE: &str = "default";

const HIGH_PRIORITY_EVENTS: &[&str] = &[
    "goal_team",
    "goal_opposition",
    "kick_off",
    "second_half_kick_off",
    "full_time",
    "red_card",
];

const MEDIUM_PRIORITY_EVENTS: &[&str] = &[
    "yellow_card",
    "sin_bin",
    "substitution",
    "half_time",
    "motm",
];

const CLUB_LANES: &[(&str, &str)] = &[
    ("goal_team", "live_match"),
    ("goal_opposition", "live_match"),
    ("yellow_card", "live_match"),
    ("red_card", "live_match"),
    ("sin_bin", "live_match"),
    ("substitution", "live_match"),
    ("motm", "live_match"),
    ("kick_off", "live_match"),
    ("half_time", "live_match"),
    ("second_half_kick_off", "live_match"),
    ("full_time", "live_match"),
    ("postponed", "match_admin"),
    ("countdown_3", "match_countdown"),
    ("countdown_2", "match_countdown"),
    ("countdown_1", "match_countdown"),
    ("weekly_fixtures", "weekly_content"),
    ("weekly_results", "weekly_content"),
    ("weekly_quotes", "weekly_content"),
    ("weekly_stats", "weekly_content"),
    ("weekly_throwback", "weekly_content"),
    ("monthly_fixtures", "monthly_summary"),
    ("monthly_results", "monthly_summary"),
    ("player_stats", "monthly_summary"),
    ("system_test", "system"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

/// Classify a payload by its event type. Unknown or missing event types are low priority.
pub fn priority_for(payload: &Payload) -> Priority {
    match payload.event_type() {
        Some(event_type) if HIGH_PRIORITY_EVENTS.contains(&event_type) => Priority::High,
        Some(event_type) if MEDIUM_PRIORITY_EVENTS.contains(&event_type) => Priority::Medium,
        _ => Priority::Low,
    }
}

/// Static `event_type -> lane` table, read-only once loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouterTable {
    lanes: HashMap<String, String>,
}

impl RouterTable {
    pub fn new(lanes: HashMap<String, String>) -> Self {
        Self { lanes }
    }

    /// The lane table covering every built-in club event type.
    pub fn club_defaults() -> Self {
        CLUB_LANES
            .iter()
            .map(|(event_type, lane)| (event_type.to_string(), lane.to_string()))
            .collect()
    }

    pub fn route_for(&self, event_type: &str) -> &str {
        self.lanes
            .get(event_type)
            .map(String::as_str)
            .unwrap_or(DEFAULT_LANE)
    }

    /// Report every configured event type that would fall through to the default lane.
    pub fn validate_coverage(&self, event_types: &EventTypes) -> CoverageReport {
        let missing_routes: Vec<String> = event_types
            .iter()
            .filter(|event_type| self.route_for(event_type) == DEFAULT_LANE)
            .map(str::to_owned)
            .collect();

        CoverageReport {
            valid: missing_routes.is_empty(),
            missing_routes,
            total_event_types: event_types.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.lanes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }
}

impl FromIterator<(String, String)> for RouterTable {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseRouterTableError(pub String);

/// Parse `event_type:lane` pairs separated by commas, e.g. `goal_team:live_match,motm:live_match`.
impl FromStr for RouterTable {
    type Err = ParseRouterTableError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut lanes = HashMap::new();

        for entry in s.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
            match entry.split_once(':') {
                Some((event_type, lane))
                    if !event_type.trim().is_empty() && !lane.trim().is_empty() =>
                {
                    lanes.insert(event_type.trim().to_owned(), lane.trim().to_owned());
                }
                _ => return Err(ParseRouterTableError(entry.to_owned())),
            }
        }

        Ok(Self::new(lanes))
    }
}

/// Result of checking the router table against the configured event types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub valid: bool,
    pub missing_routes: Vec<String>,
    pub total_event_types: usize,
}
