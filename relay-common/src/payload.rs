//! # Payload
//!
//! The JSON object producers hand to the relay, and the enriched wire representation
//! that is POSTed to the webhook receiver.
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::router::{priority_for, RouterTable};

pub const EVENT_TYPE_FIELD: &str = "event_type";
pub const TIMESTAMP_FIELD: &str = "timestamp";
pub const PRIVACY_FIELD: &str = "privacy";

pub const SYSTEM_BLOCK: &str = "system";
pub const WEBHOOK_BLOCK: &str = "webhook";
pub const CLUB_BLOCK: &str = "club";

/// Top-level copies of the privacy flags, kept for receivers built against the old shape.
pub const LEGACY_ANONYMISE_FACES: &str = "anonymise_faces";
pub const LEGACY_USE_INITIALS_ONLY: &str = "use_initials_only";

/// Fields left out of fingerprints: they differ between sends of the same business content.
const VOLATILE_FIELDS: &[&str] = &[TIMESTAMP_FIELD, SYSTEM_BLOCK, WEBHOOK_BLOCK, CLUB_BLOCK];

/// An event produced upstream. Only `event_type` and `timestamp` have a fixed meaning,
/// everything else is opaque business content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Map<String, Value>);

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a payload for `event_type` stamped with `timestamp`.
    pub fn event(event_type: &str, timestamp: DateTime<Utc>) -> Self {
        Self::new()
            .with_field(EVENT_TYPE_FIELD, event_type)
            .with_field(
                TIMESTAMP_FIELD,
                timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            )
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn event_type(&self) -> Option<&str> {
        self.0.get(EVENT_TYPE_FIELD).and_then(Value::as_str)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Serialized business content with volatile fields removed.
    /// `serde_json::Map` keeps keys sorted, so equal content yields equal bytes.
    pub fn fingerprint(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut stable = self.0.clone();
        for field in VOLATILE_FIELDS {
            stable.remove(*field);
        }
        serde_json::to_vec(&stable)
    }
}

impl From<Map<String, Value>> for Payload {
    fn from(map: Map<String, Value>) -> Self {
        Payload(map)
    }
}

/// System metadata stamped on every outbound payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub version: String,
    pub environment: String,
}

/// Club metadata stamped on every outbound payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClubInfo {
    pub name: String,
    pub short_name: String,
    pub season: String,
}

/// The wire representation of a payload. Only produced by [`Enricher::enrich`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct EnrichedPayload(Map<String, Value>);

impl EnrichedPayload {
    pub fn event_type(&self) -> &str {
        self.0
            .get(EVENT_TYPE_FIELD)
            .and_then(Value::as_str)
            .unwrap_or("unknown")
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// The traceability token injected in the webhook block.
    pub fn signature(&self) -> Option<&str> {
        self.0
            .get(WEBHOOK_BLOCK)
            .and_then(|webhook| webhook.get("signature"))
            .and_then(Value::as_str)
    }

    pub fn to_body(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.0)
    }
}

/// Stamps system, delivery and club metadata onto payloads.
pub struct Enricher {
    system: SystemInfo,
    club: ClubInfo,
    session_id: String,
}

impl Enricher {
    pub fn new(system: SystemInfo, club: ClubInfo) -> Self {
        Self {
            system,
            club,
            session_id: Uuid::now_v7().to_string(),
        }
    }

    /// Identifies this process in the system block of every payload it sends.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Produce the wire representation of `payload`. The input is left untouched.
    pub fn enrich(&self, payload: &Payload, router: &RouterTable) -> EnrichedPayload {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let event_type = payload.event_type().unwrap_or_default();

        let mut body = payload.0.clone();
        body.insert(
            SYSTEM_BLOCK.to_owned(),
            json!({
                "version": self.system.version,
                "environment": self.system.environment,
                "timestamp": now,
                "session_id": self.session_id,
            }),
        );
        body.insert(
            WEBHOOK_BLOCK.to_owned(),
            json!({
                "sent_at": now,
                "attempt": 1,
                "priority": priority_for(payload),
                "router_lane": router.route_for(event_type),
                "signature": signature(),
            }),
        );
        body.insert(
            CLUB_BLOCK.to_owned(),
            json!({
                "name": self.club.name,
                "short_name": self.club.short_name,
                "season": self.club.season,
            }),
        );

        if let Some(Value::Object(privacy)) = payload.get(PRIVACY_FIELD) {
            body.insert(
                LEGACY_ANONYMISE_FACES.to_owned(),
                Value::Bool(any_flag(privacy, &["anonymise_faces", "blur_faces"])),
            );
            body.insert(
                LEGACY_USE_INITIALS_ONLY.to_owned(),
                Value::Bool(any_flag(privacy, &["use_initials_only", "initials_only"])),
            );
        }

        EnrichedPayload(body)
    }
}

/// Not an integrity signature: nothing downstream verifies it, it only lets a delivery
/// be traced across the receiver's logs.
fn signature() -> String {
    format!("sig_{}", Uuid::new_v4().simple())
}

fn any_flag(privacy: &Map<String, Value>, names: &[&str]) -> bool {
    names
        .iter()
        .any(|name| privacy.get(*name).and_then(Value::as_bool).unwrap_or(false))
}
