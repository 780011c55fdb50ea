//! # Idempotency
//!
//! Suppresses repeat deliveries of the same business content within a TTL window.
//!
//! Records live in two tiers: a process-local `moka` cache with a short TTL that is
//! allowed to lose entries, and a [`DurableStore`] that holds the authoritative record
//! for the full TTL. The tiers are checked in order and written together, without any
//! check-and-set, so two near-simultaneous sends of the same content may both go out.
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;
use uuid::Uuid;

use crate::delivery::SendOptions;
use crate::payload::Payload;
use crate::store::DurableStore;

/// The fast tier never holds an entry longer than this, whatever the configured TTL.
pub const FAST_CACHE_TTL_CEILING: Duration = Duration::from_secs(6 * 60 * 60);

const FAST_CACHE_CAPACITY: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyConfig {
    pub enabled: bool,
    pub ttl: Duration,
    pub key_prefix: String,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(24 * 60 * 60),
            key_prefix: "MAKE_IDEMPOTENCY_".to_owned(),
        }
    }
}

/// What the durable tier holds for each delivered key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: String,
    pub expires_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

pub struct IdempotencyStore {
    config: IdempotencyConfig,
    fast: Cache<String, ()>,
    durable: Arc<dyn DurableStore>,
}

impl IdempotencyStore {
    pub fn new(config: IdempotencyConfig, durable: Arc<dyn DurableStore>) -> Self {
        let fast = Cache::builder()
            .max_capacity(FAST_CACHE_CAPACITY)
            .time_to_live(config.ttl.min(FAST_CACHE_TTL_CEILING))
            .build();

        Self {
            config,
            fast,
            durable,
        }
    }

    pub fn config(&self) -> &IdempotencyConfig {
        &self.config
    }

    /// The key a send of `payload` is tracked under, or `None` when it must not be tracked.
    pub fn resolve_key(&self, payload: &Payload, options: &SendOptions) -> Option<String> {
        if !self.config.enabled || options.skip_idempotency {
            return None;
        }

        if let Some(explicit) = &options.idempotency_key {
            if explicit.starts_with(&self.config.key_prefix) {
                return Some(explicit.clone());
            }
            return Some(format!("{}{}", self.config.key_prefix, explicit));
        }

        Some(self.fingerprint_key(payload))
    }

    /// `{prefix}{event_type}_{hex sha256}` of the payload's business content.
    pub fn fingerprint_key(&self, payload: &Payload) -> String {
        let event_type = payload.event_type().unwrap_or("unknown");

        match payload.fingerprint() {
            Ok(fingerprint) => {
                let digest = Sha256::digest(&fingerprint);
                format!("{}{}_{:x}", self.config.key_prefix, event_type, digest)
            }
            Err(e) => {
                warn!(
                    event_type,
                    error = %e,
                    "failed to fingerprint payload, falling back to a random idempotency key"
                );
                format!(
                    "{}{}_{}",
                    self.config.key_prefix,
                    event_type,
                    Uuid::new_v4().simple()
                )
            }
        }
    }

    /// Whether `key` was already delivered within its TTL. Store failures are reported as
    /// "not a duplicate": a repeat delivery is preferred over a dropped one.
    pub async fn is_duplicate(&self, key: &str) -> bool {
        if self.fast.contains_key(key) {
            return true;
        }

        let raw = match self.durable.get(key.to_owned()).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return false,
            Err(e) => {
                warn!(key, error = %e, "failed to read idempotency record");
                return false;
            }
        };

        let record: IdempotencyRecord = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(e) => {
                warn!(key, error = %e, "discarding unreadable idempotency record");
                self.delete_durable(key).await;
                return false;
            }
        };

        if record.is_stale(Utc::now()) {
            self.delete_durable(key).await;
            return false;
        }

        true
    }

    /// Record `key` as delivered in both tiers.
    pub async fn mark_processed(&self, key: &str) {
        self.fast.insert(key.to_owned(), ());

        let expires_at = chrono::Duration::from_std(self.config.ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let record = IdempotencyRecord {
            key: key.to_owned(),
            expires_at,
        };

        let value = match serde_json::to_string(&record) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "failed to serialize idempotency record");
                return;
            }
        };

        if let Err(e) = self
            .durable
            .set(key.to_owned(), value, self.config.ttl)
            .await
        {
            warn!(key, error = %e, "failed to write idempotency record");
        }
    }

    async fn delete_durable(&self, key: &str) {
        if let Err(e) = self.durable.delete(key.to_owned()).await {
            warn!(key, error = %e, "failed to delete stale idempotency record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    use crate::store::{InMemoryStore, StoreError};

    struct FailingStore;

    #[async_trait]
    impl DurableStore for FailingStore {
        async fn get(&self, _key: String) -> Result<Option<String>, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_owned()))
        }

        async fn set(&self, _key: String, _value: String, _ttl: Duration) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".to_owned()))
        }

        async fn delete(&self, _key: String) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".to_owned()))
        }
    }

    fn goal(timestamp: &str) -> Payload {
        Payload::new()
            .with_field("event_type", "goal_team")
            .with_field("timestamp", timestamp)
            .with_field("minute", 10)
            .with_field("player", "A")
    }

    fn store_with(config: IdempotencyConfig) -> (IdempotencyStore, InMemoryStore) {
        let durable = InMemoryStore::new();
        let store = IdempotencyStore::new(config, Arc::new(durable.clone()));
        (store, durable)
    }

    #[test]
    fn test_fingerprint_key_shape() {
        let (store, _) = store_with(IdempotencyConfig::default());

        let key = store.fingerprint_key(&goal("2025-01-01T12:00:00Z"));

        let digest = key
            .strip_prefix("MAKE_IDEMPOTENCY_goal_team_")
            .expect("key is missing its namespace");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_fingerprint_key_ignores_timestamp() {
        let (store, _) = store_with(IdempotencyConfig::default());

        assert_eq!(
            store.fingerprint_key(&goal("2025-01-01T12:00:00Z")),
            store.fingerprint_key(&goal("2025-01-01T12:00:30Z"))
        );
    }

    #[test]
    fn test_resolve_key_when_disabled_or_skipped() {
        let (disabled, _) = store_with(IdempotencyConfig {
            enabled: false,
            ..Default::default()
        });
        assert_eq!(
            disabled.resolve_key(&goal("2025-01-01T12:00:00Z"), &SendOptions::default()),
            None
        );

        let (enabled, _) = store_with(IdempotencyConfig::default());
        let skip = SendOptions {
            skip_idempotency: true,
            ..Default::default()
        };
        assert_eq!(enabled.resolve_key(&goal("2025-01-01T12:00:00Z"), &skip), None);
    }

    #[test]
    fn test_resolve_key_prefixes_explicit_keys_once() {
        let (store, _) = store_with(IdempotencyConfig::default());
        let payload = goal("2025-01-01T12:00:00Z");

        let explicit = SendOptions {
            idempotency_key: Some("fixture-42".to_owned()),
            ..Default::default()
        };
        assert_eq!(
            store.resolve_key(&payload, &explicit),
            Some("MAKE_IDEMPOTENCY_fixture-42".to_owned())
        );

        let already_prefixed = SendOptions {
            idempotency_key: Some("MAKE_IDEMPOTENCY_fixture-42".to_owned()),
            ..Default::default()
        };
        assert_eq!(
            store.resolve_key(&payload, &already_prefixed),
            Some("MAKE_IDEMPOTENCY_fixture-42".to_owned())
        );
    }

    #[tokio::test]
    async fn test_marked_key_is_duplicate() {
        let (store, durable) = store_with(IdempotencyConfig::default());
        let key = store.fingerprint_key(&goal("2025-01-01T12:00:00Z"));

        assert!(!store.is_duplicate(&key).await);
        store.mark_processed(&key).await;

        assert!(store.is_duplicate(&key).await);
        assert_eq!(durable.len().await, 1);

        let repeat = store.fingerprint_key(&goal("2025-01-01T12:00:45Z"));
        assert!(store.is_duplicate(&repeat).await);
    }

    #[tokio::test]
    async fn test_durable_tier_is_consulted_after_fast_tier() {
        let durable = InMemoryStore::new();
        let first = IdempotencyStore::new(IdempotencyConfig::default(), Arc::new(durable.clone()));
        let second = IdempotencyStore::new(IdempotencyConfig::default(), Arc::new(durable));

        first.mark_processed("MAKE_IDEMPOTENCY_goal_team_abc").await;

        assert!(second.is_duplicate("MAKE_IDEMPOTENCY_goal_team_abc").await);
    }

    #[tokio::test]
    async fn test_repeat_after_ttl_is_new() {
        let (store, _) = store_with(IdempotencyConfig {
            ttl: Duration::from_millis(300),
            ..Default::default()
        });

        store.mark_processed("MAKE_IDEMPOTENCY_goal_team_abc").await;
        assert!(store.is_duplicate("MAKE_IDEMPOTENCY_goal_team_abc").await);

        tokio::time::sleep(Duration::from_millis(500)).await;

        assert!(!store.is_duplicate("MAKE_IDEMPOTENCY_goal_team_abc").await);
    }

    #[tokio::test]
    async fn test_stale_durable_record_is_deleted() {
        let (store, durable) = store_with(IdempotencyConfig::default());
        let stale = IdempotencyRecord {
            key: "MAKE_IDEMPOTENCY_goal_team_abc".to_owned(),
            expires_at: Utc::now() - chrono::Duration::seconds(5),
        };
        durable
            .set(
                stale.key.clone(),
                serde_json::to_string(&stale).unwrap(),
                Duration::from_secs(60),
            )
            .await
            .unwrap();

        assert!(!store.is_duplicate(&stale.key).await);
        assert!(durable.is_empty().await);
    }

    #[tokio::test]
    async fn test_unreadable_durable_record_is_discarded() {
        let (store, durable) = store_with(IdempotencyConfig::default());
        durable
            .set(
                "MAKE_IDEMPOTENCY_goal_team_abc".to_owned(),
                json!({"unexpected": true}).to_string(),
                Duration::from_secs(60),
            )
            .await
            .unwrap();

        assert!(!store.is_duplicate("MAKE_IDEMPOTENCY_goal_team_abc").await);
        assert!(durable.is_empty().await);
    }

    #[tokio::test]
    async fn test_store_errors_are_not_duplicates() {
        let store = IdempotencyStore::new(IdempotencyConfig::default(), Arc::new(FailingStore));

        assert!(!store.is_duplicate("MAKE_IDEMPOTENCY_goal_team_abc").await);

        // The durable write fails, the fast tier still remembers the key.
        store.mark_processed("MAKE_IDEMPOTENCY_goal_team_abc").await;
        assert!(store.is_duplicate("MAKE_IDEMPOTENCY_goal_team_abc").await);
    }

    #[test]
    fn test_fast_tier_ttl_is_capped() {
        let (long, _) = store_with(IdempotencyConfig {
            ttl: Duration::from_secs(24 * 60 * 60),
            ..Default::default()
        });
        assert_eq!(
            long.fast.policy().time_to_live(),
            Some(FAST_CACHE_TTL_CEILING)
        );

        let (short, _) = store_with(IdempotencyConfig {
            ttl: Duration::from_secs(1),
            ..Default::default()
        });
        assert_eq!(
            short.fast.policy().time_to_live(),
            Some(Duration::from_secs(1))
        );
    }

    #[tokio::test]
    async fn test_unbounded_ttl_is_recorded() {
        let (store, durable) = store_with(IdempotencyConfig {
            ttl: Duration::from_secs(u64::MAX),
            ..Default::default()
        });

        store.mark_processed("MAKE_IDEMPOTENCY_goal_team_abc").await;

        assert_eq!(durable.len().await, 1);
        assert!(store.is_duplicate("MAKE_IDEMPOTENCY_goal_team_abc").await);
    }
}
