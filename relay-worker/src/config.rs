use std::str::FromStr;
use std::time;

use envconfig::Envconfig;
use relay_common::idempotency::IdempotencyConfig;
use relay_common::payload::{ClubInfo, SystemInfo};
use relay_common::retry::RetryPolicy;
use relay_common::router::RouterTable;
use relay_common::validation::EventTypes;

#[derive(Envconfig, Clone)]
pub struct Config {
    pub webhook_url: Option<NonEmptyString>,

    #[envconfig(default = "30000")]
    pub request_timeout: EnvMsDuration,

    #[envconfig(default = "3")]
    pub max_retries: u32,

    #[envconfig(default = "2000")]
    pub retry_delay: EnvMsDuration,

    #[envconfig(default = "true")]
    pub idempotency_enabled: bool,

    /// Seconds.
    #[envconfig(from = "IDEMPOTENCY_TTL", default = "86400")]
    pub idempotency_ttl_secs: u64,

    #[envconfig(default = "MAKE_IDEMPOTENCY_")]
    pub idempotency_key_prefix: String,

    #[envconfig(default = "1000")]
    pub rate_limit_interval: EnvMsDuration,

    #[envconfig(default = "5")]
    pub batch_size: usize,

    /// Falls back to the built-in club event types.
    pub event_types: Option<EventTypes>,

    /// Falls back to the built-in club lane table.
    pub router_lanes: Option<RouterTable>,

    /// When unset, idempotency records are only kept in this process.
    pub redis_url: Option<NonEmptyString>,

    #[envconfig(default = "1.0.0")]
    pub system_version: String,

    #[envconfig(default = "production")]
    pub environment: String,

    #[envconfig(default = "Town Tigers FC")]
    pub club_name: String,

    #[envconfig(default = "Tigers")]
    pub club_short_name: String,

    #[envconfig(default = "2025/26")]
    pub season: String,

    #[envconfig(default = "club-webhook-relay")]
    pub user_agent: String,
}

impl Config {
    /// The immutable snapshot a `DeliveryEngine` is built from.
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            webhook_url: self.webhook_url.as_ref().map(|url| url.0.clone()),
            retry_policy: RetryPolicy::new(self.max_retries, self.retry_delay.0),
            idempotency: IdempotencyConfig {
                enabled: self.idempotency_enabled,
                ttl: time::Duration::from_secs(self.idempotency_ttl_secs),
                key_prefix: self.idempotency_key_prefix.clone(),
            },
            rate_limit_interval: self.rate_limit_interval.0,
            batch_size: self.batch_size,
            event_types: self.event_types.clone().unwrap_or_default(),
            router: self
                .router_lanes
                .clone()
                .unwrap_or_else(RouterTable::club_defaults),
            system: SystemInfo {
                version: self.system_version.clone(),
                environment: self.environment.clone(),
            },
            club: ClubInfo {
                name: self.club_name.clone(),
                short_name: self.club_short_name.clone(),
                season: self.season.clone(),
            },
        }
    }
}

/// Everything the delivery engine needs, resolved from `Config` once at startup.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub webhook_url: Option<String>,
    pub retry_policy: RetryPolicy,
    pub idempotency: IdempotencyConfig,
    pub rate_limit_interval: time::Duration,
    pub batch_size: usize,
    pub event_types: EventTypes,
    pub router: RouterTable,
    pub system: SystemInfo,
    pub club: ClubInfo,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            webhook_url: None,
            retry_policy: RetryPolicy::default(),
            idempotency: IdempotencyConfig::default(),
            rate_limit_interval: time::Duration::from_millis(1000),
            batch_size: 5,
            event_types: EventTypes::club_defaults(),
            router: RouterTable::club_defaults(),
            system: SystemInfo {
                version: "1.0.0".to_owned(),
                environment: "production".to_owned(),
            },
            club: ClubInfo {
                name: "Town Tigers FC".to_owned(),
                short_name: "Tigers".to_owned(),
                season: "2025/26".to_owned(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EnvMsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;

        Ok(EnvMsDuration(time::Duration::from_millis(ms)))
    }
}

#[derive(Debug, Clone)]
pub struct NonEmptyString(pub String);

impl NonEmptyString {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct StringIsEmptyError;

impl FromStr for NonEmptyString {
    type Err = StringIsEmptyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            Err(StringIsEmptyError)
        } else {
            Ok(NonEmptyString(s.to_owned()))
        }
    }
}
