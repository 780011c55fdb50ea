//! Building blocks shared by the relay worker and API: the payload model, validation,
//! duplicate suppression, pacing, retry policy, routing and delivery health.
pub mod consent;
pub mod delivery;
pub mod health;
pub mod idempotency;
pub mod limiter;
pub mod metrics;
pub mod payload;
pub mod retry;
pub mod router;
pub mod store;
pub mod validation;
