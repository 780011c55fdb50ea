use serde::{Deserialize, Serialize};

/// Per-call overrides accepted by the send entry points.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SendOptions {
    pub max_retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub idempotency_key: Option<String>,
    pub skip_idempotency: bool,
    pub skip_rate_limit: bool,
}

impl SendOptions {
    pub fn skip_rate_limit(&self) -> Self {
        Self {
            skip_rate_limit: true,
            ..self.clone()
        }
    }
}

/// Why a send did not produce a plain delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    DuplicatePayload,
    ValidationError,
    ConfigurationError,
    ConsentDenied,
    RetriesExhausted,
    TerminalTransportError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<Reason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

impl DeliveryResult {
    pub fn delivered(response_code: u16, attempts: u32) -> Self {
        Self {
            success: true,
            response_code: Some(response_code),
            error: None,
            attempts,
            skipped: false,
            reason: None,
            idempotency_key: None,
        }
    }

    /// A send suppressed because the same content was already delivered.
    pub fn duplicate(idempotency_key: String) -> Self {
        Self {
            success: true,
            response_code: None,
            error: None,
            attempts: 0,
            skipped: true,
            reason: Some(Reason::DuplicatePayload),
            idempotency_key: Some(idempotency_key),
        }
    }

    pub fn failed(reason: Reason, error: String, attempts: u32) -> Self {
        Self {
            success: false,
            response_code: None,
            error: Some(error),
            attempts,
            skipped: false,
            reason: Some(reason),
            idempotency_key: None,
        }
    }

    pub fn with_response_code(mut self, response_code: Option<u16>) -> Self {
        self.response_code = response_code;
        self
    }

    pub fn with_idempotency_key(mut self, idempotency_key: Option<String>) -> Self {
        self.idempotency_key = idempotency_key;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub success: bool,
    pub results: Vec<DeliveryResult>,
    pub success_count: usize,
    pub total_count: usize,
}

impl BatchResult {
    pub fn from_results(results: Vec<DeliveryResult>) -> Self {
        let success_count = results.iter().filter(|r| r.success).count();
        let total_count = results.len();

        Self {
            success: success_count == total_count,
            results,
            success_count,
            total_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_delivered_serializes_without_skip_fields() {
        let result = DeliveryResult::delivered(200, 1);

        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"success": true, "response_code": 200, "attempts": 1})
        );
    }

    #[test]
    fn test_duplicate_serializes_reason() {
        let result = DeliveryResult::duplicate("MAKE_IDEMPOTENCY_goal_team_abc".to_owned());

        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({
                "success": true,
                "attempts": 0,
                "skipped": true,
                "reason": "duplicate_payload",
                "idempotency_key": "MAKE_IDEMPOTENCY_goal_team_abc",
            })
        );
    }

    #[test]
    fn test_batch_result_counts() {
        let results = vec![
            DeliveryResult::delivered(200, 1),
            DeliveryResult::duplicate("key".to_owned()),
            DeliveryResult::failed(Reason::TerminalTransportError, "404".to_owned(), 1),
        ];

        let batch = BatchResult::from_results(results);

        assert!(!batch.success);
        assert_eq!(batch.success_count, 2);
        assert_eq!(batch.total_count, 3);
    }

    #[test]
    fn test_empty_batch_is_successful() {
        let batch = BatchResult::from_results(Vec::new());

        assert!(batch.success);
        assert_eq!(batch.total_count, 0);
    }

    #[test]
    fn test_send_options_deserialize_with_defaults() {
        let options: SendOptions = serde_json::from_value(json!({"max_retries": 1})).unwrap();

        assert_eq!(options.max_retries, Some(1));
        assert!(!options.skip_idempotency);
        assert!(!options.skip_rate_limit);
        assert!(options.skip_rate_limit().skip_rate_limit);
    }
}
