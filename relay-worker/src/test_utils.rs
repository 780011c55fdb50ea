use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use http::StatusCode;

use crate::error::TransportError;
use crate::transport::{WebhookRequest, WebhookResponse, WebhookTransport};

/// Replays scripted outcomes in order and records every request it receives.
/// Once the script runs out every request gets a 200.
#[derive(Default)]
pub struct MockTransport {
    script: Mutex<VecDeque<Result<WebhookResponse, TransportError>>>,
    requests: Mutex<Vec<WebhookRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_statuses(statuses: &[u16]) -> Self {
        let transport = Self::new();
        for status in statuses {
            transport.push_status(*status);
        }
        transport
    }

    pub fn push_status(&self, status: u16) {
        let status = StatusCode::from_u16(status).expect("invalid status code in test script");
        self.push(Ok(WebhookResponse {
            status,
            body: status.canonical_reason().unwrap_or_default().to_owned(),
        }));
    }

    pub fn push_error(&self, error: TransportError) {
        self.push(Err(error));
    }

    pub fn requests(&self) -> Vec<WebhookRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn push(&self, outcome: Result<WebhookResponse, TransportError>) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(outcome);
    }
}

#[async_trait]
impl WebhookTransport for MockTransport {
    async fn post(&self, request: WebhookRequest) -> Result<WebhookResponse, TransportError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);

        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| {
                Ok(WebhookResponse {
                    status: StatusCode::OK,
                    body: "Accepted".to_owned(),
                })
            })
    }
}
