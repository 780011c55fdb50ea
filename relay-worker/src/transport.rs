use std::time;

use async_trait::async_trait;
use futures::StreamExt;
use http::StatusCode;
use reqwest::{header, Client};
use tracing::warn;

use crate::error::TransportError;

/// Response bodies are only kept as error context, so only their head is read.
pub const MAX_RESPONSE_BODY: usize = 8 * 1024;

pub const ATTEMPT_HEADER: &str = "X-Attempt";
pub const EVENT_TYPE_HEADER: &str = "X-Event-Type";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookRequest {
    pub url: String,
    pub body: String,
    pub attempt: u32,
    pub event_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookResponse {
    pub status: StatusCode,
    pub body: String,
}

/// A single POST to the webhook endpoint, without any retrying.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn post(&self, request: WebhookRequest) -> Result<WebhookResponse, TransportError>;
}

pub fn build_http_client(
    request_timeout: time::Duration,
    user_agent: &str,
) -> reqwest::Result<Client> {
    let mut headers = header::HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    reqwest::Client::builder()
        .default_headers(headers)
        .user_agent(user_agent)
        .timeout(request_timeout)
        .build()
}

pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WebhookTransport for HttpTransport {
    async fn post(&self, request: WebhookRequest) -> Result<WebhookResponse, TransportError> {
        let url: reqwest::Url = request
            .url
            .parse()
            .map_err(|e: url::ParseError| TransportError::Request(e.to_string()))?;

        let response = self
            .client
            .post(url)
            .header(ATTEMPT_HEADER, request.attempt.to_string())
            .header(EVENT_TYPE_HEADER, &request.event_type)
            .body(request.body)
            .send()
            .await
            .map_err(|e| TransportError::from(&e))?;

        let status = response.status();
        let body = match first_n_bytes_of_response(response, MAX_RESPONSE_BODY).await {
            Ok(body) => body,
            Err(e) => {
                warn!(status = status.as_u16(), error = %e, "failed to read webhook response body");
                String::new()
            }
        };

        Ok(WebhookResponse { status, body })
    }
}

/// Read up to `n` bytes of a response body, lossily decoded as UTF-8.
pub async fn first_n_bytes_of_response(
    response: reqwest::Response,
    n: usize,
) -> Result<String, reqwest::Error> {
    let mut body = response.bytes_stream();
    let mut buffer = Vec::with_capacity(n.min(1024));

    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        let remaining = n - buffer.len();

        if chunk.len() >= remaining {
            buffer.extend_from_slice(&chunk[..remaining]);
            break;
        }
        buffer.extend_from_slice(&chunk);
    }

    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
