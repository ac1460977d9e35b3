//! HTTP transport for webhook messages

use super::message::WebhookMessage;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

/// Result of one post to a webhook
#[derive(Debug, Clone, PartialEq)]
pub enum TransportResponse {
    Delivered,
    /// 429 with the time to wait before the next attempt, if announced
    RateLimited(Option<Duration>),
    Rejected { status: u16, body: String },
}

#[derive(Debug, thiserror::Error)]
#[error("webhook request failed: {0}")]
pub struct TransportError(pub String);

#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn post(
        &self,
        url: &str,
        message: &WebhookMessage,
    ) -> Result<TransportResponse, TransportError>;
}

#[derive(Deserialize)]
struct RateLimitBody {
    retry_after: Option<f64>,
}

/// Wait time announced by a 429 response: the `Retry-After` header, then
/// `X-RateLimit-Reset-After`, then `retry_after` in the JSON body. All are
/// seconds, possibly fractional. Negative or unrepresentable values are
/// ignored.
pub fn retry_after(headers: &HeaderMap, body: &str) -> Option<Duration> {
    let header_secs = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<f64>().ok())
    };
    let secs = header_secs("retry-after")
        .or_else(|| header_secs("x-ratelimit-reset-after"))
        .or_else(|| {
            serde_json::from_str::<RateLimitBody>(body)
                .ok()
                .and_then(|b| b.retry_after)
        })?;
    Duration::try_from_secs_f64(secs).ok()
}

/// Posts JSON messages with reqwest
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WebhookTransport for HttpTransport {
    async fn post(
        &self,
        url: &str,
        message: &WebhookMessage,
    ) -> Result<TransportResponse, TransportError> {
        let response = self
            .client
            .post(url)
            .json(message)
            .send()
            .await
            .map_err(|e| TransportError(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(TransportResponse::Delivered);
        }

        let headers = response.headers().clone();
        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Ok(TransportResponse::RateLimited(retry_after(&headers, &body)));
        }
        Ok(TransportResponse::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}
