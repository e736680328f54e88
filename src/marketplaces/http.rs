//! Shared HTTP plumbing for marketplace adapters
//!
//! Every request goes through [`MarketplaceHttp::send_json`], which applies the
//! retry policy, maps HTTP statuses onto the error taxonomy and parses the body.

use crate::error::{AppError, Result};
use crate::marketplaces::rate_limiter::BatchPacer;
use crate::marketplaces::retry::RetryPolicy;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;

/// Connection settings shared by all adapters
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub batch_delay: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            batch_delay: Duration::from_millis(200),
        }
    }
}

/// HTTP client with retry policy and batch pacer
pub struct MarketplaceHttp {
    client: Client,
    retry: RetryPolicy,
    pacer: BatchPacer,
}

impl MarketplaceHttp {
    pub fn new(settings: &HttpSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            retry: settings.retry.clone(),
            pacer: BatchPacer::new(settings.batch_delay),
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn pacer(&self) -> &BatchPacer {
        &self.pacer
    }

    /// Send the request built by `build` under `policy` and parse a JSON body.
    ///
    /// `build` is called once per attempt.
    pub async fn send_json<F>(
        &self,
        account: &str,
        label: &str,
        policy: &RetryPolicy,
        build: F,
    ) -> Result<Value>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let build = &build;
        let client = &self.client;

        policy
            .run(label, move || async move {
                let response = build(client).send().await?;
                read_json(account, label, response).await
            })
            .await
    }
}

async fn read_json(account: &str, label: &str, response: Response) -> Result<Value> {
    let status = response.status();
    let retry_after_ms = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|secs| secs * 1000);

    let body = response.text().await?;

    if status.is_success() {
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        return serde_json::from_str(&body)
            .map_err(|e| AppError::MalformedResponse(format!("{}: {}", label, e)));
    }

    Err(classify_status(account, label, status, retry_after_ms, &body))
}

/// Map a non-success HTTP status onto the error taxonomy
pub fn classify_status(
    account: &str,
    label: &str,
    status: StatusCode,
    retry_after_ms: Option<u64>,
    body: &str,
) -> AppError {
    let detail = error_detail(body);

    match status.as_u16() {
        401 | 403 => AppError::PermissionScope {
            account: account.to_string(),
            message: format!("{} rejected the API key ({}): {}", label, status, detail),
        },
        408 | 429 | 500..=599 => AppError::Transient {
            message: format!("{} failed ({}): {}", label, status, detail),
            retry_after_ms,
        },
        _ => AppError::Marketplace(format!("{} failed ({}): {}", label, status, detail)),
    }
}

/// Pull the human-readable message out of an error body
fn error_detail(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        for key in ["detail", "title", "message", "errorText", "error"] {
            if let Some(text) = json.get(key).and_then(Value::as_str) {
                if !text.is_empty() {
                    return text.to_string();
                }
            }
        }
    }

    let trimmed = body.trim();
    if trimmed.chars().count() > 200 {
        format!("{}...", trimmed.chars().take(200).collect::<String>())
    } else {
        trimmed.to_string()
    }
}
