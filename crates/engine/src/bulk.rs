//! Bulk dispatcher: one editorial email fanned out to many recipients.
//!
//! Recipients are split into ordered batches. Inside a batch every recipient is sent
//! concurrently; batches run one after another with `delay_ms` between them, which caps
//! in-flight transport calls at `batch_size`. Each recipient gets up to
//! `MAX_ATTEMPTS` tries with a linear backoff, and its outcome never affects others.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use courier_common::error::{CourierError, CourierResult};
use courier_common::types::Recipient;
use courier_notifier::{OutboundEmail, PersonalizedContent, RenderedContent, Transport};

/// One initial attempt plus two retries.
pub const MAX_ATTEMPTS: u32 = 3;

/// Wait after failed attempt `k` is `k * RETRY_BACKOFF_MS`.
pub const RETRY_BACKOFF_MS: u64 = 1000;

pub const MIN_BATCH_SIZE: usize = 1;
pub const MAX_BATCH_SIZE: usize = 100;
pub const DEFAULT_BATCH_SIZE: usize = 50;
pub const MAX_DELAY_MS: u64 = 10_000;
pub const DEFAULT_DELAY_MS: u64 = 1000;

/// Campaign content. `{{first_name}}`, `{{last_name}}` and `{{email}}` are
/// substituted per recipient.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BulkContent {
    pub subject: String,
    pub html: String,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct BulkOptions {
    pub batch_size: usize,
    pub delay_ms: u64,
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            delay_ms: DEFAULT_DELAY_MS,
        }
    }
}

impl BulkOptions {
    pub fn validate(&self) -> CourierResult<()> {
        if !(MIN_BATCH_SIZE..=MAX_BATCH_SIZE).contains(&self.batch_size) {
            return Err(CourierError::Validation(format!(
                "batch_size must be between {} and {}",
                MIN_BATCH_SIZE, MAX_BATCH_SIZE
            )));
        }
        if self.delay_ms > MAX_DELAY_MS {
            return Err(CourierError::Validation(format!(
                "delay_ms must be between 0 and {}",
                MAX_DELAY_MS
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkFailure {
    pub email: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkResult {
    pub total_users: usize,
    pub successful: usize,
    pub failed: usize,
    pub batches: usize,
    pub errors: Vec<BulkFailure>,
}

/// Waits between batches and between retries.
#[async_trait]
pub trait Pacer: Send + Sync {
    async fn pause(&self, duration: Duration);
}

pub struct TokioPacer;

#[async_trait]
impl Pacer for TokioPacer {
    async fn pause(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

pub struct BulkDispatcher {
    transport: Arc<dyn Transport>,
    pacer: Arc<dyn Pacer>,
}

impl BulkDispatcher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_pacer(transport, Arc::new(TokioPacer))
    }

    pub fn with_pacer(transport: Arc<dyn Transport>, pacer: Arc<dyn Pacer>) -> Self {
        Self { transport, pacer }
    }

    /// Send `content` to every recipient. Input problems are rejected before anything
    /// is sent; after that the call always returns a summary.
    pub async fn dispatch(
        &self,
        content: BulkContent,
        recipients: Vec<Recipient>,
        options: BulkOptions,
    ) -> CourierResult<BulkResult> {
        if content.subject.trim().is_empty() {
            return Err(CourierError::Validation("subject is required".to_string()));
        }
        if content.html.trim().is_empty() {
            return Err(CourierError::Validation("content is required".to_string()));
        }
        options.validate()?;

        if recipients.is_empty() {
            return Err(CourierError::NotFound(
                "No addressable recipients for this campaign".to_string(),
            ));
        }

        let template = RenderedContent {
            subject: content.subject,
            html: Some(content.html),
            text: content.text,
        }
        .complete()
        .and_then(|base| base.personalization())
        .map_err(|e| CourierError::Validation(e.to_string()))?;

        let mut result = BulkResult {
            total_users: recipients.len(),
            ..Default::default()
        };
        let batch_count = recipients.len().div_ceil(options.batch_size);

        tracing::info!(
            total_users = result.total_users,
            batch_size = options.batch_size,
            delay_ms = options.delay_ms,
            batches = batch_count,
            "Bulk dispatch started"
        );

        for (index, batch) in recipients.chunks(options.batch_size).enumerate() {
            let outcomes = join_all(batch.iter().map(|r| self.send_with_retry(&template, r))).await;

            for (recipient, outcome) in batch.iter().zip(outcomes) {
                match outcome {
                    Ok(()) => result.successful += 1,
                    Err(error) => {
                        result.failed += 1;
                        result.errors.push(BulkFailure {
                            email: recipient.email.clone(),
                            error,
                        });
                    }
                }
            }
            result.batches += 1;

            tracing::debug!(
                batch = index + 1,
                of = batch_count,
                successful = result.successful,
                failed = result.failed,
                "Bulk batch finished"
            );

            if index + 1 < batch_count {
                self.pacer
                    .pause(Duration::from_millis(options.delay_ms))
                    .await;
            }
        }

        tracing::info!(
            total_users = result.total_users,
            successful = result.successful,
            failed = result.failed,
            "Bulk dispatch finished"
        );

        Ok(result)
    }

    /// Returns the last error message when every attempt failed.
    async fn send_with_retry(
        &self,
        template: &PersonalizedContent,
        recipient: &Recipient,
    ) -> Result<(), String> {
        let content = template.render(recipient).map_err(|e| e.to_string())?;
        let email = OutboundEmail {
            to: recipient.email.clone(),
            subject: content.subject,
            html: content.html,
            text: content.text,
        };

        let mut last_error = String::new();
        for attempt in 1..=MAX_ATTEMPTS {
            match self.transport.deliver(&email).await {
                Ok(receipt) => {
                    tracing::debug!(
                        to = %email.to,
                        attempt,
                        external_id = %receipt.external_id,
                        "Bulk email sent"
                    );
                    return Ok(());
                }
                Err(e) => {
                    last_error = e.to_string();
                    tracing::warn!(to = %email.to, attempt, error = %last_error, "Bulk email attempt failed");
                    if attempt < MAX_ATTEMPTS {
                        self.pacer
                            .pause(Duration::from_millis(RETRY_BACKOFF_MS * attempt as u64))
                            .await;
                    }
                }
            }
        }

        Err(last_error)
    }
}
