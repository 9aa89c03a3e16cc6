//! Transport client seam.
//!
//! The pipeline does not distinguish network, auth or provider errors: every
//! `TransportError` is a delivery failure surfaced to the caller.

use async_trait::async_trait;
use thiserror::Error;

/// A single email handed to the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Provider acknowledgement for an accepted email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub external_id: String,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider rejected email ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Transport not configured: {0}")]
    NotConfigured(String),

    #[error("{0}")]
    Other(String),
}

/// Anything that can put an email on the wire.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn deliver(&self, email: &OutboundEmail) -> Result<DeliveryReceipt, TransportError>;

    /// Provider name for logging.
    fn name(&self) -> &'static str;
}
