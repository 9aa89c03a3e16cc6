//! Outbound side of the notification pipeline: content resolution and email transport.

pub mod content;
pub mod resend;
pub mod templates;
pub mod transport;

pub use content::{EmailContent, PersonalizedContent, RenderedContent};
pub use resend::{ResendConfig, ResendTransport};
pub use templates::{BuiltinTemplates, TemplateResolver};
pub use transport::{DeliveryReceipt, OutboundEmail, Transport, TransportError};
