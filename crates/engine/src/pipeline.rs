//! Send pipeline: the single choke point for every individual notification.
//!
//! For each request:
//! 1. Single-shot types consult the ledger and return an existing active event untouched
//! 2. Resolve content (explicit content wins over the template resolver)
//! 3. Insert a `queued` ledger row
//! 4. Call the transport, then move the row to `sent` or `failed`

use std::sync::Arc;

use uuid::Uuid;

use courier_common::error::{CourierError, CourierResult};
use courier_common::types::{
    DeliveryStatus, NewNotificationEvent, NotificationEvent, NotificationType,
};
use courier_notifier::{EmailContent, OutboundEmail, RenderedContent, TemplateResolver, Transport};

use crate::ledger::{EventLedger, Insertion};

/// One notification for one recipient.
#[derive(Debug, Clone)]
pub struct SendRequest {
    pub user_id: Uuid,
    pub recipient_address: String,
    pub notification_type: NotificationType,
    /// Bypasses the template resolver when present.
    pub content: Option<RenderedContent>,
    pub payload: serde_json::Value,
}

pub struct SendPipeline {
    ledger: Arc<dyn EventLedger>,
    templates: Arc<dyn TemplateResolver>,
    transport: Arc<dyn Transport>,
}

impl SendPipeline {
    pub fn new(
        ledger: Arc<dyn EventLedger>,
        templates: Arc<dyn TemplateResolver>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            ledger,
            templates,
            transport,
        }
    }

    /// Deliver one notification.
    ///
    /// A returned event in `queued` or `sent` that this call did not create means the
    /// notification was already handled; callers treat it as success.
    pub async fn send(&self, request: SendRequest) -> CourierResult<NotificationEvent> {
        let notification_type = request.notification_type;

        if notification_type.is_single_shot()
            && let Some(existing) = self
                .ledger
                .find_active_event(request.user_id, notification_type)
                .await?
        {
            tracing::debug!(
                user_id = %request.user_id,
                notification_type = %notification_type,
                event_id = %existing.id,
                status = %existing.status,
                "Single-shot notification already handled, skipping"
            );
            return Ok(existing);
        }

        if request.recipient_address.trim().is_empty() {
            return Err(CourierError::Validation(format!(
                "Recipient address is required for user {}",
                request.user_id
            )));
        }

        let content = self.resolve_content(&request)?;

        let event = match self
            .ledger
            .create(NewNotificationEvent {
                user_id: request.user_id,
                notification_type,
                recipient_address: request.recipient_address.clone(),
                subject: content.subject.clone(),
                payload: request.payload.clone(),
            })
            .await?
        {
            Insertion::Created(event) => event,
            Insertion::Existing(existing) => {
                tracing::debug!(
                    user_id = %request.user_id,
                    notification_type = %notification_type,
                    event_id = %existing.id,
                    "Lost single-shot race, returning existing event"
                );
                return Ok(existing);
            }
        };

        let email = OutboundEmail {
            to: request.recipient_address,
            subject: content.subject,
            html: content.html,
            text: content.text,
        };

        match self.transport.deliver(&email).await {
            Ok(receipt) => {
                if let Err(e) = self.ledger.mark_sent(event.id, &receipt.external_id).await {
                    tracing::error!(
                        event_id = %event.id,
                        error = %e,
                        "Failed to record sent status"
                    );
                }

                tracing::info!(
                    event_id = %event.id,
                    user_id = %event.user_id,
                    notification_type = %notification_type,
                    transport = self.transport.name(),
                    external_id = %receipt.external_id,
                    "Notification sent"
                );

                Ok(NotificationEvent {
                    status: DeliveryStatus::Sent,
                    external_message_id: Some(receipt.external_id),
                    ..event
                })
            }
            Err(transport_err) => {
                let message = transport_err.to_string();
                if let Err(e) = self.ledger.mark_failed(event.id, &message).await {
                    tracing::error!(
                        event_id = %event.id,
                        error = %e,
                        "Failed to record failed status"
                    );
                }

                tracing::warn!(
                    event_id = %event.id,
                    user_id = %event.user_id,
                    notification_type = %notification_type,
                    transport = self.transport.name(),
                    error = %message,
                    "Notification delivery failed"
                );

                Err(CourierError::Delivery(message))
            }
        }
    }

    /// Whether a request without explicit content can resolve for this type.
    pub fn has_template(&self, notification_type: NotificationType) -> bool {
        self.templates.has_template(notification_type)
    }

    fn resolve_content(&self, request: &SendRequest) -> CourierResult<EmailContent> {
        let rendered = match &request.content {
            Some(explicit) => explicit.clone(),
            None => self
                .templates
                .resolve(request.notification_type, &request.payload)?,
        };

        rendered.complete()
    }
}
