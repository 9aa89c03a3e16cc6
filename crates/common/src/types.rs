use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Categories of user-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    // Lifecycle
    Welcome,
    NurtureIntro,
    NurtureFollowup,

    // Rides
    MeetingReminder,

    // Campaigns
    Reengage,
    Announcement,
}

impl NotificationType {
    pub const ALL: [NotificationType; 6] = [
        NotificationType::Welcome,
        NotificationType::NurtureIntro,
        NotificationType::NurtureFollowup,
        NotificationType::MeetingReminder,
        NotificationType::Reengage,
        NotificationType::Announcement,
    ];

    /// Single-shot types are delivered at most once per user.
    pub fn is_single_shot(self) -> bool {
        matches!(self, NotificationType::Welcome | NotificationType::NurtureIntro)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NotificationType::Welcome => "welcome",
            NotificationType::NurtureIntro => "nurture_intro",
            NotificationType::NurtureFollowup => "nurture_followup",
            NotificationType::MeetingReminder => "meeting_reminder",
            NotificationType::Reengage => "reengage",
            NotificationType::Announcement => "announcement",
        }
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NotificationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| {
                let valid: Vec<&str> = Self::ALL.iter().map(|t| t.as_str()).collect();
                format!(
                    "Invalid notification_type '{}'. Valid types: {}",
                    s,
                    valid.join(", ")
                )
            })
    }
}

/// Notification delivery status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Queued,
    Sent,
    Failed,
    Skipped,
}

impl DeliveryStatus {
    /// Sent and failed are terminal; nothing transitions out of them.
    pub fn is_terminal(self) -> bool {
        matches!(self, DeliveryStatus::Sent | DeliveryStatus::Failed)
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryStatus::Queued => write!(f, "queued"),
            DeliveryStatus::Sent => write!(f, "sent"),
            DeliveryStatus::Failed => write!(f, "failed"),
            DeliveryStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// One row per send attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct NotificationEvent {
    pub id: Uuid,
    pub user_id: Uuid,
    pub notification_type: NotificationType,
    pub status: DeliveryStatus,
    pub recipient_address: String,
    pub subject: String,
    pub payload: serde_json::Value,
    pub external_message_id: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Values for a ledger row about to be inserted as `queued`.
#[derive(Debug, Clone)]
pub struct NewNotificationEvent {
    pub user_id: Uuid,
    pub notification_type: NotificationType,
    pub recipient_address: String,
    pub subject: String,
    pub payload: serde_json::Value,
}

impl NewNotificationEvent {
    /// Materialize the queued row with a fresh id.
    pub fn into_queued(self, now: DateTime<Utc>) -> NotificationEvent {
        NotificationEvent {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            notification_type: self.notification_type,
            status: DeliveryStatus::Queued,
            recipient_address: self.recipient_address,
            subject: self.subject,
            payload: self.payload,
            external_message_id: None,
            error: None,
            created_at: now,
        }
    }
}

/// A deferred notification intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ScheduledNotification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub notification_type: NotificationType,
    pub run_after: DateTime<Utc>,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Append-only user lifecycle event (e.g. "login").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ActivityRecord {
    pub user_id: Uuid,
    pub event: String,
    pub metadata: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

/// Activity event name that feeds the re-engagement policy.
pub const LOGIN_EVENT: &str = "login";

/// An addressable user, flattened from the users table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Recipient {
    pub user_id: Uuid,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}
