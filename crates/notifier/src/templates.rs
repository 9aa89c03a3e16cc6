//! Template resolution: notification type + payload → subject and bodies.
//!
//! `BuiltinTemplates` carries the copy deck for the lifecycle emails so the system can
//! run end to end. Richer rendering plugs in behind `TemplateResolver`.

use handlebars::Handlebars;
use serde_json::Value;

use courier_common::error::{CourierError, CourierResult};
use courier_common::types::NotificationType;

use crate::content::RenderedContent;

pub trait TemplateResolver: Send + Sync {
    /// Fails with `ContentResolution` when no template exists for the type.
    fn resolve(
        &self,
        notification_type: NotificationType,
        payload: &Value,
    ) -> CourierResult<RenderedContent>;

    /// Whether `resolve` can produce content for this type without explicit content.
    fn has_template(&self, notification_type: NotificationType) -> bool;
}

struct CopyDeck {
    notification_type: NotificationType,
    subject: &'static str,
    text: &'static str,
    html: &'static str,
}

// Subject and text use triple braces: only the HTML body is escaped.
const COPY: &[CopyDeck] = &[
    CopyDeck {
        notification_type: NotificationType::Welcome,
        subject: "Welcome aboard, {{{first_name}}}!",
        text: "Hi {{{first_name}}},\n\nThanks for joining. Set up your commute and find riders heading your way:\n{{{app_base_url}}}/rides",
        html: "<p>Hi {{first_name}},</p>\n<p>Thanks for joining. Set up your commute and find riders heading your way:<br><a href=\"{{app_base_url}}/rides\">{{app_base_url}}/rides</a></p>",
    },
    CopyDeck {
        notification_type: NotificationType::NurtureIntro,
        subject: "Three tips for your first shared ride",
        text: "Hi {{{first_name}}},\n\nAdd your usual route, set your schedule, and turn on match alerts.\n{{{app_base_url}}}/profile",
        html: "<p>Hi {{first_name}},</p>\n<p>Add your usual route, set your schedule, and turn on match alerts.<br><a href=\"{{app_base_url}}/profile\">{{app_base_url}}/profile</a></p>",
    },
    CopyDeck {
        notification_type: NotificationType::NurtureFollowup,
        subject: "Riders near you are looking for a match",
        text: "Hi {{{first_name}}},\n\nNew commuters joined along your route this week.\n{{{app_base_url}}}/matches",
        html: "<p>Hi {{first_name}},</p>\n<p>New commuters joined along your route this week.<br><a href=\"{{app_base_url}}/matches\">{{app_base_url}}/matches</a></p>",
    },
    CopyDeck {
        notification_type: NotificationType::MeetingReminder,
        subject: "Reminder: your ride meetup is tomorrow",
        text: "Hi {{{first_name}}},\n\nYou're meeting your ride partner at {{{location}}} ({{{starts_at}}}).\n{{{app_base_url}}}/meetings",
        html: "<p>Hi {{first_name}},</p>\n<p>You're meeting your ride partner at {{location}} ({{starts_at}}).<br><a href=\"{{app_base_url}}/meetings\">{{app_base_url}}/meetings</a></p>",
    },
    CopyDeck {
        notification_type: NotificationType::Reengage,
        subject: "We miss you, {{{first_name}}}",
        text: "Hi {{{first_name}}},\n\nIt has been a while. Your matches are still waiting:\n{{{app_base_url}}}/matches",
        html: "<p>Hi {{first_name}},</p>\n<p>It has been a while. Your matches are still waiting:<br><a href=\"{{app_base_url}}/matches\">{{app_base_url}}/matches</a></p>",
    },
];

pub struct BuiltinTemplates {
    handlebars: Handlebars<'static>,
    app_base_url: String,
}

impl BuiltinTemplates {
    pub fn new(app_base_url: impl Into<String>) -> CourierResult<Self> {
        let mut handlebars = Handlebars::new();
        for deck in COPY {
            let name = deck.notification_type.as_str();
            for (part, source) in [("subject", deck.subject), ("text", deck.text), ("html", deck.html)] {
                handlebars
                    .register_template_string(&format!("{}_{}", name, part), source)
                    .map_err(|e| {
                        CourierError::Config(format!("Invalid {} {} template: {}", name, part, e))
                    })?;
            }
        }

        Ok(Self {
            handlebars,
            app_base_url: app_base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn field<'a>(payload: &'a Value, key: &str, fallback: &'a str) -> &'a str {
        payload.get(key).and_then(|v| v.as_str()).unwrap_or(fallback)
    }

    fn render(&self, name: &str, part: &str, data: &Value) -> CourierResult<String> {
        self.handlebars
            .render(&format!("{}_{}", name, part), data)
            .map_err(|e| {
                CourierError::ContentResolution(format!("Failed to render {} {}: {}", name, part, e))
            })
    }
}

impl TemplateResolver for BuiltinTemplates {
    fn resolve(
        &self,
        notification_type: NotificationType,
        payload: &Value,
    ) -> CourierResult<RenderedContent> {
        if !self.has_template(notification_type) {
            return Err(CourierError::ContentResolution(format!(
                "No template for {}; explicit content is required",
                notification_type
            )));
        }

        let data = serde_json::json!({
            "first_name": Self::field(payload, "first_name", "there"),
            "location": Self::field(payload, "location", "the agreed pickup point"),
            "starts_at": Self::field(payload, "starts_at", "tomorrow"),
            "app_base_url": self.app_base_url,
        });
        let name = notification_type.as_str();

        Ok(RenderedContent {
            subject: self.render(name, "subject", &data)?,
            html: Some(self.render(name, "html", &data)?),
            text: Some(self.render(name, "text", &data)?),
        })
    }

    fn has_template(&self, notification_type: NotificationType) -> bool {
        self.handlebars
            .has_template(&format!("{}_subject", notification_type.as_str()))
    }
}
