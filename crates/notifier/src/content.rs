//! Message content types and the small amount of text munging the pipeline needs.

use handlebars::Handlebars;
use serde::{Deserialize, Serialize};

use courier_common::error::{CourierError, CourierResult};
use courier_common::types::Recipient;

/// Content as produced by a template or supplied by the caller.
/// Either body may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderedContent {
    pub subject: String,
    pub html: Option<String>,
    pub text: Option<String>,
}

/// Fully resolved content, ready for the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailContent {
    pub subject: String,
    pub html: String,
    pub text: String,
}

impl RenderedContent {
    /// Backfill whichever body is missing from the other one.
    ///
    /// Fails when the subject is blank or neither body has content.
    pub fn complete(self) -> CourierResult<EmailContent> {
        if self.subject.trim().is_empty() {
            return Err(CourierError::ContentResolution(
                "Resolved content has an empty subject".to_string(),
            ));
        }

        let html = self.html.filter(|h| !h.trim().is_empty());
        let text = self.text.filter(|t| !t.trim().is_empty());

        let (html, text) = match (html, text) {
            (Some(html), Some(text)) => (html, text),
            (Some(html), None) => {
                let text = html_to_text(&html);
                (html, text)
            }
            (None, Some(text)) => (text_to_html(&text), text),
            (None, None) => {
                return Err(CourierError::ContentResolution(
                    "Resolved content has neither an HTML nor a text body".to_string(),
                ));
            }
        };

        Ok(EmailContent {
            subject: self.subject,
            html,
            text,
        })
    }
}

impl EmailContent {
    /// Compile the subject and bodies as per-recipient templates.
    ///
    /// `{{first_name}}`, `{{last_name}}` and `{{email}}` are filled in by
    /// `PersonalizedContent::render`. Unknown placeholders render empty.
    pub fn personalization(&self) -> CourierResult<PersonalizedContent> {
        let mut plain = Handlebars::new();
        plain.register_escape_fn(handlebars::no_escape);
        let mut html = Handlebars::new();

        let invalid = |part: &str, e: handlebars::TemplateError| {
            CourierError::ContentResolution(format!("Invalid {} template: {}", part, e))
        };
        plain
            .register_template_string("subject", &self.subject)
            .map_err(|e| invalid("subject", e))?;
        plain
            .register_template_string("text", &self.text)
            .map_err(|e| invalid("text", e))?;
        html.register_template_string("html", &self.html)
            .map_err(|e| invalid("html", e))?;

        Ok(PersonalizedContent { plain, html })
    }
}

/// Campaign content compiled once and rendered for each recipient.
/// Values are HTML-escaped in the HTML body only.
pub struct PersonalizedContent {
    plain: Handlebars<'static>,
    html: Handlebars<'static>,
}

impl PersonalizedContent {
    pub fn render(&self, recipient: &Recipient) -> CourierResult<EmailContent> {
        let data = serde_json::json!({
            "first_name": recipient.first_name.as_deref().unwrap_or(""),
            "last_name": recipient.last_name.as_deref().unwrap_or(""),
            "email": recipient.email,
        });
        let failed = |e: handlebars::RenderError| {
            CourierError::ContentResolution(format!("Failed to personalize content: {}", e))
        };

        Ok(EmailContent {
            subject: self.plain.render("subject", &data).map_err(failed)?,
            html: self.html.render("html", &data).map_err(failed)?,
            text: self.plain.render("text", &data).map_err(failed)?,
        })
    }
}

/// Wrap each blank-line separated paragraph in `<p>`.
fn text_to_html(text: &str) -> String {
    text.split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| format!("<p>{}</p>", handlebars::html_escape(p).replace('\n', "<br>")))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Drop tags and collapse whitespace. Good enough for a fallback text part.
fn html_to_text(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => {
                in_tag = true;
                out.push(' ');
            }
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }

    out.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
