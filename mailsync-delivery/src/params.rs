//! Structured send parameters
//!
//! Messages are built as typed values and only flattened into the provider's
//! `o:`/`h:`/`v:`/`t:` form pairs by [`SendParameters::to_form`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

/// A file attached to an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: Option<String>,
    pub content: Vec<u8>,
}

/// Provider send options (`o:` parameters).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendOptions {
    #[serde(default)]
    pub tags: Vec<String>,
    /// Provider test mode; accepted but never delivered when set
    #[serde(default)]
    pub test_mode: Option<bool>,
    /// Provider side scheduled delivery, at most three days ahead
    #[serde(default)]
    pub delivery_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tracking: Option<bool>,
    #[serde(default)]
    pub require_tls: Option<bool>,
    /// Other options, keys without the `o:` prefix
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl SendOptions {
    #[must_use]
    pub fn to_form(&self) -> Vec<(String, String)> {
        let mut form: Vec<(String, String)> = self
            .tags
            .iter()
            .map(|tag| ("o:tag".to_string(), tag.clone()))
            .collect();

        if let Some(test_mode) = self.test_mode {
            form.push(("o:testmode".to_string(), yes_no(test_mode).to_string()));
        }
        if let Some(delivery_time) = self.delivery_time {
            form.push(("o:deliverytime".to_string(), delivery_time.to_rfc2822()));
        }
        if let Some(tracking) = self.tracking {
            form.push(("o:tracking".to_string(), yes_no(tracking).to_string()));
        }
        if let Some(require_tls) = self.require_tls {
            form.push(("o:require-tls".to_string(), yes_no(require_tls).to_string()));
        }

        form.extend(
            self.extra
                .iter()
                .map(|(key, value)| (format!("o:{key}"), value.clone())),
        );

        form
    }
}

/// A stored provider template to render the message from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    /// Render the template into the text part as well
    #[serde(default)]
    pub include_in_text: bool,
}

/// Everything needed to send one message through the provider.
///
/// Attachments are not serialized; deferred sends carry them base64-encoded
/// inside the job instead.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SendParameters {
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub amp_html: Option<String>,
    #[serde(skip)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub options: SendOptions,
    /// Custom headers, names without the `h:` prefix
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Custom variables, names without the `v:` prefix
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    #[serde(default)]
    pub template: Option<Template>,
    /// Per-recipient variables for batch sends, keyed by address
    #[serde(default)]
    pub recipient_variables: BTreeMap<String, serde_json::Value>,
}

impl SendParameters {
    #[must_use]
    pub fn has_attachments(&self) -> bool {
        !self.attachments.is_empty()
    }

    /// Look up a custom header, ignoring case
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Remove every custom header matching `name`, ignoring case
    pub fn remove_header(&mut self, name: &str) {
        self.headers.retain(|key, _| !key.eq_ignore_ascii_case(name));
    }

    /// Flatten into provider form pairs.
    ///
    /// Attachments are sent as multipart files and are not part of the form.
    #[must_use]
    pub fn to_form(&self) -> Vec<(String, String)> {
        let mut form = Vec::new();
        let mut push = |key: &str, value: &str| form.push((key.to_string(), value.to_string()));

        if let Some(from) = &self.from {
            push("from", from);
        }
        for to in &self.to {
            push("to", to);
        }
        for cc in &self.cc {
            push("cc", cc);
        }
        for bcc in &self.bcc {
            push("bcc", bcc);
        }
        if !self.subject.is_empty() {
            push("subject", &self.subject);
        }
        if let Some(text) = &self.text {
            push("text", text);
        }
        if let Some(html) = &self.html {
            push("html", html);
        }
        if let Some(amp_html) = self.amp_html.as_deref().filter(|html| !html.is_empty()) {
            push("amp-html", amp_html);
        }

        if let Some(template) = self.template.as_ref().filter(|t| !t.name.is_empty()) {
            push("template", &template.name);
            if let Some(version) = template.version.as_deref().filter(|v| !v.is_empty()) {
                push("t:version", version);
            }
            if template.include_in_text {
                push("t:text", "yes");
            }
        }

        for (key, value) in &self.variables {
            push(&format!("v:{key}"), value);
        }
        for (key, value) in &self.headers {
            push(&format!("h:{key}"), value);
        }

        if !self.recipient_variables.is_empty()
            && let Ok(json) = serde_json::to_string(&self.recipient_variables)
        {
            push("recipient-variables", &json);
        }

        form.extend(self.options.to_form());

        form
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn pairs(form: &[(String, String)]) -> Vec<(&str, &str)> {
        form.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect()
    }

    #[test]
    fn test_to_form() {
        let params = SendParameters {
            from: Some("Sender <sender@example.com>".to_string()),
            to: vec!["alice@example.com".to_string(), "bob@example.com".to_string()],
            subject: "Hello".to_string(),
            text: Some("Hi".to_string()),
            amp_html: Some("<html amp></html>".to_string()),
            template: Some(Template {
                name: "welcome".to_string(),
                version: Some("v2".to_string()),
                include_in_text: true,
            }),
            variables: BTreeMap::from([("s".to_string(), "42".to_string())]),
            headers: BTreeMap::from([("X-Campaign".to_string(), "spring".to_string())]),
            recipient_variables: BTreeMap::from([(
                "alice@example.com".to_string(),
                serde_json::json!({"first": "Alice"}),
            )]),
            options: SendOptions {
                tags: vec!["newsletter".to_string()],
                test_mode: Some(true),
                ..Default::default()
            },
            ..Default::default()
        };

        assert_eq!(
            pairs(&params.to_form()),
            vec![
                ("from", "Sender <sender@example.com>"),
                ("to", "alice@example.com"),
                ("to", "bob@example.com"),
                ("subject", "Hello"),
                ("text", "Hi"),
                ("amp-html", "<html amp></html>"),
                ("template", "welcome"),
                ("t:version", "v2"),
                ("t:text", "yes"),
                ("v:s", "42"),
                ("h:X-Campaign", "spring"),
                ("recipient-variables", r#"{"alice@example.com":{"first":"Alice"}}"#),
                ("o:tag", "newsletter"),
                ("o:testmode", "yes"),
            ]
        );
    }

    #[test]
    fn test_options_form() {
        let options = SendOptions {
            tags: vec!["resubmit".to_string()],
            test_mode: Some(false),
            tracking: Some(false),
            require_tls: Some(true),
            extra: BTreeMap::from([("skip-verification".to_string(), "no".to_string())]),
            ..Default::default()
        };

        assert_eq!(
            pairs(&options.to_form()),
            vec![
                ("o:tag", "resubmit"),
                ("o:testmode", "no"),
                ("o:tracking", "no"),
                ("o:require-tls", "yes"),
                ("o:skip-verification", "no"),
            ]
        );
    }

    #[test]
    fn test_headers_are_case_insensitive() {
        let mut params = SendParameters {
            headers: BTreeMap::from([
                ("X-PHP-Originating-Script".to_string(), "1".to_string()),
                ("sender".to_string(), "a@example.com".to_string()),
            ]),
            ..Default::default()
        };

        assert_eq!(params.header("Sender"), Some("a@example.com"));

        params.remove_header("x-php-originating-script");
        assert_eq!(params.headers.len(), 1);
    }
}
