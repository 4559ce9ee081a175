//! Mail envelope forwarded verbatim to the service's relay endpoint.
//!
//! Field names follow the relay's JSON shape (`personalizations`, `from`,
//! `content`), so the envelope serializes without renaming.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub email: String,
}

/// Recipients that share one subject line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Personalization {
    pub to: Vec<Recipient>,
    pub subject: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    pub email: String,
    pub name: String,
}

/// One body part, e.g. `text/plain` or `text/html`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailContent {
    #[serde(rename = "type")]
    pub mime_type: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailEnvelope {
    pub personalizations: Vec<Personalization>,
    pub from: Sender,
    pub content: Vec<MailContent>,
}

impl MailEnvelope {
    /// Creates an envelope from `sender` with no recipients or body yet.
    pub fn from_sender(email: impl Into<String>, name: impl Into<String>) -> Self {
        MailEnvelope {
            personalizations: Vec::new(),
            from: Sender {
                email: email.into(),
                name: name.into(),
            },
            content: Vec::new(),
        }
    }

    /// Adds a recipient group sharing `subject`.
    pub fn to<I, S>(mut self, recipients: I, subject: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.personalizations.push(Personalization {
            to: recipients
                .into_iter()
                .map(|email| Recipient { email: email.into() })
                .collect(),
            subject: subject.into(),
        });
        self
    }

    /// Adds a body part.
    pub fn body(mut self, mime_type: impl Into<String>, value: impl Into<String>) -> Self {
        self.content.push(MailContent {
            mime_type: mime_type.into(),
            value: value.into(),
        });
        self
    }
}
