use chrono::{DateTime, Utc};

use std::fmt;

use crate::dto::{PartnerSubmission, ReferralCreated, SupportRequest};

/// The three kinds of notification the portal sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Partner,
    Support,
    Referral,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Partner => "Partner",
            Self::Support => "Support",
            Self::Referral => "Referral",
        })
    }
}

/// One request's worth of data to notify about.
#[derive(Debug, Clone)]
pub enum NotificationPayload {
    PartnerSubmission(PartnerSubmission),
    SupportRequest(SupportRequest),
    ReferralCreated(ReferralCreated),
}

impl NotificationPayload {
    pub const fn kind(&self) -> NotificationKind {
        match self {
            Self::PartnerSubmission(_) => NotificationKind::Partner,
            Self::SupportRequest(_) => NotificationKind::Support,
            Self::ReferralCreated(_) => NotificationKind::Referral,
        }
    }
}

/// Rendered subject and plain-text body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub subject: String,
    pub body: String,
}

/// A formatted message addressed to a single recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Strips line breaks so user input cannot start a new header.
fn header_value(value: &str) -> String {
    value
        .split(['\r', '\n'])
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

impl OutgoingEmail {
    pub fn new(to: impl Into<String>, message: EmailMessage) -> Self {
        Self {
            to: to.into(),
            subject: message.subject,
            body: message.body,
        }
    }

    /// Everything written after `DATA`: headers, blank line, dot-stuffed body
    /// with CRLF line endings, and the `.` terminator line.
    pub fn to_wire(&self, from: &str, date: DateTime<Utc>) -> String {
        let mut data = String::with_capacity(self.body.len() + 256);

        for (name, value) in [
            ("From", from),
            ("To", self.to.as_str()),
            ("Subject", self.subject.as_str()),
        ] {
            data.push_str(name);
            data.push_str(": ");
            data.push_str(&header_value(value));
            data.push_str("\r\n");
        }
        data.push_str("Date: ");
        data.push_str(&date.to_rfc2822());
        data.push_str("\r\n");
        data.push_str("Content-Type: text/plain; charset=utf-8\r\n");
        data.push_str("\r\n");

        // A lone `\r` counts as a line break too, so none reaches the wire.
        let body = self.body.replace("\r\n", "\n").replace('\r', "\n");
        for line in body.lines() {
            if line.starts_with('.') {
                data.push('.');
            }
            data.push_str(line);
            data.push_str("\r\n");
        }

        data.push_str(".\r\n");
        data
    }
}
