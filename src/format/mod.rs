//! Plain-text rendering of notification payloads.

use chrono::{DateTime, Utc};
use chrono_tz::America::Los_Angeles;

use crate::dto::{PartnerSubmission, ReferralCreated, SupportRequest};
use crate::models::{EmailMessage, NotificationPayload};

pub const NOT_PROVIDED: &str = "Not provided";
pub const NOT_SPECIFIED: &str = "Not specified";

/// `toLocaleString("en-US")` style, e.g. `7/4/2024, 12:05:09 PM`.
const TIMESTAMP_FORMAT: &str = "%-m/%-d/%Y, %-I:%M:%S %p";

/// Renders a UTC instant as Pacific wall-clock time.
pub fn pacific_timestamp(at: DateTime<Utc>) -> String {
    at.with_timezone(&Los_Angeles)
        .format(TIMESTAMP_FORMAT)
        .to_string()
}

fn provided(value: Option<&String>) -> &str {
    value
        .map(String::as_str)
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(NOT_PROVIDED)
}

fn footer(lines: &mut Vec<String>, referred_by: Option<&String>, at: DateTime<Utc>) {
    lines.push(String::new());
    lines.push(format!("Referred By: {}", provided(referred_by)));
    lines.push(String::new());
    lines.push(format!("Submitted: {}", pacific_timestamp(at)));
}

pub fn format_partner(p: &PartnerSubmission, at: DateTime<Utc>) -> EmailMessage {
    let products = if p.insurance_products.is_empty() {
        NOT_SPECIFIED.to_string()
    } else {
        p.insurance_products.join(", ")
    };

    let mut lines = vec![
        "A new partner application has been submitted.".to_string(),
        String::new(),
        "Partner Information:".to_string(),
        format!("Partner Type: {}", p.partner_type),
        format!("Agency Name: {}", p.agency_name),
        format!("Contact Name: {}", p.contact_name),
        format!("Phone: {}", p.phone),
        format!("Email: {}", p.email),
        format!("Website: {}", provided(p.website.as_ref())),
        String::new(),
        "Business Details:".to_string(),
        format!("Insurance Products: {products}"),
        format!("Other Products: {}", provided(p.other_products.as_ref())),
        format!("Customer Range: {}", p.customer_range),
    ];
    footer(&mut lines, p.referred_by.as_ref(), at);

    EmailMessage {
        subject: format!("New Partner Application: {}", p.agency_name),
        body: lines.join("\n"),
    }
}

pub fn format_support(s: &SupportRequest, at: DateTime<Utc>) -> EmailMessage {
    let passengers = if s.any_passengers { "Yes" } else { "No" };

    let mut lines = vec![
        "A new support request has been submitted.".to_string(),
        String::new(),
        "Contact Information:".to_string(),
        format!("Name: {}", s.name),
        format!("Email: {}", s.email),
        format!("Phone: {}", s.phone),
        format!("Address: {}", s.address),
        format!("Preferred Contact Method: {}", s.preferred_contact_method),
        String::new(),
        "Incident Details:".to_string(),
        format!("Help Type: {}", s.help_type),
        format!("Incident Date: {}", s.incident_date),
        format!("Any Passengers: {passengers}"),
        "What Happened:".to_string(),
        s.what_happened.clone(),
    ];
    footer(&mut lines, s.referred_by.as_ref(), at);

    EmailMessage {
        subject: format!("New Support Request: {}", s.help_type),
        body: lines.join("\n"),
    }
}

pub fn format_referral(r: &ReferralCreated, at: DateTime<Utc>) -> EmailMessage {
    let people = r
        .people_involved
        .map_or_else(|| NOT_SPECIFIED.to_string(), |n| n.to_string());
    let fault = r
        .at_fault_status
        .map_or_else(|| NOT_SPECIFIED.to_string(), |s| s.to_string());

    let lines = [
        "A new referral has been submitted.".to_string(),
        String::new(),
        "Customer Information:".to_string(),
        format!("Name: {}", r.customer_name),
        format!("Phone: {}", r.customer_phone),
        format!("Email: {}", provided(r.customer_email.as_ref())),
        String::new(),
        "Accident Details:".to_string(),
        format!("Date: {}", provided(r.accident_date.as_ref())),
        format!("People Involved: {people}"),
        format!("At-Fault Status: {fault}"),
        String::new(),
        format!("Submitting Agency: {}", r.agency_name),
        String::new(),
        format!("Submitted: {}", pacific_timestamp(at)),
    ];

    EmailMessage {
        subject: format!("New Referral: {}", r.customer_name),
        body: lines.join("\n"),
    }
}

/// Renders any payload. Never fails.
pub fn format_payload(payload: &NotificationPayload, at: DateTime<Utc>) -> EmailMessage {
    match payload {
        NotificationPayload::PartnerSubmission(p) => format_partner(p, at),
        NotificationPayload::SupportRequest(s) => format_support(s, at),
        NotificationPayload::ReferralCreated(r) => format_referral(r, at),
    }
}
