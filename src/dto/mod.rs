use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PartnerSubmission {
    /// Kind of partner applying, e.g. insurance agency or body shop
    pub partner_type: String,
    pub agency_name: String,
    pub contact_name: String,
    pub phone: String,
    pub email: String,
    /// Insurance lines the partner sells, in the order selected
    #[serde(default)]
    pub insurance_products: Vec<String>,
    pub other_products: Option<String>,
    /// Approximate size of the partner's customer base
    pub customer_range: String,
    pub referred_by: Option<String>,
    pub website: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SupportRequest {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub preferred_contact_method: String,
    pub help_type: String,
    pub what_happened: String,
    pub incident_date: String,
    pub any_passengers: bool,
    pub referred_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReferralCreated {
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_email: Option<String>,
    pub accident_date: Option<String>,
    pub people_involved: Option<u32>,
    pub at_fault_status: Option<AtFaultStatus>,
    /// Agency that submitted the referral
    pub agency_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AtFaultStatus {
    AtFault,
    NotAtFault,
    Unknown,
}

impl fmt::Display for AtFaultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AtFault => "At Fault",
            Self::NotAtFault => "Not At Fault",
            Self::Unknown => "Unknown",
        })
    }
}

/// Body of every notification endpoint response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct NotifyResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Message of the error that stopped the notification
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NotifyResponse {
    pub fn sent(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.into()),
        }
    }
}
