use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    Registered,
    Waitlist,
    Cancelled,
    Attended,
}

impl RegistrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationStatus::Registered => "registered",
            RegistrationStatus::Waitlist => "waitlist",
            RegistrationStatus::Cancelled => "cancelled",
            RegistrationStatus::Attended => "attended",
        }
    }

    /// Anything but `Cancelled` blocks the attendee from registering again.
    pub fn is_active(&self) -> bool {
        !matches!(self, RegistrationStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

/// Who a registration belongs to: a signed-in user or a guest contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Attendee {
    User { user_id: String },
    Guest { name: String, email: String },
}

impl Attendee {
    /// Stable identity used for the one-active-registration-per-attendee rule.
    pub fn key(&self) -> String {
        match self {
            Attendee::User { user_id } => format!("user:{}", user_id.trim()),
            Attendee::Guest { email, .. } => format!("guest:{}", email.trim().to_lowercase()),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            Attendee::User { user_id } if user_id.trim().is_empty() => {
                Err("user_id must not be empty".to_string())
            }
            Attendee::User { .. } => Ok(()),
            Attendee::Guest { name, .. } if name.trim().is_empty() => {
                Err("guest name must not be empty".to_string())
            }
            Attendee::Guest { email, .. } if !email.contains('@') => {
                Err(format!("'{}' is not a valid email address", email))
            }
            Attendee::Guest { .. } => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRegistration {
    #[serde(default)]
    pub id: String,
    pub event_id: String,
    pub attendee: Attendee,
    pub attendee_key: String,
    pub tier_id: String,
    pub status: RegistrationStatus,
    pub payment_status: PaymentStatus,
    /// Price locked in at registration time; never recomputed.
    pub payment_amount: Decimal,
    pub registered_at: DateTime<Utc>,
    #[serde(default)]
    pub checked_in_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub promoted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationRequest {
    pub attendee: Attendee,
    #[serde(default)]
    pub tier_id: Option<String>,
    /// Overrides the server default; `false` turns a full event into `EventFull`.
    #[serde(default)]
    pub allow_waitlist: Option<bool>,
}
