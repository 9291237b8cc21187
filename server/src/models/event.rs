use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Publication state of an event. Only `Published` events accept registrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Draft,
    Published,
    Cancelled,
    Completed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Draft => "draft",
            EventStatus::Published => "published",
            EventStatus::Cancelled => "cancelled",
            EventStatus::Completed => "completed",
        }
    }

    /// Organizer-driven lifecycle. Staying in the same status is always allowed.
    pub fn can_transition_to(self, next: EventStatus) -> bool {
        use EventStatus::*;

        self == next
            || matches!(
                (self, next),
                (Draft, Published) | (Draft, Cancelled) | (Published, Cancelled) | (Published, Completed)
            )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventVisibility {
    #[default]
    Public,
    Unlisted,
    Private,
}

impl EventVisibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventVisibility::Public => "public",
            EventVisibility::Unlisted => "unlisted",
            EventVisibility::Private => "private",
        }
    }
}

/// Discounted price available up to and including `deadline`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarlyBird {
    pub price: Decimal,
    pub deadline: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingTier {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub early_bird: Option<EarlyBird>,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capacity {
    pub total: u32,
    #[serde(default)]
    pub registered_count: u32,
    #[serde(default)]
    pub waitlist_count: u32,
}

impl Capacity {
    pub fn new(total: u32) -> Self {
        Self {
            total,
            registered_count: 0,
            waitlist_count: 0,
        }
    }

    pub fn available(&self) -> u32 {
        self.total.saturating_sub(self.registered_count)
    }

    pub fn is_full(&self) -> bool {
        self.registered_count >= self.total
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub id: String,
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub event_type: String,
    #[serde(default)]
    pub visibility: EventVisibility,
    #[serde(default)]
    pub location: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub timezone: String,
    pub registration_deadline: DateTime<Utc>,
    pub capacity: Capacity,
    pub pricing: Vec<PricingTier>,
    pub status: EventStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    pub fn default_tier(&self) -> Option<&PricingTier> {
        self.pricing.iter().find(|tier| tier.is_default)
    }

    /// Looks up a tier by id, falling back to the default tier when no id is given.
    pub fn tier(&self, tier_id: Option<&str>) -> Option<&PricingTier> {
        match tier_id {
            Some(id) => self.pricing.iter().find(|tier| tier.id == id),
            None => self.default_tier(),
        }
    }
}

/// Payload for creating an event. Counters and status are not client-controlled.
#[derive(Debug, Clone, Deserialize)]
pub struct NewEvent {
    pub title: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_event_type")]
    pub event_type: String,
    #[serde(default)]
    pub visibility: EventVisibility,
    #[serde(default)]
    pub location: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub timezone: String,
    pub registration_deadline: DateTime<Utc>,
    pub capacity: u32,
    pub pricing: Vec<PricingTier>,
}

fn default_event_type() -> String {
    "general".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventPatch {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub event_type: Option<String>,
    pub visibility: Option<EventVisibility>,
    pub location: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub timezone: Option<String>,
    pub registration_deadline: Option<DateTime<Utc>>,
    pub capacity: Option<u32>,
    pub pricing: Option<Vec<PricingTier>>,
    pub status: Option<EventStatus>,
}
