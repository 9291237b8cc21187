//! Pricing and availability rules shared by every caller that needs to show
//! or charge a price.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::RegistryError;
use crate::models::{Event, EventStatus, PricingTier};

/// Early-bird price while `at` is on or before the early-bird deadline,
/// the base price afterwards.
pub fn tier_price(tier: &PricingTier, at: DateTime<Utc>) -> Decimal {
    match &tier.early_bird {
        Some(early_bird) if at <= early_bird.deadline => early_bird.price,
        _ => tier.price,
    }
}

/// Effective price of `tier_id` (or the default tier) at `at`.
pub fn effective_price(
    event: &Event,
    tier_id: Option<&str>,
    at: DateTime<Utc>,
) -> Result<Decimal, RegistryError> {
    event
        .tier(tier_id)
        .map(|tier| tier_price(tier, at))
        .ok_or_else(|| RegistryError::not_found("pricing tier", tier_id.unwrap_or("default")))
}

/// Registration is open for published events up to and including the
/// registration deadline. The start date is not checked separately.
pub fn is_registration_open(event: &Event, at: DateTime<Utc>) -> bool {
    event.status == EventStatus::Published && at <= event.registration_deadline
}
