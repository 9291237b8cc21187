use std::collections::HashSet;

use chrono_tz::Tz;
use rust_decimal::Decimal;

use crate::models::{Event, PricingTier};

/// Lowercase, dash-separated form of `text`, suitable for URLs.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

pub fn validate_slug(slug: &str) -> Result<(), String> {
    let well_formed = !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !slug.starts_with('-')
        && !slug.ends_with('-')
        && !slug.contains("--");

    if well_formed {
        Ok(())
    } else {
        Err(format!(
            "slug '{}' must be lowercase letters, digits and single dashes",
            slug
        ))
    }
}

/// Fills in missing tier ids from tier names and marks a lone tier as default.
pub fn normalize_tiers(tiers: &mut [PricingTier]) {
    let mut taken: HashSet<String> = tiers
        .iter()
        .filter(|tier| !tier.id.trim().is_empty())
        .map(|tier| tier.id.trim().to_string())
        .collect();

    for tier in tiers.iter_mut() {
        tier.id = tier.id.trim().to_string();
        if !tier.id.is_empty() {
            continue;
        }
        let base = match slugify(&tier.name) {
            name if name.is_empty() => "tier".to_string(),
            name => name,
        };
        let mut candidate = base.clone();
        let mut suffix = 2;
        while taken.contains(&candidate) {
            candidate = format!("{}-{}", base, suffix);
            suffix += 1;
        }
        taken.insert(candidate.clone());
        tier.id = candidate;
    }

    if let [only] = tiers {
        only.is_default = true;
    }
}

fn validate_tiers(event: &Event) -> Result<(), String> {
    if event.pricing.is_empty() {
        return Err("at least one pricing tier is required".to_string());
    }

    let mut seen = HashSet::new();
    for tier in &event.pricing {
        if tier.id.is_empty() || !seen.insert(tier.id.as_str()) {
            return Err(format!("pricing tier id '{}' is missing or duplicated", tier.id));
        }
        if tier.name.trim().is_empty() {
            return Err(format!("pricing tier '{}' needs a name", tier.id));
        }
        if tier.price <= Decimal::ZERO {
            return Err(format!("pricing tier '{}' must have a positive price", tier.id));
        }
        if let Some(early_bird) = &tier.early_bird {
            if early_bird.price < Decimal::ZERO || early_bird.price >= tier.price {
                return Err(format!(
                    "early-bird price of tier '{}' must be below its regular price",
                    tier.id
                ));
            }
            if early_bird.deadline > event.registration_deadline {
                return Err(format!(
                    "early-bird deadline of tier '{}' is after the registration deadline",
                    tier.id
                ));
            }
        }
    }

    match event.pricing.iter().filter(|tier| tier.is_default).count() {
        1 => Ok(()),
        n => Err(format!("exactly one default pricing tier is required, found {}", n)),
    }
}

/// Structural invariants every stored event must satisfy.
pub fn validate_event(event: &Event) -> Result<(), String> {
    if event.title.trim().is_empty() {
        return Err("title must not be empty".to_string());
    }
    validate_slug(&event.slug)?;
    if event.end_date <= event.start_date {
        return Err("end_date must be after start_date".to_string());
    }
    if event.timezone.parse::<Tz>().is_err() {
        return Err(format!("'{}' is not an IANA timezone", event.timezone));
    }
    if event.capacity.total == 0 {
        return Err("capacity must be a positive number".to_string());
    }
    if event.capacity.registered_count > event.capacity.total {
        return Err("capacity is below the number of registered attendees".to_string());
    }
    validate_tiers(event)
}
