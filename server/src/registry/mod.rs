//! Event registry: the single authority over events, registrations and the
//! capacity/pricing invariants that tie them together.
//!
//! Every mutation runs as one store transaction (read, validate, write both the
//! registration and the event counters) through [`run_transaction`], so
//! concurrent callers racing for the last seat are serialized by the store and
//! the loser re-runs against fresh counters.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::models::{
    Capacity, Event, EventPatch, EventRegistration, EventStatus, EventVisibility, NewEvent,
    PaymentStatus, RegistrationRequest, RegistrationStatus,
};
use crate::store::{
    run_transaction, Direction, Document, DocumentStore, Query, RetryPolicy, StoreError,
    Transaction, EVENTS, EVENT_REGISTRATIONS,
};

pub mod clock;
pub mod error;
pub mod pricing;
pub mod validation;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::RegistryError;
pub use pricing::{effective_price, is_registration_open, tier_price};

use validation::{normalize_tiers, slugify, validate_event};

#[derive(Debug, Clone, Copy)]
pub struct RegistrySettings {
    /// Default for callers that don't say whether a full event may waitlist them.
    pub allow_waitlist: bool,
    /// Promote the earliest waitlisted registration when a confirmed one cancels.
    pub promote_waitlist: bool,
    pub retry: RetryPolicy,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            allow_waitlist: true,
            promote_waitlist: false,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventFilter {
    #[serde(default, rename = "type")]
    pub event_type: Option<String>,
    #[serde(default)]
    pub status: Option<EventStatus>,
    #[serde(default)]
    pub visibility: Option<EventVisibility>,
    /// Only events that have not started yet.
    #[serde(default, alias = "upcoming")]
    pub upcoming_only: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RegistrationFilter {
    pub event_id: Option<String>,
    pub status: Option<RegistrationStatus>,
    pub payment_status: Option<PaymentStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Cancellation {
    pub registration: EventRegistration,
    /// Waitlisted registration that took over the freed seat, if any.
    pub promoted: Option<EventRegistration>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkStatusOutcome {
    pub id: String,
    pub updated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
}

fn decode_all<T: DeserializeOwned>(docs: &[Document]) -> Result<Vec<T>, StoreError> {
    docs.iter().map(Document::decode).collect()
}

fn encode<T: Serialize>(value: &T) -> Result<serde_json::Value, StoreError> {
    Ok(serde_json::to_value(value)?)
}

async fn load_event(tx: &mut dyn Transaction, id: &str) -> Result<Event, RegistryError> {
    let doc = tx
        .get(EVENTS, id)
        .await?
        .ok_or_else(|| RegistryError::not_found("event", id))?;
    Ok(doc.decode()?)
}

async fn load_registration(
    tx: &mut dyn Transaction,
    id: &str,
) -> Result<EventRegistration, RegistryError> {
    let doc = tx
        .get(EVENT_REGISTRATIONS, id)
        .await?
        .ok_or_else(|| RegistryError::not_found("registration", id))?;
    Ok(doc.decode()?)
}

async fn ensure_slug_available(
    tx: &mut dyn Transaction,
    slug: &str,
    owner: Option<&str>,
) -> Result<(), RegistryError> {
    let holders = tx.query(EVENTS, &Query::new().eq("slug", slug)).await?;
    if holders.iter().any(|doc| Some(doc.id.as_str()) != owner) {
        return Err(RegistryError::Validation(format!(
            "slug '{}' is already in use",
            slug
        )));
    }
    Ok(())
}

fn transition_event(event: &mut Event, next: EventStatus) -> Result<(), RegistryError> {
    if !event.status.can_transition_to(next) {
        return Err(RegistryError::InvalidTransition {
            entity: "event",
            from: event.status.as_str(),
            to: next.as_str(),
        });
    }
    event.status = next;
    Ok(())
}

/// `has_registrations` is true when any registration record exists for the
/// event, cancelled ones included.
fn apply_patch(
    event: &mut Event,
    patch: &EventPatch,
    has_registrations: bool,
) -> Result<(), RegistryError> {
    if let Some(total) = patch.capacity {
        if total != event.capacity.total {
            if has_registrations {
                return Err(RegistryError::Validation(
                    "capacity cannot change once registrations exist".to_string(),
                ));
            }
            event.capacity.total = total;
        }
    }
    if let Some(status) = patch.status {
        transition_event(event, status)?;
    }
    if let Some(title) = &patch.title {
        event.title = title.trim().to_string();
    }
    if let Some(slug) = &patch.slug {
        event.slug = slug.trim().to_string();
    }
    if let Some(description) = &patch.description {
        event.description = Some(description.clone());
    }
    if let Some(event_type) = &patch.event_type {
        event.event_type = event_type.clone();
    }
    if let Some(visibility) = patch.visibility {
        event.visibility = visibility;
    }
    if let Some(location) = &patch.location {
        event.location = Some(location.clone());
    }
    if let Some(start_date) = patch.start_date {
        event.start_date = start_date;
    }
    if let Some(end_date) = patch.end_date {
        event.end_date = end_date;
    }
    if let Some(timezone) = &patch.timezone {
        event.timezone = timezone.clone();
    }
    if let Some(deadline) = patch.registration_deadline {
        event.registration_deadline = deadline;
    }
    if let Some(pricing) = &patch.pricing {
        let mut pricing = pricing.clone();
        normalize_tiers(&mut pricing);
        event.pricing = pricing;
    }
    Ok(())
}

pub struct EventRegistry {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    settings: RegistrySettings,
}

impl EventRegistry {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        settings: RegistrySettings,
    ) -> Self {
        Self {
            store,
            clock,
            settings,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn ping(&self) -> Result<(), RegistryError> {
        Ok(self.store.ping().await?)
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    pub async fn get_event(&self, id: &str) -> Result<Event, RegistryError> {
        let doc = self
            .store
            .get(EVENTS, id)
            .await?
            .ok_or_else(|| RegistryError::not_found("event", id))?;
        Ok(doc.decode()?)
    }

    pub async fn get_event_by_slug(&self, slug: &str) -> Result<Event, RegistryError> {
        let docs = self
            .store
            .query(EVENTS, &Query::new().eq("slug", slug))
            .await?;
        match docs.first() {
            Some(doc) => Ok(doc.decode()?),
            None => Err(RegistryError::not_found("event", slug)),
        }
    }

    /// Equality filters go to the store; "upcoming" is decided here against
    /// the clock.
    pub async fn list_events(&self, filter: &EventFilter) -> Result<Vec<Event>, RegistryError> {
        let mut query = Query::new();
        if let Some(event_type) = &filter.event_type {
            query = query.eq("event_type", event_type.as_str());
        }
        if let Some(status) = filter.status {
            query = query.eq("status", status.as_str());
        }
        if let Some(visibility) = filter.visibility {
            query = query.eq("visibility", visibility.as_str());
        }
        let query = query.order_by("start_date", Direction::Asc);

        let docs = self.store.query(EVENTS, &query).await?;
        let mut events: Vec<Event> = decode_all(&docs)?;
        if filter.upcoming_only {
            let now = self.clock.now();
            events.retain(|event| event.start_date > now);
        }
        events.sort_by(|a, b| {
            a.start_date
                .cmp(&b.start_date)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(events)
    }

    pub async fn create_event(&self, new: NewEvent) -> Result<Event, RegistryError> {
        let now = self.clock.now();
        let mut pricing = new.pricing;
        normalize_tiers(&mut pricing);
        let slug = match &new.slug {
            Some(slug) => slug.trim().to_string(),
            None => slugify(&new.title),
        };

        let event = Event {
            id: String::new(),
            slug,
            title: new.title.trim().to_string(),
            description: new.description,
            event_type: new.event_type,
            visibility: new.visibility,
            location: new.location,
            start_date: new.start_date,
            end_date: new.end_date,
            timezone: new.timezone,
            registration_deadline: new.registration_deadline,
            capacity: Capacity::new(new.capacity),
            pricing,
            status: EventStatus::Draft,
            created_at: now,
            updated_at: now,
        };
        validate_event(&event).map_err(RegistryError::Validation)?;

        let body = encode(&event)?;
        let (slug, body) = (event.slug.as_str(), &body);
        let id = run_transaction(self.store.as_ref(), &self.settings.retry, |mut tx| async move {
            ensure_slug_available(&mut *tx, slug, None).await?;
            let id = tx.create(EVENTS, body.clone()).await?;
            Ok::<_, RegistryError>((tx, id))
        })
        .await?;

        info!(event_id = %id, slug = %event.slug, "Event created");
        Ok(Event { id, ..event })
    }

    pub async fn update_event(&self, id: &str, patch: &EventPatch) -> Result<Event, RegistryError> {
        let event = run_transaction(self.store.as_ref(), &self.settings.retry, |mut tx| async move {
            let mut event = load_event(&mut *tx, id).await?;
            let has_registrations = match patch.capacity {
                Some(total) if total != event.capacity.total => !tx
                    .query(EVENT_REGISTRATIONS, &Query::new().eq("event_id", id))
                    .await?
                    .is_empty(),
                _ => false,
            };
            apply_patch(&mut event, patch, has_registrations)?;
            event.updated_at = self.clock.now();
            validate_event(&event).map_err(RegistryError::Validation)?;
            ensure_slug_available(&mut *tx, &event.slug, Some(id)).await?;
            tx.update(EVENTS, id, encode(&event)?).await?;
            Ok::<_, RegistryError>((tx, event))
        })
        .await?;

        info!(event_id = %id, status = event.status.as_str(), "Event updated");
        Ok(event)
    }

    pub async fn update_status(&self, id: &str, status: EventStatus) -> Result<Event, RegistryError> {
        let event = run_transaction(self.store.as_ref(), &self.settings.retry, |mut tx| async move {
            let mut event = load_event(&mut *tx, id).await?;
            transition_event(&mut event, status)?;
            event.updated_at = self.clock.now();
            tx.update(
                EVENTS,
                id,
                json!({ "status": event.status, "updated_at": event.updated_at }),
            )
            .await?;
            Ok::<_, RegistryError>((tx, event))
        })
        .await?;

        info!(event_id = %id, status = status.as_str(), "Event status changed");
        Ok(event)
    }

    /// Applies `status` to each event independently; one failure does not
    /// stop the rest.
    pub async fn bulk_update_status(
        &self,
        ids: &[String],
        status: EventStatus,
    ) -> Vec<BulkStatusOutcome> {
        let mut outcomes = Vec::with_capacity(ids.len());
        for id in ids {
            let outcome = match self.update_status(id, status).await {
                Ok(_) => BulkStatusOutcome {
                    id: id.clone(),
                    updated: true,
                    error: None,
                },
                Err(err) => BulkStatusOutcome {
                    id: id.clone(),
                    updated: false,
                    error: Some(err.code()),
                },
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Removes the event together with all of its registrations.
    pub async fn delete_event(&self, id: &str) -> Result<(), RegistryError> {
        let removed = run_transaction(self.store.as_ref(), &self.settings.retry, |mut tx| async move {
            load_event(&mut *tx, id).await?;
            let registrations = tx
                .query(EVENT_REGISTRATIONS, &Query::new().eq("event_id", id))
                .await?;
            for doc in &registrations {
                tx.delete(EVENT_REGISTRATIONS, &doc.id).await?;
            }
            tx.delete(EVENTS, id).await?;
            Ok::<_, RegistryError>((tx, registrations.len()))
        })
        .await?;

        info!(event_id = %id, registrations = removed, "Event deleted");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Registrations
    // ------------------------------------------------------------------

    pub async fn get_registration(&self, id: &str) -> Result<EventRegistration, RegistryError> {
        let doc = self
            .store
            .get(EVENT_REGISTRATIONS, id)
            .await?
            .ok_or_else(|| RegistryError::not_found("registration", id))?;
        Ok(doc.decode()?)
    }

    pub async fn list_registrations(
        &self,
        filter: &RegistrationFilter,
    ) -> Result<Vec<EventRegistration>, RegistryError> {
        let mut query = Query::new();
        if let Some(event_id) = &filter.event_id {
            query = query.eq("event_id", event_id.as_str());
        }
        if let Some(status) = filter.status {
            query = query.eq("status", status.as_str());
        }
        if let Some(payment_status) = filter.payment_status {
            query = query.eq("payment_status", payment_status.as_str());
        }

        let docs = self.store.query(EVENT_REGISTRATIONS, &query).await?;
        let mut registrations: Vec<EventRegistration> = decode_all(&docs)?;
        registrations.sort_by(|a, b| {
            a.registered_at
                .cmp(&b.registered_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(registrations)
    }

    /// Registers an attendee, confirmed while seats remain and waitlisted
    /// afterwards (unless waitlisting is disabled, which yields `EventFull`).
    ///
    /// The price is locked in from the tier's effective price at this instant.
    pub async fn register(
        &self,
        event_id: &str,
        request: &RegistrationRequest,
    ) -> Result<EventRegistration, RegistryError> {
        request
            .attendee
            .validate()
            .map_err(RegistryError::Validation)?;
        let allow_waitlist = request.allow_waitlist.unwrap_or(self.settings.allow_waitlist);
        let attendee_key = request.attendee.key();
        let attendee_key = attendee_key.as_str();

        let registration =
            run_transaction(self.store.as_ref(), &self.settings.retry, |mut tx| async move {
                let registration = self
                    .register_in(&mut *tx, event_id, request, attendee_key, allow_waitlist)
                    .await?;
                Ok::<_, RegistryError>((tx, registration))
            })
            .await?;

        info!(
            event_id = %event_id,
            registration_id = %registration.id,
            status = registration.status.as_str(),
            amount = %registration.payment_amount,
            "Attendee registered"
        );
        Ok(registration)
    }

    async fn register_in(
        &self,
        tx: &mut dyn Transaction,
        event_id: &str,
        request: &RegistrationRequest,
        attendee_key: &str,
        allow_waitlist: bool,
    ) -> Result<EventRegistration, RegistryError> {
        let now = self.clock.now();
        let mut event = load_event(tx, event_id).await?;
        if !is_registration_open(&event, now) {
            return Err(RegistryError::EventClosed {
                event_id: event_id.to_string(),
            });
        }

        let tier = event
            .tier(request.tier_id.as_deref())
            .ok_or_else(|| {
                RegistryError::not_found(
                    "pricing tier",
                    request.tier_id.as_deref().unwrap_or("default"),
                )
            })?;
        let amount = tier_price(tier, now);
        let tier_id = tier.id.clone();

        let existing = tx
            .query(
                EVENT_REGISTRATIONS,
                &Query::new()
                    .eq("event_id", event_id)
                    .eq("attendee_key", attendee_key),
            )
            .await?;
        let existing: Vec<EventRegistration> = decode_all(&existing)?;
        if existing.iter().any(|r| r.status.is_active()) {
            return Err(RegistryError::DuplicateRegistration {
                event_id: event_id.to_string(),
            });
        }

        let status = if !event.capacity.is_full() {
            event.capacity.registered_count += 1;
            RegistrationStatus::Registered
        } else if allow_waitlist {
            event.capacity.waitlist_count += 1;
            RegistrationStatus::Waitlist
        } else {
            return Err(RegistryError::EventFull {
                event_id: event_id.to_string(),
            });
        };

        let mut registration = EventRegistration {
            id: String::new(),
            event_id: event_id.to_string(),
            attendee: request.attendee.clone(),
            attendee_key: attendee_key.to_string(),
            tier_id,
            status,
            payment_status: if amount > Decimal::ZERO {
                PaymentStatus::Pending
            } else {
                PaymentStatus::Paid
            },
            payment_amount: amount,
            registered_at: now,
            checked_in_at: None,
            cancelled_at: None,
            promoted_at: None,
        };
        registration.id = tx
            .create(EVENT_REGISTRATIONS, encode(&registration)?)
            .await?;
        tx.update(
            EVENTS,
            event_id,
            json!({ "capacity": event.capacity, "updated_at": now }),
        )
        .await?;

        Ok(registration)
    }

    /// Cancels a `registered` or `waitlist` entry and releases its counter.
    ///
    /// Cancelling twice is rejected with `InvalidTransition` and leaves the
    /// counters untouched.
    pub async fn cancel_registration(&self, id: &str) -> Result<Cancellation, RegistryError> {
        let cancellation =
            run_transaction(self.store.as_ref(), &self.settings.retry, |mut tx| async move {
                let cancellation = self.cancel_in(&mut *tx, id).await?;
                Ok::<_, RegistryError>((tx, cancellation))
            })
            .await?;

        info!(
            registration_id = %id,
            event_id = %cancellation.registration.event_id,
            promoted = ?cancellation.promoted.as_ref().map(|r| r.id.as_str()),
            "Registration cancelled"
        );
        Ok(cancellation)
    }

    async fn cancel_in(
        &self,
        tx: &mut dyn Transaction,
        id: &str,
    ) -> Result<Cancellation, RegistryError> {
        let now = self.clock.now();
        let mut registration = load_registration(tx, id).await?;
        let prior = registration.status;
        if !matches!(
            prior,
            RegistrationStatus::Registered | RegistrationStatus::Waitlist
        ) {
            return Err(RegistryError::InvalidTransition {
                entity: "registration",
                from: prior.as_str(),
                to: RegistrationStatus::Cancelled.as_str(),
            });
        }
        let mut event = load_event(tx, &registration.event_id).await?;

        registration.status = RegistrationStatus::Cancelled;
        registration.cancelled_at = Some(now);
        if registration.payment_status == PaymentStatus::Paid
            && registration.payment_amount > Decimal::ZERO
        {
            registration.payment_status = PaymentStatus::Refunded;
        }
        tx.update(
            EVENT_REGISTRATIONS,
            id,
            json!({
                "status": registration.status,
                "payment_status": registration.payment_status,
                "cancelled_at": now,
            }),
        )
        .await?;

        let mut promoted = None;
        if prior == RegistrationStatus::Registered {
            event.capacity.registered_count = event.capacity.registered_count.saturating_sub(1);
            if self.settings.promote_waitlist {
                promoted = promote_next(tx, &mut event, now).await?;
            }
        } else {
            event.capacity.waitlist_count = event.capacity.waitlist_count.saturating_sub(1);
        }

        tx.update(
            EVENTS,
            &event.id,
            json!({ "capacity": event.capacity, "updated_at": now }),
        )
        .await?;

        Ok(Cancellation {
            registration,
            promoted,
        })
    }

    /// Marks a confirmed registration as attended.
    pub async fn check_in(&self, id: &str) -> Result<EventRegistration, RegistryError> {
        let registration =
            run_transaction(self.store.as_ref(), &self.settings.retry, |mut tx| async move {
                let mut registration = load_registration(&mut *tx, id).await?;
                if registration.status != RegistrationStatus::Registered {
                    return Err(RegistryError::InvalidTransition {
                        entity: "registration",
                        from: registration.status.as_str(),
                        to: RegistrationStatus::Attended.as_str(),
                    });
                }
                let now = self.clock.now();
                registration.status = RegistrationStatus::Attended;
                registration.checked_in_at = Some(now);
                tx.update(
                    EVENT_REGISTRATIONS,
                    id,
                    json!({ "status": registration.status, "checked_in_at": now }),
                )
                .await?;
                Ok::<_, RegistryError>((tx, registration))
            })
            .await?;

        info!(registration_id = %id, event_id = %registration.event_id, "Attendee checked in");
        Ok(registration)
    }
}

/// Moves the longest-waiting registration of `event` onto a freed seat.
async fn promote_next(
    tx: &mut dyn Transaction,
    event: &mut Event,
    now: DateTime<Utc>,
) -> Result<Option<EventRegistration>, RegistryError> {
    if event.capacity.is_full() {
        return Ok(None);
    }

    let docs = tx
        .query(
            EVENT_REGISTRATIONS,
            &Query::new()
                .eq("event_id", event.id.as_str())
                .eq("status", RegistrationStatus::Waitlist.as_str()),
        )
        .await?;
    let waiting: Vec<EventRegistration> = decode_all(&docs)?;
    let Some(mut next) = waiting.into_iter().min_by(|a, b| {
        a.registered_at
            .cmp(&b.registered_at)
            .then_with(|| a.id.cmp(&b.id))
    }) else {
        return Ok(None);
    };

    next.status = RegistrationStatus::Registered;
    next.promoted_at = Some(now);
    tx.update(
        EVENT_REGISTRATIONS,
        &next.id,
        json!({ "status": next.status, "promoted_at": now }),
    )
    .await?;

    event.capacity.waitlist_count = event.capacity.waitlist_count.saturating_sub(1);
    event.capacity.registered_count += 1;
    Ok(Some(next))
}

#[cfg(test)]
mod tests;
