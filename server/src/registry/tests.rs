use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use super::*;
use crate::models::{Attendee, EarlyBird, PricingTier};
use crate::store::MemoryStore;

fn at(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

struct Harness {
    registry: Arc<EventRegistry>,
    clock: Arc<FixedClock>,
}

fn harness(settings: RegistrySettings) -> Harness {
    let clock = Arc::new(FixedClock::new(at("2024-02-01T12:00:00Z")));
    let registry = EventRegistry::new(Arc::new(MemoryStore::new()), clock.clone(), settings);
    Harness {
        registry: Arc::new(registry),
        clock,
    }
}

fn new_event(title: &str, total: u32) -> NewEvent {
    NewEvent {
        title: title.to_string(),
        slug: None,
        description: Some("Two days of talks".to_string()),
        event_type: "conference".to_string(),
        visibility: EventVisibility::Public,
        location: Some("Lisbon".to_string()),
        start_date: at("2024-04-10T09:00:00Z"),
        end_date: at("2024-04-11T18:00:00Z"),
        timezone: "Europe/Lisbon".to_string(),
        registration_deadline: at("2024-04-01T00:00:00Z"),
        capacity: total,
        pricing: vec![
            PricingTier {
                id: "general".to_string(),
                name: "General".to_string(),
                price: Decimal::new(300, 0),
                early_bird: Some(EarlyBird {
                    price: Decimal::new(250, 0),
                    deadline: at("2024-03-01T00:00:00Z"),
                }),
                is_default: true,
            },
            PricingTier {
                id: "student".to_string(),
                name: "Student".to_string(),
                price: Decimal::new(50, 0),
                early_bird: None,
                is_default: false,
            },
        ],
    }
}

async fn published_event(registry: &EventRegistry, title: &str, total: u32) -> Event {
    let event = registry.create_event(new_event(title, total)).await.unwrap();
    registry
        .update_status(&event.id, EventStatus::Published)
        .await
        .unwrap()
}

fn user(id: &str) -> RegistrationRequest {
    RegistrationRequest {
        attendee: Attendee::User {
            user_id: id.to_string(),
        },
        tier_id: None,
        allow_waitlist: None,
    }
}

#[tokio::test]
async fn test_create_event_starts_as_draft() {
    let h = harness(RegistrySettings::default());
    let event = h
        .registry
        .create_event(new_event("Rust Lisbon 2024", 10))
        .await
        .unwrap();

    assert_eq!(event.status, EventStatus::Draft);
    assert_eq!(event.slug, "rust-lisbon-2024");
    assert_eq!(event.capacity, Capacity::new(10));
    assert_eq!(h.registry.get_event(&event.id).await.unwrap(), event);
    assert_eq!(
        h.registry.get_event_by_slug("rust-lisbon-2024").await.unwrap().id,
        event.id
    );
}

#[tokio::test]
async fn test_create_event_rejects_taken_slug() {
    let h = harness(RegistrySettings::default());
    h.registry.create_event(new_event("Meetup", 10)).await.unwrap();
    let err = h
        .registry
        .create_event(new_event("Meetup", 10))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::Validation(_)));
}

#[tokio::test]
async fn test_create_event_rejects_invalid_input() {
    let h = harness(RegistrySettings::default());
    let mut input = new_event("Broken", 0);
    input.slug = Some("broken".to_string());
    assert!(matches!(
        h.registry.create_event(input).await,
        Err(RegistryError::Validation(_))
    ));
}

#[tokio::test]
async fn test_register_then_get_event_reflects_counter() {
    let h = harness(RegistrySettings::default());
    let event = published_event(&h.registry, "Round trip", 5).await;

    let registration = h.registry.register(&event.id, &user("u-1")).await.unwrap();
    assert_eq!(registration.status, RegistrationStatus::Registered);

    let event = h.registry.get_event(&event.id).await.unwrap();
    assert_eq!(event.capacity.registered_count, 1);
    assert_eq!(event.capacity.waitlist_count, 0);
    assert_eq!(event.capacity.available(), 4);
}

#[tokio::test]
async fn test_full_event_waitlists_by_default() {
    let h = harness(RegistrySettings::default());
    let event = published_event(&h.registry, "Tiny", 1).await;

    h.registry.register(&event.id, &user("u-1")).await.unwrap();
    let second = h.registry.register(&event.id, &user("u-2")).await.unwrap();
    assert_eq!(second.status, RegistrationStatus::Waitlist);

    let event = h.registry.get_event(&event.id).await.unwrap();
    assert_eq!(event.capacity.registered_count, 1);
    assert_eq!(event.capacity.waitlist_count, 1);
}

#[tokio::test]
async fn test_full_event_without_waitlist_is_rejected() {
    let h = harness(RegistrySettings::default());
    let event = published_event(&h.registry, "Tiny", 1).await;
    h.registry.register(&event.id, &user("u-1")).await.unwrap();

    let mut request = user("u-2");
    request.allow_waitlist = Some(false);
    let err = h.registry.register(&event.id, &request).await.unwrap_err();
    assert!(matches!(err, RegistryError::EventFull { .. }));

    let event = h.registry.get_event(&event.id).await.unwrap();
    assert_eq!(event.capacity.waitlist_count, 0);
}

#[tokio::test]
async fn test_server_default_can_disable_waitlist() {
    let h = harness(RegistrySettings {
        allow_waitlist: false,
        ..RegistrySettings::default()
    });
    let event = published_event(&h.registry, "Tiny", 1).await;
    h.registry.register(&event.id, &user("u-1")).await.unwrap();
    assert!(matches!(
        h.registry.register(&event.id, &user("u-2")).await,
        Err(RegistryError::EventFull { .. })
    ));
}

#[tokio::test]
async fn test_duplicate_registration_leaves_counters_alone() {
    let h = harness(RegistrySettings::default());
    let event = published_event(&h.registry, "Dupes", 10).await;

    h.registry.register(&event.id, &user("u-1")).await.unwrap();
    let err = h.registry.register(&event.id, &user("u-1")).await.unwrap_err();
    assert!(matches!(err, RegistryError::DuplicateRegistration { .. }));

    let event = h.registry.get_event(&event.id).await.unwrap();
    assert_eq!(event.capacity.registered_count, 1);
}

#[tokio::test]
async fn test_guest_duplicate_detected_case_insensitively() {
    let h = harness(RegistrySettings::default());
    let event = published_event(&h.registry, "Guests", 10).await;
    let guest = |email: &str| RegistrationRequest {
        attendee: Attendee::Guest {
            name: "Grace".to_string(),
            email: email.to_string(),
        },
        tier_id: None,
        allow_waitlist: None,
    };

    h.registry
        .register(&event.id, &guest("grace@example.com"))
        .await
        .unwrap();
    assert!(matches!(
        h.registry.register(&event.id, &guest("GRACE@example.com")).await,
        Err(RegistryError::DuplicateRegistration { .. })
    ));
}

#[tokio::test]
async fn test_draft_event_is_closed() {
    let h = harness(RegistrySettings::default());
    let event = h.registry.create_event(new_event("Draft", 10)).await.unwrap();
    let err = h.registry.register(&event.id, &user("u-1")).await.unwrap_err();
    assert!(matches!(err, RegistryError::EventClosed { .. }));
}

#[tokio::test]
async fn test_registration_closes_after_deadline() {
    let h = harness(RegistrySettings::default());
    let event = published_event(&h.registry, "Late", 10).await;

    h.clock.set(at("2024-04-01T00:00:00Z"));
    h.registry.register(&event.id, &user("u-1")).await.unwrap();

    h.clock.advance(Duration::seconds(1));
    assert!(matches!(
        h.registry.register(&event.id, &user("u-2")).await,
        Err(RegistryError::EventClosed { .. })
    ));
}

#[tokio::test]
async fn test_missing_event_and_tier() {
    let h = harness(RegistrySettings::default());
    assert!(matches!(
        h.registry.register("nope", &user("u-1")).await,
        Err(RegistryError::NotFound {
            resource: "event",
            ..
        })
    ));

    let event = published_event(&h.registry, "Tiers", 10).await;
    let mut request = user("u-1");
    request.tier_id = Some("backstage".to_string());
    assert!(matches!(
        h.registry.register(&event.id, &request).await,
        Err(RegistryError::NotFound {
            resource: "pricing tier",
            ..
        })
    ));
}

#[tokio::test]
async fn test_payment_amount_is_locked_at_registration() {
    let h = harness(RegistrySettings::default());
    let event = published_event(&h.registry, "Early bird", 10).await;

    h.clock.set(at("2024-02-29T23:59:59Z"));
    let early = h.registry.register(&event.id, &user("u-1")).await.unwrap();
    assert_eq!(early.payment_amount, Decimal::new(250, 0));
    assert_eq!(early.payment_status, PaymentStatus::Pending);

    h.clock.set(at("2024-03-01T00:00:01Z"));
    let late = h.registry.register(&event.id, &user("u-2")).await.unwrap();
    assert_eq!(late.payment_amount, Decimal::new(300, 0));

    let mut student = user("u-3");
    student.tier_id = Some("student".to_string());
    let student = h.registry.register(&event.id, &student).await.unwrap();
    assert_eq!(student.payment_amount, Decimal::new(50, 0));
    assert_eq!(student.tier_id, "student");

    let stored = h.registry.get_registration(&early.id).await.unwrap();
    assert_eq!(stored.payment_amount, Decimal::new(250, 0));
}

#[tokio::test]
async fn test_cancel_registered_frees_a_seat() {
    let h = harness(RegistrySettings::default());
    let event = published_event(&h.registry, "Cancel", 1).await;
    let first = h.registry.register(&event.id, &user("u-1")).await.unwrap();
    h.registry.register(&event.id, &user("u-2")).await.unwrap();

    let cancellation = h.registry.cancel_registration(&first.id).await.unwrap();
    assert_eq!(
        cancellation.registration.status,
        RegistrationStatus::Cancelled
    );
    assert!(cancellation.registration.cancelled_at.is_some());
    assert!(cancellation.promoted.is_none());

    let event = h.registry.get_event(&event.id).await.unwrap();
    assert_eq!(event.capacity.registered_count, 0);
    assert_eq!(event.capacity.waitlist_count, 1);
}

#[tokio::test]
async fn test_cancel_waitlisted_decrements_waitlist() {
    let h = harness(RegistrySettings::default());
    let event = published_event(&h.registry, "Cancel", 1).await;
    h.registry.register(&event.id, &user("u-1")).await.unwrap();
    let waiting = h.registry.register(&event.id, &user("u-2")).await.unwrap();

    h.registry.cancel_registration(&waiting.id).await.unwrap();
    let event = h.registry.get_event(&event.id).await.unwrap();
    assert_eq!(event.capacity.registered_count, 1);
    assert_eq!(event.capacity.waitlist_count, 0);
}

#[tokio::test]
async fn test_cancel_twice_is_rejected_without_double_decrement() {
    let h = harness(RegistrySettings::default());
    let event = published_event(&h.registry, "Twice", 5).await;
    let a = h.registry.register(&event.id, &user("u-1")).await.unwrap();
    h.registry.register(&event.id, &user("u-2")).await.unwrap();

    h.registry.cancel_registration(&a.id).await.unwrap();
    let err = h.registry.cancel_registration(&a.id).await.unwrap_err();
    assert!(matches!(err, RegistryError::InvalidTransition { .. }));

    let event = h.registry.get_event(&event.id).await.unwrap();
    assert_eq!(event.capacity.registered_count, 1);

    assert!(matches!(
        h.registry.cancel_registration("missing").await,
        Err(RegistryError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_attendee_can_register_again_after_cancelling() {
    let h = harness(RegistrySettings::default());
    let event = published_event(&h.registry, "Again", 5).await;
    let first = h.registry.register(&event.id, &user("u-1")).await.unwrap();
    h.registry.cancel_registration(&first.id).await.unwrap();

    let second = h.registry.register(&event.id, &user("u-1")).await.unwrap();
    assert_ne!(first.id, second.id);
    assert_eq!(second.status, RegistrationStatus::Registered);
}

#[tokio::test]
async fn test_free_registration_is_paid_and_not_refunded() {
    let h = harness(RegistrySettings::default());
    let mut input = new_event("Free", 5);
    input.pricing = vec![PricingTier {
        id: String::new(),
        name: "Entry".to_string(),
        price: Decimal::new(10, 0),
        early_bird: Some(EarlyBird {
            price: Decimal::ZERO,
            deadline: at("2024-03-01T00:00:00Z"),
        }),
        is_default: false,
    }];
    let event = h.registry.create_event(input).await.unwrap();
    assert_eq!(event.pricing[0].id, "entry");
    assert!(event.pricing[0].is_default);
    h.registry
        .update_status(&event.id, EventStatus::Published)
        .await
        .unwrap();

    let free = h.registry.register(&event.id, &user("u-1")).await.unwrap();
    assert_eq!(free.payment_amount, Decimal::ZERO);
    assert_eq!(free.payment_status, PaymentStatus::Paid);

    let cancelled = h.registry.cancel_registration(&free.id).await.unwrap();
    assert_eq!(
        cancelled.registration.payment_status,
        PaymentStatus::Paid
    );
}

#[tokio::test]
async fn test_check_in_only_from_registered() {
    let h = harness(RegistrySettings::default());
    let event = published_event(&h.registry, "Doors", 1).await;
    let seated = h.registry.register(&event.id, &user("u-1")).await.unwrap();
    let waiting = h.registry.register(&event.id, &user("u-2")).await.unwrap();

    let attended = h.registry.check_in(&seated.id).await.unwrap();
    assert_eq!(attended.status, RegistrationStatus::Attended);
    assert!(attended.checked_in_at.is_some());

    assert!(matches!(
        h.registry.check_in(&seated.id).await,
        Err(RegistryError::InvalidTransition { .. })
    ));
    assert!(matches!(
        h.registry.check_in(&waiting.id).await,
        Err(RegistryError::InvalidTransition { .. })
    ));
    assert!(matches!(
        h.registry.cancel_registration(&seated.id).await,
        Err(RegistryError::InvalidTransition { .. })
    ));
}

#[tokio::test]
async fn test_waitlist_promotion_when_enabled() {
    let h = harness(RegistrySettings {
        promote_waitlist: true,
        ..RegistrySettings::default()
    });
    let event = published_event(&h.registry, "Promote", 1).await;
    let seated = h.registry.register(&event.id, &user("u-1")).await.unwrap();

    h.clock.advance(Duration::minutes(1));
    let earliest = h.registry.register(&event.id, &user("u-2")).await.unwrap();
    h.clock.advance(Duration::minutes(1));
    let later = h.registry.register(&event.id, &user("u-3")).await.unwrap();

    let cancellation = h.registry.cancel_registration(&seated.id).await.unwrap();
    let promoted = cancellation.promoted.expect("a waitlisted registration is promoted");
    assert_eq!(promoted.id, earliest.id);
    assert_eq!(promoted.status, RegistrationStatus::Registered);
    assert_eq!(promoted.payment_amount, earliest.payment_amount);
    assert!(promoted.promoted_at.is_some());

    let event = h.registry.get_event(&event.id).await.unwrap();
    assert_eq!(event.capacity.registered_count, 1);
    assert_eq!(event.capacity.waitlist_count, 1);
    assert_eq!(
        h.registry.get_registration(&later.id).await.unwrap().status,
        RegistrationStatus::Waitlist
    );
}

#[tokio::test]
async fn test_event_status_transitions() {
    let h = harness(RegistrySettings::default());
    let event = published_event(&h.registry, "Lifecycle", 5).await;

    h.registry
        .update_status(&event.id, EventStatus::Cancelled)
        .await
        .unwrap();
    let err = h
        .registry
        .update_status(&event.id, EventStatus::Published)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RegistryError::InvalidTransition {
            entity: "event",
            from: "cancelled",
            to: "published"
        }
    ));
    assert!(matches!(
        h.registry.register(&event.id, &user("u-1")).await,
        Err(RegistryError::EventClosed { .. })
    ));
}

#[tokio::test]
async fn test_capacity_is_frozen_once_registrations_exist() {
    let h = harness(RegistrySettings::default());
    let event = published_event(&h.registry, "Frozen", 5).await;

    let grown = h
        .registry
        .update_event(
            &event.id,
            &EventPatch {
                capacity: Some(8),
                title: Some("Frozen solid".to_string()),
                ..EventPatch::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(grown.capacity.total, 8);
    assert_eq!(grown.title, "Frozen solid");

    h.registry.register(&event.id, &user("u-1")).await.unwrap();
    let err = h
        .registry
        .update_event(
            &event.id,
            &EventPatch {
                capacity: Some(2),
                ..EventPatch::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::Validation(_)));

    let unchanged = h
        .registry
        .update_event(
            &event.id,
            &EventPatch {
                capacity: Some(8),
                location: Some("Porto".to_string()),
                ..EventPatch::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(unchanged.capacity.registered_count, 1);
    assert_eq!(unchanged.location.as_deref(), Some("Porto"));
}

#[tokio::test]
async fn test_capacity_stays_frozen_after_every_registration_is_cancelled() {
    let h = harness(RegistrySettings::default());
    let event = published_event(&h.registry, "Emptied", 5).await;

    let only = h.registry.register(&event.id, &user("u-1")).await.unwrap();
    h.registry.cancel_registration(&only.id).await.unwrap();
    let emptied = h.registry.get_event(&event.id).await.unwrap();
    assert_eq!(emptied.capacity.registered_count, 0);
    assert_eq!(emptied.capacity.waitlist_count, 0);

    let err = h
        .registry
        .update_event(
            &event.id,
            &EventPatch {
                capacity: Some(3),
                ..EventPatch::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::Validation(_)));
    assert_eq!(h.registry.get_event(&event.id).await.unwrap().capacity.total, 5);
}

#[tokio::test]
async fn test_update_rejects_slug_of_another_event() {
    let h = harness(RegistrySettings::default());
    h.registry.create_event(new_event("First", 5)).await.unwrap();
    let second = h.registry.create_event(new_event("Second", 5)).await.unwrap();

    let err = h
        .registry
        .update_event(
            &second.id,
            &EventPatch {
                slug: Some("first".to_string()),
                ..EventPatch::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::Validation(_)));

    let same = h
        .registry
        .update_event(
            &second.id,
            &EventPatch {
                slug: Some("second".to_string()),
                ..EventPatch::default()
            },
        )
        .await;
    assert!(same.is_ok());
}

#[tokio::test]
async fn test_list_events_filters() {
    let h = harness(RegistrySettings::default());
    let past = {
        let mut input = new_event("Past", 5);
        input.start_date = at("2024-01-10T09:00:00Z");
        input.end_date = at("2024-01-10T18:00:00Z");
        input.registration_deadline = at("2024-01-05T00:00:00Z");
        input.pricing[0].early_bird = None;
        h.registry.create_event(input).await.unwrap()
    };
    let upcoming = published_event(&h.registry, "Upcoming", 5).await;
    let mut workshop = new_event("Workshop", 5);
    workshop.event_type = "workshop".to_string();
    workshop.visibility = EventVisibility::Private;
    let workshop = h.registry.create_event(workshop).await.unwrap();

    let all = h.registry.list_events(&EventFilter::default()).await.unwrap();
    let ids: Vec<&str> = all.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids.len(), 3);
    assert_eq!(ids[0], past.id);

    let published = h
        .registry
        .list_events(&EventFilter {
            status: Some(EventStatus::Published),
            ..EventFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].id, upcoming.id);

    let workshops = h
        .registry
        .list_events(&EventFilter {
            event_type: Some("workshop".to_string()),
            visibility: Some(EventVisibility::Private),
            ..EventFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(workshops.len(), 1);
    assert_eq!(workshops[0].id, workshop.id);

    let future = h
        .registry
        .list_events(&EventFilter {
            upcoming_only: true,
            ..EventFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(future.len(), 2);
    assert!(future.iter().all(|e| e.id != past.id));
}

#[tokio::test]
async fn test_delete_event_removes_registrations() {
    let h = harness(RegistrySettings::default());
    let event = published_event(&h.registry, "Gone", 5).await;
    let registration = h.registry.register(&event.id, &user("u-1")).await.unwrap();

    h.registry.delete_event(&event.id).await.unwrap();
    assert!(matches!(
        h.registry.get_event(&event.id).await,
        Err(RegistryError::NotFound { .. })
    ));
    assert!(matches!(
        h.registry.get_registration(&registration.id).await,
        Err(RegistryError::NotFound { .. })
    ));
    assert!(matches!(
        h.registry.delete_event(&event.id).await,
        Err(RegistryError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_bulk_status_reports_each_event() {
    let h = harness(RegistrySettings::default());
    let draft = h.registry.create_event(new_event("Draft", 5)).await.unwrap();
    let cancelled = h.registry.create_event(new_event("Cancelled", 5)).await.unwrap();
    h.registry
        .update_status(&cancelled.id, EventStatus::Cancelled)
        .await
        .unwrap();

    let outcomes = h
        .registry
        .bulk_update_status(
            &[draft.id.clone(), cancelled.id.clone(), "missing".to_string()],
            EventStatus::Published,
        )
        .await;

    assert!(outcomes[0].updated);
    assert_eq!(outcomes[1].error, Some("INVALID_TRANSITION"));
    assert_eq!(outcomes[2].error, Some("NOT_FOUND"));
    assert_eq!(
        h.registry.get_event(&draft.id).await.unwrap().status,
        EventStatus::Published
    );
}

#[tokio::test]
async fn test_list_registrations_by_payment_status() {
    let h = harness(RegistrySettings::default());
    let event = published_event(&h.registry, "Payments", 5).await;
    let other = published_event(&h.registry, "Other", 5).await;
    let a = h.registry.register(&event.id, &user("u-1")).await.unwrap();
    h.clock.advance(Duration::seconds(5));
    let b = h.registry.register(&event.id, &user("u-2")).await.unwrap();
    h.registry.register(&other.id, &user("u-1")).await.unwrap();
    h.registry.cancel_registration(&b.id).await.unwrap();

    let pending = h
        .registry
        .list_registrations(&RegistrationFilter {
            event_id: Some(event.id.clone()),
            payment_status: Some(PaymentStatus::Pending),
            ..RegistrationFilter::default()
        })
        .await
        .unwrap();
    let ids: Vec<&str> = pending.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec![a.id.as_str(), b.id.as_str()]);

    let cancelled = h
        .registry
        .list_registrations(&RegistrationFilter {
            status: Some(RegistrationStatus::Cancelled),
            ..RegistrationFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(cancelled.len(), 1);
    assert_eq!(cancelled[0].id, b.id);
}

fn contention_settings() -> RegistrySettings {
    RegistrySettings {
        retry: RetryPolicy::new(64, StdDuration::from_millis(1)),
        ..RegistrySettings::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_callers_for_the_last_seat() {
    let h = harness(contention_settings());
    let event = published_event(&h.registry, "Last seat", 1).await;

    let (first, second) = (user("u-1"), user("u-2"));
    let (a, b) = tokio::join!(
        h.registry.register(&event.id, &first),
        h.registry.register(&event.id, &second),
    );
    let mut statuses = vec![a.unwrap().status, b.unwrap().status];
    statuses.sort_by_key(|s| s.as_str());
    assert_eq!(
        statuses,
        vec![RegistrationStatus::Registered, RegistrationStatus::Waitlist]
    );

    let event = h.registry.get_event(&event.id).await.unwrap();
    assert_eq!(event.capacity.registered_count, 1);
    assert_eq!(event.capacity.waitlist_count, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_last_seat_race_with_default_retry_policy() {
    let h = harness(RegistrySettings::default());
    let event = published_event(&h.registry, "Last seat, stock settings", 1).await;

    let (first, second) = (user("u-1"), user("u-2"));
    let registry = h.registry.clone();
    let event_id = event.id.clone();
    let racer = tokio::spawn(async move { registry.register(&event_id, &second).await });
    let mine = h.registry.register(&event.id, &first).await.unwrap();
    let theirs = racer.await.unwrap().unwrap();

    let mut statuses = vec![mine.status, theirs.status];
    statuses.sort_by_key(|s| s.as_str());
    assert_eq!(
        statuses,
        vec![RegistrationStatus::Registered, RegistrationStatus::Waitlist]
    );

    let event = h.registry.get_event(&event.id).await.unwrap();
    assert_eq!(event.capacity.registered_count, 1);
    assert_eq!(event.capacity.waitlist_count, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_registrations_never_overbook() {
    let h = harness(contention_settings());
    let event = published_event(&h.registry, "Rush", 3).await;

    let mut handles = Vec::new();
    for n in 0..12 {
        let registry = h.registry.clone();
        let event_id = event.id.clone();
        handles.push(tokio::spawn(async move {
            registry
                .register(&event_id, &user(&format!("u-{}", n)))
                .await
        }));
    }

    let mut registered = 0;
    let mut waitlisted = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap().status {
            RegistrationStatus::Registered => registered += 1,
            RegistrationStatus::Waitlist => waitlisted += 1,
            other => panic!("unexpected status {:?}", other),
        }
    }
    assert_eq!(registered, 3);
    assert_eq!(waitlisted, 9);

    let event = h.registry.get_event(&event.id).await.unwrap();
    assert_eq!(event.capacity.registered_count, 3);
    assert_eq!(event.capacity.waitlist_count, 9);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicates_create_one_registration() {
    let h = harness(contention_settings());
    let event = published_event(&h.registry, "Double click", 5).await;

    let (click, again) = (user("u-1"), user("u-1"));
    let (a, b) = tokio::join!(
        h.registry.register(&event.id, &click),
        h.registry.register(&event.id, &again),
    );
    let outcomes = [a, b];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(outcomes
        .iter()
        .any(|r| matches!(r, Err(RegistryError::DuplicateRegistration { .. }))));

    let event = h.registry.get_event(&event.id).await.unwrap();
    assert_eq!(event.capacity.registered_count, 1);
}
