pub mod events;
pub mod health;
pub mod registrations;

pub use events::{
    bulk_update_status, create_event, delete_event, get_event, get_event_by_slug, list_events,
    update_event,
};
pub use health::health_check;
pub use registrations::{
    cancel_registration, check_in, get_registration, list_registrations, register,
};
