pub mod event;
pub mod registration;

pub use event::{
    Capacity, EarlyBird, Event, EventPatch, EventStatus, EventVisibility, NewEvent, PricingTier,
};
pub use registration::{
    Attendee, EventRegistration, PaymentStatus, RegistrationRequest, RegistrationStatus,
};
