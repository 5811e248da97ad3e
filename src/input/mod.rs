pub mod events;
pub mod handler;

// Re-export the essential types
pub use events::{EventKind, MapEvent, Primitive, PrimitiveKind};
pub use handler::{Effect, EventCallback, LocalEventBus, SubscriptionHandle};
