//! Real-time hub: connection bookkeeping, presence, message routing and the
//! WebSocket endpoint that drives them.

pub mod events;
pub mod hub;
pub mod lifecycle;
pub mod presence;
pub mod registry;
pub mod router;
pub mod server;
pub mod session;

pub use hub::{ConnectionHub, Transport};
pub use lifecycle::SessionLifecycle;
pub use presence::PresenceNotifier;
pub use registry::ConnectionRegistry;
pub use router::{DeliveryReport, MessageRouter};
