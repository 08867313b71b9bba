//! Realtime invalidation bridge.
//!
//! A push transport delivers named events (`courses:update`, ...). The bridge
//! maps each event to an `InvalidationRequest` and applies it to the query
//! cache; payloads are ignored. Subscriptions are held by a `RealtimeGuard`
//! and released when it drops.

pub mod bridge;
pub mod channels;
pub mod error;
pub mod transport;

pub use bridge::{ChannelBinding, RealtimeBridge, RealtimeGuard};
pub use error::RealtimeError;
pub use transport::{EventHandler, HandlerId, LocalTransport, RealtimeEvent, RealtimeTransport};
