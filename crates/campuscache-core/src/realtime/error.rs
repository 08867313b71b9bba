use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RealtimeError {
    #[error("realtime transport is closed")]
    Closed,

    #[error("failed to subscribe to {event}: {reason}")]
    Subscribe { event: String, reason: String },

    #[error("no handler {id} registered for {event}")]
    UnknownHandler { event: String, id: u64 },
}
