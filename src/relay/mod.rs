//! The MiddleMan relay: routes framed messages between many front-end connections and
//! the single persistent Signing Service connection.

pub mod auth;
pub mod middleman;
pub mod pool;
pub mod tracker;

pub use auth::{AuthError, AuthenticatedPeer};
pub use middleman::{
    request_consumer, request_producer, response_consumer, response_producer, MiddleManState,
    RequestQueueItem, ResponseQueueItem,
};
pub use pool::{ConnectionCounter, QueuePool, DEFAULT_CONNECTION_COUNTER_LIMIT};
pub use tracker::{MessageTracker, MessageTrackerItem};
