//! Broadcast fabric: the workspace/system-scoped WebSocket fan-out.
//! [`BroadcastServer`] hosts the axum endpoint and replay buffers;
//! [`BroadcastClient`] is the reconnecting counterpart.

pub mod client;
pub mod error;
pub mod message;
pub mod replay;
pub mod server;

pub use client::{BroadcastClient, ClientSubscription, UpdateHandler};
pub use error::{BroadcastError, Result};
pub use message::{Envelope, Subscription, UpdateOrigin, UpdateSource};
pub use replay::ReplayBuffer;
pub use server::{BroadcastServer, BroadcastStats};
