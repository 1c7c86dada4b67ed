//! Guest-side IPC client for Gaze Detection.
//!
//! A guest holds a [`gaze_shared::Bridge`] and talks to the host through
//! [`IpcClient`], which layers request timeouts, notification fire-and-forget
//! semantics, and channel subscriptions on top of the raw bridge.

pub mod client;
pub mod error;

pub use client::{DEFAULT_REQUEST_TIMEOUT, IpcClient, SubscriptionId};
pub use error::ClientError;
