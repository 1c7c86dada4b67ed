//! Host-side core for Gaze Detection.
//!
//! The host owns the windows, the IPC routing, the persisted state, and the
//! configuration. Everything is wired by [`app::App`], the composition root;
//! nothing in this crate reaches for global state.

pub mod app;
pub mod bridge;
pub mod config;
pub mod error;
pub mod ipc;
pub mod logger;
pub mod platform;
pub mod store;
pub mod windows;

pub use app::App;
pub use bridge::HostBridge;
pub use error::{HostError, HostResult};
