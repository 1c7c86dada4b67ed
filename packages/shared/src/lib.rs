//! Shared types for the Gaze Detection desktop core.
//!
//! This crate provides the IPC protocol and window types used by both the
//! host process and guest surfaces.

pub mod bridge;
pub mod channels;
pub mod events;
pub mod message;
pub mod state;

pub use bridge::{Bridge, BridgeError, BridgeListener, ListenerId};
pub use channels::{ChannelDescriptor, ChannelRegistry, SecurityLevel};
pub use events::WindowEventType;
pub use message::{
    Message, MessageKind, ResponseError, ValidationError, generate_id, random_base36,
    validate_message,
};
pub use state::{Rect, UnknownWindowType, WindowState, WindowType};
