//! Window management: lifecycle, persisted state, events, behaviors,
//! inter-window communication, and panel layout.

pub mod behavior;
pub mod communication;
pub mod events;
pub mod layout;
pub mod manager;
pub mod state;

pub use behavior::{BehaviorContext, WindowTypeBehavior};
pub use communication::WindowCommunicationManager;
pub use events::WindowEventHandler;
pub use layout::{GridOptions, LineOptions};
pub use manager::{CreateWindowOptions, WindowManager};
pub use state::WindowStateManager;
