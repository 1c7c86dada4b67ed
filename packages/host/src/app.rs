//! Composition root.
//!
//! [`App`] builds the full object graph over a window backend and a data
//! directory, wires the weak references between the managers, and owns the
//! startup and shutdown sequences. Nothing in the crate reaches for a
//! global; every collaborator is handed its dependencies here.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::info;

use gaze_shared::ChannelRegistry;

use crate::bridge::HostBridge;
use crate::config::ConfigStore;
use crate::error::HostResult;
use crate::ipc::handlers::{self, HandlerContext};
use crate::ipc::{IpcManager, WindowLister};
use crate::store::StateStore;
use crate::windows::communication::WindowCommunicationManager;
use crate::windows::events::WindowEventHandler;
use crate::windows::manager::WindowManager;
use crate::windows::state::WindowStateManager;
use crate::platform::WindowBackend;

/// Per-user data directory for configuration and persisted state.
#[must_use]
pub fn default_data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("gaze-detection"))
}

/// The assembled application.
pub struct App {
    backend: Arc<dyn WindowBackend>,
    ipc: Arc<IpcManager>,
    config: Arc<ConfigStore>,
    store: Arc<StateStore>,
    window_state: Arc<WindowStateManager>,
    events: Arc<WindowEventHandler>,
    windows: Arc<WindowManager>,
    communication: Arc<WindowCommunicationManager>,
    quit_requested: Arc<AtomicBool>,
    initialized: AtomicBool,
}

impl App {
    /// Builds the object graph. Nothing is started until
    /// [`App::initialize`] runs.
    #[must_use]
    pub fn new(backend: Arc<dyn WindowBackend>, data_dir: &Path) -> Arc<Self> {
        let registry = Arc::new(ChannelRegistry::with_builtin_channels());
        let ipc = Arc::new(IpcManager::new(registry));
        let config = ConfigStore::new(data_dir);
        let store = StateStore::new(data_dir);
        let quit_requested = Arc::new(AtomicBool::new(false));

        let window_state = WindowStateManager::new(Arc::clone(&store), Arc::clone(&backend));
        let events = WindowEventHandler::new(
            Arc::clone(&ipc),
            Arc::clone(&window_state),
            Arc::clone(&backend),
            Arc::clone(&quit_requested),
        );
        let windows = WindowManager::new(
            Arc::clone(&backend),
            Arc::clone(&window_state),
            Arc::clone(&ipc),
            Arc::clone(&events),
        );
        let communication =
            WindowCommunicationManager::new(Arc::clone(&ipc), Arc::clone(&store));

        events.set_window_manager(Arc::downgrade(&windows));
        events.set_communication(Arc::downgrade(&communication));
        communication.set_window_manager(Arc::downgrade(&windows));
        {
            let lister: Arc<dyn WindowLister> = Arc::clone(&windows) as Arc<dyn WindowLister>;
            ipc.set_window_source(Arc::downgrade(&lister));
        }

        Arc::new(Self {
            backend,
            ipc,
            config,
            store,
            window_state,
            events,
            windows,
            communication,
            quit_requested,
            initialized: AtomicBool::new(false),
        })
    }

    /// Starts the application: loads persisted state, registers every
    /// handler and listener, and opens the main window. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error when the main window cannot be created.
    pub fn initialize(self: &Arc<Self>) -> HostResult<()> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.store.initialize(&self.ipc);
        self.window_state.load();
        self.ipc.initialize();

        let context = HandlerContext {
            config: Arc::clone(&self.config),
            windows: Arc::downgrade(&self.windows),
            quit_requested: Arc::clone(&self.quit_requested),
        };
        handlers::install(&self.ipc, &context);
        self.communication.initialize();
        self.events.initialize();

        self.windows.create_main_window()?;
        info!("application initialized");
        Ok(())
    }

    /// Stops everything in reverse order of startup. Idempotent.
    pub fn shutdown(&self) {
        if !self.initialized.swap(false, Ordering::SeqCst) {
            return;
        }
        self.quit_requested.store(true, Ordering::SeqCst);

        self.windows.close_all_windows();
        self.events.shutdown();
        self.communication.shutdown();
        self.window_state.shutdown();
        self.store.shutdown();
        self.ipc.shutdown();
        info!("application shut down");
    }

    /// Mints a bridge for the guest hosted in `window_id`.
    #[must_use]
    pub fn attach_guest(&self, window_id: u64) -> Option<HostBridge> {
        let window = self
            .windows
            .window_by_id(window_id)
            .filter(|window| !window.is_destroyed())?;
        Some(HostBridge::for_window(Arc::clone(&self.ipc), &window))
    }

    /// `true` once a quit has been requested.
    #[must_use]
    pub fn is_quitting(&self) -> bool {
        self.quit_requested.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<dyn WindowBackend> {
        &self.backend
    }

    #[must_use]
    pub fn ipc(&self) -> &Arc<IpcManager> {
        &self.ipc
    }

    #[must_use]
    pub fn config(&self) -> &Arc<ConfigStore> {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    #[must_use]
    pub fn windows(&self) -> &Arc<WindowManager> {
        &self.windows
    }

    #[must_use]
    pub fn window_state(&self) -> &Arc<WindowStateManager> {
        &self.window_state
    }

    #[must_use]
    pub fn events(&self) -> &Arc<WindowEventHandler> {
        &self.events
    }

    #[must_use]
    pub fn communication(&self) -> &Arc<WindowCommunicationManager> {
        &self.communication
    }
}
