//! Shared application state for the API server.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use praxis::core::cancel::CancelToken;
use praxis::io::config::PraxisConfig;
use praxis::io::generator::TextGenerator;
use praxis::io::workspace_store::Session;
use serde::Serialize;
use tokio::sync::broadcast;

/// Events broadcast to SSE clients; serialized as `{"type": "...", ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeEvent {
    RegistryChanged,
    CurrentChanged,
    RunLogAdded { workspace: String, file: String },
    ChatSaved { workspace: String, file: String },
    TaskStarted { run_id: String, iteration: u32, description: String },
    TaskCompleted { run_id: String, iteration: u32 },
    RunFinished { run_id: String, status: String },
}

pub type SharedGenerator = Arc<dyn TextGenerator + Send + Sync>;

/// Shared state accessible from all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<Mutex<Session>>,
    pub config: Arc<PraxisConfig>,
    pub generator: SharedGenerator,
    /// Cancellation token of the run in flight, if any.
    pub active_run: Arc<Mutex<Option<CancelToken>>>,
    pub event_tx: Arc<broadcast::Sender<ChangeEvent>>,
    base_path: PathBuf,
}

impl AppState {
    pub fn new(session: Session, config: PraxisConfig, generator: SharedGenerator) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            base_path: session.store().base_path().to_path_buf(),
            session: Arc::new(Mutex::new(session)),
            config: Arc::new(config),
            generator,
            active_run: Arc::new(Mutex::new(None)),
            event_tx: Arc::new(event_tx),
        }
    }

    /// Directory holding the registry and every workspace.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn session(&self) -> MutexGuard<'_, Session> {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn active_run(&self) -> MutexGuard<'_, Option<CancelToken>> {
        self.active_run
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn broadcast(&self, event: ChangeEvent) {
        // No subscribers is fine.
        let _ = self.event_tx.send(event);
    }
}
