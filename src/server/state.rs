//! Application state shared across all request handlers.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::chat::orchestrator::Orchestrator;
use crate::chat::store::ConversationStore;

/// Shared application state.
pub struct AppState {
    /// Completion orchestrator driving chat requests.
    pub orchestrator: Orchestrator,
    /// Conversation store shared with the orchestrator.
    pub store: Arc<Mutex<ConversationStore>>,
    /// Model name reported by the health endpoint.
    pub model_name: String,
    /// Directory served for non-API paths.
    pub static_dir: PathBuf,
}

impl AppState {
    /// Create a new application state around an orchestrator.
    #[must_use]
    pub fn new(
        orchestrator: Orchestrator,
        model_name: impl Into<String>,
        static_dir: impl Into<PathBuf>,
    ) -> Arc<Self> {
        let store = orchestrator.store();
        Arc::new(Self {
            orchestrator,
            store,
            model_name: model_name.into(),
            static_dir: static_dir.into(),
        })
    }
}
