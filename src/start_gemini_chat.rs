//! Startup helpers for the chat server and terminal client.

use std::future::Future;
use std::process::ExitCode;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::chat::errors::ChatResult;
use crate::chat::orchestrator::Orchestrator;
use crate::chat::repository::SqliteConversationRepository;
use crate::chat::store::ConversationStore;
use crate::config::{ChatConfig, Provider};
use crate::llm::{CompletionService, GeminiClient, ScriptedCompletionService};
use crate::server::{self, AppState};

/// Run the server (used by the `gemini-chat-server` binary).
///
/// # Returns
/// `ExitCode::SUCCESS` on graceful shutdown, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    init_tracing();

    tracing::info!("Starting Gemini chat v{}", env!("CARGO_PKG_VERSION"));

    let config = match ChatConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {e}");
            return ExitCode::from(1);
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    if let Err(e) = rt.block_on(serve(&config, shutdown_signal())) {
        tracing::error!("Server error: {e}");
        return ExitCode::from(1);
    }

    ExitCode::SUCCESS
}

/// Initialize the global tracing subscriber; later calls are ignored.
///
/// Logs go to stderr so they never interleave with terminal chat output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

/// Build the completion service selected by the configuration.
///
/// # Errors
/// Returns an error if the HTTP client cannot be created.
pub fn build_service(config: &ChatConfig) -> ChatResult<Arc<dyn CompletionService>> {
    match config.gemini.provider {
        Provider::Gemini => {
            if config.gemini.api_key.is_none() {
                tracing::warn!(
                    "No API key configured; requests go to {} unauthenticated",
                    config.gemini.base_url
                );
            }
            let client = GeminiClient::new(&config.gemini)?;
            tracing::info!("Completion endpoint: {}", client.endpoint());
            Ok(Arc::new(client))
        }
        Provider::Mock => {
            tracing::info!("Using mock completion service");
            Ok(Arc::new(ScriptedCompletionService::echo()))
        }
    }
}

/// Open the durable slot, restore the store, and wire the orchestrator.
///
/// # Errors
/// Returns an error if the database or the completion service cannot be set up.
pub async fn build_orchestrator(config: &ChatConfig) -> ChatResult<Orchestrator> {
    tracing::info!("Conversation database: {}", config.storage.sqlite_path.display());
    let repository = SqliteConversationRepository::open(&config.storage.sqlite_path).await?;
    let store = ConversationStore::restore(Arc::new(repository)).await;
    let service = build_service(config)?;
    Ok(Orchestrator::new(
        Arc::new(Mutex::new(store)),
        service,
        config,
    ))
}

/// Build the full application and serve it until `shutdown_signal` completes.
///
/// # Errors
/// Returns an error if startup or serving fails.
pub async fn serve<F>(config: &ChatConfig, shutdown_signal: F) -> ChatResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let orchestrator = build_orchestrator(config).await?;
    let state = AppState::new(
        orchestrator,
        config.gemini.model.clone(),
        config.server.static_dir.clone(),
    );
    server::run_server_with_shutdown(state, config.server.port, shutdown_signal).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl+C: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_mock_service() {
        let config = ChatConfig::new().with_provider(Provider::Mock);
        assert!(build_service(&config).is_ok());
    }

    #[test]
    fn test_build_gemini_service_without_key() {
        let config = ChatConfig::new().with_base_url("http://127.0.0.1:9");
        assert!(build_service(&config).is_ok());
    }

    #[tokio::test]
    async fn test_build_orchestrator_restores_previous_session() {
        let path = std::env::temp_dir().join(format!(
            "gemini_chat_start_{}.sqlite3",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);

        let mut config = ChatConfig::new().with_provider(Provider::Mock);
        config.storage.sqlite_path = path.clone();

        let orchestrator = build_orchestrator(&config).await.unwrap();
        orchestrator.send_active("remember me").await.unwrap();
        drop(orchestrator);

        let restored = build_orchestrator(&config).await.unwrap();
        let handle = restored.store();
        let store = handle.lock().await;
        let messages = &store.conversations()[0].messages;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text, "remember me");
        assert_eq!(messages[1].text, "Mock response to: remember me");

        drop(store);
        let _ = std::fs::remove_file(&path);
    }
}
