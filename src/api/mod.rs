//! HTTP API: router construction, shared state, and the server entry point.

pub mod routes;
pub mod types;

pub use routes::{router, AppState};

use std::sync::Arc;

use crate::agent::{build_system_prompt, Agent};
use crate::config::Config;
use crate::data::{LocalTables, RemoteLayers};
use crate::llm::{OpenAiCompatClient, ReasoningProvider};
use crate::session::SessionStore;
use crate::tools::ToolRegistry;

/// Assemble the application state from configuration and a reasoning
/// provider. Loads the local tables and builds the tool registry; tests
/// inject a scripted provider here.
pub fn build_state(
    config: Config,
    provider: Arc<dyn ReasoningProvider>,
) -> anyhow::Result<Arc<AppState>> {
    let tables = Arc::new(LocalTables::load(&config.local_tables)?);
    let remote = Arc::new(RemoteLayers::new(
        &config.remote_layers,
        config.feature_service_api_key.clone(),
        config.request_timeout,
    )?);
    let registry = Arc::new(ToolRegistry::new(
        Arc::clone(&remote),
        Arc::clone(&tables),
        config.max_result_rows,
    ));

    let system_prompt = build_system_prompt(&remote, &tables);
    let agent = Agent::new(provider, registry, system_prompt, config.max_agent_steps);
    let sessions = SessionStore::new(config.session_ttl, config.session_cap);

    Ok(Arc::new(AppState {
        config,
        sessions,
        agent,
        tables,
    }))
}

/// Start the HTTP server with the production reasoning backend.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let provider = Arc::new(OpenAiCompatClient::new(
        config.reasoning.base_url.clone(),
        config.reasoning.api_key.clone(),
        config.reasoning.model.clone(),
        config.request_timeout,
    )?);

    let state = build_state(config, provider)?;
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("listening on {}", addr);

    axum::serve(listener, router(state)).await?;
    Ok(())
}
