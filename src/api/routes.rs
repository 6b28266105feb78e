//! Route handlers for the chat API.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use super::types::{
    ChatRequest, ChatResponse, FrontendConfig, HealthResponse, ResetRequest, ResetResponse,
};
use crate::agent::{Agent, AgentError};
use crate::config::Config;
use crate::data::{DataError, LocalTables, Record};
use crate::session::{SessionStore, Turn};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub sessions: SessionStore,
    pub agent: Agent,
    pub tables: Arc<LocalTables>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/reset", post(reset))
        .route("/health", get(health))
        .route("/config", get(frontend_config))
        .route("/data/:table", get(table_rows))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// POST /chat - run one chat exchange within a session.
async fn chat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, String)> {
    let message = req.message.trim();
    if message.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "message cannot be empty".to_string()));
    }

    let session_id = if req.session_id.trim().is_empty() {
        Uuid::new_v4().to_string()
    } else {
        req.session_id.clone()
    };

    let history = state.sessions.get_or_create(&session_id).await;
    let reply = match state.agent.run(&history, message).await {
        Ok(reply) => reply,
        Err(AgentError::ReasoningBackendUnavailable(e)) => {
            tracing::error!(error = %e, "reasoning backend unavailable");
            return Err((
                StatusCode::SERVICE_UNAVAILABLE,
                "agent temporarily unavailable".to_string(),
            ));
        }
    };

    state.sessions.append(&session_id, Turn::user(message)).await;
    state
        .sessions
        .append(&session_id, Turn::agent(reply.clone()))
        .await;

    Ok(Json(ChatResponse { reply, session_id }))
}

/// POST /reset - clear a session's conversation history.
async fn reset(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResetRequest>,
) -> Json<ResetResponse> {
    state.sessions.reset(&req.session_id).await;
    Json(ResetResponse { status: "ok" })
}

/// GET /health
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        active_sessions: state.sessions.active_sessions().await,
    })
}

/// GET /config - non-secret frontend configuration.
async fn frontend_config(State(state): State<Arc<AppState>>) -> Json<FrontendConfig> {
    Json(FrontendConfig {
        map_api_key: state.config.map_api_key.clone(),
    })
}

/// GET /data/{table} - full table dump for map plotting.
async fn table_rows(
    State(state): State<Arc<AppState>>,
    Path(table): Path<String>,
) -> Result<Json<Vec<Record>>, (StatusCode, String)> {
    match state.tables.all_rows(&table) {
        Ok(rows) => Ok(Json(rows.to_vec())),
        Err(e @ DataError::NotFound(_)) => Err((StatusCode::NOT_FOUND, e.to_string())),
        Err(e) => Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::build_state;
    use crate::llm::{ChatMessage, NextAction, ReasoningError, ReasoningProvider};
    use async_trait::async_trait;
    use axum::routing::get as axum_get;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::Mutex;

    /// Scripted reasoning backend for driving the full HTTP stack.
    struct StubProvider {
        script: Mutex<VecDeque<NextAction>>,
        seen: Mutex<Vec<Vec<ChatMessage>>>,
        unavailable: bool,
    }

    impl StubProvider {
        fn scripted(script: Vec<NextAction>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                seen: Mutex::new(Vec::new()),
                unavailable: false,
            })
        }

        fn unavailable() -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(VecDeque::new()),
                seen: Mutex::new(Vec::new()),
                unavailable: true,
            })
        }

        async fn contexts(&self) -> Vec<Vec<ChatMessage>> {
            self.seen.lock().await.clone()
        }
    }

    #[async_trait]
    impl ReasoningProvider for StubProvider {
        async fn next_action(
            &self,
            messages: &[ChatMessage],
            _tools: &[Value],
        ) -> Result<NextAction, ReasoningError> {
            if self.unavailable {
                return Err(ReasoningError::BackendUnavailable("connection refused".into()));
            }
            self.seen.lock().await.push(messages.to_vec());
            self.script
                .lock()
                .await
                .pop_front()
                .ok_or_else(|| ReasoningError::BackendUnavailable("script exhausted".into()))
        }
    }

    fn write_athletes_csv(dir: &TempDir) -> std::path::PathBuf {
        let path = dir.path().join("athletes.csv");
        let mut file = std::fs::File::create(&path).expect("create csv");
        writeln!(file, "name,sport,country,home_lat,home_lon").expect("write header");
        writeln!(file, "Lea Moreau,Soccer,France,48.8566,2.3522").expect("write row");
        writeln!(file, "Marco Ruiz,Basketball,Spain,40.4168,-3.7038").expect("write row");
        drop(file);
        path
    }

    fn test_config(dir: &TempDir, remote_layers: Vec<(String, String)>) -> Config {
        let mut config = Config::new("test-key".to_string());
        config.local_tables = vec![("athletes".to_string(), write_athletes_csv(dir))];
        config.remote_layers = remote_layers;
        config.map_api_key = "public-map-key".to_string();
        config.request_timeout = Duration::from_secs(2);
        config
    }

    async fn spawn_app(state: Arc<AppState>) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind app listener");
        let addr = listener.local_addr().expect("app addr");
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.expect("serve app");
        });
        format!("http://{}", addr)
    }

    async fn spawn_feature_stub() -> String {
        let stub = Router::new().route(
            "/FeatureServer/0/query",
            axum_get(|| async {
                Json(json!({
                    "features": [
                        {"attributes": {"name": "Paris Flagship", "city": "Paris", "country": "France"}},
                        {"attributes": {"name": "Lyon Center", "city": "Lyon", "country": "France"}}
                    ]
                }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub listener");
        let addr = listener.local_addr().expect("stub addr");
        tokio::spawn(async move {
            axum::serve(listener, stub).await.expect("serve stub");
        });
        format!("http://{}", addr)
    }

    async fn post_chat(base: &str, body: Value) -> reqwest::Response {
        reqwest::Client::new()
            .post(format!("{}/chat", base))
            .json(&body)
            .send()
            .await
            .expect("chat request")
    }

    #[tokio::test]
    async fn health_reports_ok_and_session_count() {
        let dir = tempfile::tempdir().expect("temp dir");
        let provider = StubProvider::scripted(vec![]);
        let state = build_state(test_config(&dir, vec![]), provider).expect("build state");
        let base = spawn_app(state).await;

        let body: Value = reqwest::get(format!("{}/health", base))
            .await
            .expect("health request")
            .json()
            .await
            .expect("health json");
        assert_eq!(body["status"], "ok");
        assert_eq!(body["active_sessions"], 0);
    }

    #[tokio::test]
    async fn frontend_config_exposes_the_map_key() {
        let dir = tempfile::tempdir().expect("temp dir");
        let provider = StubProvider::scripted(vec![]);
        let state = build_state(test_config(&dir, vec![]), provider).expect("build state");
        let base = spawn_app(state).await;

        let body: Value = reqwest::get(format!("{}/config", base))
            .await
            .expect("config request")
            .json()
            .await
            .expect("config json");
        assert_eq!(body["map_api_key"], "public-map-key");
    }

    #[tokio::test]
    async fn empty_message_is_a_bad_request() {
        let dir = tempfile::tempdir().expect("temp dir");
        let provider = StubProvider::scripted(vec![]);
        let state = build_state(test_config(&dir, vec![]), provider).expect("build state");
        let base = spawn_app(state).await;

        let response = post_chat(&base, json!({"message": "   "})).await;
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn chat_allocates_a_session_and_replays_history() {
        let dir = tempfile::tempdir().expect("temp dir");
        let provider = StubProvider::scripted(vec![
            NextAction::Answer("First reply".into()),
            NextAction::Answer("Second reply".into()),
        ]);
        let state = build_state(test_config(&dir, vec![]), provider.clone())
            .expect("build state");
        let base = spawn_app(state).await;

        let first: Value = post_chat(&base, json!({"message": "hello"}))
            .await
            .json()
            .await
            .expect("chat json");
        assert_eq!(first["reply"], "First reply");
        let session_id = first["session_id"].as_str().expect("session id").to_string();
        assert!(!session_id.is_empty());

        let second: Value = post_chat(&base, json!({"message": "again", "session_id": session_id}))
            .await
            .json()
            .await
            .expect("chat json");
        assert_eq!(second["reply"], "Second reply");
        assert_eq!(second["session_id"].as_str(), Some(session_id.as_str()));

        // The second call must have seen system + user/agent pair + new user
        let contexts = provider.contexts().await;
        assert_eq!(contexts[1].len(), 4);
    }

    #[tokio::test]
    async fn reset_clears_history_for_subsequent_chats() {
        let dir = tempfile::tempdir().expect("temp dir");
        let provider = StubProvider::scripted(vec![
            NextAction::Answer("r1".into()),
            NextAction::Answer("r2".into()),
            NextAction::Answer("r3".into()),
        ]);
        let state = build_state(test_config(&dir, vec![]), provider.clone())
            .expect("build state");
        let base = spawn_app(state).await;

        post_chat(&base, json!({"message": "one", "session_id": "s"})).await;
        post_chat(&base, json!({"message": "two", "session_id": "s"})).await;

        let reset_body: Value = reqwest::Client::new()
            .post(format!("{}/reset", base))
            .json(&json!({"session_id": "s"}))
            .send()
            .await
            .expect("reset request")
            .json()
            .await
            .expect("reset json");
        assert_eq!(reset_body["status"], "ok");

        post_chat(&base, json!({"message": "three", "session_id": "s"})).await;
        let contexts = provider.contexts().await;
        // After reset the third exchange starts from a clean history
        assert_eq!(contexts[2].len(), 2);
    }

    #[tokio::test]
    async fn backend_outage_maps_to_service_unavailable() {
        let dir = tempfile::tempdir().expect("temp dir");
        let state = build_state(test_config(&dir, vec![]), StubProvider::unavailable())
            .expect("build state");
        let base = spawn_app(state).await;

        let response = post_chat(&base, json!({"message": "hello"})).await;
        assert_eq!(response.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
        let text = response.text().await.expect("body");
        assert!(text.contains("temporarily unavailable"));
    }

    #[tokio::test]
    async fn data_endpoint_serves_table_rows() {
        let dir = tempfile::tempdir().expect("temp dir");
        let provider = StubProvider::scripted(vec![]);
        let state = build_state(test_config(&dir, vec![]), provider).expect("build state");
        let base = spawn_app(state).await;

        let rows: Value = reqwest::get(format!("{}/data/athletes", base))
            .await
            .expect("data request")
            .json()
            .await
            .expect("data json");
        let rows = rows.as_array().expect("array of rows");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], "Lea Moreau");

        let missing = reqwest::get(format!("{}/data/venues", base))
            .await
            .expect("data request");
        assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn chat_answers_from_remote_rows_end_to_end() {
        let dir = tempfile::tempdir().expect("temp dir");
        let feature_base = spawn_feature_stub().await;
        let layers = vec![(
            "stores".to_string(),
            format!("{}/FeatureServer/0", feature_base),
        )];

        let provider = StubProvider::scripted(vec![
            NextAction::ToolCall {
                id: "call_1".into(),
                name: "query_layer".into(),
                arguments: json!({"layer": "stores", "where": "country = 'France'"}),
            },
            NextAction::Answer("Two stores: Paris Flagship (Paris) and Lyon Center (Lyon).".into()),
        ]);
        let state = build_state(test_config(&dir, layers), provider.clone())
            .expect("build state");
        let base = spawn_app(state).await;

        let body: Value = post_chat(&base, json!({"message": "Which stores are in France?"}))
            .await
            .json()
            .await
            .expect("chat json");
        let reply = body["reply"].as_str().expect("reply text");
        assert!(reply.contains("Paris Flagship"));

        // The rows fetched from the feature service reached the reasoning step
        let contexts = provider.contexts().await;
        let tool_message = contexts[1].last().expect("tool message");
        let content = tool_message.content.as_deref().expect("tool content");
        assert!(content.contains("Paris Flagship"), "content was: {}", content);
        assert!(content.contains("Lyon Center"));
    }

    #[tokio::test]
    async fn remote_outage_still_yields_a_well_formed_reply() {
        let dir = tempfile::tempdir().expect("temp dir");
        // Bind then drop a listener so the layer endpoint refuses connections
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind probe listener");
        let dead = listener.local_addr().expect("probe addr");
        drop(listener);
        let layers = vec![(
            "stores".to_string(),
            format!("http://{}/FeatureServer/0", dead),
        )];

        let provider = StubProvider::scripted(vec![
            NextAction::ToolCall {
                id: "call_1".into(),
                name: "query_layer".into(),
                arguments: json!({"layer": "stores", "where": "1=1"}),
            },
            NextAction::Answer("The store service is unreachable right now.".into()),
        ]);
        let state = build_state(test_config(&dir, layers), provider.clone())
            .expect("build state");
        let base = spawn_app(state).await;

        let response = post_chat(&base, json!({"message": "List all stores"})).await;
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let body: Value = response.json().await.expect("chat json");
        assert_eq!(body["reply"], "The store service is unreachable right now.");

        // The loop saw the failure as a structured result, not a crash
        let contexts = provider.contexts().await;
        let content = contexts[1]
            .last()
            .and_then(|m| m.content.as_deref())
            .expect("tool content");
        assert!(content.contains("source_unavailable"), "content was: {}", content);
    }
}
