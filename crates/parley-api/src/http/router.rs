//! Axum router configuration with middleware.
//!
//! All routes are under `/api/v1/` except `/health`.
//! Middleware: CORS, request tracing.

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route(
            "/conversations",
            post(handlers::conversation::create_conversation)
                .get(handlers::conversation::list_conversations),
        )
        .route(
            "/conversations/{id}/messages",
            get(handlers::conversation::list_messages).post(handlers::message::send_message),
        );

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Liveness check (no auth required).
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use tower::ServiceExt;
    use tokio_util::sync::CancellationToken;

    use parley_core::llm::source::{CompletionSource, DeltaStream};
    use parley_core::relay::event::decode_frames;
    use parley_core::relay::RelayEvent;
    use parley_infra::sqlite::api_key::SqliteApiKeyStore;
    use parley_infra::sqlite::pool::DatabasePool;
    use parley_types::config::GlobalConfig;
    use parley_types::llm::{CompletionConfig, Delta, LlmError, Message};

    use super::*;

    /// Replays a fixed delta script; records the config of every call.
    struct CannedSource {
        script: Vec<Result<Delta, String>>,
        configs: Mutex<Vec<CompletionConfig>>,
    }

    impl CannedSource {
        fn new(script: Vec<Result<Delta, String>>) -> Arc<Self> {
            Arc::new(Self {
                script,
                configs: Mutex::new(Vec::new()),
            })
        }
    }

    impl CompletionSource for CannedSource {
        fn name(&self) -> &str {
            "canned"
        }

        fn stream(
            &self,
            _history: Vec<Message>,
            config: CompletionConfig,
            _cancel: CancellationToken,
        ) -> DeltaStream {
            self.configs.lock().unwrap().push(config);
            let script = self.script.clone();
            Box::pin(async_stream::stream! {
                for item in script {
                    yield item.map_err(|message| LlmError::Provider { message });
                }
            })
        }
    }

    struct Harness {
        router: Router,
        pool: DatabasePool,
        key: String,
    }

    async fn harness(source: Arc<CannedSource>) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
        // Leak tempdir so it lives for the test
        std::mem::forget(dir);
        let pool = DatabasePool::new(&url).await.unwrap();

        let key = SqliteApiKeyStore::new(pool.clone())
            .create_user("tester")
            .await
            .unwrap()
            .api_key;
        let state = AppState::new(pool.clone(), source, GlobalConfig::default());

        Harness {
            router: build_router(state),
            pool,
            key,
        }
    }

    impl Harness {
        async fn send(&self, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, String) {
            self.send_as(&self.key, method, uri, body).await
        }

        async fn send_as(
            &self,
            key: &str,
            method: &str,
            uri: &str,
            body: Option<&str>,
        ) -> (StatusCode, String) {
            let mut request = Request::builder()
                .method(method)
                .uri(uri)
                .header(header::AUTHORIZATION, format!("Bearer {key}"));
            if body.is_some() {
                request = request.header(header::CONTENT_TYPE, "application/json");
            }
            let request = request
                .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
                .unwrap();

            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            (status, String::from_utf8(bytes.to_vec()).unwrap())
        }

        async fn create_conversation(&self) -> String {
            let (status, body) = self.send("POST", "/api/v1/conversations", None).await;
            assert_eq!(status, StatusCode::CREATED);
            let json: serde_json::Value = serde_json::from_str(&body).unwrap();
            json["data"]["id"].as_str().unwrap().to_string()
        }

        async fn messages(&self, id: &str) -> Vec<serde_json::Value> {
            let (status, body) = self
                .send("GET", &format!("/api/v1/conversations/{id}/messages"), None)
                .await;
            assert_eq!(status, StatusCode::OK);
            let json: serde_json::Value = serde_json::from_str(&body).unwrap();
            json["data"].as_array().unwrap().clone()
        }
    }

    fn answers(parts: &[&str]) -> Vec<Result<Delta, String>> {
        let mut script: Vec<Result<Delta, String>> =
            parts.iter().map(|p| Ok(Delta::Answer(p.to_string()))).collect();
        script.push(Ok(Delta::Done));
        script
    }

    #[tokio::test]
    async fn test_health_needs_no_auth() {
        let h = harness(CannedSource::new(vec![])).await;
        let response = h
            .router
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_routes_reject_unknown_key() {
        let h = harness(CannedSource::new(vec![])).await;
        let (status, body) = h
            .send_as("prly_bogus", "GET", "/api/v1/conversations", None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("UNAUTHORIZED"));
    }

    #[tokio::test]
    async fn test_routes_reject_missing_key() {
        let h = harness(CannedSource::new(vec![])).await;
        let response = h
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/conversations")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["errors"][0]["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_streams_frames_and_persists_reply() {
        let h = harness(CannedSource::new(answers(&["hi", " there"]))).await;
        let id = h.create_conversation().await;

        let (status, body) = h
            .send(
                "POST",
                &format!("/api/v1/conversations/{id}/messages"),
                Some(r#"{"content":"hello"}"#),
            )
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            "data: {\"type\":\"content\",\"content\":\"hi\"}\n\ndata: {\"type\":\"content\",\"content\":\" there\"}\n\n"
        );

        let messages = h.messages(&id).await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[0]["content"], "hello");
        assert_eq!(messages[1]["role"], "assistant");
        assert_eq!(messages[1]["content"], "hi there");

        let (_, listing) = h.send("GET", "/api/v1/conversations", None).await;
        let listing: serde_json::Value = serde_json::from_str(&listing).unwrap();
        assert_eq!(listing["data"][0]["title"], "hello");
    }

    #[tokio::test]
    async fn test_reasoning_flag_selects_reasoning_model() {
        let source = CannedSource::new(vec![
            Ok(Delta::Reasoning("thinking...".to_string())),
            Ok(Delta::Answer("42".to_string())),
            Ok(Delta::Done),
        ]);
        let h = harness(source.clone()).await;
        let id = h.create_conversation().await;

        let (status, body) = h
            .send(
                "POST",
                &format!("/api/v1/conversations/{id}/messages"),
                Some(r#"{"content":"meaning of life?","useReasoning":true}"#),
            )
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            decode_frames(&body),
            vec![
                RelayEvent::Reasoning("thinking...".to_string()),
                RelayEvent::Content("42".to_string()),
            ]
        );
        assert_eq!(source.configs.lock().unwrap()[0].model, "deepseek-reasoner");

        let messages = h.messages(&id).await;
        assert_eq!(messages[1]["reasoning"], "thinking...");
        assert_eq!(messages[1]["model"], "deepseek-reasoner");
    }

    #[tokio::test]
    async fn test_failed_turn_aborts_body_and_keeps_user_message() {
        let h = harness(CannedSource::new(vec![
            Ok(Delta::Answer("par".to_string())),
            Err("overloaded".to_string()),
        ]))
        .await;
        let id = h.create_conversation().await;

        let request = Request::builder()
            .method("POST")
            .uri(format!("/api/v1/conversations/{id}/messages"))
            .header(header::AUTHORIZATION, format!("Bearer {}", h.key))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"content":"q"}"#))
            .unwrap();
        let response = h.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(to_bytes(response.into_body(), usize::MAX).await.is_err());

        let messages = h.messages(&id).await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
    }

    #[tokio::test]
    async fn test_foreign_conversation_is_not_found() {
        let h = harness(CannedSource::new(answers(&["x"]))).await;
        let id = h.create_conversation().await;
        let other = SqliteApiKeyStore::new(h.pool.clone())
            .create_user("intruder")
            .await
            .unwrap()
            .api_key;

        let (status, body) = h
            .send_as(
                &other,
                "POST",
                &format!("/api/v1/conversations/{id}/messages"),
                Some(r#"{"content":"hello"}"#),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.contains("CONVERSATION_NOT_FOUND"));

        let (status, _) = h
            .send_as(&other, "GET", &format!("/api/v1/conversations/{id}/messages"), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(h.messages(&id).await.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_id_is_not_found() {
        let h = harness(CannedSource::new(vec![])).await;
        let (status, _) = h
            .send(
                "POST",
                "/api/v1/conversations/not-a-uuid/messages",
                Some(r#"{"content":"hello"}"#),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bad_input_is_rejected() {
        let h = harness(CannedSource::new(answers(&["x"]))).await;
        let id = h.create_conversation().await;
        let uri = format!("/api/v1/conversations/{id}/messages");

        let (status, _) = h.send("POST", &uri, Some(r#"{"content":"   "}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = h.send("POST", &uri, Some(r#"{"text":"hi"}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("VALIDATION_ERROR"));

        assert!(h.messages(&id).await.is_empty());
    }

    #[tokio::test]
    async fn test_list_only_shows_own_conversations() {
        let h = harness(CannedSource::new(vec![])).await;
        let mine = h.create_conversation().await;
        let other = SqliteApiKeyStore::new(h.pool.clone())
            .create_user("someone")
            .await
            .unwrap()
            .api_key;
        h.send_as(&other, "POST", "/api/v1/conversations", None).await;

        let (status, body) = h.send("GET", "/api/v1/conversations", None).await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        let items = json["data"].as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["id"], mine.as_str());
        assert_eq!(items[0]["title"], "New conversation");
    }
}
