//! HTTP + WebSocket router.
//!
//! Returns a composable `Router` that can be mounted on any axum server.
//!
//! - `GET  /health`
//! - `POST /api/notes/trigger-stream`
//! - `GET  /api/notes/types`
//! - `GET  /ws/medical-note/:thread_id` (WebSocket upgrade)

use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::api::endpoints;
use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::api::websocket;

/// Build the note service router.
pub fn api_router(ctx: ApiContext) -> Router {
    let cors = cors_layer(&ctx.allowed_origins);

    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    Router::new()
        .route("/health", get(endpoints::health::check))
        .route(
            "/api/notes/trigger-stream",
            post(endpoints::notes::trigger_stream),
        )
        .route("/api/notes/types", get(endpoints::notes::types))
        .route("/ws/medical-note/:thread_id", get(websocket::ws_upgrade))
        .fallback(fallback)
        .with_state(ctx)
        .layer(cors)
}

/// CORS for the configured browser origins. Unparseable origins are skipped.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

async fn fallback() -> ApiError {
    ApiError::NotFound("Route not found".into())
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::llm::mock::MockModelClient;
    use crate::pipeline::NoteOrchestrator;
    use crate::session_registry::{Connection, SessionRegistry};
    use crate::sources::{SourceFiles, StaticSources};

    fn test_ctx() -> ApiContext {
        let orchestrator = Arc::new(NoteOrchestrator::new(
            Arc::new(SessionRegistry::new()),
            Arc::new(MockModelClient::new(&["## Progress\nStable.\n"])),
            Arc::new(StaticSources(SourceFiles::new())),
        ));
        ApiContext::new(orchestrator, vec!["http://localhost:3000".into()])
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let app = api_router(test_ctx());
        let req = Request::get("/health").body(Body::empty()).unwrap();
        let response = app.oneshot(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["active_sessions"], 0);
    }

    #[tokio::test]
    async fn types_lists_ward_round() {
        let app = api_router(test_ctx());
        let req = Request::get("/api/notes/types").body(Body::empty()).unwrap();
        let response = app.oneshot(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["default"], "ward_round");
        assert_eq!(json["note_types"], serde_json::json!(["ward_round"]));
    }

    #[tokio::test]
    async fn trigger_without_connection_returns_409() {
        let app = api_router(test_ctx());
        let req = post_json("/api/notes/trigger-stream", r#"{"threadId":"t-1"}"#);
        let response = app.oneshot(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::CONFLICT);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "NO_CONNECTION");
    }

    #[tokio::test]
    async fn trigger_rejects_bad_bodies() {
        let ctx = test_ctx();

        for body in [r#"{"threadId":"  "}"#, r#"{"docType":"ward_round"}"#, "not json"] {
            let app = api_router(ctx.clone());
            let response = app
                .oneshot(post_json("/api/notes/trigger-stream", body))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {body}");
        }
    }

    #[tokio::test]
    async fn trigger_rejects_unknown_and_unsupported_types() {
        let ctx = test_ctx();
        let (conn, _rx) = Connection::channel();
        ctx.orchestrator.on_connect("t-1", conn).await;

        for doc_type in ["soap", "discharge"] {
            let body = format!(r#"{{"threadId":"t-1","docType":"{doc_type}"}}"#);
            let response = api_router(ctx.clone())
                .oneshot(post_json("/api/notes/trigger-stream", &body))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }
        assert!(!ctx.orchestrator.registry().has_active_task("t-1").await);
    }

    #[tokio::test]
    async fn trigger_with_connection_returns_202_and_streams() {
        let ctx = test_ctx();
        let (conn, mut rx) = Connection::channel();
        ctx.orchestrator.on_connect("t-1", conn).await;

        let app = api_router(ctx.clone());
        let req = post_json(
            "/api/notes/trigger-stream",
            r#"{"threadId":"t-1","docType":"ward_round"}"#,
        );
        let response = app.oneshot(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let json = body_json(response).await;
        assert_eq!(json["status"], "started");
        assert_eq!(json["threadId"], "t-1");
        assert!(json["taskId"].as_str().is_some());

        let first = tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.kind(), "chunk");
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let app = api_router(test_ctx());
        let req = Request::get("/nonexistent").body(Body::empty()).unwrap();
        let response = app.oneshot(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn cors_allows_configured_origin_only() {
        let ctx = test_ctx();
        let preflight = |origin: &str| {
            Request::builder()
                .method("OPTIONS")
                .uri("/api/notes/trigger-stream")
                .header("Origin", origin)
                .header("Access-Control-Request-Method", "POST")
                .body(Body::empty())
                .unwrap()
        };

        let response = api_router(ctx.clone())
            .oneshot(preflight("http://localhost:3000"))
            .await
            .unwrap();
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "http://localhost:3000"
        );

        let response = api_router(ctx)
            .oneshot(preflight("http://evil.example"))
            .await
            .unwrap();
        assert!(response.headers().get("access-control-allow-origin").is_none());
    }
}
