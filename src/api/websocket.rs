//! Note WebSocket: one socket per thread id.
//!
//! Connection lifecycle:
//! 1. Client opens `GET /ws/medical-note/:thread_id`
//! 2. Socket is registered as the thread's connection; a writer task turns
//!    `NoteEvent`s into JSON text frames
//! 3. Each `{ "message", "note_type" }` text frame starts a generation,
//!    superseding any running one for the thread
//! 4. On close the binding is dropped (if it is still this socket), which
//!    cancels the running generation

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};

use crate::api::types::{parse_note_type, ApiContext, WsGenerationRequest};
use crate::notes::NoteOptions;
use crate::pipeline::{GenerationRequest, NoteOrchestrator};
use crate::session_registry::Connection;

/// WebSocket upgrade handler.
pub async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(ctx): State<ApiContext>,
    Path(thread_id): Path<String>,
) -> impl IntoResponse {
    tracing::info!(thread_id = %thread_id, "WebSocket upgrade accepted");
    ws.on_upgrade(move |socket| handle_ws(socket, ctx, thread_id))
}

/// Main WebSocket connection handler.
///
/// Spawns a sender task for channel→WS forwarding, then reads client frames
/// until the socket closes.
async fn handle_ws(socket: WebSocket, ctx: ApiContext, thread_id: String) {
    let (ws_sink, mut ws_stream) = socket.split();
    let (connection, rx) = Connection::channel();
    let connection_id = connection.id();
    let orchestrator = ctx.orchestrator;

    orchestrator.on_connect(&thread_id, connection).await;

    // Spawn sender task (reads from channel, writes to WebSocket)
    let sender_handle = tokio::spawn(async move {
        let mut sink = ws_sink;
        let mut rx = rx;
        while let Some(event) = rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(j) => j,
                Err(e) => {
                    tracing::error!(error = %e, kind = event.kind(), "Cannot serialize note event");
                    continue;
                }
            };
            if sink.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(msg) = ws_stream.next().await {
        match msg {
            Ok(Message::Text(text)) => handle_incoming(&orchestrator, &thread_id, &text).await,
            Ok(Message::Close(_)) | Err(_) => break,
            _ => {} // Ping/Pong handled by axum/tungstenite
        }
    }

    // Running tasks may still hold a sender; the socket is gone either way.
    orchestrator
        .disconnect_connection(&thread_id, connection_id)
        .await;
    sender_handle.abort();

    tracing::info!(thread_id = %thread_id, %connection_id, "WebSocket disconnected");
}

/// Start a generation from a client text frame. Frames that are not a
/// generation request are ignored.
async fn handle_incoming(orchestrator: &NoteOrchestrator, thread_id: &str, text: &str) {
    let frame = match serde_json::from_str::<WsGenerationRequest>(text) {
        Ok(frame) if !frame.is_empty() => frame,
        Ok(_) => return,
        Err(e) => {
            tracing::debug!(thread_id, error = %e, "Ignoring malformed WebSocket frame");
            return;
        }
    };

    let note_type = match parse_note_type(frame.note_type.as_deref()) {
        Ok(t) => t,
        Err(e) => {
            tracing::warn!(thread_id, error = %e, "Ignoring generation request");
            return;
        }
    };
    let options = NoteOptions {
        instruction: frame.message,
        ..Default::default()
    };

    let request = GenerationRequest::new(thread_id, note_type).with_options(options);
    if let Err(e) = orchestrator.on_generation_request(request).await {
        tracing::warn!(thread_id, error = %e, "Generation request rejected");
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite;

    use crate::api::router::api_router;
    use crate::llm::mock::{ChannelModelClient, MockModelClient};
    use crate::llm::ModelClient;
    use crate::session_registry::SessionRegistry;
    use crate::sources::{SourceFiles, StaticSources};

    type WsClient = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    /// Start a test server and return its base address + orchestrator.
    async fn setup_ws_server(
        model: Arc<dyn ModelClient>,
    ) -> (String, Arc<NoteOrchestrator>, tokio::task::JoinHandle<()>) {
        let mut files = SourceFiles::new();
        files.insert("obs.txt".into(), "Temp 36.8".into());
        let orchestrator = Arc::new(NoteOrchestrator::new(
            Arc::new(SessionRegistry::new()),
            model,
            Arc::new(StaticSources(files)),
        ));
        let app = api_router(ApiContext::new(orchestrator.clone(), Vec::new()));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("127.0.0.1:{}", addr.port()), orchestrator, handle)
    }

    async fn connect(addr: &str, thread_id: &str) -> WsClient {
        let url = format!("ws://{addr}/ws/medical-note/{thread_id}");
        let (ws, _) = tokio_tungstenite::connect_async(&url)
            .await
            .expect("WS connect failed");
        ws
    }

    async fn wait_for_binding(orchestrator: &NoteOrchestrator, thread_id: &str) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while orchestrator
                .registry()
                .lookup_connection(thread_id)
                .await
                .is_none()
            {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("connection never registered");
    }

    async fn next_json(ws: &mut WsClient) -> serde_json::Value {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout waiting for event")
            .expect("stream ended")
            .expect("WS error");
        let text = msg.into_text().expect("not text");
        serde_json::from_str(&text).unwrap()
    }

    #[tokio::test]
    async fn ws_frame_streams_note() {
        let model = Arc::new(MockModelClient::new(&[
            "## Progress\nAfebrile [1].\n",
            "## References\n1. [cite:obs.txt:Vitals]\n> Temp 36.8\n",
        ]));
        let (addr, orchestrator, server) = setup_ws_server(model).await;

        let mut ws = connect(&addr, "thread-1").await;
        wait_for_binding(&orchestrator, "thread-1").await;
        ws.send(tungstenite::Message::Text(
            r#"{"message":"generate today's ward round note","note_type":"ward_round"}"#.into(),
        ))
        .await
        .unwrap();

        let first = next_json(&mut ws).await;
        assert_eq!(first["type"], "chunk");
        assert_eq!(first["content"], "## Progress\nAfebrile [1].\n");
        assert_eq!(next_json(&mut ws).await["type"], "chunk");

        let complete = next_json(&mut ws).await;
        assert_eq!(complete["type"], "note_complete");
        assert_eq!(complete["data"]["citation_count"], 1);
        assert_eq!(complete["data"]["citations"]["1"]["filename"], "obs.txt");
        assert_eq!(complete["data"]["citations"]["1"]["content"], "Temp 36.8");

        assert_eq!(next_json(&mut ws).await["type"], "done");

        let _ = ws.close(None).await;
        server.abort();
    }

    #[tokio::test]
    async fn malformed_frames_are_ignored() {
        let model = Arc::new(MockModelClient::new(&["x"]));
        let (addr, orchestrator, server) = setup_ws_server(model).await;

        let mut ws = connect(&addr, "thread-1").await;
        wait_for_binding(&orchestrator, "thread-1").await;
        for frame in ["not json", r#"{"type":"ping"}"#, r#"{"note_type":"soap"}"#] {
            ws.send(tungstenite::Message::Text(frame.into())).await.unwrap();
        }

        let result = tokio::time::timeout(Duration::from_millis(200), ws.next()).await;
        assert!(result.is_err(), "expected no events for ignored frames");
        assert!(!orchestrator.registry().has_active_task("thread-1").await);

        let _ = ws.close(None).await;
        server.abort();
    }

    #[tokio::test]
    async fn closing_socket_cancels_generation() {
        let (client, deltas_tx) = ChannelModelClient::channel();
        let (addr, orchestrator, server) = setup_ws_server(Arc::new(client)).await;

        let mut ws = connect(&addr, "thread-1").await;
        wait_for_binding(&orchestrator, "thread-1").await;
        ws.send(tungstenite::Message::Text(r#"{"message":"go"}"#.into()))
            .await
            .unwrap();

        deltas_tx.send(Ok("partial".into())).unwrap();
        assert_eq!(next_json(&mut ws).await["content"], "partial");

        ws.close(None).await.unwrap();
        drop(ws);

        tokio::time::timeout(Duration::from_secs(5), async {
            while !deltas_tx.is_closed() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("generation not cancelled after close");
        assert_eq!(orchestrator.registry().session_count().await, 0);

        server.abort();
    }

    #[tokio::test]
    async fn reconnect_keeps_new_binding_when_old_socket_closes() {
        let model = Arc::new(MockModelClient::new(&["x"]));
        let (addr, orchestrator, server) = setup_ws_server(model).await;

        let mut old = connect(&addr, "thread-1").await;
        wait_for_binding(&orchestrator, "thread-1").await;
        let old_id = orchestrator
            .registry()
            .lookup_connection("thread-1")
            .await
            .unwrap()
            .id();

        let _new = connect(&addr, "thread-1").await;
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let bound = orchestrator.registry().lookup_connection("thread-1").await;
                if bound.is_some_and(|c| c.id() != old_id) {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("new socket never registered");

        old.close(None).await.unwrap();
        drop(old);
        tokio::time::sleep(Duration::from_millis(100)).await;

        let bound = orchestrator.registry().lookup_connection("thread-1").await;
        assert!(bound.is_some_and(|c| c.id() != old_id));

        server.abort();
    }
}
