//! WebSocket endpoint and the static web page, each on its own port.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    response::{Html, IntoResponse, Json},
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{debug, info};

use crate::handler::{process_message, send_welcome};
use crate::state::AppState;

static WEB_INTERFACE: &str = include_str!("../assets/index.html");

/// Router for the WebSocket port: the protocol endpoint lives at `/`.
pub fn ws_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(ws_upgrade))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Router for the HTTP port: static page plus health probe.
pub fn web_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(serve_index))
        .route("/health", get(health_check))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn serve_index() -> Html<&'static str> {
    Html(WEB_INTERFACE)
}

async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.health().await)
}

async fn ws_upgrade(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (session_id, mut outbound_rx) = state.sessions.register().await;
    info!("websocket connected, session {session_id}");
    send_welcome(&state, &session_id).await;

    let (mut sink, mut stream) = socket.split();

    // Writer: drains the session's bounded queue onto the socket. The queue
    // sender being dropped (session evicted or expired) ends the task and
    // closes the connection.
    let writer = tokio::spawn(async move {
        while let Some(json) = outbound_rx.recv().await {
            if sink.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
        let _ = sink.send(Message::Close(None)).await;
    });

    // Reader: every text frame goes through the message router; anything
    // unparseable is answered inside process_message without closing.
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => process_message(&state, &session_id, &text).await,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    debug!("websocket read loop ended for session {session_id}");
    state.sessions.disconnect(&session_id).await;
    writer.abort();
}

/// Binds both listeners and serves until the token cancels.
pub async fn serve(state: Arc<AppState>, cancel: CancellationToken) -> Result<()> {
    let ws_addr = format!(
        "{}:{}",
        state.config.server.host, state.config.server.port
    );
    let web_addr = format!(
        "{}:{}",
        state.config.server.host, state.config.server.http_port
    );

    let ws_listener = tokio::net::TcpListener::bind(&ws_addr)
        .await
        .with_context(|| format!("failed to bind websocket listener on {ws_addr}"))?;
    let web_listener = tokio::net::TcpListener::bind(&web_addr)
        .await
        .with_context(|| format!("failed to bind http listener on {web_addr}"))?;

    info!("websocket server listening on ws://{ws_addr}");
    info!("web interface available at http://{web_addr}");

    let ws_cancel = cancel.clone();
    let ws_server = axum::serve(ws_listener, ws_router(state.clone()))
        .with_graceful_shutdown(async move { ws_cancel.cancelled().await });
    let web_cancel = cancel.clone();
    let web_server = axum::serve(web_listener, web_router(state))
        .with_graceful_shutdown(async move { web_cancel.cancelled().await });

    let (ws_result, web_result) =
        tokio::join!(async { ws_server.await }, async { web_server.await });
    ws_result.context("websocket server failed")?;
    web_result.context("http server failed")?;
    Ok(())
}
