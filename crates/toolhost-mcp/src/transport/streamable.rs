//! Streaming HTTP binding — `POST /mcp` carries messages in, the response
//! body streams replies back as newline-delimited JSON.

use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use tokio::sync::mpsc;
use tokio_stream::{wrappers::UnboundedReceiverStream, StreamExt as _};

use crate::protocol::SessionState;
use crate::session::Session;
use crate::types::{JsonRpcMessage, McpError};

use super::framing;
use super::http::{error_response, AppState};

pub const SESSION_HEADER: &str = "mcp-session-id";
pub const NDJSON: &str = "application/x-ndjson";

pub(crate) async fn handle_post(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let messages = match framing::parse_batch(&body) {
        Ok(messages) => messages,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };

    let requested = headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok());
    let opens_session = messages
        .iter()
        .any(|m| m.method() == Some("initialize"));

    let (session, registered) = match requested {
        Some(id) => match state.sessions.get(id).await {
            Some(session) => (session, true),
            None => {
                tracing::debug!("POST for unknown session {id}");
                return error_response(StatusCode::NOT_FOUND, McpError::SessionClosed);
            }
        },
        None if opens_session => (state.sessions.create().await, true),
        // No session yet and no handshake: a throwaway session answers
        // every request with NotNegotiated.
        None => (Session::new(state.sessions.dispatcher().clone()), false),
    };

    let has_requests = messages
        .iter()
        .any(|m| matches!(m, JsonRpcMessage::Request(_)));

    let (tx, rx) = mpsc::unbounded_channel();
    for message in messages {
        session.accept(message, &tx).await;
    }
    drop(tx);

    if registered && session.state().await == SessionState::Closed {
        state.drop_session(session.id()).await;
    }

    let mut response = if has_requests {
        let stream = UnboundedReceiverStream::new(rx).map(|msg| framing::frame_message(&msg));
        let mut response = Body::from_stream(stream).into_response();
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(NDJSON));
        response
    } else {
        StatusCode::ACCEPTED.into_response()
    };

    if registered {
        if let Ok(value) = HeaderValue::from_str(session.id()) {
            response.headers_mut().insert(SESSION_HEADER, value);
        }
    }
    response
}

pub(crate) async fn handle_delete(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    let Some(id) = headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok()) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            McpError::InvalidRequest(format!("missing {SESSION_HEADER} header")),
        );
    };

    if state.drop_session(id).await {
        StatusCode::NO_CONTENT.into_response()
    } else {
        error_response(StatusCode::NOT_FOUND, McpError::SessionClosed)
    }
}
