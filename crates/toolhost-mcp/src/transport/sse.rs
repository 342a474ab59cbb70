//! SSE binding — `GET /sse` pushes replies as events, `POST /messages`
//! is the side channel for client messages.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{
        sse::{Event as SseEvent, KeepAlive},
        IntoResponse, Response, Sse,
    },
};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::Stream;

use crate::protocol::SessionState;
use crate::types::McpError;

use super::framing;
use super::http::{error_response, AppState};

pub const ENDPOINT_EVENT: &str = "endpoint";
pub const MESSAGE_EVENT: &str = "message";

#[derive(Debug, Deserialize)]
pub(crate) struct MessagesQuery {
    session_id: String,
}

/// Closes the session when the client goes away and the stream is dropped.
struct StreamGuard {
    state: Arc<AppState>,
    session_id: String,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        let state = self.state.clone();
        let id = std::mem::take(&mut self.session_id);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if state.drop_session(&id).await {
                    tracing::info!("SSE stream for session {id} ended");
                }
            });
        }
    }
}

pub(crate) async fn handle_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let session = state.sessions.create().await;
    let session_id = session.id().to_string();

    let (tx, mut rx) = mpsc::unbounded_channel();
    state
        .sse_channels
        .lock()
        .await
        .insert(session_id.clone(), tx);

    let endpoint = format!("/messages?session_id={session_id}");
    let guard = StreamGuard {
        state: state.clone(),
        session_id,
    };

    let stream = async_stream::stream! {
        let _guard = guard;
        yield Ok::<_, Infallible>(SseEvent::default().event(ENDPOINT_EVENT).data(endpoint));

        while let Some(message) = rx.recv().await {
            match serde_json::to_string(&message) {
                Ok(data) => yield Ok(SseEvent::default().event(MESSAGE_EVENT).data(data)),
                Err(e) => tracing::warn!("Dropping unserializable message: {e}"),
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

pub(crate) async fn handle_message(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MessagesQuery>,
    body: Bytes,
) -> Response {
    let id = query.session_id;
    let (Some(session), Some(tx)) = (
        state.sessions.get(&id).await,
        state.sse_channels.lock().await.get(&id).cloned(),
    ) else {
        return error_response(StatusCode::NOT_FOUND, McpError::SessionClosed);
    };

    let messages = match framing::parse_batch(&body) {
        Ok(messages) => messages,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };

    for message in messages {
        session.accept(message, &tx).await;
    }
    drop(tx);

    if session.state().await == SessionState::Closed {
        state.drop_session(&id).await;
    }

    StatusCode::ACCEPTED.into_response()
}
