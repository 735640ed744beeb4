use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, KeepAlive, KeepAliveStream, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;

use crate::error::PipelineError;
use crate::events::StreamEvent;
use crate::pipeline::{EventSender, PageRequest, Pipeline};
use crate::providers::{CompletionBackend, PromptMessage};

const EVENT_CHANNEL_CAPACITY: usize = 32;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub completion: Arc<dyn CompletionBackend>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/summary", post(summary))
        .route("/api/summary/stream", post(summary_stream))
        .route("/api/answer/stream", post(answer_stream))
        .route("/api/chat/stream", post(chat_stream))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

fn error_status(err: &PipelineError) -> StatusCode {
    match err {
        PipelineError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        PipelineError::ExtractionEmpty => StatusCode::UNPROCESSABLE_ENTITY,
        PipelineError::FetchFailed(_)
        | PipelineError::Provider(_)
        | PipelineError::MalformedModelOutput(_) => StatusCode::BAD_GATEWAY,
        PipelineError::Store(_) | PipelineError::Cancelled => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Non-streaming endpoint: the validated structured summary, or a typed
/// error body.
async fn summary(State(state): State<AppState>, Json(request): Json<PageRequest>) -> Response {
    match state.pipeline.run_structured(request).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(err) => (
            error_status(&err),
            Json(serde_json::json!({ "error": err.to_string(), "kind": err.kind() })),
        )
            .into_response(),
    }
}

type EventStream =
    Sse<KeepAliveStream<Box<dyn Stream<Item = Result<SseEvent, Infallible>> + Send + Unpin>>>;

fn to_sse(event: StreamEvent) -> SseEvent {
    // The SSE writer rejects carriage returns; newlines become extra data
    // lines, per the event framing.
    let payload = event.payload().replace('\r', "");
    SseEvent::default().event(event.kind()).data(payload)
}

fn sse_response(rx: mpsc::Receiver<StreamEvent>) -> EventStream {
    let stream = ReceiverStream::new(rx).map(|event| Ok(to_sse(event)));
    Sse::new(Box::new(stream) as Box<dyn Stream<Item = Result<SseEvent, Infallible>> + Send + Unpin>)
        .keep_alive(KeepAlive::default())
}

/// Runs the pipeline in its own task; dropping the response drops the
/// receiver, which cancels the task's downstream work.
fn spawn_pipeline(state: &AppState, request: PageRequest) -> EventStream {
    let (events, rx) = EventSender::channel(EVENT_CHANNEL_CAPACITY);
    let pipeline = state.pipeline.clone();
    tokio::spawn(async move {
        pipeline.run_stream(request, events).await;
    });
    sse_response(rx)
}

fn immediate_error(message: &str) -> EventStream {
    let (events, rx) = EventSender::channel(1);
    let message = message.to_string();
    tokio::spawn(async move {
        let _ = events.send(StreamEvent::Error(message)).await;
    });
    sse_response(rx)
}

async fn summary_stream(
    State(state): State<AppState>,
    Json(mut request): Json<PageRequest>,
) -> EventStream {
    // The summary endpoint ignores stray questions; answering has its own
    // route with its own validation.
    request.question = None;
    info!(url = %request.url, "summary stream requested");
    spawn_pipeline(&state, request)
}

async fn answer_stream(
    State(state): State<AppState>,
    Json(request): Json<PageRequest>,
) -> EventStream {
    let has_question = request
        .question
        .as_deref()
        .map(str::trim)
        .is_some_and(|q| !q.is_empty());
    if !has_question {
        return immediate_error("invalid request: a non-empty question is required");
    }
    info!(url = %request.url, "answer stream requested");
    spawn_pipeline(&state, request)
}

#[derive(Debug, Deserialize)]
struct ChatRelayRequest {
    messages: Vec<PromptMessage>,
}

/// Raw relay of a message list to the completion provider. Deltas out, then
/// an empty `done` marker; there is no aggregate payload in this mode.
async fn chat_stream(
    State(state): State<AppState>,
    Json(request): Json<ChatRelayRequest>,
) -> EventStream {
    if request.messages.is_empty() {
        return immediate_error("invalid request: messages must not be empty");
    }

    let (events, rx) = EventSender::channel(EVENT_CHANNEL_CAPACITY);
    let completion = state.completion.clone();
    tokio::spawn(async move {
        let mut deltas = match completion.stream(&request.messages).await {
            Ok(deltas) => deltas,
            Err(err) => {
                let _ = events.send(StreamEvent::Error(err.to_string())).await;
                return;
            }
        };
        while let Some(item) = deltas.next().await {
            match item {
                Ok(fragment) => {
                    if events.send(StreamEvent::Delta(fragment)).await.is_err() {
                        return;
                    }
                }
                Err(err) => {
                    let _ = events.send(StreamEvent::Error(err.to_string())).await;
                    return;
                }
            }
        }
        let _ = events.send(StreamEvent::Done).await;
    });
    sse_response(rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_conversion_keeps_kind_and_payload() {
        // The Event API is write-only, so assert on the wire-level invariants
        // we control: no carriage returns reach the writer.
        let event = StreamEvent::Delta("line one\r\nline two".to_string());
        let payload = event.payload().replace('\r', "");
        assert_eq!(payload, "line one\nline two");
        let _ = to_sse(event);
    }

    #[test]
    fn statuses_follow_the_error_taxonomy() {
        assert_eq!(
            error_status(&PipelineError::InvalidRequest("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            error_status(&PipelineError::ExtractionEmpty),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            error_status(&PipelineError::FetchFailed("x".into())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            error_status(&PipelineError::Store("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
