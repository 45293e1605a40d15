use super::AppState;
use crate::output::RunReport;
use crate::request::FieldIssue;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{
        sse::{Event as SseEvent, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::stream::{Stream, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::BroadcastStream;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Body of every 4xx/5xx response
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    error: String,
    fields: Vec<FieldIssue>,
}

impl ErrorBody {
    fn response(status: StatusCode, error: impl Into<String>, fields: Vec<FieldIssue>) -> Response {
        let body = Self {
            error: error.into(),
            fields,
        };
        (status, Json(body)).into_response()
    }
}

pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Runs a crawl and answers with its report
///
/// - `200` with the report when the run completed
/// - `503` with the partial report when it was aborted
/// - `400` when the body is not a valid crawl request
///
/// The run executes in its own task. If the client goes away the handler is
/// dropped, which cancels the run and lets in-flight pages finish.
pub async fn start_crawl_handler(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return ErrorBody::response(StatusCode::BAD_REQUEST, rejection.body_text(), Vec::new())
        }
    };

    let request = match state.controller.validate_json(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::info!("Rejected crawl request: {}", e);
            return ErrorBody::response(StatusCode::BAD_REQUEST, "invalid crawl request", e.issues);
        }
    };

    let cancel = state.shutdown.child_token();
    let guard = cancel.clone().drop_guard();
    let controller = Arc::clone(&state.controller);
    let run = tokio::spawn(async move { controller.run(&request, cancel).await });

    let joined = run.await;
    guard.disarm();

    match joined {
        Ok(report) => report_response(report),
        Err(e) => {
            tracing::error!("Crawl task failed: {}", e);
            ErrorBody::response(StatusCode::INTERNAL_SERVER_ERROR, "crawl task failed", Vec::new())
        }
    }
}

fn report_response(report: RunReport) -> Response {
    let status = if report.is_completed() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report)).into_response()
}

/// Streams progress events of every run as server-sent events
///
/// Each SSE event is named after the event kind and carries the event as
/// JSON. Events missed by a slow client are skipped.
pub async fn events_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let events = BroadcastStream::new(state.events.subscribe()).filter_map(|received| async move {
        let event = received.ok()?;
        let name = serde_json::to_value(event.kind)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "message".to_string());
        SseEvent::default()
            .event(name)
            .json_data(&event)
            .ok()
            .map(Ok)
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}
