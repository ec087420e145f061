//! Note generation endpoints.
//!
//! - `POST /api/notes/trigger-stream`: start a generation for a thread whose
//!   WebSocket is already open (events arrive on that socket)
//! - `GET /api/notes/types`: supported note types

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::{
    parse_note_type, ApiContext, NoteTypesResponse, TriggerStreamRequest, TriggerStreamResponse,
};
use crate::notes::{available_note_types, NoteType};
use crate::pipeline::GenerationRequest;

/// `POST /api/notes/trigger-stream`: returns 202 once the task is spawned.
pub async fn trigger_stream(
    State(ctx): State<ApiContext>,
    payload: Result<Json<TriggerStreamRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TriggerStreamResponse>), ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let thread_id = req.thread_id.trim().to_string();
    if thread_id.is_empty() {
        return Err(ApiError::BadRequest("threadId is required".into()));
    }
    let note_type = parse_note_type(req.doc_type.as_deref())?;

    let request = GenerationRequest::new(thread_id.clone(), note_type)
        .with_options(req.note_options.unwrap_or_default());
    let ticket = ctx.orchestrator.on_generation_request(request).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(TriggerStreamResponse {
            status: "started",
            thread_id,
            task_id: ticket.task_id,
        }),
    ))
}

/// `GET /api/notes/types`
pub async fn types() -> Json<NoteTypesResponse> {
    Json(NoteTypesResponse {
        note_types: available_note_types(),
        default: NoteType::default(),
    })
}
