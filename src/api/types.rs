//! Shared API state and wire types.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::notes::{NoteOptions, NoteType};
use crate::pipeline::{NoteOrchestrator, PipelineError};

/// State shared by every handler.
#[derive(Clone)]
pub struct ApiContext {
    pub orchestrator: Arc<NoteOrchestrator>,
    pub allowed_origins: Arc<[String]>,
}

impl ApiContext {
    pub fn new(orchestrator: Arc<NoteOrchestrator>, allowed_origins: Vec<String>) -> Self {
        Self {
            orchestrator,
            allowed_origins: allowed_origins.into(),
        }
    }
}

/// Parse an optional note type string, defaulting to ward round.
pub fn parse_note_type(raw: Option<&str>) -> Result<NoteType, PipelineError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => s.parse(),
        None => Ok(NoteType::default()),
    }
}

/// `POST /api/notes/trigger-stream` body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerStreamRequest {
    pub thread_id: String,
    #[serde(default)]
    pub doc_type: Option<String>,
    #[serde(default)]
    pub note_options: Option<NoteOptions>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerStreamResponse {
    pub status: &'static str,
    pub thread_id: String,
    pub task_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct NoteTypesResponse {
    pub note_types: Vec<NoteType>,
    pub default: NoteType,
}

/// Text frame a client sends over the note WebSocket to start a generation.
#[derive(Debug, Default, Deserialize)]
pub struct WsGenerationRequest {
    pub message: Option<String>,
    #[serde(alias = "docType")]
    pub note_type: Option<String>,
}

impl WsGenerationRequest {
    /// A frame carrying neither field is not a generation request.
    pub fn is_empty(&self) -> bool {
        self.message.is_none() && self.note_type.is_none()
    }
}
