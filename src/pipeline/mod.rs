pub mod citation;
pub mod orchestrator;
pub mod relay;
pub mod types;

pub use orchestrator::NoteOrchestrator;
pub use relay::{relay_note, RelayOutcome};
pub use types::*;

use thiserror::Error;

use crate::notes::NoteType;
use crate::session_registry::SessionError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("No connection for session {0}")]
    NoConnection(String),

    #[error("Note type {0} is not supported yet")]
    UnsupportedNoteType(NoteType),

    #[error("Unknown note type: {0}")]
    UnknownNoteType(String),

    #[error(transparent)]
    Session(#[from] SessionError),
}
