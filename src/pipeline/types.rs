use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::notes::{NoteOptions, NoteType};

/// One parsed reference from a note's References section.
///
/// `content` is the model's own quote, copied out of the reference block.
/// It is never looked up in the source files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// `filename:section`. Not unique across numbers.
    pub id: String,
    pub number: u32,
    pub filename: String,
    pub section: String,
    /// Parsed from a `YYYYMMDD-HH.MM` fragment in the filename.
    pub timestamp: Option<NaiveDateTime>,
    pub content: String,
    pub context: String,
}

/// Citation number → citation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CitationMap {
    pub citations: BTreeMap<u32, Citation>,
    pub total_count: usize,
}

impl CitationMap {
    /// Build from parsed citations. Later entries overwrite earlier ones
    /// with the same number.
    pub fn from_citations(citations: impl IntoIterator<Item = Citation>) -> Self {
        let mut map = BTreeMap::new();
        for citation in citations {
            map.insert(citation.number, citation);
        }
        let total_count = map.len();
        Self {
            citations: map,
            total_count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.citations.is_empty()
    }

    pub fn get(&self, number: u32) -> Option<&Citation> {
        self.citations.get(&number)
    }
}

/// Payload of the `note_complete` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteSummary {
    pub markdown: String,
    pub citations: BTreeMap<u32, Citation>,
    pub citation_count: usize,
}

impl NoteSummary {
    pub fn new(markdown: String, map: CitationMap) -> Self {
        Self {
            markdown,
            citation_count: map.total_count,
            citations: map.citations,
        }
    }
}

/// Server → client events for one generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NoteEvent {
    /// One model delta, forwarded as received.
    Chunk { content: String },
    /// Full document plus parsed citations.
    NoteComplete { data: NoteSummary },
    /// Terminal marker after `NoteComplete`.
    Done,
    /// Terminal failure for this generation.
    Error { content: String },
}

impl NoteEvent {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Chunk { .. } => "chunk",
            Self::NoteComplete { .. } => "note_complete",
            Self::Done => "done",
            Self::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error { .. })
    }
}

/// A request to generate one document for a session.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub session_id: String,
    pub note_type: NoteType,
    pub options: NoteOptions,
}

impl GenerationRequest {
    pub fn new(session_id: impl Into<String>, note_type: NoteType) -> Self {
        Self {
            session_id: session_id.into(),
            note_type,
            options: NoteOptions::default(),
        }
    }

    pub fn with_options(mut self, options: NoteOptions) -> Self {
        self.options = options;
        self
    }
}

/// Returned once a generation task has been started (not finished).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GenerationTicket {
    pub task_id: Uuid,
}
