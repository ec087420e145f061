//! Document types and prompt construction.

pub mod ward_round;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::llm::ChatMessage;
use crate::pipeline::PipelineError;
use crate::sources::SourceFiles;

pub use ward_round::WardRoundFormatter;

/// Instruction used when the client does not send one.
pub const DEFAULT_INSTRUCTION: &str = "generate today's ward round note";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteType {
    #[default]
    WardRound,
    Discharge,
}

impl NoteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WardRound => "ward_round",
            Self::Discharge => "discharge",
        }
    }
}

impl fmt::Display for NoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NoteType {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "ward_round" => Ok(Self::WardRound),
            "discharge" => Ok(Self::Discharge),
            other => Err(PipelineError::UnknownNoteType(other.to_string())),
        }
    }
}

/// Client-supplied knobs for one generation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoteOptions {
    pub instruction: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
}

impl NoteOptions {
    pub fn instruction(&self) -> &str {
        self.instruction
            .as_deref()
            .map(str::trim)
            .filter(|i| !i.is_empty())
            .unwrap_or(DEFAULT_INSTRUCTION)
    }
}

/// Result of the post-generation structure check.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NoteCheck {
    pub missing_sections: Vec<String>,
    pub has_citations: bool,
}

impl NoteCheck {
    pub fn is_valid(&self) -> bool {
        self.missing_sections.is_empty() && self.has_citations
    }
}

/// Builds prompts for one note type and checks the result.
pub trait NoteFormatter: Send + Sync {
    fn note_type(&self) -> NoteType;

    fn system_prompt(&self) -> &str;

    /// Section headings the finished note must contain.
    fn sections(&self) -> &[&'static str];

    /// Wrap every source in `<source>` tags so the model can cite it by name.
    fn format_user_message(&self, sources: &SourceFiles, instruction: &str) -> String {
        let blocks: Vec<String> = sources
            .iter()
            .map(|(name, content)| {
                format!(
                    "<source id=\"{name}\">\n<filename>{name}</filename>\n<content>\n{content}\n</content>\n</source>\n"
                )
            })
            .collect();

        format!(
            "Based on the following medical files, {instruction}\n\n## Medical Source Files:\n\n{}",
            blocks.join("\n")
        )
    }

    fn validate_note(&self, note: &str) -> NoteCheck {
        let headings: Vec<String> = note
            .lines()
            .map(|line| {
                line.trim()
                    .trim_start_matches('#')
                    .trim()
                    .trim_end_matches(':')
                    .to_lowercase()
            })
            .collect();

        let missing_sections = self
            .sections()
            .iter()
            .filter(|section| !headings.iter().any(|h| *h == section.to_lowercase()))
            .map(|section| section.to_string())
            .collect();

        NoteCheck {
            missing_sections,
            has_citations: note.contains("[cite:"),
        }
    }
}

/// Formatter for `note_type`, or `UnsupportedNoteType` when none exists yet.
pub fn formatter_for(note_type: NoteType) -> Result<Box<dyn NoteFormatter>, PipelineError> {
    match note_type {
        NoteType::WardRound => Ok(Box::new(WardRoundFormatter)),
        NoteType::Discharge => Err(PipelineError::UnsupportedNoteType(note_type)),
    }
}

/// Note types that currently have a formatter.
pub fn available_note_types() -> Vec<NoteType> {
    [NoteType::WardRound, NoteType::Discharge]
        .into_iter()
        .filter(|t| formatter_for(*t).is_ok())
        .collect()
}

pub fn build_messages(system: &str, user: &str) -> Vec<ChatMessage> {
    vec![ChatMessage::system(system), ChatMessage::user(user)]
}
