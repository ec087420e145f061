//! Citation extraction from a finished note.
//!
//! Grammar of the References section (line oriented, best effort):
//!
//! ```text
//! heading  := "## References" <spaces>            (the last one in the note wins)
//! body     := every line after heading up to the next line starting with "##"
//! entry    := <ws>* NUMBER "." <ws>* "[cite:" FILENAME ":" SECTION "]" <ws>*
//! quote    := (<blank line>)* <ws>* ">" TEXT, then continuation lines up to the
//!             next `N. [cite:` line (even a malformed one) or the end of the body
//! FILENAME := one or more chars, no ':' and no ']'
//! SECTION  := one or more chars, no ']'
//! ```
//!
//! Each quote line loses its leading `>` markers and surrounding whitespace;
//! the cleaned lines are joined with `\n`. Entries that do not fit the grammar
//! are skipped. Parsing never fails.

use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;

use super::types::{Citation, CitationMap};
use crate::sources::SourceFiles;

/// Heading that opens the reference list.
const REFERENCES_HEADING: &str = "## References";

static ENTRY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d+)\.\s*\[cite:([^:\]]+):([^\]]+)\]\s*$").expect("valid entry pattern")
});

/// Start of any numbered cite line, well-formed or not. Quote blocks stop here.
static ENTRY_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\d+\.\s*\[cite:").expect("valid boundary pattern"));

static TIMESTAMP_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{8})-(\d{2})\.(\d{2})").expect("valid timestamp pattern")
});

/// Parse the References section of `note_text` into a citation map.
///
/// `_sources` is accepted for call-site symmetry with the generation inputs;
/// quotes are taken from the note itself.
pub fn extract_citations(note_text: &str, _sources: &SourceFiles) -> CitationMap {
    let Some(body) = references_body(note_text) else {
        tracing::debug!("No References section in note");
        return CitationMap::default();
    };

    let map = CitationMap::from_citations(parse_entries(&body));
    tracing::info!(citations = map.total_count, "Citations extracted");
    map
}

/// Citation numbers whose filename is not one of the loaded sources.
pub fn unknown_sources(map: &CitationMap, sources: &SourceFiles) -> Vec<u32> {
    map.citations
        .values()
        .filter(|c| !sources.contains_key(&c.filename))
        .map(|c| c.number)
        .collect()
}

/// Parse a `YYYYMMDD-HH.MM` fragment anywhere in `filename`.
pub fn parse_filename_timestamp(filename: &str) -> Option<NaiveDateTime> {
    let caps = TIMESTAMP_PATTERN.captures(filename)?;
    let joined = format!("{}{}{}", &caps[1], &caps[2], &caps[3]);
    NaiveDateTime::parse_from_str(&joined, "%Y%m%d%H%M").ok()
}

/// Lines of the last References section, heading excluded.
fn references_body(note_text: &str) -> Option<Vec<&str>> {
    let lines: Vec<&str> = note_text.lines().collect();
    let heading = lines
        .iter()
        .rposition(|line| line.trim_end() == REFERENCES_HEADING)?;

    Some(
        lines[heading + 1..]
            .iter()
            .take_while(|line| !line.starts_with("##"))
            .copied()
            .collect(),
    )
}

fn parse_entries(body: &[&str]) -> Vec<Citation> {
    let mut citations = Vec::new();
    let mut i = 0;

    while i < body.len() {
        if !ENTRY_BOUNDARY.is_match(body[i]) {
            i += 1;
            continue;
        }
        let entry_line = body[i];
        i += 1;

        // Quote block runs until the next numbered cite line.
        let start = i;
        while i < body.len() && !ENTRY_BOUNDARY.is_match(body[i]) {
            i += 1;
        }
        let block = &body[start..i];

        let Some(caps) = ENTRY_PATTERN.captures(entry_line) else {
            continue;
        };

        let Ok(number) = caps[1].parse::<u32>() else {
            continue;
        };
        let filename = caps[2].trim();
        let section = caps[3].trim();
        if filename.is_empty() || section.is_empty() {
            continue;
        }
        let Some(content) = clean_quote(block) else {
            continue;
        };

        citations.push(Citation {
            id: format!("{filename}:{section}"),
            number,
            filename: filename.to_string(),
            section: section.to_string(),
            timestamp: parse_filename_timestamp(filename),
            content,
            context: format!("From {section}"),
        });
    }

    citations
}

/// Strip quote markers from a reference block.
///
/// The first non-blank line must be a `>` quote line; otherwise the entry
/// has no quote and `None` is returned.
fn clean_quote(block: &[&str]) -> Option<String> {
    let first = block.iter().position(|line| !line.trim().is_empty())?;
    if !block[first].trim_start().starts_with('>') {
        return None;
    }

    let cleaned: Vec<&str> = block[first..]
        .iter()
        .map(|line| line.trim().trim_start_matches('>').trim())
        .collect();
    let content = cleaned.join("\n").trim().to_string();

    (!content.is_empty()).then_some(content)
}
