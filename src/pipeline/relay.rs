//! Stream relay: forwards model deltas to the session's connection and
//! reports the finished note.
//!
//! Per task the connection sees the chunks in arrival order, then either
//! `note_complete` + `done` or a single `error`. A cancelled task sends
//! nothing further, and the delta stream is dropped as soon as the
//! cancellation is observed.

use futures_util::StreamExt;

use super::citation::{extract_citations, unknown_sources};
use super::types::{NoteEvent, NoteSummary};
use crate::llm::{DeltaStream, LlmError};
use crate::session_registry::{Delivery, DeliveryHandle};
use crate::sources::SourceFiles;

#[derive(Debug, PartialEq)]
pub enum RelayOutcome {
    Completed {
        markdown: String,
        citation_count: usize,
    },
    Failed(LlmError),
    Cancelled,
}

pub async fn relay_note(
    delivery: &DeliveryHandle,
    mut deltas: DeltaStream,
    sources: &SourceFiles,
) -> RelayOutcome {
    let mut markdown = String::new();
    let mut chunks = 0usize;
    let mut dropped = 0usize;

    loop {
        let next = tokio::select! {
            biased;
            _ = delivery.cancelled() => None,
            next = deltas.next() => Some(next),
        };
        let Some(next) = next else {
            return cancelled(delivery, chunks);
        };

        match next {
            Some(Ok(delta)) => {
                if delta.is_empty() {
                    continue;
                }
                markdown.push_str(&delta);
                chunks += 1;
                match delivery.deliver(NoteEvent::Chunk { content: delta }).await {
                    Delivery::Delivered => {}
                    Delivery::Dropped => dropped += 1,
                    Delivery::Cancelled => return cancelled(delivery, chunks),
                }
            }
            Some(Err(e)) => {
                tracing::error!(
                    session_id = delivery.session_id(),
                    task_id = %delivery.task_id(),
                    chunks,
                    error = %e,
                    "Model stream failed"
                );
                let event = NoteEvent::Error {
                    content: e.to_string(),
                };
                if delivery.deliver(event).await == Delivery::Cancelled {
                    return cancelled(delivery, chunks);
                }
                return RelayOutcome::Failed(e);
            }
            None => break,
        }
    }
    drop(deltas);

    if dropped > 0 {
        tracing::warn!(
            session_id = delivery.session_id(),
            dropped,
            "Connection closed during generation, chunks discarded"
        );
    }

    let map = extract_citations(&markdown, sources);
    let unknown = unknown_sources(&map, sources);
    if !unknown.is_empty() {
        tracing::warn!(
            session_id = delivery.session_id(),
            citations = ?unknown,
            "Citations refer to files that were not provided"
        );
    }

    let citation_count = map.total_count;
    let summary = NoteSummary::new(markdown.clone(), map);
    if delivery
        .deliver(NoteEvent::NoteComplete { data: summary })
        .await
        == Delivery::Cancelled
    {
        return cancelled(delivery, chunks);
    }
    if delivery.deliver(NoteEvent::Done).await == Delivery::Cancelled {
        return cancelled(delivery, chunks);
    }

    tracing::info!(
        session_id = delivery.session_id(),
        task_id = %delivery.task_id(),
        chunks,
        chars = markdown.len(),
        citation_count,
        "Note streamed"
    );
    RelayOutcome::Completed {
        markdown,
        citation_count,
    }
}

fn cancelled(delivery: &DeliveryHandle, chunks: usize) -> RelayOutcome {
    tracing::info!(
        session_id = delivery.session_id(),
        task_id = %delivery.task_id(),
        chunks,
        "Generation cancelled"
    );
    RelayOutcome::Cancelled
}
