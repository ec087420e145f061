//! Session orchestrator: the entry points the transport calls.
//!
//! Connect and disconnect map straight onto the registry. A generation
//! request checks the note type and the session's connection, then hands a
//! task to the registry and returns without waiting for it.

use std::sync::Arc;

use uuid::Uuid;

use super::relay::{relay_note, RelayOutcome};
use super::types::{GenerationRequest, GenerationTicket, NoteEvent};
use super::PipelineError;
use crate::llm::{ModelCallConfig, ModelClient};
use crate::notes::{build_messages, formatter_for, NoteFormatter, NoteOptions};
use crate::session_registry::{Connection, DeliveryHandle, SessionRegistry};
use crate::sources::SourceProvider;

pub struct NoteOrchestrator {
    registry: Arc<SessionRegistry>,
    model: Arc<dyn ModelClient>,
    sources: Arc<dyn SourceProvider>,
}

impl NoteOrchestrator {
    pub fn new(
        registry: Arc<SessionRegistry>,
        model: Arc<dyn ModelClient>,
        sources: Arc<dyn SourceProvider>,
    ) -> Self {
        Self {
            registry,
            model,
            sources,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub async fn on_connect(&self, session_id: &str, connection: Connection) {
        self.registry.register(session_id, connection).await;
    }

    pub async fn on_disconnect(&self, session_id: &str) -> bool {
        self.registry.unregister(session_id).await
    }

    /// Close path for one socket; leaves a newer binding alone.
    pub async fn disconnect_connection(&self, session_id: &str, connection_id: Uuid) -> bool {
        self.registry
            .disconnect_connection(session_id, connection_id)
            .await
    }

    /// Start generating a note for the session, superseding any running one.
    ///
    /// Returns as soon as the task is spawned.
    pub async fn on_generation_request(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationTicket, PipelineError> {
        let GenerationRequest {
            session_id,
            note_type,
            options,
        } = request;

        let formatter = formatter_for(note_type)?;
        if self.registry.lookup_connection(&session_id).await.is_none() {
            tracing::warn!(session_id = %session_id, "Generation requested without a connection");
            return Err(PipelineError::NoConnection(session_id));
        }

        let model = Arc::clone(&self.model);
        let sources = Arc::clone(&self.sources);
        let task_id = self
            .registry
            .supersede_and_start(&session_id, move |delivery| {
                run_generation(delivery, formatter, model, sources, options)
            })
            .await?;

        tracing::info!(session_id = %session_id, %task_id, %note_type, "Generation started");
        Ok(GenerationTicket { task_id })
    }
}

/// One generation task: load sources, prompt the model, relay the stream.
async fn run_generation(
    delivery: DeliveryHandle,
    formatter: Box<dyn NoteFormatter>,
    model: Arc<dyn ModelClient>,
    sources: Arc<dyn SourceProvider>,
    options: NoteOptions,
) {
    let loaded = tokio::select! {
        biased;
        _ = delivery.cancelled() => return,
        loaded = tokio::task::spawn_blocking(move || sources.load()) => loaded,
    };

    let files = match loaded {
        Ok(Ok(files)) => files,
        Ok(Err(e)) => {
            tracing::error!(session_id = delivery.session_id(), error = %e, "Source loading failed");
            delivery
                .deliver(NoteEvent::Error {
                    content: e.to_string(),
                })
                .await;
            return;
        }
        Err(e) => {
            tracing::error!(session_id = delivery.session_id(), error = %e, "Source loading task failed");
            delivery
                .deliver(NoteEvent::Error {
                    content: "Failed to load source files".to_string(),
                })
                .await;
            return;
        }
    };

    tracing::debug!(
        session_id = delivery.session_id(),
        files = files.len(),
        "Building prompt"
    );
    let user_message = formatter.format_user_message(&files, options.instruction());
    let messages = build_messages(formatter.system_prompt(), &user_message);
    let config = ModelCallConfig {
        model: options.model,
        temperature: options.temperature,
    };

    let deltas = model.stream_chat(messages, config);
    if let RelayOutcome::Completed { markdown, .. } = relay_note(&delivery, deltas, &files).await {
        let check = formatter.validate_note(&markdown);
        if !check.missing_sections.is_empty() {
            tracing::warn!(
                session_id = delivery.session_id(),
                note_type = %formatter.note_type(),
                missing = ?check.missing_sections,
                "Generated note is missing sections"
            );
        }
        if !check.has_citations {
            tracing::warn!(
                session_id = delivery.session_id(),
                "Generated note has no citations"
            );
        }
    }
}
