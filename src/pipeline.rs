use crate::{
    engine::{EngineError, Recognizer},
    interpret::{self, DocumentType, InterpretError, VerificationResult},
    storage::{Ingestor, StorageError, StoredFile},
};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Interpret(#[from] InterpretError),

    #[error("recognition task aborted before completion")]
    TaskAborted,
}

/// Sequences ingest -> recognize -> interpret, and exposes each stage
/// independently for the upload-now-verify-later flow.
pub struct Pipeline {
    ingestor: Ingestor,
    recognizer: Arc<dyn Recognizer>,
}

impl Pipeline {
    pub fn new(ingestor: Ingestor, recognizer: Arc<dyn Recognizer>) -> Self {
        Self {
            ingestor,
            recognizer,
        }
    }

    pub fn ingestor(&self) -> &Ingestor {
        &self.ingestor
    }

    /// Upload-only flow: persist the file, run no recognition.
    pub async fn upload(
        &self,
        bytes: &[u8],
        original_name: &str,
        declared_mime_type: &str,
    ) -> Result<StoredFile, PipelineError> {
        Ok(self
            .ingestor
            .ingest(bytes, original_name, declared_mime_type)
            .await?)
    }

    /// Verify-by-reference flow: the file must already be durably stored.
    ///
    /// The subprocess runs on the blocking pool so one slow engine run never
    /// stalls unrelated requests; a disconnecting caller does not cancel it.
    pub async fn verify(
        &self,
        storage_id: &str,
        document_type: DocumentType,
    ) -> Result<VerificationResult, PipelineError> {
        let path = self.ingestor.resolve(storage_id).await?;
        let recognizer = self.recognizer.clone();

        let started = Instant::now();
        let raw = tokio::task::spawn_blocking(move || recognizer.recognize(&path))
            .await
            .map_err(|_| PipelineError::TaskAborted)??;

        let result = interpret::interpret(&raw, document_type)?;
        info!(
            storage_id = %storage_id,
            doc_type = document_type.wire_name(),
            verified = result.verified,
            fields = result.extracted_fields.len(),
            engine_ms = raw.duration_ms,
            total_ms = started.elapsed().as_millis() as u64,
            "verification complete"
        );
        Ok(result)
    }

    /// Combined flow. A verification failure after a successful ingest still
    /// hands the `StoredFile` back, so the uploaded artifact is never
    /// orphaned from the caller's perspective.
    pub async fn upload_and_verify(
        &self,
        bytes: &[u8],
        original_name: &str,
        declared_mime_type: &str,
        document_type: DocumentType,
    ) -> Result<(StoredFile, Result<VerificationResult, PipelineError>), PipelineError> {
        let stored = self
            .upload(bytes, original_name, declared_mime_type)
            .await?;
        let verdict = self.verify(&stored.storage_id, document_type).await;
        if let Err(err) = &verdict {
            warn!(
                storage_id = %stored.storage_id,
                error = %err,
                "verification failed after successful upload"
            );
        }
        Ok((stored, verdict))
    }
}
