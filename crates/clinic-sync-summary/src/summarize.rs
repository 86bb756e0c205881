//! Summarization backend boundary and response cleanup.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use clinic_sync_core::models::{Medication, Patient, Visit};
use serde::Deserialize;
use thiserror::Error;

use crate::prompts::{make_history_prompt, SYSTEM_PROMPT};

/// Shown to the operator whenever a summary could not be produced.
pub const SUMMARY_FAILURE_MESSAGE: &str =
    "Unable to generate a summary right now. Please try again later.";

/// Returned without contacting the backend when a patient has no visits.
pub const NO_HISTORY_MESSAGE: &str = "No visit history recorded for this patient yet.";

/// Summarization errors.
#[derive(Error, Debug)]
pub enum SummaryError {
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Backend returned an empty summary")]
    EmptyResponse,
}

pub type SummaryResult<T> = Result<T, SummaryError>;

/// A text-generation service.
#[async_trait]
pub trait SummaryBackend: Send + Sync {
    /// Complete `prompt` under the `system` instructions; returns raw text.
    async fn complete(&self, system: &str, prompt: &str) -> SummaryResult<String>;
}

#[derive(Debug, Deserialize)]
struct SummaryOutput {
    summary: String,
}

/// Extract the summary from a backend reply.
///
/// Accepts `{"summary": "..."}` (possibly surrounded by chatter) or plain
/// text.
pub fn parse_summary_output(raw: &str) -> SummaryResult<String> {
    let text = match (raw.find('{'), raw.rfind('}')) {
        (Some(start), Some(end)) if start < end => {
            match serde_json::from_str::<SummaryOutput>(&raw[start..=end]) {
                Ok(output) => output.summary,
                Err(_) => raw.to_string(),
            }
        }
        _ => raw.to_string(),
    };

    let text = text.trim();
    if text.is_empty() {
        return Err(SummaryError::EmptyResponse);
    }
    Ok(text.to_string())
}

/// Produces patient history summaries through a [`SummaryBackend`].
pub struct HistorySummarizer<B> {
    backend: B,
}

impl<B: SummaryBackend> HistorySummarizer<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Summarize `patient`'s history. Never fails: errors become
    /// [`SUMMARY_FAILURE_MESSAGE`].
    pub async fn summarize(
        &self,
        patient: &Patient,
        visits: &[Visit],
        medications: &[Medication],
    ) -> String {
        match self.try_summarize(patient, visits, medications).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::warn!(patient_id = %patient.id, error = %e, "history summary failed");
                SUMMARY_FAILURE_MESSAGE.to_string()
            }
        }
    }

    pub async fn try_summarize(
        &self,
        patient: &Patient,
        visits: &[Visit],
        medications: &[Medication],
    ) -> SummaryResult<String> {
        let visit_count = visits.iter().filter(|v| v.patient_id == patient.id).count();
        if visit_count == 0 {
            return Ok(NO_HISTORY_MESSAGE.to_string());
        }

        let prompt = make_history_prompt(patient, visits, medications);
        tracing::debug!(patient_id = %patient.id, visit_count, "requesting history summary");

        let raw = self.backend.complete(SYSTEM_PROMPT, &prompt).await?;
        parse_summary_output(&raw)
    }
}

/// Canned backend for tests and offline builds.
pub struct MockBackend {
    reply: Result<String, String>,
    calls: AtomicUsize,
}

impl MockBackend {
    /// Always answers with `reply`.
    pub fn replying(reply: impl Into<String>) -> Self {
        Self {
            reply: Ok(reply.into()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Always fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            reply: Err(message.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SummaryBackend for MockBackend {
    async fn complete(&self, _system: &str, _prompt: &str) -> SummaryResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply.clone().map_err(SummaryError::Backend)
    }
}
