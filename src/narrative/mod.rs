//! Narrative pass: deviation report → prompt → LLM → per-transaction explanations.

mod client;
mod extract;
mod prompt;

pub use client::{GeminiClient, LlmClient, LlmError, RetryPolicy};
pub use extract::{extract_explanations, strip_code_fences, ExtractError, MAX_RESPONSE_BYTES};
pub use prompt::build_prompt;

use crate::analysis::DeviationReport;
use crate::error::{Result, SentinelError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Narrative {
    /// Transaction ID → explanation
    pub explanations: BTreeMap<String, String>,
    /// Model output with code fences removed
    pub raw_text: String,
}

pub struct NarrativeGenerator<'a> {
    client: &'a dyn LlmClient,
    retry: RetryPolicy,
}

impl<'a> NarrativeGenerator<'a> {
    pub fn new(client: &'a dyn LlmClient, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    /// One LLM round trip for the whole report. Call and parse failures both surface as
    /// [`SentinelError::ExplanationGeneration`].
    pub fn generate(&self, report: &DeviationReport) -> Result<Narrative> {
        if report.entries.is_empty() {
            return Ok(Narrative::default());
        }
        let prompt = build_prompt(report)?;
        let raw = self
            .retry
            .call(self.client, &prompt)
            .map_err(|e| SentinelError::ExplanationGeneration(e.to_string()))?;
        let explanations = extract_explanations(&raw)
            .map_err(|e| SentinelError::ExplanationGeneration(e.to_string()))?;

        let unmatched = report
            .entries
            .iter()
            .filter(|e| !explanations.contains_key(&e.transaction_id))
            .count();
        if unmatched > 0 {
            warn!(unmatched, "llm response is missing some flagged transactions");
        }
        info!(explained = explanations.len(), "narrative generated");
        Ok(Narrative {
            explanations,
            raw_text: strip_code_fences(&raw),
        })
    }
}
