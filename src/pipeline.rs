//! Pipeline context: train → score → explain, with every dependency passed in explicitly.
//!
//! The snapshot is read from disk on every score/explain call, so a retrain by another
//! process is picked up without a restart.

use crate::analysis::{self, DeviationEntry};
use crate::config::SentinelConfig;
use crate::error::{ErrorKind, Result, SentinelError};
use crate::model::{ForestParams, ModelSnapshot, TrainingMetadata};
use crate::narrative::{GeminiClient, LlmClient, Narrative, NarrativeGenerator, RetryPolicy};
use crate::records::TransactionBatch;
use crate::report::{ReportPaths, ReportWriter};
use crate::scoring::{AnomalyResult, AnomalyScorer};
use crate::storage::ModelStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Train,
    Score,
    Explain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success,
    Failed,
}

/// What every stage hands back to the invoking layer. Never a raw error chain.
#[derive(Debug, Clone, Serialize)]
pub struct StageStatus {
    pub stage: Stage,
    pub status: Status,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

impl StageStatus {
    pub fn success(stage: Stage, message: impl Into<String>, result: &impl Serialize) -> Self {
        Self {
            stage,
            status: Status::Success,
            message: message.into(),
            error_kind: None,
            result: serde_json::to_value(result).ok(),
        }
    }

    pub fn failed(stage: Stage, err: &SentinelError) -> Self {
        Self {
            stage,
            status: Status::Failed,
            message: err.to_string(),
            error_kind: Some(err.kind()),
            result: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExplanationResult {
    pub timestamp: DateTime<Utc>,
    pub total_anomalies: usize,
    /// Seconds spent on analysis, narrative and reports
    pub ai_analysis_time: f64,
    pub output_files: ReportPaths,
    pub raw_analysis: String,
    pub explanations: BTreeMap<String, String>,
    pub deviations: Vec<DeviationEntry>,
}

/// Explanation output plus the narrative failure, if any. Reports are written either way.
#[derive(Debug)]
pub struct ExplainOutcome {
    pub result: ExplanationResult,
    pub narrative_error: Option<SentinelError>,
}

impl ExplainOutcome {
    pub fn to_status(&self) -> StageStatus {
        match &self.narrative_error {
            None => StageStatus::success(
                Stage::Explain,
                format!("{} anomalies explained", self.result.total_anomalies),
                &self.result,
            ),
            Some(err) => StageStatus {
                result: serde_json::to_value(&self.result).ok(),
                ..StageStatus::failed(Stage::Explain, err)
            },
        }
    }
}

/// Statuses of a full train → score → explain run. Completed results survive later failures.
#[derive(Debug, Serialize)]
pub struct PipelineRun {
    pub run_id: Uuid,
    pub stages: Vec<StageStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anomaly_result: Option<AnomalyResult>,
    #[serde(skip)]
    pub explanation: Option<ExplainOutcome>,
}

pub struct PipelineContext {
    config: SentinelConfig,
    store: ModelStore,
    llm: Option<Box<dyn LlmClient>>,
}

impl PipelineContext {
    pub fn new(config: SentinelConfig, llm: Option<Box<dyn LlmClient>>) -> Result<Self> {
        config.validate()?;
        let store = ModelStore::new(config.snapshot_path());
        Ok(Self { config, store, llm })
    }

    /// Context with the HTTP LLM client. A missing API key only disables narratives.
    pub fn from_config(config: SentinelConfig) -> Result<Self> {
        let llm: Option<Box<dyn LlmClient>> = match GeminiClient::new(&config.llm) {
            Ok(c) => Some(Box::new(c)),
            Err(e) => {
                warn!(error = %e, "llm client unavailable; explanations will be empty");
                None
            }
        };
        Self::new(config, llm)
    }

    pub fn config(&self) -> &SentinelConfig {
        &self.config
    }

    pub fn store(&self) -> &ModelStore {
        &self.store
    }

    pub fn report_paths(&self) -> ReportPaths {
        ReportPaths {
            csv: self.config.csv_report_path(),
            xlsx: self.config.xlsx_report_path(),
        }
    }

    pub fn load_batch(&self, path: &Path) -> Result<TransactionBatch> {
        TransactionBatch::from_csv_path(path, &self.config.id_column)
    }

    /// Fit encoder and model on `batch` and replace the stored snapshot.
    pub fn train(&self, batch: &TransactionBatch) -> Result<TrainingMetadata> {
        let snapshot = ModelSnapshot::fit(batch, ForestParams::from(&self.config.model))?;
        self.store.save(&snapshot)?;
        let metadata = snapshot.metadata;
        info!(
            rows = metadata.total_transactions,
            categorical = metadata.categorical_columns.len(),
            secs = metadata.training_time,
            "model trained"
        );
        Ok(metadata)
    }

    pub fn score(&self, batch: &TransactionBatch) -> Result<AnomalyResult> {
        let snapshot = self.store.load()?;
        AnomalyScorer::score(batch, &snapshot)
    }

    /// Explain `anomaly_ids` (all present in `batch`, duplicates ignored) and write both reports.
    pub fn explain(&self, batch: &TransactionBatch, anomaly_ids: &[String]) -> Result<ExplainOutcome> {
        let timestamp = Utc::now();
        let started = Instant::now();

        let mut seen = HashSet::new();
        let anomaly_ids: Vec<String> = anomaly_ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect();

        let snapshot = self.store.load()?;
        let deviations = analysis::analyze(&snapshot, batch, &anomaly_ids)?;

        let (narrative, narrative_error) = match (&self.llm, deviations.entries.is_empty()) {
            (_, true) => (Narrative::default(), None),
            (Some(client), false) => {
                let generator = NarrativeGenerator::new(
                    client.as_ref(),
                    RetryPolicy::from_config(&self.config.llm),
                );
                match generator.generate(&deviations) {
                    Ok(n) => (n, None),
                    Err(e) => {
                        warn!(error = %e, "narrative failed; writing reports without reasons");
                        (Narrative::default(), Some(e))
                    }
                }
            }
            (None, false) => (
                Narrative::default(),
                Some(SentinelError::ExplanationGeneration(
                    "no LLM client configured".into(),
                )),
            ),
        };

        let writer = ReportWriter::new(self.report_paths());
        writer.write(batch, &anomaly_ids, &narrative.explanations)?;

        Ok(ExplainOutcome {
            result: ExplanationResult {
                timestamp,
                total_anomalies: anomaly_ids.len(),
                ai_analysis_time: started.elapsed().as_secs_f64(),
                output_files: writer.paths().clone(),
                raw_analysis: narrative.raw_text,
                explanations: narrative.explanations,
                deviations: deviations.entries,
            },
            narrative_error,
        })
    }

    pub fn train_status(&self, batch: &TransactionBatch) -> StageStatus {
        match self.train(batch) {
            Ok(meta) => StageStatus::success(
                Stage::Train,
                format!("model trained and saved to {}", self.store.path().display()),
                &meta,
            ),
            Err(e) => StageStatus::failed(Stage::Train, &e),
        }
    }

    pub fn score_status(&self, batch: &TransactionBatch) -> (StageStatus, Option<AnomalyResult>) {
        match self.score(batch) {
            Ok(result) => (
                StageStatus::success(
                    Stage::Score,
                    format!(
                        "{} of {} transactions flagged",
                        result.anomalous_transactions, result.total_transactions
                    ),
                    &result,
                ),
                Some(result),
            ),
            Err(e) => (StageStatus::failed(Stage::Score, &e), None),
        }
    }

    pub fn explain_status(
        &self,
        batch: &TransactionBatch,
        anomaly_ids: &[String],
    ) -> (StageStatus, Option<ExplainOutcome>) {
        match self.explain(batch, anomaly_ids) {
            Ok(outcome) => (outcome.to_status(), Some(outcome)),
            Err(e) => (StageStatus::failed(Stage::Explain, &e), None),
        }
    }

    /// Train on `training`, score `batch`, explain whatever was flagged.
    pub fn run(&self, training: &TransactionBatch, batch: &TransactionBatch) -> PipelineRun {
        let mut run = PipelineRun {
            run_id: Uuid::new_v4(),
            stages: Vec::with_capacity(3),
            anomaly_result: None,
            explanation: None,
        };
        info!(run_id = %run.run_id, "pipeline run started");

        let trained = self.train_status(training);
        let ok = trained.is_success();
        run.stages.push(trained);
        if !ok {
            return run;
        }

        let (scored, result) = self.score_status(batch);
        run.stages.push(scored);
        let Some(result) = result else {
            return run;
        };

        let (explained, outcome) = self.explain_status(batch, &result.anomaly_ids);
        run.stages.push(explained);
        run.anomaly_result = Some(result);
        run.explanation = outcome;
        run
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::narrative::LlmError;

    struct Down;

    impl LlmClient for Down {
        fn generate(&self, _prompt: &str) -> std::result::Result<String, LlmError> {
            Err(LlmError::Request("connection refused".into()))
        }
    }

    fn context(dir: &Path, llm: Option<Box<dyn LlmClient>>) -> PipelineContext {
        let mut config = SentinelConfig::default();
        config.data_dir = dir.to_path_buf();
        config.model.n_estimators = 25;
        config.model.contamination = 0.1;
        PipelineContext::new(config, llm).unwrap()
    }

    fn batch(n: usize) -> TransactionBatch {
        let header: Vec<String> = ["Transaction ID", "Amount", "Channel"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mut rows: Vec<Vec<String>> = (0..n)
            .map(|i| {
                vec![
                    format!("T{}", i),
                    format!("{}", 100 + (i % 7)),
                    if i % 2 == 0 { "web" } else { "pos" }.to_string(),
                ]
            })
            .collect();
        rows.push(vec!["X1".into(), "50000".into(), "crypto".into()]);
        TransactionBatch::from_rows("Transaction ID", &header, rows).unwrap()
    }

    #[test]
    fn score_before_train_is_model_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), None);
        let (status, result) = ctx.score_status(&batch(10));
        assert!(result.is_none());
        assert_eq!(status.error_kind, Some(ErrorKind::ModelNotFound));
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error_kind"], "model_not_found");
    }

    #[test]
    fn narrative_failure_keeps_anomaly_result_and_reports() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), Some(Box::new(Down)));
        let data = batch(40);
        let run = ctx.run(&data, &data);

        assert_eq!(run.stages.len(), 3);
        assert!(run.stages[0].is_success());
        assert!(run.stages[1].is_success());
        assert_eq!(run.stages[2].error_kind, Some(ErrorKind::ExplanationGeneration));
        assert!(run.stages[2].result.is_some());

        let result = run.anomaly_result.expect("anomaly result preserved");
        assert!(result.anomaly_ids.contains(&"X1".to_string()));
        assert!(ctx.report_paths().csv.exists());
        assert!(ctx.report_paths().xlsx.exists());
    }

    #[test]
    fn unknown_flagged_id_is_data_format() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), None);
        let data = batch(20);
        ctx.train(&data).unwrap();
        let err = ctx.explain(&data, &["NOPE".to_string()]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataFormat);
    }

    #[test]
    fn explain_rejects_batch_outside_trained_columns() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), None);
        ctx.train(&batch(20)).unwrap();

        let header: Vec<String> = ["Transaction ID", "Country"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let rows = vec![vec!["Z1".to_string(), "NL".to_string()]];
        let other = TransactionBatch::from_rows("Transaction ID", &header, rows).unwrap();
        let err = ctx.explain(&other, &["Z1".to_string()]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataFormat);
        assert!(err.to_string().contains("Amount"));
        assert!(!ctx.report_paths().csv.exists());
    }

    #[test]
    fn repeated_flagged_ids_are_explained_once() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), None);
        let data = batch(20);
        ctx.train(&data).unwrap();
        let outcome = ctx
            .explain(&data, &["X1".to_string(), "X1".to_string()])
            .unwrap();
        assert_eq!(outcome.result.total_anomalies, 1);
        assert_eq!(outcome.result.deviations.len(), 1);
        assert_eq!(outcome.result.deviations[0].transaction_id, "X1");
    }

    #[test]
    fn near_max_amounts_train_and_score() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), None);
        let header: Vec<String> = ["Transaction ID", "Amount"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let rows = vec![
            vec!["A".into(), "1e308".into()],
            vec!["B".into(), "1.5e308".into()],
            vec!["C".into(), "1".into()],
        ];
        let data = TransactionBatch::from_rows("Transaction ID", &header, rows).unwrap();
        ctx.train(&data).unwrap();
        let result = ctx.score(&data).unwrap();
        assert_eq!(result.total_transactions, 3);
    }
}
