//! Transaction Sentinel: batch anomaly detection and explanation for transaction data.
//!
//! Modular structure:
//! - [`records`] — Transaction batches loaded from CSV
//! - [`features`] — Label encoding and standard scaling of batch columns
//! - [`model`] — Isolation forest and the trained model snapshot
//! - [`storage`] — Atomic, checksummed snapshot persistence
//! - [`scoring`] — Anomaly scoring of a batch against the stored model
//! - [`analysis`] — Per-feature deviation analysis of flagged transactions
//! - [`narrative`] — LLM-generated explanations
//! - [`report`] — Annotated CSV and XLSX output
//! - [`pipeline`] — Train → score → explain orchestration
//! - [`logging`] — Structured JSON logging

pub mod analysis;
pub mod config;
pub mod error;
pub mod features;
pub mod logging;
pub mod model;
pub mod narrative;
pub mod pipeline;
pub mod records;
pub mod report;
pub mod scoring;
pub mod storage;

pub use config::SentinelConfig;
pub use error::{ErrorKind, Result, SentinelError};
pub use records::{FieldValue, TransactionBatch, TransactionRecord};
pub use features::{EncodedBatch, FeatureEncoder};
pub use model::{IsolationForest, ModelSnapshot};
pub use storage::ModelStore;
pub use scoring::{AnomalyResult, AnomalyScorer};
pub use analysis::{DeviationAnalyzer, DeviationReport};
pub use narrative::{LlmClient, NarrativeGenerator};
pub use report::ReportWriter;
pub use pipeline::{PipelineContext, PipelineRun, StageStatus};
pub use logging::StructuredLogger;
