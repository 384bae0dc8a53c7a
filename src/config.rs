//! Pipeline configuration. Loaded once by the caller and passed into [`crate::PipelineContext`].

use crate::error::{Result, SentinelError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_ID_COLUMN: &str = "Transaction ID";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SentinelConfig {
    /// Data directory (model snapshot, reports)
    pub data_dir: PathBuf,
    /// Identifier column required in every input batch
    pub id_column: String,
    /// Outlier model hyperparameters and snapshot location
    pub model: ModelConfig,
    /// Narrative LLM endpoint and retry policy
    pub llm: LlmConfig,
    /// Report output paths
    pub report: ReportConfig,
    /// Logging
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Snapshot file name, relative to `data_dir` unless absolute
    pub snapshot_file: PathBuf,
    pub n_estimators: usize,
    /// Rows drawn (without replacement) to grow each tree
    pub max_samples: usize,
    /// Expected fraction of anomalies, (0, 0.5]
    pub contamination: f64,
    pub random_state: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of a Gemini-style `generateContent` API
    pub endpoint: String,
    pub model: String,
    /// Inline key; takes precedence over `api_key_env`
    pub api_key: Option<String>,
    /// Environment variable consulted when `api_key` is unset
    pub api_key_env: String,
    /// Total attempts per prompt, including the first
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each rate-limited attempt
    pub base_backoff_ms: u64,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub csv_path: PathBuf,
    pub xlsx_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".sentinel"),
            id_column: DEFAULT_ID_COLUMN.to_string(),
            model: ModelConfig::default(),
            llm: LlmConfig::default(),
            report: ReportConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            snapshot_file: PathBuf::from("anomaly_detection_model.json"),
            n_estimators: 100,
            max_samples: 256,
            contamination: 0.02,
            random_state: 42,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-1.5-pro".to_string(),
            api_key: None,
            api_key_env: "GEMINI_API_KEY".to_string(),
            max_attempts: 4,
            base_backoff_ms: 500,
            timeout_secs: 60,
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            csv_path: PathBuf::from("analysed_transaction.csv"),
            xlsx_path: PathBuf::from("analysed_transaction.xlsx"),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}

fn under(dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        dir.join(path)
    }
}

impl SentinelConfig {
    /// Read the JSON file. A missing file yields the defaults; an unreadable or invalid one
    /// is a config error, left to the caller to report.
    pub fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path).map_err(|e| {
            SentinelError::Config(format!("unreadable config {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&data)
            .map_err(|e| SentinelError::Config(format!("invalid config {}: {}", path.display(), e)))
    }

    /// Load from JSON file if present; otherwise return default
    pub fn load(path: &Path) -> Self {
        Self::read(path).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "using default config");
            Self::default()
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.id_column.trim().is_empty() {
            return Err(SentinelError::Config("id_column must not be empty".into()));
        }
        let c = self.model.contamination;
        if !(c > 0.0 && c <= 0.5) {
            return Err(SentinelError::Config(format!(
                "contamination must be in (0, 0.5], got {}",
                c
            )));
        }
        if self.model.n_estimators == 0 {
            return Err(SentinelError::Config("n_estimators must be positive".into()));
        }
        if self.model.max_samples < 2 {
            return Err(SentinelError::Config("max_samples must be at least 2".into()));
        }
        if self.llm.max_attempts == 0 {
            return Err(SentinelError::Config("llm.max_attempts must be positive".into()));
        }
        Ok(())
    }

    pub fn snapshot_path(&self) -> PathBuf {
        under(&self.data_dir, &self.model.snapshot_file)
    }

    pub fn csv_report_path(&self) -> PathBuf {
        under(&self.data_dir, &self.report.csv_path)
    }

    pub fn xlsx_report_path(&self) -> PathBuf {
        under(&self.data_dir, &self.report.xlsx_path)
    }
}

impl LlmConfig {
    /// Inline key first, then the configured environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .filter(|k| !k.trim().is_empty())
    }
}
