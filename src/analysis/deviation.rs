//! Univariate root-cause diff: each flagged record against the profile of the normal
//! population (training rows plus flagged rows, minus every flagged ID).
//!
//! Numeric columns use mean ± 2 sample standard deviations; categorical columns use the
//! mode set. Correlated deviations across columns are not detected.

use crate::error::Result;
use crate::features::{moments, ColumnKind};
use crate::model::ModelSnapshot;
use crate::records::{FieldValue, TransactionBatch, TransactionRecord};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Write as _;
use tracing::{debug, warn};

/// Numeric deviation cut-off, in standard deviations.
pub const STD_THRESHOLD: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericProfile {
    pub mean: f64,
    /// Sample standard deviation (n - 1 denominator)
    pub std: f64,
}

impl NumericProfile {
    /// Needs at least two values for a sample deviation.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let (mean, std) = moments(values, 1)?;
        Some(Self { mean, std })
    }

    pub fn is_deviant(&self, value: f64) -> bool {
        (value - self.mean).abs() > STD_THRESHOLD * self.std
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalProfile {
    /// Every category tied for the highest frequency, sorted
    pub modes: Vec<String>,
}

impl CategoricalProfile {
    pub fn from_values<'a, I>(values: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for v in values {
            *counts.entry(v).or_default() += 1;
        }
        let top = counts.values().copied().max()?;
        let mut modes: Vec<String> = counts
            .into_iter()
            .filter(|(_, c)| *c == top)
            .map(|(v, _)| v.to_string())
            .collect();
        modes.sort();
        Some(Self { modes })
    }

    pub fn is_deviant(&self, value: &str) -> bool {
        !self.modes.iter().any(|m| m == value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnProfile {
    Numeric(NumericProfile),
    Categorical(CategoricalProfile),
}

/// Deviant columns of one flagged transaction; in-range columns are omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviationEntry {
    pub transaction_id: String,
    pub deviations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviationReport {
    /// In flagged order
    pub entries: Vec<DeviationEntry>,
    /// Human-readable block, one paragraph per flagged transaction
    pub summary: String,
}

impl DeviationReport {
    /// `{id: {column: description}}`, the structured half of the narrative prompt.
    pub fn as_json_map(&self) -> BTreeMap<&str, &BTreeMap<String, String>> {
        self.entries
            .iter()
            .map(|e| (e.transaction_id.as_str(), &e.deviations))
            .collect()
    }
}

pub struct DeviationAnalyzer {
    profiles: Vec<(String, ColumnProfile)>,
}

impl DeviationAnalyzer {
    /// Profile every fitted column over the normal subset of training ∪ flagged.
    pub fn fit(snapshot: &ModelSnapshot, flagged: &[&TransactionRecord]) -> Self {
        let flagged_ids: HashSet<&str> = flagged.iter().map(|r| r.id.as_str()).collect();
        let normal: Vec<&TransactionRecord> = snapshot
            .training_records
            .iter()
            .chain(flagged.iter().copied())
            .filter(|r| !flagged_ids.contains(r.id.as_str()))
            .collect();
        if normal.is_empty() {
            warn!("no normal transactions to profile; deviations will be empty");
        }

        let enc = &snapshot.encoding;
        let profiles = enc
            .columns
            .iter()
            .zip(&enc.kinds)
            .filter_map(|(column, kind)| {
                let profile = match kind {
                    ColumnKind::Numeric => {
                        let values: Vec<f64> = normal
                            .iter()
                            .filter_map(|r| r.get(column).as_number())
                            .collect();
                        NumericProfile::from_values(&values).map(ColumnProfile::Numeric)
                    }
                    ColumnKind::Categorical => {
                        let keys: Vec<String> = normal
                            .iter()
                            .map(|r| r.get(column).category_key().into_owned())
                            .collect();
                        CategoricalProfile::from_values(keys.iter().map(String::as_str))
                            .map(ColumnProfile::Categorical)
                    }
                };
                profile.map(|p| (column.clone(), p))
            })
            .collect();
        Self { profiles }
    }

    pub fn profiles(&self) -> &[(String, ColumnProfile)] {
        &self.profiles
    }

    fn diff(&self, record: &TransactionRecord, summary: &mut String) -> DeviationEntry {
        let mut deviations = BTreeMap::new();
        let _ = writeln!(summary, "Transaction ID: {}", record.id);
        for (column, profile) in &self.profiles {
            let value = record.get(column);
            match profile {
                ColumnProfile::Numeric(p) => {
                    // Missing numbers have nothing to compare.
                    let FieldValue::Number { value: v, .. } = value else {
                        continue;
                    };
                    if p.is_deviant(*v) {
                        deviations.insert(
                            column.clone(),
                            format!(
                                "Outlier value: {} (Normal: Mean {:.2}, Std {:.2})",
                                v, p.mean, p.std
                            ),
                        );
                        let _ = writeln!(
                            summary,
                            "   - {}: {} is far from the usual range (Mean: {:.2}, Std: {:.2}).",
                            column, v, p.mean, p.std
                        );
                    }
                }
                ColumnProfile::Categorical(p) => {
                    let key = value.category_key();
                    if p.is_deviant(&key) {
                        deviations.insert(column.clone(), format!("Unusual category: {}", key));
                        let _ = writeln!(summary, "   - {}: {} is not a common category.", column, key);
                    }
                }
            }
        }
        DeviationEntry {
            transaction_id: record.id.clone(),
            deviations,
        }
    }
}

/// Explain each distinct flagged ID of `batch`. The batch must match the trained columns, and
/// an ID absent from the batch is a data format error.
pub fn analyze(
    snapshot: &ModelSnapshot,
    batch: &TransactionBatch,
    flagged_ids: &[String],
) -> Result<DeviationReport> {
    snapshot.encoding.check_alignment(batch)?;
    let mut seen = HashSet::new();
    let flagged: Vec<&TransactionRecord> = flagged_ids
        .iter()
        .filter(|id| seen.insert(id.as_str()))
        .map(|id| batch.get(id))
        .collect::<Result<_>>()?;
    let analyzer = DeviationAnalyzer::fit(snapshot, &flagged);

    let mut summary = String::new();
    let entries: Vec<DeviationEntry> = flagged
        .iter()
        .map(|r| analyzer.diff(r, &mut summary))
        .collect();
    debug!(
        flagged = entries.len(),
        deviant_fields = entries.iter().map(|e| e.deviations.len()).sum::<usize>(),
        "deviation analysis complete"
    );
    Ok(DeviationReport { entries, summary })
}
