//! Transaction records and batches keyed by transaction ID.

mod csv_source;

use crate::error::{Result, SentinelError};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Placeholder substituted for missing values before encoding or profiling.
pub const MISSING_PLACEHOLDER: &str = "Unknown";

static MISSING: FieldValue = FieldValue::Missing;

/// A single raw cell. Numbers keep their source text for output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Number { value: f64, raw: String },
    Text(String),
    Missing,
}

impl FieldValue {
    /// Parse a raw cell: blank is missing, anything `f64` accepts is a number.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return FieldValue::Missing;
        }
        match trimmed.parse::<f64>() {
            Ok(value) if value.is_finite() => FieldValue::Number {
                value,
                raw: trimmed.to_string(),
            },
            _ => FieldValue::Text(raw.to_string()),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number { value, .. } => Some(*value),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, FieldValue::Missing)
    }

    /// Category label with the missing placeholder applied.
    pub fn category_key(&self) -> Cow<'_, str> {
        match self {
            FieldValue::Text(s) => Cow::Borrowed(s.as_str()),
            FieldValue::Number { raw, .. } => Cow::Borrowed(raw.as_str()),
            FieldValue::Missing => Cow::Borrowed(MISSING_PLACEHOLDER),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number { raw, .. } => write!(f, "{}", raw),
            FieldValue::Text(s) => write!(f, "{}", s),
            FieldValue::Missing => Ok(()),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number {
            value,
            raw: value.to_string(),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

/// One transaction: identifier plus named raw fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: String,
    pub fields: BTreeMap<String, FieldValue>,
}

impl TransactionRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, column: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(column.into(), value.into());
        self
    }

    /// Absent fields read as missing.
    pub fn get(&self, column: &str) -> &FieldValue {
        self.fields.get(column).unwrap_or(&MISSING)
    }
}

/// Ordered batch of records with an explicit ID index.
#[derive(Debug, Clone)]
pub struct TransactionBatch {
    id_column: String,
    columns: Vec<String>,
    records: Vec<TransactionRecord>,
    index: HashMap<String, usize>,
}

impl TransactionBatch {
    /// Build a batch from a header and string rows. The header must contain `id_column`.
    pub fn from_rows(id_column: &str, header: &[String], rows: Vec<Vec<String>>) -> Result<Self> {
        let id_pos = header
            .iter()
            .position(|h| h == id_column)
            .ok_or_else(|| {
                SentinelError::DataFormat(format!("missing identifier column '{}'", id_column))
            })?;
        let columns: Vec<String> = header
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != id_pos)
            .map(|(_, h)| h.clone())
            .collect();

        let mut records = Vec::with_capacity(rows.len());
        for (line, row) in rows.into_iter().enumerate() {
            if row.len() != header.len() {
                return Err(SentinelError::DataFormat(format!(
                    "row {} has {} fields, expected {}",
                    line + 1,
                    row.len(),
                    header.len()
                )));
            }
            let id = row[id_pos].trim().to_string();
            if id.is_empty() {
                return Err(SentinelError::DataFormat(format!(
                    "row {} has an empty '{}'",
                    line + 1,
                    id_column
                )));
            }
            let mut record = TransactionRecord::new(id);
            for (i, raw) in row.iter().enumerate() {
                if i == id_pos {
                    continue;
                }
                record
                    .fields
                    .insert(header[i].clone(), FieldValue::parse(raw));
            }
            records.push(record);
        }
        Self::from_records(id_column, columns, records)
    }

    /// Build a batch from already-typed records. Fails on duplicate IDs.
    pub fn from_records(
        id_column: &str,
        columns: Vec<String>,
        records: Vec<TransactionRecord>,
    ) -> Result<Self> {
        if columns.iter().any(|c| c == id_column) {
            return Err(SentinelError::DataFormat(format!(
                "identifier column '{}' listed as a feature column",
                id_column
            )));
        }
        let mut index = HashMap::with_capacity(records.len());
        for (i, r) in records.iter().enumerate() {
            if index.insert(r.id.clone(), i).is_some() {
                return Err(SentinelError::DataFormat(format!(
                    "duplicate transaction id '{}'",
                    r.id
                )));
            }
        }
        Ok(Self {
            id_column: id_column.to_string(),
            columns,
            records,
            index,
        })
    }

    pub fn id_column(&self) -> &str {
        &self.id_column
    }

    /// Feature columns in source order (identifier excluded).
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn records(&self) -> &[TransactionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Record by ID; an absent ID is a data format error.
    pub fn get(&self, id: &str) -> Result<&TransactionRecord> {
        self.index
            .get(id)
            .map(|&i| &self.records[i])
            .ok_or_else(|| SentinelError::DataFormat(format!("unknown transaction id '{}'", id)))
    }
}
