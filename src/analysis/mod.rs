//! Root-cause analysis of flagged transactions.

mod deviation;

pub use deviation::{
    analyze, CategoricalProfile, ColumnProfile, DeviationAnalyzer, DeviationEntry,
    DeviationReport, NumericProfile, STD_THRESHOLD,
};
