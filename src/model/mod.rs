//! Outlier model and the snapshot bundle it is persisted in.

mod isolation_forest;
mod snapshot;

pub use isolation_forest::{ForestParams, IsolationForest, Label};
pub use snapshot::{ModelSnapshot, TrainingMetadata};
