//! Persistence: the model snapshot artifact and atomic file replacement.

mod atomic;
mod snapshot_store;

pub use atomic::{replace_bytes, replace_file};
pub use snapshot_store::ModelStore;
