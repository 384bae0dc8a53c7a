//! Whole-file replacement: write a sibling temp file, fsync, rename over the target.

use crate::error::{Result, SentinelError};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Replace `path` with whatever `write` produces. Readers see the old file or the new one.
pub fn replace_file<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut File) -> Result<()>,
{
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    write(tmp.as_file_mut())?;
    tmp.as_file_mut().flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .map_err(|e| SentinelError::Persistence(format!("{}: {}", path.display(), e.error)))?;
    Ok(())
}

pub fn replace_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    replace_file(path, |f| {
        f.write_all(bytes)?;
        Ok(())
    })
}
