//! JSON snapshots of system and registry state.
//!
//! Snapshots let a run plan against recorded state instead of the live
//! systems. Writes go to a temp file that is synced and renamed into place.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Errors from snapshot files.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("{path}: I/O error: {message}")]
    Io { path: String, message: String },

    #[error("{path}: parse error: {message}")]
    Parse { path: String, message: String },

    #[error("serialization error: {0}")]
    Serialize(String),
}

impl SnapshotError {
    fn io(path: &Path, err: impl std::fmt::Display) -> Self {
        Self::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}

/// Read a JSON snapshot.
pub fn read_snapshot<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, SnapshotError> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| SnapshotError::io(path, e))?;
    serde_json::from_slice(&bytes).map_err(|e| SnapshotError::Parse {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Write a pretty-printed JSON snapshot atomically.
pub fn write_snapshot<T: Serialize>(path: impl AsRef<Path>, value: &T) -> Result<(), SnapshotError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| SnapshotError::io(parent, e))?;
    }

    let tmp_path = tmp_write_path(path);
    let write_result = (|| -> Result<(), SnapshotError> {
        let file = File::create(&tmp_path).map_err(|e| SnapshotError::io(&tmp_path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, value)
            .map_err(|e| SnapshotError::Serialize(e.to_string()))?;
        writeln!(writer).map_err(|e| SnapshotError::io(&tmp_path, e))?;
        let file = writer
            .into_inner()
            .map_err(|e| SnapshotError::io(&tmp_path, e))?;
        file.sync_all().map_err(|e| SnapshotError::io(&tmp_path, e))?;
        Ok(())
    })();

    if let Err(error) = write_result {
        let _ = fs::remove_file(&tmp_path);
        return Err(error);
    }

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        SnapshotError::io(path, e)
    })?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        let dir = File::open(parent).map_err(|e| SnapshotError::io(parent, e))?;
        dir.sync_all().map_err(|e| SnapshotError::io(parent, e))?;
    }
    Ok(())
}

fn tmp_write_path(path: &Path) -> PathBuf {
    let unique = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let mut tmp: OsString = path.as_os_str().to_os_string();
    tmp.push(format!(".tmp.{}.{}", std::process::id(), unique));
    PathBuf::from(tmp)
}
