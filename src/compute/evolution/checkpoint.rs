//! On-disk checkpoints of a run.
//!
//! Layout: `<dir>/seed_<seed>/generation_<n>.json`, one pretty-printed
//! [`EnvironmentSnapshot`] per file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::engine::EnvironmentSnapshot;

/// Checkpoint I/O errors.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Malformed checkpoint: {0}")]
    Json(#[from] serde_json::Error),
}

fn seed_dir<P: AsRef<Path>>(dir: P, seed: u64) -> PathBuf {
    dir.as_ref().join(format!("seed_{seed}"))
}

/// Path of the checkpoint for `generation` of the run seeded with `seed`.
pub fn checkpoint_path<P: AsRef<Path>>(dir: P, seed: u64, generation: usize) -> PathBuf {
    seed_dir(dir, seed).join(format!("generation_{generation}.json"))
}

/// Write a snapshot, creating directories as needed.
pub fn save<P: AsRef<Path>>(dir: P, snapshot: &EnvironmentSnapshot) -> Result<PathBuf, CheckpointError> {
    let path = checkpoint_path(&dir, snapshot.seed, snapshot.generation);
    fs::create_dir_all(seed_dir(&dir, snapshot.seed))?;

    let json = serde_json::to_string_pretty(snapshot)?;
    fs::write(&path, json)?;
    Ok(path)
}

/// Read a snapshot. Returns `None` (with a warning) when no checkpoint exists
/// for that seed and generation.
pub fn load<P: AsRef<Path>>(
    dir: P,
    seed: u64,
    generation: usize,
) -> Result<Option<EnvironmentSnapshot>, CheckpointError> {
    let path = checkpoint_path(dir, seed, generation);
    if !path.exists() {
        log::warn!("No checkpoint at {}", path.display());
        return Ok(None);
    }

    let content = fs::read_to_string(&path)?;
    Ok(Some(serde_json::from_str(&content)?))
}

/// Highest generation with a checkpoint for `seed`, if any.
pub fn latest_generation<P: AsRef<Path>>(dir: P, seed: u64) -> Result<Option<usize>, CheckpointError> {
    let dir = seed_dir(dir, seed);
    if !dir.is_dir() {
        return Ok(None);
    }

    let mut latest = None;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|e| e == "json")
            && let Some(generation) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.strip_prefix("generation_"))
                .and_then(|s| s.parse::<usize>().ok())
        {
            latest = latest.max(Some(generation));
        }
    }
    Ok(latest)
}
