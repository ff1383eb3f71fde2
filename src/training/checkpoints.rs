//! Checkpoint layout and persistence
//!
//! ```text
//! <checkpoint>/model.ckpt-<epoch>.safetensors   one per epoch, never pruned
//! <checkpoint>-best/model.ckpt.safetensors      single best snapshot
//! <checkpoint>-best/best_model.json             metrics of that snapshot
//! ```

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use candle_nn::VarMap;
use tracing::{debug, info};

use crate::error::Error;
use crate::training::evaluation::BestModelRecord;
use crate::utils::io::{ensure_dir_exists, replace_file};

const EPOCH_PREFIX: &str = "model.ckpt-";
const EXTENSION: &str = "safetensors";
const BEST_FILE: &str = "model.ckpt.safetensors";
const BEST_STAGING_FILE: &str = "model.ckpt.staging.safetensors";
const BEST_RECORD_FILE: &str = "best_model.json";
const BEST_RECORD_STAGING_FILE: &str = "best_model.staging.json";

/// Owns the epoch and best-model checkpoint directories
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    dir: PathBuf,
    best_dir: PathBuf,
}

impl CheckpointManager {
    /// Create the checkpoint directory and its `-best` sibling
    pub fn new(checkpoint: impl AsRef<Path>) -> Result<Self> {
        let dir = checkpoint.as_ref().to_path_buf();
        let best_dir = Self::best_dir_for(&dir);

        ensure_dir_exists(&dir)
            .with_context(|| format!("Failed to create checkpoint directory {}", dir.display()))?;
        ensure_dir_exists(&best_dir)
            .with_context(|| format!("Failed to create best checkpoint directory {}", best_dir.display()))?;

        Ok(Self { dir, best_dir })
    }

    /// `<checkpoint>-best`, ignoring trailing separators on `checkpoint`
    pub fn best_dir_for(checkpoint: &Path) -> PathBuf {
        let normalized: PathBuf = checkpoint.components().collect();
        let mut name = OsString::from(normalized.as_os_str());
        name.push("-best");
        PathBuf::from(name)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn best_dir(&self) -> &Path {
        &self.best_dir
    }

    pub fn epoch_path(&self, epoch: usize) -> PathBuf {
        self.dir.join(format!("{}{}.{}", EPOCH_PREFIX, epoch, EXTENSION))
    }

    pub fn best_path(&self) -> PathBuf {
        self.best_dir.join(BEST_FILE)
    }

    pub fn record_path(&self) -> PathBuf {
        self.best_dir.join(BEST_RECORD_FILE)
    }

    /// Save every parameter for `epoch`
    pub fn save_epoch(&self, var_map: &VarMap, epoch: usize) -> Result<PathBuf> {
        let path = self.epoch_path(epoch);
        var_map
            .save(&path)
            .map_err(|err| Error::checkpoint(format!("failed to save {}: {}", path.display(), err)))?;
        info!("Save model checkpoint to {}", path.display());
        Ok(path)
    }

    /// Replace the best snapshot and its record
    ///
    /// Both files are staged before either is moved into place, so a failed
    /// write leaves the previous snapshot and record untouched.
    pub fn save_best(&self, var_map: &VarMap, record: &BestModelRecord) -> Result<PathBuf> {
        let staged = self.best_dir.join(BEST_STAGING_FILE);
        let staged_record = self.best_dir.join(BEST_RECORD_STAGING_FILE);
        let path = self.best_path();

        var_map
            .save(&staged)
            .map_err(|err| Error::checkpoint(format!("failed to save {}: {}", staged.display(), err)))?;

        let json = serde_json::to_vec_pretty(record)?;
        if let Err(err) = fs::write(&staged_record, &json) {
            let _ = fs::remove_file(&staged);
            return Err(Error::checkpoint(format!(
                "failed to write {}: {}",
                staged_record.display(),
                err
            ))
            .into());
        }

        replace_file(&staged, &path)
            .with_context(|| format!("Failed to move best checkpoint into {}", path.display()))?;
        replace_file(&staged_record, self.record_path()).context("Failed to move best model record into place")?;

        debug!("Best checkpoint replaced at {}", path.display());
        Ok(path)
    }

    /// Record of the retained best snapshot, if one exists
    pub fn load_best_record(&self) -> Result<Option<BestModelRecord>> {
        let path = self.record_path();
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let record = serde_json::from_str(&content)?;
        Ok(Some(record))
    }

    /// Highest-epoch checkpoint in `dir`
    pub fn latest_checkpoint(dir: &Path) -> Result<Option<(usize, PathBuf)>> {
        let mut latest: Option<(usize, PathBuf)> = None;
        for entry in fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))? {
            let path = entry?.path();
            let Some(epoch) = parse_epoch(&path) else {
                continue;
            };
            if latest.as_ref().map_or(true, |(best, _)| epoch > *best) {
                latest = Some((epoch, path));
            }
        }
        Ok(latest)
    }

    /// Checkpoint file named by `init_from`: the file itself, or the latest
    /// epoch checkpoint when it is a directory
    pub fn resolve(init_from: &Path) -> Result<PathBuf> {
        if init_from.is_file() {
            return Ok(init_from.to_path_buf());
        }
        if init_from.is_dir() {
            return match Self::latest_checkpoint(init_from)? {
                Some((_, path)) => Ok(path),
                None => Err(Error::checkpoint(format!(
                    "no epoch checkpoint found in {}",
                    init_from.display()
                ))
                .into()),
            };
        }
        Err(Error::checkpoint(format!("{} does not exist", init_from.display())).into())
    }

    /// Overwrite the parameters in `var_map` with the values stored at `path`
    pub fn restore(var_map: &VarMap, path: &Path) -> Result<()> {
        let mut shared = var_map.clone();
        shared
            .load(path)
            .map_err(|err| Error::checkpoint(format!("failed to restore {}: {}", path.display(), err)))?;
        info!("Restored parameters from {}", path.display());
        Ok(())
    }
}

fn parse_epoch(path: &Path) -> Option<usize> {
    if path.extension()? != EXTENSION {
        return None;
    }
    path.file_stem()?
        .to_str()?
        .strip_prefix(EPOCH_PREFIX)?
        .parse()
        .ok()
}
