use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::storage::{hex_lower, sha256_digest, write_text_atomic};

pub const UNDO_STACK_LIMIT: usize = 20;

#[derive(Debug, Error)]
pub enum UndoError {
    #[error("failed to serialize level snapshot: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("failed to restore level snapshot: {0}")]
    Deserialize(#[source] serde_json::Error),
    #[error("failed to write autosave {path}: {source}")]
    Autosave {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Checkpoint {
    digest: [u8; 32],
    json: String,
}

/// Bounded history of authored-level snapshots, deduplicated by content hash.
#[derive(Debug, Default)]
pub struct UndoStack {
    checkpoints: VecDeque<Checkpoint>,
    autosave_path: Option<PathBuf>,
}

impl UndoStack {
    pub fn with_autosave(path: impl Into<PathBuf>) -> Self {
        Self {
            checkpoints: VecDeque::new(),
            autosave_path: Some(path.into()),
        }
    }

    pub fn autosave_path(&self) -> Option<&Path> {
        self.autosave_path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }

    pub fn latest_digest_hex(&self) -> Option<String> {
        self.checkpoints.back().map(|checkpoint| hex_lower(&checkpoint.digest))
    }

    /// True when `level` differs from the newest checkpoint, or nothing is stored yet.
    pub fn is_dirty<L: Serialize>(&self, level: &L) -> Result<bool, UndoError> {
        let (digest, _) = snapshot(level)?;
        Ok(self
            .checkpoints
            .back()
            .map_or(true, |checkpoint| checkpoint.digest != digest))
    }

    /// Pushes a checkpoint of `level` and autosaves it. Returns false when it matches
    /// the newest checkpoint.
    pub fn store<L: Serialize>(&mut self, level: &L) -> Result<bool, UndoError> {
        let (digest, json) = snapshot(level)?;
        if self
            .checkpoints
            .back()
            .is_some_and(|checkpoint| checkpoint.digest == digest)
        {
            debug!("undo_checkpoint_unchanged");
            return Ok(false);
        }

        if let Some(path) = &self.autosave_path {
            write_text_atomic(path, &json).map_err(|source| UndoError::Autosave {
                path: path.clone(),
                source,
            })?;
        }
        self.checkpoints.push_back(Checkpoint { digest, json });
        while self.checkpoints.len() > UNDO_STACK_LIMIT {
            self.checkpoints.pop_front();
        }
        info!(
            depth = self.checkpoints.len(),
            digest = %hex_lower(&digest),
            "undo_checkpoint_stored"
        );
        Ok(true)
    }

    /// Drops the newest checkpoint and returns the one below it.
    pub fn undo<L: DeserializeOwned>(&mut self) -> Result<Option<L>, UndoError> {
        if self.checkpoints.len() < 2 {
            return Ok(None);
        }
        self.checkpoints.pop_back();
        match self.checkpoints.back() {
            Some(checkpoint) => serde_json::from_str(&checkpoint.json)
                .map(Some)
                .map_err(UndoError::Deserialize),
            None => Ok(None),
        }
    }

    pub fn clear(&mut self) {
        self.checkpoints.clear();
    }
}

fn snapshot<L: Serialize>(level: &L) -> Result<([u8; 32], String), UndoError> {
    let json = serde_json::to_string_pretty(level).map_err(UndoError::Serialize)?;
    Ok((sha256_digest(json.as_bytes()), json))
}
