//! Session-scoped persisted result store
//!
//! `computeNsave` stages persist their output here keyed by
//! (stage category, stage name); later runs fetch it back with `load`
//! without re-executing the stage. A session is purely in-memory unless
//! given a backing directory, in which case every saved result is also
//! written as one JSON blob per key and survives the process.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::options::{StageOutput, TaskCategory};

/// A persisted stage result with its provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedResult {
    pub category: TaskCategory,
    pub stage_name: String,
    pub output: StageOutput,
    pub saved_at: DateTime<Utc>,
}

/// Named scope for persisted compute-and-save results
#[derive(Debug)]
pub struct Session {
    name: String,
    dir: Option<PathBuf>,
    store: RwLock<HashMap<String, SavedResult>>,
}

fn key(category: TaskCategory, stage_name: &str) -> String {
    format!("{}__{}", category, stage_name)
}

impl Session {
    /// In-memory session
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dir: None,
            store: RwLock::new(HashMap::new()),
        }
    }

    /// Disk-backed session under `base_dir/<name>`
    pub fn with_dir(name: impl Into<String>, base_dir: impl Into<PathBuf>) -> Result<Self> {
        let name = name.into();
        let dir = base_dir.into().join(&name);
        fs::create_dir_all(&dir)?;
        Ok(Self {
            name,
            dir: Some(dir),
            store: RwLock::new(HashMap::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> Option<&PathBuf> {
        self.dir.as_ref()
    }

    fn blob_path(&self, key: &str) -> Option<PathBuf> {
        self.dir.as_ref().map(|d| d.join(format!("{}.json", key)))
    }

    /// Persist a stage result under (category, stage name)
    pub fn save(
        &self,
        category: TaskCategory,
        stage_name: &str,
        output: StageOutput,
    ) -> Result<()> {
        let saved = SavedResult {
            category,
            stage_name: stage_name.to_string(),
            output,
            saved_at: Utc::now(),
        };
        let key = key(category, stage_name);

        if let Some(path) = self.blob_path(&key) {
            let json = serde_json::to_string(&saved)?;
            fs::write(path, json)?;
        }
        self.store.write().insert(key, saved);
        Ok(())
    }

    /// Fetch a previously saved result, failing with `NoSavedResult` if the
    /// session holds nothing for this stage
    pub fn load(&self, category: TaskCategory, stage_name: &str) -> Result<SavedResult> {
        let key = key(category, stage_name);
        if let Some(saved) = self.store.read().get(&key) {
            return Ok(saved.clone());
        }

        // Memory miss: a disk-backed session may hold a blob from an
        // earlier process lifetime
        if let Some(path) = self.blob_path(&key) {
            if path.exists() {
                let json = fs::read_to_string(&path)?;
                let saved: SavedResult = serde_json::from_str(&json)?;
                self.store.write().insert(key, saved.clone());
                return Ok(saved);
            }
        }

        Err(PipelineError::NoSavedResult {
            stage: format!("{}:{}", category, stage_name),
        })
    }

    pub fn contains(&self, category: TaskCategory, stage_name: &str) -> bool {
        let key = key(category, stage_name);
        if self.store.read().contains_key(&key) {
            return true;
        }
        self.blob_path(&key).is_some_and(|p| p.exists())
    }

    /// Whether the session already holds any saved result (memory or disk)
    pub fn has_saved_results(&self) -> bool {
        if !self.store.read().is_empty() {
            return true;
        }
        match &self.dir {
            Some(dir) => fs::read_dir(dir)
                .map(|entries| {
                    entries.flatten().any(|e| {
                        e.path().extension().is_some_and(|ext| ext == "json")
                    })
                })
                .unwrap_or(false),
            None => false,
        }
    }

    /// Drop every saved result, including disk blobs
    pub fn clear(&self) -> Result<()> {
        self.store.write().clear();
        if let Some(dir) = &self.dir {
            for entry in fs::read_dir(dir)?.flatten() {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "json") {
                    fs::remove_file(path)?;
                }
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.store.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.read().is_empty()
    }
}
