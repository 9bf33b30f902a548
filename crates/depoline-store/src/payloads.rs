//! Payload envelopes on disk (`state/<env>/payloads/<id>.json`)
//!
//! A staged store keeps envelopes in memory instead, so a dry run can hash
//! and re-read what it would have written without touching the disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, ensure};
use depoline_core::{Payload, PayloadRef};

use crate::{atomic, hash};

pub struct PayloadStore {
    dir: PathBuf,
    staged: Option<Mutex<HashMap<PathBuf, Vec<u8>>>>,
}

impl PayloadStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            staged: None,
        }
    }

    /// In-memory store. Writes are kept here, reads fall back to disk.
    pub fn staged(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            staged: Some(Mutex::new(HashMap::new())),
        }
    }

    pub fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Write the envelope atomically and return a reference carrying its hash.
    pub fn write(&self, id: &str, payload: &Payload) -> Result<PayloadRef> {
        let bytes = serde_json::to_vec_pretty(payload)
            .with_context(|| format!("failed to serialize payload {id}"))?;
        let path = self.path_for(id);
        let content_hash = hash::hash_bytes(&bytes).to_hex().to_string();
        match &self.staged {
            Some(staged) => {
                staged.lock().unwrap().insert(path.clone(), bytes);
            }
            None => atomic::write_atomic(&path, &bytes)?,
        }
        Ok(PayloadRef {
            path,
            content_hash,
            schema_version: payload.schema_version,
        })
    }

    fn staged_bytes(&self, path: &Path) -> Option<Vec<u8>> {
        self.staged.as_ref()?.lock().unwrap().get(path).cloned()
    }

    /// Read an envelope, refusing files whose hash no longer matches.
    pub fn read(&self, payload_ref: &PayloadRef) -> Result<Payload> {
        let bytes = match self.staged_bytes(&payload_ref.path) {
            Some(bytes) => bytes,
            None => std::fs::read(&payload_ref.path)
                .with_context(|| format!("failed to read {}", payload_ref.path.display()))?,
        };
        let actual = hash::hash_bytes(&bytes).to_hex();
        ensure!(
            actual.as_str() == payload_ref.content_hash,
            "payload {} changed on disk (hash {} != {})",
            payload_ref.path.display(),
            hash::short_hash(actual.as_str()),
            hash::short_hash(&payload_ref.content_hash)
        );
        serde_json::from_slice(&bytes)
            .with_context(|| format!("corrupt payload {}", payload_ref.path.display()))
    }

    /// File present and hash-consistent.
    pub fn verify(&self, payload_ref: &PayloadRef) -> Result<bool> {
        if let Some(bytes) = self.staged_bytes(&payload_ref.path) {
            return Ok(hash::hash_bytes(&bytes).to_hex().as_str() == payload_ref.content_hash);
        }
        hash::file_matches(&payload_ref.path, &payload_ref.content_hash)
            .with_context(|| format!("failed to hash {}", payload_ref.path.display()))
    }
}
