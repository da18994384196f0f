//! In-memory backends for unit tests.

use crate::detector::{DetectionError, FaceDetector};
use crate::store::{BackendError, BlobStore, NewPhotoRecord, PhotoRecord, PhotoRecords};
use crate::types::{DetectionResult, OwnerId};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryBlobs {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    put_error: Mutex<Option<String>>,
    remove_error: Mutex<Option<String>>,
    put_gate: Mutex<Option<Arc<Notify>>>,
}

impl MemoryBlobs {
    /// Block each `put` until `gate` is notified.
    pub fn hold_puts(&self, gate: Arc<Notify>) {
        *self.put_gate.lock().unwrap() = Some(gate);
    }

    pub fn fail_puts(&self, message: &str) {
        *self.put_error.lock().unwrap() = Some(message.into());
    }

    pub fn fail_removes(&self, message: &str) {
        *self.remove_error.lock().unwrap() = Some(message.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.blobs.lock().unwrap().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap().len()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobs {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), BackendError> {
        let gate = self.put_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if let Some(msg) = self.put_error.lock().unwrap().clone() {
            return Err(BackendError(msg));
        }
        self.blobs.lock().unwrap().insert(key.into(), bytes.to_vec());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), BackendError> {
        if let Some(msg) = self.remove_error.lock().unwrap().clone() {
            return Err(BackendError(msg));
        }
        self.blobs.lock().unwrap().remove(key);
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("memory://{key}")
    }
}

#[derive(Default)]
pub struct MemoryRecords {
    rows: Mutex<Vec<PhotoRecord>>,
    insert_error: Mutex<Option<String>>,
}

impl MemoryRecords {
    pub fn fail_inserts(&self, message: &str) {
        *self.insert_error.lock().unwrap() = Some(message.into());
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl PhotoRecords for MemoryRecords {
    async fn insert(&self, record: NewPhotoRecord) -> Result<PhotoRecord, BackendError> {
        if let Some(msg) = self.insert_error.lock().unwrap().clone() {
            return Err(BackendError(msg));
        }
        let row = PhotoRecord {
            id: Uuid::new_v4(),
            owner_id: record.owner_id,
            person_name: record.person_name,
            relationship: record.relationship,
            storage_path: record.storage_path,
            created_at: Utc::now(),
        };
        self.rows.lock().unwrap().push(row.clone());
        Ok(row)
    }

    async fn list(&self, owner: OwnerId) -> Result<Vec<PhotoRecord>, BackendError> {
        // Insertion order is creation order.
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|r| r.owner_id == owner)
            .cloned()
            .collect())
    }

    async fn find(&self, owner: OwnerId, id: Uuid) -> Result<Option<PhotoRecord>, BackendError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.owner_id == owner && r.id == id)
            .cloned())
    }

    async fn delete(&self, owner: OwnerId, id: Uuid) -> Result<bool, BackendError> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|r| !(r.owner_id == owner && r.id == id));
        Ok(rows.len() != before)
    }
}

/// Detector returning a fixed outcome, optionally held until released.
pub struct ScriptedDetector {
    outcome: Result<DetectionResult, DetectionError>,
    calls: AtomicUsize,
    gate: Option<Arc<Notify>>,
}

impl ScriptedDetector {
    pub fn faces(count: u32) -> Self {
        Self {
            outcome: Ok(DetectionResult::new(count)),
            calls: AtomicUsize::new(0),
            gate: None,
        }
    }

    pub fn failing(error: DetectionError) -> Self {
        Self {
            outcome: Err(error),
            calls: AtomicUsize::new(0),
            gate: None,
        }
    }

    /// Block each call until `gate` is notified.
    pub fn held(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FaceDetector for ScriptedDetector {
    async fn detect_faces(&self, _image: &[u8]) -> Result<DetectionResult, DetectionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.outcome.clone()
    }
}
