use famtree_core::types::OwnerId;
use famtree_core::{FaceDetector, IdentityProvider, PhotoStore, UploadWorkflow};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Shared handles for request handlers.
#[derive(Clone)]
pub struct AppState {
    pub identity: Arc<dyn IdentityProvider>,
    pub detector: Arc<dyn FaceDetector>,
    pub store: Arc<PhotoStore>,
    pub uploads: Arc<UploadRegistry>,
    pub media_dir: PathBuf,
    pub cookie_secure: bool,
}

struct Entry {
    workflow: Arc<UploadWorkflow>,
    last_used: Instant,
}

/// One upload workflow per signed-in user, created on first use and dropped
/// by [`UploadRegistry::sweep`] once left untouched.
pub struct UploadRegistry {
    detector: Arc<dyn FaceDetector>,
    store: Arc<PhotoStore>,
    rejection_display: Duration,
    workflows: Mutex<HashMap<OwnerId, Entry>>,
}

impl UploadRegistry {
    pub fn new(
        detector: Arc<dyn FaceDetector>,
        store: Arc<PhotoStore>,
        rejection_display: Duration,
    ) -> Self {
        Self {
            detector,
            store,
            rejection_display,
            workflows: Mutex::new(HashMap::new()),
        }
    }

    pub fn workflow(&self, owner: OwnerId) -> Arc<UploadWorkflow> {
        let mut workflows = self.workflows.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = workflows.entry(owner).or_insert_with(|| {
            tracing::debug!(user = %owner, "upload workflow created");
            Entry {
                workflow: Arc::new(
                    UploadWorkflow::new(self.detector.clone(), self.store.clone())
                        .with_rejection_display(self.rejection_display),
                ),
                last_used: Instant::now(),
            }
        });
        entry.last_used = Instant::now();
        entry.workflow.clone()
    }

    /// Drop workflows nobody has touched for `idle`, along with any image
    /// they still hold. Workflows with a step in flight are kept.
    pub fn sweep(&self, idle: Duration) -> usize {
        let mut workflows = self.workflows.lock().unwrap_or_else(PoisonError::into_inner);
        let before = workflows.len();
        workflows.retain(|_, entry| entry.last_used.elapsed() < idle || entry.workflow.is_busy());
        let dropped = before - workflows.len();
        if dropped > 0 {
            tracing::info!(dropped, "idle upload workflows dropped");
        }
        dropped
    }

    /// Drop the user's workflow. A step still in flight finishes on its own
    /// and its result is discarded.
    pub fn remove(&self, owner: OwnerId) {
        let removed = self
            .workflows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&owner);
        if removed.is_some() {
            tracing::debug!(user = %owner, "upload workflow dropped");
        }
    }
}
