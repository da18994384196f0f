//! Upload workflow controller.
//!
//! Drives one upload at a time through
//! `Idle -> Analyzing -> {Accepted, Rejected} -> Committing -> Idle`.
//! The whole in-progress upload lives in a single [`UploadState`] value, so
//! combinations like "analyzing and rejected" cannot be represented.
//!
//! The state lock is only held for transitions, never across a detector or
//! store call. Status queries and cancel stay responsive while an analysis
//! is in flight; cancel is refused until that step completes.

use crate::auth::ValidationError;
use crate::detector::FaceDetector;
use crate::gate::{self, GateDecision};
use crate::store::{NewUpload, PhotoStore, StoreError};
use crate::types::{DetectionResult, Photo, Relationship, SessionContext};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Message shown when the detector itself failed.
pub const ANALYSIS_ERROR_MESSAGE: &str = "Error analyzing image";

/// How long a rejection stays visible before the workflow returns to idle.
pub const DEFAULT_REJECTION_DISPLAY: Duration = Duration::from_secs(3);

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkflowError {
    #[error("another upload is already in progress")]
    UploadInProgress,
    #[error("upload is busy; wait for the current step to finish")]
    Busy,
    #[error("no accepted upload")]
    NotAccepted,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Error uploading photo: {0}")]
    Store(#[from] StoreError),
    #[error("upload was superseded")]
    Superseded,
}

/// Detection status of a pending upload.
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    Pending,
    Detected(DetectionResult),
}

/// An image the user selected, plus the details collected for it so far.
#[derive(Debug, Clone)]
pub struct PendingUpload {
    pub file_name: String,
    pub image: Arc<[u8]>,
    pub detection: Detection,
    pub person_name: String,
    pub relationship: Option<Relationship>,
}

impl PendingUpload {
    fn new(file_name: String, image: Arc<[u8]>) -> Self {
        Self {
            file_name,
            image,
            detection: Detection::Pending,
            person_name: String::new(),
            relationship: None,
        }
    }

    fn details(&self) -> Result<(String, Relationship), ValidationError> {
        let name = self.person_name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyPersonName);
        }
        let relationship = self.relationship.ok_or(ValidationError::MissingRelationship)?;
        Ok((name.to_string(), relationship))
    }
}

/// A gate rejection or detector failure on display.
#[derive(Debug, Clone)]
pub struct Rejection {
    pub message: String,
    /// `None` when the detector failed.
    pub face_count: Option<u32>,
    pub expires_at: Instant,
}

#[derive(Debug)]
enum UploadState {
    Idle,
    Analyzing { attempt: u64, pending: PendingUpload },
    Accepted { attempt: u64, pending: PendingUpload },
    Rejected(Rejection),
    Committing { attempt: u64, pending: PendingUpload },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadPhase {
    Idle,
    Analyzing,
    Accepted,
    Rejected,
    Committing,
}

/// Read-only view of the workflow for callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSnapshot {
    pub phase: UploadPhase,
    pub file_name: Option<String>,
    pub message: Option<String>,
    pub face_count: Option<u32>,
    pub person_name: Option<String>,
    pub relationship: Option<Relationship>,
    pub can_commit: bool,
}

impl UploadSnapshot {
    fn idle() -> Self {
        Self {
            phase: UploadPhase::Idle,
            file_name: None,
            message: None,
            face_count: None,
            person_name: None,
            relationship: None,
            can_commit: false,
        }
    }
}

impl UploadState {
    fn is_busy(&self) -> bool {
        matches!(
            self,
            UploadState::Analyzing { .. } | UploadState::Committing { .. }
        )
    }

    fn snapshot(&self) -> UploadSnapshot {
        match self {
            UploadState::Idle => UploadSnapshot::idle(),
            UploadState::Analyzing { pending, .. } => UploadSnapshot {
                phase: UploadPhase::Analyzing,
                file_name: Some(pending.file_name.clone()),
                ..UploadSnapshot::idle()
            },
            UploadState::Accepted { pending, .. } => {
                let face_count = match pending.detection {
                    Detection::Detected(result) => Some(result.face_count),
                    Detection::Pending => None,
                };
                UploadSnapshot {
                    phase: UploadPhase::Accepted,
                    file_name: Some(pending.file_name.clone()),
                    message: Some(GateDecision::Accept.message()),
                    face_count,
                    person_name: Some(pending.person_name.clone()),
                    relationship: pending.relationship,
                    can_commit: pending.details().is_ok(),
                }
            }
            UploadState::Rejected(rejection) => UploadSnapshot {
                phase: UploadPhase::Rejected,
                message: Some(rejection.message.clone()),
                face_count: rejection.face_count,
                ..UploadSnapshot::idle()
            },
            UploadState::Committing { pending, .. } => UploadSnapshot {
                phase: UploadPhase::Committing,
                file_name: Some(pending.file_name.clone()),
                person_name: Some(pending.person_name.clone()),
                relationship: pending.relationship,
                ..UploadSnapshot::idle()
            },
        }
    }
}

/// Return to idle once a displayed rejection has timed out.
fn expire(state: &mut UploadState) {
    if let UploadState::Rejected(rejection) = state {
        if Instant::now() >= rejection.expires_at {
            *state = UploadState::Idle;
        }
    }
}

/// Take the pending upload out of an in-flight state belonging to `attempt`,
/// leaving the workflow idle. Any other state is left untouched.
fn take_in_flight(state: &mut UploadState, attempt: u64) -> Option<PendingUpload> {
    let owned = matches!(
        state,
        UploadState::Analyzing { attempt: a, .. } | UploadState::Committing { attempt: a, .. }
            if *a == attempt
    );
    if !owned {
        return None;
    }
    match std::mem::replace(state, UploadState::Idle) {
        UploadState::Analyzing { pending, .. } | UploadState::Committing { pending, .. } => {
            Some(pending)
        }
        _ => None,
    }
}

/// Result of a successful commit.
#[derive(Debug, Clone)]
pub struct CommitReceipt {
    pub photo: Photo,
    /// The owner's refreshed collection, or `None` if the re-fetch failed.
    pub collection: Option<Vec<Photo>>,
}

/// Per-user upload controller.
pub struct UploadWorkflow {
    detector: Arc<dyn FaceDetector>,
    store: Arc<PhotoStore>,
    rejection_display: Duration,
    state: Mutex<UploadState>,
    attempts: AtomicU64,
}

impl UploadWorkflow {
    pub fn new(detector: Arc<dyn FaceDetector>, store: Arc<PhotoStore>) -> Self {
        Self {
            detector,
            store,
            rejection_display: DEFAULT_REJECTION_DISPLAY,
            state: Mutex::new(UploadState::Idle),
            attempts: AtomicU64::new(0),
        }
    }

    pub fn with_rejection_display(mut self, display: Duration) -> Self {
        self.rejection_display = display;
        self
    }

    fn lock(&self) -> MutexGuard<'_, UploadState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn rejection(&self, message: String, face_count: Option<u32>) -> UploadState {
        UploadState::Rejected(Rejection {
            message,
            face_count,
            expires_at: Instant::now() + self.rejection_display,
        })
    }

    pub fn snapshot(&self) -> UploadSnapshot {
        let mut state = self.lock();
        expire(&mut state);
        state.snapshot()
    }

    /// Whether an analysis or commit is in flight.
    pub fn is_busy(&self) -> bool {
        self.lock().is_busy()
    }

    /// File name and bytes of the accepted image.
    pub fn preview(&self) -> Option<(String, Arc<[u8]>)> {
        match &*self.lock() {
            UploadState::Accepted { pending, .. } => {
                Some((pending.file_name.clone(), pending.image.clone()))
            }
            _ => None,
        }
    }

    /// Start an upload: hold the image and run it through the detector and
    /// the gate. Allowed from idle, or while a rejection is on display.
    pub async fn select_file(
        &self,
        session: &SessionContext,
        file_name: impl Into<String>,
        image: Vec<u8>,
    ) -> Result<UploadSnapshot, WorkflowError> {
        let file_name = file_name.into();
        let image: Arc<[u8]> = Arc::from(image);
        let attempt = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;

        {
            let mut state = self.lock();
            expire(&mut state);
            if state.is_busy() {
                return Err(WorkflowError::Busy);
            }
            if !matches!(*state, UploadState::Idle | UploadState::Rejected(_)) {
                return Err(WorkflowError::UploadInProgress);
            }
            *state = UploadState::Analyzing {
                attempt,
                pending: PendingUpload::new(file_name.clone(), image.clone()),
            };
        }

        tracing::info!(
            user = %session.user_id,
            attempt,
            file = %file_name,
            bytes = image.len(),
            "analyzing upload"
        );

        let in_flight = InFlight::new(self, attempt, Step::Analyzing);
        let outcome = self.detector.detect_faces(&image).await;
        in_flight.finish();

        let mut state = self.lock();
        let Some(mut pending) = take_in_flight(&mut state, attempt) else {
            tracing::debug!(attempt, "ignoring detection result for superseded upload");
            return Err(WorkflowError::Superseded);
        };

        *state = match outcome {
            Ok(result) => {
                let decision = gate::evaluate(&result);
                tracing::info!(
                    user = %session.user_id,
                    attempt,
                    faces = result.face_count,
                    accepted = decision.is_accepted(),
                    "upload analyzed"
                );
                if decision.is_accepted() {
                    pending.detection = Detection::Detected(result);
                    UploadState::Accepted { attempt, pending }
                } else {
                    self.rejection(decision.message(), Some(result.face_count))
                }
            }
            Err(err) => {
                tracing::warn!(user = %session.user_id, attempt, error = %err, "face detection failed");
                self.rejection(ANALYSIS_ERROR_MESSAGE.to_string(), None)
            }
        };

        Ok(state.snapshot())
    }

    /// Fill in the person's name and/or relationship of the accepted upload.
    pub fn update_details(
        &self,
        person_name: Option<String>,
        relationship: Option<Relationship>,
    ) -> Result<UploadSnapshot, WorkflowError> {
        let mut state = self.lock();
        expire(&mut state);
        match &mut *state {
            UploadState::Accepted { pending, .. } => {
                if let Some(name) = person_name {
                    pending.person_name = name;
                }
                if let Some(rel) = relationship {
                    pending.relationship = Some(rel);
                }
            }
            other if other.is_busy() => return Err(WorkflowError::Busy),
            _ => return Err(WorkflowError::NotAccepted),
        }
        Ok(state.snapshot())
    }

    /// Persist the accepted upload and re-fetch the owner's collection.
    ///
    /// On a store failure the workflow goes back to accepted with the pending
    /// data intact, so the commit can be retried.
    pub async fn commit(&self, session: &SessionContext) -> Result<CommitReceipt, WorkflowError> {
        let (attempt, upload) = {
            let mut state = self.lock();
            expire(&mut state);
            let (attempt, pending) = match std::mem::replace(&mut *state, UploadState::Idle) {
                UploadState::Accepted { attempt, pending } => (attempt, pending),
                other => {
                    let err = if other.is_busy() {
                        WorkflowError::Busy
                    } else {
                        WorkflowError::NotAccepted
                    };
                    *state = other;
                    return Err(err);
                }
            };
            let (person_name, relationship) = match pending.details() {
                Ok(details) => details,
                Err(err) => {
                    *state = UploadState::Accepted { attempt, pending };
                    return Err(err.into());
                }
            };
            let upload = NewUpload {
                file_name: pending.file_name.clone(),
                image: pending.image.clone(),
                person_name,
                relationship,
            };
            *state = UploadState::Committing { attempt, pending };
            (attempt, upload)
        };

        tracing::info!(user = %session.user_id, attempt, "committing upload");

        let in_flight = InFlight::new(self, attempt, Step::Committing);
        let saved = self.store.save(session.user_id, &upload).await;
        in_flight.finish();

        let photo = {
            let mut state = self.lock();
            let pending = take_in_flight(&mut state, attempt);
            match saved {
                Ok(photo) => photo,
                Err(err) => {
                    tracing::error!(user = %session.user_id, attempt, error = %err, "commit failed");
                    if let Some(pending) = pending {
                        *state = UploadState::Accepted { attempt, pending };
                    }
                    return Err(err.into());
                }
            }
        };

        let collection = match self.store.list(session.user_id).await {
            Ok(photos) => Some(photos),
            Err(err) => {
                tracing::warn!(user = %session.user_id, error = %err, "refreshing collection after commit failed");
                None
            }
        };

        Ok(CommitReceipt { photo, collection })
    }

    /// Discard the pending upload or dismiss a rejection.
    pub fn cancel(&self) -> Result<UploadSnapshot, WorkflowError> {
        let mut state = self.lock();
        if state.is_busy() {
            return Err(WorkflowError::Busy);
        }
        if !matches!(*state, UploadState::Idle) {
            tracing::debug!("upload cancelled");
        }
        *state = UploadState::Idle;
        Ok(state.snapshot())
    }
}

#[derive(Clone, Copy)]
enum Step {
    Analyzing,
    Committing,
}

/// Restores a sane state if the future driving a step is dropped before the
/// step completes: an abandoned analysis returns to idle, an abandoned commit
/// to accepted.
struct InFlight<'a> {
    workflow: &'a UploadWorkflow,
    attempt: u64,
    step: Step,
    armed: bool,
}

impl<'a> InFlight<'a> {
    fn new(workflow: &'a UploadWorkflow, attempt: u64, step: Step) -> Self {
        Self {
            workflow,
            attempt,
            step,
            armed: true,
        }
    }

    fn finish(mut self) {
        self.armed = false;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.workflow.lock();
        if let Some(pending) = take_in_flight(&mut state, self.attempt) {
            tracing::warn!(attempt = self.attempt, "upload step abandoned");
            if let Step::Committing = self.step {
                *state = UploadState::Accepted {
                    attempt: self.attempt,
                    pending,
                };
            }
        }
    }
}
