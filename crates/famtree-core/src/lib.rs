//! famtree-core — Upload gating and photo collection logic.
//!
//! Holds the pieces that do not depend on a particular backend: the
//! one-face upload gate, the upload workflow state machine, and the
//! trait seams for face detection, photo persistence and identity.

pub mod auth;
pub mod detector;
pub mod gate;
pub mod store;
pub mod types;
pub mod workflow;

#[cfg(test)]
mod testing;

pub use auth::{AuthError, Credentials, IdentityProvider, SessionGrant, SignUp, ValidationError};
pub use detector::{DetectionError, FaceDetector};
pub use gate::GateDecision;
pub use store::{BlobStore, NewUpload, PhotoRecords, PhotoStore, StoreError};
pub use types::{DetectionResult, OwnerId, Photo, Relationship, SessionContext};
pub use workflow::{UploadPhase, UploadSnapshot, UploadWorkflow, WorkflowError};
