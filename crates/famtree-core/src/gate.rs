//! One-face upload gate.
//!
//! Only photos showing exactly one person are admitted to the collection.

use crate::types::DetectionResult;

/// Outcome of running a detection result through the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Accept,
    RejectNoFace,
    RejectMultipleFaces(u32),
}

impl GateDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, GateDecision::Accept)
    }

    /// User-facing message for the decision.
    pub fn message(&self) -> String {
        match self {
            GateDecision::Accept => "Single person detected".to_string(),
            GateDecision::RejectNoFace => "No face detected in image".to_string(),
            GateDecision::RejectMultipleFaces(count) => {
                format!("Multiple people detected ({count} faces)")
            }
        }
    }
}

/// Decide whether an image with the given detection result may be stored.
pub fn evaluate(result: &DetectionResult) -> GateDecision {
    match result.face_count {
        0 => GateDecision::RejectNoFace,
        1 => GateDecision::Accept,
        n => GateDecision::RejectMultipleFaces(n),
    }
}
