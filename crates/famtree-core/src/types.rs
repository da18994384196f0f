use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of the account that owns a photo.
pub type OwnerId = Uuid;

/// Relationship of the pictured person to the account owner.
///
/// The set is closed; serialized labels match what users see in the form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Relationship {
    #[serde(rename = "Self")]
    Myself,
    Parent,
    Grandparent,
    #[serde(rename = "Great-Grandparent")]
    GreatGrandparent,
    Child,
    Grandchild,
    Sibling,
    #[serde(rename = "Spouse/Partner")]
    SpousePartner,
    #[serde(rename = "Aunt/Uncle")]
    AuntUncle,
    #[serde(rename = "Niece/Nephew")]
    NieceNephew,
    Cousin,
    #[serde(rename = "Other Relative")]
    OtherRelative,
}

impl Relationship {
    /// All relationships in display order.
    pub const ALL: [Relationship; 12] = [
        Relationship::Myself,
        Relationship::Parent,
        Relationship::Grandparent,
        Relationship::GreatGrandparent,
        Relationship::Child,
        Relationship::Grandchild,
        Relationship::Sibling,
        Relationship::SpousePartner,
        Relationship::AuntUncle,
        Relationship::NieceNephew,
        Relationship::Cousin,
        Relationship::OtherRelative,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Relationship::Myself => "Self",
            Relationship::Parent => "Parent",
            Relationship::Grandparent => "Grandparent",
            Relationship::GreatGrandparent => "Great-Grandparent",
            Relationship::Child => "Child",
            Relationship::Grandchild => "Grandchild",
            Relationship::Sibling => "Sibling",
            Relationship::SpousePartner => "Spouse/Partner",
            Relationship::AuntUncle => "Aunt/Uncle",
            Relationship::NieceNephew => "Niece/Nephew",
            Relationship::Cousin => "Cousin",
            Relationship::OtherRelative => "Other Relative",
        }
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error returned when a label is not one of [`Relationship::ALL`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown relationship: {0:?}")]
pub struct UnknownRelationship(pub String);

impl FromStr for Relationship {
    type Err = UnknownRelationship;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Relationship::ALL
            .into_iter()
            .find(|r| r.label() == s)
            .ok_or_else(|| UnknownRelationship(s.to_string()))
    }
}

/// Number of faces the detector found in one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    pub face_count: u32,
}

impl DetectionResult {
    pub fn new(face_count: u32) -> Self {
        Self { face_count }
    }
}

/// A stored family photo with its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
    pub id: Uuid,
    pub owner_id: OwnerId,
    pub person_name: String,
    pub relationship: Relationship,
    /// Opaque key of the binary in the blob store.
    pub storage_path: String,
    /// Public URL resolving to the stored binary.
    pub url: String,
    pub created_at: DateTime<Utc>,
}

/// The authenticated caller of an operation.
///
/// Passed explicitly into every workflow and store call; nothing reads a
/// process-wide "current user".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    pub user_id: OwnerId,
    pub email: String,
}
