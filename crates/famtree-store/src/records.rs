//! Photo metadata in SQLite.

use crate::db::{backend, parse_timestamp, timestamp, Database};
use async_trait::async_trait;
use chrono::{SubsecRound, Utc};
use famtree_core::store::{BackendError, NewPhotoRecord, PhotoRecord, PhotoRecords};
use famtree_core::types::{OwnerId, Relationship};
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

const SELECT_COLUMNS: &str =
    "SELECT id, user_id, person_name, relationship, storage_path, created_at FROM photos";

/// Row as stored, before parsing ids, labels and timestamps.
struct RawPhoto {
    id: String,
    user_id: String,
    person_name: String,
    relationship: String,
    storage_path: String,
    created_at: String,
}

impl RawPhoto {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            person_name: row.get(2)?,
            relationship: row.get(3)?,
            storage_path: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    fn parse(self) -> Result<PhotoRecord, BackendError> {
        Ok(PhotoRecord {
            id: parse_uuid(&self.id)?,
            owner_id: parse_uuid(&self.user_id)?,
            relationship: self
                .relationship
                .parse::<Relationship>()
                .map_err(|e| BackendError(e.to_string()))?,
            person_name: self.person_name,
            storage_path: self.storage_path,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

fn parse_uuid(raw: &str) -> Result<Uuid, BackendError> {
    Uuid::parse_str(raw).map_err(|e| BackendError(format!("bad id {raw:?}: {e}")))
}

/// [`PhotoRecords`] backed by the `photos` table.
#[derive(Clone)]
pub struct SqlitePhotoRecords {
    db: Database,
}

impl SqlitePhotoRecords {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PhotoRecords for SqlitePhotoRecords {
    async fn insert(&self, record: NewPhotoRecord) -> Result<PhotoRecord, BackendError> {
        let stored = PhotoRecord {
            id: Uuid::new_v4(),
            owner_id: record.owner_id,
            person_name: record.person_name,
            relationship: record.relationship,
            storage_path: record.storage_path,
            // Stored with microsecond precision.
            created_at: Utc::now().trunc_subsecs(6),
        };

        let row = stored.clone();
        self.db
            .conn()
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO photos (id, user_id, person_name, relationship, storage_path, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        row.id.to_string(),
                        row.owner_id.to_string(),
                        row.person_name,
                        row.relationship.label(),
                        row.storage_path,
                        timestamp(row.created_at),
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(backend)?;

        Ok(stored)
    }

    async fn list(&self, owner: OwnerId) -> Result<Vec<PhotoRecord>, BackendError> {
        let raw = self
            .db
            .conn()
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "{SELECT_COLUMNS} WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC"
                ))?;
                let rows = stmt
                    .query_map(params![owner.to_string()], RawPhoto::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await
            .map_err(backend)?;

        raw.into_iter().map(RawPhoto::parse).collect()
    }

    async fn find(&self, owner: OwnerId, id: Uuid) -> Result<Option<PhotoRecord>, BackendError> {
        let raw = self
            .db
            .conn()
            .call(move |conn| {
                let row = conn
                    .query_row(
                        &format!("{SELECT_COLUMNS} WHERE user_id = ?1 AND id = ?2"),
                        params![owner.to_string(), id.to_string()],
                        RawPhoto::from_row,
                    )
                    .optional()?;
                Ok(row)
            })
            .await
            .map_err(backend)?;

        raw.map(RawPhoto::parse).transpose()
    }

    async fn delete(&self, owner: OwnerId, id: Uuid) -> Result<bool, BackendError> {
        let deleted = self
            .db
            .conn()
            .call(move |conn| {
                let n = conn.execute(
                    "DELETE FROM photos WHERE user_id = ?1 AND id = ?2",
                    params![owner.to_string(), id.to_string()],
                )?;
                Ok(n)
            })
            .await
            .map_err(backend)?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn records() -> SqlitePhotoRecords {
        SqlitePhotoRecords::new(Database::open_in_memory().await.unwrap())
    }

    fn new_record(owner: OwnerId, name: &str, key: &str) -> NewPhotoRecord {
        NewPhotoRecord {
            owner_id: owner,
            person_name: name.into(),
            relationship: Relationship::Grandparent,
            storage_path: key.into(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let records = records().await;
        let owner = Uuid::new_v4();
        let inserted = records.insert(new_record(owner, "Rose", "o/1.jpg")).await.unwrap();

        let found = records.find(owner, inserted.id).await.unwrap().unwrap();
        assert_eq!(found, inserted);
        assert!(records.find(Uuid::new_v4(), inserted.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let records = records().await;
        let owner = Uuid::new_v4();
        let a = records.insert(new_record(owner, "A", "o/a.jpg")).await.unwrap();
        let b = records.insert(new_record(owner, "B", "o/b.jpg")).await.unwrap();
        let c = records.insert(new_record(owner, "C", "o/c.jpg")).await.unwrap();
        records.insert(new_record(Uuid::new_v4(), "Other", "x/d.jpg")).await.unwrap();

        let ids: Vec<_> = records.list(owner).await.unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![c.id, b.id, a.id]);
    }

    #[tokio::test]
    async fn test_delete_scoped_to_owner() {
        let records = records().await;
        let owner = Uuid::new_v4();
        let row = records.insert(new_record(owner, "A", "o/a.jpg")).await.unwrap();

        assert!(!records.delete(Uuid::new_v4(), row.id).await.unwrap());
        assert!(records.delete(owner, row.id).await.unwrap());
        assert!(!records.delete(owner, row.id).await.unwrap());
        assert!(records.list(owner).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blank_person_name_rejected_by_schema() {
        let records = records().await;
        let result = records.insert(new_record(Uuid::new_v4(), "  ", "o/a.jpg")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_storage_path_rejected() {
        let records = records().await;
        let owner = Uuid::new_v4();
        records.insert(new_record(owner, "A", "o/a.jpg")).await.unwrap();
        assert!(records.insert(new_record(owner, "B", "o/a.jpg")).await.is_err());
    }
}
