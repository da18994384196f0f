//! famtree-store — Local storage backends.
//!
//! SQLite (via `tokio-rusqlite`) holds photo metadata, accounts, profiles
//! and sessions; image binaries live in a plain directory tree that the
//! HTTP service exposes as public URLs.

pub mod accounts;
pub mod blobs;
pub mod db;
pub mod records;

pub use accounts::SqliteAccounts;
pub use blobs::FsBlobStore;
pub use db::Database;
pub use records::SqlitePhotoRecords;
