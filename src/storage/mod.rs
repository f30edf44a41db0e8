//! Storage Module
//!
//! Abstraction over the remote object store that holds the actual file
//! bytes. The server never persists file metadata itself; it only shapes what
//! the backend returns.

mod drive;
mod memory;

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub use drive::{DriveAuth, DriveStorage};
pub use memory::MemoryStorage;

/// Streamed file content. Dropping it releases the upstream connection.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StorageError>> + Send>>;

// == Storage Error ==
/// Failures reported by a storage backend.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The object does not exist
    #[error("File not found: {0}")]
    NotFound(String),

    /// The backend answered with a non-success status
    #[error("Storage API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The request never completed
    #[error("Storage transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend answered with something we could not read
    #[error("Unexpected storage response: {0}")]
    Decode(String),

    /// No bearer token could be obtained
    #[error("Storage authentication failed: {0}")]
    Auth(String),

    /// The request URL could not be built
    #[error("Invalid storage request: {0}")]
    Request(String),
}

// == File Record ==
/// Metadata of a stored file as reported by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    /// Size in bytes. Drive reports it as a decimal string and omits it for
    /// folders and native documents.
    #[serde(default, deserialize_with = "size_from_any")]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<DateTime<Utc>>,
}

/// A file ready to be written to the backend.
#[derive(Debug, Clone)]
pub struct NewFile {
    /// Final stored name
    pub name: String,
    pub mime_type: String,
    pub data: Bytes,
}

/// One page of a folder listing.
#[derive(Debug, Clone, Default)]
pub struct FilePage {
    pub files: Vec<FileRecord>,
    pub next_page_token: Option<String>,
}

/// Storage quota in bytes. `limit` is `None` for unlimited accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageQuota {
    pub usage: u64,
    pub limit: Option<u64>,
}

// == Storage Backend ==
/// Operations the HTTP layer needs from an object store.
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Creates the object and makes it publicly readable.
    async fn upload(&self, file: NewFile) -> Result<FileRecord, StorageError>;

    /// Fetches metadata for a single object.
    async fn file_info(&self, file_id: &str) -> Result<FileRecord, StorageError>;

    /// Opens the object's content as a byte stream.
    async fn open_stream(&self, file_id: &str) -> Result<ByteStream, StorageError>;

    /// Permanently removes the object.
    async fn delete(&self, file_id: &str) -> Result<(), StorageError>;

    /// Lists objects, newest first.
    async fn list(&self, page_size: u32, page_token: Option<&str>)
        -> Result<FilePage, StorageError>;

    /// Finds objects whose name contains `query`, case-insensitively.
    async fn search(&self, query: &str) -> Result<Vec<FileRecord>, StorageError>;

    /// Reports account-wide storage usage.
    async fn quota(&self) -> Result<StorageQuota, StorageError>;
}

fn size_from_any<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Size {
        Text(String),
        Number(u64),
    }

    match Option::<Size>::deserialize(deserializer)? {
        None => Ok(0),
        Some(Size::Number(n)) => Ok(n),
        Some(Size::Text(s)) => s.parse().map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_record_from_drive_json() {
        let json = r#"{
            "id": "abc123",
            "name": "photo.png",
            "mimeType": "image/png",
            "size": "2048",
            "createdTime": "2024-01-02T03:04:05.000Z"
        }"#;
        let record: FileRecord = serde_json::from_str(json).unwrap();

        assert_eq!(record.id, "abc123");
        assert_eq!(record.size, 2048);
        assert!(record.created_time.is_some());
        assert!(record.modified_time.is_none());
    }

    #[test]
    fn test_file_record_without_size() {
        let json = r#"{"id": "f", "name": "doc", "mimeType": "application/vnd.google-apps.document"}"#;
        let record: FileRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.size, 0);
    }

    #[test]
    fn test_file_record_serializes_camel_case() {
        let record = FileRecord {
            id: "x".into(),
            name: "a.txt".into(),
            mime_type: "text/plain".into(),
            size: 5,
            created_time: None,
            modified_time: None,
        };
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["mimeType"], "text/plain");
        assert_eq!(json["size"], 5);
        assert!(json.get("createdTime").is_none());
    }
}
