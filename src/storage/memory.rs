//! In-memory storage backend
//!
//! Used when no Drive credentials are configured, and by the tests.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{
    ByteStream, FilePage, FileRecord, NewFile, StorageBackend, StorageError, StorageQuota,
};

/// Chunk size used when streaming stored content
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug)]
struct StoredFile {
    record: FileRecord,
    data: Bytes,
    /// Insertion sequence, newest has the highest value
    seq: u64,
}

#[derive(Debug, Default)]
struct Inner {
    files: HashMap<String, StoredFile>,
    next_seq: u64,
}

// == Memory Storage ==
/// Process-local object store with an optional byte quota.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    inner: RwLock<Inner>,
    quota_limit: Option<u64>,
}

impl MemoryStorage {
    /// Creates an unlimited store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that rejects uploads past `limit` bytes in total.
    pub fn with_quota_limit(limit: u64) -> Self {
        Self {
            inner: RwLock::default(),
            quota_limit: Some(limit),
        }
    }

    fn sorted_records(inner: &Inner) -> Vec<FileRecord> {
        let mut files: Vec<&StoredFile> = inner.files.values().collect();
        files.sort_by(|a, b| b.seq.cmp(&a.seq));
        files.into_iter().map(|f| f.record.clone()).collect()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn upload(&self, file: NewFile) -> Result<FileRecord, StorageError> {
        let mut inner = self.inner.write().await;

        if let Some(limit) = self.quota_limit {
            let used: u64 = inner.files.values().map(|f| f.record.size).sum();
            if used + file.data.len() as u64 > limit {
                return Err(StorageError::Api {
                    status: 403,
                    message: "The user's Drive storage quota has been exceeded.".to_string(),
                });
            }
        }

        let id = uuid::Uuid::new_v4().simple().to_string();
        let now = Utc::now();
        let record = FileRecord {
            id: id.clone(),
            name: file.name,
            mime_type: file.mime_type,
            size: file.data.len() as u64,
            created_time: Some(now),
            modified_time: Some(now),
        };

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.files.insert(
            id,
            StoredFile {
                record: record.clone(),
                data: file.data,
                seq,
            },
        );

        Ok(record)
    }

    async fn file_info(&self, file_id: &str) -> Result<FileRecord, StorageError> {
        let inner = self.inner.read().await;
        inner
            .files
            .get(file_id)
            .map(|f| f.record.clone())
            .ok_or_else(|| StorageError::NotFound(file_id.to_string()))
    }

    async fn open_stream(&self, file_id: &str) -> Result<ByteStream, StorageError> {
        let data = {
            let inner = self.inner.read().await;
            inner
                .files
                .get(file_id)
                .map(|f| f.data.clone())
                .ok_or_else(|| StorageError::NotFound(file_id.to_string()))?
        };

        let chunks: Vec<Result<Bytes, StorageError>> = (0..data.len())
            .step_by(STREAM_CHUNK_SIZE)
            .map(|start| Ok(data.slice(start..(start + STREAM_CHUNK_SIZE).min(data.len()))))
            .collect();

        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    async fn delete(&self, file_id: &str) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        inner
            .files
            .remove(file_id)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(file_id.to_string()))
    }

    async fn list(
        &self,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<FilePage, StorageError> {
        let offset = match page_token {
            Some(token) => token.parse::<usize>().map_err(|_| StorageError::Api {
                status: 400,
                message: format!("Invalid page token: {token}"),
            })?,
            None => 0,
        };

        let inner = self.inner.read().await;
        let records = Self::sorted_records(&inner);
        let end = (offset + page_size as usize).min(records.len());
        let files = records.get(offset..end).map(<[_]>::to_vec).unwrap_or_default();
        let next_page_token = (end < records.len()).then(|| end.to_string());

        Ok(FilePage {
            files,
            next_page_token,
        })
    }

    async fn search(&self, query: &str) -> Result<Vec<FileRecord>, StorageError> {
        let needle = query.to_lowercase();
        let inner = self.inner.read().await;
        Ok(Self::sorted_records(&inner)
            .into_iter()
            .filter(|r| r.name.to_lowercase().contains(&needle))
            .collect())
    }

    async fn quota(&self) -> Result<StorageQuota, StorageError> {
        let inner = self.inner.read().await;
        Ok(StorageQuota {
            usage: inner.files.values().map(|f| f.record.size).sum(),
            limit: self.quota_limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    fn new_file(name: &str, data: &[u8]) -> NewFile {
        NewFile {
            name: name.to_string(),
            mime_type: "text/plain".to_string(),
            data: Bytes::copy_from_slice(data),
        }
    }

    #[tokio::test]
    async fn test_upload_and_info() {
        let store = MemoryStorage::new();
        let record = store.upload(new_file("a.txt", b"hello")).await.unwrap();

        assert_eq!(record.size, 5);
        let info = store.file_info(&record.id).await.unwrap();
        assert_eq!(info, record);
    }

    #[tokio::test]
    async fn test_stream_returns_all_bytes() {
        let store = MemoryStorage::new();
        let payload = vec![7u8; STREAM_CHUNK_SIZE * 2 + 10];
        let record = store.upload(new_file("big.bin", &payload)).await.unwrap();

        let chunks: Vec<Bytes> = store
            .open_stream(&record.id)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.iter().map(Bytes::len).sum::<usize>(), payload.len());
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let store = MemoryStorage::new();
        let result = store.delete("nope").await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_pagination_newest_first() {
        let store = MemoryStorage::new();
        for name in ["one", "two", "three"] {
            store.upload(new_file(name, b"x")).await.unwrap();
        }

        let first = store.list(2, None).await.unwrap();
        assert_eq!(first.files.len(), 2);
        assert_eq!(first.files[0].name, "three");
        assert_eq!(first.next_page_token.as_deref(), Some("2"));

        let second = store.list(2, first.next_page_token.as_deref()).await.unwrap();
        assert_eq!(second.files.len(), 1);
        assert_eq!(second.files[0].name, "one");
        assert!(second.next_page_token.is_none());
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive() {
        let store = MemoryStorage::new();
        store.upload(new_file("Holiday.PNG", b"x")).await.unwrap();
        store.upload(new_file("notes.txt", b"x")).await.unwrap();

        let found = store.search("holiday").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Holiday.PNG");
    }

    #[tokio::test]
    async fn test_quota_limit_rejects_upload() {
        let store = MemoryStorage::with_quota_limit(4);
        let result = store.upload(new_file("a.txt", b"hello")).await;
        assert!(matches!(result, Err(StorageError::Api { status: 403, .. })));

        let quota = store.quota().await.unwrap();
        assert_eq!(quota.usage, 0);
        assert_eq!(quota.limit, Some(4));
    }
}
