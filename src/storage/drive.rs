//! Google Drive v3 backend
//!
//! Talks to the Drive REST API with a bearer token. Every object lives in a
//! single configured folder.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use futures::TryStreamExt;
use gcp_auth::{CustomServiceAccount, TokenProvider};
use reqwest::{header, Client, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{
    ByteStream, FilePage, FileRecord, NewFile, StorageBackend, StorageError, StorageQuota,
};
use crate::config::DriveCredentials;

const API_BASE: &str = "https://www.googleapis.com/drive/v3";
const UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";
const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";
const FILE_FIELDS: &str = "id, name, mimeType, size, createdTime, modifiedTime";
const LIST_FIELDS: &str = "nextPageToken, files(id, name, mimeType, size, createdTime)";
const MULTIPART_BOUNDARY: &str = "drive_cdn_upload_boundary";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<FileRecord>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct About {
    storage_quota: Quota,
}

#[derive(Deserialize)]
struct Quota {
    limit: Option<String>,
    usage: Option<String>,
}

// == Drive Auth ==
/// Source of bearer tokens for Drive calls.
#[derive(Clone)]
pub enum DriveAuth {
    /// Token used as-is until it expires
    StaticToken(String),
    /// Provider that mints and caches tokens, refreshing them before expiry
    ServiceAccount(Arc<dyn TokenProvider>),
}

impl DriveAuth {
    /// Loads the configured credentials. Reading a service-account key can fail.
    pub fn from_credentials(credentials: &DriveCredentials) -> Result<Self, StorageError> {
        match credentials {
            DriveCredentials::AccessToken(token) => Ok(Self::StaticToken(token.clone())),
            DriveCredentials::ServiceAccountFile(path) => {
                let account = CustomServiceAccount::from_file(path).map_err(|e| {
                    StorageError::Auth(format!("{}: {}", path.display(), e))
                })?;
                Ok(Self::ServiceAccount(Arc::new(account)))
            }
        }
    }

    async fn bearer(&self) -> Result<String, StorageError> {
        match self {
            Self::StaticToken(token) => Ok(token.clone()),
            Self::ServiceAccount(provider) => provider
                .token(&[DRIVE_SCOPE])
                .await
                .map(|token| token.as_str().to_string())
                .map_err(|e| StorageError::Auth(e.to_string())),
        }
    }
}

impl fmt::Debug for DriveAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StaticToken(_) => f.write_str("StaticToken(..)"),
            Self::ServiceAccount(_) => f.write_str("ServiceAccount(..)"),
        }
    }
}

// == Drive Storage ==
/// Storage backend backed by a Google Drive folder.
#[derive(Debug, Clone)]
pub struct DriveStorage {
    http: Client,
    auth: DriveAuth,
    folder_id: String,
}

impl DriveStorage {
    pub fn new(auth: DriveAuth, folder_id: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            auth,
            folder_id: folder_id.into(),
        }
    }

    /// URL of a single file, optionally with sub-resources. Ids that Drive
    /// could never have issued are reported as missing.
    fn file_endpoint(base: &str, file_id: &str, tail: &[&str]) -> Result<Url, StorageError> {
        if !is_drive_id(file_id) {
            return Err(StorageError::NotFound(file_id.to_string()));
        }
        let mut segments = vec!["files", file_id];
        segments.extend_from_slice(tail);
        endpoint(base, &segments)
    }

    /// Maps non-success statuses onto `StorageError`.
    async fn check(response: Response, file_id: Option<&str>) -> Result<Response, StorageError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound(file_id.unwrap_or_default().to_string()));
        }

        let message = response.text().await.unwrap_or_default();
        Err(StorageError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn make_public(&self, file_id: &str) -> Result<(), StorageError> {
        let response = self
            .http
            .post(Self::file_endpoint(API_BASE, file_id, &["permissions"])?)
            .bearer_auth(self.auth.bearer().await?)
            .json(&json!({ "role": "reader", "type": "anyone" }))
            .send()
            .await?;
        Self::check(response, Some(file_id)).await?;
        Ok(())
    }

    async fn query_files(
        &self,
        query: String,
        page_size: Option<u32>,
        page_token: Option<&str>,
    ) -> Result<FileList, StorageError> {
        let mut request = self
            .http
            .get(endpoint(API_BASE, &["files"])?)
            .bearer_auth(self.auth.bearer().await?)
            .query(&[
                ("q", query.as_str()),
                ("fields", LIST_FIELDS),
                ("orderBy", "createdTime desc"),
            ]);
        if let Some(size) = page_size {
            request = request.query(&[("pageSize", size)]);
        }
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let response = Self::check(request.send().await?, None).await?;
        response
            .json()
            .await
            .map_err(|e| StorageError::Decode(e.to_string()))
    }

    fn folder_clause(&self) -> String {
        format!("'{}' in parents and trashed = false", escape_query(&self.folder_id))
    }
}

#[async_trait]
impl StorageBackend for DriveStorage {
    async fn upload(&self, file: NewFile) -> Result<FileRecord, StorageError> {
        let metadata = json!({ "name": file.name, "parents": [self.folder_id] });
        let body = multipart_related(&metadata, &file.mime_type, &file.data);

        let response = self
            .http
            .post(endpoint(UPLOAD_BASE, &["files"])?)
            .bearer_auth(self.auth.bearer().await?)
            .query(&[("uploadType", "multipart"), ("fields", FILE_FIELDS)])
            .header(
                header::CONTENT_TYPE,
                format!("multipart/related; boundary={MULTIPART_BOUNDARY}"),
            )
            .body(body)
            .send()
            .await?;
        let record: FileRecord = Self::check(response, None)
            .await?
            .json()
            .await
            .map_err(|e| StorageError::Decode(e.to_string()))?;

        self.make_public(&record.id).await?;
        debug!("Drive upload complete: id={} name={}", record.id, record.name);

        Ok(record)
    }

    async fn file_info(&self, file_id: &str) -> Result<FileRecord, StorageError> {
        let response = self
            .http
            .get(Self::file_endpoint(API_BASE, file_id, &[])?)
            .bearer_auth(self.auth.bearer().await?)
            .query(&[("fields", FILE_FIELDS)])
            .send()
            .await?;

        Self::check(response, Some(file_id))
            .await?
            .json()
            .await
            .map_err(|e| StorageError::Decode(e.to_string()))
    }

    async fn open_stream(&self, file_id: &str) -> Result<ByteStream, StorageError> {
        let response = self
            .http
            .get(Self::file_endpoint(API_BASE, file_id, &[])?)
            .bearer_auth(self.auth.bearer().await?)
            .query(&[("alt", "media")])
            .send()
            .await?;
        let response = Self::check(response, Some(file_id)).await?;

        Ok(Box::pin(response.bytes_stream().map_err(StorageError::from)))
    }

    async fn delete(&self, file_id: &str) -> Result<(), StorageError> {
        let response = self
            .http
            .delete(Self::file_endpoint(API_BASE, file_id, &[])?)
            .bearer_auth(self.auth.bearer().await?)
            .send()
            .await?;
        Self::check(response, Some(file_id)).await?;
        Ok(())
    }

    async fn list(
        &self,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<FilePage, StorageError> {
        let list = self
            .query_files(self.folder_clause(), Some(page_size), page_token)
            .await?;
        Ok(FilePage {
            files: list.files,
            next_page_token: list.next_page_token,
        })
    }

    async fn search(&self, query: &str) -> Result<Vec<FileRecord>, StorageError> {
        let clause = format!(
            "{} and name contains '{}'",
            self.folder_clause(),
            escape_query(query)
        );
        Ok(self.query_files(clause, None, None).await?.files)
    }

    async fn quota(&self) -> Result<StorageQuota, StorageError> {
        let response = self
            .http
            .get(endpoint(API_BASE, &["about"])?)
            .bearer_auth(self.auth.bearer().await?)
            .query(&[("fields", "storageQuota")])
            .send()
            .await?;
        let about: About = Self::check(response, None)
            .await?
            .json()
            .await
            .map_err(|e| StorageError::Decode(e.to_string()))?;

        let parse = |v: Option<String>| v.and_then(|s| s.parse::<u64>().ok());
        Ok(StorageQuota {
            usage: parse(about.storage_quota.usage).unwrap_or(0),
            limit: parse(about.storage_quota.limit),
        })
    }
}

/// Appends `segments` to `base`, percent-encoding each one as a single
/// path segment.
fn endpoint(base: &str, segments: &[&str]) -> Result<Url, StorageError> {
    let mut url = Url::parse(base).map_err(|e| StorageError::Request(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| StorageError::Request(format!("{base} cannot take path segments")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Drive ids are URL-safe base64 style strings.
fn is_drive_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Escapes a value for use inside a single-quoted Drive query literal.
fn escape_query(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Builds a `multipart/related` body: JSON metadata part, then the media part.
fn multipart_related(metadata: &serde_json::Value, mime_type: &str, data: &Bytes) -> Bytes {
    let mut body = BytesMut::with_capacity(data.len() + 512);

    body.put_slice(format!("--{MULTIPART_BOUNDARY}\r\n").as_bytes());
    body.put_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.put_slice(metadata.to_string().as_bytes());
    body.put_slice(format!("\r\n--{MULTIPART_BOUNDARY}\r\n").as_bytes());
    body.put_slice(format!("Content-Type: {mime_type}\r\n\r\n").as_bytes());
    body.put_slice(data);
    body.put_slice(format!("\r\n--{MULTIPART_BOUNDARY}--").as_bytes());

    body.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_query_quotes_and_backslashes() {
        assert_eq!(escape_query("it's"), "it\\'s");
        assert_eq!(escape_query(r"a\b"), r"a\\b");
        assert_eq!(escape_query("plain"), "plain");
    }

    #[test]
    fn test_multipart_related_layout() {
        let metadata = json!({ "name": "a.txt", "parents": ["folder"] });
        let body = multipart_related(&metadata, "text/plain", &Bytes::from_static(b"hello"));
        let text = String::from_utf8(body.to_vec()).unwrap();

        assert!(text.starts_with(&format!("--{MULTIPART_BOUNDARY}\r\n")));
        assert!(text.contains(r#""name":"a.txt""#));
        assert!(text.contains("Content-Type: text/plain\r\n\r\nhello"));
        assert!(text.ends_with(&format!("--{MULTIPART_BOUNDARY}--")));
    }

    #[test]
    fn test_file_endpoint_rejects_traversal_ids() {
        for id in ["../about", "abc/permissions", "abc?supportsAllDrives=true&x=", "..", ""] {
            assert!(
                matches!(
                    DriveStorage::file_endpoint(API_BASE, id, &[]),
                    Err(StorageError::NotFound(_))
                ),
                "{id:?} should not reach Drive"
            );
        }
    }

    #[test]
    fn test_file_endpoint_layout() {
        let url = DriveStorage::file_endpoint(API_BASE, "1AbC-d_9", &[]).unwrap();
        assert_eq!(url.as_str(), "https://www.googleapis.com/drive/v3/files/1AbC-d_9");

        let url = DriveStorage::file_endpoint(API_BASE, "1AbC", &["permissions"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://www.googleapis.com/drive/v3/files/1AbC/permissions"
        );
    }

    #[test]
    fn test_endpoint_keeps_each_segment_whole() {
        let url = endpoint(API_BASE, &["files", "a/b?c=d#e"]).unwrap();
        assert_eq!(url.path(), "/drive/v3/files/a%2Fb%3Fc=d%23e");
        assert!(url.query().is_none());
        assert!(url.fragment().is_none());
    }

    #[tokio::test]
    async fn test_static_token_bearer() {
        let auth = DriveAuth::from_credentials(&DriveCredentials::AccessToken("t0k".into())).unwrap();
        assert_eq!(auth.bearer().await.unwrap(), "t0k");
        assert_eq!(format!("{:?}", auth), "StaticToken(..)");
    }

    #[test]
    fn test_missing_key_file_is_auth_error() {
        let credentials = DriveCredentials::ServiceAccountFile("/nonexistent/key.json".into());
        assert!(matches!(
            DriveAuth::from_credentials(&credentials),
            Err(StorageError::Auth(_))
        ));
    }

    #[test]
    fn test_folder_clause() {
        let drive = DriveStorage::new(DriveAuth::StaticToken("token".into()), "folder'1");
        assert_eq!(drive.folder_clause(), "'folder\\'1' in parents and trashed = false");
    }
}
