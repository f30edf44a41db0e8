//! Response DTOs for the CDN API
//!
//! Every JSON endpoint except `/health` answers with the envelope
//! `{success, data?, error?, message?}`.

use serde::Serialize;

use crate::cache::CacheStats;
use crate::helpers::{cdn_url, file_category, format_file_size, FileCategory};
use crate::storage::{FileRecord, StorageQuota};

// == Envelope ==
/// Uniform JSON response shape.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    /// A successful response carrying `data`.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            message: None,
        }
    }

    /// A failed response with an error string.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            message: None,
        }
    }

    pub fn with_message(self, message: impl Into<String>) -> Self {
        self.with_optional_message(Some(message.into()))
    }

    pub fn with_optional_message(mut self, message: Option<String>) -> Self {
        self.message = message;
        self
    }
}

impl ApiResponse<()> {
    /// A successful response with only a message.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            error: None,
            message: Some(message.into()),
        }
    }
}

// == File View ==
/// A backend file record decorated with URLs and display fields.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileView {
    #[serde(flatten)]
    pub file: FileRecord,
    /// CDN URL by id
    pub url: String,
    /// CDN URL with the file name appended
    pub direct_url: String,
    pub category: FileCategory,
    pub formatted_size: String,
}

impl FileView {
    pub fn new(file: FileRecord, base_url: &str) -> Self {
        Self {
            url: cdn_url(base_url, &file.id, None),
            direct_url: cdn_url(base_url, &file.id, Some(&file.name)),
            category: file_category(&file.mime_type),
            formatted_size: format_file_size(file.size),
            file,
        }
    }
}

/// Data of GET /api/files
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileListData {
    pub files: Vec<FileView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
    pub count: usize,
}

/// One file that could not be uploaded in a batch.
#[derive(Debug, Clone, Serialize)]
pub struct UploadFailure {
    pub name: String,
    pub error: String,
}

/// Data of POST /api/upload/multiple
#[derive(Debug, Clone, Serialize)]
pub struct UploadBatch {
    pub uploaded: Vec<FileView>,
    pub failed: Vec<UploadFailure>,
    pub total: usize,
    pub successful: usize,
}

impl UploadBatch {
    pub fn new(uploaded: Vec<FileView>, failed: Vec<UploadFailure>) -> Self {
        Self {
            total: uploaded.len() + failed.len(),
            successful: uploaded.len(),
            uploaded,
            failed,
        }
    }
}

/// Storage usage part of GET /api/stats
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageUsage {
    pub used: String,
    /// `None` for unlimited accounts
    pub total: Option<String>,
    pub used_bytes: u64,
    pub total_bytes: Option<u64>,
    /// Percentage with two decimals, `None` for unlimited accounts
    pub percent_used: Option<String>,
}

impl From<StorageQuota> for StorageUsage {
    fn from(quota: StorageQuota) -> Self {
        let percent_used = quota
            .limit
            .filter(|limit| *limit > 0)
            .map(|limit| format!("{:.2}", quota.usage as f64 / limit as f64 * 100.0));

        Self {
            used: format_file_size(quota.usage),
            total: quota.limit.map(format_file_size),
            used_bytes: quota.usage,
            total_bytes: quota.limit,
            percent_used,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileCount {
    pub total: usize,
}

/// Data of GET /api/stats
#[derive(Debug, Clone, Serialize)]
pub struct StorageStats {
    pub storage: StorageUsage,
    pub files: FileCount,
}

/// Data of POST /api/cache/clear
#[derive(Debug, Clone, Serialize)]
pub struct CacheClearData {
    pub removed: usize,
}

/// Data of GET /api/cache/stats
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatsResponse {
    #[serde(flatten)]
    pub stats: CacheStats,
    pub max_entries: usize,
    /// Ratio of hits to total lookups
    pub hit_rate: f64,
}

impl CacheStatsResponse {
    pub fn new(stats: CacheStats, max_entries: usize) -> Self {
        Self {
            hit_rate: stats.hit_rate(),
            stats,
            max_entries,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
