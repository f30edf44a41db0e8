//! Request and Response models for the CDN API
//!
//! This module defines the DTOs (Data Transfer Objects) used for
//! serializing/deserializing HTTP request and response bodies.

pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use requests::{ClearCacheRequest, FileIdPath, ListQuery, SearchQuery};
pub use responses::{
    ApiResponse, CacheClearData, CacheStatsResponse, FileCount, FileListData, FileView,
    HealthResponse, StorageStats, StorageUsage, UploadBatch, UploadFailure,
};
