//! API Handlers
//!
//! HTTP request handlers for each CDN endpoint. Handlers validate input,
//! delegate to the storage backend and shape the response.

use axum::{
    body::Body,
    extract::{
        multipart::{Field, MultipartError, MultipartRejection},
        rejection::QueryRejection,
        Multipart, Path, Query, State,
    },
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use tracing::{info, warn};

use super::AppState;
use crate::error::{ApiError, Result};
use crate::helpers::{is_allowed_type, resolve_mime_type, storage_name};
use crate::models::{
    ApiResponse, CacheClearData, CacheStatsResponse, ClearCacheRequest, FileCount, FileIdPath,
    FileListData, FileView, HealthResponse, ListQuery, SearchQuery, StorageStats, UploadBatch,
    UploadFailure,
};
use crate::storage::NewFile;

/// Most files accepted by one multi-upload request
pub const MAX_FILES_PER_UPLOAD: usize = 10;
/// Files counted when reporting stats
const STATS_FILE_SCAN: u32 = 1000;
/// Cached routes whose content changes when files are added or removed
const LISTING_PATHS: [&str; 2] = ["/api/files", "/api/stats"];

/// A file part read from a multipart body.
#[derive(Debug)]
struct UploadedPart {
    original_name: String,
    mime_type: String,
    data: Bytes,
}

impl UploadedPart {
    async fn read(field: Field<'_>, max_mb: u64) -> Result<Self> {
        let original_name = field.file_name().unwrap_or("upload").to_string();
        let declared = field.content_type().map(str::to_owned);
        let data = field
            .bytes()
            .await
            .map_err(|e| multipart_error(e, Some(max_mb)))?;

        Ok(Self {
            mime_type: resolve_mime_type(declared.as_deref(), &original_name),
            original_name,
            data,
        })
    }

    /// Size and type checks shared by single and batch uploads.
    fn validate(&self, max_bytes: usize, max_mb: u64) -> std::result::Result<(), String> {
        if self.data.len() > max_bytes {
            return Err(size_exceeded(max_mb));
        }
        if !is_allowed_type(&self.mime_type, None) {
            return Err("File type not allowed".to_string());
        }
        Ok(())
    }

    fn into_new_file(self, custom_name: Option<&str>) -> NewFile {
        NewFile {
            name: storage_name(&self.original_name, custom_name),
            mime_type: self.mime_type,
            data: self.data,
        }
    }
}

fn size_exceeded(max_mb: u64) -> String {
    format!("File size exceeds maximum limit of {}MB", max_mb)
}

fn multipart_error(err: MultipartError, max_mb: Option<u64>) -> ApiError {
    match max_mb {
        Some(max_mb) if err.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            ApiError::Validation(size_exceeded(max_mb))
        }
        _ => ApiError::Validation(err.body_text()),
    }
}

/// Base for generated URLs: the configured one, else scheme and host of the
/// request.
fn base_url(state: &AppState, headers: &HeaderMap) -> String {
    if let Some(base) = &state.config.public_base_url {
        return base.trim_end_matches('/').to_string();
    }

    let header_str = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let scheme = header_str("x-forwarded-proto").unwrap_or("http");
    match header_str(header::HOST.as_str()) {
        Some(host) => format!("{}://{}", scheme, host),
        None => format!("{}://localhost:{}", scheme, state.config.server_port),
    }
}

/// Drops cached listings and stats after the file set changed.
async fn invalidate_listings(state: &AppState) {
    for path in LISTING_PATHS {
        state.clear_cache(Some(path)).await;
    }
}

/// Handler for POST /api/upload
///
/// Multipart body with a `file` field and an optional `name` field.
pub async fn upload_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<ApiResponse<FileView>>)> {
    let mut multipart = multipart.map_err(|e| ApiError::Validation(e.body_text()))?;
    let max_mb = state.config.max_file_size_mb;

    let mut file = None;
    let mut custom_name = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, Some(max_mb)))?
    {
        let field_name = field.name().map(str::to_owned);
        match field_name.as_deref() {
            Some("file") if file.is_none() => {
                file = Some(UploadedPart::read(field, max_mb).await?)
            }
            Some("name") => {
                custom_name = Some(field.text().await.map_err(|e| multipart_error(e, None))?)
            }
            _ => {}
        }
    }

    let file = file.ok_or_else(|| ApiError::Validation("No file provided".to_string()))?;
    file.validate(state.config.max_file_size_bytes(), max_mb)
        .map_err(ApiError::Validation)?;

    let record = state
        .storage
        .upload(file.into_new_file(custom_name.as_deref()))
        .await
        .map_err(|e| state.upstream("Failed to upload file", e))?;
    info!("Uploaded {} ({}, {} bytes)", record.id, record.mime_type, record.size);

    invalidate_listings(&state).await;

    let view = FileView::new(record, &base_url(&state, &headers));
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(view))))
}

/// Handler for POST /api/upload/multiple
///
/// Each `files` part is validated and uploaded on its own; failures are
/// reported per file without aborting the batch.
pub async fn upload_multiple_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<ApiResponse<UploadBatch>>)> {
    let mut multipart = multipart.map_err(|e| ApiError::Validation(e.body_text()))?;
    let max_mb = state.config.max_file_size_mb;

    let mut parts = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, Some(max_mb)))?
    {
        if field.name() != Some("files") {
            continue;
        }
        if parts.len() == MAX_FILES_PER_UPLOAD {
            return Err(ApiError::Validation(format!(
                "Too many files, at most {} per request",
                MAX_FILES_PER_UPLOAD
            )));
        }
        parts.push(UploadedPart::read(field, max_mb).await?);
    }

    if parts.is_empty() {
        return Err(ApiError::Validation("No files provided".to_string()));
    }

    let base = base_url(&state, &headers);
    let max_bytes = state.config.max_file_size_bytes();
    let mut uploaded = Vec::new();
    let mut failed = Vec::new();

    for part in parts {
        let name = part.original_name.clone();
        if let Err(error) = part.validate(max_bytes, max_mb) {
            failed.push(UploadFailure { name, error });
            continue;
        }

        match state.storage.upload(part.into_new_file(None)).await {
            Ok(record) => uploaded.push(FileView::new(record, &base)),
            Err(err) => {
                warn!("Upload of {} failed: {}", name, err);
                failed.push(UploadFailure {
                    name,
                    error: err.to_string(),
                });
            }
        }
    }

    if !uploaded.is_empty() {
        invalidate_listings(&state).await;
    }

    let batch = UploadBatch::new(uploaded, failed);
    info!("Batch upload: {}/{} succeeded", batch.successful, batch.total);
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(batch))))
}

/// How a streamed file is presented to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Inline,
    Attachment,
}

/// Streams a file from the backend with the right headers. Dropping the
/// response body drops the backend stream.
async fn stream_file(
    state: &AppState,
    file_id: &str,
    disposition: Disposition,
    context: &str,
) -> Result<Response> {
    let info = state
        .storage
        .file_info(file_id)
        .await
        .map_err(|e| state.upstream(context, e))?;
    let stream = state
        .storage
        .open_stream(file_id)
        .await
        .map_err(|e| state.upstream(context, e))?;

    let mut response = Body::from_stream(stream).into_response();
    let headers = response.headers_mut();

    let content_type = HeaderValue::from_str(&info.mime_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    headers.insert(header::CONTENT_TYPE, content_type);

    let kind = match disposition {
        Disposition::Inline => "inline",
        Disposition::Attachment => "attachment",
    };
    let value = format!("{}; filename=\"{}\"", kind, header_safe_name(&info.name));
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    if info.size > 0 {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(info.size));
    }

    if disposition == Disposition::Inline {
        headers.insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static("public, max-age=31536000"),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        );
    }

    Ok(response)
}

/// Replaces characters that cannot appear in a quoted header parameter.
fn header_safe_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect()
}

/// Handler for GET /cdn/:fileId and GET /cdn/:fileId/:filename
pub async fn serve_handler(
    State(state): State<AppState>,
    Path(path): Path<FileIdPath>,
) -> Result<Response> {
    stream_file(&state, &path.file_id, Disposition::Inline, "Failed to serve file").await
}

/// Handler for GET /download/:fileId
pub async fn download_handler(
    State(state): State<AppState>,
    Path(path): Path<FileIdPath>,
) -> Result<Response> {
    stream_file(
        &state,
        &path.file_id,
        Disposition::Attachment,
        "Failed to download file",
    )
    .await
}

/// Handler for GET /api/file/:fileId
pub async fn get_info_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(path): Path<FileIdPath>,
) -> Result<Json<ApiResponse<FileView>>> {
    let record = state
        .storage
        .file_info(&path.file_id)
        .await
        .map_err(|e| state.upstream("Failed to get file info", e))?;

    Ok(Json(ApiResponse::ok(FileView::new(
        record,
        &base_url(&state, &headers),
    ))))
}

/// Handler for DELETE /api/file/:fileId
///
/// Also drops every cached response mentioning the file id.
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(path): Path<FileIdPath>,
) -> Result<Json<ApiResponse<()>>> {
    state
        .storage
        .delete(&path.file_id)
        .await
        .map_err(|e| state.upstream("Failed to delete file", e))?;
    info!("Deleted {}", path.file_id);

    state.clear_cache(Some(&path.file_id)).await;
    invalidate_listings(&state).await;

    Ok(Json(ApiResponse::message("File deleted successfully")))
}

/// Handler for GET /api/files
pub async fn list_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: std::result::Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<FileListData>>> {
    let Query(query) = query.map_err(|e| ApiError::Validation(e.body_text()))?;
    let page_size = query.validated_page_size().map_err(ApiError::Validation)?;

    let page = state
        .storage
        .list(page_size, query.page_token())
        .await
        .map_err(|e| state.upstream("Failed to list files", e))?;

    let base = base_url(&state, &headers);
    let files: Vec<FileView> = page
        .files
        .into_iter()
        .map(|file| FileView::new(file, &base))
        .collect();

    Ok(Json(ApiResponse::ok(FileListData {
        count: files.len(),
        files,
        next_page_token: page.next_page_token,
    })))
}

/// Handler for GET /api/files/search?q=
pub async fn search_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<SearchQuery>,
) -> Result<Json<ApiResponse<Vec<FileView>>>> {
    let term = query
        .term()
        .ok_or_else(|| ApiError::Validation("Search query is required".to_string()))?;

    let files = state
        .storage
        .search(term)
        .await
        .map_err(|e| state.upstream("Failed to search files", e))?;

    let base = base_url(&state, &headers);
    Ok(Json(ApiResponse::ok(
        files
            .into_iter()
            .map(|file| FileView::new(file, &base))
            .collect(),
    )))
}

/// Handler for GET /api/stats
pub async fn stats_handler(State(state): State<AppState>) -> Result<Json<ApiResponse<StorageStats>>> {
    let quota = state
        .storage
        .quota()
        .await
        .map_err(|e| state.upstream("Failed to get stats", e))?;
    let page = state
        .storage
        .list(STATS_FILE_SCAN, None)
        .await
        .map_err(|e| state.upstream("Failed to get stats", e))?;

    Ok(Json(ApiResponse::ok(StorageStats {
        storage: quota.into(),
        files: FileCount {
            total: page.files.len(),
        },
    })))
}

/// Handler for POST /api/cache/clear
///
/// Body `{"pattern": "..."}` clears matching entries; no pattern clears all.
pub async fn clear_cache_handler(
    State(state): State<AppState>,
    body: Option<Json<ClearCacheRequest>>,
) -> Json<ApiResponse<CacheClearData>> {
    let request = body.map(|Json(req)| req).unwrap_or_default();
    let removed = state.clear_cache(request.pattern()).await;

    Json(ApiResponse::ok(CacheClearData { removed }).with_message("Cache cleared"))
}

/// Handler for GET /api/cache/stats
pub async fn cache_stats_handler(State(state): State<AppState>) -> Json<ApiResponse<CacheStatsResponse>> {
    let cache = state.cache.read().await;
    Json(ApiResponse::ok(CacheStatsResponse::new(
        cache.stats(),
        cache.max_entries(),
    )))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

/// Fallback for unknown routes
pub async fn not_found_handler() -> ApiError {
    ApiError::NotFound("Endpoint not found".to_string())
}
