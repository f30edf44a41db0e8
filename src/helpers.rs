//! Helper utilities
//!
//! MIME classification, size formatting and URL construction. Pure functions.

use serde::Serialize;

// == File Category ==
/// Coarse grouping of the MIME types the server accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Image,
    Document,
    Video,
    Audio,
    Archive,
    Code,
    Other,
}

/// Allowed MIME types per category.
pub const ALLOWED_TYPES: &[(FileCategory, &[&str])] = &[
    (
        FileCategory::Image,
        &[
            "image/jpeg",
            "image/png",
            "image/gif",
            "image/webp",
            "image/svg+xml",
            "image/bmp",
        ],
    ),
    (
        FileCategory::Document,
        &[
            "application/pdf",
            "application/msword",
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        ],
    ),
    (FileCategory::Video, &["video/mp4", "video/webm", "video/ogg"]),
    (
        FileCategory::Audio,
        &["audio/mpeg", "audio/wav", "audio/ogg", "audio/webm"],
    ),
    (
        FileCategory::Archive,
        &[
            "application/zip",
            "application/x-rar-compressed",
            "application/x-7z-compressed",
        ],
    ),
    (
        FileCategory::Code,
        &[
            "text/html",
            "text/css",
            "application/javascript",
            "application/json",
        ],
    ),
];

/// Returns the category a MIME type belongs to, or `Other`.
pub fn file_category(mime_type: &str) -> FileCategory {
    ALLOWED_TYPES
        .iter()
        .find(|(_, types)| types.contains(&mime_type))
        .map(|(category, _)| *category)
        .unwrap_or(FileCategory::Other)
}

/// Checks a MIME type against the allow-list, optionally restricted to some
/// categories.
pub fn is_allowed_type(mime_type: &str, categories: Option<&[FileCategory]>) -> bool {
    ALLOWED_TYPES
        .iter()
        .filter(|(category, _)| categories.map_or(true, |allowed| allowed.contains(category)))
        .any(|(_, types)| types.contains(&mime_type))
}

/// Formats a byte count as e.g. `1.5 KB`, with at most two decimals.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut exponent = 0;
    while exponent < UNITS.len() - 1 && bytes >= 1024u64.pow(exponent as u32 + 1) {
        exponent += 1;
    }
    let value = bytes as f64 / 1024u64.pow(exponent as u32) as f64;

    // Two decimals, then drop trailing zeros
    let rounded = format!("{:.2}", value);
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, UNITS[exponent])
}

/// Builds the public CDN URL for a file, optionally with its name appended.
pub fn cdn_url(base_url: &str, file_id: &str, file_name: Option<&str>) -> String {
    let mut segments = vec!["cdn", file_id];
    segments.extend(file_name);

    match reqwest::Url::parse(base_url) {
        Ok(mut url) => {
            if let Ok(mut path) = url.path_segments_mut() {
                path.pop_if_empty().extend(segments);
            }
            url.to_string()
        }
        Err(_) => format!("{}/{}", base_url.trim_end_matches('/'), segments.join("/")),
    }
}

/// Name a file is stored under: the custom name if given, else a fresh UUID
/// keeping the original extension.
pub fn storage_name(original_name: &str, custom_name: Option<&str>) -> String {
    if let Some(name) = custom_name.map(str::trim).filter(|n| !n.is_empty()) {
        return name.to_string();
    }

    let id = uuid::Uuid::new_v4();
    match original_name.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => format!("{id}.{ext}"),
        _ => id.to_string(),
    }
}

/// MIME type for an upload: what the client declared, else a guess from the
/// file name.
pub fn resolve_mime_type(declared: Option<&str>, file_name: &str) -> String {
    match declared.map(str::trim).filter(|m| !m.is_empty()) {
        Some(mime) => mime.to_string(),
        None => mime_guess::from_path(file_name)
            .first_or_octet_stream()
            .essence_str()
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_category() {
        assert_eq!(file_category("image/png"), FileCategory::Image);
        assert_eq!(file_category("application/zip"), FileCategory::Archive);
        assert_eq!(file_category("text/plain"), FileCategory::Other);
    }

    #[test]
    fn test_is_allowed_type() {
        assert!(is_allowed_type("video/mp4", None));
        assert!(!is_allowed_type("application/x-msdownload", None));
        assert!(is_allowed_type("image/gif", Some(&[FileCategory::Image])));
        assert!(!is_allowed_type("video/mp4", Some(&[FileCategory::Image])));
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 Bytes");
        assert_eq!(format_file_size(512), "512 Bytes");
        assert_eq!(format_file_size(1024), "1 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(10 * 1024 * 1024), "10 MB");
        assert_eq!(format_file_size(1_288_490_189), "1.2 GB");
    }

    #[test]
    fn test_format_file_size_caps_at_gb() {
        assert_eq!(format_file_size(2 * 1024u64.pow(4)), "2048 GB");
    }

    #[test]
    fn test_cdn_url() {
        assert_eq!(
            cdn_url("http://localhost:3000", "abc", None),
            "http://localhost:3000/cdn/abc"
        );
        assert_eq!(
            cdn_url("https://cdn.example.com/", "abc", Some("my photo.png")),
            "https://cdn.example.com/cdn/abc/my%20photo.png"
        );
    }

    #[test]
    fn test_storage_name() {
        assert_eq!(storage_name("a.png", Some("custom.png")), "custom.png");

        let generated = storage_name("holiday.jpeg", None);
        assert!(generated.ends_with(".jpeg"));
        assert_eq!(generated.len(), 36 + ".jpeg".len());

        assert_eq!(storage_name("README", Some("  ")).len(), 36);
    }

    #[test]
    fn test_resolve_mime_type() {
        assert_eq!(resolve_mime_type(Some("image/png"), "x.bin"), "image/png");
        assert_eq!(resolve_mime_type(None, "photo.jpg"), "image/jpeg");
        assert_eq!(resolve_mime_type(None, "blob"), "application/octet-stream");
    }
}
