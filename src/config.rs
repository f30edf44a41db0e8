//! Configuration Module
//!
//! Handles loading and managing server configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// A fixed-window rate limit: at most `max_requests` per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRule {
    pub window: Duration,
    pub max_requests: u32,
}

impl RateLimitRule {
    pub const fn new(window_secs: u64, max_requests: u32) -> Self {
        Self {
            window: Duration::from_secs(window_secs),
            max_requests,
        }
    }
}

/// How the server authenticates against Google Drive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriveCredentials {
    /// Service-account JSON key; tokens are minted and refreshed as needed
    ServiceAccountFile(PathBuf),
    /// Pre-issued OAuth bearer token with the `drive` scope, used until it expires
    AccessToken(String),
}

/// Google Drive backend settings.
#[derive(Debug, Clone)]
pub struct DriveConfig {
    pub credentials: DriveCredentials,
    pub folder_id: String,
}

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    /// Secret required on `/api` routes; `None` rejects every key
    pub api_key: Option<String>,
    /// Largest accepted upload, in megabytes
    pub max_file_size_mb: u64,
    /// Default TTL in seconds for cached responses
    pub default_cache_ttl: u64,
    /// Maximum number of cached responses
    pub max_cache_entries: usize,
    /// Background sweep interval in seconds
    pub cache_check_period: u64,
    /// Largest response body the cache will buffer and store
    pub cache_max_body_bytes: usize,
    pub upload_limit: RateLimitRule,
    pub download_limit: RateLimitRule,
    pub api_limit: RateLimitRule,
    /// Include upstream error messages in 500 responses
    pub expose_error_details: bool,
    /// Base for generated file URLs; derived from the request when unset
    pub public_base_url: Option<String>,
    /// Drive credentials; the in-memory backend is used when unset
    pub drive: Option<DriveConfig>,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `PORT` - HTTP server port (default: 3000)
    /// - `API_KEY` - Secret for `/api` routes (default: unset)
    /// - `MAX_FILE_SIZE` - Upload limit in MB (default: 50)
    /// - `CACHE_DURATION` - Default cache TTL in seconds (default: 3600)
    /// - `MAX_CACHE_ENTRIES` - Cache capacity (default: 1000)
    /// - `CACHE_CHECK_PERIOD` - Sweep interval in seconds (default: 600)
    /// - `CACHE_MAX_BODY_BYTES` - Largest cacheable body (default: 5 MiB)
    /// - `RATE_LIMIT_{UPLOAD,DOWNLOAD,API}_WINDOW` - Window in seconds (900/60/900)
    /// - `RATE_LIMIT_{UPLOAD,DOWNLOAD,API}_MAX` - Requests per window (20/200/100)
    /// - `APP_ENV` - `development` exposes upstream error detail
    /// - `PUBLIC_BASE_URL` - Base for generated URLs
    /// - `GOOGLE_APPLICATION_CREDENTIALS` - Service-account key file for Drive
    /// - `GOOGLE_ACCESS_TOKEN` - Static Drive token, used when no key file is set
    /// - `GOOGLE_DRIVE_FOLDER_ID` - Folder holding the files
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let drive = drive_credentials().map(|credentials| DriveConfig {
            credentials,
            folder_id: non_empty_var("GOOGLE_DRIVE_FOLDER_ID").unwrap_or_default(),
        });

        Self {
            server_port: parsed_var("PORT").unwrap_or(defaults.server_port),
            api_key: non_empty_var("API_KEY"),
            max_file_size_mb: parsed_var("MAX_FILE_SIZE").unwrap_or(defaults.max_file_size_mb),
            default_cache_ttl: parsed_var("CACHE_DURATION").unwrap_or(defaults.default_cache_ttl),
            max_cache_entries: parsed_var("MAX_CACHE_ENTRIES")
                .unwrap_or(defaults.max_cache_entries),
            cache_check_period: parsed_var("CACHE_CHECK_PERIOD")
                .unwrap_or(defaults.cache_check_period),
            cache_max_body_bytes: parsed_var("CACHE_MAX_BODY_BYTES")
                .unwrap_or(defaults.cache_max_body_bytes),
            upload_limit: rule_from_env("UPLOAD", defaults.upload_limit),
            download_limit: rule_from_env("DOWNLOAD", defaults.download_limit),
            api_limit: rule_from_env("API", defaults.api_limit),
            expose_error_details: env::var("APP_ENV")
                .map(|v| v.eq_ignore_ascii_case("development"))
                .unwrap_or(false),
            public_base_url: non_empty_var("PUBLIC_BASE_URL"),
            drive,
        }
    }

    /// Upload limit in bytes.
    pub fn max_file_size_bytes(&self) -> usize {
        (self.max_file_size_mb as usize).saturating_mul(1024 * 1024)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            api_key: None,
            max_file_size_mb: 50,
            default_cache_ttl: 3600,
            max_cache_entries: 1000,
            cache_check_period: 600,
            cache_max_body_bytes: 5 * 1024 * 1024,
            upload_limit: RateLimitRule::new(15 * 60, 20),
            download_limit: RateLimitRule::new(60, 200),
            api_limit: RateLimitRule::new(15 * 60, 100),
            expose_error_details: false,
            public_base_url: None,
            drive: None,
        }
    }
}

/// Service-account key file first, static token second.
fn drive_credentials() -> Option<DriveCredentials> {
    non_empty_var("GOOGLE_APPLICATION_CREDENTIALS")
        .map(|path| DriveCredentials::ServiceAccountFile(PathBuf::from(path)))
        .or_else(|| non_empty_var("GOOGLE_ACCESS_TOKEN").map(DriveCredentials::AccessToken))
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn rule_from_env(class: &str, default: RateLimitRule) -> RateLimitRule {
    let window = parsed_var::<u64>(&format!("RATE_LIMIT_{class}_WINDOW"))
        .map(Duration::from_secs)
        .unwrap_or(default.window);
    let max_requests =
        parsed_var(&format!("RATE_LIMIT_{class}_MAX")).unwrap_or(default.max_requests);

    RateLimitRule {
        window,
        max_requests,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.max_file_size_mb, 50);
        assert_eq!(config.default_cache_ttl, 3600);
        assert_eq!(config.max_cache_entries, 1000);
        assert_eq!(config.upload_limit, RateLimitRule::new(900, 20));
        assert_eq!(config.download_limit, RateLimitRule::new(60, 200));
        assert_eq!(config.api_limit, RateLimitRule::new(900, 100));
        assert!(config.drive.is_none());
    }

    #[test]
    fn test_max_file_size_bytes() {
        let config = Config {
            max_file_size_mb: 2,
            ..Config::default()
        };
        assert_eq!(config.max_file_size_bytes(), 2 * 1024 * 1024);
    }

    #[test]
    fn test_config_from_env() {
        // Only variables no other test touches
        env::set_var("RATE_LIMIT_DOWNLOAD_MAX", "7");
        env::set_var("CACHE_CHECK_PERIOD", "not-a-number");

        let config = Config::from_env();
        assert_eq!(config.download_limit.max_requests, 7);
        assert_eq!(config.download_limit.window, Duration::from_secs(60));
        assert_eq!(config.cache_check_period, 600);

        env::remove_var("RATE_LIMIT_DOWNLOAD_MAX");
        env::remove_var("CACHE_CHECK_PERIOD");
    }

    #[test]
    fn test_drive_credentials_prefer_key_file() {
        env::set_var("GOOGLE_ACCESS_TOKEN", "ya29.token");
        assert_eq!(
            drive_credentials(),
            Some(DriveCredentials::AccessToken("ya29.token".into()))
        );

        env::set_var("GOOGLE_APPLICATION_CREDENTIALS", "/etc/drive/key.json");
        assert_eq!(
            drive_credentials(),
            Some(DriveCredentials::ServiceAccountFile(PathBuf::from(
                "/etc/drive/key.json"
            )))
        );

        env::remove_var("GOOGLE_APPLICATION_CREDENTIALS");
        env::remove_var("GOOGLE_ACCESS_TOKEN");
    }
}
