//! Drive CDN - A caching HTTP front for files kept in Google Drive
//!
//! Uploads go to the storage backend; reads are served through an API-key
//! gate, per-class rate limits and an in-process response cache.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod helpers;
pub mod models;
pub mod pipeline;
pub mod storage;
pub mod tasks;

pub use api::AppState;
pub use config::Config;
pub use tasks::spawn_cleanup_task;
