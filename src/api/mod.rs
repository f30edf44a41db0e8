//! API Module
//!
//! HTTP handlers, shared state and routing for the CDN REST API.

pub mod handlers;
pub mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
