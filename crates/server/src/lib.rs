//! HTTP API server for the depot chunked upload service.
//!
//! This crate provides the HTTP surface over `depot-uploads`:
//! - Upload session creation, status and abandonment
//! - Chunk upload with `Content-Range` positioning
//! - Commit with whole-file digest verification
//! - Artifact download
//! - Prometheus metrics and the background session sweeper

pub mod error;
pub mod handlers;
pub mod metrics;
pub mod routes;
pub mod state;
pub mod sweeper;

pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
pub use sweeper::spawn_session_sweeper;
