//! HTTP server for Strata.
//!
//! Exposes the object store as a small REST API (create, read, update,
//! delete by identifier) and lets operators start, stop and watch the
//! background rebalancing job.

pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{AppState, HealthResponse};
pub use router::build_router;
pub use server::StrataServer;
