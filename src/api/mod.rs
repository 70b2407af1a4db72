//! HTTP API.
//!
//! Routes are nested under `/api/`: upload, calculate and health. The
//! router is composable; `api_router()` returns a `Router` that can be
//! mounted on any axum server.

pub mod endpoints;
pub mod error;
pub mod middleware;
pub mod router;
pub mod server;
pub mod types;

pub use router::api_router;
pub use server::{serve, start_server_on, ApiServer};
pub use types::ApiContext;
