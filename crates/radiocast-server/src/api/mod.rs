//! HTTP/WebSocket surface of the Radiocast server.
//!
//! - `POST /api/call-upload`: call ingestion (shared-secret key)
//! - `GET /api/call/{id}`: direct fetch, scope- and delay-gated
//! - `GET /api/calls`: search listing, scope- and delay-gated
//! - `GET /api/listen`: WebSocket listener feed

pub mod payload;
pub mod routes;
mod ws;

pub use routes::{build_router, AppState};
