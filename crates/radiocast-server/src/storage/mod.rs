//! SQLite storage for the Radiocast server.
//!
//! Persists ingested calls and the pending-delayed-release table. The
//! `delayed_calls` table is the only durable state owned by the
//! distribution engine and is touched exclusively through the queries
//! in this module, on behalf of the delayer.

mod db;
mod models;
mod queries;


pub use db::Database;
pub use models::{CallRow, NewCall, PendingRelease};
pub use radiocast_core::db::DatabaseError;
