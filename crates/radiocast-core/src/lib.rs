//! Radiocast Core Library
//!
//! Shared functionality for Radiocast components:
//! - Call data model (one ingested radio transmission)
//! - Access-scope evaluation for systems and talkgroups
//! - Delay-policy resolution (talkgroup/system/group/user hierarchy)
//! - Configuration loading and hierarchy
//! - Common error and database types

pub mod access;
pub mod call;
pub mod config;
pub mod db;
pub mod delay;
pub mod encoding;
pub mod error;
pub mod tracing_init;

pub use access::AccessScope;
pub use call::{Call, CallId};
pub use config::Config;
pub use delay::DelayOverrides;
pub use error::{Error, Result};
