//! Radiocast server: ingest, delay, and fan-out of radio calls.
//!
//! Calls arrive over HTTP, land in SQLite, and pass through the
//! [`delayer::Delayer`] before reaching connected listeners and
//! downstream instances. Scheduled releases survive restarts via the
//! `delayed_calls` table, replayed by [`delayer::Delayer::start`].

pub mod api;
pub mod clients;
pub mod controller;
pub mod delayer;
pub mod downstream;
pub mod storage;
