//! The call data model.
//!
//! A [`Call`] is one decoded radio transmission: routing identity
//! (system/talkgroup references), the original wall-clock timestamp,
//! the audio payload, and optional radio metadata. Calls are immutable
//! after ingestion and shared as `Arc<Call>`; the only mutable field is
//! the `delayed` re-entrancy guard owned by the delayer.

use std::sync::atomic::{AtomicBool, Ordering};

/// Storage identity of an ingested call (SQLite rowid).
pub type CallId = i64;

/// One ingested radio transmission.
#[derive(Debug)]
pub struct Call {
    pub id: CallId,
    /// External radio-network system reference.
    pub system_ref: u32,
    /// External radio-network talkgroup reference.
    pub talkgroup_ref: u32,
    /// Wall clock of the original transmission, milliseconds since epoch.
    pub timestamp_ms: i64,
    pub audio: Vec<u8>,
    pub audio_mime: String,
    /// Transmission frequency in Hz, when the source reported one.
    pub frequency: Option<u64>,
    /// Unit (radio) identifiers heard on the call.
    pub units: Vec<u32>,
    /// Talkgroups patched into this transmission.
    pub patches: Vec<u32>,
    /// Set while a global release timer is armed for this call. Guards
    /// against re-scheduling when release logic re-enters distribution.
    delayed: AtomicBool,
}

impl Call {
    pub fn new(
        id: CallId,
        system_ref: u32,
        talkgroup_ref: u32,
        timestamp_ms: i64,
        audio: Vec<u8>,
        audio_mime: String,
    ) -> Self {
        Self {
            id,
            system_ref,
            talkgroup_ref,
            timestamp_ms,
            audio,
            audio_mime,
            frequency: None,
            units: Vec::new(),
            patches: Vec::new(),
            delayed: AtomicBool::new(false),
        }
    }

    /// Whether a global release timer is currently armed for this call.
    pub fn is_delayed(&self) -> bool {
        self.delayed.load(Ordering::SeqCst)
    }

    /// Atomically mark the call delayed, returning the previous value.
    ///
    /// A `true` return means a timer is already armed and the caller
    /// must not schedule another one.
    pub fn mark_delayed(&self) -> bool {
        self.delayed.swap(true, Ordering::SeqCst)
    }

    /// Clear the delayed flag once the release timer has fired.
    pub fn clear_delayed(&self) {
        self.delayed.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delayed_flag_guards_reentry() {
        let call = Call::new(1, 5, 101, 1_700_000_000_000, vec![0u8; 4], "audio/mpeg".into());
        assert!(!call.is_delayed());
        assert!(!call.mark_delayed());
        // Second mark observes the armed state.
        assert!(call.mark_delayed());
        call.clear_delayed();
        assert!(!call.is_delayed());
    }
}
