//! Data models for Radiocast server storage.

use serde::{Deserialize, Serialize};

use radiocast_core::call::{Call, CallId};

/// A call as handed over by the ingestion pipeline, before it has a
/// storage identity.
#[derive(Debug, Clone)]
pub struct NewCall {
    pub system_ref: u32,
    pub talkgroup_ref: u32,
    pub timestamp_ms: i64,
    pub audio: Vec<u8>,
    pub audio_mime: String,
    pub frequency: Option<u64>,
    pub units: Vec<u32>,
    pub patches: Vec<u32>,
}

impl NewCall {
    /// Materialise the distribution-engine view of this call once
    /// storage has assigned it an identity.
    pub fn into_call(self, id: CallId) -> Call {
        let mut call = Call::new(
            id,
            self.system_ref,
            self.talkgroup_ref,
            self.timestamp_ms,
            self.audio,
            self.audio_mime,
        );
        call.frequency = self.frequency;
        call.units = self.units;
        call.patches = self.patches;
        call
    }
}

/// A stored call row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CallRow {
    pub id: i64,
    pub system_ref: i64,
    pub talkgroup_ref: i64,
    pub timestamp_ms: i64,
    pub audio: Vec<u8>,
    pub audio_mime: String,
    pub frequency: Option<i64>,
    /// JSON array of unit ids.
    pub units: String,
    /// JSON array of patched talkgroup refs.
    pub patches: String,
    pub created_at: i64,
}

impl CallRow {
    /// The call's system and talkgroup references.
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    pub fn route(&self) -> (u32, u32) {
        (self.system_ref as u32, self.talkgroup_ref as u32)
    }

    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    pub fn into_call(self) -> Call {
        let mut call = Call::new(
            self.id,
            self.system_ref as u32,
            self.talkgroup_ref as u32,
            self.timestamp_ms,
            self.audio,
            self.audio_mime,
        );
        call.frequency = self.frequency.map(|f| f as u64);
        call.units = serde_json::from_str(&self.units).unwrap_or_default();
        call.patches = serde_json::from_str(&self.patches).unwrap_or_default();
        call
    }
}

/// One pending delayed release, the engine's only durable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct PendingRelease {
    pub call_id: i64,
    pub release_at_ms: i64,
}
