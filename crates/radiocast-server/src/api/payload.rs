//! JSON wire shapes for calls.
//!
//! The same upload shape is accepted by the ingest endpoint and emitted
//! by the downstream push, so paired radiocast instances can relay to
//! each other. Audio travels base64-encoded.

use serde::{Deserialize, Serialize};

use radiocast_core::call::Call;
use radiocast_core::encoding::{base64_decode, base64_encode};

use crate::storage::{CallRow, NewCall};

/// Inbound call on the upload endpoint; also the outbound downstream
/// push body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallUpload {
    /// Shared ingest secret.
    pub key: String,
    pub system: u32,
    pub talkgroup: u32,
    pub timestamp_ms: i64,
    /// Base64 audio payload.
    pub audio: String,
    pub audio_mime: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub units: Vec<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patches: Vec<u32>,
}

impl CallUpload {
    pub fn from_call(call: &Call, key: &str) -> Self {
        Self {
            key: key.to_string(),
            system: call.system_ref,
            talkgroup: call.talkgroup_ref,
            timestamp_ms: call.timestamp_ms,
            audio: base64_encode(&call.audio),
            audio_mime: call.audio_mime.clone(),
            frequency: call.frequency,
            units: call.units.clone(),
            patches: call.patches.clone(),
        }
    }

    /// Decode into the storage-facing record. Fails on invalid base64.
    pub fn into_new_call(self) -> Result<NewCall, String> {
        let audio = base64_decode(&self.audio)?;
        Ok(NewCall {
            system_ref: self.system,
            talkgroup_ref: self.talkgroup,
            timestamp_ms: self.timestamp_ms,
            audio,
            audio_mime: self.audio_mime,
            frequency: self.frequency,
            units: self.units,
            patches: self.patches,
        })
    }
}

/// Outbound call shape for direct fetches and listener frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallJson {
    pub id: i64,
    pub system: u32,
    pub talkgroup: u32,
    pub timestamp_ms: i64,
    pub audio: String,
    pub audio_mime: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub units: Vec<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patches: Vec<u32>,
}

impl CallJson {
    pub fn from_call(call: &Call) -> Self {
        Self {
            id: call.id,
            system: call.system_ref,
            talkgroup: call.talkgroup_ref,
            timestamp_ms: call.timestamp_ms,
            audio: base64_encode(&call.audio),
            audio_mime: call.audio_mime.clone(),
            frequency: call.frequency,
            units: call.units.clone(),
            patches: call.patches.clone(),
        }
    }

    pub fn from_row(row: CallRow) -> Self {
        Self::from_call(&row.into_call())
    }
}

/// Search-listing entry: routing metadata without the audio payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSummary {
    pub id: i64,
    pub system: u32,
    pub talkgroup: u32,
    pub timestamp_ms: i64,
    pub audio_mime: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<u64>,
}

impl CallSummary {
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    pub fn from_row(row: &CallRow) -> Self {
        let (system, talkgroup) = row.route();
        Self {
            id: row.id,
            system,
            talkgroup,
            timestamp_ms: row.timestamp_ms,
            audio_mime: row.audio_mime.clone(),
            frequency: row.frequency.map(|f| f as u64),
        }
    }
}
