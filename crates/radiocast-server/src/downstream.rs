//! Outbound relay to downstream servers.
//!
//! Every configured, non-disabled downstream whose scope admits a call
//! receives a copy via an HTTP POST to its call-upload endpoint. Each
//! push runs in its own task so a slow or broken downstream never
//! delays delivery to other downstreams or to local listeners.
//! Delivery is best-effort at-most-once: failures are logged with the
//! downstream URL and call identity, and there is no retry queue.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use radiocast_core::access::AccessScope;
use radiocast_core::call::Call;
use radiocast_core::config::DownstreamConfig;

use crate::api::payload::CallUpload;

/// One configured relay target.
pub struct Downstream {
    pub url: String,
    /// Shared secret presented to the remote call-upload endpoint.
    api_key: String,
    pub scope: AccessScope,
    pub disabled: bool,
}

impl From<&DownstreamConfig> for Downstream {
    fn from(config: &DownstreamConfig) -> Self {
        Self {
            url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            scope: config.access.clone(),
            disabled: config.disabled,
        }
    }
}

/// Push errors for a single downstream delivery.
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("remote rejected call: status {0}")]
    Rejected(reqwest::StatusCode),
}

/// The set of configured relay targets.
pub struct DownstreamRegistry {
    targets: RwLock<Vec<Arc<Downstream>>>,
    http: reqwest::Client,
}

impl DownstreamRegistry {
    pub fn new(configs: &[DownstreamConfig]) -> Self {
        // reqwest is built with rustls-no-provider; a process-wide
        // crypto provider must be installed before the first TLS push.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let targets = configs.iter().map(|c| Arc::new(Downstream::from(c))).collect();
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            targets: RwLock::new(targets),
            http,
        }
    }

    pub async fn target_count(&self) -> usize {
        self.targets.read().await.len()
    }

    /// The enabled downstreams whose scope admits this call.
    pub async fn eligible(&self, call: &Call) -> Vec<Arc<Downstream>> {
        self.targets
            .read()
            .await
            .iter()
            .filter(|d| {
                !d.disabled && d.scope.has_talkgroup_access(call.system_ref, call.talkgroup_ref)
            })
            .cloned()
            .collect()
    }

    /// Fan a released call out to every eligible downstream, each in
    /// its own task.
    pub async fn send(&self, call: &Arc<Call>) {
        for downstream in self.eligible(call).await {
            let http = self.http.clone();
            let call = Arc::clone(call);
            tokio::spawn(async move {
                match push_call(&http, &downstream, &call).await {
                    Ok(()) => {
                        debug!(url = %downstream.url, call_id = call.id, "call relayed downstream");
                    }
                    Err(e) => {
                        warn!(url = %downstream.url, call_id = call.id, error = %e, "downstream push failed");
                    }
                }
            });
        }
    }
}

async fn push_call(
    http: &reqwest::Client,
    downstream: &Downstream,
    call: &Call,
) -> Result<(), PushError> {
    let body = CallUpload::from_call(call, &downstream.api_key);
    let response = http
        .post(format!("{}/api/call-upload", downstream.url))
        .json(&body)
        .send()
        .await?;

    if response.status().is_success() {
        Ok(())
    } else {
        Err(PushError::Rejected(response.status()))
    }
}
