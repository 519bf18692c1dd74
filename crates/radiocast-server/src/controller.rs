//! The distribution orchestrator.
//!
//! Receives freshly ingested calls, persists them, and drives the
//! delayer, which in turn fans released calls out to the client and
//! downstream registries. Read paths go through here too so that the
//! access-scope check and the delayed-call gate are applied uniformly.

use std::sync::Arc;

use tracing::info;

use radiocast_core::access::AccessScope;
use radiocast_core::call::CallId;
use radiocast_core::config::Config;

use crate::clients::ClientRegistry;
use crate::delayer::Delayer;
use crate::downstream::DownstreamRegistry;
use crate::storage::{CallRow, Database, DatabaseError, NewCall};

/// Result of a scope- and delay-gated call lookup.
#[derive(Debug)]
pub enum CallFetch {
    /// Unknown id, or the requester's scope does not admit the call
    /// (deliberately indistinguishable).
    NotFound,
    /// The call exists but its compliance delay has not elapsed.
    Delayed,
    Ready(CallRow),
}

/// Wires storage, policy, and the three distribution components.
pub struct Controller {
    pub db: Database,
    pub config: Arc<Config>,
    pub clients: Arc<ClientRegistry>,
    pub downstreams: Arc<DownstreamRegistry>,
    pub delayer: Arc<Delayer>,
}

impl Controller {
    pub fn new(db: Database, config: Arc<Config>) -> Self {
        let clients = Arc::new(ClientRegistry::new());
        let downstreams = Arc::new(DownstreamRegistry::new(&config.downstreams));
        let delayer = Arc::new(Delayer::new(
            db.clone(),
            Arc::clone(&config),
            Arc::clone(&clients),
            Arc::clone(&downstreams),
        ));
        Self {
            db,
            config,
            clients,
            downstreams,
            delayer,
        }
    }

    /// Persist an ingested call and hand it to the delay engine, which
    /// either releases it synchronously or schedules it.
    pub async fn ingest(&self, new_call: NewCall) -> Result<CallId, DatabaseError> {
        let id = self.db.insert_call(&new_call).await?;
        info!(
            call_id = id,
            system = new_call.system_ref,
            talkgroup = new_call.talkgroup_ref,
            "call ingested"
        );
        let call = Arc::new(new_call.into_call(id));
        self.delayer.delay(call).await;
        Ok(id)
    }

    /// Fetch a call by id for the given requester scope. Scope misses
    /// read as not-found; a pending delay is a hard deny with its own
    /// signal so callers can explain the wait.
    pub async fn call_by_id(
        &self,
        id: CallId,
        scope: &AccessScope,
    ) -> Result<CallFetch, DatabaseError> {
        let Some(row) = self.db.get_call(id).await? else {
            return Ok(CallFetch::NotFound);
        };

        let (system, talkgroup) = row.route();
        if !scope.has_talkgroup_access(system, talkgroup) {
            return Ok(CallFetch::NotFound);
        }

        if self.delayer.is_call_delayed(id).await? {
            return Ok(CallFetch::Delayed);
        }

        Ok(CallFetch::Ready(row))
    }

    /// List calls visible to the requester scope, excluding everything
    /// still held back by a compliance delay.
    pub async fn search(
        &self,
        scope: &AccessScope,
        system_ref: Option<u32>,
        talkgroup_ref: Option<u32>,
        limit: i64,
    ) -> Result<Vec<CallRow>, DatabaseError> {
        let rows = self.db.search_calls(system_ref, talkgroup_ref, limit).await?;

        let mut visible = Vec::with_capacity(rows.len());
        for row in rows {
            let (system, talkgroup) = row.route();
            if !scope.has_talkgroup_access(system, talkgroup) {
                continue;
            }
            if self.delayer.is_call_delayed(row.id).await? {
                continue;
            }
            visible.push(row);
        }
        Ok(visible)
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    use radiocast_core::db::unix_millis;

    fn new_call(system: u32, talkgroup: u32, timestamp_ms: i64) -> NewCall {
        NewCall {
            system_ref: system,
            talkgroup_ref: talkgroup,
            timestamp_ms,
            audio: vec![7u8; 32],
            audio_mime: "audio/mpeg".to_string(),
            frequency: None,
            units: Vec::new(),
            patches: Vec::new(),
        }
    }

    async fn controller(config_json: &str) -> Controller {
        let db = Database::open_in_memory().await.unwrap();
        let config: Arc<Config> = Arc::new(serde_json::from_str(config_json).unwrap());
        Controller::new(db, config)
    }

    #[tokio::test]
    async fn ingest_without_delay_is_immediately_fetchable() {
        let ctl = controller("{}").await;
        let id = ctl.ingest(new_call(5, 101, unix_millis())).await.unwrap();

        let fetch = ctl.call_by_id(id, &AccessScope::Unrestricted).await.unwrap();
        assert!(matches!(fetch, CallFetch::Ready(row) if row.id == id));
    }

    #[tokio::test]
    async fn delayed_call_is_denied_on_every_read_path() {
        let ctl = controller(
            r#"{ "systems": [{ "ref_id": 5, "talkgroups": [{ "ref_id": 101, "delay": 5 }] }] }"#,
        )
        .await;
        let id = ctl.ingest(new_call(5, 101, unix_millis())).await.unwrap();

        let fetch = ctl.call_by_id(id, &AccessScope::Unrestricted).await.unwrap();
        assert!(matches!(fetch, CallFetch::Delayed));

        let listed = ctl
            .search(&AccessScope::Unrestricted, None, None, 100)
            .await
            .unwrap();
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn scope_miss_reads_as_not_found() {
        let ctl = controller("{}").await;
        let id = ctl.ingest(new_call(5, 101, unix_millis())).await.unwrap();

        let scope: AccessScope = serde_json::from_str("[7]").unwrap();
        let fetch = ctl.call_by_id(id, &scope).await.unwrap();
        assert!(matches!(fetch, CallFetch::NotFound));

        assert!(ctl.search(&scope, None, None, 100).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_id_reads_as_not_found() {
        let ctl = controller("{}").await;
        let fetch = ctl.call_by_id(999, &AccessScope::Unrestricted).await.unwrap();
        assert!(matches!(fetch, CallFetch::NotFound));
    }

    #[tokio::test]
    async fn search_applies_scope_per_row() {
        let ctl = controller("{}").await;
        let now = unix_millis();
        ctl.ingest(new_call(5, 101, now)).await.unwrap();
        ctl.ingest(new_call(7, 201, now + 1)).await.unwrap();

        let scope: AccessScope = serde_json::from_str(r#"[{ "id": 5 }]"#).unwrap();
        let listed = ctl.search(&scope, None, None, 100).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].system_ref, 5);
    }
}
