//! The compliance-delay engine.
//!
//! Per call the state machine is `Fresh -> Released` (no delay) or
//! `Fresh -> Scheduled -> Released`. A scheduled call has exactly one
//! armed in-process timer and exactly one durable row in
//! `delayed_calls`; both are created and removed together, and the
//! durable row is replayed by [`Delayer::start`] after a restart so a
//! delayed call is neither lost nor released early. The `delayed` flag
//! on the call makes scheduling re-entrant-proof.
//!
//! Per-client secondary timers (a listener's own override) are armed by
//! [`Delayer::delay_for_client`]; they are never persisted and end in a
//! single non-blocking send on that client's channel.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use radiocast_core::call::{Call, CallId};
use radiocast_core::config::Config;
use radiocast_core::db::unix_millis;
use radiocast_core::delay::effective_delay;

use crate::clients::{Client, ClientRegistry};
use crate::downstream::DownstreamRegistry;
use crate::storage::{Database, DatabaseError};

const MILLIS_PER_MINUTE: i64 = 60_000;

/// Wall-clock source, abstracted so delay expiry is computable in tests.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> i64;
}

/// The real wall clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        unix_millis()
    }
}

/// Owns the release timers and the durable pending-release store.
pub struct Delayer {
    db: Database,
    config: Arc<Config>,
    clients: Arc<ClientRegistry>,
    downstreams: Arc<DownstreamRegistry>,
    clock: Arc<dyn Clock>,
    /// Calls with an armed global timer. Private bookkeeping; the
    /// durable table remains the source of truth across restarts.
    timers: Mutex<HashSet<CallId>>,
}

impl Delayer {
    pub fn new(
        db: Database,
        config: Arc<Config>,
        clients: Arc<ClientRegistry>,
        downstreams: Arc<DownstreamRegistry>,
    ) -> Self {
        Self::with_clock(db, config, clients, downstreams, Arc::new(SystemClock))
    }

    pub fn with_clock(
        db: Database,
        config: Arc<Config>,
        clients: Arc<ClientRegistry>,
        downstreams: Arc<DownstreamRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            db,
            config,
            clients,
            downstreams,
            clock,
            timers: Mutex::new(HashSet::new()),
        }
    }

    /// Decide whether a freshly ingested call is released now or
    /// scheduled for later, and act on it. A call whose timer is
    /// already armed is left alone.
    pub async fn delay(self: &Arc<Self>, call: Arc<Call>) {
        if call.is_delayed() {
            debug!(call_id = call.id, "call already scheduled, ignoring");
            return;
        }

        let mut minutes = self.config.baseline_for(call.system_ref, call.talkgroup_ref);
        if self.config.delay.authenticated_mode && minutes > 0 {
            minutes = minutes.min(self.connected_minimum(&call).await);
        }

        let release_at = call.timestamp_ms + i64::from(minutes) * MILLIS_PER_MINUTE;
        if minutes == 0 || release_at <= self.clock.now_ms() {
            self.release(call).await;
        } else {
            self.schedule_at(call, release_at).await;
        }
    }

    /// The minimum delay contributed by currently connected clients
    /// with access to the call. An unauthenticated client contributes
    /// zero; an authenticated one contributes its own resolved delay
    /// (no fallback to the baseline). One zero collapses the global
    /// delay for this call.
    async fn connected_minimum(&self, call: &Call) -> u32 {
        let mut minimum = u32::MAX;
        for client in self.clients.clients().await {
            if !client
                .scope
                .has_talkgroup_access(call.system_ref, call.talkgroup_ref)
            {
                continue;
            }
            let contributed = match &client.user {
                None => 0,
                Some(user) => {
                    let overrides = self.config.overrides_for(user);
                    effective_delay(call, Some(&overrides), 0)
                }
            };
            minimum = minimum.min(contributed);
            if minimum == 0 {
                break;
            }
        }
        minimum
    }

    /// Arm a global release timer and persist the pending row.
    ///
    /// A durable push failure releases the call immediately (fail-open,
    /// availability over compliance) unless `strict_persistence` is
    /// set, in which case the in-memory timer stays armed and the call
    /// may be lost on a crash but is never released early.
    async fn schedule_at(self: &Arc<Self>, call: Arc<Call>, release_at_ms: i64) {
        if call.mark_delayed() {
            debug!(call_id = call.id, "release timer already armed");
            return;
        }

        if let Err(e) = self.db.push_pending(call.id, release_at_ms).await {
            if self.config.delay.strict_persistence {
                error!(
                    call_id = call.id,
                    error = %e,
                    "failed to persist delayed call; keeping unpersisted timer armed (strict mode)"
                );
            } else {
                warn!(
                    call_id = call.id,
                    error = %e,
                    "failed to persist delayed call; releasing immediately"
                );
                call.clear_delayed();
                self.release(call).await;
                return;
            }
        }

        self.timers.lock().await.insert(call.id);

        let remaining = u64::try_from(release_at_ms - self.clock.now_ms()).unwrap_or(0);
        info!(
            call_id = call.id,
            release_at_ms,
            remaining_ms = remaining,
            "call release scheduled"
        );

        let delayer = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(remaining)).await;
            delayer.timers.lock().await.remove(&call.id);
            if let Err(e) = delayer.db.pop_pending(call.id).await {
                warn!(call_id = call.id, error = %e, "failed to remove pending release row");
            }
            call.clear_delayed();
            delayer.release(call).await;
        });
    }

    /// Apply a listener's own delay to a released call: deliver now if
    /// the listener's target time has passed, otherwise arm an
    /// independent, unpersisted per-client timer.
    pub async fn delay_for_client(&self, call: Arc<Call>, client: Arc<Client>) {
        let minutes = match &client.user {
            None => 0,
            Some(user) => {
                let overrides = self.config.overrides_for(user);
                effective_delay(&call, Some(&overrides), 0)
            }
        };

        let target_ms = call.timestamp_ms + i64::from(minutes) * MILLIS_PER_MINUTE;
        let now = self.clock.now_ms();
        if target_ms <= now {
            client.try_deliver(&call);
            return;
        }

        let remaining = u64::try_from(target_ms - now).unwrap_or(0);
        debug!(
            call_id = call.id,
            client_id = %client.id,
            remaining_ms = remaining,
            "per-client release scheduled"
        );
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(remaining)).await;
            client.try_deliver(&call);
        });
    }

    /// Replay the durable pending table after a restart: load and clear
    /// it in one step, release everything past due, re-arm everything
    /// else at its original release time. Returns the number of durable
    /// rows found, including rows dropped for missing calls.
    pub async fn start(self: &Arc<Self>) -> Result<usize, DatabaseError> {
        let pending = self.db.take_all_pending().await?;
        let count = pending.len();
        if count > 0 {
            info!(count, "replaying pending delayed calls");
        }

        for row in pending {
            let Some(call_row) = self.db.get_call(row.call_id).await? else {
                warn!(call_id = row.call_id, "pending delayed call missing from storage, dropping");
                continue;
            };
            let call = Arc::new(call_row.into_call());
            if call.is_delayed() {
                // Cannot happen on a cold start, guarded anyway so a
                // second replay never double-arms a timer.
                continue;
            }
            if row.release_at_ms <= self.clock.now_ms() {
                info!(call_id = call.id, "pending delayed call past due, releasing");
                self.release(call).await;
            } else {
                self.schedule_at(call, row.release_at_ms).await;
            }
        }

        Ok(count)
    }

    /// Whether the call is still held back by its compliance delay.
    /// Every read path (fetch by id, search, playback) must treat
    /// `true` as a hard deny.
    ///
    /// Consults the in-memory timer set before the durable table so an
    /// armed timer whose row could not be persisted (strict mode) still
    /// gates reads.
    pub async fn is_call_delayed(&self, call_id: CallId) -> Result<bool, DatabaseError> {
        if self.timers.lock().await.contains(&call_id) {
            return Ok(true);
        }
        self.db.is_pending(call_id).await
    }

    /// Fan a released call out to downstream relays and connected
    /// listeners. Both fan-outs isolate per-recipient failures.
    async fn release(self: &Arc<Self>, call: Arc<Call>) {
        debug!(
            call_id = call.id,
            system = call.system_ref,
            talkgroup = call.talkgroup_ref,
            "releasing call"
        );
        self.downstreams.send(&call).await;
        self.clients.emit_call(&call, self).await;
    }
}
