//! Call registry and the asynchronous reaper.
//!
//! Workers never mutate call state directly. They submit deferred
//! [`RegistryTask`]s over a channel, and a single reaper task applies
//! them between timed sweeps. This keeps the registry free of locks on
//! the request path and guarantees at most one RTP stop signal per call
//! lifecycle: an entry must still be present in `meta` for any path to
//! emit one, and every path removes the entry in the same breath.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use siprec_rtp_control::RtpClient;

/// Default bound on tracked call history.
pub const DEFAULT_HISTORY_CAP: usize = (0xffff - 6000) / 2;

/// Why the reaper released a call's engine resources; log flavor only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Revoked,
    Expired,
    Evicted,
}

/// The lifecycle state a call was last seen in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Invite,
    Bye,
}

/// Per-call metadata, keyed by Call-ID in the registry.
#[derive(Debug, Clone)]
pub struct CallEntry {
    /// Context tag of the request that registered the call.
    pub tag: String,
    pub state: CallState,
    pub created_at: Instant,
    pub expires_at: Instant,
}

/// A deferred mutation, produced by workers and consumed by the reaper.
#[derive(Debug)]
pub enum RegistryTask {
    Register {
        call_id: String,
        tag: String,
        expires_at: Instant,
    },
    Revoke {
        call_id: String,
    },
}

/// The worker-facing handle: task submission plus a read-only view.
///
/// The `meta` map is shared for membership checks (duplicate-INVITE
/// suppression); only the reaper writes to it.
#[derive(Debug, Clone)]
pub struct RegistryHandle {
    tasks: mpsc::UnboundedSender<RegistryTask>,
    meta: Arc<DashMap<String, CallEntry>>,
    count: Arc<AtomicU64>,
}

impl RegistryHandle {
    /// Whether a call is currently registered.
    pub fn contains(&self, call_id: &str) -> bool {
        self.meta.contains_key(call_id)
    }

    /// Submit a deferred registration. Idempotent by Call-ID.
    pub fn register(&self, call_id: &str, tag: &str, expires_at: Instant) {
        let _ = self.tasks.send(RegistryTask::Register {
            call_id: call_id.to_string(),
            tag: tag.to_string(),
            expires_at,
        });
    }

    /// Submit a deferred teardown; the reaper emits the RTP stop signal.
    pub fn revoke(&self, call_id: &str) {
        let _ = self.tasks.send(RegistryTask::Revoke {
            call_id: call_id.to_string(),
        });
    }

    /// Calls currently registered.
    pub fn active_calls(&self) -> usize {
        self.meta.len()
    }

    /// Distinct calls seen since startup.
    pub fn total_calls(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

/// The reaper-owned call container: an ordered history queue plus the
/// shared metadata map.
struct CallRegistry {
    /// Call-IDs in registration order, oldest at the head.
    history: VecDeque<String>,
    meta: Arc<DashMap<String, CallEntry>>,
    count: Arc<AtomicU64>,
    capacity: usize,
}

impl CallRegistry {
    fn new(capacity: usize) -> Self {
        Self {
            history: VecDeque::new(),
            meta: Arc::new(DashMap::new()),
            count: Arc::new(AtomicU64::new(0)),
            capacity: capacity.max(1),
        }
    }

    /// Register a call. Re-registration of a live Call-ID is a no-op.
    /// Returns the Call-IDs force-evicted to keep history under its cap.
    fn register(&mut self, call_id: String, tag: String, expires_at: Instant) -> Vec<String> {
        if self.meta.contains_key(&call_id) {
            return Vec::new();
        }
        let mut evicted = Vec::new();
        while self.history.len() >= self.capacity {
            if let Some(oldest) = self.history.pop_front() {
                if self.meta.remove(&oldest).is_some() {
                    evicted.push(oldest);
                }
            }
        }
        self.history.push_back(call_id.clone());
        self.meta.insert(
            call_id,
            CallEntry {
                tag,
                state: CallState::Invite,
                created_at: Instant::now(),
                expires_at,
            },
        );
        self.count.fetch_add(1, Ordering::Relaxed);
        evicted
    }

    /// Remove a call from metadata. The history entry is cleaned up
    /// lazily by the next sweep. Returns whether the call was live.
    fn revoke(&mut self, call_id: &str) -> bool {
        // mark the terminal state before the entry goes away.
        if let Some(mut entry) = self.meta.get_mut(call_id) {
            entry.state = CallState::Bye;
        }
        self.meta.remove(call_id).is_some()
    }

    /// Walk history from the head and collect expired calls.
    ///
    /// History is registration-ordered and lifetimes are uniform, so the
    /// walk stops at the first live, unexpired entry. Expiry is strict:
    /// an entry whose deadline equals `now` survives this sweep.
    fn sweep(&mut self, now: Instant) -> Vec<String> {
        let mut expired = Vec::new();
        while let Some(call_id) = self.history.front() {
            match self.meta.get(call_id).map(|entry| entry.expires_at) {
                // revoked earlier; drop the stale history entry.
                None => {
                    self.history.pop_front();
                }
                Some(expires_at) if now > expires_at => {
                    if let Some(call_id) = self.history.pop_front() {
                        self.meta.remove(&call_id);
                        expired.push(call_id);
                    }
                }
                Some(_) => break,
            }
        }
        expired
    }
}

/// The background task that owns all registry mutation.
pub struct Reaper {
    registry: CallRegistry,
    tasks: mpsc::UnboundedReceiver<RegistryTask>,
    rtp: Arc<RtpClient>,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl Reaper {
    /// Spawn the reaper; returns the worker-facing handle.
    pub fn spawn(
        rtp: Arc<RtpClient>,
        interval: Duration,
        capacity: usize,
        shutdown: watch::Receiver<bool>,
    ) -> (RegistryHandle, JoinHandle<()>) {
        let (tasks_tx, tasks_rx) = mpsc::unbounded_channel();
        let registry = CallRegistry::new(capacity);
        let handle = RegistryHandle {
            tasks: tasks_tx,
            meta: registry.meta.clone(),
            count: registry.count.clone(),
        };
        let reaper = Reaper {
            registry,
            tasks: tasks_rx,
            rtp,
            interval,
            shutdown,
        };
        info!("call registry initialized (history cap {})", capacity);
        (handle, tokio::spawn(reaper.run()))
    }

    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.collect().await;
                }
                _ = self.shutdown.changed() => {
                    // one final sweep so queued teardowns still reach
                    // the engines.
                    self.collect().await;
                    break;
                }
            }
        }
        debug!("reaper terminated");
    }

    /// Drain deferred tasks, then sweep for expired calls.
    async fn collect(&mut self) {
        let mut stops: Vec<(String, StopReason)> = Vec::new();

        while let Ok(task) = self.tasks.try_recv() {
            match task {
                RegistryTask::Register {
                    call_id,
                    tag,
                    expires_at,
                } => {
                    for evicted in self.registry.register(call_id, tag, expires_at) {
                        stops.push((evicted, StopReason::Evicted));
                    }
                }
                RegistryTask::Revoke { call_id } => {
                    if self.registry.revoke(&call_id) {
                        stops.push((call_id, StopReason::Revoked));
                    }
                }
            }
        }

        for call_id in self.registry.sweep(Instant::now()) {
            stops.push((call_id, StopReason::Expired));
        }

        if stops.is_empty() {
            return;
        }
        for (call_id, reason) in &stops {
            debug!("<gc> releasing call '{}' ({:?})", call_id, reason);
            self.rtp.stop("reaper", call_id).await;
        }
        debug!(
            "<gc> collected {} call(s); {} active, {} total",
            stops.len(),
            self.registry.meta.len(),
            self.registry.count.load(Ordering::Relaxed)
        );
    }
}
