use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use prometheus::{register_int_gauge_with_registry, IntGauge, Registry};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

const MET_ACTIVE_NAME: &str = "consumer_sessions_active";
const MET_ACTIVE_HELP: &str = "Consumption sessions currently running";

/// A running consumption session, as stored in the [`ConsumerRegistry`].
#[derive(Debug)]
struct ConsumerSession {
    topic: String,
    mode: String,
    started_at: DateTime<Utc>,
    generation: u64,
    cancel: CancellationToken,
}

/// Public view of a session held by the [`ConsumerRegistry`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub topic: String,
    pub mode: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct SessionTable {
    sessions: HashMap<String, ConsumerSession>,
    next_generation: u64,
}

/// Keeps track of the live consumption sessions, each with the [`CancellationToken`] that stops it.
///
/// Every operation takes the same lock, and holds it only to touch the table:
/// cancelling a session just signals it, and never waits for it to wind down.
#[derive(Debug)]
pub struct ConsumerRegistry {
    table: Mutex<SessionTable>,

    // Prometheus Metrics
    metric_active: IntGauge,
}

impl ConsumerRegistry {
    pub fn new(metrics: Arc<Registry>) -> Self {
        Self {
            table: Mutex::new(SessionTable::default()),
            metric_active: register_int_gauge_with_registry!(
                MET_ACTIVE_NAME,
                MET_ACTIVE_HELP,
                metrics
            )
            .unwrap_or_else(|e| panic!("Failed to create metric '{MET_ACTIVE_NAME}': {e}")),
        }
    }

    /// Store a session, overwriting any previous entry for the same `id`.
    ///
    /// The overwritten session (if any) is _not_ cancelled.
    /// Returns the generation of the stored entry: see [`Self::retire`].
    ///
    /// # Arguments
    ///
    /// * `id` - Session identifier
    /// * `topic` - Topic consumed by the session
    /// * `mode` - Human readable description of how the session consumes
    /// * `cancel` - Token that stops the session, once cancelled
    #[allow(dead_code)]
    pub async fn add(&self, id: &str, topic: &str, mode: &str, cancel: CancellationToken) -> u64 {
        let mut guard = self.table.lock().await;

        if guard.sessions.contains_key(id) {
            warn!("Session '{id}' overwritten: the previous one is no longer tracked");
        }
        self.insert(&mut guard, id, topic, mode, cancel)
    }

    /// Store a session, unless one with the same `id` is already there.
    ///
    /// Check and insertion happen under the same lock: of many concurrent calls for the same `id`,
    /// only one stores its session.
    /// Returns the generation of the stored entry, or `None` if nothing was stored.
    pub async fn add_if_absent(
        &self,
        id: &str,
        topic: &str,
        mode: &str,
        cancel: CancellationToken,
    ) -> Option<u64> {
        let mut guard = self.table.lock().await;

        if guard.sessions.contains_key(id) {
            return None;
        }
        Some(self.insert(&mut guard, id, topic, mode, cancel))
    }

    fn insert(
        &self,
        table: &mut SessionTable,
        id: &str,
        topic: &str,
        mode: &str,
        cancel: CancellationToken,
    ) -> u64 {
        let generation = table.next_generation;
        table.next_generation += 1;

        table.sessions.insert(
            id.to_string(),
            ConsumerSession {
                topic: topic.to_string(),
                mode: mode.to_string(),
                started_at: Utc::now(),
                generation,
                cancel,
            },
        );

        self.metric_active.set(table.sessions.len() as i64);
        debug!("Added session '{id}' consuming '{topic}' ({mode})");
        generation
    }

    /// Cancel and forget a session.
    ///
    /// Returns `false` if no session with the given `id` exists.
    pub async fn remove(&self, id: &str) -> bool {
        let mut guard = self.table.lock().await;

        match guard.sessions.remove(id) {
            Some(session) => {
                session.cancel.cancel();
                self.metric_active.set(guard.sessions.len() as i64);
                info!("Stopped session '{id}'");
                true
            },
            None => false,
        }
    }

    /// Forget a session that terminated on its own, but only if `generation` matches:
    /// a session that was overwritten in the meantime is left in place.
    ///
    /// Returns `true` if the entry was removed.
    pub async fn retire(&self, id: &str, generation: u64) -> bool {
        let mut guard = self.table.lock().await;

        if guard.sessions.get(id).is_some_and(|s| s.generation == generation) {
            if let Some(session) = guard.sessions.remove(id) {
                // Tokens might have children still running: make sure they stop as well
                session.cancel.cancel();
            }
            self.metric_active.set(guard.sessions.len() as i64);
            debug!("Retired session '{id}' (generation {generation})");
            true
        } else {
            false
        }
    }

    /// Cancel every session and empty the registry.
    pub async fn stop_all(&self) {
        let mut guard = self.table.lock().await;

        let count = guard.sessions.len();
        for (_, session) in guard.sessions.drain() {
            session.cancel.cancel();
        }

        self.metric_active.set(0);
        info!("Stopped all {count} sessions");
    }

    /// Returns `true` if a session with the given `id` exists.
    #[allow(dead_code)]
    pub async fn exists(&self, id: &str) -> bool {
        self.table.lock().await.sessions.contains_key(id)
    }

    /// Snapshot of the sessions, ordered by identifier.
    pub async fn list(&self) -> Vec<SessionInfo> {
        let mut res: Vec<SessionInfo> = self
            .table
            .lock()
            .await
            .sessions
            .iter()
            .map(|(id, s)| SessionInfo {
                id: id.clone(),
                topic: s.topic.clone(),
                mode: s.mode.clone(),
                started_at: s.started_at,
            })
            .collect();
        res.sort_by(|a, b| a.id.cmp(&b.id));
        res
    }
}
