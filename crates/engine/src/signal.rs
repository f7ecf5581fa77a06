// SPDX-License-Identifier: MIT

//! Signal poller: the engine's half of the cross-process control channel. The CLI's
//! `pause`/`resume`/`cancel` commands enqueue a row in `session_signals` and exit; a
//! running engine drains that queue on its own cadence and turns each row into an
//! `Event` on the bus. Polling errors (including the table not existing yet, for an
//! engine started against a database a step behind the CLI's migrations) are logged
//! and swallowed rather than killing the poll loop — a dropped signal just gets
//! picked up on the next tick once the operator retries.

use std::sync::Arc;
use std::time::Duration;

use substrate_core::{Clock, Event, SessionId, SignalKind, SystemClock};
use substrate_storage::{signals, StoreError};

use crate::bus::EventBus;
use crate::error::EngineError;

/// Cadence the spec calls for between drains of `session_signals`.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

pub struct SignalPoller {
    store: Arc<parking_lot::Mutex<substrate_storage::Store>>,
    session_id: SessionId,
    bus: Arc<EventBus>,
}

impl SignalPoller {
    pub fn new(
        store: Arc<parking_lot::Mutex<substrate_storage::Store>>,
        session_id: SessionId,
        bus: Arc<EventBus>,
    ) -> Self {
        Self { store, session_id, bus }
    }

    /// Drain every unprocessed signal for this session, oldest first, emitting the
    /// matching bus event for each and marking it processed in the same pass. Returns
    /// the kinds applied, in order, so the caller (the graph engine) can react
    /// immediately instead of waiting on its own bus subscription.
    pub fn poll_once(&self, now_ms: u64) -> Result<Vec<SignalKind>, EngineError> {
        let mut store = self.store.lock();
        let pending = match signals::poll_unprocessed(store.conn(), &self.session_id) {
            Ok(pending) => pending,
            Err(StoreError::Sql(e)) if e.to_string().contains("no such table") => {
                tracing::debug!("session_signals table not present yet, skipping this poll");
                return Ok(Vec::new());
            }
            Err(e) => return Err(EngineError::from(e)),
        };

        let mut applied = Vec::with_capacity(pending.len());
        for signal in pending {
            signals::mark_processed(store.conn(), &signal.id, now_ms)?;
            let event = match signal.kind {
                SignalKind::Pause => Event::SessionPauseRequested { session_id: self.session_id.clone() },
                SignalKind::Resume => Event::SessionResumeRequested { session_id: self.session_id.clone() },
                SignalKind::Cancel => Event::SessionCancelRequested { session_id: self.session_id.clone() },
            };
            self.bus.emit(event);
            applied.push(signal.kind);
        }
        Ok(applied)
    }

    /// Run the poll loop at [`POLL_INTERVAL`] until `shutdown` fires. Intended to run
    /// as its own task alongside the graph engine's scheduling loop.
    pub async fn run(self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(POLL_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let now_ms = SystemClock.now_ms();
                    if let Err(e) = self.poll_once(now_ms) {
                        tracing::warn!(error = %e, "signal poll failed, will retry next tick");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use substrate_core::Session;
    use substrate_storage::{sessions, Store};

    fn seed() -> (Arc<Mutex<Store>>, SessionId) {
        let store = Store::open_in_memory().unwrap();
        let session = Session::new("demo", "g.yaml", "main", None, serde_json::json!({}), 0);
        sessions::insert(store.conn(), &session).unwrap();
        (Arc::new(Mutex::new(store)), session.id)
    }

    #[test]
    fn poll_once_drains_oldest_first_and_marks_processed() {
        let (store, session_id) = seed();
        {
            let store = store.lock();
            signals::enqueue(store.conn(), &session_id, SignalKind::Pause, 10).unwrap();
            signals::enqueue(store.conn(), &session_id, SignalKind::Cancel, 20).unwrap();
        }
        let bus = Arc::new(EventBus::new());
        let poller = SignalPoller::new(store.clone(), session_id.clone(), bus);

        let applied = poller.poll_once(30).unwrap();
        assert_eq!(applied, vec![SignalKind::Pause, SignalKind::Cancel]);

        let remaining = signals::poll_unprocessed(store.lock().conn(), &session_id).unwrap();
        assert!(remaining.is_empty());
    }

    #[test]
    fn poll_once_emits_the_matching_bus_event() {
        let (store, session_id) = seed();
        {
            let store = store.lock();
            signals::enqueue(store.conn(), &session_id, SignalKind::Cancel, 10).unwrap();
        }
        let bus = Arc::new(EventBus::new());
        let seen = Arc::new(Mutex::new(false));
        let seen_clone = seen.clone();
        bus.subscribe(
            "session:cancel:requested",
            Arc::new(move |_| *seen_clone.lock() = true),
        );

        let poller = SignalPoller::new(store, session_id, bus);
        poller.poll_once(20).unwrap();
        assert!(*seen.lock());
    }
}
