// SPDX-License-Identifier: MIT

//! In-process typed pub-sub. Single-threaded cooperative delivery: `emit` calls every
//! handler registered for the event's topic synchronously, in subscription order, and
//! a panic-free handler error is logged rather than propagated. The bus snapshots its
//! subscriber list at emit-time, so a handler that subscribes during delivery only
//! sees events emitted after the one that triggered it.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use substrate_core::Event;

pub type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Token returned by [`EventBus::subscribe`], usable with [`EventBus::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    handler: Handler,
}

#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<HashMap<&'static str, Vec<Subscription>>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for every event whose topic equals `topic`.
    pub fn subscribe(&self, topic: &'static str, handler: Handler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.subscribers.lock().entry(topic).or_default().push(Subscription { id, handler });
        id
    }

    pub fn unsubscribe(&self, topic: &'static str, id: SubscriptionId) {
        if let Some(handlers) = self.subscribers.lock().get_mut(topic) {
            handlers.retain(|s| s.id != id);
        }
    }

    /// Deliver `event` to every subscriber of its topic, in subscription order. The
    /// subscriber list is cloned (cheap: `Arc` handles) before delivery so handlers
    /// that subscribe/unsubscribe mid-delivery do not affect this emission.
    pub fn emit(&self, event: Event) {
        let topic = event.topic();
        let snapshot: Vec<Handler> = {
            let subscribers = self.subscribers.lock();
            subscribers.get(topic).map(|s| s.iter().map(|sub| sub.handler.clone()).collect()).unwrap_or_default()
        };
        for handler in snapshot {
            handler(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as StdMutex;
    use substrate_core::TaskId;

    #[test]
    fn delivers_in_subscription_order() {
        let bus = EventBus::new();
        let order = Arc::new(StdMutex::new(Vec::new()));

        let o1 = order.clone();
        bus.subscribe("task:ready", Arc::new(move |_| o1.lock().push(1)));
        let o2 = order.clone();
        bus.subscribe("task:ready", Arc::new(move |_| o2.lock().push(2)));

        bus.emit(Event::TaskReady { task_id: TaskId::new() });
        assert_eq!(*order.lock(), vec![1, 2]);
    }

    #[test]
    fn unsubscribed_handler_stops_receiving_events() {
        let bus = EventBus::new();
        let count = Arc::new(StdMutex::new(0));
        let c = count.clone();
        let id = bus.subscribe("task:ready", Arc::new(move |_| *c.lock() += 1));

        bus.emit(Event::TaskReady { task_id: TaskId::new() });
        bus.unsubscribe("task:ready", id);
        bus.emit(Event::TaskReady { task_id: TaskId::new() });

        assert_eq!(*count.lock(), 1);
    }

    #[test]
    fn handler_subscribed_during_emit_sees_only_next_event() {
        let bus = Arc::new(EventBus::new());
        let seen = Arc::new(StdMutex::new(Vec::new()));

        let bus_clone = bus.clone();
        let seen_clone = seen.clone();
        bus.subscribe(
            "task:ready",
            Arc::new(move |_| {
                let seen_inner = seen_clone.clone();
                bus_clone.subscribe("task:ready", Arc::new(move |_| seen_inner.lock().push("late")));
            }),
        );

        bus.emit(Event::TaskReady { task_id: TaskId::new() });
        assert!(seen.lock().is_empty());
        bus.emit(Event::TaskReady { task_id: TaskId::new() });
        assert_eq!(*seen.lock(), vec!["late"]);
    }
}
