//! The mediator: the pub/sub router connecting components
//!
//! Components never hold references to each other; everything flows through
//! `observe` and `publish`. Handlers for a given event run in registration
//! order; no ordering is promised between handlers of different events.

use std::collections::HashMap;
use std::future::Future;

use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::{RwLock, mpsc};
use tracing::debug;

use crate::signature::EventSignature;

type ObserverFn = std::sync::Arc<dyn Fn(Value) -> BoxFuture<'static, ()> + Send + Sync>;

/// Routes published events to all observers of that event name.
#[derive(Default)]
pub struct Mediator {
    observers: RwLock<HashMap<String, Vec<ObserverFn>>>,
}

impl std::fmt::Debug for Mediator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mediator").finish_non_exhaustive()
    }
}

impl Mediator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler invoked with its own copy of the payload whenever
    /// the event is published.
    pub async fn observe<F, Fut>(&self, event: &EventSignature, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        debug!(event = %event.name, "Mediator::observe");
        let boxed: ObserverFn =
            std::sync::Arc::new(move |payload| Box::pin(handler(payload)) as BoxFuture<'static, ()>);
        self.observers
            .write()
            .await
            .entry(event.name.clone())
            .or_default()
            .push(boxed);
    }

    /// Deliver the payload to all current observers of the event. Resolves
    /// once every handler has been dispatched to.
    pub async fn publish(&self, event: &EventSignature, payload: Value) {
        let handlers = self.observers.read().await.get(&event.name).cloned();

        let Some(handlers) = handlers else {
            debug!(event = %event.name, "Mediator::publish: no observers");
            return;
        };

        debug!(event = %event.name, observers = handlers.len(), "Mediator::publish");
        for handler in handlers {
            // Each observer gets its own clone: payloads keep value
            // semantics across component boundaries.
            handler(payload.clone()).await;
        }
    }

    /// Number of observers currently registered for the event.
    pub async fn observer_count(&self, event: &EventSignature) -> usize {
        self.observers
            .read()
            .await
            .get(&event.name)
            .map_or(0, Vec::len)
    }

    /// Subscribe to future occurrences of an event through a queue instead
    /// of a handler. Handy for awaiting a single occurrence in tests and
    /// request/response glue.
    pub async fn waiter(&self, event: &EventSignature) -> EventWaiter {
        let (tx, rx) = mpsc::unbounded_channel();
        self.observe(event, move |payload| {
            let tx = tx.clone();
            async move {
                // Receiver may be gone; occurrences after that are dropped.
                let _ = tx.send(payload);
            }
        })
        .await;
        EventWaiter { rx }
    }
}

/// Receiving side of [`Mediator::waiter`]: a queue of event occurrences.
pub struct EventWaiter {
    rx: mpsc::UnboundedReceiver<Value>,
}

impl EventWaiter {
    /// Next occurrence of the event, in publish order.
    pub async fn next(&mut self) -> Option<Value> {
        self.rx.recv().await
    }

    /// Non-blocking variant of [`next`](Self::next).
    pub fn try_next(&mut self) -> Option<Value> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_all_observers() {
        let mediator = Mediator::new();
        let event = EventSignature::new("Tick");
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let count = count.clone();
            mediator
                .observe(&event, move |_| {
                    let count = count.clone();
                    async move {
                        count.fetch_add(1, Ordering::SeqCst);
                    }
                })
                .await;
        }

        mediator.publish(&event, json!({})).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_publish_without_observers_is_noop() {
        let mediator = Mediator::new();
        mediator.publish(&EventSignature::new("Nobody"), json!(1)).await;
    }

    #[tokio::test]
    async fn test_observers_are_matched_by_name_only() {
        let mediator = Mediator::new();
        let hit = Arc::new(AtomicUsize::new(0));

        let counter = hit.clone();
        mediator
            .observe(&EventSignature::new("A"), move |_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await;

        mediator.publish(&EventSignature::new("B"), json!(null)).await;
        assert_eq!(hit.load(Ordering::SeqCst), 0);

        mediator.publish(&EventSignature::new("A"), json!(null)).await;
        assert_eq!(hit.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_waiter_receives_in_publish_order() {
        let mediator = Mediator::new();
        let event = EventSignature::new("Seq");
        let mut waiter = mediator.waiter(&event).await;

        for i in 0..3 {
            mediator.publish(&event, json!({"i": i})).await;
        }

        for i in 0..3 {
            let payload = waiter.next().await.unwrap();
            assert_eq!(payload["i"], i);
        }
        assert!(waiter.try_next().is_none());
    }

    #[tokio::test]
    async fn test_each_observer_gets_its_own_payload_copy() {
        let mediator = Mediator::new();
        let event = EventSignature::new("Data");
        let mut first = mediator.waiter(&event).await;
        let mut second = mediator.waiter(&event).await;

        mediator.publish(&event, json!({"k": "v"})).await;

        let a = first.next().await.unwrap();
        let b = second.next().await.unwrap();
        assert_eq!(a, b);
    }
}
