#![deny(missing_docs)]
//! Typed in-process publish/subscribe event bus.
//!
//! Exact-topic and prefix subscriptions live in separate registries so that
//! prefix delivery never needs to wrap or mutate the dispatch routine for
//! exact-topic subscribers — an earlier closure-override approach to prefix
//! matching accumulated state per call and reintroduced itself on nested
//! publishes. Handler errors are caught and logged; a failing handler never
//! stops delivery to the handlers after it, and never poisons the bus.

pub mod error;

pub use error::BusError;

use kernel_types::event::Payload;
use kernel_types::{CorrelationId, Event, SubscriptionId};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

/// Result type returned by bus handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;
/// Result type returned by bus handlers.
pub type HandlerResult = Result<(), HandlerError>;

/// A boxed, shareable event handler.
pub type BoxedHandler = Arc<dyn Fn(&Event) -> HandlerResult + Send + Sync>;

/// Configuration for one [`EventBus`].
#[derive(Debug, Clone, Copy)]
pub struct BusOptions {
    /// Maximum number of events retained in the history ring.
    pub max_history: usize,
}

impl Default for BusOptions {
    fn default() -> Self {
        Self { max_history: 1024 }
    }
}

/// A subscription handle. Pass it to [`EventBus::unsubscribe`] to remove it;
/// unsubscribing twice is a no-op.
#[derive(Debug, Clone)]
pub struct Subscription {
    id: SubscriptionId,
}

impl Subscription {
    /// The subscription's identifier.
    pub fn id(&self) -> &SubscriptionId {
        &self.id
    }
}

struct Entry {
    id: SubscriptionId,
    priority: i32,
    insertion: u64,
    once: bool,
    handler: BoxedHandler,
}

struct PrefixEntry {
    prefix: String,
    entry: Entry,
}

struct Inner {
    next_seq: u64,
    next_insertion: u64,
    history: VecDeque<Event>,
    max_history: usize,
    exact: std::collections::HashMap<String, Vec<Entry>>,
    prefix: Vec<PrefixEntry>,
    correlation_stack: Vec<CorrelationId>,
}

/// The event bus.
///
/// Cloning an `EventBus` is not supported directly; share it behind an
/// `Arc<EventBus>` if multiple owners need it. All operations take `&self`.
pub struct EventBus {
    inner: Mutex<Inner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(BusOptions::default())
    }
}

impl EventBus {
    /// Create a new bus with the given options.
    pub fn new(options: BusOptions) -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_seq: 0,
                next_insertion: 0,
                history: VecDeque::new(),
                max_history: options.max_history,
                exact: std::collections::HashMap::new(),
                prefix: Vec::new(),
                correlation_stack: Vec::new(),
            }),
        }
    }

    /// Publish an event on `topic` from `source`, returning the fully
    /// decorated [`Event`].
    ///
    /// Never blocks on handler execution beyond the synchronous call itself;
    /// handler errors are logged and do not stop delivery to later handlers.
    pub fn publish(&self, topic: impl Into<String>, source: impl Into<String>, payload: Payload) -> Event {
        let topic = topic.into();
        let (event, mut handlers) = {
            let mut inner = self.inner.lock().expect("bus mutex poisoned");
            let seq = inner.next_seq;
            inner.next_seq += 1;
            let correlation_id = inner.correlation_stack.last().cloned();
            let event = Event {
                seq,
                timestamp: chrono::Utc::now(),
                topic: topic.clone(),
                source: source.into(),
                correlation_id,
                payload,
            };

            inner.history.push_back(event.clone());
            while inner.history.len() > inner.max_history {
                inner.history.pop_front();
            }

            let mut matched: Vec<(i32, u64, SubscriptionId, BoxedHandler, bool)> = Vec::new();
            if let Some(exact) = inner.exact.get(&topic) {
                for e in exact {
                    matched.push((e.priority, e.insertion, e.id.clone(), e.handler.clone(), e.once));
                }
            }
            matched.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

            let mut prefix_matched: Vec<(i32, u64, SubscriptionId, BoxedHandler, bool)> = Vec::new();
            for pe in &inner.prefix {
                if topic.starts_with(pe.prefix.as_str()) {
                    prefix_matched.push((
                        pe.entry.priority,
                        pe.entry.insertion,
                        pe.entry.id.clone(),
                        pe.entry.handler.clone(),
                        pe.entry.once,
                    ));
                }
            }
            prefix_matched.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

            matched.extend(prefix_matched);
            (event, matched)
        };

        let mut to_remove = Vec::new();
        for (_, _, id, handler, once) in handlers.drain(..) {
            if let Err(err) = handler(&event) {
                tracing::warn!(topic = %event.topic, error = %err, "bus handler failed");
            }
            if once {
                to_remove.push(id);
            }
        }

        if !to_remove.is_empty() {
            let mut inner = self.inner.lock().expect("bus mutex poisoned");
            for id in to_remove {
                remove_by_id(&mut inner, &id);
            }
        }

        event
    }

    /// Subscribe to an exact topic.
    pub fn subscribe<F>(&self, topic: impl Into<String>, priority: i32, handler: F) -> Subscription
    where
        F: Fn(&Event) -> HandlerResult + Send + Sync + 'static,
    {
        self.subscribe_inner(topic.into(), priority, false, Arc::new(handler), None)
    }

    /// Subscribe to every topic beginning with `prefix`.
    pub fn subscribe_prefix<F>(&self, prefix: impl Into<String>, priority: i32, handler: F) -> Subscription
    where
        F: Fn(&Event) -> HandlerResult + Send + Sync + 'static,
    {
        self.subscribe_inner(String::new(), priority, false, Arc::new(handler), Some(prefix.into()))
    }

    /// Subscribe to an exact topic; the handler is automatically unsubscribed
    /// after its first invocation.
    pub fn once<F>(&self, topic: impl Into<String>, priority: i32, handler: F) -> Subscription
    where
        F: Fn(&Event) -> HandlerResult + Send + Sync + 'static,
    {
        self.subscribe_inner(topic.into(), priority, true, Arc::new(handler), None)
    }

    fn subscribe_inner(
        &self,
        topic: String,
        priority: i32,
        once: bool,
        handler: BoxedHandler,
        prefix: Option<String>,
    ) -> Subscription {
        let mut inner = self.inner.lock().expect("bus mutex poisoned");
        let id = SubscriptionId::generate();
        let insertion = inner.next_insertion;
        inner.next_insertion += 1;
        let entry = Entry { id: id.clone(), priority, insertion, once, handler };
        match prefix {
            Some(prefix) => inner.prefix.push(PrefixEntry { prefix, entry }),
            None => inner.exact.entry(topic).or_default().push(entry),
        }
        Subscription { id }
    }

    /// Remove a subscription. Idempotent: unsubscribing an already-removed
    /// or unknown subscription is a no-op.
    pub fn unsubscribe(&self, subscription: &Subscription) {
        let mut inner = self.inner.lock().expect("bus mutex poisoned");
        remove_by_id(&mut inner, &subscription.id);
    }

    /// Run `thunk`, publishing any events inside it under `id` unless they
    /// already carry their own correlation ID. Restored on every exit path.
    pub fn with_correlation<R>(&self, id: CorrelationId, thunk: impl FnOnce() -> R) -> R {
        {
            let mut inner = self.inner.lock().expect("bus mutex poisoned");
            inner.correlation_stack.push(id);
        }
        struct PopGuard<'a>(&'a EventBus);
        impl Drop for PopGuard<'_> {
            fn drop(&mut self) {
                let mut inner = self.0.inner.lock().expect("bus mutex poisoned");
                inner.correlation_stack.pop();
            }
        }
        let _guard = PopGuard(self);
        thunk()
    }

    /// Wait for the first event on `topic` matching `predicate`, up to `timeout`.
    ///
    /// Stays subscribed across non-matching events; only a matching event (or
    /// the timeout) ends the wait. Cancels its own subscription either way.
    pub async fn wait_for(
        &self,
        topic: impl Into<String>,
        predicate: impl Fn(&Event) -> bool + Send + Sync + 'static,
        timeout: Duration,
    ) -> Result<Event, BusError> {
        let (tx, rx) = oneshot::channel();
        let tx = Mutex::new(Some(tx));
        let sub = self.subscribe(topic, 0, move |ev| {
            if predicate(ev) {
                if let Some(tx) = tx.lock().expect("oneshot mutex poisoned").take() {
                    let _ = tx.send(ev.clone());
                }
            }
            Ok(())
        });

        let result = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(event)) => Ok(event),
            Ok(Err(_)) => Err(BusError::WaitTimeout(timeout)),
            Err(_) => Err(BusError::WaitTimeout(timeout)),
        };
        self.unsubscribe(&sub);
        result
    }

    /// Events currently retained in history, optionally filtered by topic prefix.
    pub fn history(&self, topic_prefix: Option<&str>, limit: usize) -> Vec<Event> {
        let inner = self.inner.lock().expect("bus mutex poisoned");
        inner
            .history
            .iter()
            .filter(|e| topic_prefix.map(|p| e.topic.starts_with(p)).unwrap_or(true))
            .rev()
            .take(limit)
            .rev()
            .cloned()
            .collect()
    }

    /// All retained events sharing `id`.
    pub fn correlated(&self, id: &CorrelationId) -> Vec<Event> {
        let inner = self.inner.lock().expect("bus mutex poisoned");
        inner.history.iter().filter(|e| e.correlation_id.as_ref() == Some(id)).cloned().collect()
    }

    /// Remove all subscriptions and history. Statistics (e.g. `seq`) continue
    /// from where they left off.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("bus mutex poisoned");
        inner.history.clear();
        inner.exact.clear();
        inner.prefix.clear();
    }
}

fn remove_by_id(inner: &mut Inner, id: &SubscriptionId) {
    for list in inner.exact.values_mut() {
        list.retain(|e| &e.id != id);
    }
    inner.prefix.retain(|pe| &pe.entry.id != id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_types::event::{AiPayload, KernelPayload};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn kernel_cycle(n: u64) -> Payload {
        Payload::Kernel(KernelPayload::Cycle { cycle: n })
    }

    #[test]
    fn seq_strictly_increasing() {
        let bus = EventBus::default();
        let e1 = bus.publish("kernel.cycle", "test", kernel_cycle(0));
        let e2 = bus.publish("kernel.cycle", "test", kernel_cycle(1));
        assert!(e2.seq > e1.seq);
    }

    #[test]
    fn exact_subscriber_receives_matching_topic() {
        let bus = EventBus::default();
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        bus.subscribe("kernel.cycle", 0, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        bus.publish("kernel.cycle", "test", kernel_cycle(0));
        bus.publish("kernel.mode", "test", Payload::Kernel(KernelPayload::Mode { mode: "x".into() }));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn prefix_subscriber_receives_all_matching() {
        let bus = EventBus::default();
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        bus.subscribe_prefix("kernel.", 0, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        bus.publish("kernel.cycle", "test", kernel_cycle(0));
        bus.publish("kernel.mode", "test", Payload::Kernel(KernelPayload::Mode { mode: "x".into() }));
        bus.publish("ai.surprise", "test", Payload::Ai(AiPayload::Surprise { value: 0.1 }));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn priority_order_exact_before_lower_priority() {
        let bus = EventBus::default();
        let order = Arc::new(Mutex::new(Vec::new()));
        let o1 = order.clone();
        bus.subscribe("kernel.cycle", 0, move |_| {
            o1.lock().unwrap().push("low");
            Ok(())
        });
        let o2 = order.clone();
        bus.subscribe("kernel.cycle", 10, move |_| {
            o2.lock().unwrap().push("high");
            Ok(())
        });
        bus.publish("kernel.cycle", "test", kernel_cycle(0));
        assert_eq!(*order.lock().unwrap(), vec!["high", "low"]);
    }

    #[test]
    fn exact_subscribers_dispatch_before_prefix() {
        let bus = EventBus::default();
        let order = Arc::new(Mutex::new(Vec::new()));
        let o1 = order.clone();
        bus.subscribe_prefix("kernel.", 100, move |_| {
            o1.lock().unwrap().push("prefix");
            Ok(())
        });
        let o2 = order.clone();
        bus.subscribe("kernel.cycle", 0, move |_| {
            o2.lock().unwrap().push("exact");
            Ok(())
        });
        bus.publish("kernel.cycle", "test", kernel_cycle(0));
        assert_eq!(*order.lock().unwrap(), vec!["exact", "prefix"]);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let bus = EventBus::default();
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let sub = bus.subscribe("kernel.cycle", 0, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        bus.unsubscribe(&sub);
        bus.unsubscribe(&sub);
        bus.publish("kernel.cycle", "test", kernel_cycle(0));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn once_fires_a_single_time() {
        let bus = EventBus::default();
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        bus.once("kernel.cycle", 0, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        bus.publish("kernel.cycle", "test", kernel_cycle(0));
        bus.publish("kernel.cycle", "test", kernel_cycle(1));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failing_handler_does_not_block_others() {
        let bus = EventBus::default();
        let count = Arc::new(AtomicU32::new(0));
        bus.subscribe("kernel.cycle", 10, |_| Err("boom".into()));
        let c = count.clone();
        bus.subscribe("kernel.cycle", 0, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        bus.publish("kernel.cycle", "test", kernel_cycle(0));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn correlation_id_threads_through_nested_publish() {
        let bus = EventBus::default();
        let id = CorrelationId::new("req-1");
        let captured = Arc::new(Mutex::new(None));
        let cap = captured.clone();
        bus.subscribe("kernel.mode", 0, move |ev| {
            *cap.lock().unwrap() = ev.correlation_id.clone();
            Ok(())
        });
        bus.with_correlation(id.clone(), || {
            bus.publish("kernel.mode", "test", Payload::Kernel(KernelPayload::Mode { mode: "x".into() }));
        });
        assert_eq!(*captured.lock().unwrap(), Some(id));

        bus.publish("kernel.mode", "test", Payload::Kernel(KernelPayload::Mode { mode: "y".into() }));
        assert_eq!(*captured.lock().unwrap(), None);
    }

    #[test]
    fn history_truncates_to_max() {
        let bus = EventBus::new(BusOptions { max_history: 2 });
        bus.publish("kernel.cycle", "test", kernel_cycle(0));
        bus.publish("kernel.cycle", "test", kernel_cycle(1));
        bus.publish("kernel.cycle", "test", kernel_cycle(2));
        let h = bus.history(None, 10);
        assert_eq!(h.len(), 2);
        assert_eq!(h[0].seq, 1);
        assert_eq!(h[1].seq, 2);
    }

    #[tokio::test]
    async fn wait_for_resolves_on_match() {
        let bus = Arc::new(EventBus::default());
        let b = bus.clone();
        let handle = tokio::spawn(async move { b.wait_for("kernel.cycle", |_| true, Duration::from_secs(1)).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        bus.publish("kernel.cycle", "test", kernel_cycle(5));
        let event = handle.await.unwrap().unwrap();
        assert_eq!(event.topic, "kernel.cycle");
    }

    #[tokio::test]
    async fn wait_for_skips_non_matching_events_until_a_match() {
        let bus = Arc::new(EventBus::default());
        let b = bus.clone();
        let handle = tokio::spawn(async move {
            b.wait_for(
                "kernel.cycle",
                |ev| matches!(ev.payload, Payload::Kernel(KernelPayload::Cycle { cycle }) if cycle == 5),
                Duration::from_secs(1),
            )
            .await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        bus.publish("kernel.cycle", "test", kernel_cycle(1));
        bus.publish("kernel.cycle", "test", kernel_cycle(2));
        bus.publish("kernel.cycle", "test", kernel_cycle(5));
        let event = handle.await.unwrap().unwrap();
        assert_eq!(event.seq, 2);
        assert!(matches!(event.payload, Payload::Kernel(KernelPayload::Cycle { cycle: 5 })));
    }

    #[tokio::test]
    async fn wait_for_times_out() {
        let bus = EventBus::default();
        let result = bus.wait_for("kernel.cycle", |_| true, Duration::from_millis(20)).await;
        assert!(matches!(result, Err(BusError::WaitTimeout(_))));
    }

    #[test]
    fn clear_resets_history_and_subscriptions() {
        let bus = EventBus::default();
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        bus.subscribe("kernel.cycle", 0, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        bus.publish("kernel.cycle", "test", kernel_cycle(0));
        bus.clear();
        bus.publish("kernel.cycle", "test", kernel_cycle(1));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(bus.history(None, 10).len() <= 1);
    }
}
