//! Named-event dispatcher.
//!
//! Subscribers are kept per event name in registration order. `trigger`
//! runs them synchronously on the caller's thread. A subscriber that
//! panics is logged and skipped; the rest still run.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;

/// Subscriber for events carrying `T`.
pub type Subscriber<T> = Arc<dyn Fn(Option<&T>) + Send + Sync>;

/// Map from event name to subscribers.
///
/// Cheap to clone; clones share the same subscribers.
pub struct EventBus<T> {
    subscribers: Arc<Mutex<HashMap<String, Vec<Subscriber<T>>>>>,
}

impl<T> Clone for EventBus<T> {
    fn clone(&self) -> Self {
        Self {
            subscribers: self.subscribers.clone(),
        }
    }
}

impl<T> Default for EventBus<T> {
    fn default() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<T> EventBus<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a subscriber for `name`.
    pub fn bind<F>(&self, name: &str, subscriber: F)
    where
        F: Fn(Option<&T>) + Send + Sync + 'static,
    {
        self.subscribers
            .lock()
            .entry(name.to_string())
            .or_default()
            .push(Arc::new(subscriber));
    }

    /// Remove every subscriber for `name`.
    pub fn unbind(&self, name: &str) {
        self.subscribers.lock().remove(name);
    }

    /// Call every subscriber of `name` in order. Returns how many ran
    /// without panicking.
    pub fn trigger(&self, name: &str, data: Option<&T>) -> usize {
        let subscribers = match self.subscribers.lock().get(name) {
            Some(list) => list.clone(),
            None => return 0,
        };

        let mut completed = 0;
        for subscriber in subscribers {
            match catch_unwind(AssertUnwindSafe(|| subscriber(data))) {
                Ok(()) => completed += 1,
                Err(_) => tracing::error!("Subscriber for event '{}' panicked", name),
            }
        }
        completed
    }

    pub fn subscriber_count(&self, name: &str) -> usize {
        self.subscribers.lock().get(name).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_in_registration_order() {
        let bus: EventBus<u32> = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in ["a", "b", "c"] {
            let seen = seen.clone();
            bus.bind("tick", move |data| seen.lock().push((tag, data.copied())));
        }

        assert_eq!(bus.trigger("tick", Some(&7)), 3);
        assert_eq!(
            *seen.lock(),
            vec![("a", Some(7)), ("b", Some(7)), ("c", Some(7))]
        );
    }

    #[test]
    fn test_unbind_clears_all() {
        let bus: EventBus<()> = EventBus::new();
        bus.bind("x", |_| {});
        bus.bind("x", |_| {});
        assert_eq!(bus.subscriber_count("x"), 2);
        bus.unbind("x");
        assert_eq!(bus.trigger("x", None), 0);
    }

    #[test]
    fn test_panicking_subscriber_is_isolated() {
        let bus: EventBus<()> = EventBus::new();
        let ran = Arc::new(Mutex::new(false));
        bus.bind("x", |_| panic!("boom"));
        let flag = ran.clone();
        bus.bind("x", move |_| *flag.lock() = true);

        assert_eq!(bus.trigger("x", None), 1);
        assert!(*ran.lock());
    }

    #[test]
    fn test_subscriber_may_bind_during_trigger() {
        let bus: EventBus<()> = EventBus::new();
        let inner = bus.clone();
        bus.bind("x", move |_| inner.bind("y", |_| {}));
        bus.trigger("x", None);
        assert_eq!(bus.subscriber_count("y"), 1);
    }
}
