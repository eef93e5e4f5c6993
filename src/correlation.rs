//! Command correlation.
//!
//! Every outbound command gets a short local id. Confirmation happens in
//! two phases:
//!
//! 1. Delivery: the server reports `{msg_id, uuid}`. The send callback
//!    fires and the entry moves from the local id to the server's uuid.
//! 2. Response: the device reports `{uuid}`. The response callback fires
//!    and the entry is gone.
//!
//! Unknown ids are ignored in both phases. Each callback fires at most once.
//!
//! # Example
//!
//! ```
//! use lockstream_client::correlation::CommandTracker;
//!
//! let tracker = CommandTracker::new();
//! let local = tracker.issue(Some(Box::new(|| println!("sent"))), None);
//! assert!(tracker.on_delivery_confirmed(&local, "uuid-1"));
//! assert!(tracker.on_response_confirmed("uuid-1"));
//! assert_eq!(tracker.pending_count(), 0);
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::Rng;

/// Local ids are `_` followed by a number below this.
pub const LOCAL_ID_SPACE: u32 = 100_000;

/// Fired when the server confirms delivery.
pub type SendCallback = Box<dyn FnOnce() + Send>;

/// Fired when the device confirms it received the command.
pub type ResponseCallback = Box<dyn FnOnce() + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Keyed by local id, waiting for delivery.
    Issued,
    /// Keyed by server uuid, waiting for the response.
    Delivered,
}

struct PendingCommand {
    phase: Phase,
    send_cb: Option<SendCallback>,
    response_cb: Option<ResponseCallback>,
}

/// Table of outstanding commands.
///
/// Cheap to clone; clones share the table.
#[derive(Clone, Default)]
pub struct CommandTracker {
    pending: Arc<Mutex<HashMap<String, PendingCommand>>>,
}

impl CommandTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command and return its local id.
    ///
    /// The id is regenerated until it does not collide with any pending
    /// entry.
    pub fn issue(
        &self,
        send_cb: Option<SendCallback>,
        response_cb: Option<ResponseCallback>,
    ) -> String {
        let mut pending = self.pending.lock();
        let mut rng = rand::thread_rng();
        let id = loop {
            let candidate = format!("_{}", rng.gen_range(0..LOCAL_ID_SPACE));
            if !pending.contains_key(&candidate) {
                break candidate;
            }
        };
        pending.insert(
            id.clone(),
            PendingCommand {
                phase: Phase::Issued,
                send_cb,
                response_cb,
            },
        );
        id
    }

    /// Delivery confirmed: fire the send callback and re-key to `server_id`.
    ///
    /// Returns false if `local_id` is not awaiting delivery.
    pub fn on_delivery_confirmed(&self, local_id: &str, server_id: &str) -> bool {
        let send_cb = {
            let mut pending = self.pending.lock();
            match pending.get(local_id) {
                Some(entry) if entry.phase == Phase::Issued => {}
                _ => return false,
            }
            let Some(mut entry) = pending.remove(local_id) else {
                return false;
            };
            entry.phase = Phase::Delivered;
            let send_cb = entry.send_cb.take();
            if let Some(displaced) = pending.insert(server_id.to_string(), entry) {
                tracing::warn!(
                    "Server id {} already in use ({:?}), earlier command dropped",
                    server_id,
                    displaced.phase
                );
            }
            send_cb
        };

        tracing::debug!("Command {} delivered as {}", local_id, server_id);
        if let Some(cb) = send_cb {
            cb();
        }
        true
    }

    /// Response confirmed: fire the response callback and drop the entry.
    ///
    /// Returns false if `server_id` is not awaiting a response.
    pub fn on_response_confirmed(&self, server_id: &str) -> bool {
        let response_cb = {
            let mut pending = self.pending.lock();
            match pending.get(server_id) {
                Some(entry) if entry.phase == Phase::Delivered => {}
                _ => return false,
            }
            pending.remove(server_id).and_then(|entry| entry.response_cb)
        };

        tracing::debug!("Command {} answered", server_id);
        if let Some(cb) = response_cb {
            cb();
        }
        true
    }

    /// Forget one command without firing its callbacks.
    pub fn cancel(&self, id: &str) -> bool {
        let removed = self.pending.lock().remove(id);
        removed.is_some()
    }

    /// Drop every pending command without firing callbacks.
    ///
    /// Returns how many were dropped.
    pub fn invalidate(&self) -> usize {
        let dropped: Vec<PendingCommand> = {
            let mut pending = self.pending.lock();
            pending.drain().map(|(_, entry)| entry).collect()
        };
        dropped.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Whether `id` (local or server) is pending.
    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.lock().contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, Box<dyn FnOnce() + Send>) {
        let count = Arc::new(AtomicUsize::new(0));
        let clone = count.clone();
        (
            count,
            Box::new(move || {
                clone.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    #[test]
    fn test_local_id_format() {
        let tracker = CommandTracker::new();
        let id = tracker.issue(None, None);
        assert!(id.starts_with('_'));
        let n: u32 = id[1..].parse().unwrap();
        assert!(n < LOCAL_ID_SPACE);
    }

    #[test]
    fn test_ids_are_unique_while_pending() {
        let tracker = CommandTracker::new();
        let mut ids: Vec<String> = (0..500).map(|_| tracker.issue(None, None)).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 500);
        assert_eq!(tracker.pending_count(), 500);
    }

    #[test]
    fn test_delivery_fires_send_once_and_rekeys() {
        let tracker = CommandTracker::new();
        let (sent, send_cb) = counter();
        let local = tracker.issue(Some(send_cb), None);

        assert!(tracker.on_delivery_confirmed(&local, "uuid-1"));
        assert_eq!(sent.load(Ordering::SeqCst), 1);
        assert!(!tracker.is_pending(&local));
        assert!(tracker.is_pending("uuid-1"));

        // Repeated delivery for the retired local id is a no-op.
        assert!(!tracker.on_delivery_confirmed(&local, "uuid-1"));
        assert_eq!(sent.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_response_fires_once() {
        let tracker = CommandTracker::new();
        let (answered, response_cb) = counter();
        let local = tracker.issue(None, Some(response_cb));
        tracker.on_delivery_confirmed(&local, "uuid-2");

        assert!(tracker.on_response_confirmed("uuid-2"));
        assert!(!tracker.on_response_confirmed("uuid-2"));
        assert_eq!(answered.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.pending_count(), 0);
    }

    #[test]
    fn test_response_before_delivery_is_ignored() {
        let tracker = CommandTracker::new();
        let (answered, response_cb) = counter();
        let local = tracker.issue(None, Some(response_cb));

        assert!(!tracker.on_response_confirmed(&local));
        assert_eq!(answered.load(Ordering::SeqCst), 0);
        assert!(tracker.is_pending(&local));
    }

    #[test]
    fn test_unknown_ids_are_noops() {
        let tracker = CommandTracker::new();
        assert!(!tracker.on_delivery_confirmed("_1", "uuid"));
        assert!(!tracker.on_response_confirmed("uuid"));
    }

    #[test]
    fn test_invalidate_drops_without_firing() {
        let tracker = CommandTracker::new();
        let (sent, send_cb) = counter();
        let (answered, response_cb) = counter();
        let local = tracker.issue(Some(send_cb), Some(response_cb));

        assert_eq!(tracker.invalidate(), 1);
        assert!(!tracker.on_delivery_confirmed(&local, "uuid"));
        assert_eq!(sent.load(Ordering::SeqCst), 0);
        assert_eq!(answered.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cancel() {
        let tracker = CommandTracker::new();
        let (sent, send_cb) = counter();
        let local = tracker.issue(Some(send_cb), None);
        assert!(tracker.cancel(&local));
        assert!(!tracker.cancel(&local));
        assert!(!tracker.on_delivery_confirmed(&local, "uuid"));
        assert_eq!(sent.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_duplicate_server_id_keeps_latest() {
        let tracker = CommandTracker::new();
        let (first, first_cb) = counter();
        let (second, second_cb) = counter();
        let a = tracker.issue(None, Some(first_cb));
        let b = tracker.issue(None, Some(second_cb));

        assert!(tracker.on_delivery_confirmed(&a, "uuid-dup"));
        assert!(tracker.on_delivery_confirmed(&b, "uuid-dup"));
        assert_eq!(tracker.pending_count(), 1);

        assert!(tracker.on_response_confirmed("uuid-dup"));
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_callback_may_reenter() {
        let tracker = CommandTracker::new();
        let inner = tracker.clone();
        let local = tracker.issue(
            Some(Box::new(move || {
                // Issuing from inside a callback must not deadlock.
                inner.issue(None, None);
            })),
            None,
        );
        tracker.on_delivery_confirmed(&local, "uuid-3");
        assert_eq!(tracker.pending_count(), 2);
    }
}
