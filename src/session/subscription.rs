//! Subscription table and inbound message handles.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::protocol::{headers as names, Frame, Headers};

use super::StompClient;

/// Handler invoked for every `MESSAGE` on a subscription.
pub type MessageHandler = Arc<dyn Fn(Message) + Send + Sync>;

/// Subscription id to handler.
#[derive(Default)]
pub(crate) struct SubscriptionTable {
    handlers: HashMap<String, MessageHandler>,
    next_id: u64,
}

impl SubscriptionTable {
    /// Next locally generated id, `sub-N`.
    pub fn generate_id(&mut self) -> String {
        let id = format!("sub-{}", self.next_id);
        self.next_id += 1;
        id
    }

    pub fn insert(&mut self, id: String, handler: MessageHandler) {
        self.handlers.insert(id, handler);
    }

    pub fn remove(&mut self, id: &str) -> Option<MessageHandler> {
        self.handlers.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<MessageHandler> {
        self.handlers.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
    }
}

/// A `MESSAGE` frame delivered to a subscription handler.
///
/// [`ack`](Message::ack) and [`nack`](Message::nack) are bound to this
/// frame's `message-id` and `subscription`.
pub struct Message {
    frame: Frame,
    client: StompClient,
}

impl Message {
    pub(crate) fn new(frame: Frame, client: StompClient) -> Self {
        Self { frame, client }
    }

    #[inline]
    pub fn body(&self) -> &str {
        &self.frame.body
    }

    #[inline]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.frame.header(name)
    }

    pub fn message_id(&self) -> Option<&str> {
        self.frame.header(names::MESSAGE_ID)
    }

    pub fn subscription(&self) -> Option<&str> {
        self.frame.header(names::SUBSCRIPTION)
    }

    pub fn destination(&self) -> Option<&str> {
        self.frame.header(names::DESTINATION)
    }

    /// The underlying frame.
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Acknowledge this message.
    pub fn ack(&self, headers: Headers) -> Result<()> {
        self.client.ack(
            self.message_id().unwrap_or_default(),
            self.subscription().unwrap_or_default(),
            headers,
        )
    }

    /// Reject this message.
    pub fn nack(&self, headers: Headers) -> Result<()> {
        self.client.nack(
            self.message_id().unwrap_or_default(),
            self.subscription().unwrap_or_default(),
            headers,
        )
    }

    pub fn into_frame(self) -> Frame {
        self.frame
    }
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Message").field("frame", &self.frame).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_sequential() {
        let mut table = SubscriptionTable::default();
        assert_eq!(table.generate_id(), "sub-0");
        assert_eq!(table.generate_id(), "sub-1");
    }

    #[test]
    fn test_insert_get_remove() {
        let mut table = SubscriptionTable::default();
        let handler: MessageHandler = Arc::new(|_msg| {});
        table.insert("sub-0".to_string(), handler);

        assert!(table.get("sub-0").is_some());
        assert!(table.get("sub-1").is_none());
        assert_eq!(table.len(), 1);
        assert!(table.remove("sub-0").is_some());
        assert_eq!(table.len(), 0);

        table.insert("a".to_string(), Arc::new(|_msg| {}));
        table.clear();
        assert!(table.get("a").is_none());
    }
}
