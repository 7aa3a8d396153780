//! Typed, in-process, many-to-many message bus.
//!
//! Per-recipient bounded queues back every agent's inbox. Overflow drops
//! the oldest queued message and bumps a counter rather than blocking the
//! publisher — publish is non-blocking by contract. FIFO is only
//! guaranteed per `(from, to)` pair, enforced with a sequence counter per
//! pair; there is no global ordering across different senders.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::domain::{AgentId, Message, Recipient};

const DEFAULT_INBOX_CAPACITY: usize = 256;

struct Inbox {
    queue: Mutex<VecDeque<Message>>,
    capacity: usize,
    dropped: AtomicU64,
}

impl Inbox {
    fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    fn push(&self, message: Message) {
        let mut queue = self.queue.lock();
        if queue.len() >= self.capacity {
            queue.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        queue.push_back(message);
    }

    fn drain(&self) -> Vec<Message> {
        let mut queue = self.queue.lock();
        queue.drain(..).collect()
    }
}

/// Many-to-many typed message bus. Cheap to clone — internally an `Arc`-free
/// `DashMap` shared by reference is enough since the bus itself is held
/// behind an `Arc` by its owner (Orchestrator/MarketHunter/agents).
pub struct MessageBus {
    inboxes: DashMap<AgentId, Inbox>,
    sequence: DashMap<(AgentId, AgentId), AtomicU64>,
    capacity: usize,
}

impl MessageBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_INBOX_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inboxes: DashMap::new(),
            sequence: DashMap::new(),
            capacity,
        }
    }

    /// Register a recipient inbox. Idempotent.
    pub fn register(&self, agent_id: &AgentId) {
        self.inboxes
            .entry(agent_id.clone())
            .or_insert_with(|| Inbox::new(self.capacity));
    }

    /// Non-blocking publish. For `Recipient::Broadcast`, fans out to every
    /// currently-registered inbox except the sender's own.
    pub fn publish(&self, message: Message) {
        match &message.to {
            Recipient::Agent(to) => self.deliver_one(to.clone(), message),
            Recipient::Broadcast => {
                let targets: Vec<AgentId> = self
                    .inboxes
                    .iter()
                    .map(|entry| entry.key().clone())
                    .filter(|id| *id != message.from)
                    .collect();
                for target in targets {
                    self.deliver_one(target, message.clone());
                }
            }
        }
    }

    fn deliver_one(&self, to: AgentId, message: Message) {
        self.sequence
            .entry((message.from.clone(), to.clone()))
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);

        self.inboxes
            .entry(to)
            .or_insert_with(|| Inbox::new(self.capacity))
            .push(message);
    }

    /// Drain all messages queued for `agent_id`, FIFO within this call.
    pub fn poll(&self, agent_id: &AgentId) -> Vec<Message> {
        match self.inboxes.get(agent_id) {
            Some(inbox) => inbox.drain(),
            None => Vec::new(),
        }
    }

    /// Count of messages dropped for a recipient due to overflow.
    pub fn dropped_count(&self, agent_id: &AgentId) -> u64 {
        self.inboxes
            .get(agent_id)
            .map(|i| i.dropped.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MessageKind;
    use chrono::Utc;

    fn msg(from: &str, to: Recipient) -> Message {
        Message {
            from: AgentId::new(from),
            to,
            kind: MessageKind::Coordination,
            payload: serde_json::Value::Null,
            at: Utc::now(),
        }
    }

    #[test]
    fn fifo_per_sender_recipient_pair() {
        let bus = MessageBus::new();
        let a = AgentId::new("a");
        let b = AgentId::new("b");
        bus.register(&a);
        bus.register(&b);

        for i in 0..5 {
            let mut m = msg("a", Recipient::Agent(b.clone()));
            m.payload = serde_json::json!(i);
            bus.publish(m);
        }

        let received = bus.poll(&b);
        let values: Vec<i64> = received
            .iter()
            .map(|m| m.payload.as_i64().unwrap())
            .collect();
        assert_eq!(values, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn overflow_drops_oldest_and_counts() {
        let bus = MessageBus::with_capacity(2);
        let a = AgentId::new("a");
        let b = AgentId::new("b");
        bus.register(&b);

        for i in 0..5 {
            let mut m = msg("a", Recipient::Agent(b.clone()));
            m.payload = serde_json::json!(i);
            bus.publish(m);
        }

        let received = bus.poll(&b);
        let values: Vec<i64> = received
            .iter()
            .map(|m| m.payload.as_i64().unwrap())
            .collect();
        assert_eq!(values, vec![3, 4]);
        assert_eq!(bus.dropped_count(&b), 3);
        let _ = &a;
    }

    #[test]
    fn broadcast_reaches_everyone_but_sender() {
        let bus = MessageBus::new();
        let a = AgentId::new("a");
        let b = AgentId::new("b");
        let c = AgentId::new("c");
        bus.register(&a);
        bus.register(&b);
        bus.register(&c);

        bus.publish(msg("a", Recipient::Broadcast));

        assert_eq!(bus.poll(&a).len(), 0);
        assert_eq!(bus.poll(&b).len(), 1);
        assert_eq!(bus.poll(&c).len(), 1);
    }
}
