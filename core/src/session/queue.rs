// Outbound queue — buffers relay messages until the peer can take them
//
// Messages wait here while the peer is unreachable and come back here
// between retry attempts. The queue owns ordering and retry bookkeeping
// only; completion callbacks live in the correlator.

use crate::message::{MessageKind, RelayFrame};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// A message waiting for dispatch
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    /// Correlation id, shared with the pending-reply entry
    pub id: String,
    /// Kind, for accounting and log lines
    pub kind: MessageKind,
    /// The frame to put on the wire
    pub frame: RelayFrame,
    /// When this message first entered the queue
    pub enqueued_at: Instant,
    /// Retries consumed so far
    pub retry_count: u32,
    /// Retry budget for this message
    pub max_retries: u32,
    /// Earliest instant the next dispatch attempt may run
    pub next_attempt: Instant,
}

impl QueuedMessage {
    /// Wrap a frame for queueing with a fresh retry budget
    pub fn new(frame: RelayFrame, max_retries: u32, now: Instant) -> Self {
        Self {
            id: frame.correlation_id().to_string(),
            kind: frame.kind(),
            frame,
            enqueued_at: now,
            retry_count: 0,
            max_retries,
            next_attempt: now,
        }
    }
}

/// Ordered outbound buffer with a hard capacity
pub struct MessageQueue {
    entries: VecDeque<QueuedMessage>,
    capacity: usize,
}

impl MessageQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
        }
    }

    /// Append a message. On a full queue the message is handed back so the
    /// caller can fail its completion.
    pub fn enqueue(&mut self, msg: QueuedMessage) -> Result<(), QueuedMessage> {
        if self.entries.len() >= self.capacity {
            return Err(msg);
        }
        self.entries.push_back(msg);
        Ok(())
    }

    /// Pop up to `limit` messages whose retry delay has elapsed, preserving
    /// their relative order. Messages still waiting on a retry delay keep
    /// their position.
    pub fn take_ready(&mut self, now: Instant, limit: usize) -> Vec<QueuedMessage> {
        let mut ready = Vec::new();
        let mut rest = VecDeque::with_capacity(self.entries.len());

        while let Some(msg) = self.entries.pop_front() {
            if ready.len() < limit && msg.next_attempt <= now {
                ready.push(msg);
            } else {
                rest.push_back(msg);
            }
        }
        self.entries = rest;
        ready
    }

    /// Put a failed message back with its retry count bumped and the next
    /// attempt pushed out exponentially. Hands the message back once the
    /// retry budget is spent so the caller can fail it permanently.
    pub fn requeue_for_retry(
        &mut self,
        mut msg: QueuedMessage,
        base_delay: Duration,
        now: Instant,
    ) -> Result<(), QueuedMessage> {
        if msg.retry_count >= msg.max_retries {
            return Err(msg);
        }
        msg.retry_count += 1;
        // Strictly increasing per attempt: base, 2*base, 4*base, ...
        let shift = msg.retry_count.min(16);
        msg.next_attempt = now + base_delay * (1u32 << shift) / 2;
        self.enqueue(msg)
    }

    /// Remove and return every message older than `timeout`, regardless of
    /// remaining retries.
    pub fn remove_expired(&mut self, now: Instant, timeout: Duration) -> Vec<QueuedMessage> {
        let mut expired = Vec::new();
        let mut rest = VecDeque::with_capacity(self.entries.len());

        while let Some(msg) = self.entries.pop_front() {
            if now.duration_since(msg.enqueued_at) >= timeout {
                expired.push(msg);
            } else {
                rest.push_back(msg);
            }
        }
        self.entries = rest;
        expired
    }

    /// Remove a specific message by id
    pub fn remove(&mut self, id: &str) -> Option<QueuedMessage> {
        let pos = self.entries.iter().position(|m| m.id == id)?;
        self.entries.remove(pos)
    }

    /// Empty the queue, returning everything that was waiting
    pub fn drain_all(&mut self) -> Vec<QueuedMessage> {
        self.entries.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_msg(id: &str, max_retries: u32, now: Instant) -> QueuedMessage {
        let frame = RelayFrame::CreditsQuery { id: id.to_string() };
        QueuedMessage::new(frame, max_retries, now)
    }

    #[test]
    fn test_enqueue_and_take_preserves_order() {
        let now = Instant::now();
        let mut queue = MessageQueue::new(10);
        queue.enqueue(make_msg("m1", 3, now)).unwrap();
        queue.enqueue(make_msg("m2", 3, now)).unwrap();
        queue.enqueue(make_msg("m3", 3, now)).unwrap();

        let batch = queue.take_ready(now, 2);
        assert_eq!(
            batch.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(),
            vec!["m1", "m2"]
        );
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_full_queue_rejects() {
        let now = Instant::now();
        let mut queue = MessageQueue::new(1);
        queue.enqueue(make_msg("m1", 3, now)).unwrap();

        let rejected = queue.enqueue(make_msg("m2", 3, now));
        assert_eq!(rejected.unwrap_err().id, "m2");
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_retry_delay_strictly_increases() {
        let now = Instant::now();
        let base = Duration::from_millis(500);
        let mut queue = MessageQueue::new(10);

        let mut msg = make_msg("m1", 5, now);
        let mut last_delay = Duration::ZERO;
        for _ in 0..5 {
            queue.requeue_for_retry(msg, base, now).unwrap();
            msg = queue.take_ready(now + Duration::from_secs(3600), 1).remove(0);
            let delay = msg.next_attempt.duration_since(now);
            assert!(delay > last_delay, "retry delay must strictly increase");
            last_delay = delay;
        }
    }

    #[test]
    fn test_retry_budget_exhaustion() {
        let now = Instant::now();
        let base = Duration::from_millis(100);
        let mut queue = MessageQueue::new(10);

        let mut msg = make_msg("m1", 2, now);
        msg.retry_count = 2;

        let back = queue.requeue_for_retry(msg, base, now);
        assert_eq!(back.unwrap_err().id, "m1");
        assert!(queue.is_empty());
    }

    #[test]
    fn test_not_ready_messages_stay_queued() {
        let now = Instant::now();
        let base = Duration::from_millis(500);
        let mut queue = MessageQueue::new(10);

        queue
            .requeue_for_retry(make_msg("delayed", 3, now), base, now)
            .unwrap();
        queue.enqueue(make_msg("fresh", 3, now)).unwrap();

        // Only the fresh message is ready right now
        let batch = queue.take_ready(now, 5);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, "fresh");
        assert_eq!(queue.len(), 1);

        // After the delay both would have been ready
        let later = now + Duration::from_secs(2);
        let batch = queue.take_ready(later, 5);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, "delayed");
    }

    #[test]
    fn test_remove_expired_ignores_retry_budget() {
        let now = Instant::now();
        let mut queue = MessageQueue::new(10);
        queue.enqueue(make_msg("old", 99, now)).unwrap();

        let later = now + Duration::from_secs(31);
        queue.enqueue(make_msg("young", 99, later)).unwrap();

        let expired = queue.remove_expired(later, Duration::from_secs(30));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, "old");
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_remove_and_drain() {
        let now = Instant::now();
        let mut queue = MessageQueue::new(10);
        queue.enqueue(make_msg("m1", 3, now)).unwrap();
        queue.enqueue(make_msg("m2", 3, now)).unwrap();

        assert!(queue.remove("m1").is_some());
        assert!(queue.remove("m1").is_none());

        let rest = queue.drain_all();
        assert_eq!(rest.len(), 1);
        assert!(queue.is_empty());
    }
}
