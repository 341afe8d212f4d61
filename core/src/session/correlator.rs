// Request/response correlator — matches replies to in-flight requests
//
// One pending entry per correlation id, holding the single-use completion.
// Resolution consumes the entry, so a completion can never fire twice;
// every failure path in the session manager routes through `fail` so it
// can never fire zero times either. Unknown ids are expected under retry
// semantics and are dropped silently.

use crate::message::TranslationResponse;
use crate::RelayError;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

/// The typed completion waiting on a correlation id
pub enum PendingReply {
    Translation(oneshot::Sender<Result<TranslationResponse, RelayError>>),
    Credits(oneshot::Sender<Result<u32, RelayError>>),
    Ack(oneshot::Sender<Result<(), RelayError>>),
}

struct PendingEntry {
    reply: PendingReply,
    registered_at: Instant,
}

/// Map of in-flight request id → single-use completion
pub struct Correlator {
    pending: HashMap<String, PendingEntry>,
}

impl Correlator {
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
        }
    }

    /// Register a completion before dispatch. An id is never reused for a
    /// new logical request while the old one is unresolved; if that
    /// invariant is ever violated the superseded sender is dropped, which
    /// resolves its receiver with a shutdown error.
    pub fn register(&mut self, id: impl Into<String>, reply: PendingReply, now: Instant) {
        let id = id.into();
        if self
            .pending
            .insert(
                id.clone(),
                PendingEntry {
                    reply,
                    registered_at: now,
                },
            )
            .is_some()
        {
            warn!("pending entry for {} superseded", id);
        }
    }

    /// Deliver a translation outcome. Returns false for unknown/stale ids.
    pub fn resolve_translation(
        &mut self,
        id: &str,
        outcome: Result<TranslationResponse, RelayError>,
    ) -> bool {
        match self.pending.remove(id) {
            Some(PendingEntry {
                reply: PendingReply::Translation(tx),
                ..
            }) => {
                let _ = tx.send(outcome);
                true
            }
            Some(entry) => {
                self.fail_entry(id, entry, RelayError::Peer("reply type mismatch".to_string()));
                false
            }
            None => {
                debug!("discarding stale or unknown response for {}", id);
                false
            }
        }
    }

    /// Deliver a credits figure. Returns false for unknown/stale ids.
    pub fn resolve_credits(&mut self, id: &str, credits: u32) -> bool {
        match self.pending.remove(id) {
            Some(PendingEntry {
                reply: PendingReply::Credits(tx),
                ..
            }) => {
                let _ = tx.send(Ok(credits));
                true
            }
            Some(entry) => {
                self.fail_entry(id, entry, RelayError::Peer("reply type mismatch".to_string()));
                false
            }
            None => {
                debug!("discarding stale or unknown credits update for {}", id);
                false
            }
        }
    }

    /// Deliver an acknowledgment. Returns false for unknown/stale ids.
    pub fn resolve_ack(&mut self, id: &str) -> bool {
        match self.pending.remove(id) {
            Some(PendingEntry {
                reply: PendingReply::Ack(tx),
                ..
            }) => {
                let _ = tx.send(Ok(()));
                true
            }
            Some(entry) => {
                self.fail_entry(id, entry, RelayError::Peer("reply type mismatch".to_string()));
                false
            }
            None => {
                debug!("discarding stale or unknown ack for {}", id);
                false
            }
        }
    }

    /// Resolve an entry with a failure. Returns false if nothing was pending.
    pub fn fail(&mut self, id: &str, error: RelayError) -> bool {
        match self.pending.remove(id) {
            Some(entry) => {
                self.fail_entry(id, entry, error);
                true
            }
            None => false,
        }
    }

    /// Fail every pending entry, e.g. on shutdown
    pub fn fail_all(&mut self, error: RelayError) {
        for (id, entry) in self.pending.drain().collect::<Vec<_>>() {
            debug!("failing pending request {}: {}", id, error);
            match entry.reply {
                PendingReply::Translation(tx) => {
                    let _ = tx.send(Err(error.clone()));
                }
                PendingReply::Credits(tx) => {
                    let _ = tx.send(Err(error.clone()));
                }
                PendingReply::Ack(tx) => {
                    let _ = tx.send(Err(error.clone()));
                }
            }
        }
    }

    /// Ids of entries registered longer than `timeout` ago
    pub fn expired_ids(&self, now: Instant, timeout: Duration) -> Vec<String> {
        self.pending
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.registered_at) >= timeout)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn fail_entry(&self, id: &str, entry: PendingEntry, error: RelayError) {
        warn!("failing pending request {}: {}", id, error);
        match entry.reply {
            PendingReply::Translation(tx) => {
                let _ = tx.send(Err(error));
            }
            PendingReply::Credits(tx) => {
                let _ = tx.send(Err(error));
            }
            PendingReply::Ack(tx) => {
                let _ = tx.send(Err(error));
            }
        }
    }
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::TranslationResponse;

    #[test]
    fn test_resolve_fires_exactly_once() {
        let mut correlator = Correlator::new();
        let (tx, mut rx) = oneshot::channel();
        correlator.register("a1", PendingReply::Translation(tx), Instant::now());

        let resp = TranslationResponse::success("a1", "hello", "Hola", None, 9);
        assert!(correlator.resolve_translation("a1", Ok(resp)));

        let delivered = rx.try_recv().unwrap().unwrap();
        assert_eq!(delivered.translated_text, "Hola");

        // Second response with the same id is a silent no-op
        let dup = TranslationResponse::success("a1", "hello", "Hola", None, 9);
        assert!(!correlator.resolve_translation("a1", Ok(dup)));
    }

    #[test]
    fn test_unknown_id_does_not_disturb_others() {
        let mut correlator = Correlator::new();
        let (tx, mut rx) = oneshot::channel();
        correlator.register("real", PendingReply::Credits(tx), Instant::now());

        assert!(!correlator.resolve_credits("ghost", 3));
        assert_eq!(correlator.len(), 1);

        // The real entry is still resolvable
        assert!(correlator.resolve_credits("real", 3));
        assert_eq!(rx.try_recv().unwrap().unwrap(), 3);
    }

    #[test]
    fn test_fail_resolves_with_error() {
        let mut correlator = Correlator::new();
        let (tx, mut rx) = oneshot::channel();
        correlator.register("t1", PendingReply::Translation(tx), Instant::now());

        assert!(correlator.fail("t1", RelayError::Timeout));
        assert!(matches!(rx.try_recv().unwrap(), Err(RelayError::Timeout)));

        // Failing again is a no-op
        assert!(!correlator.fail("t1", RelayError::Timeout));
    }

    #[test]
    fn test_fail_all_drains_everything() {
        let mut correlator = Correlator::new();
        let (tx1, mut rx1) = oneshot::channel();
        let (tx2, mut rx2) = oneshot::channel();
        correlator.register("t1", PendingReply::Translation(tx1), Instant::now());
        correlator.register("q1", PendingReply::Ack(tx2), Instant::now());

        correlator.fail_all(RelayError::Shutdown);
        assert!(correlator.is_empty());
        assert!(matches!(rx1.try_recv().unwrap(), Err(RelayError::Shutdown)));
        assert!(matches!(rx2.try_recv().unwrap(), Err(RelayError::Shutdown)));
    }

    #[test]
    fn test_expired_ids() {
        let mut correlator = Correlator::new();
        let now = Instant::now();
        let (tx1, _rx1) = oneshot::channel::<Result<u32, RelayError>>();
        let (tx2, _rx2) = oneshot::channel::<Result<u32, RelayError>>();
        correlator.register("old", PendingReply::Credits(tx1), now);
        correlator.register(
            "young",
            PendingReply::Credits(tx2),
            now + Duration::from_secs(29),
        );

        let later = now + Duration::from_secs(30);
        let expired = correlator.expired_ids(later, Duration::from_secs(30));
        assert_eq!(expired, vec!["old".to_string()]);
    }

    #[test]
    fn test_reply_type_mismatch_fails_entry() {
        let mut correlator = Correlator::new();
        let (tx, mut rx) = oneshot::channel();
        correlator.register("x1", PendingReply::Ack(tx), Instant::now());

        // A credits update arriving for an ack entry resolves it with an error
        assert!(!correlator.resolve_credits("x1", 5));
        assert!(matches!(rx.try_recv().unwrap(), Err(RelayError::Peer(_))));
        assert!(correlator.is_empty());
    }
}
