//! Loopback transport — an in-process peer pair
//!
//! Connects two session managers through shared memory with controllable
//! reachability and fault injection. This is the transport used by the
//! integration tests and the CLI demo; the real device-pairing channel
//! implements the same trait on the platform side.

use crate::transport::abstraction::{PeerTransport, TransportError, TransportEvent};
use crate::message::MAX_FRAME_SIZE;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Which end of the link an endpoint occupies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    A,
    B,
}

struct LinkState {
    /// Whether either peer can currently reach the other
    reachable: bool,
    /// Remaining injected send failures (u32::MAX = fail indefinitely)
    fail_sends: u32,
    /// Injected activation failure reason
    activation_error: Option<String>,
    /// Total send attempts, including failed ones
    send_attempts: u64,
    /// Frames actually delivered to a peer
    delivered: u64,
}

struct LinkInner {
    state: Mutex<LinkState>,
    a_events: mpsc::Sender<TransportEvent>,
    b_events: mpsc::Sender<TransportEvent>,
}

impl LinkInner {
    fn events_for(&self, side: Side) -> &mpsc::Sender<TransportEvent> {
        match side {
            Side::A => &self.a_events,
            Side::B => &self.b_events,
        }
    }

    fn peer_of(&self, side: Side) -> &mpsc::Sender<TransportEvent> {
        match side {
            Side::A => &self.b_events,
            Side::B => &self.a_events,
        }
    }
}

/// One endpoint of a loopback link; hand it to a session manager
pub struct LoopbackEndpoint {
    inner: Arc<LinkInner>,
    side: Side,
}

/// An endpoint bundled with its event stream
pub struct LoopbackPeer {
    /// The transport to inject into a session manager
    pub transport: Arc<LoopbackEndpoint>,
    /// Events the manager must consume
    pub events: mpsc::Receiver<TransportEvent>,
}

/// Control handle over a loopback link — reachability, fault injection,
/// and traffic counters
#[derive(Clone)]
pub struct LoopbackLink {
    inner: Arc<LinkInner>,
}

impl LoopbackLink {
    /// Create a link and its two endpoints. The link starts unreachable;
    /// call `set_reachable(true)` once both sides are wired up.
    pub fn pair() -> (LoopbackLink, LoopbackPeer, LoopbackPeer) {
        let (a_tx, a_rx) = mpsc::channel(64);
        let (b_tx, b_rx) = mpsc::channel(64);

        let inner = Arc::new(LinkInner {
            state: Mutex::new(LinkState {
                reachable: false,
                fail_sends: 0,
                activation_error: None,
                send_attempts: 0,
                delivered: 0,
            }),
            a_events: a_tx,
            b_events: b_tx,
        });

        let peer_a = LoopbackPeer {
            transport: Arc::new(LoopbackEndpoint {
                inner: Arc::clone(&inner),
                side: Side::A,
            }),
            events: a_rx,
        };
        let peer_b = LoopbackPeer {
            transport: Arc::new(LoopbackEndpoint {
                inner: Arc::clone(&inner),
                side: Side::B,
            }),
            events: b_rx,
        };

        (LoopbackLink { inner }, peer_a, peer_b)
    }

    /// Flip reachability; both endpoints observe the change
    pub fn set_reachable(&self, reachable: bool) {
        self.inner.state.lock().reachable = reachable;
        self.broadcast(TransportEvent::ReachabilityChanged(reachable));
    }

    /// Flip reachability without emitting the delegate callback, for tests
    /// that pin down exactly which events a session has seen
    pub fn set_reachable_silent(&self, reachable: bool) {
        self.inner.state.lock().reachable = reachable;
    }

    /// Simulate an OS-level network path change
    pub fn set_network_online(&self, online: bool) {
        self.broadcast(TransportEvent::NetworkPathChanged { online });
    }

    /// Every subsequent send fails until `restore_sends`
    pub fn fail_sends_forever(&self) {
        self.inner.state.lock().fail_sends = u32::MAX;
    }

    /// Fail exactly the next `n` send attempts, then succeed again
    pub fn fail_next_sends(&self, n: u32) {
        self.inner.state.lock().fail_sends = n;
    }

    /// Clear injected send failures
    pub fn restore_sends(&self) {
        self.inner.state.lock().fail_sends = 0;
    }

    /// Make future activation attempts report the given failure
    pub fn set_activation_error(&self, reason: Option<String>) {
        self.inner.state.lock().activation_error = reason;
    }

    /// Total send attempts across both endpoints, including failures
    pub fn send_attempts(&self) -> u64 {
        self.inner.state.lock().send_attempts
    }

    /// Frames actually delivered to a peer
    pub fn delivered_frames(&self) -> u64 {
        self.inner.state.lock().delivered
    }

    fn broadcast(&self, event: TransportEvent) {
        for tx in [&self.inner.a_events, &self.inner.b_events] {
            if tx.try_send(event.clone()).is_err() {
                debug!("loopback event dropped: {}", event);
            }
        }
    }
}

impl LoopbackEndpoint {
    /// Bookkeeping shared by send_frame and transfer_file. Returns Ok when
    /// the payload should be delivered.
    fn prepare_send(&self, len: usize) -> Result<(), TransportError> {
        let mut state = self.inner.state.lock();
        state.send_attempts += 1;

        if len > MAX_FRAME_SIZE {
            return Err(TransportError::FrameTooLarge(len));
        }
        if !state.reachable {
            return Err(TransportError::Unreachable);
        }
        if state.fail_sends > 0 {
            if state.fail_sends != u32::MAX {
                state.fail_sends -= 1;
            }
            return Err(TransportError::SendFailed("injected failure".to_string()));
        }

        state.delivered += 1;
        Ok(())
    }
}

#[async_trait]
impl PeerTransport for LoopbackEndpoint {
    async fn activate(&self) -> Result<(), TransportError> {
        let error = self.inner.state.lock().activation_error.clone();
        let event = TransportEvent::ActivationCompleted { error };
        self.inner
            .events_for(self.side)
            .send(event)
            .await
            .map_err(|_| TransportError::ActivationFailed("link torn down".to_string()))?;
        Ok(())
    }

    fn is_reachable(&self) -> bool {
        self.inner.state.lock().reachable
    }

    async fn send_frame(&self, bytes: Vec<u8>) -> Result<(), TransportError> {
        self.prepare_send(bytes.len())?;
        self.inner
            .peer_of(self.side)
            .send(TransportEvent::FrameReceived(bytes))
            .await
            .map_err(|_| TransportError::SendFailed("peer gone".to_string()))
    }

    async fn transfer_file(
        &self,
        bytes: Vec<u8>,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<(), TransportError> {
        self.prepare_send(bytes.len())?;
        self.inner
            .peer_of(self.side)
            .send(TransportEvent::FileReceived {
                data: bytes,
                metadata,
            })
            .await
            .map_err(|_| TransportError::SendFailed("peer gone".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_cross_the_link() {
        let (link, a, mut b) = LoopbackLink::pair();
        link.set_reachable(true);

        a.transport.send_frame(vec![1, 2, 3]).await.unwrap();

        // First event on B is the reachability flip, then the frame
        let mut saw_frame = false;
        while let Ok(event) = b.events.try_recv() {
            if let TransportEvent::FrameReceived(data) = event {
                assert_eq!(data, vec![1, 2, 3]);
                saw_frame = true;
            }
        }
        assert!(saw_frame);
        assert_eq!(link.delivered_frames(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_link_rejects_sends() {
        let (link, a, _b) = LoopbackLink::pair();

        let result = a.transport.send_frame(vec![0]).await;
        assert!(matches!(result, Err(TransportError::Unreachable)));
        assert_eq!(link.send_attempts(), 1);
        assert_eq!(link.delivered_frames(), 0);
    }

    #[tokio::test]
    async fn test_injected_failures_count_down() {
        let (link, a, mut b) = LoopbackLink::pair();
        link.set_reachable(true);
        link.fail_next_sends(2);

        assert!(a.transport.send_frame(vec![1]).await.is_err());
        assert!(a.transport.send_frame(vec![2]).await.is_err());
        assert!(a.transport.send_frame(vec![3]).await.is_ok());
        assert_eq!(link.send_attempts(), 3);

        let mut delivered = Vec::new();
        while let Ok(event) = b.events.try_recv() {
            if let TransportEvent::FrameReceived(data) = event {
                delivered.push(data);
            }
        }
        assert_eq!(delivered, vec![vec![3]]);
    }

    #[tokio::test]
    async fn test_activation_error_injection() {
        let (link, mut a, _b) = LoopbackLink::pair();
        link.set_activation_error(Some("session denied".to_string()));

        a.transport.activate().await.unwrap();

        match a.events.recv().await {
            Some(TransportEvent::ActivationCompleted { error }) => {
                assert_eq!(error.as_deref(), Some("session denied"));
            }
            other => panic!("Unexpected event: {:?}", other.map(|e| e.to_string())),
        }
    }

    #[tokio::test]
    async fn test_file_transfer_carries_metadata() {
        let (link, a, mut b) = LoopbackLink::pair();
        link.set_reachable(true);

        let mut metadata = HashMap::new();
        metadata.insert(
            "kind".to_string(),
            serde_json::Value::String("translation-request".to_string()),
        );
        a.transport
            .transfer_file(vec![9, 9], metadata)
            .await
            .unwrap();

        let mut saw_file = false;
        while let Ok(event) = b.events.try_recv() {
            if let TransportEvent::FileReceived { data, metadata } = event {
                assert_eq!(data, vec![9, 9]);
                assert_eq!(
                    metadata.get("kind").and_then(|v| v.as_str()),
                    Some("translation-request")
                );
                saw_file = true;
            }
        }
        assert!(saw_file);
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (link, a, _b) = LoopbackLink::pair();
        link.set_reachable(true);

        let result = a.transport.send_frame(vec![0u8; MAX_FRAME_SIZE + 1]).await;
        assert!(matches!(result, Err(TransportError::FrameTooLarge(_))));
    }
}
