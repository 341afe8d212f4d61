//! Transport abstraction layer for the watch↔phone relay
//!
//! Defines the capability surface the session manager consumes. The real
//! peer session primitive (platform device-pairing channel) lives behind
//! this trait; tests and the CLI use the in-process loopback implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Errors that can occur in the transport layer
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum TransportError {
    #[error("Peer not reachable")]
    Unreachable,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Activation failed: {0}")]
    ActivationFailed(String),

    #[error("Frame too large: {0} bytes")]
    FrameTooLarge(usize),
}

/// Events from the transport layer to the session manager.
///
/// The delegate-callback surface of the platform session primitive is
/// flattened into this enum so the session logic can be driven by
/// synthetic events in tests.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Session activation finished; `error` carries the failure reason
    ActivationCompleted { error: Option<String> },
    /// The peer became reachable or unreachable
    ReachabilityChanged(bool),
    /// An encoded frame arrived on the message channel
    FrameReceived(Vec<u8>),
    /// An encoded frame arrived via file transfer, with sender metadata
    FileReceived {
        data: Vec<u8>,
        metadata: HashMap<String, serde_json::Value>,
    },
    /// The OS-level network path changed.
    ///
    /// "The network exists" and "the peer session is usable" are distinct
    /// conditions; the session manager bridges them by attempting a
    /// reconnect when the path comes back while the peer is not connected.
    NetworkPathChanged { online: bool },
}

impl fmt::Display for TransportEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportEvent::ActivationCompleted { error: None } => {
                write!(f, "ActivationCompleted(ok)")
            }
            TransportEvent::ActivationCompleted { error: Some(e) } => {
                write!(f, "ActivationCompleted(error: {})", e)
            }
            TransportEvent::ReachabilityChanged(reachable) => {
                write!(f, "ReachabilityChanged({})", reachable)
            }
            TransportEvent::FrameReceived(data) => {
                write!(f, "FrameReceived({} bytes)", data.len())
            }
            TransportEvent::FileReceived { data, .. } => {
                write!(f, "FileReceived({} bytes)", data.len())
            }
            TransportEvent::NetworkPathChanged { online } => {
                write!(f, "NetworkPathChanged(online: {})", online)
            }
        }
    }
}

/// The peer session primitive as the relay core sees it.
///
/// `activate` requests session activation; the outcome arrives as an
/// `ActivationCompleted` event. `send_frame` and `transfer_file` are
/// asynchronous and non-blocking — a successful return means the transport
/// accepted the payload for delivery, not that the peer processed it.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Request session activation; completion is reported via event
    async fn activate(&self) -> Result<(), TransportError>;

    /// Whether the peer can currently receive messages
    fn is_reachable(&self) -> bool;

    /// Send one encoded frame over the message channel
    async fn send_frame(&self, bytes: Vec<u8>) -> Result<(), TransportError>;

    /// Ship an encoded frame over the file-transfer lane with metadata
    async fn transfer_file(
        &self,
        bytes: Vec<u8>,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<(), TransportError>;
}
