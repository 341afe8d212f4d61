// VoiceLink Relay Core — watch ↔ phone relay protocol
//
// The watch records speech; the phone owns the translation backend. This
// crate is the channel between them: message queuing with retry and
// backoff, a peer-session state machine, health-check quality estimation,
// and request/response correlation over an unreliable transport.

pub mod config;
pub mod message;
pub mod session;
pub mod transport;

use thiserror::Error;

pub use config::RelayConfig;
pub use message::{
    AudioPayload, MessageKind, RelayFrame, TranslationRequest, TranslationResponse,
};
pub use session::health::{ConnectionQuality, QualityThresholds};
pub use session::manager::{LinkStatus, SessionHandle, SessionManager, TranslationHandler};
pub use session::state::ConnectionState;
pub use transport::{PeerTransport, TransportError, TransportEvent};

/// Terminal outcomes surfaced to callers through their completion.
///
/// Transient conditions (a failed send with retries left, a dropped
/// reachability window) are absorbed by the queue and state machine and
/// never reach the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    #[error("Request timed out")]
    Timeout,
    #[error("Delivery failed after {0} attempts")]
    RetriesExhausted(u32),
    #[error("Message queue is full")]
    QueueFull,
    #[error("Message queue was cleared")]
    QueueCleared,
    #[error("Peer reported an error: {0}")]
    Peer(String),
    #[error("Relay session shut down")]
    Shutdown,
}
