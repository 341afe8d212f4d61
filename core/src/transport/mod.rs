// Transport module — the peer session boundary and the loopback test link

pub mod abstraction;
pub mod local;

pub use abstraction::{PeerTransport, TransportError, TransportEvent};
pub use local::{LoopbackEndpoint, LoopbackLink, LoopbackPeer};
