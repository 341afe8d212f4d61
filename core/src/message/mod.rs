// Message module — typed frames and serialization for the relay protocol

pub mod codec;
pub mod types;

pub use codec::{decode_frame, encode_frame, MAX_FRAME_SIZE};
pub use types::{
    AudioPayload, MessageKind, RelayFrame, TranslationRequest, TranslationResponse,
};
