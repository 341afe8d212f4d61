// Frame codec — serialization with size limits to prevent abuse

use super::types::RelayFrame;
use anyhow::{bail, Result};

/// Maximum encoded frame size: 4 MB
/// Inline audio clips dominate frame size; anything bigger must ride the
/// file-transfer lane.
pub const MAX_FRAME_SIZE: usize = 4 * 1024 * 1024;

/// Serialize a RelayFrame to bytes (bincode)
pub fn encode_frame(frame: &RelayFrame) -> Result<Vec<u8>> {
    let bytes = bincode::serialize(frame)?;

    if bytes.len() > MAX_FRAME_SIZE {
        bail!(
            "Encoded frame too large: {} bytes (max {})",
            bytes.len(),
            MAX_FRAME_SIZE
        );
    }

    Ok(bytes)
}

/// Deserialize bytes to a RelayFrame
pub fn decode_frame(bytes: &[u8]) -> Result<RelayFrame> {
    if bytes.len() > MAX_FRAME_SIZE {
        bail!(
            "Frame too large: {} bytes (max {})",
            bytes.len(),
            MAX_FRAME_SIZE
        );
    }

    let frame: RelayFrame = bincode::deserialize(bytes)?;
    Ok(frame)
}
