//! Codec for encoding and decoding Huddle envelopes.
//!
//! Frames are newline-free UTF-8 JSON text. Decoding happens in two steps:
//! the outer envelope first, then the payload according to its type.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::envelope::Envelope;

/// Maximum frame size (1 MiB).
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds maximum size.
    #[error("Frame size {0} exceeds maximum {MAX_FRAME_SIZE}")]
    FrameTooLarge(usize),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Encode an envelope to a JSON text frame.
///
/// # Errors
///
/// Returns an error if the frame is too large or encoding fails.
pub fn encode(envelope: &Envelope) -> Result<Bytes, ProtocolError> {
    let payload = serde_json::to_vec(envelope)?;

    if payload.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(payload.len()));
    }

    Ok(Bytes::from(payload))
}

/// Decode the outer envelope of a frame.
///
/// # Errors
///
/// Returns an error if the frame is too large or is not a JSON envelope.
pub fn decode(data: &[u8]) -> Result<Envelope, ProtocolError> {
    if data.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(data.len()));
    }

    Ok(serde_json::from_slice(data)?)
}

/// Decode the payload of an envelope into its typed schema.
///
/// # Errors
///
/// Returns an error if `data` does not match `T`.
pub fn decode_payload<T: DeserializeOwned>(envelope: Envelope) -> Result<T, ProtocolError> {
    Ok(serde_json::from_value(envelope.data)?)
}
