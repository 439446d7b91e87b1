//! Payload codec
//!
//! Every frame crossing the transport goes through the codec: Snappy raw
//! block compression when the session has compression enabled, identity
//! pass-through otherwise. Both ends of the tunnel must use the same
//! setting; the frames carry no marker.

use crate::error::{Error, Result};

/// Per-session payload codec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// Frames carry the raw packet bytes
    Passthrough,
    /// Frames carry a Snappy raw block
    Snappy,
}

impl Codec {
    pub fn new(compress: bool) -> Self {
        if compress {
            Codec::Snappy
        } else {
            Codec::Passthrough
        }
    }

    /// Encode one outgoing packet into a frame payload
    pub fn encode(&self, packet: &[u8]) -> Result<Vec<u8>> {
        match self {
            Codec::Passthrough => Ok(packet.to_vec()),
            Codec::Snappy => snap::raw::Encoder::new()
                .compress_vec(packet)
                .map_err(|e| Error::Codec(format!("compress failed: {}", e))),
        }
    }

    /// Decode one incoming frame payload into a packet
    pub fn decode(&self, frame: &[u8]) -> Result<Vec<u8>> {
        match self {
            Codec::Passthrough => Ok(frame.to_vec()),
            Codec::Snappy => snap::raw::Decoder::new()
                .decompress_vec(frame)
                .map_err(|e| Error::Codec(format!("decompress failed: {}", e))),
        }
    }
}
