//! Threshold compression for frame bodies.
//!
//! Once the server sends `compress { threshold }`, every frame body becomes
//! `VarInt(uncompressed_length) ‖ data`. A zero length marks raw data; a
//! sender only deflates payloads at or above the threshold.

use std::io::{Read, Write};

use bytes::{BufMut, Bytes, BytesMut};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::codec::ProtoEncode;
use crate::error::ProtoError;
use crate::types::VarInt;

/// Stateless encoder/decoder for the compression layer of the pipeline.
#[derive(Debug, Clone, Copy)]
pub struct Compressor {
    /// Minimum payload size that gets deflated. Negative disables the layer
    /// entirely (pre-`compress` connections).
    threshold: i32,
}

impl Compressor {
    pub fn new(threshold: i32) -> Self {
        Self { threshold }
    }

    /// A compressor for a connection that has not negotiated compression.
    pub fn disabled() -> Self {
        Self { threshold: -1 }
    }

    pub fn enabled(&self) -> bool {
        self.threshold >= 0
    }

    pub fn threshold(&self) -> i32 {
        self.threshold
    }

    /// Wrap a serialized packet into a frame body.
    pub fn encode(&self, packet: &[u8]) -> Result<Bytes, ProtoError> {
        if !self.enabled() {
            return Ok(Bytes::copy_from_slice(packet));
        }

        let mut out = BytesMut::new();
        if packet.len() >= self.threshold as usize {
            VarInt(packet.len() as i32).proto_encode(&mut out);
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder
                .write_all(packet)
                .map_err(|e| ProtoError::CompressError(e.to_string()))?;
            let deflated = encoder
                .finish()
                .map_err(|e| ProtoError::CompressError(e.to_string()))?;
            out.put_slice(&deflated);
        } else {
            VarInt(0).proto_encode(&mut out);
            out.put_slice(packet);
        }
        Ok(out.freeze())
    }

    /// Unwrap a frame body back into a serialized packet.
    pub fn decode(&self, body: &[u8]) -> Result<Bytes, ProtoError> {
        if !self.enabled() {
            return Ok(Bytes::copy_from_slice(body));
        }

        let (declared, consumed) = VarInt::decode(body)?;
        let data = &body[consumed..];
        if declared.0 == 0 {
            return Ok(Bytes::copy_from_slice(data));
        }
        if declared.0 < 0 {
            return Err(ProtoError::NegativeLength(declared.0));
        }

        let mut decoder = ZlibDecoder::new(data);
        let mut inflated = Vec::with_capacity(declared.0 as usize);
        decoder
            .read_to_end(&mut inflated)
            .map_err(|e| ProtoError::DecompressError(e.to_string()))?;
        if inflated.len() != declared.0 as usize {
            return Err(ProtoError::DecompressedSizeMismatch {
                declared: declared.0 as usize,
                actual: inflated.len(),
            });
        }
        Ok(Bytes::from(inflated))
    }
}
