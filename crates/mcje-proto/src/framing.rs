//! Length-prefixed frame writer and the rolling-buffer frame splitter.

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::ProtoEncode;
use crate::error::ProtoError;
use crate::types::{VarInt, VarIntError};

/// Upper bound on a single frame. Vanilla caps packets at 2^21 - 1 bytes;
/// anything larger means the stream is corrupt or hostile.
pub const MAX_FRAME_LEN: usize = 0x1f_ffff;

/// Prefix `body` with its VarInt length.
pub fn frame(body: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(body.len() + VarInt::MAX_BYTES);
    VarInt(body.len() as i32).proto_encode(&mut out);
    out.put_slice(body);
    out.freeze()
}

/// Accumulates raw stream bytes and slices out complete length-prefixed
/// frames.
///
/// Partial frames (including a partial length prefix) stay buffered until
/// more data arrives. The splitter must be `reset` on protocol state
/// transitions: leftover bytes belong to the previous state's codec.
#[derive(Debug, Default)]
pub struct Splitter {
    buf: BytesMut,
}

impl Splitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Drop any buffered partial frame.
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    /// Append `chunk` and return every complete frame body now available,
    /// in stream order.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Bytes>, ProtoError> {
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        loop {
            let (length, prefix_len) = match VarInt::decode(&self.buf) {
                Ok((v, n)) => (v.0, n),
                Err(VarIntError::BufferTooShort) => break,
                Err(e @ VarIntError::TooManyBytes { .. }) => return Err(e.into()),
            };
            if length < 0 {
                return Err(ProtoError::NegativeLength(length));
            }
            let length = length as usize;
            if length > MAX_FRAME_LEN {
                return Err(ProtoError::FrameTooLarge {
                    length,
                    limit: MAX_FRAME_LEN,
                });
            }
            if self.buf.len() < prefix_len + length {
                break;
            }
            let _ = self.buf.split_to(prefix_len);
            frames.push(self.buf.split_to(length).freeze());
        }
        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_prefixes_length() {
        let f = frame(b"abc");
        assert_eq!(&f[..], &[0x03, b'a', b'b', b'c']);
    }

    #[test]
    fn frame_empty_body() {
        let f = frame(b"");
        assert_eq!(&f[..], &[0x00]);
    }

    #[test]
    fn split_single() {
        let mut s = Splitter::new();
        let frames = s.feed(&frame(b"hello")).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], b"hello");
        assert_eq!(s.buffered(), 0);
    }

    #[test]
    fn split_concatenated() {
        let mut s = Splitter::new();
        let mut stream = Vec::new();
        stream.extend_from_slice(&frame(b"one"));
        stream.extend_from_slice(&frame(b"two"));
        stream.extend_from_slice(&frame(b"three"));
        let frames = s.feed(&stream).unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(&frames[0][..], b"one");
        assert_eq!(&frames[1][..], b"two");
        assert_eq!(&frames[2][..], b"three");
    }

    #[test]
    fn split_any_partition_yields_same_frames() {
        let mut stream = Vec::new();
        stream.extend_from_slice(&frame(b"alpha"));
        stream.extend_from_slice(&frame(&[0xab; 300]));
        stream.extend_from_slice(&frame(b""));

        for cut in 1..stream.len() {
            let mut s = Splitter::new();
            let mut frames = s.feed(&stream[..cut]).unwrap();
            frames.extend(s.feed(&stream[cut..]).unwrap());
            assert_eq!(frames.len(), 3, "split at {cut}");
            assert_eq!(&frames[0][..], b"alpha");
            assert_eq!(&frames[1][..], &[0xab; 300][..]);
            assert_eq!(&frames[2][..], b"");
        }
    }

    #[test]
    fn partial_length_prefix_stays_buffered() {
        let mut s = Splitter::new();
        // 300-byte frame: length prefix is [0xac, 0x02]. Feed only the
        // continuation byte of the prefix.
        let frames = s.feed(&[0xac]).unwrap();
        assert!(frames.is_empty());
        assert_eq!(s.buffered(), 1);

        let mut rest = vec![0x02];
        rest.extend_from_slice(&[0u8; 300]);
        let frames = s.feed(&rest).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), 300);
    }

    #[test]
    fn reset_discards_partial() {
        let mut s = Splitter::new();
        s.feed(&[0x05, b'a', b'b']).unwrap();
        assert_eq!(s.buffered(), 3);
        s.reset();
        assert_eq!(s.buffered(), 0);
        let frames = s.feed(&frame(b"xyz")).unwrap();
        assert_eq!(&frames[0][..], b"xyz");
    }

    #[test]
    fn oversized_frame_rejected() {
        let mut s = Splitter::new();
        let mut prefix = Vec::new();
        VarInt((MAX_FRAME_LEN + 1) as i32).encode(&mut prefix);
        assert!(matches!(
            s.feed(&prefix),
            Err(ProtoError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn malformed_length_prefix_rejected() {
        let mut s = Splitter::new();
        assert!(s.feed(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x01]).is_err());
    }
}
