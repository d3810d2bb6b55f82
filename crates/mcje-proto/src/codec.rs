//! Protocol encoding/decoding traits and helpers.

use bytes::{Buf, BufMut};
use uuid::Uuid;

use crate::error::ProtoError;
use crate::types::VarInt;

/// Encode a value onto a buffer.
pub trait ProtoEncode {
    fn proto_encode(&self, buf: &mut impl BufMut);
}

/// Decode a value from a buffer.
pub trait ProtoDecode: Sized {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError>;
}

/// Write a Java protocol string (VarInt length + UTF-8).
pub fn write_string(buf: &mut impl BufMut, s: &str) {
    VarInt(s.len() as i32).proto_encode(buf);
    buf.put_slice(s.as_bytes());
}

/// Read a Java protocol string (VarInt length + UTF-8).
pub fn read_string(buf: &mut impl Buf) -> Result<String, ProtoError> {
    let len = VarInt::proto_decode(buf)?.0;
    if len < 0 {
        return Err(ProtoError::NegativeLength(len));
    }
    let len = len as usize;
    if buf.remaining() < len {
        return Err(ProtoError::BufferTooShort {
            needed: len,
            remaining: buf.remaining(),
        });
    }
    let data = buf.copy_to_bytes(len);
    String::from_utf8(data.to_vec()).map_err(|_| ProtoError::InvalidUtf8)
}

/// Write a UUID as sixteen big-endian bytes.
pub fn write_uuid(buf: &mut impl BufMut, uuid: &Uuid) {
    buf.put_slice(uuid.as_bytes());
}

/// Read a UUID from sixteen big-endian bytes.
pub fn read_uuid(buf: &mut impl Buf) -> Result<Uuid, ProtoError> {
    if buf.remaining() < 16 {
        return Err(ProtoError::BufferTooShort {
            needed: 16,
            remaining: buf.remaining(),
        });
    }
    let mut bytes = [0u8; 16];
    buf.copy_to_slice(&mut bytes);
    Ok(Uuid::from_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn string_roundtrip() {
        let mut buf = BytesMut::new();
        write_string(&mut buf, "Hello, Java Edition!");
        let result = read_string(&mut buf.freeze()).unwrap();
        assert_eq!(result, "Hello, Java Edition!");
    }

    #[test]
    fn string_empty() {
        let mut buf = BytesMut::new();
        write_string(&mut buf, "");
        let result = read_string(&mut buf.freeze()).unwrap();
        assert_eq!(result, "");
    }

    #[test]
    fn string_unicode() {
        let mut buf = BytesMut::new();
        write_string(&mut buf, "日本語テスト");
        let result = read_string(&mut buf.freeze()).unwrap();
        assert_eq!(result, "日本語テスト");
    }

    #[test]
    fn string_buffer_too_short() {
        let mut buf = BytesMut::new();
        write_string(&mut buf, "Hello");
        let truncated = buf.freeze().slice(..3);
        assert!(read_string(&mut truncated.clone()).is_err());
    }

    #[test]
    fn uuid_roundtrip() {
        let uuid = Uuid::from_u128(0x0123456789abcdef_fedcba9876543210);
        let mut buf = BytesMut::new();
        write_uuid(&mut buf, &uuid);
        assert_eq!(buf.len(), 16);
        let decoded = read_uuid(&mut buf.freeze()).unwrap();
        assert_eq!(decoded, uuid);
    }

    #[test]
    fn uuid_canonical_display() {
        let uuid = Uuid::from_u128(0x0123456789abcdef_fedcba9876543210);
        assert_eq!(
            uuid.to_string(),
            "01234567-89ab-cdef-fedc-ba9876543210",
            "hyphenated lower-case 8-4-4-4-12"
        );
    }
}
