//! Little-endian varint NBT dialect: zigzag+varint ints and counts, varint
//! string lengths, little-endian floats and shorts.

use bytes::{Buf, BufMut};
use mcje_proto::codec::{ProtoDecode, ProtoEncode};
use mcje_proto::types::{VarInt, VarLong};

use crate::error::NbtError;
use crate::io::NbtDialect;

pub(crate) struct LeVarintDialect;

fn need(buf: &impl Buf, n: usize) -> Result<(), NbtError> {
    if buf.remaining() < n {
        Err(NbtError::UnexpectedEof)
    } else {
        Ok(())
    }
}

#[inline]
fn zigzag_encode_32(v: i32) -> u32 {
    ((v << 1) ^ (v >> 31)) as u32
}

#[inline]
fn zigzag_decode_32(v: u32) -> i32 {
    (v >> 1) as i32 ^ -((v & 1) as i32)
}

#[inline]
fn zigzag_encode_64(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

#[inline]
fn zigzag_decode_64(v: u64) -> i64 {
    (v >> 1) as i64 ^ -((v & 1) as i64)
}

fn write_zigzag_32(buf: &mut impl BufMut, value: i32) {
    VarInt(zigzag_encode_32(value) as i32).proto_encode(buf);
}

fn read_zigzag_32(buf: &mut impl Buf) -> Result<i32, NbtError> {
    let raw = VarInt::proto_decode(buf).map_err(|e| NbtError::VarInt(e.to_string()))?;
    Ok(zigzag_decode_32(raw.0 as u32))
}

fn write_zigzag_64(buf: &mut impl BufMut, value: i64) {
    VarLong(zigzag_encode_64(value) as i64).proto_encode(buf);
}

fn read_zigzag_64(buf: &mut impl Buf) -> Result<i64, NbtError> {
    let raw = VarLong::proto_decode(buf).map_err(|e| NbtError::VarInt(e.to_string()))?;
    Ok(zigzag_decode_64(raw.0 as u64))
}

impl NbtDialect for LeVarintDialect {
    fn write_i16(buf: &mut impl BufMut, value: i16) {
        buf.put_i16_le(value);
    }

    fn read_i16(buf: &mut impl Buf) -> Result<i16, NbtError> {
        need(buf, 2)?;
        Ok(buf.get_i16_le())
    }

    fn write_i32(buf: &mut impl BufMut, value: i32) {
        write_zigzag_32(buf, value);
    }

    fn read_i32(buf: &mut impl Buf) -> Result<i32, NbtError> {
        read_zigzag_32(buf)
    }

    fn write_i64(buf: &mut impl BufMut, value: i64) {
        write_zigzag_64(buf, value);
    }

    fn read_i64(buf: &mut impl Buf) -> Result<i64, NbtError> {
        read_zigzag_64(buf)
    }

    fn write_f32(buf: &mut impl BufMut, value: f32) {
        buf.put_f32_le(value);
    }

    fn read_f32(buf: &mut impl Buf) -> Result<f32, NbtError> {
        need(buf, 4)?;
        Ok(buf.get_f32_le())
    }

    fn write_f64(buf: &mut impl BufMut, value: f64) {
        buf.put_f64_le(value);
    }

    fn read_f64(buf: &mut impl Buf) -> Result<f64, NbtError> {
        need(buf, 8)?;
        Ok(buf.get_f64_le())
    }

    fn write_array_len(buf: &mut impl BufMut, len: i32) {
        write_zigzag_32(buf, len);
    }

    fn read_array_len(buf: &mut impl Buf) -> Result<i32, NbtError> {
        read_zigzag_32(buf)
    }

    fn write_string_len(buf: &mut impl BufMut, len: usize) {
        // Plain unsigned varint, no zigzag.
        VarInt(len as i32).proto_encode(buf);
    }

    fn read_string_len(buf: &mut impl Buf) -> Result<usize, NbtError> {
        let raw = VarInt::proto_decode(buf).map_err(|e| NbtError::VarInt(e.to_string()))?;
        Ok(raw.0 as u32 as usize)
    }
}
