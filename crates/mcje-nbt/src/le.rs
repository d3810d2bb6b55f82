//! Little-endian fixed-width NBT dialect (other editions' disk format).

use bytes::{Buf, BufMut};

use crate::error::NbtError;
use crate::io::NbtDialect;

pub(crate) struct LeDialect;

fn need(buf: &impl Buf, n: usize) -> Result<(), NbtError> {
    if buf.remaining() < n {
        Err(NbtError::UnexpectedEof)
    } else {
        Ok(())
    }
}

impl NbtDialect for LeDialect {
    fn write_i16(buf: &mut impl BufMut, value: i16) {
        buf.put_i16_le(value);
    }

    fn read_i16(buf: &mut impl Buf) -> Result<i16, NbtError> {
        need(buf, 2)?;
        Ok(buf.get_i16_le())
    }

    fn write_i32(buf: &mut impl BufMut, value: i32) {
        buf.put_i32_le(value);
    }

    fn read_i32(buf: &mut impl Buf) -> Result<i32, NbtError> {
        need(buf, 4)?;
        Ok(buf.get_i32_le())
    }

    fn write_i64(buf: &mut impl BufMut, value: i64) {
        buf.put_i64_le(value);
    }

    fn read_i64(buf: &mut impl Buf) -> Result<i64, NbtError> {
        need(buf, 8)?;
        Ok(buf.get_i64_le())
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
        buf.put_i32_le(len);
    }

    fn read_array_len(buf: &mut impl Buf) -> Result<i32, NbtError> {
        need(buf, 4)?;
        Ok(buf.get_i32_le())
    }

    fn write_string_len(buf: &mut impl BufMut, len: usize) {
        buf.put_u16_le(len as u16);
    }

    fn read_string_len(buf: &mut impl Buf) -> Result<usize, NbtError> {
        need(buf, 2)?;
        Ok(buf.get_u16_le() as usize)
    }
}
