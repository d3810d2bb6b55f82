//! Generic NBT read/write engine, parameterized by dialect.

use bytes::{Buf, BufMut};

use crate::error::NbtError;
use crate::tag::{NbtCompound, NbtRoot, NbtTag};

/// Maximum nesting depth to prevent stack overflow.
const MAX_DEPTH: usize = 512;

/// Abstraction over the three NBT wire dialects. A dialect decides byte
/// order for the fixed-width payloads and the encoding of string lengths
/// and array counts.
pub(crate) trait NbtDialect {
    fn write_i16(buf: &mut impl BufMut, value: i16);
    fn read_i16(buf: &mut impl Buf) -> Result<i16, NbtError>;

    fn write_i32(buf: &mut impl BufMut, value: i32);
    fn read_i32(buf: &mut impl Buf) -> Result<i32, NbtError>;

    fn write_i64(buf: &mut impl BufMut, value: i64);
    fn read_i64(buf: &mut impl Buf) -> Result<i64, NbtError>;

    fn write_f32(buf: &mut impl BufMut, value: f32);
    fn read_f32(buf: &mut impl Buf) -> Result<f32, NbtError>;

    fn write_f64(buf: &mut impl BufMut, value: f64);
    fn read_f64(buf: &mut impl Buf) -> Result<f64, NbtError>;

    fn write_array_len(buf: &mut impl BufMut, len: i32);
    fn read_array_len(buf: &mut impl Buf) -> Result<i32, NbtError>;

    fn write_string_len(buf: &mut impl BufMut, len: usize);
    fn read_string_len(buf: &mut impl Buf) -> Result<usize, NbtError>;
}

// -----------------------------------------------------------------------
// Reading
// -----------------------------------------------------------------------

pub(crate) fn read_root<D: NbtDialect>(buf: &mut impl Buf) -> Result<NbtRoot, NbtError> {
    if !buf.has_remaining() {
        return Err(NbtError::UnexpectedEof);
    }
    let tag_type = buf.get_u8();
    if tag_type != 10 {
        return Err(NbtError::ExpectedCompound { got: tag_type });
    }
    let name = read_string::<D>(buf)?;
    let compound = read_compound::<D>(buf, 0)?;
    Ok(NbtRoot { name, compound })
}

/// Nameless root form. A lone TAG_End means "no NBT at all".
pub(crate) fn read_root_anonymous<D: NbtDialect>(
    buf: &mut impl Buf,
) -> Result<Option<NbtCompound>, NbtError> {
    if !buf.has_remaining() {
        return Err(NbtError::UnexpectedEof);
    }
    let tag_type = buf.get_u8();
    if tag_type == 0 {
        return Ok(None);
    }
    if tag_type != 10 {
        return Err(NbtError::ExpectedCompound { got: tag_type });
    }
    Ok(Some(read_compound::<D>(buf, 0)?))
}

fn read_tag<D: NbtDialect>(
    buf: &mut impl Buf,
    tag_type: u8,
    depth: usize,
) -> Result<NbtTag, NbtError> {
    if depth > MAX_DEPTH {
        return Err(NbtError::NestingTooDeep { limit: MAX_DEPTH });
    }

    match tag_type {
        1 => {
            ensure_remaining(buf, 1)?;
            Ok(NbtTag::Byte(buf.get_i8()))
        }
        2 => Ok(NbtTag::Short(D::read_i16(buf)?)),
        3 => Ok(NbtTag::Int(D::read_i32(buf)?)),
        4 => Ok(NbtTag::Long(D::read_i64(buf)?)),
        5 => Ok(NbtTag::Float(D::read_f32(buf)?)),
        6 => Ok(NbtTag::Double(D::read_f64(buf)?)),
        7 => {
            let len = checked_len(D::read_array_len(buf)?)?;
            ensure_remaining(buf, len)?;
            let mut arr = Vec::with_capacity(len);
            for _ in 0..len {
                arr.push(buf.get_i8());
            }
            Ok(NbtTag::ByteArray(arr))
        }
        8 => Ok(NbtTag::String(read_string::<D>(buf)?)),
        9 => {
            ensure_remaining(buf, 1)?;
            let element_type = buf.get_u8();
            let len = checked_len(D::read_array_len(buf)?)?;
            let mut list = Vec::with_capacity(len.min(4096));
            for _ in 0..len {
                list.push(read_tag::<D>(buf, element_type, depth + 1)?);
            }
            Ok(NbtTag::List(list))
        }
        10 => Ok(NbtTag::Compound(read_compound::<D>(buf, depth + 1)?)),
        11 => {
            let len = checked_len(D::read_array_len(buf)?)?;
            let mut arr = Vec::with_capacity(len.min(4096));
            for _ in 0..len {
                arr.push(D::read_i32(buf)?);
            }
            Ok(NbtTag::IntArray(arr))
        }
        12 => {
            let len = checked_len(D::read_array_len(buf)?)?;
            let mut arr = Vec::with_capacity(len.min(4096));
            for _ in 0..len {
                arr.push(D::read_i64(buf)?);
            }
            Ok(NbtTag::LongArray(arr))
        }
        _ => Err(NbtError::UnknownTagType(tag_type)),
    }
}

fn read_compound<D: NbtDialect>(
    buf: &mut impl Buf,
    depth: usize,
) -> Result<NbtCompound, NbtError> {
    if depth > MAX_DEPTH {
        return Err(NbtError::NestingTooDeep { limit: MAX_DEPTH });
    }
    let mut map = NbtCompound::new();
    loop {
        ensure_remaining(buf, 1)?;
        let tag_type = buf.get_u8();
        if tag_type == 0 {
            break; // TAG_End
        }
        let name = read_string::<D>(buf)?;
        let tag = read_tag::<D>(buf, tag_type, depth)?;
        map.insert(name, tag);
    }
    Ok(map)
}

fn read_string<D: NbtDialect>(buf: &mut impl Buf) -> Result<String, NbtError> {
    let len = D::read_string_len(buf)?;
    ensure_remaining(buf, len)?;
    let data = buf.copy_to_bytes(len);
    String::from_utf8(data.to_vec()).map_err(|_| NbtError::InvalidUtf8)
}

fn checked_len(len: i32) -> Result<usize, NbtError> {
    if len < 0 {
        return Err(NbtError::NegativeLength(len));
    }
    Ok(len as usize)
}

fn ensure_remaining(buf: &impl Buf, needed: usize) -> Result<(), NbtError> {
    if buf.remaining() < needed {
        Err(NbtError::UnexpectedEof)
    } else {
        Ok(())
    }
}

// -----------------------------------------------------------------------
// Writing
// -----------------------------------------------------------------------

pub(crate) fn write_root<D: NbtDialect>(buf: &mut impl BufMut, root: &NbtRoot) {
    buf.put_u8(10); // TAG_Compound
    write_string::<D>(buf, &root.name);
    write_compound::<D>(buf, &root.compound);
}

pub(crate) fn write_root_anonymous<D: NbtDialect>(
    buf: &mut impl BufMut,
    compound: Option<&NbtCompound>,
) {
    match compound {
        Some(compound) => {
            buf.put_u8(10);
            write_compound::<D>(buf, compound);
        }
        None => buf.put_u8(0),
    }
}

fn write_tag<D: NbtDialect>(buf: &mut impl BufMut, tag: &NbtTag) {
    match tag {
        NbtTag::Byte(v) => buf.put_i8(*v),
        NbtTag::Short(v) => D::write_i16(buf, *v),
        NbtTag::Int(v) => D::write_i32(buf, *v),
        NbtTag::Long(v) => D::write_i64(buf, *v),
        NbtTag::Float(v) => D::write_f32(buf, *v),
        NbtTag::Double(v) => D::write_f64(buf, *v),
        NbtTag::ByteArray(arr) => {
            D::write_array_len(buf, arr.len() as i32);
            for &b in arr {
                buf.put_i8(b);
            }
        }
        NbtTag::String(s) => write_string::<D>(buf, s),
        NbtTag::List(list) => {
            if list.is_empty() {
                buf.put_u8(0); // TAG_End type for empty list
                D::write_array_len(buf, 0);
            } else {
                buf.put_u8(list[0].tag_type_id());
                D::write_array_len(buf, list.len() as i32);
                for item in list {
                    write_tag::<D>(buf, item);
                }
            }
        }
        NbtTag::Compound(map) => write_compound::<D>(buf, map),
        NbtTag::IntArray(arr) => {
            D::write_array_len(buf, arr.len() as i32);
            for &v in arr {
                D::write_i32(buf, v);
            }
        }
        NbtTag::LongArray(arr) => {
            D::write_array_len(buf, arr.len() as i32);
            for &v in arr {
                D::write_i64(buf, v);
            }
        }
    }
}

fn write_compound<D: NbtDialect>(buf: &mut impl BufMut, map: &NbtCompound) {
    for (name, tag) in map {
        buf.put_u8(tag.tag_type_id());
        write_string::<D>(buf, name);
        write_tag::<D>(buf, tag);
    }
    buf.put_u8(0); // TAG_End
}

fn write_string<D: NbtDialect>(buf: &mut impl BufMut, s: &str) {
    D::write_string_len(buf, s.len());
    buf.put_slice(s.as_bytes());
}
