//! NBT (Named Binary Tag) implementation for Minecraft Java Edition.
//!
//! Three wire dialects share one read/write engine:
//! - **big**: big-endian fixed-width — Java disk storage and standard packets.
//! - **little**: little-endian fixed-width — reserved for other editions.
//! - **littleVarint**: zigzag+varint ints and counts, varint string lengths.
//!
//! Each dialect also has an "anonymous" root form (no root name, lone
//! TAG_End meaning "no data"), used inside Java packets from protocol 764.

pub mod error;
pub mod tag;

mod big;
mod io;
mod le;
mod le_varint;

pub use error::NbtError;
pub use tag::{NbtCompound, NbtRoot, NbtTag};

use bytes::{Buf, BufMut};

/// Read big-endian NBT with a named root.
pub fn read_nbt_big(buf: &mut impl Buf) -> Result<NbtRoot, NbtError> {
    io::read_root::<big::BigDialect>(buf)
}

/// Write big-endian NBT with a named root.
pub fn write_nbt_big(buf: &mut impl BufMut, root: &NbtRoot) {
    io::write_root::<big::BigDialect>(buf, root)
}

/// Read big-endian NBT in the nameless network form. `None` means the
/// stream carried a lone TAG_End.
pub fn read_nbt_big_anonymous(buf: &mut impl Buf) -> Result<Option<NbtCompound>, NbtError> {
    io::read_root_anonymous::<big::BigDialect>(buf)
}

/// Write big-endian NBT in the nameless network form.
pub fn write_nbt_big_anonymous(buf: &mut impl BufMut, compound: Option<&NbtCompound>) {
    io::write_root_anonymous::<big::BigDialect>(buf, compound)
}

/// Read little-endian fixed-width NBT.
pub fn read_nbt_little(buf: &mut impl Buf) -> Result<NbtRoot, NbtError> {
    io::read_root::<le::LeDialect>(buf)
}

/// Write little-endian fixed-width NBT.
pub fn write_nbt_little(buf: &mut impl BufMut, root: &NbtRoot) {
    io::write_root::<le::LeDialect>(buf, root)
}

/// Read little-endian varint NBT.
pub fn read_nbt_little_varint(buf: &mut impl Buf) -> Result<NbtRoot, NbtError> {
    io::read_root::<le_varint::LeVarintDialect>(buf)
}

/// Write little-endian varint NBT.
pub fn write_nbt_little_varint(buf: &mut impl BufMut, root: &NbtRoot) {
    io::write_root::<le_varint::LeVarintDialect>(buf, root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn roundtrip_big(root: &NbtRoot) {
        let mut buf = BytesMut::new();
        write_nbt_big(&mut buf, root);
        let decoded = read_nbt_big(&mut buf.freeze()).unwrap();
        assert_eq!(decoded, *root);
    }

    fn roundtrip_little(root: &NbtRoot) {
        let mut buf = BytesMut::new();
        write_nbt_little(&mut buf, root);
        let decoded = read_nbt_little(&mut buf.freeze()).unwrap();
        assert_eq!(decoded, *root);
    }

    fn roundtrip_little_varint(root: &NbtRoot) {
        let mut buf = BytesMut::new();
        write_nbt_little_varint(&mut buf, root);
        let decoded = read_nbt_little_varint(&mut buf.freeze()).unwrap();
        assert_eq!(decoded, *root);
    }

    fn sample_compound() -> NbtCompound {
        let mut inner = NbtCompound::new();
        inner.insert("name".into(), NbtTag::String("Steve".into()));
        inner.insert("health".into(), NbtTag::Float(20.0));
        inner.insert("xp".into(), NbtTag::Int(1500));

        let mut c = NbtCompound::new();
        c.insert("player".into(), NbtTag::Compound(inner));
        c.insert("version".into(), NbtTag::Int(19133));
        c.insert("seed".into(), NbtTag::Long(-428563408));
        c.insert(
            "inventory".into(),
            NbtTag::List(vec![
                NbtTag::Compound({
                    let mut item = NbtCompound::new();
                    item.insert("id".into(), NbtTag::Short(1));
                    item.insert("count".into(), NbtTag::Byte(64));
                    item
                }),
                NbtTag::Compound({
                    let mut item = NbtCompound::new();
                    item.insert("id".into(), NbtTag::Short(4));
                    item.insert("count".into(), NbtTag::Byte(32));
                    item
                }),
            ]),
        );
        c.insert(
            "heightmap".into(),
            NbtTag::LongArray(vec![i64::MIN, -1, 0, 1, i64::MAX]),
        );
        c.insert("raw".into(), NbtTag::ByteArray(vec![1, -2, 3, -4]));
        c.insert("biomes".into(), NbtTag::IntArray(vec![100, -200, 300]));
        c
    }

    // -- Big dialect --

    #[test]
    fn big_empty_compound() {
        roundtrip_big(&NbtRoot::new("", NbtCompound::new()));
    }

    #[test]
    fn big_root_name() {
        roundtrip_big(&NbtRoot::new("hello world", NbtCompound::new()));
    }

    #[test]
    fn big_scalar_tags() {
        let mut c = NbtCompound::new();
        c.insert("b".into(), NbtTag::Byte(-42));
        c.insert("s".into(), NbtTag::Short(-1234));
        c.insert("i".into(), NbtTag::Int(100_000));
        c.insert("l".into(), NbtTag::Long(i64::MAX));
        c.insert("f".into(), NbtTag::Float(3.125));
        c.insert("d".into(), NbtTag::Double(std::f64::consts::PI));
        c.insert("str".into(), NbtTag::String("日本語".into()));
        roundtrip_big(&NbtRoot::new("", c));
    }

    #[test]
    fn big_complex_structure() {
        roundtrip_big(&NbtRoot::new("level", sample_compound()));
    }

    #[test]
    fn big_empty_list() {
        let mut c = NbtCompound::new();
        c.insert("list".into(), NbtTag::List(vec![]));
        roundtrip_big(&NbtRoot::new("", c));
    }

    #[test]
    fn big_int_is_big_endian() {
        let mut c = NbtCompound::new();
        c.insert("v".into(), NbtTag::Int(1));
        let mut buf = BytesMut::new();
        write_nbt_big(&mut buf, &NbtRoot::new("", c));
        // 0a  00 00  03  00 01 'v'  00 00 00 01  00
        assert_eq!(&buf[..], &[0x0a, 0, 0, 0x03, 0, 1, b'v', 0, 0, 0, 1, 0]);
    }

    // -- Anonymous form --

    #[test]
    fn big_anonymous_roundtrip() {
        let compound = sample_compound();
        let mut buf = BytesMut::new();
        write_nbt_big_anonymous(&mut buf, Some(&compound));
        let decoded = read_nbt_big_anonymous(&mut buf.freeze()).unwrap();
        assert_eq!(decoded, Some(compound));
    }

    #[test]
    fn big_anonymous_empty_is_single_byte() {
        let mut buf = BytesMut::new();
        write_nbt_big_anonymous(&mut buf, None);
        assert_eq!(&buf[..], &[0x00]);
        let decoded = read_nbt_big_anonymous(&mut buf.freeze()).unwrap();
        assert_eq!(decoded, None);
    }

    #[test]
    fn big_anonymous_has_no_name_bytes() {
        let compound = NbtCompound::new();
        let mut named = BytesMut::new();
        write_nbt_big(&mut named, &NbtRoot::new("", compound.clone()));
        let mut anon = BytesMut::new();
        write_nbt_big_anonymous(&mut anon, Some(&compound));
        // The named form carries a u16 length for the empty name.
        assert_eq!(named.len(), anon.len() + 2);
    }

    // -- Little dialect --

    #[test]
    fn little_complex_structure() {
        roundtrip_little(&NbtRoot::new("level", sample_compound()));
    }

    #[test]
    fn little_differs_from_big() {
        let mut c = NbtCompound::new();
        c.insert("v".into(), NbtTag::Int(1));
        let root = NbtRoot::new("", c);

        let mut big = BytesMut::new();
        write_nbt_big(&mut big, &root);
        let mut little = BytesMut::new();
        write_nbt_little(&mut little, &root);
        assert_ne!(big, little);
    }

    // -- Little varint dialect --

    #[test]
    fn little_varint_complex_structure() {
        roundtrip_little_varint(&NbtRoot::new("level", sample_compound()));
    }

    #[test]
    fn little_varint_small_ints_are_compact() {
        let mut c = NbtCompound::new();
        c.insert("v".into(), NbtTag::Int(1));
        let root = NbtRoot::new("", c);

        let mut fixed = BytesMut::new();
        write_nbt_little(&mut fixed, &root);
        let mut varint = BytesMut::new();
        write_nbt_little_varint(&mut varint, &root);
        // ZigZag(1) = 2 fits one byte against four for i32_le.
        assert!(varint.len() < fixed.len());
    }

    #[test]
    fn little_varint_long_extremes() {
        let mut c = NbtCompound::new();
        c.insert("min".into(), NbtTag::Long(i64::MIN));
        c.insert("max".into(), NbtTag::Long(i64::MAX));
        roundtrip_little_varint(&NbtRoot::new("", c));
    }

    // -- Error cases --

    #[test]
    fn empty_buffer_error() {
        let data = bytes::Bytes::new();
        assert!(read_nbt_big(&mut data.clone()).is_err());
        assert!(read_nbt_little(&mut data.clone()).is_err());
        assert!(read_nbt_little_varint(&mut data.clone()).is_err());
    }

    #[test]
    fn wrong_root_type_error() {
        // TAG_Byte instead of TAG_Compound.
        let data = bytes::Bytes::from_static(&[1]);
        assert!(matches!(
            read_nbt_big(&mut data.clone()),
            Err(NbtError::ExpectedCompound { got: 1 })
        ));
    }

    #[test]
    fn truncated_compound_error() {
        let mut c = NbtCompound::new();
        c.insert("x".into(), NbtTag::Int(9));
        let mut buf = BytesMut::new();
        write_nbt_big(&mut buf, &NbtRoot::new("", c));
        let len = buf.len();
        let truncated = buf.freeze().slice(..len - 3);
        assert!(read_nbt_big(&mut truncated.clone()).is_err());
    }

    #[test]
    fn unknown_tag_error() {
        // compound with a child of tag type 99.
        let data = bytes::Bytes::from_static(&[0x0a, 0, 0, 99, 0, 1, b'x']);
        assert!(matches!(
            read_nbt_big(&mut data.clone()),
            Err(NbtError::UnknownTagType(99))
        ));
    }
}
