//! World and storage errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorldError {
    #[error("bits per value must be 1..=32, got {0}")]
    BadBitsPerValue(usize),

    #[error("index {index} out of bounds for capacity {capacity}")]
    IndexOutOfBounds { index: usize, capacity: usize },

    #[error("value {value} does not fit in {bits} bits")]
    ValueTooWide { value: u32, bits: usize },

    #[error("packed storage needs {expected} longs, got {got}")]
    WrongStorageLength { expected: usize, got: usize },

    #[error("coordinate ({x}, {y}, {z}) outside the column")]
    OutOfColumn { x: i32, y: i32, z: i32 },

    #[error(transparent)]
    Proto(#[from] mcje_proto::ProtoError),

    #[error(transparent)]
    Nbt(#[from] mcje_nbt::NbtError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("region file: {0}")]
    FileFormat(String),

    #[error("chunk NBT is missing {0}")]
    MissingChunkField(&'static str),

    #[error("block state {0:?} is not in the registry")]
    UnknownBlockState(String),

    #[error("block id {0} is not in the registry")]
    UnknownBlockId(u32),
}
