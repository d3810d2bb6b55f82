//! Protocol-level errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("buffer too short: need {needed} more bytes, have {remaining}")]
    BufferTooShort { needed: usize, remaining: usize },

    #[error("VarInt encoding error: {0}")]
    VarInt(#[from] crate::types::VarIntError),

    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    #[error("negative length prefix: {0}")]
    NegativeLength(i32),

    #[error("frame of {length} bytes exceeds the {limit} byte limit")]
    FrameTooLarge { length: usize, limit: usize },

    #[error("decompression error: {0}")]
    DecompressError(String),

    #[error("compression error: {0}")]
    CompressError(String),

    #[error("uncompressed length {declared} does not match inflated size {actual}")]
    DecompressedSizeMismatch { declared: usize, actual: usize },

    #[error("unknown type: {0}")]
    UnknownType(String),

    #[error("unknown packet id: 0x{0:02x}")]
    UnknownPacketId(i64),

    #[error("unknown packet name: {0}")]
    UnknownPacketName(String),

    #[error("switch on {path:?} matched no case ({value}) and has no default")]
    SwitchMiss { path: String, value: String },

    #[error("context path {0:?} does not resolve")]
    BadContextPath(String),

    #[error("malformed schema: {0}")]
    MalformedSchema(String),

    #[error("value of wrong shape for {expected}: {got}")]
    BadValue { expected: &'static str, got: String },

    #[error("size_of ({size_of}) disagrees with bytes written ({written}) for {name}")]
    SchemaInconsistency {
        name: String,
        size_of: usize,
        written: usize,
    },

    #[error("mapper has no entry for {0}")]
    MapperMiss(String),

    #[error("packet body had {0} undecoded trailing bytes")]
    TrailingBytes(usize),
}
