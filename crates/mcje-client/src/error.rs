//! Client-level errors.

use mcje_proto::{Direction, State};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Proto(#[from] mcje_proto::ProtoError),

    #[error(transparent)]
    Crypto(#[from] mcje_crypto::CryptoError),

    #[error(transparent)]
    Nbt(#[from] mcje_nbt::NbtError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("no embedded schema for protocol version {0}")]
    UnsupportedVersion(i32),

    #[error("no packet codec for {state} {direction:?}")]
    NoCodec { state: State, direction: Direction },

    #[error("packet field missing or mistyped: {0}")]
    BadPacket(&'static str),

    #[error("session server rejected the join: {0}")]
    SessionJoin(String),

    #[error("online-mode login requires an access token and profile id")]
    MissingCredentials,

    #[error("ping timed out")]
    PingTimeout,

    #[error("connection ended: {0}")]
    Ended(String),
}
