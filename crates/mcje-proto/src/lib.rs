//! Minecraft Java Edition wire protocol: variable-width integers, frame
//! splitting, compression, and the schema-driven packet codec.

pub mod codec;
pub mod compression;
pub mod error;
pub mod framing;
pub mod packet;
pub mod schema;
pub mod types;
pub mod version;

pub use error::ProtoError;
pub use packet::{Direction, Packet, PacketCodec, Protocol, State};
pub use types::{VarInt, VarLong};
