//! Minecraft Java Edition client: connection state machine, login and
//! configuration sub-protocols, status pings, and address resolution.

pub mod connection;
pub mod error;
pub mod event;
pub mod options;
pub mod ping;
pub mod resolver;
pub mod session;

pub use connection::{Connection, Profile};
pub use error::ClientError;
pub use event::ClientEvent;
pub use options::ClientOptions;
pub use ping::{ping, PingResult};

use tokio::net::TcpStream;
use tracing::info;

use mcje_proto::Protocol;

/// Resolve the server address (SRV included) and open a connection in the
/// handshaking state. Call `start_login` / `login` on the result.
pub async fn connect(options: ClientOptions) -> Result<Connection<TcpStream>, ClientError> {
    let protocol = Protocol::builtin(options.protocol_version)
        .map_err(|_| ClientError::UnsupportedVersion(options.protocol_version))?;
    let (host, port) = resolver::resolve_address(&options.host, options.port).await;
    info!(%host, port, username = %options.username, "connecting");
    let stream = TcpStream::connect((host.as_str(), port)).await?;
    Ok(Connection::new(stream, protocol, options))
}

/// Decode an NBT field captured by the packet codec — such as
/// `registry_data`'s `codec` — into tags. `None` means the field carried a
/// lone end marker.
pub fn decode_nbt_field(
    value: &serde_json::Value,
) -> Result<Option<mcje_nbt::NbtCompound>, ClientError> {
    let bytes = mcje_proto::schema::value_to_bytes(value)?;
    Ok(mcje_nbt::read_nbt_big_anonymous(&mut bytes::Bytes::from(
        bytes,
    ))?)
}
