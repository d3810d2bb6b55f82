//! Status ping.

use std::time::{Duration, Instant};

use serde_json::json;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use mcje_proto::Protocol;

use crate::connection::Connection;
use crate::error::ClientError;
use crate::event::ClientEvent;
use crate::options::ClientOptions;
use crate::resolver;

/// Outcome of a status ping.
#[derive(Debug, Clone, PartialEq)]
pub struct PingResult {
    /// The server's status JSON, verbatim.
    pub response: String,
    /// Wall-clock delta between sending `ping` and receiving its echo.
    pub latency: Duration,
}

/// Ping a server. The whole exchange runs under the configured timeout; on
/// expiry the socket is dropped and `PingTimeout` is returned.
pub async fn ping(options: &ClientOptions) -> Result<PingResult, ClientError> {
    let protocol = Protocol::builtin(options.protocol_version)
        .map_err(|_| ClientError::UnsupportedVersion(options.protocol_version))?;
    let (host, port) = resolver::resolve_address(&options.host, options.port).await;
    debug!(%host, port, "pinging");

    let exchange = async {
        let stream = TcpStream::connect((host.as_str(), port)).await?;
        let mut connection = Connection::new(stream, protocol, options.clone());
        ping_connection(&mut connection).await
    };
    timeout(Duration::from_millis(options.ping_timeout_ms), exchange)
        .await
        .map_err(|_| ClientError::PingTimeout)?
}

/// Drive the status exchange on an established connection.
pub async fn ping_connection<S: AsyncRead + AsyncWrite + Unpin>(
    connection: &mut Connection<S>,
) -> Result<PingResult, ClientError> {
    connection.start_status().await?;
    connection.send("ping_start", &json!({})).await?;

    let mut response = None;
    let mut sent_ping_at = None;
    loop {
        match connection.next_event().await? {
            ClientEvent::Packet { name, params } if name == "server_info" => {
                response = Some(
                    params["response"]
                        .as_str()
                        .ok_or(ClientError::BadPacket("response"))?
                        .to_string(),
                );
                connection.send("ping", &json!({"time": 0})).await?;
                sent_ping_at = Some(Instant::now());
            }
            ClientEvent::Packet { name, .. } if name == "ping" => {
                let response = response.ok_or(ClientError::BadPacket("server_info"))?;
                let latency = sent_ping_at
                    .map(|at| at.elapsed())
                    .ok_or(ClientError::BadPacket("ping before server_info"))?;
                return Ok(PingResult { response, latency });
            }
            ClientEvent::End { reason } => return Err(ClientError::Ended(reason)),
            _ => {}
        }
    }
}
