//! Events surfaced by a connection.

use serde_json::Value;
use uuid::Uuid;

use mcje_proto::State;

/// Everything a listener can observe, in arrival order. Packet events carry
/// the schema name and typed parameters; lifecycle events mark the seams of
/// the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// A decoded inbound packet, delivered for every state.
    Packet { name: String, params: Value },
    /// The connection moved between protocol states.
    StateChange { from: State, to: State },
    /// `compress` was honoured; subsequent frames follow the threshold rule.
    CompressionEnabled { threshold: i32 },
    /// The AES cipher is installed; every later byte is encrypted.
    EncryptionEnabled,
    /// Login completed. Emitted exactly once, after the success path —
    /// including configuration acknowledgement on protocols that have it.
    Login { username: String, uuid: Uuid },
    /// A frame could not be decoded. The stream stays aligned (its length
    /// prefix was already consumed), so the session continues.
    PacketDropped { error: String },
    /// The peer closed the stream or sent a disconnect reason.
    End { reason: String },
}
