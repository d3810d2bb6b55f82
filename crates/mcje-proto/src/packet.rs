//! Packet codec: id ↔ name resolution and typed packet read/write, built
//! from a protocol schema document.
//!
//! The schema's top-level `packet` type is a container of two fields: a
//! `mapper` from the VarInt packet id to a name, and a `switch` on that name
//! selecting the body type. Building a codec therefore yields both
//! directions of the id↔name mapping plus a typed body codec per packet.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ProtoError;
use crate::schema::def::{TypeDef, TypeRef};
use crate::schema::{Reader, TypeRegistry};
use crate::version;

/// Protocol state a packet belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Handshaking,
    Status,
    Login,
    Configuration,
    Play,
}

impl State {
    /// Key used for this state in schema documents.
    pub fn schema_key(&self) -> &'static str {
        match self {
            State::Handshaking => "handshaking",
            State::Status => "status",
            State::Login => "login",
            State::Configuration => "configuration",
            State::Play => "play",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.schema_key())
    }
}

/// Direction a packet travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    ToClient,
    ToServer,
}

impl Direction {
    pub fn schema_key(&self) -> &'static str {
        match self {
            Direction::ToClient => "toClient",
            Direction::ToServer => "toServer",
        }
    }

    pub fn flip(&self) -> Direction {
        match self {
            Direction::ToClient => Direction::ToServer,
            Direction::ToServer => Direction::ToClient,
        }
    }
}

/// A decoded packet: its schema name and its typed parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub name: String,
    pub params: Value,
}

/// Codec for one (state, direction) namespace.
pub struct PacketCodec {
    registry: Arc<TypeRegistry>,
    to_name: HashMap<i64, String>,
    to_id: HashMap<String, i64>,
}

impl PacketCodec {
    /// Build a codec from a registry containing a `packet` type.
    pub fn new(registry: Arc<TypeRegistry>) -> Result<Self, ProtoError> {
        let (to_name, to_id) = extract_id_maps(&registry)?;
        Ok(Self {
            registry,
            to_name,
            to_id,
        })
    }

    pub fn name_for(&self, id: i64) -> Option<&str> {
        self.to_name.get(&id).map(String::as_str)
    }

    pub fn id_for(&self, name: &str) -> Option<i64> {
        self.to_id.get(name).copied()
    }

    /// Names of every packet in this namespace.
    pub fn packet_names(&self) -> impl Iterator<Item = &str> {
        self.to_id.keys().map(String::as_str)
    }

    /// Decode a full frame body (id ‖ payload) into a packet.
    pub fn read(&self, frame: &[u8]) -> Result<Packet, ProtoError> {
        let mut r = Reader::new(frame);
        let value = self
            .registry
            .read(&TypeRef::Named("packet".into()), &mut r, None)?;
        if r.remaining() > 0 {
            return Err(ProtoError::TrailingBytes(r.remaining()));
        }
        let obj = value.as_object().ok_or(ProtoError::BadValue {
            expected: "packet object",
            got: value.to_string(),
        })?;
        let name = obj
            .get("name")
            .and_then(Value::as_str)
            .ok_or(ProtoError::BadValue {
                expected: "packet name",
                got: value.to_string(),
            })?
            .to_string();
        let params = obj.get("params").cloned().unwrap_or(Value::Null);
        Ok(Packet { name, params })
    }

    /// Encode a packet into a frame body (id ‖ payload).
    ///
    /// `size_of` is computed up front; disagreement with the bytes actually
    /// written is a codec bug and is reported as `SchemaInconsistency`.
    pub fn write(&self, name: &str, params: &Value) -> Result<Bytes, ProtoError> {
        if !self.to_id.contains_key(name) {
            return Err(ProtoError::UnknownPacketName(name.to_string()));
        }
        let mut packet = Map::new();
        packet.insert("name".into(), Value::String(name.to_string()));
        packet.insert("params".into(), params.clone());
        let value = Value::Object(packet);

        let ty = TypeRef::Named("packet".into());
        let size = self.registry.size_of(&ty, &value, None)?;
        let mut out = BytesMut::with_capacity(size);
        self.registry.write(&ty, &value, &mut out, None)?;
        if out.len() != size {
            return Err(ProtoError::SchemaInconsistency {
                name: name.to_string(),
                size_of: size,
                written: out.len(),
            });
        }
        Ok(out.freeze())
    }
}

impl fmt::Debug for PacketCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketCodec")
            .field("packets", &self.to_id.len())
            .finish()
    }
}

/// Walk the `packet` container and pull the id↔name maps out of its mapper
/// field.
fn extract_id_maps(
    registry: &TypeRegistry,
) -> Result<(HashMap<i64, String>, HashMap<String, i64>), ProtoError> {
    let packet_ref = TypeRef::Named("packet".into());
    let packet = registry.resolve(&packet_ref)?;
    let TypeDef::Container { fields } = packet else {
        return Err(ProtoError::MalformedSchema(
            "packet type must be a container".into(),
        ));
    };
    for field in fields {
        if let TypeDef::Mapper {
            to_name, to_id, ..
        } = registry.resolve(&field.ty)?
        {
            return Ok((to_name.clone(), to_id.clone()));
        }
    }
    Err(ProtoError::MalformedSchema(
        "packet container has no mapper field".into(),
    ))
}

// ---------------------------------------------------------------------------
// Protocol: every namespace of one schema document
// ---------------------------------------------------------------------------

const SCHEMA_765: &str = include_str!("data/protocol-765.json");
const SCHEMA_763: &str = include_str!("data/protocol-763.json");

/// All packet codecs for one protocol version.
pub struct Protocol {
    version: i32,
    codecs: HashMap<(State, Direction), PacketCodec>,
}

impl Protocol {
    /// Load the embedded schema for a supported protocol version.
    pub fn builtin(version: i32) -> Result<Self, ProtoError> {
        let doc = match version {
            765 => SCHEMA_765,
            763 => SCHEMA_763,
            other => {
                return Err(ProtoError::MalformedSchema(format!(
                    "no embedded schema for protocol {other}"
                )))
            }
        };
        Self::from_json(version, doc)
    }

    /// Build a protocol from a schema document. The document holds an
    /// optional shared `types` object plus one namespace per state, each
    /// with `toClient`/`toServer` sub-namespaces.
    pub fn from_json(version: i32, doc: &str) -> Result<Self, ProtoError> {
        let root: Value = serde_json::from_str(doc)
            .map_err(|e| ProtoError::MalformedSchema(format!("schema is not JSON: {e}")))?;
        let shared = root.get("types");

        let mut codecs = HashMap::new();
        let states = [
            State::Handshaking,
            State::Status,
            State::Login,
            State::Configuration,
            State::Play,
        ];
        for state in states {
            let Some(namespace) = root.get(state.schema_key()) else {
                continue;
            };
            for direction in [Direction::ToClient, Direction::ToServer] {
                let Some(types) = namespace
                    .get(direction.schema_key())
                    .and_then(|d| d.get("types"))
                else {
                    continue;
                };
                let mut registry = TypeRegistry::new();
                if let Some(shared) = shared {
                    registry.add_types(shared)?;
                }
                registry.add_types(types)?;
                let codec = PacketCodec::new(Arc::new(registry))?;
                debug!(%state, ?direction, packets = codec.to_id.len(), "loaded namespace");
                codecs.insert((state, direction), codec);
            }
        }
        Ok(Self { version, codecs })
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    /// Whether this protocol routes login through the configuration state.
    pub fn has_configuration(&self) -> bool {
        version::supports_configuration(self.version)
    }

    pub fn codec(&self, state: State, direction: Direction) -> Option<&PacketCodec> {
        self.codecs.get(&(state, direction))
    }
}

impl fmt::Debug for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Protocol")
            .field("version", &self.version)
            .field("namespaces", &self.codecs.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn proto() -> Protocol {
        Protocol::builtin(765).unwrap()
    }

    #[test]
    fn builtin_versions_load() {
        assert_eq!(Protocol::builtin(765).unwrap().version(), 765);
        assert_eq!(Protocol::builtin(763).unwrap().version(), 763);
        assert!(Protocol::builtin(999).is_err());
    }

    #[test]
    fn configuration_presence_tracks_version() {
        assert!(proto()
            .codec(State::Configuration, Direction::ToClient)
            .is_some());
        assert!(Protocol::builtin(763)
            .unwrap()
            .codec(State::Configuration, Direction::ToClient)
            .is_none());
    }

    #[test]
    fn handshake_write_and_read_back() {
        let p = proto();
        let codec = p.codec(State::Handshaking, Direction::ToServer).unwrap();
        let params = json!({
            "protocolVersion": 765,
            "serverHost": "localhost",
            "serverPort": 25565,
            "nextState": 2,
        });
        let frame = codec.write("set_protocol", &params).unwrap();
        // First byte is the packet id for set_protocol.
        assert_eq!(frame[0] as i64, codec.id_for("set_protocol").unwrap());

        let packet = codec.read(&frame).unwrap();
        assert_eq!(packet.name, "set_protocol");
        assert_eq!(packet.params, params);
    }

    #[test]
    fn every_login_packet_roundtrips() {
        let p = proto();
        let codec = p.codec(State::Login, Direction::ToServer).unwrap();
        let cases = [
            (
                "login_start",
                json!({"username": "Steve", "playerUUID": "5627dd98-e6be-3c21-b8a8-e92344183641"}),
            ),
            (
                "encryption_begin",
                json!({"sharedSecret": [1, 2, 3, 4], "verifyToken": [9, 9]}),
            ),
            ("login_acknowledged", json!({})),
        ];
        for (name, params) in cases {
            let frame = codec.write(name, &params).unwrap();
            let packet = codec.read(&frame).unwrap();
            assert_eq!(packet.name, name);
            assert_eq!(packet.params, params, "params mismatch for {name}");
        }
    }

    #[test]
    fn success_packet_roundtrips_with_properties() {
        let p = proto();
        let codec = p.codec(State::Login, Direction::ToClient).unwrap();
        let params = json!({
            "uuid": "5627dd98-e6be-3c21-b8a8-e92344183641",
            "username": "Steve",
            "properties": [
                {"name": "textures", "value": "abc123", "signature": null},
                {"name": "cape", "value": "zzz", "signature": "sig"},
            ],
        });
        let frame = codec.write("success", &params).unwrap();
        let packet = codec.read(&frame).unwrap();
        assert_eq!(packet.params, params);
    }

    #[test]
    fn unknown_id_and_name_reported() {
        let p = proto();
        let codec = p.codec(State::Login, Direction::ToClient).unwrap();
        assert!(matches!(
            codec.read(&[0x7f]),
            Err(ProtoError::UnknownPacketId(0x7f))
        ));
        assert!(matches!(
            codec.write("does_not_exist", &json!({})),
            Err(ProtoError::UnknownPacketName(_))
        ));
    }

    #[test]
    fn id_name_maps_are_inverse() {
        let p = proto();
        for state in [State::Status, State::Login, State::Play] {
            for dir in [Direction::ToClient, Direction::ToServer] {
                let codec = p.codec(state, dir).unwrap();
                let names: Vec<String> =
                    codec.packet_names().map(str::to_string).collect();
                for name in names {
                    let id = codec.id_for(&name).unwrap();
                    assert_eq!(codec.name_for(id), Some(name.as_str()));
                }
            }
        }
    }

    #[test]
    fn keep_alive_roundtrips_both_versions() {
        for version in [763, 765] {
            let p = Protocol::builtin(version).unwrap();
            for dir in [Direction::ToClient, Direction::ToServer] {
                let codec = p.codec(State::Play, dir).unwrap();
                let params = json!({"keepAliveId": 123456789012345i64});
                let frame = codec.write("keep_alive", &params).unwrap();
                let packet = codec.read(&frame).unwrap();
                assert_eq!(packet.name, "keep_alive");
                assert_eq!(packet.params, params);
            }
        }
    }

    #[test]
    fn map_chunk_roundtrips() {
        let p = proto();
        let codec = p.codec(State::Play, Direction::ToClient).unwrap();
        // Anonymous-NBT heightmaps: empty compound, nameless root.
        let heightmaps = json!([0x0a, 0x00]);
        let params = json!({
            "x": 3,
            "z": -7,
            "heightmaps": heightmaps,
            "chunkData": [0, 1, 2, 3, 4, 5, 6, 7],
            "blockEntities": [
                {"x": 5, "z": 9, "y": 64, "type": 2, "nbtData": [0x0a, 0x00]},
            ],
            "skyLightMask": [3],
            "blockLightMask": [0],
            "emptySkyLightMask": [0],
            "emptyBlockLightMask": [0],
            "skyLight": [[15, 15], [0, 0]],
            "blockLight": [],
        });
        let frame = codec.write("map_chunk", &params).unwrap();
        let packet = codec.read(&frame).unwrap();
        assert_eq!(packet.name, "map_chunk");
        assert_eq!(packet.params, params);
    }

    #[test]
    fn status_ping_roundtrips() {
        let p = proto();
        let codec = p.codec(State::Status, Direction::ToServer).unwrap();
        let frame = codec.write("ping_start", &json!({})).unwrap();
        assert_eq!(frame.len(), 1, "empty body, id only");
        let frame = codec.write("ping", &json!({"time": 0})).unwrap();
        let packet = codec.read(&frame).unwrap();
        assert_eq!(packet.params, json!({"time": 0}));
    }
}
