//! Schema type tree, parsed from a JSON protocol document.
//!
//! A type is either a bare string naming another type, or a two-element
//! array `[kind, options]` describing a compound. Named references resolve
//! lazily through the registry, so mutually recursive definitions work.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::ProtoError;

/// Reference to a type: by name (resolved through the registry at use time)
/// or inline.
#[derive(Debug, Clone)]
pub enum TypeRef {
    Named(String),
    Inline(Box<TypeDef>),
}

/// How an array/buffer/string length is determined.
#[derive(Debug, Clone)]
pub enum CountSpec {
    /// Literal element count from the schema.
    Fixed(usize),
    /// A count prefix of the given type precedes the payload.
    Prefixed(Box<TypeRef>),
    /// The count lives in a sibling field (context path).
    FieldRef(String),
}

/// One field of a container. `name` is `None` for anonymous fields, whose
/// decoded object merges into the parent.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: Option<String>,
    pub ty: TypeRef,
}

/// One field of a bitfield, consumed highest-bit-first in declaration order.
#[derive(Debug, Clone)]
pub struct BitfieldMember {
    pub name: String,
    pub bits: u32,
    pub signed: bool,
}

/// Flag layout for `bitflags`: positional (bit i = flag i) or explicit masks.
#[derive(Debug, Clone)]
pub enum FlagSpec {
    Positional(Vec<String>),
    Masked(Vec<(String, u64)>),
}

#[derive(Debug, Clone)]
pub enum TypeDef {
    // Primitives.
    Bool,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    VarInt,
    VarLong,
    Void,
    Uuid,
    /// All bytes to the end of the enclosing buffer.
    RestBuffer,
    /// Raw NBT captured as an opaque byte span (named root form).
    Nbt,
    /// Raw NBT captured as an opaque byte span (nameless root form).
    AnonymousNbt,

    // Compounds.
    PString {
        count: CountSpec,
    },
    Buffer {
        count: CountSpec,
    },
    Container {
        fields: Vec<Field>,
    },
    Array {
        count: CountSpec,
        elem: TypeRef,
    },
    Mapper {
        base: TypeRef,
        to_name: HashMap<i64, String>,
        to_id: HashMap<String, i64>,
    },
    Switch {
        compare_to: String,
        cases: HashMap<String, TypeRef>,
        default: Option<Box<TypeRef>>,
    },
    Option(TypeRef),
    Bitfield {
        members: Vec<BitfieldMember>,
    },
    Bitflags {
        base: TypeRef,
        flags: FlagSpec,
        shift: u32,
    },
    EntityMetadataLoop {
        end: u8,
        elem: TypeRef,
    },
    TopBitSetTerminatedArray {
        elem: TypeRef,
    },
    RegistryEntryHolder {
        base_name: String,
        otherwise_name: String,
        otherwise: TypeRef,
    },
    RegistryEntryHolderSet {
        base_name: String,
        base: TypeRef,
        otherwise_name: String,
        otherwise: TypeRef,
    },
}

fn malformed(msg: impl Into<String>) -> ProtoError {
    ProtoError::MalformedSchema(msg.into())
}

impl TypeRef {
    /// Parse a type reference from its JSON form.
    pub fn parse(value: &Value) -> Result<TypeRef, ProtoError> {
        match value {
            Value::String(name) => Ok(TypeRef::Named(name.clone())),
            Value::Array(_) => Ok(TypeRef::Inline(Box::new(TypeDef::parse(value)?))),
            other => Err(malformed(format!("expected type, got {other}"))),
        }
    }
}

impl TypeDef {
    /// Parse a compound type from its `[kind, options]` JSON form.
    pub fn parse(value: &Value) -> Result<TypeDef, ProtoError> {
        let parts = value
            .as_array()
            .ok_or_else(|| malformed(format!("expected [kind, options], got {value}")))?;
        let kind = parts
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| malformed("compound type without a kind"))?;
        let opts = parts.get(1).unwrap_or(&Value::Null);

        match kind {
            "container" => parse_container(opts),
            "array" => parse_array(opts),
            "pstring" => Ok(TypeDef::PString {
                count: parse_count(opts)?,
            }),
            "buffer" => Ok(TypeDef::Buffer {
                count: parse_count(opts)?,
            }),
            "mapper" => parse_mapper(opts),
            "switch" => parse_switch(opts),
            "option" => Ok(TypeDef::Option(TypeRef::parse(opts)?)),
            "bitfield" => parse_bitfield(opts),
            "bitflags" => parse_bitflags(opts),
            "entityMetadataLoop" => parse_entity_metadata_loop(opts),
            "topBitSetTerminatedArray" => Ok(TypeDef::TopBitSetTerminatedArray {
                elem: TypeRef::parse(
                    opts.get("type")
                        .ok_or_else(|| malformed("topBitSetTerminatedArray without type"))?,
                )?,
            }),
            "registryEntryHolder" => parse_registry_entry_holder(opts),
            "registryEntryHolderSet" => parse_registry_entry_holder_set(opts),
            other => Err(ProtoError::UnknownType(other.to_string())),
        }
    }
}

fn parse_container(opts: &Value) -> Result<TypeDef, ProtoError> {
    let entries = opts
        .as_array()
        .ok_or_else(|| malformed("container fields must be an array"))?;
    let mut fields = Vec::with_capacity(entries.len());
    for entry in entries {
        let ty = TypeRef::parse(
            entry
                .get("type")
                .ok_or_else(|| malformed("container field without type"))?,
        )?;
        let name = match entry.get("name").and_then(Value::as_str) {
            Some(n) => Some(n.to_string()),
            None => {
                if entry.get("anon").and_then(Value::as_bool) != Some(true) {
                    return Err(malformed("container field needs a name or anon flag"));
                }
                None
            }
        };
        fields.push(Field { name, ty });
    }
    Ok(TypeDef::Container { fields })
}

fn parse_count(opts: &Value) -> Result<CountSpec, ProtoError> {
    if let Some(count) = opts.get("count") {
        return match count {
            Value::Number(n) => {
                let n = n
                    .as_u64()
                    .ok_or_else(|| malformed("negative fixed count"))?;
                Ok(CountSpec::Fixed(n as usize))
            }
            Value::String(path) => Ok(CountSpec::FieldRef(path.clone())),
            other => Err(malformed(format!("bad count: {other}"))),
        };
    }
    if let Some(ty) = opts.get("countType") {
        return Ok(CountSpec::Prefixed(Box::new(TypeRef::parse(ty)?)));
    }
    Err(malformed("missing count/countType"))
}

fn parse_array(opts: &Value) -> Result<TypeDef, ProtoError> {
    let elem = TypeRef::parse(
        opts.get("type")
            .ok_or_else(|| malformed("array without element type"))?,
    )?;
    Ok(TypeDef::Array {
        count: parse_count(opts)?,
        elem,
    })
}

/// Mapping keys may be decimal or `0x`-prefixed hex.
fn parse_mapping_key(key: &str) -> Result<i64, ProtoError> {
    let parsed = if let Some(hex) = key.strip_prefix("0x") {
        i64::from_str_radix(hex, 16)
    } else {
        key.parse()
    };
    parsed.map_err(|_| malformed(format!("bad mapper key {key:?}")))
}

fn parse_mapper(opts: &Value) -> Result<TypeDef, ProtoError> {
    let base = TypeRef::parse(
        opts.get("type")
            .ok_or_else(|| malformed("mapper without base type"))?,
    )?;
    let mappings = opts
        .get("mappings")
        .and_then(Value::as_object)
        .ok_or_else(|| malformed("mapper without mappings"))?;
    let mut to_name = HashMap::with_capacity(mappings.len());
    let mut to_id = HashMap::with_capacity(mappings.len());
    for (key, name) in mappings {
        let id = parse_mapping_key(key)?;
        let name = name
            .as_str()
            .ok_or_else(|| malformed("mapper value must be a string"))?;
        to_name.insert(id, name.to_string());
        to_id.insert(name.to_string(), id);
    }
    Ok(TypeDef::Mapper {
        base,
        to_name,
        to_id,
    })
}

fn parse_switch(opts: &Value) -> Result<TypeDef, ProtoError> {
    let compare_to = opts
        .get("compareTo")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("switch without compareTo"))?
        .to_string();
    let mut cases = HashMap::new();
    if let Some(fields) = opts.get("fields").and_then(Value::as_object) {
        for (key, ty) in fields {
            cases.insert(key.clone(), TypeRef::parse(ty)?);
        }
    }
    let default = match opts.get("default") {
        Some(ty) => Some(Box::new(TypeRef::parse(ty)?)),
        None => None,
    };
    Ok(TypeDef::Switch {
        compare_to,
        cases,
        default,
    })
}

fn parse_bitfield(opts: &Value) -> Result<TypeDef, ProtoError> {
    let entries = opts
        .as_array()
        .ok_or_else(|| malformed("bitfield members must be an array"))?;
    let mut members = Vec::with_capacity(entries.len());
    let mut total = 0u32;
    for entry in entries {
        let name = entry
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| malformed("bitfield member without name"))?
            .to_string();
        let bits = entry
            .get("size")
            .and_then(Value::as_u64)
            .ok_or_else(|| malformed("bitfield member without size"))? as u32;
        if bits == 0 || bits > 64 {
            return Err(malformed(format!("bitfield member {name} has {bits} bits")));
        }
        let signed = entry.get("signed").and_then(Value::as_bool).unwrap_or(false);
        total += bits;
        members.push(BitfieldMember { name, bits, signed });
    }
    if total > 128 {
        return Err(malformed(format!("bitfield of {total} bits is too wide")));
    }
    Ok(TypeDef::Bitfield { members })
}

fn parse_bitflags(opts: &Value) -> Result<TypeDef, ProtoError> {
    let base = TypeRef::parse(
        opts.get("type")
            .ok_or_else(|| malformed("bitflags without base type"))?,
    )?;
    let shift = opts.get("shift").and_then(Value::as_u64).unwrap_or(0) as u32;
    let flags = match opts.get("flags") {
        Some(Value::Array(names)) => {
            let mut out = Vec::with_capacity(names.len());
            for name in names {
                out.push(
                    name.as_str()
                        .ok_or_else(|| malformed("bitflags name must be a string"))?
                        .to_string(),
                );
            }
            FlagSpec::Positional(out)
        }
        Some(Value::Object(map)) => {
            let mut out = Vec::with_capacity(map.len());
            for (name, mask) in map {
                let mask = mask
                    .as_u64()
                    .ok_or_else(|| malformed("bitflags mask must be an unsigned number"))?;
                out.push((name.clone(), mask));
            }
            FlagSpec::Masked(out)
        }
        _ => return Err(malformed("bitflags without flags")),
    };
    Ok(TypeDef::Bitflags { base, flags, shift })
}

fn parse_entity_metadata_loop(opts: &Value) -> Result<TypeDef, ProtoError> {
    let end = opts
        .get("endVal")
        .and_then(Value::as_u64)
        .ok_or_else(|| malformed("entityMetadataLoop without endVal"))? as u8;
    let elem = TypeRef::parse(
        opts.get("type")
            .ok_or_else(|| malformed("entityMetadataLoop without type"))?,
    )?;
    Ok(TypeDef::EntityMetadataLoop { end, elem })
}

fn named_type(opts: &Value, key: &str) -> Result<(String, TypeRef), ProtoError> {
    let entry = opts
        .get(key)
        .ok_or_else(|| malformed(format!("missing {key}")))?;
    let name = entry
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed(format!("{key} without name")))?
        .to_string();
    let ty = TypeRef::parse(
        entry
            .get("type")
            .ok_or_else(|| malformed(format!("{key} without type")))?,
    )?;
    Ok((name, ty))
}

fn parse_registry_entry_holder(opts: &Value) -> Result<TypeDef, ProtoError> {
    let base_name = opts
        .get("baseName")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("registryEntryHolder without baseName"))?
        .to_string();
    let (otherwise_name, otherwise) = named_type(opts, "otherwise")?;
    Ok(TypeDef::RegistryEntryHolder {
        base_name,
        otherwise_name,
        otherwise,
    })
}

fn parse_registry_entry_holder_set(opts: &Value) -> Result<TypeDef, ProtoError> {
    let (base_name, base) = named_type(opts, "base")?;
    let (otherwise_name, otherwise) = named_type(opts, "otherwise")?;
    Ok(TypeDef::RegistryEntryHolderSet {
        base_name,
        base,
        otherwise_name,
        otherwise,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_named_reference() {
        let ty = TypeRef::parse(&json!("varint")).unwrap();
        assert!(matches!(ty, TypeRef::Named(n) if n == "varint"));
    }

    #[test]
    fn parse_container_fields() {
        let ty = TypeDef::parse(&json!(["container", [
            {"name": "id", "type": "varint"},
            {"anon": true, "type": "position"},
        ]]))
        .unwrap();
        let TypeDef::Container { fields } = ty else {
            panic!("expected container");
        };
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].name.as_deref(), Some("id"));
        assert!(fields[1].name.is_none());
    }

    #[test]
    fn parse_array_count_forms() {
        let fixed = TypeDef::parse(&json!(["array", {"count": 3, "type": "u8"}])).unwrap();
        assert!(matches!(
            fixed,
            TypeDef::Array {
                count: CountSpec::Fixed(3),
                ..
            }
        ));

        let prefixed =
            TypeDef::parse(&json!(["array", {"countType": "varint", "type": "u8"}])).unwrap();
        assert!(matches!(
            prefixed,
            TypeDef::Array {
                count: CountSpec::Prefixed(_),
                ..
            }
        ));

        let by_field = TypeDef::parse(&json!(["array", {"count": "n", "type": "u8"}])).unwrap();
        assert!(matches!(
            by_field,
            TypeDef::Array {
                count: CountSpec::FieldRef(p),
                ..
            } if p == "n"
        ));
    }

    #[test]
    fn parse_mapper_hex_keys() {
        let ty = TypeDef::parse(&json!(["mapper", {
            "type": "varint",
            "mappings": {"0x00": "set_protocol", "10": "other"},
        }]))
        .unwrap();
        let TypeDef::Mapper { to_name, to_id, .. } = ty else {
            panic!("expected mapper");
        };
        assert_eq!(to_name[&0], "set_protocol");
        assert_eq!(to_name[&10], "other");
        assert_eq!(to_id["other"], 10);
    }

    #[test]
    fn parse_bitfield_rejects_zero_width() {
        let err = TypeDef::parse(&json!(["bitfield", [{"name": "x", "size": 0}]]));
        assert!(err.is_err());
    }

    #[test]
    fn unknown_kind_rejected() {
        assert!(matches!(
            TypeDef::parse(&json!(["frobnicate", {}])),
            Err(ProtoError::UnknownType(k)) if k == "frobnicate"
        ));
    }
}
