//! Size computation for schema types. Must agree byte-for-byte with
//! `write.rs` — the packet codec treats disagreement as fatal.

use serde_json::Value;

use super::def::{CountSpec, Field, TypeDef, TypeRef};
use super::{num_i64, value_to_bytes, ContextChain, TypeRegistry};
use crate::error::ProtoError;
use crate::types::{VarInt, VarLong};

impl TypeRegistry {
    pub fn size_of(
        &self,
        ty: &TypeRef,
        value: &Value,
        ctx: Option<&ContextChain<'_>>,
    ) -> Result<usize, ProtoError> {
        let def = self.resolve(ty)?;
        Ok(match def {
            TypeDef::Bool | TypeDef::I8 | TypeDef::U8 => 1,
            TypeDef::I16 | TypeDef::U16 => 2,
            TypeDef::I32 | TypeDef::U32 | TypeDef::F32 => 4,
            TypeDef::I64 | TypeDef::U64 | TypeDef::F64 => 8,
            TypeDef::VarInt => VarInt(num_i64(value)? as i32).size(),
            TypeDef::VarLong => VarLong(num_i64(value)?).size(),
            TypeDef::Void => 0,
            TypeDef::Uuid => 16,
            TypeDef::RestBuffer | TypeDef::Nbt | TypeDef::AnonymousNbt => {
                value_to_bytes(value)?.len()
            }
            TypeDef::PString { count } => {
                let len = value
                    .as_str()
                    .ok_or_else(|| ProtoError::BadValue {
                        expected: "string",
                        got: value.to_string(),
                    })?
                    .len();
                self.count_size(count, len, ctx)? + len
            }
            TypeDef::Buffer { count } => {
                let len = value_to_bytes(value)?.len();
                self.count_size(count, len, ctx)? + len
            }
            TypeDef::Container { fields } => self.container_size(fields, value, ctx)?,
            TypeDef::Array { count, elem } => {
                let items = value.as_array().ok_or_else(|| ProtoError::BadValue {
                    expected: "array",
                    got: value.to_string(),
                })?;
                let mut size = self.count_size(count, items.len(), ctx)?;
                for item in items {
                    size += self.size_of(elem, item, ctx)?;
                }
                size
            }
            TypeDef::Mapper { base, to_id, .. } => {
                let name = value.as_str().ok_or_else(|| ProtoError::BadValue {
                    expected: "mapped name",
                    got: value.to_string(),
                })?;
                let id = to_id
                    .get(name)
                    .ok_or_else(|| ProtoError::MapperMiss(name.to_string()))?;
                self.size_of(base, &Value::from(*id), ctx)?
            }
            TypeDef::Switch {
                compare_to,
                cases,
                default,
            } => {
                let branch = self.select_branch(compare_to, cases, default.as_deref(), ctx)?;
                self.size_of(branch, value, ctx)?
            }
            TypeDef::Option(inner) => {
                if value.is_null() {
                    1
                } else {
                    1 + self.size_of(inner, value, ctx)?
                }
            }
            TypeDef::Bitfield { members } => {
                let total: u32 = members.iter().map(|m| m.bits).sum();
                total.div_ceil(8) as usize
            }
            TypeDef::Bitflags { base, flags, shift } => {
                // The base may be a varint, so size it on the value that
                // write will actually produce.
                let obj = value.as_object().ok_or_else(|| ProtoError::BadValue {
                    expected: "flag object",
                    got: value.to_string(),
                })?;
                let mut bits: u64 = 0;
                match flags {
                    super::def::FlagSpec::Positional(names) => {
                        for (i, name) in names.iter().enumerate() {
                            if obj.get(name).and_then(Value::as_bool) == Some(true) {
                                bits |= 1 << i;
                            }
                        }
                    }
                    super::def::FlagSpec::Masked(entries) => {
                        for (name, mask) in entries {
                            if obj.get(name).and_then(Value::as_bool) == Some(true) {
                                bits |= mask;
                            }
                        }
                    }
                }
                self.size_of(base, &Value::from(bits << shift), ctx)?
            }
            TypeDef::EntityMetadataLoop { elem, .. } => {
                let items = value.as_array().ok_or_else(|| ProtoError::BadValue {
                    expected: "array",
                    got: value.to_string(),
                })?;
                let mut size = 1; // sentinel
                for item in items {
                    size += self.size_of(elem, item, ctx)?;
                }
                size
            }
            TypeDef::TopBitSetTerminatedArray { elem } => {
                let items = value.as_array().ok_or_else(|| ProtoError::BadValue {
                    expected: "array",
                    got: value.to_string(),
                })?;
                let mut size = 0;
                for item in items {
                    size += self.size_of(elem, item, ctx)?;
                }
                size
            }
            TypeDef::RegistryEntryHolder {
                base_name,
                otherwise_name,
                otherwise,
            } => {
                let obj = value.as_object().ok_or_else(|| ProtoError::BadValue {
                    expected: "object",
                    got: value.to_string(),
                })?;
                if let Some(inline) = obj.get(otherwise_name) {
                    VarInt(0).size() + self.size_of(otherwise, inline, ctx)?
                } else if let Some(id) = obj.get(base_name) {
                    VarInt(num_i64(id)? as i32 + 1).size()
                } else {
                    return Err(ProtoError::BadValue {
                        expected: "holder object",
                        got: value.to_string(),
                    });
                }
            }
            TypeDef::RegistryEntryHolderSet {
                base_name,
                base,
                otherwise_name,
                otherwise,
            } => {
                let obj = value.as_object().ok_or_else(|| ProtoError::BadValue {
                    expected: "object",
                    got: value.to_string(),
                })?;
                if let Some(tag) = obj.get(base_name) {
                    VarInt(0).size() + self.size_of(base, tag, ctx)?
                } else if let Some(ids) = obj.get(otherwise_name) {
                    let ids = ids.as_array().ok_or_else(|| ProtoError::BadValue {
                        expected: "id array",
                        got: value.to_string(),
                    })?;
                    let mut size = VarInt(ids.len() as i32 + 1).size();
                    for id in ids {
                        size += self.size_of(otherwise, id, ctx)?;
                    }
                    size
                } else {
                    return Err(ProtoError::BadValue {
                        expected: "holder set object",
                        got: value.to_string(),
                    });
                }
            }
        })
    }

    fn container_size(
        &self,
        fields: &[Field],
        value: &Value,
        parent: Option<&ContextChain<'_>>,
    ) -> Result<usize, ProtoError> {
        let obj = value.as_object().ok_or_else(|| ProtoError::BadValue {
            expected: "object",
            got: value.to_string(),
        })?;
        let mut size = 0;
        for field in fields {
            let chain = ContextChain { map: obj, parent };
            size += match &field.name {
                Some(name) => {
                    let v = obj.get(name).unwrap_or(&Value::Null);
                    self.size_of(&field.ty, v, Some(&chain))?
                }
                None => self.size_of(&field.ty, value, Some(&chain))?,
            };
        }
        Ok(size)
    }

    fn count_size(
        &self,
        spec: &CountSpec,
        actual: usize,
        ctx: Option<&ContextChain<'_>>,
    ) -> Result<usize, ProtoError> {
        match spec {
            CountSpec::Fixed(_) | CountSpec::FieldRef(_) => Ok(0),
            CountSpec::Prefixed(ty) => self.size_of(ty, &Value::from(actual as u64), ctx),
        }
    }
}
