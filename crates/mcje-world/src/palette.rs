//! Paletted containers: single / indirect / direct storage over a fixed
//! capacity, promoting upward as the set of distinct values grows.

use bytes::{BufMut, BytesMut};

use mcje_proto::codec::ProtoEncode;
use mcje_proto::schema::Reader;
use mcje_proto::types::VarInt;

use crate::bitarray::BitArray;
use crate::error::WorldError;

/// Storage variant. Promotion is one-way: single → indirect → direct.
#[derive(Debug, Clone, PartialEq)]
enum Storage {
    /// Every index maps to one global id; no bit array at all.
    Single(u32),
    /// Palette of global ids plus palette indices packed per value.
    Indirect { palette: Vec<u32>, data: BitArray },
    /// Global ids packed directly at the global bit width.
    Direct(BitArray),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PalettedContainer {
    storage: Storage,
    capacity: usize,
    /// Bits used when first leaving the single variant.
    min_bits: usize,
    /// Indirect ceiling: palette indices wider than this force direct.
    max_bits: usize,
    /// Width of a global id in the direct variant.
    global_bits: usize,
}

impl PalettedContainer {
    /// A container where every index holds `value`.
    pub fn single(
        value: u32,
        capacity: usize,
        min_bits: usize,
        max_bits: usize,
        global_bits: usize,
    ) -> Self {
        Self {
            storage: Storage::Single(value),
            capacity,
            min_bits,
            max_bits,
            global_bits,
        }
    }

    /// Build from a local palette and packed indices, as read from Anvil
    /// storage. A one-entry palette collapses to the single variant.
    pub fn from_local_palette(
        palette: Vec<u32>,
        data: Option<BitArray>,
        capacity: usize,
        min_bits: usize,
        max_bits: usize,
        global_bits: usize,
    ) -> Result<Self, WorldError> {
        let storage = match (palette.len(), data) {
            (1, _) => Storage::Single(palette[0]),
            (0, _) => Storage::Single(0),
            (_, Some(data)) => Storage::Indirect { palette, data },
            (_, None) => {
                return Err(WorldError::WrongStorageLength {
                    expected: capacity,
                    got: 0,
                })
            }
        };
        Ok(Self {
            storage,
            capacity,
            min_bits,
            max_bits,
            global_bits,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_single(&self) -> bool {
        matches!(self.storage, Storage::Single(_))
    }

    pub fn is_direct(&self) -> bool {
        matches!(self.storage, Storage::Direct(_))
    }

    /// The palette of the indirect variant, or the lone value of the single
    /// variant.
    pub fn palette(&self) -> Option<Vec<u32>> {
        match &self.storage {
            Storage::Single(v) => Some(vec![*v]),
            Storage::Indirect { palette, .. } => Some(palette.clone()),
            Storage::Direct(_) => None,
        }
    }

    pub fn get(&self, index: usize) -> u32 {
        debug_assert!(index < self.capacity);
        match &self.storage {
            Storage::Single(v) => *v,
            Storage::Indirect { palette, data } => palette[data.get(index) as usize],
            Storage::Direct(data) => data.get(index),
        }
    }

    pub fn set(&mut self, index: usize, value: u32) -> Result<(), WorldError> {
        debug_assert!(index < self.capacity);
        match &mut self.storage {
            Storage::Single(current) => {
                if *current == value {
                    return Ok(());
                }
                // Leave the single variant: palette [old, new], new value at
                // the given index.
                let old = *current;
                let mut data = BitArray::new(self.min_bits, self.capacity)?;
                data.set(index, 1);
                self.storage = Storage::Indirect {
                    palette: vec![old, value],
                    data,
                };
                Ok(())
            }
            Storage::Indirect { palette, data } => {
                let palette_index = match palette.iter().position(|&id| id == value) {
                    Some(i) => i,
                    None => {
                        palette.push(value);
                        let i = palette.len() - 1;
                        let needed = BitArray::needed_bits(i as u32);
                        if needed > data.bits_per_value() {
                            if needed <= self.max_bits {
                                *data = data.resized(needed)?;
                            } else {
                                self.promote_to_direct()?;
                                return self.set(index, value);
                            }
                        }
                        i
                    }
                };
                data.set(index, palette_index as u32);
                Ok(())
            }
            Storage::Direct(data) => {
                data.set(index, value);
                Ok(())
            }
        }
    }

    /// Materialise every index to its global id at the global bit width.
    fn promote_to_direct(&mut self) -> Result<(), WorldError> {
        let mut direct = BitArray::new(self.global_bits, self.capacity)?;
        for i in 0..self.capacity {
            direct.set(i, self.get(i));
        }
        self.storage = Storage::Direct(direct);
        Ok(())
    }

    // -------------------------------------------------------------------
    // Network form:
    //   bitsPerValue:u8
    //   single:   VarInt(value) ‖ VarInt(0)
    //   indirect: VarInt(len) ‖ VarInt[len] ‖ VarInt(longs) ‖ u64_be[longs]
    //   direct:   VarInt(longs) ‖ u64_be[longs]
    // -------------------------------------------------------------------

    pub fn write_network(&self, out: &mut BytesMut) {
        match &self.storage {
            Storage::Single(value) => {
                out.put_u8(0);
                VarInt(*value as i32).proto_encode(out);
                VarInt(0).proto_encode(out);
            }
            Storage::Indirect { palette, data } => {
                out.put_u8(data.bits_per_value() as u8);
                VarInt(palette.len() as i32).proto_encode(out);
                for &id in palette {
                    VarInt(id as i32).proto_encode(out);
                }
                write_longs(out, data.longs());
            }
            Storage::Direct(data) => {
                out.put_u8(data.bits_per_value() as u8);
                write_longs(out, data.longs());
            }
        }
    }

    pub fn read_network(
        r: &mut Reader<'_>,
        capacity: usize,
        min_bits: usize,
        max_bits: usize,
        global_bits: usize,
    ) -> Result<Self, WorldError> {
        let bits = r.get_u8()? as usize;
        let storage = if bits == 0 {
            let value = r.get_varint()? as u32;
            let longs = r.get_varint()?;
            if longs != 0 {
                return Err(WorldError::WrongStorageLength {
                    expected: 0,
                    got: longs.max(0) as usize,
                });
            }
            Storage::Single(value)
        } else if bits <= max_bits {
            let len = r.get_varint()?;
            if len < 0 {
                return Err(WorldError::FileFormat(format!("negative palette size {len}")));
            }
            let mut palette = Vec::with_capacity(len as usize);
            for _ in 0..len {
                palette.push(r.get_varint()? as u32);
            }
            let data = read_longs(r, bits, capacity)?;
            Storage::Indirect { palette, data }
        } else {
            // A width above the ceiling always reads at the configured
            // global width, whatever the sender claimed.
            let data = read_longs(r, bits, capacity)?;
            let data = if bits == global_bits {
                data
            } else {
                data.resized(global_bits)?
            };
            Storage::Direct(data)
        };
        Ok(Self {
            storage,
            capacity,
            min_bits,
            max_bits,
            global_bits,
        })
    }
}

fn write_longs(out: &mut BytesMut, longs: &[u64]) {
    VarInt(longs.len() as i32).proto_encode(out);
    for &word in longs {
        out.put_u64(word);
    }
}

fn read_longs(r: &mut Reader<'_>, bits: usize, capacity: usize) -> Result<BitArray, WorldError> {
    let count = r.get_varint()?;
    if count < 0 {
        return Err(WorldError::FileFormat(format!("negative long count {count}")));
    }
    let mut longs = Vec::with_capacity(count as usize);
    for _ in 0..count {
        longs.push(r.get_u64()?);
    }
    BitArray::from_longs(longs, bits, capacity)
}
