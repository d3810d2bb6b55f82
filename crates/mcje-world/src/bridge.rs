//! Conversion between in-memory chunk columns and the on-disk (Anvil)
//! per-column NBT schema.
//!
//! Palette entries cross the registry seam here: global ids become
//! `{Name, Properties?}` compounds (blocks) or names (biomes) on the way
//! out and are resolved back on the way in. Heightmaps, block entities,
//! and status fields round-trip verbatim.

use indexmap::IndexMap;

use mcje_nbt::{NbtCompound, NbtRoot, NbtTag};

use crate::bitarray::{BitArray, NibbleArray};
use crate::column::{ChunkColumn, ColumnOptions};
use crate::error::WorldError;
use crate::palette::PalettedContainer;
use crate::registry::{BlockState, StateRegistry};
use crate::section::{
    BiomeSection, ChunkSection, BIOME_MIN_BITS, BIOME_SECTION_VOLUME, BLOCK_MIN_BITS,
    SECTION_VOLUME,
};

/// Column fields that live beside the block data in the NBT schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMeta {
    pub x: i32,
    pub z: i32,
    pub status: String,
    pub data_version: i32,
    pub heightmaps: NbtCompound,
}

impl ColumnMeta {
    pub fn new(x: i32, z: i32) -> Self {
        Self {
            x,
            z,
            status: "minecraft:full".into(),
            data_version: 0,
            heightmaps: NbtCompound::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Column -> NBT
// ---------------------------------------------------------------------------

pub fn column_to_nbt(
    column: &ChunkColumn,
    meta: &ColumnMeta,
    registry: &dyn StateRegistry,
) -> Result<NbtRoot, WorldError> {
    let opts = *column.options();
    let min_section = opts.min_y >> 4;

    let mut sections = Vec::with_capacity(column.num_sections() + 2);
    // The below-min light sheet rides along as a light-only section entry
    // with Y one under the world, the way vanilla stores it.
    if let Some(sec) = light_only_section(column, 0, min_section - 1) {
        sections.push(sec);
    }
    for (i, section) in column.sections().iter().enumerate() {
        let mut sec = NbtCompound::new();
        sec.insert("Y".into(), NbtTag::Byte((min_section + i as i32) as i8));
        sec.insert(
            "block_states".into(),
            NbtTag::Compound(block_states_to_nbt(section, registry)?),
        );
        sec.insert(
            "biomes".into(),
            NbtTag::Compound(biomes_to_nbt(&column.biome_sections()[i], registry)?),
        );
        if let Some(light) = column.block_light_slot(i + 1) {
            sec.insert("BlockLight".into(), NbtTag::ByteArray(nibbles_to_bytes(light)));
        }
        if let Some(light) = column.sky_light_slot(i + 1) {
            sec.insert("SkyLight".into(), NbtTag::ByteArray(nibbles_to_bytes(light)));
        }
        sections.push(NbtTag::Compound(sec));
    }
    // And the above-max sheet, one past the topmost block section.
    if let Some(sec) = light_only_section(
        column,
        column.num_sections() + 1,
        min_section + column.num_sections() as i32,
    ) {
        sections.push(sec);
    }

    let block_entities = column
        .block_entities()
        .values()
        .cloned()
        .map(NbtTag::Compound)
        .collect();

    let mut root = NbtCompound::new();
    root.insert("DataVersion".into(), NbtTag::Int(meta.data_version));
    root.insert("xPos".into(), NbtTag::Int(meta.x));
    root.insert("zPos".into(), NbtTag::Int(meta.z));
    root.insert("yPos".into(), NbtTag::Int(min_section));
    root.insert("Status".into(), NbtTag::String(meta.status.clone()));
    root.insert("sections".into(), NbtTag::List(sections));
    root.insert("block_entities".into(), NbtTag::List(block_entities));
    root.insert(
        "Heightmaps".into(),
        NbtTag::Compound(meta.heightmaps.clone()),
    );
    Ok(NbtRoot::new("", root))
}

/// A section entry carrying nothing but the light of a boundary slot.
/// `None` if the slot holds no light at all.
fn light_only_section(column: &ChunkColumn, slot: usize, y: i32) -> Option<NbtTag> {
    let block = column.block_light_slot(slot);
    let sky = column.sky_light_slot(slot);
    if block.is_none() && sky.is_none() {
        return None;
    }
    let mut sec = NbtCompound::new();
    sec.insert("Y".into(), NbtTag::Byte(y as i8));
    if let Some(light) = block {
        sec.insert("BlockLight".into(), NbtTag::ByteArray(nibbles_to_bytes(light)));
    }
    if let Some(light) = sky {
        sec.insert("SkyLight".into(), NbtTag::ByteArray(nibbles_to_bytes(light)));
    }
    Some(NbtTag::Compound(sec))
}

fn block_states_to_nbt(
    section: &ChunkSection,
    registry: &dyn StateRegistry,
) -> Result<NbtCompound, WorldError> {
    let (ids, data) = local_palette(section.blocks(), BLOCK_MIN_BITS)?;

    let mut palette = Vec::with_capacity(ids.len());
    for id in ids {
        let state = registry
            .block_state(id)
            .ok_or(WorldError::UnknownBlockId(id))?;
        let mut entry = NbtCompound::new();
        entry.insert("Name".into(), NbtTag::String(state.name.clone()));
        if !state.properties.is_empty() {
            let mut props = NbtCompound::new();
            for (k, v) in &state.properties {
                props.insert(k.clone(), NbtTag::String(v.clone()));
            }
            entry.insert("Properties".into(), NbtTag::Compound(props));
        }
        palette.push(NbtTag::Compound(entry));
    }

    let mut out = NbtCompound::new();
    out.insert("palette".into(), NbtTag::List(palette));
    if let Some(data) = data {
        out.insert("data".into(), NbtTag::LongArray(data.to_nbt_longs()));
    }
    Ok(out)
}

fn biomes_to_nbt(
    section: &BiomeSection,
    registry: &dyn StateRegistry,
) -> Result<NbtCompound, WorldError> {
    let (ids, data) = local_palette(section.biomes(), BIOME_MIN_BITS)?;

    let mut palette = Vec::with_capacity(ids.len());
    for id in ids {
        let name = registry
            .biome_name(id)
            .ok_or(WorldError::UnknownBlockId(id))?;
        palette.push(NbtTag::String(name.to_string()));
    }

    let mut out = NbtCompound::new();
    out.insert("palette".into(), NbtTag::List(palette));
    if let Some(data) = data {
        out.insert("data".into(), NbtTag::LongArray(data.to_nbt_longs()));
    }
    Ok(out)
}

/// Flatten a container to a local palette plus packed indices at the
/// canonical storage width. A uniform container yields no data array.
fn local_palette(
    container: &PalettedContainer,
    min_bits: usize,
) -> Result<(Vec<u32>, Option<BitArray>), WorldError> {
    let capacity = container.capacity();
    let mut palette: Vec<u32> = Vec::new();
    let mut indices = Vec::with_capacity(capacity);
    for i in 0..capacity {
        let id = container.get(i);
        let index = match palette.iter().position(|&p| p == id) {
            Some(p) => p,
            None => {
                palette.push(id);
                palette.len() - 1
            }
        };
        indices.push(index as u32);
    }

    if palette.len() <= 1 {
        if palette.is_empty() {
            palette.push(0);
        }
        return Ok((palette, None));
    }

    let bits = BitArray::needed_bits(palette.len() as u32 - 1).max(min_bits);
    let mut data = BitArray::new(bits, capacity)?;
    for (i, &index) in indices.iter().enumerate() {
        data.set(i, index);
    }
    Ok((palette, Some(data)))
}

// ---------------------------------------------------------------------------
// NBT -> Column
// ---------------------------------------------------------------------------

pub fn column_from_nbt(
    root: &NbtRoot,
    opts: ColumnOptions,
    registry: &dyn StateRegistry,
) -> Result<(ChunkColumn, ColumnMeta), WorldError> {
    let c = &root.compound;
    let x = c
        .get("xPos")
        .and_then(NbtTag::as_int)
        .ok_or(WorldError::MissingChunkField("xPos"))?;
    let z = c
        .get("zPos")
        .and_then(NbtTag::as_int)
        .ok_or(WorldError::MissingChunkField("zPos"))?;

    let mut meta = ColumnMeta::new(x, z);
    if let Some(status) = c.get("Status").and_then(NbtTag::as_string) {
        meta.status = status.to_string();
    }
    if let Some(version) = c.get("DataVersion").and_then(NbtTag::as_int) {
        meta.data_version = version;
    }
    if let Some(NbtTag::Compound(heightmaps)) = c.get("Heightmaps") {
        meta.heightmaps = heightmaps.clone();
    }

    let mut column = ChunkColumn::new(opts)?;
    let min_section = opts.min_y >> 4;

    if let Some(NbtTag::List(sections)) = c.get("sections") {
        for entry in sections {
            let Some(sec) = entry.as_compound() else {
                continue;
            };
            let y = sec
                .get("Y")
                .and_then(|t| t.as_byte().map(i32::from).or_else(|| t.as_int()))
                .ok_or(WorldError::MissingChunkField("sections[].Y"))?;
            let index = y - min_section;
            // Light slot: the boundary entries one below / above the world
            // map to the outer sheets. Anything further out is discarded.
            let slot = index + 1;
            if slot < 0 || slot as usize >= opts.num_light_slots() {
                continue;
            }
            let slot = slot as usize;

            if index >= 0 && (index as usize) < column.num_sections() {
                let index = index as usize;
                if let Some(NbtTag::Compound(states)) = sec.get("block_states") {
                    column.set_section(index, block_states_from_nbt(states, opts, registry)?);
                }
                if let Some(NbtTag::Compound(biomes)) = sec.get("biomes") {
                    column.set_biome_section(index, biomes_from_nbt(biomes, opts, registry)?);
                }
            }
            if let Some(NbtTag::ByteArray(light)) = sec.get("SkyLight") {
                column.set_sky_light_slot(slot, Some(bytes_to_nibbles(light)?));
            }
            if let Some(NbtTag::ByteArray(light)) = sec.get("BlockLight") {
                column.set_block_light_slot(slot, Some(bytes_to_nibbles(light)?));
            }
        }
    }

    if let Some(NbtTag::List(entities)) = c.get("block_entities") {
        for entry in entities {
            let Some(record) = entry.as_compound() else {
                continue;
            };
            let (Some(ex), Some(ey), Some(ez)) = (
                record.get("x").and_then(NbtTag::as_int),
                record.get("y").and_then(NbtTag::as_int),
                record.get("z").and_then(NbtTag::as_int),
            ) else {
                continue;
            };
            column.set_block_entity((ex & 15) as u32, ey, (ez & 15) as u32, record.clone());
        }
    }

    Ok((column, meta))
}

fn block_states_from_nbt(
    states: &NbtCompound,
    opts: ColumnOptions,
    registry: &dyn StateRegistry,
) -> Result<ChunkSection, WorldError> {
    let palette_tags = match states.get("palette") {
        Some(NbtTag::List(palette)) => palette.as_slice(),
        _ => return Err(WorldError::MissingChunkField("block_states.palette")),
    };

    let mut ids = Vec::with_capacity(palette_tags.len());
    for tag in palette_tags {
        let entry = tag
            .as_compound()
            .ok_or(WorldError::MissingChunkField("block_states.palette[]"))?;
        let name = entry
            .get("Name")
            .and_then(NbtTag::as_string)
            .ok_or(WorldError::MissingChunkField("palette[].Name"))?;
        let mut properties = IndexMap::new();
        if let Some(NbtTag::Compound(props)) = entry.get("Properties") {
            for (k, v) in props {
                if let Some(v) = v.as_string() {
                    properties.insert(k.clone(), v.to_string());
                }
            }
        }
        let state = BlockState {
            name: name.to_string(),
            properties,
        };
        let id = registry
            .block_id(&state)
            .ok_or_else(|| WorldError::UnknownBlockState(state.name.clone()))?;
        ids.push(id);
    }

    // A palette of zero or one entries is uniform; any data array present
    // in corrupt input carries no information and is ignored.
    let data = match states.get("data") {
        Some(NbtTag::LongArray(longs)) if ids.len() > 1 => {
            let bits = BitArray::needed_bits(ids.len() as u32 - 1).max(BLOCK_MIN_BITS);
            Some(BitArray::from_nbt_longs(longs, bits, SECTION_VOLUME)?)
        }
        _ => None,
    };
    ChunkSection::from_local_palette(ids, data, opts.max_bits_per_block)
}

fn biomes_from_nbt(
    biomes: &NbtCompound,
    opts: ColumnOptions,
    registry: &dyn StateRegistry,
) -> Result<BiomeSection, WorldError> {
    let palette_tags = match biomes.get("palette") {
        Some(NbtTag::List(palette)) => palette.as_slice(),
        _ => return Err(WorldError::MissingChunkField("biomes.palette")),
    };

    let mut ids = Vec::with_capacity(palette_tags.len());
    for tag in palette_tags {
        let name = tag
            .as_string()
            .ok_or(WorldError::MissingChunkField("biomes.palette[]"))?;
        let id = registry
            .biome_id(name)
            .ok_or_else(|| WorldError::UnknownBlockState(name.to_string()))?;
        ids.push(id);
    }

    let data = match biomes.get("data") {
        Some(NbtTag::LongArray(longs)) if ids.len() > 1 => {
            let bits = BitArray::needed_bits(ids.len() as u32 - 1).max(BIOME_MIN_BITS);
            Some(BitArray::from_nbt_longs(longs, bits, BIOME_SECTION_VOLUME)?)
        }
        _ => None,
    };
    BiomeSection::from_local_palette(ids, data, opts.max_bits_per_biome)
}

// ---------------------------------------------------------------------------
// Nibble layout
// ---------------------------------------------------------------------------

/// Vanilla light layout: byte k holds cell 2k in its low nibble and cell
/// 2k+1 in its high nibble.
fn nibbles_to_bytes(data: &NibbleArray) -> Vec<i8> {
    let mut out = Vec::with_capacity(SECTION_VOLUME / 2);
    for k in 0..SECTION_VOLUME / 2 {
        let low = data.get(2 * k) as u8;
        let high = data.get(2 * k + 1) as u8;
        out.push((low | (high << 4)) as i8);
    }
    out
}

fn bytes_to_nibbles(bytes: &[i8]) -> Result<NibbleArray, WorldError> {
    if bytes.len() != SECTION_VOLUME / 2 {
        return Err(WorldError::WrongStorageLength {
            expected: SECTION_VOLUME / 2,
            got: bytes.len(),
        });
    }
    let mut arr = NibbleArray::new(4, SECTION_VOLUME)?;
    for (k, &b) in bytes.iter().enumerate() {
        let b = b as u8;
        arr.set(2 * k, (b & 0x0f) as u32);
        arr.set(2 * k + 1, (b >> 4) as u32);
    }
    Ok(arr)
}
