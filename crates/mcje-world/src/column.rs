//! Chunk columns: a vertical stack of sections plus biome cells, light
//! layers, and block entities.

use bytes::{BufMut, Bytes, BytesMut};
use indexmap::IndexMap;

use mcje_nbt::NbtCompound;
use mcje_proto::schema::Reader;

use crate::bitarray::{BitArray, NibbleArray};
use crate::error::WorldError;
use crate::section::{BiomeSection, ChunkSection};

/// Cells in one light slot (16³ nibbles).
const LIGHT_CELLS: usize = 4096;

/// Shape parameters for a column. `max_bits_per_block` / `max_bits_per_biome`
/// are the direct (global id) widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnOptions {
    pub min_y: i32,
    pub world_height: u32,
    pub max_bits_per_block: usize,
    pub max_bits_per_biome: usize,
}

impl Default for ColumnOptions {
    fn default() -> Self {
        // Overworld shape since 1.18.
        Self {
            min_y: -64,
            world_height: 384,
            max_bits_per_block: 15,
            max_bits_per_biome: 6,
        }
    }
}

impl ColumnOptions {
    pub fn num_sections(&self) -> usize {
        (self.world_height / 16) as usize
    }

    /// Light slots: one per section plus the below-min and above-max sheets.
    pub fn num_light_slots(&self) -> usize {
        self.num_sections() + 2
    }
}

/// Mask long-arrays for the light part of a chunk packet.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LightMasks {
    pub sky: Vec<i64>,
    pub block: Vec<i64>,
    pub empty_sky: Vec<i64>,
    pub empty_block: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChunkColumn {
    opts: ColumnOptions,
    sections: Vec<ChunkSection>,
    biomes: Vec<BiomeSection>,
    sky_light: Vec<Option<NibbleArray>>,
    block_light: Vec<Option<NibbleArray>>,
    sky_light_mask: BitArray,
    block_light_mask: BitArray,
    empty_sky_light_mask: BitArray,
    empty_block_light_mask: BitArray,
    block_entities: IndexMap<String, NbtCompound>,
}

impl ChunkColumn {
    pub fn new(opts: ColumnOptions) -> Result<Self, WorldError> {
        let n = opts.num_sections();
        let slots = opts.num_light_slots();
        Ok(Self {
            opts,
            sections: (0..n)
                .map(|_| ChunkSection::empty(opts.max_bits_per_block))
                .collect(),
            biomes: (0..n)
                .map(|_| BiomeSection::filled(0, opts.max_bits_per_biome))
                .collect(),
            sky_light: (0..slots).map(|_| None).collect(),
            block_light: (0..slots).map(|_| None).collect(),
            sky_light_mask: BitArray::new(1, slots)?,
            block_light_mask: BitArray::new(1, slots)?,
            empty_sky_light_mask: BitArray::new(1, slots)?,
            empty_block_light_mask: BitArray::new(1, slots)?,
            block_entities: IndexMap::new(),
        })
    }

    pub fn options(&self) -> &ColumnOptions {
        &self.opts
    }

    pub fn num_sections(&self) -> usize {
        self.sections.len()
    }

    pub fn sections(&self) -> &[ChunkSection] {
        &self.sections
    }

    pub fn biome_sections(&self) -> &[BiomeSection] {
        &self.biomes
    }

    /// Replace one block section (used by the storage bridge).
    pub fn set_section(&mut self, index: usize, section: ChunkSection) {
        self.sections[index] = section;
    }

    pub fn set_biome_section(&mut self, index: usize, section: BiomeSection) {
        self.biomes[index] = section;
    }

    /// Raw nibble store of a sky-light slot, if present.
    pub fn sky_light_slot(&self, slot: usize) -> Option<&NibbleArray> {
        self.sky_light[slot].as_ref()
    }

    pub fn block_light_slot(&self, slot: usize) -> Option<&NibbleArray> {
        self.block_light[slot].as_ref()
    }

    /// Install or clear a whole light slot, keeping the masks in step.
    pub fn set_sky_light_slot(&mut self, slot: usize, data: Option<NibbleArray>) {
        self.sky_light_mask.set(slot, data.is_some() as u32);
        if data.is_some() {
            self.empty_sky_light_mask.set(slot, 0);
        }
        self.sky_light[slot] = data;
    }

    pub fn set_block_light_slot(&mut self, slot: usize, data: Option<NibbleArray>) {
        self.block_light_mask.set(slot, data.is_some() as u32);
        if data.is_some() {
            self.empty_block_light_mask.set(slot, 0);
        }
        self.block_light[slot] = data;
    }

    fn section_index(&self, y: i32) -> Result<usize, WorldError> {
        let shifted = y - self.opts.min_y;
        if shifted < 0 || shifted >= self.opts.world_height as i32 {
            return Err(WorldError::OutOfColumn { x: 0, y, z: 0 });
        }
        Ok((shifted >> 4) as usize)
    }

    // -------------------------------------------------------------------
    // Blocks and biomes
    // -------------------------------------------------------------------

    pub fn get_block_id(&self, x: u32, y: i32, z: u32) -> Result<u32, WorldError> {
        let section = self.section_index(y)?;
        let local_y = ((y - self.opts.min_y) & 15) as u32;
        Ok(self.sections[section].get(x, local_y, z))
    }

    pub fn set_block_id(&mut self, x: u32, y: i32, z: u32, id: u32) -> Result<(), WorldError> {
        let section = self.section_index(y)?;
        let local_y = ((y - self.opts.min_y) & 15) as u32;
        self.sections[section].set(x, local_y, z, id)
    }

    /// Biome cells are 4×4×4, so block coordinates scale down by four.
    pub fn get_biome_id(&self, x: u32, y: i32, z: u32) -> Result<u32, WorldError> {
        let section = self.section_index(y)?;
        let local_y = (((y - self.opts.min_y) & 15) >> 2) as u32;
        Ok(self.biomes[section].get(x >> 2, local_y, z >> 2))
    }

    pub fn set_biome_id(&mut self, x: u32, y: i32, z: u32, biome: u32) -> Result<(), WorldError> {
        let section = self.section_index(y)?;
        let local_y = (((y - self.opts.min_y) & 15) >> 2) as u32;
        self.biomes[section].set(x >> 2, local_y, z >> 2, biome)
    }

    // -------------------------------------------------------------------
    // Light
    // -------------------------------------------------------------------

    /// Slot for a block Y: `⌊(y − minY)/16⌋ + 1`, so the sheets below and
    /// above the world land on the first and last slots.
    fn light_slot(&self, y: i32) -> Result<usize, WorldError> {
        let shifted = y - self.opts.min_y;
        let slot = (shifted >> 4) + 1;
        if slot < 0 || slot as usize >= self.opts.num_light_slots() {
            return Err(WorldError::OutOfColumn { x: 0, y, z: 0 });
        }
        Ok(slot as usize)
    }

    fn light_cell(&self, x: u32, y: i32, z: u32) -> usize {
        let local_y = (y - self.opts.min_y).rem_euclid(16) as u32;
        ((local_y << 8) | (z << 4) | x) as usize
    }

    pub fn get_sky_light(&self, x: u32, y: i32, z: u32) -> Result<u8, WorldError> {
        let slot = self.light_slot(y)?;
        Ok(match &self.sky_light[slot] {
            Some(data) => data.get(self.light_cell(x, y, z)) as u8,
            None => 0,
        })
    }

    /// Writing a non-zero value allocates the slot and flips the presence
    /// mask; writing zero into an absent slot stays a no-op.
    pub fn set_sky_light(&mut self, x: u32, y: i32, z: u32, value: u8) -> Result<(), WorldError> {
        let slot = self.light_slot(y)?;
        let cell = self.light_cell(x, y, z);
        if self.sky_light[slot].is_none() {
            if value == 0 {
                return Ok(());
            }
            self.sky_light[slot] = Some(NibbleArray::new(4, LIGHT_CELLS)?);
            self.sky_light_mask.set(slot, 1);
            self.empty_sky_light_mask.set(slot, 0);
        }
        if let Some(data) = &mut self.sky_light[slot] {
            data.set(cell, value as u32);
        }
        Ok(())
    }

    pub fn get_block_light(&self, x: u32, y: i32, z: u32) -> Result<u8, WorldError> {
        let slot = self.light_slot(y)?;
        Ok(match &self.block_light[slot] {
            Some(data) => data.get(self.light_cell(x, y, z)) as u8,
            None => 0,
        })
    }

    pub fn set_block_light(&mut self, x: u32, y: i32, z: u32, value: u8) -> Result<(), WorldError> {
        let slot = self.light_slot(y)?;
        let cell = self.light_cell(x, y, z);
        if self.block_light[slot].is_none() {
            if value == 0 {
                return Ok(());
            }
            self.block_light[slot] = Some(NibbleArray::new(4, LIGHT_CELLS)?);
            self.block_light_mask.set(slot, 1);
            self.empty_block_light_mask.set(slot, 0);
        }
        if let Some(data) = &mut self.block_light[slot] {
            data.set(cell, value as u32);
        }
        Ok(())
    }

    /// The four masks as NBT-style long arrays.
    pub fn light_masks(&self) -> LightMasks {
        LightMasks {
            sky: self.sky_light_mask.to_nbt_longs(),
            block: self.block_light_mask.to_nbt_longs(),
            empty_sky: self.empty_sky_light_mask.to_nbt_longs(),
            empty_block: self.empty_block_light_mask.to_nbt_longs(),
        }
    }

    /// One byte blob per slot set in the sky presence mask, in slot order.
    /// Each blob is the slot's 256 words big-endian.
    pub fn sky_light_sections(&self) -> Vec<Vec<u8>> {
        light_sections(&self.sky_light, &self.sky_light_mask)
    }

    pub fn block_light_sections(&self) -> Vec<Vec<u8>> {
        light_sections(&self.block_light, &self.block_light_mask)
    }

    /// Install light data as carried by a chunk packet.
    pub fn load_light(
        &mut self,
        masks: &LightMasks,
        sky_sections: &[Vec<u8>],
        block_sections: &[Vec<u8>],
    ) -> Result<(), WorldError> {
        let slots = self.opts.num_light_slots();
        self.sky_light_mask = BitArray::from_nbt_longs(&masks.sky, 1, slots)?;
        self.block_light_mask = BitArray::from_nbt_longs(&masks.block, 1, slots)?;
        self.empty_sky_light_mask = BitArray::from_nbt_longs(&masks.empty_sky, 1, slots)?;
        self.empty_block_light_mask = BitArray::from_nbt_longs(&masks.empty_block, 1, slots)?;
        load_light_sections(&mut self.sky_light, &self.sky_light_mask, sky_sections)?;
        load_light_sections(&mut self.block_light, &self.block_light_mask, block_sections)?;
        Ok(())
    }

    // -------------------------------------------------------------------
    // Block entities
    // -------------------------------------------------------------------

    /// Keys are chunk-local coordinates.
    pub fn block_entity_key(x: u32, y: i32, z: u32) -> String {
        format!("{x},{y},{z}")
    }

    pub fn set_block_entity(&mut self, x: u32, y: i32, z: u32, record: NbtCompound) {
        self.block_entities
            .insert(Self::block_entity_key(x, y, z), record);
    }

    pub fn block_entity(&self, x: u32, y: i32, z: u32) -> Option<&NbtCompound> {
        self.block_entities.get(&Self::block_entity_key(x, y, z))
    }

    pub fn remove_block_entity(&mut self, x: u32, y: i32, z: u32) -> Option<NbtCompound> {
        self.block_entities
            .shift_remove(&Self::block_entity_key(x, y, z))
    }

    pub fn block_entities(&self) -> &IndexMap<String, NbtCompound> {
        &self.block_entities
    }

    pub fn block_entities_mut(&mut self) -> &mut IndexMap<String, NbtCompound> {
        &mut self.block_entities
    }

    // -------------------------------------------------------------------
    // Network form
    // -------------------------------------------------------------------

    /// The `map_chunk` data payload: every section in order, each followed
    /// by its biome section.
    pub fn write_network(&self) -> Bytes {
        let mut out = BytesMut::new();
        for (section, biomes) in self.sections.iter().zip(&self.biomes) {
            section.write_network(&mut out);
            biomes.write_network(&mut out);
        }
        out.freeze()
    }

    /// Decode a `map_chunk` data payload. Light arrives separately.
    pub fn read_network(opts: ColumnOptions, data: &[u8]) -> Result<Self, WorldError> {
        let mut column = Self::new(opts)?;
        let mut r = Reader::new(data);
        for i in 0..column.sections.len() {
            column.sections[i] = ChunkSection::read_network(&mut r, opts.max_bits_per_block)?;
            column.biomes[i] = BiomeSection::read_network(&mut r, opts.max_bits_per_biome)?;
        }
        if r.remaining() > 0 {
            return Err(WorldError::Proto(
                mcje_proto::ProtoError::TrailingBytes(r.remaining()),
            ));
        }
        Ok(column)
    }
}

fn light_sections(slots: &[Option<NibbleArray>], mask: &BitArray) -> Vec<Vec<u8>> {
    let mut out = Vec::new();
    for (i, slot) in slots.iter().enumerate() {
        if mask.get(i) == 0 {
            continue;
        }
        let mut blob = BytesMut::with_capacity(LIGHT_CELLS / 2);
        match slot {
            Some(data) => {
                for &word in data.longs() {
                    blob.put_u64(word);
                }
            }
            None => blob.resize(LIGHT_CELLS / 2, 0),
        }
        out.push(blob.to_vec());
    }
    out
}

fn load_light_sections(
    slots: &mut [Option<NibbleArray>],
    mask: &BitArray,
    sections: &[Vec<u8>],
) -> Result<(), WorldError> {
    let mut provided = sections.iter();
    for i in 0..slots.len() {
        if mask.get(i) == 0 {
            slots[i] = None;
            continue;
        }
        let blob = provided.next().ok_or(WorldError::WrongStorageLength {
            expected: LIGHT_CELLS / 2,
            got: 0,
        })?;
        if blob.len() != LIGHT_CELLS / 2 {
            return Err(WorldError::WrongStorageLength {
                expected: LIGHT_CELLS / 2,
                got: blob.len(),
            });
        }
        let words: Vec<u64> = blob
            .chunks_exact(8)
            .map(|c| u64::from_be_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
            .collect();
        slots[i] = Some(BitArray::from_longs(words, 4, LIGHT_CELLS)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcje_nbt::NbtTag;

    fn column() -> ChunkColumn {
        ChunkColumn::new(ColumnOptions::default()).unwrap()
    }

    #[test]
    fn default_shape() {
        let c = column();
        assert_eq!(c.num_sections(), 24);
        assert_eq!(c.options().num_light_slots(), 26);
    }

    #[test]
    fn block_get_set_across_sections() {
        let mut c = column();
        c.set_block_id(5, 64, 5, 1).unwrap();
        c.set_block_id(0, -64, 0, 7).unwrap();
        c.set_block_id(15, 319, 15, 9).unwrap();
        assert_eq!(c.get_block_id(5, 64, 5).unwrap(), 1);
        assert_eq!(c.get_block_id(0, -64, 0).unwrap(), 7);
        assert_eq!(c.get_block_id(15, 319, 15).unwrap(), 9);
        assert_eq!(c.get_block_id(5, 65, 5).unwrap(), 0);
    }

    #[test]
    fn out_of_range_y_rejected() {
        let mut c = column();
        assert!(c.set_block_id(0, -65, 0, 1).is_err());
        assert!(c.set_block_id(0, 320, 0, 1).is_err());
        assert!(c.get_block_id(0, 400, 0).is_err());
    }

    #[test]
    fn biome_scaling() {
        let mut c = column();
        c.set_biome_id(5, 64, 9, 4).unwrap();
        // The whole 4×4×4 cell shares the value.
        assert_eq!(c.get_biome_id(4, 65, 8).unwrap(), 4);
        assert_eq!(c.get_biome_id(7, 67, 11).unwrap(), 4);
        assert_eq!(c.get_biome_id(0, 64, 0).unwrap(), 0);
    }

    #[test]
    fn light_slot_allocation() {
        let mut c = column();
        // Zero write into an absent slot does not allocate.
        c.set_sky_light(0, 64, 0, 0).unwrap();
        assert_eq!(c.light_masks().sky[0], 0);

        c.set_sky_light(3, 64, 3, 15).unwrap();
        assert_eq!(c.get_sky_light(3, 64, 3).unwrap(), 15);
        assert_eq!(c.get_sky_light(3, 65, 3).unwrap(), 0);
        // y=64 -> slot (64+64)/16 + 1 = 9.
        assert_eq!(c.light_masks().sky[0] & (1 << 9), 1 << 9);
    }

    #[test]
    fn light_below_and_above_world() {
        let mut c = column();
        // One below min and one above max land on the outer sheets.
        c.set_block_light(0, -65, 0, 8).unwrap();
        c.set_block_light(0, 320, 0, 3).unwrap();
        assert_eq!(c.get_block_light(0, -65, 0).unwrap(), 8);
        assert_eq!(c.get_block_light(0, 320, 0).unwrap(), 3);
        let masks = c.light_masks();
        assert_eq!(masks.block[0] & 1, 1, "slot 0");
        assert_eq!(masks.block[0] & (1 << 25), 1 << 25, "slot 25");
    }

    #[test]
    fn light_roundtrip_through_network_form() {
        let mut c = column();
        c.set_sky_light(1, 64, 2, 12).unwrap();
        c.set_sky_light(8, 200, 8, 5).unwrap();
        c.set_block_light(0, 0, 0, 7).unwrap();

        let masks = c.light_masks();
        let sky = c.sky_light_sections();
        let block = c.block_light_sections();
        assert_eq!(sky.len(), 2);
        assert_eq!(block.len(), 1);
        assert_eq!(sky[0].len(), 2048);

        let mut fresh = column();
        fresh.load_light(&masks, &sky, &block).unwrap();
        assert_eq!(fresh.get_sky_light(1, 64, 2).unwrap(), 12);
        assert_eq!(fresh.get_sky_light(8, 200, 8).unwrap(), 5);
        assert_eq!(fresh.get_block_light(0, 0, 0).unwrap(), 7);
        assert_eq!(fresh.get_block_light(1, 0, 0).unwrap(), 0);
    }

    #[test]
    fn block_entity_records() {
        let mut c = column();
        let mut record = NbtCompound::new();
        record.insert("id".into(), NbtTag::String("minecraft:chest".into()));
        c.set_block_entity(5, 64, 9, record.clone());

        assert_eq!(c.block_entity(5, 64, 9), Some(&record));
        assert_eq!(c.block_entity(5, 65, 9), None);
        assert_eq!(c.remove_block_entity(5, 64, 9), Some(record));
        assert!(c.block_entities().is_empty());
    }

    #[test]
    fn network_roundtrip_byte_exact() {
        let mut c = column();
        c.set_block_id(5, 64, 5, 1).unwrap();
        c.set_block_id(0, -60, 12, 800).unwrap();
        c.set_biome_id(0, 64, 0, 3).unwrap();

        let bytes = c.write_network();
        let decoded = ChunkColumn::read_network(ColumnOptions::default(), &bytes).unwrap();
        assert_eq!(decoded.get_block_id(5, 64, 5).unwrap(), 1);
        assert_eq!(decoded.get_block_id(0, -60, 12).unwrap(), 800);
        assert_eq!(decoded.get_biome_id(0, 64, 0).unwrap(), 3);
        assert_eq!(decoded.get_block_id(1, 64, 5).unwrap(), 0);

        // Byte-level fixpoint.
        assert_eq!(decoded.write_network(), bytes);
    }

    #[test]
    fn single_block_column_roundtrip() {
        // minY=-64, height=384, 15 block bits, 6 biome bits; block id 1 at
        // (5, 64, 5); everything else must stay air after a roundtrip.
        let mut c = column();
        c.set_block_id(5, 64, 5, 1).unwrap();
        let decoded =
            ChunkColumn::read_network(ColumnOptions::default(), &c.write_network()).unwrap();
        assert_eq!(decoded.get_block_id(5, 64, 5).unwrap(), 1);
        for y in [-64, 0, 63, 64, 65, 319] {
            for x in 0..16u32 {
                for z in 0..16u32 {
                    if (x, y, z) != (5, 64, 5) {
                        assert_eq!(decoded.get_block_id(x, y, z).unwrap(), 0);
                    }
                }
            }
        }
    }

    #[test]
    fn truncated_network_payload_rejected() {
        let c = column();
        let bytes = c.write_network();
        assert!(ChunkColumn::read_network(ColumnOptions::default(), &bytes[..bytes.len() - 1])
            .is_err());
    }
}
