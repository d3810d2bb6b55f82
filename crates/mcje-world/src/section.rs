//! Chunk sections (16³ blocks) and biome sections (4³ cells).

use bytes::{BufMut, BytesMut};

use mcje_proto::schema::Reader;

use crate::bitarray::BitArray;
use crate::error::WorldError;
use crate::palette::PalettedContainer;

/// Blocks per chunk section.
pub const SECTION_VOLUME: usize = 4096;
/// Biome cells per section.
pub const BIOME_SECTION_VOLUME: usize = 64;

/// Width below which a block container stays indirect.
pub const BLOCK_INDIRECT_CEILING: usize = 8;
/// First width of an indirect block palette.
pub const BLOCK_MIN_BITS: usize = 4;
/// Width below which a biome container stays indirect.
pub const BIOME_INDIRECT_CEILING: usize = 3;
/// First width of an indirect biome palette.
pub const BIOME_MIN_BITS: usize = 1;

/// A 16×16×16 block cube. Tracks how many of its cells hold a non-air id so
/// emptiness checks are O(1).
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkSection {
    blocks: PalettedContainer,
    solid_block_count: u16,
}

#[inline]
fn block_index(x: u32, y: u32, z: u32) -> usize {
    debug_assert!(x < 16 && y < 16 && z < 16);
    ((y << 8) | (z << 4) | x) as usize
}

impl ChunkSection {
    /// An all-air section.
    pub fn empty(global_bits: usize) -> Self {
        Self {
            blocks: PalettedContainer::single(
                0,
                SECTION_VOLUME,
                BLOCK_MIN_BITS,
                BLOCK_INDIRECT_CEILING,
                global_bits,
            ),
            solid_block_count: 0,
        }
    }

    /// Adopt a local palette plus packed indices from Anvil storage and
    /// recount solid blocks.
    pub fn from_local_palette(
        palette: Vec<u32>,
        data: Option<BitArray>,
        global_bits: usize,
    ) -> Result<Self, WorldError> {
        let blocks = PalettedContainer::from_local_palette(
            palette,
            data,
            SECTION_VOLUME,
            BLOCK_MIN_BITS,
            BLOCK_INDIRECT_CEILING,
            global_bits,
        )?;
        let mut section = Self {
            blocks,
            solid_block_count: 0,
        };
        section.recount();
        Ok(section)
    }

    fn recount(&mut self) {
        let mut count = 0u16;
        for i in 0..SECTION_VOLUME {
            if self.blocks.get(i) != 0 {
                count += 1;
            }
        }
        self.solid_block_count = count;
    }

    pub fn get(&self, x: u32, y: u32, z: u32) -> u32 {
        self.blocks.get(block_index(x, y, z))
    }

    pub fn set(&mut self, x: u32, y: u32, z: u32, id: u32) -> Result<(), WorldError> {
        let index = block_index(x, y, z);
        let old = self.blocks.get(index);
        if old == 0 && id != 0 {
            self.solid_block_count += 1;
        } else if old != 0 && id == 0 {
            self.solid_block_count -= 1;
        }
        self.blocks.set(index, id)
    }

    pub fn solid_block_count(&self) -> u16 {
        self.solid_block_count
    }

    pub fn is_empty(&self) -> bool {
        self.solid_block_count == 0
    }

    pub fn blocks(&self) -> &PalettedContainer {
        &self.blocks
    }

    /// Network form: `solidBlockCount:u16_be ‖ container`.
    pub fn write_network(&self, out: &mut BytesMut) {
        out.put_u16(self.solid_block_count);
        self.blocks.write_network(out);
    }

    pub fn read_network(r: &mut Reader<'_>, global_bits: usize) -> Result<Self, WorldError> {
        let solid_block_count = r.get_u16()?;
        let blocks = PalettedContainer::read_network(
            r,
            SECTION_VOLUME,
            BLOCK_MIN_BITS,
            BLOCK_INDIRECT_CEILING,
            global_bits,
        )?;
        Ok(Self {
            blocks,
            solid_block_count,
        })
    }
}

/// A 4×4×4 biome cube. No occupancy tally.
#[derive(Debug, Clone, PartialEq)]
pub struct BiomeSection {
    biomes: PalettedContainer,
}

#[inline]
fn biome_index(x: u32, y: u32, z: u32) -> usize {
    debug_assert!(x < 4 && y < 4 && z < 4);
    ((y << 4) | (z << 2) | x) as usize
}

impl BiomeSection {
    pub fn filled(biome: u32, global_bits: usize) -> Self {
        Self {
            biomes: PalettedContainer::single(
                biome,
                BIOME_SECTION_VOLUME,
                BIOME_MIN_BITS,
                BIOME_INDIRECT_CEILING,
                global_bits,
            ),
        }
    }

    pub fn from_local_palette(
        palette: Vec<u32>,
        data: Option<BitArray>,
        global_bits: usize,
    ) -> Result<Self, WorldError> {
        Ok(Self {
            biomes: PalettedContainer::from_local_palette(
                palette,
                data,
                BIOME_SECTION_VOLUME,
                BIOME_MIN_BITS,
                BIOME_INDIRECT_CEILING,
                global_bits,
            )?,
        })
    }

    pub fn get(&self, x: u32, y: u32, z: u32) -> u32 {
        self.biomes.get(biome_index(x, y, z))
    }

    pub fn set(&mut self, x: u32, y: u32, z: u32, biome: u32) -> Result<(), WorldError> {
        self.biomes.set(biome_index(x, y, z), biome)
    }

    pub fn biomes(&self) -> &PalettedContainer {
        &self.biomes
    }

    pub fn write_network(&self, out: &mut BytesMut) {
        self.biomes.write_network(out);
    }

    pub fn read_network(r: &mut Reader<'_>, global_bits: usize) -> Result<Self, WorldError> {
        Ok(Self {
            biomes: PalettedContainer::read_network(
                r,
                BIOME_SECTION_VOLUME,
                BIOME_MIN_BITS,
                BIOME_INDIRECT_CEILING,
                global_bits,
            )?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_function() {
        assert_eq!(block_index(0, 0, 0), 0);
        assert_eq!(block_index(15, 0, 0), 15);
        assert_eq!(block_index(0, 0, 15), 240);
        assert_eq!(block_index(0, 15, 0), 3840);
        assert_eq!(block_index(5, 3, 9), (3 << 8) | (9 << 4) | 5);
    }

    #[test]
    fn solid_count_tracks_sets() {
        let mut s = ChunkSection::empty(15);
        assert!(s.is_empty());
        s.set(0, 0, 0, 1).unwrap();
        s.set(1, 0, 0, 2).unwrap();
        assert_eq!(s.solid_block_count(), 2);

        // Overwriting solid with solid: unchanged.
        s.set(0, 0, 0, 3).unwrap();
        assert_eq!(s.solid_block_count(), 2);

        // Back to air: decremented.
        s.set(0, 0, 0, 0).unwrap();
        s.set(1, 0, 0, 0).unwrap();
        assert!(s.is_empty());
    }

    #[test]
    fn solid_count_matches_brute_force() {
        let mut s = ChunkSection::empty(15);
        for step in 0..3000usize {
            let x = (step * 7) as u32 % 16;
            let y = (step * 13) as u32 % 16;
            let z = (step * 29) as u32 % 16;
            s.set(x, y, z, (step % 5) as u32).unwrap();
        }
        let mut brute = 0u16;
        for y in 0..16 {
            for z in 0..16 {
                for x in 0..16 {
                    if s.get(x, y, z) != 0 {
                        brute += 1;
                    }
                }
            }
        }
        assert_eq!(s.solid_block_count(), brute);
    }

    #[test]
    fn section_network_roundtrip() {
        let mut s = ChunkSection::empty(15);
        s.set(5, 4, 5, 1).unwrap();
        s.set(0, 0, 0, 900).unwrap();
        let mut out = BytesMut::new();
        s.write_network(&mut out);
        let mut r = Reader::new(&out);
        let decoded = ChunkSection::read_network(&mut r, 15).unwrap();
        assert_eq!(decoded, s);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn anvil_ingest_single() {
        let s = ChunkSection::from_local_palette(vec![7], None, 15).unwrap();
        assert_eq!(s.get(3, 3, 3), 7);
        assert_eq!(s.solid_block_count(), 4096);
    }

    #[test]
    fn anvil_ingest_indirect() {
        let mut data = BitArray::new(4, SECTION_VOLUME).unwrap();
        data.set(0, 1);
        data.set(100, 1);
        let s = ChunkSection::from_local_palette(vec![0, 33], Some(data), 15).unwrap();
        assert_eq!(s.get(0, 0, 0), 33);
        assert_eq!(s.solid_block_count(), 2);
    }

    #[test]
    fn biome_index_function() {
        assert_eq!(biome_index(0, 0, 0), 0);
        assert_eq!(biome_index(3, 0, 0), 3);
        assert_eq!(biome_index(0, 0, 3), 12);
        assert_eq!(biome_index(0, 3, 0), 48);
    }

    #[test]
    fn biome_section_roundtrip() {
        let mut b = BiomeSection::filled(1, 6);
        b.set(0, 0, 0, 4).unwrap();
        b.set(3, 3, 3, 2).unwrap();
        let mut out = BytesMut::new();
        b.write_network(&mut out);
        let mut r = Reader::new(&out);
        let decoded = BiomeSection::read_network(&mut r, 6).unwrap();
        assert_eq!(decoded, b);
    }
}
