//! Anvil region files: a 32×32 grid of chunk columns in 4 KiB sectors.
//!
//! Layout: sector 0 holds 1024 big-endian `(offset:u24, sector_count:u8)`
//! entries, sector 1 the matching u32 timestamps. Each chunk record is
//! `length:u32_be ‖ compression_tag:u8 ‖ compressed[length-1]`, padded to a
//! whole number of sectors. Compression tag 1 is gzip (read only), 2 zlib.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use tracing::debug;

use mcje_nbt::{read_nbt_big, write_nbt_big, NbtRoot};

use crate::error::WorldError;

pub const SECTOR_SIZE: usize = 4096;
pub const HEADER_SECTORS: u64 = 2;
const REGION_CHUNKS: usize = 1024;

const COMPRESSION_GZIP: u8 = 1;
const COMPRESSION_ZLIB: u8 = 2;

/// One open region file. The handle is exclusively owned; two opens of the
/// same path are independent views and concurrent writers are not supported.
pub struct RegionFile {
    file: File,
    /// Packed `(offset_sectors << 8) | sector_count` per chunk slot.
    offsets: Vec<u32>,
    timestamps: Vec<u32>,
}

#[inline]
fn entry_index(x: i32, z: i32) -> usize {
    ((x & 31) + (z & 31) * 32) as usize
}

impl RegionFile {
    /// Open a region file, creating an empty one (zeroed header) if absent.
    pub fn open(path: &Path) -> Result<Self, WorldError> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        let len = file.metadata()?.len();
        if len == 0 {
            file.write_all(&[0u8; SECTOR_SIZE * 2])?;
            file.flush()?;
        } else if len < (SECTOR_SIZE * 2) as u64 {
            return Err(WorldError::FileFormat(format!(
                "header truncated to {len} bytes"
            )));
        }

        file.seek(SeekFrom::Start(0))?;
        let mut header = [0u8; SECTOR_SIZE * 2];
        file.read_exact(&mut header)?;

        let mut offsets = Vec::with_capacity(REGION_CHUNKS);
        let mut timestamps = Vec::with_capacity(REGION_CHUNKS);
        for i in 0..REGION_CHUNKS {
            let o = i * 4;
            offsets.push(u32::from_be_bytes([
                header[o],
                header[o + 1],
                header[o + 2],
                header[o + 3],
            ]));
            let t = SECTOR_SIZE + i * 4;
            timestamps.push(u32::from_be_bytes([
                header[t],
                header[t + 1],
                header[t + 2],
                header[t + 3],
            ]));
        }

        Ok(Self {
            file,
            offsets,
            timestamps,
        })
    }

    /// Whether the slot for chunk `(x, z)` holds data. Coordinates may be
    /// absolute: they wrap modulo 32.
    pub fn has_chunk(&self, x: i32, z: i32) -> bool {
        self.offsets[entry_index(x, z)] & 0xff != 0
    }

    /// Last-write timestamp (epoch seconds) of the slot.
    pub fn timestamp(&self, x: i32, z: i32) -> u32 {
        self.timestamps[entry_index(x, z)]
    }

    /// Region-local coordinates of every present chunk.
    pub fn chunks(&self) -> Vec<(i32, i32)> {
        (0..REGION_CHUNKS)
            .filter(|&i| self.offsets[i] & 0xff != 0)
            .map(|i| ((i % 32) as i32, (i / 32) as i32))
            .collect()
    }

    /// Read and parse the column at `(x, z)`. `None` if the slot is empty.
    pub fn read_chunk(&mut self, x: i32, z: i32) -> Result<Option<NbtRoot>, WorldError> {
        let entry = self.offsets[entry_index(x, z)];
        let offset_sectors = (entry >> 8) as u64;
        let sector_count = (entry & 0xff) as u64;
        if sector_count == 0 {
            return Ok(None);
        }

        let file_len = self.file.metadata()?.len();
        let start = offset_sectors * SECTOR_SIZE as u64;
        if start + 5 > file_len {
            return Err(WorldError::FileFormat(format!(
                "chunk record at sector {offset_sectors} is past the end of the file"
            )));
        }

        self.file.seek(SeekFrom::Start(start))?;
        let mut prefix = [0u8; 5];
        self.file.read_exact(&mut prefix)?;
        let length = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as u64;
        let tag = prefix[4];
        if length == 0 || start + 4 + length > file_len {
            return Err(WorldError::FileFormat(format!(
                "chunk record claims {length} bytes but the file ends early"
            )));
        }

        let mut compressed = vec![0u8; (length - 1) as usize];
        self.file.read_exact(&mut compressed)?;

        let raw = match tag {
            COMPRESSION_GZIP => {
                let mut out = Vec::new();
                GzDecoder::new(&compressed[..])
                    .read_to_end(&mut out)
                    .map_err(|e| WorldError::FileFormat(format!("gzip: {e}")))?;
                out
            }
            COMPRESSION_ZLIB => {
                let mut out = Vec::new();
                ZlibDecoder::new(&compressed[..])
                    .read_to_end(&mut out)
                    .map_err(|e| WorldError::FileFormat(format!("zlib: {e}")))?;
                out
            }
            other => {
                return Err(WorldError::FileFormat(format!(
                    "unknown compression tag {other}"
                )))
            }
        };

        let root = read_nbt_big(&mut Bytes::from(raw))?;
        Ok(Some(root))
    }

    /// Serialise and store the column at `(x, z)`.
    ///
    /// A record that still fits its old sector run is overwritten in place;
    /// otherwise a fresh run is allocated at the file tail (grow-only, the
    /// old run is abandoned). Both header sectors are rewritten afterwards.
    pub fn write_chunk(&mut self, x: i32, z: i32, root: &NbtRoot) -> Result<(), WorldError> {
        let mut raw = Vec::new();
        write_nbt_big(&mut raw, root);

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&raw)
            .map_err(|e| WorldError::FileFormat(format!("zlib: {e}")))?;
        let compressed = encoder
            .finish()
            .map_err(|e| WorldError::FileFormat(format!("zlib: {e}")))?;

        let record_len = 4 + 1 + compressed.len();
        let sectors_needed = record_len.div_ceil(SECTOR_SIZE) as u64;
        if sectors_needed > 0xff {
            return Err(WorldError::FileFormat(format!(
                "chunk needs {sectors_needed} sectors, limit is 255"
            )));
        }

        let index = entry_index(x, z);
        let entry = self.offsets[index];
        let old_offset = (entry >> 8) as u64;
        let old_count = (entry & 0xff) as u64;

        let offset_sectors = if old_count == sectors_needed && old_count != 0 {
            old_offset
        } else {
            let file_len = self.file.metadata()?.len();
            let tail = file_len.div_ceil(SECTOR_SIZE as u64);
            tail.max(HEADER_SECTORS)
        };
        debug!(
            x,
            z, offset_sectors, sectors_needed, "writing region chunk record"
        );

        let mut record = Vec::with_capacity((sectors_needed as usize) * SECTOR_SIZE);
        record.extend_from_slice(&((compressed.len() + 1) as u32).to_be_bytes());
        record.push(COMPRESSION_ZLIB);
        record.extend_from_slice(&compressed);
        record.resize((sectors_needed as usize) * SECTOR_SIZE, 0);

        self.file
            .seek(SeekFrom::Start(offset_sectors * SECTOR_SIZE as u64))?;
        self.file.write_all(&record)?;

        self.offsets[index] = ((offset_sectors as u32) << 8) | sectors_needed as u32;
        self.timestamps[index] = epoch_seconds();
        self.flush_header()?;
        Ok(())
    }

    fn flush_header(&mut self) -> Result<(), WorldError> {
        let mut header = Vec::with_capacity(SECTOR_SIZE * 2);
        for &entry in &self.offsets {
            header.extend_from_slice(&entry.to_be_bytes());
        }
        for &stamp in &self.timestamps {
            header.extend_from_slice(&stamp.to_be_bytes());
        }
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&header)?;
        self.file.flush()?;
        Ok(())
    }
}

fn epoch_seconds() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use mcje_nbt::{NbtCompound, NbtTag};

    fn temp_region() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("mcje_region_{}", rand::random::<u64>()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join("r.0.0.mca")
    }

    fn chunk_nbt(marker: i32) -> NbtRoot {
        let mut c = NbtCompound::new();
        c.insert("xPos".into(), NbtTag::Int(marker));
        c.insert("zPos".into(), NbtTag::Int(-marker));
        c.insert("Status".into(), NbtTag::String("full".into()));
        c.insert(
            "payload".into(),
            NbtTag::ByteArray((0..marker as usize % 64).map(|i| i as i8).collect()),
        );
        NbtRoot::new("", c)
    }

    #[test]
    fn open_creates_empty_region() {
        let path = temp_region();
        let region = RegionFile::open(&path).unwrap();
        assert!(!region.has_chunk(0, 0));
        assert!(region.chunks().is_empty());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 8192);
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn write_read_roundtrip() {
        let path = temp_region();
        let mut region = RegionFile::open(&path).unwrap();

        let nbt = chunk_nbt(7);
        region.write_chunk(3, 9, &nbt).unwrap();
        assert!(region.has_chunk(3, 9));
        assert!(region.timestamp(3, 9) > 0);

        let loaded = region.read_chunk(3, 9).unwrap().unwrap();
        assert_eq!(loaded, nbt);
        assert_eq!(region.read_chunk(0, 0).unwrap(), None);
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn survives_reopen() {
        let path = temp_region();
        {
            let mut region = RegionFile::open(&path).unwrap();
            region.write_chunk(31, 31, &chunk_nbt(1)).unwrap();
        }
        let mut region = RegionFile::open(&path).unwrap();
        assert!(region.has_chunk(31, 31));
        assert_eq!(region.read_chunk(31, 31).unwrap().unwrap(), chunk_nbt(1));
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn absolute_coordinates_wrap() {
        let path = temp_region();
        let mut region = RegionFile::open(&path).unwrap();
        region.write_chunk(32 + 5, 64 + 7, &chunk_nbt(2)).unwrap();
        assert!(region.has_chunk(5, 7));
        assert_eq!(region.chunks(), vec![(5, 7)]);
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn same_size_overwrites_in_place() {
        let path = temp_region();
        let mut region = RegionFile::open(&path).unwrap();
        region.write_chunk(0, 0, &chunk_nbt(1)).unwrap();
        let len_before = std::fs::metadata(&path).unwrap().len();
        region.write_chunk(0, 0, &chunk_nbt(2)).unwrap();
        let len_after = std::fs::metadata(&path).unwrap().len();
        assert_eq!(len_before, len_after, "one-sector rewrite must not grow");
        assert_eq!(region.read_chunk(0, 0).unwrap().unwrap(), chunk_nbt(2));
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn growing_chunk_moves_to_tail() {
        let path = temp_region();
        let mut region = RegionFile::open(&path).unwrap();
        region.write_chunk(0, 0, &chunk_nbt(1)).unwrap();
        region.write_chunk(1, 0, &chunk_nbt(1)).unwrap();

        // Incompressible payload forcing several sectors.
        let mut c = NbtCompound::new();
        let noise: Vec<i8> = (0..20000u32)
            .map(|i| (i.wrapping_mul(2654435761) >> 13) as i8)
            .collect();
        c.insert("noise".into(), NbtTag::ByteArray(noise));
        let big = NbtRoot::new("", c);
        region.write_chunk(0, 0, &big).unwrap();

        assert_eq!(region.read_chunk(0, 0).unwrap().unwrap(), big);
        // The neighbour is untouched.
        assert_eq!(region.read_chunk(1, 0).unwrap().unwrap(), chunk_nbt(1));
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn offsets_stay_sector_aligned() {
        let path = temp_region();
        let mut region = RegionFile::open(&path).unwrap();
        for i in 0..8 {
            region.write_chunk(i, 0, &chunk_nbt(i + 1)).unwrap();
        }
        let len = std::fs::metadata(&path).unwrap().len();
        assert_eq!(len % SECTOR_SIZE as u64, 0);
        for i in 0..8 {
            assert!(region.has_chunk(i, 0));
            assert!(region.read_chunk(i, 0).unwrap().is_some());
        }
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn corrupt_tag_errors_but_region_survives() {
        let path = temp_region();
        let mut region = RegionFile::open(&path).unwrap();
        region.write_chunk(0, 0, &chunk_nbt(1)).unwrap();
        region.write_chunk(1, 0, &chunk_nbt(2)).unwrap();

        // Stamp an unknown compression tag onto the first record.
        let entry = region.offsets[entry_index(0, 0)];
        let start = ((entry >> 8) as u64) * SECTOR_SIZE as u64;
        region.file.seek(SeekFrom::Start(start + 4)).unwrap();
        region.file.write_all(&[9]).unwrap();

        assert!(matches!(
            region.read_chunk(0, 0),
            Err(WorldError::FileFormat(_))
        ));
        // Other chunks remain readable.
        assert_eq!(region.read_chunk(1, 0).unwrap().unwrap(), chunk_nbt(2));
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn gzip_records_are_readable() {
        use flate2::write::GzEncoder;

        let path = temp_region();
        let mut region = RegionFile::open(&path).unwrap();

        // Hand-craft a gzip record the way old worlds carried them.
        let nbt = chunk_nbt(5);
        let mut raw = Vec::new();
        write_nbt_big(&mut raw, &nbt);
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&raw).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut record = Vec::new();
        record.extend_from_slice(&((compressed.len() + 1) as u32).to_be_bytes());
        record.push(COMPRESSION_GZIP);
        record.extend_from_slice(&compressed);
        record.resize(record.len().div_ceil(SECTOR_SIZE) * SECTOR_SIZE, 0);
        let sectors = (record.len() / SECTOR_SIZE) as u32;

        region.file.seek(SeekFrom::Start(2 * SECTOR_SIZE as u64)).unwrap();
        region.file.write_all(&record).unwrap();
        region.offsets[entry_index(4, 4)] = (2 << 8) | sectors;
        region.flush_header().unwrap();

        assert_eq!(region.read_chunk(4, 4).unwrap().unwrap(), nbt);
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }
}
