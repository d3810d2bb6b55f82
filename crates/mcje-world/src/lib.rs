//! Chunk data engine for Minecraft Java Edition: bit-packed arrays,
//! paletted containers, chunk columns with light layers, and the Anvil
//! region-file backing store.

pub mod anvil;
pub mod bitarray;
pub mod bridge;
pub mod column;
pub mod error;
pub mod palette;
pub mod registry;
pub mod section;

pub use anvil::RegionFile;
pub use bitarray::{BitArray, NibbleArray};
pub use bridge::{column_from_nbt, column_to_nbt, ColumnMeta};
pub use column::{ChunkColumn, ColumnOptions, LightMasks};
pub use error::WorldError;
pub use palette::PalettedContainer;
pub use registry::{BlockState, MemoryRegistry, StateRegistry};
pub use section::{BiomeSection, ChunkSection};
