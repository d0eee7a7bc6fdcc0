//! Minecraft 世界批量图层清除工具
//!
//! 先备份世界目录，再从每个区块的所有子区块中删除指定索引的图层

pub mod anvil;
pub mod backup;
pub mod config;
pub mod error;
pub mod host;
pub mod mca;
pub mod memory;
pub mod pipeline;
pub mod selection;
pub mod transform;
pub mod world;

pub use anvil::{AnvilChunk, AnvilSubChunk, AnvilWorld};
pub use backup::{backup_name, backup_world, copy_tree, BackupRecord};
pub use config::{Config, ConfigError, ConversionConfig, EditMode};
pub use error::{Error, Result};
pub use host::{LayerEditor, WorldLoadListener, WorldManager};
pub use mca::{read_region, write_region, RawChunk};
pub use pipeline::{convert_world, ConversionReport, Milestone};
pub use selection::{WorldMode, WorldSelectionPolicy};
pub use transform::{apply, apply_clear_layer};
pub use world::{Chunk, ChunkPos, SubChunk, World};
