//! 内存中的世界实现，用于嵌入与测试

use crate::error::Result;
use crate::world::{Chunk, ChunkIter, ChunkPos, SubChunk, World};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemorySubChunk {
    layers: BTreeMap<usize, Vec<u16>>,
}

impl MemorySubChunk {
    /// 每个图层填充为其索引值
    pub fn with_layers(indices: &[usize]) -> Self {
        Self {
            layers: indices.iter().map(|&i| (i, vec![i as u16; 16])).collect(),
        }
    }

    pub fn layer(&self, index: usize) -> Option<&[u16]> {
        self.layers.get(&index).map(Vec::as_slice)
    }
}

impl SubChunk for MemorySubChunk {
    fn has_layer(&self, index: usize) -> bool {
        self.layers.contains_key(&index)
    }

    fn remove_layer(&mut self, index: usize) {
        self.layers.remove(&index);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryChunk {
    sub_chunks: Vec<MemorySubChunk>,
    dirty: bool,
}

impl MemoryChunk {
    pub fn new(sub_chunks: Vec<MemorySubChunk>) -> Self {
        Self {
            sub_chunks,
            dirty: false,
        }
    }
}

impl Chunk for MemoryChunk {
    type SubChunk = MemorySubChunk;

    fn sub_chunks(&self) -> &[MemorySubChunk] {
        &self.sub_chunks
    }

    fn sub_chunks_mut(&mut self) -> &mut [MemorySubChunk] {
        &mut self.sub_chunks
    }

    fn set_terrain_dirty(&mut self) {
        self.dirty = true;
    }

    fn is_terrain_dirty(&self) -> bool {
        self.dirty
    }
}

/// 内存世界；storage_path 指向的目录用于备份
#[derive(Debug, Clone)]
pub struct MemoryWorld {
    name: String,
    path: PathBuf,
    chunks: BTreeMap<ChunkPos, MemoryChunk>,
    estimate: Option<u64>,
    saved: Vec<ChunkPos>,
}

impl MemoryWorld {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            chunks: BTreeMap::new(),
            estimate: None,
            saved: Vec::new(),
        }
    }

    pub fn insert(&mut self, pos: ChunkPos, chunk: MemoryChunk) {
        self.chunks.insert(pos, chunk);
    }

    /// 覆盖 chunk_count 返回的估计值
    pub fn set_estimate(&mut self, estimate: u64) {
        self.estimate = Some(estimate);
    }

    pub fn chunk(&self, pos: ChunkPos) -> Option<&MemoryChunk> {
        self.chunks.get(&pos)
    }

    /// 已保存的坐标，按保存顺序
    pub fn saved(&self) -> &[ChunkPos] {
        &self.saved
    }
}

impl World for MemoryWorld {
    type Chunk = MemoryChunk;

    fn folder_name(&self) -> &str {
        &self.name
    }

    fn storage_path(&self) -> &Path {
        &self.path
    }

    fn chunk_count(&self) -> Result<u64> {
        Ok(self.estimate.unwrap_or(self.chunks.len() as u64))
    }

    fn chunks(&self) -> Result<ChunkIter<MemoryChunk>> {
        let snapshot: Vec<_> = self
            .chunks
            .iter()
            .map(|(pos, chunk)| {
                let mut chunk = chunk.clone();
                chunk.dirty = false;
                (*pos, chunk)
            })
            .collect();
        Ok(Box::new(snapshot.into_iter().map(Ok)))
    }

    fn save_chunk(&mut self, pos: ChunkPos, chunk: &MemoryChunk) -> Result<()> {
        if !chunk.is_terrain_dirty() {
            return Ok(());
        }
        let mut stored = chunk.clone();
        stored.dirty = false;
        self.chunks.insert(pos, stored);
        self.saved.push(pos);
        Ok(())
    }
}
