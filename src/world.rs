//! 世界、区块与子区块的抽象

use crate::error::Result;
use std::fmt;
use std::path::Path;

/// 区块坐标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

impl ChunkPos {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// 所在 region 坐标
    pub fn region(self) -> (i32, i32) {
        (self.x >> 5, self.z >> 5)
    }
}

impl fmt::Display for ChunkPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.z)
    }
}

/// 子区块：按索引存放的图层
pub trait SubChunk {
    fn has_layer(&self, index: usize) -> bool;

    /// 删除指定图层，图层不存在时什么也不做
    fn remove_layer(&mut self, index: usize);
}

/// 区块
pub trait Chunk {
    type SubChunk: SubChunk;

    fn sub_chunks(&self) -> &[Self::SubChunk];

    fn sub_chunks_mut(&mut self) -> &mut [Self::SubChunk];

    /// 标记地形已修改，保存时才会写回
    fn set_terrain_dirty(&mut self);

    fn is_terrain_dirty(&self) -> bool;
}

/// 单次遍历的区块迭代器
pub type ChunkIter<C> = Box<dyn Iterator<Item = Result<(ChunkPos, C)>>>;

/// 由宿主提供的世界存储
pub trait World {
    type Chunk: Chunk;

    /// 世界文件夹名
    fn folder_name(&self) -> &str;

    /// 世界在磁盘上的目录
    fn storage_path(&self) -> &Path;

    /// 区块总数，可能只是估计值
    fn chunk_count(&self) -> Result<u64>;

    /// 按存储顺序遍历所有区块
    fn chunks(&self) -> Result<ChunkIter<Self::Chunk>>;

    fn save_chunk(&mut self, pos: ChunkPos, chunk: &Self::Chunk) -> Result<()>;

    /// 写出尚未落盘的数据
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
