//! 区块编辑

use crate::config::{ConversionConfig, EditMode};
use crate::world::{Chunk, SubChunk};

/// 按配置的模式编辑区块，不负责标记与保存
pub fn apply<C: Chunk>(chunk: &mut C, config: &ConversionConfig) {
    match config.mode {
        EditMode::ClearLayer => apply_clear_layer(chunk, config.layer),
    }
}

/// 从所有子区块中删除指定图层
pub fn apply_clear_layer<C: Chunk>(chunk: &mut C, layer: usize) {
    for sub_chunk in chunk.sub_chunks_mut() {
        sub_chunk.remove_layer(layer);
    }
}
