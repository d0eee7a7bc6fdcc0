//! 基于 Anvil region 文件的世界存储

use crate::error::{Error, Result};
use crate::mca::{self, RawChunk};
use crate::world::{Chunk, ChunkIter, ChunkPos, SubChunk, World};
use fastnbt::Value;
use log::{debug, error, warn};
use rayon::prelude::*;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// section：按图层表拆出的图层字段与其余字段
#[derive(Debug, Clone)]
pub struct AnvilSubChunk {
    layers: Vec<Option<Value>>,
    rest: HashMap<String, Value>,
}

impl AnvilSubChunk {
    fn from_compound(mut map: HashMap<String, Value>, table: &[String]) -> Self {
        let layers = table.iter().map(|key| map.remove(key)).collect();
        Self { layers, rest: map }
    }

    fn to_value(&self, table: &[String]) -> Value {
        let mut map = self.rest.clone();
        for (key, layer) in table.iter().zip(&self.layers) {
            if let Some(layer) = layer {
                map.insert(key.clone(), layer.clone());
            }
        }
        Value::Compound(map)
    }

    /// section 中除图层外的字段
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.rest.get(key)
    }
}

impl SubChunk for AnvilSubChunk {
    fn has_layer(&self, index: usize) -> bool {
        matches!(self.layers.get(index), Some(Some(_)))
    }

    fn remove_layer(&mut self, index: usize) {
        if let Some(slot) = self.layers.get_mut(index) {
            *slot = None;
        }
    }
}

/// sections 在区块 NBT 中的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SectionSlot {
    None,
    /// 1.18+：根节点的 sections
    Modern,
    /// 旧版：Level.Sections
    Legacy,
}

#[derive(Debug, Clone)]
pub struct AnvilChunk {
    root: HashMap<String, Value>,
    sections: Vec<AnvilSubChunk>,
    slot: SectionSlot,
    table: Arc<[String]>,
    dirty: bool,
}

impl AnvilChunk {
    /// 解析 region 中的原始区块
    pub fn decode(raw: &RawChunk, table: Arc<[String]>) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidChunk {
            x: raw.x,
            z: raw.z,
            reason: reason.to_string(),
        };

        let nbt = raw.decompress()?;
        let Value::Compound(mut root) = fastnbt::from_bytes::<Value>(&nbt)? else {
            return Err(invalid("root is not a compound"));
        };

        let (slot, list) = if let Some(list) = root.remove("sections") {
            (SectionSlot::Modern, list)
        } else if let Some(Value::Compound(level)) = root.get_mut("Level") {
            match level.remove("Sections") {
                Some(list) => (SectionSlot::Legacy, list),
                None => (SectionSlot::None, Value::List(Vec::new())),
            }
        } else {
            (SectionSlot::None, Value::List(Vec::new()))
        };

        let Value::List(items) = list else {
            return Err(invalid("sections is not a list"));
        };
        let sections = items
            .into_iter()
            .map(|item| match item {
                Value::Compound(map) => Ok(AnvilSubChunk::from_compound(map, &table)),
                _ => Err(invalid("section is not a compound")),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            root,
            sections,
            slot,
            table,
            dirty: false,
        })
    }

    /// 编码为未压缩的 NBT
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut root = self.root.clone();
        let list = Value::List(self.sections.iter().map(|s| s.to_value(&self.table)).collect());
        match self.slot {
            SectionSlot::None => {}
            SectionSlot::Modern => {
                root.insert("sections".to_string(), list);
            }
            SectionSlot::Legacy => {
                if let Some(Value::Compound(level)) = root.get_mut("Level") {
                    level.insert("Sections".to_string(), list);
                }
            }
        }
        Ok(fastnbt::to_bytes(&Value::Compound(root))?)
    }
}

impl Chunk for AnvilChunk {
    type SubChunk = AnvilSubChunk;

    fn sub_chunks(&self) -> &[AnvilSubChunk] {
        &self.sections
    }

    fn sub_chunks_mut(&mut self) -> &mut [AnvilSubChunk] {
        &mut self.sections
    }

    fn set_terrain_dirty(&mut self) {
        self.dirty = true;
    }

    fn is_terrain_dirty(&self) -> bool {
        self.dirty
    }
}

/// 尚未写回的 region
struct PendingRegion {
    coords: (i32, i32),
    path: PathBuf,
    chunks: Vec<RawChunk>,
}

/// Anvil 世界：`<world>/region/r.<rx>.<rz>.mca`
pub struct AnvilWorld {
    name: String,
    path: PathBuf,
    table: Arc<[String]>,
    pending: Option<PendingRegion>,
}

impl AnvilWorld {
    /// 打开世界目录，`layers` 为 section 的图层表
    pub fn open(path: &Path, layers: &[String]) -> Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if !path.is_dir() {
            return Err(Error::WorldNotFound(name));
        }
        Ok(Self {
            name,
            path: path.to_path_buf(),
            table: Arc::from(layers.to_vec()),
            pending: None,
        })
    }

    fn region_dir(&self) -> PathBuf {
        self.path.join("region")
    }

    fn region_path(&self, (rx, rz): (i32, i32)) -> PathBuf {
        self.region_dir().join(format!("r.{}.{}.mca", rx, rz))
    }

    /// 所有 region 文件，按 (rx, rz) 排序
    fn region_files(&self) -> Result<Vec<((i32, i32), PathBuf)>> {
        let region_dir = self.region_dir();
        if !region_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in fs::read_dir(&region_dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let coords = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(mca::parse_mca_filename);
            if let Some(coords) = coords {
                files.push((coords, path));
            }
        }
        files.sort_by_key(|(coords, _)| *coords);
        Ok(files)
    }
}

impl World for AnvilWorld {
    type Chunk = AnvilChunk;

    fn folder_name(&self) -> &str {
        &self.name
    }

    fn storage_path(&self) -> &Path {
        &self.path
    }

    /// 统计 region 文件头中已占用的位置，损坏的区块也计入
    fn chunk_count(&self) -> Result<u64> {
        let counts = self
            .region_files()?
            .par_iter()
            .map(|(_, path)| mca::count_chunks(path))
            .collect::<Result<Vec<u64>>>()?;
        Ok(counts.into_iter().sum())
    }

    fn chunks(&self) -> Result<ChunkIter<AnvilChunk>> {
        Ok(Box::new(AnvilChunks {
            regions: self.region_files()?.into(),
            buffer: VecDeque::new(),
            table: self.table.clone(),
        }))
    }

    /// 只写回已标记的区块；数据先进入内存中的 region，切换 region 或 flush 时落盘
    fn save_chunk(&mut self, pos: ChunkPos, chunk: &AnvilChunk) -> Result<()> {
        if !chunk.is_terrain_dirty() {
            return Ok(());
        }

        let coords = pos.region();
        if self.pending.as_ref().map(|p| p.coords) != Some(coords) {
            self.flush()?;
            let path = self.region_path(coords);
            let chunks = if path.exists() {
                mca::read_region(&path)?
            } else {
                Vec::new()
            };
            self.pending = Some(PendingRegion {
                coords,
                path,
                chunks,
            });
        }

        let timestamp = chrono::Utc::now().timestamp().max(0) as u32;
        let raw = RawChunk::from_nbt(pos.x, pos.z, timestamp, &chunk.encode()?)?;
        if let Some(pending) = self.pending.as_mut() {
            match pending
                .chunks
                .iter_mut()
                .find(|c| c.x == raw.x && c.z == raw.z)
            {
                Some(slot) => *slot = raw,
                None => pending.chunks.push(raw),
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(pending) = self.pending.take() {
            debug!(
                "Writing {} chunks to {}",
                pending.chunks.len(),
                pending.path.display()
            );
            mca::write_region(&pending.path, &pending.chunks)?;
        }
        Ok(())
    }
}

impl Drop for AnvilWorld {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            error!("Failed to write pending region of world {}: {}", self.name, e);
        }
    }
}

/// 逐个 region 读取的区块迭代器；无法解析的区块被跳过
struct AnvilChunks {
    regions: VecDeque<((i32, i32), PathBuf)>,
    buffer: VecDeque<(ChunkPos, AnvilChunk)>,
    table: Arc<[String]>,
}

impl Iterator for AnvilChunks {
    type Item = Result<(ChunkPos, AnvilChunk)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(Ok(item));
            }
            let ((rx, rz), path) = self.regions.pop_front()?;
            let raws = match mca::read_region(&path) {
                Ok(raws) => raws,
                Err(e) => return Some(Err(e)),
            };
            for raw in raws {
                let pos = ChunkPos::new(
                    rx * mca::REGION_SIDE + raw.x,
                    rz * mca::REGION_SIDE + raw.z,
                );
                match AnvilChunk::decode(&raw, self.table.clone()) {
                    Ok(chunk) => self.buffer.push_back((pos, chunk)),
                    Err(e) => warn!(
                        "Skipping corrupted chunk {} in {}: {}",
                        pos,
                        path.display(),
                        e
                    ),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnvilConfig;
    use tempfile::TempDir;

    fn table() -> Vec<String> {
        AnvilConfig::default().layers
    }

    fn compound(entries: Vec<(&str, Value)>) -> Value {
        Value::Compound(entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    fn palette(entry: &str) -> Value {
        compound(vec![(
            "palette",
            Value::List(vec![Value::String(entry.to_string())]),
        )])
    }

    fn section(y: i8) -> Value {
        compound(vec![
            ("Y", Value::Byte(y)),
            ("block_states", palette("minecraft:stone")),
            ("biomes", palette("minecraft:plains")),
            ("SkyLight", Value::Int(15)),
        ])
    }

    fn modern_chunk(x: i32, z: i32) -> RawChunk {
        let value = compound(vec![
            ("xPos", Value::Int(x)),
            ("zPos", Value::Int(z)),
            ("Status", Value::String("minecraft:full".into())),
            ("sections", Value::List(vec![section(-1), section(0), section(1)])),
        ]);
        RawChunk::from_nbt(x, z, 1, &fastnbt::to_bytes(&value).unwrap()).unwrap()
    }

    fn legacy_chunk(x: i32, z: i32) -> RawChunk {
        let value = compound(vec![(
            "Level",
            compound(vec![
                ("xPos", Value::Int(x)),
                ("Sections", Value::List(vec![section(0)])),
            ]),
        )]);
        RawChunk::from_nbt(x, z, 1, &fastnbt::to_bytes(&value).unwrap()).unwrap()
    }

    fn corrupted_chunk(x: i32, z: i32) -> RawChunk {
        RawChunk {
            x,
            z,
            timestamp: 7,
            compression: mca::COMPRESSION_NONE,
            payload: b"not nbt".to_vec(),
        }
    }

    fn sample_world(tmp: &TempDir) -> PathBuf {
        let world = tmp.path().join("lobby");
        let region = world.join("region");
        fs::create_dir_all(&region).unwrap();
        mca::write_region(
            &region.join("r.0.0.mca"),
            &[modern_chunk(0, 0), modern_chunk(1, 0), corrupted_chunk(2, 0)],
        )
        .unwrap();
        mca::write_region(&region.join("r.-1.0.mca"), &[legacy_chunk(31, 5)]).unwrap();
        fs::write(region.join("notes.txt"), b"ignored").unwrap();
        world
    }

    #[test]
    fn counts_header_entries_including_corrupted() {
        let tmp = TempDir::new().unwrap();
        let world = AnvilWorld::open(&sample_world(&tmp), &table()).unwrap();
        assert_eq!(world.folder_name(), "lobby");
        assert_eq!(world.chunk_count().unwrap(), 4);
    }

    #[test]
    fn iterates_regions_in_order_and_skips_corrupted() {
        let tmp = TempDir::new().unwrap();
        let world = AnvilWorld::open(&sample_world(&tmp), &table()).unwrap();
        let positions: Vec<ChunkPos> = world
            .chunks()
            .unwrap()
            .map(|item| item.unwrap().0)
            .collect();
        assert_eq!(
            positions,
            vec![ChunkPos::new(-1, 5), ChunkPos::new(0, 0), ChunkPos::new(1, 0)]
        );
    }

    #[test]
    fn maps_layers_through_table() {
        let tmp = TempDir::new().unwrap();
        let world = AnvilWorld::open(&sample_world(&tmp), &table()).unwrap();
        let (_, chunk) = world.chunks().unwrap().nth(1).unwrap().unwrap();
        let section = &chunk.sub_chunks()[0];
        assert_eq!(chunk.sub_chunks().len(), 3);
        assert!(section.has_layer(0));
        assert!(section.has_layer(1));
        assert!(!section.has_layer(2));
        assert!(section.has_layer(3));
        assert!(!section.has_layer(99));
        assert!(matches!(section.field("Y"), Some(Value::Byte(-1))));
    }

    #[test]
    fn saves_only_dirty_chunks() {
        let tmp = TempDir::new().unwrap();
        let path = sample_world(&tmp);
        let region = path.join("region/r.0.0.mca");
        let before = fs::read(&region).unwrap();

        let mut world = AnvilWorld::open(&path, &table()).unwrap();
        let (pos, mut chunk) = world.chunks().unwrap().nth(1).unwrap().unwrap();
        chunk.sub_chunks_mut()[0].remove_layer(1);
        world.save_chunk(pos, &chunk).unwrap();
        world.flush().unwrap();

        assert_eq!(fs::read(&region).unwrap(), before);
    }

    #[test]
    fn rewrites_sections_and_keeps_other_chunks() {
        let tmp = TempDir::new().unwrap();
        let path = sample_world(&tmp);

        let mut world = AnvilWorld::open(&path, &table()).unwrap();
        let items: Vec<_> = world.chunks().unwrap().map(|i| i.unwrap()).collect();
        for (pos, mut chunk) in items {
            chunk.set_terrain_dirty();
            for section in chunk.sub_chunks_mut() {
                section.remove_layer(1);
            }
            world.save_chunk(pos, &chunk).unwrap();
        }
        world.flush().unwrap();

        let reopened = AnvilWorld::open(&path, &table()).unwrap();
        assert_eq!(reopened.chunk_count().unwrap(), 4);
        let chunks: Vec<_> = reopened.chunks().unwrap().map(|i| i.unwrap()).collect();
        assert_eq!(chunks.len(), 3);
        for (_, chunk) in &chunks {
            assert!(!chunk.sub_chunks().is_empty());
            for section in chunk.sub_chunks() {
                assert!(!section.has_layer(1));
                assert!(section.has_layer(0));
                assert!(section.has_layer(3));
            }
        }
        assert!(matches!(
            chunks[1].1.root.get("Status"),
            Some(Value::String(s)) if s == "minecraft:full"
        ));
        assert!(matches!(chunks[0].1.root.get("Level"), Some(Value::Compound(_))));

        let raws = mca::read_region(&path.join("region/r.0.0.mca")).unwrap();
        assert!(raws.contains(&corrupted_chunk(2, 0)));
    }

    #[test]
    fn missing_world_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let err = AnvilWorld::open(&tmp.path().join("nether"), &table()).err().unwrap();
        assert!(matches!(err, Error::WorldNotFound(ref name) if name == "nether"));
    }

    #[test]
    fn out_of_range_region_names_are_ignored() {
        let tmp = TempDir::new().unwrap();
        let path = sample_world(&tmp);
        mca::write_region(
            &path.join("region/r.99999999.0.mca"),
            &[modern_chunk(31, 0)],
        )
        .unwrap();
        let world = AnvilWorld::open(&path, &table()).unwrap();
        assert_eq!(world.chunk_count().unwrap(), 4);
        assert_eq!(world.chunks().unwrap().count(), 3);
    }

    #[test]
    fn world_without_regions_is_empty() {
        let tmp = TempDir::new().unwrap();
        let world = AnvilWorld::open(tmp.path(), &table()).unwrap();
        assert_eq!(world.chunk_count().unwrap(), 0);
        assert_eq!(world.chunks().unwrap().count(), 0);
    }
}
