//! MCA 区域文件解析与写入

use crate::error::{Error, Result};
use log::warn;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

/// 扇区大小（字节）
pub const SECTOR_SIZE: usize = 4096;

/// region 每边的区块数
pub const REGION_SIDE: i32 = 32;

/// 每个 region 的区块数（32 x 32）
pub const REGION_CHUNKS: usize = 1024;

pub const COMPRESSION_GZIP: u8 = 1;
pub const COMPRESSION_ZLIB: u8 = 2;
pub const COMPRESSION_NONE: u8 = 3;
/// 区块数据存放在独立的 .mcc 文件中
pub const COMPRESSION_EXTERNAL: u8 = 0x80;

static MCA_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^r\.(-?\d+)\.(-?\d+)\.mca$").expect("valid region file pattern"));

/// region 中的一个区块，数据保持原始的压缩形式
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChunk {
    /// region 内坐标 0..32
    pub x: i32,
    pub z: i32,
    pub timestamp: u32,
    pub compression: u8,
    pub payload: Vec<u8>,
}

impl RawChunk {
    /// 用 Zlib 压缩 NBT 数据
    pub fn from_nbt(x: i32, z: i32, timestamp: u32, nbt: &[u8]) -> Result<Self> {
        let mut encoder =
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(nbt)?;
        Ok(Self {
            x: x & 31,
            z: z & 31,
            timestamp,
            compression: COMPRESSION_ZLIB,
            payload: encoder.finish()?,
        })
    }

    /// 解压得到 NBT 数据
    pub fn decompress(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        match self.compression {
            COMPRESSION_GZIP => {
                flate2::read::GzDecoder::new(self.payload.as_slice()).read_to_end(&mut out)?;
            }
            COMPRESSION_ZLIB => {
                flate2::read::ZlibDecoder::new(self.payload.as_slice()).read_to_end(&mut out)?;
            }
            COMPRESSION_NONE => out.extend_from_slice(&self.payload),
            other => {
                let reason = if other & COMPRESSION_EXTERNAL != 0 {
                    "stored in an external file".to_string()
                } else {
                    format!("unknown compression {}", other)
                };
                return Err(Error::InvalidChunk {
                    x: self.x,
                    z: self.z,
                    reason,
                });
            }
        }
        Ok(out)
    }

    fn index(&self) -> usize {
        ((self.x & 31) + (self.z & 31) * 32) as usize
    }
}

fn location(header: &[u8], i: usize) -> (usize, usize) {
    let offset =
        u32::from_be_bytes([0, header[i * 4], header[i * 4 + 1], header[i * 4 + 2]]) as usize;
    (offset, header[i * 4 + 3] as usize)
}

/// 读取 MCA 文件中的所有区块（不解压）
pub fn read_region(path: &Path) -> Result<Vec<RawChunk>> {
    let mut file = File::open(path)?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)?;

    if data.len() < SECTOR_SIZE * 2 {
        return Ok(vec![]);
    }

    let mut chunks = Vec::new();

    for i in 0..REGION_CHUNKS {
        let (offset, sector_count) = location(&data, i);
        if offset == 0 || sector_count == 0 {
            continue;
        }

        let x = (i % 32) as i32;
        let z = (i / 32) as i32;

        let chunk_offset = offset * SECTOR_SIZE;
        if chunk_offset + 5 > data.len() {
            warn!("{}: chunk ({}, {}) points past end of file", path.display(), x, z);
            continue;
        }

        let length = u32::from_be_bytes([
            data[chunk_offset],
            data[chunk_offset + 1],
            data[chunk_offset + 2],
            data[chunk_offset + 3],
        ]) as usize;

        if length == 0 || chunk_offset + 4 + length > data.len() {
            warn!("{}: chunk ({}, {}) has invalid length {}", path.display(), x, z, length);
            continue;
        }

        let ts = SECTOR_SIZE + i * 4;
        chunks.push(RawChunk {
            x,
            z,
            timestamp: u32::from_be_bytes([data[ts], data[ts + 1], data[ts + 2], data[ts + 3]]),
            compression: data[chunk_offset + 4],
            payload: data[chunk_offset + 5..chunk_offset + 4 + length].to_vec(),
        });
    }

    Ok(chunks)
}

/// 只读取文件头，统计已占用的区块位置
pub fn count_chunks(path: &Path) -> Result<u64> {
    let mut header = Vec::with_capacity(SECTOR_SIZE);
    File::open(path)?
        .take(SECTOR_SIZE as u64)
        .read_to_end(&mut header)?;
    if header.len() < SECTOR_SIZE {
        return Ok(0);
    }
    Ok((0..REGION_CHUNKS)
        .map(|i| location(&header, i))
        .filter(|&(offset, count)| offset != 0 && count != 0)
        .count() as u64)
}

/// 将区块写入 MCA 文件，数据按原样写出
pub fn write_region(path: &Path, chunks: &[RawChunk]) -> Result<()> {
    let mut locations = vec![0u8; SECTOR_SIZE];
    let mut timestamps = vec![0u8; SECTOR_SIZE];
    let mut chunk_sectors: Vec<Vec<u8>> = Vec::new();
    let mut current_sector = 2u32;

    for chunk in chunks {
        let chunk_length = chunk.payload.len() + 5;
        let sector_count = (chunk_length + SECTOR_SIZE - 1) / SECTOR_SIZE;
        if sector_count > u8::MAX as usize {
            return Err(Error::InvalidChunk {
                x: chunk.x,
                z: chunk.z,
                reason: format!("{} bytes do not fit in a region file", chunk.payload.len()),
            });
        }

        // 构建 chunk 数据
        let mut chunk_data = Vec::with_capacity(sector_count * SECTOR_SIZE);
        chunk_data.extend_from_slice(&((chunk.payload.len() + 1) as u32).to_be_bytes());
        chunk_data.push(chunk.compression);
        chunk_data.extend_from_slice(&chunk.payload);
        chunk_data.resize(sector_count * SECTOR_SIZE, 0);

        // 写入位置表与时间戳
        let idx = chunk.index() * 4;
        let offset_bytes = current_sector.to_be_bytes();
        locations[idx] = offset_bytes[1];
        locations[idx + 1] = offset_bytes[2];
        locations[idx + 2] = offset_bytes[3];
        locations[idx + 3] = sector_count as u8;
        timestamps[idx..idx + 4].copy_from_slice(&chunk.timestamp.to_be_bytes());

        chunk_sectors.push(chunk_data);
        current_sector += sector_count as u32;
    }

    // 写入文件
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    file.write_all(&locations)?;
    file.write_all(&timestamps)?;
    for sector in chunk_sectors {
        file.write_all(&sector)?;
    }
    file.sync_all()?;

    Ok(())
}

/// 解析 MCA 文件名，返回 (rx, rz)
pub fn parse_mca_filename(filename: &str) -> Option<(i32, i32)> {
    let caps = MCA_NAME.captures(filename)?;
    let rx = caps.get(1)?.as_str().parse().ok()?;
    let rz = caps.get(2)?.as_str().parse().ok()?;
    // 区块坐标 r * 32 + 31 必须落在 i32 内
    let fits = |r: i32| r.checked_mul(REGION_SIDE)?.checked_add(REGION_SIDE - 1);
    fits(rx)?;
    fits(rz)?;
    Some((rx, rz))
}
