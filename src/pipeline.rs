//! 转换流程：备份 → 遍历 → 编辑 → 保存

use crate::backup::{self, BackupRecord};
use crate::config::ConversionConfig;
use crate::error::Result;
use crate::transform;
use crate::world::{Chunk, World};
use chrono::Local;
use log::info;
use std::path::Path;
use std::time::{Duration, Instant};

/// 每处理多少个区块输出一次进度
pub const MILESTONE_INTERVAL: u64 = 1000;

/// 进度节点
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Milestone {
    pub done: u64,
    /// 距上一节点的速度（区块/秒），耗时为零时为 None
    pub rate: Option<u64>,
}

/// 一个世界的转换结果
#[derive(Debug, Clone)]
pub struct ConversionReport {
    pub backup: BackupRecord,
    /// 实际处理的区块数
    pub done: u64,
    /// 开始前估计的区块数
    pub estimated: u64,
    pub elapsed: Duration,
    pub milestones: Vec<Milestone>,
}

/// 进度统计
#[derive(Debug)]
pub struct Progress {
    done: u64,
    last: Instant,
    milestones: Vec<Milestone>,
}

impl Progress {
    pub fn new(start: Instant) -> Self {
        Self {
            done: 0,
            last: start,
            milestones: Vec::new(),
        }
    }

    /// 记录一个已处理的区块，到达节点时返回该节点
    pub fn record(&mut self, now: Instant) -> Option<Milestone> {
        self.done += 1;
        if self.done % MILESTONE_INTERVAL != 0 {
            return None;
        }
        let milestone = Milestone {
            done: self.done,
            rate: rate(MILESTONE_INTERVAL, now.saturating_duration_since(self.last)),
        };
        self.last = now;
        self.milestones.push(milestone);
        Some(milestone)
    }

    pub fn done(&self) -> u64 {
        self.done
    }

    pub fn milestones(&self) -> &[Milestone] {
        &self.milestones
    }
}

/// floor(count / 秒)；耗时为零返回 None
pub fn rate(count: u64, elapsed: Duration) -> Option<u64> {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        Some((count as f64 / secs).floor() as u64)
    } else {
        None
    }
}

fn format_rate(rate: Option<u64>) -> String {
    rate.map_or_else(|| "inf".to_string(), |r| r.to_string())
}

fn round3(secs: f64) -> f64 {
    (secs * 1000.0).round() / 1000.0
}

/// 转换一个世界。
///
/// 先完整备份世界目录，备份失败则不会修改任何区块。
/// 任何区块出错都会立即中止该世界的转换。
pub fn convert_world<W: World>(
    world: &mut W,
    config: &ConversionConfig,
    backups_dir: &Path,
) -> Result<ConversionReport> {
    let name = world.folder_name().to_string();
    let backup_name = backup::backup_name(&name, &Local::now());
    info!("Creating backup of world {} as {}", name, backup_name);
    let backup = backup::backup_world(world.storage_path(), backups_dir, &backup_name)?;

    let start = Instant::now();
    info!("Starting conversion of world {}", name);

    let total = world.chunk_count()?;
    let mut progress = Progress::new(start);
    for item in world.chunks()? {
        let (pos, mut chunk) = item?;
        chunk.set_terrain_dirty();
        transform::apply(&mut chunk, config);
        world.save_chunk(pos, &chunk)?;
        if let Some(milestone) = progress.record(Instant::now()) {
            info!(
                "Converted {} / {} chunks ({} chunks/sec)",
                milestone.done,
                total,
                format_rate(milestone.rate)
            );
        }
    }
    world.flush()?;

    let elapsed = start.elapsed();
    let done = progress.done();
    info!(
        "Converted {} / {} chunks in {} seconds ({} chunks/sec)",
        done,
        done,
        round3(elapsed.as_secs_f64()),
        format_rate(rate(done, elapsed))
    );

    Ok(ConversionReport {
        backup,
        done,
        estimated: total,
        elapsed,
        milestones: progress.milestones,
    })
}
