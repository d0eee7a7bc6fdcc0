//! 宿主：世界目录管理与编辑器生命周期

use crate::anvil::AnvilWorld;
use crate::backup;
use crate::config::{self, Config, ConfigError, ConversionConfig};
use crate::error::{Error, Result};
use crate::pipeline::{self, ConversionReport};
use crate::selection::WorldMode;
use crate::world::World;
use log::{error, info};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// 首次启用后写入数据目录的标记文件
pub const IDLE_MARKER: &str = ".idle";

/// 世界加载事件的监听者
pub trait WorldLoadListener<W: World> {
    fn on_world_load(&mut self, world: &mut W) -> Result<()>;
}

/// 服务器的 worlds 目录；每个世界只会被加载一次
pub struct WorldManager {
    worlds_dir: PathBuf,
    layers: Vec<String>,
    loaded: HashSet<String>,
}

impl WorldManager {
    pub fn new(worlds_dir: impl Into<PathBuf>, layers: Vec<String>) -> Self {
        Self {
            worlds_dir: worlds_dir.into(),
            layers,
            loaded: HashSet::new(),
        }
    }

    /// 磁盘上的世界目录名，已排序
    pub fn world_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.worlds_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded.contains(name)
    }

    /// 加载世界并触发加载事件；已加载的世界返回 false
    pub fn load_world<L>(&mut self, name: &str, listener: &mut L) -> Result<bool>
    where
        L: WorldLoadListener<AnvilWorld>,
    {
        if self.is_loaded(name) {
            return Ok(false);
        }
        let mut world = AnvilWorld::open(&self.worlds_dir.join(name), &self.layers)?;
        self.loaded.insert(name.to_string());
        listener.on_world_load(&mut world)?;
        world.flush()?;
        Ok(true)
    }
}

/// 批量图层编辑器
#[derive(Debug)]
pub struct LayerEditor {
    config: ConversionConfig,
    backups_dir: PathBuf,
    reports: Vec<ConversionReport>,
}

impl LayerEditor {
    pub fn new(config: ConversionConfig, backups_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            backups_dir: backups_dir.into(),
            reports: Vec::new(),
        }
    }

    /// 启用编辑器。
    ///
    /// confirm 未开启时：首次使用返回错误，之后保持空闲（返回 None）。
    /// 开启时写入空闲标记、校验配置、创建备份目录，并将配置文件中的 confirm 改回 false。
    pub fn enable(
        data_dir: &Path,
        config: &Config,
        config_path: Option<&Path>,
    ) -> Result<Option<Self>> {
        let marker = data_dir.join(IDLE_MARKER);
        if !config.confirm {
            if !marker.exists() {
                error!("{}", ConfigError::NotConfirmed);
                return Err(ConfigError::NotConfirmed.into());
            }
            info!("Nothing to do, set confirm to true to run another conversion");
            return Ok(None);
        }

        fs::create_dir_all(data_dir)?;
        fs::write(&marker, b"")?;

        let conversion = ConversionConfig::from_config(config)?;

        let backups_dir = data_dir.join("backups");
        backup::create_dir(&backups_dir)?;

        if let Some(path) = config_path {
            config::disarm_file(path)?;
        }

        Ok(Some(Self::new(conversion, backups_dir)))
    }

    /// 已完成的转换
    pub fn reports(&self) -> &[ConversionReport] {
        &self.reports
    }

    /// 处理世界加载事件
    pub fn handle_world_load<W: World>(&mut self, world: &mut W) -> Result<()> {
        if !self.config.worlds.is_eligible(world.folder_name()) {
            return Ok(());
        }
        let report = pipeline::convert_world(world, &self.config, &self.backups_dir)?;
        self.reports.push(report);
        Ok(())
    }

    /// 启动时按选择策略主动加载世界。
    ///
    /// 单个世界失败只记录错误，其余世界继续处理；
    /// Auto 模式下不扫描 worlds 目录。
    pub fn preload(&mut self, manager: &mut WorldManager) -> Result<()> {
        if self.config.worlds.mode() == &WorldMode::Auto {
            return Ok(());
        }
        let on_disk = manager.world_names()?;
        let mut failed = Vec::new();
        for name in self.config.worlds.worlds_to_preload(&on_disk) {
            if let Err(e) = manager.load_world(&name, self) {
                error!("Conversion of world {} failed: {}", name, e);
                failed.push(name);
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(Error::WorldsFailed(failed))
        }
    }
}

impl<W: World> WorldLoadListener<W> for LayerEditor {
    fn on_world_load(&mut self, world: &mut W) -> Result<()> {
        self.handle_world_load(world)
    }
}
