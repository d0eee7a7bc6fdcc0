//! 配置文件加载与校验

use crate::selection::WorldSelectionPolicy;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// 配置文件名
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// 配置错误，全部在处理任何世界之前触发
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid mode '{0}' specified, expected 'clear'")]
    InvalidMode(String),

    #[error("Layer must be >= 0, got {0}")]
    NegativeLayer(i64),

    #[error("failed to read config {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("failed to write config {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Please read the config on how to use this tool!")]
    NotConfirmed,
}

/// 主配置结构（文件中的原始值）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 必须设为 true 才会执行转换，执行后自动改回 false
    pub confirm: bool,
    /// 编辑模式，目前只支持 "clear"
    pub mode: String,
    /// 要清除的图层索引
    pub layer: i64,
    /// "auto"、"all" 或逗号分隔的世界名
    pub worlds: String,
    /// Anvil 存储配置
    pub anvil: AnvilConfig,
}

/// Anvil 存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnvilConfig {
    /// section 中按索引排列的图层字段
    pub layers: Vec<String>,
}

// ============== 默认值 ==============

impl Default for Config {
    fn default() -> Self {
        Self {
            confirm: false,
            mode: "clear".to_string(),
            layer: 1,
            worlds: "auto".to_string(),
            anvil: AnvilConfig::default(),
        }
    }
}

impl Default for AnvilConfig {
    fn default() -> Self {
        Self {
            layers: vec![
                "block_states".to_string(),
                "biomes".to_string(),
                "BlockLight".to_string(),
                "SkyLight".to_string(),
            ],
        }
    }
}

// ============== 校验后的配置 ==============

/// 编辑模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditMode {
    /// 删除指定索引的图层
    ClearLayer,
}

impl EditMode {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.trim().to_lowercase().as_str() {
            "clear" => Ok(EditMode::ClearLayer),
            _ => Err(ConfigError::InvalidMode(raw.to_string())),
        }
    }
}

/// 校验后的转换配置，构造后不可变
#[derive(Debug, Clone)]
pub struct ConversionConfig {
    pub mode: EditMode,
    pub layer: usize,
    pub worlds: WorldSelectionPolicy,
}

impl ConversionConfig {
    pub fn new(mode: EditMode, layer: usize, worlds: WorldSelectionPolicy) -> Self {
        Self {
            mode,
            layer,
            worlds,
        }
    }

    /// 从原始配置构造，非法的模式或负数图层返回错误
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let mode = EditMode::parse(&config.mode)?;
        let layer =
            usize::try_from(config.layer).map_err(|_| ConfigError::NegativeLayer(config.layer))?;
        let worlds = WorldSelectionPolicy::parse(&config.worlds);
        Ok(Self::new(mode, layer, worlds))
    }
}

// ============== 配置加载 ==============

impl Config {
    /// 从文件加载配置
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 保存配置到文件
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        let content = Self::with_header(&toml::to_string_pretty(self)?);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        fs::write(path, content).map_err(write_err)
    }

    /// 获取用户级配置文件路径
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("bulklayer").join(CONFIG_FILE_NAME))
    }

    /// 按优先级加载配置：
    /// 1. 数据目录的 config.toml
    /// 2. 用户配置目录的 config.toml
    /// 3. 默认配置
    ///
    /// 返回配置及其来源文件
    pub fn load(data_dir: &Path) -> Result<(Self, Option<PathBuf>), ConfigError> {
        let local_config = data_dir.join(CONFIG_FILE_NAME);
        if local_config.exists() {
            let config = Self::load_from_file(&local_config)?;
            info!("Loaded config {}", local_config.display());
            return Ok((config, Some(local_config)));
        }

        if let Some(user_config) = Self::default_config_path() {
            if user_config.exists() {
                let config = Self::load_from_file(&user_config)?;
                info!("Loaded config {}", user_config.display());
                return Ok((config, Some(user_config)));
            }
        }

        warn!("No config file found, using defaults");
        Ok((Self::default(), None))
    }

    fn with_header(body: &str) -> String {
        format!(
            "# Set confirm to true to run the conversion once. It is reset to false afterwards.\n\
             # A backup of every converted world is written to the backups folder first.\n\
             # mode: edit to apply, only \"clear\" is supported\n\
             # layer: index of the sub-chunk layer to remove (>= 0)\n\
             # worlds: \"auto\" (worlds loaded normally), \"all\" or a comma separated list\n\
             {body}"
        )
    }
}

/// 将配置文件中的 confirm 改回 false，保留其他行与注释
pub fn disarm_file(path: &Path) -> Result<(), ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, disarm(&content)).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn disarm(content: &str) -> String {
    let mut lines: Vec<&str> = content.lines().collect();
    if let Some(line) = lines.iter_mut().find(|line| is_confirm_key(line)) {
        *line = "confirm = false";
    }
    let mut out = lines.join("\n");
    if content.ends_with('\n') {
        out.push('\n');
    }
    out
}

fn is_confirm_key(line: &str) -> bool {
    line.trim_start()
        .strip_prefix("confirm")
        .map(|rest| rest.trim_start().starts_with('='))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::WorldMode;

    #[test]
    fn parses_defaults() {
        let config = ConversionConfig::from_config(&Config::default()).unwrap();
        assert_eq!(config.mode, EditMode::ClearLayer);
        assert_eq!(config.layer, 1);
        assert_eq!(config.worlds.mode(), &WorldMode::Auto);
    }

    #[test]
    fn mode_is_trimmed_and_case_insensitive() {
        assert_eq!(EditMode::parse("  Clear ").unwrap(), EditMode::ClearLayer);
    }

    #[test]
    fn rejects_unknown_mode() {
        let config = Config {
            mode: "fill".to_string(),
            ..Config::default()
        };
        let err = ConversionConfig::from_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidMode(ref m) if m == "fill"));
    }

    #[test]
    fn rejects_negative_layer() {
        for layer in [-1, -2, i64::MIN] {
            let config = Config {
                layer,
                ..Config::default()
            };
            let err = ConversionConfig::from_config(&config).unwrap_err();
            assert!(matches!(err, ConfigError::NegativeLayer(l) if l == layer));
        }
    }

    #[test]
    fn accepts_layer_zero() {
        let config = Config {
            layer: 0,
            ..Config::default()
        };
        assert_eq!(ConversionConfig::from_config(&config).unwrap().layer, 0);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config: Config = toml::from_str("confirm = true\nworlds = \"lobby, arena\"\n").unwrap();
        assert!(config.confirm);
        assert_eq!(config.mode, "clear");
        assert_eq!(config.layer, 1);
        assert_eq!(config.anvil.layers.len(), 4);
    }

    #[test]
    fn saved_defaults_load_back() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("nested/config.toml");
        Config::default().save_to_file(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("# Set confirm to true"));
        let config = Config::load_from_file(&path).unwrap();
        assert!(!config.confirm);
        assert_eq!(config.worlds, "auto");
        assert_eq!(config.anvil.layers, Config::default().anvil.layers);
    }

    #[test]
    fn disarm_keeps_comments() {
        let input = "# header\nconfirm = true\nmode = \"clear\"\n# confirm = true\n";
        assert_eq!(
            disarm(input),
            "# header\nconfirm = false\nmode = \"clear\"\n# confirm = true\n"
        );
    }

    #[test]
    fn disarm_ignores_similar_keys() {
        let input = "confirmed = true\nconfirm=true";
        assert_eq!(disarm(input), "confirmed = true\nconfirm = false");
    }

    #[test]
    fn disarm_handles_indented_key() {
        let input = "# header\n  \tconfirm = true\nlayer = 2\n";
        assert_eq!(disarm(input), "# header\nconfirm = false\nlayer = 2\n");
        let config: Config = toml::from_str(&disarm(input)).unwrap();
        assert!(!config.confirm);
    }
}
