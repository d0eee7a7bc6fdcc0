//! Minecraft 世界批量图层清除工具

use anyhow::{Context, Result};
use bulklayer::{Config, Error, LayerEditor, WorldManager};
use clap::{Parser, Subcommand};
use log::{error, info};
use std::path::{Path, PathBuf};

/// Minecraft 世界批量图层清除工具
#[derive(Parser)]
#[command(name = "bulklayer", version, about)]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 备份并转换世界
    Run {
        /// 服务器目录（包含 worlds 文件夹）
        #[arg(short, long, default_value = ".")]
        server: PathBuf,
        /// 数据目录（配置、标记与备份），默认 <server>/bulklayer
        #[arg(short, long)]
        data: Option<PathBuf>,
        /// 按正常方式加载的世界
        #[arg(short, long = "world")]
        worlds: Vec<String>,
    },
    /// 生成默认配置文件
    Config {
        /// 输出路径（默认: config.toml）
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,
        /// 覆盖已存在的文件
        #[arg(long)]
        force: bool,
    },
}

fn load_config(config_path: Option<PathBuf>, data_dir: &Path) -> Result<(Config, Option<PathBuf>)> {
    if let Some(path) = config_path {
        let config = Config::load_from_file(&path)?;
        info!("Loaded config {}", path.display());
        return Ok((config, Some(path)));
    }
    Ok(Config::load(data_dir)?)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            server,
            data,
            worlds,
        } => {
            let data_dir = data.unwrap_or_else(|| server.join("bulklayer"));
            let (config, config_path) = load_config(cli.config, &data_dir)?;

            let Some(mut editor) = LayerEditor::enable(&data_dir, &config, config_path.as_deref())?
            else {
                return Ok(());
            };

            let mut manager = WorldManager::new(server.join("worlds"), config.anvil.layers.clone());
            let mut failed = match editor.preload(&mut manager) {
                Ok(()) => Vec::new(),
                Err(Error::WorldsFailed(names)) => names,
                Err(e) => return Err(e).context("failed to preload worlds"),
            };

            for name in &worlds {
                if let Err(e) = manager.load_world(name, &mut editor) {
                    error!("Conversion of world {} failed: {}", name, e);
                    failed.push(name.clone());
                }
            }

            for report in editor.reports() {
                info!(
                    "Backup of {} written to {}",
                    report.backup.source.display(),
                    report.backup.destination.display()
                );
            }
            if !failed.is_empty() {
                anyhow::bail!("Conversion failed for worlds: {}", failed.join(", "));
            }
        }

        Commands::Config { output, force } => {
            if output.exists() && !force {
                anyhow::bail!("File already exists: {:?}\nUse --force to overwrite", output);
            }

            Config::default().save_to_file(&output)?;
            println!("Wrote default config to {:?}", output);
            println!("Set confirm = true to run the conversion once.");
        }
    }

    Ok(())
}
