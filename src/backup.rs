//! 世界备份 - 递归复制目录

use crate::error::{Error, Result};
use chrono::{DateTime, Local};
use log::{debug, warn};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// 备份名中的时间格式
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// 一次备份的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRecord {
    pub source: PathBuf,
    pub destination: PathBuf,
}

/// `<世界名>_<时间>`
pub fn backup_name(world_name: &str, timestamp: &DateTime<Local>) -> String {
    format!("{}_{}", world_name, timestamp.format(TIMESTAMP_FORMAT))
}

/// 将世界目录复制到 `backups_dir/<backup_name>`
pub fn backup_world(
    world_path: &Path,
    backups_dir: &Path,
    backup_name: &str,
) -> Result<BackupRecord> {
    let destination = backups_dir.join(backup_name);
    copy_tree(world_path, &destination)?;
    Ok(BackupRecord {
        source: world_path.to_path_buf(),
        destination,
    })
}

/// 递归复制目录树。
///
/// 只复制目录与普通文件；符号链接及其他特殊文件被跳过并记录警告。
/// 失败时已复制的部分保留在目标目录中。
pub fn copy_tree(source: &Path, destination: &Path) -> Result<()> {
    if !source.is_dir() {
        return Err(Error::Copy {
            from: source.to_path_buf(),
            to: destination.to_path_buf(),
            source: io::Error::new(io::ErrorKind::NotFound, "source is not a directory"),
        });
    }
    create_dir(destination)?;

    let walker = WalkDir::new(source)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name();

    for entry in walker {
        let entry = entry.map_err(|e| Error::Walk {
            path: source.to_path_buf(),
            source: e,
        })?;
        let Ok(relative) = entry.path().strip_prefix(source) else {
            continue;
        };
        let target = destination.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            create_dir(&target)?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &target).map_err(|e| Error::Copy {
                from: entry.path().to_path_buf(),
                to: target.clone(),
                source: e,
            })?;
        } else {
            warn!("Skipping {} (not a regular file)", entry.path().display());
        }
    }

    debug!("Copied {} to {}", source.display(), destination.display());
    Ok(())
}

/// 创建目录；已存在的目录视为成功
pub(crate) fn create_dir(path: &Path) -> Result<()> {
    match fs::create_dir(path) {
        Ok(()) => Ok(()),
        Err(_) if path.is_dir() => Ok(()),
        Err(e) => Err(Error::CreateDir {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}
