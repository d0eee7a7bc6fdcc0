//! 错误类型

use crate::config::ConfigError;
use std::io;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("directory \"{path}\" was not created: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("failed to copy {from} to {to}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },

    #[error("failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        source: walkdir::Error,
    },

    #[error("world \"{0}\" does not exist")]
    WorldNotFound(String),

    #[error("invalid chunk ({x}, {z}): {reason}")]
    InvalidChunk { x: i32, z: i32, reason: String },

    #[error("NBT error: {0}")]
    Nbt(#[from] fastnbt::error::Error),

    #[error("conversion failed for worlds: {}", .0.join(", "))]
    WorldsFailed(Vec<String>),

    #[error(transparent)]
    Io(#[from] io::Error),
}
