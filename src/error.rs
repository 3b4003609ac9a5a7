use std::path::PathBuf;

use thiserror::Error;

use crate::capture::frame::PlaneKind;

/// Per-frame conversion failures. Never fatal to the gate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConvertError {
    #[error("Invalid frame dimensions: width={0}, height={1}")]
    InvalidDimensions(u32, u32),

    #[error("Invalid frame format: {plane:?} plane expected {expected} bytes, got {actual}")]
    InvalidFrameFormat {
        plane: PlaneKind,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid frame format: {plane:?} plane stride {stride} is shorter than a row of {cols} samples")]
    InvalidStride {
        plane: PlaneKind,
        stride: usize,
        cols: usize,
    },
}

#[derive(Error, Debug)]
pub enum BurstError {
    #[error(transparent)]
    Convert(#[from] ConvertError),

    #[error("Failed to persist {}: {reason}", path.display())]
    PersistenceFailed { path: PathBuf, reason: String },

    #[error("Persistence did not finish within {0}ms")]
    PersistTimeout(u64),

    #[error("Persistence task failed: {0}")]
    PersistTask(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, BurstError>;
