pub mod capture;
pub mod error;
pub mod pipeline;
pub mod utils;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

pub use capture::frame::{ChromaOrder, FrameId, Plane, RawFrame, RgbImage, SessionId};
pub use capture::gate::{Admission, BurstGate, RejectReason};
pub use error::{BurstError, ConvertError, Result};
pub use pipeline::controller::{BurstEvent, BurstHandle, BurstResult, ControlMessage, PersistFailurePolicy};
pub use pipeline::persist::{EncodingFormat, FileSink, ImageSink};

/// Prefix for environment overrides, e.g. `BURSTCAP_BURST__FRAME_COUNT=3`
pub const ENV_PREFIX: &str = "BURSTCAP";

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub burst: BurstConfig,
    pub capture: CaptureConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BurstConfig {
    /// Frames per burst
    pub frame_count: usize,
    /// Minimum spacing between admitted frames, by arrival timestamp
    pub min_interval_ms: u64,
    pub chroma_order: ChromaOrder,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub width: u32,
    pub height: u32,
    /// Frames buffered between the sensor and the controller
    pub queue_depth: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub output_dir: PathBuf,
    pub file_prefix: String,
    pub format: EncodingFormat,
    pub jpeg_quality: u8,
    /// Delete files in `output_dir` before each burst
    pub clear_on_start: bool,
    pub on_persist_failure: PersistFailurePolicy,
    /// Upper bound on joining a filled burst's persistence tasks
    pub persist_timeout_ms: Option<u64>,
}

impl Default for BurstConfig {
    fn default() -> Self {
        Self {
            frame_count: 5,
            min_interval_ms: 80,
            chroma_order: ChromaOrder::Swapped,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            queue_depth: 2,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("captures"),
            file_prefix: "image_".into(),
            format: EncodingFormat::Jpeg,
            jpeg_quality: 100,
            clear_on_start: true,
            on_persist_failure: PersistFailurePolicy::Shrink,
            persist_timeout_ms: None,
        }
    }
}

impl BurstConfig {
    pub fn validate(&self) -> Result<()> {
        if self.frame_count == 0 {
            return Err(BurstError::InvalidConfig(
                "burst.frame_count must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl Config {
    /// Defaults, then `path` (TOML) if given, then `BURSTCAP_*` environment
    /// variables, with `__` separating nested keys.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Config::default())?);

        if let Some(path) = path {
            info!("Loading configuration from {}", path.display());
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.burst.validate()?;

        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(BurstError::InvalidConfig(format!(
                "capture size {}x{} is empty",
                self.capture.width, self.capture.height
            )));
        }
        if self.capture.queue_depth == 0 {
            return Err(BurstError::InvalidConfig(
                "capture.queue_depth must be at least 1".into(),
            ));
        }
        if !(1..=100).contains(&self.storage.jpeg_quality) {
            return Err(BurstError::InvalidConfig(format!(
                "storage.jpeg_quality {} outside 1..=100",
                self.storage.jpeg_quality
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_deployment() {
        let config = Config::default();
        assert_eq!(config.burst.frame_count, 5);
        assert_eq!(config.burst.min_interval_ms, 80);
        assert_eq!(config.burst.chroma_order, ChromaOrder::Swapped);
        assert_eq!((config.capture.width, config.capture.height), (1280, 720));
        assert_eq!(config.storage.jpeg_quality, 100);
        assert_eq!(config.storage.on_persist_failure, PersistFailurePolicy::Shrink);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn load_without_file_uses_defaults() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.storage.file_prefix, "image_");
        assert_eq!(config.storage.format, EncodingFormat::Jpeg);
        assert_eq!(config.storage.persist_timeout_ms, None);
    }

    #[test]
    fn load_overrides_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("burst.toml");
        std::fs::write(
            &path,
            r#"
[burst]
frame_count = 3
min_interval_ms = 120
chroma_order = "as_delivered"

[storage]
format = "png"
on_persist_failure = "abort"
persist_timeout_ms = 2000
"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.burst.frame_count, 3);
        assert_eq!(config.burst.min_interval_ms, 120);
        assert_eq!(config.burst.chroma_order, ChromaOrder::AsDelivered);
        assert_eq!(config.storage.format, EncodingFormat::Png);
        assert_eq!(config.storage.on_persist_failure, PersistFailurePolicy::Abort);
        assert_eq!(config.storage.persist_timeout_ms, Some(2000));
        assert_eq!(config.capture.width, 1280);
    }

    #[test]
    fn load_rejects_empty_burst() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("burst.toml");
        std::fs::write(&path, "[burst]\nframe_count = 0\n").unwrap();

        assert!(matches!(
            Config::load(Some(&path)),
            Err(BurstError::InvalidConfig(_))
        ));
    }

    #[test]
    fn jpeg_quality_is_bounded() {
        let mut config = Config::default();
        config.storage.jpeg_quality = 0;
        assert!(matches!(config.validate(), Err(BurstError::InvalidConfig(_))));
    }
}
