//! Image persistence: encode a converted frame and write it to disk

use std::io::Cursor;
use std::path::PathBuf;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageError};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::capture::frame::{FrameId, RgbImage};
use crate::error::{BurstError, Result};
use crate::utils;
use crate::StorageConfig;

/// Destination for accepted burst images. Called from blocking worker
/// threads, one call per image, possibly concurrently.
pub trait ImageSink: Send + Sync + 'static {
    /// Store `image` and return a reference to where it landed
    fn persist(&self, id: FrameId, image: &RgbImage) -> Result<PathBuf>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingFormat {
    #[default]
    Jpeg,
    Png,
}

impl EncodingFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            EncodingFormat::Jpeg => "jpg",
            EncodingFormat::Png => "png",
        }
    }
}

/// Writes each image as its own file inside one directory
#[derive(Debug, Clone)]
pub struct FileSink {
    dir: PathBuf,
    prefix: String,
    format: EncodingFormat,
    jpeg_quality: u8,
}

impl FileSink {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            dir: config.output_dir.clone(),
            prefix: config.file_prefix.clone(),
            format: config.format,
            jpeg_quality: config.jpeg_quality,
        }
    }

    /// Encode to the configured format. JPEG drops the alpha channel.
    pub fn encode(&self, image: &RgbImage) -> std::result::Result<Vec<u8>, ImageError> {
        let mut buffer = Vec::new();
        let mut cursor = Cursor::new(&mut buffer);

        match self.format {
            EncodingFormat::Jpeg => {
                let rgb: Vec<u8> = image
                    .data
                    .chunks_exact(RgbImage::CHANNELS)
                    .flat_map(|p| [p[0], p[1], p[2]])
                    .collect();
                let mut encoder = JpegEncoder::new_with_quality(&mut cursor, self.jpeg_quality);
                encoder.encode(&rgb, image.width, image.height, ExtendedColorType::Rgb8)?;
            }
            EncodingFormat::Png => {
                PngEncoder::new(&mut cursor).write_image(
                    &image.data,
                    image.width,
                    image.height,
                    ExtendedColorType::Rgba8,
                )?;
            }
        }

        Ok(buffer)
    }
}

impl ImageSink for FileSink {
    #[instrument(skip(self, image), fields(session = id.session.0, index = id.index))]
    fn persist(&self, id: FrameId, image: &RgbImage) -> Result<PathBuf> {
        let name = utils::image_file_name(
            &self.prefix,
            chrono::Utc::now().timestamp_millis(),
            id.index,
            self.format.extension(),
        );
        let path = self.dir.join(name);
        let failed = |reason: String| BurstError::PersistenceFailed {
            path: path.clone(),
            reason,
        };

        let encoded = self.encode(image).map_err(|e| failed(e.to_string()))?;
        std::fs::create_dir_all(&self.dir).map_err(|e| failed(e.to_string()))?;
        std::fs::write(&path, &encoded).map_err(|e| failed(e.to_string()))?;

        debug!(path = %path.display(), bytes = encoded.len(), "Image written");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::capture::frame::SessionId;

    fn storage(dir: &Path, format: EncodingFormat) -> StorageConfig {
        StorageConfig {
            output_dir: dir.to_path_buf(),
            format,
            ..StorageConfig::default()
        }
    }

    fn gradient(width: u32, height: u32) -> RgbImage {
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[(x * 16) as u8, (y * 16) as u8, 128, 255]);
            }
        }
        RgbImage {
            width,
            height,
            data,
        }
    }

    fn id(index: usize) -> FrameId {
        FrameId {
            session: SessionId(1),
            index,
        }
    }

    #[test]
    fn jpeg_file_is_decodable() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(&storage(dir.path(), EncodingFormat::Jpeg));

        let path = sink.persist(id(3), &gradient(16, 8)).unwrap();
        assert_eq!(path.parent(), Some(dir.path()));
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("jpg"));

        let decoded = image::open(&path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 8));
    }

    #[test]
    fn png_round_trip_keeps_pixels() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(&storage(dir.path(), EncodingFormat::Png));
        let image = gradient(4, 4);

        let path = sink.persist(id(0), &image).unwrap();
        let decoded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(decoded.into_raw(), image.data);
    }

    #[test]
    fn missing_directory_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("pictures");
        let sink = FileSink::new(&storage(&nested, EncodingFormat::Jpeg));

        let path = sink.persist(id(1), &gradient(2, 2)).unwrap();
        assert!(path.starts_with(&nested));
        assert!(path.exists());
    }

    #[test]
    fn unwritable_target_reports_persistence_failure() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, b"file").unwrap();
        let sink = FileSink::new(&storage(&blocker, EncodingFormat::Jpeg));

        let err = sink.persist(id(0), &gradient(2, 2)).unwrap_err();
        assert!(matches!(err, BurstError::PersistenceFailed { .. }));
    }
}
