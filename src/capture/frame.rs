use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Which plane of a YUV 4:2:0 frame a buffer holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaneKind {
    Luma,
    ChromaA,
    ChromaB,
}

/// One channel of a planar image
#[derive(Debug, Clone)]
pub struct Plane {
    /// Immutable sample data - can be shared across threads without copying
    pub data: Bytes,
    /// Distance in bytes between the starts of two consecutive rows
    pub row_stride: usize,
}

impl Plane {
    pub fn new(data: impl Into<Bytes>, row_stride: usize) -> Self {
        Self {
            data: data.into(),
            row_stride,
        }
    }

    /// Tightly packed plane, one byte per sample and no row padding
    pub fn packed(data: impl Into<Bytes>, cols: usize) -> Self {
        Self::new(data, cols)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// How the two chroma planes are laid out after luma when a frame is
/// assembled for conversion. The assembled buffer is always read as
/// `[Y][Cr][Cb]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChromaOrder {
    /// `[Y][chroma B][chroma A]`: the sensor's third plane fills the Cr slot
    #[default]
    Swapped,
    /// `[Y][chroma A][chroma B]`: planes kept in delivery order
    AsDelivered,
}

/// A single planar YUV 4:2:0 sensor capture
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub luma: Plane,
    /// Chroma plane delivered second by the sensor (Cb / U)
    pub chroma_a: Plane,
    /// Chroma plane delivered third by the sensor (Cr / V)
    pub chroma_b: Plane,
    /// Arrival time on a monotonic millisecond clock
    pub timestamp_ms: u64,
}

impl RawFrame {
    pub fn new(
        width: u32,
        height: u32,
        luma: Plane,
        chroma_a: Plane,
        chroma_b: Plane,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            width,
            height,
            luma,
            chroma_a,
            chroma_b,
            timestamp_ms,
        }
    }

    /// Build a frame from tightly packed planes
    pub fn packed(
        width: u32,
        height: u32,
        y: impl Into<Bytes>,
        u: impl Into<Bytes>,
        v: impl Into<Bytes>,
        timestamp_ms: u64,
    ) -> Self {
        let (cw, _) = chroma_dimensions(width, height);
        Self::new(
            width,
            height,
            Plane::packed(y, width as usize),
            Plane::packed(u, cw),
            Plane::packed(v, cw),
            timestamp_ms,
        )
    }
}

/// Chroma plane size for a 4:2:0 frame. Odd dimensions round up.
pub fn chroma_dimensions(width: u32, height: u32) -> (usize, usize) {
    (width.div_ceil(2) as usize, height.div_ceil(2) as usize)
}

/// Interleaved RGBA image, four bytes per pixel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbImage {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl RgbImage {
    pub const CHANNELS: usize = 4;

    /// RGBA value at `(x, y)`
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * Self::CHANNELS;
        [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]
    }
}

/// Generation number of a burst session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub u64);

/// Identifier of one accepted frame: its session and position in the burst
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId {
    pub session: SessionId,
    pub index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chroma_dimensions_round_up() {
        assert_eq!(chroma_dimensions(1280, 720), (640, 360));
        assert_eq!(chroma_dimensions(3, 5), (2, 3));
        assert_eq!(chroma_dimensions(1, 1), (1, 1));
    }

    #[test]
    fn packed_frame_uses_plane_widths_as_strides() {
        let frame = RawFrame::packed(4, 2, vec![0u8; 8], vec![0u8; 2], vec![0u8; 2], 7);
        assert_eq!(frame.luma.row_stride, 4);
        assert_eq!(frame.chroma_a.row_stride, 2);
        assert_eq!(frame.chroma_b.row_stride, 2);
        assert_eq!(frame.timestamp_ms, 7);
    }

    #[test]
    fn pixel_reads_rgba_quad() {
        let image = RgbImage {
            width: 2,
            height: 1,
            data: vec![1, 2, 3, 255, 4, 5, 6, 255],
        };
        assert_eq!(image.pixel(1, 0), [4, 5, 6, 255]);
    }
}
