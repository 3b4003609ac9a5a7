//! Planar YUV 4:2:0 to interleaved RGBA conversion
//!
//! Frames are first assembled into a single `[Y][Cr][Cb]` buffer (row padding
//! dropped, chroma planes placed according to [`ChromaOrder`]) and then
//! decoded with the BT.601 limited-range integer transform. Each 2x2 block of
//! luma samples shares one chroma pair.

use crate::capture::frame::{chroma_dimensions, ChromaOrder, Plane, PlaneKind, RawFrame, RgbImage};
use crate::error::ConvertError;

/// Convert tightly packed planes. `u` is Cb and `v` is Cr.
pub fn convert(
    y: &[u8],
    u: &[u8],
    v: &[u8],
    width: u32,
    height: u32,
) -> Result<RgbImage, ConvertError> {
    let frame = RawFrame::packed(
        width,
        height,
        y.to_vec(),
        u.to_vec(),
        v.to_vec(),
        0,
    );
    convert_frame(&frame, ChromaOrder::Swapped)
}

/// Convert a (possibly row-padded) sensor frame
pub fn convert_frame(frame: &RawFrame, order: ChromaOrder) -> Result<RgbImage, ConvertError> {
    let assembled = assemble(frame, order)?;
    Ok(decode_assembled(&assembled, frame.width, frame.height))
}

/// Lay the three planes out back to back as `[Y][first][second]`
pub fn assemble(frame: &RawFrame, order: ChromaOrder) -> Result<Vec<u8>, ConvertError> {
    let (width, height) = (frame.width, frame.height);
    if width == 0 || height == 0 {
        return Err(ConvertError::InvalidDimensions(width, height));
    }

    let (w, h) = (width as usize, height as usize);
    let (cw, ch) = chroma_dimensions(width, height);

    check_plane(&frame.luma, PlaneKind::Luma, w, h)?;
    check_plane(&frame.chroma_a, PlaneKind::ChromaA, cw, ch)?;
    check_plane(&frame.chroma_b, PlaneKind::ChromaB, cw, ch)?;

    let (first, second) = match order {
        ChromaOrder::Swapped => (&frame.chroma_b, &frame.chroma_a),
        ChromaOrder::AsDelivered => (&frame.chroma_a, &frame.chroma_b),
    };

    let mut buf = Vec::with_capacity(w * h + 2 * cw * ch);
    copy_rows(&mut buf, &frame.luma, w, h);
    copy_rows(&mut buf, first, cw, ch);
    copy_rows(&mut buf, second, cw, ch);
    Ok(buf)
}

fn check_plane(plane: &Plane, kind: PlaneKind, cols: usize, rows: usize) -> Result<(), ConvertError> {
    if plane.row_stride < cols {
        return Err(ConvertError::InvalidStride {
            plane: kind,
            stride: plane.row_stride,
            cols,
        });
    }

    // The last row may stop at `cols` instead of carrying its padding
    let padded = plane.row_stride.checked_mul(rows);
    let trimmed = plane
        .row_stride
        .checked_mul(rows - 1)
        .and_then(|n| n.checked_add(cols));

    match (padded, trimmed) {
        (Some(full), Some(short)) if plane.len() == full || plane.len() == short => Ok(()),
        _ => Err(ConvertError::InvalidFrameFormat {
            plane: kind,
            expected: padded.unwrap_or(usize::MAX),
            actual: plane.len(),
        }),
    }
}

fn copy_rows(buf: &mut Vec<u8>, plane: &Plane, cols: usize, rows: usize) {
    if plane.row_stride == cols {
        buf.extend_from_slice(&plane.data[..cols * rows]);
        return;
    }
    for row in plane.data.chunks(plane.row_stride).take(rows) {
        buf.extend_from_slice(&row[..cols]);
    }
}

/// Decode an assembled `[Y][Cr][Cb]` buffer. The caller guarantees its length.
fn decode_assembled(buf: &[u8], width: u32, height: u32) -> RgbImage {
    let (w, h) = (width as usize, height as usize);
    let (cw, ch) = chroma_dimensions(width, height);

    let (luma, chroma) = buf.split_at(w * h);
    let (cr, cb) = chroma.split_at(cw * ch);

    let mut data = Vec::with_capacity(w * h * RgbImage::CHANNELS);
    for row in 0..h {
        let luma_row = &luma[row * w..(row + 1) * w];
        let chroma_base = (row / 2) * cw;
        for (col, &y) in luma_row.iter().enumerate() {
            let c = chroma_base + col / 2;
            data.extend_from_slice(&yuv_to_rgba(y, cb[c], cr[c]));
        }
    }

    RgbImage {
        width,
        height,
        data,
    }
}

/// BT.601 limited-range YUV to opaque RGBA
#[inline]
pub fn yuv_to_rgba(y: u8, u: u8, v: u8) -> [u8; 4] {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;

    let r = (298 * c + 409 * e + 128) >> 8;
    let g = (298 * c - 100 * d - 208 * e + 128) >> 8;
    let b = (298 * c + 516 * d + 128) >> 8;

    [clamp(r), clamp(g), clamp(b), 255]
}

#[inline]
fn clamp(x: i32) -> u8 {
    x.clamp(0, 255) as u8
}
