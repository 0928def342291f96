//! Monitor framebuffers, the visible area inside them and screen regions.
//!
//! # Coordinate spaces (for beginners)
//!
//! A monitor renders into a framebuffer that is usually larger than what is
//! actually shown.  The host reports a *blit rectangle*: the offset and size
//! of the visible part inside the framebuffer.
//!
//! ```text
//!  framebuffer (width × height, 4 bytes per pixel, B G R A)
//! ┌────────────────────────────────────────┐
//! │        (x, y)                          │
//! │          ┌──────────────────┐          │
//! │          │  visible area    │ h        │
//! │          │  (0,0) .. (w,h)  │          │
//! │          └──────────────────┘          │
//! │                   w                    │
//! └────────────────────────────────────────┘
//! ```
//!
//! `screenshot` copies the visible area row by row.  `screencrc` regions are
//! expressed relative to the visible area's top-left corner, never relative
//! to the framebuffer.

use std::sync::Arc;

use thiserror::Error;

use crate::domain::checksum::Crc32;

/// Bytes per pixel in the host's framebuffer (B, G, R, A).
pub const BYTES_PER_PIXEL: usize = 4;

/// Errors raised when constructing a [`Framebuffer`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FramebufferError {
    #[error("framebuffer of {width}x{height} needs {expected} bytes, got {actual}")]
    SizeMismatch {
        width: usize,
        height: usize,
        expected: usize,
        actual: usize,
    },
}

/// Offset and size of the visible area inside a monitor's framebuffer.
///
/// Signed because hosts may report a blank or not-yet-initialised rectangle
/// with zero or negative extents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlitRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BlitRect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }
}

/// An immutable snapshot of a monitor's pixels.
///
/// Pixel data is shared behind an `Arc` so a host can hand out snapshots
/// without copying the whole buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Framebuffer {
    width: usize,
    height: usize,
    pixels: Arc<[u8]>,
}

impl Framebuffer {
    /// Wraps `pixels`, which must hold exactly `width * height` BGRA pixels.
    ///
    /// # Errors
    ///
    /// Returns [`FramebufferError::SizeMismatch`] when the length is wrong.
    pub fn new(
        width: usize,
        height: usize,
        pixels: impl Into<Arc<[u8]>>,
    ) -> Result<Self, FramebufferError> {
        let pixels = pixels.into();
        let expected = width * height * BYTES_PER_PIXEL;
        if pixels.len() != expected {
            return Err(FramebufferError::SizeMismatch {
                width,
                height,
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// A framebuffer whose every pixel is `bgra`.
    pub fn filled(width: usize, height: usize, bgra: [u8; 4]) -> Self {
        let pixels: Vec<u8> = bgra
            .iter()
            .copied()
            .cycle()
            .take(width * height * BYTES_PER_PIXEL)
            .collect();
        Self {
            width,
            height,
            pixels: pixels.into(),
        }
    }

    /// Builds a framebuffer by evaluating `pixel(x, y)` for every position.
    pub fn from_fn<F>(width: usize, height: usize, mut pixel: F) -> Self
    where
        F: FnMut(usize, usize) -> [u8; 4],
    {
        let mut pixels = Vec::with_capacity(width * height * BYTES_PER_PIXEL);
        for y in 0..height {
            for x in 0..width {
                pixels.extend_from_slice(&pixel(x, y));
            }
        }
        Self {
            width,
            height,
            pixels: pixels.into(),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.width * BYTES_PER_PIXEL
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    fn row(&self, y: usize) -> &[u8] {
        let start = y * self.stride();
        &self.pixels[start..start + self.stride()]
    }
}

// ── Visible area ──────────────────────────────────────────────────────────────

/// The visible part of a framebuffer, validated against its bounds.
#[derive(Debug, Clone, Copy)]
pub struct VisibleArea<'a> {
    framebuffer: &'a Framebuffer,
    x: usize,
    y: usize,
    width: usize,
    height: usize,
}

impl<'a> VisibleArea<'a> {
    /// Returns `None` when `rect` is empty or does not lie entirely inside
    /// `framebuffer`.
    pub fn new(framebuffer: &'a Framebuffer, rect: BlitRect) -> Option<Self> {
        if rect.is_empty() || rect.x < 0 || rect.y < 0 {
            return None;
        }
        let (x, y) = (rect.x as usize, rect.y as usize);
        let (width, height) = (rect.width as usize, rect.height as usize);
        if x + width > framebuffer.width() || y + height > framebuffer.height() {
            return None;
        }
        Some(Self {
            framebuffer,
            x,
            y,
            width,
            height,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Size in bytes of a full `screenshot` dump of this area.
    pub fn byte_len(&self) -> usize {
        self.width * self.height * BYTES_PER_PIXEL
    }

    /// Row `row` of `region`, as BGRA bytes. `row` is relative to the region.
    fn region_row(&self, region: Region, row: usize) -> &'a [u8] {
        let line = self.framebuffer.row(self.y + region.y + row);
        let start = (self.x + region.x) * BYTES_PER_PIXEL;
        &line[start..start + region.width * BYTES_PER_PIXEL]
    }

    /// The whole area as a region.
    pub fn full_region(&self) -> Region {
        Region {
            x: 0,
            y: 0,
            width: self.width,
            height: self.height,
        }
    }

    /// Copies the visible pixels row by row, top to bottom, as BGRA bytes.
    pub fn copy_bgra(&self) -> Vec<u8> {
        let region = self.full_region();
        let mut out = Vec::with_capacity(self.byte_len());
        for row in 0..self.height {
            out.extend_from_slice(self.region_row(region, row));
        }
        out
    }

    /// CRC-32 over the B, G, R bytes of every pixel in `region`, row-major,
    /// skipping alpha so the result does not depend on how a host fills it.
    ///
    /// `region` must come from [`Region::clamp`] against this area.
    pub fn crc32_bgr(&self, region: Region) -> u32 {
        let mut crc = Crc32::new();
        for row in 0..region.height {
            for pixel in self.region_row(region, row).chunks_exact(BYTES_PER_PIXEL) {
                crc.update(&pixel[..3]);
            }
        }
        crc.finalize()
    }
}

// ── Region ────────────────────────────────────────────────────────────────────

/// A non-empty rectangle inside a visible area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl Region {
    /// Clamps a client-supplied rectangle to a `bound_width × bound_height`
    /// area.
    ///
    /// Negative origins move to 0 without shrinking the extent; extents that
    /// run past the right or bottom edge are cut back to it.  Returns `None`
    /// when nothing is left.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use emuctl_core::Region;
    ///
    /// let r = Region::clamp(600, -5, 100, 50, 640, 480).unwrap();
    /// assert_eq!((r.x, r.y, r.width, r.height), (600, 0, 40, 50));
    /// assert!(Region::clamp(700, 0, 10, 10, 640, 480).is_none());
    /// ```
    pub fn clamp(
        x: i64,
        y: i64,
        width: i64,
        height: i64,
        bound_width: usize,
        bound_height: usize,
    ) -> Option<Self> {
        let (x, mut width) = clamp_axis(x, width, bound_width as i64);
        let (y, mut height) = clamp_axis(y, height, bound_height as i64);
        width = width.max(0);
        height = height.max(0);
        if width == 0 || height == 0 {
            return None;
        }
        Some(Self {
            x: x as usize,
            y: y as usize,
            width: width as usize,
            height: height as usize,
        })
    }
}

fn clamp_axis(origin: i64, extent: i64, bound: i64) -> (i64, i64) {
    let origin = origin.max(0);
    let extent = if origin.saturating_add(extent) > bound {
        bound - origin
    } else {
        extent
    };
    (origin, extent)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: usize, height: usize) -> Framebuffer {
        Framebuffer::from_fn(width, height, |x, y| [x as u8, y as u8, (x + y) as u8, 0xFF])
    }

    #[test]
    fn test_new_rejects_wrong_length() {
        // Arrange
        let pixels = vec![0u8; 10];

        // Act
        let result = Framebuffer::new(2, 2, pixels);

        // Assert
        assert_eq!(
            result,
            Err(FramebufferError::SizeMismatch {
                width: 2,
                height: 2,
                expected: 16,
                actual: 10
            })
        );
    }

    #[test]
    fn test_visible_area_must_fit_inside_framebuffer() {
        let fb = gradient(10, 10);

        assert!(VisibleArea::new(&fb, BlitRect::new(2, 2, 8, 8)).is_some());
        assert!(VisibleArea::new(&fb, BlitRect::new(3, 2, 8, 8)).is_none());
        assert!(VisibleArea::new(&fb, BlitRect::new(-1, 0, 4, 4)).is_none());
        assert!(VisibleArea::new(&fb, BlitRect::new(0, 0, 0, 4)).is_none());
    }

    #[test]
    fn test_copy_bgra_honours_blit_offset() {
        // Arrange
        let fb = gradient(8, 6);
        let area = VisibleArea::new(&fb, BlitRect::new(2, 1, 3, 2)).expect("fits");

        // Act
        let bytes = area.copy_bgra();

        // Assert
        assert_eq!(bytes.len(), area.byte_len());
        assert_eq!(bytes.len(), 3 * 2 * 4);
        assert_eq!(&bytes[..4], &[2, 1, 3, 0xFF], "first pixel is (2,1)");
        assert_eq!(&bytes[12..16], &[2, 2, 4, 0xFF], "second row starts at (2,2)");
    }

    #[test]
    fn test_crc_ignores_alpha_channel() {
        // Arrange
        let opaque = Framebuffer::filled(4, 4, [10, 20, 30, 0xFF]);
        let clear = Framebuffer::filled(4, 4, [10, 20, 30, 0x00]);
        let rect = BlitRect::new(0, 0, 4, 4);
        let a = VisibleArea::new(&opaque, rect).expect("fits");
        let b = VisibleArea::new(&clear, rect).expect("fits");

        // Act / Assert
        assert_eq!(a.crc32_bgr(a.full_region()), b.crc32_bgr(b.full_region()));
    }

    #[test]
    fn test_crc_covers_bgr_bytes_row_major() {
        // Arrange
        let fb = gradient(4, 4);
        let area = VisibleArea::new(&fb, BlitRect::new(1, 1, 3, 3)).expect("fits");
        let region = Region::clamp(1, 0, 2, 2, area.width(), area.height()).expect("non-empty");
        let mut expected = Vec::new();
        for y in 1..3usize {
            for x in 2..4usize {
                expected.extend_from_slice(&[x as u8, y as u8, (x + y) as u8]);
            }
        }

        // Act
        let crc = area.crc32_bgr(region);

        // Assert
        assert_eq!(crc, crate::crc32(&expected));
    }

    #[test]
    fn test_clamp_negative_origin_keeps_extent() {
        let region = Region::clamp(-10, -3, 20, 5, 640, 480).expect("non-empty");

        assert_eq!(
            region,
            Region {
                x: 0,
                y: 0,
                width: 20,
                height: 5
            }
        );
    }

    #[test]
    fn test_clamp_cuts_overflowing_extent() {
        let region = Region::clamp(630, 470, 100, 100, 640, 480).expect("non-empty");

        assert_eq!((region.width, region.height), (10, 10));
    }

    #[test]
    fn test_clamp_outside_or_empty_is_none() {
        assert!(Region::clamp(640, 0, 1, 1, 640, 480).is_none());
        assert!(Region::clamp(0, 0, 0, 10, 640, 480).is_none());
        assert!(Region::clamp(0, 0, -5, 10, 640, 480).is_none());
    }

    #[test]
    fn test_clamped_full_rect_equals_whole_area_crc() {
        // Arrange
        let fb = gradient(16, 12);
        let area = VisibleArea::new(&fb, BlitRect::new(0, 0, 16, 12)).expect("fits");
        let oversized = Region::clamp(-4, -4, 1000, 1000, area.width(), area.height())
            .expect("non-empty");

        // Act / Assert
        assert_eq!(oversized, area.full_region());
        assert_eq!(area.crc32_bgr(oversized), area.crc32_bgr(area.full_region()));
    }
}
