//! Offscreen raster surface

use std::sync::Arc;

use tiny_skia::{Color, ColorU8, FilterQuality, Pixmap, PixmapPaint, Transform};

use super::PipError;

/// One decoded video frame
///
/// Cloning is cheap; the pixels are shared.
#[derive(Clone, Debug)]
pub struct VideoFrame {
    pixmap: Arc<Pixmap>,
}

impl VideoFrame {
    /// Wrap an already premultiplied pixmap
    #[must_use]
    pub fn from_pixmap(pixmap: Pixmap) -> Self {
        Self {
            pixmap: Arc::new(pixmap),
        }
    }

    /// Build a frame from straight (non-premultiplied) RGBA bytes
    ///
    /// Returns `None` if the size is zero or `rgba` is not `width * height * 4`
    /// bytes long.
    #[must_use]
    pub fn from_rgba(width: u32, height: u32, rgba: &[u8]) -> Option<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(4)?;
        if rgba.len() != expected {
            return None;
        }

        let mut pixmap = Pixmap::new(width, height)?;
        for (pixel, chunk) in pixmap.pixels_mut().iter_mut().zip(rgba.chunks_exact(4)) {
            *pixel = ColorU8::from_rgba(chunk[0], chunk[1], chunk[2], chunk[3]).premultiply();
        }
        Some(Self::from_pixmap(pixmap))
    }

    /// Frame width
    #[must_use]
    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    /// Frame height
    #[must_use]
    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    /// Pixels
    #[must_use]
    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }
}

/// Fixed-size raster the compositor draws into
#[derive(Debug)]
pub struct Surface {
    pixmap: Pixmap,
}

impl Surface {
    /// Allocate a `width` x `height` surface
    ///
    /// # Errors
    ///
    /// Returns [`PipError::Surface`] for a zero or oversized surface.
    pub fn new(width: u32, height: u32) -> Result<Self, PipError> {
        let pixmap = Pixmap::new(width, height).ok_or(PipError::Surface { width, height })?;
        Ok(Self { pixmap })
    }

    /// Width in pixels
    #[must_use]
    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    /// Height in pixels
    #[must_use]
    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    /// Fill with opaque black
    pub fn clear(&mut self) {
        self.pixmap.fill(Color::BLACK);
    }

    /// Draw `frame` stretched to cover the whole surface
    pub fn draw_video(&mut self, frame: &VideoFrame) {
        self.clear();
        if frame.width() == 0 || frame.height() == 0 {
            return;
        }
        let sx = self.width() as f32 / frame.width() as f32;
        let sy = self.height() as f32 / frame.height() as f32;
        let paint = PixmapPaint {
            quality: FilterQuality::Bilinear,
            ..PixmapPaint::default()
        };
        self.pixmap.draw_pixmap(
            0,
            0,
            frame.pixmap().as_ref(),
            &paint,
            Transform::from_scale(sx, sy),
            None,
        );
    }

    /// Pixels, for text drawing
    pub fn pixmap_mut(&mut self) -> &mut Pixmap {
        &mut self.pixmap
    }

    /// Pixels
    #[must_use]
    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    /// Copy of the current contents
    #[must_use]
    pub fn snapshot(&self) -> Pixmap {
        self.pixmap.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_surface_is_rejected() {
        assert!(matches!(
            Surface::new(0, 540),
            Err(PipError::Surface { width: 0, .. })
        ));
    }

    #[test]
    fn test_from_rgba_checks_length() {
        assert!(VideoFrame::from_rgba(2, 2, &[0; 15]).is_none());
        assert!(VideoFrame::from_rgba(2, 2, &[0; 16]).is_some());
    }

    #[test]
    fn test_video_is_scaled_to_cover() {
        let red = [255u8, 0, 0, 255].repeat(4);
        let frame = VideoFrame::from_rgba(2, 2, &red).unwrap();

        let mut surface = Surface::new(8, 6).unwrap();
        surface.draw_video(&frame);

        for (x, y) in [(0, 0), (7, 5), (4, 3)] {
            let pixel = surface.pixmap().pixel(x, y).unwrap();
            assert!(pixel.red() > 250, "red at ({x}, {y}) was {}", pixel.red());
            assert!(pixel.green() < 5 && pixel.blue() < 5);
        }
    }
}
