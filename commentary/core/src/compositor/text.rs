//! Comment text rasterization
//!
//! Text is outlined for legibility over video: the glyphs are drawn in the
//! stroke colour at eight offsets around the origin, then once in the fill
//! colour on top.

use std::collections::HashMap;

use cosmic_text::{Attrs, Buffer, Family, FontSystem, Metrics, Shaping, SwashCache};
use tiny_skia::{Color, Paint, Pixmap, Rect, Transform};

/// Cached text widths kept before the cache is reset
const MEASURE_CACHE_LIMIT: usize = 1024;

/// Colours and outline thickness for comment text
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OutlineStyle {
    /// Glyph colour
    pub fill: Color,
    /// Outline colour
    pub stroke: Color,
    /// Outline thickness in pixels
    pub stroke_width: f32,
}

impl Default for OutlineStyle {
    fn default() -> Self {
        Self {
            fill: Color::WHITE,
            stroke: Color::BLACK,
            stroke_width: 2.0,
        }
    }
}

impl OutlineStyle {
    /// Offsets of the outline passes, clockwise from the top-left
    #[must_use]
    pub fn offsets(&self) -> [(f32, f32); 8] {
        let d = self.stroke_width;
        [
            (-d, -d),
            (0.0, -d),
            (d, -d),
            (d, 0.0),
            (d, d),
            (0.0, d),
            (-d, d),
            (-d, 0.0),
        ]
    }
}

/// Draws single-line comment text onto a pixmap
pub trait TextPainter: Send {
    /// Rendered width of `text` in pixels
    fn measure(&mut self, text: &str) -> f32;

    /// Draw `text` with its top-left corner at (`x`, `y`), outline first
    fn draw(&mut self, target: &mut Pixmap, text: &str, x: f32, y: f32, style: &OutlineStyle);
}

/// [`TextPainter`] backed by cosmic-text shaping and swash rasterization
pub struct CosmicTextPainter {
    font_system: FontSystem,
    swash_cache: SwashCache,
    metrics: Metrics,
    family: String,
    widths: HashMap<String, f32>,
}

impl CosmicTextPainter {
    /// Create a painter using the system fonts
    ///
    /// `family` may be a concrete family name or one of `sans-serif`,
    /// `serif`, `monospace`.
    #[must_use]
    pub fn new(font_size: f32, family: impl Into<String>) -> Self {
        Self::with_font_system(FontSystem::new(), font_size, family)
    }

    /// Create a painter over an existing font system
    #[must_use]
    pub fn with_font_system(font_system: FontSystem, font_size: f32, family: impl Into<String>) -> Self {
        Self {
            font_system,
            swash_cache: SwashCache::new(),
            metrics: Metrics::new(font_size, font_size * 1.2),
            family: family.into(),
            widths: HashMap::new(),
        }
    }

    fn shape(&mut self, text: &str) -> Buffer {
        let family = match self.family.as_str() {
            "sans-serif" => Family::SansSerif,
            "serif" => Family::Serif,
            "monospace" => Family::Monospace,
            name => Family::Name(name),
        };
        let mut buffer = Buffer::new(&mut self.font_system, self.metrics);
        buffer.set_size(&mut self.font_system, None, None);
        buffer.set_text(
            &mut self.font_system,
            text,
            Attrs::new().family(family),
            Shaping::Advanced,
        );
        buffer.shape_until_scroll(&mut self.font_system, false);
        buffer
    }

    fn paint_pass(&mut self, buffer: &Buffer, target: &mut Pixmap, x: f32, y: f32, color: Color) {
        let color = color.to_color_u8();
        let base = cosmic_text::Color::rgba(color.red(), color.green(), color.blue(), color.alpha());
        let mut paint = Paint {
            anti_alias: false,
            ..Paint::default()
        };

        buffer.draw(
            &mut self.font_system,
            &mut self.swash_cache,
            base,
            |gx, gy, w, h, glyph_color| {
                if glyph_color.a() == 0 {
                    return;
                }
                let Some(rect) = Rect::from_xywh(x + gx as f32, y + gy as f32, w as f32, h as f32)
                else {
                    return;
                };
                paint.set_color_rgba8(
                    glyph_color.r(),
                    glyph_color.g(),
                    glyph_color.b(),
                    glyph_color.a(),
                );
                target.fill_rect(rect, &paint, Transform::identity(), None);
            },
        );
    }
}

impl std::fmt::Debug for CosmicTextPainter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CosmicTextPainter")
            .field("family", &self.family)
            .field("font_size", &self.metrics.font_size)
            .finish_non_exhaustive()
    }
}

impl TextPainter for CosmicTextPainter {
    fn measure(&mut self, text: &str) -> f32 {
        if let Some(width) = self.widths.get(text) {
            return *width;
        }
        let width = self
            .shape(text)
            .layout_runs()
            .map(|run| run.line_w)
            .fold(0.0_f32, f32::max);

        if self.widths.len() >= MEASURE_CACHE_LIMIT {
            self.widths.clear();
        }
        self.widths.insert(text.to_string(), width);
        width
    }

    fn draw(&mut self, target: &mut Pixmap, text: &str, x: f32, y: f32, style: &OutlineStyle) {
        let buffer = self.shape(text);
        for (dx, dy) in style.offsets() {
            self.paint_pass(&buffer, target, x + dx, y + dy, style.stroke);
        }
        self.paint_pass(&buffer, target, x, y, style.fill);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outline_surrounds_origin() {
        let style = OutlineStyle::default();
        let offsets = style.offsets();
        assert_eq!(offsets.len(), 8);
        assert!(!offsets.contains(&(0.0, 0.0)));
        assert!(offsets.contains(&(2.0, -2.0)));
    }
}
