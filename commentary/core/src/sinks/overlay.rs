//! Scrolling overlay sink
//!
//! Each comment becomes a transient element that crosses the overlay from
//! the right edge until it is fully off the left edge, a distance of the
//! overlay width plus the comment's own width, over the comment lifetime.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use super::CommentSink;
use crate::buffer::Comment;
use crate::config::DisplayConfig;
use crate::preferences::RenderMode;

/// Approximate advance of one display column relative to the font size
const COLUMN_ADVANCE: f32 = 0.5;

/// Overlay geometry and limits
#[derive(Clone, Debug)]
pub struct OverlayLayout {
    /// Overlay width in pixels
    pub width: f32,
    /// Lane height in pixels
    pub row_height: f32,
    /// Font size in pixels
    pub font_size: f32,
    /// Maximum concurrently animating elements
    pub cap: usize,
    /// Transit time of one element
    pub lifetime: Duration,
}

impl OverlayLayout {
    /// Layout for an overlay `width` pixels wide
    #[must_use]
    pub fn from_display(display: &DisplayConfig, width: f32) -> Self {
        Self {
            width,
            row_height: display.row_height,
            font_size: display.font_size,
            cap: display.overlay_cap,
            lifetime: display.comment_lifetime,
        }
    }

    /// Estimated rendered width of a comment
    #[must_use]
    pub fn text_width(&self, comment: &Comment) -> f32 {
        comment.display_columns() as f32 * self.font_size * COLUMN_ADVANCE
    }

    /// Horizontal position after `progress` (0..=1) of the transit
    #[must_use]
    pub fn x_at(&self, progress: f32, text_width: f32) -> f32 {
        self.width - progress.clamp(0.0, 1.0) * (self.width + text_width)
    }

    /// Vertical position of a lane
    #[must_use]
    pub fn y_for_lane(&self, lane: usize) -> f32 {
        lane as f32 * self.row_height
    }
}

/// Where an overlay element is drawn this frame
#[derive(Clone, Debug, PartialEq)]
pub struct OverlayPlacement {
    /// Comment text
    pub text: String,
    /// Left edge in pixels (negative once partly off screen)
    pub x: f32,
    /// Top edge in pixels
    pub y: f32,
    /// Lane index
    pub lane: usize,
}

#[derive(Debug)]
struct OverlayElement {
    comment: Arc<Comment>,
    started_at: Instant,
    text_width: f32,
}

/// Renders comments as right-to-left scrolling elements
#[derive(Debug)]
pub struct OverlaySink {
    layout: OverlayLayout,
    elements: Vec<OverlayElement>,
    dropped: u64,
}

impl OverlaySink {
    /// Create an empty overlay
    #[must_use]
    pub fn new(layout: OverlayLayout) -> Self {
        Self {
            layout,
            elements: Vec::new(),
            dropped: 0,
        }
    }

    /// Layout in use
    #[must_use]
    pub fn layout(&self) -> &OverlayLayout {
        &self.layout
    }

    /// Change the overlay width (window resize)
    pub fn set_width(&mut self, width: f32) {
        self.layout.width = width;
    }

    /// Number of animating elements
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether nothing is animating
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Comments rejected by the element cap
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Element positions at `now`; finished elements are removed
    pub fn placements(&mut self, now: Instant) -> Vec<OverlayPlacement> {
        self.tick(now);
        let lifetime = self.layout.lifetime;
        self.elements
            .iter()
            .map(|element| {
                let progress = progress(element.started_at, now, lifetime);
                OverlayPlacement {
                    text: element.comment.text().to_string(),
                    x: self.layout.x_at(progress, element.text_width),
                    y: self.layout.y_for_lane(element.comment.lane()),
                    lane: element.comment.lane(),
                }
            })
            .collect()
    }
}

fn progress(started_at: Instant, now: Instant, lifetime: Duration) -> f32 {
    if lifetime.is_zero() {
        return 1.0;
    }
    (now.saturating_duration_since(started_at).as_secs_f32() / lifetime.as_secs_f32()).min(1.0)
}

impl CommentSink for OverlaySink {
    fn mode(&self) -> RenderMode {
        RenderMode::Overlay
    }

    fn on_comment(&mut self, comment: &Arc<Comment>, now: Instant) {
        self.tick(now);
        if self.elements.len() >= self.layout.cap {
            // Still in the buffer for the other consumers
            self.dropped += 1;
            tracing::trace!(cap = self.layout.cap, "Overlay full, dropping element");
            return;
        }
        self.elements.push(OverlayElement {
            text_width: self.layout.text_width(comment),
            comment: Arc::clone(comment),
            started_at: now,
        });
    }

    fn tick(&mut self, now: Instant) {
        let lifetime = self.layout.lifetime;
        self.elements
            .retain(|element| now.saturating_duration_since(element.started_at) < lifetime);
    }

    fn clear(&mut self) {
        self.elements.clear();
    }
}
