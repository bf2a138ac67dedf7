//! Picture-in-Picture Compositor
//!
//! The platform's detached-view mechanism can only target a real video
//! element and cannot draw text over it. The compositor therefore renders
//! video and comments together onto an offscreen surface and republishes
//! every frame on a [`FrameStream`]. The host feeds that stream to a
//! secondary, muted, autoplaying element, which is what actually detaches.
//!
//! ```text
//!  VideoSource ──frame──┐
//!                       ├──> Surface ──snapshot──> FrameStream ──> secondary element ──> PiP
//!  CommentBuffer ─text──┘
//! ```
//!
//! While warm the primary video is hidden but keeps playing as the decode
//! source and audio output.

pub mod host;
pub mod surface;
pub mod text;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::buffer::SharedCommentBuffer;
use crate::config::{CompositorConfig, DisplayConfig};

pub use host::{PipHost, VideoSource};
pub use surface::{Surface, VideoFrame};
pub use text::{CosmicTextPainter, OutlineStyle, TextPainter};
pub use tiny_skia::{Color, Pixmap};

/// Gap above the first lane, in pixels
const TOP_MARGIN: f32 = 8.0;

/// Composited frames; `None` before the first frame and after cleanup
pub type FrameStream = watch::Receiver<Option<Arc<Pixmap>>>;

/// Compositor errors
#[derive(Debug, Error)]
pub enum PipError {
    /// The platform cannot detach video
    #[error("Picture-in-Picture is not supported")]
    Unsupported,

    /// The offscreen surface could not be allocated
    #[error("Cannot allocate a {width}x{height} surface")]
    Surface {
        /// Requested width
        width: u32,
        /// Requested height
        height: u32,
    },

    /// The platform refused a request
    #[error("Picture-in-Picture request failed: {0}")]
    Host(String),

    /// No tokio runtime to run the render loop on
    #[error("No async runtime available for the render loop")]
    NoRuntime,
}

/// Outcome of [`CompositorPiP::toggle`], shown to the user
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PipStatus {
    /// Now detached
    Entered,
    /// Back in the page
    Exited,
    /// Not available on this platform
    Unsupported,
    /// The request failed; playback is unaffected
    Failed(String),
}

impl PipStatus {
    /// Status line for the UI
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Entered => "Picture-in-Picture started".to_string(),
            Self::Exited => "Picture-in-Picture ended".to_string(),
            Self::Unsupported => "Picture-in-Picture is not supported".to_string(),
            Self::Failed(reason) => format!("Picture-in-Picture failed: {reason}"),
        }
    }
}

/// Where comments land on the surface
#[derive(Clone, Copy, Debug)]
struct CommentLayout {
    row_height: f32,
    lifetime: Duration,
}

/// State moved into the render task
struct FrameRenderer {
    surface: Surface,
    buffer: SharedCommentBuffer,
    video: Arc<dyn VideoSource>,
    painter: Arc<Mutex<Box<dyn TextPainter>>>,
    frames: Arc<watch::Sender<Option<Arc<Pixmap>>>>,
    running: Arc<AtomicBool>,
    layout: CommentLayout,
    style: OutlineStyle,
}

impl FrameRenderer {
    async fn run(mut self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while self.running.load(Ordering::Acquire) {
            ticker.tick().await;
            if !self.running.load(Ordering::Acquire) {
                break;
            }
            if self.render(Instant::now()) {
                self.frames
                    .send_replace(Some(Arc::new(self.surface.snapshot())));
            }
        }
        tracing::debug!("Compositor render loop stopped");
    }

    /// Draw one frame; `false` if the video had nothing ready
    fn render(&mut self, now: Instant) -> bool {
        let Some(frame) = self.video.current_frame() else {
            return false;
        };
        self.surface.draw_video(&frame);

        let width = self.surface.width() as f32;
        let mut painter = self.painter.lock();
        for comment in self.buffer.active_snapshot(now) {
            let progress = comment.progress(now, self.layout.lifetime);
            let text_width = painter.measure(comment.text());
            let x = width - progress * (width + text_width);
            let y = comment.lane() as f32 * self.layout.row_height + TOP_MARGIN;
            painter.draw(self.surface.pixmap_mut(), comment.text(), x, y, &self.style);
        }
        true
    }
}

/// Composites video and comments for detached viewing
pub struct CompositorPiP {
    config: CompositorConfig,
    layout: CommentLayout,
    style: OutlineStyle,
    buffer: SharedCommentBuffer,
    video: Arc<dyn VideoSource>,
    host: Arc<dyn PipHost>,
    painter: Arc<Mutex<Box<dyn TextPainter>>>,
    frames: Arc<watch::Sender<Option<Arc<Pixmap>>>>,
    running: Arc<AtomicBool>,
    render_task: Option<JoinHandle<()>>,
    warm: bool,
}

impl CompositorPiP {
    /// Create a cold compositor
    pub fn new(
        config: CompositorConfig,
        display: &DisplayConfig,
        buffer: SharedCommentBuffer,
        video: Arc<dyn VideoSource>,
        host: Arc<dyn PipHost>,
        painter: impl TextPainter + 'static,
    ) -> Self {
        let (frames, _) = watch::channel(None);
        Self {
            config,
            layout: CommentLayout {
                row_height: display.row_height,
                lifetime: display.comment_lifetime,
            },
            style: OutlineStyle::default(),
            buffer,
            video,
            host,
            painter: Arc::new(Mutex::new(Box::new(painter))),
            frames: Arc::new(frames),
            running: Arc::new(AtomicBool::new(false)),
            render_task: None,
            warm: false,
        }
    }

    /// Create a compositor drawing text with system fonts
    pub fn with_system_fonts(
        config: CompositorConfig,
        display: &DisplayConfig,
        buffer: SharedCommentBuffer,
        video: Arc<dyn VideoSource>,
        host: Arc<dyn PipHost>,
    ) -> Self {
        let painter = CosmicTextPainter::new(display.font_size, config.font_family.clone());
        Self::new(config, display, buffer, video, host, painter)
    }

    /// Override the text colours
    #[must_use]
    pub fn with_style(mut self, style: OutlineStyle) -> Self {
        self.style = style;
        self
    }

    /// Whether the platform supports detached viewing
    #[must_use]
    pub fn is_supported(&self) -> bool {
        self.host.is_supported()
    }

    /// Whether the surfaces exist and the loop is running
    #[must_use]
    pub fn is_warm(&self) -> bool {
        self.warm
    }

    /// Receiver for composited frames
    #[must_use]
    pub fn frames(&self) -> FrameStream {
        self.frames.subscribe()
    }

    /// Build the surfaces, mount the secondary element and start the loop
    ///
    /// Calling it again while warm does nothing.
    ///
    /// # Errors
    ///
    /// Fails if detached viewing is unsupported, the surface cannot be
    /// allocated, the host refuses the secondary element, or there is no
    /// runtime. Nothing is left mounted on failure.
    pub fn warm_up(&mut self) -> Result<(), PipError> {
        if self.warm {
            return Ok(());
        }
        if !self.host.is_supported() {
            return Err(PipError::Unsupported);
        }
        let runtime = Handle::try_current().map_err(|_| PipError::NoRuntime)?;
        let surface = Surface::new(self.config.width, self.config.height)?;

        self.host.mount_secondary(self.frames.subscribe())?;
        self.host.set_primary_visible(false);
        self.host.set_overlay_visible(false);

        self.running.store(true, Ordering::Release);
        let renderer = FrameRenderer {
            surface,
            buffer: self.buffer.clone(),
            video: Arc::clone(&self.video),
            painter: Arc::clone(&self.painter),
            frames: Arc::clone(&self.frames),
            running: Arc::clone(&self.running),
            layout: self.layout,
            style: self.style,
        };
        self.render_task = Some(runtime.spawn(renderer.run(self.config.frame_interval)));
        self.warm = true;

        tracing::info!(
            width = self.config.width,
            height = self.config.height,
            interval_ms = self.config.frame_interval.as_millis() as u64,
            "Compositor warmed up"
        );
        Ok(())
    }

    /// Enter or leave detached viewing, warming up first if needed
    ///
    /// Never fails; problems come back as a status for the user.
    pub async fn toggle(&mut self) -> PipStatus {
        if !self.host.is_supported() {
            return PipStatus::Unsupported;
        }
        if let Err(e) = self.warm_up() {
            tracing::warn!(error = %e, "Compositor warm-up failed");
            return PipStatus::Failed(e.to_string());
        }

        let (result, success) = if self.host.is_detached() {
            (self.host.exit_detached().await, PipStatus::Exited)
        } else {
            (self.host.enter_detached().await, PipStatus::Entered)
        };

        match result {
            Ok(()) => success,
            Err(e) => {
                tracing::warn!(error = %e, "Picture-in-Picture request rejected");
                PipStatus::Failed(e.to_string())
            }
        }
    }

    /// Stop the loop, remove the secondary element, restore the page
    ///
    /// Safe in any state, including before `warm_up`.
    pub fn cleanup(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(task) = self.render_task.take() {
            task.abort();
        }
        if self.warm {
            self.host.unmount_secondary();
            tracing::info!("Compositor cleaned up");
        }
        self.host.set_primary_visible(true);
        self.host.set_overlay_visible(true);
        self.frames.send_replace(None);
        self.warm = false;
    }
}

impl Drop for CompositorPiP {
    fn drop(&mut self) {
        if self.warm {
            self.cleanup();
        }
    }
}

impl std::fmt::Debug for CompositorPiP {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositorPiP")
            .field("config", &self.config)
            .field("warm", &self.warm)
            .finish_non_exhaustive()
    }
}
