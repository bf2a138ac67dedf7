//! Presentation Sinks
//!
//! Interchangeable renderers for incoming comments. Exactly one sink is
//! mounted at a time, chosen by the persisted [`RenderMode`]. Switching
//! modes only changes which sink is mounted; the connection and the comment
//! buffer are unaffected.

pub mod overlay;
pub mod sidebar;

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::buffer::Comment;
use crate::events::CommentaryEvent;
use crate::preferences::{PreferenceStore, RenderMode};
use crate::session::SessionPhase;

pub use overlay::{OverlayLayout, OverlayPlacement, OverlaySink};
pub use sidebar::{SidebarEntry, SidebarSink};

/// A renderer for commentary
pub trait CommentSink: Send {
    /// Mode this sink implements
    fn mode(&self) -> RenderMode;

    /// Present a newly arrived comment
    fn on_comment(&mut self, comment: &Arc<Comment>, now: Instant);

    /// Drop anything finished by `now`
    fn tick(&mut self, now: Instant);

    /// Remove everything
    fn clear(&mut self);
}

/// Routes comments to the sink selected by the render preference
pub struct SinkRouter {
    preferences: PreferenceStore,
    mounted: RenderMode,
    overlay: OverlaySink,
    sidebar: SidebarSink,
}

impl SinkRouter {
    /// Create a router with the mode currently stored in `preferences`
    #[must_use]
    pub fn new(preferences: PreferenceStore, overlay: OverlaySink, sidebar: SidebarSink) -> Self {
        let mounted = preferences.mode();
        Self {
            preferences,
            mounted,
            overlay,
            sidebar,
        }
    }

    /// Mode of the mounted sink
    #[must_use]
    pub fn mounted(&self) -> RenderMode {
        self.mounted
    }

    /// Overlay sink
    #[must_use]
    pub fn overlay(&self) -> &OverlaySink {
        &self.overlay
    }

    /// Overlay sink, mutably (for placements and resizing)
    pub fn overlay_mut(&mut self) -> &mut OverlaySink {
        &mut self.overlay
    }

    /// Sidebar sink
    #[must_use]
    pub fn sidebar(&self) -> &SidebarSink {
        &self.sidebar
    }

    /// Sidebar sink, mutably (for scrolling)
    pub fn sidebar_mut(&mut self) -> &mut SidebarSink {
        &mut self.sidebar
    }

    /// Remount if the stored preference changed since the last call
    pub fn sync_mode(&mut self) -> RenderMode {
        let wanted = self.preferences.mode();
        if wanted != self.mounted {
            if let Some(sink) = self.sink_mut(self.mounted) {
                sink.clear();
            }
            tracing::debug!(from = %self.mounted, to = %wanted, "Switching commentary sink");
            self.mounted = wanted;
        }
        wanted
    }

    /// Hand one event to the mounted sink
    pub fn handle(&mut self, event: &CommentaryEvent, now: Instant) {
        match event {
            CommentaryEvent::Comment(comment) => {
                let mode = self.sync_mode();
                if let Some(sink) = self.sink_mut(mode) {
                    sink.on_comment(comment, now);
                }
            }
            CommentaryEvent::PhaseChanged {
                phase: SessionPhase::Closed | SessionPhase::Idle,
                ..
            } => self.clear(),
            CommentaryEvent::PhaseChanged { .. } | CommentaryEvent::RetriesExhausted { .. } => {}
        }
    }

    /// Drain every event already queued on `events` into the mounted sink
    ///
    /// For hosts that poll once per frame instead of running
    /// [`spawn_router`]. Returns the number of events handled.
    pub fn pump(&mut self, events: &mut broadcast::Receiver<CommentaryEvent>, now: Instant) -> usize {
        let mut handled = 0;
        loop {
            match events.try_recv() {
                Ok(event) => {
                    self.handle(&event, now);
                    handled += 1;
                }
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Commentary sinks lagging, events skipped");
                }
                Err(broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed) => {
                    return handled;
                }
            }
        }
    }

    /// Advance the mounted sink's clock
    pub fn tick(&mut self, now: Instant) {
        let mode = self.sync_mode();
        if let Some(sink) = self.sink_mut(mode) {
            sink.tick(now);
        }
    }

    /// Clear both sinks
    pub fn clear(&mut self) {
        self.overlay.clear();
        self.sidebar.clear();
    }

    fn sink_mut(&mut self, mode: RenderMode) -> Option<&mut dyn CommentSink> {
        match mode {
            RenderMode::Off => None,
            RenderMode::Overlay => Some(&mut self.overlay),
            RenderMode::Sidebar => Some(&mut self.sidebar),
        }
    }
}

/// Feed `events` into `router` until the channel closes
///
/// A lagging receiver skips the missed events; comments are ephemeral.
pub fn spawn_router(
    router: Arc<Mutex<SinkRouter>>,
    mut events: broadcast::Receiver<CommentaryEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => router.lock().handle(&event, Instant::now()),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Commentary sinks lagging, events skipped");
                }
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn router(preferences: PreferenceStore) -> SinkRouter {
        let layout = OverlayLayout {
            width: 960.0,
            row_height: 36.0,
            font_size: 28.0,
            cap: 50,
            lifetime: Duration::from_millis(6000),
        };
        SinkRouter::new(preferences, OverlaySink::new(layout), SidebarSink::new(200, 10))
    }

    fn comment(text: &str) -> CommentaryEvent {
        CommentaryEvent::Comment(Arc::new(Comment::new(text, Instant::now(), 0)))
    }

    #[test]
    fn test_routes_to_mounted_sink_only() {
        let preferences = PreferenceStore::in_memory();
        let mut router = router(preferences.clone());
        let now = Instant::now();

        router.handle(&comment("overlay"), now);
        assert_eq!(router.overlay().len(), 1);
        assert!(router.sidebar().is_empty());

        preferences.set_mode(RenderMode::Sidebar).unwrap();
        router.handle(&comment("sidebar"), now);
        assert_eq!(router.mounted(), RenderMode::Sidebar);
        assert_eq!(router.sidebar().len(), 1);
        // Unmounted overlay is cleared
        assert!(router.overlay().is_empty());
    }

    #[test]
    fn test_off_mode_renders_nothing() {
        let preferences = PreferenceStore::in_memory();
        preferences.set_mode(RenderMode::Off).unwrap();
        let mut router = router(preferences);

        router.handle(&comment("hidden"), Instant::now());
        assert!(router.overlay().is_empty());
        assert!(router.sidebar().is_empty());
    }

    #[test]
    fn test_session_close_clears_sinks() {
        let mut router = router(PreferenceStore::in_memory());
        router.handle(&comment("a"), Instant::now());

        router.handle(
            &CommentaryEvent::PhaseChanged {
                broadcaster: "NHK総合".into(),
                generation: 2,
                phase: SessionPhase::Closed,
            },
            Instant::now(),
        );
        assert!(router.overlay().is_empty());
    }

    #[test]
    fn test_pump_drains_queued_events() {
        let (tx, mut rx) = broadcast::channel(16);
        let mut router = router(PreferenceStore::in_memory());

        tx.send(comment("a")).unwrap();
        tx.send(comment("b")).unwrap();
        assert_eq!(router.pump(&mut rx, Instant::now()), 2);
        assert_eq!(router.overlay().len(), 2);
        assert_eq!(router.pump(&mut rx, Instant::now()), 0);
    }

    #[tokio::test]
    async fn test_spawned_router_consumes_events() {
        let (tx, rx) = broadcast::channel(16);
        let router = Arc::new(Mutex::new(router(PreferenceStore::in_memory())));
        let handle = spawn_router(Arc::clone(&router), rx);

        tx.send(comment("hello")).unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(router.lock().overlay().len(), 1);
    }
}
