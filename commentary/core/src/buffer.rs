//! Comment Buffer
//!
//! The single time-windowed source of truth for "currently displayable"
//! comments. Every render sink and the compositor read from the same buffer
//! on their own cadence; only the connection manager writes to it.
//!
//! Eviction is lazy: [`CommentBuffer::active_snapshot`] drops expired entries
//! as a side effect, so no timer is needed to keep the buffer small.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use unicode_width::UnicodeWidthStr;

use crate::lanes::LaneScheduler;

/// Default time a comment stays on screen
pub const DEFAULT_COMMENT_LIFETIME: Duration = Duration::from_millis(6000);

/// A decoded commentary message with its display lane
#[derive(Debug)]
pub struct Comment {
    text: String,
    arrived_at: Instant,
    lane: usize,
    /// Display columns, measured on first use
    columns: OnceLock<usize>,
}

impl Comment {
    /// Create a comment that arrived at `arrived_at` and was given `lane`
    #[must_use]
    pub fn new(text: impl Into<String>, arrived_at: Instant, lane: usize) -> Self {
        Self {
            text: text.into(),
            arrived_at,
            lane,
            columns: OnceLock::new(),
        }
    }

    /// Comment text
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Arrival time
    #[must_use]
    pub fn arrived_at(&self) -> Instant {
        self.arrived_at
    }

    /// Assigned lane index
    #[must_use]
    pub fn lane(&self) -> usize {
        self.lane
    }

    /// Width of the text in terminal-style display columns.
    ///
    /// Wide (CJK) characters count as two columns. Memoized.
    pub fn display_columns(&self) -> usize {
        *self.columns.get_or_init(|| self.text.width())
    }

    /// Time since arrival, saturating at zero
    #[must_use]
    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.arrived_at)
    }

    /// Whether the comment has outlived `lifetime` at `now`
    #[must_use]
    pub fn is_expired(&self, now: Instant, lifetime: Duration) -> bool {
        self.elapsed(now) >= lifetime
    }

    /// Fraction of the transit completed at `now`, clamped to `0.0..=1.0`
    #[must_use]
    pub fn progress(&self, now: Instant, lifetime: Duration) -> f32 {
        if lifetime.is_zero() {
            return 1.0;
        }
        (self.elapsed(now).as_secs_f32() / lifetime.as_secs_f32()).clamp(0.0, 1.0)
    }
}

/// Time-windowed store of active comments
#[derive(Debug)]
pub struct CommentBuffer {
    comments: Vec<Arc<Comment>>,
    lifetime: Duration,
}

impl CommentBuffer {
    /// Create an empty buffer whose entries live for `lifetime`
    #[must_use]
    pub fn new(lifetime: Duration) -> Self {
        Self {
            comments: Vec::new(),
            lifetime,
        }
    }

    /// Comment lifetime
    #[must_use]
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Append a comment
    pub fn push(&mut self, comment: Arc<Comment>) {
        self.comments.push(comment);
    }

    /// Drop entries expired at `now`
    pub fn evict_expired(&mut self, now: Instant) {
        let lifetime = self.lifetime;
        self.comments.retain(|c| !c.is_expired(now, lifetime));
    }

    /// Drop expired entries and return the rest, oldest first
    pub fn active_snapshot(&mut self, now: Instant) -> Vec<Arc<Comment>> {
        self.evict_expired(now);
        self.comments.clone()
    }

    /// Number of stored entries, including not-yet-evicted expired ones
    #[must_use]
    pub fn len(&self) -> usize {
        self.comments.len()
    }

    /// Whether the buffer holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.comments.is_empty()
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.comments.clear();
    }
}

impl Default for CommentBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_COMMENT_LIFETIME)
    }
}

/// Buffer and lane scheduler behind one lock
///
/// Cloning shares the same underlying state. Lane assignment and insertion
/// happen under a single lock acquisition so readers never observe a comment
/// whose lane is not yet reserved.
#[derive(Clone, Debug)]
pub struct SharedCommentBuffer {
    inner: Arc<Mutex<BufferState>>,
}

#[derive(Debug)]
struct BufferState {
    buffer: CommentBuffer,
    lanes: LaneScheduler,
}

impl SharedCommentBuffer {
    /// Create a shared buffer with `lane_count` lanes and the given lifetime
    #[must_use]
    pub fn new(lane_count: usize, lifetime: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(BufferState {
                buffer: CommentBuffer::new(lifetime),
                lanes: LaneScheduler::new(lane_count, lifetime),
            })),
        }
    }

    /// Assign a lane to `text` arriving at `now`, store it, and return it
    ///
    /// Entries expired at `now` are evicted first, so the buffer stays
    /// bounded even when nothing reads snapshots.
    pub fn record(&self, text: impl Into<String>, now: Instant) -> Arc<Comment> {
        let mut state = self.inner.lock();
        state.buffer.evict_expired(now);
        let lane = state.lanes.assign(now);
        let comment = Arc::new(Comment::new(text, now, lane));
        state.buffer.push(Arc::clone(&comment));
        comment
    }

    /// Active comments at `now` (evicts expired entries)
    pub fn active_snapshot(&self, now: Instant) -> Vec<Arc<Comment>> {
        self.inner.lock().buffer.active_snapshot(now)
    }

    /// Comment lifetime
    #[must_use]
    pub fn lifetime(&self) -> Duration {
        self.inner.lock().buffer.lifetime()
    }

    /// Number of stored entries, including not-yet-evicted expired ones
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().buffer.len()
    }

    /// Whether no entries are stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().buffer.is_empty()
    }

    /// Number of lanes
    #[must_use]
    pub fn lane_count(&self) -> usize {
        self.inner.lock().lanes.lane_count()
    }

    /// Drop all comments and release all lanes
    pub fn clear(&self) {
        let mut state = self.inner.lock();
        state.buffer.clear();
        state.lanes.reset();
    }
}

impl Default for SharedCommentBuffer {
    fn default() -> Self {
        Self::new(crate::lanes::DEFAULT_LANE_COUNT, DEFAULT_COMMENT_LIFETIME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_excludes_expired() {
        let mut buffer = CommentBuffer::new(DEFAULT_COMMENT_LIFETIME);
        let start = Instant::now();

        buffer.push(Arc::new(Comment::new("old", start, 0)));
        buffer.push(Arc::new(Comment::new(
            "new",
            start + Duration::from_millis(3000),
            1,
        )));

        let now = start + Duration::from_millis(6000);
        let active = buffer.active_snapshot(now);

        assert_eq!(active.len(), 1);
        assert_eq!(active[0].text(), "new");
        assert!(active
            .iter()
            .all(|c| now.duration_since(c.arrived_at()) < DEFAULT_COMMENT_LIFETIME));
    }

    #[test]
    fn test_snapshot_persists_eviction() {
        let mut buffer = CommentBuffer::new(Duration::from_millis(100));
        let start = Instant::now();
        buffer.push(Arc::new(Comment::new("a", start, 0)));
        assert_eq!(buffer.len(), 1);

        buffer.active_snapshot(start + Duration::from_millis(100));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_record_evicts_without_snapshot_reads() {
        let shared = SharedCommentBuffer::new(12, Duration::from_millis(100));
        let start = Instant::now();

        for i in 0..1000u64 {
            shared.record(format!("c{i}"), start + Duration::from_millis(i * 10));
        }
        // Only the last 100 ms of arrivals are still held
        assert_eq!(shared.len(), 10);
    }

    #[test]
    fn test_display_columns_counts_wide_chars() {
        let comment = Comment::new("草www", Instant::now(), 0);
        assert_eq!(comment.display_columns(), 5);
        // memoized value is stable
        assert_eq!(comment.display_columns(), 5);
    }

    #[test]
    fn test_progress_clamped() {
        let start = Instant::now();
        let comment = Comment::new("x", start, 0);
        let lifetime = Duration::from_millis(1000);

        assert!((comment.progress(start, lifetime) - 0.0).abs() < f32::EPSILON);
        assert!((comment.progress(start + Duration::from_millis(500), lifetime) - 0.5).abs() < 1e-3);
        assert!((comment.progress(start + Duration::from_secs(5), lifetime) - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_shared_record_assigns_lanes() {
        let shared = SharedCommentBuffer::new(3, DEFAULT_COMMENT_LIFETIME);
        let now = Instant::now();

        let a = shared.record("a", now);
        let b = shared.record("b", now);
        assert_eq!(a.lane(), 0);
        assert_eq!(b.lane(), 1);
        assert_eq!(shared.active_snapshot(now).len(), 2);

        shared.clear();
        assert!(shared.active_snapshot(now).is_empty());
        assert_eq!(shared.record("c", now).lane(), 0);
    }
}
