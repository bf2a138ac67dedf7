//! Chat-style sidebar sink
//!
//! A bounded FIFO log of comments that follows the newest entry unless the
//! viewer has scrolled away from the bottom.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::time::Instant;

use super::CommentSink;
use crate::buffer::Comment;
use crate::preferences::RenderMode;

/// One sidebar line
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SidebarEntry {
    /// Comment text
    pub text: String,
    /// When it arrived
    pub arrived_at: Instant,
}

/// Renders comments as a scrolling list
#[derive(Debug)]
pub struct SidebarSink {
    cap: usize,
    visible_rows: usize,
    entries: VecDeque<SidebarEntry>,
    /// Index of the first visible entry
    scroll: usize,
    follow: bool,
}

impl SidebarSink {
    /// Create an empty sidebar holding at most `cap` entries
    #[must_use]
    pub fn new(cap: usize, visible_rows: usize) -> Self {
        Self {
            cap: cap.max(1),
            visible_rows: visible_rows.max(1),
            entries: VecDeque::new(),
            scroll: 0,
            follow: true,
        }
    }

    /// All retained entries, oldest first
    pub fn entries(&self) -> impl Iterator<Item = &SidebarEntry> {
        self.entries.iter()
    }

    /// Newest entry
    #[must_use]
    pub fn latest(&self) -> Option<&SidebarEntry> {
        self.entries.back()
    }

    /// Number of retained entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the sidebar is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries currently in view
    pub fn visible(&self) -> impl Iterator<Item = &SidebarEntry> {
        self.entries.iter().skip(self.scroll).take(self.visible_rows)
    }

    /// Whether the view is pinned to the newest entry
    #[must_use]
    pub fn is_following(&self) -> bool {
        self.follow
    }

    /// Scroll so that `first` is the top visible entry
    ///
    /// Scrolling to the bottom resumes following new entries.
    pub fn scroll_to(&mut self, first: usize) {
        let bottom = self.bottom();
        self.scroll = first.min(bottom);
        self.follow = self.scroll == bottom;
    }

    /// Change how many rows fit in the view
    pub fn set_visible_rows(&mut self, rows: usize) {
        self.visible_rows = rows.max(1);
        if self.follow {
            self.scroll = self.bottom();
        } else {
            self.scroll = self.scroll.min(self.bottom());
        }
    }

    fn bottom(&self) -> usize {
        self.entries.len().saturating_sub(self.visible_rows)
    }
}

impl CommentSink for SidebarSink {
    fn mode(&self) -> RenderMode {
        RenderMode::Sidebar
    }

    fn on_comment(&mut self, comment: &Arc<Comment>, _now: Instant) {
        self.entries.push_back(SidebarEntry {
            text: comment.text().to_string(),
            arrived_at: comment.arrived_at(),
        });
        while self.entries.len() > self.cap {
            self.entries.pop_front();
            self.scroll = self.scroll.saturating_sub(1);
        }
        if self.follow {
            self.scroll = self.bottom();
        }
    }

    fn tick(&mut self, _now: Instant) {}

    fn clear(&mut self) {
        self.entries.clear();
        self.scroll = 0;
        self.follow = true;
    }
}
