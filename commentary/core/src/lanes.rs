//! Lane Scheduler
//!
//! Assigns each arriving comment to one of a fixed number of horizontal
//! display tracks ("lanes"). A lane stays reserved for a comment's whole
//! transit time so that, under nominal load, two comments on screen at the
//! same moment never share a row.
//!
//! # Overflow
//!
//! When every lane is busy the lane that clears soonest is reassigned.
//! Sustained over-capacity therefore degrades into visual overlap rather than
//! dropped or delayed comments.

use std::time::Duration;

use tokio::time::Instant;

/// Default number of lanes
pub const DEFAULT_LANE_COUNT: usize = 12;

/// Greedy, non-preemptive slot scheduler over a fixed lane array
#[derive(Clone, Debug)]
pub struct LaneScheduler {
    /// When each lane becomes free again (`None` = never used)
    free_at: Vec<Option<Instant>>,
    /// How long an assignment keeps its lane busy
    lifetime: Duration,
}

impl LaneScheduler {
    /// Create a scheduler with `lane_count` lanes, each reserved for `lifetime`
    /// per assignment.
    ///
    /// A zero lane count is clamped to one lane so assignment can never fail.
    #[must_use]
    pub fn new(lane_count: usize, lifetime: Duration) -> Self {
        Self {
            free_at: vec![None; lane_count.max(1)],
            lifetime,
        }
    }

    /// Number of lanes
    #[must_use]
    pub fn lane_count(&self) -> usize {
        self.free_at.len()
    }

    /// Reservation length per assignment
    #[must_use]
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Assign a lane for a comment arriving at `now`
    ///
    /// Returns the first free lane in index order, or the lane clearing
    /// soonest when all are busy. Always returns an index in
    /// `0..lane_count()`.
    pub fn assign(&mut self, now: Instant) -> usize {
        let lane = self
            .free_at
            .iter()
            .position(|free_at| free_at.map_or(true, |at| at <= now))
            .unwrap_or_else(|| self.soonest_free());

        self.free_at[lane] = Some(now + self.lifetime);
        lane
    }

    /// Number of lanes still reserved at `now`
    #[must_use]
    pub fn busy_lanes(&self, now: Instant) -> usize {
        self.free_at
            .iter()
            .filter(|free_at| free_at.is_some_and(|at| at > now))
            .count()
    }

    /// Release every lane
    pub fn reset(&mut self) {
        self.free_at.iter_mut().for_each(|slot| *slot = None);
    }

    fn soonest_free(&self) -> usize {
        // Only called when every lane holds a reservation.
        self.free_at
            .iter()
            .enumerate()
            .min_by_key(|(_, free_at)| **free_at)
            .map_or(0, |(idx, _)| idx)
    }
}

impl Default for LaneScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_LANE_COUNT, crate::buffer::DEFAULT_COMMENT_LIFETIME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const LIFETIME: Duration = Duration::from_millis(6000);

    #[test]
    fn test_distinct_lanes_within_window() {
        let mut scheduler = LaneScheduler::new(12, LIFETIME);
        let start = Instant::now();

        let lanes: HashSet<usize> = (0..12)
            .map(|i| scheduler.assign(start + Duration::from_millis(i * 100)))
            .collect();

        assert_eq!(lanes.len(), 12);
    }

    #[test]
    fn test_first_free_lane_in_index_order() {
        let mut scheduler = LaneScheduler::new(4, LIFETIME);
        let start = Instant::now();

        assert_eq!(scheduler.assign(start), 0);
        assert_eq!(scheduler.assign(start), 1);
        assert_eq!(scheduler.assign(start), 2);
    }

    #[test]
    fn test_lane_reused_after_lifetime() {
        let mut scheduler = LaneScheduler::new(2, LIFETIME);
        let start = Instant::now();

        assert_eq!(scheduler.assign(start), 0);
        assert_eq!(scheduler.assign(start + Duration::from_millis(10)), 1);

        // Lane 0 frees exactly at start + lifetime
        assert_eq!(scheduler.assign(start + LIFETIME), 0);
    }

    #[test]
    fn test_overflow_reuses_soonest_clearing_lane() {
        let mut scheduler = LaneScheduler::new(3, LIFETIME);
        let start = Instant::now();

        scheduler.assign(start + Duration::from_millis(200)); // lane 0
        scheduler.assign(start); // lane 1, clears first
        scheduler.assign(start + Duration::from_millis(100)); // lane 2

        assert_eq!(scheduler.assign(start + Duration::from_millis(300)), 1);
        // Lane 1 now clears last; lane 2 is next in line
        assert_eq!(scheduler.assign(start + Duration::from_millis(400)), 2);
    }

    #[test]
    fn test_overflow_always_valid_index() {
        let mut scheduler = LaneScheduler::new(12, LIFETIME);
        let start = Instant::now();

        for i in 0..500 {
            let lane = scheduler.assign(start + Duration::from_millis(i));
            assert!(lane < 12);
        }
        assert_eq!(scheduler.busy_lanes(start + Duration::from_millis(500)), 12);
    }

    #[test]
    fn test_zero_lanes_clamped() {
        let mut scheduler = LaneScheduler::new(0, LIFETIME);
        assert_eq!(scheduler.lane_count(), 1);
        assert_eq!(scheduler.assign(Instant::now()), 0);
    }

    #[test]
    fn test_reset_frees_all_lanes() {
        let mut scheduler = LaneScheduler::new(2, LIFETIME);
        let now = Instant::now();
        scheduler.assign(now);
        scheduler.assign(now);
        assert_eq!(scheduler.busy_lanes(now), 2);

        scheduler.reset();
        assert_eq!(scheduler.busy_lanes(now), 0);
        assert_eq!(scheduler.assign(now), 0);
    }
}
