//! Timer-free scheduling primitives.
//!
//! Every transition takes the current [`Instant`] explicitly; the store's
//! driver loop sleeps until the earliest deadline and then asks each
//! component what is due.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// A coalescing deadline: scheduling again replaces the previous deadline.
#[derive(Debug, Clone)]
pub struct Debounce {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debounce {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    /// Arm (or re-arm) the deadline at `now + delay`.
    pub fn schedule(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Disarm and return `true` if the deadline has passed.
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// Rate limiter with a trailing fire.
///
/// The first request fires at once; requests inside the interval after a
/// fire collapse into one fire at the end of the interval.
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Duration,
    last_fired: Option<Instant>,
    pending: bool,
}

impl Throttle {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_fired: None,
            pending: false,
        }
    }

    /// Ask to fire. Returns `true` if the caller should fire now.
    pub fn request(&mut self, now: Instant) -> bool {
        match self.last_fired {
            Some(last) if now < last + self.interval => {
                self.pending = true;
                false
            }
            _ => {
                self.fire(now);
                true
            }
        }
    }

    /// Drop a pending trailing fire.
    pub fn cancel(&mut self) {
        self.pending = false;
    }

    /// Record a fire that happened outside [`Throttle::request`].
    pub fn fire(&mut self, now: Instant) {
        self.last_fired = Some(now);
        self.pending = false;
    }

    /// When the trailing fire is due, if one is pending.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        if !self.pending {
            return None;
        }
        self.last_fired.map(|last| last + self.interval)
    }

    /// Fire the pending trailing request if its time has come.
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.deadline() {
            Some(deadline) if deadline <= now => {
                self.fire(now);
                true
            }
            _ => false,
        }
    }
}

/// Debounced, single-flight batching of file paths.
///
/// Paths accumulate in a pending set; a batch is released once the debounce
/// deadline passes and no other batch is in flight. Paths enqueued while a
/// batch is in flight wait for the next one, which [`FlushScheduler::finish`]
/// arms.
#[derive(Debug, Clone)]
pub struct FlushScheduler {
    pending: BTreeSet<PathBuf>,
    debounce: Debounce,
    in_flight: bool,
}

impl FlushScheduler {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            pending: BTreeSet::new(),
            debounce: Debounce::new(delay),
            in_flight: false,
        }
    }

    /// Add `path` to the pending set and restart the debounce.
    pub fn enqueue(&mut self, path: PathBuf, now: Instant) {
        self.pending.insert(path);
        self.debounce.schedule(now);
    }

    /// Release the pending batch if the debounce has elapsed.
    ///
    /// Returns `None` while another batch is in flight.
    pub fn take_ready(&mut self, now: Instant) -> Option<Vec<PathBuf>> {
        if self.in_flight || !self.debounce.take_due(now) {
            return None;
        }
        self.start_batch()
    }

    /// Release the pending batch without waiting for the debounce.
    pub fn take_all(&mut self) -> Option<Vec<PathBuf>> {
        if self.in_flight {
            return None;
        }
        self.debounce.cancel();
        self.start_batch()
    }

    fn start_batch(&mut self) -> Option<Vec<PathBuf>> {
        if self.pending.is_empty() {
            return None;
        }
        self.in_flight = true;
        Some(std::mem::take(&mut self.pending).into_iter().collect())
    }

    /// Mark the in-flight batch done; re-arm if paths arrived meanwhile.
    pub fn finish(&mut self, now: Instant) {
        self.in_flight = false;
        if !self.pending.is_empty() && !self.debounce.is_armed() {
            self.debounce.schedule(now);
        }
    }

    /// Drop every pending path and disarm the debounce.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.debounce.cancel();
    }

    /// Next deadline worth waking for; `None` while a batch is in flight.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        if self.in_flight {
            return None;
        }
        self.debounce.deadline()
    }

    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELAY: Duration = Duration::from_millis(100);

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_debounce_replaces_deadline() {
        let t0 = Instant::now();
        let mut debounce = Debounce::new(DELAY);
        debounce.schedule(t0);
        debounce.schedule(t0 + ms(50));
        assert_eq!(debounce.deadline(), Some(t0 + ms(150)));
        assert!(!debounce.take_due(t0 + ms(120)));
        assert!(debounce.take_due(t0 + ms(150)));
        assert!(!debounce.take_due(t0 + ms(500)));
    }

    #[test]
    fn test_throttle_first_request_fires() {
        let t0 = Instant::now();
        let mut throttle = Throttle::new(DELAY);
        assert!(throttle.request(t0));
        assert!(throttle.deadline().is_none());
    }

    #[test]
    fn test_throttle_collapses_burst_into_trailing_fire() {
        let t0 = Instant::now();
        let mut throttle = Throttle::new(DELAY);
        assert!(throttle.request(t0));
        assert!(!throttle.request(t0 + ms(10)));
        assert!(!throttle.request(t0 + ms(20)));
        assert_eq!(throttle.deadline(), Some(t0 + DELAY));

        assert!(!throttle.take_due(t0 + ms(99)));
        assert!(throttle.take_due(t0 + ms(100)));
        assert!(!throttle.take_due(t0 + ms(300)));
        assert!(throttle.deadline().is_none());
    }

    #[test]
    fn test_throttle_fires_after_interval() {
        let t0 = Instant::now();
        let mut throttle = Throttle::new(DELAY);
        assert!(throttle.request(t0));
        assert!(throttle.request(t0 + ms(100)));
    }

    #[test]
    fn test_flush_waits_for_debounce() {
        let t0 = Instant::now();
        let mut scheduler = FlushScheduler::new(DELAY);
        scheduler.enqueue(PathBuf::from("/a"), t0);
        scheduler.enqueue(PathBuf::from("/b"), t0 + ms(60));
        scheduler.enqueue(PathBuf::from("/a"), t0 + ms(70));

        assert!(scheduler.take_ready(t0 + ms(100)).is_none());
        let batch = scheduler.take_ready(t0 + ms(170)).unwrap();
        assert_eq!(batch, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
        assert!(scheduler.is_in_flight());
    }

    #[test]
    fn test_flush_is_single_flight() {
        let t0 = Instant::now();
        let mut scheduler = FlushScheduler::new(DELAY);
        scheduler.enqueue(PathBuf::from("/a"), t0);
        assert!(scheduler.take_ready(t0 + DELAY).is_some());

        scheduler.enqueue(PathBuf::from("/b"), t0 + ms(110));
        assert!(scheduler.deadline().is_none());
        assert!(scheduler.take_ready(t0 + ms(500)).is_none());
        assert!(scheduler.take_all().is_none());
        assert_eq!(scheduler.pending_len(), 1);
    }

    #[test]
    fn test_finish_rearms_when_dirty() {
        let t0 = Instant::now();
        let mut scheduler = FlushScheduler::new(DELAY);
        scheduler.enqueue(PathBuf::from("/a"), t0);
        scheduler.take_ready(t0 + DELAY).unwrap();
        scheduler.enqueue(PathBuf::from("/b"), t0 + ms(110));

        scheduler.finish(t0 + ms(400));
        assert!(!scheduler.is_in_flight());
        // The enqueue's own deadline already passed, so the batch is ready.
        assert_eq!(scheduler.deadline(), Some(t0 + ms(210)));
        let batch = scheduler.take_ready(t0 + ms(400)).unwrap();
        assert_eq!(batch, vec![PathBuf::from("/b")]);
    }

    #[test]
    fn test_finish_when_clean_stays_idle() {
        let t0 = Instant::now();
        let mut scheduler = FlushScheduler::new(DELAY);
        scheduler.enqueue(PathBuf::from("/a"), t0);
        scheduler.take_ready(t0 + DELAY).unwrap();
        scheduler.finish(t0 + ms(150));
        assert!(scheduler.deadline().is_none());
        assert_eq!(scheduler.pending_len(), 0);
    }

    #[test]
    fn test_throttle_cancel_drops_trailing_fire() {
        let t0 = Instant::now();
        let mut throttle = Throttle::new(DELAY);
        assert!(throttle.request(t0));
        assert!(!throttle.request(t0 + ms(10)));
        throttle.cancel();
        assert!(throttle.deadline().is_none());
        assert!(!throttle.take_due(t0 + ms(200)));
    }

    #[test]
    fn test_clear_disarms_pending_flush() {
        let t0 = Instant::now();
        let mut scheduler = FlushScheduler::new(DELAY);
        scheduler.enqueue(PathBuf::from("/a"), t0);
        scheduler.clear();
        assert!(scheduler.deadline().is_none());
        assert_eq!(scheduler.pending_len(), 0);
        assert!(scheduler.take_ready(t0 + ms(500)).is_none());
    }

    #[test]
    fn test_take_all_skips_debounce() {
        let t0 = Instant::now();
        let mut scheduler = FlushScheduler::new(DELAY);
        scheduler.enqueue(PathBuf::from("/a"), t0);
        assert_eq!(scheduler.take_all(), Some(vec![PathBuf::from("/a")]));
        assert!(scheduler.deadline().is_none());
        scheduler.finish(t0);
        assert!(scheduler.take_all().is_none());
    }
}
