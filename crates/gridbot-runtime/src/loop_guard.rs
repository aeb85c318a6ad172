//! [`LoopGuard`] – detects exploration that keeps falling back without
//! making progress.
//!
//! When frontier search finds nothing reachable but the map is not yet
//! complete, the navigator wanders along the nearest known road. Each such
//! fallback is recorded with a label describing how much of the map is
//! known at that moment; any productive decision resets the guard. Once the
//! last `threshold` labels are identical the wandering has taught the map
//! nothing and the navigator must try a recovery (clearing blockages) or
//! give up.
//!
//! # Example
//!
//! ```rust
//! use gridbot_runtime::loop_guard::LoopGuard;
//!
//! let mut guard = LoopGuard::new(3);
//!
//! assert!(!guard.record("fallback"));
//! assert!(!guard.record("fallback"));
//! assert!(guard.record("fallback")); // third in a row
//!
//! guard.reset();
//! assert!(!guard.record("fallback"));
//! ```

use std::collections::VecDeque;

/// Rolling window over the most recent decision labels.
#[derive(Debug, Clone)]
pub struct LoopGuard<L = String> {
    threshold: usize,
    history: VecDeque<L>,
}

impl<L: PartialEq> LoopGuard<L> {
    /// `threshold` consecutive identical labels count as a loop. Zero is
    /// treated as one.
    pub fn new(threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            threshold,
            history: VecDeque::with_capacity(threshold),
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Record a decision label. Returns `true` once the window is full of
    /// the same label.
    pub fn record(&mut self, label: L) -> bool {
        self.history.push_back(label);
        while self.history.len() > self.threshold {
            self.history.pop_front();
        }
        self.is_stuck()
    }

    pub fn is_stuck(&self) -> bool {
        if self.history.len() < self.threshold {
            return false;
        }
        let first = &self.history[0];
        self.history.iter().all(|label| label == first)
    }

    /// Length of the trailing run of identical labels.
    pub fn streak(&self) -> usize {
        let Some(last) = self.history.back() else {
            return 0;
        };
        self.history
            .iter()
            .rev()
            .take_while(|label| *label == last)
            .count()
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_labels_never_trip() {
        let mut guard = LoopGuard::new(3);
        assert!(!guard.record("fallback"));
        assert!(!guard.record("frontier"));
        assert!(!guard.record("fallback"));
    }

    #[test]
    fn trips_at_threshold_and_stays_tripped() {
        let mut guard = LoopGuard::new(3);
        guard.record("fallback");
        guard.record("fallback");
        assert!(guard.record("fallback"));
        assert!(guard.record("fallback"));
        assert_eq!(guard.streak(), 3);
    }

    #[test]
    fn reset_starts_over() {
        let mut guard = LoopGuard::new(2);
        guard.record("fallback");
        assert!(guard.record("fallback"));
        guard.reset();
        assert_eq!(guard.streak(), 0);
        assert!(!guard.record("fallback"));
    }

    #[test]
    fn window_slides_past_old_labels() {
        let mut guard = LoopGuard::new(3);
        guard.record("a");
        guard.record("b");
        guard.record("c");
        guard.record("c");
        assert!(!guard.is_stuck());
        assert!(guard.record("c"));
    }

    #[test]
    fn structured_labels_compare_by_value() {
        let mut guard = LoopGuard::new(2);
        assert!(!guard.record((4, 10)));
        assert!(!guard.record((4, 11)));
        assert!(guard.record((4, 11)));
    }

    #[test]
    fn zero_threshold_behaves_like_one() {
        let mut guard = LoopGuard::new(0);
        assert_eq!(guard.threshold(), 1);
        assert!(guard.record("anything"));
    }
}
