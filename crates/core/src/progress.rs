//! Upload progress arithmetic.

/// Percentage of `loaded` over `total`, rounded and clamped to 100.
///
/// An empty transfer (`total == 0`) is complete by definition.
pub fn percent(loaded: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = (loaded as f64 * 100.0 / total as f64).round();
    pct.clamp(0.0, 100.0) as u8
}

/// Turns a stream of byte counts into strictly increasing percentages.
///
/// Observers fed from a tracker see a non-decreasing `0..=100` sequence
/// without repeats, ending at 100 once [`finish`](Self::finish) is called.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    total: u64,
    loaded: u64,
    last_emitted: Option<u8>,
}

impl ProgressTracker {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            loaded: 0,
            last_emitted: None,
        }
    }

    pub fn loaded(&self) -> u64 {
        self.loaded
    }

    /// Record `bytes` more transferred. Returns a percentage only when it
    /// exceeds the last one emitted.
    pub fn advance(&mut self, bytes: u64) -> Option<u8> {
        self.loaded = self.loaded.saturating_add(bytes).min(self.total);
        self.emit(percent(self.loaded, self.total))
    }

    /// Mark the transfer complete. Returns `Some(100)` unless 100 was
    /// already emitted.
    pub fn finish(&mut self) -> Option<u8> {
        self.loaded = self.total;
        self.emit(100)
    }

    fn emit(&mut self, pct: u8) -> Option<u8> {
        match self.last_emitted {
            Some(last) if pct <= last => None,
            _ => {
                self.last_emitted = Some(pct);
                Some(pct)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_rounding_and_clamp() {
        assert_eq!(percent(0, 200), 0);
        assert_eq!(percent(1, 200), 1); // 0.5 rounds up
        assert_eq!(percent(50, 200), 25);
        assert_eq!(percent(300, 200), 100);
        assert_eq!(percent(0, 0), 100);
    }

    #[test]
    fn tracker_emits_strictly_increasing_values() {
        let mut tracker = ProgressTracker::new(1000);
        let mut seen = Vec::new();
        for _ in 0..400 {
            if let Some(p) = tracker.advance(3) {
                seen.push(p);
            }
        }
        seen.extend(tracker.finish());

        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(seen.last(), Some(&100));
    }

    #[test]
    fn finish_after_full_transfer_does_not_repeat() {
        let mut tracker = ProgressTracker::new(10);
        assert_eq!(tracker.advance(10), Some(100));
        assert_eq!(tracker.finish(), None);
    }

    #[test]
    fn overshoot_is_capped_at_total() {
        let mut tracker = ProgressTracker::new(10);
        tracker.advance(25);
        assert_eq!(tracker.loaded(), 10);
    }
}
