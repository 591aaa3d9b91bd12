use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// An offset (or sum of offsets), and when it was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetSample {
    pub offset: i64,
    pub at: Instant,
}

/// Rolling history of [`OffsetSample`]s, oldest first.
#[derive(Debug, Clone, Default)]
pub struct OffsetHistory {
    samples: VecDeque<OffsetSample>,
}

impl OffsetHistory {
    pub fn record(&mut self, offset: i64, at: Instant) {
        self.samples.push_back(OffsetSample {
            offset,
            at,
        });
    }

    /// Discard samples older than `window`, relative to `now`.
    pub fn prune(&mut self, now: Instant, window: Duration) {
        // `now` too close to the clock origin: nothing can be older than `window`
        let Some(cutoff) = now.checked_sub(window) else {
            return;
        };

        while self.samples.front().is_some_and(|s| s.at < cutoff) {
            self.samples.pop_front();
        }
    }

    /// Difference between newest and oldest sample; `0` with fewer than 2 samples.
    pub fn delta(&self) -> i64 {
        match (self.samples.front(), self.samples.back()) {
            (Some(first), Some(last)) if self.samples.len() > 1 => last.offset - first.offset,
            _ => 0,
        }
    }

    /// Like [`Self::delta`], but only considering samples within `window` of `now`.
    ///
    /// The history is left untouched.
    pub fn delta_within(&self, now: Instant, window: Duration) -> i64 {
        let cutoff = now.checked_sub(window);
        let mut within = self.samples.iter().filter(|s| cutoff.map_or(true, |c| s.at >= c));

        match (within.next(), within.last()) {
            (Some(first), Some(last)) => last.offset - first.offset,
            _ => 0,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }
}
