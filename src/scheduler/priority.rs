//! Aging priority heap.
//!
//! Scores are `-(base + waited_secs * boost_rate)`; lower dequeues first.
//! Because every score drifts as time passes, the heap is rebuilt with
//! fresh scores (all computed at one instant) before each pop.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Duration;

use tokio::time::Instant;

/// Default starvation boost: half a priority level per second waited.
pub const DEFAULT_BOOST_RATE: f64 = 0.5;

/// Dynamic score for an entry with base priority `base` that has waited `waited`.
pub fn aging_score(base: f64, waited: Duration, boost_rate: f64) -> f64 {
    -(base + waited.as_secs_f64() * boost_rate)
}

/// Item with its scoring inputs.
#[derive(Debug)]
pub struct PrioritizedItem<T> {
    pub base: f64,
    pub enqueued_at: Instant,
    pub sequence: u64,
    pub score: f64,
    pub item: T,
}

impl<T> PrioritizedItem<T> {
    fn rescore(&mut self, now: Instant, boost_rate: f64) {
        let waited = now.saturating_duration_since(self.enqueued_at);
        self.score = aging_score(self.base, waited, boost_rate);
    }
}

impl<T> PartialEq for PrioritizedItem<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for PrioritizedItem<T> {}

impl<T> PartialOrd for PrioritizedItem<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for PrioritizedItem<T> {
    // BinaryHeap is a max-heap: the "greatest" item is the lowest score,
    // then the lowest sequence.
    fn cmp(&self, other: &Self) -> Ordering {
        match other.score.total_cmp(&self.score) {
            Ordering::Equal => other.sequence.cmp(&self.sequence),
            ord => ord,
        }
    }
}

/// Priority heap whose ordering ages with wall-clock time.
pub struct AgingPriorityQueue<T> {
    heap: BinaryHeap<PrioritizedItem<T>>,
    next_sequence: u64,
    boost_rate: f64,
}

impl<T> AgingPriorityQueue<T> {
    pub fn new(boost_rate: f64) -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_sequence: 0,
            boost_rate,
        }
    }

    pub fn boost_rate(&self) -> f64 {
        self.boost_rate
    }

    /// Insert with the entry's own enqueue instant, which may be in the past
    /// for re-queued items.
    pub fn push(&mut self, item: T, base: f64, enqueued_at: Instant) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(PrioritizedItem {
            base,
            enqueued_at,
            sequence,
            score: -base,
            item,
        });
    }

    /// Recompute every score at `now` and rebuild the heap.
    pub fn refresh(&mut self, now: Instant) {
        let mut entries = std::mem::take(&mut self.heap).into_vec();
        for entry in &mut entries {
            entry.rescore(now, self.boost_rate);
        }
        self.heap = BinaryHeap::from(entries);
    }

    /// Pop the best entry as of `now`.
    pub fn pop_at(&mut self, now: Instant) -> Option<PrioritizedItem<T>> {
        if self.heap.is_empty() {
            return None;
        }
        self.refresh(now);
        self.heap.pop()
    }

    pub fn pop(&mut self) -> Option<T> {
        self.pop_at(Instant::now()).map(|p| p.item)
    }

    /// Head item and its score as of `now`, without removing it.
    pub fn peek_at(&mut self, now: Instant) -> Option<(&T, f64)> {
        if self.heap.is_empty() {
            return None;
        }
        self.refresh(now);
        self.heap.peek().map(|p| (&p.item, p.score))
    }

    /// Remove every entry, best first.
    pub fn drain_ordered(&mut self, now: Instant) -> Vec<T> {
        self.refresh(now);
        let mut out = Vec::with_capacity(self.heap.len());
        while let Some(entry) = self.heap.pop() {
            out.push(entry.item);
        }
        out
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl<T> Default for AgingPriorityQueue<T> {
    fn default() -> Self {
        Self::new(DEFAULT_BOOST_RATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_matches_formula() {
        let s = aging_score(1.0, Duration::from_secs(8), 0.5);
        assert!((s - -5.0).abs() < 1e-9);
        assert!((aging_score(4.0, Duration::ZERO, 0.5) - -4.0).abs() < 1e-9);
    }

    #[test]
    fn higher_base_pops_first_at_same_age() {
        let now = Instant::now();
        let mut q = AgingPriorityQueue::default();
        q.push("free", 1.0, now);
        q.push("enterprise", 4.0, now);
        q.push("basic", 2.0, now);
        q.push("pro", 3.0, now);

        let order: Vec<_> = std::iter::from_fn(|| q.pop_at(now).map(|p| p.item)).collect();
        assert_eq!(order, vec!["enterprise", "pro", "basic", "free"]);
    }

    #[test]
    fn fifo_within_same_base_and_age() {
        let now = Instant::now();
        let mut q = AgingPriorityQueue::default();
        q.push("first", 2.0, now);
        q.push("second", 2.0, now);
        q.push("third", 2.0, now);

        assert_eq!(q.pop_at(now).unwrap().item, "first");
        assert_eq!(q.pop_at(now).unwrap().item, "second");
        assert_eq!(q.pop_at(now).unwrap().item, "third");
    }

    #[test]
    fn waiting_entry_overtakes_fresh_high_priority() {
        let t0 = Instant::now();
        let t8 = t0 + Duration::from_secs(8);
        let mut q = AgingPriorityQueue::default();
        q.push("free", 1.0, t0);
        q.push("enterprise", 4.0, t8);

        let head = q.pop_at(t8).unwrap();
        assert_eq!(head.item, "free");
        assert!((head.score - -5.0).abs() < 1e-6);
    }

    #[test]
    fn late_arrival_is_ranked_against_current_ages() {
        let t0 = Instant::now();
        let t7 = t0 + Duration::from_secs(7);
        let mut q = AgingPriorityQueue::default();
        q.push("free", 1.0, t0);
        q.push("pro", 3.0, t0);
        q.push("enterprise", 4.0, t7);

        // At 7s: pro -6.5, free -4.5, enterprise -4.0.
        let order: Vec<_> = std::iter::from_fn(|| q.pop_at(t7).map(|p| p.item)).collect();
        assert_eq!(order, vec!["pro", "free", "enterprise"]);
    }

    #[test]
    fn drain_returns_all_in_order() {
        let now = Instant::now();
        let mut q = AgingPriorityQueue::default();
        q.push(1, 1.0, now);
        q.push(2, 2.0, now);
        assert_eq!(q.drain_ordered(now), vec![2, 1]);
        assert!(q.is_empty());
    }
}
