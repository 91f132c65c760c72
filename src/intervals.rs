//! Weighted intervals over marker extremities
//!
//! The shared model for adjacencies (extremity pairs) and repeat spanning
//! intervals (ordered extremity chains). Intervals live in keyed collections
//! that merge re-insertions by summing weights, so after the per-pair
//! comparison fan-in an interval's weight is the number of distinct species
//! pairs supporting it.

use crate::markers::Extremity;
use rustc_hash::{FxHashMap, FxHashSet};
use std::fs::File;
use std::io::{self, BufWriter, Write};

/// Sorted endpoint pair; stable identity of an interval within a collection.
pub type IntervalKey = (Extremity, Extremity);

#[derive(Debug, Clone, PartialEq)]
pub struct Interval {
    run: Vec<Extremity>,
    weight: u64,
}

impl Interval {
    /// An adjacency: an unordered pair of extremities observed as neighbors.
    pub fn adjacency(a: Extremity, b: Extremity) -> Self {
        let run = if b < a { vec![b, a] } else { vec![a, b] };
        Interval { run, weight: 1 }
    }

    /// A repeat spanning interval: an ordered extremity chain. The chain is
    /// canonicalized so that a run and its reversal share a key.
    pub fn chain(mut run: Vec<Extremity>) -> Self {
        assert!(run.len() >= 2, "an interval spans at least two extremities");
        if run[run.len() - 1] < run[0] {
            run.reverse();
        }
        Interval { run, weight: 1 }
    }

    pub fn key(&self) -> IntervalKey {
        (self.run[0], self.run[self.run.len() - 1])
    }

    pub fn endpoints(&self) -> (Extremity, Extremity) {
        self.key()
    }

    pub fn run(&self) -> &[Extremity] {
        &self.run
    }

    pub fn weight(&self) -> u64 {
        self.weight
    }

    pub fn is_adjacency(&self) -> bool {
        self.run.len() == 2
    }

    /// Marker ids spanned by the run, duplicates removed, in run order.
    pub fn marker_ids(&self) -> Vec<u32> {
        let mut seen = FxHashSet::default();
        self.run
            .iter()
            .map(|extremity| extremity.marker)
            .filter(|marker| seen.insert(*marker))
            .collect()
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for extremity in &self.run {
            write!(f, "{} ", extremity)?;
        }
        write!(f, "weight {}", self.weight)
    }
}

/// A keyed collection of intervals.
///
/// Insertion merges by key and keeps a running total weight; iteration is
/// deterministic (insertion order), with a separate weight-ranked view for
/// the optimizer. Collections are never back-mutated: realizable and
/// discarded sets are always built fresh from a source collection.
#[derive(Debug, Clone, Default)]
pub struct IntervalSet {
    items: Vec<Interval>,
    by_key: FxHashMap<IntervalKey, usize>,
    touching: FxHashMap<Extremity, Vec<IntervalKey>>,
    contents: FxHashSet<Vec<Extremity>>,
    total_weight: u64,
}

impl IntervalSet {
    pub fn new() -> Self {
        IntervalSet::default()
    }

    /// Insert an interval, merging with an existing one of the same key by
    /// summing weights. The aggregate total weight is kept current in O(1).
    pub fn insert(&mut self, interval: Interval) {
        let key = interval.key();
        self.total_weight += interval.weight;
        match self.by_key.get(&key) {
            Some(&index) => {
                self.items[index].weight += interval.weight;
            }
            None => {
                self.by_key.insert(key, self.items.len());
                self.touching.entry(key.0).or_default().push(key);
                self.touching.entry(key.1).or_default().push(key);
                self.contents.insert(interval.run.clone());
                self.items.push(interval);
            }
        }
    }

    /// Merge another collection into this one, key by key.
    pub fn merge(&mut self, other: IntervalSet) {
        for interval in other.items {
            self.insert(interval);
        }
    }

    pub fn get(&self, key: &IntervalKey) -> Option<&Interval> {
        self.by_key.get(key).map(|&index| &self.items[index])
    }

    pub fn contains_key(&self, key: &IntervalKey) -> bool {
        self.by_key.contains_key(key)
    }

    /// Membership by doubled-marker content (the canonical extremity run);
    /// used to classify realizable versus discarded intervals. Distinguishes
    /// `(1_t, 2_h)` from `(1_h, 2_t)`, which span the same markers but are
    /// different adjacencies.
    pub fn contains_run(&self, run: &[Extremity]) -> bool {
        self.contents.contains(run)
    }

    /// Keys of the intervals touching the given extremity.
    pub fn touching(&self, extremity: Extremity) -> &[IntervalKey] {
        self.touching
            .get(&extremity)
            .map(|keys| keys.as_slice())
            .unwrap_or(&[])
    }

    /// Intervals in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Interval> {
        self.items.iter()
    }

    /// Intervals ranked by weight descending, ties broken by key ascending,
    /// so selection order never depends on insertion order.
    pub fn ranked(&self) -> Vec<&Interval> {
        let mut ranked: Vec<&Interval> = self.items.iter().collect();
        ranked.sort_by(|a, b| b.weight.cmp(&a.weight).then(a.key().cmp(&b.key())));
        ranked
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn total_weight(&self) -> u64 {
        self.total_weight
    }
}

/// Dump a collection to a plain-text artifact, one interval per line.
pub fn write_intervals(set: &IntervalSet, path: &str) -> io::Result<()> {
    let file = File::create(path).map_err(|e| {
        io::Error::new(
            io::ErrorKind::Other,
            format!("Failed to open output file '{}': {}", path, e),
        )
    })?;
    let mut writer = BufWriter::new(file);
    for interval in set.iter() {
        writeln!(writer, "{}", interval)?;
    }
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_merges_by_key() {
        let mut set = IntervalSet::new();
        set.insert(Interval::adjacency(Extremity::tail(1), Extremity::head(2)));
        set.insert(Interval::adjacency(Extremity::head(2), Extremity::tail(1)));
        assert_eq!(set.len(), 1);
        let key = (Extremity::tail(1), Extremity::head(2));
        assert_eq!(set.get(&key).unwrap().weight(), 2);
        assert_eq!(set.total_weight(), 2);
    }

    #[test]
    fn test_chain_canonicalization() {
        let forward = Interval::chain(vec![
            Extremity::tail(1),
            Extremity::head(5),
            Extremity::tail(5),
            Extremity::head(2),
        ]);
        let backward = Interval::chain(vec![
            Extremity::head(2),
            Extremity::tail(5),
            Extremity::head(5),
            Extremity::tail(1),
        ]);
        assert_eq!(forward.key(), backward.key());
        assert_eq!(forward.run(), backward.run());
        assert_eq!(forward.marker_ids(), vec![1, 5, 2]);
    }

    #[test]
    fn test_contains_run() {
        let mut set = IntervalSet::new();
        set.insert(Interval::adjacency(Extremity::tail(1), Extremity::head(2)));
        assert!(set.contains_run(&[Extremity::tail(1), Extremity::head(2)]));
        // same markers, different adjacency
        assert!(!set.contains_run(&[Extremity::head(1), Extremity::tail(2)]));
        assert!(!set.contains_run(&[Extremity::tail(1), Extremity::head(3)]));
    }

    #[test]
    fn test_touching() {
        let mut set = IntervalSet::new();
        set.insert(Interval::adjacency(Extremity::tail(1), Extremity::head(2)));
        set.insert(Interval::adjacency(Extremity::tail(1), Extremity::head(3)));
        assert_eq!(set.touching(Extremity::tail(1)).len(), 2);
        assert_eq!(set.touching(Extremity::head(3)).len(), 1);
        assert!(set.touching(Extremity::head(9)).is_empty());
    }

    #[test]
    fn test_ranked_is_deterministic() {
        let mut set = IntervalSet::new();
        set.insert(Interval::adjacency(Extremity::tail(2), Extremity::head(3)));
        set.insert(Interval::adjacency(Extremity::tail(1), Extremity::head(2)));
        set.insert(Interval::adjacency(Extremity::tail(1), Extremity::head(3)));
        set.insert(Interval::adjacency(Extremity::tail(1), Extremity::head(3)));

        let ranked: Vec<IntervalKey> = set.ranked().iter().map(|i| i.key()).collect();
        // highest weight first, then key order
        assert_eq!(
            ranked,
            vec![
                (Extremity::tail(1), Extremity::head(3)),
                (Extremity::tail(1), Extremity::head(2)),
                (Extremity::tail(2), Extremity::head(3)),
            ]
        );
    }
}
