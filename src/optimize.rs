//! Maximum-weight selection of mutually compatible intervals
//!
//! Both optimization strategies frame the problem the same way: commit a
//! subset of candidate intervals such that no extremity is reused (degree at
//! most one per extremity), maximizing total weight. The strategy is chosen
//! from the copy-number profile of the family list; both return the same
//! selection shape so the assembler is agnostic to which one ran.

use crate::intervals::{IntervalKey, IntervalSet};
use crate::markers::{Extremity, HomFam};
use log::debug;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverChoice {
    /// Every family has copy number at most one; an exact consistency
    /// respecting selection is possible.
    ExactC1p,
    /// Some family is repeated; fall back to the repeat-aware matching
    /// heuristic.
    MaxWeightMatching,
}

/// Decide the optimization strategy from the copy-number profile.
pub fn choose_solver(hom_fams: &[HomFam]) -> SolverChoice {
    if crate::markers::has_repeats(hom_fams) {
        SolverChoice::MaxWeightMatching
    } else {
        SolverChoice::ExactC1p
    }
}

/// A maximal set of markers whose repeated copies prevent a deterministic
/// adjacency choice. Rendered as an `RC<n>` token during assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepeatCluster {
    ids: BTreeSet<u32>,
}

impl RepeatCluster {
    pub fn from_ids(ids: impl IntoIterator<Item = u32>) -> Self {
        RepeatCluster {
            ids: ids.into_iter().collect(),
        }
    }

    pub fn contains(&self, marker: u32) -> bool {
        self.ids.contains(&marker)
    }

    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.ids.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Display form used by the `#RC` blocks of the ancestor genome artifact.
    pub fn display_string(&self) -> String {
        let ids: Vec<String> = self.ids.iter().map(|id| id.to_string()).collect();
        ids.join(" ")
    }
}

#[derive(Debug)]
pub struct AdjacencySelection {
    pub realizable: IntervalSet,
    pub discarded: IntervalSet,
    pub repeat_clusters: Vec<RepeatCluster>,
}

#[derive(Debug)]
pub struct RsiSelection {
    pub realizable: IntervalSet,
    pub discarded: IntervalSet,
}

/// Adjacency selection strategy. The exact solver and the matching heuristic
/// are interchangeable from the assembler's point of view: both consume the
/// raw candidate collection read-only and build fresh output collections.
pub trait AdjacencySolver {
    fn name(&self) -> &'static str;
    fn select(&self, hom_fams: &[HomFam], adjacencies: &IntervalSet) -> AdjacencySelection;
}

/// Repeat-aware greedy maximum-weight matching.
pub struct MaxWeightMatching;

impl AdjacencySolver for MaxWeightMatching {
    fn name(&self) -> &'static str {
        "max-weight matching"
    }

    fn select(&self, hom_fams: &[HomFam], adjacencies: &IntervalSet) -> AdjacencySelection {
        opt_adjacencies(hom_fams, adjacencies)
    }
}

/// Selection for the uniform copy-number profile. With every family unique,
/// any degree-constrained selection forms plain paths and cycles, so the
/// ranked greedy commit is already globally consistent and no repeat
/// clusters can arise.
pub struct ExactC1p;

impl AdjacencySolver for ExactC1p {
    fn name(&self) -> &'static str {
        "exact C1P"
    }

    fn select(&self, _hom_fams: &[HomFam], adjacencies: &IntervalSet) -> AdjacencySelection {
        let mut used: FxHashSet<Extremity> = FxHashSet::default();
        let mut realizable = IntervalSet::new();

        for interval in adjacencies.ranked() {
            let (a, b) = interval.endpoints();
            if !used.contains(&a) && !used.contains(&b) {
                used.insert(a);
                used.insert(b);
                realizable.insert(interval.clone());
            }
        }

        let discarded = partition_remainder(adjacencies, &realizable);
        AdjacencySelection {
            realizable,
            discarded,
            repeat_clusters: Vec::new(),
        }
    }
}

pub fn solver_for(choice: SolverChoice) -> Box<dyn AdjacencySolver> {
    match choice {
        SolverChoice::ExactC1p => Box::new(ExactC1p),
        SolverChoice::MaxWeightMatching => Box::new(MaxWeightMatching),
    }
}

/// Everything in `candidates` whose marker content did not make it into
/// `selected`. Always a fresh collection; the source is never mutated.
fn partition_remainder(candidates: &IntervalSet, selected: &IntervalSet) -> IntervalSet {
    let mut discarded = IntervalSet::new();
    for interval in candidates.iter() {
        if !selected.contains_run(interval.run()) {
            discarded.insert(interval.clone());
        }
    }
    discarded
}

/// Union-find over repeated marker ids, used to grow repeat clusters out of
/// selection conflicts.
struct ClusterForest {
    parent: FxHashMap<u32, u32>,
}

impl ClusterForest {
    fn new() -> Self {
        ClusterForest {
            parent: FxHashMap::default(),
        }
    }

    fn find(&mut self, id: u32) -> u32 {
        let parent = *self.parent.entry(id).or_insert(id);
        if parent == id {
            return id;
        }
        let root = self.find(parent);
        self.parent.insert(id, root);
        root
    }

    fn union(&mut self, a: u32, b: u32) {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a != root_b {
            // smaller root wins so cluster numbering is stable
            let (low, high) = if root_a < root_b {
                (root_a, root_b)
            } else {
                (root_b, root_a)
            };
            self.parent.insert(high, low);
        }
    }

    fn clusters(&mut self) -> Vec<RepeatCluster> {
        let ids: Vec<u32> = self.parent.keys().copied().collect();
        let mut grouped: FxHashMap<u32, BTreeSet<u32>> = FxHashMap::default();
        for id in ids {
            let root = self.find(id);
            grouped.entry(root).or_default().insert(id);
        }
        let mut roots: Vec<u32> = grouped.keys().copied().collect();
        roots.sort();
        roots
            .into_iter()
            .map(|root| RepeatCluster {
                ids: grouped.remove(&root).unwrap(),
            })
            .collect()
    }
}

/// Greedy maximum-weight matching over candidate adjacencies.
///
/// Candidates are ranked by weight descending with key order breaking ties,
/// then committed unless an endpoint extremity is already taken. A skipped
/// candidate is not dropped silently: its repeated endpoint markers, together
/// with the repeated markers of the selected intervals blocking it, are
/// grouped into a repeat cluster for the assembler to resolve.
pub fn opt_adjacencies(hom_fams: &[HomFam], adjacencies: &IntervalSet) -> AdjacencySelection {
    let repeated = crate::markers::repeated_markers(hom_fams);

    let mut used: FxHashMap<Extremity, IntervalKey> = FxHashMap::default();
    let mut realizable = IntervalSet::new();
    let mut forest = ClusterForest::new();

    for interval in adjacencies.ranked() {
        let (a, b) = interval.endpoints();
        if !used.contains_key(&a) && !used.contains_key(&b) {
            used.insert(a, interval.key());
            used.insert(b, interval.key());
            realizable.insert(interval.clone());
            continue;
        }

        // conflict: group the repeated markers of the loser and of the
        // already-committed winners blocking it
        let mut conflicted: Vec<u32> = interval
            .marker_ids()
            .into_iter()
            .filter(|id| repeated.contains(id))
            .collect();
        for endpoint in [a, b] {
            if let Some(winner_key) = used.get(&endpoint) {
                if let Some(winner) = realizable.get(winner_key) {
                    conflicted.extend(
                        winner
                            .marker_ids()
                            .into_iter()
                            .filter(|id| repeated.contains(id)),
                    );
                }
            }
        }
        if let Some(&first) = conflicted.first() {
            for &other in &conflicted[1..] {
                forest.union(first, other);
            }
            forest.find(first);
        }
    }

    let repeat_clusters = forest.clusters();
    let discarded = partition_remainder(adjacencies, &realizable);
    debug!(
        "Selected {} of {} adjacencies, {} repeat clusters",
        realizable.len(),
        adjacencies.len(),
        repeat_clusters.len()
    );

    AdjacencySelection {
        realizable,
        discarded,
        repeat_clusters,
    }
}

/// Greedy RSI selection, run after the adjacency selection is final.
///
/// An RSI is committed unless (a) one of its endpoint extremities is already
/// taken by a selected adjacency or RSI, or (b) its interior markers overlap
/// an RSI committed earlier in rank order.
pub fn opt_rsis_greedy(
    realizable_adjacencies: &IntervalSet,
    rsis: &IntervalSet,
) -> RsiSelection {
    let mut used: FxHashSet<Extremity> = FxHashSet::default();
    for interval in realizable_adjacencies.iter() {
        let (a, b) = interval.endpoints();
        used.insert(a);
        used.insert(b);
    }

    let mut claimed_interiors: FxHashSet<u32> = FxHashSet::default();
    let mut realizable = IntervalSet::new();

    for rsi in rsis.ranked() {
        let (a, b) = rsi.endpoints();
        if used.contains(&a) || used.contains(&b) {
            continue;
        }
        let interior: Vec<u32> = rsi
            .marker_ids()
            .into_iter()
            .filter(|&id| id != a.marker && id != b.marker)
            .collect();
        if interior.iter().any(|id| claimed_interiors.contains(id)) {
            continue;
        }

        used.insert(a);
        used.insert(b);
        claimed_interiors.extend(interior);
        realizable.insert(rsi.clone());
    }

    let discarded = partition_remainder(rsis, &realizable);
    debug!("Selected {} of {} RSIs", realizable.len(), rsis.len());

    RsiSelection {
        realizable,
        discarded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intervals::Interval;
    use crate::markers::{parse_hom_fams, Extremity};

    fn unique_fams(ids: &[u32]) -> Vec<HomFam> {
        let mut text = String::new();
        for (position, id) in ids.iter().enumerate() {
            text.push_str(&format!(
                ">{}\nA.chr1:{}-{} +\n",
                id,
                position * 100,
                position * 100 + 50
            ));
        }
        parse_hom_fams(text.as_bytes()).unwrap()
    }

    fn set_of(entries: &[(Extremity, Extremity, u64)]) -> IntervalSet {
        let mut set = IntervalSet::new();
        for &(a, b, weight) in entries {
            for _ in 0..weight {
                set.insert(Interval::adjacency(a, b));
            }
        }
        set
    }

    #[test]
    fn test_choose_solver() {
        let uniform = unique_fams(&[1, 2, 3]);
        assert_eq!(choose_solver(&uniform), SolverChoice::ExactC1p);

        let repeated = parse_hom_fams(
            ">1\nA.chr1:1-2 +\n>5\nA.chr1:10-20 +\nA.chr1:30-40 +\n".as_bytes(),
        )
        .unwrap();
        assert_eq!(choose_solver(&repeated), SolverChoice::MaxWeightMatching);
    }

    #[test]
    fn test_degree_invariant_and_partition() {
        let hom_fams = unique_fams(&[1, 2, 3]);
        let candidates = set_of(&[
            (Extremity::tail(1), Extremity::head(2), 2),
            (Extremity::tail(1), Extremity::head(3), 1),
            (Extremity::tail(2), Extremity::head(3), 1),
        ]);

        let selection = opt_adjacencies(&hom_fams, &candidates);

        // no extremity appears in more than one selected adjacency
        let mut seen = FxHashSet::default();
        for interval in selection.realizable.iter() {
            let (a, b) = interval.endpoints();
            assert!(seen.insert(a));
            assert!(seen.insert(b));
        }

        // realizable and discarded partition the candidates
        assert_eq!(
            selection.realizable.len() + selection.discarded.len(),
            candidates.len()
        );
        for interval in candidates.iter() {
            let in_realizable = selection.realizable.contains_run(interval.run());
            let in_discarded = selection.discarded.contains_run(interval.run());
            assert!(in_realizable ^ in_discarded);
        }

        // greedy bound: at least the single best candidate, at most the sum
        let best = candidates.ranked()[0].weight();
        assert!(selection.realizable.total_weight() >= best);
        assert!(selection.realizable.total_weight() <= candidates.total_weight());
    }

    #[test]
    fn test_highest_weight_wins() {
        let hom_fams = unique_fams(&[1, 2, 3]);
        let candidates = set_of(&[
            (Extremity::tail(1), Extremity::head(2), 1),
            (Extremity::tail(1), Extremity::head(3), 3),
        ]);

        let selection = opt_adjacencies(&hom_fams, &candidates);
        assert!(selection
            .realizable
            .contains_key(&(Extremity::tail(1), Extremity::head(3))));
        assert!(selection
            .discarded
            .contains_key(&(Extremity::tail(1), Extremity::head(2))));
    }

    #[test]
    fn test_conflicting_repeats_form_a_cluster() {
        let hom_fams = parse_hom_fams(
            "\
>1
A.chr1:100-200 +
>2
A.chr1:900-950 +
>5
A.chr1:300-400 +
A.chr1:500-600 +
>7
A.chr1:700-800 +
A.chr1:850-880 +
"
            .as_bytes(),
        )
        .unwrap();
        // both repeated markers fight over 1_t
        let candidates = set_of(&[
            (Extremity::tail(1), Extremity::head(5), 2),
            (Extremity::tail(1), Extremity::head(7), 1),
            (Extremity::tail(5), Extremity::head(7), 1),
        ]);

        let selection = opt_adjacencies(&hom_fams, &candidates);
        assert_eq!(selection.repeat_clusters.len(), 1);
        let cluster = &selection.repeat_clusters[0];
        assert!(cluster.contains(5));
        assert!(cluster.contains(7));
        assert_eq!(cluster.display_string(), "5 7");
    }

    #[test]
    fn test_uniform_conflicts_make_no_clusters() {
        let hom_fams = unique_fams(&[1, 2, 3]);
        let candidates = set_of(&[
            (Extremity::tail(1), Extremity::head(2), 1),
            (Extremity::tail(1), Extremity::head(3), 1),
        ]);
        let selection = opt_adjacencies(&hom_fams, &candidates);
        assert!(selection.repeat_clusters.is_empty());
    }

    #[test]
    fn test_exact_c1p_matches_selection_shape() {
        let hom_fams = unique_fams(&[1, 2, 3]);
        let candidates = set_of(&[
            (Extremity::tail(1), Extremity::head(2), 1),
            (Extremity::tail(1), Extremity::head(3), 1),
            (Extremity::tail(2), Extremity::head(3), 1),
        ]);

        let solver = solver_for(SolverChoice::ExactC1p);
        let selection = solver.select(&hom_fams, &candidates);
        assert!(selection.repeat_clusters.is_empty());
        // ties break by key order: (1t,2h) then (2t,3h)
        assert!(selection
            .realizable
            .contains_key(&(Extremity::tail(1), Extremity::head(2))));
        assert!(selection
            .realizable
            .contains_key(&(Extremity::tail(2), Extremity::head(3))));
        assert_eq!(selection.discarded.len(), 1);
    }

    #[test]
    fn test_rsi_selection_respects_adjacencies() {
        let mut adjacencies = IntervalSet::new();
        adjacencies.insert(Interval::adjacency(
            Extremity::tail(1),
            Extremity::head(5),
        ));

        let mut rsis = IntervalSet::new();
        // endpoint 1_t is taken by the adjacency above
        rsis.insert(Interval::chain(vec![
            Extremity::tail(1),
            Extremity::head(5),
            Extremity::tail(5),
            Extremity::head(2),
        ]));
        // this one is free
        rsis.insert(Interval::chain(vec![
            Extremity::tail(2),
            Extremity::head(7),
            Extremity::tail(7),
            Extremity::head(3),
        ]));

        let selection = opt_rsis_greedy(&adjacencies, &rsis);
        assert_eq!(selection.realizable.len(), 1);
        assert!(selection
            .realizable
            .contains_key(&(Extremity::tail(2), Extremity::head(3))));
        assert_eq!(selection.discarded.len(), 1);
    }

    #[test]
    fn test_rsi_selection_rejects_interior_overlap() {
        let adjacencies = IntervalSet::new();

        let mut rsis = IntervalSet::new();
        let winner = Interval::chain(vec![
            Extremity::tail(1),
            Extremity::head(5),
            Extremity::tail(5),
            Extremity::head(2),
        ]);
        // make the first RSI heavier so rank order is unambiguous
        rsis.insert(winner.clone());
        rsis.insert(winner);
        rsis.insert(Interval::chain(vec![
            Extremity::tail(3),
            Extremity::head(5),
            Extremity::tail(5),
            Extremity::head(4),
        ]));

        let selection = opt_rsis_greedy(&adjacencies, &rsis);
        assert_eq!(selection.realizable.len(), 1);
        assert!(selection
            .realizable
            .contains_key(&(Extremity::tail(1), Extremity::head(2))));
    }
}
