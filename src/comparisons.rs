//! Pairwise genome comparison
//!
//! Derives candidate adjacencies and repeat spanning intervals (RSIs) from
//! one species pair at a time, then aggregates support across all pairs.
//! Comparisons are independent across pairs and run on the rayon pool; the
//! fan-in merge is ordered by pair index so results are reproducible.

use crate::genomes::Genome;
use crate::intervals::{Interval, IntervalKey, IntervalSet};
use crate::markers::Extremity;
use log::debug;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};

/// Canonical adjacency keys observed in a genome.
fn genome_adjacencies(genome: &Genome) -> FxHashSet<IntervalKey> {
    genome
        .neighbor_pairs()
        .map(|(a, b)| Interval::adjacency(a, b).key())
        .collect()
}

/// Marker ids occurring anywhere in a genome.
fn genome_markers(genome: &Genome) -> FxHashSet<u32> {
    genome
        .chromosomes
        .iter()
        .flat_map(|(_, extremities)| extremities.iter().map(|e| e.marker))
        .collect()
}

/// An adjacency is consistent with a genome when the genome either lacks one
/// of the endpoint markers or realizes the adjacency somewhere.
fn consistent_with(
    key: &IntervalKey,
    adjacencies: &FxHashSet<IntervalKey>,
    markers: &FxHashSet<u32>,
) -> bool {
    !markers.contains(&key.0.marker) || !markers.contains(&key.1.marker) || adjacencies.contains(key)
}

/// Propose candidate adjacencies from one species pair.
///
/// Lenient mode (`all_match == false`) proposes the union of both genomes'
/// neighbor pairs: one-sided evidence is enough, which matters when marker
/// copy numbers differ between the two genomes. Strict mode keeps only
/// proposals consistent with every genome that carries both endpoint markers.
pub fn find_adjacencies(a: &Genome, b: &Genome, all_match: bool) -> IntervalSet {
    let adjacencies_a = genome_adjacencies(a);
    let adjacencies_b = genome_adjacencies(b);

    let mut keys: Vec<IntervalKey> = adjacencies_a.union(&adjacencies_b).copied().collect();
    keys.sort();

    let mut proposals = IntervalSet::new();
    if all_match {
        let markers_a = genome_markers(a);
        let markers_b = genome_markers(b);
        for key in keys {
            if consistent_with(&key, &adjacencies_a, &markers_a)
                && consistent_with(&key, &adjacencies_b, &markers_b)
            {
                proposals.insert(Interval::adjacency(key.0, key.1));
            }
        }
    } else {
        for key in keys {
            proposals.insert(Interval::adjacency(key.0, key.1));
        }
    }
    proposals
}

/// Canonical RSI runs observed in a genome: maximal runs whose interior
/// occurrences are all repeated markers, bounded on both sides by a
/// non-repeated marker. The run spans the inner extremity of the left bound
/// through the inner extremity of the right bound.
fn genome_rsi_runs(genome: &Genome, repeated: &FxHashSet<u32>) -> Vec<Vec<Extremity>> {
    let mut runs = Vec::new();

    for (_, extremities) in &genome.chromosomes {
        let occurrence_count = extremities.len() / 2;
        let is_repeat =
            |occurrence: usize| repeated.contains(&extremities[occurrence * 2].marker);

        let mut left = 0;
        while left < occurrence_count {
            if is_repeat(left) {
                left += 1;
                continue;
            }
            // find the next non-repeated occurrence past a repeated interior
            let mut right = left + 1;
            while right < occurrence_count && is_repeat(right) {
                right += 1;
            }
            if right < occurrence_count && right > left + 1 {
                let run = extremities[left * 2 + 1..right * 2 + 1].to_vec();
                runs.push(Interval::chain(run).run().to_vec());
            }
            left = right;
        }
    }

    runs
}

/// Propose candidate RSIs from one species pair, under the same strict or
/// lenient policy as `find_adjacencies`: in strict mode a run is dropped if
/// the other genome carries all of its markers but not the run itself.
pub fn find_rsis(
    a: &Genome,
    b: &Genome,
    all_match: bool,
    repeated: &FxHashSet<u32>,
) -> IntervalSet {
    let runs_a = genome_rsi_runs(a, repeated);
    let runs_b = genome_rsi_runs(b, repeated);

    let run_set_a: FxHashSet<&[Extremity]> = runs_a.iter().map(|run| run.as_slice()).collect();
    let run_set_b: FxHashSet<&[Extremity]> = runs_b.iter().map(|run| run.as_slice()).collect();
    let markers_a = genome_markers(a);
    let markers_b = genome_markers(b);

    let mut candidates: Vec<&Vec<Extremity>> = runs_a
        .iter()
        .chain(runs_b.iter())
        .collect::<FxHashSet<_>>()
        .into_iter()
        .collect();
    candidates.sort();

    let mut proposals = IntervalSet::new();
    for run in candidates {
        if all_match {
            let spans = |markers: &FxHashSet<u32>| {
                run.iter().all(|extremity| markers.contains(&extremity.marker))
            };
            let consistent_a = !spans(&markers_a) || run_set_a.contains(run.as_slice());
            let consistent_b = !spans(&markers_b) || run_set_b.contains(run.as_slice());
            if !(consistent_a && consistent_b) {
                continue;
            }
        }
        proposals.insert(Interval::chain(run.clone()));
    }
    proposals
}

/// Fan-in step: merge per-pair proposals into one collection. Each pair
/// contributes each unique interval key once with weight 1, so after the
/// merge an interval's weight is the number of distinct species pairs
/// supporting it.
pub fn set_interval_weights(total: &mut IntervalSet, per_pair: Vec<IntervalSet>) {
    for proposals in per_pair {
        total.merge(proposals);
    }
}

/// Compare every species pair and aggregate candidate adjacencies.
pub fn collect_adjacencies(
    pairs: &[(String, String)],
    genomes: &FxHashMap<String, Genome>,
    all_match: bool,
) -> IntervalSet {
    let per_pair: Vec<IntervalSet> = pairs
        .par_iter()
        .map(|(first, second)| find_adjacencies(&genomes[first], &genomes[second], all_match))
        .collect();

    let mut adjacencies = IntervalSet::new();
    set_interval_weights(&mut adjacencies, per_pair);
    debug!(
        "Aggregated {} candidate adjacencies from {} species pairs",
        adjacencies.len(),
        pairs.len()
    );
    adjacencies
}

/// Compare every species pair and aggregate candidate RSIs.
pub fn collect_rsis(
    pairs: &[(String, String)],
    genomes: &FxHashMap<String, Genome>,
    all_match: bool,
    repeated: &FxHashSet<u32>,
) -> IntervalSet {
    let per_pair: Vec<IntervalSet> = pairs
        .par_iter()
        .map(|(first, second)| find_rsis(&genomes[first], &genomes[second], all_match, repeated))
        .collect();

    let mut rsis = IntervalSet::new();
    set_interval_weights(&mut rsis, per_pair);
    debug!(
        "Aggregated {} candidate RSIs from {} species pairs",
        rsis.len(),
        pairs.len()
    );
    rsis
}
