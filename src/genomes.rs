//! Per-species genomes as ordered chromosomes of marker extremities.

use crate::markers::{Extremity, HomFam, Strand};
use rustc_hash::FxHashMap;

/// One species' genome: chromosomes in natural name order, each an ordered
/// sequence of doubled marker extremities. A forward occurrence of marker `m`
/// contributes `m_h m_t`, a reverse occurrence `m_t m_h`.
#[derive(Debug, Clone)]
pub struct Genome {
    pub species: String,
    pub chromosomes: Vec<(String, Vec<Extremity>)>,
}

impl Genome {
    /// Number of marker occurrences across all chromosomes.
    pub fn marker_count(&self) -> usize {
        self.chromosomes
            .iter()
            .map(|(_, extremities)| extremities.len() / 2)
            .sum()
    }

    /// Extremity pairs that are immediate neighbors in marker order, skipping
    /// the intra-marker head-tail pair of each occurrence.
    pub fn neighbor_pairs(&self) -> impl Iterator<Item = (Extremity, Extremity)> + '_ {
        self.chromosomes.iter().flat_map(|(_, extremities)| {
            (1..extremities.len().saturating_sub(1))
                .step_by(2)
                .map(move |i| (extremities[i], extremities[i + 1]))
        })
    }
}

/// Build one genome per requested species from the family list.
///
/// Occurrences are ordered by start position within each chromosome;
/// chromosomes are ordered by natural name comparison so `chr2` sorts before
/// `chr10`.
pub fn build_genomes(hom_fams: &[HomFam], species: &[String]) -> FxHashMap<String, Genome> {
    let mut genomes = FxHashMap::default();

    for name in species {
        // chromosome -> (start, end, marker id, strand)
        let mut occurrences: FxHashMap<&str, Vec<(i64, i64, u32, Strand)>> = FxHashMap::default();
        for fam in hom_fams {
            for locus in fam.loci.iter().filter(|locus| locus.species == *name) {
                occurrences
                    .entry(locus.chromosome.as_str())
                    .or_default()
                    .push((locus.start, locus.end, fam.id, locus.strand));
            }
        }

        let mut chromosome_names: Vec<&str> = occurrences.keys().copied().collect();
        chromosome_names.sort_by(|a, b| natord::compare(a, b));

        let mut chromosomes = Vec::with_capacity(chromosome_names.len());
        for chromosome in chromosome_names {
            let mut loci = occurrences.remove(chromosome).unwrap();
            loci.sort_by_key(|&(start, end, id, _)| (start, end, id));

            let mut extremities = Vec::with_capacity(loci.len() * 2);
            for (_, _, id, strand) in loci {
                match strand {
                    Strand::Forward => {
                        extremities.push(Extremity::head(id));
                        extremities.push(Extremity::tail(id));
                    }
                    Strand::Reverse => {
                        extremities.push(Extremity::tail(id));
                        extremities.push(Extremity::head(id));
                    }
                }
            }
            chromosomes.push((chromosome.to_string(), extremities));
        }

        genomes.insert(
            name.clone(),
            Genome {
                species: name.clone(),
                chromosomes,
            },
        );
    }

    genomes
}
