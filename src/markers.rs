//! Homologous marker families and their loci
//!
//! This module provides the marker-family input format used by the
//! reconstruction pipeline: one family per block, a `>id` header followed by
//! one locus per line (`species.chromosome:start-end strand`). Families are
//! doubled into head/tail extremities before any adjacency work.

use log::warn;
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader, Error as IoError, Write};
use std::num::ParseIntError;

#[derive(Debug)]
pub enum MarkerParseErr {
    MissingFamilyHeader(usize),
    InvalidFamilyId(usize, ParseIntError),
    InvalidLocus(usize, String),
    InvalidStrand(usize, String),
    IoError(IoError),
}

impl std::fmt::Display for MarkerParseErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarkerParseErr::MissingFamilyHeader(line) => {
                write!(f, "Line {}: locus found before any '>' family header", line)
            }
            MarkerParseErr::InvalidFamilyId(line, e) => {
                write!(f, "Line {}: invalid family id: {}", line, e)
            }
            MarkerParseErr::InvalidLocus(line, text) => {
                write!(f, "Line {}: invalid locus '{}'", line, text)
            }
            MarkerParseErr::InvalidStrand(line, text) => {
                write!(f, "Line {}: invalid strand '{}'", line, text)
            }
            MarkerParseErr::IoError(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for MarkerParseErr {}

impl From<IoError> for MarkerParseErr {
    fn from(e: IoError) -> Self {
        MarkerParseErr::IoError(e)
    }
}

/// Which end of a marker an extremity names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum End {
    Head,
    Tail,
}

/// One oriented end of a marker; the atomic unit adjacencies connect.
///
/// Doubling a family `m` yields the two extremities `m_h` and `m_t`. An
/// extremity belongs to exactly one marker and one end, and may appear in at
/// most one selected interval at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Extremity {
    pub marker: u32,
    pub end: End,
}

impl Extremity {
    pub fn head(marker: u32) -> Self {
        Extremity {
            marker,
            end: End::Head,
        }
    }

    pub fn tail(marker: u32) -> Self {
        Extremity {
            marker,
            end: End::Tail,
        }
    }

    /// The other end of the same marker.
    pub fn mate(&self) -> Self {
        Extremity {
            marker: self.marker,
            end: match self.end {
                End::Head => End::Tail,
                End::Tail => End::Head,
            },
        }
    }
}

impl std::fmt::Display for Extremity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let end = match self.end {
            End::Head => 'h',
            End::Tail => 't',
        };
        write!(f, "{}_{}", self.marker, end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strand {
    Forward,
    Reverse,
}

/// One occurrence of a marker in one species' genome.
#[derive(Debug, Clone, PartialEq)]
pub struct Locus {
    pub species: String,
    pub chromosome: String,
    pub start: i64,
    pub end: i64,
    pub strand: Strand,
}

/// A homologous family: a marker identity shared across species, possibly
/// occurring several times within one genome (copy number > 1).
#[derive(Debug, Clone)]
pub struct HomFam {
    pub id: u32,
    pub loci: Vec<Locus>,
}

impl HomFam {
    /// Maximum number of occurrences of this marker in any one species.
    pub fn copy_number(&self) -> u32 {
        let mut per_species: FxHashMap<&str, u32> = FxHashMap::default();
        for locus in &self.loci {
            *per_species.entry(locus.species.as_str()).or_insert(0) += 1;
        }
        per_species.values().copied().max().unwrap_or(0)
    }
}

/// Parse a single locus line (`species.chromosome:start-end strand`).
fn parse_locus_line(line: &str, line_number: usize) -> Result<Locus, MarkerParseErr> {
    let invalid = || MarkerParseErr::InvalidLocus(line_number, line.to_string());

    let (location, strand_text) = line.rsplit_once(char::is_whitespace).ok_or_else(invalid)?;
    let strand = match strand_text.trim() {
        "+" => Strand::Forward,
        "-" => Strand::Reverse,
        other => return Err(MarkerParseErr::InvalidStrand(line_number, other.to_string())),
    };

    // The chromosome name may itself contain dots, so the species is
    // everything before the first one.
    let (species, rest) = location.trim().split_once('.').ok_or_else(invalid)?;
    let (chromosome, range) = rest.rsplit_once(':').ok_or_else(invalid)?;
    let (start_text, end_text) = range.split_once('-').ok_or_else(invalid)?;

    let start = start_text.parse::<i64>().map_err(|_| invalid())?;
    let end = end_text.parse::<i64>().map_err(|_| invalid())?;

    Ok(Locus {
        species: species.to_string(),
        chromosome: chromosome.to_string(),
        start,
        end,
        strand,
    })
}

/// Parse a homologous-families stream into a family list.
pub fn parse_hom_fams<R: BufRead>(reader: R) -> Result<Vec<HomFam>, MarkerParseErr> {
    let mut hom_fams: Vec<HomFam> = Vec::new();
    let mut current: Option<HomFam> = None;

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line_number = index + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        if let Some(id_text) = trimmed.strip_prefix('>') {
            if let Some(fam) = current.take() {
                hom_fams.push(fam);
            }
            let id = id_text
                .trim()
                .parse::<u32>()
                .map_err(|e| MarkerParseErr::InvalidFamilyId(line_number, e))?;
            current = Some(HomFam {
                id,
                loci: Vec::new(),
            });
        } else {
            let locus = parse_locus_line(trimmed, line_number)?;
            match current.as_mut() {
                Some(fam) => fam.loci.push(locus),
                None => return Err(MarkerParseErr::MissingFamilyHeader(line_number)),
            }
        }
    }
    if let Some(fam) = current.take() {
        hom_fams.push(fam);
    }

    Ok(hom_fams)
}

/// Read a homologous-families file from disk.
pub fn read_hom_fams(path: &str) -> std::io::Result<Vec<HomFam>> {
    let file = File::open(path).map_err(|e| {
        IoError::new(
            std::io::ErrorKind::NotFound,
            format!("Failed to open homologous families file '{}': {}", path, e),
        )
    })?;
    parse_hom_fams(BufReader::new(file)).map_err(|e| {
        IoError::new(
            std::io::ErrorKind::InvalidData,
            format!("Failed to parse homologous families file '{}': {}", path, e),
        )
    })
}

/// All species named by any locus in the family list.
pub fn species_set(hom_fams: &[HomFam]) -> BTreeSet<String> {
    hom_fams
        .iter()
        .flat_map(|fam| fam.loci.iter().map(|locus| locus.species.clone()))
        .collect()
}

/// Parse a species-pairs stream (`species1 species2`, one pair per line).
///
/// Comment lines are skipped. Malformed lines and pairs naming a species
/// absent from the family list are reported and dropped rather than aborting
/// the run.
pub fn parse_species_pairs<R: BufRead>(
    reader: R,
    species: &BTreeSet<String>,
) -> std::io::Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line_number = index + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        if fields.len() != 2 {
            warn!(
                "Line {}: expected exactly one species pair, got '{}'",
                line_number, trimmed
            );
            continue;
        }
        if let Some(unknown) = fields.iter().find(|name| !species.contains(**name)) {
            warn!(
                "Line {}: species '{}' is not listed in the homologous families file",
                line_number, unknown
            );
            continue;
        }

        pairs.push((fields[0].to_string(), fields[1].to_string()));
    }

    Ok(pairs)
}

/// Read a species-pairs file from disk.
pub fn read_species_pairs(
    path: &str,
    species: &BTreeSet<String>,
) -> std::io::Result<Vec<(String, String)>> {
    let file = File::open(path).map_err(|e| {
        IoError::new(
            std::io::ErrorKind::NotFound,
            format!("Failed to open species pairs file '{}': {}", path, e),
        )
    })?;
    parse_species_pairs(BufReader::new(file), species)
}

/// Drop the families whose ids appear in `drop_ids`.
pub fn filter_by_id(hom_fams: Vec<HomFam>, drop_ids: &[u32]) -> Vec<HomFam> {
    let before = hom_fams.len();
    let kept: Vec<HomFam> = hom_fams
        .into_iter()
        .filter(|fam| !drop_ids.contains(&fam.id))
        .collect();
    if kept.len() != before {
        warn!("Filtered {} families by id", before - kept.len());
    }
    kept
}

/// Drop the families whose copy number exceeds `threshold`.
pub fn filter_by_copy_number(hom_fams: Vec<HomFam>, threshold: u32) -> Vec<HomFam> {
    hom_fams
        .into_iter()
        .filter(|fam| fam.copy_number() <= threshold)
        .collect()
}

/// True when some family occurs more than once within one species, which
/// decides the optimization strategy.
pub fn has_repeats(hom_fams: &[HomFam]) -> bool {
    hom_fams.iter().any(|fam| fam.copy_number() > 1)
}

/// Marker ids of the families with copy number > 1.
pub fn repeated_markers(hom_fams: &[HomFam]) -> rustc_hash::FxHashSet<u32> {
    hom_fams
        .iter()
        .filter(|fam| fam.copy_number() > 1)
        .map(|fam| fam.id)
        .collect()
}

/// Write a family list in the same format `parse_hom_fams` reads.
pub fn write_hom_fams<W: Write>(writer: &mut W, hom_fams: &[HomFam]) -> std::io::Result<()> {
    for fam in hom_fams {
        writeln!(writer, ">{}", fam.id)?;
        for locus in &fam.loci {
            let strand = match locus.strand {
                Strand::Forward => '+',
                Strand::Reverse => '-',
            };
            writeln!(
                writer,
                "{}.{}:{}-{} {}",
                locus.species, locus.chromosome, locus.start, locus.end, strand
            )?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAMILIES: &str = "\
# two species, marker 5 repeated in mouse
>1
human.chr1:100-200 +
mouse.chr2:400-500 -
>2
human.chr1:300-400 +
mouse.chr2:100-200 +
>5
human.chr1:500-600 +
mouse.chr2:600-700 +
mouse.chr2:800-900 -
";

    #[test]
    fn test_parse_hom_fams() {
        let hom_fams = parse_hom_fams(FAMILIES.as_bytes()).unwrap();
        assert_eq!(hom_fams.len(), 3);
        assert_eq!(hom_fams[0].id, 1);
        assert_eq!(hom_fams[0].loci.len(), 2);
        assert_eq!(hom_fams[0].loci[1].species, "mouse");
        assert_eq!(hom_fams[0].loci[1].chromosome, "chr2");
        assert_eq!(hom_fams[0].loci[1].strand, Strand::Reverse);
        assert_eq!(hom_fams[2].loci[2].start, 800);
    }

    #[test]
    fn test_copy_number_and_repeats() {
        let hom_fams = parse_hom_fams(FAMILIES.as_bytes()).unwrap();
        assert_eq!(hom_fams[0].copy_number(), 1);
        assert_eq!(hom_fams[2].copy_number(), 2);
        assert!(has_repeats(&hom_fams));
        let repeated = repeated_markers(&hom_fams);
        assert!(repeated.contains(&5));
        assert!(!repeated.contains(&1));
    }

    #[test]
    fn test_parse_rejects_headerless_locus() {
        let result = parse_hom_fams("human.chr1:1-2 +\n".as_bytes());
        assert!(matches!(result, Err(MarkerParseErr::MissingFamilyHeader(1))));
    }

    #[test]
    fn test_parse_rejects_bad_strand() {
        let result = parse_hom_fams(">1\nhuman.chr1:1-2 ?\n".as_bytes());
        assert!(matches!(result, Err(MarkerParseErr::InvalidStrand(2, _))));
    }

    #[test]
    fn test_chromosome_names_may_contain_dots() {
        let hom_fams = parse_hom_fams(">3\nyeast.chrV.2:10-20 +\n".as_bytes()).unwrap();
        assert_eq!(hom_fams[0].loci[0].species, "yeast");
        assert_eq!(hom_fams[0].loci[0].chromosome, "chrV.2");
    }

    #[test]
    fn test_species_pairs_skip_bad_lines() {
        let hom_fams = parse_hom_fams(FAMILIES.as_bytes()).unwrap();
        let species = species_set(&hom_fams);
        let pairs = parse_species_pairs(
            "# comment\nhuman mouse\nhuman rat\nhuman\nmouse human\n".as_bytes(),
            &species,
        )
        .unwrap();
        assert_eq!(
            pairs,
            vec![
                ("human".to_string(), "mouse".to_string()),
                ("mouse".to_string(), "human".to_string()),
            ]
        );
    }

    #[test]
    fn test_filters() {
        let hom_fams = parse_hom_fams(FAMILIES.as_bytes()).unwrap();
        let kept = filter_by_id(hom_fams.clone(), &[2]);
        assert_eq!(kept.iter().map(|f| f.id).collect::<Vec<_>>(), vec![1, 5]);

        let kept = filter_by_copy_number(hom_fams, 1);
        assert_eq!(kept.iter().map(|f| f.id).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_hom_fams_round_trip() {
        let hom_fams = parse_hom_fams(FAMILIES.as_bytes()).unwrap();
        let mut buffer = Vec::new();
        write_hom_fams(&mut buffer, &hom_fams).unwrap();
        let reparsed = parse_hom_fams(buffer.as_slice()).unwrap();
        assert_eq!(reparsed.len(), hom_fams.len());
        assert_eq!(reparsed[2].loci, hom_fams[2].loci);
    }

    #[test]
    fn test_extremity_mate() {
        assert_eq!(Extremity::head(7).mate(), Extremity::tail(7));
        assert_eq!(Extremity::tail(7).mate(), Extremity::head(7));
    }
}
