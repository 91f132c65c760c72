//! Phase orchestration for the reconstruction pipeline
//!
//! Phases run strictly in sequence, each consuming the complete, from then
//! on immutable output of the previous one: parse markers -> build genomes
//! -> compare pairs -> optimize adjacencies -> optimize RSIs -> assemble.
//! Every intermediate collection is dumped as a plain-text artifact under
//! the output directory.

use crate::assembly;
use crate::comparisons;
use crate::genomes::{build_genomes, Genome};
use crate::intervals::{write_intervals, IntervalSet};
use crate::markers::{self, HomFam};
use crate::optimize::{self, SolverChoice};
use log::{info, warn};
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

pub struct ReconstructOpts {
    pub hom_fams_file: String,
    pub species_pairs_file: String,
    pub output_dir: String,
    pub all_match: bool,
    pub filter_copy_number: Option<u32>,
    pub filter_ids: Vec<u32>,
    pub ancestor_name: String,
}

/// Counts reported at the end of a run, also used by the integration tests.
#[derive(Debug)]
pub struct RunSummary {
    pub species: usize,
    pub pairs: usize,
    pub families: usize,
    pub solver: SolverChoice,
    pub adjacencies: usize,
    pub adjacency_weight: u64,
    pub realizable_adjacencies: usize,
    pub rsis: usize,
    pub realizable_rsis: usize,
    pub repeat_clusters: usize,
    pub cars: usize,
    pub audit_findings: usize,
}

fn artifact_path(output_dir: &str, name: &str) -> String {
    Path::new(output_dir)
        .join(name)
        .to_string_lossy()
        .into_owned()
}

fn dump(set: &IntervalSet, output_dir: &str, name: &str) -> io::Result<()> {
    write_intervals(set, &artifact_path(output_dir, name))
}

/// Markers phase: parse inputs, apply filters, decide the solver strategy.
pub fn load_markers(
    opts: &ReconstructOpts,
) -> io::Result<(Vec<HomFam>, Vec<(String, String)>, SolverChoice)> {
    let mut hom_fams = markers::read_hom_fams(&opts.hom_fams_file)?;
    info!("Read {} homologous families", hom_fams.len());

    if !opts.filter_ids.is_empty() {
        hom_fams = markers::filter_by_id(hom_fams, &opts.filter_ids);
    }
    if let Some(threshold) = opts.filter_copy_number {
        let before = hom_fams.len();
        hom_fams = markers::filter_by_copy_number(hom_fams, threshold);
        info!(
            "Filtered {} families with copy number greater than {}",
            before - hom_fams.len(),
            threshold
        );
    }

    let species = markers::species_set(&hom_fams);
    let pairs = markers::read_species_pairs(&opts.species_pairs_file, &species)?;
    info!("Read {} species pairs", pairs.len());

    let solver = optimize::choose_solver(&hom_fams);
    Ok((hom_fams, pairs, solver))
}

/// Build one genome per species that appears in some pair.
fn construct_genomes(
    hom_fams: &[HomFam],
    pairs: &[(String, String)],
) -> FxHashMap<String, Genome> {
    let species: BTreeSet<String> = pairs
        .iter()
        .flat_map(|(a, b)| [a.clone(), b.clone()])
        .collect();
    let species: Vec<String> = species.into_iter().collect();
    let genomes = build_genomes(hom_fams, &species);
    info!("Constructed genomes of {} species", genomes.len());
    genomes
}

/// Run the whole reconstruction and write every artifact under
/// `opts.output_dir`.
pub fn run(opts: &ReconstructOpts) -> io::Result<RunSummary> {
    std::fs::create_dir_all(&opts.output_dir).map_err(|e| {
        io::Error::new(
            e.kind(),
            format!("Failed to create output directory '{}': {}", opts.output_dir, e),
        )
    })?;

    let (hom_fams, pairs, solver) = load_markers(opts)?;
    if pairs.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "No usable species pairs; nothing to compare",
        ));
    }

    let genomes = construct_genomes(&hom_fams, &pairs);

    // adjacency phase
    let adjacencies = comparisons::collect_adjacencies(&pairs, &genomes, opts.all_match);
    info!(
        "Found {} adjacencies with total weight of {}",
        adjacencies.len(),
        adjacencies.total_weight()
    );
    dump(&adjacencies, &opts.output_dir, "adjacencies")?;

    // interval phase
    let repeated = markers::repeated_markers(&hom_fams);
    let rsis = comparisons::collect_rsis(&pairs, &genomes, opts.all_match, &repeated);
    info!(
        "Found {} repeat spanning intervals with total weight of {}",
        rsis.len(),
        rsis.total_weight()
    );
    dump(&rsis, &opts.output_dir, "RSIs")?;

    let adjacency_solver = optimize::solver_for(solver);
    info!("Selecting adjacencies with the {} solver", adjacency_solver.name());
    let selection = adjacency_solver.select(&hom_fams, &adjacencies);
    info!(
        "Found {} realizable adjacencies with total weight of {}",
        selection.realizable.len(),
        selection.realizable.total_weight()
    );
    info!("Found {} repeat clusters", selection.repeat_clusters.len());
    dump(&selection.realizable, &opts.output_dir, "realizable_adjacencies")?;
    dump(&selection.discarded, &opts.output_dir, "discarded_adjacencies")?;

    let rsi_selection = optimize::opt_rsis_greedy(&selection.realizable, &rsis);
    info!(
        "Found {} realizable repeat spanning intervals with total weight of {}",
        rsi_selection.realizable.len(),
        rsi_selection.realizable.total_weight()
    );
    dump(&rsi_selection.realizable, &opts.output_dir, "realizable_RSIs")?;
    dump(&rsi_selection.discarded, &opts.output_dir, "discarded_RSIs")?;

    // construction phase
    let (ancestor, rendered) = assembly::assemble(
        &hom_fams,
        &selection.realizable,
        &rsi_selection.realizable,
        &selection.repeat_clusters,
        &opts.ancestor_name,
    );
    info!(
        "Assembled the ancestral genome, found a total of {} CARs and {} RCs",
        ancestor.cars.len(),
        selection.repeat_clusters.len()
    );
    if !ancestor.audit.is_empty() {
        warn!(
            "Consistency audit reported {} findings; the genome was still emitted",
            ancestor.audit.len()
        );
    }

    let hom_fams_path = artifact_path(&opts.output_dir, "ancestor_hom_fams");
    let file = File::create(&hom_fams_path).map_err(|e| {
        io::Error::new(
            e.kind(),
            format!("Failed to open output file '{}': {}", hom_fams_path, e),
        )
    })?;
    let mut writer = BufWriter::new(file);
    markers::write_hom_fams(&mut writer, &ancestor.hom_fams)?;
    writer.flush()?;

    let genome_path = artifact_path(&opts.output_dir, "ancestor_genome");
    let file = File::create(&genome_path).map_err(|e| {
        io::Error::new(
            e.kind(),
            format!("Failed to open output file '{}': {}", genome_path, e),
        )
    })?;
    let mut writer = BufWriter::new(file);
    assembly::write_ancestor_genome(
        &mut writer,
        &ancestor.name,
        &selection.repeat_clusters,
        &rendered,
    )?;
    writer.flush()?;
    info!("Done");

    Ok(RunSummary {
        species: genomes.len(),
        pairs: pairs.len(),
        families: hom_fams.len(),
        solver,
        adjacencies: adjacencies.len(),
        adjacency_weight: adjacencies.total_weight(),
        realizable_adjacencies: selection.realizable.len(),
        rsis: rsis.len(),
        realizable_rsis: rsi_selection.realizable.len(),
        repeat_clusters: selection.repeat_clusters.len(),
        cars: ancestor.cars.len(),
        audit_findings: ancestor.audit.len(),
    })
}
