use ancar::markers;
use ancar::optimize::choose_solver;
use ancar::pipeline::{self, ReconstructOpts};
use clap::Parser;
use rayon::ThreadPoolBuilder;
use std::io;
use std::num::NonZeroUsize;

/// Common options shared between all commands
#[derive(Parser, Debug)]
struct CommonOpts {
    /// Path to the homologous families file.
    #[clap(short = 'f', long, value_parser)]
    hom_fams: String,

    /// Path to the species pairs file (one pair per line).
    #[clap(short = 's', long, value_parser)]
    species_pairs: String,

    /// Number of threads for parallel processing.
    #[clap(short = 't', long, value_parser, default_value_t = NonZeroUsize::new(num_cpus::get().max(1)).unwrap())]
    num_threads: NonZeroUsize,

    /// Verbosity level (0 = error, 1 = info, 2 = debug)
    #[clap(short, long, default_value = "0")]
    verbose: u8,
}

/// Command-line tool for reconstructing ancestral genomes from pairwise
/// species comparisons.
#[derive(Parser, Debug)]
#[command(author, version, about, disable_help_subcommand = true)]
enum Args {
    /// Reconstruct the ancestral genome
    Reconstruct {
        #[clap(flatten)]
        common: CommonOpts,

        /// Directory for the output artifacts (created if missing)
        #[clap(short = 'o', long, value_parser)]
        output_dir: String,

        /// Only propose adjacencies consistent across both genomes of a pair
        #[clap(short = 'a', long, action)]
        all_match: bool,

        /// Drop families with copy number above this threshold
        #[clap(short = 'c', long, value_parser)]
        filter_copy_number: Option<u32>,

        /// Drop the families with these ids (comma separated)
        #[clap(long, value_parser, value_delimiter = ',')]
        filter_id: Vec<u32>,

        /// Name of the reconstructed ancestor
        #[clap(long, value_parser, default_value = "ANCESTOR")]
        ancestor_name: String,
    },
    /// Print input statistics
    Stats {
        #[clap(flatten)]
        common: CommonOpts,
    },
}

fn main() -> io::Result<()> {
    let args = Args::parse();

    match args {
        Args::Reconstruct {
            common,
            output_dir,
            all_match,
            filter_copy_number,
            filter_id,
            ancestor_name,
        } => {
            initialize(&common);
            let opts = ReconstructOpts {
                hom_fams_file: common.hom_fams,
                species_pairs_file: common.species_pairs,
                output_dir,
                all_match,
                filter_copy_number,
                filter_ids: filter_id,
                ancestor_name,
            };
            let summary = pipeline::run(&opts)?;
            println!(
                "{} CARs, {} repeat clusters, {} audit findings",
                summary.cars, summary.repeat_clusters, summary.audit_findings
            );
        }
        Args::Stats { common } => {
            initialize(&common);
            print_stats(&common)?;
        }
    }

    Ok(())
}

/// Initialize logger and thread pool based on common options
fn initialize(common: &CommonOpts) {
    env_logger::Builder::new()
        .filter_level(match common.verbose {
            0 => log::LevelFilter::Error,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .init();

    ThreadPoolBuilder::new()
        .num_threads(common.num_threads.into())
        .build_global()
        .unwrap();
}

fn print_stats(common: &CommonOpts) -> io::Result<()> {
    let hom_fams = markers::read_hom_fams(&common.hom_fams)?;
    let species = markers::species_set(&hom_fams);
    let pairs = markers::read_species_pairs(&common.species_pairs, &species)?;

    let loci: usize = hom_fams.iter().map(|fam| fam.loci.len()).sum();
    let repeated = markers::repeated_markers(&hom_fams);
    let solver = choose_solver(&hom_fams);

    println!("Homologous families: {}", hom_fams.len());
    println!("Loci: {}", loci);
    println!("Species: {}", species.len());
    println!("Species pairs: {}", pairs.len());
    println!("Repeated families: {}", repeated.len());
    println!("Optimization strategy: {:?}", solver);

    Ok(())
}
