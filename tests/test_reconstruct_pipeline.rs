//! Integration tests for the full reconstruction pipeline:
//! parse -> genomes -> adjacencies -> optimization -> assembly -> artifacts

use ancar::optimize::SolverChoice;
use ancar::pipeline::{run, ReconstructOpts};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write_inputs(dir: &Path, hom_fams: &str, pairs: &str) -> (String, String) {
    let hom_fams_path = dir.join("hom_fams");
    let pairs_path = dir.join("species_pairs");
    fs::write(&hom_fams_path, hom_fams).unwrap();
    fs::write(&pairs_path, pairs).unwrap();
    (
        hom_fams_path.to_string_lossy().into_owned(),
        pairs_path.to_string_lossy().into_owned(),
    )
}

fn opts(hom_fams_file: String, species_pairs_file: String, output_dir: String) -> ReconstructOpts {
    ReconstructOpts {
        hom_fams_file,
        species_pairs_file,
        output_dir,
        all_match: false,
        filter_copy_number: None,
        filter_ids: Vec::new(),
        ancestor_name: "ANCESTOR".to_string(),
    }
}

const ARTIFACTS: &[&str] = &[
    "adjacencies",
    "realizable_adjacencies",
    "discarded_adjacencies",
    "RSIs",
    "realizable_RSIs",
    "discarded_RSIs",
    "ancestor_hom_fams",
    "ancestor_genome",
];

#[test]
fn test_uniform_copy_number_run() {
    let temp_dir = TempDir::new().unwrap();
    // A: 1 2 3 and B: 1 3 2, all copy number one
    let (hom_fams_file, pairs_file) = write_inputs(
        temp_dir.path(),
        "\
>1
A.chr1:100-200 +
B.chr1:100-200 +
>2
A.chr1:300-400 +
B.chr1:500-600 +
>3
A.chr1:500-600 +
B.chr1:300-400 +
",
        "A B\n",
    );
    let output_dir = temp_dir.path().join("out").to_string_lossy().into_owned();

    let summary = run(&opts(hom_fams_file, pairs_file, output_dir.clone())).unwrap();

    assert_eq!(summary.species, 2);
    assert_eq!(summary.pairs, 1);
    assert_eq!(summary.families, 3);
    assert_eq!(summary.solver, SolverChoice::ExactC1p);
    assert_eq!(summary.adjacencies, 4);
    assert_eq!(summary.adjacency_weight, 4);
    assert_eq!(summary.realizable_adjacencies, 2);
    assert_eq!(summary.rsis, 0);
    assert_eq!(summary.repeat_clusters, 0);
    assert_eq!(summary.cars, 1);
    assert_eq!(summary.audit_findings, 0);

    for artifact in ARTIFACTS {
        let path = Path::new(&output_dir).join(artifact);
        assert!(path.exists(), "missing artifact {}", artifact);
    }

    let genome = fs::read_to_string(Path::new(&output_dir).join("ancestor_genome")).unwrap();
    assert_eq!(genome, ">ANCESTOR\n#CAR 1\n_Q 1 2 3 Q_\n");

    let adjacencies = fs::read_to_string(Path::new(&output_dir).join("adjacencies")).unwrap();
    assert!(adjacencies.contains("1_t 2_h weight 1"));
    assert!(adjacencies.contains("1_t 3_h weight 1"));
}

#[test]
fn test_repeat_run_produces_cluster_token() {
    let temp_dir = TempDir::new().unwrap();
    // both species: 1 5 5 2, marker 5 repeated
    let (hom_fams_file, pairs_file) = write_inputs(
        temp_dir.path(),
        "\
>1
A.chr1:100-200 +
B.chr1:100-200 +
>2
A.chr1:900-950 +
B.chr1:900-950 +
>5
A.chr1:300-400 +
A.chr1:500-600 +
B.chr1:300-400 +
B.chr1:500-600 +
",
        "A B\n",
    );
    let output_dir = temp_dir.path().join("out").to_string_lossy().into_owned();

    let summary = run(&opts(hom_fams_file, pairs_file, output_dir.clone())).unwrap();

    assert_eq!(summary.solver, SolverChoice::MaxWeightMatching);
    assert_eq!(summary.rsis, 1);
    assert_eq!(summary.repeat_clusters, 1);
    assert_eq!(summary.cars, 1);
    assert_eq!(summary.audit_findings, 0);

    let genome = fs::read_to_string(Path::new(&output_dir).join("ancestor_genome")).unwrap();
    assert_eq!(genome, ">ANCESTOR\n#RC 1\n5\n#CAR 1\n_Q 1 RC1 2 Q_\n");

    let rsis = fs::read_to_string(Path::new(&output_dir).join("RSIs")).unwrap();
    assert!(rsis.contains("1_t 5_h 5_t 5_h 5_t 2_h weight 1"));
}

#[test]
fn test_circular_ancestor() {
    let temp_dir = TempDir::new().unwrap();
    // one circular chromosome 1 2 3 in both species: both orders agree and
    // the wrap-around adjacency is observed
    let (hom_fams_file, pairs_file) = write_inputs(
        temp_dir.path(),
        "\
>1
A.chr1:100-200 +
B.chr1:300-400 +
>2
A.chr1:300-400 +
B.chr1:500-600 +
>3
A.chr1:500-600 +
B.chr1:100-200 +
",
        "A B\n",
    );
    let output_dir = temp_dir.path().join("out").to_string_lossy().into_owned();

    let summary = run(&opts(hom_fams_file, pairs_file, output_dir.clone())).unwrap();
    assert_eq!(summary.cars, 1);

    let genome = fs::read_to_string(Path::new(&output_dir).join("ancestor_genome")).unwrap();
    assert_eq!(genome, ">ANCESTOR\n#CAR 1\n_C 1 2 3 C_\n");
}

#[test]
fn test_missing_input_is_fatal() {
    let temp_dir = TempDir::new().unwrap();
    let output_dir = temp_dir.path().join("out").to_string_lossy().into_owned();
    let result = run(&opts(
        temp_dir
            .path()
            .join("does_not_exist")
            .to_string_lossy()
            .into_owned(),
        temp_dir
            .path()
            .join("also_missing")
            .to_string_lossy()
            .into_owned(),
        output_dir,
    ));
    assert!(result.is_err());
}
