//! Ancestral genome assembly
//!
//! Walks the selected adjacencies and RSIs as a graph over marker
//! extremities and stitches them into contiguous ancestral regions (CARs),
//! then renders each CAR with repeat clusters and RSI runs collapsed to
//! atomic tokens, classifies it as linear or circular, and audits the result
//! against the selected interval set.

use crate::intervals::IntervalSet;
use crate::markers::{End, Extremity, HomFam, Locus, Strand};
use crate::optimize::RepeatCluster;
use log::warn;
use rustc_hash::{FxHashMap, FxHashSet};
use std::io::{self, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrientedMarker {
    pub id: u32,
    pub forward: bool,
}

/// One contiguous ancestral region.
#[derive(Debug, Clone)]
pub struct Car {
    pub markers: Vec<OrientedMarker>,
    pub circular: bool,
}

impl Car {
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    fn marker_ids(&self) -> Vec<u32> {
        self.markers.iter().map(|m| m.id).collect()
    }
}

/// A consistency problem found while auditing the assembled genome. Reported
/// as a warning, never fatal: the genome is still emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditFinding {
    /// Two markers ended up neighbors without a supporting selected interval.
    UnsupportedNeighbor { left: u32, right: u32 },
    /// A realizable adjacency was never realized in any CAR and is not
    /// subsumed by a repeat cluster.
    UnrealizedAdjacency { left: u32, right: u32 },
}

impl std::fmt::Display for AuditFinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditFinding::UnsupportedNeighbor { left, right } => write!(
                f,
                "Neighbor pair ({}, {}) in the assembled genome has no supporting adjacency",
                left, right
            ),
            AuditFinding::UnrealizedAdjacency { left, right } => write!(
                f,
                "Realizable adjacency ({}, {}) was not realized in any CAR",
                left, right
            ),
        }
    }
}

/// The terminal artifact of the core: assembled CARs, the synthesized
/// ancestor family list, and the audit record.
#[derive(Debug)]
pub struct Ancestor {
    pub name: String,
    pub cars: Vec<Car>,
    pub hom_fams: Vec<HomFam>,
    pub audit: Vec<AuditFinding>,
}

/// One edge of the assembly graph: either a plain adjacency or an RSI whose
/// interior markers are materialized while traversing it.
#[derive(Debug, Clone)]
enum Link {
    Adjacency(Extremity),
    Rsi {
        to: Extremity,
        interior: Vec<OrientedMarker>,
    },
}

impl Link {
    fn target(&self) -> Extremity {
        match self {
            Link::Adjacency(to) => *to,
            Link::Rsi { to, .. } => *to,
        }
    }
}

/// Interior occurrences of an RSI run, oriented in run order, one entry per
/// distinct marker id.
fn rsi_interior(run: &[Extremity]) -> Vec<OrientedMarker> {
    let mut interior = Vec::new();
    let mut seen = FxHashSet::default();
    // run[0] and run[len-1] are the inner extremities of the bounding
    // markers; interior occurrences sit pairwise in between
    let mut index = 1;
    while index + 1 < run.len() {
        let entry = run[index];
        if seen.insert(entry.marker) {
            interior.push(OrientedMarker {
                id: entry.marker,
                forward: entry.end == End::Head,
            });
        }
        index += 2;
    }
    interior
}

fn edge_map(
    realizable_adjacencies: &IntervalSet,
    realizable_rsis: &IntervalSet,
) -> FxHashMap<Extremity, Link> {
    let mut edges: FxHashMap<Extremity, Link> = FxHashMap::default();
    for interval in realizable_adjacencies.iter() {
        let (a, b) = interval.endpoints();
        edges.insert(a, Link::Adjacency(b));
        edges.insert(b, Link::Adjacency(a));
    }
    for interval in realizable_rsis.iter() {
        let (a, b) = interval.endpoints();
        let forward_interior = rsi_interior(interval.run());
        let backward_interior: Vec<OrientedMarker> = forward_interior
            .iter()
            .rev()
            .map(|m| OrientedMarker {
                id: m.id,
                forward: !m.forward,
            })
            .collect();
        // the degree constraint guarantees these endpoints are free; the
        // interior stored under an endpoint is oriented for a traversal
        // leaving from that endpoint
        edges.insert(
            a,
            Link::Rsi {
                to: b,
                interior: forward_interior,
            },
        );
        edges.insert(
            b,
            Link::Rsi {
                to: a,
                interior: backward_interior,
            },
        );
    }
    edges
}

/// Walk one CAR starting by entering `start` marker-side first. Returns the
/// oriented marker sequence.
fn walk_from(
    start: Extremity,
    edges: &FxHashMap<Extremity, Link>,
    placed: &mut FxHashSet<u32>,
) -> Vec<OrientedMarker> {
    let mut markers = Vec::new();
    let mut entry = start;

    loop {
        if !placed.insert(entry.marker) {
            break;
        }
        markers.push(OrientedMarker {
            id: entry.marker,
            forward: entry.end == End::Head,
        });

        let exit = entry.mate();
        let Some(link) = edges.get(&exit) else {
            break;
        };
        if let Link::Rsi { interior, .. } = link {
            // traversing an RSI materializes its interior markers
            for &marker in interior {
                if placed.insert(marker.id) {
                    markers.push(marker);
                }
            }
        }
        entry = link.target();
    }

    markers
}

/// Build CARs from the selected intervals. Every family appears in exactly
/// one CAR: linear CARs start at an unmatched extremity, remaining fully
/// matched components are cycles walked from their smallest marker id, and
/// families untouched by any interval become singleton CARs.
pub fn build_cars(
    hom_fams: &[HomFam],
    realizable_adjacencies: &IntervalSet,
    realizable_rsis: &IntervalSet,
) -> Vec<Car> {
    let edges = edge_map(realizable_adjacencies, realizable_rsis);

    let mut marker_ids: Vec<u32> = hom_fams.iter().map(|fam| fam.id).collect();
    marker_ids.sort_unstable();
    marker_ids.dedup();

    let mut placed: FxHashSet<u32> = FxHashSet::default();
    let mut cars = Vec::new();

    // linear components first: start where an extremity has no edge
    for &id in &marker_ids {
        if placed.contains(&id) {
            continue;
        }
        for entry in [Extremity::head(id), Extremity::tail(id)] {
            // entering at `entry` means `entry.mate()` leads onward; the walk
            // starts here only if nothing attaches on the entry side
            if !edges.contains_key(&entry) && edges.contains_key(&entry.mate()) {
                let markers = walk_from(entry, &edges, &mut placed);
                cars.push(finish_car(markers, realizable_adjacencies));
                break;
            }
        }
    }

    // what remains with edges are cycles
    for &id in &marker_ids {
        if placed.contains(&id) {
            continue;
        }
        if edges.contains_key(&Extremity::head(id)) || edges.contains_key(&Extremity::tail(id)) {
            let markers = walk_from(Extremity::head(id), &edges, &mut placed);
            cars.push(finish_car(markers, realizable_adjacencies));
        }
    }

    // leftover singletons
    for &id in &marker_ids {
        if placed.insert(id) {
            cars.push(finish_car(
                vec![OrientedMarker { id, forward: true }],
                realizable_adjacencies,
            ));
        }
    }

    // longest, most resolved CARs first; leading marker id breaks ties
    cars.sort_by(|a, b| {
        b.len()
            .cmp(&a.len())
            .then_with(|| a.markers[0].id.cmp(&b.markers[0].id))
    });
    cars
}

/// Tag a walked marker sequence as linear or circular. A CAR is circular
/// when the adjacency closing it (first marker's head or tail against the
/// last marker's opposite end) was selected.
fn finish_car(markers: Vec<OrientedMarker>, realizable_adjacencies: &IntervalSet) -> Car {
    let circular = if markers.len() > 1 {
        let first = markers[0].id;
        let last = markers[markers.len() - 1].id;
        let head_tail =
            crate::intervals::Interval::adjacency(Extremity::head(first), Extremity::tail(last));
        let tail_head =
            crate::intervals::Interval::adjacency(Extremity::tail(first), Extremity::head(last));
        realizable_adjacencies.contains_key(&head_tail.key())
            || realizable_adjacencies.contains_key(&tail_head.key())
    } else {
        false
    };
    Car { markers, circular }
}

/// Deduplicated marker-id sequences of the realized RSIs, used for token
/// substitution while rendering.
fn rsi_id_sequences(realizable_rsis: &IntervalSet) -> Vec<Vec<u32>> {
    let mut sequences: Vec<Vec<u32>> = realizable_rsis
        .iter()
        .map(|interval| interval.marker_ids())
        .collect();
    // longest first so the most specific run wins a lookahead match
    sequences.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
    sequences
}

/// One rendered CAR line: `_C`/`_Q` tags around tokens, with repeat cluster
/// and RSI runs collapsed.
#[derive(Debug, Clone)]
pub struct RenderedCar {
    pub tokens: Vec<String>,
    pub circular: bool,
}

impl RenderedCar {
    pub fn line(&self) -> String {
        let (open, close) = if self.circular {
            ("_C", "C_")
        } else {
            ("_Q", "Q_")
        };
        let mut parts = Vec::with_capacity(self.tokens.len() + 2);
        parts.push(open.to_string());
        parts.extend(self.tokens.iter().cloned());
        parts.push(close.to_string());
        parts.join(" ")
    }
}

/// Substitute repeat-cluster and RSI runs in every CAR.
///
/// While scanning, a marker inside a repeat cluster triggers a lookahead of
/// up to the longest realized RSI: if the upcoming marker-id run matches a
/// realized RSI (in either direction) the whole run collapses to that RSI's
/// token, otherwise the single marker collapses to `RC<n>` and the cluster
/// internal boundary is recorded for the audit.
pub fn render_cars(
    cars: &[Car],
    realizable_rsis: &IntervalSet,
    repeat_clusters: &[RepeatCluster],
) -> (Vec<RenderedCar>, Vec<(u32, u32)>) {
    let rsi_sequences = rsi_id_sequences(realizable_rsis);
    let cluster_of = |marker: u32| {
        repeat_clusters
            .iter()
            .position(|cluster| cluster.contains(marker))
    };

    let mut rendered = Vec::with_capacity(cars.len());
    let mut cluster_adjacencies: Vec<(u32, u32)> = Vec::new();

    for car in cars {
        let ids = car.marker_ids();
        let mut tokens = Vec::new();
        let mut index = 0;

        while index < ids.len() {
            let id = ids[index];
            let Some(cluster_index) = cluster_of(id) else {
                tokens.push(id.to_string());
                index += 1;
                continue;
            };

            // Try the realized RSIs against the surrounding run, as id
            // arrays, not text. An RSI run starts at the unique bounding
            // marker one position back, so the window is anchored there;
            // that marker's plain token is replaced by the combined one.
            let mut matched = None;
            for sequence in &rsi_sequences {
                for anchor in [index.saturating_sub(1), index] {
                    let end = anchor + sequence.len();
                    if end > ids.len() || end <= index {
                        continue;
                    }
                    if anchor < index && tokens.last() != Some(&ids[anchor].to_string()) {
                        // the would-be bounding marker is already part of an
                        // earlier substitution
                        continue;
                    }
                    let window = &ids[anchor..end];
                    let forward = window == sequence.as_slice();
                    let backward = window
                        .iter()
                        .rev()
                        .zip(sequence.iter())
                        .all(|(a, b)| a == b);
                    if forward || backward {
                        matched = Some((anchor, sequence));
                        break;
                    }
                }
                if matched.is_some() {
                    break;
                }
            }

            match matched {
                Some((anchor, sequence)) => {
                    if anchor < index {
                        tokens.pop();
                    }
                    let token: Vec<String> =
                        sequence.iter().map(|id| id.to_string()).collect();
                    tokens.push(token.join(" "));
                    index = anchor + sequence.len();
                }
                None => {
                    if index > 0 {
                        let mut pair = (ids[index - 1], id);
                        if pair.1 < pair.0 {
                            pair = (pair.1, pair.0);
                        }
                        cluster_adjacencies.push(pair);
                    }
                    tokens.push(format!("RC{}", cluster_index + 1));
                    index += 1;
                }
            }
        }

        rendered.push(RenderedCar {
            tokens,
            circular: car.circular,
        });
    }

    (rendered, cluster_adjacencies)
}

/// Check the assembled genome against the selected interval set, both ways.
/// Neighbor pairs internal to a realized RSI and pairs recorded at repeat
/// cluster boundaries are exempt.
pub fn audit_ancestor(
    cars: &[Car],
    realizable_adjacencies: &IntervalSet,
    realizable_rsis: &IntervalSet,
    repeat_clusters: &[RepeatCluster],
    cluster_adjacencies: &[(u32, u32)],
) -> Vec<AuditFinding> {
    let sorted_pair = |a: u32, b: u32| if a <= b { (a, b) } else { (b, a) };

    let mut supported: FxHashSet<(u32, u32)> = FxHashSet::default();
    for interval in realizable_adjacencies.iter() {
        let (a, b) = interval.endpoints();
        supported.insert(sorted_pair(a.marker, b.marker));
    }
    let mut adjacency_pairs: Vec<(u32, u32)> = supported.iter().copied().collect();
    adjacency_pairs.sort_unstable();

    for sequence in rsi_id_sequences(realizable_rsis) {
        for window in sequence.windows(2) {
            supported.insert(sorted_pair(window[0], window[1]));
        }
    }
    supported.extend(cluster_adjacencies.iter().copied());

    let mut realized: FxHashSet<(u32, u32)> = FxHashSet::default();
    for car in cars {
        let ids = car.marker_ids();
        for window in ids.windows(2) {
            realized.insert(sorted_pair(window[0], window[1]));
        }
        if car.circular && ids.len() > 1 {
            realized.insert(sorted_pair(ids[0], ids[ids.len() - 1]));
        }
    }

    let in_cluster =
        |marker: u32| repeat_clusters.iter().any(|cluster| cluster.contains(marker));

    let mut findings = Vec::new();
    for &(left, right) in realized.iter() {
        if !supported.contains(&(left, right)) {
            findings.push(AuditFinding::UnsupportedNeighbor { left, right });
        }
    }
    for (left, right) in adjacency_pairs {
        let subsumed = in_cluster(left)
            || in_cluster(right)
            || cluster_adjacencies.contains(&(left, right));
        if !realized.contains(&(left, right)) && !subsumed {
            findings.push(AuditFinding::UnrealizedAdjacency { left, right });
        }
    }
    findings.sort_by_key(|finding| match finding {
        AuditFinding::UnsupportedNeighbor { left, right } => (0, *left, *right),
        AuditFinding::UnrealizedAdjacency { left, right } => (1, *left, *right),
    });
    findings
}

/// Synthesize the ancestor's family list: one family per marker, a single
/// locus on its CAR, consecutive positions, orientation from the walk.
fn ancestor_hom_fams(name: &str, cars: &[Car]) -> Vec<HomFam> {
    let mut hom_fams = Vec::new();
    for (car_index, car) in cars.iter().enumerate() {
        let chromosome = format!("CAR{}", car_index + 1);
        for (position, marker) in car.markers.iter().enumerate() {
            hom_fams.push(HomFam {
                id: marker.id,
                loci: vec![Locus {
                    species: name.to_string(),
                    chromosome: chromosome.clone(),
                    start: position as i64,
                    end: position as i64 + 1,
                    strand: if marker.forward {
                        Strand::Forward
                    } else {
                        Strand::Reverse
                    },
                }],
            });
        }
    }
    hom_fams
}

/// Assemble the ancestral genome from the selected intervals.
pub fn assemble(
    hom_fams: &[HomFam],
    realizable_adjacencies: &IntervalSet,
    realizable_rsis: &IntervalSet,
    repeat_clusters: &[RepeatCluster],
    name: &str,
) -> (Ancestor, Vec<RenderedCar>) {
    let cars = build_cars(hom_fams, realizable_adjacencies, realizable_rsis);
    let (rendered, cluster_adjacencies) = render_cars(&cars, realizable_rsis, repeat_clusters);
    let audit = audit_ancestor(
        &cars,
        realizable_adjacencies,
        realizable_rsis,
        repeat_clusters,
        &cluster_adjacencies,
    );
    for finding in &audit {
        warn!("{}", finding);
    }

    let ancestor = Ancestor {
        name: name.to_string(),
        hom_fams: ancestor_hom_fams(name, &cars),
        cars,
        audit,
    };
    (ancestor, rendered)
}

/// Serialize the ancestor genome artifact: the `>NAME` header, one `#RC`
/// block per repeat cluster, then one `#CAR` block per chromosome.
pub fn write_ancestor_genome<W: Write>(
    writer: &mut W,
    name: &str,
    repeat_clusters: &[RepeatCluster],
    rendered: &[RenderedCar],
) -> io::Result<()> {
    writeln!(writer, ">{}", name)?;
    for (index, cluster) in repeat_clusters.iter().enumerate() {
        writeln!(writer, "#RC {}", index + 1)?;
        writeln!(writer, "{}", cluster.display_string())?;
    }
    for (index, car) in rendered.iter().enumerate() {
        writeln!(writer, "#CAR {}", index + 1)?;
        writeln!(writer, "{}", car.line())?;
    }
    Ok(())
}
