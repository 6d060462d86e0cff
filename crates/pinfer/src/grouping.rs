//! # Ambiguity resolution
//!
//! Proteins are clustered into connected components of the peptide <-> protein
//! graph, and each component is then reduced independently:
//!
//! - Proteins with identical peptide evidence are merged into a single
//!   cluster. The lexicographically smallest accession represents it.
//! - Clusters are visited by decreasing number of peptides. Every remaining
//!   cluster whose peptides are a subset of the visited cluster's peptides
//!   is subsumed into it (parsimony, or Occam's razor).
//!
//! Each surviving cluster, together with everything subsumed into it, forms
//! one [`AmbiguityGroup`]. Components share no peptide or protein, so they
//! are processed in parallel with Rayon.
//!
//! ## References
//! 1. Zhang, B., Chambers, M. C., & Tabb, D. L. (2007). Proteomic parsimony through
//! bipartite graph analysis improves accuracy and transparency. Journal of proteome research,
//! 6(9), 3549-3557. https://doi.org/10.1021/pr070230d
//!
//! 2. Uszkoreit, J., Maerkens, A., Perez-Riverol, Y., Meyer, H. E., Marcus, K., Stephan, C.,
//! Kohlbacher, O., & Eisenacher, M. (2015). PIA: An intuitive protein inference engine with a
//! web-based user interface. Journal of proteome research, 14(7), 2988-2997.
//! https://doi.org/10.1021/acs.jproteome.5b00121

use crate::graph::{Graph, PeptideIx, ProteinIx, PsmIx};
use crate::{Cancellation, Warning};
use fnv::FnvHashMap;
use itertools::Itertools;
use log::info;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProteinInference {
    /// Report every distinct peptide evidence set, only merging proteins
    /// with identical evidence
    All,
    /// Subsume proteins whose evidence is explained by another protein
    #[default]
    Parsimony,
}

/// Proteins and peptides connected through shared peptide evidence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    pub id: usize,
    /// Sorted by accession
    pub proteins: Vec<ProteinIx>,
    pub peptides: Vec<PeptideIx>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub protein: ProteinIx,
    pub accession: Arc<str>,
    /// True if this protein's evidence is a strict subset of the group's
    pub subsumed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AmbiguityGroup {
    pub component: usize,
    pub representative: Arc<str>,
    /// Leading members first, then subsumed members, each sorted by accession
    pub members: Vec<Member>,
    pub peptides: Vec<PeptideIx>,
    pub psms: Vec<PsmIx>,
    pub decoy: bool,
    pub score: Option<f64>,
    pub fdr: Option<f64>,
    pub q_value: Option<f64>,
}

impl AmbiguityGroup {
    /// Members sharing the full peptide evidence of this group
    pub fn leaders(&self) -> impl Iterator<Item = &Member> {
        self.members.iter().filter(|m| !m.subsumed)
    }

    pub fn accessions(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|m| m.accession.as_ref())
    }

    pub fn is_scored(&self) -> bool {
        self.score.is_some()
    }
}

/// Disjoint-set forest over protein indices
struct UnionFind {
    parent: Vec<u32>,
    rank: Vec<u8>,
}

impl UnionFind {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size as u32).collect(),
            rank: vec![0; size],
        }
    }

    fn find(&mut self, mut x: u32) -> u32 {
        while self.parent[x as usize] != x {
            let grandparent = self.parent[self.parent[x as usize] as usize];
            self.parent[x as usize] = grandparent;
            x = grandparent;
        }
        x
    }

    fn union(&mut self, a: u32, b: u32) {
        let (a, b) = (self.find(a), self.find(b));
        if a == b {
            return;
        }
        match self.rank[a as usize].cmp(&self.rank[b as usize]) {
            std::cmp::Ordering::Less => self.parent[a as usize] = b,
            std::cmp::Ordering::Greater => self.parent[b as usize] = a,
            std::cmp::Ordering::Equal => {
                self.parent[b as usize] = a;
                self.rank[a as usize] += 1;
            }
        }
    }
}

/// Partition the graph into connected components. Component ids follow the
/// smallest accession of each component, independent of insertion order
pub fn connected_components(graph: &Graph) -> (Vec<Component>, Vec<Warning>) {
    let mut warnings = Vec::new();
    let mut uf = UnionFind::new(graph.proteins().len());
    for peptide in graph.peptides() {
        let mut proteins = peptide.proteins.iter();
        match proteins.next() {
            Some(first) => proteins.for_each(|other| uf.union(first.0, other.0)),
            None => {
                log::warn!("dropping peptide {}: no protein evidence", peptide.sequence);
                warnings.push(Warning::EmptyPeptide {
                    peptide: peptide.sequence.to_string(),
                });
            }
        }
    }

    let mut roots: FnvHashMap<u32, (Vec<ProteinIx>, Vec<PeptideIx>)> = FnvHashMap::default();
    for ix in 0..graph.proteins().len() as u32 {
        roots.entry(uf.find(ix)).or_default().0.push(ProteinIx(ix));
    }
    for (ix, peptide) in graph.peptides().iter().enumerate() {
        if let Some(first) = peptide.proteins.iter().next() {
            let root = uf.find(first.0);
            roots
                .get_mut(&root)
                .expect("every protein has a root")
                .1
                .push(PeptideIx(ix as u32));
        }
    }

    let components = roots
        .into_values()
        .map(|(mut proteins, mut peptides)| {
            proteins.sort_by(|a, b| graph[*a].accession.cmp(&graph[*b].accession));
            peptides.sort_by(|a, b| graph[*a].sequence.cmp(&graph[*b].sequence));
            (proteins, peptides)
        })
        .sorted_by(|a, b| graph[a.0[0]].accession.cmp(&graph[b.0[0]].accession))
        .enumerate()
        .map(|(id, (proteins, peptides))| Component {
            id,
            proteins,
            peptides,
        })
        .collect();
    (components, warnings)
}

/// Proteins sharing the exact same peptide evidence
struct Cluster {
    peptides: Vec<PeptideIx>,
    proteins: Vec<ProteinIx>,
    subsumed_into: Option<usize>,
}

/// Groups of a single component, and the subsumption decisions leading to them
#[derive(Debug, Default)]
pub struct Reduction {
    pub groups: Vec<AmbiguityGroup>,
    /// (subsumed protein, representative protein of the absorbing group)
    pub subsumed: Vec<(ProteinIx, ProteinIx)>,
}

/// Apply parsimony reduction to the proteins of one connected component
pub fn reduce(component: &Component, graph: &Graph, inference: ProteinInference) -> Reduction {
    // Proteins are visited in accession order, so proteins within a cluster stay sorted
    let mut by_evidence: FnvHashMap<Vec<PeptideIx>, Vec<ProteinIx>> = FnvHashMap::default();
    for &protein in &component.proteins {
        let peptides = graph[protein].peptides.iter().copied().sorted().collect();
        by_evidence.entry(peptides).or_default().push(protein);
    }

    let mut clusters = by_evidence
        .into_iter()
        .map(|(peptides, proteins)| Cluster {
            peptides,
            proteins,
            subsumed_into: None,
        })
        .collect::<Vec<_>>();
    clusters.sort_by(|a, b| {
        b.peptides.len().cmp(&a.peptides.len()).then_with(|| {
            graph[a.proteins[0]]
                .accession
                .cmp(&graph[b.proteins[0]].accession)
        })
    });

    if inference == ProteinInference::Parsimony {
        for i in 0..clusters.len() {
            if clusters[i].subsumed_into.is_some() {
                continue;
            }
            for j in i + 1..clusters.len() {
                if clusters[j].subsumed_into.is_none()
                    && is_subset(&clusters[j].peptides, &clusters[i].peptides)
                {
                    clusters[j].subsumed_into = Some(i);
                }
            }
        }
    }

    let mut reduction = Reduction::default();
    for (i, leader) in clusters.iter().enumerate() {
        if leader.subsumed_into.is_some() {
            continue;
        }
        let head = leader.proteins[0];
        let subsumed = clusters
            .iter()
            .filter(|c| c.subsumed_into == Some(i))
            .flat_map(|c| c.proteins.iter().copied())
            .sorted_by(|a, b| graph[*a].accession.cmp(&graph[*b].accession))
            .collect::<Vec<_>>();
        reduction
            .subsumed
            .extend(subsumed.iter().map(|&protein| (protein, head)));

        let members = leader
            .proteins
            .iter()
            .map(|&p| (p, false))
            .chain(subsumed.iter().map(|&p| (p, true)))
            .map(|(protein, subsumed)| Member {
                protein,
                accession: graph[protein].accession.clone(),
                subsumed,
            })
            .collect::<Vec<_>>();

        let psms = leader
            .peptides
            .iter()
            .flat_map(|&peptide| graph[peptide].psms.iter().copied())
            .sorted()
            .dedup()
            .collect();

        reduction.groups.push(AmbiguityGroup {
            component: component.id,
            representative: graph[head].accession.clone(),
            decoy: leader.proteins.iter().all(|&p| graph[p].decoy),
            members,
            peptides: leader.peptides.clone(),
            psms,
            score: None,
            fdr: None,
            q_value: None,
        });
    }
    reduction
}

/// Both slices must be sorted
fn is_subset(small: &[PeptideIx], large: &[PeptideIx]) -> bool {
    if small.len() > large.len() {
        return false;
    }
    let mut large = large.iter();
    small.iter().all(|x| large.any(|y| y == x))
}

/// Groups for every completed component of a graph
#[derive(Debug, Default)]
pub struct Resolved {
    pub groups: Vec<AmbiguityGroup>,
    pub components: usize,
    /// Number of components that finished before cancellation
    pub completed: usize,
    pub warnings: Vec<Warning>,
}

impl Resolved {
    pub fn is_complete(&self) -> bool {
        self.completed == self.components
    }
}

/// Cluster and reduce the whole graph. `per_group` runs on each new group
/// inside its component's task, e.g. to score it while the component's
/// data is hot. Cancellation is checked before each component starts.
pub fn resolve_with<F>(
    graph: &mut Graph,
    inference: ProteinInference,
    cancel: &Cancellation,
    per_group: F,
) -> Resolved
where
    F: Fn(&mut AmbiguityGroup, &Graph) + Send + Sync,
{
    let time = Instant::now();
    let (components, warnings) = connected_components(graph);
    info!(
        "-  found {} connected components in {:?}ms",
        components.len(),
        time.elapsed().as_millis()
    );

    let time = Instant::now();
    let shared: &Graph = graph;
    let reductions = components
        .par_iter()
        .map(|component| {
            if cancel.is_cancelled() {
                return None;
            }
            let mut reduction = reduce(component, shared, inference);
            reduction
                .groups
                .iter_mut()
                .for_each(|group| per_group(group, shared));
            Some(reduction)
        })
        .collect::<Vec<_>>();

    let mut resolved = Resolved {
        components: components.len(),
        warnings,
        ..Default::default()
    };
    for reduction in reductions.into_iter().flatten() {
        for (protein, into) in reduction.subsumed {
            graph.proteins[protein.0 as usize].subsumed_into = Some(into);
        }
        resolved.groups.extend(reduction.groups);
        resolved.completed += 1;
    }
    info!(
        "-  reduced {} components to {} ambiguity groups in {:?}ms",
        resolved.completed,
        resolved.groups.len(),
        time.elapsed().as_millis()
    );
    resolved
}

pub fn resolve(
    graph: &mut Graph,
    inference: ProteinInference,
    cancel: &Cancellation,
) -> Resolved {
    resolve_with(graph, inference, cancel, |_, _| {})
}
