//! Bipartite peptide <-> protein graph.
//!
//! PSMs, peptides and proteins are stored in flat arenas and refer to each
//! other through `u32` indices. Peptide and protein nodes are keyed by
//! sequence and accession respectively, so building the graph is a single
//! pass over all peptide evidences with hashed lookups.

use crate::psm::PeptideSpectrumMatch;
use crate::Warning;
use fnv::{FnvHashMap, FnvHashSet};
use serde::Serialize;
use std::ops::Index;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
pub struct PsmIx(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
pub struct PeptideIx(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
pub struct ProteinIx(pub u32);

#[derive(Debug, Clone)]
pub struct PeptideNode {
    pub sequence: Arc<str>,
    /// PSMs assigning this peptide to a spectrum
    pub psms: Vec<PsmIx>,
    /// Proteins containing this peptide
    pub proteins: FnvHashSet<ProteinIx>,
}

#[derive(Debug, Clone)]
pub struct ProteinNode {
    pub accession: Arc<str>,
    pub decoy: bool,
    pub peptides: FnvHashSet<PeptideIx>,
    /// PSMs reachable through `peptides`
    pub psms: FnvHashSet<PsmIx>,
    /// Set by parsimony reduction, when this protein's evidence is fully
    /// explained by another protein
    pub subsumed_into: Option<ProteinIx>,
    /// Reported (start, end) of each peptide within this protein
    offsets: FnvHashMap<PeptideIx, (Option<u32>, Option<u32>)>,
}

impl ProteinNode {
    pub fn offsets(&self, peptide: PeptideIx) -> Option<(Option<u32>, Option<u32>)> {
        self.offsets.get(&peptide).copied()
    }
}

#[derive(Debug, Default, Clone)]
pub struct Graph {
    pub(crate) psms: Vec<PeptideSpectrumMatch>,
    pub(crate) peptides: Vec<PeptideNode>,
    pub(crate) proteins: Vec<ProteinNode>,
    peptide_map: FnvHashMap<Arc<str>, PeptideIx>,
    protein_map: FnvHashMap<Arc<str>, ProteinIx>,
}

impl Graph {
    /// Build the graph from a stream of PSMs. Conflicting evidence is
    /// resolved in favor of the later record, and reported as a warning
    pub fn build<I>(psms: I) -> (Self, Vec<Warning>)
    where
        I: IntoIterator<Item = PeptideSpectrumMatch>,
    {
        let mut graph = Self::default();
        let mut warnings = Vec::new();
        for psm in psms {
            graph.insert(psm, &mut warnings);
        }
        for peptide in &graph.peptides {
            for protein_ix in &peptide.proteins {
                graph.proteins[protein_ix.0 as usize]
                    .psms
                    .extend(peptide.psms.iter().copied());
            }
        }
        log::trace!(
            "built graph of {} psms, {} peptides, {} proteins",
            graph.psms.len(),
            graph.peptides.len(),
            graph.proteins.len()
        );
        (graph, warnings)
    }

    fn insert(&mut self, psm: PeptideSpectrumMatch, warnings: &mut Vec<Warning>) {
        let psm_ix = PsmIx(self.psms.len() as u32);
        let peptide_ix = self.get_or_insert_peptide(psm.peptide());
        self.peptides[peptide_ix.0 as usize].psms.push(psm_ix);

        for ev in psm.evidence() {
            let protein_ix = self.get_or_insert_protein(&ev.accession, ev.decoy);
            let protein = &mut self.proteins[protein_ix.0 as usize];

            if protein.decoy != ev.decoy {
                log::warn!(
                    "{} is reported both as target and decoy, using decoy = {}",
                    protein.accession,
                    ev.decoy
                );
                warnings.push(Warning::InconsistentEvidence {
                    peptide: ev.peptide.to_string(),
                    accession: ev.accession.to_string(),
                    reason: format!("conflicting decoy status, using decoy = {}", ev.decoy),
                });
                protein.decoy = ev.decoy;
            }

            let offsets = (ev.start, ev.end);
            match protein.offsets.get_mut(&peptide_ix) {
                Some(previous) if conflicts(*previous, offsets) => {
                    log::warn!(
                        "{} occurs in {} at {:?} and {:?}, keeping the latter",
                        ev.peptide,
                        ev.accession,
                        previous,
                        offsets
                    );
                    warnings.push(Warning::InconsistentEvidence {
                        peptide: ev.peptide.to_string(),
                        accession: ev.accession.to_string(),
                        reason: format!(
                            "conflicting offsets {:?} and {:?}, keeping the latter",
                            previous, offsets
                        ),
                    });
                    *previous = offsets;
                }
                Some(previous) => {
                    previous.0 = previous.0.or(offsets.0);
                    previous.1 = previous.1.or(offsets.1);
                }
                None => {
                    protein.offsets.insert(peptide_ix, offsets);
                }
            }

            protein.peptides.insert(peptide_ix);
            self.peptides[peptide_ix.0 as usize]
                .proteins
                .insert(protein_ix);
        }

        self.psms.push(psm);
    }

    fn get_or_insert_peptide(&mut self, sequence: &Arc<str>) -> PeptideIx {
        match self.peptide_map.get(sequence) {
            Some(&ix) => ix,
            None => {
                let ix = PeptideIx(self.peptides.len() as u32);
                self.peptides.push(PeptideNode {
                    sequence: sequence.clone(),
                    psms: Vec::new(),
                    proteins: FnvHashSet::default(),
                });
                self.peptide_map.insert(sequence.clone(), ix);
                ix
            }
        }
    }

    fn get_or_insert_protein(&mut self, accession: &Arc<str>, decoy: bool) -> ProteinIx {
        match self.protein_map.get(accession) {
            Some(&ix) => ix,
            None => {
                let ix = ProteinIx(self.proteins.len() as u32);
                self.proteins.push(ProteinNode {
                    accession: accession.clone(),
                    decoy,
                    peptides: FnvHashSet::default(),
                    psms: FnvHashSet::default(),
                    subsumed_into: None,
                    offsets: FnvHashMap::default(),
                });
                self.protein_map.insert(accession.clone(), ix);
                ix
            }
        }
    }

    pub fn psms(&self) -> &[PeptideSpectrumMatch] {
        &self.psms
    }

    pub fn peptides(&self) -> &[PeptideNode] {
        &self.peptides
    }

    pub fn proteins(&self) -> &[ProteinNode] {
        &self.proteins
    }

    pub fn peptide_ix(&self, sequence: &str) -> Option<PeptideIx> {
        self.peptide_map.get(sequence).copied()
    }

    pub fn protein_ix(&self, accession: &str) -> Option<ProteinIx> {
        self.protein_map.get(accession).copied()
    }
}

fn conflicts(a: (Option<u32>, Option<u32>), b: (Option<u32>, Option<u32>)) -> bool {
    let differ = |x: Option<u32>, y: Option<u32>| matches!((x, y), (Some(x), Some(y)) if x != y);
    differ(a.0, b.0) || differ(a.1, b.1)
}

impl Index<PsmIx> for Graph {
    type Output = PeptideSpectrumMatch;

    fn index(&self, index: PsmIx) -> &Self::Output {
        &self.psms[index.0 as usize]
    }
}

impl Index<PeptideIx> for Graph {
    type Output = PeptideNode;

    fn index(&self, index: PeptideIx) -> &Self::Output {
        &self.peptides[index.0 as usize]
    }
}

impl Index<ProteinIx> for Graph {
    type Output = ProteinNode;

    fn index(&self, index: ProteinIx) -> &Self::Output {
        &self.proteins[index.0 as usize]
    }
}
