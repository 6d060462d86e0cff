//! Normalization of raw identification records into [`PeptideSpectrumMatch`]es

use crate::Warning;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Identification record as handed over by a data-access layer (mzIdentML,
/// PRIDE XML, search engine output, ...). Every field is optional here, and
/// validated by [`adapt`]
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct RawRecord {
    /// Spectrum reference (native id, scan number, title)
    #[serde(default)]
    pub spectrum: Option<String>,
    #[serde(default)]
    pub sequence: Option<String>,
    #[serde(default)]
    pub charge: Option<u8>,
    /// Named scores, e.g. `{"MS:1001330": 0.0012}`
    #[serde(default)]
    pub scores: BTreeMap<String, Option<f64>>,
    #[serde(default)]
    pub evidence: Vec<RawEvidence>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct RawEvidence {
    #[serde(default)]
    pub accession: Option<String>,
    #[serde(default)]
    pub decoy: bool,
    #[serde(default)]
    pub start: Option<u32>,
    #[serde(default)]
    pub end: Option<u32>,
}

/// How the decoy status of a PSM is derived from its evidences
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecoyPolicy {
    /// A PSM is a decoy only if every evidence is a decoy
    #[default]
    All,
    /// A PSM is a decoy as soon as one evidence is a decoy
    Any,
}

impl DecoyPolicy {
    pub fn is_decoy(&self, evidence: &[PeptideEvidence]) -> bool {
        match self {
            DecoyPolicy::All => !evidence.is_empty() && evidence.iter().all(|ev| ev.decoy),
            DecoyPolicy::Any => evidence.iter().any(|ev| ev.decoy),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeptideEvidence {
    pub peptide: Arc<str>,
    pub accession: Arc<str>,
    /// Offsets of the peptide within the protein, if reported
    pub start: Option<u32>,
    pub end: Option<u32>,
    pub decoy: bool,
}

#[derive(Clone, Debug)]
pub struct PeptideSpectrumMatch {
    spectrum: String,
    charge: u8,
    peptide: Arc<str>,
    scores: BTreeMap<String, f64>,
    evidence: Vec<PeptideEvidence>,
    decoy: bool,
    fdr: Option<f64>,
    q_value: Option<f64>,
}

impl PeptideSpectrumMatch {
    pub fn spectrum(&self) -> &str {
        &self.spectrum
    }

    pub fn charge(&self) -> u8 {
        self.charge
    }

    /// Identity of this PSM: spectrum reference and charge state
    pub fn id(&self) -> (&str, u8) {
        (&self.spectrum, self.charge)
    }

    pub fn peptide(&self) -> &Arc<str> {
        &self.peptide
    }

    pub fn score(&self, kind: &str) -> Option<f64> {
        self.scores.get(kind).copied()
    }

    pub fn scores(&self) -> &BTreeMap<String, f64> {
        &self.scores
    }

    pub fn evidence(&self) -> &[PeptideEvidence] {
        &self.evidence
    }

    pub fn is_decoy(&self) -> bool {
        self.decoy
    }

    pub fn fdr(&self) -> Option<f64> {
        self.fdr
    }

    pub fn q_value(&self) -> Option<f64> {
        self.q_value
    }

    /// Post-hoc statistics are written by the FDR stage, and only there
    pub(crate) fn set_statistics(&mut self, fdr: Option<f64>, q_value: Option<f64>) {
        self.fdr = fdr;
        self.q_value = q_value;
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Reason {
    MissingSequence,
    MissingScores,
    MissingEvidence,
}

/// Unusable raw record
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MalformedRecord {
    /// Position of the record in the input
    pub record: usize,
    pub reason: Reason,
}

impl std::fmt::Display for MalformedRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self.reason {
            Reason::MissingSequence => "no peptide sequence",
            Reason::MissingScores => "no score values",
            Reason::MissingEvidence => "no usable peptide evidence",
        };
        write!(f, "malformed record {}: {}", self.record, reason)
    }
}

impl std::error::Error for MalformedRecord {}

impl From<MalformedRecord> for Warning {
    fn from(value: MalformedRecord) -> Self {
        let reason = value.to_string();
        Warning::MalformedRecord {
            record: value.record,
            reason,
        }
    }
}

/// Result of adapting a single record: the PSM, plus any evidence entries
/// that had to be dropped along the way
#[derive(Debug)]
pub struct Adapted {
    pub psm: PeptideSpectrumMatch,
    pub skipped: Vec<Warning>,
}

/// Convert a raw identification record at input position `record` into a PSM
pub fn adapt(
    record: usize,
    raw: RawRecord,
    policy: DecoyPolicy,
) -> Result<Adapted, MalformedRecord> {
    let malformed = |reason| MalformedRecord { record, reason };

    let sequence = raw
        .sequence
        .as_deref()
        .map(|s| s.trim().to_ascii_uppercase())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| malformed(Reason::MissingSequence))?;

    let scores = raw
        .scores
        .into_iter()
        .filter_map(|(kind, value)| value.filter(|v| v.is_finite()).map(|v| (kind, v)))
        .collect::<BTreeMap<_, _>>();
    if scores.is_empty() {
        return Err(malformed(Reason::MissingScores));
    }

    let peptide: Arc<str> = Arc::from(sequence);
    let mut skipped = Vec::new();
    let mut evidence = Vec::with_capacity(raw.evidence.len());
    for (ix, ev) in raw.evidence.into_iter().enumerate() {
        let accession = match ev.accession.as_deref().map(str::trim) {
            Some(acc) if !acc.is_empty() => acc,
            _ => {
                log::warn!("record {}: evidence {} has no protein accession", record, ix);
                skipped.push(Warning::MalformedEvidence {
                    record,
                    reason: format!("evidence {} has no protein accession", ix),
                });
                continue;
            }
        };
        if let (Some(start), Some(end)) = (ev.start, ev.end) {
            if start > end {
                log::warn!(
                    "record {}: evidence {} on {} starts after it ends ({} > {})",
                    record,
                    ix,
                    accession,
                    start,
                    end
                );
                skipped.push(Warning::MalformedEvidence {
                    record,
                    reason: format!("evidence {} on {} has start {} > end {}", ix, accession, start, end),
                });
                continue;
            }
        }
        evidence.push(PeptideEvidence {
            peptide: peptide.clone(),
            accession: Arc::from(accession),
            start: ev.start,
            end: ev.end,
            decoy: ev.decoy,
        });
    }
    if evidence.is_empty() {
        return Err(malformed(Reason::MissingEvidence));
    }

    let spectrum = raw
        .spectrum
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| format!("record={}", record));

    Ok(Adapted {
        psm: PeptideSpectrumMatch {
            spectrum,
            charge: raw.charge.unwrap_or(0),
            decoy: policy.is_decoy(&evidence),
            peptide,
            scores,
            evidence,
            fdr: None,
            q_value: None,
        },
        skipped,
    })
}
