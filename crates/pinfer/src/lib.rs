pub mod fdr;
pub mod graph;
pub mod grouping;
pub mod pipeline;
pub mod psm;
pub mod scoring;

use serde::Serialize;

#[derive(Debug)]
pub enum Error {
    /// A raw record could not be adapted, and malformed records are configured as fatal
    MalformedRecord(psm::MalformedRecord),
    /// Processing was cancelled before every component finished
    Cancelled,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedRecord(e) => e.fmt(f),
            Self::Cancelled => write!(f, "protein inference was cancelled"),
        }
    }
}

impl std::error::Error for Error {}

impl From<psm::MalformedRecord> for Error {
    fn from(value: psm::MalformedRecord) -> Self {
        Self::MalformedRecord(value)
    }
}

/// Recoverable anomalies encountered during a run. These never abort the
/// pipeline, and are reported back to the caller in the run summary
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Warning {
    /// Raw record was unusable and has been skipped
    MalformedRecord { record: usize, reason: String },
    /// A single evidence entry was unusable, but the rest of the record was kept
    MalformedEvidence { record: usize, reason: String },
    /// Configured score kind was not found on any PSM
    UnknownScoreKind { score_kind: String },
    /// The same peptide maps to the same protein with conflicting details
    InconsistentEvidence {
        peptide: String,
        accession: String,
        reason: String,
    },
    /// Peptide node without any protein, dropped from inference
    EmptyPeptide { peptide: String },
    /// Configuration value was out of range and has been replaced
    Configuration { reason: String },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::MalformedRecord { record, reason } => {
                write!(f, "skipping record {}: {}", record, reason)
            }
            Warning::MalformedEvidence { record, reason } => {
                write!(f, "skipping evidence of record {}: {}", record, reason)
            }
            Warning::UnknownScoreKind { score_kind } => {
                write!(f, "score kind `{}` was not observed on any PSM", score_kind)
            }
            Warning::InconsistentEvidence {
                peptide,
                accession,
                reason,
            } => write!(f, "{} -> {}: {}", peptide, accession, reason),
            Warning::EmptyPeptide { peptide } => {
                write!(f, "peptide {} has no protein evidence", peptide)
            }
            Warning::Configuration { reason } => f.write_str(reason),
        }
    }
}

/// Shared flag used to request cancellation of a running pipeline from
/// another thread. It is checked between connected-component tasks
#[derive(Clone, Debug, Default)]
pub struct Cancellation(std::sync::Arc<std::sync::atomic::AtomicBool>);

impl Cancellation {
    pub fn cancel(&self) {
        self.0.store(true, std::sync::atomic::Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(std::sync::atomic::Ordering::Relaxed)
    }
}
