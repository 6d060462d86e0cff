//! Protein group scoring from the PSM scores of a group.
//!
//! Selecting which PSMs contribute (and looking up the configured score on
//! them) is shared by every strategy. A [`ScoringStrategy`] only decides how
//! the selected scores are combined into a single group score.

use crate::graph::{Graph, PsmIx};
use crate::grouping::AmbiguityGroup;
use crate::Warning;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoreDirection {
    #[default]
    #[serde(rename = "HIGHER_BETTER")]
    HigherIsBetter,
    #[serde(rename = "LOWER_BETTER")]
    LowerIsBetter,
}

impl ScoreDirection {
    /// Order two scores from best to worst
    pub fn cmp(&self, a: f64, b: f64) -> Ordering {
        match self {
            ScoreDirection::HigherIsBetter => b.total_cmp(&a),
            ScoreDirection::LowerIsBetter => a.total_cmp(&b),
        }
    }

    pub fn best(&self, a: f64, b: f64) -> f64 {
        match self.cmp(a, b) {
            Ordering::Greater => b,
            _ => a,
        }
    }
}

/// Which PSMs of each peptide contribute to a group score
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PsmSelection {
    /// Only the best PSM of each peptide
    #[default]
    BestOnly,
    All,
    /// The `n` best PSMs of each peptide
    NBest(usize),
}

impl std::str::FromStr for PsmSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BEST_ONLY" => Ok(PsmSelection::BestOnly),
            "ALL" => Ok(PsmSelection::All),
            other => other
                .strip_prefix("N_BEST:")
                .and_then(|n| n.trim().parse::<usize>().ok())
                .map(PsmSelection::NBest)
                .ok_or_else(|| {
                    format!(
                        "invalid psm-selection `{}`, expected BEST_ONLY, ALL or N_BEST:<n>",
                        s
                    )
                }),
        }
    }
}

impl TryFrom<String> for PsmSelection {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PsmSelection> for String {
    fn from(value: PsmSelection) -> Self {
        value.to_string()
    }
}

impl std::fmt::Display for PsmSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PsmSelection::BestOnly => f.write_str("BEST_ONLY"),
            PsmSelection::All => f.write_str("ALL"),
            PsmSelection::NBest(n) => write!(f, "N_BEST:{}", n),
        }
    }
}

impl PsmSelection {
    fn limit(&self) -> usize {
        match self {
            PsmSelection::BestOnly => 1,
            PsmSelection::All => usize::MAX,
            PsmSelection::NBest(n) => *n,
        }
    }
}

/// Combination function turning the selected PSM scores into a group score
pub trait ScoringStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// `scores` is never empty, and sorted best first
    fn combine(&self, scores: &[f64], direction: ScoreDirection) -> f64;

    /// Direction in which the combined score should be ranked
    fn output_direction(&self, input: ScoreDirection) -> ScoreDirection {
        input
    }
}

/// Score of the best selected PSM
pub struct BestPeptide;

/// Sum of all selected scores. Suited to scores where higher is better
pub struct Additive;

/// Product of all selected scores. Suited to probability-like scores
/// (p-values, e-values, PEPs) where lower is better
pub struct Multiplicative;

pub struct GeometricMean;

/// Sum of -log10 of all selected scores, which must be p-value like.
/// The result is always ranked with higher being better
pub struct SumNegLog;

impl ScoringStrategy for BestPeptide {
    fn name(&self) -> &'static str {
        "best-peptide"
    }

    fn combine(&self, scores: &[f64], direction: ScoreDirection) -> f64 {
        scores
            .iter()
            .copied()
            .reduce(|a, b| direction.best(a, b))
            .unwrap_or(f64::NAN)
    }
}

impl ScoringStrategy for Additive {
    fn name(&self) -> &'static str {
        "additive"
    }

    fn combine(&self, scores: &[f64], _: ScoreDirection) -> f64 {
        scores.iter().sum()
    }
}

impl ScoringStrategy for Multiplicative {
    fn name(&self) -> &'static str {
        "multiplicative"
    }

    fn combine(&self, scores: &[f64], _: ScoreDirection) -> f64 {
        scores.iter().product()
    }
}

impl ScoringStrategy for GeometricMean {
    fn name(&self) -> &'static str {
        "geometric-mean"
    }

    fn combine(&self, scores: &[f64], _: ScoreDirection) -> f64 {
        scores
            .iter()
            .product::<f64>()
            .powf(1.0 / scores.len() as f64)
    }
}

impl ScoringStrategy for SumNegLog {
    fn name(&self) -> &'static str {
        "sum-neg-log"
    }

    fn combine(&self, scores: &[f64], _: ScoreDirection) -> f64 {
        scores
            .iter()
            .map(|p| -p.clamp(f64::MIN_POSITIVE, 1.0).log10())
            .sum()
    }

    fn output_direction(&self, _: ScoreDirection) -> ScoreDirection {
        ScoreDirection::HigherIsBetter
    }
}

/// Configurable choice of [`ScoringStrategy`]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scoring {
    #[default]
    BestPeptide,
    Additive,
    Multiplicative,
    GeometricMean,
    SumNegLog,
}

impl Scoring {
    pub fn strategy(self) -> Box<dyn ScoringStrategy> {
        match self {
            Scoring::BestPeptide => Box::new(BestPeptide),
            Scoring::Additive => Box::new(Additive),
            Scoring::Multiplicative => Box::new(Multiplicative),
            Scoring::GeometricMean => Box::new(GeometricMean),
            Scoring::SumNegLog => Box::new(SumNegLog),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ScoreSettings {
    /// Name of the PSM score used for scoring
    pub score_kind: String,
    #[serde(default)]
    pub psm_selection: PsmSelection,
    pub score_direction: ScoreDirection,
    #[serde(default)]
    pub scoring: Scoring,
}

pub struct ScoringEngine {
    settings: ScoreSettings,
    strategy: Box<dyn ScoringStrategy>,
}

impl ScoringEngine {
    /// Build an engine, replacing out-of-range settings with their defaults
    pub fn new(mut settings: ScoreSettings) -> (Self, Vec<Warning>) {
        let mut warnings = Vec::new();
        if settings.psm_selection == PsmSelection::NBest(0) {
            log::warn!("psm-selection N_BEST:0 selects no PSMs, using BEST_ONLY");
            warnings.push(Warning::Configuration {
                reason: "psm-selection N_BEST:0 selects no PSMs, using BEST_ONLY".into(),
            });
            settings.psm_selection = PsmSelection::BestOnly;
        }
        let strategy = settings.scoring.strategy();
        (Self { settings, strategy }, warnings)
    }

    pub fn settings(&self) -> &ScoreSettings {
        &self.settings
    }

    pub fn strategy(&self) -> &dyn ScoringStrategy {
        self.strategy.as_ref()
    }

    /// Direction used to rank group scores produced by this engine
    pub fn output_direction(&self) -> ScoreDirection {
        self.strategy
            .output_direction(self.settings.score_direction)
    }

    /// Selected scores of a group, best first. PSMs are selected per peptide,
    /// ties between equal scores are broken by PSM identity
    pub fn select_scores(&self, group: &AmbiguityGroup, graph: &Graph) -> Vec<f64> {
        let direction = self.settings.score_direction;
        let limit = self.settings.psm_selection.limit();
        let mut selected = Vec::new();
        let mut scored: Vec<(f64, PsmIx)> = Vec::new();
        for &peptide in &group.peptides {
            scored.clear();
            scored.extend(graph[peptide].psms.iter().filter_map(|&ix| {
                graph[ix]
                    .score(&self.settings.score_kind)
                    .map(|score| (score, ix))
            }));
            scored.sort_by(|a, b| {
                direction
                    .cmp(a.0, b.0)
                    .then_with(|| graph[a.1].id().cmp(&graph[b.1].id()))
            });
            selected.extend(scored.iter().take(limit).map(|(score, _)| *score));
        }
        selected.sort_by(|a, b| direction.cmp(*a, *b));
        selected
    }

    /// Score a group, or `None` if no contributing PSM carries the configured
    /// score kind (or the combined score is not finite)
    pub fn compute_group_score(&self, group: &AmbiguityGroup, graph: &Graph) -> Option<f64> {
        let scores = self.select_scores(group, graph);
        if scores.is_empty() {
            return None;
        }
        Some(
            self.strategy
                .combine(&scores, self.settings.score_direction),
        )
        .filter(|score| score.is_finite())
    }

    /// Score every group in place
    pub fn score_groups(&self, groups: &mut [AmbiguityGroup], graph: &Graph) {
        groups
            .par_iter_mut()
            .for_each(|group| group.score = self.compute_group_score(group, graph));
    }
}
