use crate::fdr::{self, Passing};
use crate::graph::Graph;
use crate::grouping::{self, AmbiguityGroup, ProteinInference};
use crate::psm::{adapt, DecoyPolicy, RawRecord};
use crate::scoring::{ScoreDirection, ScoreSettings, ScoringEngine};
use crate::{Cancellation, Error, Warning};
use log::info;
use serde::{Deserialize, Serialize};
use std::time::Instant;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct InferenceSettings {
    #[serde(flatten)]
    pub scoring: ScoreSettings,
    #[serde(default)]
    pub protein_inference: ProteinInference,
    #[serde(default)]
    pub decoy_policy: DecoyPolicy,
    /// Only used to report how many groups pass in the run summary
    #[serde(default, rename = "qvalue-threshold")]
    pub q_value_threshold: Option<f64>,
    /// Abort on the first malformed record, instead of skipping it
    #[serde(default)]
    pub fatal_malformed: bool,
    /// Return groups of completed components if the run is cancelled
    #[serde(default)]
    pub best_effort: bool,
}

impl InferenceSettings {
    pub fn new(score_kind: impl Into<String>, score_direction: ScoreDirection) -> Self {
        Self {
            scoring: ScoreSettings {
                score_kind: score_kind.into(),
                psm_selection: Default::default(),
                score_direction,
                scoring: Default::default(),
            },
            protein_inference: Default::default(),
            decoy_policy: Default::default(),
            q_value_threshold: None,
            fatal_malformed: false,
            best_effort: false,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct Summary {
    pub records: usize,
    pub skipped_records: usize,
    pub psms: usize,
    pub peptides: usize,
    pub proteins: usize,
    pub components: usize,
    pub total_groups: usize,
    pub target_groups: usize,
    pub decoy_groups: usize,
    pub unscored_groups: usize,
    /// PSMs carrying the configured score kind, and thus ranked
    pub scored_psms: usize,
    pub q_value_threshold: Option<f64>,
    /// Groups accepted at `q_value_threshold`
    pub passing_groups: Option<Passing>,
    /// Target PSMs accepted at `q_value_threshold`
    pub passing_psms: Option<usize>,
    /// The run was cancelled, and only completed components are reported
    pub cancelled: bool,
    pub warnings: Vec<Warning>,
}

pub struct InferenceResult {
    pub graph: Graph,
    /// Ranked best to worst, unscored groups last
    pub groups: Vec<AmbiguityGroup>,
    pub summary: Summary,
    /// Direction used to rank `groups`
    pub direction: ScoreDirection,
}

impl InferenceResult {
    /// Score and rank the existing groups again with different settings.
    /// The graph and the ambiguity groups are reused as they are
    pub fn rescore(&mut self, settings: ScoreSettings) {
        let time = Instant::now();
        let (engine, warnings) = ScoringEngine::new(settings);
        self.summary.warnings.retain(|w| {
            !matches!(
                w,
                Warning::UnknownScoreKind { .. } | Warning::Configuration { .. }
            )
        });
        self.summary.warnings.extend(warnings);
        check_score_kind(&self.graph, &engine, &mut self.summary.warnings);

        let mut groups = std::mem::take(&mut self.groups);
        engine.score_groups(&mut groups, &self.graph);
        self.direction = engine.output_direction();
        self.groups = fdr::compute_q_values(groups, self.direction);
        self.summary.scored_psms = fdr::assign_psm_q_values(
            &mut self.graph,
            &engine.settings().score_kind,
            engine.settings().score_direction,
        );
        tally(&mut self.summary, &self.groups, &self.graph);
        info!(
            "rescored {} groups with {} in {:?}ms",
            self.groups.len(),
            engine.strategy().name(),
            time.elapsed().as_millis()
        );
    }
}

pub struct Pipeline {
    settings: InferenceSettings,
}

impl Pipeline {
    pub fn new(settings: InferenceSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &InferenceSettings {
        &self.settings
    }

    /// Re-run only scoring and FDR of an existing result under `scoring`
    pub fn rescore(&self, mut result: InferenceResult, scoring: ScoreSettings) -> InferenceResult {
        result.rescore(scoring);
        result
    }

    /// Run protein inference over raw identification records: adapt them
    /// to PSMs, build the peptide/protein graph, resolve ambiguity groups,
    /// score them and assign q-values
    pub fn run<I>(&self, records: I, cancel: &Cancellation) -> Result<InferenceResult, Error>
    where
        I: IntoIterator<Item = RawRecord>,
    {
        let start = Instant::now();
        let mut summary = Summary::default();

        let (engine, warnings) = ScoringEngine::new(self.settings.scoring.clone());
        summary.warnings.extend(warnings);
        summary.q_value_threshold = match self.settings.q_value_threshold {
            Some(q) if !(0.0..=1.0).contains(&q) => {
                log::warn!("ignoring qvalue-threshold {}, expected a value in [0, 1]", q);
                summary.warnings.push(Warning::Configuration {
                    reason: format!("qvalue-threshold {} is outside of [0, 1], ignoring it", q),
                });
                None
            }
            q => q,
        };

        let time = Instant::now();
        let mut psms = Vec::new();
        for (ix, raw) in records.into_iter().enumerate() {
            summary.records += 1;
            match adapt(ix, raw, self.settings.decoy_policy) {
                Ok(adapted) => {
                    summary.warnings.extend(adapted.skipped);
                    psms.push(adapted.psm);
                }
                Err(err) if self.settings.fatal_malformed => return Err(err.into()),
                Err(err) => {
                    log::warn!("{}", err);
                    summary.skipped_records += 1;
                    summary.warnings.push(err.into());
                }
            }
        }
        info!(
            "- adapted {} of {} records in {:?}ms",
            psms.len(),
            summary.records,
            time.elapsed().as_millis()
        );

        let time = Instant::now();
        let (mut graph, warnings) = Graph::build(psms);
        summary.warnings.extend(warnings);
        info!(
            "- built graph of {} peptides and {} proteins in {:?}ms",
            graph.peptides().len(),
            graph.proteins().len(),
            time.elapsed().as_millis()
        );
        check_score_kind(&graph, &engine, &mut summary.warnings);

        let mut resolved = grouping::resolve_with(
            &mut graph,
            self.settings.protein_inference,
            cancel,
            |group, graph| group.score = engine.compute_group_score(group, graph),
        );
        summary.components = resolved.components;
        summary.warnings.extend(std::mem::take(&mut resolved.warnings));
        if !resolved.is_complete() {
            if !self.settings.best_effort {
                log::error!(
                    "cancelled after {} of {} components",
                    resolved.completed,
                    resolved.components
                );
                return Err(Error::Cancelled);
            }
            log::warn!(
                "cancelled after {} of {} components, reporting partial results",
                resolved.completed,
                resolved.components
            );
            summary.cancelled = true;
        }

        let time = Instant::now();
        let direction = engine.output_direction();
        let groups = fdr::compute_q_values(resolved.groups, direction);
        summary.scored_psms = fdr::assign_psm_q_values(
            &mut graph,
            &engine.settings().score_kind,
            engine.settings().score_direction,
        );
        info!(
            "- assigned q-values to {} groups and {} psms in {:?}ms",
            groups.iter().filter(|g| g.is_scored()).count(),
            summary.scored_psms,
            time.elapsed().as_millis()
        );

        tally(&mut summary, &groups, &graph);
        info!(
            "inferred {} protein groups ({} target, {} decoy, {} unscored) in {:?}ms",
            summary.total_groups,
            summary.target_groups,
            summary.decoy_groups,
            summary.unscored_groups,
            start.elapsed().as_millis()
        );
        if let (Some(q), Some(passing)) = (summary.q_value_threshold, summary.passing_groups) {
            info!("- {} target groups pass q <= {}", passing.targets, q);
        }

        Ok(InferenceResult {
            graph,
            groups,
            summary,
            direction,
        })
    }
}

fn check_score_kind(graph: &Graph, engine: &ScoringEngine, warnings: &mut Vec<Warning>) {
    let kind = &engine.settings().score_kind;
    if !graph.psms().iter().any(|psm| psm.score(kind).is_some()) {
        log::warn!("score kind `{}` not found on any PSM, all groups are unscored", kind);
        warnings.push(Warning::UnknownScoreKind {
            score_kind: kind.clone(),
        });
    }
}

fn tally(summary: &mut Summary, groups: &[AmbiguityGroup], graph: &Graph) {
    summary.psms = graph.psms().len();
    summary.peptides = graph.peptides().len();
    summary.proteins = graph.proteins().len();
    summary.total_groups = groups.len();
    summary.target_groups = groups.iter().filter(|g| !g.decoy).count();
    summary.decoy_groups = groups.iter().filter(|g| g.decoy).count();
    summary.unscored_groups = groups.iter().filter(|g| !g.is_scored()).count();
    summary.passing_groups = summary
        .q_value_threshold
        .map(|q| fdr::count_passing(groups, q));
    summary.passing_psms = summary.q_value_threshold.map(|threshold| {
        graph
            .psms()
            .iter()
            .filter(|psm| !psm.is_decoy() && psm.q_value().map_or(false, |q| q <= threshold))
            .count()
    });
}
