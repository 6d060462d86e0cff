use anyhow::{ensure, Context};
use clap::ArgMatches;
use pinfer_core::grouping::ProteinInference;
use pinfer_core::pipeline::InferenceSettings;
use pinfer_core::psm::DecoyPolicy;
use pinfer_core::scoring::{PsmSelection, ScoreDirection, ScoreSettings, Scoring};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
/// Actual inference parameters - may include overrides or default values not set by user
pub struct Settings {
    pub version: String,
    #[serde(flatten)]
    pub inference: InferenceSettings,
    pub records: String,
    pub output_directory: PathBuf,
    pub output_paths: Vec<String>,
}

#[derive(Deserialize, Default, Debug)]
#[serde(rename_all = "kebab-case")]
/// Input parameters deserialized from JSON file
pub struct Input {
    score_kind: Option<String>,
    psm_selection: Option<PsmSelection>,
    score_direction: Option<ScoreDirection>,
    qvalue_threshold: Option<f64>,
    scoring: Option<Scoring>,
    protein_inference: Option<ProteinInference>,
    decoy_policy: Option<DecoyPolicy>,
    fatal_malformed: Option<bool>,
    best_effort: Option<bool>,
    records: Option<String>,
    output_directory: Option<String>,
}

impl Input {
    pub fn from_arguments(matches: ArgMatches) -> anyhow::Result<Self> {
        let path = matches
            .get_one::<String>("parameters")
            .expect("required parameters");
        let mut input = Input::load(path)
            .with_context(|| format!("Failed to read parameters from `{path}`"))?;

        // Handle JSON configuration overrides
        if let Some(records) = matches.get_one::<String>("records") {
            log::trace!("overriding `records` parameter.");
            input.records = Some(records.into());
        }
        if let Some(output_directory) = matches.get_one::<String>("output-directory") {
            log::trace!("overriding `output-directory` parameter.");
            input.output_directory = Some(output_directory.into());
        }
        if let Some(score_kind) = matches.get_one::<String>("score-kind") {
            log::trace!("overriding `score-kind` parameter.");
            input.score_kind = Some(score_kind.into());
        }
        if let Some(threshold) = matches.get_one::<f64>("qvalue-threshold").copied() {
            log::trace!("overriding `qvalue-threshold` parameter.");
            input.qvalue_threshold = Some(threshold);
        }

        Ok(input)
    }

    pub fn load<P: Into<PathBuf>>(path: P) -> anyhow::Result<Self> {
        let path = path.into();
        let file = std::fs::File::open(&path)?;
        serde_json::from_reader(std::io::BufReader::new(file)).map_err(anyhow::Error::from)
    }

    pub fn build(self) -> anyhow::Result<Settings> {
        ensure!(
            self.score_kind.as_deref().map_or(false, |s| !s.trim().is_empty()),
            "`score-kind` must be set. For more information try '--help'"
        );
        ensure!(
            self.score_direction.is_some(),
            "`score-direction` must be set to HIGHER_BETTER or LOWER_BETTER"
        );
        ensure!(
            self.records.is_some(),
            "`records` must be set. For more information try '--help'"
        );

        if let Some(q) = self.qvalue_threshold {
            if q > 0.1 && q <= 1.0 {
                log::warn!("`qvalue-threshold` of {} is higher than expected", q);
            }
        }

        let output_directory = match self.output_directory {
            Some(path) => {
                let path = PathBuf::from(path);
                std::fs::create_dir_all(&path).with_context(|| {
                    format!("Failed to create output directory `{}`", path.display())
                })?;
                path
            }
            None => std::env::current_dir()?,
        };

        let scoring = ScoreSettings {
            score_kind: self.score_kind.expect("checked above"),
            psm_selection: self.psm_selection.unwrap_or_default(),
            score_direction: self.score_direction.expect("checked above"),
            scoring: self.scoring.unwrap_or_default(),
        };

        Ok(Settings {
            version: clap::crate_version!().into(),
            inference: InferenceSettings {
                scoring,
                protein_inference: self.protein_inference.unwrap_or_default(),
                decoy_policy: self.decoy_policy.unwrap_or_default(),
                q_value_threshold: self.qvalue_threshold,
                fatal_malformed: self.fatal_malformed.unwrap_or(false),
                best_effort: self.best_effort.unwrap_or(false),
            },
            records: self.records.expect("checked above"),
            output_directory,
            output_paths: Vec::new(),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let input: Input = serde_json::from_str(
            r#"{"score-kind": "MS:1001330", "score-direction": "LOWER_BETTER", "records": "psms.jsonl", "output-directory": "."}"#,
        )
        .unwrap();
        let settings = input.build().unwrap();
        let inference = &settings.inference;
        assert_eq!(inference.scoring.psm_selection, PsmSelection::BestOnly);
        assert_eq!(inference.scoring.scoring, Scoring::BestPeptide);
        assert_eq!(inference.protein_inference, ProteinInference::Parsimony);
        assert_eq!(inference.decoy_policy, DecoyPolicy::All);
        assert_eq!(inference.q_value_threshold, None);
        assert!(!inference.fatal_malformed);
    }

    #[test]
    fn required_parameters() {
        let input: Input = serde_json::from_str(r#"{"score-direction": "HIGHER_BETTER", "records": "x"}"#).unwrap();
        assert!(input.build().is_err());

        let input: Input = serde_json::from_str(r#"{"score-kind": "hyperscore", "records": "x"}"#).unwrap();
        assert!(input.build().is_err());

        let input: Input =
            serde_json::from_str(r#"{"score-kind": "hyperscore", "score-direction": "HIGHER_BETTER"}"#).unwrap();
        assert!(input.build().is_err());
    }

    #[test]
    fn invalid_selection_is_rejected() {
        let input = serde_json::from_str::<Input>(r#"{"psm-selection": "TOP_3"}"#);
        assert!(input.is_err());
    }
}
