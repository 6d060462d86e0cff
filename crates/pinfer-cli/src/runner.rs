use super::input::Settings;
use anyhow::Context;
use log::info;
use pinfer_core::pipeline::{InferenceResult, Pipeline, Summary};
use pinfer_core::psm::RawRecord;
use pinfer_core::Cancellation;
use serde::Serialize;
use std::io::BufRead;
use std::path::PathBuf;
use std::time::Instant;

pub struct Runner {
    pub parameters: Settings,
    start: Instant,
}

#[derive(Serialize)]
struct Results<'a> {
    parameters: &'a Settings,
    summary: &'a Summary,
}

impl Runner {
    pub fn new(parameters: Settings) -> Self {
        Self {
            parameters,
            start: Instant::now(),
        }
    }

    /// Read identification records, one JSON object per line. Blank lines are ignored
    pub fn read_records(&self) -> anyhow::Result<Vec<RawRecord>> {
        let path = &self.parameters.records;
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open records from `{path}`"))?;

        let mut records = Vec::new();
        for (ix, line) in std::io::BufReader::new(file).lines().enumerate() {
            let line = line.with_context(|| format!("Failed to read `{path}`"))?;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str::<RawRecord>(&line)
                .with_context(|| format!("Invalid record on line {} of `{path}`", ix + 1))?;
            records.push(record);
        }
        info!(
            "read {} records from {} in {}ms",
            records.len(),
            path,
            self.start.elapsed().as_millis()
        );
        Ok(records)
    }

    // Create a path for `file_name` in the output directory
    pub(crate) fn make_path<S: AsRef<str>>(&self, file_name: S) -> PathBuf {
        self.parameters.output_directory.join(file_name.as_ref())
    }

    pub fn run(mut self, cancel: &Cancellation) -> anyhow::Result<InferenceResult> {
        let records = self.read_records()?;

        let pipeline = Pipeline::new(self.parameters.inference.clone());
        let result = pipeline
            .run(records, cancel)
            .context("Protein inference failed")?;

        let summary = &result.summary;
        if summary.skipped_records > 0 {
            log::warn!(
                "skipped {} of {} malformed records",
                summary.skipped_records,
                summary.records
            );
        }
        if let Some(passing) = summary.passing_groups {
            log::info!(
                "discovered {} target protein groups at {} FDR",
                passing.targets,
                summary.q_value_threshold.unwrap_or_default()
            );
        }
        if let Some(psms) = summary.passing_psms {
            log::info!(
                "discovered {} target peptide-spectrum matches at {} FDR",
                psms,
                summary.q_value_threshold.unwrap_or_default()
            );
        }
        log::trace!("writing outputs");

        let path = self.write_groups(&result)?;
        self.parameters.output_paths.push(path);
        let path = self.write_psms(&result)?;
        self.parameters.output_paths.push(path);

        let path = self.make_path("results.json");
        self.parameters
            .output_paths
            .push(path.display().to_string());
        let results = Results {
            parameters: &self.parameters,
            summary: &result.summary,
        };
        println!("{}", serde_json::to_string_pretty(&results)?);

        let bytes = serde_json::to_vec_pretty(&results)?;
        std::fs::write(&path, bytes)
            .with_context(|| format!("Failed to write `{}`", path.display()))?;

        info!("finished in {}s", self.start.elapsed().as_secs());
        Ok(result)
    }
}
