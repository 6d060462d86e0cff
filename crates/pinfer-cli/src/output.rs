use crate::runner::Runner;
use anyhow::Context;
use pinfer_core::grouping::{AmbiguityGroup, Member};
use pinfer_core::pipeline::InferenceResult;
use pinfer_core::psm::PeptideSpectrumMatch;
use rayon::prelude::*;

fn push_float(record: &mut csv::ByteRecord, value: Option<f64>) {
    match value {
        Some(value) => record.push_field(ryu::Buffer::new().format(value).as_bytes()),
        None => record.push_field(b""),
    }
}

fn accessions(members: &[&Member]) -> String {
    members
        .iter()
        .map(|m| m.accession.as_ref())
        .collect::<Vec<&str>>()
        .join(";")
}

fn label(decoy: bool) -> i32 {
    match decoy {
        true => -1,
        false => 1,
    }
}

impl Runner {
    pub fn serialize_group(&self, rank: usize, group: &AmbiguityGroup) -> csv::ByteRecord {
        let mut record = csv::ByteRecord::new();
        record.push_field(itoa::Buffer::new().format(rank).as_bytes());
        record.push_field(itoa::Buffer::new().format(group.component).as_bytes());
        record.push_field(group.representative.as_bytes());
        let (leaders, subsumed): (Vec<_>, Vec<_>) =
            group.members.iter().partition(|m| !m.subsumed);
        record.push_field(accessions(&leaders).as_bytes());
        record.push_field(accessions(&subsumed).as_bytes());
        record.push_field(itoa::Buffer::new().format(group.peptides.len()).as_bytes());
        record.push_field(itoa::Buffer::new().format(group.psms.len()).as_bytes());
        push_float(&mut record, group.score);
        record.push_field(itoa::Buffer::new().format(label(group.decoy)).as_bytes());
        push_float(&mut record, group.fdr);
        push_float(&mut record, group.q_value);
        record
    }

    pub fn write_groups(&self, result: &InferenceResult) -> anyhow::Result<String> {
        let path = self.make_path("groups.pinfer.tsv");

        let mut wtr = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(vec![]);

        let headers = csv::ByteRecord::from(vec![
            "rank",
            "component",
            "representative",
            "members",
            "subsumed",
            "peptides",
            "psms",
            "score",
            "label",
            "fdr",
            "q_value",
        ]);

        wtr.write_byte_record(&headers)?;
        for record in result
            .groups
            .par_iter()
            .enumerate()
            .map(|(ix, group)| self.serialize_group(ix + 1, group))
            .collect::<Vec<_>>()
        {
            wtr.write_byte_record(&record)?;
        }

        wtr.flush()?;
        let bytes = wtr.into_inner()?;
        std::fs::write(&path, bytes)
            .with_context(|| format!("Failed to write `{}`", path.display()))?;
        Ok(path.display().to_string())
    }

    pub fn serialize_psm(&self, psm: &PeptideSpectrumMatch) -> csv::ByteRecord {
        let mut proteins = psm
            .evidence()
            .iter()
            .map(|ev| ev.accession.as_ref())
            .collect::<Vec<&str>>();
        proteins.sort_unstable();
        proteins.dedup();

        let mut record = csv::ByteRecord::new();
        record.push_field(psm.spectrum().as_bytes());
        record.push_field(itoa::Buffer::new().format(psm.charge()).as_bytes());
        record.push_field(psm.peptide().as_bytes());
        record.push_field(proteins.join(";").as_bytes());
        record.push_field(itoa::Buffer::new().format(label(psm.is_decoy())).as_bytes());
        push_float(
            &mut record,
            psm.score(&self.parameters.inference.scoring.score_kind),
        );
        push_float(&mut record, psm.fdr());
        push_float(&mut record, psm.q_value());
        record
    }

    pub fn write_psms(&self, result: &InferenceResult) -> anyhow::Result<String> {
        let path = self.make_path("psms.pinfer.tsv");

        let mut wtr = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(vec![]);

        let headers = csv::ByteRecord::from(vec![
            "spectrum", "charge", "peptide", "proteins", "label", "score", "fdr", "q_value",
        ]);

        wtr.write_byte_record(&headers)?;
        for record in result
            .graph
            .psms()
            .par_iter()
            .map(|psm| self.serialize_psm(psm))
            .collect::<Vec<_>>()
        {
            wtr.write_byte_record(&record)?;
        }

        wtr.flush()?;
        let bytes = wtr.into_inner()?;
        std::fs::write(&path, bytes)
            .with_context(|| format!("Failed to write `{}`", path.display()))?;
        Ok(path.display().to_string())
    }
}
