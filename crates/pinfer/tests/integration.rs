use pinfer_core::graph::Graph;
use pinfer_core::grouping::connected_components;
use pinfer_core::pipeline::{InferenceResult, InferenceSettings, Pipeline};
use pinfer_core::psm::{adapt, DecoyPolicy, RawRecord};
use pinfer_core::scoring::ScoreDirection;
use pinfer_core::{Cancellation, Warning};
use quickcheck_macros::quickcheck;
use std::collections::BTreeMap;

/// JSON-lines records, the way a data-access layer would hand them over
const RECORDS: &str = r#"
{"spectrum": "scan=1", "sequence": "AAAK", "charge": 2, "scores": {"hyperscore": 41.5}, "evidence": [{"accession": "P1", "start": 10, "end": 13}, {"accession": "P2"}]}
{"spectrum": "scan=2", "sequence": "bbbk", "charge": 3, "scores": {"hyperscore": 38.0}, "evidence": [{"accession": "P1", "start": 40, "end": 43}]}
{"spectrum": "scan=3", "sequence": "CCCK", "charge": 2, "scores": {"hyperscore": 12.0}, "evidence": [{"accession": "rev_P3", "decoy": true}]}
{"spectrum": "scan=4", "sequence": "DDDK", "scores": {}, "evidence": [{"accession": "P4"}]}
{"spectrum": "scan=5", "sequence": "EEEK", "charge": 2, "scores": {"hyperscore": 20.0}, "evidence": [{"accession": "P5"}]}
"#;

fn parse(input: &str) -> Vec<RawRecord> {
    serde_json::Deserializer::from_str(input)
        .into_iter::<RawRecord>()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

fn run(records: Vec<RawRecord>, settings: InferenceSettings) -> InferenceResult {
    Pipeline::new(settings)
        .run(records, &Cancellation::default())
        .unwrap()
}

#[test]
fn subset_protein_is_subsumed() {
    let result = run(
        parse(RECORDS),
        InferenceSettings::new("hyperscore", ScoreDirection::HigherIsBetter),
    );
    let group = result
        .groups
        .iter()
        .find(|g| g.accessions().any(|acc| acc == "P2"))
        .unwrap();
    assert_eq!(group.representative.as_ref(), "P1");
    assert_eq!(group.leaders().count(), 1);
    assert!(group.members.iter().any(|m| m.accession.as_ref() == "P2" && m.subsumed));
    assert_eq!(group.peptides.len(), 2);
    assert_eq!(group.score, Some(41.5));

    let p1 = result.graph.protein_ix("P1").unwrap();
    let p2 = result.graph.protein_ix("P2").unwrap();
    assert_eq!(result.graph[p2].subsumed_into, Some(p1));
    let bbb = result.graph.peptide_ix("BBBK").unwrap();
    assert_eq!(result.graph[p1].offsets(bbb), Some((Some(40), Some(43))));
}

#[test]
fn interleaved_decoys() {
    let records = (1..=10)
        .map(|rank| {
            let decoy = rank % 2 == 0;
            let accession = match decoy {
                true => format!("rev_PROT{}", rank),
                false => format!("PROT{}", rank),
            };
            serde_json::from_value::<RawRecord>(serde_json::json!({
                "spectrum": format!("scan={}", rank),
                "sequence": format!("PEPTIDE{}K", rank),
                "scores": {"score": 11 - rank},
                "evidence": [{"accession": accession, "decoy": decoy}],
            }))
            .unwrap()
        })
        .collect::<Vec<_>>();

    let result = run(
        records,
        InferenceSettings::new("score", ScoreDirection::HigherIsBetter),
    );
    assert_eq!(result.groups.len(), 10);
    let q = result
        .groups
        .iter()
        .map(|g| g.q_value.unwrap())
        .collect::<Vec<_>>();
    assert_eq!(q[0], 0.0);
    assert_eq!(q[9], 1.0);
    assert!(q.windows(2).all(|w| w[0] <= w[1]));
    assert!(result
        .groups
        .iter()
        .enumerate()
        .all(|(ix, g)| g.decoy == (ix % 2 == 1)));
}

#[test]
fn record_without_scores_is_skipped() {
    let result = run(
        parse(RECORDS),
        InferenceSettings::new("hyperscore", ScoreDirection::HigherIsBetter),
    );
    let summary = &result.summary;
    assert_eq!(summary.records, 5);
    assert_eq!(summary.skipped_records, 1);
    assert_eq!(summary.psms, 4);
    assert!(result.graph.protein_ix("P4").is_none());
    assert!(summary
        .warnings
        .iter()
        .any(|w| matches!(w, Warning::MalformedRecord { record: 3, .. })));
    assert_eq!(summary.total_groups, 3);
    assert!(!summary.cancelled);
}

/// Small random evidence graphs: (peptide, protein, score) triples over a
/// handful of peptides and proteins, so that proteins share evidence
fn records(data: &[(u8, u8, u8)]) -> Vec<RawRecord> {
    data.iter()
        .enumerate()
        .map(|(ix, &(peptide, protein, score))| {
            let protein = protein % 8;
            let decoy = protein % 4 == 0;
            let accession = match decoy {
                true => format!("rev_P{}", protein),
                false => format!("P{}", protein),
            };
            serde_json::from_value::<RawRecord>(serde_json::json!({
                "spectrum": format!("scan={}", ix),
                "sequence": format!("PEP{}K", peptide % 12),
                "charge": 2,
                "scores": {"score": score},
                "evidence": [{"accession": accession, "decoy": decoy}],
            }))
            .unwrap()
        })
        .collect()
}

fn settings() -> InferenceSettings {
    InferenceSettings::new("score", ScoreDirection::HigherIsBetter)
}

#[quickcheck]
fn every_protein_in_exactly_one_group(data: Vec<(u8, u8, u8)>) -> bool {
    let result = run(records(&data), settings());

    let mut seen = BTreeMap::new();
    for group in &result.groups {
        for accession in group.accessions() {
            *seen.entry(accession.to_string()).or_insert(0) += 1;
        }
        // Exactly one representative, and it leads the group
        if group.leaders().next().map(|m| &m.accession) != Some(&group.representative) {
            return false;
        }
    }
    seen.len() == result.graph.proteins().len() && seen.values().all(|&n| n == 1)
}

#[quickcheck]
fn every_peptide_in_exactly_one_component(data: Vec<(u8, u8, u8)>) -> bool {
    let (graph, _) = Graph::build(
        records(&data)
            .into_iter()
            .enumerate()
            .map(|(ix, raw)| adapt(ix, raw, DecoyPolicy::All).unwrap().psm),
    );
    let (components, _) = connected_components(&graph);

    let mut seen = vec![0usize; graph.peptides().len()];
    for component in &components {
        for peptide in &component.peptides {
            seen[peptide.0 as usize] += 1;
            // Every protein of a peptide lives in the peptide's component
            if !graph[*peptide]
                .proteins
                .iter()
                .all(|protein| component.proteins.contains(protein))
            {
                return false;
            }
        }
    }
    seen.iter().all(|&n| n == 1)
}

#[quickcheck]
fn input_order_does_not_matter(data: Vec<(u8, u8, u8)>) -> bool {
    let summarize = |result: InferenceResult| {
        result
            .groups
            .iter()
            .map(|g| {
                (
                    g.representative.to_string(),
                    g.accessions().map(String::from).collect::<Vec<_>>(),
                    g.score,
                    g.q_value,
                )
            })
            .collect::<Vec<_>>()
    };

    let forward = records(&data);
    let mut reverse = forward.clone();
    reverse.reverse();

    summarize(run(forward, settings())) == summarize(run(reverse, settings()))
}
