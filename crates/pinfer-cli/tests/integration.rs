use pinfer_cli::input::Input;
use pinfer_cli::runner::Runner;
use pinfer_core::Cancellation;

const RECORDS: &str = r#"{"spectrum": "scan=1", "sequence": "AAAK", "charge": 2, "scores": {"hyperscore": 41.5}, "evidence": [{"accession": "P1"}, {"accession": "P2"}]}
{"spectrum": "scan=2", "sequence": "BBBK", "charge": 3, "scores": {"hyperscore": 38.0}, "evidence": [{"accession": "P1"}]}

{"spectrum": "scan=3", "sequence": "CCCK", "charge": 2, "scores": {"hyperscore": 12.0}, "evidence": [{"accession": "rev_P3", "decoy": true}]}
{"spectrum": "scan=4", "sequence": "DDDK", "scores": {}, "evidence": [{"accession": "P4"}]}
"#;

#[test]
fn integration() -> anyhow::Result<()> {
    let dir = std::env::temp_dir().join(format!("pinfer-integration-{}", std::process::id()));
    std::fs::create_dir_all(&dir)?;

    let records = dir.join("records.jsonl");
    std::fs::write(&records, RECORDS)?;

    let parameters = dir.join("parameters.json");
    let output_directory = dir.join("output");
    std::fs::write(
        &parameters,
        serde_json::to_vec(&serde_json::json!({
            "score-kind": "hyperscore",
            "score-direction": "HIGHER_BETTER",
            "qvalue-threshold": 0.01,
            "records": records.display().to_string(),
            "output-directory": output_directory.display().to_string(),
        }))?,
    )?;

    let settings = Input::load(&parameters)?.build()?;
    let result = Runner::new(settings).run(&Cancellation::default())?;

    assert_eq!(result.summary.records, 4);
    assert_eq!(result.summary.skipped_records, 1);
    assert_eq!(result.groups.len(), 2);
    assert_eq!(result.groups[0].representative.as_ref(), "P1");

    let groups = std::fs::read_to_string(output_directory.join("groups.pinfer.tsv"))?;
    let lines = groups.lines().collect::<Vec<_>>();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("rank\tcomponent\trepresentative\tmembers\tsubsumed"));
    let fields = lines[1].split('\t').collect::<Vec<_>>();
    assert_eq!(fields[2], "P1");
    assert_eq!(fields[3], "P1");
    assert_eq!(fields[4], "P2");
    assert_eq!(fields[8], "1");

    let psms = std::fs::read_to_string(output_directory.join("psms.pinfer.tsv"))?;
    assert_eq!(psms.lines().count(), 4);
    assert!(psms.lines().any(|line| line.starts_with("scan=1\t2\tAAAK\tP1;P2\t1\t41.5")));

    let results: serde_json::Value = serde_json::from_slice(&std::fs::read(
        output_directory.join("results.json"),
    )?)?;
    assert_eq!(results["summary"]["skipped_records"], 1);
    assert_eq!(results["parameters"]["score-kind"], "hyperscore");
    assert_eq!(results["parameters"]["output-paths"].as_array().map(Vec::len), Some(3));

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
fn missing_records_file() -> anyhow::Result<()> {
    let dir = std::env::temp_dir().join(format!("pinfer-missing-{}", std::process::id()));
    std::fs::create_dir_all(&dir)?;
    let parameters = dir.join("parameters.json");
    std::fs::write(
        &parameters,
        serde_json::to_vec(&serde_json::json!({
            "score-kind": "hyperscore",
            "score-direction": "HIGHER_BETTER",
            "records": dir.join("does-not-exist.jsonl").display().to_string(),
            "output-directory": dir.display().to_string(),
        }))?,
    )?;

    let settings = Input::load(&parameters)?.build()?;
    assert!(Runner::new(settings).run(&Cancellation::default()).is_err());

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}
