use anyhow::Context;
use clap::{value_parser, Arg, Command, ValueHint};
use pinfer_cli::input::Input;
use pinfer_cli::runner::Runner;
use pinfer_core::Cancellation;
use rayon::ThreadPoolBuilder;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::default()
        .filter_level(log::LevelFilter::Error)
        .parse_env(env_logger::Env::default().filter_or("PINFER_LOG", "error,pinfer=info"))
        .init();

    let matches = Command::new("pinfer")
        .version(clap::crate_version!())
        .author("The pinfer developers")
        .about("Protein inference, grouping and target-decoy FDR for peptide-spectrum matches")
        .arg(
            Arg::new("parameters")
                .required(true)
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help("Path to configuration parameters (JSON file)")
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("records")
                .short('r')
                .long("records")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help(
                    "Path to identification records, one JSON object per line. \
                     Overrides the records listed in the configuration file.",
                )
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("output-directory")
                .short('o')
                .long("output-directory")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help(
                    "Path where protein groups and PSMs will be written. \
                     Overrides the directory specified in the configuration file.",
                )
                .value_hint(ValueHint::DirPath),
        )
        .arg(
            Arg::new("score-kind")
                .long("score-kind")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help("Name of the PSM score used for scoring protein groups")
                .value_hint(ValueHint::Other),
        )
        .arg(
            Arg::new("qvalue-threshold")
                .long("qvalue-threshold")
                .value_parser(value_parser!(f64))
                .help("Report the number of protein groups and PSMs passing this q-value")
                .value_hint(ValueHint::Other),
        )
        .arg(
            Arg::new("threads")
                .long("threads")
                .value_parser(value_parser!(u16).range(1..))
                .help("Number of worker threads (default = # of CPUs)")
                .value_hint(ValueHint::Other),
        )
        .help_template(
            "{usage-heading} {usage}\n\n\
             {about-with-newline}\n\
             Written by {author-with-newline}Version {version}\n\n\
             {all-args}{after-help}",
        )
        .get_matches();

    let threads = matches
        .get_one::<u16>("threads")
        .map(|&n| n as usize)
        .unwrap_or_else(num_cpus::get);
    ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .context("Failed to configure thread pool")?;

    let input = Input::from_arguments(matches)?;
    let runner = input.build().map(Runner::new)?;
    runner.run(&Cancellation::default())?;

    Ok(())
}
