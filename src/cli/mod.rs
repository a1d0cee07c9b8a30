//! CLI argument parsing and validation module
//!
//! Handles command-line interface using clap, including:
//! - Configuration file selection and broker overrides
//! - Input source (stdin or a notification file)
//! - Dry-run mode against the in-memory broker
//! - Summary format and verbosity

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};

use fsaudit::config::{parse_setting, Overrides};

/// Parsed command-line options
#[derive(Debug, Clone)]
pub struct RelayArgs {
    pub config_path: Option<PathBuf>,
    pub overrides: Overrides,
    pub input: Option<PathBuf>,
    pub dry_run: bool,
    pub json_output: bool,
    pub quiet_mode: bool,
    pub verbosity: u8,
}

fn build_command() -> Command {
    Command::new("fsaudit")
        .version(env!("FSAUDIT_VERSION"))
        .long_version(env!("FSAUDIT_LONG_VERSION"))
        .about("Relay filesystem access notifications to a message broker")
        .long_about(
            "Reads filesystem access notifications (one JSON object per line), enriches each \
             with the command line of the accessing process and publishes it as an audit \
             record to a broker topic.",
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file (default: first of ./conf/*.toml, /etc/fsaudit/*.toml)")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("brokers")
                .short('b')
                .long("brokers")
                .value_name("LIST")
                .help("Comma-separated broker endpoints"),
        )
        .arg(
            Arg::new("topic")
                .short('t')
                .long("topic")
                .value_name("NAME")
                .help("Destination topic"),
        )
        .arg(
            Arg::new("set")
                .short('X')
                .long("set")
                .value_name("KEY=VALUE")
                .help("Broker client setting, may be repeated")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("max-attempts")
                .long("max-attempts")
                .value_name("N")
                .help("Produce attempts before a record is dropped")
                .value_parser(value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new("input")
                .short('i')
                .long("input")
                .value_name("FILE")
                .help("Read notifications from FILE instead of stdin")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .help("Publish to an in-memory broker that prints records on stdout")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("json")
                .short('j')
                .long("json")
                .help("Print the run summary as JSON")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Only log errors and skip the run summary")
                .action(ArgAction::SetTrue)
                .conflicts_with("verbose"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Increase log verbosity (-v info, -vv debug, -vvv trace)")
                .action(ArgAction::Count),
        )
}

/// Parse command line arguments
pub fn parse_args() -> Result<RelayArgs> {
    from_matches(&build_command().get_matches())
}

fn from_matches(matches: &ArgMatches) -> Result<RelayArgs> {
    let settings = matches
        .get_many::<String>("set")
        .map(|values| values.map(|raw| parse_setting(raw)).collect::<Result<Vec<_>, _>>())
        .transpose()?
        .unwrap_or_default();

    if let Some(input) = matches.get_one::<PathBuf>("input") {
        if !input.exists() {
            return Err(anyhow!("Input file does not exist: {}", input.display()));
        }
    }

    Ok(RelayArgs {
        config_path: matches.get_one::<PathBuf>("config").cloned(),
        overrides: Overrides {
            brokers: matches.get_one::<String>("brokers").cloned(),
            topic: matches.get_one::<String>("topic").cloned(),
            settings,
            max_attempts: matches.get_one::<u32>("max-attempts").copied(),
        },
        input: matches.get_one::<PathBuf>("input").cloned(),
        dry_run: matches.get_flag("dry-run"),
        json_output: matches.get_flag("json"),
        quiet_mode: matches.get_flag("quiet"),
        verbosity: matches.get_count("verbose"),
    })
}
