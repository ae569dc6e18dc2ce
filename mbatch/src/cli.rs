use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::ArgMatches;
use clap_complete::{Shell, generate};
use mbatch_config::{Config, OverridableConfig};
use mbatch_metrics::{Batch, Formatter, ValidationError, parse_events};

use crate::cliapp::make_app;

/// Returns the matches of the innermost subcommand.
///
/// Global arguments are propagated down, so they can always be read from the innermost matches.
fn leaf_matches(matches: &ArgMatches) -> &ArgMatches {
    match matches.subcommand() {
        Some((_, sub_matches)) => leaf_matches(sub_matches),
        None => matches,
    }
}

fn get_string(matches: &ArgMatches, name: &str) -> Option<String> {
    matches.get_one::<String>(name).cloned()
}

/// Extracts configuration overrides from the command line arguments and environment.
fn extract_config_args(matches: &ArgMatches) -> OverridableConfig {
    OverridableConfig {
        environment: get_string(matches, "environment"),
        application: get_string(matches, "application"),
        host: get_string(matches, "host"),
        api_token: get_string(matches, "api_token"),
        log_level: get_string(matches, "log_level"),
        ..Default::default()
    }
}

/// Returns the hostname of this machine, if it can be determined.
fn system_hostname() -> Option<String> {
    hostname::get().ok()?.into_string().ok()
}

/// Runs the command line application.
pub fn execute() -> Result<()> {
    let app = make_app();
    let matches = app.get_matches();
    let leaf = leaf_matches(&matches);

    let config_path = leaf
        .get_one::<PathBuf>("config")
        .map(PathBuf::as_path)
        .unwrap_or(Path::new(".mbatch"));

    let mut config = Config::from_path(config_path)?;
    config.apply_override(extract_config_args(leaf))?;

    mbatch_log::init(config.logging());

    match matches.subcommand() {
        Some(("format", sub_matches)) => format_command(&config, sub_matches),
        Some(("batch", sub_matches)) => batch_command(&config, sub_matches),
        Some(("config", sub_matches)) => config_command(&config, sub_matches),
        Some(("generate-completions", sub_matches)) => generate_completions(sub_matches),
        _ => unreachable!("unknown subcommand"),
    }
}

/// Creates the formatter for the loaded configuration.
///
/// If host logging is enabled but no host is configured, this falls back to the hostname.
fn make_formatter(config: &Config) -> Formatter {
    let default_host = if config.formatter().log_host && config.context().host.is_none() {
        system_hostname()
    } else {
        None
    };

    let context = config.log_context(default_host);
    mbatch_log::debug!(
        host = context.host.as_deref(),
        application = context.application.as_deref(),
        "resolved logging context"
    );

    Formatter::new(config.formatter().clone(), context)
}

fn open_input(matches: &ArgMatches) -> Result<Box<dyn BufRead>> {
    match matches.get_one::<PathBuf>("input") {
        Some(path) if path.as_os_str() != "-" => {
            let file = File::open(path)
                .with_context(|| format!("failed to open input file {}", path.display()))?;
            Ok(Box::new(BufReader::new(file)))
        }
        _ => Ok(Box::new(io::stdin().lock())),
    }
}

fn write_batch<W: Write>(mut writer: W, batch: &Batch, pretty: bool) -> Result<()> {
    let json = match pretty {
        true => batch.to_json_pretty(),
        false => batch.to_json(),
    }
    .context("failed to serialize payload")?;

    writeln!(writer, "{json}")?;
    Ok(())
}

/// Writes one payload per event to `writer`.
pub fn format_events<R, W>(
    formatter: &Formatter,
    reader: R,
    mut writer: W,
    pretty: bool,
) -> Result<()>
where
    R: BufRead,
    W: Write,
{
    let events = parse_events(reader)?;

    for (index, event) in events.iter().enumerate() {
        let batch = formatter
            .format_event(event)
            .map_err(|error| ValidationError::new(index, error.kind().clone()))?;
        write_batch(&mut writer, &batch, pretty)?;
    }

    mbatch_log::info!("formatted {} events", events.len());
    Ok(())
}

/// Writes a single aggregated payload of all events to `writer`.
pub fn batch_events<R, W>(formatter: &Formatter, reader: R, writer: W, pretty: bool) -> Result<()>
where
    R: BufRead,
    W: Write,
{
    let events = parse_events(reader)?;

    let mut aggregator = formatter.aggregator();
    aggregator.extend(&events)?;
    let record_count = aggregator.record_count();
    let batch = aggregator.finish();

    mbatch_log::info!(
        "aggregated {} events into {} records",
        events.len(),
        record_count
    );

    write_batch(writer, &batch, pretty)
}

fn format_command(config: &Config, matches: &ArgMatches) -> Result<()> {
    let formatter = make_formatter(config);
    let reader = open_input(matches)?;
    format_events(&formatter, reader, io::stdout().lock(), matches.get_flag("pretty"))
}

fn batch_command(config: &Config, matches: &ArgMatches) -> Result<()> {
    let formatter = make_formatter(config);
    let reader = open_input(matches)?;
    batch_events(&formatter, reader, io::stdout().lock(), matches.get_flag("pretty"))
}

pub fn config_command(config: &Config, matches: &ArgMatches) -> Result<()> {
    if let Some(matches) = matches.subcommand_matches("show") {
        return show_config(config, matches, io::stdout().lock());
    }

    unreachable!("unknown config subcommand");
}

fn show_config<W: Write>(config: &Config, matches: &ArgMatches, mut writer: W) -> Result<()> {
    match matches.get_one::<String>("format").map(String::as_str) {
        Some("debug") => writeln!(writer, "{config:#?}")?,
        Some("yaml") | None => write!(writer, "{}", config.to_yaml_string()?)?,
        Some(format) => unreachable!("unknown config format {format}"),
    }

    Ok(())
}

pub fn generate_completions(matches: &ArgMatches) -> Result<()> {
    let shell = match matches.get_one::<Shell>("format") {
        Some(shell) => *shell,
        None => Shell::from_env().unwrap_or(Shell::Bash),
    };

    let mut app = make_app();
    let name = app.get_name().to_owned();
    generate(shell, &mut app, name, &mut io::stdout());

    Ok(())
}
