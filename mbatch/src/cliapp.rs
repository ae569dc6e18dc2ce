// This module implements the definition of the command line app.

use std::path::PathBuf;

use clap::{Arg, ArgAction, Command, value_parser};
use clap_complete::Shell;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const ABOUT: &str = "Formats structured log events into metric payloads.";

fn input_arg() -> Arg {
    Arg::new("input")
        .long("input")
        .short('i')
        .value_name("FILE")
        .value_parser(value_parser!(PathBuf))
        .help("Newline-delimited JSON events to read. Defaults to stdin.")
}

fn pretty_arg() -> Arg {
    Arg::new("pretty")
        .long("pretty")
        .action(ArgAction::SetTrue)
        .help("Pretty print the JSON payloads.")
}

pub fn make_app() -> Command {
    Command::new("mbatch")
        .disable_help_subcommand(true)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .propagate_version(true)
        .max_term_width(79)
        .version(VERSION)
        .about(ABOUT)
        .arg(
            Arg::new("config")
                .value_name("CONFIG")
                .long("config")
                .short('c')
                .global(true)
                .env("MBATCH_CONFIG_PATH")
                .default_value(".mbatch")
                .value_parser(value_parser!(PathBuf))
                .help("The path to the config folder."),
        )
        .arg(
            Arg::new("environment")
                .value_name("ENVIRONMENT")
                .long("environment")
                .global(true)
                .env("MBATCH_ENVIRONMENT")
                .help("The value of the environment dimension. Empty disables it."),
        )
        .arg(
            Arg::new("application")
                .value_name("APPLICATION")
                .long("application")
                .global(true)
                .env("MBATCH_APPLICATION")
                .help("The name of the application emitting the events."),
        )
        .arg(
            Arg::new("host")
                .value_name("HOST")
                .long("host")
                .global(true)
                .env("MBATCH_HOST")
                .help("The name of the host emitting the events. Defaults to the hostname."),
        )
        .arg(
            Arg::new("api_token")
                .value_name("TOKEN")
                .long("api-token")
                .global(true)
                .env("MBATCH_API_TOKEN")
                .hide_env_values(true)
                .help("The token for the ingestion backend."),
        )
        .arg(
            Arg::new("log_level")
                .value_name("LEVEL")
                .long("log-level")
                .global(true)
                .env("MBATCH_LOG_LEVEL")
                .help("The log level of mbatch: off, error, warn, info, debug or trace."),
        )
        .subcommand(
            Command::new("format")
                .about("Format events one at a time")
                .after_help(
                    "This writes one payload per input event without merging.  Timed \
                     events produce a gauge and a counter record in the same payload.",
                )
                .arg(input_arg())
                .arg(pretty_arg()),
        )
        .subcommand(
            Command::new("batch")
                .about("Aggregate events into a single payload")
                .after_help(
                    "This merges all input events into one payload.  Records with the \
                     same second, metric name and dimensions are combined: counters are \
                     summed and gauges are averaged.",
                )
                .arg(input_arg())
                .arg(pretty_arg()),
        )
        .subcommand(
            Command::new("config")
                .about("Manage the mbatch config")
                .subcommand_required(true)
                .arg_required_else_help(true)
                .subcommand(
                    Command::new("show")
                        .about("Show the entire config out for debugging purposes")
                        .after_help(
                            "This dumps out the entire config including the values \
                             which are not in the config file but filled in from \
                             defaults or overrides.",
                        )
                        .arg(
                            Arg::new("format")
                                .short('f')
                                .long("format")
                                .value_parser(["debug", "yaml"])
                                .default_value("yaml")
                                .help("The output format"),
                        ),
                ),
        )
        .subcommand(
            Command::new("generate-completions")
                .about("Generate shell completion file")
                .after_help(
                    "This generates a completions file for the shell of choice. \
                     The default selection will be an educated guess for the currently \
                     running shell.",
                )
                .arg(
                    Arg::new("format")
                        .short('f')
                        .long("format")
                        .value_name("SHELL")
                        .value_parser(value_parser!(Shell))
                        .help(
                            "Explicitly pick the shell to generate a completion file \
                             for.  The default is autodetection.",
                        ),
                ),
        )
}
