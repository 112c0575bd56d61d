//! CLI bindings for all internal commands and modules.
//!
//! This module focuses on the common CLI bindings required to provide easy
//! APIs and consistency across all other modules. This is where the parent
//! CLI can be found, as well as utilities for fetching common switches and
//! values.
use clap::{App, AppSettings, Arg, ArgMatches};
use regex::Regex;

use std::time::Duration;

use crate::types::UtilResult;

/// Constructs a new CLI application using Clap.
///
/// This will register all subcommand modules and embed all metadata. All
/// metadata is fetched dynamically from Cargo and shouldn't require to
/// be updated (ever).
pub fn build<'a, 'b>() -> App<'a, 'b> {
    App::new("")
        .name(env!("CARGO_PKG_NAME"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .author(env!("CARGO_PKG_AUTHORS"))
        .subcommand(crate::migrate::cmd())
        .subcommand(crate::provision::cmd())
        .settings(&[
            AppSettings::ArgRequiredElseHelp,
            AppSettings::DisableHelpSubcommand,
            AppSettings::SubcommandRequiredElseHelp,
            AppSettings::VersionlessSubcommands,
        ])
}

/// Executes a subcommand based on the parsed arguments from the CLI.
///
/// Each tool talks to a different service with different credentials, so
/// client construction is left to the subcommand modules.
pub async fn exec(args: &ArgMatches<'_>) -> UtilResult<()> {
    match args.subcommand() {
        ("migrate", Some(subargs)) => crate::migrate::exec(subargs).await,
        ("provision", Some(subargs)) => crate::provision::exec(subargs).await,
        _ => {
            build().print_help()?;
            Ok(())
        }
    }
}

/// Fetches the set of global arguments which should be attached on each command.
pub fn global_args<'a, 'b>() -> [Arg<'a, 'b>; 2] {
    [
        Arg::with_name("dry")
            .help("Only print out the calculated changes")
            .short("d")
            .long("dry-run"),
        Arg::with_name("quiet")
            .help("Only prints errors during execution")
            .short("q")
            .long("quiet"),
    ]
}

/// Determines if the dry-run switch was provided in this execution.
pub fn is_dry_run(args: &ArgMatches<'_>) -> bool {
    args.is_present("dry")
}

/// Fetches a required argument, erroring when clap let it through empty.
pub fn required<'a>(args: &'a ArgMatches<'_>, name: &str) -> UtilResult<&'a str> {
    args.value_of(name)
        .ok_or_else(|| format!("Missing required argument: {}", name).into())
}

/// Parses a human byte size such as `500MiB`, `5GiB` or `1048576`.
///
/// Only binary suffixes are accepted, as S3 limits are all defined in
/// powers of two.
pub fn parse_size(input: &str) -> UtilResult<u64> {
    let pattern = Regex::new(r"^(\d+)\s*(B|KiB|MiB|GiB|TiB)?$")?;
    let captures = pattern
        .captures(input.trim())
        .ok_or_else(|| format!("Invalid byte size: {}", input))?;

    let value = captures[1]
        .parse::<u64>()
        .map_err(|_| format!("Invalid byte size: {}", input))?;

    let shift = match captures.get(2).map(|m| m.as_str()) {
        None | Some("B") => 0,
        Some("KiB") => 10,
        Some("MiB") => 20,
        Some("GiB") => 30,
        Some(_) => 40,
    };

    value
        .checked_mul(1 << shift)
        .ok_or_else(|| format!("Byte size out of range: {}", input).into())
}

/// Parses a human duration such as `60s` or `48h`.
pub fn parse_duration(input: &str) -> UtilResult<Duration> {
    Ok(humantime::parse_duration(input)?)
}
