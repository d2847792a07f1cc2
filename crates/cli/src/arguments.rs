//! Command-line definition and parsing.

use std::ffi::OsString;

use clap::{Arg, ArgAction, Command, builder::OsStringValueParser};

/// Parsed command produced by [`parse_args`].
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ParsedArgs {
    pub(crate) show_help: bool,
    pub(crate) show_version: bool,
    pub(crate) verbose: u8,
    pub(crate) quiet: bool,
    pub(crate) info: Vec<String>,
    pub(crate) debug: Vec<String>,
    pub(crate) buffer_size: Option<OsString>,
    pub(crate) poll_interval: Option<OsString>,
    pub(crate) contimeout: Option<OsString>,
    pub(crate) fsync: bool,
    pub(crate) progress: bool,
    pub(crate) operands: Vec<OsString>,
}

/// Builds the `clap` command used for parsing.
fn clap_command() -> Command {
    Command::new("fetchpipe")
        .disable_help_flag(true)
        .disable_version_flag(true)
        .arg_required_else_help(false)
        .arg(
            Arg::new("help")
                .long("help")
                .short('h')
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("version")
                .long("version")
                .short('V')
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .action(ArgAction::Count),
        )
        .arg(
            Arg::new("quiet")
                .long("quiet")
                .short('q')
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("info")
                .long("info")
                .value_name("FLAGS")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("debug")
                .long("debug")
                .value_name("FLAGS")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("buffer-size")
                .long("buffer-size")
                .short('B')
                .value_name("SIZE")
                .value_parser(OsStringValueParser::new()),
        )
        .arg(
            Arg::new("poll-interval")
                .long("poll-interval")
                .value_name("MS")
                .value_parser(OsStringValueParser::new()),
        )
        .arg(
            Arg::new("contimeout")
                .long("contimeout")
                .value_name("SECS")
                .value_parser(OsStringValueParser::new()),
        )
        .arg(Arg::new("fsync").long("fsync").action(ArgAction::SetTrue))
        .arg(
            Arg::new("progress")
                .long("progress")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("operands")
                .value_name("OPERAND")
                .num_args(0..)
                .action(ArgAction::Append)
                .value_parser(OsStringValueParser::new()),
        )
}

/// Parses `arguments`, whose first item is the program name.
pub(crate) fn parse_args<I, S>(arguments: I) -> Result<ParsedArgs, clap::Error>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
{
    let mut matches = clap_command().try_get_matches_from(
        arguments.into_iter().map(Into::into).collect::<Vec<OsString>>(),
    )?;

    let strings = |matches: &mut clap::ArgMatches, id: &str| -> Vec<String> {
        matches
            .remove_many::<String>(id)
            .map(Iterator::collect)
            .unwrap_or_default()
    };

    Ok(ParsedArgs {
        show_help: matches.get_flag("help"),
        show_version: matches.get_flag("version"),
        verbose: matches.get_count("verbose"),
        quiet: matches.get_flag("quiet"),
        info: strings(&mut matches, "info"),
        debug: strings(&mut matches, "debug"),
        buffer_size: matches.remove_one::<OsString>("buffer-size"),
        poll_interval: matches.remove_one::<OsString>("poll-interval"),
        contimeout: matches.remove_one::<OsString>("contimeout"),
        fsync: matches.get_flag("fsync"),
        progress: matches.get_flag("progress"),
        operands: matches
            .remove_many::<OsString>("operands")
            .map(Iterator::collect)
            .unwrap_or_default(),
    })
}
