#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `cli` implements the command-line front-end of `fetchpipe`: it parses the
//! arguments, configures diagnostics, starts a
//! [`transfer::copy_remote_file_to_local`] session and drives it to
//! completion, mapping the outcome to an [`ExitCode`].
//!
//! # Design
//!
//! [`run`] accepts an iterator of arguments together with handles for standard
//! output and error, so tests can capture everything the binary would print.
//! Parsing uses a [`clap`](https://docs.rs/clap/) builder definition with the
//! built-in help and version flags disabled; both are rendered here instead.
//! Diagnostics go through `tracing`, filtered by the `logging` crate's
//! [`VerbosityLayer`](logging::VerbosityLayer). Setting `FETCHPIPE_LOG` adds an
//! `EnvFilter` in front of it.
//!
//! # Invariants
//!
//! - `run` never panics; failures surface as non-zero exit codes.
//! - Exactly two operands are accepted: the remote URL and the local
//!   destination path.
//!
//! # Examples
//!
//! ```
//! let mut stdout = Vec::new();
//! let mut stderr = Vec::new();
//! let exit_code = cli::run(["fetchpipe", "--version"], &mut stdout, &mut stderr);
//!
//! assert_eq!(exit_code, 0);
//! assert!(String::from_utf8(stdout).unwrap().starts_with("fetchpipe "));
//! assert!(stderr.is_empty());
//! ```

mod arguments;
mod exit_code;
mod size;

use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use logging::{InfoFlag, VerbosityConfig};
use tracing::warn;
use transfer::{CancelHandle, TransferConfig, TransferProgress, copy_remote_file_to_local};

pub use exit_code::ExitCode;

use arguments::{ParsedArgs, parse_args};
use size::{parse_duration_argument, parse_size_argument};

/// Maximum exit code representable by a Unix process.
const MAX_EXIT_CODE: i32 = u8::MAX as i32;

/// Environment variable holding an optional `tracing` filter directive.
pub const LOG_FILTER_ENV: &str = "FETCHPIPE_LOG";

const HELP_TEXT: &str = concat!(
    "fetchpipe ",
    env!("CARGO_PKG_VERSION"),
    "\n",
    "\n",
    "Usage: fetchpipe [OPTIONS] URL DEST\n",
    "\n",
    "Copies the remote file at URL (http:// or file://) into the local file\n",
    "DEST, replacing DEST if it exists. Data moves through a single buffer:\n",
    "each chunk is read from the source and written to DEST before the next\n",
    "chunk is requested.\n",
    "\n",
    "Options:\n",
    "  -v, --verbose            Increase verbosity (repeatable).\n",
    "  -q, --quiet              Suppress non-error output.\n",
    "      --info=FLAGS         Fine-grained info output (misc, progress, stats).\n",
    "      --debug=FLAGS        Fine-grained debug output (connect, io, pipeline, exit).\n",
    "  -B, --buffer-size=SIZE   Transfer buffer size (default 10K; accepts K/M/G).\n",
    "      --poll-interval=MS   Idle delay between scheduling slices (default 10).\n",
    "      --contimeout=SECS    Connection timeout (0 waits indefinitely).\n",
    "      --fsync              Sync DEST to stable storage when finished.\n",
    "      --progress           Show progress during the transfer.\n",
    "  -h, --help               Show this help message and exit.\n",
    "  -V, --version            Output version information and exit.\n",
);

/// Runs the CLI using the provided argument iterator and output handles.
///
/// Returns the process exit code.
pub fn run<I, S, Out, Err>(arguments: I, stdout: &mut Out, stderr: &mut Err) -> i32
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
    Out: Write,
    Err: Write,
{
    match parse_args(arguments) {
        Ok(parsed) => execute(parsed, stdout, stderr).as_i32(),
        Err(error) => {
            let rendered = error.to_string();
            let first = rendered.lines().next().unwrap_or_default();
            let detail = first.strip_prefix("error: ").unwrap_or(first);
            report(stderr, detail, ExitCode::Syntax)
        }
    }
}

/// Converts a numeric exit code into an [`std::process::ExitCode`].
#[must_use]
pub fn exit_code_from(status: i32) -> std::process::ExitCode {
    let clamped = status.clamp(0, MAX_EXIT_CODE);
    std::process::ExitCode::from(clamped as u8)
}

fn report<Err: Write>(stderr: &mut Err, detail: &str, code: ExitCode) -> i32 {
    let _ = writeln!(
        stderr,
        "fetchpipe error: {detail}: {code} (code {})",
        code.as_i32()
    );
    code.as_i32()
}

fn syntax<Err: Write>(stderr: &mut Err, detail: &str) -> ExitCode {
    report(stderr, detail, ExitCode::Syntax);
    let _ = writeln!(stderr, "Try 'fetchpipe --help' for more information.");
    ExitCode::Syntax
}

/// Settings derived from the parsed arguments.
#[derive(Debug)]
struct Invocation {
    url: String,
    destination: PathBuf,
    verbosity: VerbosityConfig,
    transfer: TransferConfig,
    show_progress: bool,
}

fn build_invocation(parsed: ParsedArgs) -> Result<Invocation, String> {
    let ParsedArgs {
        verbose,
        quiet,
        info,
        debug,
        buffer_size,
        poll_interval,
        contimeout,
        fsync,
        progress,
        operands,
        ..
    } = parsed;

    let [url, destination]: [OsString; 2] = operands.try_into().map_err(|operands: Vec<_>| {
        format!(
            "expected a URL and a destination, got {} operand{}",
            operands.len(),
            if operands.len() == 1 { "" } else { "s" }
        )
    })?;
    let url = url
        .into_string()
        .map_err(|url| format!("URL '{}' is not valid UTF-8", url.to_string_lossy()))?;

    let mut verbosity = if quiet {
        VerbosityConfig::default()
    } else {
        VerbosityConfig::from_verbose_level(verbose)
    };
    if progress && !quiet {
        verbosity.info.progress = verbosity.info.progress.max(1);
    }
    for list in &info {
        verbosity
            .apply_info_flags(list)
            .map_err(|error| format!("invalid --info value '{list}': {error}"))?;
    }
    for list in &debug {
        verbosity
            .apply_debug_flags(list)
            .map_err(|error| format!("invalid --debug value '{list}': {error}"))?;
    }

    let mut transfer = TransferConfig::default().with_fsync(fsync);
    if let Some(value) = buffer_size {
        let bytes = parse_size_argument(&value, "--buffer-size")?;
        transfer = transfer.with_buffer_capacity(usize::try_from(bytes).unwrap_or(usize::MAX));
    }
    if let Some(value) = poll_interval {
        let interval = parse_duration_argument(&value, "--poll-interval", Duration::from_millis)?;
        transfer = transfer.with_poll_interval(interval);
    }
    if let Some(value) = contimeout {
        let timeout = parse_duration_argument(&value, "--contimeout", Duration::from_secs)?;
        transfer = transfer.with_connect_timeout(Some(timeout));
    }

    Ok(Invocation {
        url,
        destination: PathBuf::from(destination),
        show_progress: verbosity.info.get(InfoFlag::Progress) > 0,
        verbosity,
        transfer,
    })
}

fn execute<Out, Err>(parsed: ParsedArgs, stdout: &mut Out, stderr: &mut Err) -> ExitCode
where
    Out: Write,
    Err: Write,
{
    if parsed.show_help {
        let _ = stdout.write_all(HELP_TEXT.as_bytes());
        return ExitCode::Ok;
    }
    if parsed.show_version {
        let _ = writeln!(stdout, "fetchpipe {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::Ok;
    }

    let invocation = match build_invocation(parsed) {
        Ok(invocation) => invocation,
        Err(detail) => return syntax(stderr, &detail),
    };
    init_logging(invocation.verbosity.clone());

    let session = match copy_remote_file_to_local(
        &invocation.url,
        &invocation.destination,
        &invocation.transfer,
    ) {
        Ok(session) => session,
        Err(error) => {
            let code = ExitCode::for_error(&error);
            report(stderr, &error.to_string(), code);
            return code;
        }
    };

    let signals = SignalGuard::install(&session.cancel_handle());
    let show_progress = invocation.show_progress;
    let outcome = session.run_with_progress(|progress| {
        if show_progress {
            render_progress(stdout, progress);
        }
    });
    drop(signals);
    if show_progress {
        let _ = writeln!(stdout);
    }

    match outcome {
        Ok(summary) => {
            if invocation.verbosity.info.get(InfoFlag::Stats) > 0 {
                let _ = writeln!(stdout, "{summary}");
            }
            ExitCode::Ok
        }
        Err(error) => {
            let code = ExitCode::for_error(&error);
            report(stderr, &error.to_string(), code);
            code
        }
    }
}

fn render_progress<Out: Write>(stdout: &mut Out, progress: &TransferProgress) {
    let _ = write!(stdout, "\r{progress}");
    let _ = stdout.flush();
}

/// Installs the tracing subscriber for this process.
///
/// A filter from [`LOG_FILTER_ENV`] is layered in front when the variable is
/// set and valid. Only the first call in a process installs anything.
fn init_logging(config: VerbosityConfig) {
    match tracing_subscriber::EnvFilter::try_from_env(LOG_FILTER_ENV) {
        Ok(filter) => {
            logging::init_tracing_with_filter(config, filter);
        }
        Err(_) => {
            logging::init_tracing(config);
        }
    }
}

/// Keeps SIGINT and SIGTERM wired to a transfer's cancel flag.
///
/// The first signal requests cancellation. A second one arriving while the
/// flag is still set exits the process with [`ExitCode::Signal`].
struct SignalGuard {
    #[cfg(unix)]
    ids: Vec<signal_hook::SigId>,
}

impl SignalGuard {
    #[cfg(unix)]
    fn install(cancel: &CancelHandle) -> Self {
        use signal_hook::consts::{SIGINT, SIGTERM};

        let mut ids = Vec::new();
        for signal in [SIGINT, SIGTERM] {
            let registered = signal_hook::flag::register_conditional_shutdown(
                signal,
                ExitCode::Signal.as_i32(),
                cancel.flag(),
            )
            .and_then(|shutdown| {
                ids.push(shutdown);
                signal_hook::flag::register(signal, cancel.flag())
            });
            match registered {
                Ok(id) => ids.push(id),
                Err(error) => {
                    warn!(target: "fetchpipe::exit", signal, %error, "cannot watch signal");
                }
            }
        }
        Self { ids }
    }

    #[cfg(not(unix))]
    fn install(_cancel: &CancelHandle) -> Self {
        Self {}
    }
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        #[cfg(unix)]
        for id in self.ids.drain(..) {
            signal_hook::low_level::unregister(id);
        }
    }
}
