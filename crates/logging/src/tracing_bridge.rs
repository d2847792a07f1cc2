//! crates/logging/src/tracing_bridge.rs
//! Bridge between the tracing crate and the fetchpipe verbosity flags.
//!
//! Library code logs with plain `tracing` macros and a `fetchpipe::<flag>`
//! target. [`VerbosityLayer`] maps each event's target to an info or debug
//! flag, compares the event level with the configured flag level, and renders
//! the survivors as single lines on its writer (stderr by default). Every
//! rendered line is also recorded as a [`DiagnosticEvent`] on the emitting
//! thread so tests can inspect what was logged.
//!
//! | tracing level   | flag level needed |
//! |-----------------|-------------------|
//! | `INFO`          | 1                 |
//! | `DEBUG`         | 2                 |
//! | `TRACE`         | 3                 |
//! | `WARN`, `ERROR` | always shown      |
//!
//! Filtering uses the configuration stored in the layer rather than the
//! thread-local one, because endpoint workers emit events from their own
//! threads.
//!
//! [`DiagnosticEvent`]: crate::DiagnosticEvent

use std::fmt::{self, Write as _};
use std::io::Write as _;

use super::config::VerbosityConfig;
use super::levels::{DebugFlag, InfoFlag};
use super::thread_local::{emit_debug, emit_info};
use tracing::{Level, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Category an event target resolves to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Category {
    Info(InfoFlag),
    Debug(DebugFlag),
}

/// Map a tracing target to a flag category.
///
/// Only the last path segment is considered, so `fetchpipe::io` and `io`
/// both resolve to [`DebugFlag::Io`].
fn categorize(target: &str) -> Option<Category> {
    let segment = target.rsplit("::").next().unwrap_or(target);
    if let Some(flag) = InfoFlag::from_name(segment) {
        return Some(Category::Info(flag));
    }
    DebugFlag::from_name(segment).map(Category::Debug)
}

/// Map a tracing level to the flag level it requires.
const fn required_level(level: &Level) -> Option<u8> {
    match *level {
        Level::ERROR | Level::WARN => None,
        Level::INFO => Some(1),
        Level::DEBUG => Some(2),
        Level::TRACE => Some(3),
    }
}

/// A tracing layer that filters and prints events by verbosity flag.
pub struct VerbosityLayer<W = fn() -> std::io::Stderr> {
    config: VerbosityConfig,
    make_writer: W,
}

impl VerbosityLayer {
    /// Creates a layer that writes to stderr.
    #[must_use]
    pub fn new(config: VerbosityConfig) -> Self {
        Self {
            config,
            make_writer: std::io::stderr,
        }
    }
}

impl<W> VerbosityLayer<W> {
    /// Replaces the output destination.
    #[must_use]
    pub fn with_writer<W2>(self, make_writer: W2) -> VerbosityLayer<W2>
    where
        W2: for<'w> MakeWriter<'w> + 'static,
    {
        VerbosityLayer {
            config: self.config,
            make_writer,
        }
    }

    /// Returns the configuration used for filtering.
    #[must_use]
    pub const fn config(&self) -> &VerbosityConfig {
        &self.config
    }

    fn render(&self, event: &tracing::Event<'_>) -> Option<(Option<Category>, u8, String)> {
        let metadata = event.metadata();
        let category = categorize(metadata.target());

        let required = match required_level(metadata.level()) {
            None => 0,
            Some(required) => {
                let configured = match category? {
                    Category::Info(flag) => self.config.info.get(flag),
                    Category::Debug(flag) => self.config.debug.get(flag),
                };
                if configured < required {
                    return None;
                }
                required
            }
        };

        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);
        let body = visitor.finish();

        let line = match (*metadata.level(), category) {
            (Level::ERROR, _) => format!("fetchpipe: error: {body}"),
            (Level::WARN, _) => format!("fetchpipe: warning: {body}"),
            (_, Some(Category::Debug(flag))) => format!("[{flag}] {body}"),
            _ => body,
        };
        Some((category, required, line))
    }
}

impl<S, W> Layer<S> for VerbosityLayer<W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + 'static,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let Some((category, level, line)) = self.render(event) else {
            return;
        };

        let mut writer = self.make_writer.make_writer();
        let _ = writeln!(writer, "{line}");

        match category {
            Some(Category::Info(flag)) => emit_info(flag, level, line),
            Some(Category::Debug(flag)) => emit_debug(flag, level, line),
            None => {}
        }
    }
}

/// Collects the message and structured fields of an event into one line.
#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl LineVisitor {
    fn push_field(&mut self, name: &str, value: fmt::Arguments<'_>) {
        let _ = write!(self.fields, " {name}={value}");
    }

    fn finish(self) -> String {
        if self.message.is_empty() {
            self.fields.trim_start().to_owned()
        } else {
            self.message + &self.fields
        }
    }
}

impl tracing::field::Visit for LineVisitor {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_owned();
        } else {
            self.push_field(field.name(), format_args!("{value}"));
        }
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.push_field(field.name(), format_args!("{value:?}"));
        }
    }
}

/// Installs a global subscriber that routes events through [`VerbosityLayer`].
///
/// The configuration is also installed on the calling thread so
/// [`info_gte`](crate::info_gte) checks agree with the layer. Returns false
/// when a global subscriber was already installed.
pub fn init_tracing(config: VerbosityConfig) -> bool {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    super::thread_local::init(config.clone());

    tracing_subscriber::registry()
        .with(VerbosityLayer::new(config))
        .try_init()
        .is_ok()
}

/// Like [`init_tracing`], with an additional filter layer in front.
///
/// The CLI uses this to honour an `EnvFilter` taken from the environment.
pub fn init_tracing_with_filter<F>(config: VerbosityConfig, filter: F) -> bool
where
    F: Layer<tracing_subscriber::Registry> + Send + Sync + 'static,
{
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    super::thread_local::init(config.clone());

    tracing_subscriber::registry()
        .with(filter)
        .with(VerbosityLayer::new(config))
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread_local::drain_events;
    use crate::DiagnosticEvent;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::layer::SubscriberExt;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn with_layer(config: VerbosityConfig, body: impl FnOnce()) -> String {
        let captured = Captured::default();
        let sink = captured.clone();
        let layer = VerbosityLayer::new(config).with_writer(move || sink.clone());
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, body);
        captured.text()
    }

    #[test]
    fn categorize_uses_last_segment() {
        assert_eq!(
            categorize("fetchpipe::io"),
            Some(Category::Debug(DebugFlag::Io))
        );
        assert_eq!(
            categorize("fetchpipe::progress"),
            Some(Category::Info(InfoFlag::Progress))
        );
        assert_eq!(categorize("exit"), Some(Category::Debug(DebugFlag::Exit)));
        assert_eq!(categorize("fetchpipe::radio"), None);
    }

    #[test]
    fn required_levels_follow_tracing_levels() {
        assert_eq!(required_level(&Level::WARN), None);
        assert_eq!(required_level(&Level::INFO), Some(1));
        assert_eq!(required_level(&Level::DEBUG), Some(2));
        assert_eq!(required_level(&Level::TRACE), Some(3));
    }

    #[test]
    fn events_below_flag_level_are_dropped() {
        let mut config = VerbosityConfig::default();
        config.debug.pipeline = 1;

        let output = with_layer(config, || {
            tracing::info!(target: "fetchpipe::pipeline", offset = 0u64, "read scheduled");
            tracing::debug!(target: "fetchpipe::pipeline", "too detailed");
            tracing::info!(target: "fetchpipe::io", "io disabled");
        });

        assert_eq!(output, "[pipeline] read scheduled offset=0\n");
        let events = drain_events();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            DiagnosticEvent::Debug {
                flag: DebugFlag::Pipeline,
                level: 1,
                ..
            }
        ));
    }

    #[test]
    fn info_events_render_without_prefix() {
        let config = VerbosityConfig::from_verbose_level(1);
        let output = with_layer(config, || {
            tracing::info!(target: "fetchpipe::stats", bytes = 10_000u64, "transfer complete");
        });
        assert_eq!(output, "transfer complete bytes=10000\n");
        drain_events();
    }

    #[test]
    fn warnings_and_errors_are_always_shown() {
        let output = with_layer(VerbosityConfig::default(), || {
            tracing::warn!(target: "fetchpipe::io", "closing sink failed");
            tracing::error!(target: "somewhere::else", code = 11, "write failed");
        });
        assert_eq!(
            output,
            "fetchpipe: warning: closing sink failed\nfetchpipe: error: write failed code=11\n"
        );
        drain_events();
    }
}
