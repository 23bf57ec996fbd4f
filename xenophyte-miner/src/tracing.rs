//! Logging setup for the miner.
//!
//! Call [`init_journald_or_stdout`] once at startup. Everything else imports
//! the macros with `use crate::tracing::prelude::*`.
//!
//! On a terminal each event prints as
//!
//! ```text
//! 14:02:11 INFO  daemon: New job
//!                height=1050878, difficulty=10107, method=XENOPHYTE
//! ```
//!
//! with our own crate prefix dropped from the target and structured fields
//! on an indented second line.

use std::env;
use std::fmt::{self, Write as _};

use time::OffsetDateTime;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    fmt::{
        format::{DefaultFields, Writer},
        time::FormatTime,
        FmtContext, FormatEvent, FormatFields,
    },
    prelude::*,
    registry::LookupSpan,
};

pub mod prelude {
    #[allow(unused_imports)]
    pub use tracing::{debug, error, info, trace, warn};
}

use prelude::*;

const CRATE_PREFIX: &str = "xenophyte_miner::";

// Width of "HH:MM:SS LEVEL " so field lines align under the target.
const FIELD_INDENT: &str = "               ";

/// Install the global subscriber: journald under systemd, stdout otherwise.
pub fn init_journald_or_stdout() {
    if env::var("JOURNAL_STREAM").is_err() {
        init_stdout();
        return;
    }

    match tracing_journald::layer() {
        Ok(layer) => tracing_subscriber::registry().with(layer).init(),
        Err(e) => {
            init_stdout();
            error!(error = %e, "Journald unavailable, logging to stdout.");
        }
    }
}

// RUST_LOG filtering, INFO when unset.
fn init_stdout() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .with_env_var("RUST_LOG")
        .from_env_lossy();

    let layer = tracing_subscriber::fmt::layer()
        .with_timer(LocalTimer)
        .fmt_fields(DefaultFields::new())
        .event_format(MinerFormatter);

    tracing_subscriber::registry().with(filter).with(layer).init();
}

/// Target shown for an event. `log_target` is the `log.target` field of
/// events bridged from the `log` crate.
fn display_target<'a>(target: &'a str, log_target: Option<&'a str>) -> &'a str {
    if let Some(ours) = target.strip_prefix(CRATE_PREFIX) {
        ours
    } else if target == "log" {
        log_target.unwrap_or(target)
    } else {
        target
    }
}

/// Debug output without the `Some(..)` wrapper or string quotes.
fn clean_value(debug: &str) -> &str {
    let inner = debug
        .strip_prefix("Some(")
        .and_then(|s| s.strip_suffix(')'))
        .unwrap_or(debug);
    inner.trim_matches('"')
}

fn level_style(level: Level) -> (&'static str, &'static str) {
    match level {
        Level::ERROR => ("\x1b[31m", "ERROR"),
        Level::WARN => ("\x1b[33m", "WARN "),
        Level::INFO => ("\x1b[32m", "INFO "),
        Level::DEBUG => ("\x1b[34m", "DEBUG"),
        Level::TRACE => ("\x1b[35m", "TRACE"),
    }
}

#[derive(Default)]
struct Fields {
    message: Option<String>,
    pairs: Vec<(&'static str, String)>,
}

impl Fields {
    fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| clean_value(value))
    }
}

impl Visit for Fields {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let mut text = String::new();
        let _ = write!(text, "{value:?}");
        if field.name() == "message" {
            self.message = Some(text);
        } else {
            self.pairs.push((field.name(), text));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_owned());
        } else {
            self.pairs.push((field.name(), value.to_owned()));
        }
    }
}

struct MinerFormatter;

impl<S, N> FormatEvent<S, N> for MinerFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut fields = Fields::default();
        event.record(&mut fields);

        LocalTimer.format_time(&mut writer)?;
        let (color, label) = level_style(*event.metadata().level());
        write!(writer, " {color}{label}\x1b[0m ")?;

        let target = display_target(event.metadata().target(), fields.get("log.target"));
        write!(writer, "{target}: ")?;
        if let Some(message) = &fields.message {
            write!(writer, "{}", message.trim_matches('"'))?;
        }

        let mut shown = fields
            .pairs
            .iter()
            .filter(|(key, _)| !key.starts_with("log."))
            .peekable();
        if shown.peek().is_some() {
            write!(writer, "\n\x1b[90m{FIELD_INDENT}")?;
            for (i, (key, value)) in shown.enumerate() {
                let sep = if i == 0 { "" } else { ", " };
                write!(writer, "{sep}{key}={}", clean_value(value))?;
            }
            write!(writer, "\x1b[0m")?;
        }

        writeln!(writer)
    }
}

/// Local wall-clock time to the second.
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        let text = now
            .format(time::macros::format_description!(
                "[hour]:[minute]:[second]"
            ))
            .map_err(|_| fmt::Error)?;
        w.write_str(&text)
    }
}
