//! Console line layout that varies by level.
//!
//! INFO lines are the bare message, WARN lines get a `WARN:` prefix, and
//! everything else carries the module and line it came from. Error events
//! recorded with `critical = true` are labelled `CRITICAL`.

use std::fmt;

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::registry::LookupSpan;

const PURPLE: &str = "\x1b[35m";
const WHITE: &str = "\x1b[37m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const BOLD_RED: &str = "\x1b[1;31m";
const RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, Copy, Default)]
pub struct LevelFormat;

/// Finds a `critical = true` field on an event.
#[derive(Default)]
struct CriticalFlag(bool);

impl Visit for CriticalFlag {
    fn record_bool(&mut self, field: &Field, value: bool) {
        if field.name() == "critical" {
            self.0 = value;
        }
    }

    fn record_debug(&mut self, _field: &Field, _value: &dyn fmt::Debug) {}
}

impl<S, N> FormatEvent<S, N> for LevelFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let meta = event.metadata();
        let level = *meta.level();

        let mut critical = CriticalFlag::default();
        if level == Level::ERROR {
            event.record(&mut critical);
        }

        let color = match level {
            Level::TRACE | Level::DEBUG => PURPLE,
            Level::INFO => WHITE,
            Level::WARN => YELLOW,
            _ if critical.0 => BOLD_RED,
            _ => RED,
        };
        let ansi = writer.has_ansi_escapes();
        if ansi {
            write!(writer, "{color}")?;
        }

        match level {
            Level::INFO => {}
            Level::WARN => write!(writer, "WARN: ")?,
            _ => {
                let label = if critical.0 { "CRITICAL" } else { level.as_str() };
                let module = meta.module_path().unwrap_or_else(|| meta.target());
                match meta.line() {
                    Some(line) => write!(writer, "{label} ({module} L{line}): ")?,
                    None => write!(writer, "{label} ({module}): ")?,
                }
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        if ansi {
            write!(writer, "{RESET}")?;
        }
        writeln!(writer)
    }
}
