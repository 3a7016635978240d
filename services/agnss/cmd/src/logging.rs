//! Console log formatting for the agnss binary.
//!
//! Lines look like `[timestamp] [component] [level] message key=value`.

use std::fmt::{self, Write as _};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::{format::Writer, FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

const COLOR_RESET: &str = "\x1b[0m";
const COLOR_CYAN: &str = "\x1b[36m";
const COLOR_GREEN: &str = "\x1b[32m";
const COLOR_BRIGHT_YELLOW: &str = "\x1b[93m";
const COLOR_BRIGHT_RED: &str = "\x1b[91m";
const COLOR_BRIGHT_GRAY: &str = "\x1b[90m";

const COMPONENT_WIDTH: usize = 18;
const LEVEL_WIDTH: usize = 9;

/// Log an info event tagged with a component
#[macro_export]
macro_rules! component_info {
    ($component:expr, $($arg:tt)*) => {
        tracing::info!(component = $component, $($arg)*)
    };
}

/// Log a warning tagged with a component
#[macro_export]
macro_rules! component_warn {
    ($component:expr, $($arg:tt)*) => {
        tracing::warn!(component = $component, $($arg)*)
    };
}

/// Log a debug event tagged with a component
#[macro_export]
macro_rules! component_debug {
    ($component:expr, $($arg:tt)*) => {
        tracing::debug!(component = $component, $($arg)*)
    };
}

/// Log an error tagged with a component
#[macro_export]
macro_rules! component_error {
    ($component:expr, $($arg:tt)*) => {
        tracing::error!(component = $component, $($arg)*)
    };
}

/// Event formatter producing aligned, optionally coloured lines
pub struct AgnssLogFormatter {
    default_component: String,
    color_enabled: bool,
}

impl AgnssLogFormatter {
    pub fn new(default_component: impl Into<String>) -> Self {
        Self {
            default_component: default_component.into(),
            color_enabled: color_supported(),
        }
    }

    #[cfg(test)]
    fn plain(default_component: &str) -> Self {
        Self {
            default_component: default_component.to_string(),
            color_enabled: false,
        }
    }

    /// Component name padded or truncated to a fixed width
    fn component_column(&self, component: Option<&str>) -> String {
        let name = match component {
            Some(comp) => format!("agnss-{}", comp),
            None => self.default_component.clone(),
        };
        if name.chars().count() > COMPONENT_WIDTH {
            let cut: String = name.chars().take(COMPONENT_WIDTH - 1).collect();
            format!("{}…", cut)
        } else {
            format!("{:<width$}", name, width = COMPONENT_WIDTH)
        }
    }

    fn level_column(level: &Level) -> String {
        let label = match *level {
            Level::ERROR => "✗ ERROR",
            Level::WARN => "⚠ WARN",
            Level::INFO => "ℹ INFO",
            Level::DEBUG => "◦ DEBUG",
            Level::TRACE => "◦ TRACE",
        };
        format!("{:<width$}", label, width = LEVEL_WIDTH)
    }

    fn level_color(&self, level: &Level) -> &'static str {
        if !self.color_enabled {
            return "";
        }
        match *level {
            Level::ERROR => COLOR_BRIGHT_RED,
            Level::WARN => COLOR_BRIGHT_YELLOW,
            Level::INFO => COLOR_GREEN,
            Level::DEBUG | Level::TRACE => COLOR_BRIGHT_GRAY,
        }
    }

    fn paint(&self, color: &'static str) -> &'static str {
        if self.color_enabled {
            color
        } else {
            ""
        }
    }
}

impl<S, N> FormatEvent<S, N> for AgnssLogFormatter
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
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let level = event.metadata().level();

        let mut fields = FieldCollector::default();
        event.record(&mut fields);

        write!(
            writer,
            "{}[{}] [{}] [{}{}{}] ",
            self.paint(COLOR_CYAN),
            timestamp,
            self.component_column(fields.component.as_deref()),
            self.level_color(level),
            Self::level_column(level),
            self.paint(COLOR_RESET),
        )?;
        writeln!(writer, "{}{}", fields.message, fields.extra)
    }
}

/// Pulls `message` and `component` out of an event; other fields are appended
#[derive(Default)]
struct FieldCollector {
    message: String,
    component: Option<String>,
    extra: String,
}

impl FieldCollector {
    fn record(&mut self, name: &str, value: String) {
        match name {
            "message" => self.message = value,
            "component" => self.component = Some(value),
            other => {
                let _ = write!(self.extra, " {}={}", other, value);
            }
        }
    }
}

impl tracing::field::Visit for FieldCollector {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        let text = format!("{:?}", value);
        let text = text
            .strip_prefix('"')
            .and_then(|t| t.strip_suffix('"'))
            .map(str::to_string)
            .unwrap_or(text);
        self.record(field.name(), text);
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.record(field.name(), value.to_string());
    }
}

fn color_supported() -> bool {
    match std::env::var("TERM") {
        Ok(term) => term != "dumb" && std::env::var_os("NO_COLOR").is_none(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_column() {
        let f = AgnssLogFormatter::plain("ubx-agnss");
        assert_eq!(f.component_column(None).trim_end(), "ubx-agnss");
        assert_eq!(f.component_column(Some("bridge")).len(), COMPONENT_WIDTH);
        let long = f.component_column(Some("a-very-long-component-name"));
        assert_eq!(long.chars().count(), COMPONENT_WIDTH);
        assert!(long.ends_with('…'));
    }

    #[test]
    fn test_field_collector() {
        let mut c = FieldCollector::default();
        c.record("message", "sent".to_string());
        c.record("component", "bridge".to_string());
        c.record("bytes", "42".to_string());
        assert_eq!(c.message, "sent");
        assert_eq!(c.component.as_deref(), Some("bridge"));
        assert_eq!(c.extra, " bytes=42");
    }

    #[test]
    fn test_plain_has_no_color() {
        let f = AgnssLogFormatter::plain("x");
        assert_eq!(f.level_color(&Level::ERROR), "");
        assert_eq!(f.paint(COLOR_CYAN), "");
    }
}
