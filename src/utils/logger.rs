use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::level_filters::LevelFilter;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};

#[derive(Default)]
struct JsonFieldVisitor {
    fields: Map<String, Value>,
}

impl JsonFieldVisitor {
    fn insert(&mut self, field: &Field, value: Value) {
        self.fields.insert(field.name().to_string(), value);
    }
}

impl Visit for JsonFieldVisitor {
    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::from(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.insert(field, Value::from(format!("{:?}", value)));
    }
}

/// Renames our structured `event_name`/`event_domain` fields to their
/// OpenTelemetry attribute names.
fn otel_attributes(mut fields: Map<String, Value>) -> Map<String, Value> {
    for (from, to) in [("event_name", "event.name"), ("event_domain", "event.domain")] {
        if let Some(v) = fields.remove(from) {
            fields.insert(to.to_string(), v);
        }
    }
    fields
}

fn severity_number(level: &Level) -> u64 {
    match *level {
        Level::TRACE => 1,
        Level::DEBUG => 5,
        Level::INFO => 9,
        Level::WARN => 13,
        Level::ERROR => 17,
    }
}

/// One JSON object per event, laid out like an OTel log record.
struct OtelJsonEventFormatter;

impl<S, N> FormatEvent<S, N> for OtelJsonEventFormatter
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
    N: for<'writer> FormatFields<'writer> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let metadata = event.metadata();
        let mut visitor = JsonFieldVisitor::default();
        event.record(&mut visitor);

        let mut attributes = otel_attributes(visitor.fields);
        attributes.insert("code.target".to_string(), Value::from(metadata.target()));

        let body = attributes
            .remove("message")
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| metadata.name().to_string());

        let mut resource = Map::new();
        resource.insert("service.name".to_string(), Value::from(env!("CARGO_PKG_NAME")));
        resource.insert(
            "service.version".to_string(),
            Value::from(env!("CARGO_PKG_VERSION")),
        );

        let mut root = Map::new();
        root.insert(
            "timestamp".to_string(),
            Value::from(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
        );
        root.insert(
            "severity_text".to_string(),
            Value::from(metadata.level().as_str()),
        );
        root.insert(
            "severity_number".to_string(),
            Value::from(severity_number(metadata.level())),
        );
        root.insert("body".to_string(), Value::from(body));
        root.insert("resource".to_string(), Value::Object(resource));
        root.insert("attributes".to_string(), Value::Object(attributes));

        let serialized = serde_json::to_string(&Value::Object(root)).map_err(|_| std::fmt::Error)?;
        writer.write_str(&serialized)?;
        writer.write_char('\n')
    }
}

/// Install the global tracing subscriber.
///
/// The configured level is the default directive; `RUST_LOG` directives, when
/// present, are layered on top. Output always goes to stderr because stdout
/// carries the rendered bookmark list.
pub fn init_logging(logging_config: &LoggingConfig) -> Result<(), String> {
    tracing_log::LogTracer::init().map_err(|e| format!("Failed to bridge log records: {}", e))?;

    let level_filter: LevelFilter = logging_config.level.into();
    let filter_layer = EnvFilter::builder()
        .with_default_directive(level_filter.into())
        .from_env_lossy();

    let result = match logging_config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(
            tracing_subscriber::registry().with(filter_layer).with(
                fmt::layer()
                    .event_format(OtelJsonEventFormatter)
                    .with_writer(std::io::stderr),
            ),
        ),
        LogFormat::Console => tracing::subscriber::set_global_default(
            tracing_subscriber::registry()
                .with(filter_layer)
                .with(fmt::layer().compact().with_writer(std::io::stderr)),
        ),
    };

    result.map_err(|e| format!("Failed to install tracing subscriber: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Test that structured event fields come out under their OTel names.
    #[test]
    fn test_event_fields_renamed() {
        let fields = json!({
            "event_name": "app.feed.refetch",
            "event_domain": "realtime",
            "suppressed_count": 2,
        });
        let Value::Object(fields) = fields else {
            unreachable!()
        };

        let attributes = otel_attributes(fields);
        assert_eq!(attributes["event.name"], "app.feed.refetch");
        assert_eq!(attributes["event.domain"], "realtime");
        assert_eq!(attributes["suppressed_count"], 2);
        assert!(!attributes.contains_key("event_name"));
        assert!(!attributes.contains_key("event_domain"));
    }

    #[test]
    fn test_severity_numbers() {
        assert_eq!(severity_number(&Level::INFO), 9);
        assert_eq!(severity_number(&Level::ERROR), 17);
    }
}
