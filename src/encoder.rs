use crate::config::LayoutConfig;
use crate::env::env_var;
use crate::lookup::Template;
use crate::message::Message;
use crate::record::{LogEvent, ThrownError};
use crate::schema::{self, exception, source};
use crate::timestamp::format_timestamp;
use crate::value::ConversionReport;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Converts a log event into the bytes handed to an appender.
///
/// Implementations must never fail: whatever goes wrong while encoding is
/// degraded into the output instead of surfacing to the logging call.
pub trait Layout: Send + Sync {
    fn encode(&self, event: &LogEvent) -> Vec<u8>;

    /// Written once before the first event, if any.
    fn header(&self) -> Option<Vec<u8>> {
        None
    }

    /// Written once after the last event, if any.
    fn footer(&self) -> Option<Vec<u8>> {
        None
    }

    /// Written between two consecutive events, if any.
    fn separator(&self) -> Option<Vec<u8>> {
        None
    }

    fn content_type(&self) -> &str;
}

/// Side-channel counters of an [`EventEncoder`]. They never influence output.
#[derive(Debug, Default)]
pub struct EncoderStats {
    /// Events encoded so far.
    pub encoded_events: AtomicU64,
    /// Custom values replaced by the unencodable placeholder.
    pub unencodable_values: AtomicU64,
    /// Custom fields renamed or dropped because they were named like a reserved key.
    pub collisions: AtomicU64,
}

impl EncoderStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            encoded_events: self.encoded_events.load(Ordering::Relaxed),
            unencodable_values: self.unencodable_values.load(Ordering::Relaxed),
            collisions: self.collisions.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub encoded_events: u64,
    pub unencodable_values: u64,
    pub collisions: u64,
}

/// Logstash `json_event` layout.
///
/// Stateless apart from its configuration and counters: `encode` takes
/// `&self`, so one instance can be shared across threads behind an `Arc`.
pub struct EventEncoder {
    config: LayoutConfig,
    additional_fields: Vec<(String, Template)>,
    stats: Arc<EncoderStats>,
}

impl EventEncoder {
    /// Build an encoder. `${env:..}` lookups in additional fields are
    /// resolved against the process environment here, once.
    pub fn new(config: LayoutConfig) -> Self {
        Self::with_env(config, env_var)
    }

    /// Like [`EventEncoder::new`] with a custom source for `${env:..}` lookups.
    pub fn with_env<F>(config: LayoutConfig, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let additional_fields = config
            .additional_fields
            .iter()
            .map(|field| (field.key.clone(), Template::compile(&field.value, &env)))
            .collect();
        Self {
            config,
            additional_fields,
            stats: Arc::new(EncoderStats::default()),
        }
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    pub fn stats(&self) -> Arc<EncoderStats> {
        Arc::clone(&self.stats)
    }

    /// Build the JSON document for `event`.
    pub fn encode_value(&self, event: &LogEvent) -> Value {
        let mut report = ConversionReport::default();
        let mut collisions = 0u64;
        let mut doc = Map::new();

        doc.insert(schema::VERSION.into(), Value::from(schema::SCHEMA_VERSION));
        doc.insert(
            schema::TIMESTAMP.into(),
            Value::String(format_timestamp(&event.timestamp, event.offset, self.config.timezone)),
        );
        doc.insert(schema::LEVEL.into(), Value::String(event.level.as_str().to_string()));
        doc.insert(
            schema::LOGGER_NAME.into(),
            Value::String(event.logger_name.clone().unwrap_or_default()),
        );
        doc.insert(
            schema::THREAD_NAME.into(),
            Value::String(event.thread_name.clone().unwrap_or_default()),
        );
        doc.insert(schema::MESSAGE.into(), self.message_value(&event.message, &mut report));

        if let Some((outermost, causes)) = event.thrown.split_first() {
            let mut exc = self.thrown_object(outermost);
            if !causes.is_empty() {
                let causes = causes.iter().map(|c| Value::Object(self.thrown_object(c))).collect();
                exc.insert(exception::CAUSES.into(), Value::Array(causes));
            }
            doc.insert(schema::EXCEPTION.into(), Value::Object(exc));
        }

        if self.config.location_info {
            if let Some(location) = &event.source {
                let mut src = Map::new();
                if let Some(module_path) = &location.module_path {
                    src.insert(source::MODULE_PATH.into(), Value::String(module_path.clone()));
                }
                if let Some(file) = &location.file {
                    src.insert(source::FILE.into(), Value::String(file.clone()));
                }
                if let Some(line) = location.line {
                    src.insert(source::LINE.into(), Value::from(line));
                }
                doc.insert(schema::SOURCE.into(), Value::Object(src));
            }
        }

        // Additional fields and context share one namespace; context wins.
        let mut custom: Vec<(String, Value)> = Vec::with_capacity(self.additional_fields.len() + event.context.len());
        for (key, template) in &self.additional_fields {
            upsert(&mut custom, key.clone(), Value::String(template.resolve(event)));
        }
        for (key, value) in &event.context {
            let value = value.to_json(self.config.parse_json_strings, &mut report);
            upsert(&mut custom, key.clone(), value);
        }

        let custom_keys: HashSet<&str> = custom.iter().map(|(k, _)| k.as_str()).collect();
        let mut placed: Vec<(String, Value)> = Vec::with_capacity(custom.len());
        for (key, value) in &custom {
            if !schema::is_reserved(key) {
                placed.push((key.clone(), value.clone()));
                continue;
            }
            collisions += 1;
            if let Some(renamed) = self.free_key(key, &custom_keys, &placed) {
                placed.push((renamed, value.clone()));
            }
        }
        doc.extend(placed);

        self.stats.encoded_events.fetch_add(1, Ordering::Relaxed);
        if report.unencodable > 0 {
            self.stats.unencodable_values.fetch_add(report.unencodable, Ordering::Relaxed);
        }
        if collisions > 0 {
            self.stats.collisions.fetch_add(collisions, Ordering::Relaxed);
        }

        Value::Object(doc)
    }

    /// Encode `event` as a string, including the configured terminators.
    pub fn encode_to_string(&self, event: &LogEvent) -> String {
        let doc = self.encode_value(event);
        let rendered = if self.config.pretty_print {
            serde_json::to_string_pretty(&doc)
        } else {
            serde_json::to_string(&doc)
        };
        let mut out = rendered.unwrap_or_else(|_| fallback_document(event));
        if self.config.event_eol {
            out.push('\n');
        }
        if self.config.include_null_delimiter {
            out.push('\0');
        }
        out
    }

    fn message_value(&self, message: &Message, report: &mut ConversionReport) -> Value {
        match message {
            Message::Object(value) if self.config.object_message_as_json_object => {
                value.to_json(false, report)
            }
            other => Value::String(other.render()),
        }
    }

    fn thrown_object(&self, thrown: &ThrownError) -> Map<String, Value> {
        let mut obj = Map::new();
        obj.insert(exception::CLASS.into(), Value::String(thrown.class.clone()));
        if let Some(message) = &thrown.message {
            obj.insert(exception::MESSAGE.into(), Value::String(message.clone()));
        }
        if self.config.include_stacktrace {
            let stacktrace = if self.config.stacktrace_as_string {
                Value::String(thrown.stacktrace.join("\n"))
            } else {
                Value::Array(thrown.stacktrace.iter().cloned().map(Value::String).collect())
            };
            obj.insert(exception::STACKTRACE.into(), stacktrace);
        }
        obj
    }

    /// Prefix `key` until it names neither a reserved key nor any other
    /// custom field. `None` when colliding fields are dropped.
    fn free_key(&self, key: &str, custom_keys: &HashSet<&str>, placed: &[(String, Value)]) -> Option<String> {
        let prefix = self.config.field_prefix_on_collision.as_deref()?;
        if prefix.is_empty() {
            return None;
        }
        let mut candidate = format!("{prefix}{key}");
        while schema::is_reserved(&candidate)
            || custom_keys.contains(candidate.as_str())
            || placed.iter().any(|(k, _)| *k == candidate)
        {
            candidate = format!("{prefix}{candidate}");
        }
        Some(candidate)
    }
}

impl Default for EventEncoder {
    fn default() -> Self {
        Self::new(LayoutConfig::default())
    }
}

impl Layout for EventEncoder {
    fn encode(&self, event: &LogEvent) -> Vec<u8> {
        self.encode_to_string(event).into_bytes()
    }

    fn header(&self) -> Option<Vec<u8>> {
        self.config.complete.then(|| b"[\n".to_vec())
    }

    /// Documents already ending in `\n` need no extra line break around framing.
    fn footer(&self) -> Option<Vec<u8>> {
        let footer: &[u8] = if self.config.event_eol { b"]\n" } else { b"\n]\n" };
        self.config.complete.then(|| footer.to_vec())
    }

    fn separator(&self) -> Option<Vec<u8>> {
        let separator: &[u8] = if self.config.event_eol { b"," } else { b",\n" };
        self.config.complete.then(|| separator.to_vec())
    }

    fn content_type(&self) -> &str {
        schema::CONTENT_TYPE
    }
}

fn upsert(fields: &mut Vec<(String, Value)>, key: String, value: Value) {
    match fields.iter_mut().find(|(k, _)| *k == key) {
        Some(slot) => slot.1 = value,
        None => fields.push((key, value)),
    }
}

/// Minimal document used if serialization of the full one ever fails.
fn fallback_document(event: &LogEvent) -> String {
    let mut doc = Map::new();
    doc.insert(schema::VERSION.into(), Value::from(schema::SCHEMA_VERSION));
    doc.insert(
        schema::TIMESTAMP.into(),
        Value::String(format_timestamp(&event.timestamp, event.offset, Default::default())),
    );
    doc.insert(schema::LEVEL.into(), Value::String(event.level.as_str().to_string()));
    doc.insert(schema::MESSAGE.into(), Value::String(crate::value::UNENCODABLE.to_string()));
    Value::Object(doc).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdditionalField;
    use crate::level::Level;
    use crate::record::SourceLocation;
    use crate::value::FieldValue;

    fn base_event() -> LogEvent {
        LogEvent::builder()
            .epoch_millis(1_700_000_000_000)
            .level(Level::Debug)
            .logger_name("app::auth")
            .thread_name("main")
            .message("Test Message")
            .build()
    }

    #[test]
    fn key_order_is_fixed() {
        let encoder = EventEncoder::default();
        let doc = encoder.encode_value(&base_event());
        let keys: Vec<_> = doc.as_object().unwrap().keys().cloned().collect();
        assert_eq!(
            keys,
            vec!["@version", "@timestamp", "level", "logger_name", "thread_name", "message"]
        );
    }

    #[test]
    fn compact_line_layout() {
        let encoder = EventEncoder::default();
        let line = encoder.encode_to_string(&base_event());
        assert_eq!(
            line,
            "{\"@version\":1,\"@timestamp\":\"2023-11-14T22:13:20.000Z\",\"level\":\"DEBUG\",\
             \"logger_name\":\"app::auth\",\"thread_name\":\"main\",\"message\":\"Test Message\"}\n"
        );
    }

    #[test]
    fn additional_fields_are_emitted_and_context_overrides_them() {
        let config = LayoutConfig {
            additional_fields: vec![
                AdditionalField::new("Foo", "Bar"),
                AdditionalField::new("who", "${logger}:${ctx:user}"),
                AdditionalField::new("A", "from-config"),
            ],
            ..LayoutConfig::default()
        };
        let encoder = EventEncoder::new(config);
        let event = LogEvent::builder()
            .logger_name("svc")
            .field("user", "ann")
            .field("A", "B")
            .build();
        let doc = encoder.encode_value(&event);
        assert_eq!(doc["Foo"], "Bar");
        assert_eq!(doc["who"], "svc:ann");
        assert_eq!(doc["A"], "B");
    }

    #[test]
    fn renamed_key_skips_taken_names() {
        let encoder = EventEncoder::default();
        let event = LogEvent::builder()
            .level(Level::Error)
            .field("ctx_level", "first")
            .field("level", "second")
            .build();
        let doc = encoder.encode_value(&event);
        assert_eq!(doc["level"], "ERROR");
        assert_eq!(doc["ctx_level"], "first");
        assert_eq!(doc["ctx_ctx_level"], "second");

        let reversed = LogEvent::builder()
            .field("level", "second")
            .field("ctx_level", "first")
            .build();
        let doc = encoder.encode_value(&reversed);
        assert_eq!(doc["ctx_level"], "first");
        assert_eq!(doc["ctx_ctx_level"], "second");
        assert_eq!(encoder.stats().snapshot().collisions, 2);
    }

    #[test]
    fn drop_policy_discards_colliding_fields() {
        let encoder = EventEncoder::new(LayoutConfig {
            field_prefix_on_collision: None,
            ..LayoutConfig::default()
        });
        let event = LogEvent::builder().field("message", "spoof").field("ok", true).build();
        let doc = encoder.encode_value(&event);
        let obj = doc.as_object().unwrap();
        assert_eq!(obj.len(), 7);
        assert_eq!(doc["message"], "");
        assert_eq!(doc["ok"], true);
        assert_eq!(encoder.stats().snapshot().collisions, 1);
    }

    #[test]
    fn exception_key_is_reserved_without_error() {
        let encoder = EventEncoder::default();
        let event = LogEvent::builder().field("exception", "not really").build();
        let doc = encoder.encode_value(&event);
        assert!(doc.get("exception").is_none());
        assert_eq!(doc["ctx_exception"], "not really");
    }

    #[test]
    fn stacktrace_options() {
        let thrown = ThrownError::new("io::Error", "boom").with_frames(["a.rs:1", "b.rs:2"]);
        let event = LogEvent::builder().thrown(thrown).build();

        let as_string = EventEncoder::new(LayoutConfig {
            stacktrace_as_string: true,
            ..LayoutConfig::default()
        });
        assert_eq!(as_string.encode_value(&event)["exception"]["stacktrace"], "a.rs:1\nb.rs:2");

        let without = EventEncoder::new(LayoutConfig {
            include_stacktrace: false,
            ..LayoutConfig::default()
        });
        let doc = without.encode_value(&event);
        assert!(doc["exception"].get("stacktrace").is_none());
        assert_eq!(doc["exception"]["class"], "io::Error");
    }

    #[test]
    fn causes_follow_thrown_order() {
        let event = LogEvent::builder()
            .thrown(ThrownError::new("Outer", "o").with_frame("outer.rs:1"))
            .thrown(ThrownError::new("Middle", "m"))
            .thrown(ThrownError::new("Root", "r"))
            .build();
        let doc = EventEncoder::default().encode_value(&event);
        assert_eq!(doc["exception"]["class"], "Outer");
        let causes = doc["exception"]["causes"].as_array().unwrap();
        assert_eq!(causes.len(), 2);
        assert_eq!(causes[0]["class"], "Middle");
        assert_eq!(causes[1]["class"], "Root");
    }

    #[test]
    fn location_info_is_opt_in() {
        let event = LogEvent::builder()
            .source(SourceLocation {
                module_path: Some("app::db".into()),
                file: Some("src/db.rs".into()),
                line: Some(42),
            })
            .build();
        assert!(EventEncoder::default().encode_value(&event).get("source").is_none());

        let encoder = EventEncoder::new(LayoutConfig {
            location_info: true,
            ..LayoutConfig::default()
        });
        let doc = encoder.encode_value(&event);
        assert_eq!(doc["source"]["file"], "src/db.rs");
        assert_eq!(doc["source"]["line"], 42);
    }

    #[test]
    fn object_messages() {
        let payload = FieldValue::Object(vec![("order".into(), 17i64.into())]);
        let event = LogEvent::builder().message(Message::Object(payload)).build();

        let as_text = EventEncoder::default().encode_value(&event);
        assert_eq!(as_text["message"], r#"{"order":17}"#);

        let as_object = EventEncoder::new(LayoutConfig {
            object_message_as_json_object: true,
            ..LayoutConfig::default()
        })
        .encode_value(&event);
        assert_eq!(as_object["message"]["order"], 17);
    }

    #[test]
    fn complete_mode_framing() {
        let encoder = EventEncoder::new(LayoutConfig {
            complete: true,
            ..LayoutConfig::default()
        });
        let mut out = encoder.header().unwrap();
        out.extend(encoder.encode(&base_event()));
        out.extend(encoder.separator().unwrap());
        out.extend(encoder.encode(&base_event()));
        out.extend(encoder.footer().unwrap());
        let parsed: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 2);
        assert!(EventEncoder::default().header().is_none());
    }

    #[test]
    fn null_delimiter_and_no_eol() {
        let encoder = EventEncoder::new(LayoutConfig {
            event_eol: false,
            include_null_delimiter: true,
            ..LayoutConfig::default()
        });
        let out = encoder.encode(&base_event());
        assert_eq!(out.last(), Some(&0u8));
        assert_ne!(out[out.len() - 2], b'\n');
    }

    #[test]
    fn env_lookups_use_injected_environment() {
        let encoder = EventEncoder::with_env(
            LayoutConfig {
                additional_fields: vec![AdditionalField::new("host", "${env:HOSTNAME}")],
                ..LayoutConfig::default()
            },
            |name| (name == "HOSTNAME").then(|| "node-3".to_string()),
        );
        assert_eq!(encoder.encode_value(&base_event())["host"], "node-3");
    }
}
