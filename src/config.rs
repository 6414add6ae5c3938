use crate::env::*;
use crate::timestamp::{ParseTimeZoneError, TimeZonePolicy};
use serde::Deserialize;

/// Default prefix applied to custom fields that collide with reserved keys.
pub const DEFAULT_COLLISION_PREFIX: &str = "ctx_";

/// Layout options.
///
/// **Fields**
/// - `timezone`: zone for `@timestamp` when the event carries no offset.
/// - `pretty_print`: multi-line, indented documents instead of one line per event.
/// - `field_prefix_on_collision`: prefix for custom fields named like a
///   reserved key; `None` drops such fields.
/// - `include_stacktrace`: emit `exception.stacktrace`.
/// - `stacktrace_as_string`: emit the stacktrace as one newline-joined string.
/// - `location_info`: emit a `source` object when the event has a location.
/// - `event_eol`: terminate every document with `\n`.
/// - `complete`: frame the output as one JSON array (header, separators, footer).
/// - `include_null_delimiter`: terminate every document with `\0`.
/// - `parse_json_strings`: embed context strings that look like JSON as JSON.
/// - `object_message_as_json_object`: emit object messages as objects
///   rather than JSON text.
/// - `additional_fields`: constant or lookup-based fields added to every event.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub timezone: TimeZonePolicy,
    pub pretty_print: bool,
    pub field_prefix_on_collision: Option<String>,
    pub include_stacktrace: bool,
    pub stacktrace_as_string: bool,
    pub location_info: bool,
    pub event_eol: bool,
    pub complete: bool,
    pub include_null_delimiter: bool,
    pub parse_json_strings: bool,
    pub object_message_as_json_object: bool,
    pub additional_fields: Vec<AdditionalField>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            timezone: TimeZonePolicy::Utc,
            pretty_print: false,
            field_prefix_on_collision: Some(DEFAULT_COLLISION_PREFIX.to_string()),
            include_stacktrace: true,
            stacktrace_as_string: false,
            location_info: false,
            event_eol: true,
            complete: false,
            include_null_delimiter: false,
            parse_json_strings: true,
            object_message_as_json_object: false,
            additional_fields: Vec::new(),
        }
    }
}

/// A `key = value` pair emitted on every event. `value` may contain lookups.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct AdditionalField {
    pub key: String,
    pub value: String,
}

impl AdditionalField {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Error type returned when configuration values cannot be parsed.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error(transparent)]
    Timezone(#[from] ParseTimeZoneError),

    #[error("invalid boolean `{value}` for {key}")]
    InvalidBool { key: String, value: String },

    #[error("invalid additional field `{0}` (expected key=value)")]
    InvalidAdditionalField(String),
}

impl LayoutConfig {
    /// Defaults overlaid with any `LOGSTASH_LAYOUT_*` variables from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_var)
    }

    /// Defaults overlaid with values returned by `lookup` for the `LOGSTASH_LAYOUT_*` names.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = LayoutConfig::default();

        if let Some(tz) = lookup(LOGSTASH_LAYOUT_TIMEZONE_ENV) {
            config.timezone = tz.parse()?;
        }
        if let Some(prefix) = lookup(LOGSTASH_LAYOUT_FIELD_PREFIX_ENV) {
            config.field_prefix_on_collision = if prefix.is_empty() { None } else { Some(prefix) };
        }

        let flags: [(&str, &mut bool); 9] = [
            (LOGSTASH_LAYOUT_PRETTY_PRINT_ENV, &mut config.pretty_print),
            (LOGSTASH_LAYOUT_INCLUDE_STACKTRACE_ENV, &mut config.include_stacktrace),
            (LOGSTASH_LAYOUT_STACKTRACE_AS_STRING_ENV, &mut config.stacktrace_as_string),
            (LOGSTASH_LAYOUT_LOCATION_INFO_ENV, &mut config.location_info),
            (LOGSTASH_LAYOUT_EVENT_EOL_ENV, &mut config.event_eol),
            (LOGSTASH_LAYOUT_COMPLETE_ENV, &mut config.complete),
            (LOGSTASH_LAYOUT_NULL_DELIMITER_ENV, &mut config.include_null_delimiter),
            (LOGSTASH_LAYOUT_PARSE_JSON_STRINGS_ENV, &mut config.parse_json_strings),
            (LOGSTASH_LAYOUT_OBJECT_MESSAGE_AS_JSON_ENV, &mut config.object_message_as_json_object),
        ];
        for (key, slot) in flags {
            if let Some(value) = lookup(key) {
                *slot = parse_bool(key, &value)?;
            }
        }

        if let Some(fields) = lookup(LOGSTASH_LAYOUT_ADDITIONAL_FIELDS_ENV) {
            config.additional_fields = parse_additional_fields(&fields)?;
        }

        Ok(config)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Parse `k1=v1,k2=v2`. Empty segments are skipped.
pub fn parse_additional_fields(pairs: &str) -> Result<Vec<AdditionalField>, ConfigError> {
    pairs.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok(AdditionalField::new(key.trim(), value.trim()))
            }
            _ => Err(ConfigError::InvalidAdditionalField(pair.to_string())),
        })
        .collect()
}
