/// Environment variable names used by this crate for convenient
/// configuration of the layout from services.
///
/// These are purely helpers; [`EventEncoder`](crate::encoder::EventEncoder)
/// itself never reads the environment except for `${env:..}` lookups
/// resolved once at construction.

/// `utc` or `local`.
pub const LOGSTASH_LAYOUT_TIMEZONE_ENV: &str = "LOGSTASH_LAYOUT_TIMEZONE";

/// `true` for multi-line documents.
pub const LOGSTASH_LAYOUT_PRETTY_PRINT_ENV: &str = "LOGSTASH_LAYOUT_PRETTY_PRINT";

/// Prefix for custom fields colliding with reserved keys. Empty drops them instead.
pub const LOGSTASH_LAYOUT_FIELD_PREFIX_ENV: &str = "LOGSTASH_LAYOUT_FIELD_PREFIX";

pub const LOGSTASH_LAYOUT_INCLUDE_STACKTRACE_ENV: &str = "LOGSTASH_LAYOUT_INCLUDE_STACKTRACE";

pub const LOGSTASH_LAYOUT_STACKTRACE_AS_STRING_ENV: &str = "LOGSTASH_LAYOUT_STACKTRACE_AS_STRING";

pub const LOGSTASH_LAYOUT_LOCATION_INFO_ENV: &str = "LOGSTASH_LAYOUT_LOCATION_INFO";

pub const LOGSTASH_LAYOUT_EVENT_EOL_ENV: &str = "LOGSTASH_LAYOUT_EVENT_EOL";

pub const LOGSTASH_LAYOUT_COMPLETE_ENV: &str = "LOGSTASH_LAYOUT_COMPLETE";

pub const LOGSTASH_LAYOUT_NULL_DELIMITER_ENV: &str = "LOGSTASH_LAYOUT_NULL_DELIMITER";

pub const LOGSTASH_LAYOUT_PARSE_JSON_STRINGS_ENV: &str = "LOGSTASH_LAYOUT_PARSE_JSON_STRINGS";

pub const LOGSTASH_LAYOUT_OBJECT_MESSAGE_AS_JSON_ENV: &str = "LOGSTASH_LAYOUT_OBJECT_MESSAGE_AS_JSON";

/// Comma-separated `key=value` pairs, e.g. `app=billing,host=${env:HOSTNAME}`.
pub const LOGSTASH_LAYOUT_ADDITIONAL_FIELDS_ENV: &str = "LOGSTASH_LAYOUT_ADDITIONAL_FIELDS";

/// Sink target for [`init`](crate::init), e.g. `stdout` or `file:///var/log/app.json`.
pub const LOGSTASH_LAYOUT_TARGET_ENV: &str = "LOGSTASH_LAYOUT_TARGET";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read an environment variable, treating unset and non-unicode values as absent.
pub fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok()
}
