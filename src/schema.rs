//! Field names and constants of the Logstash `json_event` document.

/// Value of `@version`.
pub const SCHEMA_VERSION: u64 = 1;

pub const VERSION: &str = "@version";
pub const TIMESTAMP: &str = "@timestamp";
pub const LEVEL: &str = "level";
pub const LOGGER_NAME: &str = "logger_name";
pub const THREAD_NAME: &str = "thread_name";
pub const MESSAGE: &str = "message";
pub const EXCEPTION: &str = "exception";
pub const SOURCE: &str = "source";

/// Keys owned by the layout. Custom fields never overwrite them.
pub const RESERVED_KEYS: [&str; 8] = [
    VERSION,
    TIMESTAMP,
    LEVEL,
    LOGGER_NAME,
    THREAD_NAME,
    MESSAGE,
    EXCEPTION,
    SOURCE,
];

pub mod exception {
    pub const CLASS: &str = "class";
    pub const MESSAGE: &str = "message";
    pub const STACKTRACE: &str = "stacktrace";
    pub const CAUSES: &str = "causes";
}

pub mod source {
    pub const MODULE_PATH: &str = "module_path";
    pub const FILE: &str = "file";
    pub const LINE: &str = "line";
}

pub const CONTENT_TYPE: &str = "application/json; charset=UTF-8";

pub fn is_reserved(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}
