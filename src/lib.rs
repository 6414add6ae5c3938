//! Logstash `json_event` layout.
//!
//! [`EventEncoder`] turns a [`LogEvent`] into one Logstash-compatible JSON
//! document. With the default `layer` feature the crate also provides a
//! `tracing_subscriber` layer that encodes `tracing` events and writes them
//! to an asynchronous [`LogSink`](sink::LogSink).

pub mod config;
pub mod encoder;
pub mod env;
pub mod level;
pub mod lookup;
pub mod message;
pub mod record;
pub mod schema;
pub mod timestamp;
pub mod value;

#[cfg(feature = "layer")]
pub mod backend;
#[cfg(feature = "layer")]
pub mod init;
#[cfg(feature = "layer")]
pub mod layer;
#[cfg(feature = "layer")]
pub mod noop_sink;
#[cfg(feature = "layer")]
pub mod sink;
#[cfg(feature = "layer")]
pub mod writer_sink;

pub use config::{AdditionalField, LayoutConfig};
pub use encoder::{EventEncoder, Layout};
pub use level::Level;
pub use message::Message;
pub use record::{LogEvent, SourceLocation, ThrownError};
pub use timestamp::TimeZonePolicy;
pub use value::FieldValue;
