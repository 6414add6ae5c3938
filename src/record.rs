use crate::level::Level;
use crate::message::Message;
use crate::timestamp::{from_epoch_millis, from_epoch_nanos};
use crate::value::FieldValue;
use chrono::{DateTime, FixedOffset, Utc};
use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error;

/// One log event as handed over by the host logging framework.
///
/// Events are immutable once built; the encoder only ever borrows them.
#[derive(Debug, Clone)]
pub struct LogEvent {
    pub timestamp: DateTime<Utc>,
    /// Offset the event wants its timestamp rendered in, overriding the layout's zone policy.
    pub offset: Option<FixedOffset>,
    pub level: Level,
    pub logger_name: Option<String>,
    pub message: Message,
    pub thread_name: Option<String>,
    /// Error chain, outermost first, innermost cause last.
    pub thrown: Vec<ThrownError>,
    /// Custom context fields in insertion order, keys unique.
    pub context: Vec<(String, FieldValue)>,
    pub source: Option<SourceLocation>,
}

impl LogEvent {
    pub fn builder() -> LogEventBuilder {
        LogEventBuilder::default()
    }

    pub fn context_value(&self, key: &str) -> Option<&FieldValue> {
        self.context.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

/// Code location that emitted the event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceLocation {
    pub module_path: Option<String>,
    pub file: Option<String>,
    pub line: Option<u32>,
}

/// One error in a chain: type name, message and rendered stack frames.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThrownError {
    pub class: String,
    pub message: Option<String>,
    pub stacktrace: Vec<String>,
}

impl ThrownError {
    pub fn new(class: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            message: Some(message.into()),
            stacktrace: Vec::new(),
        }
    }

    pub fn with_frame(mut self, frame: impl Into<String>) -> Self {
        self.stacktrace.push(frame.into());
        self
    }

    pub fn with_frames<I, S>(mut self, frames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stacktrace.extend(frames.into_iter().map(Into::into));
        self
    }

    /// Attach the frames of a captured backtrace. Uncaptured backtraces add nothing.
    pub fn with_backtrace(mut self, backtrace: &Backtrace) -> Self {
        if backtrace.status() == BacktraceStatus::Captured {
            self.stacktrace.extend(
                backtrace
                    .to_string()
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(str::to_string),
            );
        }
        self
    }

    /// Build a chain from an error and its `source()` causes, outermost first.
    ///
    /// The outermost entry is named after `E`; causes are only known as
    /// trait objects and are named after their `Debug` output.
    pub fn chain_from<E>(err: &E) -> Vec<ThrownError>
    where
        E: Error + 'static,
    {
        let mut chain = vec![ThrownError {
            class: std::any::type_name::<E>().to_string(),
            message: non_empty(err.to_string()),
            stacktrace: Vec::new(),
        }];
        chain.extend(causes_of(err.source()));
        chain
    }

    /// Like [`ThrownError::chain_from`] for an error only known as a trait object.
    pub fn chain_from_dyn(err: &(dyn Error + 'static)) -> Vec<ThrownError> {
        let mut chain = vec![ThrownError {
            class: class_of(err),
            message: non_empty(err.to_string()),
            stacktrace: Vec::new(),
        }];
        chain.extend(causes_of(err.source()));
        chain
    }
}

const DYN_ERROR_CLASS: &str = "dyn core::error::Error";

/// Type name of a trait-object error: the leading identifier of its
/// `Debug` output, e.g. `Timeout` or `ParseIntError`.
pub(crate) fn class_of(err: &(dyn Error + 'static)) -> String {
    let debug = format!("{:?}", err);
    let name: String = debug
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == ':')
        .collect();
    if name.is_empty() {
        DYN_ERROR_CLASS.to_string()
    } else {
        name
    }
}

fn causes_of(mut source: Option<&(dyn Error + 'static)>) -> Vec<ThrownError> {
    let mut causes = Vec::new();
    while let Some(cause) = source {
        causes.push(ThrownError {
            class: class_of(cause),
            message: non_empty(cause.to_string()),
            stacktrace: Vec::new(),
        });
        source = cause.source();
    }
    causes
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Builder for [`LogEvent`].
///
/// A missing timestamp is filled with the current time and a missing level
/// with `INFO` when [`build`](LogEventBuilder::build) runs, so the
/// resulting event encodes deterministically.
#[derive(Debug, Default)]
pub struct LogEventBuilder {
    timestamp: Option<DateTime<Utc>>,
    offset: Option<FixedOffset>,
    level: Option<Level>,
    logger_name: Option<String>,
    message: Message,
    thread_name: Option<String>,
    thrown: Vec<ThrownError>,
    context: Vec<(String, FieldValue)>,
    source: Option<SourceLocation>,
}

impl LogEventBuilder {
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn epoch_millis(self, millis: i64) -> Self {
        self.timestamp(from_epoch_millis(millis))
    }

    pub fn epoch_nanos(self, nanos: i64) -> Self {
        self.timestamp(from_epoch_nanos(nanos))
    }

    pub fn offset(mut self, offset: FixedOffset) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn level(mut self, level: Level) -> Self {
        self.level = Some(level);
        self
    }

    pub fn logger_name(mut self, name: impl Into<String>) -> Self {
        self.logger_name = Some(name.into());
        self
    }

    pub fn message(mut self, message: impl Into<Message>) -> Self {
        self.message = message.into();
        self
    }

    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = Some(name.into());
        self
    }

    pub fn thrown(mut self, error: ThrownError) -> Self {
        self.thrown.push(error);
        self
    }

    pub fn thrown_chain(mut self, chain: Vec<ThrownError>) -> Self {
        self.thrown.extend(chain);
        self
    }

    /// Add a context field. Re-inserting a key replaces its value in place.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        insert_field(&mut self.context, key.into(), value.into());
        self
    }

    pub fn source(mut self, source: SourceLocation) -> Self {
        self.source = Some(source);
        self
    }

    pub fn build(self) -> LogEvent {
        LogEvent {
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            offset: self.offset,
            level: self.level.unwrap_or_default(),
            logger_name: self.logger_name,
            message: self.message,
            thread_name: self.thread_name,
            thrown: self.thrown,
            context: self.context,
            source: self.source,
        }
    }
}

pub(crate) fn insert_field(fields: &mut Vec<(String, FieldValue)>, key: String, value: FieldValue) {
    match fields.iter_mut().find(|(k, _)| *k == key) {
        Some(slot) => slot.1 = value,
        None => fields.push((key, value)),
    }
}
