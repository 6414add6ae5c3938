use crate::encoder::Layout;
use crate::level::Level;
use crate::message::Message;
use crate::record::{insert_field, LogEvent, SourceLocation, ThrownError};
use crate::sink::LogSink;
use crate::value::FieldValue;
use chrono::Utc;
use std::backtrace::Backtrace;
use std::error::Error;
use std::sync::{Arc, atomic::{AtomicU64, Ordering}};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Duration, MissedTickBehavior};
use tracing::span::{Attributes, Id, Record};
use tracing::{Event, Metadata, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Events from this crate are never captured, so sink diagnostics cannot feed back into the sink.
const SELF_TARGET: &str = env!("CARGO_CRATE_NAME");

fn is_own_target(target: &str) -> bool {
    match target.strip_prefix(SELF_TARGET) {
        Some(rest) => rest.is_empty() || rest.starts_with("::"),
        None => false,
    }
}

/// Field that overrides the logger name, which otherwise is the event target.
pub const LOGGER_FIELD: &str = "logger";

/// Field recorded via `record_error` that becomes the event's error chain.
pub const ERROR_FIELD: &str = "error";

const MAX_SEND_ATTEMPTS: u32 = 5;

/// `tracing_subscriber` layer that turns events into Logstash JSON
/// documents and forwards them to an asynchronous [`LogSink`] via a
/// bounded channel and background task.
///
/// Encoding happens on the emitting thread; I/O is fully decoupled from
/// application threads.
pub struct LogstashLayer {
    layout: Arc<dyn Layout>,
    sender: mpsc::Sender<Vec<u8>>,
    min_level: Level,
    /// Total events seen by the layer (before filtering by level).
    pub total_events: Arc<AtomicU64>,
    /// Successfully enqueued into channel.
    pub enqueued_events: Arc<AtomicU64>,
    /// Dropped because the channel was full or the sink kept failing.
    pub dropped_events: Arc<AtomicU64>,
}

impl LogstashLayer {
    /// Create a new layer and spawn a background task that pulls encoded
    /// documents from a bounded channel and writes them to `sink`.
    ///
    /// Minimal thresholds are enforced for `buffer`, `batch_size` and
    /// `flush_interval` to avoid degenerate configurations. The task
    /// closes the sink and exits once the layer is dropped.
    pub fn new(
        layout: Arc<dyn Layout>,
        sink: Arc<dyn LogSink>,
        min_level: Level,
        buffer: usize,
        batch_size: usize,
        flush_interval: Duration,
    ) -> (Self, JoinHandle<()>) {
        let buffer = buffer.max(16);
        let batch_size = batch_size.max(1);
        let flush_interval = flush_interval.max(Duration::from_millis(10));

        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(buffer);

        let total_events = Arc::new(AtomicU64::new(0));
        let enqueued_events = Arc::new(AtomicU64::new(0));
        let dropped_events = Arc::new(AtomicU64::new(0));

        let dropped_events_bg = Arc::clone(&dropped_events);

        let handle = tokio::spawn(async move {
            let mut batch: Vec<Vec<u8>> = Vec::with_capacity(batch_size);
            let backoff = Duration::from_millis(100);
            let max_backoff = Duration::from_secs(10);
            // Ticks at a fixed cadence, so steady traffic cannot postpone a partial batch.
            let mut ticker = interval(flush_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    received = rx.recv() => match received {
                        Some(document) => {
                            batch.push(document);
                            if batch.len() >= batch_size {
                                write_batch(&*sink, &mut batch, backoff, max_backoff, &dropped_events_bg).await;
                            }
                        }
                        None => {
                            if !batch.is_empty() {
                                write_batch(&*sink, &mut batch, backoff, max_backoff, &dropped_events_bg).await;
                            }
                            if let Err(e) = sink.close().await {
                                eprintln!("error closing log sink: {}", e);
                            }
                            break;
                        }
                    },
                    _ = ticker.tick() => {
                        if !batch.is_empty() {
                            write_batch(&*sink, &mut batch, backoff, max_backoff, &dropped_events_bg).await;
                        }
                    }
                }
            }
        });

        (Self {
            layout,
            sender: tx,
            min_level,
            total_events,
            enqueued_events,
            dropped_events,
        }, handle)
    }
}

async fn write_batch(
    sink: &dyn LogSink,
    batch: &mut Vec<Vec<u8>>,
    backoff: Duration,
    max_backoff: Duration,
    dropped: &AtomicU64,
) {
    if let Err(e) = send_batch(sink, batch, backoff, max_backoff).await {
        eprintln!("giving up on log batch of {} documents: {}", batch.len(), e);
        dropped.fetch_add(batch.len() as u64, Ordering::Relaxed);
        batch.clear();
    }
}

/// Send the batch in order. Documents already accepted are removed, so a
/// retry resumes at the first failed one.
async fn send_batch(
    sink: &dyn LogSink,
    batch: &mut Vec<Vec<u8>>,
    mut backoff: Duration,
    max_backoff: Duration,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let mut sent = 0;
        let mut last_err: Option<Box<dyn Error + Send + Sync>> = None;
        for document in batch.iter() {
            if let Err(e) = sink.send(document).await {
                last_err = Some(e);
                break;
            }
            sent += 1;
        }
        batch.drain(..sent);

        let result = match last_err {
            None => sink.flush().await,
            Some(e) => Err(e),
        };
        let err = match result {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        if attempt >= MAX_SEND_ATTEMPTS {
            return Err(err);
        }

        eprintln!("log sink write failed, retrying in {:?}: {}", backoff, err);
        sleep(backoff).await;
        backoff = std::cmp::min(backoff * 2, max_backoff);
    }
}

impl<S> Layer<S> for LogstashLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        attrs.record(&mut visitor);
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(SpanFields(visitor.fields));
        }
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut extensions = span.extensions_mut();
        if let Some(SpanFields(fields)) = extensions.get_mut::<SpanFields>() {
            let mut visitor = FieldVisitor {
                fields: std::mem::take(fields),
                ..FieldVisitor::default()
            };
            values.record(&mut visitor);
            *fields = visitor.fields;
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
        let meta = event.metadata();
        if Level::from(*meta.level()) < self.min_level || is_own_target(meta.target()) {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let mut thrown = visitor.thrown;
        if let Some(outermost) = thrown.first_mut() {
            *outermost = std::mem::take(outermost).with_backtrace(&Backtrace::capture());
            if outermost.stacktrace.is_empty() {
                outermost.stacktrace.push(event_frame(meta));
            }
        }

        let thread = std::thread::current();
        let mut builder = LogEvent::builder()
            .timestamp(Utc::now())
            .level(Level::from(*meta.level()))
            .logger_name(visitor.logger.unwrap_or_else(|| meta.target().to_string()))
            .message(Message::Text(visitor.message.unwrap_or_default()))
            .thrown_chain(thrown)
            .source(SourceLocation {
                module_path: meta.module_path().map(|s| s.to_string()),
                file: meta.file().map(|s| s.to_string()),
                line: meta.line(),
            });
        if let Some(name) = thread.name() {
            builder = builder.thread_name(name);
        }
        // Span fields root first, then the event's own, so inner values win.
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope.from_root() {
                if let Some(SpanFields(fields)) = span.extensions().get::<SpanFields>() {
                    for (key, value) in fields {
                        builder = builder.field(key.clone(), value.clone());
                    }
                }
            }
        }
        for (key, value) in visitor.fields {
            builder = builder.field(key, value);
        }

        let document = self.layout.encode(&builder.build());
        match self.sender.try_send(document) {
            Ok(()) => {
                self.enqueued_events.fetch_add(1, Ordering::Relaxed);
            }
            Err(_e) => {
                self.dropped_events.fetch_add(1, Ordering::Relaxed);
                eprintln!("log channel full, dropping log document");
            }
        }
    }
}

/// Frame standing in for a backtrace when none was captured.
fn event_frame(meta: &Metadata<'_>) -> String {
    format!(
        "{} at {}:{}",
        meta.module_path().unwrap_or(meta.target()),
        meta.file().unwrap_or("<unknown>"),
        meta.line().unwrap_or(0),
    )
}

/// Fields recorded on a span, stored in its extensions.
struct SpanFields(Vec<(String, FieldValue)>);

use tracing::field::{Field, Visit};

/// Collects the fields of one `tracing` event.
#[derive(Default)]
pub struct FieldVisitor {
    pub fields: Vec<(String, FieldValue)>,
    pub message: Option<String>,
    pub logger: Option<String>,
    pub thrown: Vec<ThrownError>,
}

impl FieldVisitor {
    fn insert(&mut self, field: &Field, value: FieldValue) {
        insert_field(&mut self.fields, field.name().to_string(), value);
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = Some(value.to_string()),
            LOGGER_FIELD => self.logger = Some(value.to_string()),
            _ => self.insert(field, FieldValue::from(value)),
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, FieldValue::I64(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, FieldValue::U64(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, FieldValue::F64(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, FieldValue::Bool(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn Error + 'static)) {
        if field.name() == ERROR_FIELD && self.thrown.is_empty() {
            self.thrown = ThrownError::chain_from_dyn(value);
        } else {
            self.insert(field, FieldValue::Str(value.to_string()));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        match field.name() {
            "message" => self.message = Some(format!("{:?}", value)),
            LOGGER_FIELD => self.logger = Some(format!("{:?}", value)),
            _ => self.insert(field, FieldValue::Str(format!("{:?}", value))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_target_matches_crate_and_its_modules_only() {
        assert!(is_own_target(SELF_TARGET));
        assert!(is_own_target(&format!("{}::writer_sink", SELF_TARGET)));
        assert!(!is_own_target(&format!("{}_extras", SELF_TARGET)));
        assert!(!is_own_target(&format!("{}_extras::http", SELF_TARGET)));
        assert!(!is_own_target("app::billing"));
    }
}
