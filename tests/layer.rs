use std::error::Error;
use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use logstash_json_layout::config::LayoutConfig;
use logstash_json_layout::encoder::{EventEncoder, Layout};
use logstash_json_layout::layer::LogstashLayer;
use logstash_json_layout::sink::LogSink;
use logstash_json_layout::Level;
use serde_json::Value;
use tokio::time::{timeout, Duration};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

#[derive(Default)]
struct CollectingSink {
    documents: Mutex<Vec<Vec<u8>>>,
    closed: Mutex<bool>,
}

#[async_trait]
impl LogSink for CollectingSink {
    async fn send(&self, document: &[u8]) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.documents.lock().unwrap().push(document.to_vec());
        Ok(())
    }

    async fn close(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        *self.closed.lock().unwrap() = true;
        Ok(())
    }
}

impl CollectingSink {
    fn parsed(&self) -> Vec<Value> {
        self.documents
            .lock()
            .unwrap()
            .iter()
            .map(|doc| serde_json::from_slice(doc).unwrap())
            .collect()
    }
}

#[derive(Debug)]
struct Timeout;

impl fmt::Display for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("upstream timed out")
    }
}

impl Error for Timeout {}

/// Emit events through a fresh layer, then drop it and wait for the writer task to finish.
async fn capture<F: FnOnce()>(config: LayoutConfig, min_level: Level, emit: F) -> (Arc<CollectingSink>, u64) {
    let sink = Arc::new(CollectingSink::default());
    let layout: Arc<dyn Layout> = Arc::new(EventEncoder::new(config));
    let (layer, handle) = LogstashLayer::new(
        layout,
        sink.clone(),
        min_level,
        64,
        4,
        Duration::from_millis(10),
    );
    let dropped = Arc::clone(&layer.dropped_events);

    let subscriber = Registry::default().with(layer);
    tracing::subscriber::with_default(subscriber, emit);

    timeout(Duration::from_secs(5), handle)
        .await
        .expect("writer task finished")
        .expect("writer task did not panic");
    let dropped = dropped.load(std::sync::atomic::Ordering::Relaxed);
    (sink, dropped)
}

#[tokio::test]
async fn captures_tracing_events_as_logstash_documents() {
    let (sink, dropped) = capture(LayoutConfig::default(), Level::Info, || {
        tracing::info!(user_id = 42, reason = "invalid password", "authentication failed");
        tracing::debug!("filtered out");
        tracing::warn!(logger = "billing", retries = 3u64, "card declined");
    })
    .await;

    assert_eq!(dropped, 0);
    assert!(*sink.closed.lock().unwrap());

    let docs = sink.parsed();
    assert_eq!(docs.len(), 2);

    assert_eq!(docs[0]["@version"], 1);
    assert_eq!(docs[0]["level"], "INFO");
    assert_eq!(docs[0]["message"], "authentication failed");
    assert_eq!(docs[0]["logger_name"], "layer");
    assert_eq!(docs[0]["user_id"], 42);
    assert_eq!(docs[0]["reason"], "invalid password");
    assert!(docs[0]["@timestamp"].as_str().unwrap().ends_with('Z'));

    assert_eq!(docs[1]["level"], "WARN");
    assert_eq!(docs[1]["logger_name"], "billing");
    assert_eq!(docs[1]["retries"], 3);
    assert!(docs[1].get("logger").is_none());
}

#[tokio::test]
async fn error_field_becomes_exception() {
    let (sink, _) = capture(LayoutConfig::default(), Level::Info, || {
        let err = Timeout;
        tracing::error!(error = &err as &(dyn Error + 'static), "call failed");
    })
    .await;

    let docs = sink.parsed();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0]["level"], "ERROR");
    assert_eq!(docs[0]["exception"]["class"], "Timeout");
    assert_eq!(docs[0]["exception"]["message"], "upstream timed out");
    assert!(!docs[0]["exception"]["stacktrace"].as_array().unwrap().is_empty());
    assert!(docs[0].get("error").is_none());
}

#[derive(Debug)]
struct Unavailable(Timeout);

impl fmt::Display for Unavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("inventory service unavailable")
    }
}

impl Error for Unavailable {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.0)
    }
}

#[tokio::test]
async fn error_causes_are_named_after_their_types() {
    let (sink, _) = capture(LayoutConfig::default(), Level::Info, || {
        let err = Unavailable(Timeout);
        tracing::error!(error = &err as &(dyn Error + 'static), "reservation failed");
    })
    .await;

    let docs = sink.parsed();
    let exception = &docs[0]["exception"];
    assert_eq!(exception["class"], "Unavailable");
    assert_eq!(exception["causes"][0]["class"], "Timeout");
    assert_eq!(exception["causes"][0]["message"], "upstream timed out");
}

#[tokio::test]
async fn span_fields_are_merged_into_events() {
    let (sink, _) = capture(LayoutConfig::default(), Level::Info, || {
        let outer = tracing::info_span!("req", request_id = "r1", tenant = "acme");
        outer.in_scope(|| {
            let inner = tracing::info_span!("db", tenant = "internal", table = tracing::field::Empty);
            inner.record("table", "orders");
            inner.in_scope(|| {
                tracing::info!(attempt = 2, "query sent");
            });
        });
        tracing::info!("outside");
    })
    .await;

    let docs = sink.parsed();
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0]["request_id"], "r1");
    assert_eq!(docs[0]["tenant"], "internal");
    assert_eq!(docs[0]["table"], "orders");
    assert_eq!(docs[0]["attempt"], 2);
    assert!(docs[1].get("request_id").is_none());
}

#[tokio::test]
async fn partial_batches_flush_under_steady_traffic() {
    let sink = Arc::new(CollectingSink::default());
    let layout: Arc<dyn Layout> = Arc::new(EventEncoder::new(LayoutConfig::default()));
    let (layer, handle) = LogstashLayer::new(
        layout,
        sink.clone(),
        Level::Info,
        64,
        1000,
        Duration::from_millis(50),
    );

    let emitting_sink = Arc::clone(&sink);
    let written_while_running = tokio::task::spawn_blocking(move || {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            for i in 0..15 {
                tracing::info!(tick = i, "heartbeat");
                std::thread::sleep(std::time::Duration::from_millis(20));
            }
            emitting_sink.documents.lock().unwrap().len()
        })
    })
    .await
    .unwrap();

    timeout(Duration::from_secs(5), handle)
        .await
        .expect("writer task finished")
        .expect("writer task did not panic");

    assert!(written_while_running > 0);
    assert_eq!(sink.parsed().len(), 15);
}

#[tokio::test]
async fn reserved_field_names_from_tracing_are_prefixed() {
    let (sink, _) = capture(LayoutConfig::default(), Level::Trace, || {
        tracing::trace!(level = "fake", thread_name = "spoofed", "hello");
    })
    .await;

    let docs = sink.parsed();
    assert_eq!(docs[0]["level"], "TRACE");
    assert_eq!(docs[0]["ctx_level"], "fake");
    assert_eq!(docs[0]["ctx_thread_name"], "spoofed");
}

#[tokio::test]
async fn location_info_is_captured_when_enabled() {
    let config = LayoutConfig {
        location_info: true,
        ..LayoutConfig::default()
    };
    let (sink, _) = capture(config, Level::Info, || {
        tracing::info!("with location");
    })
    .await;

    let docs = sink.parsed();
    assert!(docs[0]["source"]["file"].as_str().unwrap().ends_with("layer.rs"));
    assert!(docs[0]["source"]["line"].as_u64().unwrap() > 0);
}
