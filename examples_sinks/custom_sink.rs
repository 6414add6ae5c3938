use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::{sleep, Duration};
use tracing::{error, info};
use logstash_json_layout::{
    config::{AdditionalField, LayoutConfig},
    encoder::EventEncoder,
    init::init_tracing,
    sink::LogSink,
};

/// Example of integrating a custom destination by implementing the
/// `LogSink` trait directly. A real one might push lines into a local
/// queue consumed by a Logstash forwarder.
struct LineCountingSink;

#[async_trait]
impl LogSink for LineCountingSink {
    async fn send(&self, document: &[u8]) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        print!("[custom] {}", String::from_utf8_lossy(document));
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    let config = LayoutConfig {
        additional_fields: vec![AdditionalField::new("service", "checkout")],
        ..LayoutConfig::default()
    };
    let layout = Arc::new(EventEncoder::new(config));

    init_tracing(layout, Arc::new(LineCountingSink)).expect("install subscriber");

    info!("custom sink example started");
    error!(db = "orders", "simulated error written via custom sink");

    sleep(Duration::from_secs(2)).await;
}
