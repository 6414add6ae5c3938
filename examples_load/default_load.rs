use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::error;

use logstash_json_layout::encoder::{EventEncoder, Layout};
use logstash_json_layout::init::init_tracing;
use logstash_json_layout::noop_sink::NoopSink;

#[tokio::main]
async fn main() {
    let encoder = Arc::new(EventEncoder::default());
    let stats = encoder.stats();
    let layout: Arc<dyn Layout> = encoder;
    init_tracing(layout, Arc::new(NoopSink)).expect("install subscriber");

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        error!(iteration = i, "default load test error");
    }

    let elapsed = start.elapsed();
    println!("default config: encoded {} events in {:?} (~{:.0} ev/s)",
        stats.snapshot().encoded_events,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    // Give background task a little time to drain the channel
    sleep(Duration::from_secs(2)).await;
}
