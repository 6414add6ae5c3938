use tokio::time::{sleep, Duration};
use tracing::{error, info};

use logstash_json_layout::init::{init_from_env, LayerConfig};

/// Prints Logstash JSON lines on stdout. Try it with
/// `LOGSTASH_LAYOUT_PRETTY_PRINT=true` or
/// `LOGSTASH_LAYOUT_ADDITIONAL_FIELDS=app=demo,host=${env:HOSTNAME}`.
#[tokio::main]
async fn main() {
    init_from_env(LayerConfig::default())
        .await
        .expect("install subscriber");

    info!("starting service");

    let err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "upstream refused connection");
    error!(
        user_id = 42,
        reason = "invalid password",
        error = &err as &(dyn std::error::Error + 'static),
        "authentication failed"
    );

    sleep(Duration::from_secs(2)).await;
}
