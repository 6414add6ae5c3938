use crate::backend::{make_sink, parse_target, SinkBuildError, TargetError};
use crate::config::{ConfigError, LayoutConfig};
use crate::encoder::{EventEncoder, Layout};
use crate::env::{env_or, LOGSTASH_LAYOUT_TARGET_ENV};
use crate::layer::LogstashLayer;
use crate::level::Level;
use crate::sink::LogSink;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Configuration of the logging layer.
///
/// **Fields**
/// - `channel_buffer`: maximum number of encoded documents queued before
///   new ones are dropped.
/// - `batch_size`: documents written to the sink per batch.
/// - `flush_interval`: maximum time between flushes of a partial batch.
/// - `min_level`: least severe level that is captured.
/// - `enable_stdout`: if `true`, a `tracing_subscriber::fmt` layer is
///   added on top so events are also printed in human-readable form.
#[derive(Clone, Debug)]
pub struct LayerConfig {
    pub channel_buffer: usize,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub min_level: Level,
    pub enable_stdout: bool,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            channel_buffer: 1024,
            batch_size: 128,
            flush_interval: Duration::from_secs(1),
            min_level: Level::Info,
            enable_stdout: false,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Target(#[from] TargetError),

    #[error(transparent)]
    Sink(#[from] SinkBuildError),

    #[error(transparent)]
    SetGlobalDefault(#[from] SetGlobalDefaultError),
}

/// Install a global `tracing` subscriber that encodes events with
/// `layout` and writes them to `sink`.
///
/// **Effects**
///
/// Installs a [`Registry`] combined with [`LogstashLayer`] as the global
/// default subscriber, so all `tracing` events in the process are observed
/// by the layer. Must be called inside a Tokio runtime; the returned handle
/// belongs to the background writer task.
pub fn init_tracing_with_config(
    layout: Arc<dyn Layout>,
    sink: Arc<dyn LogSink>,
    config: LayerConfig,
) -> Result<JoinHandle<()>, InitError> {
    let (layer, handle) = LogstashLayer::new(
        layout,
        sink,
        config.min_level,
        config.channel_buffer,
        config.batch_size,
        config.flush_interval,
    );

    // Two subscriber shapes, since the fmt layer changes the type.
    if config.enable_stdout {
        let fmt_layer = tracing_subscriber::fmt::layer();
        let subscriber = Registry::default().with(layer).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }
    tracing::debug!(min_level = %config.min_level, "logstash layer installed");
    Ok(handle)
}

/// Initialize tracing with the default [`LayerConfig`].
pub fn init_tracing(layout: Arc<dyn Layout>, sink: Arc<dyn LogSink>) -> Result<JoinHandle<()>, InitError> {
    init_tracing_with_config(layout, sink, LayerConfig::default())
}

/// Build layout and sink from `LOGSTASH_LAYOUT_*` environment variables
/// and install them. The target defaults to `stdout`.
///
/// This is the recommended entrypoint for typical services.
pub async fn init_from_env(config: LayerConfig) -> Result<JoinHandle<()>, InitError> {
    let layout_config = LayoutConfig::from_env()?;
    let target = parse_target(&env_or(LOGSTASH_LAYOUT_TARGET_ENV, "stdout"))?;
    let layout = Arc::new(EventEncoder::new(layout_config));
    let sink = make_sink(&target, &*layout).await?;
    init_tracing_with_config(layout, sink, config)
}
