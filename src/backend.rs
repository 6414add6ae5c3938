use std::path::PathBuf;
use std::sync::Arc;

use crate::encoder::Layout;
use crate::noop_sink::NoopSink;
use crate::sink::LogSink;
use crate::writer_sink::WriterSink;

/// Local destinations that can be selected with a target string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkTarget {
    Stdout,
    Stderr,
    Null,
    File(PathBuf),
}

/// Parse a target string.
///
/// Examples:
/// - "stdout"
/// - "stderr"
/// - "null"
/// - "file:///var/log/app/events.json"
pub fn parse_target(target: &str) -> Result<SinkTarget, TargetError> {
    let trimmed = target.trim();
    let lower = trimmed.to_ascii_lowercase();

    if lower == "stdout" || lower == "-" {
        Ok(SinkTarget::Stdout)
    } else if lower == "stderr" {
        Ok(SinkTarget::Stderr)
    } else if lower == "null" || lower == "none" {
        Ok(SinkTarget::Null)
    } else if lower.starts_with("file://") {
        let path = &trimmed["file://".len()..];
        if path.is_empty() {
            Err(TargetError::EmptyPath)
        } else {
            Ok(SinkTarget::File(PathBuf::from(path)))
        }
    } else {
        Err(TargetError::UnknownScheme(trimmed.to_string()))
    }
}

/// Error type returned when parsing a target string.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum TargetError {
    #[error("unknown or unsupported sink target `{0}`")]
    UnknownScheme(String),

    #[error("file target without a path")]
    EmptyPath,
}

/// Error type returned when building a sink from a target.
#[derive(thiserror::Error, Debug)]
pub enum SinkBuildError {
    #[error("failed to open log file {path}")]
    OpenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Create a concrete `LogSink` for `target`, framing output for `layout`.
pub async fn make_sink(target: &SinkTarget, layout: &dyn Layout) -> Result<Arc<dyn LogSink>, SinkBuildError> {
    let sink: Arc<dyn LogSink> = match target {
        SinkTarget::Stdout => Arc::new(WriterSink::stdout(layout)),
        SinkTarget::Stderr => Arc::new(WriterSink::stderr(layout)),
        SinkTarget::Null => Arc::new(NoopSink),
        SinkTarget::File(path) => {
            let sink = WriterSink::file(path, layout)
                .await
                .map_err(|source| SinkBuildError::OpenFile {
                    path: path.clone(),
                    source,
                })?;
            Arc::new(sink)
        }
    };
    Ok(sink)
}
