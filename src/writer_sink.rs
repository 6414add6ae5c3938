use crate::encoder::Layout;
use crate::sink::LogSink;
use async_trait::async_trait;
use std::error::Error;
use std::path::Path;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// [`LogSink`] writing documents to any async writer.
///
/// Takes the framing bytes of the layout at construction: the header goes
/// out before the first document, the separator between documents and the
/// footer on [`close`](LogSink::close).
pub struct WriterSink {
    state: Mutex<WriterState>,
    header: Option<Vec<u8>>,
    separator: Option<Vec<u8>>,
    footer: Option<Vec<u8>>,
}

struct WriterState {
    writer: BoxedWriter,
    started: bool,
    closed: bool,
}

impl WriterSink {
    pub fn new<W>(writer: W, layout: &dyn Layout) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            state: Mutex::new(WriterState {
                writer: Box::new(writer),
                started: false,
                closed: false,
            }),
            header: layout.header(),
            separator: layout.separator(),
            footer: layout.footer(),
        }
    }

    pub fn stdout(layout: &dyn Layout) -> Self {
        Self::new(tokio::io::stdout(), layout)
    }

    pub fn stderr(layout: &dyn Layout) -> Self {
        Self::new(tokio::io::stderr(), layout)
    }

    /// Open `path` for appending, creating it if missing.
    pub async fn file(path: impl AsRef<Path>, layout: &dyn Layout) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        Ok(Self::new(file, layout))
    }
}

#[async_trait]
impl LogSink for WriterSink {
    async fn send(&self, document: &[u8]) -> Result<(), Box<dyn Error + Send + Sync>> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err("writer sink is closed".into());
        }
        if !state.started {
            if let Some(header) = &self.header {
                state.writer.write_all(header).await?;
            }
            state.started = true;
        } else if let Some(separator) = &self.separator {
            state.writer.write_all(separator).await?;
        }
        state.writer.write_all(document).await?;
        Ok(())
    }

    async fn flush(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let mut state = self.state.lock().await;
        state.writer.flush().await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Ok(());
        }
        // An empty complete-mode stream still has to be a valid array.
        if !state.started {
            if let Some(header) = &self.header {
                state.writer.write_all(header).await?;
            }
            state.started = true;
        }
        if let Some(footer) = &self.footer {
            state.writer.write_all(footer).await?;
        }
        state.writer.flush().await?;
        state.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LayoutConfig;
    use crate::encoder::EventEncoder;
    use crate::record::LogEvent;
    use tokio::io::AsyncReadExt;

    async fn collect(layout: &EventEncoder, events: usize) -> String {
        let (client, mut server) = tokio::io::duplex(64 * 1024);
        let sink = WriterSink::new(client, layout);
        for i in 0..events {
            let event = LogEvent::builder().epoch_millis(0).field("i", i as i64).build();
            sink.send(&layout.encode(&event)).await.unwrap();
        }
        sink.close().await.unwrap();
        drop(sink);

        let mut out = String::new();
        server.read_to_string(&mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn line_mode_writes_one_document_per_line() {
        let out = collect(&EventEncoder::default(), 3).await;
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        for line in lines {
            serde_json::from_str::<serde_json::Value>(line).unwrap();
        }
    }

    #[tokio::test]
    async fn complete_mode_writes_a_json_array() {
        for eol in [true, false] {
            let layout = EventEncoder::new(LayoutConfig {
                complete: true,
                event_eol: eol,
                ..LayoutConfig::default()
            });
            let out = collect(&layout, 3).await;
            let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
            assert_eq!(parsed.as_array().unwrap().len(), 3);
            assert_eq!(parsed[2]["i"], 2);
        }
    }

    #[tokio::test]
    async fn empty_complete_stream_is_an_empty_array() {
        let layout = EventEncoder::new(LayoutConfig {
            complete: true,
            ..LayoutConfig::default()
        });
        let out = collect(&layout, 0).await;
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed, serde_json::json!([]));
    }

    #[tokio::test]
    async fn send_after_close_fails() {
        let layout = EventEncoder::default();
        let sink = WriterSink::new(tokio::io::sink(), &layout);
        sink.close().await.unwrap();
        assert!(sink.send(b"{}\n").await.is_err());
    }
}
