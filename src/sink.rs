use async_trait::async_trait;
use std::error::Error;

/// Asynchronous destination for encoded log documents.
///
/// Implementations own the actual output (stdout, a file, ...). The
/// layer calls `send` from a background task and never awaits it on the
/// application thread.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Write one encoded document.
    ///
    /// **Parameters**
    /// - `document`: bytes produced by a [`Layout`](crate::encoder::Layout),
    ///   terminators included.
    ///
    /// **Returns**
    /// - `Ok(())` if the document was accepted.
    /// - `Err(..)` if the destination failed. The layer treats this as a
    ///   transient failure and retries the batch with backoff.
    async fn send(&self, document: &[u8]) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Flush any buffered output. Default implementation is a no-op.
    async fn flush(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }

    /// Finish the output, e.g. close a JSON array. Called once when the
    /// layer shuts down. Default implementation flushes.
    async fn close(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.flush().await
    }
}
