//! Line-oriented view over an attach byte stream.
//!
//! Each attached stream (stdout, stderr) gets its own `LineReader`; the
//! receive worker merges the two with `select!`, which is why
//! `next_line` has to be cancellation-safe (tokio's `Lines::next_line`
//! guarantees this).

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tracing::{debug, warn};

/// Yields trimmed text lines from a byte stream until the stream ends or
/// errors; fused afterwards. Not restartable - a new reader is created per
/// attach.
pub struct LineReader<R> {
    lines: Lines<BufReader<R>>,
    label: &'static str,
    done: bool,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    /// Wraps a byte stream. `label` names the stream in log output
    /// (e.g. "stdout").
    pub fn new(reader: R, label: &'static str) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
            label,
            done: false,
        }
    }

    /// Next line with trailing whitespace removed, or `None` once the
    /// stream has terminated. A clean end-of-stream and a read error both
    /// terminate the sequence; only the log line differs.
    pub async fn next_line(&mut self) -> Option<String> {
        if self.done {
            return None;
        }
        match self.lines.next_line().await {
            Ok(Some(line)) => Some(line.trim_end().to_string()),
            Ok(None) => {
                debug!(stream = self.label, "detaching from stream");
                self.done = true;
                None
            }
            Err(err) => {
                warn!(stream = self.label, error = %err, "stream ended unexpectedly");
                self.done = true;
                None
            }
        }
    }

    /// Whether the sequence has terminated.
    pub fn is_done(&self) -> bool {
        self.done
    }
}
