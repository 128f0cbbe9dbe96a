//! Newline-delimited JSON row codec.
//!
//! Every line is one JSON object mapping field names to scalars or lists.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use esbridge_shared::{EsBridgeError, Record, Result};

const STDIN: &str = "<stdin>";
const STDOUT: &str = "<stdout>";

/// Reads records one line at a time.
pub struct RowReader<R> {
    inner: R,
    line: usize,
    records: usize,
    buf: String,
}

impl<R: AsyncBufRead + Unpin> RowReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            line: 0,
            records: 0,
            buf: String::new(),
        }
    }

    /// The next record with its 1-based ordinal, `None` at end of input.
    ///
    /// Blank lines are skipped and do not count as records.
    pub async fn next_record(&mut self) -> Result<Option<(usize, Record)>> {
        loop {
            self.buf.clear();
            let read = self
                .inner
                .read_line(&mut self.buf)
                .await
                .map_err(|e| match e.kind() {
                    std::io::ErrorKind::InvalidData => EsBridgeError::Parse {
                        line: self.line + 1,
                        message: e.to_string(),
                    },
                    _ => EsBridgeError::io(STDIN, e),
                })?;
            if read == 0 {
                return Ok(None);
            }
            self.line += 1;

            let line = self.buf.trim();
            if line.is_empty() {
                continue;
            }

            let record: Record = serde_json::from_str(line).map_err(|e| EsBridgeError::Parse {
                line: self.line,
                message: e.to_string(),
            })?;
            self.records += 1;
            return Ok(Some((self.records, record)));
        }
    }
}

/// Writes records as compact JSON lines.
pub struct RowWriter<W> {
    inner: W,
    written: usize,
}

impl<W: AsyncWrite + Unpin> RowWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    pub async fn write(&mut self, record: &Record) -> Result<()> {
        let mut line = serde_json::to_vec(record)
            .map_err(|e| EsBridgeError::validation(format!("cannot encode row: {e}")))?;
        line.push(b'\n');
        self.inner
            .write_all(&line)
            .await
            .map_err(|e| EsBridgeError::io(STDOUT, e))?;
        self.written += 1;
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.inner
            .flush()
            .await
            .map_err(|e| EsBridgeError::io(STDOUT, e))
    }

    /// Rows written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}
