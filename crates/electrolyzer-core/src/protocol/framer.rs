//! Newline framing for the raw device byte stream.
//!
//! Wire format:
//! ```text
//! {"water":55.2,"production":80}\n
//! {"water":55.4,"production":81}\r\n
//! ```
//!
//! TCP is a *stream* protocol.  A single read may return:
//!
//! - fewer bytes than one full line (partial read),
//! - several lines at once (coalesced reads),
//! - a line that ends in the middle of a multi-byte UTF-8 character.
//!
//! [`LineFramer`] accumulates bytes and only hands out a record once its
//! `\n` terminator has arrived.  Splitting is done on raw bytes, so UTF-8 is
//! validated per complete record rather than per chunk.
//!
//! # Record filter
//!
//! Each record is trimmed of surrounding whitespace (which also strips the
//! `\r` of a `\r\n` terminator).  Records shorter than [`MIN_RECORD_CHARS`]
//! characters are dropped silently: microcontrollers tend to emit stray
//! control bytes and blank lines around resets.

use thiserror::Error;

/// Records shorter than this many characters (after trimming) are discarded.
pub const MIN_RECORD_CHARS: usize = 3;

/// Default upper bound on a single unterminated line, in bytes.
pub const DEFAULT_MAX_LINE_BYTES: usize = 64 * 1024;

/// Per-record framing failures.
///
/// Neither variant is fatal: the framer keeps working and later records are
/// unaffected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// A complete record was not valid UTF-8.
    #[error("record is not valid UTF-8 (valid up to byte {valid_up_to})")]
    InvalidUtf8 { valid_up_to: usize },

    /// A line grew past the configured limit before its terminator arrived.
    ///
    /// The partial line is discarded and framing resumes after the next `\n`.
    #[error("line exceeded {limit} bytes without a terminator; discarded")]
    LineTooLong { limit: usize },
}

/// Incremental splitter for newline-delimited records.
///
/// # Examples
///
/// ```rust
/// use electrolyzer_core::LineFramer;
///
/// let mut framer = LineFramer::new();
/// assert!(framer.push(b"{\"water\":5").is_empty());
/// let records = framer.push(b"5.2}\n");
/// assert_eq!(records, vec![Ok("{\"water\":55.2}".to_string())]);
/// ```
#[derive(Debug)]
pub struct LineFramer {
    /// Bytes of the current, not yet terminated line.
    buf: Vec<u8>,
    max_line_bytes: usize,
    /// Set after an overlong line was reported; cleared at the next `\n`.
    discarding: bool,
}

impl LineFramer {
    /// Creates a framer with the [`DEFAULT_MAX_LINE_BYTES`] limit.
    pub fn new() -> Self {
        Self::with_max_line_bytes(DEFAULT_MAX_LINE_BYTES)
    }

    /// Creates a framer that discards lines longer than `max_line_bytes`.
    ///
    /// A limit of zero is treated as one byte.
    pub fn with_max_line_bytes(max_line_bytes: usize) -> Self {
        Self {
            buf: Vec::with_capacity(256),
            max_line_bytes: max_line_bytes.max(1),
            discarding: false,
        }
    }

    /// Feeds one chunk of bytes and returns every record it completed, in
    /// arrival order.
    ///
    /// Bytes after the last `\n` stay buffered until a later call (or
    /// [`finish`](Self::finish)) completes them.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<String, FrameError>> {
        let mut records = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            let head = &rest[..pos];
            rest = &rest[pos + 1..];

            if self.discarding {
                // Tail of a line that was already reported as too long.
                self.discarding = false;
                self.buf.clear();
                continue;
            }

            if self.buf.len() + head.len() > self.max_line_bytes {
                self.buf.clear();
                records.push(Err(FrameError::LineTooLong {
                    limit: self.max_line_bytes,
                }));
                continue;
            }

            self.buf.extend_from_slice(head);
            if let Some(record) = Self::record(&self.buf) {
                records.push(record);
            }
            self.buf.clear();
        }

        if !rest.is_empty() && !self.discarding {
            if self.buf.len() + rest.len() > self.max_line_bytes {
                self.buf.clear();
                self.discarding = true;
                records.push(Err(FrameError::LineTooLong {
                    limit: self.max_line_bytes,
                }));
            } else {
                self.buf.extend_from_slice(rest);
            }
        }

        records
    }

    /// Flushes the final unterminated record at end-of-stream.
    ///
    /// The same filters as [`push`](Self::push) apply.  The framer is empty
    /// afterwards and can be reused.
    pub fn finish(&mut self) -> Option<Result<String, FrameError>> {
        let record = if self.discarding {
            None
        } else {
            Self::record(&self.buf)
        };
        self.reset();
        record
    }

    /// Number of buffered bytes that belong to an incomplete line.
    pub fn pending_bytes(&self) -> usize {
        self.buf.len()
    }

    /// Drops any partial line.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.discarding = false;
    }

    fn record(bytes: &[u8]) -> Option<Result<String, FrameError>> {
        match std::str::from_utf8(bytes) {
            Ok(text) => {
                let text = text.trim();
                if text.chars().count() < MIN_RECORD_CHARS {
                    None
                } else {
                    Some(Ok(text.to_owned()))
                }
            }
            Err(e) => Some(Err(FrameError::InvalidUtf8 {
                valid_up_to: e.valid_up_to(),
            })),
        }
    }
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
