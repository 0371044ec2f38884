//! JSONL transport I/O.
//!
//! Workers speak newline-delimited JSON over stdin/stdout. The reader is
//! graceful: malformed lines are logged (with truncated previews) and
//! skipped, so one bad record never wedges a session.

use std::io::{BufRead, BufReader, Read};
use tracing::{debug, warn};

use super::message::WorkerMessage;
use crate::logging::log_preview;

/// Parse a single JSONL record.
pub fn parse_message(line: &str) -> Result<WorkerMessage, serde_json::Error> {
    serde_json::from_str(line)
}

/// Serialize a message to one JSON line (no trailing newline).
pub fn serialize_message(msg: &WorkerMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(msg)
}

/// Streaming JSONL reader over a worker's stdout.
///
/// Reuses one line buffer across reads to avoid a String allocation per
/// record.
pub struct JsonlReader<R: Read> {
    reader: BufReader<R>,
    line_buffer: String,
}

impl<R: Read> JsonlReader<R> {
    pub fn new(reader: R) -> Self {
        JsonlReader {
            reader: BufReader::new(reader),
            line_buffer: String::with_capacity(1024),
        }
    }

    /// Read the next well-formed message.
    ///
    /// Empty lines are skipped; malformed lines are logged and skipped.
    /// Returns `Ok(None)` at end of stream, `Err` only for I/O errors.
    pub fn next_message(&mut self) -> Result<Option<WorkerMessage>, std::io::Error> {
        loop {
            self.line_buffer.clear();
            match self.reader.read_line(&mut self.line_buffer)? {
                0 => {
                    debug!("Reached end of JSONL stream");
                    return Ok(None);
                }
                _ => {
                    let trimmed = self.line_buffer.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    match parse_message(trimmed) {
                        Ok(msg) => return Ok(Some(msg)),
                        Err(e) => {
                            let (preview, raw_len) = log_preview(trimmed);
                            warn!(
                                error = %e,
                                raw_preview = %preview,
                                raw_len = raw_len,
                                "Skipping malformed JSONL record"
                            );
                            continue;
                        }
                    }
                }
            }
        }
    }
}
