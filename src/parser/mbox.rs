//! Streaming MBOX scanner.
//!
//! Reads MBOX files line-by-line through a large buffer to find message
//! boundaries. Never loads the entire file into memory. Tolerant of malformed input.

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{MboxError, Result};

/// Default size of the internal read buffer (1 MB for fast sequential reads on modern SSDs).
const READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Streaming MBOX scanner.
///
/// Walks the file sequentially and reports the byte range of every message
/// it finds. The scanner is tolerant of:
///
/// - Mixed `\n` and `\r\n` line endings
/// - `From ` lines not preceded by a blank line (logs a warning)
/// - Truncated messages at EOF
/// - NUL bytes and other binary content in the body
/// - UTF-8 BOM at the start of the file
pub struct MboxParser {
    path: PathBuf,
    file_size: u64,
    read_buffer_size: usize,
}

impl MboxParser {
    /// Create a scanner for the given MBOX file.
    ///
    /// Verifies that the path exists and is a regular file, but does NOT
    /// validate that it is actually an MBOX.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = std::fs::metadata(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MboxError::FileNotFound(path.clone())
            } else {
                MboxError::io(&path, e)
            }
        })?;
        if !metadata.is_file() {
            return Err(MboxError::FileNotFound(path));
        }
        Ok(Self {
            path,
            file_size: metadata.len(),
            read_buffer_size: READ_BUFFER_SIZE,
        })
    }

    /// Override the read buffer size (clamped to at least 4 KB).
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(4096);
        self
    }

    /// Total size of the underlying file in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Path to the MBOX file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Scan the full MBOX, calling `boundary_callback` for each message found.
    ///
    /// The callback receives `(offset, length)`, where `offset` points at the
    /// `From ` separator line and `length` runs up to the next separator (or
    /// EOF). It returns `true` to continue or `false` to stop early. Anything
    /// before the first separator is not a message and is skipped.
    ///
    /// Returns the number of messages reported.
    pub fn scan(
        &self,
        boundary_callback: &mut dyn FnMut(u64, u64) -> bool,
        progress_callback: Option<&dyn Fn(u64, u64)>,
    ) -> Result<u64> {
        if self.file_size == 0 {
            return Ok(0);
        }

        let file = File::open(&self.path).map_err(|e| MboxError::io(&self.path, e))?;
        let mut reader = BufReader::with_capacity(self.read_buffer_size, file);

        let mut count: u64 = 0;
        let mut current_offset: u64 = 0;
        let mut message_start: Option<u64> = None;
        let mut prev_line_was_empty = true;
        let mut first_line = true;
        let mut at_line_start = true;
        let mut last_progress: u64 = 0;

        // Reusable line buffer, avoids allocation per line
        let mut line_buf: Vec<u8> = Vec::with_capacity(4096);

        // Progress every 4 MB (less overhead on large files)
        const PROGRESS_INTERVAL: u64 = 4 * 1024 * 1024;

        loop {
            line_buf.clear();
            let line_len = {
                let buf = reader
                    .fill_buf()
                    .map_err(|e| MboxError::io(&self.path, e))?;
                if buf.is_empty() {
                    break; // EOF
                }
                let newline_pos = memchr_newline(buf);
                let consume_len = match newline_pos {
                    Some(pos) => pos + 1,
                    None => buf.len(),
                };
                line_buf.extend_from_slice(&buf[..consume_len]);
                reader.consume(consume_len);
                consume_len as u64
            };

            // A line longer than the buffer arrives in pieces; only the first
            // piece of a line can be a separator
            if at_line_start && is_mbox_separator(&line_buf) {
                if !first_line && !prev_line_was_empty {
                    warn!(
                        offset = current_offset,
                        "Found 'From ' separator without preceding blank line"
                    );
                }

                if let Some(start) = message_start {
                    if !boundary_callback(start, current_offset - start) {
                        return Ok(count);
                    }
                    count += 1;
                }
                message_start = Some(current_offset);
            }

            at_line_start = line_buf.ends_with(b"\n");
            prev_line_was_empty = is_blank_line(&line_buf);
            first_line = false;
            current_offset += line_len;

            if let Some(cb) = progress_callback {
                if current_offset - last_progress >= PROGRESS_INTERVAL {
                    cb(current_offset, self.file_size);
                    last_progress = current_offset;
                }
            }
        }

        // Flush last message
        if let Some(start) = message_start {
            if boundary_callback(start, current_offset - start) {
                count += 1;
            }
        }

        if let Some(cb) = progress_callback {
            cb(self.file_size, self.file_size);
        }

        Ok(count)
    }
}

/// Seek to `offset` in an open file and read exactly `length` bytes.
pub(crate) fn read_range(file: &mut File, path: &Path, offset: u64, length: u64) -> Result<Vec<u8>> {
    file.seek(SeekFrom::Start(offset))
        .map_err(|e| MboxError::io(path, e))?;
    let mut buffer = vec![0u8; length as usize];
    file.read_exact(&mut buffer)
        .map_err(|e| MboxError::io(path, e))?;
    Ok(buffer)
}

/// Fast newline search (equivalent to memchr for `\n`).
#[inline]
fn memchr_newline(buf: &[u8]) -> Option<usize> {
    buf.iter().position(|&b| b == b'\n')
}

/// Check whether a line is an MBOX separator (`From ` at the start).
fn is_mbox_separator(line: &[u8]) -> bool {
    // Skip BOM if present at very start
    let line = if line.starts_with(&[0xEF, 0xBB, 0xBF]) {
        &line[3..]
    } else {
        line
    };
    line.starts_with(b"From ")
}

/// Check whether a line is blank (empty or only whitespace / CR / LF).
fn is_blank_line(line: &[u8]) -> bool {
    line.iter()
        .all(|&b| b == b'\n' || b == b'\r' || b == b' ' || b == b'\t')
}
