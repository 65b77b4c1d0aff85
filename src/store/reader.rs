//! MBOX archive: random access to messages by index.

use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{MboxError, Result};
use crate::parser::mbox::{read_range, MboxParser};

/// Default maximum message size in bytes (256 MB).
const MAX_MESSAGE_SIZE: usize = 256 * 1024 * 1024;

/// Byte range of one message inside the archive file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MessageSpan {
    offset: u64,
    length: u64,
}

/// Reads messages from an MBOX file by their position (0, 1, 2, …).
///
/// Message boundaries are found with a single streaming scan when the
/// archive is opened; afterwards each lookup is one seek and one read.
pub struct MboxArchive {
    path: PathBuf,
    file: File,
    spans: Vec<MessageSpan>,
    max_message_size: usize,
}

impl MboxArchive {
    /// Open an MBOX file and index its message boundaries.
    ///
    /// Fails with [`MboxError::FileNotFound`] when the path is not a file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, None, MAX_MESSAGE_SIZE, None)
    }

    /// Like [`MboxArchive::open`], with tuning knobs and an optional scan
    /// progress callback receiving `(bytes_scanned, file_size)`.
    pub fn open_with(
        path: impl AsRef<Path>,
        read_buffer_size: Option<usize>,
        max_message_size: usize,
        progress: Option<&dyn Fn(u64, u64)>,
    ) -> Result<Self> {
        let mut parser = MboxParser::new(path)?;
        if let Some(size) = read_buffer_size {
            parser = parser.with_read_buffer_size(size);
        }
        let path = parser.path().to_path_buf();

        let mut spans = Vec::new();
        parser.scan(
            &mut |offset, length| {
                spans.push(MessageSpan { offset, length });
                true
            },
            progress,
        )?;
        info!(
            path = %path.display(),
            messages = spans.len(),
            size = parser.file_size(),
            "Scanned archive"
        );

        let file = File::open(&path).map_err(|e| MboxError::io(&path, e))?;
        Ok(Self {
            path,
            file,
            spans,
            max_message_size,
        })
    }

    /// Number of messages in the archive.
    pub fn len(&self) -> u64 {
        self.spans.len() as u64
    }

    /// Raw bytes of message `index`, including its `From ` line.
    ///
    /// Returns `Ok(None)` when the archive has no message at that index.
    /// Messages larger than the configured maximum are truncated.
    pub fn get_message(&mut self, index: u64) -> Result<Option<Vec<u8>>> {
        let Some(span) = usize::try_from(index)
            .ok()
            .and_then(|i| self.spans.get(i))
            .copied()
        else {
            return Ok(None);
        };

        let mut length = span.length;
        if length > self.max_message_size as u64 {
            warn!(
                index,
                offset = span.offset,
                max_size = self.max_message_size,
                "Message exceeds maximum size, truncating body"
            );
            length = self.max_message_size as u64;
        }

        debug!(
            index,
            offset = span.offset,
            length,
            "Reading message from MBOX"
        );
        read_range(&mut self.file, &self.path, span.offset, length).map(Some)
    }
}
