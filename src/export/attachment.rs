//! Write one classified part to disk.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{MboxError, Result};
use crate::model::part::Part;

use super::collision::PathAllocator;
use super::filename::{file_extension, guess_extension, sanitize_filename};
use super::naming::decode_attachment_name;

/// Which numbering stream (and folder) a saved part belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Attachment,
    InlineImage,
}

/// Per-message bookkeeping: label counters and the paths handed out so far.
///
/// Created when a message starts and dropped when it ends, so numbering and
/// collision checks never leak between messages.
#[derive(Debug, Default)]
pub struct ExtractionState {
    attachments: u32,
    inline_images: u32,
    paths: PathAllocator,
}

impl ExtractionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bump the counter for `category` and return its label (`"3"`, `"ii2"`).
    pub fn next_label(&mut self, category: Category) -> String {
        match category {
            Category::Attachment => {
                self.attachments += 1;
                self.attachments.to_string()
            }
            Category::InlineImage => {
                self.inline_images += 1;
                format!("ii{}", self.inline_images)
            }
        }
    }
}

/// A part that made it to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedPart {
    pub path: PathBuf,
    pub bytes: u64,
    /// The decoded name was too long for the file system and the
    /// `"<index> <label><ext>"` form was used instead.
    pub shortened: bool,
}

/// Save `part` of message `message` into `dir` under the label `label`.
///
/// The name is decoded from the part's filename header (falling back to the
/// label), sanitized, prefixed with `"<message> "` and made unique within
/// the message. If the file system rejects the name as too long, the short
/// `"<message> <label><ext>"` name is resolved and written instead.
pub fn save_part(
    message: u64,
    part: &Part,
    label: &str,
    dir: &Path,
    state: &mut ExtractionState,
    guess_extensions: bool,
) -> Result<SavedPart> {
    let fallback = if guess_extensions {
        let ext = guess_extension(part.content_type()).unwrap_or_default();
        format!("{label}{ext}")
    } else {
        label.to_string()
    };

    let decoded = decode_attachment_name(message, part.filename(), &fallback);
    let name = format!("{message} {}", sanitize_filename(&decoded));
    let payload = part.payload();

    let path = state.paths.allocate(dir, &name, label);
    match write_payload(&path, payload) {
        Ok(()) => Ok(SavedPart {
            path,
            bytes: payload.len() as u64,
            shortened: false,
        }),
        Err(e) if e.io_source().is_some_and(is_name_too_long) => {
            let short_name = format!("{message} {label}{}", file_extension(&name));
            let short_path = state.paths.allocate(dir, &short_name, label);
            warn!(
                message,
                label,
                path = %short_path.display(),
                "Filename too long, using short name"
            );
            write_payload(&short_path, payload)?;
            Ok(SavedPart {
                path: short_path,
                bytes: payload.len() as u64,
                shortened: true,
            })
        }
        Err(e) => Err(e),
    }
}

fn write_payload(path: &Path, payload: &[u8]) -> Result<()> {
    debug!(path = %path.display(), bytes = payload.len(), "Writing part");
    std::fs::write(path, payload).map_err(|e| MboxError::io(path, e))
}

/// Whether the OS refused a path because a component is too long.
fn is_name_too_long(err: &std::io::Error) -> bool {
    #[cfg(unix)]
    {
        err.raw_os_error() == Some(libc::ENAMETOOLONG)
    }
    #[cfg(windows)]
    {
        // ERROR_FILENAME_EXCED_RANGE
        err.raw_os_error() == Some(206)
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = err;
        false
    }
}
