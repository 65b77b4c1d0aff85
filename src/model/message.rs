//! A single archive message with its parsed part tree.

use super::part::Part;

/// A message pulled from the archive, ready for classification.
#[derive(Debug, Clone)]
pub struct MailMessage {
    /// Position within the archive (0, 1, 2, …). Used as the file name prefix.
    pub index: u64,

    /// Raw `From:` header value (empty if absent).
    pub from: String,

    /// Raw `To:` header value (empty if absent).
    pub to: String,

    /// Root of the content tree.
    pub root: Part,
}

impl MailMessage {
    /// Top-level children when the message is multipart; `None` for single-part messages.
    pub fn top_level_parts(&self) -> Option<&[Part]> {
        match &self.root {
            Part::Multipart { children, .. } => Some(children),
            Part::Leaf { .. } => None,
        }
    }

    /// Case-insensitive substring match against the raw `From:` value.
    pub fn sender_matches(&self, filter: &str) -> bool {
        contains_ignore_case(&self.from, filter)
    }

    /// Case-insensitive substring match against the raw `To:` value.
    pub fn recipient_matches(&self, filter: &str) -> bool {
        contains_ignore_case(&self.to, filter)
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
