//! Decide what to do with each node of a message's part tree.

use crate::model::part::{Disposition, Part};

/// What the extractor does with one part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartAction {
    /// Container: walk the children in order, write nothing for the node itself.
    Descend,
    /// Declared attachment (or a named part not marked inline).
    Attachment,
    /// Not declared an attachment, but its content type is always kept.
    /// `inline` records whether it was explicitly marked inline.
    Forced { inline: bool },
    /// Image saved into the inline-images folder.
    InlineImage,
    /// Nothing to extract.
    Skip,
}

/// Classify `part`. First matching rule wins:
///
/// 1. containers are descended into;
/// 2. disposition `attachment`, or a filename without disposition `inline`;
/// 3. binary-ish content types (`application/*` except JavaScript, `model/*`,
///    `audio/*`, `video/*`) regardless of disposition;
/// 4. `image/*` when inline images are enabled;
/// 5. everything else is skipped.
pub fn classify(part: &Part, inline_images: bool) -> PartAction {
    if part.is_multipart() {
        return PartAction::Descend;
    }

    let disposition = part.disposition();
    let is_inline = disposition == Some(&Disposition::Inline);

    if disposition == Some(&Disposition::Attachment) || (!is_inline && part.filename().is_some())
    {
        return PartAction::Attachment;
    }

    let content_type = part.content_type();
    if is_forced_type(content_type) {
        return PartAction::Forced { inline: is_inline };
    }

    if inline_images && content_type.starts_with("image/") {
        return PartAction::InlineImage;
    }

    PartAction::Skip
}

fn is_forced_type(content_type: &str) -> bool {
    (content_type.starts_with("application/") && content_type != "application/javascript")
        || content_type.starts_with("model/")
        || content_type.starts_with("audio/")
        || content_type.starts_with("video/")
}
