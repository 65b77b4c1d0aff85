//! Attachment display names from raw filename headers.

use tracing::warn;

use crate::error::{MboxError, Result};
use crate::parser::header::{self, HeaderFragment};

/// Turn a part's raw filename header into a display name. Never fails.
///
/// Only the first RFC 2047 fragment is used. When the header is missing,
/// decodes to nothing, or cannot be decoded, `fallback` is returned and a
/// warning naming the message is logged.
pub fn decode_attachment_name(message: u64, raw: Option<&str>, fallback: &str) -> String {
    let Some(raw) = raw else {
        warn!(message, fallback, "Filename is missing, using fallback name");
        return fallback.to_string();
    };

    match first_fragment_text(raw) {
        Ok(name) if !name.trim().is_empty() => name,
        Ok(_) => {
            warn!(message, fallback, "Filename is empty, using fallback name");
            fallback.to_string()
        }
        Err(e) => {
            warn!(
                message,
                fallback,
                raw,
                error = %e,
                "Could not decode attachment name"
            );
            fallback.to_string()
        }
    }
}

/// Text of the first fragment of an encoded header.
///
/// Fails when an encoded word is malformed, when its charset is unknown or
/// does not fit the bytes, and when the first fragment is unencoded text
/// sitting in front of an encoded word (it carries no charset).
pub fn first_fragment_text(raw: &str) -> Result<String> {
    let fragments = header::decode_fragments(raw)?;
    match fragments.into_iter().next() {
        Some(HeaderFragment::Text(text)) => Ok(text),
        Some(HeaderFragment::Bytes {
            bytes,
            charset: Some(charset),
        }) => header::decode_charset_strict(&charset, &bytes),
        Some(HeaderFragment::Bytes { charset: None, .. }) => Err(
            MboxError::UnsupportedEncoding("leading fragment declares no charset".into()),
        ),
        None => Ok(String::new()),
    }
}
