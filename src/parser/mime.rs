//! MIME message parsing: converts `mail-parser` output into the crate's [`Part`] tree.

use mail_parser::parsers::MessageStream;
use mail_parser::{Encoding, Message, MessageParser, MessagePart, MimeHeaders, PartType};
use tracing::warn;

use crate::error::{MboxError, Result};
use crate::model::message::MailMessage;
use crate::model::part::{Disposition, Part};
use crate::parser::header;

/// Maximum nesting depth of containers (to prevent stack overflow on adversarial input).
/// Anything deeper is dropped with a warning.
const MAX_DEPTH: usize = 32;

/// Parse a complete raw message (optionally starting with its MBOX `From ` line).
pub fn parse_message(index: u64, raw_message: &[u8]) -> Result<MailMessage> {
    let message_bytes = skip_from_line(raw_message);

    let parser = MessageParser::default();
    let parsed = parser.parse(message_bytes).ok_or_else(|| {
        MboxError::MimeError(format!("message {index} could not be parsed"))
    })?;

    let root_headers = part_headers(&parsed, parsed.root_part());
    let from = header::get_header(&root_headers, "from")
        .unwrap_or_default()
        .to_string();
    let to = header::get_header(&root_headers, "to")
        .unwrap_or_default()
        .to_string();

    let root = convert_part(&parsed, 0, 0).ok_or_else(|| {
        MboxError::MimeError(format!("message {index} has no root part"))
    })?;

    Ok(MailMessage {
        index,
        from,
        to,
        root,
    })
}

/// Convert the part with id `part_id` of `message` (and everything below it).
fn convert_part(message: &Message<'_>, part_id: usize, depth: usize) -> Option<Part> {
    if depth > MAX_DEPTH {
        warn!(depth, "MIME nesting too deep, ignoring remaining parts");
        return None;
    }
    let part = message.part(part_id)?;

    let content_type = content_type_of(part);
    let disposition = part
        .content_disposition()
        .map(|d| Disposition::parse(d.ctype()));

    match &part.body {
        PartType::Multipart(ids) => Some(Part::Multipart {
            content_type,
            disposition,
            children: ids
                .iter()
                .filter_map(|id| convert_part(message, *id, depth + 1))
                .collect(),
        }),
        // An embedded message is a container whose only child is its root
        PartType::Message(nested) => Some(Part::Multipart {
            content_type,
            disposition,
            children: convert_part(nested, 0, depth + 1).into_iter().collect(),
        }),
        _ => {
            let headers = part_headers(message, part);
            let filename = header::raw_filename(&headers)
                .or_else(|| part.attachment_name().map(|n| n.trim().to_string()));
            Some(Part::Leaf {
                content_type,
                disposition,
                filename,
                payload: leaf_payload(message, part),
            })
        }
    }
}

/// Decoded payload of a leaf part.
///
/// Text parts are taken from the raw body with only the transfer encoding
/// undone, so they keep their declared charset byte for byte.
fn leaf_payload(message: &Message<'_>, part: &MessagePart<'_>) -> Vec<u8> {
    match &part.body {
        PartType::Text(_) | PartType::Html(_) => {
            let raw = message
                .raw_message
                .get(part.raw_body_offset()..part.raw_end_offset())
                .unwrap_or_default();
            decode_transfer_encoding(part.encoding, raw)
        }
        _ => part.contents().to_vec(),
    }
}

/// Undo base64 / quoted-printable. Undecodable input is returned as is.
fn decode_transfer_encoding(encoding: Encoding, raw: &[u8]) -> Vec<u8> {
    let mut stream = MessageStream::new(raw);
    let (end, bytes) = match encoding {
        Encoding::None => return raw.to_vec(),
        Encoding::Base64 => stream.decode_base64_mime(b""),
        Encoding::QuotedPrintable => stream.decode_quoted_printable_mime(b""),
    };
    if end == usize::MAX {
        raw.to_vec()
    } else {
        bytes.into_owned()
    }
}

/// Lower-case `type/subtype`, defaulting like RFC 2045 says.
fn content_type_of(part: &MessagePart<'_>) -> String {
    match part.content_type() {
        Some(ct) => {
            let main = ct.ctype().to_ascii_lowercase();
            match ct.subtype() {
                Some(sub) => format!("{main}/{}", sub.to_ascii_lowercase()),
                // A type without a subtype is malformed
                None => "text/plain".to_string(),
            }
        }
        None if matches!(part.body, PartType::Message(_)) => "message/rfc822".to_string(),
        None => "text/plain".to_string(),
    }
}

/// Unfolded raw headers of one part, taken from the message's own bytes.
fn part_headers(message: &Message<'_>, part: &MessagePart<'_>) -> Vec<(String, String)> {
    message
        .raw_message
        .get(part.raw_header_offset()..part.raw_body_offset())
        .map(|raw| header::unfold_headers(&header::decode_header_bytes(raw)))
        .unwrap_or_default()
}

/// Skip the `From ` separator line at the start of MBOX messages.
fn skip_from_line(data: &[u8]) -> &[u8] {
    // Handle BOM
    let data = if data.starts_with(&[0xEF, 0xBB, 0xBF]) {
        &data[3..]
    } else {
        data
    };

    if data.starts_with(b"From ") {
        // Find end of line
        if let Some(pos) = data.iter().position(|&b| b == b'\n') {
            return &data[pos + 1..];
        }
    }
    data
}
