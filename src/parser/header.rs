//! RFC 5322 header handling: folding, parameters (RFC 2045 / RFC 2231),
//! and encoded-word fragments (RFC 2047).

use std::borrow::Cow;

use base64::engine::general_purpose::GeneralPurpose;
use base64::engine::{DecodePaddingMode, GeneralPurposeConfig};
use base64::Engine as _;
use tracing::debug;

use crate::error::{MboxError, Result};

/// Base64 engine for encoded words: padding is optional, as senders often drop it.
const ENCODED_WORD_BASE64: GeneralPurpose = GeneralPurpose::new(
    &base64::alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decode raw header bytes to a string.
///
/// Tries UTF-8 first, then falls back to Windows-1252 (which accepts every byte).
pub fn decode_header_bytes(bytes: &[u8]) -> String {
    // Strip BOM if present
    let bytes = if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        &bytes[3..]
    } else {
        bytes
    };

    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

/// Unfold headers: join continuation lines (starting with space or tab) with the previous header.
///
/// Returns a list of `(lowercase_name, raw_value)` pairs.
pub fn unfold_headers(text: &str) -> Vec<(String, String)> {
    let mut result: Vec<(String, String)> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if result.is_empty() {
                continue;
            }
            // End of the header block
            break;
        }
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(last) = result.last_mut() {
                last.1.push(' ');
                last.1.push_str(line.trim());
            }
        } else if let Some(colon_pos) = line.find(':') {
            let name = line[..colon_pos].trim().to_lowercase();
            let value = line[colon_pos + 1..].trim().to_string();
            result.push((name, value));
        }
        // Lines without a colon and not a continuation (boundary markers,
        // garbage) are silently skipped
    }

    result
}

/// Get the first value for a header name (`name` must be lower-case).
pub fn get_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

/// Raw attachment filename of a part, before any RFC 2047 decoding.
///
/// Looks at `Content-Disposition: …; filename=` first and falls back to
/// `Content-Type: …; name=`. RFC 2231 parameters are already collapsed to text
/// here; surrounding whitespace is trimmed.
pub fn raw_filename(headers: &[(String, String)]) -> Option<String> {
    get_header(headers, "content-disposition")
        .and_then(|v| header_param(v, "filename"))
        .or_else(|| get_header(headers, "content-type").and_then(|v| header_param(v, "name")))
        .map(|name| name.trim().to_string())
}

/// Look up a parameter in a structured header value such as
/// `attachment; filename="a.pdf"`.
///
/// Handles quoted strings, RFC 2231 extended values (`name*=utf-8''%E2%82%AC`)
/// and continuations (`name*0=…; name*1*=…`). A plain `name=` wins over an
/// extended form when both are present.
pub fn header_param(value: &str, name: &str) -> Option<String> {
    let name = name.to_ascii_lowercase();
    let mut segments: Vec<(u32, bool, String)> = Vec::new();
    let mut extended_single: Option<String> = None;

    // The first item is the main value (e.g. "attachment"), never a parameter
    for item in split_params(value).into_iter().skip(1) {
        let Some((key, raw)) = item.split_once('=') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let raw = raw.trim();

        if key == name {
            return Some(unquote(raw));
        }

        let Some(rest) = key.strip_prefix(name.as_str()).and_then(|r| r.strip_prefix('*')) else {
            continue;
        };
        if rest.is_empty() {
            extended_single = Some(unquote(raw));
            continue;
        }
        let (number, encoded) = match rest.strip_suffix('*') {
            Some(n) => (n, true),
            None => (rest, false),
        };
        if let Ok(n) = number.parse::<u32>() {
            segments.push((n, encoded, unquote(raw)));
        }
    }

    if let Some(ext) = extended_single {
        return Some(decode_rfc2231(&ext));
    }

    if segments.is_empty() {
        return None;
    }
    segments.sort_by_key(|(n, _, _)| *n);

    // The charset annotation lives only in the first encoded segment
    let mut charset: Option<String> = None;
    let mut bytes: Vec<u8> = Vec::new();
    for (n, encoded, text) in &segments {
        if *encoded {
            let payload = if *n == 0 {
                let mut pieces = text.splitn(3, '\'');
                match (pieces.next(), pieces.next(), pieces.next()) {
                    (Some(cs), Some(_lang), Some(rest)) => {
                        charset = Some(cs.to_string());
                        rest
                    }
                    _ => text.as_str(),
                }
            } else {
                text.as_str()
            };
            bytes.extend_from_slice(&urlencoding::decode_binary(payload.as_bytes()));
        } else {
            bytes.extend_from_slice(text.as_bytes());
        }
    }

    Some(decode_charset_lossy(charset.as_deref().unwrap_or(""), &bytes))
}

/// Decode a single RFC 2231 extended value `charset'language'percent-encoded`.
fn decode_rfc2231(value: &str) -> String {
    let mut pieces = value.splitn(3, '\'');
    let (charset, encoded) = match (pieces.next(), pieces.next(), pieces.next()) {
        (Some(cs), Some(_lang), Some(rest)) => (cs, rest),
        _ => ("", value),
    };
    let bytes = urlencoding::decode_binary(encoded.as_bytes());
    decode_charset_lossy(charset, &bytes)
}

/// Split a header value on `;`, ignoring separators inside quoted strings.
fn split_params(value: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for ch in value.chars() {
        if escaped {
            current.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_quotes => {
                current.push(ch);
                escaped = true;
            }
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            ';' if !in_quotes => {
                items.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    items.push(current);
    items
}

/// Remove surrounding double quotes and resolve backslash escapes.
fn unquote(raw: &str) -> String {
    let raw = raw.trim();
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        let inner = &raw[1..raw.len() - 1];
        let mut out = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            } else {
                out.push(c);
            }
        }
        out
    } else {
        raw.to_string()
    }
}

/// One piece of a decoded header, as produced by [`decode_fragments`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderFragment {
    /// The header contained no encoded words at all.
    Text(String),
    /// Raw bytes, with the charset declared by the encoded word they came from.
    /// Unencoded text that sits next to encoded words has no charset.
    Bytes {
        bytes: Vec<u8>,
        charset: Option<String>,
    },
}

/// Split a header value into RFC 2047 fragments.
///
/// - No encoded words → a single [`HeaderFragment::Text`].
/// - Otherwise every piece becomes bytes. Whitespace between two encoded
///   words is dropped, and adjacent pieces sharing a charset are merged.
///
/// Fails only on malformed base64 inside an encoded word.
pub fn decode_fragments(input: &str) -> Result<Vec<HeaderFragment>> {
    let words = scan_encoded_words(input);
    if !words.iter().any(|w| matches!(w, Word::Encoded { .. })) {
        return Ok(vec![HeaderFragment::Text(input.to_string())]);
    }

    // Drop whitespace-only gaps between two encoded words (RFC 2047 §6.2)
    let mut kept: Vec<&Word<'_>> = Vec::with_capacity(words.len());
    for (i, word) in words.iter().enumerate() {
        let is_gap = matches!(word, Word::Plain(text) if text.trim().is_empty())
            && i > 0
            && matches!(words[i - 1], Word::Encoded { .. })
            && matches!(words.get(i + 1), Some(Word::Encoded { .. }));
        if !is_gap {
            kept.push(word);
        }
    }

    let mut fragments: Vec<HeaderFragment> = Vec::new();
    for word in kept {
        let (bytes, charset) = match word {
            Word::Plain(text) => (text.as_bytes().to_vec(), None),
            Word::Encoded {
                charset,
                encoding,
                text,
            } => (decode_word(*encoding, text)?, Some(charset.to_lowercase())),
        };

        let same_charset = matches!(
            fragments.last(),
            Some(HeaderFragment::Bytes { charset: last, .. }) if *last == charset
        );
        match fragments.last_mut() {
            Some(HeaderFragment::Bytes { bytes: last, .. }) if same_charset => {
                // Unencoded runs are rejoined with a space, encoded ones back to back
                if charset.is_none() {
                    last.push(b' ');
                }
                last.extend_from_slice(&bytes);
            }
            _ => fragments.push(HeaderFragment::Bytes { bytes, charset }),
        }
    }

    Ok(fragments)
}

/// Tokens of a header value: plain text or a complete `=?charset?enc?text?=` word.
#[derive(Debug)]
enum Word<'a> {
    Plain(&'a str),
    Encoded {
        charset: &'a str,
        encoding: char,
        text: &'a str,
    },
}

fn scan_encoded_words(input: &str) -> Vec<Word<'_>> {
    let mut words = Vec::new();
    let mut plain_start = 0;
    let mut search_from = 0;

    while let Some(found) = input[search_from..].find("=?") {
        let start = search_from + found;
        match parse_encoded_word(&input[start + 2..]) {
            Some((charset, encoding, text, consumed)) => {
                push_plain(&mut words, input, plain_start, start);
                words.push(Word::Encoded {
                    charset,
                    encoding,
                    text,
                });
                plain_start = start + 2 + consumed;
                search_from = plain_start;
            }
            // Not an encoded word: "=?" stays part of the plain text
            None => search_from = start + 2,
        }
    }
    push_plain(&mut words, input, plain_start, input.len());

    words
}

/// Push `input[start..end]` as plain text; leading whitespace of the header is dropped.
fn push_plain<'a>(words: &mut Vec<Word<'a>>, input: &'a str, start: usize, end: usize) {
    let mut text = &input[start..end];
    if start == 0 {
        text = text.trim_start();
    }
    if !text.is_empty() {
        words.push(Word::Plain(text));
    }
}

/// Parse `charset?B|Q?text?=` (the part after the leading `=?`).
///
/// Returns `(charset, encoding, text, bytes consumed)`.
fn parse_encoded_word(s: &str) -> Option<(&str, char, &str, usize)> {
    let first_q = s.find('?')?;
    let charset = &s[..first_q];
    if charset.is_empty() || charset.contains(char::is_whitespace) {
        return None;
    }

    let rest = &s[first_q + 1..];
    let mut enc_chars = rest.chars();
    let encoding = enc_chars.next()?.to_ascii_uppercase();
    if !matches!(encoding, 'B' | 'Q') || enc_chars.next()? != '?' {
        return None;
    }

    let rest2 = &rest[2..];
    let end = rest2.find("?=")?;
    let text = &rest2[..end];

    // RFC 2231 §5 allows a language suffix: "utf-8*en"
    let charset = charset.split('*').next().unwrap_or(charset);

    Some((charset, encoding, text, first_q + 1 + 2 + end + 2))
}

fn decode_word(encoding: char, text: &str) -> Result<Vec<u8>> {
    match encoding {
        'B' => {
            let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
            ENCODED_WORD_BASE64
                .decode(compact.trim_end_matches('='))
                .map_err(|e| MboxError::MimeError(format!("base64 encoded word: {e}")))
        }
        _ => Ok(decode_q_encoding(text)),
    }
}

/// Decode Q-encoding (RFC 2047): underscores → spaces, `=XX` → byte.
fn decode_q_encoding(input: &str) -> Vec<u8> {
    let mut result = Vec::with_capacity(input.len());
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => {
                result.push(b' ');
                i += 1;
            }
            b'=' => {
                let hex = bytes.get(i + 1..i + 3).and_then(|h| std::str::from_utf8(h).ok());
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(byte) => {
                        result.push(byte);
                        i += 3;
                    }
                    None => {
                        result.push(b'=');
                        i += 1;
                    }
                }
            }
            b => {
                result.push(b);
                i += 1;
            }
        }
    }
    result
}

/// Decode bytes with a named charset, failing on unknown labels or invalid bytes.
pub fn decode_charset_strict(charset: &str, bytes: &[u8]) -> Result<String> {
    let encoding = encoding_rs::Encoding::for_label(charset.trim().as_bytes())
        .ok_or_else(|| MboxError::UnsupportedEncoding(charset.to_string()))?;
    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(Cow::into_owned)
        .ok_or_else(|| {
            MboxError::UnsupportedEncoding(format!(
                "bytes are not valid {}",
                encoding.name()
            ))
        })
}

/// Decode bytes with a named charset, replacing anything undecodable.
///
/// An empty or unknown charset is treated as UTF-8.
fn decode_charset_lossy(charset: &str, bytes: &[u8]) -> String {
    match encoding_rs::Encoding::for_label(charset.trim().as_bytes()) {
        Some(encoding) => {
            let (decoded, _) = encoding.decode_without_bom_handling(bytes);
            decoded.into_owned()
        }
        None => {
            if !charset.is_empty() {
                debug!(charset = charset, "Unknown charset, falling back to UTF-8 lossy");
            }
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(b: &[u8], charset: Option<&str>) -> HeaderFragment {
        HeaderFragment::Bytes {
            bytes: b.to_vec(),
            charset: charset.map(String::from),
        }
    }

    #[test]
    fn test_unfold_headers() {
        let text = "Content-Disposition: attachment;\n\tfilename=\"a.pdf\"\nContent-Type: application/pdf\n\nbody: not a header\n";
        let headers = unfold_headers(text);
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[0].0, "content-disposition");
        assert_eq!(headers[0].1, "attachment; filename=\"a.pdf\"");
    }

    #[test]
    fn test_header_param_quoted_and_bare() {
        assert_eq!(
            header_param("attachment; filename=\"my; file.pdf\"", "filename").as_deref(),
            Some("my; file.pdf")
        );
        assert_eq!(
            header_param("application/pdf; NAME=plain.pdf", "name").as_deref(),
            Some("plain.pdf")
        );
        assert_eq!(header_param("inline", "filename"), None);
    }

    #[test]
    fn test_header_param_escaped_quote() {
        assert_eq!(
            header_param(r#"attachment; filename="say \"hi\".txt""#, "filename").as_deref(),
            Some("say \"hi\".txt")
        );
    }

    #[test]
    fn test_header_param_rfc2231() {
        assert_eq!(
            header_param("attachment; filename*=UTF-8''%E2%82%AC%20rates.pdf", "filename")
                .as_deref(),
            Some("€ rates.pdf")
        );
    }

    #[test]
    fn test_header_param_rfc2231_continuations() {
        let value = "attachment; filename*0*=ISO-8859-1''R%E9sum; filename*1=\"e.doc\"";
        assert_eq!(header_param(value, "filename").as_deref(), Some("Résume.doc"));
    }

    #[test]
    fn test_plain_param_wins_over_extended() {
        let value = "attachment; filename*=UTF-8''ext.pdf; filename=\"plain.pdf\"";
        assert_eq!(header_param(value, "filename").as_deref(), Some("plain.pdf"));
    }

    #[test]
    fn test_raw_filename_falls_back_to_content_type_name() {
        let headers = unfold_headers(
            "Content-Type: application/pdf; name=\"=?UTF-8?B?w6kucGRm?=\"\nContent-Disposition: inline\n",
        );
        assert_eq!(raw_filename(&headers).as_deref(), Some("=?UTF-8?B?w6kucGRm?="));
    }

    #[test]
    fn test_fragments_plain_text() {
        assert_eq!(
            decode_fragments("report.pdf").unwrap(),
            vec![HeaderFragment::Text("report.pdf".into())]
        );
    }

    #[test]
    fn test_fragments_base64_utf8() {
        assert_eq!(
            decode_fragments("=?UTF-8?B?SG9sYSBtdW5kbw==?=").unwrap(),
            vec![bytes(b"Hola mundo", Some("utf-8"))]
        );
    }

    #[test]
    fn test_fragments_merge_same_charset() {
        assert_eq!(
            decode_fragments("=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?=").unwrap(),
            vec![bytes(b"Hola mundo", Some("utf-8"))]
        );
    }

    #[test]
    fn test_fragments_q_with_trailing_plain() {
        assert_eq!(
            decode_fragments("=?ISO-8859-1?Q?caf=E9_menu?=.pdf").unwrap(),
            vec![bytes(b"caf\xe9 menu", Some("iso-8859-1")), bytes(b".pdf", None)]
        );
    }

    #[test]
    fn test_fragments_leading_plain_has_no_charset() {
        let fragments = decode_fragments("Re: =?UTF-8?Q?x?=").unwrap();
        assert_eq!(fragments[0], bytes(b"Re: ", None));
        assert_eq!(fragments[1], bytes(b"x", Some("utf-8")));
    }

    #[test]
    fn test_fragments_unpadded_base64() {
        assert_eq!(
            decode_fragments("=?utf-8?b?w6k?=").unwrap(),
            vec![bytes("é".as_bytes(), Some("utf-8"))]
        );
    }

    #[test]
    fn test_fragments_malformed_base64_is_error() {
        assert!(decode_fragments("=?utf-8?B?@@@@?=").is_err());
    }

    #[test]
    fn test_fragments_lone_marker_is_text() {
        assert_eq!(
            decode_fragments("odd =? name").unwrap(),
            vec![HeaderFragment::Text("odd =? name".into())]
        );
    }

    #[test]
    fn test_decode_charset_strict() {
        assert_eq!(decode_charset_strict("Windows-1252", b"M\xfcller").unwrap(), "Müller");
        assert!(decode_charset_strict("utf-8", b"\xff\xfe").is_err());
        assert!(decode_charset_strict("x-no-such-charset", b"abc").is_err());
    }

    #[test]
    fn test_decode_charset_lossy() {
        assert_eq!(decode_charset_lossy("iso-8859-1", b"caf\xe9"), "café");
        assert_eq!(decode_charset_lossy(" KOI8-R ", b"\xf0\xd2\xc9"), "При");
        assert_eq!(decode_charset_lossy("x-nope", b"a\xffb"), "a\u{fffd}b");
        assert_eq!(decode_charset_lossy("", b"plain"), "plain");
    }

    #[test]
    fn test_decode_header_bytes_latin1_fallback() {
        assert_eq!(decode_header_bytes(b"caf\xe9"), "café");
        assert_eq!(decode_header_bytes("ok".as_bytes()), "ok");
    }
}
