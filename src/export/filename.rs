//! Filename sanitizing and extension handling for extracted files.

/// Extensions longer than this (dot included) are treated as no extension.
pub const MAX_EXTENSION_LEN: usize = 20;

/// Make an arbitrary decoded name safe to use as a single path segment.
///
/// Runs of tab, CR, LF, VT and FF collapse into one space; each of
/// `/ \ ? % * : | " < >` and NUL becomes `_`. Nothing else changes:
/// no trimming, no case folding, no length limit.
pub fn sanitize_filename(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    let mut in_whitespace_run = false;

    for c in name.chars() {
        if matches!(c, '\t' | '\r' | '\n' | '\u{0b}' | '\u{0c}') {
            if !in_whitespace_run {
                result.push(' ');
                in_whitespace_run = true;
            }
            continue;
        }
        in_whitespace_run = false;

        if matches!(
            c,
            '/' | '\\' | '?' | '%' | '*' | ':' | '|' | '"' | '<' | '>' | '\0'
        ) {
            result.push('_');
        } else {
            result.push(c);
        }
    }

    result
}

/// Extension of `name` including the leading dot, or `""`.
///
/// The extension starts at the last `.`; a dot in first or last position
/// does not count. Anything longer than [`MAX_EXTENSION_LEN`] characters is
/// not an extension.
pub fn file_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(pos) if pos > 0 && pos < name.len() - 1 => {
            let ext = &name[pos..];
            if ext.chars().count() <= MAX_EXTENSION_LEN {
                ext
            } else {
                ""
            }
        }
        _ => "",
    }
}

/// Extension guessed from a MIME type, dot included (`"application/pdf"` → `".pdf"`).
pub fn guess_extension(content_type: &str) -> Option<String> {
    mime_guess::get_mime_extensions_str(content_type)
        .and_then(|exts| exts.first())
        .map(|ext| format!(".{ext}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitespace_runs_collapse() {
        assert_eq!(sanitize_filename("a\t\r\nb"), "a b");
        assert_eq!(sanitize_filename("a\u{0b}b\u{0c}\u{0c}c"), "a b c");
        // Plain spaces are left alone
        assert_eq!(sanitize_filename("a  b"), "a  b");
    }

    #[test]
    fn test_forbidden_characters_replaced_individually() {
        assert_eq!(sanitize_filename("a/b\\c?d%e*f:g|h\"i<j>k\0l"), "a_b_c_d_e_f_g_h_i_j_k_l");
        assert_eq!(sanitize_filename("//"), "__");
    }

    #[test]
    fn test_no_other_changes() {
        assert_eq!(sanitize_filename("  Café Report.PDF "), "  Café Report.PDF ");
        assert_eq!(sanitize_filename(""), "");
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let samples = [
            "re: \"quarterly\" <draft>?.pdf",
            "tab\there\nnew\r\nline",
            "100% *done* | a/b\\c",
            "\u{0b}\u{0c}\t\0",
        ];
        for sample in samples {
            let once = sanitize_filename(sample);
            assert_eq!(sanitize_filename(&once), once, "sample: {sample:?}");
        }
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension("5 report.pdf"), ".pdf");
        assert_eq!(file_extension("archive.tar.gz"), ".gz");
        assert_eq!(file_extension("noext"), "");
        assert_eq!(file_extension(".bashrc"), "");
        assert_eq!(file_extension("trailing."), "");
    }

    #[test]
    fn test_long_extension_dropped() {
        assert_eq!(file_extension("x.abcdefghijklmnopqrs"), ".abcdefghijklmnopqrs"); // 20
        assert_eq!(file_extension("x.abcdefghijklmnopqrst"), ""); // 21
        assert_eq!(file_extension("Re. a long subject line without extension"), "");
    }

    #[test]
    fn test_guess_extension() {
        assert_eq!(guess_extension("application/pdf").as_deref(), Some(".pdf"));
        assert_eq!(guess_extension("application/x-no-such-type"), None);
    }
}
