//! MIME part tree.
//!
//! A part is either a container (multipart, or an embedded `message/rfc822`)
//! holding children, or a leaf holding a decoded payload. Never both.

/// Declared `Content-Disposition` of a part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Attachment,
    Inline,
    /// Any other disposition token (e.g. `form-data`), lower-cased.
    Other(String),
}

impl Disposition {
    /// Parse a disposition token. Case-insensitive, surrounding whitespace ignored.
    pub fn parse(token: &str) -> Self {
        let token = token.trim().to_ascii_lowercase();
        match token.as_str() {
            "attachment" => Self::Attachment,
            "inline" => Self::Inline,
            _ => Self::Other(token),
        }
    }
}

/// One node of a message's content tree.
#[derive(Debug, Clone)]
pub enum Part {
    /// Container node. Never written to disk itself.
    Multipart {
        /// Lower-case `type/subtype`.
        content_type: String,
        disposition: Option<Disposition>,
        children: Vec<Part>,
    },
    /// Leaf node carrying a transfer-decoded payload.
    Leaf {
        /// Lower-case `type/subtype`.
        content_type: String,
        disposition: Option<Disposition>,
        /// Raw filename header value (possibly RFC 2047 encoded), if any.
        filename: Option<String>,
        payload: Vec<u8>,
    },
}

impl Part {
    /// Lower-case `type/subtype` of this node.
    pub fn content_type(&self) -> &str {
        match self {
            Self::Multipart { content_type, .. } | Self::Leaf { content_type, .. } => content_type,
        }
    }

    /// Declared disposition, if the part has one.
    pub fn disposition(&self) -> Option<&Disposition> {
        match self {
            Self::Multipart { disposition, .. } | Self::Leaf { disposition, .. } => {
                disposition.as_ref()
            }
        }
    }

    pub fn is_multipart(&self) -> bool {
        matches!(self, Self::Multipart { .. })
    }

    /// Raw filename header of a leaf. Containers never report one.
    pub fn filename(&self) -> Option<&str> {
        match self {
            Self::Leaf { filename, .. } => filename.as_deref(),
            Self::Multipart { .. } => None,
        }
    }

    /// Payload bytes of a leaf; empty for containers.
    pub fn payload(&self) -> &[u8] {
        match self {
            Self::Leaf { payload, .. } => payload,
            Self::Multipart { .. } => &[],
        }
    }

    /// Build a leaf with no disposition and no filename.
    pub fn leaf(content_type: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self::Leaf {
            content_type: content_type.into(),
            disposition: None,
            filename: None,
            payload: payload.into(),
        }
    }

    /// Set the disposition (builder style).
    pub fn with_disposition(mut self, value: Disposition) -> Self {
        match &mut self {
            Self::Multipart { disposition, .. } | Self::Leaf { disposition, .. } => {
                *disposition = Some(value);
            }
        }
        self
    }

    /// Set the raw filename header of a leaf (builder style). No effect on containers.
    pub fn with_filename(mut self, value: impl Into<String>) -> Self {
        if let Self::Leaf { filename, .. } = &mut self {
            *filename = Some(value.into());
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disposition_parse() {
        assert_eq!(Disposition::parse("attachment"), Disposition::Attachment);
        assert_eq!(Disposition::parse(" INLINE "), Disposition::Inline);
        assert_eq!(
            Disposition::parse("Form-Data"),
            Disposition::Other("form-data".into())
        );
    }

    #[test]
    fn test_container_has_no_filename_or_payload() {
        let part = Part::Multipart {
            content_type: "multipart/mixed".into(),
            disposition: Some(Disposition::Attachment),
            children: vec![Part::leaf("text/plain", b"hi".to_vec())],
        }
        .with_filename("ignored.txt");
        assert!(part.is_multipart());
        assert_eq!(part.filename(), None);
        assert!(part.payload().is_empty());
        assert_eq!(part.disposition(), Some(&Disposition::Attachment));
    }

    #[test]
    fn test_leaf_builders() {
        let part = Part::leaf("application/pdf", b"%PDF".to_vec())
            .with_disposition(Disposition::Inline)
            .with_filename("a.pdf");
        assert_eq!(part.content_type(), "application/pdf");
        assert_eq!(part.filename(), Some("a.pdf"));
        assert_eq!(part.payload(), b"%PDF");
        assert_eq!(part.disposition(), Some(&Disposition::Inline));
    }
}
