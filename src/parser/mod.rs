//! Email parsing: MBOX streaming scanner, header utilities, and MIME tree conversion.

pub mod header;
pub mod mbox;
pub mod mime;
