//! `mboxattach`: extract attachments and inline images from MBOX archives.
//!
//! The archive is scanned once for message boundaries; each message is then
//! parsed into a part tree, its parts classified, and the ones worth keeping
//! written to disk under collision-free names prefixed with the message index.

pub mod config;
pub mod error;
pub mod export;
pub mod model;
pub mod parser;
pub mod store;
