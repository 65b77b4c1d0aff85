//! Message storage: indexed random-access reads from an MBOX archive.

pub mod reader;
