//! Core data model types: messages and their MIME part trees.

pub mod message;
pub mod part;
