//! Shared utility modules used across Tessera components.

pub mod packed;
pub mod varint;
