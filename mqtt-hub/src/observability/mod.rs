//! Structured logging vocabulary.
//!
//! Library code emits `tracing` events using these names and keys and never
//! installs a global subscriber; binaries and tests do that at process
//! boundaries.

pub mod events;
pub mod fields;
