#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    clippy::unused_self,
    clippy::useless_let_if_seq,
    missing_debug_implementations,
    rust_2018_idioms,
    rust_2024_compatibility
)]

//! # Folio-Instrument
//! Security identifiers and the process-wide [`SecurityDirectory`] for the
//! Folio backtesting engine.
//!
//! A [`Security`] is identified by a stable composite FIGI plus a human
//! ticker; equality and hashing use the composite FIGI only. The directory is
//! lazily populated, entries are immutable once entered and are never evicted.

/// Process-wide security directory.
pub mod directory;

/// The [`Security`] identifier type.
pub mod security;

pub use directory::{SecurityDirectory, directory};
pub use security::Security;
