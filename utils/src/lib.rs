//! Shared infrastructure utilities for wicket.
//!
//! This crate provides cross-cutting utilities that multiple wicket crates need
//! but that don't belong in the domain-pure `wicket-types` crate:
//!
//! - **`atomic_write`**: Crash-safe file persistence (temp + rename)
//! - **`redact`**: Token redaction for log fields and display

pub mod atomic_write;
pub mod redact;

pub use atomic_write::{PersistMode, atomic_write, atomic_write_with_mode, recover_bak_file};
pub use redact::redact_token;
