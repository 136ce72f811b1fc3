#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Riptide application bootstrap wiring.

/// Application bootstrap and service wiring.
pub mod bootstrap;

pub use bootstrap::{AppResult, run_app};
