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

//! HTTP control surface for the session core.
//!
//! Layout: `router` (routes + server host), `torrents`/`system`
//! (handlers), `errors` (problem-document mapping), `state` (shared
//! handles).

mod errors;
/// Router construction and server host.
pub mod router;
mod state;
mod system;
mod torrents;

pub use router::ApiServer;
pub use state::SessionHandles;
