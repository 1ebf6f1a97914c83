//! The meow Language Server.
//!
//! This server runs in the background, incrementally checking open documents
//! against the meow proof assistant and reporting diagnostics, hover info,
//! goal state, and the usual complement of LSP navigation requests back to
//! the client. The interesting part of this crate is not any individual
//! request handler but the coordinator that interleaves a single,
//! non-reentrant prover worker with a concurrent stream of LSP messages.

#![warn(rust_2018_idioms)]

pub mod actions;
pub mod concurrency;
pub mod config;
pub mod document;
pub mod error;
pub mod lsp_data;
pub mod prover;
pub mod request_table;
pub mod server;
pub mod workspace;

pub use error::{CoordinatorError, ErrorKind};

/// Returns the crate's version, for `serverInfo` and `--version`.
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_owned()
}
