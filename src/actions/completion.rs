//! `textDocument/completion`: completion candidates at a cursor position.
//!
//! `ReferenceProver` has no notion of identifiers or scopes to complete
//! against, so this always answers with an empty list rather than
//! fabricating candidates; a real prover capability would need to expose a
//! completion source for this to do anything useful.

use lsp_types::{CompletionItem, Position};

use crate::document::Document;
use crate::prover::Prover;

pub fn handle<P: Prover>(_doc: &Document<P>, _position: Position) -> Vec<CompletionItem> {
    Vec::new()
}
