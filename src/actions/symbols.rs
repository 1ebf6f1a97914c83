//! `textDocument/documentSymbol`: one symbol per checked top-level unit.

use lsp_types::{Location, SymbolInformation, SymbolKind};

use crate::document::Document;
use crate::prover::Prover;

#[allow(deprecated)] // `SymbolInformation::deprecated` has no replacement yet in lsp_types
pub fn handle<P: Prover>(doc: &Document<P>) -> Vec<SymbolInformation> {
    doc.nodes
        .iter()
        .enumerate()
        .map(|(i, node)| SymbolInformation {
            name: format!("unit {}", i),
            kind: SymbolKind::Object,
            location: Location { uri: doc.uri.clone(), range: node.range },
            container_name: None,
            deprecated: None,
        })
        .collect()
}
