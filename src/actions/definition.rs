//! `textDocument/definition`: navigation to a symbol's definition.
//!
//! `ReferenceProver` models no symbol table, so there is nothing to resolve
//! a cross-reference against; the honest answer is "no definition found",
//! uniformly, rather than fabricating a location. A real prover capability
//! able to answer this would extend `Prover` with a lookup operation.

use lsp_types::{Location, Position};

use crate::document::Document;
use crate::prover::Prover;

pub fn handle<P: Prover>(_doc: &Document<P>, _position: Position) -> Vec<Location> {
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentManager;
    use crate::prover::ReferenceProver;
    use crate::workspace::Workspace;
    use std::path::Path;
    use std::sync::Arc;
    use url::Url;

    #[test]
    fn definition_is_always_empty_without_a_symbol_table() {
        let mut mgr: DocumentManager<ReferenceProver> = DocumentManager::new();
        let uri = Url::from_file_path("/proj/a.v").unwrap();
        mgr.create(uri.clone(), 1, "foo.".to_owned(), Arc::new(Workspace::guess(Path::new("/proj"), &[])), 0);

        assert!(handle(mgr.get(&uri).unwrap(), Position::new(0, 0)).is_empty());
    }
}
