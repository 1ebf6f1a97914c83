//! `textDocument/codeLens`: one lens per checked unit surfacing its
//! diagnostic count, following the teacher's `rls.run` lens pattern of
//! attaching a `Command` to a source range.

use lsp_types::{CodeLens, Command};

use crate::document::Document;
use crate::prover::Prover;

pub fn handle<P: Prover>(doc: &Document<P>) -> Vec<CodeLens> {
    doc.nodes
        .iter()
        .filter(|node| !node.diagnostics.is_empty())
        .map(|node| CodeLens {
            range: node.range,
            command: Some(Command {
                title: format!("{} diagnostic(s)", node.diagnostics.len()),
                command: "meow.showDiagnostics".to_owned(),
                arguments: None,
            }),
            data: None,
        })
        .collect()
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
    fn a_lens_is_emitted_only_for_nodes_with_diagnostics() {
        let prover = ReferenceProver::new();
        let mut mgr: DocumentManager<ReferenceProver> = DocumentManager::new();
        let uri = Url::from_file_path("/proj/a.v").unwrap();
        mgr.create(
            uri.clone(),
            1,
            "exact (fail I). exact I.".to_owned(),
            Arc::new(Workspace::guess(Path::new("/proj"), &[])),
            0,
        );
        mgr.step(&uri, &prover);
        mgr.step(&uri, &prover);

        let lenses = handle(mgr.get(&uri).unwrap());
        assert_eq!(lenses.len(), 1);
    }
}
