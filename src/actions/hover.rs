//! `textDocument/hover`: tooltip text for a cursor position.

use lsp_types::{Hover, HoverContents, MarkedString, Position};

use crate::document::Document;
use crate::lsp_data::ls_util;
use crate::prover::Prover;

/// Reports whatever this crate knows about the unit covering `position`:
/// the diagnostics attached to it, if any, or a note that the unit checked
/// cleanly. Served even on a partially-checked document (`postpone=false`),
/// so a position past the current check frontier yields `None`.
pub fn handle<P: Prover>(doc: &Document<P>, position: Position) -> Option<Hover> {
    let offset = ls_util::position_to_offset(&doc.raw_text, position);
    let node = doc.nodes.iter().find(|n| {
        let (start, end) = ls_util::range_to_byte_span(&doc.raw_text, &n.range);
        start <= offset && offset <= end
    })?;

    let text = if node.diagnostics.is_empty() {
        "checked, no diagnostics".to_owned()
    } else {
        node.diagnostics.iter().map(|d| d.message.as_str()).collect::<Vec<_>>().join("\n")
    };

    Some(Hover {
        contents: HoverContents::Scalar(MarkedString::from_markdown(text)),
        range: Some(node.range),
    })
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

    fn workspace() -> Arc<Workspace> {
        Arc::new(Workspace::guess(Path::new("/proj"), &[]))
    }

    #[test]
    fn hover_reports_diagnostics_on_the_covering_node() {
        let prover = ReferenceProver::new();
        let mut mgr: DocumentManager<ReferenceProver> = DocumentManager::new();
        let uri = Url::from_file_path("/proj/a.v").unwrap();
        mgr.create(uri.clone(), 1, "exact (fail I).".to_owned(), workspace(), 0);
        mgr.step(&uri, &prover);

        let doc = mgr.get(&uri).unwrap();
        let hover = handle(doc, Position::new(0, 0)).expect("a checked node covers position 0");
        match hover.contents {
            HoverContents::Scalar(MarkedString::String(s)) => assert!(s.contains("fail")),
            other => panic!("expected a scalar markdown string, got {:?}", other),
        }
    }

    #[test]
    fn hover_past_the_check_frontier_is_none() {
        let mut mgr: DocumentManager<ReferenceProver> = DocumentManager::new();
        let uri = Url::from_file_path("/proj/a.v").unwrap();
        mgr.create(uri.clone(), 1, "foo. bar.".to_owned(), workspace(), 0);

        let doc = mgr.get(&uri).unwrap();
        assert!(handle(doc, Position::new(0, 6)).is_none());
    }
}
