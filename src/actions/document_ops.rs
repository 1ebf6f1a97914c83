//! `coq/getDocument` and `coq/saveVo`: the two custom requests that expose a
//! whole-document view rather than a single position or symbol list.

use std::fs;

use log::warn;

use crate::concurrency::Jobs;
use crate::document::Document;
use crate::error::CoordinatorError;
use crate::lsp_data::{ls_util, parse_file_path, DocumentNode, GetDocumentResult, SaveVoResult};
use crate::prover::Prover;

/// Dumps every checked node's source text and span, for tooling that wants
/// the whole document rather than one diagnostic or hover at a time.
pub fn get_document<P: Prover>(doc: &Document<P>) -> GetDocumentResult {
    let nodes = doc
        .nodes
        .iter()
        .map(|node| {
            let (start, end) = ls_util::range_to_byte_span(&doc.raw_text, &node.range);
            DocumentNode { range: node.range, text: doc.raw_text[start..end].to_owned() }
        })
        .collect();
    GetDocumentResult { nodes }
}

/// Writes a stand-in compiled-object file for `doc` as a background job
/// (§5): the write itself must not block the worker from draining the
/// message queue, so only the job's thread touches the filesystem.
pub fn save_vo<P: Prover>(doc: &Document<P>, jobs: &mut Jobs) -> Result<SaveVoResult, CoordinatorError> {
    let mut path = parse_file_path(&doc.uri)
        .map_err(|e| CoordinatorError::internal(format!("cannot save .vo for {}: {}", doc.uri, e)))?;
    path.set_extension("vo");

    let result = SaveVoResult { path: path.display().to_string() };
    let contents = format!("meow compiled-object stub: {} checked units\n", doc.nodes.len());
    let write_path = path.clone();
    jobs.spawn(move |_token| {
        if let Err(e) = fs::write(&write_path, contents) {
            warn!("failed to write {}: {}", write_path.display(), e);
        }
    });

    Ok(result)
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
    fn get_document_reports_each_checked_units_text() {
        let prover = ReferenceProver::new();
        let mut mgr: DocumentManager<ReferenceProver> = DocumentManager::new();
        let uri = Url::from_file_path("/proj/a.v").unwrap();
        mgr.create(uri.clone(), 1, "foo. bar.".to_owned(), Arc::new(Workspace::guess(Path::new("/proj"), &[])), 0);
        mgr.step(&uri, &prover);
        mgr.step(&uri, &prover);

        let result = get_document(mgr.get(&uri).unwrap());
        assert_eq!(result.nodes.len(), 2);
        assert_eq!(result.nodes[0].text, "foo.");
    }

    #[test]
    fn save_vo_targets_a_dot_vo_sibling_of_the_source_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.v");
        std::fs::write(&source, "foo.").unwrap();
        let uri = Url::from_file_path(&source).unwrap();

        let mut mgr: DocumentManager<ReferenceProver> = DocumentManager::new();
        mgr.create(uri.clone(), 1, "foo.".to_owned(), Arc::new(Workspace::guess(dir.path(), &[])), 0);

        let mut jobs = Jobs::default();
        let result = save_vo(mgr.get(&uri).unwrap(), &mut jobs).unwrap();
        jobs.wait_for_all();

        assert_eq!(result.path, dir.path().join("a.vo").display().to_string());
        assert!(dir.path().join("a.vo").exists());
    }
}
