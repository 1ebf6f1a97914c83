//! The Document Manager (§4.D): per-URI document state and the resumable
//! check continuation that drives each document from `Yet(0)` to `Done`.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use log::warn;
use lsp_types::Range;
use url::Url;

use crate::prover::{Diagnostic, Prover};
use crate::workspace::Workspace;

/// How far along a document's check is.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// Checked up to byte offset `.0`; more work remains.
    Yet(usize),
    /// Checking stopped at byte offset `.0` for `.1` (currently unused by
    /// any handler in this crate, but kept distinct from `Yet` per the data
    /// model so a future pause-on-error policy has somewhere to live).
    Stopped(usize, String),
    /// The whole document has been checked.
    Done,
}

impl Completion {
    pub fn is_done(&self) -> bool {
        matches!(self, Completion::Done)
    }

    fn offset(&self, text_len: usize) -> usize {
        match self {
            Completion::Yet(o) | Completion::Stopped(o, _) => *o,
            Completion::Done => text_len,
        }
    }
}

/// One checked top-level unit: its source span, the opaque AST fragment the
/// prover produced, the diagnostics it raised, and the prover state after
/// interpreting it.
#[derive(Clone)]
pub struct Node<P: Prover> {
    pub range: Range,
    pub ast: P::Ast,
    pub diagnostics: Vec<Diagnostic>,
    pub post_state: P::RootState,
}

/// The per-URI state owned by the Document Manager.
#[derive(Clone)]
pub struct Document<P: Prover> {
    pub uri: Url,
    pub version: i64,
    pub raw_text: String,
    pub workspace: Arc<Workspace>,
    pub nodes: Vec<Node<P>>,
    pub completion: Completion,
    pub diagnostics: Vec<Diagnostic>,
    /// The prover's root state to resume checking from; together with
    /// `completion`'s offset this *is* the check continuation.
    root_state: P::RootState,
    touched: u64,
}

impl<P: Prover> Document<P> {
    fn offset(&self) -> usize {
        self.completion.offset(self.raw_text.len())
    }
}

/// Outcome of one bounded slice of checking work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// One unit was checked; the document may still have more to go.
    Progressed,
    /// The Interrupt Flag was observed before any work was done this step;
    /// the continuation is unchanged.
    Suspended,
    /// The document has no more units to check; `completion` is now `Done`.
    Completed,
    /// There was nothing to step (no such document, or already `Done`).
    Idle,
}

/// Owns every open document and the logic to advance each one.
pub struct DocumentManager<P: Prover> {
    documents: HashMap<Url, Document<P>>,
    touch_counter: u64,
}

impl<P: Prover> DocumentManager<P> {
    pub fn new() -> Self {
        DocumentManager { documents: HashMap::new(), touch_counter: 0 }
    }

    fn touch(&mut self, uri: &Url) -> u64 {
        self.touch_counter += 1;
        let touched = self.touch_counter;
        if let Some(doc) = self.documents.get_mut(uri) {
            doc.touched = touched;
        }
        touched
    }

    pub fn get(&self, uri: &Url) -> Option<&Document<P>> {
        self.documents.get(uri)
    }

    /// Constructs a fresh document for `uri`. Any document already open at
    /// this URI is discarded; that's a client bug (`didOpen` without a
    /// matching `didClose`), so it's logged.
    pub fn create(
        &mut self,
        uri: Url,
        version: i64,
        text: String,
        workspace: Arc<Workspace>,
        root_state: P::RootState,
    ) {
        if self.documents.contains_key(&uri) {
            warn!("client opened {} while it was already open; replacing it", uri);
        }
        self.touch_counter += 1;
        let touched = self.touch_counter;
        self.documents.insert(
            uri.clone(),
            Document {
                uri,
                version,
                raw_text: text,
                workspace,
                nodes: Vec::new(),
                completion: Completion::Yet(0),
                diagnostics: Vec::new(),
                root_state,
                touched,
            },
        );
    }

    /// Applies an edit, resetting the document to recheck from scratch. A
    /// `new_version` at or below the current version is ignored (the caller
    /// logs nothing further; this is the authoritative drop point per
    /// invariant 3). Returns whether the edit was applied, which tells the
    /// caller whether to go on and invalidate postponed requests.
    pub fn change(
        &mut self,
        uri: &Url,
        new_version: i64,
        new_text: String,
        root_state: P::RootState,
    ) -> bool {
        let applied = match self.documents.get_mut(uri) {
            None => false,
            Some(doc) => {
                if new_version <= doc.version {
                    warn!(
                        "ignoring stale didChange for {} (version {} <= current {})",
                        uri, new_version, doc.version
                    );
                    false
                } else {
                    doc.version = new_version;
                    doc.raw_text = new_text;
                    doc.nodes.clear();
                    doc.diagnostics.clear();
                    doc.completion = Completion::Yet(0);
                    doc.root_state = root_state;
                    true
                }
            }
        };
        if applied {
            self.touch(uri);
        }
        applied
    }

    /// Drops a document entirely. The caller is responsible for cancelling
    /// any requests that were postponed against it.
    pub fn close(&mut self, uri: &Url) -> Option<Document<P>> {
        self.documents.remove(uri)
    }

    /// Runs one bounded slice of `uri`'s check continuation: parses and
    /// interprets at most one top-level unit.
    pub fn step(&mut self, uri: &Url, prover: &P) -> StepOutcome {
        let doc = match self.documents.get_mut(uri) {
            Some(doc) => doc,
            None => return StepOutcome::Idle,
        };
        if doc.completion.is_done() {
            return StepOutcome::Idle;
        }
        if prover.interrupt_flag().load(Ordering::SeqCst) {
            return StepOutcome::Suspended;
        }

        let offset = doc.offset();
        match prover.parse_next(&doc.raw_text, offset, &doc.root_state) {
            None => {
                doc.completion = Completion::Done;
                drop(doc);
                self.touch(uri);
                StepOutcome::Completed
            }
            Some((ast, range, next_offset)) => {
                let root_state = doc.root_state.clone();
                let protected = prover.protect(range, || prover.interpret(&root_state, &ast));
                match protected {
                    Ok(outcome) => {
                        doc.diagnostics.extend(outcome.diagnostics.iter().cloned());
                        doc.nodes.push(Node {
                            range,
                            ast,
                            diagnostics: outcome.diagnostics,
                            post_state: outcome.next_state.clone(),
                        });
                        doc.root_state = outcome.next_state;
                    }
                    Err(diagnostic) => {
                        doc.diagnostics.push(diagnostic.clone());
                        doc.nodes.push(Node {
                            range,
                            ast,
                            diagnostics: vec![diagnostic],
                            post_state: root_state,
                        });
                    }
                }
                doc.completion = Completion::Yet(next_offset);
                drop(doc);
                self.touch(uri);
                StepOutcome::Progressed
            }
        }
    }

    /// Picks a URI with outstanding work, preferring the most recently
    /// touched document; ties can't occur since `touched` is a strictly
    /// increasing counter, which doubles as "insertion order" tie-breaking.
    pub fn any_active(&self) -> Option<Url> {
        self.documents
            .values()
            .filter(|doc| !doc.completion.is_done())
            .max_by_key(|doc| doc.touched)
            .map(|doc| doc.uri.clone())
    }
}

impl<P: Prover> Default for DocumentManager<P> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prover::ReferenceProver;
    use std::path::Path;

    fn uri(path: &str) -> Url {
        Url::from_file_path(path).unwrap()
    }

    fn workspace() -> Arc<Workspace> {
        Arc::new(Workspace::guess(Path::new("/proj"), &[]))
    }

    #[test]
    fn create_seeds_yet_zero() {
        let mut mgr: DocumentManager<ReferenceProver> = DocumentManager::new();
        mgr.create(uri("/proj/a.v"), 1, "foo.".to_owned(), workspace(), 0);
        let doc = mgr.get(&uri("/proj/a.v")).unwrap();
        assert_eq!(doc.completion, Completion::Yet(0));
        assert_eq!(doc.version, 1);
    }

    #[test]
    fn step_progresses_then_completes() {
        let prover = ReferenceProver::new();
        let mut mgr: DocumentManager<ReferenceProver> = DocumentManager::new();
        mgr.create(uri("/proj/a.v"), 1, "foo. bar.".to_owned(), workspace(), 0);
        let u = uri("/proj/a.v");

        assert_eq!(mgr.step(&u, &prover), StepOutcome::Progressed);
        assert_eq!(mgr.step(&u, &prover), StepOutcome::Progressed);
        assert_eq!(mgr.step(&u, &prover), StepOutcome::Completed);
        assert!(mgr.get(&u).unwrap().completion.is_done());
        assert_eq!(mgr.get(&u).unwrap().nodes.len(), 2);
    }

    #[test]
    fn step_on_unknown_uri_is_idle() {
        let prover = ReferenceProver::new();
        let mut mgr: DocumentManager<ReferenceProver> = DocumentManager::new();
        assert_eq!(mgr.step(&uri("/proj/missing.v"), &prover), StepOutcome::Idle);
    }

    #[test]
    fn step_respects_the_interrupt_flag() {
        let prover = ReferenceProver::new();
        let mut mgr: DocumentManager<ReferenceProver> = DocumentManager::new();
        mgr.create(uri("/proj/a.v"), 1, "foo.".to_owned(), workspace(), 0);
        let u = uri("/proj/a.v");

        prover.interrupt_flag().store(true, Ordering::SeqCst);
        assert_eq!(mgr.step(&u, &prover), StepOutcome::Suspended);
        assert_eq!(mgr.get(&u).unwrap().completion, Completion::Yet(0));
    }

    #[test]
    fn interpret_failures_become_error_diagnostics_not_panics() {
        let prover = ReferenceProver::new();
        let mut mgr: DocumentManager<ReferenceProver> = DocumentManager::new();
        mgr.create(uri("/proj/a.v"), 1, "exact (fail I).".to_owned(), workspace(), 0);
        let u = uri("/proj/a.v");

        assert_eq!(mgr.step(&u, &prover), StepOutcome::Progressed);
        assert_eq!(mgr.get(&u).unwrap().diagnostics.len(), 1);
    }

    #[test]
    fn change_with_stale_version_is_ignored() {
        let mut mgr: DocumentManager<ReferenceProver> = DocumentManager::new();
        mgr.create(uri("/proj/a.v"), 5, "foo.".to_owned(), workspace(), 0);
        let u = uri("/proj/a.v");

        let applied = mgr.change(&u, 5, "bar.".to_owned(), 0);
        assert!(!applied);
        assert_eq!(mgr.get(&u).unwrap().raw_text, "foo.");
    }

    #[test]
    fn change_resets_nodes_and_completion() {
        let prover = ReferenceProver::new();
        let mut mgr: DocumentManager<ReferenceProver> = DocumentManager::new();
        mgr.create(uri("/proj/a.v"), 1, "foo.".to_owned(), workspace(), 0);
        let u = uri("/proj/a.v");
        mgr.step(&u, &prover);

        let applied = mgr.change(&u, 2, "bar. baz.".to_owned(), 0);
        assert!(applied);
        let doc = mgr.get(&u).unwrap();
        assert_eq!(doc.completion, Completion::Yet(0));
        assert!(doc.nodes.is_empty());
        assert_eq!(doc.version, 2);
    }

    #[test]
    fn any_active_skips_done_documents() {
        let prover = ReferenceProver::new();
        let mut mgr: DocumentManager<ReferenceProver> = DocumentManager::new();
        mgr.create(uri("/proj/a.v"), 1, "".to_owned(), workspace(), 0);
        mgr.create(uri("/proj/b.v"), 1, "foo.".to_owned(), workspace(), 0);
        mgr.step(&uri("/proj/a.v"), &prover);

        assert_eq!(mgr.any_active(), Some(uri("/proj/b.v")));
    }

    #[test]
    fn any_active_prefers_most_recently_touched() {
        let mut mgr: DocumentManager<ReferenceProver> = DocumentManager::new();
        mgr.create(uri("/proj/a.v"), 1, "foo.".to_owned(), workspace(), 0);
        mgr.create(uri("/proj/b.v"), 1, "foo.".to_owned(), workspace(), 0);
        mgr.change(&uri("/proj/a.v"), 2, "bar.".to_owned(), 0);

        assert_eq!(mgr.any_active(), Some(uri("/proj/a.v")));
    }

    #[test]
    fn close_removes_the_document() {
        let mut mgr: DocumentManager<ReferenceProver> = DocumentManager::new();
        mgr.create(uri("/proj/a.v"), 1, "foo.".to_owned(), workspace(), 0);
        assert!(mgr.close(&uri("/proj/a.v")).is_some());
        assert!(mgr.get(&uri("/proj/a.v")).is_none());
    }
}
