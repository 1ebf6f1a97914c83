//! The `Prover` capability (§6): the narrow interface the coordinator
//! consumes from the actual proof-checking engine. Everything about how the
//! prover parses, interprets, or renders goals is out of scope for this
//! crate — the coordinator only needs the six operations below.
//!
//! `ReferenceProver` is a minimal, deterministic stand-in used by this
//! crate's own tests. It implements none of the real proof-checking
//! semantics; it exists purely so the document manager and scheduler have
//! something to drive.

use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use lsp_types::{Position, Range};
use url::Url;

use crate::workspace::Workspace;

/// Severity of a single diagnostic, mirroring `lsp_types::DiagnosticSeverity`
/// closely enough to convert without loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Information,
    Hint,
}

/// One diagnostic message attached to a span of source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub range: Range,
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn error(range: Range, message: impl Into<String>) -> Self {
        Diagnostic { range, severity: Severity::Error, message: message.into() }
    }
}

/// The outcome of interpreting one parsed unit.
pub struct InterpretOutcome<R> {
    pub next_state: R,
    pub diagnostics: Vec<Diagnostic>,
}

/// The narrow capability the coordinator requires from a proof-checking
/// engine. `RootState` and `Ast` are opaque to the coordinator: it stores
/// and threads them through but never inspects their contents.
pub trait Prover {
    /// A prover's notion of "the state after some prefix of input has been
    /// checked". Cheap to clone (typically a handle or reference-counted
    /// value), since the document manager keeps one per checked node.
    type RootState: Clone;
    /// One parsed, not-yet-interpreted unit of source (e.g. one top-level
    /// statement). Opaque to the core.
    type Ast: Clone;

    /// Prepares a fresh root state for files under `workspace`.
    fn init(&self, workspace: &Workspace) -> Self::RootState;

    /// Probes `root` for how it should be prepared, producing the
    /// `Workspace` the coordinator will register.
    fn workspace_guess(&self, root: &Path, cmdline: &[String]) -> Workspace;

    /// Tells the prover which workspace covers `uri`, ahead of checking it.
    /// A no-op for provers that don't need per-file setup.
    fn workspace_apply(&self, _uri: &Url, _workspace: &Workspace) {}

    /// Parses the next top-level unit starting at byte `offset` in `text`.
    /// Returns `None` once there is nothing left to parse.
    fn parse_next(
        &self,
        text: &str,
        offset: usize,
        state: &Self::RootState,
    ) -> Option<(Self::Ast, Range, usize)>;

    /// Interprets one parsed unit against `state`, producing the successor
    /// state and any diagnostics. Never panics by contract; callers still
    /// run this through `protect` because "never panics" is a prover
    /// obligation the coordinator cannot verify.
    fn interpret(&self, state: &Self::RootState, ast: &Self::Ast) -> InterpretOutcome<Self::RootState>;

    /// The interrupt flag this prover polls at cooperative checkpoints. The
    /// scheduler sets it to request prompt unwinding of in-flight work.
    fn interrupt_flag(&self) -> Arc<AtomicBool>;

    /// Runs `thunk`, converting a panic into a single error diagnostic
    /// rather than letting it escape and take down the worker. This is the
    /// *protect* wrapper of §4.D / §7: prover failures never become JSON-RPC
    /// errors, only diagnostics.
    fn protect<T>(&self, range: Range, thunk: impl FnOnce() -> T) -> Result<T, Diagnostic> {
        panic::catch_unwind(AssertUnwindSafe(thunk)).map_err(|payload| {
            let message = panic_message(payload);
            Diagnostic::error(range, format!("prover failure: {}", message))
        })
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

/// A top-level unit as produced by `ReferenceProver`: just the verbatim
/// source slice, since there is no real AST.
#[derive(Debug, Clone)]
pub struct ReferenceAst {
    pub text: String,
}

/// A deterministic stand-in for a real prover, used only by this crate's own
/// tests. Splits source on `.` followed by whitespace or end-of-input, and
/// flags any unit containing the literal substring `fail` as an error.
#[derive(Default)]
pub struct ReferenceProver {
    interrupt_flag: Arc<AtomicBool>,
}

impl ReferenceProver {
    pub fn new() -> Self {
        ReferenceProver { interrupt_flag: Arc::new(AtomicBool::new(false)) }
    }
}

impl Prover for ReferenceProver {
    type RootState = u32;
    type Ast = ReferenceAst;

    fn init(&self, _workspace: &Workspace) -> Self::RootState {
        0
    }

    fn workspace_guess(&self, root: &Path, cmdline: &[String]) -> Workspace {
        Workspace::guess(root, cmdline)
    }

    fn parse_next(
        &self,
        text: &str,
        offset: usize,
        _state: &Self::RootState,
    ) -> Option<(Self::Ast, Range, usize)> {
        let rest = text.get(offset..)?;
        let rest_trimmed_start = rest.len() - rest.trim_start().len();
        let start = offset + rest_trimmed_start;
        let tail = &text[start..];
        if tail.is_empty() {
            return None;
        }

        let end_rel = tail.find('.').map(|i| i + 1).unwrap_or_else(|| tail.len());
        let unit = &tail[..end_rel];
        let next_offset = start + end_rel;

        let start_pos = offset_to_position(text, start);
        let end_pos = offset_to_position(text, next_offset);
        Some((
            ReferenceAst { text: unit.to_owned() },
            Range { start: start_pos, end: end_pos },
            next_offset,
        ))
    }

    fn interpret(&self, state: &Self::RootState, ast: &Self::Ast) -> InterpretOutcome<Self::RootState> {
        let diagnostics = if ast.text.contains("fail") {
            vec![Diagnostic::error(
                Range { start: Position::new(0, 0), end: Position::new(0, 0) },
                "reference prover: unit contains `fail`",
            )]
        } else {
            vec![]
        };
        InterpretOutcome { next_state: state + 1, diagnostics }
    }

    fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt_flag)
    }
}

/// Converts a byte offset into an LSP `Position` by counting lines and UTF-16
/// code units, matching how the rest of the wire protocol counts columns.
fn offset_to_position(text: &str, offset: usize) -> Position {
    let mut line = 0u32;
    let mut col = 0u32;
    for ch in text[..offset].chars() {
        if ch == '\n' {
            line += 1;
            col = 0;
        } else {
            col += ch.len_utf16() as u32;
        }
    }
    Position::new(line, col)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_next_splits_on_statement_terminators() {
        let prover = ReferenceProver::new();
        let state = prover.init(&Workspace::guess(Path::new("/"), &[]));
        let text = "Lemma l: True. Proof. exact I. Qed.";

        let (unit1, _, off1) = prover.parse_next(text, 0, &state).unwrap();
        assert_eq!(unit1.text, "Lemma l: True.");
        let (unit2, _, off2) = prover.parse_next(text, off1, &state).unwrap();
        assert_eq!(unit2.text.trim_start(), "Proof.");
        assert!(off2 > off1);
    }

    #[test]
    fn parse_next_returns_none_at_end_of_input() {
        let prover = ReferenceProver::new();
        let state = prover.init(&Workspace::guess(Path::new("/"), &[]));
        assert!(prover.parse_next("", 0, &state).is_none());
        assert!(prover.parse_next("   ", 0, &state).is_none());
    }

    #[test]
    fn interpret_flags_units_containing_fail() {
        let prover = ReferenceProver::new();
        let ast = ReferenceAst { text: "exact (fail I).".to_owned() };
        let outcome = prover.interpret(&0, &ast);
        assert_eq!(outcome.diagnostics.len(), 1);
        assert_eq!(outcome.diagnostics[0].severity, Severity::Error);
    }

    #[test]
    fn interpret_succeeds_without_diagnostics_otherwise() {
        let prover = ReferenceProver::new();
        let ast = ReferenceAst { text: "exact I.".to_owned() };
        let outcome = prover.interpret(&0, &ast);
        assert!(outcome.diagnostics.is_empty());
        assert_eq!(outcome.next_state, 1);
    }

    #[test]
    fn protect_turns_a_panic_into_a_diagnostic() {
        let prover = ReferenceProver::new();
        let range = Range { start: Position::new(0, 0), end: Position::new(0, 1) };
        let result: Result<(), Diagnostic> = prover.protect(range, || panic!("boom"));
        let diag = result.unwrap_err();
        assert_eq!(diag.severity, Severity::Error);
        assert!(diag.message.contains("boom"));
    }

    #[test]
    fn protect_passes_through_on_success() {
        let prover = ReferenceProver::new();
        let range = Range { start: Position::new(0, 0), end: Position::new(0, 1) };
        let result = prover.protect(range, || 42);
        assert_eq!(result.unwrap(), 42);
    }
}
