//! Request handlers. Each is a thin, side-effect-free function from a
//! `Document` snapshot (plus whatever extra params the request carries) to a
//! wire result — the opaque-handler model described for the Scheduler's
//! handler registry. None of these touch the Document Manager, Workspace
//! Registry, or Request Table directly; the Scheduler resolves the document
//! first and hands it in.

pub mod code_lens;
pub mod completion;
pub mod definition;
pub mod document_ops;
pub mod goals;
pub mod hover;
pub mod symbols;

use lsp_types::{Diagnostic as LspDiagnostic, DiagnosticSeverity};

use crate::prover::{Diagnostic, Severity};

/// Converts this crate's prover-facing `Diagnostic` into the wire type sent
/// with `textDocument/publishDiagnostics`.
pub fn to_lsp_diagnostic(diag: &Diagnostic) -> LspDiagnostic {
    let severity = match diag.severity {
        Severity::Error => DiagnosticSeverity::Error,
        Severity::Warning => DiagnosticSeverity::Warning,
        Severity::Information => DiagnosticSeverity::Information,
        Severity::Hint => DiagnosticSeverity::Hint,
    };
    LspDiagnostic {
        range: diag.range,
        severity: Some(severity),
        code: None,
        source: Some("meow".to_owned()),
        message: diag.message.clone(),
        related_information: None,
    }
}
