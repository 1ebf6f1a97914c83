//! Types, helpers, and conversions to and from LSP wire types, plus the
//! hand-authored extension methods this server adds on top of the standard
//! LSP surface.

use std::error::Error;
use std::fmt;
use std::path::PathBuf;

pub use lsp_types::notification::Notification as LSPNotification;
pub use lsp_types::request::Request as LSPRequest;
pub use lsp_types::*;
use serde_derive::{Deserialize, Serialize};
use url::Url;

use crate::config;

/// An error that can occur when parsing a file URI.
#[derive(Debug)]
pub enum UrlFileParseError {
    /// The URI scheme is not `file`.
    InvalidScheme,
    /// Invalid file path in the URI.
    InvalidFilePath,
}

impl Error for UrlFileParseError {}

impl fmt::Display for UrlFileParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let description = match self {
            UrlFileParseError::InvalidScheme => "URI scheme is not `file`",
            UrlFileParseError::InvalidFilePath => "Invalid file path in URI",
        };
        write!(f, "{}", description)
    }
}

/// Parses the given URI into a `PathBuf`.
pub fn parse_file_path(uri: &Url) -> Result<PathBuf, UrlFileParseError> {
    if uri.scheme() == "file" {
        uri.to_file_path().map_err(|_err| UrlFileParseError::InvalidFilePath)
    } else {
        Err(UrlFileParseError::InvalidScheme)
    }
}

/// Creates an edit for the given location and text.
pub fn make_workspace_edit(location: Location, new_text: String) -> WorkspaceEdit {
    let changes = vec![(location.uri, vec![TextEdit { range: location.range, new_text }])]
        .into_iter()
        .collect();

    WorkspaceEdit { changes: Some(changes), document_changes: None }
}

/// Utilities for working with positions and ranges expressed in UTF-16 code
/// units, as the wire protocol requires.
pub mod ls_util {
    use super::*;

    /// Converts a UTF-16-counted `Position` back into a byte offset into
    /// `text`. The inverse of the line/column counting the wire protocol
    /// uses everywhere else in this crate.
    pub fn position_to_offset(text: &str, pos: Position) -> usize {
        let mut line = 0u32;
        let mut col = 0u32;
        for (byte_idx, ch) in text.char_indices() {
            if line == pos.line && col == pos.character {
                return byte_idx;
            }
            if ch == '\n' {
                line += 1;
                col = 0;
            } else {
                col += ch.len_utf16() as u32;
            }
        }
        text.len()
    }

    /// Byte span covered by `range`, as `position_to_offset` applied to both ends.
    pub fn range_to_byte_span(text: &str, range: &Range) -> (usize, usize) {
        (position_to_offset(text, range.start), position_to_offset(text, range.end))
    }

    /// The `Range` spanning all of `content`.
    pub fn range_from_file_string(content: impl AsRef<str>) -> Range {
        let content = content.as_ref();

        if content.is_empty() {
            Range { start: Position::new(0, 0), end: Position::new(0, 0) }
        } else {
            let mut line_count = content.lines().count() as u64 - 1;
            let col = if content.ends_with('\n') {
                line_count += 1;
                0
            } else {
                content
                    .lines()
                    .last()
                    .expect("string is not empty")
                    .chars()
                    // LSP uses UTF-16 code unit offsets.
                    .map(|chr| chr.len_utf16() as u64)
                    .sum()
            };
            // Range is zero-based and the end position is exclusive.
            Range { start: Position::new(0, 0), end: Position::new(line_count, col) }
        }
    }
}

/* ------  Extension methods for JSON-RPC protocol types ------ */

/// Provides additional methods for the remote `Range` type.
pub trait RangeExt {
    /// `true` if both `Range`s overlap.
    fn overlaps(&self, other: &Self) -> bool;
}

impl RangeExt for Range {
    fn overlaps(&self, other: &Self) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

/// `DidChangeConfigurationParams.settings` payload, reading the `{ meow: {...} }` bit.
#[derive(Debug, Deserialize)]
pub struct ChangeConfigSettings {
    pub meow: config::Config,
}

impl ChangeConfigSettings {
    /// Deserializes `ChangeConfigSettings` from a JSON value expected to be
    /// an object containing only the `meow` key; see `Config::try_deserialize`
    /// for how that key's contents are validated.
    pub fn try_deserialize(
        val: &serde_json::value::Value,
        dups: &mut std::collections::HashMap<String, Vec<String>>,
        unknowns: &mut Vec<String>,
        deprecated: &mut Vec<String>,
    ) -> Result<ChangeConfigSettings, ()> {
        let mut ret = Err(());
        if let serde_json::Value::Object(map) = val {
            for (k, v) in map.iter() {
                if k != "meow" {
                    unknowns.push(k.to_string());
                    continue;
                }
                if let serde_json::Value::Object(_) = v {
                    if let Ok(meow) = config::Config::try_deserialize(v, dups, unknowns, deprecated) {
                        ret = Ok(ChangeConfigSettings { meow });
                    }
                } else {
                    return Err(());
                }
            }
        }
        ret
    }
}

/* -----------------  JSON-RPC protocol types ----------------- */

/// Supported contents of `initialize.params.initializationOptions`.
#[derive(Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InitializationOptions {
    /// `DidChangeConfigurationParams.settings`-shaped payload for upfront
    /// configuration, equivalent to sending `didChangeConfiguration`
    /// immediately after `initialize`.
    pub settings: Option<ChangeConfigSettings>,
}

impl InitializationOptions {
    /// Deserializes `InitializationOptions` from a JSON value. If present,
    /// `val.settings` is validated the same way a later
    /// `didChangeConfiguration` notification would be.
    pub fn try_deserialize(
        mut val: serde_json::value::Value,
        dups: &mut std::collections::HashMap<String, Vec<String>>,
        unknowns: &mut Vec<String>,
        deprecated: &mut Vec<String>,
    ) -> Result<InitializationOptions, ()> {
        let settings = val.get_mut("settings").map(|x| x.take()).and_then(|set| {
            ChangeConfigSettings::try_deserialize(&set, dups, unknowns, deprecated).ok()
        });

        Ok(InitializationOptions { settings, ..serde_json::from_value(val).map_err(|_| ())? })
    }
}

impl Default for InitializationOptions {
    fn default() -> Self {
        InitializationOptions { settings: None }
    }
}

/// Subset of `lsp_types::ClientCapabilities` that affects this server's
/// behavior, picked out at `initialize` time. Passed in the `initialize`
/// request under `capabilities`.
#[derive(Debug, PartialEq, Deserialize, Serialize, Clone, Copy, Default)]
#[serde(default)]
pub struct ClientCapabilities {
    pub code_completion_has_snippet_support: bool,
    pub related_information_support: bool,
}

impl ClientCapabilities {
    pub fn new(params: &lsp_types::InitializeParams) -> ClientCapabilities {
        // `lsp_types::ClientCapabilities` is awkward to hold onto directly
        // (it doesn't `Clone`), so we pick out just the bits handlers need
        // into this small, thread-shareable struct.
        let code_completion_has_snippet_support = params
            .capabilities
            .text_document
            .as_ref()
            .and_then(|doc| doc.completion.as_ref())
            .and_then(|comp| comp.completion_item.as_ref())
            .and_then(|item| item.snippet_support.as_ref())
            .copied()
            .unwrap_or(false);

        let related_information_support = params
            .capabilities
            .text_document
            .as_ref()
            .and_then(|doc| doc.publish_diagnostics.as_ref())
            .and_then(|diag| diag.related_information.as_ref())
            .copied()
            .unwrap_or(false);

        ClientCapabilities { code_completion_has_snippet_support, related_information_support }
    }
}

/* -----------------  Custom extension methods ----------------- */

/// How a `proof/goals` response renders each goal: `Pp` is the prover's
/// structured pretty-print form, `Str` is a flattened plain string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub enum PpFormat {
    Pp,
    Str,
}

impl Default for PpFormat {
    fn default() -> Self {
        PpFormat::Pp
    }
}

/// Params for `proof/goals`: the proof-state request at a cursor position.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalsParams {
    pub text_document: TextDocumentIdentifier,
    pub position: Position,
    /// The document version this request was issued against, if the client
    /// tracks it; lets the Request Table reject a reply that would describe
    /// a since-superseded document instead of silently answering with stale
    /// goal state.
    #[serde(default)]
    pub version: Option<i64>,
    #[serde(default)]
    pub pp_format: PpFormat,
}

/// Result for `proof/goals`: the rendered goal list, or `None` if there is
/// no proof obligation at the given position.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalsResult {
    pub goals: Vec<String>,
}

/// `proof/goals`: reports the open goals at a cursor position. A
/// `PositionRequest` per §4.E (`postpone = true`, as goals only make sense
/// once checking has caught up to the cursor).
#[derive(Debug)]
pub enum Goals {}

impl LSPRequest for Goals {
    type Params = GoalsParams;
    type Result = Option<GoalsResult>;
    const METHOD: &'static str = "proof/goals";
}

/// Params for `coq/getDocument`: a dump of a fully-checked document's nodes.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetDocumentParams {
    pub text_document: TextDocumentIdentifier,
}

/// One checked unit, as reported by `coq/getDocument`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentNode {
    pub range: Range,
    pub text: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetDocumentResult {
    pub nodes: Vec<DocumentNode>,
}

/// `coq/getDocument`: a `DocumentRequest`, requiring `completion = Done`.
#[derive(Debug)]
pub enum GetDocument {}

impl LSPRequest for GetDocument {
    type Params = GetDocumentParams;
    type Result = GetDocumentResult;
    const METHOD: &'static str = "coq/getDocument";
}

/// Params for `coq/saveVo`: request to write a compiled-object file.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveVoParams {
    pub text_document: TextDocumentIdentifier,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveVoResult {
    pub path: String,
}

/// `coq/saveVo`: a `DocumentRequest` whose handler dispatches the actual
/// write as a background job (§5).
#[derive(Debug)]
pub enum SaveVo {}

impl LSPRequest for SaveVo {
    type Params = SaveVoParams;
    type Result = SaveVoResult;
    const METHOD: &'static str = "coq/saveVo";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_from_file_string_handles_empty_and_trailing_newline() {
        assert_eq!(ls_util::range_from_file_string(""), Range { start: Position::new(0, 0), end: Position::new(0, 0) });
        let r = ls_util::range_from_file_string("a\nb\n");
        assert_eq!(r.end, Position::new(2, 0));
    }

    #[test]
    fn position_to_offset_finds_the_right_byte() {
        let text = "foo.\nbar.";
        assert_eq!(ls_util::position_to_offset(text, Position::new(0, 0)), 0);
        assert_eq!(ls_util::position_to_offset(text, Position::new(1, 0)), 5);
        assert_eq!(ls_util::position_to_offset(text, Position::new(1, 4)), 9);
    }

    #[test]
    fn ranges_overlap() {
        let a = Range { start: Position::new(0, 0), end: Position::new(0, 5) };
        let b = Range { start: Position::new(0, 3), end: Position::new(0, 8) };
        assert!(a.overlaps(&b));
        let c = Range { start: Position::new(1, 0), end: Position::new(1, 1) };
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn change_config_settings_rejects_keys_other_than_meow() {
        let value = serde_json::json!({"other": {}});
        let mut unknowns = Vec::new();
        let result =
            ChangeConfigSettings::try_deserialize(&value, &mut Default::default(), &mut unknowns, &mut vec![]);
        assert!(result.is_err());
        assert_eq!(unknowns, vec!["other".to_owned()]);
    }

    #[test]
    fn goals_method_name_matches_the_wire_protocol() {
        assert_eq!(Goals::METHOD, "proof/goals");
        assert_eq!(GetDocument::METHOD, "coq/getDocument");
        assert_eq!(SaveVo::METHOD, "coq/saveVo");
    }
}
