//! The handler registry and the Scheduler (§4.E, §4.F): classifies each
//! inbound request against the Request Table, serves it immediately, holds
//! it for later, or rejects it, and drives the Document Manager's check
//! continuations whenever the Message Queue runs dry.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use jsonrpc_core::{types::ErrorCode, Id};
use log::{debug, warn};
use lsp_types::notification::{
    Cancel, DidChangeConfiguration, DidChangeTextDocument, DidChangeWorkspaceFolders,
    DidCloseTextDocument, DidOpenTextDocument, DidSaveTextDocument, Exit, Initialized,
    PublishDiagnostics, SetTrace, ShowMessage,
};
use lsp_types::request::{
    Completion as CompletionRequest, DocumentSymbolRequest, GotoDefinition, HoverRequest,
    Initialize, Shutdown,
};
use lsp_types::{
    CodeLensRequest, DidChangeConfigurationParams, DidChangeTextDocumentParams,
    DidChangeWorkspaceFoldersParams, DidCloseTextDocumentParams, DidOpenTextDocumentParams,
    DidSaveTextDocumentParams, MessageType, NumberOrString, Position, PublishDiagnosticsParams,
    ShowMessageParams, TraceValue, Url,
};

use crate::actions;
use crate::concurrency::Jobs;
use crate::config::{AtomicTraceLevel, Config, TraceLevel, DEPRECATED_OPTIONS};
use crate::document::DocumentManager;
use crate::lsp_data::{parse_file_path, ChangeConfigSettings, GetDocument, Goals, PpFormat, SaveVo};
use crate::prover::Prover;
use crate::request_table::{
    classify, Admission, DocumentStatus, Request as TableRequest, RequestId, RequestTable,
};
use crate::server::io::Output;
use crate::server::message::{Notification, RawMessage, Request};
use crate::workspace::WorkspaceRegistry;

/// What the Message Loop should do after handling one frame.
pub(crate) enum ControlFlow {
    Continue,
    Exit(i32),
}

/// The server's position in the handshake/shutdown lifecycle (§4.B).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
    PreInit,
    Running,
    ShuttingDown,
    Exited,
}

/// The rendering a `textDocument/*` position request needs once its document
/// is ready.
#[derive(Clone, Copy)]
enum PositionKind {
    Hover,
    Completion,
    Definition,
}

#[derive(Clone, Copy)]
enum DocumentKind {
    Symbols,
    CodeLens,
    GetDocument,
    SaveVo,
}

/// What a postponed id will be served with once its document catches up.
/// The Request Table (`request_table::RequestTable`) tracks only enough
/// shape to classify and cancel a postponed request; this parallel map
/// carries what `drain_ready` can't: the concrete method and, for position
/// requests, the cursor.
enum PendingRequest {
    Position { uri: Url, position: Position, kind: PositionKind },
    Goals { uri: Url, position: Position, pp_format: PpFormat },
    Document { uri: Url, kind: DocumentKind },
}

/// Owns every piece of worker-exclusive state plus the handles needed to
/// talk back to the client, and implements the handler registry described
/// in §9: each method name maps, via the match in `handle_request`, to a
/// function yielding either an immediate reply or a postponed admission.
pub(crate) struct Coordinator<P: Prover, O: Output> {
    pub(crate) state: State,
    prover: P,
    out: O,
    documents: DocumentManager<P>,
    workspaces: WorkspaceRegistry<P>,
    requests: RequestTable,
    pending: HashMap<RequestId, PendingRequest>,
    jobs: Jobs,
    config: Config,
    trace_level: Arc<AtomicTraceLevel>,
    shutdown_received: bool,
}

impl<P: Prover, O: Output> Coordinator<P, O> {
    pub(crate) fn new(prover: P, out: O, cmdline: Vec<String>) -> Self {
        Coordinator {
            state: State::PreInit,
            prover,
            out,
            documents: DocumentManager::new(),
            workspaces: WorkspaceRegistry::new(cmdline),
            requests: RequestTable::new(),
            pending: HashMap::new(),
            jobs: Jobs::default(),
            config: Config::default(),
            trace_level: Arc::new(AtomicTraceLevel::default()),
            shutdown_received: false,
        }
    }

    pub(crate) fn trace_level(&self) -> Arc<AtomicTraceLevel> {
        Arc::clone(&self.trace_level)
    }

    pub(crate) fn interrupt_flag(&self) -> Arc<std::sync::atomic::AtomicBool> {
        self.prover.interrupt_flag()
    }

    /// Handles one framed message according to the current lifecycle state.
    pub(crate) fn handle_raw(&mut self, text: &str) -> ControlFlow {
        let raw = match RawMessage::try_parse(text) {
            Ok(Some(raw)) => raw,
            Ok(None) => return ControlFlow::Continue,
            Err(_) => {
                debug!("dropping malformed JSON-RPC frame");
                return ControlFlow::Continue;
            }
        };

        let is_notification = matches!(raw.id, Id::Null);

        match self.state {
            State::PreInit => self.handle_pre_init(raw, is_notification),
            State::Running => self.handle_running(raw, is_notification),
            State::ShuttingDown => self.handle_shutting_down(raw, is_notification),
            State::Exited => {}
        }

        if self.state == State::Exited {
            let code = if self.shutdown_received { 0 } else { 1 };
            ControlFlow::Exit(code)
        } else {
            ControlFlow::Continue
        }
    }

    fn handle_pre_init(&mut self, raw: RawMessage, is_notification: bool) {
        if !is_notification && raw.method == "initialize" {
            self.handle_initialize(raw);
            return;
        }
        if is_notification && raw.method == Exit::METHOD {
            self.state = State::Exited;
            return;
        }
        if is_notification {
            debug!("ignoring {} notification before initialize", raw.method);
            return;
        }
        self.out.failure_message(
            id_of(&raw),
            ErrorCode::ServerError(-32002),
            "server not initialized",
        );
    }

    fn handle_shutting_down(&mut self, raw: RawMessage, is_notification: bool) {
        if is_notification && raw.method == Exit::METHOD {
            self.state = State::Exited;
            return;
        }
        if is_notification {
            return;
        }
        self.out.failure_message(
            id_of(&raw),
            ErrorCode::ServerError(-32097),
            "Server shutting down",
        );
    }

    fn handle_running(&mut self, raw: RawMessage, is_notification: bool) {
        if !is_notification && raw.method == "initialize" {
            self.out.failure_message(
                id_of(&raw),
                ErrorCode::InvalidRequest,
                "server already initialized",
            );
            return;
        }
        if is_notification {
            self.handle_notification(raw);
        } else {
            self.handle_request(raw);
        }
    }

    // -------------------- initialize / shutdown / exit --------------------

    fn handle_initialize(&mut self, raw: RawMessage) {
        let request: Request<Initialize> = match raw.parse_as_request() {
            Ok(r) => r,
            Err(e) => {
                self.out.failure(raw.id.clone(), e);
                return;
            }
        };
        let params = request.params;

        let mut dups = Default::default();
        let mut unknowns = Vec::new();
        let mut deprecated = Vec::new();
        if let Some(init_options) = params.initialization_options.clone() {
            if let Ok(opts) = crate::lsp_data::InitializationOptions::try_deserialize(
                init_options,
                &mut dups,
                &mut unknowns,
                &mut deprecated,
            ) {
                if let Some(settings) = opts.settings {
                    self.config.update(settings.meow);
                }
            }
        }
        self.trace_level.store(self.config.trace_level);
        self.warn_about_config_problems(&dups, &unknowns, &deprecated);

        for folder in root_folders(&params) {
            self.workspaces.add(&self.prover, &folder);
        }

        let result = crate::server::initialize_result();
        self.out.success(request.id, &result);
        self.state = State::Running;
    }

    fn warn_about_config_problems(
        &self,
        dups: &HashMap<String, Vec<String>>,
        unknowns: &[String],
        deprecated: &[String],
    ) {
        for (snake, original) in dups.iter() {
            let message = format!("duplicate config key normalizes to `{}`: {:?}", snake, original);
            warn!("{}", message);
            self.show_message(MessageType::Warning, message);
        }
        for key in unknowns {
            let message = format!("unknown config key `{}`", key);
            warn!("{}", message);
            self.show_message(MessageType::Warning, message);
        }
        for key in deprecated {
            let hint = DEPRECATED_OPTIONS.get(key.as_str()).and_then(|h| *h).unwrap_or("");
            let message = format!("config key `{}` is deprecated; {}", key, hint);
            warn!("{}", message);
            self.show_message(MessageType::Warning, message);
        }
    }

    fn show_message(&self, typ: MessageType, message: impl Into<String>) {
        self.out.notify(Notification::<ShowMessage>::new(ShowMessageParams { typ, message: message.into() }));
    }

    fn handle_shutdown(&mut self, request: Request<Shutdown>) {
        self.out.success(request.id, &());
        for reply in self.requests.cancel_all() {
            self.pending.remove(&reply.id);
            self.out.failure_message(reply.id, reply.code, reply.message);
        }
        self.shutdown_received = true;
        self.state = State::ShuttingDown;
    }

    // -------------------------- notifications --------------------------

    fn handle_notification(&mut self, raw: RawMessage) {
        match raw.method.as_str() {
            m if m == Initialized::METHOD => {}
            m if m == SetTrace::METHOD => self.on_set_trace(raw),
            m if m == Cancel::METHOD => self.on_cancel(raw),
            m if m == DidChangeWorkspaceFolders::METHOD => self.on_workspace_folders_changed(raw),
            m if m == DidChangeConfiguration::METHOD => self.on_config_changed(raw),
            m if m == DidOpenTextDocument::METHOD => self.on_did_open(raw),
            m if m == DidChangeTextDocument::METHOD => self.on_did_change(raw),
            m if m == DidCloseTextDocument::METHOD => self.on_did_close(raw),
            m if m == DidSaveTextDocument::METHOD => self.on_did_save(raw),
            other => debug!("ignoring unknown notification {}", other),
        }
    }

    fn on_set_trace(&mut self, raw: RawMessage) {
        if let Ok(n) = raw.parse_as_notification::<SetTrace>() {
            let level = match n.params.value {
                TraceValue::Off => TraceLevel::Off,
                TraceValue::Messages => TraceLevel::Messages,
                TraceValue::Verbose => TraceLevel::Verbose,
            };
            self.trace_level.store(level);
        }
    }

    fn on_cancel(&mut self, raw: RawMessage) {
        if let Ok(n) = raw.parse_as_notification::<Cancel>() {
            let id = match n.params.id {
                NumberOrString::Number(n) => RequestId::Num(n as u64),
                NumberOrString::String(s) => RequestId::Str(s),
            };
            if let Some(reply) = self.requests.cancel_by_client(id.clone()) {
                self.pending.remove(&id);
                self.out.failure_message(reply.id, reply.code, reply.message);
            }
        }
    }

    fn on_workspace_folders_changed(&mut self, raw: RawMessage) {
        if let Ok(n) = raw.parse_as_notification::<DidChangeWorkspaceFolders>() {
            let DidChangeWorkspaceFoldersParams { event } = n.params;
            for added in event.added {
                if let Ok(path) = added.uri.to_file_path() {
                    self.workspaces.add(&self.prover, &path);
                }
            }
            for removed in event.removed {
                if let Ok(path) = removed.uri.to_file_path() {
                    self.workspaces.remove(&path);
                }
            }
        }
    }

    fn on_config_changed(&mut self, raw: RawMessage) {
        if let Ok(n) = raw.parse_as_notification::<DidChangeConfiguration>() {
            let DidChangeConfigurationParams { settings } = n.params;
            let mut dups = Default::default();
            let mut unknowns = Vec::new();
            let mut deprecated = Vec::new();
            if let Ok(ChangeConfigSettings { meow }) =
                ChangeConfigSettings::try_deserialize(&settings, &mut dups, &mut unknowns, &mut deprecated)
            {
                self.config.update(meow);
                self.trace_level.store(self.config.trace_level);
            }
            self.warn_about_config_problems(&dups, &unknowns, &deprecated);
        }
    }

    fn on_did_open(&mut self, raw: RawMessage) {
        let n: Notification<DidOpenTextDocument> = match raw.parse_as_notification() {
            Ok(n) => n,
            Err(_) => return,
        };
        let DidOpenTextDocumentParams { text_document } = n.params;
        let uri = text_document.uri;
        match self.workspaces.resolve(&uri) {
            Some((root_state, workspace)) => {
                let root_state = root_state.clone();
                let workspace = Arc::new(workspace.clone());
                self.documents.create(
                    uri,
                    text_document.version as i64,
                    text_document.text,
                    workspace,
                    root_state,
                );
            }
            None => warn!("didOpen for {} has no covering workspace; ignoring", uri),
        }
    }

    fn on_did_change(&mut self, raw: RawMessage) {
        let n: Notification<DidChangeTextDocument> = match raw.parse_as_notification() {
            Ok(n) => n,
            Err(_) => return,
        };
        let DidChangeTextDocumentParams { text_document, content_changes } = n.params;
        let uri = text_document.uri;
        if content_changes.len() > 1 {
            warn!(
                "{} carried {} content changes; using only the first (full sync)",
                uri,
                content_changes.len()
            );
        }
        let text = match content_changes.into_iter().next() {
            Some(change) => change.text,
            None => return,
        };
        let root_state = match self.workspaces.resolve(&uri) {
            Some((root_state, _)) => root_state.clone(),
            None => return,
        };
        let version = text_document.version.unwrap_or(0) as i64;
        let applied = self.documents.change(&uri, version, text, root_state);
        if applied {
            for reply in self.requests.invalidate_uri(&uri) {
                self.pending.remove(&reply.id);
                self.out.failure_message(reply.id, reply.code, reply.message);
            }
        }
    }

    fn on_did_close(&mut self, raw: RawMessage) {
        let n: Notification<DidCloseTextDocument> = match raw.parse_as_notification() {
            Ok(n) => n,
            Err(_) => return,
        };
        let DidCloseTextDocumentParams { text_document } = n.params;
        self.documents.close(&text_document.uri);
        for reply in self.requests.invalidate_uri(&text_document.uri) {
            self.pending.remove(&reply.id);
            self.out.failure_message(reply.id, reply.code, reply.message);
        }
    }

    fn on_did_save(&mut self, raw: RawMessage) {
        let n: Notification<DidSaveTextDocument> = match raw.parse_as_notification() {
            Ok(n) => n,
            Err(_) => return,
        };
        let DidSaveTextDocumentParams { text_document, .. } = n.params;
        if let Some(doc) = self.documents.get(&text_document.uri) {
            let path: PathBuf = match parse_file_path(&doc.uri) {
                Ok(p) => p,
                Err(_) => return,
            };
            let cache_path = path.with_extension("memo");
            let snapshot = doc.raw_text.clone();
            self.jobs.spawn(move |_token| {
                let _ = std::fs::write(cache_path, snapshot);
            });
        }
    }

    // ----------------------------- requests -----------------------------

    fn handle_request(&mut self, raw: RawMessage) {
        match raw.method.as_str() {
            m if m == HoverRequest::METHOD => self.position_request(raw, PositionKind::Hover, false),
            m if m == CompletionRequest::METHOD => {
                self.position_request(raw, PositionKind::Completion, true)
            }
            m if m == GotoDefinition::METHOD => {
                self.position_request(raw, PositionKind::Definition, true)
            }
            m if m == Goals::METHOD => self.goals_request(raw),
            m if m == DocumentSymbolRequest::METHOD => {
                self.document_request(raw, DocumentKind::Symbols)
            }
            m if m == CodeLensRequest::METHOD => self.document_request(raw, DocumentKind::CodeLens),
            m if m == GetDocument::METHOD => self.document_request(raw, DocumentKind::GetDocument),
            m if m == SaveVo::METHOD => self.document_request(raw, DocumentKind::SaveVo),
            "shutdown" => {
                if let Ok(r) = raw.parse_as_request::<Shutdown>() {
                    self.handle_shutdown(r);
                }
            }
            other => self.out.failure_message(
                id_of(&raw),
                ErrorCode::MethodNotFound,
                format!("Method not found: {}", other),
            ),
        }
    }

    /// Shared admission logic for `textDocument/hover`, `/completion`, and
    /// `/definition`: standard LSP params carry no document version, so
    /// these are always admitted with `version: None`.
    fn position_request(&mut self, raw: RawMessage, kind: PositionKind, postpone: bool) {
        let (id, uri, position) = match kind {
            PositionKind::Hover => {
                let r: Request<HoverRequest> = match raw.parse_as_request() {
                    Ok(r) => r,
                    Err(e) => return self.out.failure(raw.id.clone(), e),
                };
                (
                    r.id,
                    r.params.text_document_position_params.text_document.uri,
                    r.params.text_document_position_params.position,
                )
            }
            PositionKind::Completion => {
                let r: Request<CompletionRequest> = match raw.parse_as_request() {
                    Ok(r) => r,
                    Err(e) => return self.out.failure(raw.id.clone(), e),
                };
                (r.id, r.params.text_document_position.text_document.uri, r.params.text_document_position.position)
            }
            PositionKind::Definition => {
                let r: Request<GotoDefinition> = match raw.parse_as_request() {
                    Ok(r) => r,
                    Err(e) => return self.out.failure(raw.id.clone(), e),
                };
                (
                    r.id,
                    r.params.text_document_position_params.text_document.uri,
                    r.params.text_document_position_params.position,
                )
            }
        };

        let status = self.document_status(&uri);
        let table_request = TableRequest::PositionRequest { uri: uri.clone(), version: None, postpone };
        match classify(&table_request, &status) {
            Admission::Now => self.render_position(id, &uri, position, kind),
            Admission::Postpone => {
                self.requests.postpone(id.clone(), table_request);
                self.pending.insert(id, PendingRequest::Position { uri, position, kind });
            }
            Admission::Cancel(code, message) => self.out.failure_message(id, code, message),
        }
    }

    fn render_position(&mut self, id: RequestId, uri: &Url, position: Position, kind: PositionKind) {
        let doc = match self.documents.get(uri) {
            Some(doc) => doc,
            None => return self.out.failure_message(id, ErrorCode::ServerError(-32802), "Document is not ready"),
        };
        match kind {
            PositionKind::Hover => self.out.success(id, &actions::hover::handle(doc, position)),
            PositionKind::Completion => self.out.success(id, &actions::completion::handle(doc, position)),
            PositionKind::Definition => self.out.success(id, &actions::definition::handle(doc, position)),
        }
    }

    fn goals_request(&mut self, raw: RawMessage) {
        let r: Request<Goals> = match raw.parse_as_request() {
            Ok(r) => r,
            Err(e) => return self.out.failure(raw.id.clone(), e),
        };
        let uri = r.params.text_document.uri;
        let status = self.document_status(&uri);
        let table_request =
            TableRequest::PositionRequest { uri: uri.clone(), version: r.params.version, postpone: true };
        match classify(&table_request, &status) {
            Admission::Now => self.render_goals(r.id, &uri, r.params.position, r.params.pp_format),
            Admission::Postpone => {
                self.requests.postpone(r.id.clone(), table_request);
                self.pending.insert(
                    r.id,
                    PendingRequest::Goals {
                        uri,
                        position: r.params.position,
                        pp_format: r.params.pp_format,
                    },
                );
            }
            Admission::Cancel(code, message) => self.out.failure_message(r.id, code, message),
        }
    }

    fn render_goals(&mut self, id: RequestId, uri: &Url, position: Position, pp_format: PpFormat) {
        match self.documents.get(uri) {
            Some(doc) => self.out.success(id, &actions::goals::handle(doc, position, pp_format)),
            None => self.out.failure_message(id, ErrorCode::ServerError(-32802), "Document is not ready"),
        }
    }

    fn document_request(&mut self, raw: RawMessage, kind: DocumentKind) {
        let (id, uri) = match kind {
            DocumentKind::Symbols => {
                let r: Request<DocumentSymbolRequest> = match raw.parse_as_request() {
                    Ok(r) => r,
                    Err(e) => return self.out.failure(raw.id.clone(), e),
                };
                (r.id, r.params.text_document.uri)
            }
            DocumentKind::CodeLens => {
                let r: Request<CodeLensRequest> = match raw.parse_as_request() {
                    Ok(r) => r,
                    Err(e) => return self.out.failure(raw.id.clone(), e),
                };
                (r.id, r.params.text_document.uri)
            }
            DocumentKind::GetDocument => {
                let r: Request<GetDocument> = match raw.parse_as_request() {
                    Ok(r) => r,
                    Err(e) => return self.out.failure(raw.id.clone(), e),
                };
                (r.id, r.params.text_document.uri)
            }
            DocumentKind::SaveVo => {
                let r: Request<SaveVo> = match raw.parse_as_request() {
                    Ok(r) => r,
                    Err(e) => return self.out.failure(raw.id.clone(), e),
                };
                (r.id, r.params.text_document.uri)
            }
        };

        let status = self.document_status(&uri);
        let table_request = TableRequest::DocumentRequest { uri: uri.clone() };
        match classify(&table_request, &status) {
            Admission::Now => self.render_document(id, &uri, kind),
            Admission::Postpone => {
                self.requests.postpone(id.clone(), table_request);
                self.pending.insert(id, PendingRequest::Document { uri, kind });
            }
            Admission::Cancel(code, message) => self.out.failure_message(id, code, message),
        }
    }

    fn render_document(&mut self, id: RequestId, uri: &Url, kind: DocumentKind) {
        let doc = match self.documents.get(uri) {
            Some(doc) => doc,
            None => return self.out.failure_message(id, ErrorCode::ServerError(-32802), "Document is not ready"),
        };
        match kind {
            DocumentKind::Symbols => self.out.success(id, &actions::symbols::handle(doc)),
            DocumentKind::CodeLens => self.out.success(id, &actions::code_lens::handle(doc)),
            DocumentKind::GetDocument => self.out.success(id, &actions::document_ops::get_document(doc)),
            DocumentKind::SaveVo => {
                let jobs = &mut self.jobs;
                match actions::document_ops::save_vo(doc, jobs) {
                    Ok(result) => self.out.success(id, &result),
                    Err(e) => self.out.failure_message(id, e.code(), e.message),
                }
            }
        }
    }

    fn document_status(&self, uri: &Url) -> DocumentStatus {
        match self.documents.get(uri) {
            Some(doc) => DocumentStatus { exists: true, done: doc.completion.is_done(), version: doc.version },
            None => DocumentStatus { exists: false, done: false, version: 0 },
        }
    }

    // ----------------------------- stepping -----------------------------

    /// Runs one bounded slice of the most active document's check
    /// continuation, publishing diagnostics and serving any requests that
    /// are now ready. Returns whether there was a document to step.
    pub(crate) fn step(&mut self) -> bool {
        let uri = match self.documents.any_active() {
            Some(uri) => uri,
            None => return false,
        };

        self.documents.step(&uri, &self.prover);

        let (version, diagnostics, done) = match self.documents.get(&uri) {
            Some(doc) => (
                doc.version,
                doc.diagnostics.iter().map(actions::to_lsp_diagnostic).collect::<Vec<_>>(),
                doc.completion.is_done(),
            ),
            None => return true,
        };

        self.out.notify(Notification::<PublishDiagnostics>::new(PublishDiagnosticsParams {
            uri: uri.clone(),
            diagnostics,
            version: Some(version),
        }));

        if done {
            let status = DocumentStatus { exists: true, done: true, version };
            for id in self.requests.drain_ready(&uri, &status) {
                if let Some(pending) = self.pending.remove(&id) {
                    self.serve_pending(id, pending);
                }
            }
        }
        true
    }

    fn serve_pending(&mut self, id: RequestId, pending: PendingRequest) {
        match pending {
            PendingRequest::Position { uri, position, kind } => self.render_position(id, &uri, position, kind),
            PendingRequest::Goals { uri, position, pp_format } => {
                self.render_goals(id, &uri, position, pp_format)
            }
            PendingRequest::Document { uri, kind } => self.render_document(id, &uri, kind),
        }
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.documents.any_active().is_none()
    }
}

fn id_of(raw: &RawMessage) -> RequestId {
    match &raw.id {
        Id::Num(n) => RequestId::Num(*n),
        Id::Str(s) => RequestId::Str(s.clone()),
        Id::Null => RequestId::Num(0),
    }
}

fn root_folders(params: &lsp_types::InitializeParams) -> Vec<PathBuf> {
    if let Some(folders) = &params.workspace_folders {
        folders.iter().filter_map(|f| f.uri.to_file_path().ok()).collect()
    } else if let Some(root_uri) = &params.root_uri {
        root_uri.to_file_path().ok().into_iter().collect()
    } else if let Some(root_path) = &params.root_path {
        vec![PathBuf::from(root_path)]
    } else {
        Vec::new()
    }
}
