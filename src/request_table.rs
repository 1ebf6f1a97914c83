//! Request Table (§4.E): tracks in-flight and postponed requests and
//! implements every cancellation path.

use std::collections::HashMap;
use std::fmt;

use jsonrpc_core::types::{ErrorCode, Id};
use log::{info, warn};
use url::Url;

/// A JSON-RPC request id as carried internally, distinct from
/// `jsonrpc_core::Id` so it can be used as a `HashMap` key directly.
#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub enum RequestId {
    Str(String),
    Num(u64),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Str(s) => write!(f, "\"{}\"", s),
            RequestId::Num(n) => write!(f, "{}", n),
        }
    }
}

impl From<&RequestId> for Id {
    fn from(id: &RequestId) -> Self {
        match id {
            RequestId::Str(s) => Id::Str(s.clone()),
            RequestId::Num(n) => Id::Num(*n),
        }
    }
}

/// A request's shape, as classified by the Message Loop before admission.
#[derive(Debug, Clone)]
pub enum Request {
    /// Targets a cursor position; may or may not require the document to be
    /// fully checked, and may name the version it was issued against.
    PositionRequest { uri: Url, version: Option<i64>, postpone: bool },
    /// Requires `completion = Done` before it can be served.
    DocumentRequest { uri: Url },
}

impl Request {
    fn uri(&self) -> &Url {
        match self {
            Request::PositionRequest { uri, .. } => uri,
            Request::DocumentRequest { uri } => uri,
        }
    }
}

/// What the Message Loop should do with a request it just tried to admit.
pub enum Admission {
    /// Serve it against the document right away.
    Now,
    /// Hold it in the postponement table until the document catches up.
    Postpone,
    /// Answer immediately with this error.
    Cancel(ErrorCode, &'static str),
}

/// Whether a document is ready to serve a `DocumentRequest`, and (for
/// `PositionRequest`) what its current version is. The Message Loop reads
/// this from the Document Manager; the Request Table itself holds no
/// document state.
pub struct DocumentStatus {
    pub exists: bool,
    pub done: bool,
    pub version: i64,
}

/// Classifies a request per §4.E's `admit` rules. Does not mutate the table;
/// callers follow up with `postpone` when this returns `Admission::Postpone`.
pub fn classify(req: &Request, status: &DocumentStatus) -> Admission {
    match req {
        Request::DocumentRequest { .. } => {
            if !status.exists {
                Admission::Cancel(ErrorCode::ServerError(-32802), "Document is not ready")
            } else if status.done {
                Admission::Now
            } else {
                Admission::Postpone
            }
        }
        Request::PositionRequest { postpone: false, .. } => Admission::Now,
        Request::PositionRequest { postpone: true, version, .. } => {
            if !status.exists {
                Admission::Cancel(ErrorCode::ServerError(-32802), "Document is not ready")
            } else {
                match version {
                    Some(v) if *v < status.version => {
                        Admission::Cancel(ErrorCode::ServerError(-32802), "Request got old in server")
                    }
                    Some(v) if *v == status.version && status.done => Admission::Now,
                    None if status.done => Admission::Now,
                    _ => Admission::Postpone,
                }
            }
        }
    }
}

/// An error response ready to be written by the Wire Framer.
#[derive(Debug, PartialEq)]
pub struct ErrorReply {
    pub id: RequestId,
    pub code: ErrorCode,
    pub message: String,
}

/// Tracks postponed requests, keyed by the client-assigned JSON-RPC id.
#[derive(Default)]
pub struct RequestTable {
    postponed: HashMap<RequestId, Request>,
}

impl RequestTable {
    pub fn new() -> Self {
        RequestTable { postponed: HashMap::new() }
    }

    /// Records that `id` couldn't be served yet.
    pub fn postpone(&mut self, id: RequestId, request: Request) {
        self.postponed.insert(id, request);
    }

    /// Removes `id` if present and, unless it had already been answered,
    /// produces the error response to send. `cancel` is idempotent: an
    /// unknown id is logged and treated as a no-op for the reply (the
    /// caller should still not double-reply an id it already served).
    pub fn cancel(&mut self, id: RequestId, code: ErrorCode, message: &str) -> Option<ErrorReply> {
        match self.postponed.remove(&id) {
            Some(_) => Some(ErrorReply { id, code, message: message.to_owned() }),
            None => {
                info!("cancel requested for unknown or already-served id {}", id);
                None
            }
        }
    }

    /// Client-initiated cancellation (`$/cancelRequest`).
    pub fn cancel_by_client(&mut self, id: RequestId) -> Option<ErrorReply> {
        self.cancel(id, ErrorCode::ServerError(-32800), "Cancelled by client")
    }

    /// Invalidates every postponed request against `uri`, as required after
    /// a `change` or `close` on that document.
    pub fn invalidate_uri(&mut self, uri: &Url) -> Vec<ErrorReply> {
        let stale: Vec<RequestId> = self
            .postponed
            .iter()
            .filter(|(_, req)| req.uri() == uri)
            .map(|(id, _)| id.clone())
            .collect();
        stale
            .into_iter()
            .filter_map(|id| self.cancel(id, ErrorCode::ServerError(-32802), "Request got old in server"))
            .collect()
    }

    /// Cancels every postponed request, used when the server enters
    /// `ShuttingDown`.
    pub fn cancel_all(&mut self) -> Vec<ErrorReply> {
        let ids: Vec<RequestId> = self.postponed.keys().cloned().collect();
        ids.into_iter()
            .filter_map(|id| self.cancel(id, ErrorCode::ServerError(-32097), "Server shutting down"))
            .collect()
    }

    /// Called once `uri` reaches `Done` (or otherwise becomes servable).
    /// Returns the ids that are now ready, removing them from the
    /// postponement table; the Scheduler serves each.
    pub fn drain_ready(&mut self, uri: &Url, status: &DocumentStatus) -> Vec<RequestId> {
        let candidates: Vec<RequestId> = self
            .postponed
            .iter()
            .filter(|(_, req)| req.uri() == uri)
            .map(|(id, _)| id.clone())
            .collect();

        let mut ready = Vec::new();
        for id in candidates {
            let req = self.postponed.get(&id).expect("id just collected from the same map");
            let admission = classify(req, status);
            if matches!(admission, Admission::Now) {
                self.postponed.remove(&id);
                ready.push(id);
            }
        }
        if !ready.is_empty() {
            warn!("served {} postponed request(s) now that {} is ready", ready.len(), uri);
        }
        ready
    }

    pub fn is_postponed(&self, id: &RequestId) -> bool {
        self.postponed.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.postponed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postponed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(path: &str) -> Url {
        Url::from_file_path(path).unwrap()
    }

    fn done(version: i64) -> DocumentStatus {
        DocumentStatus { exists: true, done: true, version }
    }

    fn not_done(version: i64) -> DocumentStatus {
        DocumentStatus { exists: true, done: false, version }
    }

    fn missing() -> DocumentStatus {
        DocumentStatus { exists: false, done: false, version: 0 }
    }

    #[test]
    fn document_request_on_done_document_is_now() {
        let req = Request::DocumentRequest { uri: uri("/a.v") };
        assert!(matches!(classify(&req, &done(1)), Admission::Now));
    }

    #[test]
    fn document_request_on_unfinished_document_postpones() {
        let req = Request::DocumentRequest { uri: uri("/a.v") };
        assert!(matches!(classify(&req, &not_done(1)), Admission::Postpone));
    }

    #[test]
    fn document_request_on_missing_document_is_cancelled() {
        let req = Request::DocumentRequest { uri: uri("/a.v") };
        assert!(matches!(classify(&req, &missing()), Admission::Cancel(..)));
    }

    #[test]
    fn non_postponable_position_request_is_always_now() {
        let req = Request::PositionRequest { uri: uri("/a.v"), version: None, postpone: false };
        assert!(matches!(classify(&req, &not_done(1)), Admission::Now));
    }

    #[test]
    fn postponable_position_request_with_stale_version_is_cancelled() {
        let req = Request::PositionRequest { uri: uri("/a.v"), version: Some(1), postpone: true };
        assert!(matches!(classify(&req, &done(2)), Admission::Cancel(..)));
    }

    #[test]
    fn postponable_position_request_with_current_done_version_is_now() {
        let req = Request::PositionRequest { uri: uri("/a.v"), version: Some(2), postpone: true };
        assert!(matches!(classify(&req, &done(2)), Admission::Now));
    }

    #[test]
    fn postponable_position_request_with_current_but_unchecked_version_postpones() {
        let req = Request::PositionRequest { uri: uri("/a.v"), version: Some(2), postpone: true };
        assert!(matches!(classify(&req, &not_done(2)), Admission::Postpone));
    }

    #[test]
    fn cancel_by_client_returns_a_minus_32800_reply() {
        let mut table = RequestTable::new();
        let id = RequestId::Num(1);
        table.postpone(id.clone(), Request::DocumentRequest { uri: uri("/a.v") });

        let reply = table.cancel_by_client(id.clone()).unwrap();
        assert_eq!(reply.id, id);
        assert_eq!(reply.code, ErrorCode::ServerError(-32800));
        assert!(!table.is_postponed(&id));
    }

    #[test]
    fn cancel_unknown_id_is_a_no_op() {
        let mut table = RequestTable::new();
        assert!(table.cancel_by_client(RequestId::Num(99)).is_none());
    }

    #[test]
    fn invalidate_uri_only_affects_matching_requests() {
        let mut table = RequestTable::new();
        table.postpone(RequestId::Num(1), Request::DocumentRequest { uri: uri("/a.v") });
        table.postpone(RequestId::Num(2), Request::DocumentRequest { uri: uri("/b.v") });

        let replies = table.invalidate_uri(&uri("/a.v"));
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].id, RequestId::Num(1));
        assert!(table.is_postponed(&RequestId::Num(2)));
    }

    #[test]
    fn cancel_all_drains_every_postponed_request() {
        let mut table = RequestTable::new();
        table.postpone(RequestId::Num(1), Request::DocumentRequest { uri: uri("/a.v") });
        table.postpone(RequestId::Num(2), Request::DocumentRequest { uri: uri("/b.v") });

        let replies = table.cancel_all();
        assert_eq!(replies.len(), 2);
        assert!(table.is_empty());
        assert!(replies.iter().all(|r| r.code == ErrorCode::ServerError(-32097)));
    }

    #[test]
    fn drain_ready_only_releases_requests_that_now_classify_as_now() {
        let mut table = RequestTable::new();
        table.postpone(
            RequestId::Num(1),
            Request::PositionRequest { uri: uri("/a.v"), version: Some(3), postpone: true },
        );
        table.postpone(
            RequestId::Num(2),
            Request::PositionRequest { uri: uri("/a.v"), version: Some(5), postpone: true },
        );

        let ready = table.drain_ready(&uri("/a.v"), &done(3));
        assert_eq!(ready, vec![RequestId::Num(1)], "only the request matching the current version releases");
        assert!(!table.is_postponed(&RequestId::Num(1)));
        assert!(table.is_postponed(&RequestId::Num(2)));

        let ready = table.drain_ready(&uri("/a.v"), &done(5));
        assert_eq!(ready, vec![RequestId::Num(2)]);
        assert!(table.is_empty());
    }
}
