//! The JSON-RPC envelope layer: parses a raw frame into a typed `Request<A>`
//! or `Notification<A>`, and serializes either back to the wire.

use std::fmt;
use std::marker::PhantomData;

use jsonrpc_core::{self as jsonrpc, Id};
use log::debug;
use serde::ser::{Serialize, SerializeStruct, Serializer};
use serde::Deserialize;

use crate::lsp_data::{LSPNotification, LSPRequest};
use crate::request_table::RequestId;

/// A request that gets JSON serialized in the language server protocol.
pub struct Request<A: LSPRequest> {
    pub id: RequestId,
    pub params: A::Params,
    pub _action: PhantomData<A>,
}

impl<A: LSPRequest> Request<A> {
    pub fn new(id: RequestId, params: A::Params) -> Request<A> {
        Request { id, params, _action: PhantomData }
    }
}

/// A notification that gets JSON serialized in the language server protocol.
#[derive(Debug, PartialEq)]
pub struct Notification<A: LSPNotification> {
    pub params: A::Params,
    pub _action: PhantomData<A>,
}

impl<A: LSPNotification> Notification<A> {
    pub fn new(params: A::Params) -> Notification<A> {
        Notification { params, _action: PhantomData }
    }
}

impl<A> From<&Request<A>> for RawMessage
where
    A: LSPRequest,
    <A as LSPRequest>::Params: serde::Serialize,
{
    fn from(request: &Request<A>) -> RawMessage {
        let method = <A as LSPRequest>::METHOD.to_owned();
        let params = match serde_json::to_value(&request.params).unwrap() {
            params @ serde_json::Value::Array(_)
            | params @ serde_json::Value::Object(_)
            | params @ serde_json::Value::Null => params,
            _ => unreachable!("bad parameter type found for {:?} request", method),
        };
        RawMessage { method, id: Id::from(&request.id), params }
    }
}

impl<A> From<&Notification<A>> for RawMessage
where
    A: LSPNotification,
    <A as LSPNotification>::Params: serde::Serialize,
{
    fn from(notification: &Notification<A>) -> RawMessage {
        let method = <A as LSPNotification>::METHOD.to_owned();
        let params = match serde_json::to_value(&notification.params).unwrap() {
            params @ serde_json::Value::Array(_)
            | params @ serde_json::Value::Object(_)
            | params @ serde_json::Value::Null => params,
            _ => unreachable!("bad parameter type found for {:?} notification", method),
        };
        RawMessage { method, id: Id::Null, params }
    }
}

impl<A> fmt::Display for Request<A>
where
    A: LSPRequest,
    <A as LSPRequest>::Params: serde::Serialize,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let raw: RawMessage = self.into();
        match serde_json::to_string(&raw) {
            Ok(val) => val.fmt(f),
            Err(_) => Err(fmt::Error),
        }
    }
}

impl<A> fmt::Display for Notification<A>
where
    A: LSPNotification,
    <A as LSPNotification>::Params: serde::Serialize,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let raw: RawMessage = self.into();
        match serde_json::to_string(&raw) {
            Ok(val) => val.fmt(f),
            Err(_) => Err(fmt::Error),
        }
    }
}

/// A JSON-RPC message before it's been matched against a known method.
#[derive(Debug, PartialEq)]
pub struct RawMessage {
    pub method: String,
    pub id: Id,
    pub params: serde_json::Value,
}

impl RawMessage {
    pub fn parse_as_request<'de, R>(&'de self) -> Result<Request<R>, jsonrpc::Error>
    where
        R: LSPRequest,
        <R as LSPRequest>::Params: serde::Deserialize<'de>,
    {
        let parsed_id = match self.id {
            Id::Num(n) => Some(RequestId::Num(n)),
            Id::Str(ref s) => Some(RequestId::Str(s.to_string())),
            Id::Null => None,
        };

        let params = R::Params::deserialize(&self.params)
            .or_else(|e| {
                // Avoid tedious type errors trying to deserialize `()`.
                if std::mem::size_of::<R::Params>() == 0 {
                    R::Params::deserialize(&serde_json::Value::Null).map_err(|_| e)
                } else {
                    Err(e)
                }
            })
            .map_err(|e| {
                debug!("error when parsing as request: {}", e);
                jsonrpc::Error::invalid_params(format!("{}", e))
            })?;

        match parsed_id {
            Some(id) => Ok(Request { id, params, _action: PhantomData }),
            None => Err(jsonrpc::Error::invalid_request()),
        }
    }

    pub fn parse_as_notification<'de, T>(&'de self) -> Result<Notification<T>, jsonrpc::Error>
    where
        T: LSPNotification,
        <T as LSPNotification>::Params: serde::Deserialize<'de>,
    {
        let params = T::Params::deserialize(&self.params).map_err(|e| {
            debug!("error when parsing as notification: {}", e);
            jsonrpc::Error::invalid_params(format!("{}", e))
        })?;

        Ok(Notification { params, _action: PhantomData })
    }

    pub fn try_parse(msg: &str) -> Result<Option<RawMessage>, jsonrpc::Error> {
        let ls_command: serde_json::Value =
            serde_json::from_str(msg).map_err(|_| jsonrpc::Error::parse_error())?;

        let id = ls_command
            .get("id")
            .map_or(Id::Null, |id| serde_json::from_value(id.to_owned()).unwrap());

        let method = match ls_command.get("method") {
            Some(method) => method,
            // No method means this is a response to one of our own requests;
            // we don't issue any, so such a message is simply dropped.
            None => return Ok(None),
        };
        let method = method.as_str().ok_or_else(jsonrpc::Error::invalid_request)?.to_owned();

        let params = match ls_command.get("params").map(ToOwned::to_owned) {
            Some(params @ serde_json::Value::Object(..))
            | Some(params @ serde_json::Value::Array(..)) => params,
            Some(serde_json::Value::Null) | None => serde_json::Value::Null,
            _ => return Err(jsonrpc::Error::invalid_request()),
        };

        Ok(Some(RawMessage { method, id, params }))
    }
}

// Added so we can prepend the extra constant `"jsonrpc": "2.0"` key.
impl Serialize for RawMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let serialize_id = !matches!(self.id, Id::Null);
        let serialize_params = self.params.is_array() || self.params.is_object();

        let len = 2 + if serialize_id { 1 } else { 0 } + if serialize_params { 1 } else { 0 };
        let mut msg = serializer.serialize_struct("RawMessage", len)?;
        msg.serialize_field("jsonrpc", "2.0")?;
        msg.serialize_field("method", &self.method)?;
        if serialize_id {
            msg.serialize_field("id", &self.id)?;
        }
        if serialize_params {
            msg.serialize_field("params", &self.params)?;
        }
        msg.end()
    }
}
