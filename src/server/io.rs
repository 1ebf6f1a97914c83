//! Wire Framer (§4.A): reads and writes LSP's `Content-Length`-delimited
//! frames over any byte stream, not just stdio, so tests can drive the
//! coordinator over an in-memory transport.

use log::{debug, trace};

use super::Notification;
use crate::lsp_data::LSPNotification;
use crate::request_table::RequestId;

use std::fmt;
use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use jsonrpc_core::{self as jsonrpc, response, version, Id};

/// Anything that can read framed language server input messages.
pub trait MessageReader {
    /// Reads the next input message, or `None` on a clean EOF.
    fn read_message(&mut self) -> Option<String>;
}

/// Reads framed messages from any `BufRead`, e.g. stdin or the reader half
/// of an in-memory duplex pipe used in tests.
pub struct FramedMessageReader<R> {
    input: R,
}

impl<R: BufRead> FramedMessageReader<R> {
    pub fn new(input: R) -> Self {
        FramedMessageReader { input }
    }
}

impl<R: BufRead> MessageReader for FramedMessageReader<R> {
    fn read_message(&mut self) -> Option<String> {
        match read_message(&mut self.input) {
            Ok(message) => Some(message),
            Err(err) => {
                debug!("{:?}", err);
                None
            }
        }
    }
}

/// A message reader that gets messages from `stdin`.
pub struct StdioMsgReader {
    stdin: io::Stdin,
}

impl StdioMsgReader {
    pub fn new() -> Self {
        StdioMsgReader { stdin: io::stdin() }
    }
}

impl MessageReader for StdioMsgReader {
    fn read_message(&mut self) -> Option<String> {
        let mut locked = self.stdin.lock();
        match read_message(&mut locked) {
            Ok(message) => Some(message),
            Err(err) => {
                debug!("{:?}", err);
                None
            }
        }
    }
}

// Reads the content of the next message from the given input, per LSP's
// "Base Protocol": an ASCII header block terminated by CRLFCRLF, at least a
// `Content-Length` header, followed by exactly that many UTF-8 bytes.
fn read_message<R: BufRead>(input: &mut R) -> Result<String, io::Error> {
    let mut size: Option<usize> = None;
    loop {
        let mut buffer = String::new();
        input.read_line(&mut buffer)?;

        if buffer.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "EOF encountered in the middle of reading LSP headers",
            ));
        }

        if buffer == "\r\n" {
            break;
        }

        let res: Vec<&str> = buffer.split(' ').collect();
        if res.len() != 2 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Header '{}' is malformed", buffer),
            ));
        }
        let header_name = res[0].to_lowercase();
        let header_value = res[1].trim();

        match header_name.as_ref() {
            "content-length:" => {
                size = Some(header_value.parse().map_err(|_e| {
                    io::Error::new(io::ErrorKind::InvalidData, "Couldn't read size")
                })?);
            }
            "content-type:" => {
                if header_value != "utf8" && header_value != "utf-8" {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("Content type '{}' is invalid", header_value),
                    ));
                }
            }
            // Ignore unknown headers (the spec doesn't say what to do here).
            _ => (),
        }
    }
    let size = match size {
        Some(size) => size,
        None => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Message is missing 'content-length' header",
            ));
        }
    };
    trace!("reading: {:?} bytes", size);

    let mut content = vec![0; size];
    input.read_exact(&mut content)?;

    String::from_utf8(content).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Anything that can send notifications and responses to a language server client.
pub trait Output: Sync + Send + Clone + 'static {
    /// Sends a response string along the output.
    fn response(&self, output: String);

    /// Gets a new unique ID, for server-initiated requests.
    fn provide_id(&self) -> RequestId;

    /// Notifies the client of a failure.
    fn failure(&self, id: jsonrpc::Id, error: jsonrpc::Error) {
        let response = response::Failure { jsonrpc: Some(version::Version::V2), id, error };
        self.response(serde_json::to_string(&response).unwrap());
    }

    /// Notifies the client of a failure with the given diagnostic message.
    fn failure_message<M: Into<String>>(&self, id: RequestId, code: jsonrpc::ErrorCode, msg: M) {
        let error = jsonrpc::Error { code, message: msg.into(), data: None };
        self.failure(Id::from(&id), error);
    }

    /// Sends a successful response along the output.
    fn success<D: ::serde::Serialize + fmt::Debug>(&self, id: RequestId, data: &D) {
        let data = match serde_json::to_string(data) {
            Ok(data) => data,
            Err(e) => {
                debug!("could not serialize success response data: {:?} ({:?})", data, e);
                return;
            }
        };
        let output = format!("{{\"jsonrpc\":\"2.0\",\"id\":{},\"result\":{}}}", id, data);
        self.response(output);
    }

    /// Sends a notification along the output.
    fn notify<A>(&self, notification: Notification<A>)
    where
        A: LSPNotification,
        <A as LSPNotification>::Params: serde::Serialize,
    {
        self.response(format!("{}", notification));
    }
}

/// An output that writes framed responses to any `Write`, e.g. stdout or the
/// writer half of an in-memory duplex pipe used in tests.
#[derive(Clone)]
pub struct FramedOutput<W> {
    sink: Arc<Mutex<W>>,
    next_id: Arc<AtomicU64>,
}

impl<W: Write> FramedOutput<W> {
    pub fn new(sink: W) -> Self {
        FramedOutput { sink: Arc::new(Mutex::new(sink)), next_id: Arc::new(AtomicU64::new(1)) }
    }
}

impl<W: Write + Send + 'static> Output for FramedOutput<W> {
    fn response(&self, output: String) {
        let framed = format!("Content-Length: {}\r\n\r\n{}", output.len(), output);
        trace!("response: {:?}", framed);
        let mut sink = self.sink.lock().unwrap();
        write!(sink, "{}", framed).unwrap();
        sink.flush().unwrap();
    }

    fn provide_id(&self) -> RequestId {
        RequestId::Num(self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

/// An output that sends notifications and responses on `stdout`.
pub type StdioOutput = FramedOutput<io::Stdout>;

pub fn stdio_output() -> StdioOutput {
    FramedOutput::new(io::stdout())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_message_returns_message_from_valid_lsp_input() {
        let mut input = io::Cursor::new("Content-Length: 7\r\n\r\nMessage");
        let message = read_message(&mut input).expect("valid input should succeed");
        assert_eq!(message, "Message");
    }

    #[test]
    fn read_message_fails_on_empty_input() {
        let mut input = io::Cursor::new("");
        read_message(&mut input).expect_err("empty input should cause failure");
    }

    #[test]
    fn read_message_returns_message_from_input_with_multiple_headers() {
        let mut input =
            io::Cursor::new("Content-Type: utf-8\r\nContent-Length: 12\r\n\r\nSome Message");
        let message = read_message(&mut input).expect("valid input should succeed");
        assert_eq!(message, "Some Message");
    }

    #[test]
    fn read_message_returns_message_from_input_with_unknown_headers() {
        let mut input =
            io::Cursor::new("Unknown-Header: value\r\nContent-Length: 12\r\n\r\nSome Message");
        let message = read_message(&mut input).expect("valid input should succeed");
        assert_eq!(message, "Some Message");
    }

    #[test]
    fn read_message_fails_when_length_header_is_missing() {
        let mut input = io::Cursor::new("Content-Type: utf8\r\n\r\nSome Message");
        read_message(&mut input).expect_err("missing length header should fail");
    }

    #[test]
    fn read_message_fails_when_content_type_is_invalid() {
        let mut input =
            io::Cursor::new("Content-Length: 12\r\nContent-Type: invalid\r\n\r\nSome Message");
        read_message(&mut input).expect_err("invalid content type should fail");
    }

    #[test]
    fn read_message_fails_when_header_line_is_invalid() {
        let mut input = io::Cursor::new("Invalid-Header\r\nContent-Length: 12\r\n\r\nSome Message");
        read_message(&mut input).expect_err("invalid header should fail");
    }

    #[test]
    fn read_message_fails_when_length_is_not_numeric() {
        let mut input = io::Cursor::new("Content-Length: abcd\r\n\r\nMessage");
        read_message(&mut input).expect_err("non-numeric length should fail");
    }

    #[test]
    fn read_message_fails_when_content_is_not_valid_utf8() {
        let mut input = io::Cursor::new(&b"Content-Length: 7\r\n\r\n\x82\xe6\x82\xa8\x82\xb1\x82"[..]);
        read_message(&mut input).expect_err("invalid utf8 content should fail");
    }

    #[test]
    fn read_message_fails_when_input_contains_only_header() {
        let mut input = io::Cursor::new(&b"Content-Length: 7\r\n"[..]);
        read_message(&mut input).expect_err("truncated input should fail");
    }

    #[test]
    fn framed_message_reader_reads_two_messages_back_to_back() {
        let data = "Content-Length: 5\r\n\r\nhelloContent-Length: 5\r\n\r\nworld";
        let mut reader = FramedMessageReader::new(io::Cursor::new(data));
        assert_eq!(reader.read_message().as_deref(), Some("hello"));
        assert_eq!(reader.read_message().as_deref(), Some("world"));
        assert_eq!(reader.read_message(), None);
    }

    #[test]
    fn framed_output_writes_a_content_length_header() {
        let buf: Vec<u8> = Vec::new();
        let output = FramedOutput::new(buf);
        output.response("{}".to_owned());
        let written = output.sink.lock().unwrap().clone();
        assert_eq!(String::from_utf8(written).unwrap(), "Content-Length: 2\r\n\r\n{}");
    }

    #[test]
    fn provide_id_yields_increasing_numeric_ids() {
        let output = FramedOutput::new(Vec::new());
        assert_eq!(output.provide_id(), RequestId::Num(1));
        assert_eq!(output.provide_id(), RequestId::Num(2));
    }
}
