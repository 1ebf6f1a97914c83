//! The server loop: wires the Wire Framer, the Scheduler (`dispatch::Coordinator`)
//! and the reader/worker split described by the concurrency model together into
//! a running process.
//!
//! There are exactly two contexts (§5): a *reader*, blocking on stdin and
//! pushing framed text onto the Message Queue, and a *worker*, which drains
//! that queue and interleaves handler dispatch with prover stepping. The
//! reader sets the Interrupt Flag on every push so that an in-progress prover
//! step unwinds promptly and the worker gets a chance to observe the new
//! message.

use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, RecvTimeoutError, TryRecvError};
use log::debug;
use lsp_types::{
    CodeLensOptions, CompletionOptions, InitializeResult, ServerCapabilities,
    TextDocumentSyncCapability, TextDocumentSyncKind,
};

use crate::prover::ReferenceProver;
use crate::server::dispatch::{ControlFlow, Coordinator};
use crate::server::io::{stdio_output, MessageReader, StdioMsgReader};

mod dispatch;
mod io;
mod message;

/// How long the worker blocks on the Message Queue when there is no active
/// document to step, so it neither busy-waits nor stalls forever past a
/// reader disconnect.
const IDLE_POLL: Duration = Duration::from_millis(50);

/// Runs the meow Language Server until `exit` (or EOF), returning the process
/// exit code (0 iff a `shutdown` request preceded it, else 1; 101 if the
/// reader context disappears without either).
pub fn run_server() -> i32 {
    debug!("meow-lsp starting up. Version: {}", crate::version());

    let prover = ReferenceProver::new();
    let out = stdio_output();
    let cmdline: Vec<String> = std::env::args().skip(1).collect();
    let mut coordinator = Coordinator::new(prover, out, cmdline);

    let interrupt_flag = coordinator.interrupt_flag();
    let (sender, receiver) = unbounded::<String>();

    thread::spawn(move || {
        let mut reader = StdioMsgReader::new();
        while let Some(msg) = reader.read_message() {
            interrupt_flag.store(true, Ordering::SeqCst);
            if sender.send(msg).is_err() {
                break;
            }
        }
    });

    loop {
        match receiver.try_recv() {
            Ok(msg) => match coordinator.handle_raw(&msg) {
                ControlFlow::Continue => continue,
                ControlFlow::Exit(code) => return code,
            },
            Err(TryRecvError::Disconnected) => return 101,
            Err(TryRecvError::Empty) => {}
        }

        coordinator.interrupt_flag().store(false, Ordering::SeqCst);

        if coordinator.is_idle() {
            match receiver.recv_timeout(IDLE_POLL) {
                Ok(msg) => match coordinator.handle_raw(&msg) {
                    ControlFlow::Continue => {}
                    ControlFlow::Exit(code) => return code,
                },
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return 101,
            }
        } else {
            coordinator.step();
        }
    }
}

/// The capabilities this crate actually answers; pared down from the
/// teacher's fuller `server_caps` to only what `dispatch::Coordinator`'s
/// handler registry implements.
pub(crate) fn initialize_result() -> InitializeResult {
    InitializeResult {
        capabilities: ServerCapabilities {
            text_document_sync: Some(TextDocumentSyncCapability::Kind(TextDocumentSyncKind::Full)),
            hover_provider: Some(true),
            completion_provider: Some(CompletionOptions {
                resolve_provider: Some(false),
                trigger_characters: Some(vec![".".to_string()]),
            }),
            definition_provider: Some(true),
            type_definition_provider: None,
            implementation_provider: None,
            references_provider: None,
            document_highlight_provider: None,
            document_symbol_provider: Some(true),
            workspace_symbol_provider: None,
            code_action_provider: None,
            document_formatting_provider: None,
            execute_command_provider: None,
            rename_provider: None,
            color_provider: None,
            document_range_formatting_provider: None,
            code_lens_provider: Some(CodeLensOptions { resolve_provider: Some(false) }),
            document_on_type_formatting_provider: None,
            signature_help_provider: None,
            folding_range_provider: None,
            workspace: None,
            selection_range_provider: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialize_result_advertises_full_sync() {
        let result = initialize_result();
        assert!(matches!(
            result.capabilities.text_document_sync,
            Some(TextDocumentSyncCapability::Kind(TextDocumentSyncKind::Full))
        ));
        assert_eq!(result.capabilities.hover_provider, Some(true));
    }
}
