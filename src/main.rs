//! The meow Language Server.
//!
//! Starts an LSP server speaking to the client over stdio. No CLI beyond
//! `--version`/`--help` is supported; configuration arrives entirely through
//! the `initialize` request and `workspace/didChangeConfiguration`.

use std::env;

/// The main entry point to the server. Parses the tiny set of supported
/// flags and then runs the message loop.
pub fn main() {
    let exit_code = main_inner();
    std::process::exit(exit_code);
}

fn main_inner() -> i32 {
    env_logger::init();

    if let Some(first_arg) = env::args().nth(1) {
        return match first_arg.as_str() {
            "--version" | "-V" => {
                println!("{}", meow_lsp::version());
                0
            }
            "--help" | "-h" => {
                println!("{}", help());
                0
            }
            unknown => {
                println!("Unknown argument '{}'. Supported arguments:\n{}", unknown, help());
                101
            }
        };
    }

    meow_lsp::server::run_server()
}

fn help() -> &'static str {
    r#"
    --version or -V to print the version
    --help or -h for this message
    No input starts the server as a language server speaking LSP over stdio
    "#
}
