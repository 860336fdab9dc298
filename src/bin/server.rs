//! Chat server binary: REST API plus static frontend.
//! Run with: cargo run --bin gemini-chat-server

use std::process::ExitCode;

use gemini_chat::start_gemini_chat;

fn main() -> ExitCode {
    start_gemini_chat::run()
}
