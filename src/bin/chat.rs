//! Terminal chat client.
//!
//! Run with: `cargo run --bin gemini-chat`
//!
//! Plain lines are sent to the active conversation; slash commands manage
//! conversations. Replies are printed as raw markdown.

use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use anyhow::{Context, Result};

use gemini_chat::chat::{ChatSnapshot, ConversationId, SendOutcome};
use gemini_chat::config::ChatConfig;
use gemini_chat::start_gemini_chat;

const HELP: &str = "\
  /new            start a new conversation
  /list           list conversations
  /switch <id>    switch to a conversation
  /delete <id>    delete a conversation
  /help           show this help
  /quit           exit";

/// One parsed input line.
#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Say(&'a str),
    New,
    List,
    Switch(ConversationId),
    Delete(ConversationId),
    Help,
    Quit,
    Invalid(String),
}

fn parse_command(line: &str) -> Command<'_> {
    let trimmed = line.trim();
    let Some(rest) = trimmed.strip_prefix('/') else {
        return Command::Say(line);
    };

    let mut parts = rest.splitn(2, char::is_whitespace);
    let name = parts.next().unwrap_or_default();
    let arg = parts.next().map(str::trim);

    let parse_id = |arg: Option<&str>| match arg.map(str::parse::<ConversationId>) {
        Some(Ok(id)) => Ok(id),
        _ => Err(Command::Invalid(format!("Usage: /{name} <id>"))),
    };

    match name {
        "new" => Command::New,
        "list" => Command::List,
        "switch" => parse_id(arg).map_or_else(|invalid| invalid, Command::Switch),
        "delete" => parse_id(arg).map_or_else(|invalid| invalid, Command::Delete),
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => Command::Invalid(format!("Unknown command: /{other} (try /help)")),
    }
}

fn render_list(snapshot: &ChatSnapshot) {
    println!();
    for conversation in &snapshot.conversations {
        let marker = if conversation.id == snapshot.active_id { "*" } else { " " };
        println!(
            "  {marker} [{}] {} ({} messages)",
            conversation.id,
            conversation.title,
            conversation.messages.len()
        );
    }
    println!();
}

fn render_active(snapshot: &ChatSnapshot) {
    let Some(conversation) = snapshot.active() else {
        return;
    };
    println!();
    println!("  ── {} ──", conversation.title);
    if conversation.messages.is_empty() {
        println!("  Start the conversation by typing below.");
    }
    for message in &conversation.messages {
        println!("  {}: {}", message.role, message.text);
    }
    println!();
}

fn prompt(label: &str) -> Result<Option<String>> {
    print!("{label}");
    io::stdout().flush()?;
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

fn confirm(question: &str) -> Result<bool> {
    let answer = prompt(&format!("  {question} [y/N] "))?.unwrap_or_default();
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

async fn run_repl() -> Result<()> {
    let config = ChatConfig::from_env().context("invalid configuration")?;
    let orchestrator = start_gemini_chat::build_orchestrator(&config)
        .await
        .context("failed to start chat core")?;
    let store = orchestrator.store();

    println!();
    println!("  Gemini chat ({}) - /help for commands", config.gemini.model);
    let snapshot = store.lock().await.snapshot();
    render_list(&snapshot);

    while let Some(line) = prompt("> ")? {
        match parse_command(&line) {
            Command::Say(text) => match orchestrator.send_active(text).await {
                Ok(SendOutcome::Replied(reply)) => println!("\n{reply}\n"),
                Ok(SendOutcome::EmptyInput) => {}
                Ok(SendOutcome::Busy) => println!("  Still waiting for the previous reply."),
                Err(e) => println!("  {e}"),
            },
            Command::New => {
                let id = store.lock().await.create_conversation().await;
                println!("  Started conversation {id}");
            }
            Command::List => {
                let snapshot = store.lock().await.snapshot();
                render_list(&snapshot);
            }
            Command::Switch(id) => {
                let selected = store.lock().await.select_conversation(id);
                match selected {
                    Ok(()) => {
                        let snapshot = store.lock().await.snapshot();
                        render_active(&snapshot);
                    }
                    Err(e) => println!("  {e}"),
                }
            }
            Command::Delete(id) => {
                if confirm(&format!("Delete conversation {id}?"))? {
                    store.lock().await.delete_conversation(id).await;
                    let snapshot = store.lock().await.snapshot();
                    render_list(&snapshot);
                }
            }
            Command::Help => println!("{HELP}"),
            Command::Quit => break,
            Command::Invalid(message) => println!("  {message}"),
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    start_gemini_chat::init_tracing();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("  Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    if let Err(e) = rt.block_on(run_repl()) {
        eprintln!("  Error: {e:#}");
        return ExitCode::from(1);
    }

    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_sent_verbatim() {
        assert_eq!(parse_command("  hello /there "), Command::Say("  hello /there "));
    }

    #[test]
    fn test_slash_commands() {
        assert_eq!(parse_command("/new"), Command::New);
        assert_eq!(parse_command("/list"), Command::List);
        assert_eq!(parse_command("/switch 3"), Command::Switch(ConversationId(3)));
        assert_eq!(parse_command(" /delete  12 "), Command::Delete(ConversationId(12)));
        assert_eq!(parse_command("/exit"), Command::Quit);
    }

    #[test]
    fn test_bad_commands() {
        assert_eq!(
            parse_command("/switch abc"),
            Command::Invalid("Usage: /switch <id>".to_string())
        );
        assert!(matches!(parse_command("/delete"), Command::Invalid(_)));
        assert!(matches!(parse_command("/frobnicate"), Command::Invalid(_)));
    }
}
