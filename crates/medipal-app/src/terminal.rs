//! Line-based terminal front end.
//!
//! Reads one message per line, ignores blank lines and prints the reply as
//! it streams in. `/clear` forgets the conversation and `/quit` exits.

use std::io::Write;

use tokio::io::{AsyncBufReadExt, BufReader};

use medipal_chat::SessionManager;
use medipal_core::types::{ChatState, Role};

/// One parsed input line.
#[derive(Debug, PartialEq, Eq)]
pub enum Input<'a> {
    Blank,
    Clear,
    Quit,
    Message(&'a str),
}

impl<'a> Input<'a> {
    pub fn parse(line: &'a str) -> Self {
        match line.trim() {
            "" => Input::Blank,
            "/clear" => Input::Clear,
            "/quit" | "/exit" => Input::Quit,
            text => Input::Message(text),
        }
    }
}

/// Tracks how much of the streaming reply has been written out.
///
/// The reply is the BOT message that follows the user message at `base`.
#[derive(Debug)]
pub struct ReplyPrinter {
    base: usize,
    printed: usize,
}

impl ReplyPrinter {
    /// `history_len` is the history length before the message was sent.
    pub fn new(history_len: usize) -> Self {
        Self {
            base: history_len,
            printed: 0,
        }
    }

    /// Text of the reply not yet printed.
    pub fn unprinted<'s>(&mut self, state: &'s ChatState) -> Option<&'s str> {
        let reply = state
            .history
            .get(self.base + 1)
            .filter(|m| m.role == Role::Bot)?;
        let rest = reply.text.get(self.printed..)?;
        if rest.is_empty() {
            return None;
        }
        self.printed = reply.text.len();
        Some(rest)
    }

    pub fn printed_any(&self) -> bool {
        self.printed > 0
    }
}

/// Run the REPL until `/quit` or end of input.
pub async fn run(manager: &SessionManager) -> std::io::Result<()> {
    let state = manager.state();
    println!("MediPal - type a message, /clear to start over, /quit to exit.");
    for message in &state.history {
        let who = match message.role {
            Role::User => "you",
            Role::Bot => "medipal",
        };
        println!("{}> {}", who, message.text);
    }
    if let Some(error) = state.error {
        eprintln!("! {}", error);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("you> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };

        match Input::parse(&line) {
            Input::Blank => continue,
            Input::Quit => break,
            Input::Clear => {
                manager.clear_chat();
                println!("(conversation cleared)");
                if let Some(error) = manager.state().error {
                    eprintln!("! {}", error);
                }
            }
            Input::Message(text) => exchange(manager, text).await?,
        }
    }

    Ok(())
}

async fn exchange(manager: &SessionManager, text: &str) -> std::io::Result<()> {
    let mut rx = manager.subscribe();
    let mut printer = ReplyPrinter::new(rx.borrow_and_update().history.len());
    let mut stdout = std::io::stdout();

    let send = manager.send_message(text);
    tokio::pin!(send);

    print!("medipal> ");
    let result = loop {
        tokio::select! {
            result = &mut send => break result,
            changed = rx.changed() => {
                if changed.is_err() {
                    break (&mut send).await;
                }
                let state = rx.borrow_and_update().clone();
                if let Some(chunk) = printer.unprinted(&state) {
                    write!(stdout, "{}", chunk)?;
                    stdout.flush()?;
                }
            }
        }
    };

    let state = manager.state();
    if let Some(chunk) = printer.unprinted(&state) {
        write!(stdout, "{}", chunk)?;
    }
    println!();

    if let Err(e) = result {
        if printer.printed_any() {
            eprintln!("! (the reply above was discarded)");
        }
        eprintln!("! {}", e);
    }
    Ok(())
}
