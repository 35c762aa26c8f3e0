//! Interactive terminal chat.

use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use stockchat_client::{ChatEvent, ConnectionState, SessionController};
use stockchat_core::constants::is_interim;
use stockchat_core::{ConversationId, ConversationSummary, Message, MessageKind};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

pub const HELP: &str = "\
commands:
  <text>            send a message
  /yes, /no         answer the pending trade confirmation
  /new              start a new conversation
  /list             list recent conversations
  /history          reload the newest messages
  /more             load older messages
  /rename <title>   rename the current conversation
  /delete <id>      delete a conversation
  /open <id>        switch to a conversation
  /help             show this help
  /quit             exit";

/// One line of user input.
#[derive(Debug, PartialEq, Eq)]
pub enum Input {
    Send(String),
    Answer(bool),
    New,
    List,
    History,
    More,
    Rename(String),
    Delete(ConversationId),
    Open(ConversationId),
    Help,
    Quit,
    Empty,
    Invalid(String),
}

pub fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Input::Send(line.to_owned());
    };
    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    };
    match (name, arg) {
        ("yes" | "y", "") => Input::Answer(true),
        ("no" | "n", "") => Input::Answer(false),
        ("new", "") => Input::New,
        ("list", "") => Input::List,
        ("history", "") => Input::History,
        ("more", "") => Input::More,
        ("help" | "?", "") => Input::Help,
        ("quit" | "exit" | "q", "") => Input::Quit,
        ("rename", title) if !title.is_empty() => Input::Rename(title.to_owned()),
        ("delete", id) if !id.is_empty() => Input::Delete(ConversationId::from(id)),
        ("open", id) if !id.is_empty() => Input::Open(ConversationId::from(id)),
        ("rename", _) => Input::Invalid("usage: /rename <title>".into()),
        ("delete" | "open", _) => Input::Invalid(format!("usage: /{name} <conversation id>")),
        _ => Input::Invalid(format!("unknown command /{name}, try /help")),
    }
}

pub fn render_message(message: &Message) -> String {
    let mut out = match (message.kind, message.is_pending_question()) {
        (MessageKind::User, _) => format!("you › {}", message.content),
        (MessageKind::Assistant, true) => format!("bot ? {}  (/yes or /no)", message.content),
        (MessageKind::Assistant, false) => format!("bot › {}", message.content),
    };
    if let Some(error) = &message.error {
        out.push_str(&format!("\n      [error: {error}]"));
    }
    if let Some(subgraph) = message.subgraph.as_ref().filter(|g| !g.node.is_empty()) {
        let names: Vec<_> = subgraph.node.iter().map(|n| n.node_name.as_str()).collect();
        out.push_str(&format!("\n      [graph: {}]", names.join(", ")));
    }
    out
}

pub fn render_summary(summary: &ConversationSummary, current: Option<&ConversationId>) -> String {
    let marker = if current == Some(&summary.id) { '*' } else { ' ' };
    let preview = summary.preview.as_deref().unwrap_or("");
    format!(
        "{marker} {}  {}  ({} messages)  {preview}",
        summary.id, summary.title, summary.message_count
    )
}

/// Prints streamed chunks as they arrive and assistant messages once
/// complete.
fn spawn_printer(mut events: broadcast::Receiver<ChatEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut streaming = false;
        loop {
            match events.recv().await {
                Ok(ChatEvent::Chunk(text)) if is_interim(&text) => println!("  … {text}"),
                Ok(ChatEvent::Chunk(text)) => {
                    if !streaming {
                        print!("bot › ");
                        streaming = true;
                    }
                    print!("{text}");
                    let _ = std::io::stdout().flush();
                }
                Ok(ChatEvent::Message(message)) => {
                    if streaming && message.kind == MessageKind::Assistant {
                        println!();
                        streaming = false;
                        if let Some(error) = &message.error {
                            println!("      [error: {error}]");
                        }
                    } else if message.kind == MessageKind::Assistant {
                        println!("{}", render_message(&message));
                    }
                }
                Ok(ChatEvent::FeedbackRecorded { approved, .. }) => {
                    println!("  (answered {})", if approved { "yes" } else { "no" });
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "printer lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Read commands from stdin until `/quit` or end of input.
/// Status line for a connection state change, if it is worth showing.
pub fn describe_transition(previous: ConnectionState, next: ConnectionState) -> Option<String> {
    match (previous, next) {
        (ConnectionState::Open { .. }, ConnectionState::Connecting | ConnectionState::Absent) => {
            Some("connection lost, reconnecting".to_owned())
        }
        (_, ConnectionState::Open { generation: 1 }) => Some("connected".to_owned()),
        (_, ConnectionState::Open { generation }) => Some(format!("reconnected (#{generation})")),
        _ => None,
    }
}

fn spawn_status(mut state: watch::Receiver<ConnectionState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut previous = *state.borrow_and_update();
        while state.changed().await.is_ok() {
            let next = *state.borrow_and_update();
            if let Some(line) = describe_transition(previous, next) {
                println!("  [{line}]");
            }
            previous = next;
        }
    })
}

pub async fn run(
    controller: Arc<SessionController>,
    connection: watch::Receiver<ConnectionState>,
) -> Result<()> {
    let printer = spawn_printer(controller.subscribe());
    let status = spawn_status(connection);
    println!("{HELP}");

    let conversation = controller.ensure_conversation().await?;
    println!("conversation {conversation}");
    for message in controller.load_history().await? {
        println!("{}", render_message(&message));
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_input(&line) {
            Input::Quit => break,
            input => {
                if let Err(e) = handle(&controller, input).await {
                    eprintln!("error: {e}");
                }
            }
        }
    }

    printer.abort();
    status.abort();
    Ok(())
}

async fn handle(controller: &SessionController, input: Input) -> Result<()> {
    match input {
        Input::Send(text) => {
            let _ = controller.send_message(text).await;
        }
        Input::Answer(approved) => match controller.pending_question() {
            Some(question) => {
                let _ = controller.send_feedback(&question.id, approved).await;
            }
            None => println!("no question is waiting for an answer"),
        },
        Input::New => {
            let conversation = controller.new_conversation().await?;
            println!("conversation {}", conversation.id);
        }
        Input::List => {
            let current = controller.current_conversation().await;
            for summary in controller.list_conversations().await? {
                println!("{}", render_summary(&summary, current.as_ref()));
            }
        }
        Input::History => {
            for message in controller.load_history().await? {
                println!("{}", render_message(&message));
            }
        }
        Input::More => {
            let older = controller.load_more().await?;
            if older.is_empty() {
                println!("no older messages");
            }
            for message in older {
                println!("{}", render_message(&message));
            }
        }
        Input::Rename(title) => {
            let conversation = controller.ensure_conversation().await?;
            let renamed = controller.rename_conversation(&conversation, &title).await?;
            println!("renamed to {}", renamed.title);
        }
        Input::Delete(id) => {
            controller.delete_conversation(&id).await?;
            println!("deleted {id}");
        }
        Input::Open(id) => {
            for message in controller.select_conversation(&id).await? {
                println!("{}", render_message(&message));
            }
            println!("conversation {id}");
        }
        Input::Help => println!("{HELP}"),
        Input::Invalid(reason) => println!("{reason}"),
        Input::Empty | Input::Quit => {}
    }
    Ok(())
}
