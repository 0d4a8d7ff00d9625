//! Line-oriented terminal front end for a `ChatSession`.

use std::collections::HashMap;
use std::future::Future;
use std::io::Write;

use anyhow::{anyhow, bail, Result};
use arbor_chat::{ChatSession, Direction, MessageRole, SessionView, StopHandle};
use arbor_persist::Chat;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

pub const HELP: &str = "\
Type a message to send it. Commands (indices are positions shown by /show):
  /new                 start a new chat
  /list                list stored chats
  /open <n|id>         open a chat from /list
  /rename <title>      rename the current chat
  /delete [n|id]       delete a chat (default: current)
  /retry [i]           regenerate a reply (default: last)
  /continue [i]        extend a reply (default: last)
  /edit <i> <text>     edit a user message
  /prev <i>, /next <i> switch message i to its previous/next version
  /show                print the current branch
  /help                show this help
  /quit                exit
Ctrl-C stops a streaming reply.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(String),
    New,
    List,
    Open(String),
    Rename(String),
    Delete(Option<String>),
    Retry(Option<usize>),
    Continue(Option<usize>),
    Edit(usize, String),
    Prev(usize),
    Next(usize),
    Show,
    Help,
    Quit,
}

/// Parse one input line. `Ok(None)` for blank input.
///
/// Indices stay 1-based as typed.
pub fn parse_command(line: &str) -> std::result::Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Some(Command::Send(line.to_string())));
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    let optional = |arg: &str| (!arg.is_empty()).then(|| arg.to_string());

    let command = match name {
        "new" => Command::New,
        "list" | "ls" => Command::List,
        "open" => Command::Open(required(arg, "/open <n|id>")?.to_string()),
        "rename" => Command::Rename(required(arg, "/rename <title>")?.to_string()),
        "delete" | "rm" => Command::Delete(optional(arg)),
        "retry" => Command::Retry(optional_index(arg)?),
        "continue" => Command::Continue(optional_index(arg)?),
        "edit" => {
            let (index, text) = arg
                .split_once(char::is_whitespace)
                .ok_or_else(|| "usage: /edit <i> <text>".to_string())?;
            Command::Edit(parse_index(index)?, text.trim().to_string())
        }
        "prev" => Command::Prev(parse_index(required(arg, "/prev <i>")?)?),
        "next" => Command::Next(parse_index(required(arg, "/next <i>")?)?),
        "show" => Command::Show,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => return Err(format!("unknown command /{} (try /help)", other)),
    };

    Ok(Some(command))
}

fn required<'a>(arg: &'a str, usage: &str) -> std::result::Result<&'a str, String> {
    if arg.is_empty() {
        Err(format!("usage: {}", usage))
    } else {
        Ok(arg)
    }
}

fn parse_index(arg: &str) -> std::result::Result<usize, String> {
    match arg.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(format!("not a message index: {}", arg)),
    }
}

fn optional_index(arg: &str) -> std::result::Result<Option<usize>, String> {
    if arg.is_empty() {
        Ok(None)
    } else {
        parse_index(arg).map(Some)
    }
}

/// Branch as printed by `/show`; `‹k/n›` marks messages with alternatives
pub fn render_branch(session: &ChatSession) -> String {
    let mut out = format!("── {} ──\n", session.display_title());

    for (i, message) in session.branch().iter().enumerate() {
        let who = match message.role {
            MessageRole::User => "you",
            MessageRole::Assistant => "assistant",
        };
        let position = match session.sibling_position(i) {
            Some((k, n)) if n > 1 => format!(" ‹{}/{}›", k + 1, n),
            _ => String::new(),
        };
        out.push_str(&format!("[{}] {}{}:\n{}\n\n", i + 1, who, position, message.content));
    }

    out
}

pub fn render_chat_list(chats: &[&Chat], current: Option<&str>) -> String {
    if chats.is_empty() {
        return "no chats yet\n".to_string();
    }

    chats
        .iter()
        .enumerate()
        .map(|(i, chat)| {
            let marker = if Some(chat.id.as_str()) == current { '*' } else { ' ' };
            format!(
                "{} {:>3}. {}  ({})\n",
                marker,
                i + 1,
                chat.title,
                chat.updated_at.format("%Y-%m-%d %H:%M")
            )
        })
        .collect()
}

/// Echoes streamed assistant text to stdout as suffixes of the cumulative
/// content seen in `SessionView` snapshots
struct StreamEcho {
    printed: HashMap<String, String>,
    wrote: bool,
}

impl StreamEcho {
    fn new(before: &SessionView) -> Self {
        let printed = before
            .branch
            .iter()
            .filter(|m| m.role == MessageRole::Assistant)
            .map(|m| (m.id.clone(), m.content.clone()))
            .collect();
        Self {
            printed,
            wrote: false,
        }
    }

    fn update(&mut self, view: &SessionView) {
        // a failed action ends on a synthetic reply that is reported separately
        if !view.is_loading && view.last_error.is_some() {
            return;
        }

        let mut stdout = std::io::stdout().lock();
        for message in view.branch.iter().filter(|m| m.role == MessageRole::Assistant) {
            let seen = self.printed.entry(message.id.clone()).or_default();
            if message.content.len() <= seen.len() {
                continue;
            }
            if let Some(suffix) = message.content.strip_prefix(seen.as_str()) {
                let _ = write!(stdout, "{}", suffix);
                self.wrote = true;
            }
            seen.clone_from(&message.content);
        }
        let _ = stdout.flush();
    }

    fn finish(self) {
        if self.wrote {
            println!();
        }
    }
}

pub struct Repl {
    session: ChatSession,
    view: watch::Receiver<SessionView>,
    stop: StopHandle,
}

impl Repl {
    pub fn new(session: ChatSession) -> Self {
        let view = session.subscribe();
        let stop = session.stop_handle();
        Self { session, view, stop }
    }

    pub async fn run(mut self) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        println!("arbor ({}). /help for commands.", self.session.display_title());

        loop {
            print!("> ");
            std::io::stdout().flush()?;

            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = tokio::signal::ctrl_c() => {
                    println!();
                    break;
                }
            };
            // EOF
            let Some(line) = line else {
                println!();
                break;
            };

            match parse_command(&line) {
                Ok(None) => {}
                Ok(Some(Command::Quit)) => break,
                Ok(Some(command)) => {
                    if let Err(e) = self.execute(command).await {
                        println!("error: {}", e);
                    }
                }
                Err(usage) => println!("{}", usage),
            }
        }

        tracing::info!("Session closed");
        Ok(())
    }

    async fn execute(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Send(text) => {
                let echo = StreamEcho::new(&self.session.view());
                let action = self.session.send(&text);
                drive(action, &mut self.view, &self.stop, echo).await?;
            }
            Command::Retry(index) => {
                let message_id = self.assistant_id(index)?;
                let echo = StreamEcho::new(&self.session.view());
                let action = self.session.retry(&message_id);
                drive(action, &mut self.view, &self.stop, echo).await?;
            }
            Command::Continue(index) => {
                let message_id = self.assistant_id(index)?;
                let echo = StreamEcho::new(&self.session.view());
                let action = self.session.continue_message(&message_id);
                drive(action, &mut self.view, &self.stop, echo).await?;
            }
            Command::Edit(index, text) => {
                let message_id = self.message_id(index, MessageRole::User)?;
                if !self.session.start_edit(&message_id) {
                    bail!("message {} cannot be edited", index);
                }
                self.session.set_edit_draft(text);
                let echo = StreamEcho::new(&self.session.view());
                let action = self.session.submit_edit();
                drive(action, &mut self.view, &self.stop, echo).await?;
            }
            Command::Prev(index) => {
                self.session.navigate(index - 1, Direction::Prev)?;
                print!("{}", render_branch(&self.session));
                return Ok(());
            }
            Command::Next(index) => {
                self.session.navigate(index - 1, Direction::Next)?;
                print!("{}", render_branch(&self.session));
                return Ok(());
            }
            Command::New => {
                self.session.new_chat();
                println!("new chat");
                return Ok(());
            }
            Command::List => {
                print!("{}", render_chat_list(&self.session.chats(), self.session.chat_id()));
                return Ok(());
            }
            Command::Open(target) => {
                let chat_id = self.resolve_chat(&target)?;
                self.session.open_chat(&chat_id);
                print!("{}", render_branch(&self.session));
                return Ok(());
            }
            Command::Rename(title) => {
                let chat_id = self
                    .session
                    .chat_id()
                    .map(str::to_string)
                    .ok_or_else(|| anyhow!("nothing to rename yet"))?;
                self.session.rename_chat(&chat_id, &title)?;
                return Ok(());
            }
            Command::Delete(target) => {
                let chat_id = match target {
                    Some(target) => self.resolve_chat(&target)?,
                    None => self
                        .session
                        .chat_id()
                        .map(str::to_string)
                        .ok_or_else(|| anyhow!("no chat is open"))?,
                };
                self.session.delete_chat(&chat_id)?;
                println!("deleted");
                return Ok(());
            }
            Command::Show => {
                print!("{}", render_branch(&self.session));
                return Ok(());
            }
            Command::Help => {
                println!("{}", HELP);
                return Ok(());
            }
            Command::Quit => return Ok(()),
        }

        if let Some(error) = self.session.last_error() {
            println!("error: {}", error);
        }
        Ok(())
    }

    /// Id of the message at 1-based `index`, which must have `role`
    fn message_id(&self, index: usize, role: MessageRole) -> Result<String> {
        match self.session.branch().get(index.wrapping_sub(1)) {
            Some(message) if message.role == role => Ok(message.id.clone()),
            Some(_) => bail!("message {} is not a {} message", index, role),
            None => bail!("no message {}", index),
        }
    }

    /// Assistant message at `index`, or the last one of the branch
    fn assistant_id(&self, index: Option<usize>) -> Result<String> {
        match index {
            Some(index) => self.message_id(index, MessageRole::Assistant),
            None => self
                .session
                .branch()
                .iter()
                .rev()
                .find(|m| m.role == MessageRole::Assistant)
                .map(|m| m.id.clone())
                .ok_or_else(|| anyhow!("no reply to work on yet")),
        }
    }

    /// `/list` position or chat id
    fn resolve_chat(&self, target: &str) -> Result<String> {
        let chats = self.session.chats();
        if let Ok(n) = target.parse::<usize>() {
            return chats
                .get(n.wrapping_sub(1))
                .map(|c| c.id.clone())
                .ok_or_else(|| anyhow!("no chat {} in /list", n));
        }
        chats
            .iter()
            .find(|c| c.id == target)
            .map(|c| c.id.clone())
            .ok_or_else(|| anyhow!("unknown chat {}", target))
    }
}

/// Await a streaming action while echoing its progress. Ctrl-C stops the
/// stream through the session's `StopHandle`.
async fn drive<F>(
    action: F,
    view: &mut watch::Receiver<SessionView>,
    stop: &StopHandle,
    mut echo: StreamEcho,
) -> arbor_chat::Result<()>
where
    F: Future<Output = arbor_chat::Result<()>>,
{
    tokio::pin!(action);

    let result = loop {
        tokio::select! {
            result = &mut action => break result,
            changed = view.changed() => {
                if changed.is_ok() {
                    echo.update(&view.borrow_and_update());
                }
            }
            _ = tokio::signal::ctrl_c() => {
                if stop.stop() {
                    tracing::info!("Stop requested");
                }
            }
        }
    };

    echo.update(&view.borrow_and_update());
    echo.finish();
    result
}
