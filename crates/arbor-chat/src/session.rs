//! Conversation controller.
//!
//! A `ChatSession` keeps the active branch of one chat in memory, streams
//! replies into draft nodes and commits them to the `ChatStore` once a
//! stream completes. After every commit the branch is recomputed by the
//! store and replaces the draft (`reconcile`).
//!
//! Renderers follow along through a `watch` channel of `SessionView`
//! snapshots; the only other cross-task touch point is the `StopHandle`.

use std::sync::{Arc, Mutex, MutexGuard};

use arbor_llm::LlmError;
use arbor_persist::{
    generate_title, Chat, ChatMessage, ChatStore, Direction, MessageRole, DEFAULT_CHAT_TITLE,
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::aggregator::{StreamAggregator, StreamObserver, StreamOutcome};
use crate::error::Result;
use crate::reconcile::reconcile;

/// Content of the synthetic reply shown in place of a failed response
pub const ERROR_REPLY_PREFIX: &str = "Sorry, there was an error processing your request: ";

const DISPLAY_TITLE_CHARS: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Streaming,
    Error,
}

/// A user message being edited, with the text typed so far
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditDraft {
    pub message_id: String,
    pub draft: String,
}

/// Snapshot of everything a renderer needs
#[derive(Debug, Clone, PartialEq)]
pub struct SessionView {
    /// `None` until the first reply of a new conversation is committed
    pub chat_id: Option<String>,
    pub branch: Vec<ChatMessage>,
    pub state: SessionState,
    pub is_loading: bool,
    pub editing: Option<EditDraft>,
    pub last_error: Option<String>,
}

impl Default for SessionView {
    fn default() -> Self {
        Self {
            chat_id: None,
            branch: Vec::new(),
            state: SessionState::Idle,
            is_loading: false,
            editing: None,
            last_error: None,
        }
    }
}

type ActiveToken = Arc<Mutex<Option<CancellationToken>>>;

fn lock(active: &ActiveToken) -> MutexGuard<'_, Option<CancellationToken>> {
    active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Cancels the in-flight stream of a session from any task
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    active: ActiveToken,
}

impl StopHandle {
    /// Returns `false` when nothing was streaming
    pub fn stop(&self) -> bool {
        match lock(&self.active).as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

/// A reply that only exists in the draft branch
struct UnsavedReply {
    parent_id: Option<String>,
    /// Text of its user message when that was never saved either
    user_text: Option<String>,
}

/// Writes streamed text into the draft branch and mirrors it to the view
struct BranchWriter<'a> {
    branch: &'a mut Vec<ChatMessage>,
    view: &'a watch::Sender<SessionView>,
    index: usize,
    /// Existing content the stream extends (non-empty only for continue)
    base: String,
}

impl StreamObserver for BranchWriter<'_> {
    fn on_chunk(&mut self, accumulated: &str) {
        let content = format!("{}{}", self.base, accumulated);
        let index = self.index;

        if let Some(message) = self.branch.get_mut(index) {
            message.content.clone_from(&content);
        }
        self.view.send_modify(|view| {
            if let Some(message) = view.branch.get_mut(index) {
                message.content = content;
            }
        });
    }
}

pub struct ChatSession {
    store: ChatStore,
    aggregator: StreamAggregator,
    chat_id: Option<String>,
    branch: Vec<ChatMessage>,
    editing: Option<EditDraft>,
    state: SessionState,
    last_error: Option<String>,
    active: ActiveToken,
    view: watch::Sender<SessionView>,
}

impl ChatSession {
    /// Start on a new, not yet persisted conversation
    pub fn new(store: ChatStore, aggregator: StreamAggregator) -> Self {
        let (view, _) = watch::channel(SessionView::default());
        Self {
            store,
            aggregator,
            chat_id: None,
            branch: Vec::new(),
            editing: None,
            state: SessionState::Idle,
            last_error: None,
            active: Arc::default(),
            view,
        }
    }

    pub fn store(&self) -> &ChatStore {
        &self.store
    }

    pub fn chat_id(&self) -> Option<&str> {
        self.chat_id.as_deref()
    }

    pub fn branch(&self) -> &[ChatMessage] {
        &self.branch
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn editing(&self) -> Option<&EditDraft> {
        self.editing.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            chat_id: self.chat_id.clone(),
            branch: self.branch.clone(),
            state: self.state,
            is_loading: self.state == SessionState::Streaming,
            editing: self.editing.clone(),
            last_error: self.last_error.clone(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view.subscribe()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            active: Arc::clone(&self.active),
        }
    }

    /// Cancel the active stream. Streamed text stays visible, nothing is saved.
    pub fn stop(&self) -> bool {
        self.stop_handle().stop()
    }

    /// All stored chats, most recently updated first
    pub fn chats(&self) -> Vec<&Chat> {
        self.store.all_chats()
    }

    /// First user message of the branch, cut to 40 characters
    pub fn display_title(&self) -> String {
        let Some(first) = self.branch.iter().find(|m| m.role == MessageRole::User) else {
            return DEFAULT_CHAT_TITLE.to_string();
        };

        if first.content.chars().count() > DISPLAY_TITLE_CHARS {
            let head: String = first.content.chars().take(DISPLAY_TITLE_CHARS).collect();
            format!("{}...", head)
        } else {
            first.content.clone()
        }
    }

    /// `(current_index, count)` of the branch message at `index` among its siblings
    pub fn sibling_position(&self, index: usize) -> Option<(usize, usize)> {
        let chat_id = self.chat_id.as_deref()?;
        let message = self.branch.get(index)?;
        let siblings = self.store.siblings(chat_id, &message.id);

        if siblings.is_empty() {
            None
        } else {
            Some((siblings.current_index, siblings.len()))
        }
    }

    // ------------------------------------------------------------------
    // Chat management
    // ------------------------------------------------------------------

    pub fn new_chat(&mut self) {
        self.cancel_active();
        self.chat_id = None;
        self.branch.clear();
        self.editing = None;
        self.last_error = None;
        self.state = SessionState::Idle;
        self.publish();
    }

    /// Switch to a stored chat. Returns `false` if the id is unknown.
    pub fn open_chat(&mut self, chat_id: &str) -> bool {
        if self.store.get_chat(chat_id).is_none() {
            tracing::debug!(chat_id, "open_chat on unknown chat ignored");
            return false;
        }

        self.cancel_active();
        self.chat_id = Some(chat_id.to_string());
        self.editing = None;
        self.last_error = None;
        self.state = SessionState::Idle;
        self.resync();
        self.publish();
        true
    }

    pub fn rename_chat(&mut self, chat_id: &str, title: &str) -> Result<()> {
        let title = title.trim();
        if title.is_empty() {
            return Ok(());
        }
        self.store.update_chat_title(chat_id, title)?;
        Ok(())
    }

    /// Delete a chat; deleting the open one starts a new conversation
    pub fn delete_chat(&mut self, chat_id: &str) -> Result<()> {
        self.store.delete_chat(chat_id)?;
        if self.chat_id.as_deref() == Some(chat_id) {
            self.new_chat();
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Branch navigation and edit mode
    // ------------------------------------------------------------------

    /// Move the message at `index` of the branch to its previous/next sibling
    pub fn navigate(&mut self, index: usize, direction: Direction) -> Result<()> {
        self.prepare();

        let Some(chat_id) = self.chat_id.clone() else {
            return Ok(());
        };
        let Some(message_id) = self.branch.get(index).map(|m| m.id.clone()) else {
            tracing::debug!(index, "navigate past the end of the branch ignored");
            return Ok(());
        };

        self.store.switch_to_sibling(&chat_id, &message_id, direction)?;
        self.resync();
        self.publish();
        Ok(())
    }

    /// Enter edit mode for a user message of the branch
    pub fn start_edit(&mut self, message_id: &str) -> bool {
        let Some(message) = self
            .branch
            .iter()
            .find(|m| m.id == message_id && m.role == MessageRole::User)
        else {
            return false;
        };

        self.editing = Some(EditDraft {
            message_id: message.id.clone(),
            draft: message.content.clone(),
        });
        self.publish();
        true
    }

    pub fn set_edit_draft(&mut self, text: impl Into<String>) {
        if let Some(editing) = self.editing.as_mut() {
            editing.draft = text.into();
            self.publish();
        }
    }

    pub fn cancel_edit(&mut self) {
        if self.editing.take().is_some() {
            self.publish();
        }
    }

    /// Submit the current edit draft
    pub async fn submit_edit(&mut self) -> Result<()> {
        let Some(EditDraft { message_id, draft }) = self.editing.clone() else {
            return Ok(());
        };
        self.edit_submit(&message_id, &draft).await
    }

    // ------------------------------------------------------------------
    // Streaming actions
    // ------------------------------------------------------------------

    /// Send a new user message after the last message of the branch
    pub async fn send(&mut self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }

        self.prepare();
        self.stream_turn(text).await
    }

    /// Stream a reply to a new user message placed after the end of the branch
    async fn stream_turn(&mut self, text: &str) -> Result<()> {
        let parent_id = self.branch.last().map(|m| m.id.clone());
        let user = ChatMessage::user(text, parent_id);
        let placeholder = ChatMessage::assistant("", Some(user.id.clone()));

        self.branch.push(user.clone());
        self.branch.push(placeholder.clone());
        let reply_index = self.branch.len() - 1;
        let prefix = self.branch[..reply_index].to_vec();

        let token = self.start_streaming();
        match self.stream_into(&prefix, reply_index, String::new(), &token).await {
            StreamOutcome::Completed { content } => {
                let committed = self.commit_send(text, user, placeholder, content);
                self.finish(committed)
            }
            StreamOutcome::Failed(e) => {
                self.fail(Some(reply_index), &e);
                Ok(())
            }
            StreamOutcome::Cancelled { .. } => {
                self.settle_cancelled();
                Ok(())
            }
        }
    }

    fn commit_send(
        &mut self,
        first_text: &str,
        user: ChatMessage,
        placeholder: ChatMessage,
        content: String,
    ) -> Result<()> {
        let chat_id = match self.chat_id.clone() {
            Some(id) => id,
            None => {
                let chat = self.store.create_chat(&generate_title(first_text))?;
                self.chat_id = Some(chat.id.clone());
                chat.id
            }
        };

        self.store.add_message(&chat_id, user)?;
        self.store.add_message(&chat_id, ChatMessage { content, ..placeholder })?;
        Ok(())
    }

    /// Extend an assistant message with more generated text
    pub async fn continue_message(&mut self, message_id: &str) -> Result<()> {
        self.prepare();

        let Some(chat_id) = self.chat_id.clone() else {
            return Ok(());
        };
        let Some(index) = self.assistant_index(message_id) else {
            tracing::debug!(message_id, "continue needs an assistant message of the branch");
            return Ok(());
        };

        let base = self.branch[index].content.clone();
        let prefix = self.branch[..=index].to_vec();

        let token = self.start_streaming();
        match self.stream_into(&prefix, index, base.clone(), &token).await {
            StreamOutcome::Completed { content } => {
                let extended = format!("{}{}", base, content);
                let committed = self
                    .store
                    .update_message_content(&chat_id, message_id, extended)
                    .map(|_| ())
                    .map_err(Into::into);
                self.finish(committed)
            }
            StreamOutcome::Failed(e) => {
                // partial extension stays visible but is not saved
                self.fail(None, &e);
                Ok(())
            }
            StreamOutcome::Cancelled { .. } => {
                self.settle_cancelled();
                Ok(())
            }
        }
    }

    /// Generate an alternative reply next to an assistant message.
    ///
    /// An unsaved reply (an error reply or a stopped draft) is regenerated
    /// in place. When its user message was never saved either, that whole
    /// turn is sent again.
    pub async fn retry(&mut self, message_id: &str) -> Result<()> {
        let unsaved = self.unsaved_reply(message_id);
        self.prepare();

        let parent_id = match unsaved {
            Some(UnsavedReply { parent_id, user_text: Some(text) }) => {
                return self.resend(parent_id, &text).await;
            }
            Some(UnsavedReply { parent_id, user_text: None }) => parent_id,
            None => match self.assistant_index(message_id) {
                Some(index) => self.branch[index].parent_message_id.clone(),
                None => {
                    tracing::debug!(message_id, "retry needs an assistant message of the branch");
                    return Ok(());
                }
            },
        };

        let Some(chat_id) = self.chat_id.clone() else {
            return Ok(());
        };
        let Some(index) = self.position_after(parent_id.as_deref()) else {
            tracing::debug!(message_id, "retry parent is no longer on the branch");
            return Ok(());
        };

        let prefix = self.branch[..index].to_vec();
        let placeholder = ChatMessage::assistant("", parent_id);

        self.branch.truncate(index);
        self.branch.push(placeholder.clone());

        let token = self.start_streaming();
        match self.stream_into(&prefix, index, String::new(), &token).await {
            StreamOutcome::Completed { content } => {
                let committed = self
                    .store
                    .add_message(&chat_id, ChatMessage { content, ..placeholder })
                    .map_err(Into::into);
                self.finish(committed)
            }
            StreamOutcome::Failed(e) => {
                self.fail(Some(index), &e);
                Ok(())
            }
            StreamOutcome::Cancelled { .. } => {
                self.settle_cancelled();
                Ok(())
            }
        }
    }

    /// Replace a user message with a new sibling and stream a fresh reply.
    ///
    /// The edited message and everything below it stay in the store.
    pub async fn edit_submit(&mut self, message_id: &str, new_text: &str) -> Result<()> {
        self.prepare();

        let text = new_text.trim();
        let Some(index) = self
            .branch
            .iter()
            .position(|m| m.id == message_id && m.role == MessageRole::User)
        else {
            tracing::debug!(message_id, "edit needs a user message of the branch");
            self.cancel_edit();
            return Ok(());
        };

        if text.is_empty() || self.branch[index].content == text {
            self.cancel_edit();
            return Ok(());
        }
        let Some(chat_id) = self.chat_id.clone() else {
            self.cancel_edit();
            return Ok(());
        };

        let parent_id = self.branch[index].parent_message_id.clone();
        let user = ChatMessage::user(text, parent_id);
        let placeholder = ChatMessage::assistant("", Some(user.id.clone()));

        self.branch.truncate(index);
        self.branch.push(user.clone());
        self.branch.push(placeholder.clone());
        self.editing = None;

        let reply_index = index + 1;
        let prefix = self.branch[..reply_index].to_vec();

        let token = self.start_streaming();
        match self.stream_into(&prefix, reply_index, String::new(), &token).await {
            StreamOutcome::Completed { content } => {
                let committed = self.commit_pair(&chat_id, user, placeholder, content);
                self.finish(committed)
            }
            StreamOutcome::Failed(e) => {
                self.fail(Some(reply_index), &e);
                Ok(())
            }
            StreamOutcome::Cancelled { .. } => {
                self.settle_cancelled();
                Ok(())
            }
        }
    }

    fn commit_pair(
        &mut self,
        chat_id: &str,
        user: ChatMessage,
        placeholder: ChatMessage,
        content: String,
    ) -> Result<()> {
        self.store.add_message(chat_id, user)?;
        self.store.add_message(chat_id, ChatMessage { content, ..placeholder })?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn assistant_index(&self, message_id: &str) -> Option<usize> {
        self.branch
            .iter()
            .position(|m| m.id == message_id && m.role == MessageRole::Assistant)
    }

    fn is_stored(&self, message_id: &str) -> bool {
        self.chat_id
            .as_deref()
            .and_then(|chat_id| self.store.get_chat(chat_id))
            .is_some_and(|chat| chat.contains(message_id))
    }

    /// Branch index right below `parent_id` (0 for a root)
    fn position_after(&self, parent_id: Option<&str>) -> Option<usize> {
        match parent_id {
            Some(parent_id) => self.branch.iter().position(|m| m.id == parent_id).map(|i| i + 1),
            None => Some(0),
        }
    }

    /// What is needed to regenerate an assistant message of the branch
    /// that never reached the store
    fn unsaved_reply(&self, message_id: &str) -> Option<UnsavedReply> {
        let index = self.assistant_index(message_id)?;
        if self.is_stored(message_id) {
            return None;
        }

        let reply = &self.branch[index];
        let user = index
            .checked_sub(1)
            .map(|i| &self.branch[i])
            .filter(|user| {
                user.role == MessageRole::User
                    && reply.parent_message_id.as_deref() == Some(user.id.as_str())
                    && !self.is_stored(&user.id)
            });

        Some(match user {
            Some(user) => UnsavedReply {
                parent_id: user.parent_message_id.clone(),
                user_text: Some(user.content.clone()),
            },
            None => UnsavedReply {
                parent_id: reply.parent_message_id.clone(),
                user_text: None,
            },
        })
    }

    /// Send `text` again below `parent_id`, which must be on the stored branch
    async fn resend(&mut self, parent_id: Option<String>, text: &str) -> Result<()> {
        let Some(index) = self.position_after(parent_id.as_deref()) else {
            tracing::debug!(parent_id = ?parent_id, "resend parent is no longer on the branch");
            return Ok(());
        };

        self.branch.truncate(index);
        self.stream_turn(text).await
    }

    async fn stream_into(
        &mut self,
        prefix: &[ChatMessage],
        index: usize,
        base: String,
        token: &CancellationToken,
    ) -> StreamOutcome {
        let mut writer = BranchWriter {
            branch: &mut self.branch,
            view: &self.view,
            index,
            base,
        };
        self.aggregator.stream(prefix, token, &mut writer).await
    }

    fn cancel_active(&mut self) {
        if let Some(token) = lock(&self.active).take() {
            token.cancel();
        }
    }

    /// Cancel any leftover stream and drop uncommitted drafts, so new
    /// nodes only ever point at persisted parents
    fn prepare(&mut self) {
        self.cancel_active();
        self.last_error = None;
        self.resync();
        self.publish();
    }

    fn start_streaming(&mut self) -> CancellationToken {
        let token = CancellationToken::new();
        if let Some(previous) = lock(&self.active).replace(token.clone()) {
            previous.cancel();
        }

        self.last_error = None;
        self.state = SessionState::Streaming;
        self.publish();
        token
    }

    fn release(&mut self) {
        lock(&self.active).take();
    }

    fn finish(&mut self, committed: Result<()>) -> Result<()> {
        self.release();

        match committed {
            Ok(()) => {
                self.resync();
                self.state = SessionState::Idle;
                self.publish();
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, chat_id = ?self.chat_id, "Failed to persist response");
                self.last_error = Some(e.to_string());
                self.state = SessionState::Idle;
                self.publish();
                Err(e)
            }
        }
    }

    /// Surface a failed stream. With `placeholder` set, the draft reply at
    /// that index becomes a synthetic error message.
    fn fail(&mut self, placeholder: Option<usize>, error: &LlmError) {
        self.release();
        tracing::error!(error = %error, chat_id = ?self.chat_id, "Streaming response failed");

        let message = error.to_string();
        if let Some(index) = placeholder {
            if let Some(slot) = self.branch.get_mut(index) {
                let parent_id = slot.parent_message_id.clone();
                *slot = ChatMessage::assistant(format!("{}{}", ERROR_REPLY_PREFIX, message), parent_id);
            }
        }

        self.last_error = Some(message);
        self.state = SessionState::Error;
        self.publish();

        self.state = SessionState::Idle;
        self.publish();
    }

    fn settle_cancelled(&mut self) {
        self.release();
        tracing::info!(chat_id = ?self.chat_id, "Response stopped, partial content not saved");
        self.state = SessionState::Idle;
        self.publish();
    }

    fn resync(&mut self) {
        let stored = match self.chat_id.as_deref() {
            Some(chat_id) => self.store.active_branch(chat_id),
            None => Vec::new(),
        };
        let draft = std::mem::take(&mut self.branch);
        self.branch = reconcile(draft, stored);
    }

    fn publish(&self) {
        self.view.send_replace(self.view());
    }
}
