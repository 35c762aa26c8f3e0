//! Conversation session controller.
//!
//! Turns user input into backend requests and completed responses into
//! persisted messages, owns the active conversation id and the local
//! transcript, and runs the trading confirmation round trip. Public chat
//! operations never fail: errors become a synthetic assistant message.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use stockchat_core::constants::{
    CONVERSATION_STORAGE_KEY, FEEDBACK_APPROVE_TEXT, FEEDBACK_REJECT_TEXT,
};
use stockchat_core::{
    Conversation, ConversationId, ConversationSummary, Message, MessageId, MessageKind,
    PersistenceGateway,
};
use stockchat_settings::SessionSettings;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::correlator::{ChatRequest, ChunkFn, Dispatcher};
use crate::errors::ClientError;
use crate::storage::LocalStorage;

const EVENT_CAPACITY: usize = 256;

/// Notification for whoever renders the conversation.
#[derive(Clone, Debug, PartialEq)]
pub enum ChatEvent {
    /// New piece of a streaming response.
    Chunk(String),
    /// A message was added to the transcript.
    Message(Message),
    /// A confirmation question was answered locally.
    FeedbackRecorded {
        /// The question.
        message_id: MessageId,
        /// The answer.
        approved: bool,
    },
}

/// Per-session knobs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Numeric user id sent with every request.
    pub user_id: i64,
    /// Pause before a confirmation question is shown.
    pub question_delay: Duration,
    /// History page size.
    pub page_size: u32,
}

impl SessionConfig {
    /// Build from the `session` settings block.
    pub fn from_settings(settings: &SessionSettings) -> Self {
        Self {
            user_id: settings.user_id,
            question_delay: settings.question_delay(),
            page_size: settings.page_size.max(1),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_settings(&SessionSettings::default())
    }
}

#[derive(Default)]
struct Transcript {
    conversation: Option<ConversationId>,
    messages: Vec<Message>,
    pages_loaded: u32,
    has_more: bool,
}

impl Transcript {
    fn reset(&mut self, conversation: Option<ConversationId>) {
        *self = Self {
            conversation,
            ..Self::default()
        };
    }

    fn accepts(&self, conversation: Option<&ConversationId>) -> bool {
        match (&self.conversation, conversation) {
            (Some(own), Some(other)) => own == other,
            _ => true,
        }
    }
}

/// One user's chat session.
pub struct SessionController {
    gateway: Arc<dyn PersistenceGateway>,
    storage: Arc<dyn LocalStorage>,
    dispatcher: Arc<dyn Dispatcher>,
    config: SessionConfig,
    events: broadcast::Sender<ChatEvent>,
    current: tokio::sync::Mutex<Option<ConversationId>>,
    transcript: Mutex<Transcript>,
    turns: Mutex<HashMap<ConversationId, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionController {
    /// Wire a controller from its collaborators.
    pub fn new(
        gateway: Arc<dyn PersistenceGateway>,
        storage: Arc<dyn LocalStorage>,
        dispatcher: Arc<dyn Dispatcher>,
        config: SessionConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            gateway,
            storage,
            dispatcher,
            config,
            events,
            current: tokio::sync::Mutex::new(None),
            transcript: Mutex::new(Transcript::default()),
            turns: Mutex::new(HashMap::new()),
        }
    }

    /// Receive chat events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    /// Snapshot of the local transcript.
    pub fn transcript(&self) -> Vec<Message> {
        self.transcript.lock().messages.clone()
    }

    /// The active conversation, if one has been established.
    pub async fn current_conversation(&self) -> Option<ConversationId> {
        self.current.lock().await.clone()
    }

    /// Newest question still awaiting an answer.
    pub fn pending_question(&self) -> Option<Message> {
        self.transcript
            .lock()
            .messages
            .iter()
            .rev()
            .find(|m| m.is_pending_question())
            .cloned()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Conversation identity
    // ─────────────────────────────────────────────────────────────────────

    /// The active conversation id: held in memory, else from local storage,
    /// else freshly created. Concurrent callers share one creation.
    pub async fn ensure_conversation(&self) -> Result<ConversationId, ClientError> {
        let mut current = self.current.lock().await;
        if let Some(id) = current.as_ref() {
            return Ok(id.clone());
        }

        let id = match self
            .storage
            .get(CONVERSATION_STORAGE_KEY)?
            .filter(|stored| !stored.is_empty())
        {
            Some(stored) => {
                debug!(conversation_id = %stored, "restored conversation id");
                ConversationId::from(stored)
            }
            None => {
                let conversation = self.gateway.create_conversation(self.config.user_id).await?;
                self.storage.set(CONVERSATION_STORAGE_KEY, conversation.id.as_str())?;
                info!(conversation_id = %conversation.id, "created conversation");
                conversation.id
            }
        };

        {
            let mut transcript = self.transcript.lock();
            if transcript.conversation.as_ref() != Some(&id) {
                transcript.reset(Some(id.clone()));
            }
        }
        *current = Some(id.clone());
        Ok(id)
    }

    /// Start a fresh conversation and make it active.
    pub async fn new_conversation(&self) -> Result<Conversation, ClientError> {
        let mut current = self.current.lock().await;
        let conversation = self.gateway.create_conversation(self.config.user_id).await?;
        self.storage.set(CONVERSATION_STORAGE_KEY, conversation.id.as_str())?;
        self.transcript.lock().reset(Some(conversation.id.clone()));
        *current = Some(conversation.id.clone());
        info!(conversation_id = %conversation.id, "started new conversation");
        Ok(conversation)
    }

    /// Switch to an existing conversation and load its newest page.
    pub async fn select_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Message>, ClientError> {
        let mut current = self.current.lock().await;
        let page = self
            .gateway
            .get_messages(conversation_id, 1, self.config.page_size)
            .await?;
        self.storage.set(CONVERSATION_STORAGE_KEY, conversation_id.as_str())?;
        {
            let mut transcript = self.transcript.lock();
            transcript.reset(Some(conversation_id.clone()));
            transcript.messages.clone_from(&page.messages);
            transcript.pages_loaded = 1;
            transcript.has_more = page.has_more;
        }
        *current = Some(conversation_id.clone());
        info!(conversation_id = %conversation_id, "selected conversation");
        Ok(page.messages)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Chat turns
    // ─────────────────────────────────────────────────────────────────────

    /// Send a user prompt and return the assistant's reply (or the error
    /// reply).
    pub async fn send_message(&self, text: impl Into<String>) -> Message {
        let text = text.into();
        let conversation = match self.ensure_conversation().await {
            Ok(id) => id,
            Err(e) => return self.fail(None, &e).await,
        };
        let turn = self.turn_lock(&conversation);
        let _turn = turn.lock().await;

        let user = Message::user(text.clone());
        self.publish(Some(&conversation), user.clone());

        let result = async {
            let _ = self.gateway.save_message(&conversation, &user).await?;
            self.run_turn(&conversation, text, None).await
        }
        .await;

        match result {
            Ok(reply) => reply,
            Err(e) => self.fail(Some(&conversation), &e).await,
        }
    }

    /// Answer the confirmation question `question_id` and return the
    /// backend's follow-up reply (or the error reply).
    pub async fn send_feedback(&self, question_id: &MessageId, approved: bool) -> Message {
        let conversation = match self.ensure_conversation().await {
            Ok(id) => id,
            Err(e) => return self.fail(None, &e).await,
        };
        let turn = self.turn_lock(&conversation);
        let _turn = turn.lock().await;

        let prompt = match self.answer_locally(question_id, approved) {
            Ok(prompt) => prompt,
            Err(e) => return self.fail(Some(&conversation), &e).await,
        };
        let _ = self.events.send(ChatEvent::FeedbackRecorded {
            message_id: question_id.clone(),
            approved,
        });
        let Some(prompt) = prompt else {
            let err = ClientError::MessageNotFound(format!("prompt before {question_id}"));
            return self.fail(Some(&conversation), &err).await;
        };

        let result = async {
            let updated = self
                .gateway
                .save_feedback(&conversation, question_id, approved)
                .await?;
            if updated == 0 {
                warn!(message_id = %question_id, "feedback matched no stored message");
            }

            let reply = Message::feedback_reply(approved);
            self.publish(Some(&conversation), reply.clone());
            let _ = self.gateway.save_message(&conversation, &reply).await?;

            self.run_turn(&conversation, prompt, Some(approved)).await
        }
        .await;

        match result {
            Ok(reply) => reply,
            Err(e) => self.fail(Some(&conversation), &e).await,
        }
    }

    /// Flip the question in the transcript and find the prompt it answers.
    /// The prompt is `None` when it is not in the loaded history; the
    /// question is answered either way.
    fn answer_locally(
        &self,
        question_id: &MessageId,
        approved: bool,
    ) -> Result<Option<String>, ClientError> {
        let mut transcript = self.transcript.lock();
        let index = transcript
            .messages
            .iter()
            .position(|m| &m.id == question_id)
            .ok_or_else(|| ClientError::MessageNotFound(question_id.to_string()))?;
        if !transcript.messages[index].is_pending_question() {
            return Err(ClientError::NotAwaitingFeedback(question_id.to_string()));
        }
        transcript.messages[index].answer(approved);
        let prompt = transcript.messages[..index]
            .iter()
            .rev()
            .find(|m| {
                m.kind == MessageKind::User
                    && m.content != FEEDBACK_APPROVE_TEXT
                    && m.content != FEEDBACK_REJECT_TEXT
            })
            .map(|m| m.content.clone());
        Ok(prompt)
    }

    async fn run_turn(
        &self,
        conversation: &ConversationId,
        prompt: String,
        human_feedback: Option<bool>,
    ) -> Result<Message, ClientError> {
        let events = self.events.clone();
        let on_chunk: ChunkFn = Arc::new(move |chunk: &str| {
            let _ = events.send(ChatEvent::Chunk(chunk.to_owned()));
        });
        let request = ChatRequest {
            user_id: self.config.user_id,
            thread_id: conversation.clone(),
            message: prompt,
            human_feedback,
        };
        let frame = self.dispatcher.dispatch(request, Some(on_chunk)).await?;

        let reply = self
            .gateway
            .save_message(conversation, &Message::from_frame(frame))
            .await?;
        self.publish(Some(conversation), reply.clone());

        if let Some(action) = &reply.trading_action {
            match action.validate() {
                Ok(order) => {
                    let question = self
                        .gateway
                        .save_message(conversation, &Message::question(&order))
                        .await?;
                    tokio::time::sleep(self.config.question_delay).await;
                    self.publish(Some(conversation), question);
                }
                Err(e) => warn!(conversation_id = %conversation, error = %e, "ignoring invalid trading action"),
            }
        }
        Ok(reply)
    }

    async fn fail(&self, conversation: Option<&ConversationId>, err: &ClientError) -> Message {
        warn!(error = %err, "chat turn failed");
        let reply = Message::error_reply(err.to_string());
        if let Some(conversation) = conversation {
            if let Err(e) = self.gateway.save_message(conversation, &reply).await {
                warn!(conversation_id = %conversation, error = %e, "failed to persist error reply");
            }
        }
        self.publish(conversation, reply.clone());
        reply
    }

    fn publish(&self, conversation: Option<&ConversationId>, message: Message) {
        {
            let mut transcript = self.transcript.lock();
            if transcript.accepts(conversation) {
                transcript.messages.push(message.clone());
            }
        }
        let _ = self.events.send(ChatEvent::Message(message));
    }

    fn turn_lock(&self, conversation: &ConversationId) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(self.turns.lock().entry(conversation.clone()).or_default())
    }

    // ─────────────────────────────────────────────────────────────────────
    // History
    // ─────────────────────────────────────────────────────────────────────

    /// Replace the transcript with the newest page of the active conversation.
    pub async fn load_history(&self) -> Result<Vec<Message>, ClientError> {
        let conversation = self.ensure_conversation().await?;
        let page = self
            .gateway
            .get_messages(&conversation, 1, self.config.page_size)
            .await?;
        let mut transcript = self.transcript.lock();
        transcript.reset(Some(conversation));
        transcript.messages.clone_from(&page.messages);
        transcript.pages_loaded = 1;
        transcript.has_more = page.has_more;
        Ok(page.messages)
    }

    /// Prepend the next older page; returns the messages added.
    pub async fn load_more(&self) -> Result<Vec<Message>, ClientError> {
        let conversation = self.ensure_conversation().await?;
        let next_page = {
            let transcript = self.transcript.lock();
            if transcript.pages_loaded > 0 && !transcript.has_more {
                return Ok(Vec::new());
            }
            transcript.pages_loaded + 1
        };
        let page = self
            .gateway
            .get_messages(&conversation, next_page, self.config.page_size)
            .await?;

        let mut transcript = self.transcript.lock();
        if transcript.conversation.as_ref() != Some(&conversation) {
            return Ok(Vec::new());
        }
        let known: HashSet<_> = transcript.messages.iter().map(|m| m.id.clone()).collect();
        let older: Vec<Message> = page
            .messages
            .into_iter()
            .filter(|m| !known.contains(&m.id))
            .collect();
        let _ = transcript.messages.splice(0..0, older.iter().cloned());
        transcript.pages_loaded = next_page;
        transcript.has_more = page.has_more;
        Ok(older)
    }

    /// Whether older pages remain to be loaded.
    pub fn has_more(&self) -> bool {
        self.transcript.lock().has_more
    }

    // ─────────────────────────────────────────────────────────────────────
    // Conversation management
    // ─────────────────────────────────────────────────────────────────────

    /// The user's conversations, most recently active first.
    pub async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, ClientError> {
        Ok(self
            .gateway
            .list_conversations(self.config.user_id, self.config.page_size)
            .await?)
    }

    /// Retitle a conversation.
    pub async fn rename_conversation(
        &self,
        conversation_id: &ConversationId,
        title: &str,
    ) -> Result<Conversation, ClientError> {
        Ok(self
            .gateway
            .rename_conversation(conversation_id, title)
            .await?)
    }

    /// Delete a conversation; forgets it locally when it was active.
    pub async fn delete_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<(), ClientError> {
        let mut current = self.current.lock().await;
        self.gateway.delete_conversation(conversation_id).await?;
        let _ = self.turns.lock().remove(conversation_id);

        let stored = self.storage.get(CONVERSATION_STORAGE_KEY)?;
        if current.as_ref() == Some(conversation_id)
            || stored.as_deref() == Some(conversation_id.as_str())
        {
            *current = None;
            self.storage.remove(CONVERSATION_STORAGE_KEY)?;
            self.transcript.lock().reset(None);
            info!(conversation_id = %conversation_id, "deleted active conversation");
        }
        Ok(())
    }
}
