//! Chat Stream Orchestrator.
//!
//! `ChatStreamService::connect` opens one long-lived duplex channel per
//! client connection. Turns read from the channel run strictly in order:
//! each one either commits or fails before the next is read.
//!
//! Per turn:
//! 1. validate
//! 2. resolve the chat and load its history from committed state
//! 3. stream fragments out while accumulating the full text
//! 4. summarize the topic while the chat is young
//! 5. create the chat if needed, persist both sides of the exchange and set
//!    the topic in one short write transaction
//! 6. emit `END` with the committed chat id
//!
//! No transaction is open while the model streams, so other connections'
//! turns never wait on this one. A chat that does not exist yet is announced
//! as [`PENDING_CHAT_ID`] until its `END`.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use parley_types::config::ParleyConfig;
use parley_types::error::ChatError;
use parley_types::fragment::{MessageFragment, StreamReply, TurnRequest};
use parley_types::llm::{CompletionRequest, Message};

use super::repository::{ChatStore, ChatTransaction};
use super::topic::summarize_topic;
use super::transaction::{append_messages, ensure_chat, resolve_chat};
use crate::llm::box_provider::BoxLlmProvider;
use crate::stream::stream_text;

/// Chat id carried by a new chat's fragments until it is committed.
pub const PENDING_CHAT_ID: i64 = 0;

/// Banner carried by the `START` fragment.
pub const START_BANNER: &str = "Starting chat...";

/// Banner carried by the `END` fragment.
pub const END_BANNER: &str = "Chat ended.";

/// Per-turn model and policy settings.
#[derive(Debug, Clone)]
pub struct TurnSettings {
    pub model: String,
    pub topic_model: String,
    pub system_prompt: String,
    pub max_tokens: u32,
    pub temperature: Option<f64>,
    /// Summarize while the post-append history has at most this many messages.
    pub topic_history_threshold: usize,
    /// Consecutive infrastructure failures that close the session.
    pub max_consecutive_failures: u32,
}

impl TurnSettings {
    pub fn from_config(config: &ParleyConfig) -> Self {
        Self {
            model: config.model.clone(),
            topic_model: config.topic_model().to_string(),
            system_prompt: config.system_prompt.clone(),
            max_tokens: config.max_tokens,
            temperature: Some(config.temperature),
            topic_history_threshold: config.topic_history_threshold,
            max_consecutive_failures: config.max_consecutive_failures,
        }
    }
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self::from_config(&ParleyConfig::default())
    }
}

/// Client end of one orchestrator session.
///
/// Dropping `turns` ends the session after the current turn. The session
/// drops its reply sender when it ends, so `replies` yields `None`.
pub struct StreamChannel {
    pub turns: mpsc::UnboundedSender<TurnRequest>,
    pub replies: mpsc::UnboundedReceiver<StreamReply>,
}

/// Runs chat turns for connected clients.
///
/// Generic over `ChatStore` so parley-core never depends on parley-infra.
pub struct ChatStreamService<S: ChatStore> {
    store: Arc<S>,
    provider: Arc<BoxLlmProvider>,
    settings: Arc<TurnSettings>,
}

impl<S: ChatStore> Clone for ChatStreamService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            provider: Arc::clone(&self.provider),
            settings: Arc::clone(&self.settings),
        }
    }
}

impl<S: ChatStore + 'static> ChatStreamService<S> {
    pub fn new(store: Arc<S>, provider: Arc<BoxLlmProvider>, settings: TurnSettings) -> Self {
        Self {
            store,
            provider,
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &TurnSettings {
        &self.settings
    }

    /// Open a stream session for an authenticated user.
    ///
    /// Spawns the session task and returns the client end. Cancelling
    /// `cancel` aborts the in-flight turn without persisting it and ends the
    /// session.
    pub fn connect(&self, user_id: i64, cancel: CancellationToken) -> StreamChannel {
        let (turn_tx, turn_rx) = mpsc::unbounded_channel();
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();

        let service = self.clone();
        tokio::spawn(async move {
            service.run_session(user_id, turn_rx, reply_tx, cancel).await;
        });

        StreamChannel {
            turns: turn_tx,
            replies: reply_rx,
        }
    }

    async fn run_session(
        self,
        user_id: i64,
        mut turns: mpsc::UnboundedReceiver<TurnRequest>,
        replies: mpsc::UnboundedSender<StreamReply>,
        cancel: CancellationToken,
    ) {
        tracing::info!(user_id, "chat stream opened");
        let mut consecutive_failures = 0u32;

        loop {
            let turn = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                turn = turns.recv() => match turn {
                    Some(turn) => turn,
                    None => break,
                },
            };

            match self.handle_turn(user_id, &turn, &replies, &cancel).await {
                Ok(_) => consecutive_failures = 0,
                Err(err) if err.is_fatal() => {
                    tracing::info!(user_id, error = %err, "chat stream aborted");
                    break;
                }
                Err(err) => {
                    tracing::warn!(
                        user_id,
                        chat_id = ?turn.target_chat(),
                        error = %err,
                        "turn failed"
                    );
                    let notice = StreamReply::TurnFailed {
                        chat_id: turn.target_chat(),
                        message: err.client_message(),
                    };
                    if replies.send(notice).is_err() {
                        break;
                    }

                    if err.is_infrastructure() {
                        consecutive_failures += 1;
                        if consecutive_failures >= self.settings.max_consecutive_failures {
                            tracing::error!(
                                user_id,
                                failures = consecutive_failures,
                                "closing chat stream after repeated failures"
                            );
                            break;
                        }
                    }
                }
            }
        }

        tracing::info!(user_id, "chat stream closed");
    }

    /// Run one turn. Returns the committed chat id.
    ///
    /// Nothing is written unless the whole turn succeeds.
    #[tracing::instrument(
        name = "chat_turn",
        skip(self, turn, replies, cancel),
        fields(requested_chat = ?turn.chat_id)
    )]
    async fn handle_turn(
        &self,
        user_id: i64,
        turn: &TurnRequest,
        replies: &mpsc::UnboundedSender<StreamReply>,
        cancel: &CancellationToken,
    ) -> Result<i64, ChatError> {
        validate_turn(user_id, turn)?;
        let settings = &self.settings;

        let existing = resolve_chat(&*self.store, user_id, turn.target_chat()).await?;
        let history: Vec<Message> = match &existing {
            Some(chat) => self
                .store
                .list_messages(chat.id)
                .await?
                .iter()
                .map(Message::from)
                .collect(),
            None => Vec::new(),
        };
        let announced = existing.as_ref().map_or(PENDING_CHAT_ID, |chat| chat.id);

        emit(replies, MessageFragment::start(announced, START_BANNER))?;

        let mut context = history.clone();
        context.push(Message::user(&turn.text));
        let request = CompletionRequest {
            model: settings.model.clone(),
            messages: context,
            system: Some(settings.system_prompt.clone()),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            stream: true,
        };

        let mut parts = stream_text(&self.provider, request, cancel.clone());
        let mut response = String::new();
        while let Some(part) = parts.next().await {
            let part = part?;
            response.push_str(&part);
            emit(replies, MessageFragment::progress(announced, part))?;
        }

        let history_len = history.len() + 2;
        let topic = if history_len <= settings.topic_history_threshold {
            let mut transcript = history;
            transcript.push(Message::user(&turn.text));
            transcript.push(Message::model(&response));

            let topic =
                summarize_topic(&self.provider, &settings.topic_model, &transcript, cancel).await?;
            if topic.is_empty() {
                tracing::warn!(chat_id = announced, "topic summary was empty, leaving topic unset");
                None
            } else {
                Some(topic)
            }
        } else {
            None
        };

        if cancel.is_cancelled() {
            return Err(ChatError::Cancelled);
        }

        let exchange = Exchange {
            chat_id: existing.map(|chat| chat.id),
            user_text: &turn.text,
            model_text: &response,
            topic: topic.as_deref(),
        };
        let chat_id = self.persist(user_id, &exchange).await?;

        emit(replies, MessageFragment::end(chat_id, END_BANNER))?;
        Ok(chat_id)
    }

    /// Write one finished exchange in its own transaction.
    ///
    /// Commits only on success. Every other path rolls back.
    async fn persist(&self, user_id: i64, exchange: &Exchange<'_>) -> Result<i64, ChatError> {
        let mut tx = self.store.begin().await?;
        match write_exchange(&mut tx, user_id, exchange).await {
            Ok(chat_id) => {
                tx.commit().await?;
                tracing::info!(chat_id, "turn committed");
                Ok(chat_id)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }
}

/// A completed exchange waiting to be persisted.
struct Exchange<'a> {
    /// `None` creates a new chat.
    chat_id: Option<i64>,
    user_text: &'a str,
    model_text: &'a str,
    topic: Option<&'a str>,
}

async fn write_exchange<T: ChatTransaction>(
    tx: &mut T,
    user_id: i64,
    exchange: &Exchange<'_>,
) -> Result<i64, ChatError> {
    let chat = ensure_chat(tx, user_id, exchange.chat_id).await?;
    append_messages(tx, chat.id, user_id, exchange.user_text, exchange.model_text).await?;

    if let Some(topic) = exchange.topic {
        tx.update_topic(chat.id, topic).await?;
        tracing::debug!(chat_id = chat.id, topic = %topic, "topic updated");
    }

    Ok(chat.id)
}

fn validate_turn(user_id: i64, turn: &TurnRequest) -> Result<(), ChatError> {
    if turn.user_id != user_id {
        return Err(ChatError::Validation(
            "user_id does not match the stream session".to_string(),
        ));
    }
    if turn.text.trim().is_empty() {
        return Err(ChatError::Validation("message is required".to_string()));
    }
    if matches!(turn.chat_id, Some(id) if id < 0) {
        return Err(ChatError::Validation("chat_id must not be negative".to_string()));
    }
    Ok(())
}

fn emit(
    replies: &mpsc::UnboundedSender<StreamReply>,
    fragment: MessageFragment,
) -> Result<(), ChatError> {
    replies
        .send(StreamReply::Fragment(fragment))
        .map_err(|_| ChatError::PeerGone)
}
