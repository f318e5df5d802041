//! In-process test doubles: a scripted provider and an in-memory store.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures_util::Stream;

use parley_types::chat::{Chat, ChatMessage, MessageRole, NewMessage};
use parley_types::error::RepositoryError;
use parley_types::llm::{
    CompletionRequest, CompletionResponse, LlmError, Message, ProviderCapabilities, StopReason,
    StreamEvent, Usage,
};

use crate::chat::repository::{ChatDirectory, ChatStore, ChatTransaction};
use crate::llm::provider::LlmProvider;

pub fn request_for(text: &str) -> CompletionRequest {
    CompletionRequest {
        model: "test-model".to_string(),
        messages: vec![Message::user(text)],
        system: None,
        max_tokens: 128,
        temperature: None,
        stream: true,
    }
}

#[derive(Clone)]
enum Step {
    Text(String),
    Fail(String),
    Done,
}

/// Provider that replays canned streams and completions.
///
/// Each `stream` call consumes the next queued script; the last script
/// repeats once the queue is down to one.
pub struct ScriptedProvider {
    capabilities: ProviderCapabilities,
    scripts: Mutex<VecDeque<Vec<Step>>>,
    completion: Result<String, String>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            capabilities: ProviderCapabilities {
                streaming: true,
                max_context_tokens: 1_000_000,
                max_output_tokens: 8_192,
            },
            scripts: Mutex::new(VecDeque::new()),
            completion: Ok("Topic".to_string()),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn streaming(parts: &[&str]) -> Self {
        Self::new().with_stream(parts)
    }

    pub fn truncated(parts: &[&str]) -> Self {
        Self::new().with_truncated(parts)
    }

    pub fn failing_after(parts: &[&str], message: &str) -> Self {
        Self::new().with_failure(parts, message)
    }

    pub fn completing(text: &str) -> Self {
        Self::new().with_completion(text)
    }

    pub fn failing_complete(message: &str) -> Self {
        Self::new().with_failing_completion(message)
    }

    pub fn with_stream(self, parts: &[&str]) -> Self {
        let mut steps = texts(parts);
        steps.push(Step::Done);
        self.push(steps)
    }

    pub fn with_truncated(self, parts: &[&str]) -> Self {
        self.push(texts(parts))
    }

    pub fn with_failure(self, parts: &[&str], message: &str) -> Self {
        let mut steps = texts(parts);
        steps.push(Step::Fail(message.to_string()));
        self.push(steps)
    }

    pub fn with_completion(mut self, text: &str) -> Self {
        self.completion = Ok(text.to_string());
        self
    }

    pub fn with_failing_completion(mut self, message: &str) -> Self {
        self.completion = Err(message.to_string());
        self
    }

    /// Every request seen, streaming and non-streaming, in call order.
    pub fn recorded_requests(&self) -> Arc<Mutex<Vec<CompletionRequest>>> {
        Arc::clone(&self.requests)
    }

    fn push(self, steps: Vec<Step>) -> Self {
        self.scripts.lock().unwrap().push_back(steps);
        self
    }

    fn next_script(&self) -> Vec<Step> {
        let mut scripts = self.scripts.lock().unwrap();
        if scripts.len() > 1 {
            scripts.pop_front().unwrap()
        } else {
            scripts.front().cloned().unwrap_or_else(|| vec![Step::Done])
        }
    }
}

fn texts(parts: &[&str]) -> Vec<Step> {
    parts.iter().map(|p| Step::Text(p.to_string())).collect()
}

impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }

    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl Future<Output = Result<CompletionResponse, LlmError>> + Send {
        self.requests.lock().unwrap().push(request.clone());
        let result = self.completion.clone();
        let model = request.model.clone();
        async move {
            match result {
                Ok(content) => Ok(CompletionResponse {
                    content,
                    model,
                    stop_reason: StopReason::EndTurn,
                    usage: Usage::default(),
                }),
                Err(message) => Err(LlmError::Provider { message }),
            }
        }
    }

    fn stream(
        &self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send + 'static>> {
        self.requests.lock().unwrap().push(request);
        let mut items = vec![Ok(StreamEvent::Connected)];
        for step in self.next_script() {
            match step {
                Step::Text(text) => items.push(Ok(StreamEvent::TextDelta { text })),
                Step::Fail(message) => {
                    items.push(Err(LlmError::Provider { message }));
                    break;
                }
                Step::Done => {
                    items.push(Ok(StreamEvent::MessageDelta {
                        stop_reason: StopReason::EndTurn,
                    }));
                    items.push(Ok(StreamEvent::Done));
                }
            }
        }
        Box::pin(futures_util::stream::iter(items))
    }
}

#[derive(Clone, Default)]
struct Tables {
    chats: BTreeMap<i64, Chat>,
    messages: Vec<ChatMessage>,
    next_chat_id: i64,
    next_message_id: i64,
}

#[derive(Default)]
struct Faults {
    ops: HashSet<&'static str>,
    nth_insert: Option<usize>,
    inserts: usize,
    lookup_delay: Option<Duration>,
    begins: usize,
}

/// In-memory store with snapshot transactions and fault injection.
#[derive(Clone, Default)]
pub struct MemoryChatStore {
    tables: Arc<Mutex<Tables>>,
    faults: Arc<Mutex<Faults>>,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a committed chat with `messages` alternating user/model messages.
    pub fn seed_chat(&self, user_id: i64, messages: usize) -> Chat {
        let mut tables = self.tables.lock().unwrap();
        let chat = tables.create_chat(user_id);
        for i in 0..messages {
            let role = if i % 2 == 0 {
                MessageRole::User
            } else {
                MessageRole::Model
            };
            tables.insert_message(&NewMessage {
                chat_id: chat.id,
                user_id,
                role,
                content: format!("seed {i}"),
            });
        }
        chat
    }

    pub fn chats(&self) -> Vec<Chat> {
        self.tables.lock().unwrap().chats.values().cloned().collect()
    }

    pub fn chat(&self, chat_id: i64) -> Option<Chat> {
        self.tables.lock().unwrap().chats.get(&chat_id).cloned()
    }

    pub fn messages(&self, chat_id: i64) -> Vec<ChatMessage> {
        self.tables.lock().unwrap().messages_of(chat_id)
    }

    pub fn message_count(&self) -> usize {
        self.tables.lock().unwrap().messages.len()
    }

    pub fn begin_count(&self) -> usize {
        self.faults.lock().unwrap().begins
    }

    /// Make every call to the named operation fail.
    pub fn fail_on(&self, op: &'static str) {
        self.faults.lock().unwrap().ops.insert(op);
    }

    /// Undo every injected failure.
    pub fn clear_failures(&self) {
        let mut faults = self.faults.lock().unwrap();
        faults.ops.clear();
        faults.nth_insert = None;
    }

    /// Make the n-th message insert (1-based, counted across transactions) fail.
    pub fn fail_on_nth_insert(&self, n: usize) {
        self.faults.lock().unwrap().nth_insert = Some(n);
    }

    pub fn delay_lookups(&self, delay: Duration) {
        self.faults.lock().unwrap().lookup_delay = Some(delay);
    }

    fn check(&self, op: &'static str) -> Result<(), RepositoryError> {
        if self.faults.lock().unwrap().ops.contains(op) {
            return Err(RepositoryError::Query(format!("injected failure in {op}")));
        }
        Ok(())
    }
}

impl Tables {
    fn create_chat(&mut self, user_id: i64) -> Chat {
        self.next_chat_id += 1;
        let now = Utc::now();
        let chat = Chat {
            id: self.next_chat_id,
            user_id,
            topic: None,
            created_at: now,
            updated_at: now,
        };
        self.chats.insert(chat.id, chat.clone());
        chat
    }

    fn insert_message(&mut self, message: &NewMessage) -> ChatMessage {
        self.next_message_id += 1;
        let now = Utc::now();
        let stored = ChatMessage {
            id: self.next_message_id,
            chat_id: message.chat_id,
            user_id: message.user_id,
            role: message.role,
            content: message.content.clone(),
            created_at: now,
            updated_at: now,
        };
        self.messages.push(stored.clone());
        stored
    }

    fn messages_of(&self, chat_id: i64) -> Vec<ChatMessage> {
        self.messages
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .cloned()
            .collect()
    }
}

/// Works on a private copy of the tables; commit swaps it in.
pub struct MemoryTransaction {
    store: MemoryChatStore,
    staged: Tables,
}

impl ChatStore for MemoryChatStore {
    type Tx = MemoryTransaction;

    async fn find_chat(&self, chat_id: i64) -> Result<Option<Chat>, RepositoryError> {
        self.check("find_chat")?;
        Ok(self.chat(chat_id))
    }

    async fn list_messages(&self, chat_id: i64) -> Result<Vec<ChatMessage>, RepositoryError> {
        self.check("list_messages")?;
        Ok(self.messages(chat_id))
    }

    async fn begin(&self) -> Result<MemoryTransaction, RepositoryError> {
        self.faults.lock().unwrap().begins += 1;
        self.check("begin")?;
        let staged = self.tables.lock().unwrap().clone();
        Ok(MemoryTransaction {
            store: self.clone(),
            staged,
        })
    }
}

impl ChatTransaction for MemoryTransaction {
    async fn find_chat(&mut self, chat_id: i64) -> Result<Option<Chat>, RepositoryError> {
        self.store.check("find_chat")?;
        Ok(self.staged.chats.get(&chat_id).cloned())
    }

    async fn create_chat(&mut self, user_id: i64) -> Result<Chat, RepositoryError> {
        self.store.check("create_chat")?;
        Ok(self.staged.create_chat(user_id))
    }

    async fn insert_message(&mut self, message: &NewMessage) -> Result<ChatMessage, RepositoryError> {
        self.store.check("insert_message")?;
        {
            let mut faults = self.store.faults.lock().unwrap();
            faults.inserts += 1;
            if faults.nth_insert == Some(faults.inserts) {
                return Err(RepositoryError::Query("injected insert failure".to_string()));
            }
        }
        if !self.staged.chats.contains_key(&message.chat_id) {
            return Err(RepositoryError::Query("FOREIGN KEY constraint failed".to_string()));
        }
        Ok(self.staged.insert_message(message))
    }

    async fn update_topic(&mut self, chat_id: i64, topic: &str) -> Result<(), RepositoryError> {
        self.store.check("update_topic")?;
        let chat = self
            .staged
            .chats
            .get_mut(&chat_id)
            .ok_or(RepositoryError::NotFound)?;
        chat.topic = Some(topic.to_string());
        chat.updated_at = Utc::now();
        Ok(())
    }

    async fn commit(self) -> Result<(), RepositoryError> {
        self.store.check("commit")?;
        *self.store.tables.lock().unwrap() = self.staged;
        Ok(())
    }

    async fn rollback(self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

impl ChatDirectory for MemoryChatStore {
    async fn find_owned_chat(
        &self,
        chat_id: i64,
        user_id: i64,
    ) -> Result<Option<Chat>, RepositoryError> {
        let delay = self.faults.lock().unwrap().lookup_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check("find_owned_chat")?;
        Ok(self
            .chat(chat_id)
            .filter(|chat| chat.user_id == user_id))
    }
}
