//! Topic Summarizer.
//!
//! `summarize_topic` derives a short label for a chat from its early
//! history. The orchestrator decides when to call it.

use tokio_util::sync::CancellationToken;

use parley_types::llm::{CompletionRequest, LlmError, Message};

use crate::llm::box_provider::BoxLlmProvider;
use crate::stream::complete_text;

/// Instruction appended after the conversation.
pub const TOPIC_INSTRUCTION: &str =
    "Get topic that user is asking, maximum 5 words, use user's language";

const TOPIC_MAX_TOKENS: u32 = 50;

/// Summarize the topic of a conversation in one non-streaming call.
///
/// The result is every returned text part concatenated, trimmed of
/// whitespace and surrounding quotes.
#[tracing::instrument(
    name = "summarize_topic",
    skip(provider, history, cancel),
    fields(model = %model, messages = history.len())
)]
pub async fn summarize_topic(
    provider: &BoxLlmProvider,
    model: &str,
    history: &[Message],
    cancel: &CancellationToken,
) -> Result<String, LlmError> {
    let mut messages = history.to_vec();
    messages.push(Message::user(TOPIC_INSTRUCTION));

    let request = CompletionRequest {
        model: model.to_string(),
        messages,
        system: None,
        max_tokens: TOPIC_MAX_TOKENS,
        temperature: Some(0.3),
        stream: false,
    };

    let raw = complete_text(provider, request, cancel).await?;
    Ok(clean_topic(&raw))
}

fn clean_topic(raw: &str) -> String {
    raw.trim()
        .trim_matches('"')
        .trim_matches('\'')
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedProvider;

    #[test]
    fn test_clean_topic_strips_quotes_and_whitespace() {
        assert_eq!(clean_topic("  \"Rust lifetimes\"\n"), "Rust lifetimes");
        assert_eq!(clean_topic("'Resep nasi goreng'"), "Resep nasi goreng");
        assert_eq!(clean_topic("Weekend plans"), "Weekend plans");
    }

    #[tokio::test]
    async fn test_summarize_topic_appends_instruction_after_history() {
        let scripted = ScriptedProvider::completing("  \"Greeting\" ");
        let recorded = scripted.recorded_requests();
        let provider = BoxLlmProvider::new(scripted);

        let history = vec![Message::user("hello"), Message::model("Hi! How can I help?")];
        let topic = summarize_topic(&provider, "topic-model", &history, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(topic, "Greeting");

        let requests = recorded.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.model, "topic-model");
        assert!(!request.stream);
        assert_eq!(request.messages.len(), 3);
        assert_eq!(request.messages[0].content, "hello");
        assert_eq!(request.messages[2].content, TOPIC_INSTRUCTION);
    }

    #[tokio::test]
    async fn test_summarize_topic_propagates_provider_error() {
        let provider = BoxLlmProvider::new(ScriptedProvider::failing_complete("quota"));
        let result = summarize_topic(
            &provider,
            "m",
            &[Message::user("hello")],
            &CancellationToken::new(),
        )
        .await;
        assert!(matches!(result, Err(LlmError::Provider { .. })));
    }
}
