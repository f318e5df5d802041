use std::pin::Pin;

use futures_util::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use parley_types::llm::{CompletionRequest, LlmError, StreamEvent};

use crate::llm::box_provider::BoxLlmProvider;

/// Finite, forward-only sequence of text parts from one provider call.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send + 'static>>;

/// Stream the text of one completion.
///
/// Yields each non-empty text delta in provider order. The sequence ends
/// cleanly only when the provider reports `Done`; a provider stream that
/// stops without it yields a final `LlmError::Stream`. Cancelling the token
/// yields `LlmError::Cancelled` and drops the provider stream.
pub fn stream_text(
    provider: &BoxLlmProvider,
    mut request: CompletionRequest,
    cancel: CancellationToken,
) -> TextStream {
    request.stream = true;
    let mut events = provider.stream(request);

    Box::pin(async_stream::try_stream! {
        loop {
            let event = tokio::select! {
                biased;
                () = cancel.cancelled() => Err(LlmError::Cancelled),
                next = events.next() => next.unwrap_or_else(|| {
                    Err(LlmError::Stream(
                        "provider stream ended before completion".to_string(),
                    ))
                }),
            }?;

            match event {
                StreamEvent::TextDelta { text } => {
                    if !text.is_empty() {
                        yield text;
                    }
                }
                StreamEvent::MessageDelta { stop_reason } => {
                    tracing::debug!(%stop_reason, "provider finished generating");
                }
                StreamEvent::Usage(usage) => {
                    tracing::debug!(
                        input_tokens = usage.input_tokens,
                        output_tokens = usage.output_tokens,
                        "provider usage"
                    );
                }
                StreamEvent::Connected => {}
                StreamEvent::Done => break,
            }
        }
    })
}

/// Non-streaming variant: one call, all text parts concatenated.
pub async fn complete_text(
    provider: &BoxLlmProvider,
    mut request: CompletionRequest,
    cancel: &CancellationToken,
) -> Result<String, LlmError> {
    request.stream = false;
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(LlmError::Cancelled),
        response = provider.complete(&request) => Ok(response?.content),
    }
}
