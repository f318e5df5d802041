//! SSE stream creation for `streamGenerateContent?alt=sse`.
//!
//! Every `data:` payload is a complete `GenerateContentResponse` carrying the
//! next slice of text. There is no terminal event: the server simply closes
//! the connection. A chunk with a `finishReason` marks the response as
//! complete, so `Done` is emitted only when one was seen before the close.
//! A close without it surfaces as a truncated stream downstream. Dropping
//! the stream drops the `EventSource`, which closes the connection.

use std::pin::Pin;

use futures_util::{Stream, StreamExt};
use reqwest_eventsource::{Event, EventSource};
use secrecy::{ExposeSecret, SecretString};

use parley_types::llm::{LlmError, StreamEvent, Usage};

use super::client::status_error;
use super::types::{GeminiRequest, GeminiResponse, map_finish_reason};

/// Open a streaming SSE connection to the Gemini API.
///
/// Returns a `Stream` of [`StreamEvent`]s. The connection is closed when
/// the stream is dropped.
pub fn create_gemini_stream(
    client: &reqwest::Client,
    url: &str,
    body: GeminiRequest,
    api_key: &SecretString,
) -> Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send + 'static>> {
    let request = client
        .post(url)
        .header("x-goog-api-key", api_key.expose_secret())
        .json(&body);

    Box::pin(async_stream::try_stream! {
        let mut source = EventSource::new(request).map_err(|e| LlmError::Provider {
            message: format!("failed to open stream: {e}"),
        })?;
        source.set_retry_policy(Box::new(reqwest_eventsource::retry::Never));

        let mut finished = false;
        while let Some(event) = source.next().await {
            match event {
                Ok(Event::Open) => yield StreamEvent::Connected,
                Ok(Event::Message(message)) => {
                    if message.data.trim().is_empty() {
                        continue;
                    }
                    for event in decode_chunk(&message.data)? {
                        if matches!(event, StreamEvent::MessageDelta { .. }) {
                            finished = true;
                        }
                        yield event;
                    }
                }
                Err(reqwest_eventsource::Error::StreamEnded) => break,
                Err(err) => Err::<(), _>(map_stream_error(err).await)?,
            }
        }

        source.close();
        if finished {
            yield StreamEvent::Done;
        } else {
            tracing::debug!("gemini stream closed without a finish reason");
        }
    })
}

fn decode_chunk(data: &str) -> Result<Vec<StreamEvent>, LlmError> {
    let chunk: GeminiResponse = serde_json::from_str(data)
        .map_err(|e| LlmError::Deserialization(format!("invalid stream chunk: {e}")))?;
    chunk_events(&chunk)
}

/// Translate one SSE chunk into stream events.
///
/// Text first, then usage and the stop reason once the chunk carries a
/// `finishReason`.
pub(crate) fn chunk_events(chunk: &GeminiResponse) -> Result<Vec<StreamEvent>, LlmError> {
    if chunk.candidates.is_empty() {
        if let Some(reason) = chunk.block_reason() {
            return Err(LlmError::Provider {
                message: format!("prompt blocked: {reason}"),
            });
        }
    }

    let mut events = Vec::new();
    let text = chunk.text();
    if !text.is_empty() {
        events.push(StreamEvent::TextDelta { text });
    }

    if let Some(reason) = chunk.finish_reason() {
        if let Some(meta) = &chunk.usage_metadata {
            events.push(StreamEvent::Usage(Usage::from(meta)));
        }
        events.push(StreamEvent::MessageDelta {
            stop_reason: map_finish_reason(reason),
        });
    }

    Ok(events)
}

async fn map_stream_error(err: reqwest_eventsource::Error) -> LlmError {
    match err {
        reqwest_eventsource::Error::InvalidStatusCode(status, response) => {
            let body = response.text().await.unwrap_or_default();
            status_error(status.as_u16(), &body)
        }
        reqwest_eventsource::Error::Transport(e) => LlmError::Provider {
            message: format!("HTTP request failed: {e}"),
        },
        other => LlmError::Stream(other.to_string()),
    }
}
