//! Research event streaming over Server-Sent Events

use std::pin::Pin;

use async_stream::stream;
use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource};
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;

use crate::{error::Error, types::ResearchEvent};

/// A stream of research events. Transport failures show up as a final
/// synthetic `error` event rather than as an `Err`.
pub type ResearchEventStream = Pin<Box<dyn Stream<Item = ResearchEvent> + Send>>;

/// Decode the payload of one `data:` frame.
///
/// Blank payloads and frames that are not a valid event are logged and
/// skipped; they never end the stream.
pub fn decode_frame(data: &str) -> Option<ResearchEvent> {
    let data = data.trim();
    if data.is_empty() {
        return None;
    }

    match serde_json::from_str::<ResearchEvent>(data) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::warn!("Skipping malformed research event frame: {} ({})", e, preview(data));
            None
        }
    }
}

fn preview(data: &str) -> String {
    let mut chars = data.chars();
    let head: String = chars.by_ref().take(80).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

/// Turn an event source into a research event stream.
pub(crate) fn create_stream(
    mut event_source: EventSource,
    cancel: CancellationToken,
) -> impl Stream<Item = ResearchEvent> + Send {
    stream! {
        let mut frames = 0usize;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                next = event_source.next() => Some(next),
            };

            let next = match next {
                None => {
                    tracing::debug!("Research stream cancelled after {} frames", frames);
                    event_source.close();
                    break;
                }
                Some(None) => break,
                Some(Some(next)) => next,
            };

            match next {
                Ok(Event::Open) => {
                    tracing::debug!("Research stream opened");
                }
                Ok(Event::Message(msg)) => {
                    frames += 1;
                    if let Some(event) = decode_frame(&msg.data) {
                        yield event;
                    }
                }
                Err(reqwest_eventsource::Error::StreamEnded) => {
                    tracing::debug!("Research stream closed after {} frames", frames);
                    break;
                }
                Err(e) => {
                    event_source.close();
                    let message = describe_failure(e).await;
                    tracing::warn!("Research stream failed: {}", message);
                    yield ResearchEvent::error(message);
                    break;
                }
            }
        }
    }
}

/// Build the human-readable message for a transport-level failure.
async fn describe_failure(error: reqwest_eventsource::Error) -> String {
    use reqwest_eventsource::Error as SseError;

    match error {
        SseError::InvalidStatusCode(status, response) => {
            let body = response.text().await.unwrap_or_default();
            Error::api(status.as_u16(), crate::client::api_error_message(&body)).user_message()
        }
        SseError::InvalidContentType(content_type, _) => Error::Sse(format!(
            "unexpected content type {:?}",
            content_type.to_str().unwrap_or("<binary>")
        ))
        .user_message(),
        SseError::Transport(e) => Error::Http(e).user_message(),
        other => Error::Sse(other.to_string()).user_message(),
    }
}
