//! Server-sent event driver shared by the streaming adapters

use eventsource_stream::{EventStreamError, Eventsource};
use futures::StreamExt;
use reqwest::Response;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, Result};
use crate::http::network_error;

/// Terminal sentinel sent by chat-completions vendors
pub(crate) const DONE_SENTINEL: &str = "[DONE]";

/// What the driver should do after an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SseControl {
    Continue,
    Stop,
}

/// Feed every SSE record of `response` to `on_event(event_name, data)`.
///
/// Ends on the `[DONE]` sentinel, on [`SseControl::Stop`] or at end of body.
/// Undecodable records are skipped; transport failures and cancellation end
/// the stream with an error.
pub(crate) async fn drive<F>(
    response: Response,
    cancel: &CancellationToken,
    mut on_event: F,
) -> Result<()>
where
    F: FnMut(&str, &str) -> Result<SseControl>,
{
    let mut events = Box::pin(response.bytes_stream().eventsource());

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled),
            next = events.next() => next,
        };

        match next {
            None => return Ok(()),
            Some(Ok(event)) => {
                let data = event.data.trim();
                if data == DONE_SENTINEL {
                    return Ok(());
                }
                if data.is_empty() {
                    continue;
                }
                if on_event(&event.event, data)? == SseControl::Stop {
                    return Ok(());
                }
            }
            Some(Err(EventStreamError::Transport(e))) => return Err(network_error(e)),
            Some(Err(e)) => {
                debug!(error = %e, "Skipping undecodable SSE record");
            }
        }
    }
}

/// Decode one JSON payload, logging and skipping malformed chunks
pub(crate) fn parse_chunk<T: serde::de::DeserializeOwned>(data: &str) -> Option<T> {
    match serde_json::from_str(data) {
        Ok(chunk) => Some(chunk),
        Err(e) => {
            debug!(error = %e, "Skipping malformed stream chunk");
            None
        }
    }
}
