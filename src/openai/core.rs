//! Streaming client for an OpenAI-compatible chat completions
//! endpoint (Groq in the default configuration). The response is
//! server-sent events; parsed content fragments are forwarded through
//! a channel for progressive display while the full response
//! accumulates for the transcript.

use std::time::Duration;

use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::chat::{Message, StreamAggregator, StreamError};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Delta {
    Content { content: String },
    // Role-announcement and empty deltas carry no text.
    Stop {},
}

#[derive(Debug, Deserialize)]
struct CompletionChunkChoice {
    delta: Delta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    // Providers differ on which envelope fields they include per
    // chunk, so only `choices` is required.
    choices: Vec<CompletionChunkChoice>,
}

/// Sends the prompt to `{api_hostname}/v1/chat/completions` with
/// streaming enabled and drives the response to completion. Returns
/// the final concatenated response text. Any abnormal end of the
/// stream, including cancellation via `cancel`, yields
/// `StreamError::Interrupted` carrying the partial text.
pub async fn completion_stream(
    tx: mpsc::UnboundedSender<String>,
    messages: &[Message],
    api_hostname: &str,
    api_key: &str,
    model: &str,
    temperature: Option<f64>,
    cancel: &CancellationToken,
) -> Result<String, StreamError> {
    let mut payload = json!({
        "model": model,
        "messages": messages,
        "stream": true,
    });
    if let Some(temperature) = temperature {
        payload["temperature"] = json!(temperature);
    }

    let mut aggregator = StreamAggregator::new(Some(tx));

    let url = format!("{}/v1/chat/completions", api_hostname.trim_end_matches("/"));
    let response = match reqwest::Client::new()
        .post(url)
        .bearer_auth(api_key)
        .header("Content-Type", "application/json")
        .timeout(Duration::from_secs(60 * 5))
        .json(&payload)
        .send()
        .await
        .and_then(|r| r.error_for_status())
    {
        Ok(response) => response,
        Err(e) => {
            tracing::error!("Completion request failed: {}", e);
            return Err(aggregator.interrupt());
        }
    };

    let mut stream = response.bytes_stream();
    let mut buffer = String::new();
    // Transport chunk boundaries are arbitrary and can split a
    // multi-byte UTF-8 character, so raw bytes are carried here until
    // they decode cleanly.
    let mut pending: Vec<u8> = Vec::new();

    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("Completion stream cancelled");
                return Err(aggregator.interrupt());
            }
            chunk = stream.next() => chunk,
        };

        let chunk = match chunk {
            Some(Ok(chunk)) => chunk,
            Some(Err(e)) => {
                tracing::error!("Completion stream failed mid-response: {}", e);
                return Err(aggregator.interrupt());
            }
            // Stream ended without the [DONE] sentinel.
            None => return Err(aggregator.interrupt()),
        };

        // Append new data to the buffer. This is necessary to handle
        // SSE fragmentation over HTTP/2 frames.
        pending.extend_from_slice(&chunk);
        match std::str::from_utf8(&pending) {
            Ok(valid) => {
                buffer.push_str(valid);
                pending.clear();
            }
            // An incomplete trailing character waits for the next
            // chunk; only the cleanly decoded prefix moves on.
            Err(e) if e.error_len().is_none() => {
                let valid_up_to = e.valid_up_to();
                if let Ok(valid) = std::str::from_utf8(&pending[..valid_up_to]) {
                    buffer.push_str(valid);
                }
                pending.drain(..valid_up_to);
            }
            Err(e) => {
                tracing::error!("Invalid UTF-8 in completion stream: {}", e);
                return Err(aggregator.interrupt());
            }
        }

        // Process all complete SSE events from the buffer
        while let Some(event_end) = buffer.find("\n\n") {
            let event_data = buffer[..event_end].to_string();
            buffer = buffer[event_end + 2..].to_string();

            let event_data = event_data.trim();
            if event_data.is_empty() {
                continue;
            }

            if !event_data.starts_with("data: ") {
                continue;
            }

            // Extract the JSON payload (after "data: ")
            let data = event_data[6..].trim();
            if data.is_empty() {
                continue;
            }

            // End of stream
            if data == "[DONE]" {
                return Ok(aggregator.finish());
            }

            let chunk = match serde_json::from_str::<CompletionChunk>(data) {
                Ok(chunk) => chunk,
                Err(e) => {
                    tracing::error!("Parsing completion chunk failed for {}\nError: {}", data, e);
                    return Err(aggregator.interrupt());
                }
            };

            // Some providers emit housekeeping chunks with no choices
            let Some(choice) = chunk.choices.first() else {
                continue;
            };

            if let Delta::Content { content } = &choice.delta {
                aggregator.push(content);
            }

            if choice.finish_reason.is_some() {
                // The [DONE] sentinel still follows; keep reading so
                // the stream drains cleanly.
                continue;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::Role;

    fn sse_body(fragments: &[&str], done: bool) -> String {
        let mut body = String::new();
        for fragment in fragments {
            body.push_str(&format!(
                "data: {}\n\n",
                json!({"choices": [{"delta": {"content": fragment}, "finish_reason": null}]})
            ));
        }
        if done {
            body.push_str("data: [DONE]\n\n");
        }
        body
    }

    #[tokio::test]
    async fn test_completion_stream_content() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(sse_body(&["TMS ", "treats ", "depression."], true))
            .create();

        let messages = vec![Message::new(Role::User, "what does tms treat")];
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let result = completion_stream(
            tx,
            &messages,
            server.url().as_str(),
            "test-key",
            "llama-3.1-8b-instant",
            None,
            &cancel,
        )
        .await;

        mock.assert();
        assert_eq!(result.unwrap(), "TMS treats depression.");

        // The progressive fragments match the final aggregate
        let mut forwarded = String::new();
        while let Ok(fragment) = rx.try_recv() {
            forwarded.push_str(&fragment);
        }
        assert_eq!(forwarded, "TMS treats depression.");
    }

    #[tokio::test]
    async fn test_completion_stream_multibyte_char_split_across_chunks() {
        use std::io::Write;

        let mut server = mockito::Server::new_async().await;
        // Split the response body in the middle of the two-byte
        // encoding of 'é' so the first transport chunk ends with
        // 0xC3 and the second starts with 0xA9.
        let body = sse_body(&["caf\u{e9}"], true).into_bytes();
        let split = body
            .iter()
            .position(|&b| b == 0xC3)
            .map(|i| i + 1)
            .unwrap();
        let head = body[..split].to_vec();
        let tail = body[split..].to_vec();
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_chunked_body(move |w| {
                w.write_all(&head)?;
                w.flush()?;
                w.write_all(&tail)
            })
            .create();

        let messages = vec![Message::new(Role::User, "hi")];
        let (tx, _rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let result = completion_stream(
            tx,
            &messages,
            server.url().as_str(),
            "test-key",
            "llama-3.1-8b-instant",
            None,
            &cancel,
        )
        .await;

        mock.assert();
        assert_eq!(result.unwrap(), "caf\u{e9}");
    }

    #[tokio::test]
    async fn test_completion_stream_missing_done_is_interrupted() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(sse_body(&["TMS ", "trea"], false))
            .create();

        let messages = vec![Message::new(Role::User, "what does tms treat")];
        let (tx, _rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let result = completion_stream(
            tx,
            &messages,
            server.url().as_str(),
            "test-key",
            "llama-3.1-8b-instant",
            None,
            &cancel,
        )
        .await;

        mock.assert();
        match result.unwrap_err() {
            StreamError::Interrupted { partial } => assert_eq!(partial, "TMS trea"),
        }
    }

    #[tokio::test]
    async fn test_completion_stream_http_error_is_interrupted() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(500)
            .with_body("internal error")
            .create();

        let messages = vec![Message::new(Role::User, "hello")];
        let (tx, _rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let result = completion_stream(
            tx,
            &messages,
            server.url().as_str(),
            "test-key",
            "llama-3.1-8b-instant",
            None,
            &cancel,
        )
        .await;

        mock.assert();
        match result.unwrap_err() {
            StreamError::Interrupted { partial } => assert_eq!(partial, ""),
        }
    }

    #[tokio::test]
    async fn test_completion_stream_cancellation() {
        let mut server = mockito::Server::new_async().await;
        // No [DONE] so a non-cancelled read would block on the open
        // connection or fail at EOF; cancelling first must win.
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(sse_body(&["partial "], false))
            .create();

        let messages = vec![Message::new(Role::User, "hello")];
        let (tx, _rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = completion_stream(
            tx,
            &messages,
            server.url().as_str(),
            "test-key",
            "llama-3.1-8b-instant",
            None,
            &cancel,
        )
        .await;

        assert!(matches!(result, Err(StreamError::Interrupted { .. })));
    }

    #[tokio::test]
    async fn test_completion_stream_skips_housekeeping_chunks() {
        let mut server = mockito::Server::new_async().await;
        let body = format!(
            "data: {}\n\ndata: {}\n\ndata: {}\n\ndata: [DONE]\n\n",
            json!({"choices": [{"delta": {"role": "assistant"}, "finish_reason": null}]}),
            json!({"choices": [{"delta": {"content": "Hello"}, "finish_reason": null}]}),
            json!({"choices": []}),
        );
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(body)
            .create();

        let messages = vec![Message::new(Role::User, "hi")];
        let (tx, _rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let result = completion_stream(
            tx,
            &messages,
            server.url().as_str(),
            "test-key",
            "llama-3.1-8b-instant",
            None,
            &cancel,
        )
        .await;

        mock.assert();
        assert_eq!(result.unwrap(), "Hello");
    }

    #[tokio::test]
    async fn test_temperature_included_in_payload() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_body(mockito::Matcher::PartialJson(json!({
                "model": "llama-3.1-8b-instant",
                "stream": true,
                "temperature": 0.2,
            })))
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(sse_body(&["ok"], true))
            .create();

        let messages = vec![Message::new(Role::User, "hi")];
        let (tx, _rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let result = completion_stream(
            tx,
            &messages,
            server.url().as_str(),
            "test-key",
            "llama-3.1-8b-instant",
            Some(0.2),
            &cancel,
        )
        .await;

        mock.assert();
        assert_eq!(result.unwrap(), "ok");
    }
}
