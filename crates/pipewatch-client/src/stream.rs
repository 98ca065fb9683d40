//! Push-stream transport: one long-lived HTTP connection delivering
//! newline-delimited JSON frames, surfaced as tagged [`StreamEvent`]s.

use futures_util::StreamExt;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use pipewatch_core::{BuildId, SourceError, SourceResult, StreamEvent, StreamHandle};
use pipewatch_core::types::StreamPayload;

/// Events buffered between the transport task and the consumer.
const CHANNEL_CAPACITY: usize = 256;

/// Open the stream connection and hand back the event channel.
///
/// The HTTP request is made eagerly so connection-time failures surface
/// as a typed error here; frame delivery runs on a spawned task owned by
/// the returned handle.
pub(crate) async fn open(
    http: reqwest::Client,
    url: String,
    build: BuildId,
) -> SourceResult<StreamHandle> {
    info!(build_id = %build, url = %url, "opening log stream");

    let response = http.get(&url).send().await.map_err(SourceError::transport)?;
    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(SourceError::Api {
            status,
            code: None,
            message: if body.is_empty() {
                format!("stream rejected with status {status}")
            } else {
                body
            },
            retry_after: None,
        });
    }

    let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (stop_tx, stop_rx) = watch::channel(false);

    tokio::spawn(run_stream(response, build, event_tx, stop_rx));

    Ok(StreamHandle::new(event_rx, stop_tx))
}

/// Read frames until the connection ends, the consumer closes the
/// handle, or the consumer drops the receiver.
async fn run_stream(
    response: reqwest::Response,
    build: BuildId,
    event_tx: mpsc::Sender<StreamEvent>,
    mut stop_rx: watch::Receiver<bool>,
) {
    if event_tx.send(StreamEvent::Opened).await.is_err() {
        debug!(build_id = %build, "stream receiver dropped before open");
        return;
    }

    let mut body = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();

    loop {
        tokio::select! {
            _ = stop_rx.changed() => {
                debug!(build_id = %build, "stream handle closed");
                return;
            }
            chunk = body.next() => match chunk {
                Some(Ok(chunk)) => {
                    // A bare newline only counts as a heartbeat when no
                    // partial frame is waiting for its terminator.
                    if buffer.is_empty() && is_heartbeat_chunk(&chunk) {
                        debug!(build_id = %build, "stream heartbeat");
                        continue;
                    }
                    buffer.extend_from_slice(&chunk);
                    if !drain_frames(&mut buffer, &event_tx).await {
                        return;
                    }
                }
                Some(Err(e)) => {
                    warn!(build_id = %build, error = %e, "stream transport error");
                    let _ = event_tx.send(StreamEvent::Errored(e.to_string())).await;
                    return;
                }
                None => {
                    // Flush a final unterminated frame, if any.
                    let rest = String::from_utf8_lossy(&buffer).trim().to_string();
                    if !rest.is_empty() {
                        forward_frame(&rest, &event_tx).await;
                    }
                    info!(build_id = %build, "stream ended");
                    let _ = event_tx.send(StreamEvent::Closed).await;
                    return;
                }
            }
        }
    }
}

/// Process every complete line in `buffer`. Returns false once the
/// receiver is gone.
async fn drain_frames(buffer: &mut Vec<u8>, event_tx: &mpsc::Sender<StreamEvent>) -> bool {
    while let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
        let line: Vec<u8> = buffer.drain(..=newline_pos).collect();
        let line = String::from_utf8_lossy(&line).trim().to_string();
        if !forward_frame(&line, event_tx).await {
            return false;
        }
    }
    true
}

async fn forward_frame(line: &str, event_tx: &mpsc::Sender<StreamEvent>) -> bool {
    match parse_frame(line) {
        Some(payload) => event_tx.send(StreamEvent::Batch(payload)).await.is_ok(),
        None => true,
    }
}

/// Parse one line into a frame.
///
/// Lines use SSE-style framing: an optional `data:` prefix carries the
/// JSON payload; `event:`/`id:` fields and `:` comments are transport
/// noise. A malformed payload is logged and skipped, never fatal to the
/// connection.
fn parse_frame(line: &str) -> Option<StreamPayload> {
    if line.is_empty() || line.starts_with(':') {
        return None;
    }
    let payload = line.strip_prefix("data:").map_or(line, str::trim_start);
    if payload.starts_with("event:") || payload.starts_with("id:") {
        return None;
    }

    match serde_json::from_str::<StreamPayload>(payload) {
        Ok(frame) => Some(frame),
        Err(e) => {
            warn!(error = %e, data = %payload, "failed to parse stream frame");
            None
        }
    }
}

fn is_heartbeat_chunk(chunk: &[u8]) -> bool {
    chunk.is_empty() || chunk == b"\r\n" || chunk == b"\n"
}
