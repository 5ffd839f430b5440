//! Streaming progress channel for one generation job.
//!
//! [`ProgressChannel`] owns a long-lived WebSocket connection to the
//! job's event feed, demultiplexes frames into [`JobEvent`]s, and fans
//! them out over a broadcast channel. Transport drops trigger bounded
//! exponential-backoff reconnection; a `complete` or `error` frame is
//! terminal and closes the channel after dispatch.

use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream};
use tokio_util::sync::CancellationToken;

use adstudio_core::types::JobId;

use crate::events::JobEvent;
use crate::messages::{parse_message, StreamMessage};
use crate::reconnect::{reconnect_loop, ReconnectConfig, ReconnectOutcome};

/// Broadcast capacity for job events. Feeds are low-volume (a few
/// events per second at most), so lagging receivers indicate a stuck
/// consumer rather than a tuning problem.
const EVENT_CHANNEL_CAPACITY: usize = 256;

type WsStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// A live progress feed for exactly one job.
///
/// Create with [`open`](Self::open), attach any number of subscribers
/// via [`subscribe`](Self::subscribe), and either let the channel close
/// itself on a terminal event or call [`close`](Self::close) to
/// disconnect deliberately (manual close never reconnects and surfaces
/// no error).
pub struct ProgressChannel {
    job_id: JobId,
    event_tx: broadcast::Sender<JobEvent>,
    cancel: CancellationToken,
    task_handle: tokio::task::JoinHandle<()>,
}

impl ProgressChannel {
    /// Open the streaming connection for a job and spawn its read loop.
    ///
    /// The connection targets `{ws_url}/ws/jobs/{job_id}`, with the
    /// persisted bearer credential (when present) attached as a `token`
    /// query parameter. Connection problems — including the very first
    /// attempt — go through the bounded reconnect policy and surface to
    /// subscribers as a terminal [`JobEvent::Failed`], so `open` itself
    /// does not fail.
    pub fn open(
        ws_url: &str,
        job_id: &str,
        auth_token: Option<&str>,
        config: ReconnectConfig,
    ) -> Self {
        let url = match auth_token {
            Some(token) => format!("{ws_url}/ws/jobs/{job_id}?token={token}"),
            None => format!("{ws_url}/ws/jobs/{job_id}"),
        };

        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();

        let tx = event_tx.clone();
        let loop_cancel = cancel.clone();
        let loop_job_id: JobId = job_id.to_string();
        let task_handle = tokio::spawn(async move {
            run_stream_loop(&url, &loop_job_id, &tx, &loop_cancel, &config).await;
            tracing::debug!(job_id = %loop_job_id, "Stream loop exited");
        });

        Self {
            job_id: job_id.to_string(),
            event_tx,
            cancel,
            task_handle,
        }
    }

    /// The job this channel is attached to.
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Subscribe to this job's events.
    ///
    /// Every subscriber receives every event dispatched after it
    /// subscribed. Dropping the receiver unsubscribes. Receivers are
    /// independent, so one consumer failing or lagging cannot prevent
    /// delivery to the others.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.event_tx.subscribe()
    }

    /// Deliberately close the channel.
    ///
    /// Suppresses reconnection and stops event delivery without
    /// emitting a terminal error.
    pub fn close(&self) {
        self.cancel.cancel();
        self.task_handle.abort();
    }
}

// ---------------------------------------------------------------------------
// Read loop
// ---------------------------------------------------------------------------

/// Why the frame-processing loop stopped.
enum LoopEnd {
    /// A terminal event was dispatched; the channel is done.
    Terminal,
    /// The transport dropped without a terminal event.
    Dropped,
    /// The caller closed the channel.
    Cancelled,
}

/// Connect, process frames, reconnect on drops, until terminal.
async fn run_stream_loop(
    url: &str,
    job_id: &str,
    event_tx: &broadcast::Sender<JobEvent>,
    cancel: &CancellationToken,
    config: &ReconnectConfig,
) {
    // Initial connection. A failure here is a transport failure like
    // any other and goes through the same bounded reconnect policy.
    let mut ws_stream = match connect_stream(url).await {
        Ok(stream) => {
            tracing::info!(job_id, "Connected to job stream");
            stream
        }
        Err(e) => {
            tracing::warn!(job_id, error = %e, "Initial connection failed, entering reconnect loop");
            match reconnect_with_policy(url, job_id, event_tx, cancel, config).await {
                Some(stream) => stream,
                None => return,
            }
        }
    };

    loop {
        match process_frames(&mut ws_stream, job_id, event_tx, cancel).await {
            LoopEnd::Terminal | LoopEnd::Cancelled => return,
            LoopEnd::Dropped => {}
        }

        if cancel.is_cancelled() {
            return;
        }

        tracing::info!(job_id, "Job stream lost, entering reconnect loop");
        match reconnect_with_policy(url, job_id, event_tx, cancel, config).await {
            Some(stream) => ws_stream = stream,
            None => return,
        }
    }
}

/// Run the bounded reconnect loop; on exhaustion, dispatch exactly one
/// terminal `Failed` event and give up. Returns `None` when the channel
/// should stop (cancelled or exhausted).
async fn reconnect_with_policy(
    url: &str,
    job_id: &str,
    event_tx: &broadcast::Sender<JobEvent>,
    cancel: &CancellationToken,
    config: &ReconnectConfig,
) -> Option<WsStream> {
    match reconnect_loop(|| connect_stream(url), config, cancel).await {
        ReconnectOutcome::Restored(stream) => Some(stream),
        ReconnectOutcome::Cancelled => None,
        ReconnectOutcome::Exhausted => {
            let _ = event_tx.send(JobEvent::Failed {
                message: format!(
                    "Lost connection to the generation stream after {} reconnect attempts",
                    config.max_attempts
                ),
            });
            tracing::error!(job_id, "Job stream reconnect attempts exhausted");
            None
        }
    }
}

async fn connect_stream(url: &str) -> Result<WsStream, tokio_tungstenite::tungstenite::Error> {
    let (ws_stream, _response) = connect_async(url).await?;
    Ok(ws_stream)
}

/// Read frames until a terminal event, a transport drop, or cancellation.
async fn process_frames(
    ws_stream: &mut WsStream,
    job_id: &str,
    event_tx: &broadcast::Sender<JobEvent>,
    cancel: &CancellationToken,
) -> LoopEnd {
    loop {
        let msg_result = tokio::select! {
            _ = cancel.cancelled() => return LoopEnd::Cancelled,
            msg = ws_stream.next() => msg,
        };

        match msg_result {
            Some(Ok(Message::Text(text))) => {
                if dispatch_frame(&text, job_id, event_tx) {
                    return LoopEnd::Terminal;
                }
            }
            Some(Ok(Message::Binary(_))) => {
                tracing::trace!(job_id, "Ignoring binary frame");
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                // Handled automatically by tungstenite.
            }
            Some(Ok(Message::Close(frame))) => {
                tracing::info!(job_id, ?frame, "Job stream closed by server");
                return LoopEnd::Dropped;
            }
            Some(Ok(Message::Frame(_))) => {}
            Some(Err(e)) => {
                tracing::error!(job_id, error = %e, "Job stream receive error");
                return LoopEnd::Dropped;
            }
            None => {
                tracing::info!(job_id, "Job stream exhausted");
                return LoopEnd::Dropped;
            }
        }
    }
}

/// Parse one text frame and dispatch it to subscribers.
///
/// Returns `true` when the frame was terminal. Malformed frames are
/// logged and dropped; they neither close the connection nor count as
/// reconnect triggers.
fn dispatch_frame(text: &str, job_id: &str, event_tx: &broadcast::Sender<JobEvent>) -> bool {
    match parse_message(text) {
        Ok(msg) => {
            let terminal = msg.is_terminal();
            // Send errors only mean there are zero subscribers right now.
            let _ = event_tx.send(to_event(msg));
            terminal
        }
        Err(e) => {
            tracing::warn!(
                job_id,
                error = %e,
                raw_message = %text,
                "Dropping malformed stream frame",
            );
            false
        }
    }
}

/// Translate a wire message into the platform-level event.
fn to_event(msg: StreamMessage) -> JobEvent {
    match msg {
        StreamMessage::Progress(data) => JobEvent::Progress {
            percent: data.progress,
            step: data.step,
            message: data.message,
            estimated_time_remaining: data.estimated_time_remaining,
            current_cost: data.current_cost,
        },
        StreamMessage::Partial(artifact) => JobEvent::Partial { artifact },
        StreamMessage::Complete(result) => JobEvent::Completed { result },
        StreamMessage::Error(data) => JobEvent::Failed {
            message: data.message,
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
