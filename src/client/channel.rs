//! Channel lifecycle manager: one long-lived duplex WebSocket per chat
//! session, with client-driven reconnection.
//!
//! The channel task owns the socket across reconnects and reports what
//! happens over an event channel. Dropping the handle (and the event
//! receiver) closes the channel with a normal close code.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::{frame::coding::CloseCode, CloseFrame},
    tungstenite::Message,
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

use crate::protocol::ServerEnvelope;

pub const BASE_RECONNECT_DELAY: Duration = Duration::from_millis(2000);
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    /// Intentionally closed; no retry.
    Disconnected,
    /// Gave up after repeated abnormal closures. Requires a fresh start.
    Failed,
}

#[derive(Debug)]
pub enum ChannelEvent {
    Open,
    Envelope(ServerEnvelope),
    /// A frame arrived that could not be decoded. The channel stays open.
    ParseError(String),
    Closed {
        code: Option<u16>,
    },
    Reconnecting {
        attempt: u32,
        delay: Duration,
    },
    Failed,
    Disconnected,
    /// Synthesized locally when an open stream goes silent too long.
    StreamStalled,
}

/// Backoff schedule for abnormal closures: `base * 2^(attempt-1)`, up to a
/// fixed number of attempts. A successful open resets the counter.
#[derive(Debug)]
pub struct ReconnectPolicy {
    base_delay: Duration,
    max_attempts: u32,
    attempt: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(BASE_RECONNECT_DELAY, MAX_RECONNECT_ATTEMPTS)
    }
}

impl ReconnectPolicy {
    pub fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_attempts,
            attempt: 0,
        }
    }

    /// Close codes that signal intentional shutdown; everything else (and a
    /// missing close frame) schedules a reconnect.
    pub fn is_intentional(code: Option<u16>) -> bool {
        matches!(code, Some(1000) | Some(1001))
    }

    pub fn record_open(&mut self) {
        self.attempt = 0;
    }

    /// The delay before the next reconnect attempt, or `None` once the
    /// attempt cap is exceeded.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.attempt += 1;
        if self.attempt > self.max_attempts {
            return None;
        }
        Some(self.base_delay * 2u32.pow(self.attempt - 1))
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

pub struct ChannelHandle {
    outbound: mpsc::Sender<String>,
    state: watch::Receiver<ChannelState>,
    task: tokio::task::JoinHandle<()>,
}

impl ChannelHandle {
    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    /// Queue one text frame for transmission. Fails unless the channel is
    /// currently open.
    pub async fn send(&self, frame: String) -> Result<(), ChannelSendError> {
        if self.state() != ChannelState::Open {
            return Err(ChannelSendError::NotOpen);
        }
        self.outbound
            .send(frame)
            .await
            .map_err(|_| ChannelSendError::Gone)
    }

    /// Close the channel with a normal close code and wait briefly for the
    /// task to wind down.
    pub async fn close(self) {
        let ChannelHandle { outbound, task, .. } = self;
        drop(outbound);
        let _ = tokio::time::timeout(Duration::from_secs(2), task).await;
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelSendError {
    #[error("channel is not open")]
    NotOpen,
    #[error("channel task has shut down")]
    Gone,
}

/// Open a channel to `url` and start its lifecycle task.
pub fn open_channel(url: String) -> (ChannelHandle, mpsc::Receiver<ChannelEvent>) {
    let (events_tx, events_rx) = mpsc::channel(64);
    let (outbound_tx, outbound_rx) = mpsc::channel(16);
    let (state_tx, state_rx) = watch::channel(ChannelState::Connecting);

    let task = tokio::spawn(run_channel(url, events_tx, outbound_rx, state_tx));

    (
        ChannelHandle {
            outbound: outbound_tx,
            state: state_rx,
            task,
        },
        events_rx,
    )
}

async fn run_channel(
    url: String,
    events_tx: mpsc::Sender<ChannelEvent>,
    mut outbound_rx: mpsc::Receiver<String>,
    state_tx: watch::Sender<ChannelState>,
) {
    let mut policy = ReconnectPolicy::default();

    loop {
        let _ = state_tx.send(ChannelState::Connecting);
        match connect_async(url.as_str()).await {
            Ok((stream, _)) => {
                info!("Channel open: {}", url);
                policy.record_open();
                let _ = state_tx.send(ChannelState::Open);
                if events_tx.send(ChannelEvent::Open).await.is_err() {
                    return;
                }

                let close_code = pump(stream, &events_tx, &mut outbound_rx).await;
                let _ = events_tx.send(ChannelEvent::Closed { code: close_code }).await;

                if ReconnectPolicy::is_intentional(close_code) {
                    let _ = state_tx.send(ChannelState::Disconnected);
                    let _ = events_tx.send(ChannelEvent::Disconnected).await;
                    return;
                }
            }
            Err(e) => {
                warn!("Channel connect failed: {}", e);
            }
        }

        match policy.next_delay() {
            Some(delay) => {
                let attempt = policy.attempt();
                info!("Reconnecting (attempt {}) in {:?}", attempt, delay);
                if events_tx
                    .send(ChannelEvent::Reconnecting { attempt, delay })
                    .await
                    .is_err()
                {
                    return;
                }
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = events_tx.closed() => return,
                }
            }
            None => {
                warn!("Giving up after {} reconnect attempts", MAX_RECONNECT_ATTEMPTS);
                let _ = state_tx.send(ChannelState::Failed);
                let _ = events_tx.send(ChannelEvent::Failed).await;
                return;
            }
        }
    }
}

/// Drive one connection until it closes; returns the peer's close code, or
/// 1000 when we closed it ourselves because the handle was dropped.
async fn pump(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    events_tx: &mpsc::Sender<ChannelEvent>,
    outbound_rx: &mut mpsc::Receiver<String>,
) -> Option<u16> {
    let (mut sink, mut source) = stream.split();
    let mut close_code = None;

    loop {
        tokio::select! {
            inbound = source.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ServerEnvelope>(&text) {
                        Ok(envelope) => {
                            if events_tx.send(ChannelEvent::Envelope(envelope)).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!("Malformed frame from server: {}", e);
                            if events_tx.send(ChannelEvent::ParseError(e.to_string())).await.is_err() {
                                break;
                            }
                        }
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    close_code = frame.map(|f| u16::from(f.code));
                    debug!("Channel closed by peer (code: {:?})", close_code);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Channel error: {}", e);
                    break;
                }
                None => break,
            },
            outbound = outbound_rx.recv() => match outbound {
                Some(frame) => {
                    if sink.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
                None => {
                    // Handle dropped: intentional shutdown.
                    let _ = sink
                        .send(Message::Close(Some(CloseFrame {
                            code: CloseCode::Normal,
                            reason: "".into(),
                        })))
                        .await;
                    close_code = Some(1000);
                    break;
                }
            },
        }
    }

    close_code
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_from_two_seconds() {
        let mut policy = ReconnectPolicy::default();
        let delays: Vec<u64> = std::iter::from_fn(|| policy.next_delay())
            .map(|d| d.as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![2000, 4000, 8000, 16000, 32000]);
    }

    #[test]
    fn sixth_abnormal_closure_is_terminal() {
        let mut policy = ReconnectPolicy::default();
        for _ in 0..5 {
            assert!(policy.next_delay().is_some());
        }
        assert!(policy.next_delay().is_none());
    }

    #[test]
    fn successful_open_resets_the_attempt_counter() {
        let mut policy = ReconnectPolicy::default();
        policy.next_delay();
        policy.next_delay();
        policy.record_open();
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(2000)));
    }

    #[test]
    fn only_normal_and_going_away_are_intentional() {
        assert!(ReconnectPolicy::is_intentional(Some(1000)));
        assert!(ReconnectPolicy::is_intentional(Some(1001)));
        assert!(!ReconnectPolicy::is_intentional(Some(1006)));
        assert!(!ReconnectPolicy::is_intentional(Some(1011)));
        assert!(!ReconnectPolicy::is_intentional(None));
    }
}
