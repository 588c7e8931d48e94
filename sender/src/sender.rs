// sender/src/sender.rs

use chrono::Utc;
use futures_util::{FutureExt, SinkExt, StreamExt};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, instrument, trace, warn};

use crate::config::{Config, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_SETTLE_MS};
use crate::error::SenderError;
use crate::message::{ControlMessage, Frame, OutboundFrame};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Lifecycle of one send run. `Closed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    Idle,
    Connecting,
    Connected,
    Sending,
    Waiting,
    Closed,
    Failed,
}

impl SenderState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SenderState::Closed | SenderState::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendReport {
    pub frames_sent: usize,
    pub settled_for: Duration,
}

/// An open connection to the control endpoint. Dropping it releases the socket.
pub struct ControlSession {
    endpoint: String,
    stream: WsStream,
    frames_sent: usize,
}

impl ControlSession {
    /// Opens the connection and completes the WebSocket handshake within `connect_timeout`.
    #[instrument(skip(connect_timeout))]
    pub async fn connect(endpoint: &str, connect_timeout: Duration) -> Result<Self, SenderError> {
        let (stream, response) = match timeout(connect_timeout, connect_async(endpoint)).await {
            Ok(Ok(connected)) => connected,
            Ok(Err(source)) => {
                return Err(SenderError::Connection {
                    endpoint: endpoint.to_string(),
                    source,
                })
            }
            Err(_) => {
                return Err(SenderError::ConnectTimeout {
                    endpoint: endpoint.to_string(),
                    timeout: connect_timeout,
                })
            }
        };
        debug!(status = %response.status(), "WebSocket handshake complete");
        Ok(Self {
            endpoint: endpoint.to_string(),
            stream,
            frames_sent: 0,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn frames_sent(&self) -> usize {
        self.frames_sent
    }

    /// Serializes `frame` and writes it as one text frame.
    /// A peer Close that lands after the inbound drain but before the write is not detected.
    pub async fn send<F: OutboundFrame>(&mut self, frame: &F) -> Result<(), SenderError> {
        let kind = frame.kind();
        let payload = frame.to_payload()?;
        self.drain_inbound(kind)?;

        trace!(kind, %payload, "Writing frame");
        self.stream
            .send(Message::Text(payload))
            .await
            .map_err(|source| transmission_error(kind, source))?;
        self.frames_sent += 1;
        Ok(())
    }

    /// Discards whatever the peer already pushed, without waiting for more.
    /// A pending Close (or end of stream) means the peer is gone.
    fn drain_inbound(&mut self, kind: &'static str) -> Result<(), SenderError> {
        while let Some(next) = self.stream.next().now_or_never() {
            match next {
                None | Some(Ok(Message::Close(_))) => {
                    return Err(SenderError::ClosedByPeer { kind });
                }
                Some(Err(source)) => return Err(transmission_error(kind, source)),
                Some(Ok(msg)) => trace!(len = msg.len(), "Discarding inbound frame"),
            }
        }
        Ok(())
    }

    /// Orderly close. Errors are logged, not returned: the socket is released either way.
    pub async fn close(mut self) {
        match self.stream.close(None).await {
            Ok(()) => debug!(endpoint = %self.endpoint, "Connection closed"),
            Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => {
                debug!(endpoint = %self.endpoint, "Connection already closed by peer")
            }
            Err(e) => warn!(endpoint = %self.endpoint, error = %e, "Close handshake failed"),
        }
    }
}

fn transmission_error(kind: &'static str, source: tungstenite::Error) -> SenderError {
    match source {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            SenderError::ClosedByPeer { kind }
        }
        source => SenderError::Transmission { kind, source },
    }
}

/// Pushes the standard control update to one endpoint, waits for the host to
/// apply it, then closes.
#[derive(Debug)]
pub struct ControlMessageSender {
    endpoint: String,
    connect_timeout: Duration,
    settle: Duration,
    state: SenderState,
}

impl ControlMessageSender {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            settle: Duration::from_millis(DEFAULT_SETTLE_MS),
            state: SenderState::Idle,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.endpoint.clone())
            .with_connect_timeout(config.connect_timeout)
            .with_settle(config.settle)
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn state(&self) -> SenderState {
        self.state
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Sends only the control update.
    pub async fn run(&mut self) -> Result<SendReport, SenderError> {
        self.deliver(&[]).await
    }

    /// Sends the control update followed by `extra` frames, then settles once.
    /// A sender runs at most once.
    pub async fn deliver(&mut self, extra: &[Frame]) -> Result<SendReport, SenderError> {
        if self.state != SenderState::Idle {
            return Err(SenderError::AlreadyFinished(self.state));
        }
        let result = self.execute(extra).await;
        match &result {
            Ok(_) => self.transition(SenderState::Closed),
            Err(e) => {
                warn!(endpoint = %self.endpoint, error = %e, "Control update failed");
                self.transition(SenderState::Failed);
            }
        }
        result
    }

    async fn execute(&mut self, extra: &[Frame]) -> Result<SendReport, SenderError> {
        self.transition(SenderState::Connecting);
        let mut session = ControlSession::connect(&self.endpoint, self.connect_timeout).await?;
        self.transition(SenderState::Connected);

        let outcome = self.push_and_settle(&mut session, extra).await;
        session.close().await;
        outcome
    }

    async fn push_and_settle(
        &mut self,
        session: &mut ControlSession,
        extra: &[Frame],
    ) -> Result<SendReport, SenderError> {
        let message = ControlMessage::standard();

        self.transition(SenderState::Sending);
        session.send(&message).await?;
        info!(
            endpoint = %session.endpoint(),
            alpha = message.alpha(),
            leak_lambda = message.leak_lambda(),
            mu_max = message.mu_max(),
            sent_at = %Utc::now().to_rfc3339(),
            "Sent control update"
        );
        for frame in extra {
            session.send(frame).await?;
            debug!(kind = frame.kind(), "Sent extra frame");
        }

        self.transition(SenderState::Waiting);
        let started = Instant::now();
        sleep(self.settle).await;

        Ok(SendReport {
            frames_sent: session.frames_sent(),
            settled_for: started.elapsed(),
        })
    }

    fn transition(&mut self, next: SenderState) {
        trace!(from = ?self.state, to = ?next, "Sender state change");
        self.state = next;
    }
}

/// Convenience entry point used by the binary.
pub async fn send_control_update(config: &Config) -> Result<SendReport, SenderError> {
    let mut sender = ControlMessageSender::from_config(config);
    sender.deliver(&config.extra_frames()).await
}
