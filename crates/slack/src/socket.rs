use std::{future::Future, pin::Pin, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    commands::SlashCommandPayload,
    events::{
        EventContext, EventDispatcher, HandlerResult, HelloInfo, SlackEnvelope, SlackEvent,
        SocketEvent,
    },
    message::SlackMessage,
};

pub const SLASH_COMMANDS_ENVELOPE: &str = "slash_commands";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport received an undecodable frame: {0}")]
    Decode(String),
    #[error("transport ack failed: {0}")]
    Acknowledge(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SocketError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("socket mode stream closed")]
    StreamClosed,
}

/// A decoded socket mode frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SocketFrame {
    Hello(HelloInfo),
    Disconnect { reason: String },
    Envelope(SlackEnvelope),
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    frame_type: String,
    envelope_id: Option<String>,
    #[serde(default)]
    payload: serde_json::Value,
    num_connections: Option<u32>,
    connection_info: Option<RawConnectionInfo>,
    reason: Option<String>,
}

#[derive(Deserialize)]
struct RawConnectionInfo {
    app_id: Option<String>,
}

/// Decodes one text frame. Frames the bot has no use for decode to `None`.
pub fn parse_frame(text: &str) -> Result<Option<SocketFrame>, TransportError> {
    let raw = serde_json::from_str::<RawFrame>(text)
        .map_err(|error| TransportError::Decode(error.to_string()))?;

    if let Some(envelope_id) = raw.envelope_id {
        let event = if raw.frame_type == SLASH_COMMANDS_ENVELOPE {
            match serde_json::from_value::<SlashCommandPayload>(raw.payload) {
                Ok(payload) => SlackEvent::SlashCommand(payload),
                Err(error) => SlackEvent::Malformed {
                    event_type: raw.frame_type,
                    error: error.to_string(),
                },
            }
        } else {
            SlackEvent::Unsupported { event_type: raw.frame_type }
        };
        return Ok(Some(SocketFrame::Envelope(SlackEnvelope { envelope_id, event })));
    }

    let frame = match raw.frame_type.as_str() {
        "hello" => SocketFrame::Hello(HelloInfo {
            num_connections: raw.num_connections.unwrap_or_default(),
            app_id: raw.connection_info.and_then(|info| info.app_id),
        }),
        "disconnect" => SocketFrame::Disconnect {
            reason: raw.reason.unwrap_or_else(|| "unknown".to_owned()),
        },
        _ => return Ok(None),
    };

    Ok(Some(frame))
}

#[derive(Serialize)]
struct Ack<'a> {
    envelope_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<&'a SlackMessage>,
}

/// JSON acknowledgement for `envelope_id`, optionally carrying a response message.
pub fn ack_body(
    envelope_id: &str,
    payload: Option<&SlackMessage>,
) -> Result<String, TransportError> {
    serde_json::to_string(&Ack { envelope_id, payload })
        .map_err(|error| TransportError::Acknowledge(error.to_string()))
}

#[async_trait]
pub trait SocketTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    /// `Ok(None)` means the server closed the stream.
    async fn next_frame(&self) -> Result<Option<SocketFrame>, TransportError>;
    async fn acknowledge(
        &self,
        envelope_id: &str,
        payload: Option<&SlackMessage>,
    ) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

enum PumpOutcome {
    Shutdown,
    Reconnect,
    Failed(SocketError),
}

pub struct SocketModeRunner {
    transport: Arc<dyn SocketTransport>,
    dispatcher: EventDispatcher,
}

impl SocketModeRunner {
    pub fn new(transport: Arc<dyn SocketTransport>, dispatcher: EventDispatcher) -> Self {
        Self { transport, dispatcher }
    }

    /// Runs until `shutdown` resolves or the connection fails.
    ///
    /// A `disconnect` frame from Slack opens a fresh connection. Any other failure is
    /// reported as a `ConnectionError` event and returned.
    pub async fn run<F>(&self, shutdown: F) -> Result<(), SocketError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut attempt = 0_u32;

        loop {
            attempt += 1;
            self.emit(SocketEvent::Connecting { attempt }).await;

            let connected = tokio::select! {
                _ = &mut shutdown => return Ok(()),
                result = self.transport.connect() => result,
            };
            if let Err(error) = connected {
                self.emit(SocketEvent::ConnectionError { message: error.to_string() }).await;
                return Err(error.into());
            }
            self.emit(SocketEvent::Connected { attempt }).await;

            match self.pump(shutdown.as_mut()).await {
                PumpOutcome::Shutdown => {
                    info!(attempt, "socket mode shutting down");
                    self.close().await;
                    return Ok(());
                }
                PumpOutcome::Reconnect => {
                    self.close().await;
                }
                PumpOutcome::Failed(error) => {
                    self.emit(SocketEvent::ConnectionError { message: error.to_string() }).await;
                    self.close().await;
                    return Err(error);
                }
            }
        }
    }

    async fn pump<F>(&self, mut shutdown: Pin<&mut F>) -> PumpOutcome
    where
        F: Future<Output = ()>,
    {
        loop {
            let frame = tokio::select! {
                _ = &mut shutdown => return PumpOutcome::Shutdown,
                frame = self.transport.next_frame() => frame,
            };

            match frame {
                Ok(Some(SocketFrame::Hello(hello))) => self.emit(SocketEvent::Hello(hello)).await,
                Ok(Some(SocketFrame::Disconnect { reason })) => {
                    self.emit(SocketEvent::Disconnect { reason }).await;
                    return PumpOutcome::Reconnect;
                }
                Ok(Some(SocketFrame::Envelope(envelope))) => self.handle_envelope(envelope).await,
                Ok(None) => return PumpOutcome::Failed(SocketError::StreamClosed),
                Err(error) => return PumpOutcome::Failed(error.into()),
            }
        }
    }

    async fn handle_envelope(&self, envelope: SlackEnvelope) {
        let envelope_id = envelope.envelope_id.clone();
        let event = SocketEvent::Envelope(envelope);

        info!(
            event_name = "ingress.slack.envelope_received",
            envelope_id = %envelope_id,
            event_type = ?event.event_type(),
            correlation_id = %envelope_id,
            "received slack envelope"
        );

        let context = EventContext { correlation_id: envelope_id.clone() };
        let response = match self.dispatcher.dispatch(&event, &context).await {
            Ok(HandlerResult::Responded(message)) => Some(message),
            Ok(HandlerResult::Processed | HandlerResult::Ignored) => None,
            Err(error) => {
                warn!(
                    envelope_id = %envelope_id,
                    correlation_id = %envelope_id,
                    error = %error,
                    "event dispatch failed; acknowledging without payload"
                );
                None
            }
        };

        if let Err(error) = self.transport.acknowledge(&envelope_id, response.as_ref()).await {
            warn!(
                event_name = "ingress.slack.ack_sent",
                envelope_id = %envelope_id,
                correlation_id = %envelope_id,
                error = %error,
                "failed to acknowledge slack envelope"
            );
        } else {
            debug!(
                event_name = "ingress.slack.ack_sent",
                envelope_id = %envelope_id,
                correlation_id = %envelope_id,
                with_payload = response.is_some(),
                "acknowledged slack envelope"
            );
        }
    }

    async fn emit(&self, event: SocketEvent) {
        if let Err(error) = self.dispatcher.dispatch(&event, &EventContext::default()).await {
            warn!(event_type = ?event.event_type(), error = %error, "lifecycle handler failed");
        }
    }

    async fn close(&self) {
        if let Err(error) = self.transport.disconnect().await {
            warn!(error = %error, "socket mode disconnect failed");
        }
    }
}
