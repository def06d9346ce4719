use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
    commands::{CommandContext, CommandError, SlashCommandPayload, SlashCommandService},
    message::SlackMessage,
};

/// A socket mode frame that must be acknowledged with its `envelope_id`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackEnvelope {
    pub envelope_id: String,
    pub event: SlackEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    SlashCommand(SlashCommandPayload),
    /// A slash command envelope whose payload could not be decoded.
    Malformed { event_type: String, error: String },
    Unsupported { event_type: String },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HelloInfo {
    pub num_connections: u32,
    pub app_id: Option<String>,
}

/// Everything the socket mode runner reports, in the order it happens.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SocketEvent {
    Connecting { attempt: u32 },
    Connected { attempt: u32 },
    Hello(HelloInfo),
    ConnectionError { message: String },
    Disconnect { reason: String },
    Envelope(SlackEnvelope),
}

impl SocketEvent {
    pub fn event_type(&self) -> SocketEventType {
        match self {
            Self::Connecting { .. } => SocketEventType::Connecting,
            Self::Connected { .. } => SocketEventType::Connected,
            Self::Hello(_) => SocketEventType::Hello,
            Self::ConnectionError { .. } => SocketEventType::ConnectionError,
            Self::Disconnect { .. } => SocketEventType::Disconnect,
            Self::Envelope(envelope) => match envelope.event {
                SlackEvent::SlashCommand(_) => SocketEventType::SlashCommand,
                SlackEvent::Malformed { .. } => SocketEventType::Malformed,
                SlackEvent::Unsupported { .. } => SocketEventType::Unsupported,
            },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SocketEventType {
    Connecting,
    Connected,
    Hello,
    ConnectionError,
    Disconnect,
    SlashCommand,
    Malformed,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Responded(SlackMessage),
    Processed,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error(transparent)]
    Command(#[from] CommandError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> SocketEventType;
    async fn handle(
        &self,
        event: &SocketEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

/// Routes each event to the single handler registered for its type.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<SocketEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        event: &SocketEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(event, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

pub fn default_dispatcher(service: Arc<dyn SlashCommandService>) -> EventDispatcher {
    let mut dispatcher = EventDispatcher::new();
    for event_type in [
        SocketEventType::Connecting,
        SocketEventType::Connected,
        SocketEventType::Hello,
        SocketEventType::ConnectionError,
        SocketEventType::Disconnect,
        SocketEventType::Malformed,
    ] {
        dispatcher.register(LifecycleLogHandler::new(event_type));
    }
    dispatcher.register(SlashCommandHandler::new(service));
    dispatcher
}

/// Logs connection lifecycle notifications; never produces a response.
pub struct LifecycleLogHandler {
    event_type: SocketEventType,
}

impl LifecycleLogHandler {
    pub fn new(event_type: SocketEventType) -> Self {
        Self { event_type }
    }
}

#[async_trait]
impl EventHandler for LifecycleLogHandler {
    fn event_type(&self) -> SocketEventType {
        self.event_type
    }

    async fn handle(
        &self,
        event: &SocketEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        match event {
            SocketEvent::Connecting { attempt } => {
                info!(attempt, "connecting to Slack with Socket Mode");
            }
            SocketEvent::Connected { attempt } => {
                info!(attempt, "connected to Slack with Socket Mode");
            }
            SocketEvent::Hello(hello) => {
                info!(
                    num_connections = hello.num_connections,
                    app_id = hello.app_id.as_deref().unwrap_or("unknown"),
                    "hello from Slack with Socket Mode"
                );
            }
            SocketEvent::ConnectionError { message } => {
                error!(error = %message, "socket mode connection failed");
            }
            SocketEvent::Disconnect { reason } => {
                info!(reason = %reason, "Slack requested a socket mode reconnect");
            }
            SocketEvent::Envelope(SlackEnvelope {
                event: SlackEvent::Malformed { event_type, error },
                ..
            }) => {
                warn!(
                    correlation_id = %ctx.correlation_id,
                    event_type = %event_type,
                    error = %error,
                    "failed to parse slash command"
                );
            }
            SocketEvent::Envelope(_) => return Ok(HandlerResult::Ignored),
        }

        Ok(HandlerResult::Processed)
    }
}

pub struct SlashCommandHandler {
    service: Arc<dyn SlashCommandService>,
}

impl SlashCommandHandler {
    pub fn new(service: Arc<dyn SlashCommandService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl EventHandler for SlashCommandHandler {
    fn event_type(&self) -> SocketEventType {
        SocketEventType::SlashCommand
    }

    async fn handle(
        &self,
        event: &SocketEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SocketEvent::Envelope(SlackEnvelope { event: SlackEvent::SlashCommand(payload), .. }) =
            event
        else {
            return Ok(HandlerResult::Ignored);
        };

        debug!(
            correlation_id = %ctx.correlation_id,
            command = %payload.command,
            user_id = %payload.user_id,
            "slash command received"
        );

        let command_ctx = CommandContext { correlation_id: ctx.correlation_id.clone() };
        let message = self.service.handle(payload, &command_ctx).await?;
        Ok(HandlerResult::Responded(message))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::{
        default_dispatcher, DispatchError, EventContext, EventDispatcher, EventHandlerError,
        HandlerResult, HelloInfo, SlackEnvelope, SlackEvent, SocketEvent, SocketEventType,
    };
    use crate::commands::{
        CommandContext, CommandError, GreetingCommandService, SlashCommandPayload,
        SlashCommandService,
    };
    use crate::message::{ResponseType, SlackMessage};

    struct FailingCommandService;

    #[async_trait]
    impl SlashCommandService for FailingCommandService {
        async fn handle(
            &self,
            _payload: &SlashCommandPayload,
            _ctx: &CommandContext,
        ) -> Result<SlackMessage, CommandError> {
            Err(CommandError::Service("backend unavailable".to_owned()))
        }
    }

    fn slash_command_event(envelope_id: &str) -> SocketEvent {
        SocketEvent::Envelope(SlackEnvelope {
            envelope_id: envelope_id.to_owned(),
            event: SlackEvent::SlashCommand(SlashCommandPayload {
                command: "/hello".to_owned(),
                text: "there".to_owned(),
                user_id: "U1".to_owned(),
                user_name: "alice".to_owned(),
                ..SlashCommandPayload::default()
            }),
        })
    }

    #[tokio::test]
    async fn dispatcher_routes_slash_commands_to_service() {
        let dispatcher = default_dispatcher(Arc::new(GreetingCommandService));

        let result = dispatcher
            .dispatch(&slash_command_event("env-1"), &EventContext::default())
            .await
            .expect("dispatch");

        let HandlerResult::Responded(message) = result else {
            panic!("expected a response, got {result:?}");
        };
        assert_eq!(message.text, "Hello, alice cmd/hello there");
        assert_eq!(message.response_type, ResponseType::InChannel);
    }

    #[tokio::test]
    async fn dispatcher_returns_ignored_when_no_handler_registered() {
        let dispatcher = EventDispatcher::new();

        let result = dispatcher
            .dispatch(&slash_command_event("env-2"), &EventContext::default())
            .await
            .expect("dispatch");

        assert_eq!(result, HandlerResult::Ignored);
    }

    #[tokio::test]
    async fn unsupported_envelopes_are_ignored_by_default() {
        let dispatcher = default_dispatcher(Arc::new(GreetingCommandService));
        let event = SocketEvent::Envelope(SlackEnvelope {
            envelope_id: "env-3".to_owned(),
            event: SlackEvent::Unsupported { event_type: "events_api".to_owned() },
        });

        let result = dispatcher.dispatch(&event, &EventContext::default()).await.expect("dispatch");

        assert_eq!(result, HandlerResult::Ignored);
    }

    #[tokio::test]
    async fn lifecycle_events_are_processed_without_response() {
        let dispatcher = default_dispatcher(Arc::new(GreetingCommandService));
        let events = [
            SocketEvent::Connecting { attempt: 1 },
            SocketEvent::Connected { attempt: 1 },
            SocketEvent::Hello(HelloInfo { num_connections: 1, app_id: Some("A1".to_owned()) }),
            SocketEvent::ConnectionError { message: "dns failure".to_owned() },
            SocketEvent::Disconnect { reason: "refresh_requested".to_owned() },
            SocketEvent::Envelope(SlackEnvelope {
                envelope_id: "env-4".to_owned(),
                event: SlackEvent::Malformed {
                    event_type: "slash_commands".to_owned(),
                    error: "invalid type".to_owned(),
                },
            }),
        ];

        for event in events {
            let result =
                dispatcher.dispatch(&event, &EventContext::default()).await.expect("dispatch");
            assert_eq!(result, HandlerResult::Processed, "event {event:?}");
        }
    }

    #[tokio::test]
    async fn service_failures_surface_as_dispatch_errors() {
        let dispatcher = default_dispatcher(Arc::new(FailingCommandService));

        let result =
            dispatcher.dispatch(&slash_command_event("env-5"), &EventContext::default()).await;

        assert_eq!(
            result,
            Err(DispatchError::Handler(EventHandlerError::Command(CommandError::Service(
                "backend unavailable".to_owned()
            ))))
        );
    }

    #[test]
    fn default_dispatcher_registers_handlers() {
        let dispatcher = default_dispatcher(Arc::new(GreetingCommandService));
        assert_eq!(dispatcher.handler_count(), 7);
    }

    #[test]
    fn envelope_event_type_follows_payload() {
        assert_eq!(slash_command_event("env-6").event_type(), SocketEventType::SlashCommand);
        assert_eq!(
            SocketEvent::Envelope(SlackEnvelope {
                envelope_id: "env-7".to_owned(),
                event: SlackEvent::Unsupported { event_type: "interactive".to_owned() },
            })
            .event_type(),
            SocketEventType::Unsupported
        );
    }
}
