//! Slack integration for slashbot.
//!
//! - **Slash commands** (`commands`) - payload decoding and the greeting service
//! - **Events** (`events`) - socket mode lifecycle events and the dispatcher that routes them
//! - **Socket Mode** (`socket`, `websocket`) - frame codec, transport trait and runner loop
//! - **Signatures** (`signature`) - `X-Slack-Signature` verification for webhook requests
//! - **Web API** (`api`) - `apps.connections.open` and `auth.test`
//!
//! # Architecture
//!
//! ```text
//! Socket Mode: WebSocketTransport → SocketModeRunner → EventDispatcher → SlashCommandService
//!                                         ↑                                     │
//!                                         └──────── ack { envelope_id, payload } ◄┘
//!
//! Webhook:     POST /events-endpoint → SignatureVerifier → SlashCommandService → JSON reply
//! ```

pub mod api;
pub mod commands;
pub mod events;
pub mod message;
pub mod signature;
pub mod socket;
pub mod websocket;

pub use commands::{
    parse_slash_command_form, GreetingCommandService, SlashCommandPayload, SlashCommandService,
};
pub use message::{ResponseType, SlackMessage};
pub use socket::{SocketModeRunner, SocketTransport};
