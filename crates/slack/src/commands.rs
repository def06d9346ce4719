use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::message::SlackMessage;

/// Slash command fields as Slack sends them, both as a webhook form body and as a
/// socket mode envelope payload.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlashCommandPayload {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub team_id: String,
    #[serde(default)]
    pub team_domain: String,
    #[serde(default)]
    pub enterprise_id: String,
    #[serde(default)]
    pub enterprise_name: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub channel_name: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub api_app_id: String,
    #[serde(default)]
    pub is_enterprise_install: String,
    #[serde(default)]
    pub response_url: String,
    #[serde(default)]
    pub trigger_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandContext {
    pub correlation_id: String,
}

impl Default for CommandContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("slash command body is not valid UTF-8")]
    NotUtf8,
    #[error("malformed slash command form: {0}")]
    Malformed(String),
    #[error("slash command payload is missing `command`")]
    MissingCommand,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("command service failed: {0}")]
    Service(String),
}

#[async_trait]
pub trait SlashCommandService: Send + Sync {
    async fn handle(
        &self,
        payload: &SlashCommandPayload,
        ctx: &CommandContext,
    ) -> Result<SlackMessage, CommandError>;
}

/// Replies to every command with a channel-visible greeting that echoes the invocation.
#[derive(Clone, Copy, Debug, Default)]
pub struct GreetingCommandService;

#[async_trait]
impl SlashCommandService for GreetingCommandService {
    async fn handle(
        &self,
        payload: &SlashCommandPayload,
        _ctx: &CommandContext,
    ) -> Result<SlackMessage, CommandError> {
        Ok(SlackMessage::in_channel(greeting_text(payload)))
    }
}

pub fn greeting_text(payload: &SlashCommandPayload) -> String {
    format!("Hello, {} cmd{} {}", payload.user_name, payload.command, payload.text)
}

/// Decodes an `application/x-www-form-urlencoded` slash command body.
pub fn parse_slash_command_form(body: &[u8]) -> Result<SlashCommandPayload, CommandParseError> {
    let raw = std::str::from_utf8(body).map_err(|_| CommandParseError::NotUtf8)?;
    ensure_valid_escapes(raw)?;

    let payload = serde_urlencoded::from_str::<SlashCommandPayload>(raw)
        .map_err(|error| CommandParseError::Malformed(error.to_string()))?;
    if payload.command.trim().is_empty() {
        return Err(CommandParseError::MissingCommand);
    }

    Ok(payload)
}

// The form decoder is lossy on bad escapes; reject them instead of guessing.
fn ensure_valid_escapes(raw: &str) -> Result<(), CommandParseError> {
    let bytes = raw.as_bytes();
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] != b'%' {
            index += 1;
            continue;
        }

        let valid = bytes
            .get(index + 1..index + 3)
            .is_some_and(|pair| pair.iter().all(u8::is_ascii_hexdigit));
        if !valid {
            return Err(CommandParseError::Malformed(format!(
                "invalid percent escape at byte {index}"
            )));
        }
        index += 3;
    }

    Ok(())
}
