use serde::{Deserialize, Serialize};

/// Where Slack shows a command response.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    #[default]
    InChannel,
    Ephemeral,
}

/// Response body for a slash command, shared by the webhook reply and the socket mode ack payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlackMessage {
    pub text: String,
    pub response_type: ResponseType,
}

impl SlackMessage {
    pub fn in_channel(text: impl Into<String>) -> Self {
        Self { text: text.into(), response_type: ResponseType::InChannel }
    }

    pub fn ephemeral(text: impl Into<String>) -> Self {
        Self { text: text.into(), response_type: ResponseType::Ephemeral }
    }
}

#[cfg(test)]
mod tests {
    use super::{ResponseType, SlackMessage};

    #[test]
    fn serializes_response_type_in_slack_wire_format() {
        let json = serde_json::to_value(SlackMessage::in_channel("hi")).expect("serialize");
        assert_eq!(json, serde_json::json!({ "text": "hi", "response_type": "in_channel" }));

        let json = serde_json::to_value(SlackMessage::ephemeral("psst")).expect("serialize");
        assert_eq!(json["response_type"], "ephemeral");
    }

    #[test]
    fn default_response_type_is_channel_visible() {
        assert_eq!(ResponseType::default(), ResponseType::InChannel);
    }
}
