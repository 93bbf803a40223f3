use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Human-readable alert content produced by a condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertMessage {
    pub title: String,
    pub body: String,
}

/// Chat-notification body posted to the webhook
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertPayload {
    pub text: String,
    pub blocks: Vec<Value>,
}

impl AlertPayload {
    pub fn build(message: &AlertMessage, emoji: &str, hostname: &str, at: DateTime<Utc>) -> Self {
        let headline = format!("{} {}", emoji, message.title);

        Self {
            text: format!("{}: {}", headline, message.body),
            blocks: vec![
                json!({
                    "type": "header",
                    "text": { "type": "plain_text", "text": headline, "emoji": true }
                }),
                json!({
                    "type": "section",
                    "text": { "type": "mrkdwn", "text": message.body }
                }),
                json!({
                    "type": "context",
                    "elements": [
                        { "type": "mrkdwn", "text": format!("*Host:* {}", hostname) },
                        { "type": "mrkdwn", "text": format!("*Time:* {}", at.to_rfc3339()) }
                    ]
                }),
            ],
        }
    }
}
