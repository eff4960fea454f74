//! Messages exchanged between the arena and the player agents.
//!
//! Every call to an agent carries a JSON encoded [`TaskMessage`]:
//!
//! ```json
//! {"task": "chat", "message": "<prompt text>", "info": {"from": "Boris", "to": "Aisha", "message": "Hello"}}
//! ```
//!
//! | task         | info                                          |
//! |--------------|-----------------------------------------------|
//! | `background` | `{name, opponents[], preferences}`            |
//! | `chat`       | last [`ChatMessage`] of the conversation      |
//! | `predict`    | name of the player to predict                 |
//! | `act`        | action template                               |
//! | `observe`    | state snapshot of the receiving player        |
//!
//! The reply is free text; the arena extracts what it needs from tagged regions
//! (see [`crate::extract`]).

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Phase of the round protocol a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Background,
    Chat,
    Predict,
    Act,
    Observe,
}

/// Envelope sent to a player agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMessage {
    pub task: TaskKind,
    pub message: String,
    pub info: Value,
}

impl TaskMessage {
    pub fn background(
        prompt: String,
        name: &str,
        opponents: &[String],
        preferences: &str,
    ) -> TaskMessage {
        TaskMessage {
            task: TaskKind::Background,
            message: prompt,
            info: json!({"name": name, "opponents": opponents, "preferences": preferences}),
        }
    }

    pub fn chat(prompt: String, last: &ChatMessage) -> TaskMessage {
        TaskMessage {
            task: TaskKind::Chat,
            message: prompt,
            info: json!(last),
        }
    }

    pub fn predict(prompt: String, subject: &str) -> TaskMessage {
        TaskMessage {
            task: TaskKind::Predict,
            message: prompt,
            info: Value::String(subject.to_owned()),
        }
    }

    pub fn act(prompt: String, template: &str) -> TaskMessage {
        TaskMessage {
            task: TaskKind::Act,
            message: prompt,
            info: Value::String(template.to_owned()),
        }
    }

    pub fn observe(prompt: String, state: Value) -> TaskMessage {
        TaskMessage {
            task: TaskKind::Observe,
            message: prompt,
            info: state,
        }
    }

    /// JSON text put on the wire.
    pub fn encode(&self) -> String {
        // a struct of strings and `Value`s always serialises
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// One utterance of a chat between two players.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub from: String,
    pub to: String,
    pub message: String,
}

impl ChatMessage {
    pub fn new(from: &str, to: &str, message: impl Into<String>) -> Self {
        ChatMessage {
            from: from.to_owned(),
            to: to.to_owned(),
            message: message.into(),
        }
    }
}

/// Conversation of one unordered pair of players during one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatThread {
    pub players: [String; 2],
    pub messages: Vec<ChatMessage>,
}
