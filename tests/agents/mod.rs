//! Scripted in-process agents, reached through a [`Messenger`] instead of the network.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use serde_json::{json, Value};
use social_arena::messenger::Messenger;

/// How a scripted agent answers one task.
pub trait Behavior: Send + Sync {
    fn reply(&self, task: &Value, memory: &mut Memory) -> String;
}

/// What an agent remembers between tasks.
#[derive(Default)]
pub struct Memory {
    pub opponents: Vec<String>,
    pub act_calls: usize,
}

/// Dispatches every message to the agent registered at its address.
#[derive(Default)]
pub struct AgentTable {
    agents: HashMap<String, Box<dyn Behavior>>,
    memories: Mutex<HashMap<String, Memory>>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl AgentTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, address: &str, behavior: impl Behavior + 'static) -> Self {
        self.agents.insert(address.to_owned(), Box::new(behavior));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Messenger for AgentTable {
    fn talk_to_agent(
        &self,
        message: &str,
        address: &str,
        conversation: &str,
        new_conversation: bool,
        _timeout: Duration,
    ) -> anyhow::Result<String> {
        let task: Value = serde_json::from_str(message)?;
        let agent = self
            .agents
            .get(address)
            .ok_or_else(|| anyhow::anyhow!("nobody listens at {address}"))?;
        self.calls
            .lock()
            .unwrap()
            .push((address.to_owned(), task.clone()));

        let key = format!("{address}/{conversation}");
        let mut memories = self.memories.lock().unwrap();
        if new_conversation {
            memories.remove(&key);
        }
        let memory = memories.entry(key).or_default();
        if task["task"] == "background" {
            memory.opponents = task["info"]["opponents"]
                .as_array()
                .map(|names| names.iter().filter_map(|n| n.as_str().map(str::to_owned)).collect())
                .unwrap_or_default();
        }
        Ok(agent.reply(&task, memory))
    }
}

/// A legal decision for whatever game the template describes.
pub fn legal_decision(template: &str, opponents: &[String]) -> Value {
    if template.contains("\"Proposal\"") {
        let option = template
            .split("must be one of: ")
            .nth(1)
            .and_then(|options| options.split(", ").next())
            .unwrap_or("None");
        json!([{ "Proposal": option.trim() }])
    } else if template.contains("\"Partners\"") {
        json!([{ "Amount": 5, "Partners": opponents }])
    } else if template.contains("\"Target\"") {
        json!([{ "Target": opponents.first().cloned().unwrap_or_default(), "Shots": 1 }])
    } else if template.contains("\"Price\"") {
        json!([{ "Price": 7 }])
    } else if template.contains("\"Door\"") {
        json!([{ "Door": 7 }])
    } else {
        json!([{ "Amount": 10 }])
    }
}

fn template_of(task: &Value) -> String {
    match task["task"].as_str() {
        Some("act") => task["info"].as_str().unwrap_or_default().to_owned(),
        // the template closes the predict prompt
        _ => task["message"].as_str().unwrap_or_default().to_owned(),
    }
}

/// Chats politely, predicts and plays a legal decision every time.
pub struct Sensible;

impl Behavior for Sensible {
    fn reply(&self, task: &Value, memory: &mut Memory) -> String {
        match task["task"].as_str() {
            Some("chat") => "<message>Let us cooperate.</message>".to_owned(),
            Some("predict") => format!(
                "<reasoning>they look sensible</reasoning><prediction>{}</prediction>",
                legal_decision(&template_of(task), &memory.opponents)
            ),
            Some("act") => format!(
                "<reasoning>safe choice</reasoning><decision>{}</decision>",
                legal_decision(&template_of(task), &memory.opponents)
            ),
            _ => "Understood.".to_owned(),
        }
    }
}

/// Needs `failures` rejected attempts before every legal decision.
pub struct Stubborn {
    pub failures: usize,
}

impl Behavior for Stubborn {
    fn reply(&self, task: &Value, memory: &mut Memory) -> String {
        if task["task"] != "act" {
            return Sensible.reply(task, memory);
        }
        memory.act_calls += 1;
        if (memory.act_calls - 1) % (self.failures + 1) < self.failures {
            "<decision>I would rather not say.</decision>".to_owned()
        } else {
            format!(
                "<decision>{}</decision>",
                legal_decision(&template_of(task), &memory.opponents)
            )
        }
    }
}

/// Talks and predicts like [`Sensible`] but never commits to a decision.
pub struct Evasive;

impl Behavior for Evasive {
    fn reply(&self, task: &Value, memory: &mut Memory) -> String {
        if task["task"] == "act" {
            return "<reasoning>undecided</reasoning>I pass.".to_owned();
        }
        Sensible.reply(task, memory)
    }
}
