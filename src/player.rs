use std::fmt::Display;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

/// An agent taking part in the evaluation, as listed in the request (role -> address).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Participant {
    /// Role of the agent in the request; this is the key results are reported under.
    pub role: String,
    /// Network address of the agent.
    pub address: String,
}

impl Participant {
    pub fn new(role: impl Into<String>, address: impl Into<String>) -> Self {
        Participant {
            role: role.into(),
            address: address.into(),
        }
    }
}

impl Display for Participant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.role, self.address)
    }
}

/// A seat in one game instance.
///
/// The display name is drawn per instance and stays fixed for its whole lifetime; `model` is
/// the opaque reference to the remote agent sitting on that seat.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Player {
    pub name: String,
    pub role: String,
    pub model: String,
    #[serde(skip)]
    pub address: String,
    pub mute: bool,
    #[serde(rename = "Exploration")]
    pub explore: bool,
}

impl PartialEq for Player {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Player {}

impl Hash for Player {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl Player {
    /// An AI player seated under `name`, played by `participant`.
    pub fn new(name: impl Into<String>, participant: &Participant) -> Player {
        Player {
            name: name.into(),
            role: "AI".to_owned(),
            model: participant.role.clone(),
            address: participant.address.clone(),
            mute: false,
            explore: false,
        }
    }

    /// A player without a remote agent, used to build games directly (tests, replays).
    pub fn named(name: impl Into<String>) -> Player {
        let name = name.into();
        Player {
            model: name.clone(),
            name,
            role: "AI".to_owned(),
            address: String::new(),
            mute: false,
            explore: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn players_are_identified_by_name() {
        let a = Player::new("Aisha", &Participant::new("agent_a", "127.0.0.1:9001"));
        let mut b = Player::new("Aisha", &Participant::new("agent_b", "127.0.0.1:9002"));
        assert_eq!(a, b);
        b.name = "Boris".into();
        assert_ne!(a, b);
    }

    #[test]
    fn serialises_like_the_task_roster() {
        let p = Player::new("Chen", &Participant::new("agent_a", "127.0.0.1:9001"));
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["Name"], "Chen");
        assert_eq!(json["Model"], "agent_a");
        assert_eq!(json["Exploration"], false);
        assert!(json.get("Address").is_none());
    }
}
