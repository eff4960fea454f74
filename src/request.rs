//! Evaluation requests: which agents take part and how the run is composed.
//!
//! A request is a JSON document:
//!
//! ```json
//! {
//!   "participants": { "alpha": "127.0.0.1:9001", "beta": "127.0.0.1:9002" },
//!   "config": {
//!     "required": ["alpha"],
//!     "max_size": 3,
//!     "max_runs": 20,
//!     "games": ["HUPI", "Survivor"],
//!     "max_turns": { "Survivor": 5 },
//!     "seed": 42
//!   }
//! }
//! ```
//!
//! Every `config` entry is optional. Unknown entries are kept in [`RunConfig::extra`] so an
//! evaluator can require deployment specific keys without this crate knowing about them.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ArenaError;
use crate::games::GameKind;
use crate::player::Participant;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalRequest {
    /// Agent role -> network address.
    pub participants: BTreeMap<String, String>,
    #[serde(default)]
    pub config: RunConfig,
}

/// How the worklist of game instances is composed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Roles that must take part in every instance.
    #[serde(default)]
    pub required: Vec<String>,
    /// Largest number of players in one instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<usize>,
    /// Cap on the number of instances, sampled uniformly when the full cross product is larger.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_runs: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Variants to play, all of them when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub games: Option<Vec<String>>,
    /// Per variant round limit, overriding the variant default.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub max_turns: BTreeMap<String, u32>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl RunConfig {
    pub const DEFAULT_MAX_SIZE: usize = 4;

    pub fn max_size(&self) -> usize {
        self.max_size.unwrap_or(Self::DEFAULT_MAX_SIZE)
    }

    /// Requested variants in request order, duplicates removed.
    pub fn games(&self) -> Result<Vec<GameKind>, ArenaError> {
        let Some(names) = &self.games else {
            return Ok(GameKind::ALL.to_vec());
        };
        let mut kinds = Vec::new();
        for name in names {
            let kind: GameKind = name
                .parse()
                .map_err(|_| ArenaError::Request(format!("Unknown game: {name}")))?;
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        Ok(kinds)
    }

    pub fn max_turns_for(&self, kind: GameKind) -> u32 {
        self.max_turns
            .iter()
            .find(|(name, _)| name.parse::<GameKind>().is_ok_and(|k| k == kind))
            .map_or(kind.default_max_turns(), |(_, turns)| *turns)
    }

    /// True when the request carried `key`, typed or not.
    pub fn has_key(&self, key: &str) -> bool {
        match key {
            "required" => !self.required.is_empty(),
            "max_size" => self.max_size.is_some(),
            "max_runs" => self.max_runs.is_some(),
            "seed" => self.seed.is_some(),
            "games" => self.games.is_some(),
            "max_turns" => !self.max_turns.is_empty(),
            other => self.extra.contains_key(other),
        }
    }

    fn check(&self) -> Result<(), ArenaError> {
        if self.max_size() < 2 {
            return Err(ArenaError::Request(format!(
                "max_size must be at least 2, got {}",
                self.max_size()
            )));
        }
        if self.max_runs == Some(0) {
            return Err(ArenaError::Request("max_runs must be at least 1".into()));
        }
        if self.games()?.is_empty() {
            return Err(ArenaError::Request("No game selected".into()));
        }
        for (name, turns) in &self.max_turns {
            if name.parse::<GameKind>().is_err() {
                return Err(ArenaError::Request(format!("Unknown game in max_turns: {name}")));
            }
            if *turns == 0 {
                return Err(ArenaError::Request(format!(
                    "max_turns for {name} must be at least 1"
                )));
            }
        }
        Ok(())
    }
}

impl EvalRequest {
    pub fn from_json(text: &str) -> Result<EvalRequest, ArenaError> {
        serde_json::from_str(text).map_err(|e| ArenaError::Request(format!("malformed request: {e}")))
    }

    /// Participants ordered by role.
    pub fn participants(&self) -> Vec<Participant> {
        self.participants
            .iter()
            .map(|(role, address)| Participant::new(role.clone(), address.clone()))
            .collect()
    }

    /// Reject the request before anything runs.
    pub fn validate(
        &self,
        required_roles: &[String],
        required_config_keys: &[String],
    ) -> Result<(), ArenaError> {
        let missing_roles: BTreeSet<&String> = required_roles
            .iter()
            .filter(|role| !self.participants.contains_key(*role))
            .collect();
        if !missing_roles.is_empty() {
            return Err(ArenaError::Request(format!("Missing roles: {missing_roles:?}")));
        }

        let missing_keys: BTreeSet<&String> = required_config_keys
            .iter()
            .filter(|key| !self.config.has_key(key))
            .collect();
        if !missing_keys.is_empty() {
            return Err(ArenaError::Request(format!(
                "Missing config keys: {missing_keys:?}"
            )));
        }

        if self.participants.len() < 2 {
            return Err(ArenaError::Request(format!(
                "At least 2 participants are needed, got {}",
                self.participants.len()
            )));
        }

        let unknown: BTreeSet<&String> = self
            .config
            .required
            .iter()
            .filter(|role| !self.participants.contains_key(*role))
            .collect();
        if !unknown.is_empty() {
            return Err(ArenaError::Request(format!(
                "Required entries are not participants: {unknown:?}"
            )));
        }
        if self.config.required.len() > self.config.max_size() {
            return Err(ArenaError::Request(format!(
                "{} required entries cannot fit in instances of at most {} players",
                self.config.required.len(),
                self.config.max_size()
            )));
        }

        self.config.check()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(config: &str) -> EvalRequest {
        EvalRequest::from_json(&format!(
            r#"{{"participants": {{"alpha": "127.0.0.1:9001", "beta": "127.0.0.1:9002"}}, "config": {config}}}"#
        ))
        .unwrap()
    }

    #[test]
    fn parses_typed_and_extra_keys() {
        let req = request(r#"{"max_size": 3, "games": ["hupi", "Survivor", "HUPI"], "judge": "x"}"#);
        assert_eq!(req.config.max_size(), 3);
        assert_eq!(
            req.config.games().unwrap(),
            vec![GameKind::Hupi, GameKind::Survivor]
        );
        assert!(req.config.has_key("judge"));
        assert!(req.config.has_key("max_size"));
        assert!(!req.config.has_key("max_runs"));
        assert_eq!(req.participants()[0].role, "alpha");
    }

    #[test]
    fn defaults() {
        let req = EvalRequest::from_json(
            r#"{"participants": {"alpha": "127.0.0.1:9001", "beta": "127.0.0.1:9002"}}"#,
        )
        .unwrap();
        assert_eq!(req.config.max_size(), RunConfig::DEFAULT_MAX_SIZE);
        assert_eq!(req.config.games().unwrap().len(), 5);
        assert_eq!(req.config.max_turns_for(GameKind::Survivor), 8);
        assert!(req.validate(&[], &[]).is_ok());
    }

    #[test]
    fn max_turns_override() {
        let req = request(r#"{"max_turns": {"survivor": 2}}"#);
        assert_eq!(req.config.max_turns_for(GameKind::Survivor), 2);
        assert_eq!(req.config.max_turns_for(GameKind::Hupi), 4);
    }

    #[test]
    fn rejects_missing_roles_and_keys() {
        let req = request("{}");
        let err = req.validate(&["judge".to_owned()], &[]).unwrap_err();
        assert!(err.to_string().contains("Missing roles"));
        let err = req.validate(&[], &["max_runs".to_owned()]).unwrap_err();
        assert!(err.to_string().contains("Missing config keys"));
    }

    #[test]
    fn rejects_bad_configs() {
        for config in [
            r#"{"required": ["gamma"]}"#,
            r#"{"games": ["Chess"]}"#,
            r#"{"games": []}"#,
            r#"{"max_size": 1}"#,
            r#"{"max_runs": 0}"#,
            r#"{"max_turns": {"HUPI": 0}}"#,
        ] {
            assert!(
                matches!(request(config).validate(&[], &[]), Err(ArenaError::Request(_))),
                "{config}"
            );
        }
    }

    #[test]
    fn rejects_single_participant() {
        let req =
            EvalRequest::from_json(r#"{"participants": {"alpha": "127.0.0.1:9001"}}"#).unwrap();
        assert!(req.validate(&[], &[]).is_err());
        assert!(EvalRequest::from_json("{").is_err());
    }
}
