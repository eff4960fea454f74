//! Structured record of one game instance, as handed to the result aggregator.
//!
//! Keys are serialised in the `PascalCase` layout the rest of the evaluation tooling reads
//! (`GameID`, `Rounds`, `PredAccuracy`, ...).

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::game_interface::{Decision, Scenario, StateSnapshot};
use crate::games::GameKind;
use crate::protocol::ChatThread;

/// Accuracy of one prediction: a number in [0, 1], or `"invalid"` when it could not be scored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Accuracy {
    Score(f64),
    Invalid,
}

impl Accuracy {
    pub fn score(self) -> Option<f64> {
        match self {
            Accuracy::Score(v) => Some(v),
            Accuracy::Invalid => None,
        }
    }
}

impl From<Option<f64>> for Accuracy {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Accuracy::Invalid, Accuracy::Score)
    }
}

impl Serialize for Accuracy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Accuracy::Score(v) => serializer.serialize_f64(*v),
            Accuracy::Invalid => serializer.serialize_str("invalid"),
        }
    }
}

impl<'de> Deserialize<'de> for Accuracy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Score(f64),
            Text(String),
        }
        match Repr::deserialize(deserializer)? {
            Repr::Score(v) => Ok(Accuracy::Score(v)),
            Repr::Text(t) if t == "invalid" => Ok(Accuracy::Invalid),
            Repr::Text(t) => Err(serde::de::Error::custom(format!(
                "expected a number or \"invalid\", got \"{t}\""
            ))),
        }
    }
}

/// What `predictor` expected `subject` to do this round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PredictionEntry {
    pub predictor: String,
    pub subject: String,
    pub reasoning: String,
    /// Parsed prediction, or the raw text when it could not be parsed.
    pub prediction: Value,
    pub parsed: bool,
    pub accuracy: Accuracy,
}

/// Decision a player ended up playing this round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ActionRecord {
    pub reasoning: String,
    pub action: Decision,
    /// Number of calls it took; equals the attempt limit when the null action was substituted.
    pub attempts: u32,
    pub substituted: bool,
}

impl ActionRecord {
    /// Reasoning recorded for substituted decisions.
    pub const ERROR_MARKER: &'static str = "error";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RoundLog {
    pub round: u32,
    pub chats: Vec<ChatThread>,
    pub predictions: Vec<PredictionEntry>,
    pub actions: BTreeMap<String, ActionRecord>,
    pub observations: BTreeMap<String, String>,
    #[serde(rename = "NewStates")]
    pub new_state: StateSnapshot,
    pub score_increments: BTreeMap<String, f64>,
}

/// Log of one game instance.
///
/// `Participants`, `Scores`, `PredAccuracy` and `Transparency` are keyed by agent role; rounds
/// refer to players by their display name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GameLog {
    #[serde(rename = "GameID")]
    pub game_id: u64,
    pub game: GameKind,
    pub scenario: Scenario,
    pub num_players: usize,
    /// Agent role -> display name.
    pub participants: BTreeMap<String, String>,
    /// Display name -> private goals.
    pub preferences: BTreeMap<String, String>,
    pub rounds: Vec<RoundLog>,
    pub scores: BTreeMap<String, f64>,
    pub pred_accuracy: BTreeMap<String, Option<f64>>,
    pub transparency: BTreeMap<String, Option<f64>>,
    pub completed: bool,
    pub timestamp: String,
    /// Seconds.
    pub duration: f64,
}

impl GameLog {
    pub fn open(
        game_id: u64,
        game: GameKind,
        scenario: Scenario,
        participants: BTreeMap<String, String>,
        preferences: BTreeMap<String, String>,
    ) -> GameLog {
        GameLog {
            game_id,
            game,
            scenario,
            num_players: participants.len(),
            participants,
            preferences,
            rounds: Vec::new(),
            scores: BTreeMap::new(),
            pred_accuracy: BTreeMap::new(),
            transparency: BTreeMap::new(),
            completed: false,
            timestamp: OffsetDateTime::now_utc()
                .format(&Rfc3339)
                .unwrap_or_default(),
            duration: 0.0,
        }
    }

    /// Record the final scores (by display name) and compute the prediction metrics.
    pub fn close(&mut self, final_scores: &BTreeMap<String, f64>, elapsed: Duration) {
        let metrics: Vec<_> = self
            .participants
            .iter()
            .map(|(agent, name)| {
                let given = mean(
                    self.predictions()
                        .filter(|p| &p.predictor == name)
                        .filter_map(|p| p.accuracy.score()),
                );
                let received = mean(
                    self.predictions()
                        .filter(|p| &p.subject == name)
                        .filter_map(|p| p.accuracy.score()),
                );
                let score = final_scores.get(name).copied().unwrap_or_default();
                (agent.clone(), score, given, received)
            })
            .collect();
        for (agent, score, given, received) in metrics {
            self.scores.insert(agent.clone(), score);
            self.pred_accuracy.insert(agent.clone(), given);
            self.transparency.insert(agent, received);
        }
        self.duration = elapsed.as_secs_f64();
        self.completed = true;
    }

    fn predictions(&self) -> impl Iterator<Item = &PredictionEntry> {
        self.rounds.iter().flat_map(|r| r.predictions.iter())
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn entry(predictor: &str, subject: &str, accuracy: Accuracy) -> PredictionEntry {
        PredictionEntry {
            predictor: predictor.into(),
            subject: subject.into(),
            reasoning: String::new(),
            prediction: json!([]),
            parsed: true,
            accuracy,
        }
    }

    fn round(predictions: Vec<PredictionEntry>) -> RoundLog {
        RoundLog {
            round: 1,
            chats: Vec::new(),
            predictions,
            actions: BTreeMap::new(),
            observations: BTreeMap::new(),
            new_state: BTreeMap::new(),
            score_increments: BTreeMap::new(),
        }
    }

    #[test]
    fn accuracy_is_a_number_or_invalid() {
        assert_eq!(serde_json::to_value(Accuracy::Score(0.5)).unwrap(), json!(0.5));
        assert_eq!(serde_json::to_value(Accuracy::Invalid).unwrap(), json!("invalid"));
        assert_eq!(
            serde_json::from_value::<Accuracy>(json!("invalid")).unwrap(),
            Accuracy::Invalid
        );
        assert_eq!(
            serde_json::from_value::<Accuracy>(json!(1)).unwrap(),
            Accuracy::Score(1.0)
        );
        assert!(serde_json::from_value::<Accuracy>(json!("great")).is_err());
    }

    #[test]
    fn closing_computes_accuracy_and_transparency() {
        let participants = BTreeMap::from([
            ("alpha".to_owned(), "Aisha".to_owned()),
            ("beta".to_owned(), "Boris".to_owned()),
        ]);
        let mut log = GameLog::open(7, GameKind::Hupi, Scenario::First, participants, BTreeMap::new());
        log.rounds.push(round(vec![
            entry("Aisha", "Boris", Accuracy::Score(1.0)),
            entry("Boris", "Aisha", Accuracy::Invalid),
        ]));
        log.rounds.push(round(vec![
            entry("Aisha", "Boris", Accuracy::Score(0.0)),
            entry("Boris", "Aisha", Accuracy::Invalid),
        ]));
        let scores = BTreeMap::from([("Aisha".to_owned(), 2.0), ("Boris".to_owned(), 1.0)]);
        log.close(&scores, Duration::from_millis(1500));

        assert!(log.completed);
        assert_eq!(log.scores["alpha"], 2.0);
        assert_eq!(log.pred_accuracy["alpha"], Some(0.5));
        assert_eq!(log.pred_accuracy["beta"], None);
        assert_eq!(log.transparency["beta"], Some(0.5));
        assert_eq!(log.transparency["alpha"], None);
        assert_eq!(log.duration, 1.5);

        let value = serde_json::to_value(&log).unwrap();
        assert_eq!(value["GameID"], json!(7));
        assert_eq!(value["Game"], json!("HUPI"));
        assert_eq!(value["PredAccuracy"]["beta"], Value::Null);
    }
}
