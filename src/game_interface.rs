//! Contract every game variant implements, and the configuration they are built from.
//!
//! A game instance owns its configuration and its state exclusively. The round orchestrator
//! only talks to it through [`GameEngine`]: it asks for the narrative texts, validates each
//! player's decision, hands over the validated decisions of a round to
//! [`GameEngine::process_actions`] and reads back observations, the new state snapshot and
//! the scores.
//!
//! Decisions travel as JSON: an ordered list of records whose shape depends on the variant
//! (see each variant's [`ActionFormat`]). The state is exposed as a [`StateSnapshot`], one JSON
//! record per player, rebuilt wholesale by every resolution.

use std::collections::{BTreeMap, HashSet};
use std::fmt::Display;

use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ArenaError;
use crate::player::Player;

/// Ordered decision records of one player for one round.
pub type Decision = Vec<Value>;

/// Per-player state records, keyed by player name.
pub type StateSnapshot = BTreeMap<String, Value>;

/// Thematic variant of a game: same mechanic, different narrative and parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Scenario {
    First,
    Second,
}

impl Scenario {
    pub const ALL: [Scenario; 2] = [Scenario::First, Scenario::Second];
}

impl TryFrom<u8> for Scenario {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Scenario::First),
            2 => Ok(Scenario::Second),
            other => Err(format!("scenario must be 1 or 2, got {other}")),
        }
    }
}

impl From<Scenario> for u8 {
    fn from(value: Scenario) -> Self {
        match value {
            Scenario::First => 1,
            Scenario::Second => 2,
        }
    }
}

impl Display for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", u8::from(*self))
    }
}

/// Rules of the decision phase in natural language, plus the exact schema to submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionFormat {
    pub description: String,
    pub template: String,
}

/// Outcome of one round of resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Text shown to each player that was active before the round was resolved.
    pub observations: BTreeMap<String, String>,
    /// State records of the players that were active before the round was resolved.
    pub new_state: StateSnapshot,
}

/// Everything needed to build a game instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GameConfig {
    pub players: Vec<Player>,
    #[serde(default = "default_scenario")]
    pub scenario: Scenario,
    #[serde(alias = "Max_num_turns")]
    pub max_turns: u32,
    /// Fixed preference rankings (player -> option -> rank) instead of the generated ones.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferences: Option<BTreeMap<String, BTreeMap<String, u32>>>,
    /// Fixed initial state records (player -> record) instead of the generated ones.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initialization: Option<BTreeMap<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hit_probability: Option<f64>,
    /// Seed for every random draw of the instance. Drawn from the OS when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

fn default_scenario() -> Scenario {
    Scenario::First
}

impl GameConfig {
    pub fn new(players: Vec<Player>, scenario: Scenario, max_turns: u32) -> Self {
        GameConfig {
            players,
            scenario,
            max_turns,
            preferences: None,
            initialization: None,
            hit_probability: None,
            seed: None,
        }
    }

    /// Build a configuration from its JSON form (`{"Players": [...], "Scenario": 1, ...}`).
    pub fn from_json(value: Value) -> Result<Self, ArenaError> {
        serde_json::from_value(value).map_err(|e| ArenaError::Config(e.to_string()))
    }

    #[must_use]
    pub fn with_preferences(mut self, preferences: BTreeMap<String, BTreeMap<String, u32>>) -> Self {
        self.preferences = Some(preferences);
        self
    }

    #[must_use]
    pub fn with_initialization(mut self, initialization: BTreeMap<String, Value>) -> Self {
        self.initialization = Some(initialization);
        self
    }

    #[must_use]
    pub fn with_hit_probability(mut self, probability: f64) -> Self {
        self.hit_probability = Some(probability);
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn player_names(&self) -> Vec<String> {
        self.players.iter().map(|p| p.name.clone()).collect()
    }

    /// Check the keys every variant relies on.
    pub(crate) fn check(&self) -> Result<(), ArenaError> {
        if self.players.len() < 2 {
            return Err(ArenaError::Config(format!(
                "at least 2 players are required, got {}",
                self.players.len()
            )));
        }
        let mut seen = HashSet::new();
        for player in &self.players {
            if player.name.trim().is_empty() {
                return Err(ArenaError::Config("player names must not be empty".into()));
            }
            if !seen.insert(player.name.as_str()) {
                return Err(ArenaError::Config(format!(
                    "player name '{}' is used twice",
                    player.name
                )));
            }
        }
        if self.max_turns == 0 {
            return Err(ArenaError::Config("MaxTurns must be at least 1".into()));
        }
        if let Some(p) = self.hit_probability {
            if !(0.0..=1.0).contains(&p) {
                return Err(ArenaError::Config(format!(
                    "hit probability must be within [0, 1], got {p}"
                )));
            }
        }
        Ok(())
    }

    /// Override record of `player`, or a `Config` error naming the missing key.
    pub(crate) fn override_for<'a, T>(
        overrides: &'a BTreeMap<String, T>,
        key: &str,
        player: &str,
    ) -> Result<&'a T, ArenaError> {
        overrides
            .get(player)
            .ok_or_else(|| ArenaError::Config(format!("{key} has no entry for player '{player}'")))
    }

    pub(crate) fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }
}

/// Running totals and last round increments of every player.
///
/// Scores of eliminated players stay frozen at their last value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scoreboard {
    scores: BTreeMap<String, f64>,
    increments: BTreeMap<String, f64>,
}

impl Scoreboard {
    pub fn new<'a>(players: impl IntoIterator<Item = &'a String>) -> Self {
        let scores: BTreeMap<String, f64> = players.into_iter().map(|p| (p.clone(), 0.0)).collect();
        Scoreboard {
            increments: scores.clone(),
            scores,
        }
    }

    /// Add `increment` to `player` and remember it as the last increment.
    pub fn credit(&mut self, player: &str, increment: f64) {
        *self.scores.entry(player.to_owned()).or_default() += increment;
        self.increments.insert(player.to_owned(), increment);
    }

    pub fn score(&self, player: &str) -> f64 {
        self.scores.get(player).copied().unwrap_or_default()
    }

    pub fn scores(&self) -> &BTreeMap<String, f64> {
        &self.scores
    }

    pub fn increments(&self) -> &BTreeMap<String, f64> {
        &self.increments
    }
}

/// What a game variant must implement to be driven by the arena.
pub trait GameEngine {
    /// (Re)build the scenario dependent state, preferences and scores.
    fn initialize_game(&mut self) -> Result<(), ArenaError>;

    /// Name of the game.
    fn title(&self) -> &'static str;

    /// Narrative shared with every player at onboarding.
    fn describe_game(&self) -> String;

    /// Private goals of `player`.
    fn get_preferences(&self, player: &str) -> String;

    fn action_format(&self) -> ActionFormat;

    /// Structural and semantic validation of a decision of `player`.
    ///
    /// Never panics; the error is phrased so that the agent can correct its submission.
    fn validate_actions(&self, player: &str, action: &[Value]) -> Result<(), String>;

    /// Resolve one round from the decisions of every active player.
    ///
    /// Decisions must have passed [`validate_actions`](Self::validate_actions) or be the
    /// [`null_action`](Self::null_action). The state is replaced by a new snapshot and the
    /// scores are updated.
    fn process_actions(&mut self, actions: &BTreeMap<String, Decision>) -> Resolution;

    /// Fold the payoffs of the round just resolved into the scores.
    fn update_scores(&mut self);

    fn is_game_over(&self) -> bool;

    /// Decision substituted when `player` could not produce a valid one.
    fn null_action(&mut self, player: &str) -> Decision;

    fn scoreboard(&self) -> &Scoreboard;

    /// Running totals, frozen for eliminated players.
    fn scores(&self) -> &BTreeMap<String, f64> {
        self.scoreboard().scores()
    }

    /// Increments of the last resolved round.
    fn score_increments(&self) -> &BTreeMap<String, f64> {
        self.scoreboard().increments()
    }

    /// State records of the players active before the last resolution.
    fn state(&self) -> StateSnapshot;

    /// Players still in the game, in seating order.
    fn active_players(&self) -> Vec<String>;

    /// Similarity in [0, 1] between a predicted and a realised decision.
    ///
    /// `None` when the prediction cannot be compared (wrong shape, missing fields).
    fn prediction_accuracy(&self, predicted: &[Value], realized: &[Value]) -> Option<f64>;
}
