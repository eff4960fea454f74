//! The five game variants and the closed [`Game`] enum dispatching to them.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ArenaError;
use crate::extract::field;
use crate::game_interface::{
    ActionFormat, Decision, GameConfig, GameEngine, Resolution, Scoreboard, StateSnapshot,
};

pub mod coalition;
pub mod commons;
pub mod hupi;
pub mod scheduler;
pub mod survivor;

pub use coalition::Coalition;
pub use commons::TragedyOfCommons;
pub use hupi::Hupi;
pub use scheduler::Scheduler;
pub use survivor::Survivor;

/// Tag of a game variant, as written in requests and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GameKind {
    Survivor,
    TragedyOfCommons,
    Scheduler,
    Coalition,
    #[serde(rename = "HUPI")]
    Hupi,
}

impl GameKind {
    pub const ALL: [GameKind; 5] = [
        GameKind::Survivor,
        GameKind::TragedyOfCommons,
        GameKind::Scheduler,
        GameKind::Coalition,
        GameKind::Hupi,
    ];

    pub fn name(self) -> &'static str {
        match self {
            GameKind::Survivor => "Survivor",
            GameKind::TragedyOfCommons => "TragedyOfCommons",
            GameKind::Scheduler => "Scheduler",
            GameKind::Coalition => "Coalition",
            GameKind::Hupi => "HUPI",
        }
    }

    pub fn default_max_turns(self) -> u32 {
        match self {
            GameKind::Survivor => 8,
            GameKind::TragedyOfCommons => 5,
            GameKind::Scheduler => 4,
            GameKind::Coalition => 5,
            GameKind::Hupi => 4,
        }
    }
}

impl Display for GameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for GameKind {
    type Err = ArenaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GameKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ArenaError::Config(format!("unknown game '{s}'")))
    }
}

/// A running game instance.
pub enum Game {
    Scheduler(Scheduler),
    Coalition(Coalition),
    Hupi(Hupi),
    TragedyOfCommons(TragedyOfCommons),
    Survivor(Survivor),
}

impl Game {
    pub fn new(kind: GameKind, config: GameConfig) -> Result<Game, ArenaError> {
        Ok(match kind {
            GameKind::Scheduler => Game::Scheduler(Scheduler::new(config)?),
            GameKind::Coalition => Game::Coalition(Coalition::new(config)?),
            GameKind::Hupi => Game::Hupi(Hupi::new(config)?),
            GameKind::TragedyOfCommons => Game::TragedyOfCommons(TragedyOfCommons::new(config)?),
            GameKind::Survivor => Game::Survivor(Survivor::new(config)?),
        })
    }

    pub fn kind(&self) -> GameKind {
        match self {
            Game::Scheduler(_) => GameKind::Scheduler,
            Game::Coalition(_) => GameKind::Coalition,
            Game::Hupi(_) => GameKind::Hupi,
            Game::TragedyOfCommons(_) => GameKind::TragedyOfCommons,
            Game::Survivor(_) => GameKind::Survivor,
        }
    }

    fn engine(&self) -> &dyn GameEngine {
        match self {
            Game::Scheduler(g) => g,
            Game::Coalition(g) => g,
            Game::Hupi(g) => g,
            Game::TragedyOfCommons(g) => g,
            Game::Survivor(g) => g,
        }
    }

    fn engine_mut(&mut self) -> &mut dyn GameEngine {
        match self {
            Game::Scheduler(g) => g,
            Game::Coalition(g) => g,
            Game::Hupi(g) => g,
            Game::TragedyOfCommons(g) => g,
            Game::Survivor(g) => g,
        }
    }
}

impl GameEngine for Game {
    fn initialize_game(&mut self) -> Result<(), ArenaError> {
        self.engine_mut().initialize_game()
    }

    fn title(&self) -> &'static str {
        self.engine().title()
    }

    fn describe_game(&self) -> String {
        self.engine().describe_game()
    }

    fn get_preferences(&self, player: &str) -> String {
        self.engine().get_preferences(player)
    }

    fn action_format(&self) -> ActionFormat {
        self.engine().action_format()
    }

    fn validate_actions(&self, player: &str, action: &[Value]) -> Result<(), String> {
        self.engine().validate_actions(player, action)
    }

    fn process_actions(&mut self, actions: &BTreeMap<String, Decision>) -> Resolution {
        self.engine_mut().process_actions(actions)
    }

    fn update_scores(&mut self) {
        self.engine_mut().update_scores()
    }

    fn is_game_over(&self) -> bool {
        self.engine().is_game_over()
    }

    fn null_action(&mut self, player: &str) -> Decision {
        self.engine_mut().null_action(player)
    }

    fn scoreboard(&self) -> &Scoreboard {
        self.engine().scoreboard()
    }

    fn state(&self) -> StateSnapshot {
        self.engine().state()
    }

    fn active_players(&self) -> Vec<String> {
        self.engine().active_players()
    }

    fn prediction_accuracy(&self, predicted: &[Value], realized: &[Value]) -> Option<f64> {
        self.engine().prediction_accuracy(predicted, realized)
    }
}

/// The only record of a one-record decision.
pub(crate) fn single_record(action: &[Value]) -> Result<&Map<String, Value>, String> {
    match action {
        [Value::Object(record)] => Ok(record),
        [_] => Err("The decision must be a dictionary enclosed in a list.".into()),
        _ => Err("The list should contain a single dictionary.".into()),
    }
}

/// Whole number, rejecting floats and booleans.
pub(crate) fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => n.as_i64(),
        _ => None,
    }
}

/// 1.0 when both first records carry the same value under `key`, 0.0 otherwise.
pub(crate) fn exact_match(predicted: &[Value], realized: &[Value], key: &str) -> Option<f64> {
    let guess = field(predicted.first()?.as_object()?, key)?;
    let actual = field(realized.first()?.as_object()?, key)?;
    let same = match (guess.as_f64(), actual.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => guess == actual,
    };
    Some(if same { 1.0 } else { 0.0 })
}

/// `(span - |guess - actual|) / span` on the numeric `key` of both first records, in [0, 1].
pub(crate) fn proximity(predicted: &[Value], realized: &[Value], key: &str, span: f64) -> Option<f64> {
    let guess = field(predicted.first()?.as_object()?, key)?.as_f64()?;
    let actual = field(realized.first()?.as_object()?, key)?.as_f64()?;
    Some(((span - (guess - actual).abs()) / span).clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::game_interface::Scenario;
    use crate::player::Player;

    #[test]
    fn kinds_parse_from_names() {
        assert_eq!("HUPI".parse::<GameKind>().unwrap(), GameKind::Hupi);
        assert_eq!("survivor".parse::<GameKind>().unwrap(), GameKind::Survivor);
        assert!("Chess".parse::<GameKind>().is_err());
        assert_eq!(serde_json::to_value(GameKind::Hupi).unwrap(), json!("HUPI"));
    }

    #[test]
    fn every_kind_builds_and_dispatches() {
        for kind in GameKind::ALL {
            let players = vec![Player::named("Aisha"), Player::named("Boris")];
            let config = GameConfig::new(players, Scenario::First, kind.default_max_turns())
                .with_seed(11);
            let mut game = Game::new(kind, config).unwrap();
            assert_eq!(game.kind(), kind);
            assert_eq!(game.title(), kind.name());
            assert!(!game.is_game_over());
            let actions: BTreeMap<String, Decision> = game
                .active_players()
                .into_iter()
                .map(|p| {
                    let null = game.null_action(&p);
                    (p, null)
                })
                .collect();
            assert!(actions.values().all(|a| !a.is_empty()));
            let res = game.process_actions(&actions);
            assert_eq!(res.new_state.len(), 2, "{kind}");
            assert_eq!(res.observations.len(), 2, "{kind}");
        }
    }

    #[test]
    fn missing_players_fail_construction() {
        for kind in GameKind::ALL {
            let config = GameConfig::new(Vec::new(), Scenario::First, 3);
            assert!(matches!(Game::new(kind, config), Err(ArenaError::Config(_))));
        }
    }

    #[test]
    fn accuracy_helpers() {
        let p = [json!({"Price": 7})];
        assert_eq!(exact_match(&p, &[json!({"Price": 7})], "Price"), Some(1.0));
        assert_eq!(exact_match(&p, &[json!({"Price": 8})], "Price"), Some(0.0));
        assert_eq!(exact_match(&[], &[json!({"Price": 8})], "Price"), None);
        assert_eq!(
            proximity(&[json!({"Amount": 10})], &[json!({"Amount": 15})], "Amount", 20.0),
            Some(0.75)
        );
        assert_eq!(
            proximity(&[json!({"Amount": 0})], &[json!({"Amount": 300})], "Amount", 100.0),
            Some(0.0)
        );
    }

    #[test]
    fn integers_only() {
        assert_eq!(integer(&json!(3)), Some(3));
        assert_eq!(integer(&json!(3.0)), None);
        assert_eq!(integer(&json!(true)), None);
    }
}
