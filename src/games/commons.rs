//! Tragedy of the commons: fishermen sharing fishing grounds, or farmers sharing a pasture.
//!
//! The shared reserve loses what is extracted and then regrows by half of what is left, capped
//! at 200. If it falls below 10 the grounds collapse: nobody earns anything that round and the
//! game ends.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde_json::{json, Value};

use super::{proximity, single_record};
use crate::error::ArenaError;
use crate::game_interface::{
    ActionFormat, Decision, GameConfig, GameEngine, Resolution, Scenario, Scoreboard,
    StateSnapshot,
};

const INITIAL_RESERVE: f64 = 100.0;
const REGROWTH_RATE: f64 = 0.5;
const REGROWTH_CAP: f64 = 200.0;
const COLLAPSE_BELOW: f64 = 10.0;

/// Reserve after one round of extraction and regrowth.
pub fn next_reserve(reserve: f64, extracted: f64) -> f64 {
    let left = reserve - extracted;
    left + (REGROWTH_RATE * left).min(REGROWTH_CAP)
}

pub struct TragedyOfCommons {
    config: GameConfig,
    rng: StdRng,
    seats: Vec<String>,
    reserve: f64,
    totals: BTreeMap<String, f64>,
    months: BTreeMap<String, u32>,
    catches: BTreeMap<String, f64>,
    turn: u32,
    scoreboard: Scoreboard,
}

impl TragedyOfCommons {
    pub fn new(config: GameConfig) -> Result<Self, ArenaError> {
        config.check()?;
        let rng = config.rng();
        let mut game = TragedyOfCommons {
            seats: config.player_names(),
            config,
            rng,
            reserve: INITIAL_RESERVE,
            totals: BTreeMap::new(),
            months: BTreeMap::new(),
            catches: BTreeMap::new(),
            turn: 1,
            scoreboard: Scoreboard::default(),
        };
        game.initialize_game()?;
        Ok(game)
    }

    pub fn reserve(&self) -> f64 {
        self.reserve
    }

    fn collapsed(&self) -> bool {
        self.reserve < COLLAPSE_BELOW
    }

    fn amount(action: Option<&Decision>) -> f64 {
        action
            .and_then(|a| a.first())
            .and_then(|r| r.get("Amount"))
            .and_then(Value::as_f64)
            .unwrap_or_default()
    }
}

impl GameEngine for TragedyOfCommons {
    fn initialize_game(&mut self) -> Result<(), ArenaError> {
        self.turn = 1;
        self.reserve = INITIAL_RESERVE;
        self.seats = self.config.player_names();
        self.seats.shuffle(&mut self.rng);
        self.scoreboard = Scoreboard::new(&self.seats);
        self.totals = self.seats.iter().map(|p| (p.clone(), 0.0)).collect();
        self.months = self.seats.iter().map(|p| (p.clone(), 1)).collect();
        self.catches.clear();
        Ok(())
    }

    fn title(&self) -> &'static str {
        "TragedyOfCommons"
    }

    fn describe_game(&self) -> String {
        let others = self.seats.len() - 1;
        match self.config.scenario {
            Scenario::First => format!(
                "You are a fisherman. Each month, you must decide how many tonnes of fish you draw from the fishing grounds.\n\
                 There are {others} other fishermen who each make a similar decision in parallel.\n\
                 The fishing grounds start with 100 tonnes of fish.\n\
                 Each month after fishing, the amount of fish increases by 50% of what was left.\n\
                 If the amount of fish in the grounds falls below 10 tonnes, then no one gets any fish that month and the grounds must be abandoned due to overfishing."
            ),
            Scenario::Second => format!(
                "You are a farmer. Each month, you must decide how much grass to graze from the fields.\n\
                 There are {others} other farmers who each make a similar decision in parallel.\n\
                 The amount of grass in the grazing grounds currently supports a maximum of 100 cattle grazing at a time.\n\
                 Each month after grazing, the amount of grass increases by 50% of what was left.\n\
                 If the amount of grass in the field falls below the ability to support 10 cattle, then no one benefits from the grass that month and the fields must be abandoned due to overgrazing."
            ),
        }
    }

    fn get_preferences(&self, _player: &str) -> String {
        match self.config.scenario {
            Scenario::First => "You want to maximize the total tonnes of fish you catch for yourself!",
            Scenario::Second => "You want to maximize the amount of cattle you graze!",
        }
        .to_owned()
    }

    fn action_format(&self) -> ActionFormat {
        let description = match self.config.scenario {
            Scenario::First => "Each fisherman chooses the amount of fish to haul for themself separately this month.",
            Scenario::Second => "Each farmer chooses the amount of cattle to graze this month separately.",
        };
        ActionFormat {
            description: description.to_owned(),
            template: "JSON template:\n\n[{\"Amount\": int}]\n\nint signifies the amount you take this month.\nMake sure to respond precisely in this format.".to_owned(),
        }
    }

    fn validate_actions(&self, _player: &str, action: &[Value]) -> Result<(), String> {
        let record = single_record(action)?;
        if record.len() > 1 {
            return Err("You can only make one decision. The list should have a single dictionary with a single entry.".into());
        }
        match record.get("Amount").and_then(Value::as_f64) {
            None => Err("Make sure there is an 'Amount' key with a numeric value.".into()),
            Some(amount) if amount < 0.0 => Err("Amount must be positive.".into()),
            Some(amount) if amount > self.reserve => Err(format!(
                "Amount cannot exceed the maximal quantity available ({}).",
                self.reserve
            )),
            Some(_) => Ok(()),
        }
    }

    fn process_actions(&mut self, actions: &BTreeMap<String, Decision>) -> Resolution {
        let amounts: BTreeMap<String, f64> = self
            .seats
            .iter()
            .map(|p| (p.clone(), Self::amount(actions.get(p))))
            .collect();
        let extracted: f64 = amounts.values().sum();
        self.reserve = next_reserve(self.reserve, extracted);

        let text = if self.collapsed() {
            match self.config.scenario {
                Scenario::First => "The fishing grounds have been overfished! All fishermen make nothing! New grounds must be found!".to_owned(),
                Scenario::Second => "The fields have been overgrazed! All farmers are left with nothing this month! New fields must be found!".to_owned(),
            }
        } else {
            match self.config.scenario {
                Scenario::First => format!(
                    "This month, {extracted} tonnes of fish were drawn from the fishing grounds altogether.\n\
                     Next month, there are {} tonnes of fish left in the fishing grounds.",
                    self.reserve
                ),
                Scenario::Second => format!(
                    "This month, {extracted} cattle grazed the fields altogether.\n\
                     Next month, {} cattle can be supported by the fields.",
                    self.reserve
                ),
            }
        };

        self.catches.clear();
        for (player, amount) in amounts {
            let catch = if self.collapsed() { 0.0 } else { amount };
            *self.totals.entry(player.clone()).or_default() += catch;
            if !self.collapsed() {
                *self.months.entry(player.clone()).or_default() += 1;
            }
            self.catches.insert(player, catch);
        }
        self.update_scores();

        self.turn += 1;
        Resolution {
            observations: self.seats.iter().map(|p| (p.clone(), text.clone())).collect(),
            new_state: self.state(),
        }
    }

    fn update_scores(&mut self) {
        for (player, catch) in &self.catches {
            self.scoreboard.credit(player, *catch);
        }
    }

    fn is_game_over(&self) -> bool {
        self.collapsed() || self.turn > self.config.max_turns
    }

    fn null_action(&mut self, _player: &str) -> Decision {
        vec![json!({"Amount": 0})]
    }

    fn scoreboard(&self) -> &Scoreboard {
        &self.scoreboard
    }

    fn state(&self) -> StateSnapshot {
        let (reserve_key, total_key) = match self.config.scenario {
            Scenario::First => ("Fish left in the fishing grounds", "Your total catches so far"),
            Scenario::Second => ("Maximum cattle that can graze", "Your total cattle grazed so far"),
        };
        let reserve = self.reserve.max(0.0);
        self.seats
            .iter()
            .map(|p| {
                let total = self.totals.get(p).copied().unwrap_or_default();
                let month = self.months.get(p).copied().unwrap_or(1);
                (
                    p.clone(),
                    json!({ reserve_key: reserve, total_key: total, "Month": month }),
                )
            })
            .collect()
    }

    fn active_players(&self) -> Vec<String> {
        self.seats.clone()
    }

    fn prediction_accuracy(&self, predicted: &[Value], realized: &[Value]) -> Option<f64> {
        proximity(predicted, realized, "Amount", INITIAL_RESERVE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::Player;

    fn game() -> TragedyOfCommons {
        let players = ["Aisha", "Boris"].map(Player::named).to_vec();
        TragedyOfCommons::new(GameConfig::new(players, Scenario::First, 5).with_seed(9)).unwrap()
    }

    fn hauls(a: f64, b: f64) -> BTreeMap<String, Decision> {
        BTreeMap::from([
            ("Aisha".to_owned(), vec![json!({ "Amount": a })]),
            ("Boris".to_owned(), vec![json!({ "Amount": b })]),
        ])
    }

    #[test]
    fn regrowth() {
        assert_eq!(next_reserve(100.0, 40.0), 90.0);
        assert_eq!(next_reserve(1000.0, 0.0), 1200.0);
    }

    #[test]
    fn sustainable_round_pays_each_haul() {
        let mut game = game();
        let res = game.process_actions(&hauls(25.0, 15.0));
        assert_eq!(game.reserve(), 90.0);
        assert_eq!(game.score_increments()["Aisha"], 25.0);
        assert_eq!(game.score_increments()["Boris"], 15.0);
        assert_eq!(res.new_state["Aisha"]["Fish left in the fishing grounds"], json!(90.0));
        assert_eq!(res.new_state["Boris"]["Month"], json!(2));
        assert!(!game.is_game_over());
    }

    #[test]
    fn collapse_pays_nothing_and_ends_the_game() {
        let mut game = game();
        game.process_actions(&hauls(50.0, 45.0));
        assert!(game.reserve() < 10.0);
        assert!(game.score_increments().values().all(|v| *v == 0.0));
        assert!(game.is_game_over());
    }

    #[test]
    fn validation_messages() {
        let game = game();
        assert!(game.validate_actions("Aisha", &[json!({"Amount": 12.5})]).is_ok());
        assert!(game.validate_actions("Aisha", &[json!({"Amount": -1})]).is_err());
        assert!(game
            .validate_actions("Aisha", &[json!({"Amount": 101})])
            .unwrap_err()
            .contains("exceed"));
        assert!(game.validate_actions("Aisha", &[json!({"Amount": "lots"})]).is_err());
    }
}
