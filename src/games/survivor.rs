//! Last band standing: cowboys in the wild west, or pirate ships on the Caribbean.
//!
//! Every round each player spends ammunition shooting at others. A player whose lives reach 0
//! is eliminated; its score is frozen at the number of players knocked out before it. Survivors
//! receive fresh ammunition at the end of every round.

use std::collections::{BTreeMap, BTreeSet};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::integer;
use crate::error::ArenaError;
use crate::game_interface::{
    ActionFormat, Decision, GameConfig, GameEngine, Resolution, Scenario, Scoreboard,
    StateSnapshot,
};

const LIVES: u32 = 9;
const AMMO: u32 = 3;
const AMMO_PER_ROUND: u32 = 3;
const HIT_PROBABILITY: f64 = 1.0;

#[derive(Debug, Clone, Deserialize)]
struct Crew {
    #[serde(rename = "Lives")]
    lives: u32,
    #[serde(rename = "Ammo")]
    ammo: u32,
}

pub struct Survivor {
    config: GameConfig,
    rng: StdRng,
    hit_probability: f64,
    seats: Vec<String>,
    crews: BTreeMap<String, Crew>,
    /// In elimination order.
    eliminated: Vec<String>,
    /// Players that were active when the last round was resolved.
    last_roster: Vec<String>,
    turn: u32,
    scoreboard: Scoreboard,
}

/// `(target, shots)` pairs of a decision. Records that do not have that shape are skipped.
fn volleys(action: &[Value]) -> Vec<(String, u32)> {
    action
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|record| {
            let target = record.get("Target")?.as_str()?.to_owned();
            let shots = integer(record.get("Shots")?)?;
            Some((target, u32::try_from(shots).ok()?))
        })
        .collect()
}

/// Players actually shot at (at least one shot).
fn targets(action: &[Value]) -> Option<BTreeSet<String>> {
    let mut set = BTreeSet::new();
    for record in action {
        let record = record.as_object()?;
        let target = record.get("Target")?.as_str()?;
        let shots = record.get("Shots").and_then(Value::as_f64).unwrap_or(1.0);
        if shots > 0.0 {
            set.insert(target.to_owned());
        }
    }
    Some(set)
}

impl Survivor {
    pub fn new(config: GameConfig) -> Result<Self, ArenaError> {
        config.check()?;
        let rng = config.rng();
        let mut game = Survivor {
            hit_probability: config.hit_probability.unwrap_or(HIT_PROBABILITY),
            seats: config.player_names(),
            config,
            rng,
            crews: BTreeMap::new(),
            eliminated: Vec::new(),
            last_roster: Vec::new(),
            turn: 1,
            scoreboard: Scoreboard::default(),
        };
        game.initialize_game()?;
        Ok(game)
    }

    fn is_out(&self, player: &str) -> bool {
        self.eliminated.iter().any(|p| p == player)
    }

    fn check_record(&self, player: &str, record: &Map<String, Value>, err: &mut String) {
        let target = record.get("Target").and_then(Value::as_str);
        let shots = record.get("Shots").and_then(integer);
        let Some(target) = target else {
            err.push_str("Each entry needs a \"Target\" key with the name of a player. ");
            return;
        };
        if !self.seats.iter().any(|p| p == target) && shots.unwrap_or(0) > 0 {
            err.push_str("The target is not a player in the game. Make sure you use precise spelling. ");
        }
        if self.is_out(target) {
            err.push_str(&format!(
                "The target {target} has already been eliminated. Choose a different target player. "
            ));
        }
        if !shots.is_some_and(|s| s >= 0) {
            err.push_str("The number of shots must be zero or positive integer only. ");
        }
        if target == player {
            err.push_str("You cannot shoot yourself! Choose a different target player. ");
        }
    }
}

impl GameEngine for Survivor {
    fn initialize_game(&mut self) -> Result<(), ArenaError> {
        self.turn = 1;
        self.eliminated.clear();
        self.seats = self.config.player_names();
        self.scoreboard = Scoreboard::new(&self.seats);
        self.crews.clear();
        match &self.config.initialization {
            Some(records) => {
                for player in &self.seats {
                    let record = GameConfig::override_for(records, "Initialization", player)?;
                    let crew = serde_json::from_value(record.clone()).map_err(|e| {
                        ArenaError::Config(format!("Initialization of {player}: {e}"))
                    })?;
                    self.crews.insert(player.clone(), crew);
                }
            }
            None => {
                for player in &self.seats {
                    self.crews.insert(
                        player.clone(),
                        Crew {
                            lives: LIVES,
                            ammo: AMMO,
                        },
                    );
                }
                self.seats.shuffle(&mut self.rng);
            }
        }
        self.last_roster = self.seats.clone();
        Ok(())
    }

    fn title(&self) -> &'static str {
        "Survivor"
    }

    fn describe_game(&self) -> String {
        let others = self.seats.len() - 1;
        match self.config.scenario {
            Scenario::First => format!(
                "You lead a band of cowboys in the wild west. There are {others} other cowboy bands.\n\
                 Each cowboy band needs a certain number of live cowboys to survive.\n\
                 At the beginning of each turn, each band of cowboys is distributed a certain amount of ammunition.\n\
                 You can only see the amount of live cowboys and ammunition in your band.\n\
                 At the end of the turn, each cowboy leader simultaneously decides which other band to attack and with how many shots.\n\
                 You will see who attacked who, but not the amount of shots used.\n\
                 When a band loses all its cowboys lives, it is eliminated and can no longer fight."
            ),
            Scenario::Second => format!(
                "You lead a ship of pirates on the Caribbean. There are {others} other pirate ships.\n\
                 Each pirate ship needs a certain number of pirates aboard to survive.\n\
                 At the beginning of each turn, each pirate ship gets a certain amount of cannon.\n\
                 You can only see the amount of live pirates and cannon on your own ship.\n\
                 At the end of the turn, each pirate ship simultaneously decides which other ship to attack and with how many shots.\n\
                 You will see who attacked who, but not the amount of shots used.\n\
                 When a ship loses all its pirates lives, it is eliminated and can no longer fight."
            ),
        }
    }

    fn get_preferences(&self, _player: &str) -> String {
        "Your aim is to survive as long as possible, and for everyone else to be eliminated! \
         Your final score reflects how many were knocked out before you."
            .to_owned()
    }

    fn action_format(&self) -> ActionFormat {
        ActionFormat {
            description: "Each player chooses which other players to target and the number of shots to take at each one. \
                          Each shot has some probability of making a hit, but may also miss."
                .to_owned(),
            template: "JSON template:\n\n[{\"Target\": str, \"Shots\": int}]\n\n\
                       \"Target\" refers to the other player you wish to attack, by name.\n\
                       \"Shots\" refers to the number of shots to make at that player, as integer.\n\
                       You can attack more than one player, but make sure that total shots does not exceed your ammunition."
                .to_owned(),
        }
    }

    fn validate_actions(&self, player: &str, action: &[Value]) -> Result<(), String> {
        let mut err = String::new();
        for record in action {
            match record.as_object() {
                Some(record) => self.check_record(player, record, &mut err),
                None => err.push_str("Each entry must be a dictionary with \"Target\" and \"Shots\". "),
            }
        }
        let total: i64 = action
            .iter()
            .filter_map(|r| r.get("Shots").and_then(integer))
            .filter(|s| *s > 0)
            .sum();
        let ammo = self.crews.get(player).map_or(0, |c| c.ammo);
        if total > i64::from(ammo) {
            err.push_str(&format!(
                "You cannot shoot more than your ammunition! You have {ammo} ammunition only. Choose a lower amount of shots. "
            ));
        }
        if err.is_empty() {
            Ok(())
        } else {
            Err(err.trim_end().to_owned())
        }
    }

    fn process_actions(&mut self, actions: &BTreeMap<String, Decision>) -> Resolution {
        let roster = self.active_players();
        let lives_before: BTreeMap<String, u32> = roster
            .iter()
            .map(|p| (p.clone(), self.crews.get(p).map_or(0, |c| c.lives)))
            .collect();
        let mut shared = String::new();
        let mut fallen: Vec<String> = Vec::new();

        for shooter in &roster {
            let fired = actions.get(shooter).map(|a| volleys(a)).unwrap_or_default();
            if fired.iter().all(|(_, shots)| *shots == 0) {
                shared.push_str(&format!("{shooter} did nothing.\n"));
                continue;
            }
            for (target, shots) in fired {
                let mut hit = false;
                for _ in 0..shots {
                    if let Some(crew) = self.crews.get_mut(shooter) {
                        crew.ammo = crew.ammo.saturating_sub(1);
                    }
                    let lands = self.rng.random::<f64>() < self.hit_probability;
                    if !lands || self.is_out(&target) {
                        continue;
                    }
                    if let Some(crew) = self.crews.get_mut(&target) {
                        crew.lives = crew.lives.saturating_sub(1);
                        hit = true;
                        if crew.lives == 0 && !fallen.contains(&target) {
                            fallen.push(target.clone());
                        }
                    }
                }
                if hit {
                    shared.push_str(&format!("{shooter} hit {target}!\n"));
                } else if shots > 0 {
                    shared.push_str(&format!("{shooter} attacked {target} but missed!\n"));
                }
            }
        }

        let mut observations = BTreeMap::new();
        // seating order, so that the elimination order is reproducible
        for player in roster.iter().filter(|p| fallen.contains(p)) {
            shared.push_str(&format!("{player} has been eliminated from the game.\n"));
            observations.insert(
                player.clone(),
                format!(
                    "{shared}You are out of lives. Your score was {}.",
                    self.scoreboard.score(player)
                ),
            );
            self.eliminated.push(player.clone());
        }
        if !fallen.is_empty() {
            let remaining = self.active_players().join(", ");
            shared.push_str(&format!("The remaining players are: {remaining}.\n"));
        }

        for player in self.active_players() {
            let lost = lives_before[&player] - self.crews[&player].lives;
            if let Some(crew) = self.crews.get_mut(&player) {
                crew.ammo += AMMO_PER_ROUND;
            }
            observations.insert(
                player,
                format!(
                    "{shared}You lost {lost} lives.\nEnd of turn.\nNext turn: you got {AMMO_PER_ROUND} new ammunition."
                ),
            );
        }

        self.last_roster = roster;
        self.update_scores();
        self.turn += 1;
        Resolution {
            observations,
            new_state: self.state(),
        }
    }

    fn update_scores(&mut self) {
        let knocked_out = self.eliminated.len() as f64;
        for player in &self.last_roster {
            let increment = if self.eliminated.contains(player) {
                0.0
            } else {
                knocked_out - self.scoreboard.score(player)
            };
            self.scoreboard.credit(player, increment);
        }
    }

    fn is_game_over(&self) -> bool {
        self.active_players().len() <= 1 || self.turn > self.config.max_turns
    }

    fn null_action(&mut self, player: &str) -> Decision {
        self.active_players()
            .into_iter()
            .filter(|p| p != player)
            .map(|p| json!({"Target": p, "Shots": 0}))
            .collect()
    }

    fn scoreboard(&self) -> &Scoreboard {
        &self.scoreboard
    }

    fn state(&self) -> StateSnapshot {
        self.last_roster
            .iter()
            .filter_map(|p| {
                let crew = self.crews.get(p)?;
                Some((
                    p.clone(),
                    json!({
                        "Lives": crew.lives,
                        "Ammo": crew.ammo,
                        "Num_turn": self.turn,
                        "Eliminated": self.eliminated.len(),
                    }),
                ))
            })
            .collect()
    }

    fn active_players(&self) -> Vec<String> {
        self.seats
            .iter()
            .filter(|p| !self.is_out(p))
            .cloned()
            .collect()
    }

    /// Overlap of predicted and realised target sets: `(n - misses - 1) / (n - 1)` with `n` the
    /// number of active players and `misses` the size of the symmetric difference.
    fn prediction_accuracy(&self, predicted: &[Value], realized: &[Value]) -> Option<f64> {
        let guess = targets(predicted)?;
        let actual = targets(realized)?;
        let misses = guess.symmetric_difference(&actual).count() as f64;
        let n = self.active_players().len() as f64;
        if n <= 1.0 {
            return Some(if misses == 0.0 { 1.0 } else { 0.0 });
        }
        Some(((n - misses - 1.0) / (n - 1.0)).clamp(0.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::Player;

    fn game(names: &[&str], lives: u32, ammo: u32) -> Survivor {
        let players = names.iter().map(|n| Player::named(*n)).collect();
        let init = names
            .iter()
            .map(|n| (n.to_string(), json!({"Lives": lives, "Ammo": ammo})))
            .collect();
        let config = GameConfig::new(players, Scenario::First, 8)
            .with_initialization(init)
            .with_seed(4);
        Survivor::new(config).unwrap()
    }

    fn shoot(target: &str, shots: u32) -> Decision {
        vec![json!({"Target": target, "Shots": shots})]
    }

    #[test]
    fn elimination_takes_effect_next_round() {
        let mut game = game(&["Aisha", "Boris", "Chen"], 2, 3);
        let mut actions = BTreeMap::new();
        actions.insert("Aisha".to_owned(), shoot("Chen", 2));
        actions.insert("Boris".to_owned(), shoot("Aisha", 0));
        actions.insert("Chen".to_owned(), shoot("Boris", 1));
        let res = game.process_actions(&actions);

        // the fallen player is still part of this round's snapshot
        assert_eq!(res.new_state.len(), 3);
        assert_eq!(res.new_state["Chen"]["Lives"], json!(0));
        assert_eq!(res.new_state["Aisha"]["Ammo"], json!(1 + AMMO_PER_ROUND));
        assert!(res.observations["Chen"].contains("out of lives"));
        assert_eq!(game.active_players(), vec!["Aisha", "Boris"]);
        assert_eq!(game.scores()["Aisha"], 1.0);
        assert_eq!(game.scores()["Chen"], 0.0);

        let mut actions = BTreeMap::new();
        actions.insert("Aisha".to_owned(), shoot("Boris", 1));
        actions.insert("Boris".to_owned(), shoot("Aisha", 1));
        let res = game.process_actions(&actions);
        assert_eq!(res.new_state.len(), 2);
        assert!(!res.new_state.contains_key("Chen"));
    }

    #[test]
    fn missed_shots_still_spend_ammunition() {
        let players = ["Aisha", "Boris", "Chen"].iter().map(|n| Player::named(*n)).collect();
        let config = GameConfig::new(players, Scenario::First, 8)
            .with_hit_probability(0.0)
            .with_seed(4);
        let mut game = Survivor::new(config).unwrap();
        let actions = BTreeMap::from([
            ("Aisha".to_owned(), shoot("Boris", 2)),
            ("Boris".to_owned(), shoot("Chen", 0)),
            ("Chen".to_owned(), shoot("Aisha", 3)),
        ]);
        let res = game.process_actions(&actions);

        assert_eq!(res.new_state["Aisha"]["Ammo"], json!(AMMO - 2 + AMMO_PER_ROUND));
        assert_eq!(res.new_state["Chen"]["Ammo"], json!(AMMO - 3 + AMMO_PER_ROUND));
        assert_eq!(res.new_state["Boris"]["Ammo"], json!(AMMO + AMMO_PER_ROUND));
        for player in ["Aisha", "Boris", "Chen"] {
            assert_eq!(res.new_state[player]["Lives"], json!(LIVES));
        }
        assert!(res.observations["Boris"].contains("Aisha attacked Boris but missed!"));
        assert!(res.observations["Aisha"].contains("Chen attacked Aisha but missed!"));
        assert!(res.observations["Aisha"].contains("You lost 0 lives."));
        assert_eq!(game.active_players().len(), 3);
    }

    #[test]
    fn hit_probability_must_be_a_probability() {
        let players = vec![Player::named("Aisha"), Player::named("Boris")];
        let config = GameConfig::new(players, Scenario::First, 8).with_hit_probability(1.5);
        assert!(matches!(Survivor::new(config), Err(ArenaError::Config(_))));
    }

    #[test]
    fn last_survivor_ends_the_game() {
        let mut game = game(&["Aisha", "Boris"], 1, 3);
        let actions = BTreeMap::from([
            ("Aisha".to_owned(), shoot("Boris", 1)),
            ("Boris".to_owned(), shoot("Aisha", 0)),
        ]);
        game.process_actions(&actions);
        assert!(game.is_game_over());
        assert_eq!(game.scores()["Aisha"], 1.0);
        assert_eq!(game.scores()["Boris"], 0.0);
    }

    #[test]
    fn validation_messages() {
        let game = game(&["Aisha", "Boris", "Chen"], 9, 3);
        assert!(game.validate_actions("Aisha", &shoot("Boris", 3)).is_ok());
        assert!(game
            .validate_actions("Aisha", &shoot("Aisha", 1))
            .unwrap_err()
            .contains("yourself"));
        assert!(game
            .validate_actions("Aisha", &[json!({"Target": "Boris", "Shots": 2}), json!({"Target": "Chen", "Shots": 2})])
            .unwrap_err()
            .contains("ammunition"));
        assert!(game.validate_actions("Aisha", &shoot("Zoe", 1)).is_err());
        assert!(game
            .validate_actions("Aisha", &[json!({"Target": "Boris", "Shots": -1})])
            .is_err());
        assert!(game
            .validate_actions("Aisha", &[json!({"Target": "Boris", "Shots": 1.5})])
            .is_err());
    }

    #[test]
    fn cannot_target_the_eliminated() {
        let mut game = game(&["Aisha", "Boris", "Chen"], 1, 3);
        let actions = BTreeMap::from([
            ("Aisha".to_owned(), shoot("Chen", 1)),
            ("Boris".to_owned(), shoot("Aisha", 0)),
            ("Chen".to_owned(), shoot("Aisha", 0)),
        ]);
        game.process_actions(&actions);
        assert!(game
            .validate_actions("Boris", &shoot("Chen", 1))
            .unwrap_err()
            .contains("eliminated"));
        let null = game.null_action("Boris");
        assert_eq!(null, vec![json!({"Target": "Aisha", "Shots": 0})]);
    }

    #[test]
    fn target_set_accuracy() {
        let game = game(&["Aisha", "Boris", "Chen", "Donald"], 9, 3);
        let realized = [json!({"Target": "Boris", "Shots": 2}), json!({"Target": "Chen", "Shots": 0})];
        assert_eq!(
            game.prediction_accuracy(&shoot("Boris", 1), &realized),
            Some(1.0)
        );
        // Boris missed and Chen extra, n = 4: (4 - 2 - 1) / 3
        let acc = game.prediction_accuracy(&shoot("Chen", 1), &realized).unwrap();
        assert!((acc - 1.0 / 3.0).abs() < 1e-9, "{acc}");
        assert_eq!(game.prediction_accuracy(&[json!("Boris")], &realized), None);
    }

    #[test]
    fn scores_are_the_sum_of_increments() {
        let mut game = game(&["Aisha", "Boris", "Chen"], 1, 3);
        let mut sums: BTreeMap<String, f64> = BTreeMap::new();
        let rounds = [
            BTreeMap::from([
                ("Aisha".to_owned(), shoot("Chen", 1)),
                ("Boris".to_owned(), shoot("Aisha", 0)),
                ("Chen".to_owned(), shoot("Aisha", 0)),
            ]),
            BTreeMap::from([
                ("Aisha".to_owned(), shoot("Boris", 0)),
                ("Boris".to_owned(), shoot("Aisha", 1)),
            ]),
        ];
        for actions in rounds {
            let roster = game.active_players();
            game.process_actions(&actions);
            for p in roster {
                *sums.entry(p.clone()).or_default() += game.score_increments()[&p];
            }
        }
        assert_eq!(&sums, game.scores());
    }
}
