//! Highest unique bid auction: a stock exchange, or a game show with ten doors.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::{json, Value};

use super::{exact_match, integer, single_record};
use crate::error::ArenaError;
use crate::game_interface::{
    ActionFormat, Decision, GameConfig, GameEngine, Resolution, Scenario, Scoreboard,
    StateSnapshot,
};

const LOWEST: i64 = 1;
const HIGHEST: i64 = 10;

/// Highest value submitted exactly once.
pub fn highest_unique(bids: &[i64]) -> Option<i64> {
    bids.iter()
        .copied()
        .filter(|bid| bids.iter().filter(|other| *other == bid).count() == 1)
        .max()
}

pub struct Hupi {
    config: GameConfig,
    rng: StdRng,
    seats: Vec<String>,
    wins: BTreeMap<String, u32>,
    round: u32,
    increments: BTreeMap<String, f64>,
    scoreboard: Scoreboard,
}

impl Hupi {
    pub fn new(config: GameConfig) -> Result<Self, ArenaError> {
        config.check()?;
        let rng = config.rng();
        let mut game = Hupi {
            seats: config.player_names(),
            config,
            rng,
            wins: BTreeMap::new(),
            round: 1,
            increments: BTreeMap::new(),
            scoreboard: Scoreboard::default(),
        };
        game.initialize_game()?;
        Ok(game)
    }

    /// Name of the decision field: `Price` at the exchange, `Door` at the game show.
    fn key(&self) -> &'static str {
        match self.config.scenario {
            Scenario::First => "Price",
            Scenario::Second => "Door",
        }
    }

    fn wins_key(&self) -> &'static str {
        match self.config.scenario {
            Scenario::First => "Stocks",
            Scenario::Second => "Prizes",
        }
    }

    fn bid(&self, action: Option<&Decision>) -> Option<i64> {
        integer(action?.first()?.get(self.key())?)
    }
}

impl GameEngine for Hupi {
    fn initialize_game(&mut self) -> Result<(), ArenaError> {
        self.round = 1;
        self.seats = self.config.player_names();
        self.seats.shuffle(&mut self.rng);
        self.scoreboard = Scoreboard::new(&self.seats);
        self.wins = self.seats.iter().map(|p| (p.clone(), 0)).collect();
        self.increments.clear();
        Ok(())
    }

    fn title(&self) -> &'static str {
        "HUPI"
    }

    fn describe_game(&self) -> String {
        let others = self.seats.len() - 1;
        match self.config.scenario {
            Scenario::First => format!(
                "You are participating in a special stock exchange.\n\
                 At each round, a single new stock is offered for a **whole integer** price of up to 10 dollars.\n\
                 However, a bid cannot be cleared in the system if there is another simultaneous bid by someone else at an equal price.\n\
                 Of the bids that are **unique**, the **highest** one will be accepted.\n\
                 Therefore, the stock will go to the bidder offering the **highest unique** price.\n\
                 For example, if there was only one bid for 10 dollars, then the stock goes to the one that bid 10 dollars.\n\
                 But if there were two bids for 10 dollars and one bid for 9 dollars, then the stock goes to the one that bid 9 dollars.\n\
                 There are {others} other bidders at the exchange with you."
            ),
            Scenario::Second => format!(
                "You are participating in a game show.\n\
                 At each round, contestants choose from one of ten doors, numbered 1 to 10, behind which there are prizes.\n\
                 If two or more contestants choose the same door, that door will not be opened.\n\
                 Of the contestants that choose a **unique** door, the **highest** numbered door will be opened.\n\
                 Therefore, the prize will go to the contestant that chose the **highest unique** number door.\n\
                 For example, if there was only one contestant that chose door 10, then the prize goes to that contestant.\n\
                 But if there were two contestants that chose door 10 and one chose door 9, then the prize goes to the one that chose door 9.\n\
                 There are {others} other contestants in the game show with you."
            ),
        }
    }

    fn get_preferences(&self, _player: &str) -> String {
        match self.config.scenario {
            Scenario::First => "You want to maximize your stocks!",
            Scenario::Second => "You want to get the prize!",
        }
        .to_owned()
    }

    fn action_format(&self) -> ActionFormat {
        let (description, meaning) = match self.config.scenario {
            Scenario::First => (
                "Each bidder simultaneously places a single whole integer bid price for the stock, between 1 and 10 dollars. The stock goes to the highest bidder out of the unique bids.",
                "int signifies the amount of dollars that you bid for the stock being offered this round. Remember, the bid must be a whole integer.",
            ),
            Scenario::Second => (
                "Each contestant simultaneously chooses a door between 1 and 10. The prize goes to the highest number door out of the unique choices.",
                "int signifies the number of the door that you choose this round. Remember, it must be a whole integer.",
            ),
        };
        ActionFormat {
            description: description.to_owned(),
            template: format!(
                "JSON template:\n\n[{{\"{}\": int}}]\n\n{meaning}\nMake sure to respond precisely in this format.",
                self.key()
            ),
        }
    }

    fn validate_actions(&self, _player: &str, action: &[Value]) -> Result<(), String> {
        let record = single_record(action)?;
        if record.len() > 1 {
            return Err("You can only make one choice. The list should have a single dictionary with a single entry.".into());
        }
        let key = self.key();
        match record.get(key).and_then(integer) {
            None => Err(format!("Make sure the '{key}' key has an integer value.")),
            Some(v) if !(LOWEST..=HIGHEST).contains(&v) => {
                Err(format!("{key} must be between 1 and 10."))
            }
            Some(_) => Ok(()),
        }
    }

    fn process_actions(&mut self, actions: &BTreeMap<String, Decision>) -> Resolution {
        let bids: Vec<Option<i64>> = self.seats.iter().map(|p| self.bid(actions.get(p))).collect();
        let valid: Vec<i64> = bids.iter().flatten().copied().collect();
        let best = highest_unique(&valid);

        let (listing, won, not_unique, outbid, lost, last) = match self.config.scenario {
            Scenario::First => (
                "Bids were:",
                "You had the highest bid that was a unique price, you got the stock!",
                "Someone else also bid your price, you were not unique.",
                "Your price was not high enough, someone outbid you.",
                "Your bid failed.",
                "Last round of bids for today's trading.",
            ),
            Scenario::Second => (
                "Choices were:",
                "You had the highest door number that was unique, you got the prize!",
                "Someone else also chose your door number, you were not unique.",
                "Your door number was not high enough, someone chose a unique number higher than yours.",
                "You missed out on a prize this time.",
                "Last round for this game show.",
            ),
        };
        let shared = format!(
            "{listing}\n{}",
            self.seats
                .iter()
                .zip(&bids)
                .map(|(p, b)| match b {
                    Some(b) => format!("{p}: {b}"),
                    None => format!("{p}: -"),
                })
                .collect::<Vec<_>>()
                .join("\n")
        );

        self.round += 1;
        let mut observations = BTreeMap::new();
        for (player, bid) in self.seats.iter().zip(&bids) {
            let mut text = shared.clone();
            let winner = best.is_some() && *bid == best;
            if winner {
                text.push('\n');
                text.push_str(won);
                *self.wins.entry(player.clone()).or_default() += 1;
            } else {
                if let Some(b) = bid {
                    if valid.iter().filter(|v| *v == b).count() > 1 {
                        text.push('\n');
                        text.push_str(not_unique);
                    }
                    if best.is_some_and(|best| *b < best) {
                        text.push('\n');
                        text.push_str(outbid);
                    }
                }
                text.push('\n');
                text.push_str(lost);
            }
            if self.round == self.config.max_turns {
                text.push('\n');
                text.push_str(last);
            }
            self.increments
                .insert(player.clone(), if winner { 1.0 } else { 0.0 });
            observations.insert(player.clone(), text);
        }
        self.update_scores();

        Resolution {
            observations,
            new_state: self.state(),
        }
    }

    fn update_scores(&mut self) {
        for (player, increment) in &self.increments {
            self.scoreboard.credit(player, *increment);
        }
    }

    fn is_game_over(&self) -> bool {
        self.round > self.config.max_turns
    }

    fn null_action(&mut self, _player: &str) -> Decision {
        let pick = self.rng.random_range(LOWEST..=HIGHEST);
        vec![json!({ self.key(): pick })]
    }

    fn scoreboard(&self) -> &Scoreboard {
        &self.scoreboard
    }

    fn state(&self) -> StateSnapshot {
        let wins_key = self.wins_key();
        self.wins
            .iter()
            .map(|(p, wins)| (p.clone(), json!({ wins_key: wins, "Round": self.round })))
            .collect()
    }

    fn active_players(&self) -> Vec<String> {
        self.seats.clone()
    }

    fn prediction_accuracy(&self, predicted: &[Value], realized: &[Value]) -> Option<f64> {
        exact_match(predicted, realized, self.key())
    }
}
