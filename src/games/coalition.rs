//! Coalition building after an election (or a joint venture between land owners).
//!
//! Each player demands an amount out of a budget of 20 and names its partners. A group forms
//! when its members all name each other, their demands fit in the budget and their seats add up
//! to a majority.

use std::collections::{BTreeMap, BTreeSet};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde_json::{json, Value};

use super::{proximity, single_record};
use crate::error::ArenaError;
use crate::game_interface::{
    ActionFormat, Decision, GameConfig, GameEngine, Resolution, Scenario, Scoreboard,
    StateSnapshot,
};

const BUDGET: f64 = 20.0;
const MAJORITY: u32 = 50;

/// One player's offer, as read from a validated decision.
#[derive(Debug, Clone, PartialEq)]
struct Offer {
    amount: f64,
    partners: BTreeSet<String>,
}

impl Offer {
    fn read(action: Option<&Decision>) -> Offer {
        let record = action.and_then(|a| a.first()).and_then(Value::as_object);
        let amount = record
            .and_then(|r| r.get("Amount"))
            .and_then(Value::as_f64)
            .unwrap_or_default();
        let partners = record
            .and_then(|r| r.get("Partners"))
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();
        Offer { amount, partners }
    }

    /// Declared partners plus `owner` itself.
    fn group(&self, owner: &str) -> BTreeSet<String> {
        let mut group = self.partners.clone();
        group.insert(owner.to_owned());
        group
    }
}

pub struct Coalition {
    config: GameConfig,
    rng: StdRng,
    seats: Vec<String>,
    shares: BTreeMap<String, u32>,
    budgets: BTreeMap<String, f64>,
    government: bool,
    turn: u32,
    scoreboard: Scoreboard,
}

impl Coalition {
    pub fn new(config: GameConfig) -> Result<Self, ArenaError> {
        config.check()?;
        let rng = config.rng();
        let mut game = Coalition {
            seats: config.player_names(),
            config,
            rng,
            shares: BTreeMap::new(),
            budgets: BTreeMap::new(),
            government: false,
            turn: 1,
            scoreboard: Scoreboard::default(),
        };
        game.initialize_game()?;
        Ok(game)
    }

    fn share(&self, player: &str) -> u32 {
        self.shares.get(player).copied().unwrap_or_default()
    }

    /// First cohesive group, in seating order, whose demands fit the budget and whose seats
    /// form a majority.
    fn find_coalition(&self, offers: &BTreeMap<String, Offer>) -> Option<Vec<String>> {
        for player in &self.seats {
            let offer = &offers[player];
            let partners: Vec<&String> = offer.partners.iter().filter(|p| *p != player).collect();
            if partners.is_empty() {
                continue;
            }
            let group = offer.group(player);
            let cohesive = partners.iter().all(|partner| {
                offers
                    .get(*partner)
                    .is_some_and(|theirs| theirs.group(partner) == group)
            });
            if !cohesive {
                continue;
            }
            let total: f64 = group.iter().map(|member| offers[member].amount).sum();
            let seats: u32 = group.iter().map(|member| self.share(member)).sum();
            if total <= BUDGET && seats > MAJORITY {
                return Some(group.into_iter().collect());
            }
        }
        None
    }
}

impl GameEngine for Coalition {
    fn initialize_game(&mut self) -> Result<(), ArenaError> {
        self.turn = 1;
        self.government = false;
        self.seats = self.config.player_names();
        self.seats.shuffle(&mut self.rng);
        self.scoreboard = Scoreboard::new(&self.seats);
        self.budgets = self.seats.iter().map(|p| (p.clone(), 0.0)).collect();
        let share = 100 / self.seats.len() as u32;
        self.shares = self.seats.iter().map(|p| (p.clone(), share)).collect();
        Ok(())
    }

    fn title(&self) -> &'static str {
        "Coalition"
    }

    fn describe_game(&self) -> String {
        let distribution = self
            .seats
            .iter()
            .map(|p| format!("{p}: {}", self.share(p)))
            .collect::<Vec<_>>()
            .join("\n");
        let max_turns = self.config.max_turns;
        match self.config.scenario {
            Scenario::First => format!(
                "You are the head of a political party right after the national elections.\n\
                 There are {} parties altogether.\n\
                 The results of the elections were as follows:\n{distribution}\n\
                 There must be at least 51 seats of the parliament represented to form a government.\n\
                 Since no party has passed the threshold to form a government by itself, there will need to be a coalition.\n\
                 Under the constitution, the government controls no more than 20 ministries. Each member of the coalition will administer a share of those ministries.\n\
                 Parties outside the coalition are not part of the government and will not control any ministries.\n\
                 For a coalition agreement to enter into force, the participating members must agree on the division of the ministries between them.\n\
                 If there is no agreement, a government will not be formed, and all parties will have zero ministries in that election cycle.\n\
                 There is a maximum of {max_turns} rounds of negotiation to build a coalition in an election cycle.",
                self.seats.len()
            ),
            Scenario::Second => format!(
                "You are a real estate tycoon, negotiating a potential joint development project in a lucrative property.\n\
                 There are {} other land owners in the property, who are potential partners for this venture.\n\
                 The land ownership of the property is distributed in the following percentages:\n{distribution}\n\
                 In order for the development project to go forward, the partners in the project must represent at least 51 percent of the land ownership between them.\n\
                 The development project has a projected value of 20 million dollars.\n\
                 In the joint venture agreement for the project, the participating members must agree how much each gets, out of the 20 million dollar value.\n\
                 Those who are not part of the agreement will not receive any of the value of the project.\n\
                 If there is no agreement, then there is no project and all land owners will have zero added value.\n\
                 There is a maximum of {max_turns} rounds of negotiation.",
                self.seats.len() - 1
            ),
        }
    }

    fn get_preferences(&self, _player: &str) -> String {
        match self.config.scenario {
            Scenario::First => {
                "You want to enter a coalition and obtain a maximal share of the 20 government ministries!"
            }
            Scenario::Second => {
                "You want to enter in the joint development project while maximizing your profits!"
            }
        }
        .to_owned()
    }

    fn action_format(&self) -> ActionFormat {
        let mut template = String::from("JSON template:\n\n[{\"Amount\": int, \"Partners\": list}]\n\n");
        let description = match self.config.scenario {
            Scenario::First => {
                template.push_str("The value for the \"Amount\" key must be between 0 and 20, signifying the number of ministries you demand for your party. ");
                "Each party submits a formal offer of their share of ministries and coalition partners. \
                 If a group of parties all include each other in their offer, and there are no more than 20 ministries demanded altogether, then the coalition will enter force. \
                 If not, a coalition will fail to form this election cycle."
            }
            Scenario::Second => {
                template.push_str("The value for the \"Amount\" key must be between 0 and 20, signifying how many millions of dollars you demand for yourself. ");
                "Each land owner submits a formal offer of how many million dollars they earn from the project, and their preferred partners. \
                 If a group of land owners all include each other in their offer, and there is no more than 20 million dollars demanded altogether, then the joint venture will be approved. \
                 If not, this property will not be developed."
            }
        };
        template.push_str("The value for the \"Partners\" key must be a list of strings, signifying your proposed partners. Make sure to respond precisely.");
        ActionFormat {
            description: description.to_owned(),
            template,
        }
    }

    fn validate_actions(&self, player: &str, action: &[Value]) -> Result<(), String> {
        if action.is_empty() {
            return Err("List is empty. Choose an amount for yourself and prospective partners in the required format.".into());
        }
        if action.len() > 1 {
            return Err("You can only make one proposal in each round of negotiations. The list should have a single dictionary with your proposal for this round.".into());
        }
        let proposal = single_record(action)?;
        let (Some(amount), Some(partners)) = (proposal.get("Amount"), proposal.get("Partners")) else {
            return Err("Make sure to include both \"Amount\" and \"Partners\" in the JSON formatted action.".into());
        };
        let (Some(amount), Some(partners)) = (amount.as_f64(), partners.as_array()) else {
            return Err("Make sure the \"Amount\" is a numeric value between 0 and 20, and that \"Partners\" is a list of names.".into());
        };
        if partners.is_empty() {
            return Err("No partners chosen. List your partners in the \"Partners\" key.".into());
        }
        if partners.len() == 1 && partners[0].as_str() == Some(player) {
            return Err("You can't just choose yourself for the coalition!".into());
        }
        let others: Vec<&String> = self.seats.iter().filter(|p| *p != player).collect();
        let known = |name: &Value| name.as_str().is_some_and(|n| others.iter().any(|o| *o == n));
        if !partners.iter().all(known) {
            return Err(format!(
                "Make sure all of your proposed partners are among: {}",
                others.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
            ));
        }
        if !(0.0..=BUDGET).contains(&amount) {
            return Err("Proposed amount must be between 0 and 20.".into());
        }
        Ok(())
    }

    fn process_actions(&mut self, actions: &BTreeMap<String, Decision>) -> Resolution {
        let offers: BTreeMap<String, Offer> = self
            .seats
            .iter()
            .map(|p| (p.clone(), Offer::read(actions.get(p))))
            .collect();

        let text = match self.find_coalition(&offers) {
            Some(members) => {
                self.government = true;
                let allocations = members
                    .iter()
                    .map(|m| format!("{m}: {}", offers[m].amount))
                    .collect::<Vec<_>>()
                    .join(", ");
                for member in &members {
                    self.budgets.insert(member.clone(), offers[member].amount);
                }
                format!(
                    "An agreement has been reached! Partners are: {}. Agreed allocations: {allocations}.",
                    members.join(", ")
                )
            }
            None => {
                let raised = self
                    .seats
                    .iter()
                    .map(|p| {
                        let offer = &offers[p];
                        let partners: Vec<&str> = offer.partners.iter().map(String::as_str).collect();
                        format!("{p}: Amount {}, Partners [{}]", offer.amount, partners.join(", "))
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                let mut text = format!(
                    "This round of negotiations failed to produce an agreement. Proposals raised were:\n{raised}\n"
                );
                let max = self.config.max_turns;
                if self.turn + 1 < max {
                    text.push_str(&format!("Moving to negotiation round {}.", self.turn + 1));
                } else if self.turn + 1 == max {
                    text.push_str("Next is the last negotiation round!");
                } else {
                    text.push_str(match self.config.scenario {
                        Scenario::First => "Moving onto next election cycle.",
                        Scenario::Second => "Moving onto a different property to try another joint venture.",
                    });
                }
                text
            }
        };
        self.update_scores();

        self.turn += 1;
        Resolution {
            observations: self.seats.iter().map(|p| (p.clone(), text.clone())).collect(),
            new_state: self.state(),
        }
    }

    fn update_scores(&mut self) {
        for (player, budget) in &self.budgets {
            self.scoreboard.credit(player, *budget);
        }
    }

    fn is_game_over(&self) -> bool {
        self.government || self.turn > self.config.max_turns
    }

    fn null_action(&mut self, _player: &str) -> Decision {
        vec![json!({"Amount": 0, "Partners": []})]
    }

    fn scoreboard(&self) -> &Scoreboard {
        &self.scoreboard
    }

    fn state(&self) -> StateSnapshot {
        self.seats
            .iter()
            .map(|p| {
                (
                    p.clone(),
                    json!({
                        "Negotiation Round": self.turn,
                        "Maximum Negotiation Rounds": self.config.max_turns,
                    }),
                )
            })
            .collect()
    }

    fn active_players(&self) -> Vec<String> {
        self.seats.clone()
    }

    fn prediction_accuracy(&self, predicted: &[Value], realized: &[Value]) -> Option<f64> {
        proximity(predicted, realized, "Amount", BUDGET)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::Player;

    fn game(names: &[&str]) -> Coalition {
        let players = names.iter().map(|n| Player::named(*n)).collect();
        Coalition::new(GameConfig::new(players, Scenario::First, 5).with_seed(2)).unwrap()
    }

    fn offer(amount: u32, partners: &[&str]) -> Decision {
        vec![json!({"Amount": amount, "Partners": partners})]
    }

    #[test]
    fn mutual_pair_forms_a_government() {
        let mut game = game(&["Aisha", "Boris", "Chen"]);
        let actions = BTreeMap::from([
            ("Aisha".to_owned(), offer(10, &["Boris"])),
            ("Boris".to_owned(), offer(8, &["Aisha"])),
            ("Chen".to_owned(), offer(5, &["Aisha"])),
        ]);
        let res = game.process_actions(&actions);
        assert!(game.is_game_over());
        assert_eq!(game.score_increments()["Aisha"], 10.0);
        assert_eq!(game.score_increments()["Boris"], 8.0);
        assert_eq!(game.score_increments()["Chen"], 0.0);
        assert!(res.observations["Chen"].contains("agreement has been reached"));
    }

    #[test]
    fn greedy_demands_break_the_deal() {
        let mut game = game(&["Aisha", "Boris", "Chen"]);
        let actions = BTreeMap::from([
            ("Aisha".to_owned(), offer(15, &["Boris"])),
            ("Boris".to_owned(), offer(8, &["Aisha"])),
            ("Chen".to_owned(), offer(0, &["Boris"])),
        ]);
        game.process_actions(&actions);
        assert!(!game.is_game_over());
        assert!(game.score_increments().values().all(|v| *v == 0.0));
    }

    #[test]
    fn a_minority_cannot_govern() {
        // 4 parties of 25 seats: a pair holds 50, short of a majority
        let mut game = game(&["Aisha", "Boris", "Chen", "Donald"]);
        let actions = BTreeMap::from([
            ("Aisha".to_owned(), offer(10, &["Boris"])),
            ("Boris".to_owned(), offer(10, &["Aisha"])),
            ("Chen".to_owned(), offer(0, &["Donald"])),
            ("Donald".to_owned(), offer(0, &["Chen"])),
        ]);
        game.process_actions(&actions);
        assert!(!game.is_game_over());
    }

    #[test]
    fn validation_messages() {
        let game = game(&["Aisha", "Boris", "Chen"]);
        assert!(game.validate_actions("Aisha", &offer(5, &["Boris"])).is_ok());
        assert!(game
            .validate_actions("Aisha", &offer(5, &["Aisha"]))
            .unwrap_err()
            .contains("yourself"));
        assert!(game
            .validate_actions("Aisha", &offer(21, &["Boris"]))
            .unwrap_err()
            .contains("between 0 and 20"));
        assert!(game
            .validate_actions("Aisha", &offer(5, &["Zoe"]))
            .unwrap_err()
            .contains("among"));
        assert!(game.validate_actions("Aisha", &[json!({"Amount": 5})]).is_err());
    }

    #[test]
    fn amount_proximity() {
        let game = game(&["Aisha", "Boris"]);
        let acc = game.prediction_accuracy(&offer(10, &[]), &offer(5, &["Aisha"]));
        assert_eq!(acc, Some(0.75));
    }
}
