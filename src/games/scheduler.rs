//! Weekly meeting (or joint activity) coordination.
//!
//! Every player proposes one option; the meeting happens only when all proposals are identical.
//! Each player earns the rank its own preference list gives to the outcome, and the rank of
//! "no meeting" is 0 for everybody.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::seq::{IndexedRandom, SliceRandom};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{exact_match, single_record};
use crate::error::ArenaError;
use crate::game_interface::{
    ActionFormat, Decision, GameConfig, GameEngine, Resolution, Scenario, Scoreboard,
    StateSnapshot,
};

const NO_MEETING: &str = "None";

const DAYS: [&str; 7] = [
    "Sunday", "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday",
];
const ACTIVITIES: [&str; 7] = [
    "Movie", "Skating", "Cafe", "Swimming", "Dancing", "Bowling", "Karaoke",
];

/// Ballot used when the preferences are fixed by the configuration.
fn default_ballot(scenario: Scenario) -> Vec<String> {
    let pool = match scenario {
        Scenario::First => &DAYS[1..6],
        Scenario::Second => &ACTIVITIES[..5],
    };
    pool.iter().map(|s| (*s).to_owned()).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Calendar {
    #[serde(rename = "Week")]
    week: u32,
    #[serde(rename = "Last Meetings", default)]
    last_meetings: Vec<String>,
}

pub struct Scheduler {
    config: GameConfig,
    rng: StdRng,
    seats: Vec<String>,
    ballot: Vec<String>,
    preferences: BTreeMap<String, BTreeMap<String, u32>>,
    calendars: BTreeMap<String, Calendar>,
    turn: u32,
    outcome: Option<String>,
    scoreboard: Scoreboard,
}

impl Scheduler {
    pub fn new(config: GameConfig) -> Result<Self, ArenaError> {
        config.check()?;
        let rng = config.rng();
        let mut game = Scheduler {
            seats: config.player_names(),
            config,
            rng,
            ballot: Vec::new(),
            preferences: BTreeMap::new(),
            calendars: BTreeMap::new(),
            turn: 1,
            outcome: None,
            scoreboard: Scoreboard::default(),
        };
        game.initialize_game()?;
        Ok(game)
    }

    /// Shuffle the option pool, keep one option per player, and hand out rankings by rotating
    /// the ballot so that every option is somebody's favourite.
    fn rotate_preferences(&mut self) {
        let pool = match self.config.scenario {
            Scenario::First => DAYS,
            Scenario::Second => ACTIVITIES,
        };
        let mut options: Vec<String> = pool.iter().map(|s| (*s).to_owned()).collect();
        options.shuffle(&mut self.rng);
        options.truncate(self.seats.len());
        self.ballot = options;

        self.preferences.clear();
        let mut rotation = self.ballot.clone();
        for player in &self.seats {
            let mut ranks = BTreeMap::from([(NO_MEETING.to_owned(), 0)]);
            for (i, option) in rotation.iter().enumerate() {
                ranks.insert(option.clone(), i as u32 + 1);
            }
            self.preferences.insert(player.clone(), ranks);
            rotation.rotate_right(1);
        }
    }

    fn rank(&self, player: &str, outcome: Option<&str>) -> u32 {
        self.preferences
            .get(player)
            .and_then(|ranks| ranks.get(outcome.unwrap_or(NO_MEETING)))
            .copied()
            .unwrap_or_default()
    }

    fn best_rank(&self, player: &str) -> u32 {
        self.ballot
            .iter()
            .map(|option| self.rank(player, Some(option)))
            .max()
            .unwrap_or_default()
    }

    fn proposal(action: Option<&Decision>) -> Option<&str> {
        action?.first()?.get("Proposal")?.as_str()
    }
}

impl GameEngine for Scheduler {
    fn initialize_game(&mut self) -> Result<(), ArenaError> {
        self.turn = 1;
        self.outcome = None;
        self.seats = self.config.player_names();
        self.scoreboard = Scoreboard::new(&self.seats);

        match self.config.preferences.clone() {
            Some(fixed) => {
                self.ballot = default_ballot(self.config.scenario);
                self.preferences.clear();
                for player in &self.seats {
                    let mut ranks =
                        GameConfig::override_for(&fixed, "Preferences", player)?.clone();
                    ranks.insert(NO_MEETING.to_owned(), 0);
                    self.preferences.insert(player.clone(), ranks);
                }
            }
            None => self.rotate_preferences(),
        }

        self.calendars.clear();
        match &self.config.initialization {
            Some(records) => {
                for player in &self.seats {
                    let record = GameConfig::override_for(records, "Initialization", player)?;
                    let calendar = serde_json::from_value(record.clone())
                        .map_err(|e| ArenaError::Config(format!("Initialization of {player}: {e}")))?;
                    self.calendars.insert(player.clone(), calendar);
                }
            }
            None => {
                for player in &self.seats {
                    self.calendars.insert(
                        player.clone(),
                        Calendar {
                            week: self.turn,
                            last_meetings: Vec::new(),
                        },
                    );
                }
                self.seats.shuffle(&mut self.rng);
            }
        }
        Ok(())
    }

    fn title(&self) -> &'static str {
        "Scheduler"
    }

    fn describe_game(&self) -> String {
        let others = self.seats.len() - 1;
        let ballot = self.ballot.join(", ");
        match self.config.scenario {
            Scenario::First => format!(
                "You are a secretary.\n\
                 Each week, you try to coordinate with the other secretaries to set up a meeting between your respective managers.\n\
                 There are {others} other secretaries to coordinate with.\n\
                 The available days for the meeting are {ballot}.\n\
                 You must all agree on one of the days for there to be a meeting in the coming week."
            ),
            Scenario::Second => format!(
                "You are a group of friends.\n\
                 Each week, you try to coordinate a joint activity.\n\
                 There are {others} other friends to coordinate with.\n\
                 The available activities are {ballot}.\n\
                 You must all agree on one of the activities for it to take place."
            ),
        }
    }

    fn get_preferences(&self, player: &str) -> String {
        let ranks = self
            .ballot
            .iter()
            .map(|option| format!("{option}: {}", self.rank(player, Some(option))))
            .collect::<Vec<_>>()
            .join("\n");
        match self.config.scenario {
            Scenario::First => format!(
                "Your manager's preferences for the day of the meeting are as follows:\n{ranks}\n\n\
                 The lowest value indicates least preference, and the highest value indicates highest preference.\n\
                 Remember, the meeting is important, so failure to coordinate an agreed day at all has preference 0 (lowest).\n\
                 Try to coordinate the meeting so that you achieve the highest possible preference for your manager."
            ),
            Scenario::Second => format!(
                "Your preferences for the activity are as follows:\n{ranks}\n\n\
                 The lowest value indicates least preference, and the highest value indicates highest preference.\n\
                 Of course, you prefer in any case to see your friends, so failure to coordinate an activity at all has preference 0 (lowest).\n\
                 Try to coordinate the activity so that you achieve the highest possible preference for you."
            ),
        }
    }

    fn action_format(&self) -> ActionFormat {
        let description = match self.config.scenario {
            Scenario::First => {
                "Each secretary submits the day that they propose to have the meeting. \
                 If the offers are all identical, the meeting will take place on that day. \
                 Otherwise, the meeting will not take place this week."
            }
            Scenario::Second => {
                "Each friend submits the activity that they propose to do together. \
                 If the activities are all identical, then it will take place. \
                 Otherwise, there will be no joint activity this week."
            }
        };
        ActionFormat {
            description: description.to_owned(),
            template: format!(
                "JSON template:\n\n[{{\"Proposal\": str}}]\n\nwhere str must be one of: {}",
                self.ballot.join(", ")
            ),
        }
    }

    fn validate_actions(&self, _player: &str, action: &[Value]) -> Result<(), String> {
        if action.is_empty() {
            return Err(
                "No action identified. Give a single dictionary with a \"Proposal\" key and enclose it in a list."
                    .into(),
            );
        }
        if action.len() > 1 {
            return Err("You can only make one proposal. The list should contain a single dictionary with your proposal for this round.".into());
        }
        let record = single_record(action)?;
        let Some(proposal) = record.get("Proposal") else {
            return Err("There must be a \"Proposal\" key.".into());
        };
        match proposal.as_str() {
            Some(option) if self.ballot.iter().any(|o| o == option) => Ok(()),
            _ => Err(format!(
                "Make sure that your \"Proposal\" is one of: {}.",
                self.ballot.join(", ")
            )),
        }
    }

    fn process_actions(&mut self, actions: &BTreeMap<String, Decision>) -> Resolution {
        let proposals: Vec<Option<&str>> = self
            .seats
            .iter()
            .map(|player| Self::proposal(actions.get(player)))
            .collect();
        let agreed = match proposals.first() {
            Some(Some(first)) if proposals.iter().all(|p| p == &Some(*first)) => {
                Some((*first).to_owned())
            }
            _ => None,
        };

        let shared = match &agreed {
            Some(option) => format!("This week you all agreed on {option}."),
            None => {
                let listed = self
                    .seats
                    .iter()
                    .zip(&proposals)
                    .map(|(player, p)| format!("{player}: {}", p.unwrap_or(NO_MEETING)))
                    .collect::<Vec<_>>()
                    .join(", ");
                let mut text = format!("No agreement reached. Proposals were: {listed}");
                text.push_str(match self.config.scenario {
                    Scenario::First => {
                        "\nYour manager asks angrily: 'Why was there no meeting this week??!'"
                    }
                    Scenario::Second => {
                        "\nYou feel quite disappointed that you didn't see your friends this week..."
                    }
                });
                text
            }
        };

        let outcome_name = agreed.clone().unwrap_or_else(|| NO_MEETING.to_owned());
        for calendar in self.calendars.values_mut() {
            calendar.week += 1;
            calendar.last_meetings.push(outcome_name.clone());
        }
        self.outcome = agreed;
        self.update_scores();

        let mut observations = BTreeMap::new();
        for player in &self.seats {
            let mut text = shared.clone();
            if self.outcome.is_some() {
                let rank = self.rank(player, self.outcome.as_deref());
                let best = rank == self.best_rank(player);
                text.push_str(match (self.config.scenario, best) {
                    (Scenario::First, true) => {
                        "\nYour manager comments: 'You got the best day for the meeting, good job!'"
                    }
                    (Scenario::First, false) => {
                        "\nYour manager comments: 'Wasn't the best day for a meeting this week... Next time, get me a better day!'"
                    }
                    (Scenario::Second, true) => {
                        "\nThis was such fun: also seeing friends and also the best activity!"
                    }
                    (Scenario::Second, false) => {
                        "\nIt was good seeing friends, but the activity for this week was not ideal. Next time you hope for a better one!"
                    }
                });
            }
            observations.insert(player.clone(), text);
        }

        self.turn += 1;
        Resolution {
            observations,
            new_state: self.state(),
        }
    }

    fn update_scores(&mut self) {
        for player in self.seats.clone() {
            let rank = self.rank(&player, self.outcome.as_deref());
            self.scoreboard.credit(&player, f64::from(rank));
        }
    }

    fn is_game_over(&self) -> bool {
        self.turn > self.config.max_turns
    }

    fn null_action(&mut self, _player: &str) -> Decision {
        let option = self
            .ballot
            .choose(&mut self.rng)
            .cloned()
            .unwrap_or_else(|| NO_MEETING.to_owned());
        vec![json!({ "Proposal": option })]
    }

    fn scoreboard(&self) -> &Scoreboard {
        &self.scoreboard
    }

    fn state(&self) -> StateSnapshot {
        self.calendars
            .iter()
            .map(|(player, calendar)| {
                (
                    player.clone(),
                    json!({"Week": calendar.week, "Last Meetings": calendar.last_meetings}),
                )
            })
            .collect()
    }

    fn active_players(&self) -> Vec<String> {
        self.seats.clone()
    }

    fn prediction_accuracy(&self, predicted: &[Value], realized: &[Value]) -> Option<f64> {
        exact_match(predicted, realized, "Proposal")
    }
}
