//! Round orchestrator: drives the agents of one game instance until the game is over.
//!
//! Every round runs the same phases, strictly in order:
//!
//! 1. **chat**: every unordered pair of active players exchanges messages;
//! 2. **predict**: every active player predicts the next decision of every other one;
//! 3. **act**: every active player submits a decision, with retries on unreadable or illegal
//!    decisions and the null action of the game once attempts are exhausted;
//! 4. **resolve**: predictions are scored against the realised decisions, then the game
//!    processes the decisions;
//! 5. **observe**: unless the game is over, every active player learns its observation, state
//!    and score.
//!
//! Players are onboarded once, before the first round. Nothing an agent answers (or fails to
//! answer) aborts the instance: failures degrade to an empty utterance, an `"invalid"`
//! prediction or the null action and are reported with `warn!`.

use std::collections::BTreeMap;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use crate::configuration::Configuration;
use crate::error::ArenaError;
use crate::extract::{as_records, parse_lenient, tagged};
use crate::game_interface::{Decision, GameEngine, Resolution};
use crate::game_log::{Accuracy, ActionRecord, GameLog, PredictionEntry, RoundLog};
use crate::games::Game;
use crate::messenger::Messenger;
use crate::names::resolve_name;
use crate::protocol::{ChatMessage, ChatThread, TaskMessage};
use crate::run_composer::MatchSettings;

/// Play one game instance to the end and return its log.
///
/// A game that cannot be built yields an open log (`Completed: false`) without rounds.
#[instrument(skip_all, fields(game_id = settings.game_id, game = %settings.game, scenario = %settings.scenario))]
pub fn run_match<M: Messenger + ?Sized>(
    settings: &MatchSettings,
    config: Configuration,
    messenger: &M,
) -> GameLog {
    let start = Instant::now();
    let participants: BTreeMap<String, String> = settings
        .players
        .iter()
        .map(|p| (p.model.clone(), p.name.clone()))
        .collect();

    let game = match Game::new(settings.game, settings.game_config()) {
        Ok(game) => game,
        Err(e) => {
            error!(error = %e, "could not build the game");
            return GameLog::open(
                settings.game_id,
                settings.game,
                settings.scenario,
                participants,
                BTreeMap::new(),
            );
        }
    };
    let preferences = settings
        .players
        .iter()
        .map(|p| (p.name.clone(), game.get_preferences(&p.name)))
        .collect();
    let mut log = GameLog::open(
        settings.game_id,
        settings.game,
        settings.scenario,
        participants,
        preferences,
    );

    let mut instance = Instance::new(settings, config, messenger, game);
    instance.onboard();
    let mut round = 1;
    while !instance.game.is_game_over() {
        log.rounds.push(instance.play_round(round));
        round += 1;
    }

    log.close(instance.game.scores(), start.elapsed());
    info!(rounds = log.rounds.len(), scores = ?log.scores, "game over");
    log
}

/// Text of the decision in an `act` reply: the `<decision>` region after the reasoning, or
/// whatever follows the reasoning when the tags are missing.
fn decision_text(reply: &str) -> String {
    let after_reasoning = reply.rsplit("</reasoning>").next().unwrap_or(reply);
    tagged(after_reasoning, "decision").unwrap_or_else(|| after_reasoning.trim().to_owned())
}

/// Part of an error worth echoing back to the agent.
fn agent_message(e: &ArenaError) -> String {
    match e {
        ArenaError::Format(msg) | ArenaError::Validation(msg) => msg.clone(),
        other => other.to_string(),
    }
}

const RETRY: &str =
    "Try again, just with your final decision between the <decision> </decision> tags (no reasoning).";

struct Instance<'a, M: ?Sized> {
    settings: &'a MatchSettings,
    config: Configuration,
    messenger: &'a M,
    game: Game,
    /// Every name seated in the instance, eliminated players included.
    roster: Vec<String>,
    rng: StdRng,
}

impl<'a, M: Messenger + ?Sized> Instance<'a, M> {
    fn new(settings: &'a MatchSettings, config: Configuration, messenger: &'a M, game: Game) -> Self {
        Instance {
            settings,
            config,
            messenger,
            game,
            roster: settings.players.iter().map(|p| p.name.clone()).collect(),
            // the game draws from its own generator seeded with `settings.seed`
            rng: StdRng::seed_from_u64(settings.seed.wrapping_add(1)),
        }
    }

    fn call(&self, player: &str, task: &TaskMessage, new_conversation: bool) -> Result<String, ArenaError> {
        let address = self
            .settings
            .players
            .iter()
            .find(|p| p.name == player)
            .map(|p| p.address.as_str())
            .unwrap_or_default();
        // one conversation per instance and seat, even when an agent holds several seats
        let conversation = format!("{}/{player}", self.settings.game_id);
        self.messenger
            .talk_to_agent(
                &task.encode(),
                address,
                &conversation,
                new_conversation,
                self.config.call_timeout(),
            )
            .map_err(|source| ArenaError::Protocol {
                address: address.to_owned(),
                source,
            })
    }

    #[instrument(skip_all)]
    fn onboard(&self) {
        let active = self.game.active_players();
        let description = self.game.describe_game();
        for player in &active {
            let others: Vec<String> = active.iter().filter(|p| *p != player).cloned().collect();
            let preferences = self.game.get_preferences(player);
            let prompt = format!(
                "Background: {description}\nYour Name: {player}\nOther Players: {}\nYour Preferences: {preferences}",
                others.join(", ")
            );
            let task = TaskMessage::background(prompt, player, &others, &preferences);
            if let Err(e) = self.call(player, &task, true) {
                warn!(player = %player, error = %e, "onboarding failed");
            }
        }
    }

    #[instrument(skip(self))]
    fn play_round(&mut self, round: u32) -> RoundLog {
        let roster = self.game.active_players();
        let chats = self.chat();
        let mut predictions = self.predict();

        let mut actions = BTreeMap::new();
        for player in &roster {
            let record = self.act(player);
            actions.insert(player.clone(), record);
        }

        // scored against the roster of this round, before anyone is eliminated
        for entry in &mut predictions {
            entry.accuracy = match (&entry.prediction, actions.get(&entry.subject)) {
                (Value::Array(records), Some(realised)) if entry.parsed => self
                    .game
                    .prediction_accuracy(records, &realised.action)
                    .into(),
                _ => Accuracy::Invalid,
            };
        }

        let decisions: BTreeMap<String, Decision> = actions
            .iter()
            .map(|(player, record)| (player.clone(), record.action.clone()))
            .collect();
        let resolution = self.game.process_actions(&decisions);
        let score_increments = roster
            .iter()
            .map(|p| {
                let increment = self.game.score_increments().get(p).copied().unwrap_or_default();
                (p.clone(), increment)
            })
            .collect();
        debug!(?score_increments, "round resolved");

        if !self.game.is_game_over() {
            self.observe(&resolution);
        }

        RoundLog {
            round,
            chats,
            predictions,
            actions,
            observations: resolution.observations,
            new_state: resolution.new_state,
            score_increments,
        }
    }

    fn chat(&mut self) -> Vec<ChatThread> {
        let mut names = self.game.active_players();
        names.shuffle(&mut self.rng);
        let mut threads: Vec<ChatThread> = names
            .iter()
            .enumerate()
            .flat_map(|(i, first)| {
                names[i + 1..].iter().map(move |second| ChatThread {
                    players: [first.clone(), second.clone()],
                    messages: Vec::new(),
                })
            })
            .collect();

        for _ in 0..self.config.chat_rounds() {
            for thread in &mut threads {
                let [first, second] = thread.players.clone();
                let (opening, incoming) = match thread.messages.last() {
                    Some(last) if last.from == second => (
                        format!(
                            "In your chat with {second}, you received the message: {}\nGive your response to {second}. ",
                            last.message
                        ),
                        last.clone(),
                    ),
                    _ => (
                        format!("Initiate a chat with {second}. "),
                        ChatMessage::new(&second, &first, "Hello"),
                    ),
                };
                let text = self.utterance(&first, &second, opening, &incoming);
                let sent = ChatMessage::new(&first, &second, text);
                thread.messages.push(sent.clone());

                let opening = format!(
                    "In your chat with {first}, you received the message: {}\nGive your response to {first}. ",
                    sent.message
                );
                let text = self.utterance(&second, &first, opening, &sent);
                thread.messages.push(ChatMessage::new(&second, &first, text));
            }
        }
        threads
    }

    /// What `speaker` says to `listener`; empty when the reply carries no `<message>` region.
    fn utterance(&self, speaker: &str, listener: &str, mut prompt: String, incoming: &ChatMessage) -> String {
        prompt.push_str(&format!(
            "Address {listener} directly without any other text. Place your message between the <message> </message> tags, i.e. <message> your message to {listener} here </message>"
        ));
        match self.call(speaker, &TaskMessage::chat(prompt, incoming), false) {
            Ok(reply) => tagged(&reply, "message").unwrap_or_else(|| {
                warn!(speaker, listener, "chat reply without a <message> region");
                String::new()
            }),
            Err(e) => {
                warn!(speaker, listener, error = %e, "chat call failed");
                String::new()
            }
        }
    }

    fn predict(&self) -> Vec<PredictionEntry> {
        let format = self.game.action_format();
        let instructions = format!(
            "Enclose your main reasons within the <reasoning> </reasoning> tags.\n\
             Then make your prediction and enclose it within the <prediction> </prediction> tags, \
             i.e. <reasoning> main reasons here </reasoning> <prediction> predicted actions here </prediction>.\n\
             For the formal predictions between the <prediction> </prediction> tags, use the following JSON format:{}",
            format.template
        );
        let active = self.game.active_players();
        let mut entries = Vec::new();
        for predictor in &active {
            for subject in active.iter().filter(|s| *s != predictor) {
                let prompt = format!(
                    "Ok {predictor}, it is nearing decision time for everyone. {}\n\
                     DO NOT make your decision just yet. Consider the events so far, your last chats and the current situation. \
                     Then predict ONLY what **{subject}** will do next.\n{instructions}",
                    format.description
                );
                let entry = match self.call(predictor, &TaskMessage::predict(prompt, subject), false) {
                    Ok(reply) => self.read_prediction(predictor, subject, &reply),
                    Err(e) => {
                        warn!(predictor = %predictor, subject = %subject, error = %e, "prediction call failed");
                        PredictionEntry {
                            predictor: predictor.clone(),
                            subject: subject.clone(),
                            reasoning: String::new(),
                            prediction: Value::Null,
                            parsed: false,
                            accuracy: Accuracy::Invalid,
                        }
                    }
                };
                entries.push(entry);
            }
        }
        entries
    }

    fn read_prediction(&self, predictor: &str, subject: &str, reply: &str) -> PredictionEntry {
        let reasoning = tagged(reply, "reasoning").unwrap_or_default();
        let text = tagged(reply, "prediction").unwrap_or_else(|| reply.trim().to_owned());
        let (prediction, parsed) = match parse_lenient(&text).map(as_records) {
            Some(Ok(mut records)) => {
                self.resolve_references(predictor, &mut records);
                (Value::Array(records), true)
            }
            _ => {
                warn!(predictor, subject, "unreadable prediction kept as text");
                (Value::String(text), false)
            }
        };
        PredictionEntry {
            predictor: predictor.to_owned(),
            subject: subject.to_owned(),
            reasoning,
            prediction,
            parsed,
            // scored once the decisions are known
            accuracy: Accuracy::Invalid,
        }
    }

    fn act(&mut self, player: &str) -> ActionRecord {
        let format = self.game.action_format();
        let mut prompt = format!(
            "Ok, {player}, now it is time to make your decision.\n{} \
             Enclose your main reasons within the <reasoning> </reasoning> tags.\n\
             Then make your decision and enclose it within the <decision> </decision> tags, \
             i.e. <reasoning> main reasons here </reasoning> <decision> final actions here </decision>.\n\
             For the formal decision between the <decision> </decision> tags, use the following JSON format:{}",
            format.description, format.template
        );
        let attempts = self.config.action_attempts();
        let mut reasoning = None;

        for attempt in 1..=attempts {
            let reply = match self.call(player, &TaskMessage::act(prompt.clone(), &format.template), false) {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(player, attempt, error = %e, "no decision received");
                    prompt.push_str(&format!("\nNo response was received.\n{RETRY}"));
                    continue;
                }
            };
            if reasoning.is_none() {
                reasoning = tagged(&reply, "reasoning");
            }
            let text = decision_text(&reply);
            match self.read_decision(player, &text) {
                Ok(action) => {
                    return ActionRecord {
                        reasoning: reasoning.unwrap_or_default(),
                        action,
                        attempts: attempt as u32,
                        substituted: false,
                    }
                }
                Err(e) => {
                    warn!(player, attempt, error = %e, "decision rejected");
                    prompt.push_str(&format!(
                        "\nYour decision was: {text}\nError message: {}",
                        agent_message(&e)
                    ));
                    if matches!(e, ArenaError::Format(_)) {
                        prompt.push_str(&format!("\nRequired format (reminder):\n{}", format.template));
                    }
                    prompt.push('\n');
                    prompt.push_str(RETRY);
                }
            }
        }

        let action = self.game.null_action(player);
        warn!(player, ?action, "attempts exhausted, playing the null action");
        ActionRecord {
            reasoning: ActionRecord::ERROR_MARKER.to_owned(),
            action,
            attempts: attempts as u32,
            substituted: true,
        }
    }

    fn read_decision(&self, player: &str, text: &str) -> Result<Decision, ArenaError> {
        let value = parse_lenient(text)
            .ok_or_else(|| ArenaError::Format(format!("Could not read '{text}' as JSON.")))?;
        let mut records = as_records(value).map_err(ArenaError::Format)?;
        self.resolve_references(player, &mut records);
        self.game
            .validate_actions(player, &records)
            .map_err(ArenaError::Validation)?;
        Ok(records)
    }

    /// Map misspelled player names (`Target`, `Partners`) onto the roster.
    fn resolve_references(&self, author: &str, records: &mut [Value]) {
        for record in records.iter_mut().filter_map(Value::as_object_mut) {
            if let Some(Value::String(target)) = record.get_mut("Target") {
                self.resolve_in_place(author, target);
            }
            if let Some(Value::Array(partners)) = record.get_mut("Partners") {
                for partner in partners.iter_mut() {
                    if let Value::String(name) = partner {
                        self.resolve_in_place(author, name);
                    }
                }
            }
        }
    }

    fn resolve_in_place(&self, author: &str, name: &mut String) {
        match resolve_name(name, &self.roster) {
            Some(found) if found.is_substitution() => {
                warn!(
                    author,
                    written = %name,
                    resolved = %found.name,
                    similarity = found.similarity,
                    ambiguous = found.ambiguous,
                    "player name substituted"
                );
                *name = found.name;
            }
            Some(_) => {}
            None => warn!(author, error = %ArenaError::NameResolution(name.clone()), "name left as written"),
        }
    }

    fn observe(&self, resolution: &Resolution) {
        for player in self.game.active_players() {
            let state = resolution.new_state.get(&player).cloned().unwrap_or(Value::Null);
            let observation = resolution
                .observations
                .get(&player)
                .map(String::as_str)
                .unwrap_or_default();
            let prompt = format!(
                "Your next observations: {observation}\nYour next state: {state}\nYour current score: {}",
                self.game.scoreboard().score(&player)
            );
            if let Err(e) = self.call(&player, &TaskMessage::observe(prompt, state), false) {
                warn!(player = %player, error = %e, "observation not delivered");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::game_interface::Scenario;
    use crate::games::GameKind;
    use crate::player::{Participant, Player};

    /// Answers every task from a closure and records what it was sent.
    struct Scripted<F> {
        answer: F,
        sent: Mutex<Vec<(String, Value)>>,
        conversations: Mutex<Vec<(String, bool)>>,
    }

    impl<F: Fn(&str, &Value) -> String + Send + Sync> Scripted<F> {
        fn new(answer: F) -> Self {
            Scripted {
                answer,
                sent: Mutex::new(Vec::new()),
                conversations: Mutex::new(Vec::new()),
            }
        }

        fn tasks(&self, address: &str, kind: &str) -> usize {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter(|(a, m)| a == address && m["task"] == kind)
                .count()
        }
    }

    impl<F: Fn(&str, &Value) -> String + Send + Sync> Messenger for Scripted<F> {
        fn talk_to_agent(
            &self,
            message: &str,
            address: &str,
            conversation: &str,
            new_conversation: bool,
            _: Duration,
        ) -> anyhow::Result<String> {
            let message: Value = serde_json::from_str(message)?;
            let reply = (self.answer)(address, &message);
            self.conversations
                .lock()
                .unwrap()
                .push((conversation.to_owned(), new_conversation));
            self.sent.lock().unwrap().push((address.to_owned(), message));
            Ok(reply)
        }
    }

    fn settings(game: GameKind, max_turns: u32) -> MatchSettings {
        let players = [("Aisha", "alpha", "a:1"), ("Boris", "beta", "b:1")]
            .iter()
            .map(|(name, role, address)| Player::new(*name, &Participant::new(*role, *address)))
            .collect();
        MatchSettings {
            game_id: 3,
            game,
            scenario: Scenario::First,
            players,
            max_turns,
            seed: 17,
        }
    }

    fn quiet() -> Configuration {
        Configuration::new().with_verbose(false).with_chat_rounds(1)
    }

    #[test]
    fn decision_region() {
        assert_eq!(
            decision_text("<reasoning>x</reasoning> <decision>[{\"Price\": 3}]</decision>"),
            "[{\"Price\": 3}]"
        );
        assert_eq!(decision_text("<reasoning>x</reasoning> [{\"Price\": 3}]"), "[{\"Price\": 3}]");
        assert_eq!(decision_text("[{\"Price\": 3}]"), "[{\"Price\": 3}]");
    }

    #[test]
    fn full_hupi_instance() {
        let agents = Scripted::new(|address: &str, msg: &Value| match msg["task"].as_str() {
            Some("chat") => "<message>hi</message>".to_owned(),
            Some("predict") => "<reasoning>r</reasoning><prediction>[{\"Price\": 10}]</prediction>".to_owned(),
            Some("act") if address == "a:1" => "<reasoning>high</reasoning><decision>[{\"Price\": 10}]</decision>".to_owned(),
            Some("act") => "<decision>[{'Price': 9}]</decision>".to_owned(),
            _ => "ok".to_owned(),
        });
        let log = run_match(&settings(GameKind::Hupi, 2), quiet(), &agents);

        assert!(log.completed);
        assert_eq!(log.rounds.len(), 2);
        assert_eq!(log.scores["alpha"], 2.0);
        assert_eq!(log.scores["beta"], 0.0);
        // Boris always predicts 10 for Aisha, Aisha always predicts 10 for Boris
        assert_eq!(log.pred_accuracy["beta"], Some(1.0));
        assert_eq!(log.pred_accuracy["alpha"], Some(0.0));
        assert_eq!(log.transparency["alpha"], Some(1.0));

        let first = &log.rounds[0];
        assert_eq!(first.chats.len(), 1);
        assert_eq!(first.chats[0].messages.len(), 2);
        assert_eq!(first.actions["Aisha"].reasoning, "high");
        assert_eq!(first.score_increments["Aisha"], 1.0);

        assert_eq!(agents.tasks("a:1", "background"), 1);
        // observations are skipped on the last round
        assert_eq!(agents.tasks("a:1", "observe"), 1);
    }

    #[test]
    fn invalid_decisions_fall_back_to_the_null_action() {
        let agents = Scripted::new(|_: &str, msg: &Value| match msg["task"].as_str() {
            Some("act") => "<decision>[{\"Amount\": 1000}]</decision>".to_owned(),
            Some("predict") => "no idea".to_owned(),
            _ => String::new(),
        });
        let log = run_match(&settings(GameKind::TragedyOfCommons, 1), quiet(), &agents);

        let record = &log.rounds[0].actions["Boris"];
        assert!(record.substituted);
        assert_eq!(record.reasoning, ActionRecord::ERROR_MARKER);
        assert_eq!(record.attempts, 3);
        assert_eq!(agents.tasks("b:1", "act"), 3);
        assert!(log.rounds[0]
            .predictions
            .iter()
            .all(|p| !p.parsed && p.accuracy == Accuracy::Invalid));
        assert_eq!(log.pred_accuracy["alpha"], None);
        // chat replies without tags are empty utterances
        assert!(log.rounds[0].chats[0].messages.iter().all(|m| m.message.is_empty()));
    }

    #[test]
    fn misspelled_targets_are_resolved() {
        let agents = Scripted::new(|address: &str, msg: &Value| match msg["task"].as_str() {
            Some("act") if address == "a:1" => "<decision>[{\"Target\": \"Borris\", \"Shots\": 2}]</decision>".to_owned(),
            Some("act") => "<decision>[{\"Target\": \"Aisha\", \"Shots\": 0}]</decision>".to_owned(),
            _ => String::new(),
        });
        let log = run_match(&settings(GameKind::Survivor, 1), quiet(), &agents);
        let record = &log.rounds[0].actions["Aisha"];
        assert!(!record.substituted);
        assert_eq!(record.action[0]["Target"], "Boris");
    }

    #[test]
    fn unreachable_agents_do_not_abort_the_game() {
        struct Down;
        impl Messenger for Down {
            fn talk_to_agent(&self, _: &str, _: &str, _: &str, _: bool, _: Duration) -> anyhow::Result<String> {
                anyhow::bail!("connection refused")
            }
        }
        let log = run_match(&settings(GameKind::Scheduler, 2), quiet(), &Down);
        assert!(log.completed);
        assert_eq!(log.rounds.len(), 2);
        assert!(log.rounds[0].actions.values().all(|a| a.substituted));
    }

    #[test]
    fn each_seat_talks_in_its_own_conversation() {
        // one agent holding both seats
        let mut settings = settings(GameKind::Hupi, 2);
        for player in &mut settings.players {
            player.address = "a:1".to_owned();
        }
        let agents = Scripted::new(|_: &str, msg: &Value| match msg["task"].as_str() {
            Some("act") => "<decision>[{\"Price\": 4}]</decision>".to_owned(),
            _ => String::new(),
        });
        let log = run_match(&settings, quiet(), &agents);
        assert!(log.completed);

        let conversations = agents.conversations.lock().unwrap();
        let mut opened: Vec<&str> = conversations
            .iter()
            .filter(|(_, new)| *new)
            .map(|(c, _)| c.as_str())
            .collect();
        opened.sort_unstable();
        assert_eq!(opened, ["3/Aisha", "3/Boris"]);
        assert!(conversations
            .iter()
            .all(|(c, _)| c == "3/Aisha" || c == "3/Boris"));
        assert!(conversations.iter().filter(|(c, _)| c == "3/Aisha").count() > 1);
    }

    #[test]
    fn unbuildable_game_yields_an_open_log() {
        let mut settings = settings(GameKind::Hupi, 2);
        settings.max_turns = 0;
        let agents = Scripted::new(|_: &str, _: &Value| String::new());
        let log = run_match(&settings, quiet(), &agents);
        assert!(!log.completed);
        assert!(log.rounds.is_empty());
        assert_eq!(log.num_players, 2);
    }
}
