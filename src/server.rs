//! Core evaluation logic: from a request to scored game logs.
//!
//! This module defines the [`Evaluator`] type, which orchestrates an evaluation run.
//! Its responsibilities include:
//!
//! - Rejecting malformed requests (missing roles or config keys, unknown games, ...)
//! - Composing the worklist of game instances with a [`RunComposer`]
//! - Running the instances in parallel, at most [`Configuration::with_parallel_matches`] at a time
//! - Reducing the logs into result rows and per agent summaries
//!
//! # Behavior & Configuration
//!
//! Behavior is controlled by a [`Configuration`] object:
//!
//! - When `config.verbose = true`, running and finished instances are printed on a single
//!   status line of the terminal.
//! - When `config.log = true`, every `tracing` event is written to a timestamped file in the
//!   current directory.
//!
//! Agents are reached through a [`Messenger`]; every instance gets its own thread and shares
//! the messenger with the others.
//!
//! # Example
//!
//! See crate-level documentation for an example on how to use the `Evaluator`.

use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{error, info, instrument, trace, warn};

use crate::aggregator::{aggregate, summarize, AgentSummary, ResultRow};
use crate::configuration::Configuration;
use crate::error::ArenaError;
use crate::game_log::GameLog;
use crate::logger::init_logger;
use crate::match_runner::run_match;
use crate::match_scheduler::MatchScheduler;
use crate::messenger::Messenger;
use crate::request::EvalRequest;
use crate::run_composer::{MatchSettings, RunComposer};

/// Everything an evaluation produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub logs: Vec<GameLog>,
    pub results: Vec<ResultRow>,
    pub summaries: Vec<AgentSummary>,
}

impl Evaluation {
    /// Write `Game<ID>.json` for every instance and `results.json` into `dir`.
    pub fn write_artifacts(&self, dir: impl AsRef<Path>) -> Result<(), ArenaError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        for log in &self.logs {
            let text = serde_json::to_string_pretty(log)?;
            fs::write(dir.join(format!("Game{}.json", log.game_id)), text)?;
        }
        let results = serde_json::json!({
            "results": self.results,
            "summaries": self.summaries,
        });
        fs::write(dir.join("results.json"), serde_json::to_string_pretty(&results)?)?;
        Ok(())
    }
}

/// The main type for running an evaluation.
///
/// It validates requests, schedules game instances and aggregates their logs.
///
/// # Type Parameters
/// - `M`: The transport implementing [`Messenger`]
pub struct Evaluator<M: Messenger> {
    messenger: Arc<M>,
    config: Configuration,
    required_roles: Vec<String>,
    required_config_keys: Vec<String>,
}

impl<M: Messenger + 'static> Evaluator<M> {
    /// Create an [`Evaluator`] talking to agents through `messenger`.
    ///
    /// # Errors
    /// Fails only when `config.log` is set and the log file or subscriber cannot be installed.
    #[instrument(skip_all)]
    pub fn new(messenger: M, config: Configuration) -> anyhow::Result<Evaluator<M>> {
        if config.log {
            init_logger(".")?;
        }
        trace!(?config);

        Ok(Evaluator {
            messenger: Arc::new(messenger),
            config,
            required_roles: Vec::new(),
            required_config_keys: Vec::new(),
        })
    }

    /// Roles every request must provide.
    pub fn with_required_roles<S: Into<String>>(mut self, roles: impl IntoIterator<Item = S>) -> Self {
        self.required_roles = roles.into_iter().map(Into::into).collect();
        self
    }

    /// `config` keys every request must provide.
    pub fn with_required_config_keys<S: Into<String>>(mut self, keys: impl IntoIterator<Item = S>) -> Self {
        self.required_config_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Executes every game instance the request composes.
    ///
    /// # Errors
    /// Returns [`ArenaError::Request`] when the request is rejected. Nothing an agent does
    /// during the games makes the evaluation fail.
    #[instrument(skip_all, fields(participants = request.participants.len()))]
    pub fn evaluate(&self, request: &EvalRequest) -> Result<Evaluation, ArenaError> {
        // 1. reject the request before anything runs
        request.validate(&self.required_roles, &self.required_config_keys)?;

        // 2. compose the worklist
        let composer = RunComposer::new(request.participants(), &request.config)?;
        let mut rng = match request.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let worklist = composer.compose(&mut rng);
        info!(instances = worklist.len(), "worklist composed");

        if self.config.verbose {
            disable_line_wrap();
        }

        // 3. create scheduler and communication channels
        let mut scheduler = MatchScheduler::new(worklist, self.config.parallel_matches);
        let (tx_log, rx_log) = mpsc::channel();

        // 4. running matches shared vector (for printing purpose)
        let running = Arc::new(Mutex::new(vec![]));

        for m in scheduler.advance() {
            self.launch_match(m, tx_log.clone(), &running);
        }

        // 5. main loop
        let mut outcome = Ok(());
        while !scheduler.is_finished() {
            // not finished <=> match running <=> log to receive
            let Ok(log) = rx_log.recv() else {
                outcome = Err(ArenaError::Io(std::io::Error::other(
                    "a game thread stopped without reporting its log",
                )));
                break;
            };
            for new_match in scheduler.on_result(log) {
                self.launch_match(new_match, tx_log.clone(), &running);
            }
        }

        if self.config.verbose {
            enable_line_wrap();
        }
        outcome?;

        let logs = scheduler.into_logs();
        let results = aggregate(&logs);
        let summaries = summarize(&results);
        info!(games = logs.len(), rows = results.len(), "evaluation finished");
        Ok(Evaluation {
            logs,
            results,
            summaries,
        })
    }

    fn launch_match(
        &self,
        match_settings: MatchSettings,
        tx_log: Sender<GameLog>,
        running: &Arc<Mutex<Vec<MatchSettings>>>,
    ) {
        let mutex = running.clone();
        if let Ok(mut guard) = mutex.lock() {
            guard.push(match_settings.clone());
            if self.config.verbose {
                print_running_matches(&guard);
            }
        }

        let config = self.config;
        let messenger = self.messenger.clone();
        std::thread::spawn(move || {
            let log = panic::catch_unwind(AssertUnwindSafe(|| {
                run_match(&match_settings, config, messenger.as_ref())
            }))
            .unwrap_or_else(|_| {
                error!(game_id = match_settings.game_id, "game thread panicked");
                unfinished_log(&match_settings)
            });

            if config.verbose {
                print_game_log(&match_settings, &log);
            }
            Self::remove_running_match(&mutex, &match_settings);

            if tx_log.send(log).is_err() {
                warn!(game_id = match_settings.game_id, "evaluation stopped before the log was collected");
            }
        });
    }

    fn remove_running_match(mutex: &Mutex<Vec<MatchSettings>>, running: &MatchSettings) {
        let Ok(mut guard) = mutex.lock() else {
            return;
        };
        if let Some(pos) = guard.iter().position(|s| s.game_id == running.game_id) {
            guard.remove(pos);
        }
    }
}

fn unfinished_log(match_settings: &MatchSettings) -> GameLog {
    GameLog::open(
        match_settings.game_id,
        match_settings.game,
        match_settings.scenario,
        match_settings
            .players
            .iter()
            .map(|p| (p.model.clone(), p.name.clone()))
            .collect(),
        Default::default(),
    )
}

fn print_game_log(match_settings: &MatchSettings, log: &GameLog) {
    let ordered_scores = match_settings
        .players
        .iter()
        .map(|p| {
            log.scores
                .get(&p.model)
                .map_or_else(|| "-".to_owned(), |s| format!("{s}"))
        })
        .collect::<Vec<_>>()
        .join("-");
    let status = if log.completed { "" } else { "not completed" };

    // clear line, green match, results, red errors, start of line
    println!(
        "\x1b[2K\x1b[32m{match_settings}: \x1b[39m{ordered_scores} \x1b[31m{status}\x1b[39m\x1b[0G"
    );
}

fn print_running_matches(running: &[MatchSettings]) {
    // clear, green, default, start of line
    print!(
        "\x1b[2K\x1b[32mRunning...:\x1b[39m {}\x1b[0G",
        running
            .iter()
            .map(MatchSettings::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    );
    let _ = std::io::Write::flush(&mut std::io::stdout());
}

fn disable_line_wrap() {
    print!("\x1b[?7l");
}

fn enable_line_wrap() {
    print!("\x1b[?7h");
}
