//! Config for the evaluator behaviors
//!
//! This module provides configuration options for controlling how the arena drives agents.
//!
//! Configuration can be created programmatically using [`Configuration::new()`] or by reading
//! environment variables using [`Configuration::from_env()`].
//!
//! # Environment Variables
//!
//! The following environment variables can be used to override configuration values. All
//! values are optional. Flags are case-insensitive, set the value to `"true"` to enable one.
//!
//! - `EVAL_VERBOSE`: Print match progress to stdout (default: `true`)
//! - `EVAL_LOG`: Enable logging to a file (default: `false`)
//! - `EVAL_CHAT_ROUNDS`: Message exchanges per pair of players and per round (default: `3`)
//! - `EVAL_ACTION_ATTEMPTS`: Total attempts a player gets to submit a valid action (default: `3`)
//! - `EVAL_CALL_TIMEOUT_MS`: Upper bound for a single remote agent call (default: `120000`)
//! - `EVAL_PARALLEL_MATCHES`: Game instances running at the same time (default: logical CPU count)

use std::time::Duration;

/// Configuration for evaluator behaviors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Configuration {
    pub(crate) verbose: bool,
    pub(crate) log: bool,
    pub(crate) chat_rounds: usize,
    pub(crate) action_attempts: usize,
    pub(crate) call_timeout: Duration,
    pub(crate) parallel_matches: usize,
}

impl Configuration {
    const DEFAULT_CHAT_ROUNDS: usize = 3;
    const DEFAULT_ACTION_ATTEMPTS: usize = 3;
    const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(120);

    /// Create a new configuration with default parameters.
    ///
    /// By default:
    /// - The evaluator will print match progress to stdout.
    /// - Logging to file is disabled.
    /// - Every pair of players exchanges 3 messages each way per round.
    /// - Players get 3 attempts to produce a valid action.
    /// - A remote call may take up to two minutes.
    /// - As many games as logical CPUs run concurrently.
    pub fn new() -> Self {
        Self {
            verbose: true,
            log: false,
            chat_rounds: Self::DEFAULT_CHAT_ROUNDS,
            action_attempts: Self::DEFAULT_ACTION_ATTEMPTS,
            call_timeout: Self::DEFAULT_CALL_TIMEOUT,
            parallel_matches: num_cpus::get().max(1),
        }
    }

    /// Create configuration from environment variables.
    ///
    /// Unset or unparsable variables keep their default value (see module documentation).
    pub fn from_env() -> Self {
        fn get_env_flag(var: &str, default: bool) -> bool {
            match std::env::var(var) {
                Ok(val) => val.eq_ignore_ascii_case("true"),
                Err(_) => default,
            }
        }

        fn get_env_number(var: &str) -> Option<u64> {
            std::env::var(var).ok()?.trim().parse().ok()
        }

        let defaults = Self::new();
        let mut config = Self {
            verbose: get_env_flag("EVAL_VERBOSE", defaults.verbose),
            log: get_env_flag("EVAL_LOG", defaults.log),
            ..defaults
        };
        if let Some(rounds) = get_env_number("EVAL_CHAT_ROUNDS") {
            config = config.with_chat_rounds(rounds as usize);
        }
        if let Some(attempts) = get_env_number("EVAL_ACTION_ATTEMPTS") {
            config = config.with_action_attempts(attempts as usize);
        }
        if let Some(ms) = get_env_number("EVAL_CALL_TIMEOUT_MS") {
            config = config.with_call_timeout(Duration::from_millis(ms));
        }
        if let Some(n) = get_env_number("EVAL_PARALLEL_MATCHES") {
            config = config.with_parallel_matches(n as usize);
        }
        config
    }

    /// Enable or disable console progress output.
    pub fn with_verbose(mut self, value: bool) -> Self {
        self.verbose = value;
        self
    }

    /// Enable or disable logging to file.
    pub fn with_log(mut self, value: bool) -> Self {
        self.log = value;
        self
    }

    /// Number of message exchanges per pair of players and per round. `0` skips the chat phase.
    pub fn with_chat_rounds(mut self, value: usize) -> Self {
        self.chat_rounds = value;
        self
    }

    /// Total number of attempts (first submission included) before the null action is used.
    ///
    /// Values below one are raised to one.
    pub fn with_action_attempts(mut self, value: usize) -> Self {
        self.action_attempts = value.max(1);
        self
    }

    /// Upper bound for a single call to a remote agent (at least one millisecond).
    pub fn with_call_timeout(mut self, value: Duration) -> Self {
        // sockets reject a zero timeout
        self.call_timeout = value.max(Duration::from_millis(1));
        self
    }

    /// Number of game instances allowed to run concurrently (at least one).
    pub fn with_parallel_matches(mut self, value: usize) -> Self {
        self.parallel_matches = value.max(1);
        self
    }

    /// Message exchanges per pair and per round.
    pub fn chat_rounds(&self) -> usize {
        self.chat_rounds
    }

    /// Attempts per player in the action phase.
    pub fn action_attempts(&self) -> usize {
        self.action_attempts
    }

    /// Bound on one remote call.
    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}
