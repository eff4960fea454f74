//! # Social Arena
//!
//! An arena benchmarking the social and strategic behavior of autonomous agents. Agents play
//! repeated social-economic games against each other over the network and are scored on their
//! outcomes, on how well they predict their opponents and on how predictable they are
//! ("transparency").
//!
//! It provides:
//! - A game contract ([`GameEngine`](crate::game_interface::GameEngine)) and five variants:
//!   `Scheduler`, `Coalition`, `HUPI`, `TragedyOfCommons` and `Survivor` (see [`games`])
//! - A round orchestrator driving free-text agents through onboarding, chat, prediction,
//!   decision (with retries) and observation (see [`match_runner`])
//! - Worklist composition over participant subsets, variants and scenarios
//!   (see [`run_composer`])
//! - Parallel execution of game instances and aggregation of their logs (`Evaluator`)
//!
//! Agents never make a game fail: unreadable chat, predictions or decisions degrade to empty
//! utterances, `"invalid"` accuracies or the null action of the game.
//!
//! # Documentation Overview
//!
//! - For request handling and the evaluation lifecycle, see the [`server`] module.
//! - For evaluator behavior (parallelism, retries, timeouts, logging), see
//!   [`Configuration`](crate::configuration::Configuration).
//! - For the accepted request layout, see [`request`].
//! - For the records produced by a game, see [`game_log`] and [`aggregator`].
//! - For the wire format between the arena and its agents, see [`protocol`] and [`messenger`].
//!
//! # Usage Example
//!
//! ```no_run
//! use social_arena::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let request = EvalRequest::from_json(
//!         r#"{
//!             "participants": {"alpha": "127.0.0.1:9001", "beta": "127.0.0.1:9002"},
//!             "config": {"games": ["HUPI"], "max_runs": 4, "seed": 7}
//!         }"#,
//!     )?;
//!
//!     let config = Configuration::from_env().with_parallel_matches(2);
//!     let evaluator = Evaluator::new(TcpMessenger::new(), config)?;
//!     let evaluation = evaluator.evaluate(&request)?;
//!
//!     for summary in &evaluation.summaries {
//!         println!("{}: {:.2} over {} games", summary.agent, summary.mean_score, summary.games);
//!     }
//!     evaluation.write_artifacts("results")?;
//!     Ok(())
//! }
//! ```
//!
//! ## Agent Requirements
//!
//! - Agents listen on TCP and read one JSON task message per line:
//!   `{"task": "background"|"chat"|"predict"|"act"|"observe", "message": ..., "info": ...}`
//! - They answer every task with one line of free text
//! - Replies put the machine readable part between tags: `<message>` for chat,
//!   `<prediction>` for predictions and `<decision>` for decisions

pub mod aggregator;
pub mod configuration;
pub mod error;
pub mod extract;
pub mod game_interface;
pub mod game_log;
pub mod games;
mod logger;
pub mod match_runner;
mod match_scheduler;
pub mod messenger;
pub mod names;
pub mod player;
pub mod protocol;
pub mod request;
pub mod run_composer;
pub mod server;

pub use anyhow;

/// Commonly used types and traits for quick access.
///
/// Import this prelude to get started easily:
/// ```rust
/// use social_arena::prelude::*;
/// ```
///
/// Includes:
/// - [`Configuration`](crate::configuration::Configuration)
/// - [`Evaluator`](crate::server::Evaluator) and [`Evaluation`](crate::server::Evaluation)
/// - [`EvalRequest`](crate::request::EvalRequest)
/// - the game contract and the [`Game`](crate::games::Game) enum
/// - the [`Messenger`](crate::messenger::Messenger) seam and its TCP implementation
pub mod prelude {
    pub use crate::configuration::Configuration;
    pub use crate::error::ArenaError;
    pub use crate::game_interface::{GameConfig, GameEngine, Scenario};
    pub use crate::game_log::GameLog;
    pub use crate::games::{Game, GameKind};
    pub use crate::messenger::{Messenger, TcpMessenger};
    pub use crate::request::{EvalRequest, RunConfig};
    pub use crate::server::{Evaluation, Evaluator};
}
