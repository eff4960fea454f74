//! Error taxonomy of the arena.
//!
//! Only [`ArenaError::Config`], [`ArenaError::Request`], [`ArenaError::Io`] and
//! [`ArenaError::Serialization`] ever escape an evaluation. The other variants describe
//! failures of a single exchange with an agent; the round orchestrator recovers from them
//! locally (retry, empty utterance, `"invalid"` prediction or null action) and only logs them.

use thiserror::Error;

/// Errors produced while composing, running or scoring games.
#[derive(Debug, Error)]
pub enum ArenaError {
    /// A game could not be built from its configuration (missing players, bad scenario, ...).
    #[error("invalid game configuration: {0}")]
    Config(String),

    /// The evaluation request is malformed or misses required roles / config keys.
    #[error("invalid evaluation request: {0}")]
    Request(String),

    /// A remote agent could not be reached or answered with a transport error.
    #[error("agent at '{address}' did not answer: {source}")]
    Protocol {
        /// Network address of the agent.
        address: String,
        /// Underlying transport error.
        #[source]
        source: anyhow::Error,
    },

    /// A reply does not parse into the required structure.
    #[error("unreadable reply: {0}")]
    Format(String),

    /// A well-formed action breaks the rules of the game.
    #[error("invalid action: {0}")]
    Validation(String),

    /// A referenced player name is not part of the roster.
    #[error("unknown player name '{0}'")]
    NameResolution(String),

    /// Writing artifacts failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A log or request could not be (de)serialised.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
