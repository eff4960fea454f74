//! Reduction of game logs into result rows and per agent summaries.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::game_interface::Scenario;
use crate::game_log::GameLog;
use crate::games::GameKind;

/// Outcome of one agent in one game instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub game_id: u64,
    pub game: GameKind,
    pub scenario: Scenario,
    pub num_players: usize,
    pub agent: String,
    pub name: String,
    pub prediction_acc: Option<f64>,
    pub transparency: Option<f64>,
    pub score: f64,
}

/// Averages of one agent over every instance it completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSummary {
    pub agent: String,
    pub games: usize,
    pub mean_score: f64,
    pub mean_prediction_acc: Option<f64>,
    pub mean_transparency: Option<f64>,
}

/// One row per (game, agent). Logs that did not complete contribute nothing.
pub fn aggregate(logs: &[GameLog]) -> Vec<ResultRow> {
    logs.iter()
        .filter(|log| log.completed)
        .flat_map(|log| {
            log.participants.iter().map(move |(agent, name)| ResultRow {
                game_id: log.game_id,
                game: log.game,
                scenario: log.scenario,
                num_players: log.participants.len(),
                agent: agent.clone(),
                name: name.clone(),
                prediction_acc: log.pred_accuracy.get(agent).copied().flatten(),
                transparency: log.transparency.get(agent).copied().flatten(),
                score: log.scores.get(agent).copied().unwrap_or_default(),
            })
        })
        .collect()
}

/// Per agent means, ordered by agent. Missing accuracies are left out of their mean.
pub fn summarize(rows: &[ResultRow]) -> Vec<AgentSummary> {
    let mut by_agent: BTreeMap<&str, Vec<&ResultRow>> = BTreeMap::new();
    for row in rows {
        by_agent.entry(row.agent.as_str()).or_default().push(row);
    }
    by_agent
        .into_iter()
        .map(|(agent, rows)| AgentSummary {
            agent: agent.to_owned(),
            games: rows.len(),
            mean_score: mean(rows.iter().map(|r| r.score)).unwrap_or_default(),
            mean_prediction_acc: mean(rows.iter().filter_map(|r| r.prediction_acc)),
            mean_transparency: mean(rows.iter().filter_map(|r| r.transparency)),
        })
        .collect()
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}
