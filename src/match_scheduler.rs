use std::collections::VecDeque;

use tracing::trace;

use crate::game_log::GameLog;
use crate::run_composer::MatchSettings;

/// Hands out game instances while keeping at most `parallel_matches` of them running.
pub struct MatchScheduler {
    pending: VecDeque<MatchSettings>,
    logs: Vec<GameLog>,
    parallel_matches: usize,
    running_matches: usize,
}

impl MatchScheduler {
    pub fn new(worklist: Vec<MatchSettings>, parallel_matches: usize) -> Self {
        MatchScheduler {
            pending: worklist.into(),
            logs: Vec::new(),
            parallel_matches: parallel_matches.max(1),
            running_matches: 0,
        }
    }

    /// Instances to launch now.
    pub fn advance(&mut self) -> Vec<MatchSettings> {
        let free = self.parallel_matches.saturating_sub(self.running_matches);
        let n = free.min(self.pending.len());
        let to_run: Vec<_> = self.pending.drain(..n).collect();
        self.running_matches += to_run.len();
        trace!(
            launched = to_run.len(),
            running = self.running_matches,
            pending = self.pending.len()
        );
        to_run
    }

    pub fn on_result(&mut self, log: GameLog) -> Vec<MatchSettings> {
        self.logs.push(log);
        self.running_matches = self.running_matches.saturating_sub(1);
        self.advance()
    }

    /// Every instance ran and reported.
    pub fn is_finished(&self) -> bool {
        self.pending.is_empty() && self.running_matches == 0
    }

    /// Collected logs, by game id.
    pub fn into_logs(mut self) -> Vec<GameLog> {
        self.logs.sort_by_key(|log| log.game_id);
        self.logs
    }
}
