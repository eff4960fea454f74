//! Composition of the worklist: which participants play which variant and scenario.
//!
//! Every subset of participants with at least 2 and at most `max_size` members that contains all
//! required roles is crossed with every selected variant and both scenarios. When `max_runs` is
//! smaller than that product a uniform sample is kept, in composition order.

use std::fmt::Display;

use rand::seq::index;
use rand::Rng;
use tracing::{debug, instrument};

use crate::error::ArenaError;
use crate::game_interface::{GameConfig, Scenario};
use crate::games::GameKind;
use crate::names::{draw_names, NAME_POOL};
use crate::player::{Participant, Player};
use crate::request::RunConfig;

/// One game instance to run.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchSettings {
    pub game_id: u64,
    pub game: GameKind,
    pub scenario: Scenario,
    /// Seats in composition order; names are drawn per instance.
    pub players: Vec<Player>,
    pub max_turns: u32,
    /// Seed of every random draw of the instance.
    pub seed: u64,
}

impl MatchSettings {
    pub fn game_config(&self) -> GameConfig {
        GameConfig::new(self.players.clone(), self.scenario, self.max_turns).with_seed(self.seed)
    }
}

impl Display for MatchSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let seats = self
            .players
            .iter()
            .map(|p| format!("{}({})", p.name, p.model))
            .collect::<Vec<_>>()
            .join(" VS ");
        write!(f, "[#{} {}/{} {seats}]", self.game_id, self.game, self.scenario)
    }
}

pub struct RunComposer {
    participants: Vec<Participant>,
    required: Vec<String>,
    max_size: usize,
    max_runs: Option<usize>,
    games: Vec<(GameKind, u32)>,
}

impl RunComposer {
    pub fn new(participants: Vec<Participant>, config: &RunConfig) -> Result<RunComposer, ArenaError> {
        if participants.len() < 2 {
            return Err(ArenaError::Request(format!(
                "At least 2 participants are needed, got {}",
                participants.len()
            )));
        }
        if let Some(role) = config
            .required
            .iter()
            .find(|role| !participants.iter().any(|p| &p.role == *role))
        {
            return Err(ArenaError::Request(format!(
                "Required entry '{role}' is not a participant"
            )));
        }
        let games = config
            .games()?
            .into_iter()
            .map(|kind| (kind, config.max_turns_for(kind)))
            .collect();
        Ok(RunComposer {
            participants,
            required: config.required.clone(),
            // names are unique within an instance
            max_size: config.max_size().min(NAME_POOL.len()),
            max_runs: config.max_runs,
            games,
        })
    }

    /// Participant subsets eligible for an instance, smallest first.
    pub fn compositions(&self) -> Vec<Vec<&Participant>> {
        let largest = self.max_size.min(self.participants.len());
        (2..=largest)
            .flat_map(|size| combinations(self.participants.len(), size))
            .map(|picked| picked.into_iter().map(|i| &self.participants[i]).collect::<Vec<_>>())
            .filter(|group| {
                self.required
                    .iter()
                    .all(|role| group.iter().any(|p| &p.role == role))
            })
            .collect()
    }

    /// Build the worklist. Ids are assigned after sampling and increase from 1.
    #[instrument(skip_all)]
    pub fn compose<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<MatchSettings> {
        let mut runs = Vec::new();
        for group in self.compositions() {
            for (game, max_turns) in &self.games {
                for scenario in Scenario::ALL {
                    runs.push((group.clone(), *game, scenario, *max_turns));
                }
            }
        }
        let total = runs.len();

        if let Some(max_runs) = self.max_runs.filter(|max| *max < total) {
            let mut kept = index::sample(rng, total, max_runs).into_vec();
            kept.sort_unstable();
            let mut runs_iter = runs.into_iter().enumerate();
            runs = kept
                .into_iter()
                .filter_map(|i| runs_iter.find(|(j, _)| *j == i).map(|(_, run)| run))
                .collect();
        }
        debug!(total, kept = runs.len(), "worklist composed");

        runs.into_iter()
            .zip(1u64..)
            .map(|((group, game, scenario, max_turns), game_id)| {
                let names = draw_names(group.len(), rng);
                let players = group
                    .iter()
                    .zip(names)
                    .map(|(participant, name)| Player::new(name, participant))
                    .collect();
                MatchSettings {
                    game_id,
                    game,
                    scenario,
                    players,
                    max_turns,
                    seed: rng.random(),
                }
            })
            .collect()
    }
}

/// Index combinations of `k` out of `n`, in lexicographic order.
fn combinations(n: usize, k: usize) -> Vec<Vec<usize>> {
    let mut out = Vec::new();
    if k > n {
        return out;
    }
    let mut current: Vec<usize> = (0..k).collect();
    loop {
        out.push(current.clone());
        let Some(pos) = (0..k).rev().find(|&i| current[i] != i + n - k) else {
            return out;
        };
        current[pos] += 1;
        for i in pos + 1..k {
            current[i] = current[i - 1] + 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    fn participants() -> Vec<Participant> {
        ["alpha", "beta", "gamma"]
            .iter()
            .enumerate()
            .map(|(i, role)| Participant::new(*role, format!("127.0.0.1:900{i}")))
            .collect()
    }

    #[test]
    fn combinations_in_order() {
        assert_eq!(
            combinations(4, 2),
            vec![
                vec![0, 1],
                vec![0, 2],
                vec![0, 3],
                vec![1, 2],
                vec![1, 3],
                vec![2, 3]
            ]
        );
        assert_eq!(combinations(3, 3), vec![vec![0, 1, 2]]);
        assert!(combinations(2, 3).is_empty());
    }

    #[test]
    fn full_cross_product() {
        let composer = RunComposer::new(participants(), &RunConfig::default()).unwrap();
        assert_eq!(composer.compositions().len(), 4);
        let runs = composer.compose(&mut StdRng::seed_from_u64(1));
        assert_eq!(runs.len(), 4 * 5 * 2);
        assert_eq!(
            runs.iter().map(|r| r.game_id).collect::<Vec<_>>(),
            (1..=40).collect::<Vec<_>>()
        );
    }

    #[test]
    fn required_roles_sit_in_every_instance() {
        let config = RunConfig {
            required: vec!["alpha".into()],
            games: Some(vec!["HUPI".into()]),
            ..RunConfig::default()
        };
        let composer = RunComposer::new(participants(), &config).unwrap();
        let runs = composer.compose(&mut StdRng::seed_from_u64(2));
        assert_eq!(runs.len(), 3 * 2);
        for run in &runs {
            assert!(run.players.iter().any(|p| p.model == "alpha"));
            assert_eq!(run.max_turns, 4);
            let names: HashSet<_> = run.players.iter().map(|p| &p.name).collect();
            assert_eq!(names.len(), run.players.len());
        }
    }

    #[test]
    fn sampling_caps_runs_and_renumbers() {
        let config = RunConfig {
            max_runs: Some(7),
            max_size: Some(2),
            ..RunConfig::default()
        };
        let composer = RunComposer::new(participants(), &config).unwrap();
        let runs = composer.compose(&mut StdRng::seed_from_u64(3));
        assert_eq!(runs.len(), 7);
        assert!(runs.iter().all(|r| r.players.len() == 2));
        assert_eq!(runs.last().unwrap().game_id, 7);
    }

    #[test]
    fn same_seed_same_worklist() {
        let composer = RunComposer::new(participants(), &RunConfig::default()).unwrap();
        let a = composer.compose(&mut StdRng::seed_from_u64(9));
        let b = composer.compose(&mut StdRng::seed_from_u64(9));
        assert_eq!(a, b);
        assert!(a
            .iter()
            .zip(&b)
            .all(|(x, y)| x.seed == y.seed && x.players.iter().zip(&y.players).all(|(p, q)| p.model == q.model)));
    }

    #[test]
    fn unknown_required_role() {
        let config = RunConfig {
            required: vec!["delta".into()],
            ..RunConfig::default()
        };
        assert!(RunComposer::new(participants(), &config).is_err());
    }
}
