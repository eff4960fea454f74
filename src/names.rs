//! Player display names.
//!
//! Each game instance seats its agents under names drawn without repetition from
//! [`NAME_POOL`]. Agents sometimes refer to other players with a slightly wrong spelling;
//! [`resolve_name`] maps such a reference back onto the roster when it is close enough.

use rand::seq::IndexedRandom;
use rand::Rng;

/// Names handed out to players. Large enough for any composition size the arena accepts.
pub const NAME_POOL: [&str; 51] = [
    "Aisha", "Aditya", "Benjamin", "Boris", "Carlotta", "Chen", "Donald", "Devika", "Emmanuel",
    "Elon", "Francoise", "Fortuna", "Gabriel", "Gregory", "Helen", "Huang", "Igor", "Indira",
    "Julia", "Juan", "Kobayashi", "Karenina", "Leela", "Lana", "Marcus", "Maia", "Nicole",
    "Nathan", "Oprah", "Orpheus", "Penelope", "Plato", "Quincy", "Rodriguez", "Ronda", "Sam",
    "Satya", "Theodore", "Taylor", "Ulysses", "Uri", "Vladimir", "Veronika", "Winston", "Wanda",
    "Xavier", "Xi", "Yolanda", "Yves", "Zoe", "Zhang",
];

/// Minimum normalised similarity for a misspelled name to be accepted as a roster name.
pub const NAME_MATCH_THRESHOLD: f64 = 0.6;

/// Draw `n` distinct names from the pool. `n` is capped by the pool size.
pub fn draw_names<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Vec<String> {
    NAME_POOL
        .choose_multiple(rng, n)
        .map(|name| (*name).to_owned())
        .collect()
}

/// Outcome of resolving a name against a roster.
#[derive(Debug, Clone, PartialEq)]
pub struct NameMatch {
    pub name: String,
    pub similarity: f64,
    /// Another roster entry scored the same similarity; the first one in roster order was kept.
    pub ambiguous: bool,
}

impl NameMatch {
    /// True when the candidate was not spelled exactly as the roster name.
    pub fn is_substitution(&self) -> bool {
        self.similarity < 1.0
    }
}

/// Map `candidate` onto the closest name of `roster`.
///
/// Exact matches win. Otherwise comparison is case-insensitive normalised Levenshtein and the
/// best score must reach [`NAME_MATCH_THRESHOLD`].
pub fn resolve_name<'a, I>(candidate: &str, roster: I) -> Option<NameMatch>
where
    I: IntoIterator<Item = &'a String>,
{
    let roster: Vec<&String> = roster.into_iter().collect();
    if let Some(exact) = roster.iter().find(|name| name.as_str() == candidate) {
        return Some(NameMatch {
            name: (*exact).clone(),
            similarity: 1.0,
            ambiguous: false,
        });
    }

    let needle = candidate.trim().to_lowercase();
    let mut best: Option<NameMatch> = None;
    for name in roster {
        let sim = strsim::normalized_levenshtein(&needle, &name.to_lowercase());
        if sim < NAME_MATCH_THRESHOLD {
            continue;
        }
        let better = best.as_ref().map_or(true, |b| sim > b.similarity);
        if better {
            best = Some(NameMatch {
                name: name.clone(),
                similarity: sim,
                ambiguous: false,
            });
        } else if let Some(b) = best.as_mut() {
            if (sim - b.similarity).abs() < f64::EPSILON {
                b.ambiguous = true;
            }
        }
    }
    // a case or whitespace difference is still a substitution
    best.map(|b| NameMatch {
        similarity: b.similarity.min(1.0 - f64::EPSILON),
        ..b
    })
}
