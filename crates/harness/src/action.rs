use core::ops::RangeInclusive;
use core::time::Duration;

use eyre::Result as EyreResult;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::session::Session;
use crate::surface::Command;

/// Semantic document mutation. The page decides what each kind operates on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    Push,
    Delete,
    Move,
    Undo,
    Redo,
    Clear,
}

impl Action {
    /// Kinds eligible for randomised fuzzing. `Clear` is left out: it would
    /// erase any divergence before the oracle gets to see it.
    pub const MUTATING: [Self; 5] = [Self::Push, Self::Delete, Self::Move, Self::Undo, Self::Redo];

    pub const fn command(self) -> Command {
        match self {
            Self::Push => Command::Push,
            Self::Delete => Command::Delete,
            Self::Move => Command::Move,
            Self::Undo => Command::Undo,
            Self::Redo => Command::Redo,
            Self::Clear => Command::Clear,
        }
    }
}

/// Issues semantic mutations to sessions.
#[derive(Clone, Copy, Debug, Default)]
pub struct ActionDriver;

impl ActionDriver {
    /// Exactly one command dispatch.
    pub async fn apply(session: &Session, action: Action) -> EyreResult<()> {
        session.send_command(action.command()).await
    }
}

/// Single seedable source of every random choice a scenario makes.
#[derive(Debug)]
pub struct ActionPicker {
    seed: u64,
    rng: StdRng,
}

impl ActionPicker {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Draws a fresh seed from the thread RNG.
    pub fn from_entropy() -> Self {
        Self::new(rand::thread_rng().gen())
    }

    pub const fn seed(&self) -> u64 {
        self.seed
    }

    pub fn pick_random(&mut self) -> Action {
        *Action::MUTATING
            .choose(&mut self.rng)
            .unwrap_or(&Action::Push)
    }

    pub fn delay(&mut self, range_ms: &RangeInclusive<u64>) -> Duration {
        if range_ms.is_empty() {
            return Duration::from_millis(*range_ms.start());
        }
        Duration::from_millis(self.rng.gen_range(range_ms.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_map_to_page_commands() {
        let names: Vec<_> = [
            Action::Push,
            Action::Delete,
            Action::Move,
            Action::Undo,
            Action::Redo,
            Action::Clear,
        ]
        .into_iter()
        .map(|action| action.command().as_str())
        .collect();

        assert_eq!(
            names,
            ["push", "delete", "move", "undo", "redo", "clear"],
            "each action should trigger its namesake command"
        );
    }

    #[test]
    fn random_picks_never_clear() {
        let mut picker = ActionPicker::new(7);
        for _ in 0..1_000 {
            assert_ne!(picker.pick_random(), Action::Clear, "clear is not fuzzed");
        }
    }

    #[test]
    fn random_picks_cover_every_mutating_kind() {
        let mut picker = ActionPicker::new(11);
        let picked: Vec<_> = (0..500).map(|_| picker.pick_random()).collect();

        for kind in Action::MUTATING {
            assert!(picked.contains(&kind), "{kind:?} never picked");
        }
    }

    #[test]
    fn same_seed_replays_same_sequence() {
        let mut first = ActionPicker::new(42);
        let mut second = ActionPicker::new(42);

        let a: Vec<_> = (0..100).map(|_| first.pick_random()).collect();
        let b: Vec<_> = (0..100).map(|_| second.pick_random()).collect();

        assert_eq!(a, b, "seeded pickers must agree");
        assert_eq!(first.seed(), 42, "seed is kept for reporting");
    }

    #[test]
    fn delay_stays_in_range() {
        let mut picker = ActionPicker::new(3);
        for _ in 0..200 {
            let delay = picker.delay(&(30..=70));
            assert!(
                (30..=70).contains(&delay.as_millis()),
                "delay {delay:?} out of range"
            );
        }
        assert_eq!(
            picker.delay(&(50..=50)),
            Duration::from_millis(50),
            "degenerate range is fixed"
        );
    }
}
