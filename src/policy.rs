//! Tick outcome policies.
//!
//! A tick asks the policy what happens to one active entry. Production uses
//! [`RandomTickPolicy`]; tests drive the engine with [`ScriptedTickPolicy`].

use std::collections::VecDeque;
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::SimulationConfig;
use crate::model::WaitlistEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing changes.
    Hold,
    /// Move up `positions` places and shave `minutes` off the estimate.
    Advance { positions: u32, minutes: u32 },
    /// A table opened at `preferred_times[slot % len]`.
    Promote { slot: usize },
}

pub trait TickPolicy: Send + Sync {
    fn decide(&self, entry: &WaitlistEntry) -> TickOutcome;
}

pub struct RandomTickPolicy {
    change_probability: f64,
    promote_share: f64,
    max_position_step: u32,
    max_wait_step: u32,
    rng: Mutex<StdRng>,
}

impl RandomTickPolicy {
    pub fn new(config: &SimulationConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Reproducible sequence of outcomes for a given seed.
    pub fn seeded(config: &SimulationConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: &SimulationConfig, rng: StdRng) -> Self {
        let defaults = SimulationConfig::default();
        Self {
            change_probability: probability(config.change_probability, defaults.change_probability),
            promote_share: probability(config.promote_share, defaults.promote_share),
            max_position_step: config.max_position_step,
            max_wait_step: config.max_wait_step,
            rng: Mutex::new(rng),
        }
    }
}

/// `gen_bool` panics outside `0.0..=1.0`, NaN included.
fn probability(p: f64, fallback: f64) -> f64 {
    if p.is_finite() { p.clamp(0.0, 1.0) } else { fallback }
}

impl TickPolicy for RandomTickPolicy {
    fn decide(&self, entry: &WaitlistEntry) -> TickOutcome {
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !rng.gen_bool(self.change_probability) {
            return TickOutcome::Hold;
        }
        if rng.gen_bool(self.promote_share) && !entry.preferred_times.is_empty() {
            TickOutcome::Promote {
                slot: rng.gen_range(0..entry.preferred_times.len()),
            }
        } else {
            TickOutcome::Advance {
                positions: rng.gen_range(0..=self.max_position_step),
                minutes: rng.gen_range(0..=self.max_wait_step),
            }
        }
    }
}

/// Replays a fixed sequence of outcomes, then holds forever.
#[derive(Default)]
pub struct ScriptedTickPolicy {
    script: Mutex<VecDeque<TickOutcome>>,
}

impl ScriptedTickPolicy {
    pub fn new(outcomes: impl IntoIterator<Item = TickOutcome>) -> Self {
        Self {
            script: Mutex::new(outcomes.into_iter().collect()),
        }
    }

    pub fn push(&self, outcome: TickOutcome) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(outcome);
        }
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().map(|s| s.len()).unwrap_or(0)
    }
}

impl TickPolicy for ScriptedTickPolicy {
    fn decide(&self, _entry: &WaitlistEntry) -> TickOutcome {
        self.script
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or(TickOutcome::Hold)
    }
}
