//! Typed simulation settings, loaded once at startup and read-only afterwards.

use serde::{Deserialize, Serialize};

/// Penalties applied to cells holding a live monster or an active trap.
///
/// The effective cost of entering such a cell is
/// `max(1, penalty * (1 - risk_affinity))`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HazardCosts {
    pub monster_penalty: f64,
    pub trap_penalty: f64,
}

impl HazardCosts {
    pub const DEFAULT_MONSTER_PENALTY: f64 = 5.0;
    pub const DEFAULT_TRAP_PENALTY: f64 = 3.0;
}

impl Default for HazardCosts {
    fn default() -> Self {
        Self {
            monster_penalty: Self::DEFAULT_MONSTER_PENALTY,
            trap_penalty: Self::DEFAULT_TRAP_PENALTY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("decision_cadence must be at least 1")]
    ZeroCadence,
    #[error("lure_interest_threshold {0} must lie within [0, 1]")]
    ThresholdOutOfRange(f64),
    #[error("hazard penalty {0} must be a finite value of at least 1")]
    InvalidPenalty(f64),
    #[error("max_jitter {0} must be a finite, non-negative value")]
    InvalidJitter(f64),
    #[error("adventurer_health {0} must be positive")]
    InvalidHealth(i32),
}

/// Tunables for the tick-driven dungeon simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Adventurers re-evaluate and move on every tick that is a multiple of this.
    pub decision_cadence: u64,
    /// Adventurers with a risk affinity strictly above this consider lures.
    pub lure_interest_threshold: f64,
    pub hazard_costs: HazardCosts,
    /// Upper bound (exclusive) of the per-edge route jitter. Zero disables it.
    pub max_jitter: f64,
    /// Damage dealt by traps parsed from a layout.
    pub trap_damage: u32,
    /// Ticks a triggered trap stays disarmed.
    pub trap_rearm_ticks: u64,
    pub adventurer_health: i32,
    /// Seed for every random source in the simulation; `None` draws one from entropy.
    pub seed: Option<u64>,
}

impl SimulationConfig {
    pub const DEFAULT_DECISION_CADENCE: u64 = 5;
    pub const DEFAULT_LURE_INTEREST_THRESHOLD: f64 = 0.4;
    pub const DEFAULT_MAX_JITTER: f64 = 0.5;
    pub const DEFAULT_TRAP_DAMAGE: u32 = 3;
    pub const DEFAULT_TRAP_REARM_TICKS: u64 = 20;
    pub const DEFAULT_ADVENTURER_HEALTH: i32 = 10;

    /// Checks every field for a usable value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.decision_cadence == 0 {
            return Err(ConfigError::ZeroCadence);
        }
        if !(0.0..=1.0).contains(&self.lure_interest_threshold) {
            return Err(ConfigError::ThresholdOutOfRange(
                self.lure_interest_threshold,
            ));
        }
        for penalty in [
            self.hazard_costs.monster_penalty,
            self.hazard_costs.trap_penalty,
        ] {
            if !penalty.is_finite() || penalty < 1.0 {
                return Err(ConfigError::InvalidPenalty(penalty));
            }
        }
        if !self.max_jitter.is_finite() || self.max_jitter < 0.0 {
            return Err(ConfigError::InvalidJitter(self.max_jitter));
        }
        if self.adventurer_health <= 0 {
            return Err(ConfigError::InvalidHealth(self.adventurer_health));
        }
        Ok(())
    }

    /// Returns the configured seed, or a fresh one from the thread RNG.
    pub fn resolve_seed(&self) -> u64 {
        self.seed.unwrap_or_else(rand::random)
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            decision_cadence: Self::DEFAULT_DECISION_CADENCE,
            lure_interest_threshold: Self::DEFAULT_LURE_INTEREST_THRESHOLD,
            hazard_costs: HazardCosts::default(),
            max_jitter: Self::DEFAULT_MAX_JITTER,
            trap_damage: Self::DEFAULT_TRAP_DAMAGE,
            trap_rearm_ticks: Self::DEFAULT_TRAP_REARM_TICKS,
            adventurer_health: Self::DEFAULT_ADVENTURER_HEALTH,
            seed: None,
        }
    }
}
