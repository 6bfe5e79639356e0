use std::collections::BTreeMap;

use tracing::{debug, info, trace};

use crate::{
    EntityId, Position,
    agent::{Adventurer, AdventurerState, MovementPolicy},
    config::{ConfigError, SimulationConfig},
    dungeon::{Dungeon, Hazard},
    pathfinding::{CostJitter, GridPathfinder, NoJitter, RiskAffinity, SeededJitter},
};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimulationError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Something that happened during a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimEvent {
    Moved {
        adventurer: EntityId,
        from: Position,
        to: Position,
    },
    LureCollected {
        adventurer: EntityId,
        at: Position,
        strength: u8,
    },
    TrapTriggered {
        adventurer: EntityId,
        at: Position,
        damage: u32,
    },
    TrapRearmed {
        at: Position,
    },
    /// A living monster shares a cell with the adventurer; resolving the
    /// fight is left to the caller.
    MonsterEncountered {
        adventurer: EntityId,
        at: Position,
    },
    Escaped {
        adventurer: EntityId,
    },
    Slain {
        adventurer: EntityId,
        at: Position,
    },
}

/// Everything that happened during one call to [`Simulation::process_tick`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    /// Whether adventurers re-evaluated their targets and moved this tick.
    pub decision_tick: bool,
    pub events: Vec<SimEvent>,
}

/// A trap waiting to be re-armed.
#[derive(Debug, Clone, Copy)]
struct Rearm {
    at_tick: u64,
    position: Position,
}

/// The tick-driven dungeon run: one clock advancing every adventurer.
pub struct Simulation {
    dungeon: Dungeon,
    adventurers: BTreeMap<EntityId, Adventurer>,
    pathfinder: GridPathfinder<Box<dyn CostJitter>>,
    policy: MovementPolicy,
    config: SimulationConfig,
    pending_rearms: Vec<Rearm>,
    tick: u64,
    next_entity_id: EntityId,
}

impl Simulation {
    /// Creates a simulation over `dungeon`.
    ///
    /// A zero `max_jitter` gives a fully reproducible run for a given seed.
    pub fn new(dungeon: Dungeon, config: SimulationConfig) -> Result<Self, SimulationError> {
        config.validate()?;
        let seed = config.resolve_seed();
        let jitter: Box<dyn CostJitter> = if config.max_jitter > 0.0 {
            Box::new(SeededJitter::with_max(seed, config.max_jitter))
        } else {
            Box::new(NoJitter)
        };
        info!(
            seed,
            width = dungeon.width(),
            height = dungeon.height(),
            "simulation created"
        );
        Ok(Self {
            pathfinder: GridPathfinder::with_jitter(config.hazard_costs, jitter),
            policy: MovementPolicy::new(
                seed.wrapping_add(1),
                config.lure_interest_threshold,
            ),
            dungeon,
            adventurers: BTreeMap::new(),
            config,
            pending_rearms: Vec::new(),
            tick: 0,
            next_entity_id: 0,
        })
    }

    pub fn dungeon(&self) -> &Dungeon {
        &self.dungeon
    }

    /// Mutable access for placing or removing hazards and lures between ticks.
    pub fn dungeon_mut(&mut self) -> &mut Dungeon {
        &mut self.dungeon
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn adventurers(&self) -> impl Iterator<Item = &Adventurer> {
        self.adventurers.values()
    }

    pub fn adventurer(&self, id: EntityId) -> Option<&Adventurer> {
        self.adventurers.get(&id)
    }

    /// True once at least one adventurer has entered and none is still inside.
    pub fn is_finished(&self) -> bool {
        !self.adventurers.is_empty() && self.adventurers.values().all(|a| !a.is_exploring())
    }

    /// Places a new adventurer on the entrance.
    pub fn spawn_adventurer(&mut self, risk_affinity: RiskAffinity) -> EntityId {
        let id = self.next_entity_id;
        self.next_entity_id += 1;
        let entrance = self.dungeon.entrance();
        self.adventurers.insert(
            id,
            Adventurer::new(id, entrance, risk_affinity, self.config.adventurer_health),
        );
        info!(adventurer = id, risk = risk_affinity.get(), %entrance, "adventurer entered");
        id
    }

    /// Advances the clock by one tick.
    ///
    /// Traps whose cool-down has elapsed are re-armed every tick. On ticks that
    /// are a multiple of the decision cadence, every exploring adventurer (in
    /// id order) picks a target, takes one step toward it and deals with
    /// whatever it finds there.
    pub fn process_tick(&mut self) -> TickReport {
        self.tick += 1;
        let mut report = TickReport {
            tick: self.tick,
            decision_tick: self.tick % self.config.decision_cadence == 0,
            events: Vec::new(),
        };

        self.rearm_traps(&mut report.events);

        if report.decision_tick {
            let ids: Vec<EntityId> = self
                .adventurers
                .values()
                .filter(|a| a.is_exploring())
                .map(|a| a.id)
                .collect();
            for id in ids {
                self.advance_adventurer(id, &mut report.events);
            }
        }

        trace!(tick = self.tick, events = report.events.len(), "tick processed");
        report
    }

    fn rearm_traps(&mut self, events: &mut Vec<SimEvent>) {
        let tick = self.tick;
        let (due, waiting): (Vec<Rearm>, Vec<Rearm>) = self
            .pending_rearms
            .drain(..)
            .partition(|rearm| rearm.at_tick <= tick);
        self.pending_rearms = waiting;
        for rearm in due {
            // The trap may have been removed while it was disarmed.
            if self.dungeon.set_trap_active(rearm.position, true).is_ok() {
                events.push(SimEvent::TrapRearmed { at: rearm.position });
            }
        }
    }

    fn advance_adventurer(&mut self, id: EntityId, events: &mut Vec<SimEvent>) {
        let Some(adventurer) = self.adventurers.get_mut(&id) else {
            return;
        };

        let target = self.policy.choose_target(adventurer, &self.dungeon);
        let from = adventurer.position;
        // Committing to the lure underfoot is arrival; collecting it uses the turn.
        if adventurer.lure_target == Some(from) {
            collect_lure(&mut self.dungeon, adventurer, events);
            return;
        }
        let Some(to) =
            self.pathfinder
                .next_step(&self.dungeon, from, target, adventurer.risk_affinity)
        else {
            debug!(adventurer = id, %from, "no step available");
            return;
        };

        adventurer.position = to;
        events.push(SimEvent::Moved {
            adventurer: id,
            from,
            to,
        });

        if adventurer.lure_target == Some(to) {
            collect_lure(&mut self.dungeon, adventurer, events);
        }

        match self.dungeon.cell(to).and_then(|cell| cell.hazard) {
            Some(Hazard::Trap {
                damage,
                active: true,
            }) => {
                adventurer.health = adventurer.health.saturating_sub_unsigned(damage);
                events.push(SimEvent::TrapTriggered {
                    adventurer: id,
                    at: to,
                    damage,
                });
                if self.dungeon.set_trap_active(to, false).is_ok() {
                    self.pending_rearms.push(Rearm {
                        at_tick: self.tick.saturating_add(self.config.trap_rearm_ticks),
                        position: to,
                    });
                }
                if adventurer.health <= 0 {
                    adventurer.state = AdventurerState::Slain;
                    info!(adventurer = id, at = %to, "adventurer slain");
                    events.push(SimEvent::Slain {
                        adventurer: id,
                        at: to,
                    });
                    return;
                }
            }
            Some(Hazard::Monster { alive: true }) => {
                events.push(SimEvent::MonsterEncountered {
                    adventurer: id,
                    at: to,
                });
            }
            _ => {}
        }

        if to == self.dungeon.exit() {
            adventurer.state = AdventurerState::Escaped;
            info!(adventurer = id, "adventurer escaped");
            events.push(SimEvent::Escaped { adventurer: id });
        }
    }
}

/// Removes the lure under `adventurer` and clears its commitment.
fn collect_lure(dungeon: &mut Dungeon, adventurer: &mut Adventurer, events: &mut Vec<SimEvent>) {
    let at = adventurer.position;
    adventurer.lure_target = None;
    if let Some(lure) = dungeon.take_lure(at) {
        info!(adventurer = adventurer.id, %at, strength = lure.strength(), "lure collected");
        events.push(SimEvent::LureCollected {
            adventurer: adventurer.id,
            at,
            strength: lure.strength(),
        });
    }
}
