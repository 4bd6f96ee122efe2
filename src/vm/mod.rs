// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! The MARS execution engine.
//!
//! A `Simulator` owns the core, the warriors' mutable state, their
//! P-spaces and the scheduling ring. Warriors are validated and cached
//! by `load_warriors`; each round is `setup_round` followed by `step`
//! until a `RoundResult` comes back. Scheduling is deterministic
//! round-robin over the alive ring with one task executed per visit.

mod dispatch;
pub mod event;
pub mod memory;
mod operand;
pub mod warrior;

use std::collections::HashMap;
use std::fmt;

use crate::assembler::CompileOptions;
use crate::core::math::{rng_next, sanitize_seed};
use crate::core::position;
use crate::core::pspace::{pspace_size, PSpace};
use crate::core::queue::TaskQueue;
use crate::redcode::WarriorData;

use dispatch::{dispatch, ExecCtx, Outcome};
use event::{CoreAccessEvent, EventListener, RoundEndEvent, TaskCountEvent};
use memory::Core;
use warrior::SimWarrior;

/// Hard ceiling on simultaneously loaded warriors.
pub const MAX_WARRIORS: usize = 36;

/// Simulator configuration. The same numbers, plus `seed` and the
/// position overrides, that the assembler sees as predefined constants.
#[derive(Debug, Clone)]
pub struct Options {
    pub core_size: i32,
    pub max_cycles: i32,
    pub max_length: usize,
    pub max_processes: usize,
    pub min_separation: i32,
    pub read_limit: i32,
    pub write_limit: i32,
    pub rounds: usize,
    pub p_space_size: usize,
    pub warriors: usize,
    pub seed: Option<i32>,
    pub fixed_series: bool,
    pub fixed_position: Option<i32>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            core_size: 8000,
            max_cycles: 80_000,
            max_length: 100,
            max_processes: 8000,
            min_separation: 100,
            read_limit: 0,
            write_limit: 0,
            rounds: 1,
            p_space_size: 0,
            warriors: 2,
            seed: None,
            fixed_series: false,
            fixed_position: None,
        }
    }
}

impl Options {
    /// The assembler-facing view of these options.
    pub fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            core_size: self.core_size,
            max_cycles: self.max_cycles,
            max_length: self.max_length,
            max_processes: self.max_processes,
            min_separation: self.min_separation,
            read_limit: self.read_limit,
            write_limit: self.write_limit,
            p_space_size: self.p_space_size,
            warriors: self.warriors,
            rounds: self.rounds,
        }
    }
}

/// Configuration problems reported by `load_warriors`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    NoWarriors,
    TooManyWarriors(usize),
    ConflictingPositionOptions,
    FixedPositionTooClose { fixed: i32, min_separation: i32 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoWarriors => write!(f, "no warriors loaded"),
            Self::TooManyWarriors(n) => {
                write!(f, "{n} warriors loaded, the maximum is {MAX_WARRIORS}")
            }
            Self::ConflictingPositionOptions => {
                write!(f, "fixed_series and fixed_position are mutually exclusive")
            }
            Self::FixedPositionTooClose {
                fixed,
                min_separation,
            } => write!(
                f,
                "fixed position {fixed} is closer than the minimum separation {min_separation}"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundOutcome {
    Win,
    Tie,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundResult {
    pub winner_id: Option<usize>,
    pub outcome: RoundOutcome,
}

pub struct Simulator {
    options: Options,
    /// Effective separation after the `load_warriors` adjustments.
    min_separation: i32,
    p_space_size: usize,
    core: Core,
    images: Vec<WarriorData>,
    warriors: Vec<SimWarrior>,
    pspaces: Vec<PSpace>,
    listener: Option<Box<dyn EventListener>>,
    round: usize,
    seed: Option<i32>,
    round_active: bool,
    current: usize,
    warriors_left: usize,
    cycle: i64,
    next_ring: Vec<usize>,
    prev_ring: Vec<usize>,
}

impl Simulator {
    pub fn new(options: Options) -> Self {
        let core = Core::new(options.core_size);
        let min_separation = options.min_separation;
        Self {
            options,
            min_separation,
            p_space_size: 0,
            core,
            images: Vec::new(),
            warriors: Vec::new(),
            pspaces: Vec::new(),
            listener: None,
            round: 0,
            seed: None,
            round_active: false,
            current: 0,
            warriors_left: 0,
            cycle: 0,
            next_ring: Vec::new(),
            prev_ring: Vec::new(),
        }
    }

    pub fn set_event_listener(&mut self, listener: Option<Box<dyn EventListener>>) {
        self.listener = listener;
    }

    pub fn get_core(&self) -> &Core {
        &self.core
    }

    pub fn get_warriors(&self) -> &[SimWarrior] {
        &self.warriors
    }

    pub fn round(&self) -> usize {
        self.round
    }

    /// Validate and cache warrior images, building the per-warrior
    /// state and (possibly shared) P-spaces.
    pub fn load_warriors(&mut self, warriors: Vec<WarriorData>) -> Result<(), ConfigError> {
        let n = warriors.len();
        if n == 0 {
            return Err(ConfigError::NoWarriors);
        }
        if n > MAX_WARRIORS {
            return Err(ConfigError::TooManyWarriors(n));
        }
        if self.options.fixed_series && self.options.fixed_position.is_some() {
            return Err(ConfigError::ConflictingPositionOptions);
        }

        let mut min_separation = self.options.min_separation;
        if min_separation < self.options.max_length as i32 {
            min_separation = self.options.max_length as i32;
        }
        if self.options.core_size < n as i32 * min_separation {
            min_separation = self.options.core_size / n as i32;
        }
        if let Some(fixed) = self.options.fixed_position {
            if fixed < min_separation {
                return Err(ConfigError::FixedPositionTooClose {
                    fixed,
                    min_separation,
                });
            }
        }
        self.min_separation = min_separation;

        self.p_space_size = if self.options.p_space_size == 0 {
            pspace_size(self.options.core_size)
        } else {
            self.options.p_space_size
        };

        self.pspaces.clear();
        self.warriors.clear();
        let mut pin_spaces: HashMap<i32, usize> = HashMap::new();
        for (id, image) in warriors.iter().enumerate() {
            let p_space_index = match image.pin {
                Some(pin) => *pin_spaces.entry(pin).or_insert_with(|| {
                    self.pspaces
                        .push(PSpace::new(self.p_space_size, self.options.core_size));
                    self.pspaces.len() - 1
                }),
                None => {
                    self.pspaces
                        .push(PSpace::new(self.p_space_size, self.options.core_size));
                    self.pspaces.len() - 1
                }
            };
            self.warriors.push(SimWarrior {
                id,
                name: image.name.clone(),
                author: image.author.clone(),
                queue: TaskQueue::with_capacity(self.options.max_processes + 1),
                position: 0,
                start_offset: image.start_offset,
                tasks: 0,
                score: vec![0; 2 * n - 1],
                last_result: self.options.core_size - 1,
                p_space_index,
                p_space_id: image.pin.unwrap_or(id as i32),
                alive: false,
            });
        }

        self.images = warriors;
        self.round = 0;
        self.seed = None;
        self.round_active = false;
        Ok(())
    }

    /// Prepare a fresh round: clear the core, choose or advance the
    /// seed, place and load the warriors, rebuild the scheduling ring.
    pub fn setup_round(&mut self) {
        let n = self.warriors.len();
        self.core.clear();
        self.round += 1;

        if self.options.fixed_series || self.seed.is_none() {
            let seed = match self.options.seed {
                Some(seed) => sanitize_seed(seed),
                None => self.checksum_seed(),
            };
            self.seed = Some(seed);
        }

        let positions = match (self.options.fixed_position, n) {
            (Some(fixed), 2) => vec![0, fixed],
            _ => {
                let placement = position::place(
                    n,
                    self.options.core_size,
                    self.min_separation,
                    self.seed.unwrap_or(1),
                );
                self.seed = Some(placement.seed);
                placement.positions
            }
        };

        for (idx, warrior) in self.warriors.iter_mut().enumerate() {
            warrior.position = positions[idx];
            warrior.queue.clear();
            let entry = self
                .core
                .wrap(warrior.position as i64 + warrior.start_offset as i64);
            warrior.queue.push(entry);
            warrior.tasks = 1;
            warrior.alive = true;
            self.core
                .load_instructions(&self.images[idx].instructions, warrior.position);
        }

        self.current = (self.round - 1) % n;
        self.warriors_left = n;
        self.cycle = n as i64 * self.options.max_cycles as i64;
        self.next_ring = (0..n).map(|i| (i + 1) % n).collect();
        self.prev_ring = (0..n).map(|i| (i + n - 1) % n).collect();
        self.round_active = true;
    }

    /// Execute one cycle. Returns the round result exactly when the
    /// round terminates, `None` otherwise.
    pub fn step(&mut self) -> Option<RoundResult> {
        if !self.round_active {
            return None;
        }
        if self.cycle <= 0 || self.warriors_left < 2 {
            return Some(self.end_round());
        }
        let current = self.current;
        let warrior_died = self.execute_cycle(current);
        if !warrior_died {
            self.current = self.next_ring[current];
            self.cycle -= 1;
        }
        None
    }

    /// Run complete rounds (defaulting to the configured count) and
    /// collect their results.
    pub fn run(&mut self, rounds: Option<usize>) -> Vec<RoundResult> {
        let rounds = rounds.unwrap_or(self.options.rounds);
        let mut results = Vec::with_capacity(rounds);
        for _ in 0..rounds {
            self.setup_round();
            loop {
                if let Some(result) = self.step() {
                    results.push(result);
                    break;
                }
            }
        }
        results
    }

    /// Finalize the running round: scores, last results, P-space
    /// mirroring, and the ROUND_END event.
    pub fn end_round(&mut self) -> RoundResult {
        let alive: Vec<usize> = self
            .warriors
            .iter()
            .filter(|w| w.alive)
            .map(|w| w.id)
            .collect();
        let winner_id = (alive.len() == 1).then(|| alive[0]);

        if self.round_active {
            let survivors = self.warriors_left;
            for idx in 0..self.warriors.len() {
                if self.warriors[idx].alive {
                    self.warriors[idx].score[survivors - 1] += 1;
                    self.warriors[idx].last_result = survivors as i32;
                    let pspace_index = self.warriors[idx].p_space_index;
                    self.pspaces[pspace_index].last_result = survivors as i32;
                } else {
                    self.warriors[idx].last_result = 0;
                }
            }
            self.round_active = false;
            if let Some(listener) = self.listener.as_mut() {
                listener.on_round_end(&RoundEndEvent { winner_id });
            }
        }

        RoundResult {
            winner_id,
            outcome: if winner_id.is_some() {
                RoundOutcome::Win
            } else {
                RoundOutcome::Tie
            },
        }
    }

    /// Deterministic seed from the loaded warriors: every instruction
    /// field XORed with an increasing shuffle counter, accumulated in
    /// wrapping 32-bit arithmetic, then one RNG step.
    fn checksum_seed(&self) -> i32 {
        let mut checksum: i32 = 0;
        let mut shuffle: i32 = 0;
        for image in &self.images {
            for instr in &image.instructions {
                for field in [
                    instr.op_field(),
                    instr.a_mode as i32,
                    instr.b_mode as i32,
                    instr.a_value,
                    instr.b_value,
                ] {
                    checksum = checksum.wrapping_add(field ^ shuffle);
                    shuffle = shuffle.wrapping_add(1);
                }
            }
        }
        rng_next(sanitize_seed(checksum))
    }

    /// One warrior's cycle: fetch, resolve, dispatch, bookkeep.
    /// Returns true when the warrior itself died (the scheduler state
    /// was then already advanced past it).
    fn execute_cycle(&mut self, w_idx: usize) -> bool {
        let read_limit = self.options.read_limit;
        let write_limit = self.options.write_limit;
        let max_processes = self.options.max_processes;

        let Some(pc) = self.warriors[w_idx].queue.pop() else {
            return self.retire_task(w_idx);
        };

        let mut ir = self.core.execute_at(pc);
        let a = operand::resolve_a(&mut self.core, pc, &mut ir, read_limit, write_limit);
        let b = operand::resolve_b(&mut self.core, pc, &mut ir, read_limit, write_limit);

        let outcome = {
            let warrior = &mut self.warriors[w_idx];
            let mut ctx = ExecCtx {
                core: &mut self.core,
                pspace: &mut self.pspaces[warrior.p_space_index],
                warrior_last_result: &mut warrior.last_result,
                tasks: warrior.tasks,
                max_processes,
            };
            dispatch(&mut ctx, &ir, &a, &b, pc)
        };

        let warrior_died = match outcome {
            Outcome::Continue(next) => {
                self.warriors[w_idx].queue.push(next);
                false
            }
            Outcome::Split { next, split } => {
                self.warriors[w_idx].queue.push(next);
                if let Some(addr) = split {
                    self.warriors[w_idx].tasks += 1;
                    self.warriors[w_idx].queue.push(addr);
                }
                false
            }
            Outcome::Die => self.retire_task(w_idx),
        };

        self.flush_events(w_idx);
        warrior_died
    }

    /// The executing task died. When it was the warrior's last, remove
    /// the warrior from the ring, credit its placement score, and give
    /// back this cycle's share of the schedule to the survivors.
    fn retire_task(&mut self, w_idx: usize) -> bool {
        let n = self.warriors.len();
        {
            let warrior = &mut self.warriors[w_idx];
            warrior.tasks = warrior.tasks.saturating_sub(1);
            if warrior.tasks > 0 {
                return false;
            }
            warrior.alive = false;
            warrior.score[self.warriors_left + n - 2] += 1;
        }
        let survivors = self.warriors_left as i64;
        self.cycle = self.cycle - 1 - (self.cycle - 1) / survivors;
        self.warriors_left -= 1;

        let next = self.next_ring[w_idx];
        let prev = self.prev_ring[w_idx];
        self.next_ring[prev] = next;
        self.prev_ring[next] = prev;
        self.current = next;
        true
    }

    fn flush_events(&mut self, w_idx: usize) {
        let accesses = self.core.drain_tape();
        if let Some(listener) = self.listener.as_mut() {
            for (address, access_type) in accesses {
                listener.on_core_access(&CoreAccessEvent {
                    warrior_id: w_idx,
                    address,
                    access_type,
                });
            }
            for warrior in &self.warriors {
                if warrior.alive {
                    listener.on_task_count(&TaskCountEvent {
                        warrior_id: warrior.id,
                        task_count: warrior.tasks,
                    });
                }
            }
        }
    }
}
