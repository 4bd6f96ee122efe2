// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Per-warrior simulation state.

use crate::core::queue::TaskQueue;

/// Mutable warrior state. Created once by `load_warriors`; the
/// per-round fields are reset by `setup_round`, while `score` and
/// `last_result` persist across rounds (scores accumulate, and
/// `last_result` is what P-space slot 0 reads).
#[derive(Debug)]
pub struct SimWarrior {
    pub id: usize,
    pub name: String,
    pub author: String,
    /// FIFO of live program counters; capacity `max_processes + 1`.
    pub queue: TaskQueue,
    /// Load address chosen by positioning this round.
    pub position: i32,
    pub start_offset: i32,
    /// Live task count. Invariant: `alive == (tasks > 0)` while a round
    /// is running.
    pub tasks: usize,
    /// `score[k]` counts rounds finished with this warrior in state
    /// `k`: index `survivors - 1` for warriors alive at round end,
    /// `survivors + n - 2` for a warrior that died with `survivors`
    /// warriors still in play.
    pub score: Vec<u32>,
    /// Outcome of the warrior's last finished round; read and written
    /// by LDP/STP at reduced P-space index 0.
    pub last_result: i32,
    /// Which P-space this warrior uses (warriors sharing a PIN alias
    /// the same index).
    pub p_space_index: usize,
    /// The warrior's PIN, or its id when no PIN was declared.
    pub p_space_id: i32,
    pub alive: bool,
}
