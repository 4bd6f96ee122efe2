// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Operand resolution and read/write address folding.
//!
//! Resolution is where most of the ICWS'94 subtlety lives. Each operand
//! yields a read address, a write address, a snapshot of the cell it
//! designates and that cell's two field values. Pre-decrement and
//! post-increment touch the pointer cell through the *write*-folded
//! base, and post-increment bumps the pre-resolution base cell, never
//! the finally resolved one. Immediate operands designate the executing
//! instruction itself, and resolution reuses the register copy's field
//! slots to carry resolved values, which the immediate B-operand then
//! observes.

use super::memory::Core;
use crate::core::math::{add_mod, normalize};
use crate::redcode::{AddrMode, Instruction};

/// Fold `addr` into the window of `limit` cells around `pc`, or just
/// into the core when `limit` is zero (unlimited).
pub(crate) fn fold(addr: i64, pc: i32, core_size: i32, limit: i32) -> i32 {
    if limit == 0 {
        return normalize(addr, core_size);
    }
    let mut r = (addr + core_size as i64 - pc as i64) % limit as i64;
    if r > (limit / 2) as i64 {
        r += core_size as i64 - limit as i64;
    }
    add_mod(r as i32, pc, core_size)
}

/// A resolved operand: `addr` is where writes land, `raddr` where reads
/// come from (they differ only for the B-operand when the limits
/// differ), `instr` is the designated cell as read during resolution,
/// and `a`/`b` are its field values.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ResolvedOperand {
    pub addr: i32,
    pub raddr: i32,
    pub instr: Instruction,
    pub a: i32,
    pub b: i32,
}

fn decrement(value: i32, core_size: i32) -> i32 {
    if value == 0 {
        core_size - 1
    } else {
        value - 1
    }
}

fn increment(value: i32, core_size: i32) -> i32 {
    if value + 1 == core_size {
        0
    } else {
        value + 1
    }
}

/// Resolve the A-operand. Mutates `ir.a_value` to carry the operand's
/// B-field value (or, for immediate, the instruction's own B-field),
/// which later feeds an immediate B-operand.
pub(crate) fn resolve_a(
    core: &mut Core,
    pc: i32,
    ir: &mut Instruction,
    read_limit: i32,
    write_limit: i32,
) -> ResolvedOperand {
    let size = core.size();
    match ir.a_mode {
        AddrMode::Immediate => {
            let snapshot = *ir;
            let a = ir.a_value;
            let b = ir.b_value;
            ir.a_value = ir.b_value;
            ResolvedOperand {
                addr: pc,
                raddr: pc,
                instr: snapshot,
                a,
                b,
            }
        }
        AddrMode::Direct => {
            let raddr = fold(ir.a_value as i64 + pc as i64, pc, size, read_limit);
            let cell = core.peek(raddr);
            ir.a_value = cell.b_value;
            ResolvedOperand {
                addr: raddr,
                raddr,
                instr: cell,
                a: cell.a_value,
                b: cell.b_value,
            }
        }
        mode => {
            let raddr = fold(ir.a_value as i64 + pc as i64, pc, size, read_limit);
            let base = if mode.bumps_pointer() {
                fold(ir.a_value as i64 + pc as i64, pc, size, write_limit)
            } else {
                raddr
            };

            let mut pointer = {
                let cell = if mode.bumps_pointer() {
                    core.peek(base)
                } else {
                    core.get(raddr)
                };
                if mode.uses_a_pointer() {
                    cell.a_value
                } else {
                    cell.b_value
                }
            };

            if matches!(mode, AddrMode::APredecrement | AddrMode::BPredecrement) {
                let mut cell = core.peek(base);
                let field = if mode.uses_a_pointer() {
                    &mut cell.a_value
                } else {
                    &mut cell.b_value
                };
                *field = decrement(*field, size);
                pointer = *field;
                core.set(base, cell);
            }

            let addr = fold(pointer as i64 + base as i64, pc, size, read_limit);
            let cell = core.peek(addr);
            ir.a_value = cell.b_value;

            if matches!(mode, AddrMode::APostincrement | AddrMode::BPostincrement) {
                let mut pointer_cell = core.peek(base);
                let field = if mode.uses_a_pointer() {
                    &mut pointer_cell.a_value
                } else {
                    &mut pointer_cell.b_value
                };
                *field = increment(*field, size);
                core.set(base, pointer_cell);
            }

            ResolvedOperand {
                addr,
                raddr: addr,
                instr: cell,
                a: cell.a_value,
                b: cell.b_value,
            }
        }
    }
}

/// Resolve the B-operand, keeping separate read- and write-folded
/// addresses throughout so the two limits stay independent.
pub(crate) fn resolve_b(
    core: &mut Core,
    pc: i32,
    ir: &mut Instruction,
    read_limit: i32,
    write_limit: i32,
) -> ResolvedOperand {
    let size = core.size();
    match ir.b_mode {
        AddrMode::Immediate => {
            let snapshot = *ir;
            ResolvedOperand {
                addr: pc,
                raddr: pc,
                instr: snapshot,
                a: ir.a_value,
                b: ir.b_value,
            }
        }
        AddrMode::Direct => {
            let raddr = fold(ir.b_value as i64 + pc as i64, pc, size, read_limit);
            let addr = fold(ir.b_value as i64 + pc as i64, pc, size, write_limit);
            let cell = core.peek(raddr);
            ir.b_value = cell.b_value;
            ResolvedOperand {
                addr,
                raddr,
                instr: cell,
                a: cell.a_value,
                b: cell.b_value,
            }
        }
        mode => {
            let rbase = fold(ir.b_value as i64 + pc as i64, pc, size, read_limit);
            let wbase = fold(ir.b_value as i64 + pc as i64, pc, size, write_limit);
            let base = if mode.bumps_pointer() { wbase } else { rbase };

            let mut pointer = {
                let cell = if mode.bumps_pointer() {
                    core.peek(wbase)
                } else {
                    core.get(rbase)
                };
                if mode.uses_a_pointer() {
                    cell.a_value
                } else {
                    cell.b_value
                }
            };

            if matches!(mode, AddrMode::APredecrement | AddrMode::BPredecrement) {
                let mut cell = core.peek(wbase);
                let field = if mode.uses_a_pointer() {
                    &mut cell.a_value
                } else {
                    &mut cell.b_value
                };
                *field = decrement(*field, size);
                pointer = *field;
                core.set(wbase, cell);
            }

            let raddr = fold(pointer as i64 + base as i64, pc, size, read_limit);
            let addr = fold(pointer as i64 + base as i64, pc, size, write_limit);
            let cell = core.peek(raddr);
            ir.b_value = cell.b_value;

            if matches!(mode, AddrMode::APostincrement | AddrMode::BPostincrement) {
                // The bump lands on the saved pre-resolution base cell.
                let mut pointer_cell = core.peek(wbase);
                let field = if mode.uses_a_pointer() {
                    &mut pointer_cell.a_value
                } else {
                    &mut pointer_cell.b_value
                };
                *field = increment(*field, size);
                core.set(wbase, pointer_cell);
            }

            ResolvedOperand {
                addr,
                raddr,
                instr: cell,
                a: cell.a_value,
                b: cell.b_value,
            }
        }
    }
}
