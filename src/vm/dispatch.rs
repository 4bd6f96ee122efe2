// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Opcode semantics: the 19-opcode by 7-modifier dispatch table.
//!
//! Dispatch is a two-level match over tagged enums. Writes land at the
//! B-operand's write address; arithmetic is modular on the core size;
//! division is truncated and a zero divisor kills the task after the
//! other field pair (if any) was still attempted.

use super::memory::Core;
use super::operand::ResolvedOperand;
use crate::core::math::{add_mod, mul_mod, sub_mod};
use crate::core::pspace::PSpace;
use crate::redcode::{Instruction, Modifier, Opcode};

/// What one executed instruction asks of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// Push this program counter (sequential, skip, or jump target).
    Continue(i32),
    /// SPL: push `next`, then `split` if the process limit allows.
    Split { next: i32, split: Option<i32> },
    /// The executing task dies.
    Die,
}

/// Execution context for one cycle: the core plus the executing
/// warrior's P-space view. Reduced index 0 aliases the *warrior's*
/// last-result slot, not the P-space object's.
pub(crate) struct ExecCtx<'a> {
    pub core: &'a mut Core,
    pub pspace: &'a mut PSpace,
    pub warrior_last_result: &'a mut i32,
    pub tasks: usize,
    pub max_processes: usize,
}

impl ExecCtx<'_> {
    fn pget(&self, index: i32) -> i32 {
        if index.rem_euclid(self.pspace.size() as i32) == 0 {
            *self.warrior_last_result
        } else {
            self.pspace.get(index)
        }
    }

    fn pset(&mut self, index: i32, value: i32) {
        if index.rem_euclid(self.pspace.size() as i32) == 0 {
            *self.warrior_last_result = value;
        } else {
            self.pspace.set(index, value);
        }
    }
}

pub(crate) fn dispatch(
    ctx: &mut ExecCtx<'_>,
    ir: &Instruction,
    a: &ResolvedOperand,
    b: &ResolvedOperand,
    pc: i32,
) -> Outcome {
    let size = ctx.core.size();
    let next = add_mod(pc, 1, size);
    let skip = add_mod(pc, 2, size);
    let modifier = ir.modifier;
    // Operand value shorthand per the ICWS'94 transcription: the
    // A-operand contributes (aa, av), the B-operand (ab, bv).
    let (aa, av, ab, bv) = (a.a, a.b, b.a, b.b);

    match ir.opcode {
        Opcode::Mov => {
            let mut dst = ctx.core.peek(b.addr);
            match modifier {
                Modifier::A => dst.a_value = aa,
                Modifier::B => dst.b_value = av,
                Modifier::AB => dst.b_value = aa,
                Modifier::BA => dst.a_value = av,
                Modifier::F => {
                    dst.a_value = aa;
                    dst.b_value = av;
                }
                Modifier::X => {
                    dst.b_value = aa;
                    dst.a_value = av;
                }
                Modifier::I => {
                    dst = a.instr;
                    dst.a_value = aa;
                    dst.b_value = av;
                }
            }
            ctx.core.set(b.addr, dst);
            Outcome::Continue(next)
        }

        Opcode::Add => arith(ctx, b.addr, modifier, aa, av, ab, bv, next, |x, y| {
            add_mod(x, y, size)
        }),
        Opcode::Sub => arith(ctx, b.addr, modifier, aa, av, ab, bv, next, |x, y| {
            sub_mod(x, y, size)
        }),
        Opcode::Mul => arith(ctx, b.addr, modifier, aa, av, ab, bv, next, |x, y| {
            mul_mod(x, y, size)
        }),

        Opcode::Div => divide(ctx, b.addr, modifier, aa, av, ab, bv, next, |x, y| x / y),
        Opcode::Mod => divide(ctx, b.addr, modifier, aa, av, ab, bv, next, |x, y| x % y),

        Opcode::Jmp => Outcome::Continue(a.addr),

        Opcode::Jmz => {
            let taken = match modifier {
                Modifier::A | Modifier::BA => ab == 0,
                Modifier::B | Modifier::AB => bv == 0,
                Modifier::F | Modifier::X | Modifier::I => ab == 0 && bv == 0,
            };
            Outcome::Continue(if taken { a.addr } else { next })
        }

        Opcode::Jmn => {
            let taken = match modifier {
                Modifier::A | Modifier::BA => ab != 0,
                Modifier::B | Modifier::AB => bv != 0,
                Modifier::F | Modifier::X | Modifier::I => ab != 0 || bv != 0,
            };
            Outcome::Continue(if taken { a.addr } else { next })
        }

        Opcode::Djn => {
            let mut dst = ctx.core.peek(b.addr);
            match modifier {
                Modifier::A | Modifier::BA => {
                    dst.a_value = sub_mod(dst.a_value, 1, size);
                }
                Modifier::B | Modifier::AB => {
                    dst.b_value = sub_mod(dst.b_value, 1, size);
                }
                Modifier::F | Modifier::X | Modifier::I => {
                    dst.a_value = sub_mod(dst.a_value, 1, size);
                    dst.b_value = sub_mod(dst.b_value, 1, size);
                }
            }
            ctx.core.set(b.addr, dst);
            let taken = match modifier {
                Modifier::A | Modifier::BA => dst.a_value != 0,
                Modifier::B | Modifier::AB => dst.b_value != 0,
                Modifier::F | Modifier::X | Modifier::I => {
                    dst.a_value != 0 || dst.b_value != 0
                }
            };
            Outcome::Continue(if taken { a.addr } else { next })
        }

        Opcode::Seq | Opcode::Sne => {
            let equal = match modifier {
                Modifier::A => aa == ab,
                Modifier::B => av == bv,
                Modifier::AB => aa == bv,
                Modifier::BA => av == ab,
                Modifier::F => aa == ab && av == bv,
                Modifier::X => aa == bv && av == ab,
                // Whole-instruction equality: opcode, both modes and
                // both field values. The modifier does not participate.
                Modifier::I => {
                    a.instr.opcode == b.instr.opcode
                        && a.instr.a_mode == b.instr.a_mode
                        && a.instr.b_mode == b.instr.b_mode
                        && a.instr.a_value == b.instr.a_value
                        && a.instr.b_value == b.instr.b_value
                }
            };
            let skip_taken = if ir.opcode == Opcode::Seq { equal } else { !equal };
            Outcome::Continue(if skip_taken { skip } else { next })
        }

        Opcode::Slt => {
            let less = match modifier {
                Modifier::A => aa < ab,
                Modifier::B => av < bv,
                Modifier::AB => aa < bv,
                Modifier::BA => av < ab,
                Modifier::F | Modifier::I => aa < ab && av < bv,
                Modifier::X => aa < bv && av < ab,
            };
            Outcome::Continue(if less { skip } else { next })
        }

        Opcode::Spl => Outcome::Split {
            next,
            split: (ctx.tasks < ctx.max_processes).then_some(a.addr),
        },

        Opcode::Dat => Outcome::Die,

        Opcode::Nop => Outcome::Continue(next),

        Opcode::Ldp => {
            let mut dst = ctx.core.peek(b.addr);
            match modifier {
                Modifier::A => dst.a_value = ctx.pget(aa),
                Modifier::AB => dst.b_value = ctx.pget(aa),
                Modifier::BA => dst.a_value = ctx.pget(av),
                Modifier::B | Modifier::F | Modifier::X | Modifier::I => {
                    dst.b_value = ctx.pget(av);
                }
            }
            ctx.core.set(b.addr, dst);
            Outcome::Continue(next)
        }

        Opcode::Stp => {
            match modifier {
                Modifier::A => ctx.pset(ab, aa),
                Modifier::AB => ctx.pset(bv, aa),
                Modifier::BA => ctx.pset(ab, av),
                Modifier::B | Modifier::F | Modifier::X | Modifier::I => ctx.pset(bv, av),
            }
            Outcome::Continue(next)
        }
    }
}

/// ADD/SUB/MUL: write the selected field pair(s) of the destination.
#[allow(clippy::too_many_arguments)]
fn arith(
    ctx: &mut ExecCtx<'_>,
    dst_addr: i32,
    modifier: Modifier,
    aa: i32,
    av: i32,
    ab: i32,
    bv: i32,
    next: i32,
    op: impl Fn(i32, i32) -> i32,
) -> Outcome {
    let mut dst = ctx.core.peek(dst_addr);
    match modifier {
        Modifier::A => dst.a_value = op(ab, aa),
        Modifier::B => dst.b_value = op(bv, av),
        Modifier::AB => dst.b_value = op(bv, aa),
        Modifier::BA => dst.a_value = op(ab, av),
        Modifier::F | Modifier::I => {
            dst.a_value = op(ab, aa);
            dst.b_value = op(bv, av);
        }
        Modifier::X => {
            dst.a_value = op(ab, av);
            dst.b_value = op(bv, aa);
        }
    }
    ctx.core.set(dst_addr, dst);
    Outcome::Continue(next)
}

/// DIV/MOD: like `arith` but a zero divisor suppresses that field's
/// write, the other pair is still attempted, and the task dies if any
/// divisor was zero.
#[allow(clippy::too_many_arguments)]
fn divide(
    ctx: &mut ExecCtx<'_>,
    dst_addr: i32,
    modifier: Modifier,
    aa: i32,
    av: i32,
    ab: i32,
    bv: i32,
    next: i32,
    op: impl Fn(i32, i32) -> i32,
) -> Outcome {
    let mut dst = ctx.core.peek(dst_addr);
    let mut wrote = false;
    let mut zero = false;

    let mut apply = |target: &mut i32, dividend: i32, divisor: i32| {
        if divisor == 0 {
            zero = true;
        } else {
            *target = op(dividend, divisor);
            wrote = true;
        }
    };

    match modifier {
        Modifier::A => apply(&mut dst.a_value, ab, aa),
        Modifier::B => apply(&mut dst.b_value, bv, av),
        Modifier::AB => apply(&mut dst.b_value, bv, aa),
        Modifier::BA => apply(&mut dst.a_value, ab, av),
        Modifier::F | Modifier::I => {
            apply(&mut dst.a_value, ab, aa);
            apply(&mut dst.b_value, bv, av);
        }
        Modifier::X => {
            apply(&mut dst.a_value, ab, av);
            apply(&mut dst.b_value, bv, aa);
        }
    }

    if wrote {
        ctx.core.set(dst_addr, dst);
    }
    if zero {
        Outcome::Die
    } else {
        Outcome::Continue(next)
    }
}
