// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Pass 2: instruction assembly and directive resolution.
//!
//! Each raw line becomes one packed instruction: the opcode and
//! optional modifier are lexed, operand text is split on top-level
//! commas, EQUs substitute textually (so a macro can contribute its
//! addressing-mode prefix), labels substitute relative to the current
//! instruction, and the expression evaluator produces field values that
//! are normalized into the core. ORG/END/PIN and `;assert` expressions
//! resolve here too, with absolute label semantics.

use super::preprocess::{RawLine, Unit};
use super::scanner::{split_operands, LineScanner};
use super::{expand_equs, substitute_symbols, CompileOptions, Message};
use crate::core::expr::Evaluator;
use crate::core::math::normalize;
use crate::redcode::{AddrMode, Instruction, Modifier, Opcode};

struct Operand {
    mode: AddrMode,
    expr: String,
}

impl Operand {
    fn literal(mode: AddrMode, expr: &str) -> Self {
        Self {
            mode,
            expr: expr.to_string(),
        }
    }
}

pub(crate) fn assemble_instructions(
    unit: &Unit,
    options: &CompileOptions,
    evaluator: &mut Evaluator,
    messages: &mut Vec<Message>,
) -> Vec<Instruction> {
    let mut out = Vec::with_capacity(unit.raw.len());
    for (index, raw) in unit.raw.iter().enumerate() {
        out.push(assemble_line(
            raw,
            index as i32,
            unit,
            options,
            evaluator,
            messages,
        ));
    }
    out
}

fn assemble_line(
    raw: &RawLine,
    curline: i32,
    unit: &Unit,
    options: &CompileOptions,
    evaluator: &mut Evaluator,
    messages: &mut Vec<Message>,
) -> Instruction {
    let line = raw.line;

    // A macro can stand in the opcode position (`step` where
    // `step EQU mov 0, 1`); expand until a real mnemonic surfaces.
    let mut text = raw.text.clone();
    for _ in 0..16 {
        let mut scan = LineScanner::new(&text);
        let replaced = match scan.next_word() {
            Some(word) if word.modifier.is_none() && Opcode::from_mnemonic(&word.text).is_none() =>
            {
                match unit.symbols.macro_lines(&word.text) {
                    Some(lines) => {
                        let body = lines.join(" ");
                        let rest = scan.rest();
                        if rest.is_empty() {
                            body
                        } else {
                            format!("{body} {rest}")
                        }
                    }
                    None => break,
                }
            }
            _ => break,
        };
        text = replaced;
    }

    let mut scan = LineScanner::new(&text);
    let Some(word) = scan.next_word() else {
        messages.push(Message::error(
            line,
            format!("Unknown opcode: {}", text.trim()),
        ));
        return Instruction::default();
    };
    let Some(opcode) = Opcode::from_mnemonic(&word.text) else {
        messages.push(Message::error(
            line,
            format!("Unknown opcode: {}", word.text),
        ));
        return Instruction::default();
    };
    let modifier = match &word.modifier {
        Some(suffix) => match Modifier::from_suffix(suffix) {
            Some(modifier) => Some(modifier),
            None => {
                messages.push(Message::error(
                    line,
                    format!("Unknown modifier: .{suffix}"),
                ));
                return Instruction::default();
            }
        },
        None => None,
    };

    let mut operands = Vec::new();
    for operand_text in split_operands(scan.rest()) {
        let expanded = expand_equs(&operand_text, &unit.symbols, messages, line);
        let trimmed = expanded.trim();
        let operand = match trimmed.chars().next().and_then(AddrMode::from_char) {
            Some(mode) => Operand {
                mode,
                expr: trimmed[1..].trim().to_string(),
            },
            None => Operand {
                mode: AddrMode::Direct,
                expr: trimmed.to_string(),
            },
        };
        operands.push(operand);
    }

    let (a, b) = match operands.len() {
        0 => match opcode {
            Opcode::Dat => (
                Operand::literal(AddrMode::Immediate, "0"),
                Operand::literal(AddrMode::Immediate, "0"),
            ),
            Opcode::Nop => (
                Operand::literal(AddrMode::Direct, "0"),
                Operand::literal(AddrMode::Direct, "0"),
            ),
            _ => {
                messages.push(Message::error(line, "Missing operand"));
                return Instruction::default();
            }
        },
        1 => {
            let lone = operands.pop().expect("one operand");
            match opcode {
                // A lone DAT operand is the B-field.
                Opcode::Dat => (Operand::literal(AddrMode::Immediate, "0"), lone),
                Opcode::Jmp | Opcode::Spl | Opcode::Nop => {
                    (lone, Operand::literal(AddrMode::Direct, "0"))
                }
                _ => {
                    messages.push(Message::error(line, "Missing operand"));
                    return Instruction::default();
                }
            }
        }
        2 => {
            let b = operands.pop().expect("two operands");
            let a = operands.pop().expect("two operands");
            (a, b)
        }
        _ => {
            messages.push(Message::error(line, "Too many operands"));
            return Instruction::default();
        }
    };

    let modifier = modifier.unwrap_or_else(|| default_modifier(opcode, a.mode, b.mode));

    let a_value = eval_field(&a.expr, "A", curline, unit, options, evaluator, messages, line);
    let b_value = eval_field(&b.expr, "B", curline, unit, options, evaluator, messages, line);

    Instruction::new(opcode, modifier, a.mode, a_value, b.mode, b_value)
}

/// The ICWS'94 default-modifier table, keyed on the opcode family and
/// which operand (if either) is immediate.
fn default_modifier(opcode: Opcode, a_mode: AddrMode, b_mode: AddrMode) -> Modifier {
    let a_imm = a_mode == AddrMode::Immediate;
    let b_imm = b_mode == AddrMode::Immediate;
    match opcode {
        Opcode::Dat | Opcode::Nop => Modifier::F,
        Opcode::Mov | Opcode::Seq | Opcode::Sne => {
            if a_imm {
                Modifier::AB
            } else if b_imm {
                Modifier::B
            } else {
                Modifier::I
            }
        }
        Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div | Opcode::Mod => {
            if a_imm {
                Modifier::AB
            } else if b_imm {
                Modifier::B
            } else {
                Modifier::F
            }
        }
        Opcode::Slt | Opcode::Ldp | Opcode::Stp => {
            if a_imm {
                Modifier::AB
            } else {
                Modifier::B
            }
        }
        Opcode::Jmp | Opcode::Jmz | Opcode::Jmn | Opcode::Djn | Opcode::Spl => Modifier::B,
    }
}

#[allow(clippy::too_many_arguments)]
fn eval_field(
    expr: &str,
    which: &str,
    curline: i32,
    unit: &Unit,
    options: &CompileOptions,
    evaluator: &mut Evaluator,
    messages: &mut Vec<Message>,
    line: usize,
) -> i32 {
    let substituted = substitute_symbols(
        expr,
        &unit.symbols,
        options,
        curline,
        Some(curline),
        messages,
        line,
    );
    match evaluator.eval(&substituted) {
        Ok(outcome) => {
            if outcome.overflow {
                messages.push(Message::warning(
                    line,
                    format!("Arithmetic overflow in {which}-field expression"),
                ));
            }
            normalize(outcome.value as i64, options.core_size)
        }
        Err(err) => {
            messages.push(Message::error(
                line,
                format!("Bad {which}-field expression: {err}"),
            ));
            0
        }
    }
}

/// Resolved ORG/END/PIN state.
pub(crate) struct Directives {
    pub start_offset: i32,
    pub pin: Option<i32>,
}

pub(crate) fn resolve_directives(
    unit: &Unit,
    options: &CompileOptions,
    evaluator: &mut Evaluator,
    messages: &mut Vec<Message>,
) -> Directives {
    let count = unit.raw.len() as i32;

    let mut start = 0;
    if let Some((expr, line)) = &unit.org {
        if let Some(value) = eval_absolute(expr, *line, unit, options, evaluator, messages) {
            start = value;
        }
        if let Some((end_expr, end_line)) = &unit.end_offset {
            let end_value =
                eval_absolute(end_expr, *end_line, unit, options, evaluator, messages);
            if end_value.is_some_and(|v| v != 0) {
                messages.push(Message::warning(
                    *end_line,
                    "END offset ignored because ORG is set",
                ));
            }
        }
    } else if let Some((expr, line)) = &unit.end_offset {
        if let Some(value) = eval_absolute(expr, *line, unit, options, evaluator, messages) {
            start = value;
        }
    }

    if count > 0 && (start < 0 || start >= count) {
        let line = unit
            .org
            .as_ref()
            .or(unit.end_offset.as_ref())
            .map(|(_, l)| *l)
            .unwrap_or(0);
        messages.push(Message::warning(line, "ORG outside program range"));
    }
    let start_offset = normalize(start as i64, options.core_size);

    let pin = unit
        .pin
        .as_ref()
        .and_then(|(expr, line)| eval_absolute(expr, *line, unit, options, evaluator, messages));

    if unit.asserts.is_empty() {
        messages.push(Message::warning(0, "Missing ASSERT"));
    }
    for (expr, line) in &unit.asserts {
        if let Some(value) = eval_absolute(expr, *line, unit, options, evaluator, messages) {
            if value == 0 {
                messages.push(Message::error(*line, "Assertion failed"));
            }
        }
    }

    Directives { start_offset, pin }
}

/// Evaluate a directive expression with absolute label semantics.
fn eval_absolute(
    expr: &str,
    line: usize,
    unit: &Unit,
    options: &CompileOptions,
    evaluator: &mut Evaluator,
    messages: &mut Vec<Message>,
) -> Option<i32> {
    let expanded = expand_equs(expr, &unit.symbols, messages, line);
    let substituted = substitute_symbols(
        &expanded,
        &unit.symbols,
        options,
        0,
        None,
        messages,
        line,
    );
    match evaluator.eval(&substituted) {
        Ok(outcome) => Some(outcome.value),
        Err(err) => {
            messages.push(Message::error(line, format!("Bad expression: {err}")));
            None
        }
    }
}
