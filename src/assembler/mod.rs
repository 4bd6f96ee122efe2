// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! The Redcode assembler.
//!
//! Two passes over reconstructed source lines: pass 1 collects symbols
//! and expands macros (`preprocess`), pass 2 assembles instruction text
//! into packed instructions (`passes`). Diagnostics accumulate into a
//! single result; any error makes the run unsuccessful and withholds
//! the warrior image.

pub mod passes;
pub mod preprocess;
pub mod scanner;

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::core::expr::Evaluator;
use crate::core::pspace::pspace_size;
use crate::redcode::WarriorData;

/// ICWS draft revision reported through the `VERSION` constant.
pub const VERSION: i32 = 96;

/// Longest label prefix recognized on one line.
pub const MAX_LINE_LABELS: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// One diagnostic, tagged with the 1-based source line it came from.
#[derive(Debug, Clone)]
pub struct Message {
    pub severity: Severity,
    pub line: usize,
    pub text: String,
}

impl Message {
    pub fn error(line: usize, text: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            line,
            text: text.into(),
        }
    }

    pub fn warning(line: usize, text: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            line,
            text: text.into(),
        }
    }

    pub fn info(line: usize, text: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            line,
            text: text.into(),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: line {}: {}", self.severity, self.line, self.text)
    }
}

/// Environment the source is compiled against. Mirrors the simulator
/// options that are visible to Redcode through predefined constants.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub core_size: i32,
    pub max_cycles: i32,
    pub max_length: usize,
    pub max_processes: usize,
    pub min_separation: i32,
    pub read_limit: i32,
    pub write_limit: i32,
    pub p_space_size: usize,
    pub warriors: usize,
    pub rounds: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            core_size: 8000,
            max_cycles: 80_000,
            max_length: 100,
            max_processes: 8000,
            min_separation: 100,
            read_limit: 0,
            write_limit: 0,
            p_space_size: 0,
            warriors: 2,
            rounds: 1,
        }
    }
}

impl CompileOptions {
    /// Value of a predefined identifier, or `None` when the name is not
    /// predefined. Names are case-insensitive; `CURLINE` tracks the
    /// instruction index being assembled.
    pub fn predefined(&self, name: &str, curline: i32) -> Option<i32> {
        let value = match name.to_ascii_lowercase().as_str() {
            "coresize" => self.core_size,
            "maxprocesses" => self.max_processes as i32,
            "maxcycles" => self.max_cycles,
            "maxlength" => self.max_length as i32,
            "mindistance" => self.min_separation,
            "version" => VERSION,
            "warriors" => self.warriors as i32,
            "rounds" => self.rounds as i32,
            "pspacesize" => {
                if self.p_space_size == 0 {
                    pspace_size(self.core_size) as i32
                } else {
                    self.p_space_size as i32
                }
            }
            "readlimit" => self.read_limit,
            "writelimit" => self.write_limit,
            "curline" => curline,
            _ => return None,
        };
        Some(value)
    }
}

/// Assembly outcome. `success` is false exactly when any message is an
/// error, in which case `warrior` is `None`.
#[derive(Debug, Clone)]
pub struct AssembleResult {
    pub success: bool,
    pub warrior: Option<WarriorData>,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone)]
pub enum Symbol {
    /// 0-based index of the instruction the label precedes in the final
    /// warrior.
    Address(i32),
    /// Textual macro body; multi-line EQUs hold one entry per line.
    Macro(Vec<String>),
}

/// Case-insensitive label/EQU store. Later definitions shadow earlier
/// ones, which is what makes FOR counter rebinding per iteration work.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    map: HashMap<String, Symbol>,
}

impl SymbolTable {
    pub fn clear(&mut self) {
        self.map.clear();
    }

    pub fn define_label(&mut self, name: &str, index: i32) {
        self.map
            .insert(name.to_ascii_lowercase(), Symbol::Address(index));
    }

    pub fn define_macro(&mut self, name: &str, body: &str) {
        self.map.insert(
            name.to_ascii_lowercase(),
            Symbol::Macro(vec![body.to_string()]),
        );
    }

    /// Append a continuation line to an existing macro; false when the
    /// name is unknown or not a macro.
    pub fn append_macro_line(&mut self, name: &str, body: &str) -> bool {
        match self.map.get_mut(&name.to_ascii_lowercase()) {
            Some(Symbol::Macro(lines)) => {
                lines.push(body.to_string());
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.map.get(&name.to_ascii_lowercase())
    }

    pub fn address(&self, name: &str) -> Option<i32> {
        match self.get(name) {
            Some(Symbol::Address(index)) => Some(*index),
            _ => None,
        }
    }

    pub fn macro_lines(&self, name: &str) -> Option<&[String]> {
        match self.get(name) {
            Some(Symbol::Macro(lines)) => Some(lines),
            _ => None,
        }
    }
}

/// Recursively substitute EQU macros in `text`. Each recursive chain
/// carries a visited set; revisiting a name warns once and substitutes
/// zero, so circular definitions stay non-fatal.
pub(crate) fn expand_equs(
    text: &str,
    symbols: &SymbolTable,
    messages: &mut Vec<Message>,
    line: usize,
) -> String {
    let mut visited = HashSet::new();
    expand_equs_inner(text, symbols, &mut visited, messages, line)
}

fn expand_equs_inner(
    text: &str,
    symbols: &SymbolTable,
    visited: &mut HashSet<String>,
    messages: &mut Vec<Message>,
    line: usize,
) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < bytes.len() {
        if scanner::is_ident_start(bytes[i]) {
            let start = i;
            while i < bytes.len() && scanner::is_ident_char(bytes[i]) {
                i += 1;
            }
            let name = &text[start..i];
            let key = name.to_ascii_lowercase();
            match symbols.macro_lines(&key) {
                Some(lines) => {
                    if visited.contains(&key) {
                        messages.push(Message::warning(line, "Recursive EQU cycle"));
                        out.push('0');
                    } else {
                        visited.insert(key.clone());
                        let body = lines.join(" ");
                        let expanded =
                            expand_equs_inner(&body, symbols, visited, messages, line);
                        visited.remove(&key);
                        out.push_str(&expanded);
                    }
                }
                None => out.push_str(name),
            }
        } else {
            out.push(bytes[i] as char);
            i += 1;
        }
    }
    out
}

/// Substitute address labels and predefined constants in expression
/// text. Address labels contribute `value - relative_to` when a base is
/// given (operand expressions) and their absolute index otherwise
/// (ORG/END/PIN and `;assert`). Unknown single-character identifiers
/// pass through for the evaluator's registers; unknown longer names
/// warn and become zero.
pub(crate) fn substitute_symbols(
    text: &str,
    symbols: &SymbolTable,
    options: &CompileOptions,
    curline: i32,
    relative_to: Option<i32>,
    messages: &mut Vec<Message>,
    line: usize,
) -> String {
    scanner::replace_idents(text, |name| {
        if let Some(value) = symbols.address(name) {
            let value = match relative_to {
                Some(base) => value - base,
                None => value,
            };
            return Some(value.to_string());
        }
        if symbols.macro_lines(name).is_some() {
            // Macros are expanded textually before substitution; a
            // leftover here means an unexpanded context, keep it.
            return None;
        }
        if let Some(value) = options.predefined(name, curline) {
            return Some(value.to_string());
        }
        if name.len() == 1 {
            return None;
        }
        messages.push(Message::warning(
            line,
            format!("Undefined symbol: {name}"),
        ));
        Some("0".to_string())
    })
}

/// Assemble Redcode source into a warrior image.
pub fn assemble(source: &str, options: &CompileOptions) -> AssembleResult {
    let mut messages = Vec::new();
    let mut evaluator = Evaluator::new();

    let mut unit = preprocess::run(source, options, &mut evaluator, &mut messages);

    if unit.raw.is_empty() {
        messages.push(Message::error(0, "No instructions"));
    } else if unit.raw.len() > options.max_length {
        messages.push(Message::error(
            0,
            format!(
                "Warrior has {} instructions, exceeding the maximum length of {}",
                unit.raw.len(),
                options.max_length
            ),
        ));
    }

    let instructions =
        passes::assemble_instructions(&unit, options, &mut evaluator, &mut messages);
    let directives =
        passes::resolve_directives(&unit, options, &mut evaluator, &mut messages);

    let success = !messages
        .iter()
        .any(|m| m.severity == Severity::Error);

    let warrior = if success {
        let warnings = messages
            .iter()
            .filter(|m| m.severity == Severity::Warning)
            .map(|m| m.text.clone())
            .collect();
        Some(WarriorData {
            instructions,
            start_offset: directives.start_offset,
            name: std::mem::take(&mut unit.name),
            author: std::mem::take(&mut unit.author),
            strategy: std::mem::take(&mut unit.strategy),
            pin: directives.pin,
            warnings,
        })
    } else {
        None
    };

    AssembleResult {
        success,
        warrior,
        messages,
    }
}
