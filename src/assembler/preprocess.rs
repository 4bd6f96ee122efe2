// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Pass 1: line reconstruction, comment directives, symbol collection
//! and macro expansion.
//!
//! The pass flattens the source into a list of raw instruction lines:
//! continuation lines are joined, `;`-directives are consumed, EQU
//! definitions (including multi-line bodies) are registered, FOR/ROF
//! blocks are buffered and re-processed per iteration with the counter
//! bound as a macro, and `&name` references pick up the active counter.
//! Address labels are assigned only at the end, against the final
//! instruction indices, so expansions cannot skew them.

use super::scanner::{is_ident, is_ident_char, is_ident_start, LineScanner, Word};
use super::{expand_equs, substitute_symbols, CompileOptions, Message, SymbolTable, MAX_LINE_LABELS};
use crate::core::expr::Evaluator;
use crate::redcode::Opcode;

/// One source line after reconstruction, tagged with the 1-based number
/// of its first physical line.
#[derive(Debug, Clone)]
struct SrcLine {
    text: String,
    line: usize,
}

/// An unparsed instruction line surviving pass 1.
#[derive(Debug, Clone)]
pub struct RawLine {
    pub labels: Vec<String>,
    pub text: String,
    pub line: usize,
}

/// Everything pass 1 hands to pass 2.
#[derive(Debug, Default)]
pub struct Unit {
    pub raw: Vec<RawLine>,
    pub symbols: SymbolTable,
    pub name: String,
    pub author: String,
    pub strategy: String,
    pub org: Option<(String, usize)>,
    pub end_offset: Option<(String, usize)>,
    pub pin: Option<(String, usize)>,
    pub asserts: Vec<(String, usize)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keyword {
    Equ,
    For,
    Rof,
    Org,
    End,
    Pin,
}

fn keyword_of(text: &str) -> Option<Keyword> {
    let kw = match text.to_ascii_uppercase().as_str() {
        "EQU" => Keyword::Equ,
        "FOR" => Keyword::For,
        "ROF" => Keyword::Rof,
        "ORG" => Keyword::Org,
        "END" => Keyword::End,
        "PIN" => Keyword::Pin,
        _ => return None,
    };
    Some(kw)
}

fn strip_comment(text: &str) -> &str {
    match text.find(';') {
        Some(pos) => &text[..pos],
        None => text,
    }
}

/// Join continuation lines: a line whose non-comment portion ends with
/// `\` (after trailing whitespace) concatenates, without the backslash,
/// with the following line. The joined line keeps the first physical
/// line's number.
fn reconstruct(source: &str) -> Vec<SrcLine> {
    let mut out = Vec::new();
    let mut acc = String::new();
    let mut acc_line = 0;
    for (idx, raw) in source.lines().enumerate() {
        let number = idx + 1;
        let code = strip_comment(raw).trim_end();
        if let Some(head) = code.strip_suffix('\\') {
            if acc.is_empty() {
                acc_line = number;
            }
            acc.push_str(head);
            continue;
        }
        if acc.is_empty() {
            out.push(SrcLine {
                text: raw.to_string(),
                line: number,
            });
        } else {
            acc.push_str(raw);
            out.push(SrcLine {
                text: std::mem::take(&mut acc),
                line: acc_line,
            });
        }
    }
    if !acc.is_empty() {
        out.push(SrcLine {
            text: acc,
            line: acc_line,
        });
    }
    out
}

/// The operative token of a line, ignoring any label prefix. Used for
/// FOR/ROF nesting while buffering bodies.
fn line_keyword(code: &str) -> Option<Keyword> {
    let mut scan = LineScanner::new(code);
    for _ in 0..=MAX_LINE_LABELS {
        let word = scan.next_word()?;
        if word.colon {
            continue;
        }
        if let Some(kw) = keyword_of(&word.text) {
            return Some(kw);
        }
        if Opcode::from_mnemonic(&word.text).is_some() {
            return None;
        }
    }
    None
}

enum Operative {
    Keyword(Keyword, String),
    Instr(String),
    LabelsOnly,
}

pub(crate) fn run(
    source: &str,
    options: &CompileOptions,
    evaluator: &mut Evaluator,
    messages: &mut Vec<Message>,
) -> Unit {
    let lines = reconstruct(source);
    let mut pass = Pass1 {
        options,
        evaluator,
        messages,
        unit: Unit::default(),
        last_equ: None,
        pending_labels: Vec::new(),
        seen_redcode: false,
        halted: false,
    };
    let mut counters = Vec::new();
    pass.process(&lines, &mut counters);
    pass.finish()
}

struct Pass1<'a> {
    options: &'a CompileOptions,
    evaluator: &'a mut Evaluator,
    messages: &'a mut Vec<Message>,
    unit: Unit,
    last_equ: Option<String>,
    pending_labels: Vec<String>,
    seen_redcode: bool,
    halted: bool,
}

impl Pass1<'_> {
    fn process(&mut self, lines: &[SrcLine], counters: &mut Vec<(String, i32)>) {
        let mut i = 0;
        while i < lines.len() {
            if self.halted {
                return;
            }
            let src = &lines[i];
            i += 1;
            let line_no = src.line;
            let text = apply_ampersand(&src.text, counters);

            if text.trim_start().starts_with(';') {
                self.handle_comment(text.trim_start(), line_no);
                continue;
            }
            let code = strip_comment(&text).to_string();
            if code.trim().is_empty() {
                // Blank lines keep a multi-line EQU chain open.
                continue;
            }

            let (labels, operative) = self.scan_line(&code);
            match operative {
                Operative::Keyword(Keyword::Equ, rest) => {
                    let body = rest.trim().to_string();
                    if labels.is_empty() {
                        match self.last_equ.clone() {
                            Some(owner) => {
                                self.unit.symbols.append_macro_line(&owner, &body);
                            }
                            None => self
                                .messages
                                .push(Message::error(line_no, "EQU without label")),
                        }
                    } else {
                        for label in &labels {
                            self.unit.symbols.define_macro(label, &body);
                        }
                        self.last_equ = labels.last().cloned();
                    }
                }
                Operative::Keyword(Keyword::For, rest) => {
                    self.last_equ = None;
                    let count = self.eval_for_count(&rest, line_no);
                    let (body, consumed, closed) = collect_for_body(&lines[i..]);
                    i += consumed;
                    if !closed {
                        self.messages.push(Message::warning(
                            line_no,
                            "FOR without matching ROF at end of file",
                        ));
                        continue;
                    }
                    let counter = labels.last().cloned();
                    for k in 1..=count {
                        if let Some(name) = &counter {
                            self.unit.symbols.define_macro(name, &k.to_string());
                            counters.push((name.to_ascii_lowercase(), k));
                        }
                        self.process(&body, counters);
                        if counter.is_some() {
                            counters.pop();
                        }
                        if self.halted {
                            return;
                        }
                    }
                }
                Operative::Keyword(Keyword::Rof, _) => {
                    self.last_equ = None;
                    self.messages
                        .push(Message::warning(line_no, "ROF without matching FOR"));
                }
                Operative::Keyword(Keyword::Org, rest) => {
                    self.last_equ = None;
                    self.unit.org = Some((rest.trim().to_string(), line_no));
                }
                Operative::Keyword(Keyword::End, rest) => {
                    self.last_equ = None;
                    let rest = rest.trim();
                    if !rest.is_empty() {
                        self.unit.end_offset = Some((rest.to_string(), line_no));
                    }
                    self.halted = true;
                }
                Operative::Keyword(Keyword::Pin, rest) => {
                    self.last_equ = None;
                    self.unit.pin = Some((rest.trim().to_string(), line_no));
                }
                Operative::Instr(instr_text) => {
                    self.last_equ = None;
                    let mut all = std::mem::take(&mut self.pending_labels);
                    all.extend(labels);
                    self.unit.raw.push(RawLine {
                        labels: all,
                        text: instr_text,
                        line: line_no,
                    });
                }
                Operative::LabelsOnly => {
                    self.last_equ = None;
                    self.pending_labels.extend(labels);
                }
            }
        }
    }

    /// Split a code line into its label prefix and operative token.
    /// A word ends the prefix when it is a keyword, an opcode mnemonic,
    /// or a known macro name (bare and inline macro references both
    /// start the instruction text).
    fn scan_line(&self, code: &str) -> (Vec<String>, Operative) {
        let mut scan = LineScanner::new(code);
        let mut labels = Vec::new();
        loop {
            let Some(word) = scan.next_word() else {
                if scan.at_end() {
                    return (labels, Operative::LabelsOnly);
                }
                // Starts with punctuation; pass 2 reports the bad opcode.
                return (labels, Operative::Instr(scan.rest().trim().to_string()));
            };
            if !word.colon {
                if let Some(kw) = keyword_of(&word.text) {
                    return (
                        labels,
                        Operative::Keyword(kw, scan.rest().to_string()),
                    );
                }
                if Opcode::from_mnemonic(&word.text).is_some() {
                    return (labels, Operative::Instr(rejoin(&word, scan.rest())));
                }
                if self.unit.symbols.macro_lines(&word.text).is_some() {
                    // A keyword right after means this word is a label
                    // being (re)bound, not a macro reference.
                    let mut ahead = LineScanner::new(scan.rest());
                    let rebinding = ahead
                        .next_word()
                        .is_some_and(|w| !w.colon && keyword_of(&w.text).is_some());
                    if !rebinding {
                        return (labels, Operative::Instr(rejoin(&word, scan.rest())));
                    }
                }
            }
            if labels.len() < MAX_LINE_LABELS {
                labels.push(word.text);
            } else {
                return (labels, Operative::Instr(rejoin(&word, scan.rest())));
            }
        }
    }

    fn handle_comment(&mut self, text: &str, line: usize) {
        let body = text[1..].trim_start();
        let word_end = body
            .find(|c: char| c.is_ascii_whitespace())
            .unwrap_or(body.len());
        let (word, rest) = body.split_at(word_end);
        let lower = word.to_ascii_lowercase();
        if lower.starts_with("redcode") {
            if self.seen_redcode {
                self.halted = true;
            } else {
                self.seen_redcode = true;
                self.reset();
            }
            return;
        }
        match lower.as_str() {
            "name" => self.unit.name = rest.trim().to_string(),
            "author" => self.unit.author = rest.trim().to_string(),
            "strategy" => {
                self.unit.strategy.push_str(rest.trim());
                self.unit.strategy.push('\n');
            }
            "assert" => self.unit.asserts.push((rest.trim().to_string(), line)),
            // Plain comments are ignored and keep the last-EQU chain.
            _ => {}
        }
    }

    /// A `;redcode` banner discards everything accumulated so far.
    fn reset(&mut self) {
        self.unit.raw.clear();
        self.unit.symbols.clear();
        self.unit.name.clear();
        self.unit.author.clear();
        self.unit.strategy.clear();
        self.unit.org = None;
        self.unit.end_offset = None;
        self.unit.pin = None;
        self.unit.asserts.clear();
        self.last_equ = None;
        self.pending_labels.clear();
    }

    fn eval_for_count(&mut self, text: &str, line: usize) -> i32 {
        let expanded = expand_equs(text, &self.unit.symbols, self.messages, line);
        let substituted = substitute_symbols(
            &expanded,
            &self.unit.symbols,
            self.options,
            0,
            None,
            self.messages,
            line,
        );
        match self.evaluator.eval(&substituted) {
            Ok(outcome) => outcome.value.rem_euclid(0x10000),
            Err(err) => {
                self.messages
                    .push(Message::error(line, format!("Bad FOR count: {err}")));
                0
            }
        }
    }

    fn finish(mut self) -> Unit {
        let raw = std::mem::take(&mut self.unit.raw);
        let mut expanded = Vec::with_capacity(raw.len());
        for line in raw {
            expand_multiline(&mut expanded, line, &self.unit.symbols, 0);
        }
        self.unit.raw = expanded;

        // Labels after the last instruction point one past the end.
        let end_index = self.unit.raw.len() as i32;
        for label in &self.pending_labels {
            self.unit.symbols.define_label(label, end_index);
        }
        for (index, line) in self.unit.raw.iter().enumerate() {
            for label in &line.labels {
                self.unit.symbols.define_label(label, index as i32);
            }
        }
        self.unit
    }
}

fn rejoin(word: &Word, rest: &str) -> String {
    let mut out = String::new();
    out.push_str(&word.text);
    if let Some(modifier) = &word.modifier {
        out.push('.');
        out.push_str(modifier);
    }
    if !rest.is_empty() {
        out.push(' ');
        out.push_str(rest);
    }
    out
}

/// Buffer lines up to the matching ROF, tracking FOR nesting. Returns
/// the body, the number of lines consumed (including the ROF) and
/// whether a ROF was found at all.
fn collect_for_body(lines: &[SrcLine]) -> (Vec<SrcLine>, usize, bool) {
    let mut depth = 1;
    let mut body = Vec::new();
    for (idx, src) in lines.iter().enumerate() {
        match line_keyword(strip_comment(&src.text)) {
            Some(Keyword::For) => depth += 1,
            Some(Keyword::Rof) => {
                depth -= 1;
                if depth == 0 {
                    return (body, idx + 1, true);
                }
            }
            _ => {}
        }
        body.push(src.clone());
    }
    let consumed = lines.len();
    (body, consumed, false)
}

/// Replace a bare reference to a multi-line EQU with its line sequence;
/// the original line's labels ride on the first emitted line.
fn expand_multiline(out: &mut Vec<RawLine>, line: RawLine, symbols: &SymbolTable, depth: usize) {
    let name = line.text.trim();
    if depth < 8 && is_ident(name) {
        if let Some(lines) = symbols.macro_lines(name) {
            if lines.len() > 1 {
                let bodies: Vec<String> = lines.to_vec();
                for (j, body) in bodies.into_iter().enumerate() {
                    let labels = if j == 0 { line.labels.clone() } else { Vec::new() };
                    expand_multiline(
                        out,
                        RawLine {
                            labels,
                            text: body,
                            line: line.line,
                        },
                        symbols,
                        depth + 1,
                    );
                }
                return;
            }
        }
    }
    out.push(line);
}

/// Substitute `&name` with the value of the innermost active FOR
/// counter of that name, zero-padded to two digits for 1..=99.
fn apply_ampersand(text: &str, counters: &[(String, i32)]) -> String {
    if counters.is_empty() || !text.contains('&') {
        return text.to_string();
    }
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'&' && i + 1 < bytes.len() && is_ident_start(bytes[i + 1]) {
            let start = i + 1;
            let mut end = start;
            while end < bytes.len() && is_ident_char(bytes[end]) {
                end += 1;
            }
            let name = text[start..end].to_ascii_lowercase();
            match counters.iter().rev().find(|(n, _)| *n == name) {
                Some((_, value)) => {
                    if (1..=99).contains(value) {
                        out.push_str(&format!("{value:02}"));
                    } else {
                        out.push_str(&value.to_string());
                    }
                    i = end;
                }
                None => {
                    out.push('&');
                    i += 1;
                }
            }
        } else {
            out.push(bytes[i] as char);
            i += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_pass1(source: &str) -> (Unit, Vec<Message>) {
        let options = CompileOptions::default();
        let mut evaluator = Evaluator::new();
        let mut messages = Vec::new();
        let unit = run(source, &options, &mut evaluator, &mut messages);
        (unit, messages)
    }

    #[test]
    fn continuation_lines_are_joined() {
        let (unit, _) = run_pass1("MOV 0, \\ ; trailing comment\n1\n");
        assert_eq!(unit.raw.len(), 1);
        assert_eq!(unit.raw[0].text.trim(), "MOV 0, 1");
        assert_eq!(unit.raw[0].line, 1);
    }

    #[test]
    fn labels_are_collected_and_indexed() {
        let (unit, _) = run_pass1("a b MOV 0, 1\nc: DAT 0, 0\n");
        assert_eq!(unit.raw.len(), 2);
        assert_eq!(unit.symbols.address("A"), Some(0));
        assert_eq!(unit.symbols.address("b"), Some(0));
        assert_eq!(unit.symbols.address("c"), Some(1));
    }

    #[test]
    fn label_on_its_own_line_binds_forward() {
        let (unit, _) = run_pass1("top\nMOV 0, 1\nfinish\n");
        assert_eq!(unit.symbols.address("top"), Some(0));
        // A trailing label points one past the last instruction.
        assert_eq!(unit.symbols.address("finish"), Some(1));
    }

    #[test]
    fn for_expands_body_count_times() {
        let (unit, _) = run_pass1("FOR 3\nDAT 0, 0\nROF\n");
        assert_eq!(unit.raw.len(), 3);
    }

    #[test]
    fn nested_for_multiplies() {
        let (unit, _) = run_pass1("FOR 2\nFOR 3\nDAT 0, 0\nROF\nROF\n");
        assert_eq!(unit.raw.len(), 6);
    }

    #[test]
    fn for_counter_is_bound_per_iteration() {
        let (unit, _) = run_pass1("i FOR 2\nDAT i, i\nROF\n");
        assert_eq!(unit.raw.len(), 2);
        // The counter macro holds its final value after the loop.
        assert_eq!(unit.symbols.macro_lines("i"), Some(&["2".to_string()][..]));
    }

    #[test]
    fn counter_name_can_be_reused_by_a_second_loop() {
        let (unit, _) = run_pass1("i FOR 2\nDAT 0, 0\nROF\ni FOR 3\nDAT 1, 1\nROF\n");
        assert_eq!(unit.raw.len(), 5);
    }

    #[test]
    fn equ_can_be_redefined() {
        let (unit, _) = run_pass1("x EQU 5\nx EQU 9\nDAT x, 0\n");
        assert_eq!(unit.symbols.macro_lines("x"), Some(&["9".to_string()][..]));
        assert_eq!(unit.raw.len(), 1);
    }

    #[test]
    fn ampersand_concatenation_pads_to_two_digits() {
        let (unit, _) = run_pass1("i FOR 3\nx&i EQU &i*10\nROF\nDAT x01, x03\n");
        assert_eq!(unit.raw.len(), 1);
        assert_eq!(
            unit.symbols.macro_lines("x01"),
            Some(&["01*10".to_string()][..])
        );
        assert_eq!(
            unit.symbols.macro_lines("x03"),
            Some(&["03*10".to_string()][..])
        );
    }

    #[test]
    fn for_count_is_truncated_to_16_bits() {
        let (unit, _) = run_pass1("FOR 65538\nDAT 0, 0\nROF\n");
        assert_eq!(unit.raw.len(), 2);
    }

    #[test]
    fn unclosed_for_warns() {
        let (unit, messages) = run_pass1("FOR 3\nDAT 0, 0\n");
        assert!(unit.raw.is_empty());
        assert!(messages.iter().any(|m| m.text.contains("without matching ROF")));
    }

    #[test]
    fn stray_rof_warns() {
        let (_, messages) = run_pass1("ROF\nDAT 0, 0\n");
        assert!(messages.iter().any(|m| m.text.contains("without matching FOR")));
    }

    #[test]
    fn multi_line_equ_expands_bare_reference() {
        let source = "\
pair EQU MOV 0, 1
     EQU DAT 0, 0
x pair
JMP x
";
        let (unit, _) = run_pass1(source);
        assert_eq!(unit.raw.len(), 3);
        assert_eq!(unit.raw[0].text.trim(), "MOV 0, 1");
        assert_eq!(unit.raw[1].text.trim(), "DAT 0, 0");
        assert_eq!(unit.symbols.address("x"), Some(0));
        // The JMP target label resolves past the expansion.
        assert_eq!(unit.raw[2].text.trim(), "JMP x");
    }

    #[test]
    fn comment_between_equ_lines_keeps_the_chain() {
        let source = "\
pair EQU MOV 0, 1
; just a note
     EQU DAT 0, 0
pair
";
        let (unit, _) = run_pass1(source);
        assert_eq!(unit.raw.len(), 2);
    }

    #[test]
    fn equ_without_label_errors() {
        let source = "DAT 0, 0\nEQU 5\n";
        let (_, messages) = run_pass1(source);
        assert!(messages
            .iter()
            .any(|m| m.severity == super::super::Severity::Error
                && m.text.contains("EQU without label")));
    }

    #[test]
    fn end_stops_processing() {
        let (unit, _) = run_pass1("DAT 0, 0\nEND\nDAT 0, 0\n");
        assert_eq!(unit.raw.len(), 1);
    }

    #[test]
    fn org_and_pin_are_captured() {
        let (unit, _) = run_pass1("ORG 1\nPIN 7\nDAT 0, 0\nDAT 0, 0\n");
        assert_eq!(unit.org.as_ref().map(|(t, _)| t.as_str()), Some("1"));
        assert_eq!(unit.pin.as_ref().map(|(t, _)| t.as_str()), Some("7"));
    }
}
