// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! End-to-end battles through the public API: assemble source, load,
//! run rounds, observe results and events.

use std::cell::RefCell;
use std::rc::Rc;

use redmars::assembler::{assemble, CompileOptions, Severity};
use redmars::redcode::{disassemble, AddrMode, Modifier, Opcode, WarriorData};
use redmars::vm::event::{AccessType, CoreAccessEvent, EventListener, RoundEndEvent, TaskCountEvent};
use redmars::vm::{Options, RoundOutcome, Simulator};

fn assemble_ok(source: &str, options: &CompileOptions) -> WarriorData {
    let result = assemble(source, options);
    assert!(
        result.success,
        "assembly failed: {:?}",
        result
            .messages
            .iter()
            .map(|m| m.to_string())
            .collect::<Vec<_>>()
    );
    result.warrior.expect("warrior present on success")
}

fn imp(options: &CompileOptions) -> WarriorData {
    assemble_ok(";assert 1\nMOV.I $0, $1\n", options)
}

fn sitting_duck(options: &CompileOptions) -> WarriorData {
    assemble_ok(";assert 1\nDAT.F #0, #0\n", options)
}

#[test]
fn imp_versus_dat_is_a_win_for_the_imp() {
    let options = Options::default();
    let compile = options.compile_options();
    let mut sim = Simulator::new(options);
    sim.load_warriors(vec![imp(&compile), sitting_duck(&compile)])
        .expect("two warriors load");
    let results = sim.run(Some(1));
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].winner_id, Some(0));
    assert_eq!(results[0].outcome, RoundOutcome::Win);
}

#[test]
fn imp_versus_imp_is_a_tie() {
    let options = Options::default();
    let compile = options.compile_options();
    let mut sim = Simulator::new(options);
    sim.load_warriors(vec![imp(&compile), imp(&compile)])
        .expect("two warriors load");
    let results = sim.run(Some(1));
    assert_eq!(results[0].winner_id, None);
    assert_eq!(results[0].outcome, RoundOutcome::Tie);
}

#[test]
fn dwarf_assembles_with_documented_default_modifiers() {
    let source = "\
;assert CORESIZE == 8000
ADD.AB #4, $3
MOV.I  $2, @2
JMP    $-2, $0
DAT.F  #0, #0
";
    let warrior = assemble_ok(source, &CompileOptions::default());
    assert_eq!(warrior.instructions.len(), 4);
    assert_eq!(warrior.start_offset, 0);

    // The same program without modifiers picks them from the table.
    let bare = "\
;assert CORESIZE == 8000
ADD #4, 3
MOV 2, @2
JMP -2
DAT #0, #0
";
    let bare_warrior = assemble_ok(bare, &CompileOptions::default());
    assert_eq!(warrior.instructions, bare_warrior.instructions);

    let modifiers: Vec<Modifier> = warrior.instructions.iter().map(|i| i.modifier).collect();
    assert_eq!(
        modifiers,
        vec![Modifier::AB, Modifier::I, Modifier::B, Modifier::F]
    );
}

#[test]
fn for_expansion_with_ampersand_concatenation() {
    let source = "\
;assert 1
step EQU 10
i FOR 3
  x&i EQU &i*step
ROF
DAT #x01, #x02
";
    let warrior = assemble_ok(source, &CompileOptions::default());
    assert_eq!(warrior.instructions.len(), 1);
    let dat = warrior.instructions[0];
    assert_eq!(dat.opcode, Opcode::Dat);
    assert_eq!(dat.a_value, 10);
    assert_eq!(dat.b_value, 20);
}

#[test]
fn for_count_is_truncated_to_sixteen_bits() {
    let source = ";assert 1\nFOR 65537\nDAT 0, 0\nROF\n";
    let warrior = assemble_ok(source, &CompileOptions::default());
    assert_eq!(warrior.instructions.len(), 1);
}

#[test]
fn explicit_seed_makes_multi_warrior_rounds_reproducible() {
    let play = || {
        let options = Options {
            seed: Some(42),
            rounds: 3,
            ..Options::default()
        };
        let compile = options.compile_options();
        let mut sim = Simulator::new(options);
        sim.load_warriors(vec![imp(&compile), imp(&compile), imp(&compile)])
            .expect("three warriors load");
        let results = sim.run(None);
        let positions: Vec<i32> = sim.get_warriors().iter().map(|w| w.position).collect();
        let scores: Vec<Vec<u32>> = sim.get_warriors().iter().map(|w| w.score.clone()).collect();
        (results, positions, scores)
    };
    let first = play();
    let second = play();
    assert_eq!(first, second);
}

#[test]
fn circular_equ_assembles_with_warning() {
    let source = "\
;assert 1
A EQU B
B EQU A
DAT 0, 0
ORG A
";
    let result = assemble(source, &CompileOptions::default());
    assert!(result.success);
    let warrior = result.warrior.expect("warrior");
    assert_eq!(warrior.start_offset, 0);
    assert!(result
        .messages
        .iter()
        .any(|m| m.severity == Severity::Warning && m.text.contains("Recursive EQU cycle")));
}

#[test]
fn round_ends_on_the_step_after_the_kill() {
    // The killing step itself returns None; the next step finalizes.
    let options = Options {
        seed: Some(7),
        ..Options::default()
    };
    let compile = options.compile_options();
    let mut sim = Simulator::new(options);
    sim.load_warriors(vec![imp(&compile), sitting_duck(&compile)])
        .expect("loads");
    sim.setup_round();
    assert!(sim.step().is_none()); // imp moves
    assert!(sim.step().is_none()); // duck executes DAT and dies
    let result = sim.step().expect("round finalizes on the next step");
    assert_eq!(result.winner_id, Some(0));
}

#[test]
fn normalized_fields_cover_the_whole_core() {
    // Every emitted field lies in [0, core_size).
    let source = "\
;assert 1
DAT -1, 8001
MOV.I $-4000, $7999
";
    let warrior = assemble_ok(source, &CompileOptions::default());
    for instr in &warrior.instructions {
        for value in [instr.a_value, instr.b_value] {
            assert!((0..8000).contains(&value), "field {value} out of range");
        }
    }
    assert_eq!(warrior.instructions[0].a_value, 7999);
    assert_eq!(warrior.instructions[0].b_value, 1);
    assert_eq!(warrior.instructions[1].a_value, 4000);
}

#[test]
fn disassembly_reassembles_to_the_same_image() {
    let source = "\
;assert 1
ADD.AB #4, $3
MOV.I  $2, @-2
SPL    {1, <5
SNE.X  *3, }2
LDP.A  #5, $1
DAT.F  #0, #0
";
    let warrior = assemble_ok(source, &CompileOptions::default());
    let mut round_trip = String::from(";assert 1\n");
    for instr in &warrior.instructions {
        round_trip.push_str(&disassemble(instr));
        round_trip.push('\n');
    }
    let again = assemble_ok(&round_trip, &CompileOptions::default());
    assert_eq!(warrior.instructions, again.instructions);
}

#[derive(Default)]
struct Recorder {
    accesses: Vec<CoreAccessEvent>,
    task_counts: Vec<TaskCountEvent>,
    round_ends: Vec<RoundEndEvent>,
}

#[derive(Clone, Default)]
struct SharedRecorder(Rc<RefCell<Recorder>>);

impl EventListener for SharedRecorder {
    fn on_core_access(&mut self, event: &CoreAccessEvent) {
        self.0.borrow_mut().accesses.push(*event);
    }

    fn on_task_count(&mut self, event: &TaskCountEvent) {
        self.0.borrow_mut().task_counts.push(*event);
    }

    fn on_round_end(&mut self, event: &RoundEndEvent) {
        self.0.borrow_mut().round_ends.push(*event);
    }
}

#[test]
fn events_trace_execution_and_round_end() {
    let options = Options {
        seed: Some(11),
        ..Options::default()
    };
    let compile = options.compile_options();
    let mut sim = Simulator::new(options);
    sim.load_warriors(vec![imp(&compile), sitting_duck(&compile)])
        .expect("loads");
    let recorder = SharedRecorder::default();
    sim.set_event_listener(Some(Box::new(recorder.clone())));
    let results = sim.run(Some(1));
    assert_eq!(results[0].winner_id, Some(0));

    let recorded = recorder.0.borrow();
    // First cycle: the imp executes at its own position and writes the
    // next cell.
    let executes: Vec<&CoreAccessEvent> = recorded
        .accesses
        .iter()
        .filter(|e| e.access_type == AccessType::Execute)
        .collect();
    assert_eq!(executes[0].warrior_id, 0);
    assert_eq!(executes[0].address, 0);
    assert!(recorded
        .accesses
        .iter()
        .any(|e| e.access_type == AccessType::Write && e.warrior_id == 0));
    // Task counts were reported for the executing rounds.
    assert!(!recorded.task_counts.is_empty());
    assert!(recorded.task_counts.iter().all(|e| e.task_count == 1));
    // Exactly one round end with the winner.
    assert_eq!(recorded.round_ends.len(), 1);
    assert_eq!(recorded.round_ends[0].winner_id, Some(0));
}

#[test]
fn event_streams_are_deterministic() {
    let trace = || {
        let options = Options {
            seed: Some(99),
            core_size: 800,
            max_cycles: 500,
            ..Options::default()
        };
        let compile = options.compile_options();
        let mut sim = Simulator::new(options);
        let bomber = assemble_ok(
            ";assert 1\nADD #7, 2\nMOV.I 1, @1\nDAT #0, #3\n ORG 0\n",
            &compile,
        );
        sim.load_warriors(vec![bomber, imp(&compile)]).expect("loads");
        let recorder = SharedRecorder::default();
        sim.set_event_listener(Some(Box::new(recorder.clone())));
        sim.run(Some(1));
        let recorded = recorder.0.borrow();
        recorded.accesses.clone()
    };
    assert_eq!(trace(), trace());
}

#[test]
fn pin_shares_pspace_between_rounds() {
    // Warrior A stores a value through STP in round 1; its partner
    // (same PIN) reads it back in round 2. Both warriors just loop
    // otherwise, so rounds are ties.
    let options = Options {
        seed: Some(5),
        core_size: 800,
        max_cycles: 100,
        rounds: 2,
        ..Options::default()
    };
    let compile = options.compile_options();
    let writer = assemble_ok(
        ";assert 1\nPIN 4\nSTP.AB #9, #5\nJMP $0\n",
        &compile,
    );
    let reader = assemble_ok(
        ";assert 1\nPIN 4\nLDP.AB #5, $1\nJMP $0\nDAT 0, 0\n",
        &compile,
    );
    let mut sim = Simulator::new(options);
    sim.load_warriors(vec![writer, reader]).expect("loads");
    sim.run(Some(1));
    sim.setup_round();
    let reader_position = sim.get_warriors()[1].position;
    // Let both warriors take a few cycles so the LDP executes.
    for _ in 0..4 {
        let _ = sim.step();
    }
    let loaded = sim.get_core().peek(reader_position + 1);
    assert_eq!(loaded.b_value, 9);
}

#[test]
fn thirty_seven_warriors_are_rejected() {
    let options = Options::default();
    let compile = options.compile_options();
    let mut sim = Simulator::new(options);
    let warriors: Vec<WarriorData> = (0..37).map(|_| sitting_duck(&compile)).collect();
    assert!(sim.load_warriors(warriors).is_err());
}

#[test]
fn all_opcode_mnemonics_survive_assembly() {
    let source = "\
;assert 1
start MOV 0, 1
      ADD #1, 2
      SUB #1, 2
      MUL #2, 2
      DIV #2, 2
      MOD #2, 2
      JMP start
      JMZ start, #0
      JMN start, #1
      DJN start, #5
      CMP #1, #1
      SEQ #1, #1
      SNE #1, #2
      SLT #1, #2
      SPL start
      NOP 0, 0
      LDP #1, 2
      STP #1, 2
      DAT 0, 0
";
    let warrior = assemble_ok(source, &CompileOptions::default());
    assert_eq!(warrior.instructions.len(), 19);
    // CMP is an alias of SEQ.
    assert_eq!(warrior.instructions[10].opcode, Opcode::Seq);
    assert_eq!(warrior.instructions[11].opcode, Opcode::Seq);
}

#[test]
fn seq_i_treats_modifier_differing_cells_as_equal() {
    // The compared cells agree on opcode, modes and both field values
    // and differ only in modifier, which .I equality ignores.
    let options = Options {
        seed: Some(3),
        ..Options::default()
    };
    let compile = options.compile_options();
    let seq = assemble_ok(
        ";assert 1\nSEQ.I 2, 3\nJMP 0\nMOV.AB #4, #4\nMOV.BA #4, #4\n",
        &compile,
    );
    let sne = assemble_ok(
        ";assert 1\nSNE.I 2, 3\nJMP 0\nMOV.AB #4, #4\nMOV.BA #4, #4\n",
        &compile,
    );

    let mut sim = Simulator::new(options.clone());
    sim.load_warriors(vec![seq, imp(&compile)]).expect("loads");
    sim.setup_round();
    let _ = sim.step();
    // SEQ.I skips over the JMP: the requeued task is position + 2.
    assert_eq!(sim.get_warriors()[0].queue.peek(), Some(2));

    let mut sim = Simulator::new(options);
    sim.load_warriors(vec![sne, imp(&compile)]).expect("loads");
    sim.setup_round();
    let _ = sim.step();
    // The same cells are equal under .I, so SNE.I does not skip.
    assert_eq!(sim.get_warriors()[0].queue.peek(), Some(1));
}

#[test]
fn addressing_mode_sigils_parse() {
    let source = "\
;assert 1
DAT 0, 0
MOV #1, $2
MOV @1, <2
MOV >1, *2
MOV {1, }2
";
    let warrior = assemble_ok(source, &CompileOptions::default());
    let modes: Vec<(AddrMode, AddrMode)> = warrior.instructions[1..]
        .iter()
        .map(|i| (i.a_mode, i.b_mode))
        .collect();
    assert_eq!(
        modes,
        vec![
            (AddrMode::Immediate, AddrMode::Direct),
            (AddrMode::BIndirect, AddrMode::BPredecrement),
            (AddrMode::BPostincrement, AddrMode::AIndirect),
            (AddrMode::APredecrement, AddrMode::APostincrement),
        ]
    );
}
