// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

// CLI entrypoint for redMARS.

use std::fs;
use std::process::ExitCode;

use clap::Parser;
use serde_json::json;

use redmars::assembler::{assemble, Severity};
use redmars::cli::{validate_cli, Cli, OutputFormat};
use redmars::redcode::{disassemble, Instruction, WarriorData};
use redmars::vm::{RoundOutcome, RoundResult, Simulator};

fn main() -> ExitCode {
    let cli = Cli::parse();
    let options = match validate_cli(&cli) {
        Ok(options) => options,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let compile_options = options.compile_options();
    let mut warriors: Vec<WarriorData> = Vec::new();
    let mut diagnostics = Vec::new();
    let mut failed = false;

    for path in &cli.files {
        let source = match fs::read_to_string(path) {
            Ok(source) => source,
            Err(err) => {
                eprintln!("{}: {err}", path.display());
                return ExitCode::FAILURE;
            }
        };
        let result = assemble(&source, &compile_options);
        for message in &result.messages {
            diagnostics.push((path.display().to_string(), message.clone()));
        }
        match result.warrior {
            Some(warrior) => warriors.push(warrior),
            None => failed = true,
        }
    }

    if cli.format == OutputFormat::Text {
        for (file, message) in &diagnostics {
            if cli.quiet && message.severity != Severity::Error {
                continue;
            }
            eprintln!("{file}: {message}");
        }
    }

    if failed {
        if cli.format == OutputFormat::Json {
            println!("{}", json_report(&cli, &diagnostics, &[], None));
        }
        return ExitCode::FAILURE;
    }

    let mut sim = Simulator::new(options);
    if let Err(err) = sim.load_warriors(warriors) {
        eprintln!("{err}");
        return ExitCode::FAILURE;
    }
    let results = sim.run(Some(cli.rounds));

    match cli.format {
        OutputFormat::Json => {
            println!("{}", json_report(&cli, &diagnostics, &results, Some(&sim)));
        }
        OutputFormat::Text => {
            if !cli.quiet {
                for (number, result) in results.iter().enumerate() {
                    match result.winner_id {
                        Some(id) => println!(
                            "round {}: {} wins",
                            number + 1,
                            sim.get_warriors()[id].name
                        ),
                        None => println!("round {}: tie", number + 1),
                    }
                }
            }
            for warrior in sim.get_warriors() {
                let wins = results
                    .iter()
                    .filter(|r| r.winner_id == Some(warrior.id))
                    .count();
                let ties = results.iter().filter(|r| r.winner_id.is_none()).count();
                println!(
                    "{}: {} wins, {} ties of {} rounds (scores {:?})",
                    display_name(&warrior.name, warrior.id),
                    wins,
                    ties,
                    results.len(),
                    warrior.score
                );
            }
            if cli.dump_core {
                dump_core(&sim);
            }
        }
    }

    ExitCode::SUCCESS
}

fn display_name(name: &str, id: usize) -> String {
    if name.is_empty() {
        format!("warrior {id}")
    } else {
        name.to_string()
    }
}

fn dump_core(sim: &Simulator) {
    let core = sim.get_core();
    let blank = Instruction::default();
    for addr in 0..core.size() {
        let cell = core.peek(addr);
        if cell != blank {
            println!("{addr:06}  {}", disassemble(&cell));
        }
    }
}

fn json_report(
    cli: &Cli,
    diagnostics: &[(String, redmars::assembler::Message)],
    results: &[RoundResult],
    sim: Option<&Simulator>,
) -> String {
    let messages: Vec<serde_json::Value> = diagnostics
        .iter()
        .map(|(file, message)| {
            json!({
                "file": file,
                "severity": message.severity.to_string(),
                "line": message.line,
                "text": message.text,
            })
        })
        .collect();
    let rounds: Vec<serde_json::Value> = results
        .iter()
        .map(|result| {
            json!({
                "winner": result.winner_id,
                "outcome": match result.outcome {
                    RoundOutcome::Win => "WIN",
                    RoundOutcome::Tie => "TIE",
                },
            })
        })
        .collect();
    let warriors: Vec<serde_json::Value> = sim
        .map(|sim| {
            sim.get_warriors()
                .iter()
                .map(|warrior| {
                    json!({
                        "id": warrior.id,
                        "name": warrior.name,
                        "author": warrior.author,
                        "scores": warrior.score,
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    json!({
        "files": cli.files.iter().map(|p| p.display().to_string()).collect::<Vec<_>>(),
        "messages": messages,
        "rounds": rounds,
        "warriors": warriors,
    })
    .to_string()
}
