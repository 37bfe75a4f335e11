//! consolidation-engine CLI
//!
//! Run a consolidation over a JSON scenario from the command line.
//!
//! # Usage
//!
//! ```bash
//! # Consolidate the latest period in a scenario
//! consolidation-engine run --input group.json
//!
//! # Dry run, output as JSON
//! consolidation-engine run --input group.json --dry-run --format json
//!
//! # Show effective ownership as of a date
//! consolidation-engine ownership --input group.json --as-of 2025-11-30
//!
//! # Generate a random group for testing
//! consolidation-engine generate --entities 20 --output group.json
//! ```

use chrono::NaiveDate;
use consolidation_engine::core::ledger::ConsolLine;
use consolidation_engine::core::period::Period;
use consolidation_engine::core::posting::IntercompanyPosting;
use consolidation_engine::elimination::matcher::MatchProposal;
use consolidation_engine::graph::resolver::OwnershipResolver;
use consolidation_engine::run::orchestrator::RunReport;
use consolidation_engine::run::providers::MemorySink;
use consolidation_engine::run::store::{ConfigurationIssue, RunRecord, RunSummary};
use consolidation_engine::scenario::Scenario;
use consolidation_engine::simulation::group_generator::{generate_group, GroupGeneratorConfig};
use std::fs;
use std::process;
use std::sync::Arc;

fn print_usage() {
    eprintln!(
        r#"consolidation-engine — multi-entity financial consolidation

USAGE:
    consolidation-engine <COMMAND> [OPTIONS]

COMMANDS:
    run         Consolidate one period of a scenario
    ownership   Resolve effective ownership and consolidation methods
    generate    Generate a random group scenario (for testing)
    help        Show this message

OPTIONS (run):
    --input <FILE>      Path to JSON scenario file
    --period <YYYY-MM>  Period to consolidate (default: latest in the scenario)
    --dry-run           Compute without persisting lines
    --lock              Lock the run after computing it
    --format <FORMAT>   Output format: text (default) or json

OPTIONS (ownership):
    --input <FILE>      Path to JSON scenario file
    --as-of <DATE>      As-of date YYYY-MM-DD (default: end of latest period)
    --format <FORMAT>   Output format: text (default) or json

OPTIONS (generate):
    --entities <N>      Number of entities including the parent (default: 10)
    --pairs <N>         Intercompany posting pairs (default: 10)
    --seed <N>          Seed for a reproducible group
    --output <FILE>     Write to file instead of stdout

EXAMPLES:
    consolidation-engine run --input group.json
    consolidation-engine run --input group.json --period 2025-11 --lock
    consolidation-engine ownership --input group.json --as-of 2025-11-30
    consolidation-engine generate --entities 50 --pairs 200 --output big.json"#
    );
}

fn load_scenario(path: &str) -> Scenario {
    Scenario::load(path).unwrap_or_else(|e| {
        eprintln!("Error loading scenario '{}': {}", path, e);
        process::exit(1);
    })
}

fn next_value(args: &[String], i: usize, option: &str, expected: &str) -> String {
    args.get(i).cloned().unwrap_or_else(|| {
        eprintln!("{} requires {}", option, expected);
        process::exit(1);
    })
}

fn parse_period(s: &str) -> Period {
    let parsed = s
        .split_once('-')
        .and_then(|(y, m)| Some((y.parse::<i32>().ok()?, m.parse::<u32>().ok()?)))
        .and_then(|(y, m)| Period::new(y, m));
    parsed.unwrap_or_else(|| {
        eprintln!("Invalid period '{}', expected YYYY-MM", s);
        process::exit(1);
    })
}

#[derive(serde::Serialize)]
struct RunOutput<'a> {
    run: &'a RunRecord,
    summary: &'a RunSummary,
    lines: &'a [ConsolLine],
    unresolved: &'a [IntercompanyPosting],
    pending: &'a [MatchProposal],
    issues: &'a [ConfigurationIssue],
}

fn print_report(report: &RunReport) {
    let record = &report.record;
    let result = &report.result;
    let summary = &result.summary;

    println!("Run {} — {} {}", record.id, record.group, record.period);
    println!("  State:               {}", record.state);
    if record.dry_run {
        println!("  Dry run:             lines not persisted");
    }
    println!("  Entities consolidated: {}", summary.entities_consolidated);
    println!("  Equity method:         {}", summary.entities_equity_method);
    println!("  Excluded:              {}", summary.entities_excluded);
    println!("  Lines:                 {}", summary.line_count);
    println!("  Total CTA:             {}", summary.total_cta);
    println!("  Total eliminations:    {}", summary.total_eliminations);
    println!("  Total NCI:             {}", summary.total_nci);
    println!(
        "  Matching:              {} matched, {} pending, {} unresolved ({:.1}%)",
        summary.matched_pairs,
        summary.pending_proposals,
        summary.unresolved_postings,
        summary.match_rate * 100.0
    );
    println!("  Balanced:              {}", if summary.balanced { "yes" } else { "NO" });

    if !result.issues.is_empty() {
        println!("\nConfiguration issues:");
        for issue in &result.issues {
            println!("  {:<10} {}", issue.entity, issue.error);
        }
    }

    println!("\n{:<14} {:<12} {:>18} {}", "TAG", "ACCOUNT", "AMOUNT", "");
    for line in &result.lines {
        println!(
            "{:<14} {:<12} {:>18} {}",
            line.tag.to_string(),
            line.account.to_string(),
            line.amount.to_string(),
            if line.unresolved { "*unresolved" } else { "" }
        );
    }

    if !result.pending.is_empty() {
        println!("\nPending match proposals:");
        for p in &result.pending {
            println!(
                "  {} / {}  delta {}  confidence {}",
                p.pair.first, p.pair.second, p.delta, p.confidence
            );
        }
    }
}

fn cmd_run(args: &[String]) {
    let mut input_path = None;
    let mut period = None;
    let mut dry_run = false;
    let mut lock = false;
    let mut format = "text".to_string();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--input" => {
                i += 1;
                input_path = Some(next_value(args, i, "--input", "a file path"));
            }
            "--period" => {
                i += 1;
                period = Some(parse_period(&next_value(args, i, "--period", "YYYY-MM")));
            }
            "--dry-run" => dry_run = true,
            "--lock" => lock = true,
            "--format" => {
                i += 1;
                format = next_value(args, i, "--format", "'text' or 'json'");
            }
            _ => {
                eprintln!("Unknown option: {}", args[i]);
                process::exit(1);
            }
        }
        i += 1;
    }

    if dry_run && lock {
        eprintln!("Error: --dry-run and --lock cannot be combined");
        process::exit(1);
    }

    let path = input_path.unwrap_or_else(|| {
        eprintln!("Error: --input <FILE> is required");
        process::exit(1);
    });

    let scenario = load_scenario(&path);
    let period = period.or_else(|| scenario.latest_period()).unwrap_or_else(|| {
        eprintln!("Error: scenario has no periods and no --period was given");
        process::exit(1);
    });

    let sink = Arc::new(MemorySink::new());
    let orchestrator = scenario
        .orchestrator()
        .unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            process::exit(1);
        })
        .with_sink(sink.clone());

    let record = orchestrator.create_run(&scenario.group, period, dry_run, "cli");
    let mut report = orchestrator.compute(record.id).unwrap_or_else(|e| {
        eprintln!("Run {} failed: {}", record.id, e);
        process::exit(2);
    });

    if lock {
        report.record = orchestrator.lock_run(record.id, "cli").unwrap_or_else(|e| {
            eprintln!("Run {} could not be locked: {}", record.id, e);
            process::exit(2);
        });
        log::info!("published {} run(s) to the sink", sink.published().len());
    }

    if format == "json" {
        let output = RunOutput {
            run: &report.record,
            summary: &report.result.summary,
            lines: &report.result.lines,
            unresolved: &report.result.unresolved,
            pending: &report.result.pending,
            issues: &report.result.issues,
        };
        match serde_json::to_string_pretty(&output) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error serializing result: {}", e);
                process::exit(1);
            }
        }
    } else {
        print_report(&report);
    }
}

fn cmd_ownership(args: &[String]) {
    let mut input_path = None;
    let mut as_of = None;
    let mut format = "text".to_string();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--input" => {
                i += 1;
                input_path = Some(next_value(args, i, "--input", "a file path"));
            }
            "--as-of" => {
                i += 1;
                let raw = next_value(args, i, "--as-of", "a date (YYYY-MM-DD)");
                as_of = Some(NaiveDate::parse_from_str(&raw, "%Y-%m-%d").unwrap_or_else(|e| {
                    eprintln!("Invalid date '{}': {}", raw, e);
                    process::exit(1);
                }));
            }
            "--format" => {
                i += 1;
                format = next_value(args, i, "--format", "'text' or 'json'");
            }
            _ => {
                eprintln!("Unknown option: {}", args[i]);
                process::exit(1);
            }
        }
        i += 1;
    }

    let path = input_path.unwrap_or_else(|| {
        eprintln!("Error: --input <FILE> is required");
        process::exit(1);
    });

    let scenario = load_scenario(&path);
    let as_of = as_of
        .or_else(|| scenario.latest_period().map(|p| p.as_of()))
        .unwrap_or_else(|| chrono::Utc::now().date_naive());

    let resolution = OwnershipResolver::new(scenario.config.settings.clone())
        .resolve(&scenario.config.root, &scenario.config.ownership, as_of)
        .unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            process::exit(2);
        });

    if format == "json" {
        match serde_json::to_string_pretty(&resolution) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error serializing resolution: {}", e);
                process::exit(1);
            }
        }
        return;
    }

    println!("Ownership of {} as of {}", resolution.root, as_of);
    println!("{:<10} {:>10} {:>12}  {:<13} {}", "ENTITY", "EFFECTIVE", "CONTROLLED", "METHOD", "NOTE");
    for r in resolution.entities() {
        let note = match r.exclusion {
            Some(reason) => format!("excluded ({:?})", reason),
            None => String::new(),
        };
        println!(
            "{:<10} {:>10} {:>12}  {:<13} {}",
            r.entity.to_string(),
            r.effective_percentage.round_dp(4).to_string(),
            r.controlled_holding.round_dp(4).to_string(),
            r.method.to_string(),
            note
        );
        for p in &r.paths {
            let chain: Vec<&str> = p.entities.iter().map(|e| e.as_str()).collect();
            println!("    {} = {}", chain.join(" → "), p.percentage.round_dp(4));
        }
    }
}

fn cmd_generate(args: &[String]) {
    let mut config = GroupGeneratorConfig::default();
    let mut output_path: Option<String> = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--entities" => {
                i += 1;
                config.entity_count = args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--entities requires a number");
                    process::exit(1);
                });
            }
            "--pairs" => {
                i += 1;
                config.intercompany_pairs = args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--pairs requires a number");
                    process::exit(1);
                });
            }
            "--seed" => {
                i += 1;
                config.seed = Some(args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--seed requires a number");
                    process::exit(1);
                }));
            }
            "--output" => {
                i += 1;
                output_path = Some(next_value(args, i, "--output", "a file path"));
            }
            _ => {
                eprintln!("Unknown option: {}", args[i]);
                process::exit(1);
            }
        }
        i += 1;
    }

    let scenario = generate_group(&config);
    let json = scenario.to_json().unwrap_or_else(|e| {
        eprintln!("Error serializing scenario: {}", e);
        process::exit(1);
    });

    if let Some(path) = output_path {
        fs::write(&path, &json).unwrap_or_else(|e| {
            eprintln!("Error writing to '{}': {}", path, e);
            process::exit(1);
        });
        eprintln!(
            "Generated group {} with {} entities and {} ownership edges → {}",
            scenario.group,
            scenario.config.entities.len(),
            scenario.config.ownership.len(),
            path
        );
    } else {
        println!("{}", json);
    }
}

fn main() {
    env_logger::init();
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let command = args[1].as_str();
    let rest = &args[2..];

    match command {
        "run" => cmd_run(rest),
        "ownership" => cmd_ownership(rest),
        "generate" => cmd_generate(rest),
        "help" | "--help" | "-h" => print_usage(),
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            process::exit(1);
        }
    }
}
