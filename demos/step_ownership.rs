//! Step ownership resolution example.
//!
//! Walks a group where one subsidiary is held both directly and through an
//! intermediate holding, and shows how effective percentage, control and
//! consolidation method come out of the resolver.

use chrono::NaiveDate;
use consolidation_engine::prelude::*;
use rust_decimal_macros::dec;

fn main() {
    println!("╔════════════════════════════════════════════════╗");
    println!("║  consolidation-engine: Step Ownership Example  ║");
    println!("╚════════════════════════════════════════════════╝\n");

    let acquired = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
    let as_of = NaiveDate::from_ymd_opt(2025, 11, 30).unwrap();

    println!("Holdings:");
    println!("  PARENT → HOLD:   60%");
    println!("  HOLD   → OPCO:   60%");
    println!("  PARENT → SERV:  100%");
    println!("  SERV   → OPCO:   30%");
    println!("  PARENT → JV:     50% (joint control)");
    println!("  HOLD   → ASSOC:  25%\n");

    let edges = vec![
        OwnershipEdge::new("PARENT", "HOLD", dec!(0.60), acquired),
        OwnershipEdge::new("HOLD", "OPCO", dec!(0.60), acquired).shared(),
        OwnershipEdge::new("PARENT", "SERV", dec!(1.00), acquired),
        OwnershipEdge::new("SERV", "OPCO", dec!(0.30), acquired).shared(),
        OwnershipEdge::new("PARENT", "JV", dec!(0.50), acquired).joint(),
        OwnershipEdge::new("HOLD", "ASSOC", dec!(0.25), acquired),
    ];

    let resolver = OwnershipResolver::new(EngineSettings::default());
    let resolution = match resolver.resolve(&EntityCode::new("PARENT"), &edges, as_of) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("resolution failed: {}", e);
            return;
        }
    };

    println!("━━━ Resolution at {} ━━━\n", as_of);
    println!(
        "  {:<8} {:>10} {:>11} {:<13} {:>6}",
        "entity", "effective", "controlled", "method", "NCI"
    );
    for r in resolution.entities() {
        println!(
            "  {:<8} {:>10} {:>11} {:<13} {:>6}",
            r.entity.as_str(),
            r.effective_percentage.round_dp(4),
            r.controlled_holding.round_dp(4),
            r.method.to_string(),
            r.nci_share().round_dp(4)
        );
        for path in &r.paths {
            let chain: Vec<&str> = path.entities.iter().map(|e| e.as_str()).collect();
            println!("      via {} = {}", chain.join(" → "), path.percentage.round_dp(4));
        }
    }

    // OPCO: 0.60 × 0.60 + 1.00 × 0.30 = 0.66 effective, but control is judged
    // on direct holdings by controlled parents: 0.60 + 0.30 = 0.90.
    println!("\n━━━ Closing the loop ━━━\n");
    let mut cyclic = edges.clone();
    cyclic.push(OwnershipEdge::new("OPCO", "HOLD", dec!(0.10), acquired).shared());
    cyclic[0] = cyclic[0].clone().shared();
    match resolver.resolve(&EntityCode::new("PARENT"), &cyclic, as_of) {
        Ok(_) => println!("  unexpectedly resolved"),
        Err(e) => println!("  rejected: {}", e),
    }
}
