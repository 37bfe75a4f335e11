//! Month-end group close example.
//!
//! Runs a full consolidation for a three-entity group with a euro
//! subsidiary and an intercompany loan, prints the consolidated lines,
//! locks the run and shows what the downstream sink received.

use chrono::NaiveDate;
use consolidation_engine::prelude::*;
use rust_decimal_macros::dec;
use std::sync::Arc;

fn main() {
    env_logger::init();

    println!("╔═════════════════════════════════════════════╗");
    println!("║  consolidation-engine: Group Close Example  ║");
    println!("╚═════════════════════════════════════════════╝\n");

    let acquired = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
    let period = Period::new(2025, 11).unwrap();

    let mut config = GroupConfig::new("HQ", LedgerPresentation::new("USD"));
    config.entities = vec![
        Entity::new("HQ", "USD"),
        Entity::new("US-OPS", "USD"),
        Entity::new("DE-GMBH", "EUR"),
    ];
    config.ownership = vec![
        OwnershipEdge::new("HQ", "US-OPS", dec!(0.80), acquired),
        OwnershipEdge::new("US-OPS", "DE-GMBH", dec!(0.75), acquired),
    ];
    config.account_map = AccountMap::new()
        .with_pattern("1*", AccountPurpose::MonetaryAsset)
        .with_pattern("2*", AccountPurpose::MonetaryLiability)
        .with_pattern("3*", AccountPurpose::Equity)
        .with_pattern("4*", AccountPurpose::ProfitAndLoss);
    config.elimination_rules = vec![EliminationRule::new("LOANS", "*400").with_tolerance(dec!(1.00))];

    let policies = PolicyStore::new();
    policies.put_group("ACME", config);

    let rates = match RateTable::new(CurrencyCode::new("USD"))
        .with_rate("EUR", RateBasis::Closing, period, dec!(1.0834))
        .and_then(|r| r.with_rate("EUR", RateBasis::Average, period, dec!(1.0777)))
        .and_then(|r| r.with_rate("EUR", RateBasis::Historical, period, dec!(1.1203)))
    {
        Ok(rates) => rates,
        Err(e) => {
            eprintln!("bad rate table: {}", e);
            return;
        }
    };

    println!("Trial balances (local currency):");
    println!("  HQ       cash 50,000           equity -50,000");
    println!("  US-OPS   cash 20,000  loan 10,000  equity -25,000  P&L -5,000");
    println!("  DE-GMBH  cash 35,000  loan -9,230.20 EUR  equity -20,000  P&L -5,769.80\n");

    let ledger = MemoryLedger::new();
    ledger.put_trial_balance(
        period,
        TrialBalance::new(
            EntityCode::new("HQ"),
            vec![
                TrialBalanceLine::new("1000", dec!(50000), "USD"),
                TrialBalanceLine::new("3000", dec!(-50000), "USD"),
            ],
        ),
    );
    ledger.put_trial_balance(
        period,
        TrialBalance::new(
            EntityCode::new("US-OPS"),
            vec![
                TrialBalanceLine::new("1000", dec!(20000), "USD"),
                TrialBalanceLine::new("1400", dec!(10000), "USD"),
                TrialBalanceLine::new("3000", dec!(-25000), "USD"),
                TrialBalanceLine::new("4000", dec!(-5000), "USD"),
            ],
        ),
    );
    ledger.put_trial_balance(
        period,
        TrialBalance::new(
            EntityCode::new("DE-GMBH"),
            vec![
                TrialBalanceLine::new("1000", dec!(35000), "EUR"),
                TrialBalanceLine::new("2400", dec!(-9230.20), "EUR"),
                TrialBalanceLine::new("3000", dec!(-20000), "EUR"),
                TrialBalanceLine::new("4000", dec!(-5769.80), "EUR"),
            ],
        ),
    );
    let date = period.as_of();
    ledger.add_posting(
        period,
        IntercompanyPosting::new("US-L-0001", "US-OPS", "DE-GMBH", "1400", dec!(10000), "USD", date),
    );
    ledger.add_posting(
        period,
        IntercompanyPosting::new("DE-L-0001", "DE-GMBH", "US-OPS", "2400", dec!(-9230.20), "EUR", date),
    );

    let sink = Arc::new(MemorySink::new());
    let orchestrator =
        Orchestrator::new(policies, Arc::new(ledger), Arc::new(rates)).with_sink(sink.clone());

    let run_id = match orchestrator.start_run("ACME", period.year, period.month, false) {
        Ok(id) => id,
        Err(e) => {
            eprintln!("run rejected: {}", e);
            return;
        }
    };
    let result = match orchestrator.get_result(run_id) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("run {} has no result: {}", run_id, e);
            return;
        }
    };

    println!("━━━ Consolidated lines ━━━\n");
    for line in &result.lines {
        let flag = if line.unresolved { " (unresolved)" } else { "" };
        println!("  {:<10} {:<22} {:>12}{}", line.account.as_str(), format!("{:?}", line.tag), line.amount, flag);
    }

    let s = &result.summary;
    println!("\n━━━ Summary ━━━\n");
    println!("  Entities consolidated: {}", s.entities_consolidated);
    println!("  CTA:                   {}", s.total_cta);
    println!("  NCI:                   {}", s.total_nci);
    println!("  Matched pairs:         {}", s.matched_pairs);
    println!("  Pending proposals:     {}", s.pending_proposals);
    println!("  Match rate:            {:.1}%", s.match_rate * 100.0);
    println!("  Balanced:              {}", s.balanced);

    println!("\n━━━ Lock ━━━\n");
    match orchestrator.lock_run(run_id, "controller") {
        Ok(record) => println!("  Run {} is {}", record.id, record.state),
        Err(e) => println!("  Lock refused: {}", e),
    }
    for (record, lines) in sink.published() {
        println!("  Published {} lines for {} {}", lines.len(), record.group, record.period);
    }
}
