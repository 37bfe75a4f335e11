use consolidation_engine::core::posting::PostingSet;
use consolidation_engine::elimination::decisions::DecisionLog;
use consolidation_engine::elimination::matcher::EliminationMatcher;
use consolidation_engine::graph::resolver::OwnershipResolver;
use consolidation_engine::scenario::Scenario;
use consolidation_engine::simulation::group_generator::{generate_group, GroupGeneratorConfig};
use consolidation_engine::translation::engine::TranslationEngine;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn scenario(entity_count: usize) -> Scenario {
    generate_group(&GroupGeneratorConfig {
        entity_count,
        intercompany_pairs: entity_count * 2,
        seed: Some(entity_count as u64),
        ..Default::default()
    })
}

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_ownership");
    for size in [10, 100, 500] {
        let s = scenario(size);
        let Ok(period) = s.periods[0].period() else {
            continue;
        };
        let as_of = period.as_of();
        let resolver = OwnershipResolver::new(s.config.settings.clone());
        group.bench_with_input(BenchmarkId::from_parameter(size), &s, |b, s| {
            b.iter(|| resolver.resolve(black_box(&s.config.root), black_box(&s.config.ownership), as_of))
        });
    }
    group.finish();
}

fn bench_translate(c: &mut Criterion) {
    let mut group = c.benchmark_group("translate_all_entities");
    for size in [10, 100, 500] {
        let s = scenario(size);
        let data = &s.periods[0];
        let Ok(period) = data.period() else {
            continue;
        };
        let config = &s.config;
        let engine = TranslationEngine::new(
            &config.rate_policy,
            &config.rate_overrides,
            &config.account_map,
            &s.rates,
            &config.presentation,
            period,
        );
        group.bench_function(BenchmarkId::from_parameter(size), |b| {
            b.iter(|| {
                for tb in &data.trial_balances {
                    let _ = black_box(engine.translate(tb));
                }
            })
        });
    }
    group.finish();
}

fn bench_match(c: &mut Criterion) {
    let mut group = c.benchmark_group("match_intercompany");
    for size in [10, 100, 500] {
        let s = scenario(size);
        let set: PostingSet = s.periods[0].postings.iter().cloned().collect();
        let decisions = DecisionLog::new();
        let matcher = EliminationMatcher::new(&s.config.elimination_rules, &s.config.presentation);
        group.bench_function(BenchmarkId::from_parameter(size), |b| {
            b.iter(|| matcher.run(black_box(&set), &decisions))
        });
    }
    group.finish();
}

fn bench_full_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("dry_run");
    group.sample_size(10);
    for size in [10, 100, 500] {
        let s = scenario(size);
        let Ok(orchestrator) = s.orchestrator() else {
            continue;
        };
        let period = s.periods[0].clone();
        group.bench_function(BenchmarkId::from_parameter(size), |b| {
            b.iter(|| orchestrator.start_run(&s.group, period.year, period.month, true))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_resolve, bench_translate, bench_match, bench_full_run);
criterion_main!(benches);
