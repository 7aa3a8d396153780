//! Benchmark for the market hunter's source-selection scoring pass.

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use parking_lot::Mutex;

use btc_agent_orchestrator::domain::{SourceMetric, SourceMetricMap};
use btc_agent_orchestrator::market_data::SourceKind;
use btc_agent_orchestrator::market_hunter::{assess_market_context, select_sources, MarketContext};

fn warm_metrics(with_history: bool) -> SourceMetricMap {
    let mut metrics = SourceMetricMap::new();
    for source in SourceKind::ALL {
        let mut metric = SourceMetric::new(source.name());
        if with_history {
            metric.record_call(true, Utc::now());
            metric.ewma_update(0.3, 0.8, 0.7);
        }
        metrics.insert(source.name().to_string(), metric);
    }
    metrics
}

fn cold_context() -> MarketContext {
    let market = btc_agent_orchestrator::domain::MarketSnapshot {
        price_usd: 60_000.0,
        volume_24h: 2.0e10,
        change_24h: 1.5,
        fear_greed: 50.0,
        at: Utc::now(),
    };
    assess_market_context(&market, Utc::now())
}

fn bench_select_sources(c: &mut Criterion) {
    let context = cold_context();
    let rng = Mutex::new(fastrand::Rng::new());

    let mut group = c.benchmark_group("select_sources");
    for (label, metrics) in [("cold", warm_metrics(false)), ("warm", warm_metrics(true))] {
        for max_sources in [1usize, 4, 8] {
            group.bench_with_input(
                BenchmarkId::new(label, max_sources),
                &max_sources,
                |b, &max_sources| {
                    b.iter(|| {
                        black_box(select_sources(
                            black_box(&context),
                            black_box(&metrics),
                            &rng,
                            0.1,
                            max_sources,
                        ))
                    });
                },
            );
        }
    }
    group.finish();
}

criterion_group!(benches, bench_select_sources);
criterion_main!(benches);
