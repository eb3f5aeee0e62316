//! Benchmarks for folioquant simulation, metrics and optimization.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use folioquant::core::timeseries::TimeSeries;
use folioquant::{
    MonteCarloConfig, MonteCarloEngine, OptimizationObjective, PortfolioConstraints,
    PortfolioMetricsCalculator, PortfolioOptimizer, RiskMeasure, StrategyReturns,
};

/// Deterministic oscillating returns.
fn generate_returns(n: usize, phase: f64) -> Vec<f64> {
    (0..n)
        .map(|i| 0.0005 + 0.01 * ((i as f64 * 0.37 + phase).sin()))
        .collect()
}

fn generate_universe(assets: usize, n: usize) -> Vec<StrategyReturns> {
    (0..assets)
        .map(|a| {
            StrategyReturns::new(
                format!("S{a}"),
                TimeSeries::from_values(generate_returns(n, a as f64 * 1.3)),
            )
        })
        .collect()
}

fn bench_monte_carlo(c: &mut Criterion) {
    let mut group = c.benchmark_group("monte_carlo");
    let returns = generate_returns(500, 0.0);

    for n_sims in [1000, 5000, 10000].iter() {
        group.bench_with_input(BenchmarkId::new("simulations", n_sims), n_sims, |b, &n_sims| {
            let engine = MonteCarloEngine::new(
                MonteCarloConfig::default().with_simulations(n_sims).with_horizon(252),
            )
            .unwrap();

            b.iter(|| {
                let result = engine.run_seeded(black_box(&returns));
                black_box(result)
            });
        });
    }

    group.finish();
}

fn bench_metrics(c: &mut Criterion) {
    let mut group = c.benchmark_group("portfolio_metrics");

    for assets in [2, 8, 32].iter() {
        group.bench_with_input(BenchmarkId::new("strategies", assets), assets, |b, &assets| {
            let universe = generate_universe(assets, 1000);
            let weights = vec![1.0 / assets as f64; assets];
            let calculator = PortfolioMetricsCalculator::default();

            b.iter(|| {
                let result = calculator.calculate(black_box(&universe), black_box(&weights));
                black_box(result)
            });
        });
    }

    group.finish();
}

fn bench_optimizer(c: &mut Criterion) {
    let mut group = c.benchmark_group("optimizer");
    let universe = generate_universe(8, 500);
    let optimizer = PortfolioOptimizer::default();
    let constraints = PortfolioConstraints::bounded(0.0, 0.4);

    for (name, objective) in [
        ("min_variance", OptimizationObjective::MinRisk(RiskMeasure::Volatility)),
        ("max_sharpe", OptimizationObjective::MaxSharpe),
        ("risk_parity", OptimizationObjective::RiskParity),
    ] {
        group.bench_function(name, |b| {
            b.iter(|| {
                let result = optimizer.optimize(black_box(&universe), objective, &constraints);
                black_box(result)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_monte_carlo, bench_metrics, bench_optimizer);
criterion_main!(benches);
