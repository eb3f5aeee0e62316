//! End-to-end tests for sampling, simulation, metrics and optimization.

use folioquant::core::timeseries::TimeSeries;
use folioquant::core::types::{TradeRecord, NANOS_PER_DAY};
use folioquant::portfolio::optimizer::GroupBound;
use folioquant::{
    AnalyticsConfig, MonteCarloConfig, MonteCarloEngine, OptimizationObjective, PortfolioConstraints,
    PortfolioMetricsCalculator, PortfolioOptimizer, QuantError, ReturnsSampler, RiskMeasure,
    StrategyReturns,
};

fn sample_trades() -> Vec<TradeRecord> {
    vec![
        TradeRecord::new(100.0, 1000.0, 1),
        TradeRecord::new(-50.0, 1000.0, 2),
        TradeRecord::new(200.0, 1000.0, 3),
    ]
}

fn engine() -> MonteCarloEngine {
    MonteCarloEngine::new(
        MonteCarloConfig::default()
            .with_simulations(1000)
            .with_horizon(12)
            .with_initial_equity(10_000.0)
            .with_seed(7),
    )
    .unwrap()
}

#[test]
fn test_monte_carlo_from_trades() {
    let returns = ReturnsSampler::from_trades(&sample_trades()).unwrap();
    assert_eq!(returns.values, vec![0.1, -0.05, 0.2]);

    let result = engine().run_seeded(returns.values()).unwrap();

    assert_eq!(result.expected_equity_curve.len(), 13);
    assert_eq!(result.expected_equity_curve[0], 10_000.0);

    let dd_total: f64 = result.drawdown_distribution.iter().map(|b| b.frequency).sum();
    assert!((dd_total - 1.0).abs() < 1e-9);
    let eq_total: f64 = result.final_equity_distribution.iter().map(|b| b.frequency).sum();
    assert!((eq_total - 1.0).abs() < 1e-9);

    let b95 = result.band(0.95).unwrap();
    let b80 = result.band(0.80).unwrap();
    for t in 0..13 {
        let expected = result.expected_equity_curve[t];
        assert!(b95.lower[t] <= expected && expected <= b95.upper[t]);
        assert!(b95.upper[t] - b95.lower[t] >= b80.upper[t] - b80.lower[t]);
    }

    // Every draw is at least -5%, so a 12-step path never falls below 0.95^12.
    let floor = 10_000.0 * 0.95f64.powi(12);
    assert!(result.worst_case.iter().all(|v| *v >= floor - 1e-6));
    assert!(result.best_case[12] >= result.worst_case[12]);
}

#[test]
fn test_monte_carlo_seed_reproducible() {
    let returns = [0.1, -0.05, 0.2];
    let first = engine().run_seeded(&returns).unwrap();
    let second = engine().run_seeded(&returns).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_identical_strategies() {
    let values = vec![0.01, -0.02, 0.015, 0.003, -0.004];
    let strategies = vec![
        StrategyReturns::new("alpha", TimeSeries::from_values(values.clone())),
        StrategyReturns::new("beta", TimeSeries::from_values(values)),
    ];
    let metrics = PortfolioMetricsCalculator::default()
        .calculate(&strategies, &[0.5, 0.5])
        .unwrap();

    assert_eq!(metrics.correlation_matrix[0][1], 1.0);
    assert_eq!(metrics.correlation_matrix[1][0], 1.0);
    assert!((metrics.diversification_ratio - 1.0).abs() < 1e-9);
    assert!(metrics.degenerate_pairs.is_empty());
}

#[test]
fn test_metrics_on_daily_aggregated_trades() {
    let day = NANOS_PER_DAY;
    let a = vec![
        TradeRecord::new(10.0, 100.0, day + 1),
        TradeRecord::new(-5.0, 100.0, day + 2),
        TradeRecord::new(8.0, 100.0, 2 * day),
        TradeRecord::new(-3.0, 100.0, 4 * day),
    ];
    let b = vec![
        TradeRecord::new(4.0, 200.0, day),
        TradeRecord::new(-6.0, 200.0, 3 * day),
        TradeRecord::new(10.0, 200.0, 4 * day + 9),
    ];
    let daily = |trades: &[TradeRecord]| {
        ReturnsSampler::aggregate_by_period(&ReturnsSampler::from_trades(trades).unwrap(), day).unwrap()
    };
    let strategies = vec![
        StrategyReturns::new("a", daily(&a)),
        StrategyReturns::new("b", daily(&b)),
    ];

    let metrics = PortfolioMetricsCalculator::default()
        .calculate(&strategies, &[0.6, 0.4])
        .unwrap();
    // Union of days 1, 2, 3, 4.
    assert_eq!(metrics.observations, 4);
    assert!(metrics.volatility > 0.0);
    assert!(metrics.calmar_ratio.is_none());

    let err = PortfolioMetricsCalculator::default()
        .calculate_with_benchmark(&strategies, &[0.6, 0.4], None)
        .unwrap_err();
    assert!(matches!(err, QuantError::MissingBenchmark { .. }));

    let calculator = PortfolioMetricsCalculator::default();
    let portfolio = calculator.portfolio_returns(&strategies, &[0.6, 0.4]).unwrap();
    assert!(calculator.tracking_error(&portfolio, None).is_err());
    let benchmark = TimeSeries::new(vec![day, 2 * day, 3 * day, 4 * day], vec![0.01, -0.01, 0.02, 0.0]).unwrap();
    let relative = calculator.benchmark_metrics(&portfolio, Some(&benchmark)).unwrap();
    assert!(relative.tracking_error > 0.0);
    let full = calculator
        .calculate_with_benchmark(&strategies, &[0.6, 0.4], Some(&benchmark))
        .unwrap();
    assert_eq!(full.calmar_ratio, Some(relative.calmar_ratio));
}

fn universe() -> Vec<StrategyReturns> {
    vec![
        StrategyReturns::new("bonds", TimeSeries::from_values(vec![0.002, 0.001, 0.003, 0.0, 0.002, 0.001])),
        StrategyReturns::new("stocks", TimeSeries::from_values(vec![0.02, -0.015, 0.03, -0.01, 0.025, -0.02])),
        StrategyReturns::new("gold", TimeSeries::from_values(vec![-0.005, 0.01, -0.002, 0.008, -0.004, 0.006])),
    ]
}

#[test]
fn test_optimizer_weights_sum_and_bounds() {
    let optimizer = PortfolioOptimizer::default();
    let constraints = PortfolioConstraints::bounded(0.05, 0.6);
    let objectives = [
        OptimizationObjective::MaxSharpe,
        OptimizationObjective::MinRisk(RiskMeasure::Volatility),
        OptimizationObjective::MinRisk(RiskMeasure::MaxDrawdown),
        OptimizationObjective::MaxReturn,
    ];

    for objective in objectives {
        let result = optimizer.optimize(&universe(), objective, &constraints).unwrap();
        assert!(result.converged);
        let sum: f64 = result.weights.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6, "{objective:?} sums to {sum}");
        for w in &result.weights {
            assert!(*w >= 0.05 - 1e-9 && *w <= 0.6 + 1e-9, "{objective:?} weight {w}");
        }
    }
}

#[test]
fn test_risk_parity_equal_contributions_or_error() {
    let optimizer = PortfolioOptimizer::default();
    let result = optimizer
        .optimize(&universe(), OptimizationObjective::RiskParity, &PortfolioConstraints::default())
        .unwrap();
    for rc in &result.risk_contributions {
        assert!((rc - 1.0 / 3.0).abs() < 1e-6, "contribution {rc}");
    }

    // The low-volatility sleeve needs far more than 60 % for equal risk.
    let err = optimizer
        .optimize(&universe(), OptimizationObjective::RiskParity, &PortfolioConstraints::bounded(0.05, 0.6))
        .unwrap_err();
    assert!(matches!(err, QuantError::InfeasibleConstraints { .. }));
}

#[test]
fn test_optimizer_group_bound() {
    let constraints = PortfolioConstraints::default().with_group(GroupBound {
        name: "risky".into(),
        members: vec!["stocks".into(), "gold".into()],
        min: 0.0,
        max: 0.3,
    });
    let result = PortfolioOptimizer::default()
        .optimize(&universe(), OptimizationObjective::MaxReturn, &constraints)
        .unwrap();
    let risky = result.weights[1] + result.weights[2];
    assert!(risky <= 0.3 + 1e-4, "risky weight {risky}");
}

#[test]
fn test_config_from_toml() {
    let config = AnalyticsConfig::from_toml_str(
        r#"
        [monte_carlo]
        n_simulations = 250
        time_horizon = 12

        [optimizer]
        max_iterations = 500

        [rebalance]
        strategy = "risk_parity"
        max_trade_value = 5000.0
        "#,
    )
    .unwrap();
    assert_eq!(config.monte_carlo.n_simulations, 250);
    assert_eq!(config.optimizer.max_iterations, 500);
    assert_eq!(config.rebalance.max_trade_value, 5000.0);
    assert_eq!(config.metrics.periods_per_year, 252.0);
}
