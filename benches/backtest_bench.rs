//! Criterion benchmarks for the replay loop and the grader.
//!
//! Run with: `cargo bench`

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use smcbot::backtesting::{SignalEvent, SimulatorSettings};
use smcbot::strategy::{CascadeConfig, QualityConfig, SignalQualityGrader};
use smcbot::types::{
    Bias, ConfluenceFactor, FactorKind, LiquiditySide, LiquidityZone, MarketStructure, PriceBar, Signal,
    SignalDirection, SmcAnalysis, Timeframe, TimeframeAnalysis,
};

fn context(bias: Bias, price: f64) -> Vec<TimeframeAnalysis> {
    let mut analyses: Vec<TimeframeAnalysis> = [Timeframe::D1, Timeframe::H4, Timeframe::H1]
        .into_iter()
        .map(|tf| TimeframeAnalysis {
            timeframe: tf,
            current_price: price,
            market_structure: MarketStructure {
                trend_direction: bias,
                ..Default::default()
            },
            smc: SmcAnalysis::default(),
            signal: None,
        })
        .collect();
    analyses[2].smc.liquidity_unswept = vec![
        LiquidityZone {
            side: LiquiditySide::Low,
            level: price * 0.999,
            swept_recently: false,
        },
        LiquidityZone {
            side: LiquiditySide::High,
            level: price * 1.003,
            swept_recently: false,
        },
    ];
    analyses
}

fn signal(i: usize, price: f64) -> Signal {
    let direction = if i % 2 == 0 {
        SignalDirection::Buy
    } else {
        SignalDirection::Sell
    };
    let sign = direction.sign();
    let bias = direction.bias();
    Signal {
        symbol: "EURUSD".to_string(),
        timeframe: Timeframe::H1,
        timestamp: Utc.with_ymd_and_hms(2024, 3, 4, 8, 0, 0).unwrap() + Duration::hours(i as i64),
        direction,
        entry: price,
        stop_loss: price - sign * 0.004,
        take_profit: price + sign * 0.012,
        risk_reward_ratio: 3.0,
        factors: FactorKind::ALL
            .iter()
            .map(|kind| ConfluenceFactor {
                kind: *kind,
                direction: bias,
                raw_score: kind.base_score(),
                reference_level: None,
            })
            .collect(),
        confluence_score: FactorKind::ALL.len(),
        valid: true,
    }
}

/// Deterministic oscillating bars with a signal every 12 bars
fn generate_run(count: usize) -> (Vec<PriceBar>, Vec<SignalEvent>) {
    let t0 = Utc.with_ymd_and_hms(2024, 3, 4, 8, 0, 0).unwrap();
    let mut bars = Vec::with_capacity(count);
    let mut events = Vec::new();
    for i in 0..count {
        let mid = 1.1 + ((i as f64) * 0.15).sin() * 0.01;
        bars.push(PriceBar {
            timestamp: t0 + Duration::hours(i as i64),
            open: mid,
            high: mid + 0.0015,
            low: mid - 0.0015,
            close: mid,
            spread_pips: Some(0.8),
        });
        if i % 12 == 0 {
            let s = signal(i, mid);
            let bias = s.direction.bias();
            events.push(SignalEvent {
                signal: s,
                context: context(bias, mid),
            });
        }
    }
    (bars, events)
}

fn bench_run_backtest(c: &mut Criterion) {
    let mut group = c.benchmark_group("run_backtest");

    for size in [1_000, 10_000, 50_000].iter() {
        let (bars, events) = generate_run(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let mut sim = SimulatorSettings::default().build().unwrap();
                black_box(sim.run_backtest("EURUSD", black_box(&bars), black_box(&events)))
            });
        });
    }

    group.finish();
}

fn bench_grade(c: &mut Criterion) {
    let mut grader = SignalQualityGrader::new(QualityConfig::default(), CascadeConfig::default()).unwrap();
    let s = signal(2, 1.1);
    let analyses = context(Bias::Bullish, 1.1);

    c.bench_function("grade_signal", |b| {
        b.iter(|| {
            grader.reset();
            black_box(grader.grade(black_box(&s), black_box(&analyses), 0))
        });
    });
}

criterion_group!(benches, bench_run_backtest, bench_grade);
criterion_main!(benches);
