//! End-to-end scenarios across scorer, cascade, grader, risk and simulator

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use smcbot::backtesting::metrics;
    use smcbot::backtesting::{SignalEvent, SimulatorSettings};
    use smcbot::error::SkipReason;
    use smcbot::persistence;
    use smcbot::risk::{RiskConfig, RiskManager, RiskRejection};
    use smcbot::strategy::{
        CascadeConfig, ConfluenceConfig, ConfluenceScorer, HtfBias, LtfTrigger, MtfConfirmation,
        MultiTimeframeCascade, QualityConfig, SignalQualityGrader,
    };
    use smcbot::types::{
        Bias, ConfluenceFactor, FactorKind, LiquiditySide, LiquidityZone, MarketStructure, PriceBar,
        Signal, SignalDirection, SmcAnalysis, StructureBreak, Timeframe, TimeframeAnalysis, TradeStatus,
    };

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap()
    }

    fn bar(hours: i64, low: f64, high: f64) -> PriceBar {
        PriceBar {
            timestamp: t0() + Duration::hours(hours),
            open: low,
            high,
            low,
            close: high,
            spread_pips: Some(0.5),
        }
    }

    fn trend(tf: Timeframe, bias: Bias, price: f64) -> TimeframeAnalysis {
        TimeframeAnalysis {
            timeframe: tf,
            current_price: price,
            market_structure: MarketStructure {
                trend_direction: bias,
                ..Default::default()
            },
            smc: SmcAnalysis::default(),
            signal: None,
        }
    }

    /// D1 and H1 agree, H1 has a fresh break and liquidity on both sides of `price`
    fn aligned_context(bias: Bias, price: f64) -> Vec<TimeframeAnalysis> {
        let mut h1 = trend(Timeframe::H1, bias, price);
        h1.market_structure.structure_breaks.push(StructureBreak {
            timestamp: t0(),
            direction: bias,
            level: price,
        });
        h1.smc.liquidity_unswept = vec![
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
        h1.smc.liquidity_swept = vec![LiquidityZone {
            side: LiquiditySide::Low,
            level: price * 0.997,
            swept_recently: true,
        }];
        vec![trend(Timeframe::D1, bias, price), h1]
    }

    fn event(hours: i64, direction: SignalDirection, entry: f64, stop: f64, target: f64) -> SignalEvent {
        let bias = direction.bias();
        let factors = [FactorKind::TrendAlignment, FactorKind::StructureBreak, FactorKind::OrderBlock]
            .into_iter()
            .map(|kind| ConfluenceFactor {
                kind,
                direction: bias,
                raw_score: kind.base_score(),
                reference_level: None,
            })
            .collect();
        SignalEvent {
            signal: Signal {
                symbol: "EURUSD".to_string(),
                timeframe: Timeframe::H1,
                timestamp: t0() + Duration::hours(hours),
                direction,
                entry,
                stop_loss: stop,
                take_profit: target,
                risk_reward_ratio: ((target - entry) / (entry - stop)).abs(),
                factors,
                confluence_score: 3,
                valid: true,
            },
            context: aligned_context(bias, entry),
        }
    }

    // ============================================================================
    // Scenario A: sizing
    // ============================================================================

    #[test]
    fn scenario_a_full_confidence_sizing() {
        let rm = RiskManager::new(RiskConfig::default(), 10_000.0).unwrap();
        let risk = rm.calculate_position_size("EURUSD", 1.1000, 1.0950, 1.0).unwrap();
        assert!((risk.stop_distance - 50.0).abs() < 1e-6);
        assert!((risk.size - 0.40).abs() < 1e-9, "Expected 0.40 lots, got {:.4}", risk.size);
    }

    // ============================================================================
    // Scenario B: low quality never trades
    // ============================================================================

    #[test]
    fn scenario_b_low_quality_rejected() {
        let config = QualityConfig {
            min_execution_score: 70.0,
            ..Default::default()
        };
        let grader = SignalQualityGrader::new(config, CascadeConfig::default()).unwrap();
        assert!(!grader.should_execute(45.0, true, true));
    }

    // ============================================================================
    // Scenario C: one position per symbol
    // ============================================================================

    #[test]
    fn scenario_c_second_entry_rejected_while_open() {
        let bars = vec![
            bar(0, 1.0995, 1.1005),
            bar(1, 1.1020, 1.1040),
            bar(2, 1.1030, 1.1035),
        ];
        let events = vec![
            event(0, SignalDirection::Buy, 1.1000, 1.0950, 1.1150),
            // far enough from the first entry not to count as a near duplicate
            event(1, SignalDirection::Buy, 1.1030, 1.0980, 1.1180),
        ];
        let mut sim = SimulatorSettings::default().build().unwrap();
        let result = sim.run_backtest("EURUSD", &bars, &events);

        assert_eq!(result.summary.trades_opened, 1);
        assert_eq!(result.summary.skipped.get(&SkipReason::RiskRejected), Some(&1));
        assert_eq!(result.summary.risk_rejections.get("position_exists"), Some(&1));
        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].status, TradeStatus::Open);

        let mut rm = RiskManager::new(RiskConfig::default(), 10_000.0).unwrap();
        let accepted = rm.calculate_position_size("EURUSD", 1.1, 1.095, 1.0).unwrap();
        rm.open_position(accepted);
        let err = rm.can_trade("EURUSD", 1.0).unwrap_err();
        assert_eq!(err, RiskRejection::PositionExists("EURUSD".to_string()));
        assert_eq!(err.to_string(), "Position already exists for EURUSD");
    }

    // ============================================================================
    // Scenario D: drawdown
    // ============================================================================

    #[test]
    fn scenario_d_drawdown() {
        let (dd, pct) = metrics::max_drawdown(10_000.0, &[10_000.0, 10_500.0, 10_200.0, 9_800.0, 11_000.0]);
        assert!((dd - 700.0).abs() < 1e-9);
        assert!((pct - 6.67).abs() < 0.01, "Expected ~6.67%, got {:.4}", pct);
    }

    // ============================================================================
    // Scenario E: cascade weighting
    // ============================================================================

    #[test]
    fn scenario_e_cascade_not_aligned() {
        let cascade = MultiTimeframeCascade::new(CascadeConfig::default()).unwrap();
        let result = cascade.combine(
            HtfBias {
                direction: Bias::Bullish,
                strength: 80.0,
                reason: "test".to_string(),
            },
            MtfConfirmation {
                confirmed: true,
                strength: 60.0,
                reason: "test".to_string(),
            },
            LtfTrigger {
                valid: true,
                strength: 50.0,
                reason: "test".to_string(),
            },
        );
        assert!((result.cascade_score - 65.5).abs() < 1e-9);
        assert!(!result.is_aligned);
    }

    // ============================================================================
    // Pipeline
    // ============================================================================

    #[test]
    fn scored_two_factor_signal_is_skipped_for_confluence() {
        let scorer = ConfluenceScorer::new(ConfluenceConfig::default()).unwrap();
        let mut h1 = trend(Timeframe::H1, Bias::Bullish, 1.1000);
        h1.market_structure.structure_breaks.push(StructureBreak {
            timestamp: t0(),
            direction: Bias::Bullish,
            level: 1.0980,
        });
        h1.market_structure.swing_highs = vec![1.1200];
        h1.market_structure.swing_lows = vec![1.0950];

        let signal = scorer.score_analysis("EURUSD", t0(), &h1);
        assert_eq!(signal.direction, SignalDirection::Buy);
        assert_eq!(signal.confluence_score, 2);
        assert!(signal.is_well_formed());

        let events = vec![SignalEvent {
            signal,
            context: vec![h1],
        }];
        let mut sim = SimulatorSettings::default().build().unwrap();
        let result = sim.run_backtest("EURUSD", &[bar(0, 1.0990, 1.1010)], &events);
        assert!(result.trades.is_empty());
        assert_eq!(result.summary.dominant_skip_reason, Some(SkipReason::LowConfluence));
    }

    #[test]
    fn equity_curve_tracks_balance() {
        let bars = vec![
            bar(0, 1.0995, 1.1005),
            bar(1, 1.1100, 1.1160),
            bar(2, 1.1150, 1.1155),
            bar(6, 1.1150, 1.1160),
            bar(7, 1.1050, 1.1140),
        ];
        let events = vec![
            event(0, SignalDirection::Buy, 1.1000, 1.0950, 1.1150),
            event(6, SignalDirection::Sell, 1.1155, 1.1205, 1.1005),
        ];
        let mut sim = SimulatorSettings::default().build().unwrap();
        let result = sim.run_backtest("EURUSD", &bars, &events);

        let closed: Vec<_> = result.trades.iter().filter(|t| t.status.is_closed()).collect();
        assert_eq!(closed.len(), result.equity_curve.len());
        for t in &closed {
            let exit = t.exit_price.unwrap();
            assert!(exit == t.stop_loss || exit == t.take_profit);
        }
        if let Some(last) = result.equity_curve.last() {
            assert!((last.balance - result.final_balance).abs() < 1e-9);
        }
        let sum: f64 = closed.iter().map(|t| t.pnl.unwrap()).sum();
        assert!((result.final_balance - 10_000.0 - sum).abs() < 1e-6);
    }

    // ============================================================================
    // Persistence
    // ============================================================================

    #[test]
    fn json_round_trip_preserves_result() {
        let bars = vec![bar(0, 1.0995, 1.1005), bar(1, 1.1100, 1.1160)];
        let events = vec![event(0, SignalDirection::Buy, 1.1000, 1.0950, 1.1150)];
        let mut sim = SimulatorSettings::default().build().unwrap();
        let result = sim.run_backtest("EURUSD", &bars, &events);
        assert_eq!(result.performance_metrics.total_trades, 1);

        let dir = tempfile::tempdir().unwrap();
        let (json_path, csv_path) = persistence::result_paths(dir.path(), &result.symbol);
        persistence::save_result(&json_path, &result).unwrap();
        let loaded = persistence::load_result(&json_path).unwrap();

        assert_eq!(loaded.trades.len(), result.trades.len());
        assert!((loaded.final_balance - result.final_balance).abs() < 1e-9);
        assert!((loaded.performance_metrics.total_pnl - result.performance_metrics.total_pnl).abs() < 1e-9);
        assert!((loaded.performance_metrics.win_rate - result.performance_metrics.win_rate).abs() < 1e-9);
        assert_eq!(loaded.summary, result.summary);
        assert_eq!(loaded.metrics_by_grade.len(), result.metrics_by_grade.len());

        persistence::save_trades_csv(&csv_path, &result.trades).unwrap();
        let trades = persistence::load_trades_csv(&csv_path).unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].status, TradeStatus::TargetHit);
        assert_eq!(trades[0].grade, result.trades[0].grade);
    }

    #[test]
    fn signal_events_load_from_json() {
        let events = vec![event(0, SignalDirection::Buy, 1.1000, 1.0950, 1.1150)];
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eurusd.json");
        std::fs::write(&path, serde_json::to_string(&events).unwrap()).unwrap();

        let loaded = persistence::load_signal_events(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].signal.direction, SignalDirection::Buy);
        assert_eq!(loaded[0].context.len(), 2);
    }
}
