// =============================================================================
// Risk Calculator — ATR stop / target levels clamped to market structure
// =============================================================================
//
//   1. Baseline from ATR(14):
//        LONG   SL = entry - 1.5 × ATR    TP = entry + 3.0 × ATR
//        SHORT  SL = entry + 1.5 × ATR    TP = entry - 3.0 × ATR
//   2. Structure clamp: pivot highs / lows form a support / resistance
//      ladder. When a level sits between the baseline and entry, the stop
//      tucks just beyond it and the target stops just short of it.
//   3. Hard floor: neither level may sit within `min_distance_pct` of entry.
//      The target floor scales with the reward multiple so that a floored
//      stop keeps the baseline reward : risk. The floor overrides step 2.
//
// Without enough bars for ATR, 2% of entry stands in for it.
// =============================================================================

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::RiskParams;
use crate::error::{EngineError, Result};
use crate::indicators::atr::calculate_atr;
use crate::types::{Bar, Direction};

/// ATR substitute (fraction of entry) when history is too short.
const FALLBACK_ATR_FRACTION: f64 = 0.02;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskLevels {
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    /// |TP - entry| / |SL - entry|.
    pub risk_reward_ratio: f64,
    pub atr: f64,
    /// True when `atr` is the fallback, not a measured value.
    pub atr_fallback: bool,
    /// Structure level the stop was clamped to, if any.
    pub stop_structure: Option<f64>,
    /// Structure level the target was clamped to, if any.
    pub target_structure: Option<f64>,
}

/// Support / resistance ladder from pivot lows / highs, each sorted ascending.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructureLevels {
    pub supports: Vec<f64>,
    pub resistances: Vec<f64>,
}

/// Detect local pivots: a bar whose high (low) is strictly beyond every bar
/// within `span` on both sides.
pub fn find_structure(bars: &[Bar], span: usize) -> StructureLevels {
    let mut levels = StructureLevels::default();
    if span == 0 || bars.len() < 2 * span + 1 {
        return levels;
    }

    for i in span..bars.len() - span {
        let window = bars[i - span..=i + span].iter().enumerate().filter(|(j, _)| *j != span);
        let (mut is_high, mut is_low) = (true, true);
        for (_, other) in window {
            is_high &= bars[i].high > other.high;
            is_low &= bars[i].low < other.low;
        }
        if is_high {
            levels.resistances.push(bars[i].high);
        }
        if is_low {
            levels.supports.push(bars[i].low);
        }
    }

    levels.supports.sort_by(f64::total_cmp);
    levels.resistances.sort_by(f64::total_cmp);
    levels
}

/// Compute stop / target levels for a trade in `direction` entered at `entry`.
///
/// Fails only on a non-positive / non-finite entry or a HOLD direction.
pub fn calculate_levels(bars: &[Bar], entry: f64, direction: Direction, params: &RiskParams) -> Result<RiskLevels> {
    if !entry.is_finite() || entry <= 0.0 {
        return Err(EngineError::InvalidInput(format!("entry price must be positive, got {entry}")));
    }
    let side = match direction {
        Direction::Long => 1.0,
        Direction::Short => -1.0,
        Direction::Hold => {
            return Err(EngineError::InvalidInput(
                "risk levels need a LONG or SHORT direction".to_string(),
            ))
        }
    };

    let (atr, atr_fallback) = match calculate_atr(bars, params.atr_period) {
        Some(atr) if atr > 0.0 => (atr, false),
        _ => (entry * FALLBACK_ATR_FRACTION, true),
    };

    let baseline_sl = entry - side * params.sl_atr_multiplier * atr;
    let baseline_tp = entry + side * params.tp_atr_multiplier * atr;

    // --- Structure clamp -----------------------------------------------------
    let structure = find_structure(bars, params.pivot_span);
    let buffer = params.level_buffer_pct / 100.0;

    let (stop_ladder, target_ladder) = if side > 0.0 {
        (&structure.supports, &structure.resistances)
    } else {
        (&structure.resistances, &structure.supports)
    };
    let stop_structure = nearest_between(stop_ladder, entry, baseline_sl);
    let target_structure = nearest_between(target_ladder, entry, baseline_tp);

    let mut stop_loss = stop_structure.map_or(baseline_sl, |level| level * (1.0 - side * buffer));
    let mut take_profit = target_structure.map_or(baseline_tp, |level| level * (1.0 - side * buffer));

    // --- Hard floor ------------------------------------------------------------
    let min_stop = params.min_distance_pct / 100.0;
    let reward_multiple = if params.sl_atr_multiplier > 0.0 {
        (params.tp_atr_multiplier / params.sl_atr_multiplier).max(1.0)
    } else {
        1.0
    };
    let min_target = min_stop * reward_multiple;

    if (entry - stop_loss) * side < entry * min_stop {
        stop_loss = entry * (1.0 - side * min_stop);
    }
    if (take_profit - entry) * side < entry * min_target {
        take_profit = entry * (1.0 + side * min_target);
    }

    let risk = (entry - stop_loss).abs();
    let reward = (take_profit - entry).abs();
    let risk_reward_ratio = if risk > 0.0 { reward / risk } else { 0.0 };

    debug!(
        direction = %direction,
        entry = format!("{:.6}", entry),
        stop_loss = format!("{:.6}", stop_loss),
        take_profit = format!("{:.6}", take_profit),
        rr = format!("{:.2}", risk_reward_ratio),
        atr = format!("{:.6}", atr),
        atr_fallback,
        "Risk levels computed"
    );

    Ok(RiskLevels {
        entry_price: entry,
        stop_loss,
        take_profit,
        risk_reward_ratio,
        atr,
        atr_fallback,
        stop_structure,
        target_structure,
    })
}

/// Reject levels whose reward : risk falls below `min_risk_reward`.
///
/// The error string is the human-readable rejection note.
pub fn validate(levels: &RiskLevels, min_risk_reward: f64) -> std::result::Result<(), String> {
    if !levels.risk_reward_ratio.is_finite() || levels.risk_reward_ratio < min_risk_reward {
        return Err(format!(
            "risk/reward {:.2} below minimum {:.2}",
            levels.risk_reward_ratio, min_risk_reward
        ));
    }
    Ok(())
}

/// The ladder level strictly between `entry` and `bound` that lies closest
/// to `entry`.
fn nearest_between(ladder: &[f64], entry: f64, bound: f64) -> Option<f64> {
    let (lo, hi) = if bound < entry { (bound, entry) } else { (entry, bound) };
    ladder
        .iter()
        .copied()
        .filter(|&level| level > lo && level < hi)
        .min_by(|a, b| (a - entry).abs().total_cmp(&(b - entry).abs()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn bar(high: f64, low: f64, close: f64) -> Bar {
        Bar::new(close, high, low, close, 100.0, Utc::now())
    }

    /// Constant-range bars: ATR settles at `range`.
    fn flat_bars(n: usize, price: f64, range: f64) -> Vec<Bar> {
        (0..n).map(|_| bar(price + range / 2.0, price - range / 2.0, price)).collect()
    }

    #[test]
    fn long_baseline_uses_atr_multiples() {
        // ATR 4 on a 100 entry: SL 94 (6%), TP 112 (12%), both beyond the floor.
        let bars = flat_bars(30, 100.0, 4.0);
        let levels = calculate_levels(&bars, 100.0, Direction::Long, &RiskParams::default()).unwrap();
        assert!((levels.atr - 4.0).abs() < 1e-9);
        assert!((levels.stop_loss - 94.0).abs() < 1e-9);
        assert!((levels.take_profit - 112.0).abs() < 1e-9);
        assert!((levels.risk_reward_ratio - 2.0).abs() < 1e-9);
        assert!(!levels.atr_fallback);
    }

    #[test]
    fn short_levels_are_mirrored() {
        let bars = flat_bars(30, 100.0, 4.0);
        let levels = calculate_levels(&bars, 100.0, Direction::Short, &RiskParams::default()).unwrap();
        assert!(levels.take_profit < levels.entry_price);
        assert!(levels.entry_price < levels.stop_loss);
        assert!((levels.stop_loss - 106.0).abs() < 1e-9);
        assert!((levels.take_profit - 88.0).abs() < 1e-9);
    }

    #[test]
    fn hard_floor_overrides_tight_atr() {
        // ATR 0.2 → baseline SL 0.3% away, floored to 2%; TP floored to 4%.
        let bars = flat_bars(30, 100.0, 0.2);
        let levels = calculate_levels(&bars, 100.0, Direction::Long, &RiskParams::default()).unwrap();
        assert!((levels.stop_loss - 98.0).abs() < 1e-9);
        assert!((levels.take_profit - 104.0).abs() < 1e-9);
        assert!(validate(&levels, 1.5).is_ok());
    }

    #[test]
    fn stop_clamps_to_support_between_baseline_and_entry() {
        let mut bars = flat_bars(20, 100.0, 4.0);
        // Pivot low at 96 sits between the 94 baseline and the 100 entry.
        bars[10] = bar(101.0, 96.0, 98.0);
        let levels = calculate_levels(&bars, 100.0, Direction::Long, &RiskParams::default()).unwrap();
        assert_eq!(levels.stop_structure, Some(96.0));
        assert!(levels.stop_loss < 96.0 && levels.stop_loss > 95.8);
    }

    #[test]
    fn hard_floor_overrides_structure_within_two_percent() {
        // Bars at 102 ± 2 keep ATR at 4; a pivot low at 99 sits 1% under entry.
        let mut bars = flat_bars(30, 102.0, 4.0);
        bars[10] = bar(103.0, 99.0, 101.0);
        let levels = calculate_levels(&bars, 100.0, Direction::Long, &RiskParams::default()).unwrap();
        assert!((levels.atr - 4.0).abs() < 1e-9);
        assert_eq!(levels.stop_structure, Some(99.0));
        assert!((levels.stop_loss - 98.0).abs() < 1e-9);
    }

    #[test]
    fn target_stops_short_of_resistance_and_fails_reward() {
        // Pivot high at 106 sits between the entry and the ~112 baseline target.
        let mut bars = flat_bars(30, 100.0, 4.0);
        bars[10] = bar(106.0, 101.0, 102.0);
        let levels = calculate_levels(&bars, 100.0, Direction::Long, &RiskParams::default()).unwrap();
        assert_eq!(levels.target_structure, Some(106.0));
        assert!(levels.take_profit < 106.0 && levels.take_profit > 105.8);
        assert!(levels.risk_reward_ratio < 1.5);
        assert!(validate(&levels, 1.5).is_err());
    }

    #[test]
    fn short_history_falls_back_to_two_percent_atr() {
        let bars = flat_bars(3, 50.0, 1.0);
        let levels = calculate_levels(&bars, 50.0, Direction::Long, &RiskParams::default()).unwrap();
        assert!(levels.atr_fallback);
        assert!((levels.atr - 1.0).abs() < 1e-12);
        assert!(levels.stop_loss < 50.0 && levels.take_profit > 50.0);
    }

    #[test]
    fn invalid_entry_and_hold_are_rejected() {
        let bars = flat_bars(30, 100.0, 4.0);
        let params = RiskParams::default();
        assert!(calculate_levels(&bars, -1.0, Direction::Long, &params).is_err());
        assert!(calculate_levels(&bars, 0.0, Direction::Short, &params).is_err());
        assert!(calculate_levels(&bars, 100.0, Direction::Hold, &params).is_err());
    }

    #[test]
    fn validator_rejects_poor_reward() {
        let levels = RiskLevels {
            entry_price: 100.0,
            stop_loss: 96.0,
            take_profit: 104.0,
            risk_reward_ratio: 1.0,
            atr: 2.0,
            atr_fallback: false,
            stop_structure: None,
            target_structure: Some(104.5),
        };
        let note = validate(&levels, 1.5).unwrap_err();
        assert!(note.contains("1.00"));
    }

    #[test]
    fn pivots_detected() {
        let highs = [10.0, 11.0, 12.0, 15.0, 12.0, 11.0, 10.0];
        let bars: Vec<Bar> = highs.iter().map(|&h| bar(h, h - 5.0, h - 1.0)).collect();
        let structure = find_structure(&bars, 3);
        assert_eq!(structure.resistances, vec![15.0]);
        assert!(structure.supports.is_empty());
    }
}
