// =============================================================================
// Rate of Change (ROC)
// =============================================================================
//
//   ROC = ((close - close_n) / close_n) * 100
//
// Not weighted on its own. It supplies the "price up / price down" context
// that the volume-ratio, HL-volume and OI-change readings are combined with.

/// ROC series, one value per close starting at index `period`.
pub fn calculate_roc(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() <= period {
        return Vec::new();
    }

    closes
        .windows(period + 1)
        .map(|w| {
            let prev = w[0];
            if prev == 0.0 {
                0.0
            } else {
                (w[period] - prev) / prev * 100.0
            }
        })
        .collect()
}

/// Most recent ROC value.
pub fn current_roc(closes: &[f64], period: usize) -> Option<f64> {
    calculate_roc(closes, period).last().copied()
}

/// Percentage change across the last `period` bars, shortening the window
/// when less history is available. `None` with fewer than two closes.
pub fn recent_change_pct(closes: &[f64], period: usize) -> Option<f64> {
    if closes.len() < 2 {
        return None;
    }
    let span = period.min(closes.len() - 1).max(1);
    current_roc(closes, span)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roc_basic() {
        let closes: Vec<f64> = (1..=20).map(|x| x as f64).collect();
        let roc = calculate_roc(&closes, 14);
        assert_eq!(roc.len(), 6);
        assert!((roc[0] - 1400.0).abs() < 1e-10);
    }

    #[test]
    fn roc_insufficient_data() {
        assert!(calculate_roc(&[1.0, 2.0, 3.0], 14).is_empty());
    }

    #[test]
    fn recent_change_shortens_window() {
        let change = recent_change_pct(&[100.0, 110.0], 24).unwrap();
        assert!((change - 10.0).abs() < 1e-10);
        assert!(recent_change_pct(&[100.0], 24).is_none());
    }
}
