// =============================================================================
// Indicator weights — the shared, learnable weight vector
// =============================================================================
//
// Invariant after every learning operation: each weight in [min, max]
// (default [1, 20]) and the vector sums to 100.
//
// Renormalisation is deterministic water-filling over the sorted key order:
// scale the free weights to fill the remaining budget, pin any that cross a
// bound, repeat until nothing new is pinned.
// =============================================================================

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::indicators::{Category, IndicatorKind};

pub const TARGET_SUM: f64 = 100.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndicatorWeights(BTreeMap<IndicatorKind, f64>);

impl Default for IndicatorWeights {
    fn default() -> Self {
        Self(IndicatorKind::ALL.iter().map(|&k| (k, k.default_weight())).collect())
    }
}

impl IndicatorWeights {
    /// Build from an explicit map, rejecting missing indicators and
    /// non-finite or non-positive weights.
    pub fn from_map(map: BTreeMap<IndicatorKind, f64>) -> Result<Self> {
        let weights = Self(map);
        weights.validate()?;
        Ok(weights)
    }

    /// Build from name-keyed weights as an external store would hold them.
    pub fn from_named<'a, I>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        let mut map = BTreeMap::new();
        for (name, weight) in entries {
            map.insert(name.parse::<IndicatorKind>()?, weight);
        }
        Self::from_map(map)
    }

    /// Every indicator present with a finite, positive weight.
    pub fn validate(&self) -> Result<()> {
        for kind in IndicatorKind::ALL {
            match self.0.get(&kind) {
                None => return Err(EngineError::MissingIndicator(kind.name().to_string())),
                Some(&w) if !w.is_finite() || w <= 0.0 => {
                    return Err(EngineError::InvalidWeight {
                        indicator: kind.name().to_string(),
                        weight: w,
                    })
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    pub fn get(&self, kind: IndicatorKind) -> f64 {
        self.0.get(&kind).copied().unwrap_or_else(|| kind.default_weight())
    }

    pub fn set(&mut self, kind: IndicatorKind, weight: f64) {
        self.0.insert(kind, weight);
    }

    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }

    /// Sum of the weights of one category's indicators.
    pub fn category_total(&self, category: Category) -> f64 {
        self.iter().filter(|(k, _)| k.category() == category).map(|(_, w)| w).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (IndicatorKind, f64)> + '_ {
        self.0.iter().map(|(&k, &w)| (k, w))
    }

    /// Name-keyed copy for logging and external stores.
    pub fn to_named(&self) -> BTreeMap<String, f64> {
        self.iter().map(|(k, w)| (k.name().to_string(), w)).collect()
    }

    /// Clamp every weight into `[min, max]` and rescale to sum to 100.
    pub fn renormalize(&mut self, min: f64, max: f64) {
        for w in self.0.values_mut() {
            *w = if w.is_finite() { w.clamp(min, max) } else { min };
        }

        let mut pinned: Vec<IndicatorKind> = Vec::new();
        for _ in 0..=self.0.len() {
            let pinned_sum: f64 = pinned.iter().map(|k| self.get(*k)).sum();
            let free_sum: f64 = self
                .0
                .iter()
                .filter(|(k, _)| !pinned.contains(*k))
                .map(|(_, w)| *w)
                .sum();
            if free_sum <= 0.0 {
                break;
            }
            let scale = (TARGET_SUM - pinned_sum) / free_sum;

            let mut newly_pinned = false;
            for (kind, w) in self.0.iter_mut() {
                if pinned.contains(kind) {
                    continue;
                }
                let scaled = *w * scale;
                if scaled > max {
                    *w = max;
                    pinned.push(*kind);
                    newly_pinned = true;
                } else if scaled < min {
                    *w = min;
                    pinned.push(*kind);
                    newly_pinned = true;
                } else {
                    *w = scaled;
                }
            }
            if !newly_pinned {
                break;
            }
        }
    }

    /// True when every weight is within bounds and the sum is within
    /// `tolerance` of 100.
    pub fn is_normalized(&self, min: f64, max: f64, tolerance: f64) -> bool {
        self.0.values().all(|&w| w >= min - 1e-9 && w <= max + 1e-9) && (self.total() - TARGET_SUM).abs() <= tolerance
    }
}
