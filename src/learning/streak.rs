// =============================================================================
// Streak scanning over closed outcomes
// =============================================================================
//
// A streak is a maximal contiguous run of same-outcome records in the
// chronological closed list. The scan starts at a cursor (everything before
// it is already processed) and returns the earliest run of at least
// `min_len`. Runs shorter than that are skipped whole, so [L,L,W,L,L,L,W]
// yields the run at indices 3..=5 with count 3.
//
// `max_scan` bounds the work of one call and is at least 1, so every capped
// call moves the resume cursor forward. The budget is only checked between
// runs, never inside one, so a resume cursor can never land mid-run and split
// a streak in two.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::exit::{Outcome, SignalRecord};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Streak {
    pub outcome: Outcome,
    /// Index of the first record of the run in the closed list.
    pub start: usize,
    /// Index of the last record of the run (inclusive).
    pub end: usize,
    pub count: usize,
    pub signal_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScanResult {
    Found(Streak),
    /// Reached the end of the list without a qualifying run.
    Exhausted,
    /// Scan budget spent; nothing before `resume_at` qualifies.
    CapReached { resume_at: usize },
}

pub fn scan_for_streak(
    records: &[SignalRecord],
    outcome: Outcome,
    from: usize,
    min_len: usize,
    max_scan: usize,
) -> ScanResult {
    let min_len = min_len.max(1);
    let max_scan = max_scan.max(1);
    let mut i = from;
    let mut examined = 0usize;

    while i < records.len() {
        if examined >= max_scan {
            return ScanResult::CapReached { resume_at: i };
        }
        if records[i].outcome != outcome {
            i += 1;
            examined += 1;
            continue;
        }

        let start = i;
        while i < records.len() && records[i].outcome == outcome {
            i += 1;
        }
        let count = i - start;
        examined += count;

        if count >= min_len {
            return ScanResult::Found(Streak {
                outcome,
                start,
                end: i - 1,
                count,
                signal_ids: records[start..i].iter().map(|r| r.id()).collect(),
            });
        }
    }
    ScanResult::Exhausted
}
