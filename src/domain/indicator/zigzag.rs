//! Zigzag pivot detection.
//!
//! A pivot is confirmed once price retraces at least `pct` percent from the
//! running extreme. Only confirmed pivots are returned, each tagged with the
//! index of the bar that confirmed it, so a caller evaluating bar `i` can use
//! exactly the pivots with `confirmed_at <= i`.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PivotKind {
    Peak,
    Trough,
}

/// Which bar wins when several bars share the exact extreme price.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TieBreak {
    #[default]
    FirstOccurrence,
    LastOccurrence,
}

impl TieBreak {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "first" | "first_occurrence" => Some(TieBreak::FirstOccurrence),
            "last" | "last_occurrence" => Some(TieBreak::LastOccurrence),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Pivot {
    pub index: usize,
    pub price: f64,
    pub kind: PivotKind,
    pub confirmed_at: usize,
}

#[derive(Clone, Copy, PartialEq)]
enum Trend {
    Up,
    Down,
}

pub fn find_pivots(values: &[f64], pct: f64, tie_break: TieBreak) -> Vec<Pivot> {
    let mut pivots = Vec::new();
    if values.len() < 2 || pct <= 0.0 || values[0] <= 0.0 {
        return pivots;
    }

    // the first qualifying move fixes bar 0 as the opposite pivot
    let Some((start, trend)) = values.iter().enumerate().skip(1).find_map(|(i, &v)| {
        let ret = (v / values[0] - 1.0) * 100.0;
        if ret >= pct {
            Some((i, Trend::Up))
        } else if ret <= -pct {
            Some((i, Trend::Down))
        } else {
            None
        }
    }) else {
        return pivots;
    };

    pivots.push(Pivot {
        index: 0,
        price: values[0],
        kind: if trend == Trend::Up {
            PivotKind::Trough
        } else {
            PivotKind::Peak
        },
        confirmed_at: start,
    });

    let mut trend = trend;
    let mut extreme_idx = start;
    let mut extreme = values[start];

    for (i, &price) in values.iter().enumerate().skip(start + 1) {
        let extends = match trend {
            Trend::Up => price > extreme,
            Trend::Down => price < extreme,
        };
        let ties = price == extreme && tie_break == TieBreak::LastOccurrence;
        if extends || ties {
            extreme = price;
            extreme_idx = i;
            continue;
        }

        let retrace = match trend {
            Trend::Up => (extreme - price) / extreme * 100.0,
            Trend::Down => (price - extreme) / extreme * 100.0,
        };
        if retrace >= pct {
            pivots.push(Pivot {
                index: extreme_idx,
                price: extreme,
                kind: if trend == Trend::Up {
                    PivotKind::Peak
                } else {
                    PivotKind::Trough
                },
                confirmed_at: i,
            });
            trend = if trend == Trend::Up {
                Trend::Down
            } else {
                Trend::Up
            };
            extreme = price;
            extreme_idx = i;
        }
    }

    pivots
}
