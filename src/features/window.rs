//! Trailing time windows over one account's time-ordered rows.
//!
//! A window of width `W` at time `t` covers `(t - W, t]`. Both boundaries only
//! move forward as the scan advances, so each row is admitted once and evicted
//! at most once: count and sum are running accumulators, the maximum comes
//! from a monotonic deque of candidate positions.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::num::TryFromIntError;

/// Aggregate computed over a window of amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregate {
    Count,
    Sum,
    Mean,
    Max,
}

impl Aggregate {
    fn prefix(&self) -> &'static str {
        match self {
            Aggregate::Count => "tx_count_",
            Aggregate::Sum => "tx_sum_amount_",
            Aggregate::Mean => "tx_avg_amount_",
            Aggregate::Max => "tx_max_amount_",
        }
    }

    /// Feature column name, e.g. `tx_avg_amount_2h`.
    pub fn column_name(&self, width_hours: u32) -> String {
        format!("{}{}h", self.prefix(), width_hours)
    }

    /// Inverse of [`Aggregate::column_name`].
    pub fn parse_column(name: &str) -> Option<(Aggregate, u32)> {
        [Aggregate::Count, Aggregate::Sum, Aggregate::Mean, Aggregate::Max]
            .into_iter()
            .find_map(|agg| {
                let width = name.strip_prefix(agg.prefix())?.strip_suffix('h')?;
                width.parse::<u32>().ok().map(|w| (agg, w))
            })
    }
}

/// One row of the window table: a width and the aggregates wanted for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSpec {
    pub width_hours: u32,
    pub aggregates: Vec<Aggregate>,
}

impl WindowSpec {
    pub fn new(width_hours: u32, aggregates: impl Into<Vec<Aggregate>>) -> Self {
        Self {
            width_hours,
            aggregates: aggregates.into(),
        }
    }

    pub fn wants(&self, aggregate: Aggregate) -> bool {
        self.aggregates.contains(&aggregate)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.aggregates
            .iter()
            .map(|a| a.column_name(self.width_hours))
            .collect()
    }
}

/// Aggregates of one window for one row. Only the aggregates requested by the
/// window's spec are populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowFeatures {
    pub width_hours: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl WindowFeatures {
    pub fn get(&self, aggregate: Aggregate) -> Option<f64> {
        match aggregate {
            Aggregate::Count => self.count.map(f64::from),
            Aggregate::Sum => self.sum,
            Aggregate::Mean => self.mean,
            Aggregate::Max => self.max,
        }
    }
}

/// Position of a row on the account's time axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub timestamp_hours: u32,
    pub amount: f64,
}

/// Neumaier-compensated sum supporting removal (adding the negation).
#[derive(Debug, Clone, Copy, Default)]
struct CompensatedSum {
    sum: f64,
    compensation: f64,
}

impl CompensatedSum {
    fn add(&mut self, x: f64) {
        let t = self.sum + x;
        if self.sum.abs() >= x.abs() {
            self.compensation += (self.sum - t) + x;
        } else {
            self.compensation += (x - t) + self.sum;
        }
        self.sum = t;
    }

    fn value(&self) -> f64 {
        self.sum + self.compensation
    }
}

/// Sliding-window state over a slice of [`Point`]s sorted by time.
///
/// Rows `tail..head` are inside the window. `admit` moves `head` forward,
/// `evict` moves `tail` forward; neither ever moves back.
#[derive(Debug, Clone)]
pub struct WindowAccumulator {
    width_hours: u32,
    tail: usize,
    head: usize,
    sum: CompensatedSum,
    /// Positions with non-increasing amounts; the front holds the maximum
    maxima: VecDeque<usize>,
}

impl WindowAccumulator {
    pub fn new(width_hours: u32) -> Self {
        Self {
            width_hours,
            tail: 0,
            head: 0,
            sum: CompensatedSum::default(),
            maxima: VecDeque::new(),
        }
    }

    pub fn width_hours(&self) -> u32 {
        self.width_hours
    }

    /// Admit every row up to and including position `last`.
    pub fn admit(&mut self, points: &[Point], last: usize) {
        while self.head <= last && self.head < points.len() {
            let amount = points[self.head].amount;
            self.sum.add(amount);
            while let Some(&back) = self.maxima.back() {
                if points[back].amount < amount {
                    self.maxima.pop_back();
                } else {
                    break;
                }
            }
            self.maxima.push_back(self.head);
            self.head += 1;
        }
    }

    /// Drop rows that are `width_hours` or more before `now`.
    pub fn evict(&mut self, points: &[Point], now: u32) {
        let width = u64::from(self.width_hours);
        while self.tail < self.head
            && u64::from(points[self.tail].timestamp_hours) + width <= u64::from(now)
        {
            self.sum.add(-points[self.tail].amount);
            if self.maxima.front() == Some(&self.tail) {
                self.maxima.pop_front();
            }
            self.tail += 1;
        }
        if self.tail == self.head {
            self.sum = CompensatedSum::default();
        }
    }

    pub fn count(&self) -> usize {
        self.head - self.tail
    }

    pub fn sum(&self) -> f64 {
        self.sum.value()
    }

    pub fn mean(&self) -> Option<f64> {
        match self.count() {
            0 => None,
            n => Some(self.sum() / n as f64),
        }
    }

    pub fn max(&self, points: &[Point]) -> Option<f64> {
        self.maxima.front().map(|&i| points[i].amount)
    }

    /// Read the aggregates `spec` asks for. Fails if the window holds more
    /// rows than a `u32` count can represent.
    pub fn snapshot(&self, spec: &WindowSpec, points: &[Point]) -> Result<WindowFeatures, TryFromIntError> {
        let count = if spec.wants(Aggregate::Count) {
            Some(u32::try_from(self.count())?)
        } else {
            None
        };
        Ok(WindowFeatures {
            width_hours: spec.width_hours,
            count,
            sum: spec.wants(Aggregate::Sum).then(|| self.sum()),
            mean: if spec.wants(Aggregate::Mean) { self.mean() } else { None },
            max: if spec.wants(Aggregate::Max) { self.max(points) } else { None },
        })
    }
}
