use serde::Serialize;

/// Result of one count query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricResult {
    pub count: u64,
}

/// A metric in the current window against its baseline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricChange {
    pub current: u64,
    pub previous: u64,
    /// Signed change relative to `previous`, in percent.
    pub percent: f64,
}

impl MetricChange {
    pub fn new(current: u64, previous: u64) -> Self {
        Self {
            current,
            previous,
            percent: super::percent_change(current, previous),
        }
    }
}

/// One day of a chart series. `date` is `YYYY-MM-DD`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChartPoint {
    pub date: String,
    pub count: u64,
}
