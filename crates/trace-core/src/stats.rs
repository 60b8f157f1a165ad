//! Windowed running statistics over numeric traces.
//!
//! Every output position `i` covers the trailing window
//! `trace[i + 1 - w ..= i]` where `w = min(i + 1, period)`: the first
//! `period - 1` positions use a growing partial window, later positions a full
//! window of exactly `period` points. `period` is clamped to the trace length.
//!
//! All statistics are driven by [`RollingWindow`], a sliding Welford
//! accumulator that is refilled from the exact window contents once every
//! `period` steps, so each output point costs amortised O(1) regardless of
//! the period.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::StatsError;

// ── RollingWindow ─────────────────────────────────────────────────────────────

/// Sliding-window mean / variance accumulator (Welford's update with removal).
///
/// Values are accumulated relative to a shift (the first value pushed into
/// an empty window) so that traces riding on a large offset do not lose
/// precision. The caller owns the window contents; `pop` must be given the
/// value that is leaving the window.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RollingWindow {
    count: usize,
    shift: f64,
    mean: f64,
    m2: f64,
}

impl RollingWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `x` to the window.
    pub fn push(&mut self, x: f64) {
        if self.count == 0 {
            self.shift = x;
        }
        let x = x - self.shift;
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    /// Remove `x`, which must currently be in the window.
    pub fn pop(&mut self, x: f64) {
        match self.count {
            0 => {}
            1 => *self = Self::default(),
            _ => {
                let x = x - self.shift;
                self.count -= 1;
                let delta = x - self.mean;
                self.mean -= delta / self.count as f64;
                self.m2 -= delta * (x - self.mean);
                // Rounding can leave a tiny negative residue.
                if self.m2 < 0.0 {
                    self.m2 = 0.0;
                }
            }
        }
    }

    /// Discard the accumulated state and refill from `values`.
    pub fn rebuild(&mut self, values: &[f64]) {
        *self = Self::default();
        for &v in values {
            self.push(v);
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Arithmetic mean of the window, `0.0` when empty.
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.shift + self.mean
        }
    }

    /// Population variance (divisor = window size), `0.0` when empty.
    pub fn population_variance(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.m2 / self.count as f64
        }
    }

    pub fn population_stdev(&self) -> f64 {
        self.population_variance().sqrt()
    }
}

// ── Window iteration ──────────────────────────────────────────────────────────

/// Mean and population standard deviation of one window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowStat {
    pub mean: f64,
    pub stdev: f64,
}

/// Validate inputs and return the effective (clamped) period.
fn effective_period(trace: &[f64], period: i64) -> Result<usize, StatsError> {
    if period <= 0 {
        return Err(StatsError::InvalidPeriod(period));
    }
    if let Some(index) = trace.iter().position(|v| !v.is_finite()) {
        return Err(StatsError::NonFinite { index });
    }
    let period = usize::try_from(period).unwrap_or(usize::MAX);
    Ok(period.min(trace.len()))
}

/// Slide a window of `period` points over `trace`, calling `emit` with the
/// accumulator state after each position.
fn slide<T>(
    trace: &[f64],
    period: i64,
    mut emit: impl FnMut(&RollingWindow) -> T,
) -> Result<Vec<T>, StatsError> {
    let period = effective_period(trace, period)?;
    let mut window = RollingWindow::new();
    let mut out = Vec::with_capacity(trace.len());

    for (i, &x) in trace.iter().enumerate() {
        if i >= period && i % period == 0 {
            // Periodic refill bounds the rounding carried by push/pop pairs;
            // it costs `period` once every `period` steps.
            window.rebuild(&trace[i + 1 - period..=i]);
        } else {
            if i >= period {
                window.pop(trace[i - period]);
            }
            window.push(x);
        }
        out.push(emit(&window));
    }

    Ok(out)
}

/// Windowed running mean of `trace`.
///
/// ```
/// use trace_core::stats::running_mean;
///
/// let avgs = running_mean(&[1.0, 2.0, 3.0, 4.0, 5.0], 3).unwrap();
/// assert_eq!(avgs, vec![1.0, 1.5, 2.0, 3.0, 4.0]);
/// ```
///
/// # Errors
/// [`StatsError::InvalidPeriod`] when `period <= 0`,
/// [`StatsError::NonFinite`] when the trace contains NaN or an infinity.
pub fn running_mean(trace: &[f64], period: i64) -> Result<Vec<f64>, StatsError> {
    slide(trace, period, RollingWindow::mean)
}

/// Windowed running population standard deviation of `trace`.
///
/// Each window is measured against its own mean.
pub fn running_stdev(trace: &[f64], period: i64) -> Result<Vec<f64>, StatsError> {
    slide(trace, period, RollingWindow::population_stdev)
}

/// Mean and standard deviation for every window in a single pass.
pub fn windowed_stats(trace: &[f64], period: i64) -> Result<Vec<WindowStat>, StatsError> {
    slide(trace, period, |w| WindowStat {
        mean: w.mean(),
        stdev: w.population_stdev(),
    })
}

// ── Request / response ────────────────────────────────────────────────────────

/// A batch of named traces with the window periods to apply to all of them.
///
/// ```json
/// { "avg_period": 100, "stdev_period": 100, "accel_x": [..], "accel_y": [..] }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsRequest {
    pub avg_period: i64,
    pub stdev_period: i64,
    /// Channel name → trace.
    #[serde(flatten)]
    pub traces: BTreeMap<String, Vec<f64>>,
}

/// Per-channel running means and standard deviations, each the same length
/// as the corresponding input trace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsResponse {
    pub avgs: BTreeMap<String, Vec<f64>>,
    pub stdevs: BTreeMap<String, Vec<f64>>,
}

/// Compute running means and standard deviations for every trace in `request`.
///
/// Fails on the first invalid channel; no partial response is returned.
pub fn compute_stats(request: &StatsRequest) -> Result<StatsResponse, StatsError> {
    let mut response = StatsResponse::default();
    for (channel, trace) in &request.traces {
        response
            .avgs
            .insert(channel.clone(), running_mean(trace, request.avg_period)?);
        response
            .stdevs
            .insert(channel.clone(), running_stdev(trace, request.stdev_period)?);
    }
    Ok(response)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
