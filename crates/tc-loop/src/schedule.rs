//! Periodic setpoint schedule for both channels.
//!
//! A schedule is a table of `(t, T1, T2)` breakpoints starting at `t = 0`.
//! The last breakpoint's time is the period: lookups wrap around forever.
//! Between breakpoints the references are either held (zero-order hold) or
//! linearly interpolated.

use std::io::BufRead;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{LoopError, LoopResult};

/// How references are reconstructed between breakpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    /// Hold the previous breakpoint until the next one has been passed.
    #[default]
    #[serde(alias = "zoh", alias = "zero_order_hold")]
    Hold,
    /// Straight line between neighbouring breakpoints.
    #[serde(alias = "interpolate")]
    Linear,
}

/// One breakpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetpointSample {
    pub t: f64,
    pub t1: f64,
    pub t2: f64,
}

impl SetpointSample {
    pub fn new(t: f64, t1: f64, t2: f64) -> Self {
        Self { t, t1, t2 }
    }

    fn values(&self) -> (f64, f64) {
        (self.t1, self.t2)
    }
}

/// Immutable periodic table of references.
#[derive(Debug, Clone, PartialEq)]
pub struct SetpointSchedule {
    samples: Vec<SetpointSample>,
    t_end: f64,
    mode: Interpolation,
}

impl SetpointSchedule {
    /// Build a schedule from breakpoints in any order.
    ///
    /// Samples are stably sorted by time, so among equal times the later one
    /// wins for lookups past that time.
    ///
    /// # Errors
    ///
    /// `Configuration` if the table is empty, holds a non-finite value, does
    /// not start at `t = 0`, or its last time is not positive.
    pub fn new(mut samples: Vec<SetpointSample>, mode: Interpolation) -> LoopResult<Self> {
        if samples.is_empty() {
            return Err(LoopError::config("setpoint schedule is empty"));
        }
        if samples
            .iter()
            .any(|s| !(s.t.is_finite() && s.t1.is_finite() && s.t2.is_finite()))
        {
            return Err(LoopError::config("setpoint schedule contains a non-finite value"));
        }
        samples.sort_by(|a, b| a.t.total_cmp(&b.t));

        if samples[0].t != 0.0 {
            return Err(LoopError::config(format!(
                "setpoint schedule must start at t=0 (first time is {})",
                samples[0].t
            )));
        }
        let t_end = samples[samples.len() - 1].t;
        if t_end <= 0.0 {
            return Err(LoopError::config("setpoint schedule period must be > 0"));
        }
        Ok(Self {
            samples,
            t_end,
            mode,
        })
    }

    /// Parse a table with a `t, T1, T2` header row (columns in any order,
    /// extra columns ignored).
    pub fn from_csv_reader<R: BufRead>(reader: R, mode: Interpolation) -> LoopResult<Self> {
        let mut lines = reader
            .lines()
            .enumerate()
            .filter(|(_, line)| line.as_ref().map_or(true, |l| !l.trim().is_empty()));

        let header = match lines.next() {
            Some((_, line)) => line?,
            None => return Err(LoopError::config("setpoint file is empty")),
        };
        let columns: Vec<&str> = header.split(',').map(str::trim).collect();
        let col = |name: &str| {
            columns
                .iter()
                .position(|c| *c == name)
                .ok_or_else(|| LoopError::config(format!("setpoint file has no '{name}' column")))
        };
        let (it, i1, i2) = (col("t")?, col("T1")?, col("T2")?);

        let mut samples = Vec::new();
        for (idx, line) in lines {
            let line = line?;
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            let field = |i: usize| -> LoopResult<f64> {
                let raw = fields.get(i).copied().unwrap_or("");
                raw.parse::<f64>().map_err(|_| {
                    LoopError::config(format!("line {}: cannot parse '{raw}' as a number", idx + 1))
                })
            };
            samples.push(SetpointSample::new(field(it)?, field(i1)?, field(i2)?));
        }
        Self::new(samples, mode)
    }

    /// Read a CSV schedule file.
    pub fn from_csv_path(path: &Path, mode: Interpolation) -> LoopResult<Self> {
        let file = std::fs::File::open(path).map_err(|source| LoopError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_csv_reader(std::io::BufReader::new(file), mode)
    }

    /// Period of the schedule (s).
    pub fn period(&self) -> f64 {
        self.t_end
    }

    pub fn mode(&self) -> Interpolation {
        self.mode
    }

    pub fn samples(&self) -> &[SetpointSample] {
        &self.samples
    }

    /// References `(T1, T2)` at process time `t` (s).
    pub fn get_setpoints(&self, t: f64) -> (f64, f64) {
        let t = if t < 0.0 { 0.0 } else { t };
        let t_mod = t % self.t_end;

        let first = &self.samples[0];
        if t_mod <= first.t {
            return first.values();
        }

        let mut prev = first;
        for next in &self.samples[1..] {
            if t_mod <= next.t {
                return match self.mode {
                    Interpolation::Hold => prev.values(),
                    Interpolation::Linear => interpolate(prev, next, t_mod),
                };
            }
            prev = next;
        }

        // Only reachable through rounding at the very end of the period.
        self.samples[self.samples.len() - 1].values()
    }
}

fn interpolate(prev: &SetpointSample, next: &SetpointSample, t: f64) -> (f64, f64) {
    let span = next.t - prev.t;
    if span == 0.0 {
        return prev.values();
    }
    let alpha = (t - prev.t) / span;
    (
        prev.t1 + alpha * (next.t1 - prev.t1),
        prev.t2 + alpha * (next.t2 - prev.t2),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_step(mode: Interpolation) -> SetpointSchedule {
        SetpointSchedule::new(
            vec![SetpointSample::new(0.0, 10.0, 20.0), SetpointSample::new(5.0, 30.0, 40.0)],
            mode,
        )
        .unwrap()
    }

    #[test]
    fn hold_boundary_belongs_to_left_value() {
        let s = two_step(Interpolation::Hold);
        assert_eq!(s.get_setpoints(0.0), (10.0, 20.0));
        assert_eq!(s.get_setpoints(3.0), (10.0, 20.0));
        assert_eq!(s.get_setpoints(5.0), (10.0, 20.0));
        assert_eq!(s.get_setpoints(5.0001), (10.0, 20.0));
    }

    #[test]
    fn hold_switches_after_inner_breakpoint() {
        let s = SetpointSchedule::new(
            vec![
                SetpointSample::new(0.0, 20.0, 20.0),
                SetpointSample::new(10.0, 50.0, 30.0),
                SetpointSample::new(20.0, 50.0, 30.0),
            ],
            Interpolation::Hold,
        )
        .unwrap();
        assert_eq!(s.get_setpoints(10.0), (20.0, 20.0));
        assert_eq!(s.get_setpoints(10.5), (50.0, 30.0));
        assert_eq!(s.get_setpoints(25.0), (20.0, 20.0));
    }

    #[test]
    fn linear_midpoint() {
        let s = two_step(Interpolation::Linear);
        assert_eq!(s.get_setpoints(2.5), (20.0, 30.0));
        assert_eq!(s.get_setpoints(5.0), (10.0, 20.0));
    }

    #[test]
    fn negative_time_clamps_to_start() {
        let s = two_step(Interpolation::Linear);
        assert_eq!(s.get_setpoints(-3.0), (10.0, 20.0));
    }

    #[test]
    fn unsorted_input_is_sorted_and_later_duplicate_wins() {
        let s = SetpointSchedule::new(
            vec![
                SetpointSample::new(8.0, 0.0, 0.0),
                SetpointSample::new(4.0, 1.0, 1.0),
                SetpointSample::new(0.0, 5.0, 5.0),
                SetpointSample::new(4.0, 2.0, 2.0),
            ],
            Interpolation::Hold,
        )
        .unwrap();
        assert_eq!(s.period(), 8.0);
        assert_eq!(s.get_setpoints(6.0), (2.0, 2.0));
    }

    #[test]
    fn construction_errors() {
        assert!(SetpointSchedule::new(vec![], Interpolation::Hold).is_err());
        assert!(SetpointSchedule::new(
            vec![SetpointSample::new(1.0, 0.0, 0.0), SetpointSample::new(2.0, 0.0, 0.0)],
            Interpolation::Hold
        )
        .is_err());
        assert!(
            SetpointSchedule::new(vec![SetpointSample::new(0.0, 1.0, 1.0)], Interpolation::Hold)
                .is_err()
        );
        assert!(SetpointSchedule::new(
            vec![SetpointSample::new(0.0, 1.0, 1.0), SetpointSample::new(-2.0, 1.0, 1.0)],
            Interpolation::Hold
        )
        .is_err());
    }

    #[test]
    fn csv_with_reordered_columns() {
        let csv = "T2, t ,T1\n20,0,10\n\n40,5,30\n";
        let s = SetpointSchedule::from_csv_reader(csv.as_bytes(), Interpolation::Linear).unwrap();
        assert_eq!(s.samples().len(), 2);
        assert_eq!(s.get_setpoints(2.5), (20.0, 30.0));
    }

    #[test]
    fn csv_errors_name_the_problem() {
        let err = SetpointSchedule::from_csv_reader("t,T1\n0,1\n".as_bytes(), Interpolation::Hold)
            .unwrap_err();
        assert!(err.to_string().contains("T2"));

        let err =
            SetpointSchedule::from_csv_reader("t,T1,T2\n0,1,x\n".as_bytes(), Interpolation::Hold)
                .unwrap_err();
        assert!(err.to_string().contains("line 2"));

        assert!(SetpointSchedule::from_csv_reader("".as_bytes(), Interpolation::Hold).is_err());
    }
}
