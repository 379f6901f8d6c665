//! Per-tick observation sinks (dashboards, logs).
//!
//! Observers see an immutable [`TickRecord`] after each control tick. They are
//! side effects only: a failing observer is logged and the loop carries on.

use std::io::Write;
use std::sync::mpsc::Sender;

use serde::Serialize;
use tc_core::{Commands, Measurements};
use tracing::info;

use crate::error::LoopResult;

/// Snapshot of one control tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TickRecord {
    /// Process time at the start of the tick (s).
    pub t_proc: f64,
    pub measurements: Measurements,
    pub commands: Commands,
    /// References used this tick; absent when no schedule applies.
    pub setpoints: Option<(f64, f64)>,
}

/// Receives tick records from the runner.
pub trait TickObserver: Send {
    fn on_tick(&mut self, record: &TickRecord) -> LoopResult<()>;

    /// Called once when the run ends.
    fn finish(&mut self) -> LoopResult<()> {
        Ok(())
    }
}

/// Writes `t,T1,T2,U1,U2,SP1,SP2` rows; setpoint cells are empty when absent.
#[derive(Debug)]
pub struct CsvRecorder<W: Write> {
    out: W,
    wrote_header: bool,
}

impl<W: Write> CsvRecorder<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            wrote_header: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> TickObserver for CsvRecorder<W> {
    fn on_tick(&mut self, r: &TickRecord) -> LoopResult<()> {
        if !self.wrote_header {
            writeln!(self.out, "t,T1,T2,U1,U2,SP1,SP2")?;
            self.wrote_header = true;
        }
        let (sp1, sp2) = match r.setpoints {
            Some((a, b)) => (a.to_string(), b.to_string()),
            None => (String::new(), String::new()),
        };
        writeln!(
            self.out,
            "{:.3},{:.3},{:.3},{:.3},{:.3},{},{}",
            r.t_proc,
            r.measurements.t1,
            r.measurements.t2,
            r.commands.u1,
            r.commands.u2,
            sp1,
            sp2
        )?;
        Ok(())
    }

    fn finish(&mut self) -> LoopResult<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// One JSON object per line.
#[derive(Debug)]
pub struct JsonLinesRecorder<W: Write> {
    out: W,
}

impl<W: Write> JsonLinesRecorder<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write + Send> TickObserver for JsonLinesRecorder<W> {
    fn on_tick(&mut self, record: &TickRecord) -> LoopResult<()> {
        serde_json::to_writer(&mut self.out, record).map_err(std::io::Error::from)?;
        self.out.write_all(b"\n")?;
        Ok(())
    }

    fn finish(&mut self) -> LoopResult<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// Forwards records over a channel, e.g. to a dashboard thread.
///
/// A dropped receiver is not an error; records are discarded from then on.
#[derive(Debug)]
pub struct ChannelObserver {
    tx: Sender<TickRecord>,
}

impl ChannelObserver {
    pub fn new(tx: Sender<TickRecord>) -> Self {
        Self { tx }
    }
}

impl TickObserver for ChannelObserver {
    fn on_tick(&mut self, record: &TickRecord) -> LoopResult<()> {
        let _ = self.tx.send(*record);
        Ok(())
    }
}

/// Logs every `every`-th tick at info level.
#[derive(Debug)]
pub struct TracingObserver {
    every: u64,
    seen: u64,
}

impl TracingObserver {
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
            seen: 0,
        }
    }
}

impl TickObserver for TracingObserver {
    fn on_tick(&mut self, r: &TickRecord) -> LoopResult<()> {
        if self.seen % self.every == 0 {
            let (sp1, sp2) = r.setpoints.unwrap_or((f64::NAN, f64::NAN));
            info!(
                t = format_args!("{:.1}", r.t_proc),
                T1 = format_args!("{:.2}", r.measurements.t1),
                T2 = format_args!("{:.2}", r.measurements.t2),
                U1 = format_args!("{:.1}", r.commands.u1),
                U2 = format_args!("{:.1}", r.commands.u2),
                SP1 = format_args!("{:.1}", sp1),
                SP2 = format_args!("{:.1}", sp2),
                "tick"
            );
        }
        self.seen += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn record(setpoints: Option<(f64, f64)>) -> TickRecord {
        TickRecord {
            t_proc: 2.0,
            measurements: Measurements::new(21.5, 22.25),
            commands: Commands::new(40.0, 0.0),
            setpoints,
        }
    }

    #[test]
    fn csv_rows_and_empty_setpoints() {
        let mut csv = CsvRecorder::new(Vec::new());
        csv.on_tick(&record(Some((50.0, 30.0)))).unwrap();
        csv.on_tick(&record(None)).unwrap();
        csv.finish().unwrap();
        let text = String::from_utf8(csv.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "t,T1,T2,U1,U2,SP1,SP2");
        assert_eq!(lines[1], "2.000,21.500,22.250,40.000,0.000,50,30");
        assert_eq!(lines[2], "2.000,21.500,22.250,40.000,0.000,,");
    }

    #[test]
    fn json_lines_are_parseable() {
        let mut buf = Vec::new();
        {
            let mut json = JsonLinesRecorder::new(&mut buf);
            json.on_tick(&record(Some((50.0, 30.0)))).unwrap();
            json.on_tick(&record(None)).unwrap();
        }
        let text = String::from_utf8(buf).unwrap();
        let rows: Vec<serde_json::Value> =
            text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["measurements"]["t1"], 21.5);
        assert_eq!(rows[0]["setpoints"][1], 30.0);
        assert!(rows[1]["setpoints"].is_null());
    }

    #[test]
    fn channel_observer_survives_dropped_receiver() {
        let (tx, rx) = mpsc::channel();
        let mut obs = ChannelObserver::new(tx);
        obs.on_tick(&record(None)).unwrap();
        assert_eq!(rx.recv().unwrap().commands.u1, 40.0);
        drop(rx);
        assert!(obs.on_tick(&record(None)).is_ok());
    }
}
