//! Trace/result writers: concrete [`crate::notify::Listener`] implementations
//! that accumulate a scenario's job timeline and dump it as a Chrome
//! `about://tracing` JSON array or a per-job CSV (spec §4.10), mirroring the
//! teacher's own `output.rs` shape (a streaming JSON writer plus a `csv`
//! writer, both tagged with [`ErrorKind`] via [`Kind`]).

use std::fs::File;
use std::io;
use std::io::{BufWriter, Write};

use serde_json::json;

use crate::config::AppConfigExt as _;
use crate::notify::{Listener, Notification, NotificationBus};
use crate::time::Time;
use crate::utils::app_config::AppConfig;
use crate::utils::prelude::*;

fn event_line(writer: impl io::Write, val: serde_json::Value) -> Result<()> {
    event_line_with_ending(writer, val, true)
}

fn event_line_with_ending(mut writer: impl io::Write, val: serde_json::Value, ending: bool) -> Result<()> {
    serde_json::to_writer(&mut writer, &val).kind(ErrorKind::ChromeTracing)?;
    if ending {
        writer.write_all(b",\n").kind(ErrorKind::ChromeTracing)?;
    }
    Ok(())
}

#[derive(Debug, Clone)]
enum Span {
    /// A job's queuing wait: from arrival in a workstation's queue to its
    /// selection.
    Queuing { job_id: u64, workstation: usize, start: Time, end: Option<Time> },
    /// A job's (or batch member's) processing span.
    Exec { job_id: u64, workstation: usize, start: Time, end: Option<Time>, is_batch: bool },
}

/// Accumulates queuing/exec spans for every job across the run, then renders
/// them as a Chrome trace JSON array once the run has stopped.
#[derive(Debug, Default)]
pub struct ChromeTraceListener {
    now: Time,
    spans: Vec<Span>,
}

impl ChromeTraceListener {
    pub fn new() -> Self {
        Self::default()
    }

    fn open_queuing(&mut self, job_id: u64, workstation: usize) {
        self.spans.push(Span::Queuing { job_id, workstation, start: self.now, end: None });
    }

    fn close_queuing(&mut self, job_id: u64) {
        for span in self.spans.iter_mut().rev() {
            if let Span::Queuing { job_id: j, end, .. } = span {
                if *j == job_id && end.is_none() {
                    *end = Some(self.now);
                    break;
                }
            }
        }
    }

    fn open_exec(&mut self, job_id: u64, workstation: usize, is_batch: bool) {
        self.spans.push(Span::Exec { job_id, workstation, start: self.now, end: None, is_batch });
    }

    fn close_exec(&mut self, job_id: u64) {
        for span in self.spans.iter_mut().rev() {
            if let Span::Exec { job_id: j, end, .. } = span {
                if *j == job_id && end.is_none() {
                    *end = Some(self.now);
                    break;
                }
            }
        }
    }

    /// Renders every recorded span as a Chrome `about://tracing` JSON array
    /// under the app config's output directory (`timeline.json`). Each
    /// workstation gets its own `pid` track so concurrent machines don't
    /// overlap visually.
    pub fn write(&self, app_config: &AppConfig) -> Result<()> {
        let path = app_config.output_dir()?.file("timeline.json")?;
        info!("writing chrome trace to {}", path.display());

        let mut file = BufWriter::new(File::create(&path).kind(ErrorKind::ChromeTracing)?);
        file.write_all(b"[\n").kind(ErrorKind::ChromeTracing)?;

        for span in &self.spans {
            match span {
                Span::Queuing { job_id, workstation, start, end } => {
                    let end = end.unwrap_or(*start);
                    event_line(
                        &mut file,
                        json!({
                            "name": format!("Job {job_id} queuing"),
                            "ph": "X",
                            "cat": "queuing",
                            "ts": start.0,
                            "dur": (end - *start).0,
                            "pid": workstation,
                            "tid": job_id,
                            "args": { "job_id": job_id },
                        }),
                    )?;
                }
                Span::Exec { job_id, workstation, start, end, is_batch } => {
                    let end = end.unwrap_or(*start);
                    event_line(
                        &mut file,
                        json!({
                            "name": format!("Job {job_id} exec"),
                            "ph": "X",
                            "cat": if *is_batch { "exec.batch" } else { "exec" },
                            "ts": start.0,
                            "dur": (end - *start).0,
                            "pid": workstation,
                            "tid": job_id,
                            "args": { "job_id": job_id, "batch": is_batch },
                        }),
                    )?;
                }
            }
        }

        event_line_with_ending(
            &mut file,
            json!({ "name": "process_name", "ph": "M", "pid": 0, "args": { "name": "scenario" } }),
            false,
        )?;
        file.write_all(b"\n]").kind(ErrorKind::ChromeTracing)?;
        Ok(())
    }
}

impl Listener for ChromeTraceListener {
    fn inform(&mut self, _bus: &NotificationBus, note: &Notification) {
        match note {
            Notification::Tick { now } => self.now = *now,
            Notification::JobArrivedInQueue { job_id, workstation, .. } => self.open_queuing(*job_id, *workstation),
            Notification::JobStartOperation { job_id, workstation } => {
                self.close_queuing(*job_id);
                self.open_exec(*job_id, *workstation, false);
            }
            Notification::JobEndOperation { job_id, .. } => self.close_exec(*job_id),
            _ => {}
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct JobRow {
    admitted: Option<Time>,
    started: Option<Time>,
    finished: Option<Time>,
}

/// Accumulates one row per job (admitted/started/finished timestamps), then
/// writes them as a CSV once the run has stopped.
#[derive(Debug, Default)]
pub struct JobTraceListener {
    now: Time,
    rows: std::collections::BTreeMap<u64, JobRow>,
}

impl JobTraceListener {
    pub fn new() -> Self {
        Self::default()
    }

    fn row(&mut self, job_id: u64) -> &mut JobRow {
        self.rows.entry(job_id).or_default()
    }

    pub fn write(&self, app_config: &AppConfig) -> Result<()> {
        #[derive(serde::Serialize)]
        #[serde(rename_all = "PascalCase")]
        struct Row {
            job_id: u64,
            admitted: Option<f64>,
            started: Option<f64>,
            finished: Option<f64>,
        }

        let path = app_config.output_dir()?.file("jobs.csv")?;
        info!("writing job trace to {}", path.display());

        let mut writer = csv::Writer::from_path(path).kind(ErrorKind::JobsCsv)?;
        for (job_id, row) in &self.rows {
            writer
                .serialize(Row {
                    job_id: *job_id,
                    admitted: row.admitted.map(|t| t.0),
                    started: row.started.map(|t| t.0),
                    finished: row.finished.map(|t| t.0),
                })
                .kind(ErrorKind::JobsCsv)?;
        }
        writer.flush().kind(ErrorKind::JobsCsv)?;
        Ok(())
    }
}

impl Listener for JobTraceListener {
    fn inform(&mut self, _bus: &NotificationBus, note: &Notification) {
        match note {
            Notification::Tick { now } => self.now = *now,
            Notification::JobArrivedInQueue { job_id, .. } => {
                let now = self.now;
                self.row(*job_id).admitted.get_or_insert(now);
            }
            Notification::JobStartOperation { job_id, .. } => {
                let now = self.now;
                self.row(*job_id).started.get_or_insert(now);
            }
            Notification::JobFinished { job_id } => {
                let now = self.now;
                self.row(*job_id).finished = Some(now);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_trace_records_admitted_started_finished() {
        let bus = NotificationBus::new();
        let mut trace = JobTraceListener::new();

        trace.inform(&bus, &Notification::Tick { now: Time(0.0) });
        trace.inform(&bus, &Notification::JobArrivedInQueue { job_id: 1, workstation: 0, due_date: None });
        trace.inform(&bus, &Notification::Tick { now: Time(1.0) });
        trace.inform(&bus, &Notification::JobStartOperation { job_id: 1, workstation: 0 });
        trace.inform(&bus, &Notification::Tick { now: Time(3.0) });
        trace.inform(&bus, &Notification::JobFinished { job_id: 1 });

        let row = trace.rows.get(&1).unwrap();
        assert_eq!(row.admitted, Some(Time(0.0)));
        assert_eq!(row.started, Some(Time(1.0)));
        assert_eq!(row.finished, Some(Time(3.0)));
    }

    #[test]
    fn chrome_trace_closes_queuing_span_on_start() {
        let bus = NotificationBus::new();
        let mut trace = ChromeTraceListener::new();

        trace.inform(&bus, &Notification::Tick { now: Time(0.0) });
        trace.inform(&bus, &Notification::JobArrivedInQueue { job_id: 1, workstation: 0, due_date: None });
        trace.inform(&bus, &Notification::Tick { now: Time(2.0) });
        trace.inform(&bus, &Notification::JobStartOperation { job_id: 1, workstation: 0 });

        assert!(matches!(trace.spans[0], Span::Queuing { end: Some(Time(t)), .. } if t == 2.0));
    }
}
