//! Result map and the required statistics collector (spec component:
//! listener framework; §6 external interfaces' Result map).

use std::collections::{BTreeMap, HashMap};

use crate::notify::{EventKind, Listener, Notification, NotificationBus};
use crate::time::Time;
use crate::utils::prelude::*;

/// A value in a [`ResultMap`]: numeric, text, or a nested sub-map, so
/// collectors can group related keys (e.g. per-workstation utilization)
/// without flattening them into dotted strings.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultValue {
    Num(f64),
    Text(String),
    Nested(ResultMap),
}

/// `BTreeMap` (not `HashMap`) so key order — and therefore anything derived
/// from iterating it, like a serialized dump — never depends on hash seed,
/// preserving the determinism contract (spec §5, invariant 5).
pub type ResultMap = BTreeMap<String, ResultValue>;

/// Inserts `value` under `key`, failing with [`Error::DuplicateResultKey`] if
/// the key is already present — the contract every statistics collector
/// must honor when contributing to a shared result map.
pub fn insert_unique(map: &mut ResultMap, key: impl Into<String>, value: ResultValue) -> Result<()> {
    let key = key.into();
    if map.contains_key(&key) {
        return Err(Error::DuplicateResultKey(key));
    }
    map.insert(key, value);
    Ok(())
}

/// Something that contributes entries to a scenario's result map once the
/// run has stopped (spec §4.2 phase 3).
pub trait ResultProducer {
    fn contribute(&self, results: &mut ResultMap) -> Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
struct JobTiming {
    arrived: Option<Time>,
    started: Option<Time>,
    finished: Option<Time>,
    due_date: Option<Time>,
}

/// The only *required* collector: accumulates flow-time, tardiness, and
/// per-workstation machine-busy-time, and writes them (plus the reserved
/// `simTime` key) into the shop's result map on `contribute`.
#[derive(Debug, Default)]
pub struct FlowStatsListener {
    timings: HashMap<u64, JobTiming>,
    finished_order: Vec<u64>,
    now: Time,
    /// Open busy-intervals keyed by `(workstation, machine)`, from
    /// `WsJobSelected` to the matching `WsJobCompleted`. Batch members select
    /// and complete in the same dispatch, so repeated notifications for the
    /// same key within one selection are idempotent and never double-count.
    busy_open: HashMap<(usize, usize), Time>,
    busy_time: HashMap<usize, f64>,
}

impl FlowStatsListener {
    pub fn new() -> Self {
        Self::default()
    }

    fn timing(&mut self, job_id: u64) -> &mut JobTiming {
        self.timings.entry(job_id).or_default()
    }
}

impl Listener for FlowStatsListener {
    fn inform(&mut self, _bus: &NotificationBus, note: &Notification) {
        match note {
            Notification::Tick { now } => self.advance_clock(*now),
            Notification::JobArrivedInQueue { job_id, due_date, .. } => {
                let timing = self.timing(*job_id);
                timing.arrived.get_or_insert(self.now);
                timing.due_date = *due_date;
            }
            Notification::JobStartOperation { job_id, .. } => {
                self.timing(*job_id).started.get_or_insert(self.now);
            }
            Notification::WsJobSelected { workstation, machine, .. } => {
                let now = self.now;
                self.busy_open.entry((*workstation, *machine)).or_insert(now);
            }
            Notification::WsJobCompleted { workstation, machine, .. } => {
                if let Some(start) = self.busy_open.remove(&(*workstation, *machine)) {
                    *self.busy_time.entry(*workstation).or_insert(0.0) += (self.now - start).0;
                }
            }
            Notification::JobFinished { job_id } => {
                self.timing(*job_id).finished = Some(self.now);
                self.finished_order.push(*job_id);
            }
            _ => {}
        }
    }
}

impl FlowStatsListener {
    /// Called by the kernel whenever the clock advances, so this listener's
    /// bookkeeping can timestamp notifications without requiring every
    /// `Notification` variant to carry its own `Time`.
    pub fn advance_clock(&mut self, now: Time) {
        self.now = now;
    }

    pub fn mean_flow_time(&self) -> Option<f64> {
        if self.finished_order.is_empty() {
            return None;
        }
        let total: f64 = self
            .finished_order
            .iter()
            .filter_map(|id| self.timings.get(id))
            .filter_map(|t| match (t.arrived, t.finished) {
                (Some(a), Some(f)) => Some((f - a).0),
                _ => None,
            })
            .sum();
        Some(total / self.finished_order.len() as f64)
    }

    /// Mean of `max(0, finish - due_date)` across finished jobs with a due
    /// date; `None` if no finished job carries one.
    pub fn mean_tardiness(&self) -> Option<f64> {
        let tardiness: Vec<f64> = self
            .finished_order
            .iter()
            .filter_map(|id| self.timings.get(id))
            .filter_map(|t| match (t.finished, t.due_date) {
                (Some(f), Some(d)) if f > d => Some((f - d).0),
                (Some(_), Some(_)) => Some(0.0),
                _ => None,
            })
            .collect();
        if tardiness.is_empty() {
            return None;
        }
        Some(tardiness.iter().sum::<f64>() / tardiness.len() as f64)
    }

    /// Busy-time fraction for `workstation` over the elapsed simulated time
    /// (`busy_time / now`), `None` before the clock has moved.
    pub fn utilization(&self, workstation: usize) -> Option<f64> {
        if self.now.0 <= 0.0 {
            return None;
        }
        Some(self.busy_time.get(&workstation).copied().unwrap_or(0.0) / self.now.0)
    }

    pub fn completion_time(&self, job_id: u64) -> Option<Time> {
        self.timings.get(&job_id).and_then(|t| t.finished)
    }
}

impl ResultProducer for FlowStatsListener {
    fn contribute(&self, results: &mut ResultMap) -> Result<()> {
        insert_unique(results, "simTime", ResultValue::Num(self.now.0))?;
        insert_unique(
            results,
            "jobsFinished",
            ResultValue::Num(self.finished_order.len() as f64),
        )?;
        if let Some(mean) = self.mean_flow_time() {
            insert_unique(results, "meanFlowTime", ResultValue::Num(mean))?;
        }
        if let Some(mean) = self.mean_tardiness() {
            insert_unique(results, "meanTardiness", ResultValue::Num(mean))?;
        }
        let mut workstations: Vec<_> = self.busy_time.keys().copied().collect();
        workstations.sort_unstable();
        if !workstations.is_empty() {
            let mut util = ResultMap::new();
            for ws_id in workstations {
                if let Some(u) = self.utilization(ws_id) {
                    insert_unique(&mut util, ws_id.to_string(), ResultValue::Num(u))?;
                }
            }
            insert_unique(results, "utilization", ResultValue::Nested(util))?;
        }
        Ok(())
    }
}

/// Every shop kind that every collector subscribes to; a convenience for
/// wiring a new `Listener` up to the whole lifecycle in one call.
pub const ALL_EVENT_KINDS: &[EventKind] = &[
    EventKind::Tick,
    EventKind::JobArrivedInQueue,
    EventKind::WsJobArrival,
    EventKind::WsJobSelected,
    EventKind::JobStartOperation,
    EventKind::JobEndOperation,
    EventKind::WsJobCompleted,
    EventKind::JobFinished,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_result_key_is_rejected() {
        let mut map = ResultMap::new();
        insert_unique(&mut map, "simTime", ResultValue::Num(1.0)).unwrap();
        let err = insert_unique(&mut map, "simTime", ResultValue::Num(2.0));
        assert!(matches!(err, Err(Error::DuplicateResultKey(_))));
    }

    #[test]
    fn flow_stats_tracks_mean_flow_time() {
        let bus = NotificationBus::new();
        let mut stats = FlowStatsListener::new();

        stats.advance_clock(Time(0.0));
        stats.inform(&bus, &Notification::JobArrivedInQueue { job_id: 1, workstation: 0, due_date: None });
        stats.advance_clock(Time(3.0));
        stats.inform(&bus, &Notification::JobFinished { job_id: 1 });

        assert_eq!(stats.mean_flow_time(), Some(3.0));
        assert_eq!(stats.completion_time(1), Some(Time(3.0)));
    }

    #[test]
    fn flow_stats_tracks_tardiness_against_due_date() {
        let bus = NotificationBus::new();
        let mut stats = FlowStatsListener::new();

        stats.advance_clock(Time(0.0));
        stats.inform(
            &bus,
            &Notification::JobArrivedInQueue { job_id: 1, workstation: 0, due_date: Some(Time(2.0)) },
        );
        stats.advance_clock(Time(5.0));
        stats.inform(&bus, &Notification::JobFinished { job_id: 1 });

        // Finished at 5.0 against a due date of 2.0: 3.0 tardy.
        assert_eq!(stats.mean_tardiness(), Some(3.0));
    }

    #[test]
    fn flow_stats_reports_zero_tardiness_when_on_time() {
        let bus = NotificationBus::new();
        let mut stats = FlowStatsListener::new();

        stats.advance_clock(Time(0.0));
        stats.inform(
            &bus,
            &Notification::JobArrivedInQueue { job_id: 1, workstation: 0, due_date: Some(Time(10.0)) },
        );
        stats.advance_clock(Time(5.0));
        stats.inform(&bus, &Notification::JobFinished { job_id: 1 });

        assert_eq!(stats.mean_tardiness(), Some(0.0));
    }

    #[test]
    fn flow_stats_tracks_machine_utilization() {
        let bus = NotificationBus::new();
        let mut stats = FlowStatsListener::new();

        stats.advance_clock(Time(0.0));
        stats.inform(
            &bus,
            &Notification::WsJobSelected { job_id: 1, workstation: 0, machine: 0, is_batch: false },
        );
        stats.advance_clock(Time(4.0));
        stats.inform(&bus, &Notification::WsJobCompleted { job_id: 1, workstation: 0, machine: 0 });
        stats.advance_clock(Time(10.0));

        // Busy 4.0 out of 10.0 elapsed.
        assert_eq!(stats.utilization(0), Some(0.4));
    }
}
