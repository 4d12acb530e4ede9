//! Priority-rule interface and catalogue (spec component: priority-rule
//! interface + look-ahead).
//!
//! A rule is a (possibly stateful) pure function of
//! `(machine_setup, queue, look_ahead, now)` that picks which queued target
//! an idle machine should process next. It never reorders the queue itself;
//! the kernel removes the chosen index once selection returns it.

use std::collections::VecDeque;
use std::fmt;

use crate::model::workstation::{FutureArrival, PrioRuleTarget};
use crate::time::Time;

pub trait PriorityRule: fmt::Debug {
    /// Returns the index of the chosen queue entry, or `None` if nothing
    /// should be selected this round (e.g. `SetupMinimizing` holding out for
    /// an announced arrival).
    fn select(
        &mut self,
        machine_setup: Option<&str>,
        queue: &VecDeque<PrioRuleTarget>,
        look_ahead: &[FutureArrival],
        now: Time,
    ) -> Option<usize>;

    fn clone_box(&self) -> Box<dyn PriorityRule>;
}

impl Clone for Box<dyn PriorityRule> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

fn min_job_id(queue: &VecDeque<PrioRuleTarget>, indices: impl Iterator<Item = usize>) -> Option<usize> {
    indices.min_by_key(|&i| queue[i].job(0).id)
}

/// Earliest arrival first; ties by ascending job number.
#[derive(Debug, Clone, Default)]
pub struct Fifo;

impl PriorityRule for Fifo {
    fn select(
        &mut self,
        _machine_setup: Option<&str>,
        queue: &VecDeque<PrioRuleTarget>,
        _look_ahead: &[FutureArrival],
        _now: Time,
    ) -> Option<usize> {
        if queue.is_empty() {
            return None;
        }
        min_job_id(queue, 0..queue.len())
    }

    fn clone_box(&self) -> Box<dyn PriorityRule> {
        Box::new(self.clone())
    }
}

/// Shortest processing time first; ties by ascending job number.
#[derive(Debug, Clone, Default)]
pub struct Spt;

impl PriorityRule for Spt {
    fn select(
        &mut self,
        _machine_setup: Option<&str>,
        queue: &VecDeque<PrioRuleTarget>,
        _look_ahead: &[FutureArrival],
        _now: Time,
    ) -> Option<usize> {
        queue
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                a.proc_time()
                    .cmp(&b.proc_time())
                    .then_with(|| a.job(0).id.cmp(&b.job(0).id))
            })
            .map(|(i, _)| i)
    }

    fn clone_box(&self) -> Box<dyn PriorityRule> {
        Box::new(self.clone())
    }
}

/// Earliest due date first; jobs with no due date sort last. Ties by
/// ascending job number.
#[derive(Debug, Clone, Default)]
pub struct Edd;

impl PriorityRule for Edd {
    fn select(
        &mut self,
        _machine_setup: Option<&str>,
        queue: &VecDeque<PrioRuleTarget>,
        _look_ahead: &[FutureArrival],
        _now: Time,
    ) -> Option<usize> {
        queue
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                let da = a.job(0).due_date;
                let db = b.job(0).due_date;
                match (da, db) {
                    (Some(a), Some(b)) => a.cmp(&b),
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => std::cmp::Ordering::Equal,
                }
                .then_with(|| a.job(0).id.cmp(&b.job(0).id))
            })
            .map(|(i, _)| i)
    }

    fn clone_box(&self) -> Box<dyn PriorityRule> {
        Box::new(self.clone())
    }
}

/// Prefers a queued target matching the machine's current setup family. If
/// none matches but look-ahead announces a matching arrival within
/// `patience`, it declines to select this round rather than pay a
/// changeover; otherwise it falls back to FIFO among what's queued.
#[derive(Debug, Clone)]
pub struct SetupMinimizing {
    pub patience: crate::time::Duration,
}

impl SetupMinimizing {
    pub fn new(patience: crate::time::Duration) -> Self {
        SetupMinimizing { patience }
    }
}

impl PriorityRule for SetupMinimizing {
    fn select(
        &mut self,
        machine_setup: Option<&str>,
        queue: &VecDeque<PrioRuleTarget>,
        look_ahead: &[FutureArrival],
        now: Time,
    ) -> Option<usize> {
        if queue.is_empty() {
            return None;
        }

        if let Some(setup) = machine_setup {
            let matching = (0..queue.len()).filter(|&i| queue[i].setup_family() == Some(setup));
            if let Some(best) = min_job_id(queue, matching) {
                return Some(best);
            }

            let awaiting_match = look_ahead
                .iter()
                .any(|f| f.job.current_operation().map(|op| op.setup_family.as_str()) == Some(setup) && f.arrives_at - now <= self.patience);
            if awaiting_match {
                return None;
            }
        }

        min_job_id(queue, 0..queue.len())
    }

    fn clone_box(&self) -> Box<dyn PriorityRule> {
        Box::new(self.clone())
    }
}
