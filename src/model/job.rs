//! `Job`: the work unit flowing through the shop (spec §3).

use std::cell::Cell;
use std::fmt;

use super::value_store::ValueStore;
use super::Route;
use crate::time::{Duration, Time};

/// A job admitted into (or about to be admitted into) the shop, bound to a
/// `Route`. `remaining_cache` mirrors the original's invalidate-on-write
/// cache: any call to `set_task_number` clears it, and the next
/// `remaining_proc_time` call recomputes from the current `task_number`.
#[derive(Clone)]
pub struct Job {
    pub id: u64,
    pub job_type: String,
    pub name: Option<String>,
    pub route: Route,
    task_number: usize,
    pub release_date: Time,
    pub due_date: Option<Time>,
    pub weight: f64,
    pub op_start: Option<Time>,
    pub op_finish: Option<Time>,
    pub is_future: bool,
    pub value_store: ValueStore,
    remaining_cache: Cell<Option<Duration>>,
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("task_number", &self.task_number)
            .field("is_future", &self.is_future)
            .finish()
    }
}

impl Job {
    pub fn new(id: u64, job_type: impl Into<String>, route: Route, release_date: Time) -> Self {
        Job {
            id,
            job_type: job_type.into(),
            name: None,
            route,
            task_number: 0,
            release_date,
            due_date: None,
            weight: 1.0,
            op_start: None,
            op_finish: None,
            is_future: false,
            value_store: ValueStore::new(),
            remaining_cache: Cell::new(None),
        }
    }

    pub fn with_due_date(mut self, due_date: Time) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn task_number(&self) -> usize {
        self.task_number
    }

    /// Current operation, or `None` once every operation has been completed.
    pub fn current_operation(&self) -> Option<&super::Operation> {
        self.route.get(self.task_number)
    }

    pub fn has_more_operations(&self) -> bool {
        self.task_number < self.route.len()
    }

    /// Advances (or sets) the task index, invalidating the remaining-time
    /// cache so the next `remaining_proc_time` call recomputes it.
    pub fn set_task_number(&mut self, n: usize) {
        debug_assert!(n <= self.route.len());
        self.task_number = n;
        self.remaining_cache.set(None);
    }

    pub fn advance(&mut self) {
        self.set_task_number(self.task_number + 1);
    }

    /// Sum of processing times from `task_number` onward. Cached until the
    /// next `set_task_number`/`advance` call.
    pub fn remaining_proc_time(&self) -> Duration {
        if let Some(cached) = self.remaining_cache.get() {
            return cached;
        }
        let total = self.route[self.task_number..]
            .iter()
            .fold(Duration::ZERO, |acc, op| acc + op.proc_time);
        self.remaining_cache.set(Some(total));
        total
    }

    pub fn missed_deadline(&self, time: Time) -> bool {
        self.due_date.map(|d| time > d).unwrap_or(false)
    }

    /// Produces the look-ahead placeholder for this job: a future-clone
    /// pointing at the same upcoming operation, flagged `is_future` so it is
    /// never mistaken for a real queue member.
    pub fn future_self(&self) -> Job {
        let mut clone = self.clone();
        clone.is_future = true;
        clone
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Job({}, task={}/{}, released@{:.2})",
            self.id,
            self.task_number,
            self.route.len(),
            self.release_date.0
        )
    }
}
