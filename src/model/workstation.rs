//! `WorkStation`: a processing resource with one or more parallel machines
//! and a shared input queue (spec §3, §4.4).

use std::collections::VecDeque;

use super::job::Job;
use super::machine::IndividualMachine;
use crate::event::EventHandle;
use crate::priority::PriorityRule;
use crate::randstream::RandomStream;
use crate::setup::SetupMatrix;
use crate::time::{Duration, Time};

/// The unit a priority rule selects: either one job or a batch of jobs
/// sharing a batch family. Batch processing time is the max of its members';
/// its setup family is shared by construction (batches only ever group jobs
/// of the same family).
#[derive(Debug, Clone)]
pub enum PrioRuleTarget {
    Single(Job),
    Batch(Vec<Job>),
}

impl PrioRuleTarget {
    pub fn is_batch(&self) -> bool {
        matches!(self, PrioRuleTarget::Batch(_))
    }

    pub fn num_jobs_in_batch(&self) -> usize {
        match self {
            PrioRuleTarget::Single(_) => 1,
            PrioRuleTarget::Batch(jobs) => jobs.len(),
        }
    }

    pub fn job(&self, i: usize) -> &Job {
        match self {
            PrioRuleTarget::Single(job) => {
                assert_eq!(i, 0);
                job
            }
            PrioRuleTarget::Batch(jobs) => &jobs[i],
        }
    }

    pub fn jobs(&self) -> &[Job] {
        match self {
            PrioRuleTarget::Single(job) => std::slice::from_ref(job),
            PrioRuleTarget::Batch(jobs) => jobs,
        }
    }

    pub fn jobs_mut(&mut self) -> &mut [Job] {
        match self {
            PrioRuleTarget::Single(job) => std::slice::from_mut(job),
            PrioRuleTarget::Batch(jobs) => jobs,
        }
    }

    /// The processing time charged for this selection: a single job's own
    /// proc-time, or the max proc-time among a batch's members.
    pub fn proc_time(&self) -> Duration {
        self.jobs()
            .iter()
            .filter_map(|j| j.current_operation())
            .map(|op| op.proc_time)
            .max()
            .unwrap_or(Duration::ZERO)
    }

    pub fn setup_family(&self) -> Option<&str> {
        self.jobs()
            .first()
            .and_then(|j| j.current_operation())
            .map(|op| op.setup_family.as_str())
    }
}

/// A future arrival announced by an upstream workstation via look-ahead:
/// the future-clone job plus the time it is expected to really arrive.
#[derive(Debug, Clone)]
pub struct FutureArrival {
    pub job: Job,
    pub arrives_at: Time,
}

/// Drives random breakdowns of one machine within a workstation (spec §4.4a):
/// `failure_stream` yields the time-to-next-failure once the machine comes
/// back up, `repair_stream` yields how long the repair takes.
#[derive(Clone)]
pub struct BreakdownConfig {
    pub machine: usize,
    pub failure_stream: Box<dyn RandomStream>,
    pub repair_stream: Box<dyn RandomStream>,
}

#[derive(Clone)]
pub struct WorkStation {
    pub id: usize,
    pub name: String,
    pub machines: Vec<IndividualMachine>,
    /// What each machine is currently processing, parallel to `machines`.
    pub in_process: Vec<Option<PrioRuleTarget>>,
    /// The handle for each machine's pending `Departure` event, parallel to
    /// `machines`, so a breakdown can cancel a stale departure before
    /// rescheduling it once the machine resumes.
    pub departure_handle: Vec<Option<EventHandle>>,
    pub queue: VecDeque<PrioRuleTarget>,
    pub look_ahead: Vec<FutureArrival>,
    pub look_ahead_enabled: bool,
    pub setup_matrix: SetupMatrix,
    pub priority_rule: Box<dyn PriorityRule>,
    pub breakdown: Option<BreakdownConfig>,
}

impl WorkStation {
    pub fn new(id: usize, name: impl Into<String>, capacity: usize, priority_rule: Box<dyn PriorityRule>) -> Self {
        WorkStation {
            id,
            name: name.into(),
            machines: (0..capacity).map(IndividualMachine::new).collect(),
            in_process: (0..capacity).map(|_| None).collect(),
            departure_handle: (0..capacity).map(|_| None).collect(),
            queue: VecDeque::new(),
            look_ahead: Vec::new(),
            look_ahead_enabled: false,
            setup_matrix: SetupMatrix::new(),
            priority_rule,
            breakdown: None,
        }
    }

    pub fn with_look_ahead(mut self, enabled: bool) -> Self {
        self.look_ahead_enabled = enabled;
        self
    }

    pub fn with_setup_matrix(mut self, matrix: SetupMatrix) -> Self {
        self.setup_matrix = matrix;
        self
    }

    pub fn with_breakdown(mut self, config: BreakdownConfig) -> Self {
        self.breakdown = Some(config);
        self
    }

    pub fn idle_machine(&self) -> Option<usize> {
        self.machines.iter().position(|m| m.is_idle())
    }

    /// Removes the arrivals in `look_ahead` whose job id matches `job_id`,
    /// called once the real arrival occurs.
    pub fn resolve_look_ahead(&mut self, job_id: u64) {
        self.look_ahead.retain(|f| f.job.id != job_id);
    }

    pub fn announce_future_arrival(&mut self, job: Job, arrives_at: Time) {
        self.look_ahead.push(FutureArrival { job, arrives_at });
    }
}
