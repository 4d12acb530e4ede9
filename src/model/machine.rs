//! `IndividualMachine`: a single processing unit inside a workstation.

use serde::{Deserialize, Serialize};

use crate::time::{Duration, Time};

/// What happens to the remaining processing time of an in-progress operation
/// when its machine goes down. Per-workstation configurable (spec §9's open
/// question), default `Preserve`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownPolicy {
    /// The job resumes from where it left off once the machine comes back up.
    Preserve,
    /// The in-progress operation is abandoned; the job re-enters the queue.
    Discard,
}

impl Default for DownPolicy {
    fn default() -> Self {
        DownPolicy::Preserve
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MachineState {
    Idle,
    /// The workstation keeps the actual `PrioRuleTarget` being processed in
    /// its own `in_process` slot, indexed by machine id; this state only
    /// tracks timing.
    Processing { started: Time, finishes: Time },
    Down { remaining: Option<Duration> },
    Inactive,
}

#[derive(Debug, Clone)]
pub struct IndividualMachine {
    pub id: usize,
    pub state: MachineState,
    /// Setup family of the last job processed, used to look up the setup
    /// matrix entry for the next selection.
    pub current_setup: Option<String>,
    pub down_policy: DownPolicy,
}

impl IndividualMachine {
    pub fn new(id: usize) -> Self {
        IndividualMachine {
            id,
            state: MachineState::Idle,
            current_setup: None,
            down_policy: DownPolicy::default(),
        }
    }

    pub fn with_down_policy(mut self, policy: DownPolicy) -> Self {
        self.down_policy = policy;
        self
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, MachineState::Idle)
    }

    pub fn is_down(&self) -> bool {
        matches!(self.state, MachineState::Down { .. })
    }

    pub fn start_processing(&mut self, started: Time, finishes: Time, setup_family: &str) {
        self.state = MachineState::Processing { started, finishes };
        self.current_setup = Some(setup_family.to_owned());
    }

    pub fn complete(&mut self) {
        self.state = MachineState::Idle;
    }

    /// Transitions to `Down`. If processing, the remaining time is preserved
    /// or discarded according to `down_policy`.
    pub fn go_down(&mut self, now: Time) {
        let remaining = match &self.state {
            MachineState::Processing { finishes, .. } if self.down_policy == DownPolicy::Preserve => {
                Some(*finishes - now)
            }
            _ => None,
        };
        self.state = MachineState::Down { remaining };
    }

    pub fn resume(&mut self) {
        self.state = MachineState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserve_policy_keeps_remaining_time_on_downtime() {
        let mut m = IndividualMachine::new(0).with_down_policy(DownPolicy::Preserve);
        m.start_processing(Time(0.0), Time(10.0), "a");
        m.go_down(Time(4.0));
        assert_eq!(m.state, MachineState::Down { remaining: Some(Duration(6.0)) });
    }

    #[test]
    fn discard_policy_drops_remaining_time_on_downtime() {
        let mut m = IndividualMachine::new(0).with_down_policy(DownPolicy::Discard);
        m.start_processing(Time(0.0), Time(10.0), "a");
        m.go_down(Time(4.0));
        assert_eq!(m.state, MachineState::Down { remaining: None });
    }

    #[test]
    fn resume_restores_idle() {
        let mut m = IndividualMachine::new(0);
        m.start_processing(Time(0.0), Time(10.0), "a");
        m.go_down(Time(4.0));
        m.resume();
        assert!(m.is_idle());
    }
}
