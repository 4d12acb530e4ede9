//! Shop domain model (spec component: shop model and transitions).

pub mod job;
pub mod machine;
pub mod shop;
pub mod value_store;
pub mod workstation;

pub use job::Job;
pub use machine::{DownPolicy, IndividualMachine, MachineState};
pub use shop::{JobSource, ReleasePlan, Shop};
pub use value_store::ValueStore;
pub use workstation::{BreakdownConfig, PrioRuleTarget, WorkStation};

use crate::time::Duration;

/// One processing step of a route: immutable, shared via `Rc<Vec<Operation>>`
/// across every job on that route.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub workstation: usize,
    pub proc_time: Duration,
    pub setup_family: String,
    pub batch_family: Option<String>,
}

impl Operation {
    pub fn new(workstation: usize, proc_time: Duration, setup_family: impl Into<String>) -> Self {
        Operation {
            workstation,
            proc_time,
            setup_family: setup_family.into(),
            batch_family: None,
        }
    }

    pub fn with_batch_family(mut self, family: impl Into<String>) -> Self {
        self.batch_family = Some(family.into());
        self
    }
}

pub type Route = std::rc::Rc<Vec<Operation>>;
