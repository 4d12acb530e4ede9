//! The built-in demo scenario the `run` subcommand executes: two
//! workstations in series, Poisson arrivals, FIFO dispatch at both stations.

use std::rc::Rc;

use shopsim::model::{JobSource, Operation, ReleasePlan, Shop, WorkStation};
use shopsim::priority::Fifo;
use shopsim::randstream::DistStream;
use shopsim::time::{Duration, Time};
use shopsim::{Scenario, StopCondition};

pub fn scenario() -> Scenario {
    let route = Rc::new(vec![
        Operation::new(0, Duration(1.0), "fam-a"),
        Operation::new(1, Duration(1.5), "fam-a"),
    ]);

    let ws0 = WorkStation::new(0, "cutting", 1, Box::new(Fifo));
    let ws1 = WorkStation::new(1, "finishing", 2, Box::new(Fifo));

    let arrivals = DistStream::new(rand_distr::Exp::new(1.0).expect("rate > 0"), "shopsim-demo");
    let source = JobSource::new(0, "orders", "widget", route, ReleasePlan::Stream(Box::new(arrivals)));

    let shop = Shop::new(vec![ws0, ws1], vec![source]);
    let stop = StopCondition {
        horizon: None,
        max_jobs_finished: Some(200),
    };
    Scenario::new(shop, stop)
}
