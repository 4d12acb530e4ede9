//! Simulation kernel (spec component: simulation kernel).
//!
//! Single-threaded, cooperative: `run` pops the next event, advances the
//! clock to its time, and dispatches it; handlers may schedule further
//! events and publish notifications, but nothing runs concurrently with a
//! dispatch. Mirrors the teacher's `Rc<RefCell<Simulation>>`-owned shared
//! state, minus the `nuts` actor registry — one struct owns the queue, bus,
//! and shop directly.

use std::cell::RefCell;
use std::rc::Rc;

use crate::event::EventQueue;
use crate::listener::{FlowStatsListener, ResultMap, ResultProducer};
use crate::model::machine::{DownPolicy, MachineState};
use crate::model::shop::ReleasePlan;
use crate::model::workstation::PrioRuleTarget;
use crate::model::{Job, Shop};
use crate::notify::{EventKind, Notification, NotificationBus};
use crate::time::{Duration, Time};
use crate::utils::prelude::*;

/// Priority bands (spec §3): arrivals fire before same-time departures.
pub const PRIORITY_ARRIVAL: i32 = 0;
pub const PRIORITY_NORMAL: i32 = 10;
pub const PRIORITY_DEPARTURE: i32 = 20;

#[derive(Debug, Clone)]
pub enum ShopMessage {
    /// A job source's scheduled release fires.
    Arrival { source: usize },
    /// A machine finishes whatever it's processing.
    Departure { workstation: usize, machine: usize },
    /// A workstation's configured machine breaks down.
    Down { workstation: usize, machine: usize },
    /// A down machine comes back up.
    Resume { workstation: usize, machine: usize },
}

/// When a run should stop. A stop is soft: the triggering event still
/// completes before the loop exits.
#[derive(Debug, Clone, Default)]
pub struct StopCondition {
    pub horizon: Option<Time>,
    pub max_jobs_finished: Option<usize>,
}

impl StopCondition {
    fn reached(&self, now: Time, jobs_finished: usize) -> bool {
        self.horizon.map(|h| now >= h).unwrap_or(false)
            || self.max_jobs_finished.map(|n| jobs_finished >= n).unwrap_or(false)
    }
}

/// Owns the clock/event-queue, notification bus, and shop for one scenario
/// run.
pub struct Simulation {
    pub queue: EventQueue<ShopMessage>,
    pub bus: NotificationBus,
    pub shop: Shop,
    pub stats: Rc<RefCell<FlowStatsListener>>,
    pub stop: StopCondition,
}

impl Simulation {
    pub fn new(shop: Shop, stop: StopCondition) -> Self {
        let stats = Rc::new(RefCell::new(FlowStatsListener::new()));
        let bus = NotificationBus::new();
        for kind in crate::listener::ALL_EVENT_KINDS {
            // FlowStatsListener is mandatory, so it is always wired up
            // regardless of what other listeners a scenario adds.
            bus.subscribe(*kind, stats.clone()).expect("bus is fresh, fan-out not in progress");
        }
        Simulation {
            queue: EventQueue::new(),
            bus,
            shop,
            stats,
            stop,
        }
    }

    /// Registers `listener` against every event-kind in `kinds`.
    pub fn subscribe(&self, kinds: &[EventKind], listener: Rc<RefCell<dyn crate::notify::Listener>>) -> Result<()> {
        for kind in kinds {
            self.bus.subscribe(*kind, listener.clone())?;
        }
        Ok(())
    }

    /// Phase 1: schedules each job-source's first arrival at time 0, plus
    /// each breakdown-configured workstation's first failure.
    pub fn init(&mut self) -> Result<()> {
        for idx in 0..self.shop.job_sources.len() {
            if let Some(t) = self.shop.job_sources[idx].next_release(Time::ZERO) {
                self.queue.schedule(t, PRIORITY_ARRIVAL, ShopMessage::Arrival { source: idx })?;
            }
        }
        for ws_id in 0..self.shop.workstations.len() {
            self.schedule_next_breakdown(Time::ZERO, ws_id)?;
        }
        Ok(())
    }

    /// Phase 2: the main loop. Runs until the queue is empty or a stop
    /// condition fires.
    pub fn run(&mut self) -> Result<()> {
        while let Some((now, message)) = self.queue.pop_next() {
            self.bus.publish(Notification::Tick { now });
            self.dispatch(now, message)?;
            if self.bus.stop_requested() || self.stop.reached(now, self.shop.finished_jobs.len()) {
                break;
            }
        }
        Ok(())
    }

    /// Any listener may call [`NotificationBus::request_stop`] (reachable
    /// from `inform`, which only ever receives `&NotificationBus`) to request
    /// a soft stop: the current event still completes, but the loop exits
    /// before the next pop.
    pub fn request_stop(&mut self) {
        self.bus.request_stop();
    }

    /// Phase 3: collects each result producer's contribution.
    pub fn contribute_results(&self, results: &mut ResultMap) -> Result<()> {
        self.stats.borrow().contribute(results)
    }

    fn dispatch(&mut self, now: Time, message: ShopMessage) -> Result<()> {
        match message {
            ShopMessage::Arrival { source } => self.handle_arrival(now, source),
            ShopMessage::Departure { workstation, machine } => self.handle_departure(now, workstation, machine),
            ShopMessage::Down { workstation, machine } => self.handle_down(now, workstation, machine),
            ShopMessage::Resume { workstation, machine } => self.handle_resume(now, workstation, machine),
        }
    }

    /// Draws this workstation's next failure gap from its configured
    /// failure stream and schedules a `Down` for it. A no-op for
    /// workstations with no [`crate::model::BreakdownConfig`].
    fn schedule_next_breakdown(&mut self, now: Time, ws_id: usize) -> Result<()> {
        let (machine, gap) = {
            let ws = self.shop.workstation_mut(ws_id);
            let cfg = match ws.breakdown.as_mut() {
                Some(cfg) => cfg,
                None => return Ok(()),
            };
            (cfg.machine, cfg.failure_stream.next().unwrap_or(f64::INFINITY))
        };
        if gap.is_finite() {
            self.queue
                .schedule(now + Duration(gap), PRIORITY_NORMAL, ShopMessage::Down { workstation: ws_id, machine })?;
        }
        Ok(())
    }

    /// A workstation's configured machine goes down (spec §4.4a): any
    /// pending departure for it is cancelled, and a `Discard`-policy job
    /// in process is returned to the front of the queue for reselection; a
    /// `Preserve`-policy job stays parked in `in_process` until resume.
    fn handle_down(&mut self, now: Time, ws_id: usize, machine_idx: usize) -> Result<()> {
        let down_policy = self.shop.workstation(ws_id).machines[machine_idx].down_policy;
        {
            let ws = self.shop.workstation_mut(ws_id);
            ws.machines[machine_idx].go_down(now);
            if let Some(handle) = ws.departure_handle.get_mut(machine_idx).and_then(Option::take) {
                handle.cancel();
            }
        }
        self.bus.publish(Notification::MachineDown { workstation: ws_id, machine: machine_idx });

        if down_policy == DownPolicy::Discard {
            if let Some(target) = self.shop.workstation_mut(ws_id).in_process[machine_idx].take() {
                self.shop.workstation_mut(ws_id).queue.push_front(target);
            }
        }

        let repair_gap = {
            let ws = self.shop.workstation_mut(ws_id);
            let cfg = ws
                .breakdown
                .as_mut()
                .expect("a Down event only ever fires for a workstation with a breakdown config");
            cfg.repair_stream.next().unwrap_or(0.0)
        };
        self.queue
            .schedule(now + Duration(repair_gap), PRIORITY_NORMAL, ShopMessage::Resume { workstation: ws_id, machine: machine_idx })?;
        Ok(())
    }

    /// The machine comes back up (spec §4.4a). A `Preserve`-policy job still
    /// parked in `in_process` has its departure rescheduled for the
    /// remaining time; otherwise the now-idle machine attempts a fresh
    /// selection. Either way, the workstation's next failure is scheduled.
    fn handle_resume(&mut self, now: Time, ws_id: usize, machine_idx: usize) -> Result<()> {
        let remaining = match &self.shop.workstation(ws_id).machines[machine_idx].state {
            MachineState::Down { remaining } => *remaining,
            _ => None,
        };
        self.shop.workstation_mut(ws_id).machines[machine_idx].resume();
        self.bus.publish(Notification::MachineResumed { workstation: ws_id, machine: machine_idx });

        match remaining {
            Some(remaining) if self.shop.workstation(ws_id).in_process[machine_idx].is_some() => {
                let finishes = now + remaining;
                self.shop.workstation_mut(ws_id).machines[machine_idx].state = MachineState::Processing { started: now, finishes };
                let handle = self.queue.schedule(
                    finishes,
                    PRIORITY_DEPARTURE,
                    ShopMessage::Departure { workstation: ws_id, machine: machine_idx },
                )?;
                self.shop.workstation_mut(ws_id).departure_handle[machine_idx] = Some(handle);
            }
            _ => self.try_select(now, ws_id)?,
        }

        self.schedule_next_breakdown(now, ws_id)
    }

    fn handle_arrival(&mut self, now: Time, source: usize) -> Result<()> {
        let job = self.shop.job_sources[source].release_job(now);
        if let Some(next) = self.shop.job_sources[source].next_release(now) {
            self.queue
                .schedule(next, PRIORITY_ARRIVAL, ShopMessage::Arrival { source })?;
        }
        self.arrive_in_queue(now, job)
    }

    /// Places `job` into its current operation's workstation queue, grouping
    /// it into an existing same-family batch if its operation names one,
    /// then attempts a selection if a machine is free.
    fn arrive_in_queue(&mut self, now: Time, job: Job) -> Result<()> {
        let job_id = job.id;
        let due_date = job.due_date;
        let ws_id = match job.current_operation() {
            Some(op) => op.workstation,
            None => {
                self.job_finished(job);
                return Ok(());
            }
        };

        self.shop.workstation_mut(ws_id).resolve_look_ahead(job_id);

        let batch_family = job.current_operation().and_then(|op| op.batch_family.clone());
        let ws = self.shop.workstation_mut(ws_id);
        let merged = batch_family.as_ref().and_then(|family| {
            ws.queue.iter_mut().find_map(|target| match target {
                PrioRuleTarget::Batch(jobs) if jobs.first().and_then(|j| j.current_operation()).and_then(|op| op.batch_family.as_deref()) == Some(family.as_str()) => {
                    Some(jobs)
                }
                _ => None,
            })
        });
        match merged {
            Some(jobs) => jobs.push(job),
            None if batch_family.is_some() => ws.queue.push_back(PrioRuleTarget::Batch(vec![job])),
            None => ws.queue.push_back(PrioRuleTarget::Single(job)),
        }

        self.bus
            .publish(Notification::JobArrivedInQueue { job_id, workstation: ws_id, due_date });
        self.bus.publish(Notification::WsJobArrival { job_id, workstation: ws_id });

        if self.shop.workstation(ws_id).idle_machine().is_some() {
            self.try_select(now, ws_id)?;
        }
        Ok(())
    }

    /// Selection (spec §4.4): ask the priority rule to pick a target for the
    /// first idle machine, compute its setup + processing time, and schedule
    /// its departure.
    fn try_select(&mut self, now: Time, ws_id: usize) -> Result<()> {
        let machine_idx;
        let mut target;
        let finishes;

        {
            let ws = self.shop.workstation_mut(ws_id);
            machine_idx = match ws.idle_machine() {
                Some(idx) => idx,
                None => return Ok(()),
            };
            let machine_setup = ws.machines[machine_idx].current_setup.clone();
            let chosen = ws
                .priority_rule
                .select(machine_setup.as_deref(), &ws.queue, &ws.look_ahead, now);
            let idx = match chosen {
                Some(i) => i,
                None => return Ok(()),
            };
            target = ws.queue.remove(idx).expect("index came from this queue");

            let setup_time = ws.setup_matrix.cost(machine_setup.as_deref(), target.setup_family().unwrap_or(""));
            let proc_time = target.proc_time();
            finishes = now + setup_time + proc_time;

            ws.machines[machine_idx].start_processing(now, finishes, target.setup_family().unwrap_or(""));
        }

        for job in target.jobs_mut() {
            job.op_start = Some(now);
            job.op_finish = Some(finishes);
        }

        for job in target.jobs() {
            self.bus.publish(Notification::WsJobSelected {
                job_id: job.id,
                workstation: ws_id,
                machine: machine_idx,
                is_batch: target.is_batch(),
            });
            self.bus.publish(Notification::JobStartOperation {
                job_id: job.id,
                workstation: ws_id,
            });
        }

        if self.shop.workstation(ws_id).look_ahead_enabled {
            for job in target.jobs() {
                if job.task_number() + 1 < job.route.len() {
                    let next_ws = job.route[job.task_number() + 1].workstation;
                    let future = job.future_self();
                    self.shop.workstation_mut(next_ws).announce_future_arrival(future, finishes);
                }
            }
        }

        if let Some(slot) = self.shop.workstation_mut(ws_id).in_process.get_mut(machine_idx) {
            *slot = Some(target);
        }

        let handle = self.queue.schedule(
            finishes,
            PRIORITY_DEPARTURE,
            ShopMessage::Departure {
                workstation: ws_id,
                machine: machine_idx,
            },
        )?;
        if let Some(slot) = self.shop.workstation_mut(ws_id).departure_handle.get_mut(machine_idx) {
            *slot = Some(handle);
        }
        Ok(())
    }

    /// Departure (spec §4.4): the machine frees up, the job either advances
    /// to its next operation's queue or finishes, and a fresh selection is
    /// attempted on the now-idle machine.
    fn handle_departure(&mut self, now: Time, ws_id: usize, machine_idx: usize) -> Result<()> {
        let target = self.shop.workstation_mut(ws_id).in_process[machine_idx]
            .take()
            .expect("departure fired for a machine with nothing in process");
        self.shop.workstation_mut(ws_id).machines[machine_idx].complete();
        if let Some(slot) = self.shop.workstation_mut(ws_id).departure_handle.get_mut(machine_idx) {
            *slot = None;
        }

        for mut job in target.jobs().to_vec() {
            self.bus.publish(Notification::JobEndOperation { job_id: job.id, workstation: ws_id });
            self.bus
                .publish(Notification::WsJobCompleted { job_id: job.id, workstation: ws_id, machine: machine_idx });

            job.advance();
            if job.has_more_operations() {
                self.arrive_in_queue(now, job)?;
            } else {
                self.job_finished(job);
            }
        }

        self.try_select(now, ws_id)
    }

    fn job_finished(&mut self, job: Job) {
        self.bus.publish(Notification::JobFinished { job_id: job.id });
        self.shop.finished_jobs.push(job);
    }
}
