//! Notification bus (spec component: notification bus).
//!
//! Listeners register against an [`EventKind`] tag and are invoked in
//! registration order. A listener may re-enter `publish` from inside its own
//! `inform` call; rather than recursing, the bus queues the new notification
//! and drains it in FIFO order once the triggering fan-out has returned, so a
//! chain of re-entrant publishes still preserves causal order and always
//! finishes before the kernel pops its next event.
//!
//! Deliberately *not* built on `nuts` (the teacher's actor registry):
//! `nuts::new_domained_activity`/`nuts::store_to_domain` register activities
//! and domain state in one process-wide, thread-local registry keyed by a
//! `Domain` marker *type*, not by a runtime value — the teacher's own
//! `Simulator::new` (`sim.rs`) stores exactly one `DefaultDomain` state per
//! process and is only ever constructed once per `main()`. This crate's
//! experiment driver runs many independent [`crate::kernel::Simulation`]s
//! back to back in one process (`MultiConfExperiment::run_all`, every
//! `Scenario::run`, and the test suite's many `NotificationBus::new()`
//! calls), each needing its own isolated subscriber set; nuts has no
//! observed API (here or in the teacher) for tearing down or re-scoping a
//! domain's activities between runs, so reusing it would leak listeners
//! from replication N into replication N+1. A plain per-instance
//! `HashMap<EventKind, Vec<Subscription>>` sidesteps that entirely by giving
//! every `NotificationBus` its own registry with ordinary Rust ownership.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use crate::utils::prelude::*;

/// Identifies the kind of a [`Notification`] for subscription matching.
/// `Custom` exists for test/extension notifications that don't correspond to
/// a built-in shop-model transition (used by synthetic re-entrant events).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Fired once per popped event, before dispatch, so listeners that need
    /// the current clock (trace/CSV writers) don't need their own timer.
    Tick,
    JobArrivedInQueue,
    WsJobArrival,
    WsJobSelected,
    JobStartOperation,
    JobEndOperation,
    WsJobCompleted,
    JobFinished,
    MachineDown,
    MachineResumed,
    Custom(u32),
}

/// A fired notification, carrying whatever payload its kind needs.
#[derive(Debug, Clone)]
pub enum Notification {
    Tick { now: crate::time::Time },
    JobArrivedInQueue { job_id: u64, workstation: usize, due_date: Option<crate::time::Time> },
    WsJobArrival { job_id: u64, workstation: usize },
    WsJobSelected { job_id: u64, workstation: usize, machine: usize, is_batch: bool },
    JobStartOperation { job_id: u64, workstation: usize },
    JobEndOperation { job_id: u64, workstation: usize },
    WsJobCompleted { job_id: u64, workstation: usize, machine: usize },
    JobFinished { job_id: u64 },
    MachineDown { workstation: usize, machine: usize },
    MachineResumed { workstation: usize, machine: usize },
    Custom { kind: u32, tag: String },
}

impl Notification {
    pub fn kind(&self) -> EventKind {
        match self {
            Notification::Tick { .. } => EventKind::Tick,
            Notification::JobArrivedInQueue { .. } => EventKind::JobArrivedInQueue,
            Notification::WsJobArrival { .. } => EventKind::WsJobArrival,
            Notification::WsJobSelected { .. } => EventKind::WsJobSelected,
            Notification::JobStartOperation { .. } => EventKind::JobStartOperation,
            Notification::JobEndOperation { .. } => EventKind::JobEndOperation,
            Notification::WsJobCompleted { .. } => EventKind::WsJobCompleted,
            Notification::JobFinished { .. } => EventKind::JobFinished,
            Notification::MachineDown { .. } => EventKind::MachineDown,
            Notification::MachineResumed { .. } => EventKind::MachineResumed,
            Notification::Custom { kind, .. } => EventKind::Custom(*kind),
        }
    }
}

pub trait Listener {
    fn inform(&mut self, bus: &NotificationBus, note: &Notification);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Subscription {
    id: ListenerId,
    listener: Rc<RefCell<dyn Listener>>,
}

/// Registration-ordered, re-entrancy-safe pub/sub bus.
pub struct NotificationBus {
    subscriptions: RefCell<HashMap<EventKind, Vec<Subscription>>>,
    next_id: Cell<u64>,
    fanout_depth: Cell<u32>,
    pending: RefCell<VecDeque<Notification>>,
    disable_count: Cell<i32>,
    stop_requested: Cell<bool>,
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationBus {
    pub fn new() -> Self {
        NotificationBus {
            subscriptions: RefCell::new(HashMap::new()),
            next_id: Cell::new(0),
            fanout_depth: Cell::new(0),
            pending: RefCell::new(VecDeque::new()),
            disable_count: Cell::new(0),
            stop_requested: Cell::new(false),
        }
    }

    /// Requests a soft stop of the owning simulation (spec §4.2: "an explicit
    /// stop signal from any listener"). Callable from inside `inform`, since
    /// `inform` only ever receives `&NotificationBus`, never `&mut
    /// Simulation`; the kernel polls [`NotificationBus::stop_requested`] after
    /// each dispatch.
    pub fn request_stop(&self) {
        self.stop_requested.set(true);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested.get()
    }

    /// Registers `listener` for `kind`. Fails with
    /// [`Error::ConcurrentModification`] if called from inside a fan-out
    /// (including one triggered by `listener` itself).
    pub fn subscribe(&self, kind: EventKind, listener: Rc<RefCell<dyn Listener>>) -> Result<ListenerId> {
        if self.fanout_depth.get() > 0 {
            return Err(Error::ConcurrentModification(kind));
        }
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.subscriptions
            .borrow_mut()
            .entry(kind)
            .or_default()
            .push(Subscription { id, listener });
        Ok(id)
    }

    /// Removes a listener. Safe to call from inside that same listener's
    /// `inform`, including for the listener currently firing: fan-out
    /// iterates a snapshot, so removal here only affects future publishes.
    pub fn unsubscribe(&self, kind: EventKind, id: ListenerId) {
        if let Some(list) = self.subscriptions.borrow_mut().get_mut(&kind) {
            list.retain(|s| s.id != id);
        }
    }

    /// Suspends delivery; nested calls require matching `enable` calls.
    pub fn disable(&self) {
        self.disable_count.set(self.disable_count.get() + 1);
    }

    /// Resumes delivery after a matching `disable`. Fails with
    /// [`Error::invariant`] if the counter would go negative.
    pub fn enable(&self) -> Result<()> {
        let next = self.disable_count.get() - 1;
        if next < 0 {
            return Err(Error::invariant("enable() called without a matching disable()"));
        }
        self.disable_count.set(next);
        Ok(())
    }

    fn is_disabled(&self) -> bool {
        self.disable_count.get() > 0
    }

    /// Fans `note` out to every listener subscribed to its kind, in
    /// registration order. A no-op while disabled. Notifications published
    /// from inside a listener's `inform` are queued and drained, in order,
    /// only after this top-level fan-out returns.
    pub fn publish(&self, note: Notification) {
        if self.is_disabled() {
            return;
        }

        if self.fanout_depth.get() > 0 {
            self.pending.borrow_mut().push_back(note);
            return;
        }

        self.fanout_depth.set(1);
        self.fan_out(&note);
        self.fanout_depth.set(0);

        loop {
            let next = self.pending.borrow_mut().pop_front();
            match next {
                Some(queued) => {
                    self.fanout_depth.set(1);
                    self.fan_out(&queued);
                    self.fanout_depth.set(0);
                }
                None => break,
            }
        }
    }

    fn fan_out(&self, note: &Notification) {
        let snapshot: Vec<Rc<RefCell<dyn Listener>>> = self
            .subscriptions
            .borrow()
            .get(&note.kind())
            .map(|list| list.iter().map(|s| s.listener.clone()).collect())
            .unwrap_or_default();

        for listener in snapshot {
            listener.borrow_mut().inform(self, note);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder(Vec<Notification>);

    impl Listener for Recorder {
        fn inform(&mut self, _bus: &NotificationBus, note: &Notification) {
            self.0.push(note.clone());
        }
    }

    #[test]
    fn listeners_fire_in_registration_order() {
        let bus = NotificationBus::new();
        let order = Rc::new(RefCell::new(Vec::<&'static str>::new()));

        struct Tag(Rc<RefCell<Vec<&'static str>>>, &'static str);
        impl Listener for Tag {
            fn inform(&mut self, _bus: &NotificationBus, _note: &Notification) {
                self.0.borrow_mut().push(self.1);
            }
        }

        bus.subscribe(
            EventKind::JobFinished,
            Rc::new(RefCell::new(Tag(order.clone(), "first"))),
        )
        .unwrap();
        bus.subscribe(
            EventKind::JobFinished,
            Rc::new(RefCell::new(Tag(order.clone(), "second"))),
        )
        .unwrap();

        bus.publish(Notification::JobFinished { job_id: 1 });

        assert_eq!(*order.borrow(), vec!["first", "second"]);
    }

    /// S5: a listener that republishes from inside `inform` has its
    /// notification delivered after the triggering fan-out completes.
    #[test]
    fn reentrant_publish_is_deferred_until_fanout_completes() {
        let bus = NotificationBus::new();
        let order = Rc::new(RefCell::new(Vec::<&'static str>::new()));

        struct Republisher(Rc<RefCell<Vec<&'static str>>>);
        impl Listener for Republisher {
            fn inform(&mut self, bus: &NotificationBus, note: &Notification) {
                self.0.borrow_mut().push("selected-handler-start");
                bus.publish(Notification::Custom {
                    kind: 42,
                    tag: "x".into(),
                });
                self.0.borrow_mut().push("selected-handler-end");
                let _ = note;
            }
        }

        struct XObserver(Rc<RefCell<Vec<&'static str>>>);
        impl Listener for XObserver {
            fn inform(&mut self, _bus: &NotificationBus, _note: &Notification) {
                self.0.borrow_mut().push("x-observed");
            }
        }

        bus.subscribe(
            EventKind::WsJobSelected,
            Rc::new(RefCell::new(Republisher(order.clone()))),
        )
        .unwrap();
        bus.subscribe(EventKind::Custom(42), Rc::new(RefCell::new(XObserver(order.clone()))))
            .unwrap();

        bus.publish(Notification::WsJobSelected {
            job_id: 1,
            workstation: 0,
            machine: 0,
            is_batch: false,
        });

        assert_eq!(
            *order.borrow(),
            vec!["selected-handler-start", "selected-handler-end", "x-observed"]
        );
    }

    #[test]
    fn registering_during_fanout_is_rejected() {
        let bus = Rc::new(NotificationBus::new());

        struct BadListener(Rc<NotificationBus>);
        impl Listener for BadListener {
            fn inform(&mut self, _bus: &NotificationBus, _note: &Notification) {
                let res = self.0.subscribe(
                    EventKind::JobFinished,
                    Rc::new(RefCell::new(Recorder(Vec::new()))),
                );
                assert!(matches!(res, Err(Error::ConcurrentModification(_))));
            }
        }

        bus.subscribe(
            EventKind::JobFinished,
            Rc::new(RefCell::new(BadListener(bus.clone()))),
        )
        .unwrap();

        bus.publish(Notification::JobFinished { job_id: 7 });
    }

    #[test]
    fn self_removal_during_fanout_does_not_skip_successors() {
        let bus = NotificationBus::new();
        let order = Rc::new(RefCell::new(Vec::<&'static str>::new()));

        struct SelfRemoving {
            order: Rc<RefCell<Vec<&'static str>>>,
            id: Cell<Option<ListenerId>>,
        }
        impl Listener for SelfRemoving {
            fn inform(&mut self, bus: &NotificationBus, _note: &Notification) {
                self.order.borrow_mut().push("removing-self");
                if let Some(id) = self.id.get() {
                    bus.unsubscribe(EventKind::JobFinished, id);
                }
            }
        }

        let removing = Rc::new(RefCell::new(SelfRemoving {
            order: order.clone(),
            id: Cell::new(None),
        }));
        let id = bus.subscribe(EventKind::JobFinished, removing.clone()).unwrap();
        removing.borrow().id.set(Some(id));

        struct Tail(Rc<RefCell<Vec<&'static str>>>);
        impl Listener for Tail {
            fn inform(&mut self, _bus: &NotificationBus, _note: &Notification) {
                self.0.borrow_mut().push("tail");
            }
        }
        bus.subscribe(EventKind::JobFinished, Rc::new(RefCell::new(Tail(order.clone()))))
            .unwrap();

        bus.publish(Notification::JobFinished { job_id: 1 });
        assert_eq!(*order.borrow(), vec!["removing-self", "tail"]);

        order.borrow_mut().clear();
        bus.publish(Notification::JobFinished { job_id: 2 });
        assert_eq!(*order.borrow(), vec!["tail"]);
    }

    /// A listener reached only through `&NotificationBus` (as `inform`
    /// always is) can still request a stop.
    #[test]
    fn listener_can_request_stop_through_the_bus() {
        let bus = NotificationBus::new();

        struct Stopper;
        impl Listener for Stopper {
            fn inform(&mut self, bus: &NotificationBus, _note: &Notification) {
                bus.request_stop();
            }
        }

        bus.subscribe(EventKind::JobFinished, Rc::new(RefCell::new(Stopper)))
            .unwrap();

        assert!(!bus.stop_requested());
        bus.publish(Notification::JobFinished { job_id: 1 });
        assert!(bus.stop_requested());
    }

    #[test]
    fn disable_is_reentrant_and_enable_below_zero_fails() {
        let bus = NotificationBus::new();
        bus.disable();
        bus.disable();
        assert!(bus.enable().is_ok());
        assert!(bus.enable().is_ok());
        assert!(matches!(bus.enable(), Err(Error::InvariantViolation(_))));
    }

    /// Round-trip: publish then a matching disable/enable pair is a no-op
    /// on listener state (no extra deliveries, no stuck disabled state).
    #[test]
    fn publish_then_disable_enable_pair_is_a_noop() {
        let bus = NotificationBus::new();
        let hits = Rc::new(RefCell::new(0u32));

        struct Counter(Rc<RefCell<u32>>);
        impl Listener for Counter {
            fn inform(&mut self, _bus: &NotificationBus, _note: &Notification) {
                *self.0.borrow_mut() += 1;
            }
        }
        bus.subscribe(EventKind::JobFinished, Rc::new(RefCell::new(Counter(hits.clone()))))
            .unwrap();

        bus.publish(Notification::JobFinished { job_id: 1 });
        assert_eq!(*hits.borrow(), 1);

        bus.disable();
        bus.publish(Notification::JobFinished { job_id: 2 });
        assert_eq!(*hits.borrow(), 1);
        bus.enable().unwrap();

        bus.publish(Notification::JobFinished { job_id: 3 });
        assert_eq!(*hits.borrow(), 2);
    }
}
