//! The scheduler: time-ordered task firing.
//!
//! # Design
//!
//! - Tasks live in a `BTreeMap<TaskId, Task>` (id order = registration
//!   order, which keeps every scan deterministic).
//! - The firing index is a `BTreeMap<(next_fire, seq), TaskId>`: ascending
//!   fire time, ties broken by registration sequence. Reproducible across
//!   runs with identical inputs.
//! - Rescheduling is anchored to the previous *scheduled* time, never the
//!   actual driver time, so a late driver causes catch-up fires instead of
//!   accumulated drift.

use std::collections::BTreeMap;

use crate::id::TaskId;
use crate::sim::{SimTime, StateHash};
use crate::task::{Task, TaskKind, TaskState};

// ---------------------------------------------------------------------------
// Due set
// ---------------------------------------------------------------------------

/// One tick's due fires, partitioned by phase.
///
/// Within each list, fires are in ascending `(fire_time, seq)` order. A task
/// can appear more than once when the driver skipped past several of its
/// nominal fire times (catch-up).
#[derive(Debug, Default)]
pub struct DueSet {
    pub production: Vec<TaskId>,
    pub consumption: Vec<TaskId>,
    pub transfer: Vec<TaskId>,
}

impl DueSet {
    pub fn total(&self) -> usize {
        self.production.len() + self.consumption.len() + self.transfer.len()
    }
}

/// An interval change applied by the optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalAdjustment {
    pub old: SimTime,
    pub new: SimTime,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct Scheduler {
    tasks: BTreeMap<TaskId, Task>,
    /// Firing index keyed by `(next_fire, seq)`.
    queue: BTreeMap<(SimTime, u64), TaskId>,
    next_seq: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task. Its first fire lands one interval after
    /// `effect_time` (the tick boundary where the registration applied).
    pub fn insert(&mut self, id: TaskId, kind: TaskKind, interval: SimTime, effect_time: SimTime) {
        let seq = self.next_seq;
        self.next_seq += 1;
        let next_fire = effect_time + interval;
        self.queue.insert((next_fire, seq), id);
        self.tasks.insert(
            id,
            Task {
                id,
                kind,
                interval,
                next_fire,
                state: TaskState::Idle,
                seq,
            },
        );
    }

    /// Remove a task. Returns it so the engine can tear down any driven
    /// connections it owned.
    pub fn remove(&mut self, id: TaskId) -> Option<Task> {
        let task = self.tasks.remove(&id)?;
        self.queue.remove(&(task.next_fire, task.seq));
        Some(task)
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.tasks.contains_key(&id)
    }

    /// Tasks in registration (id) order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    // -----------------------------------------------------------------------
    // Firing
    // -----------------------------------------------------------------------

    /// Pop every fire scheduled at or before `now`, in ascending
    /// `(fire_time, seq)` order, and advance each task's `next_fire` by its
    /// interval (from the scheduled time, not from `now`).
    pub fn collect_due(&mut self, now: SimTime) -> DueSet {
        let mut due = DueSet::default();
        loop {
            let Some((&(fire_at, seq), &id)) = self.queue.first_key_value() else {
                break;
            };
            if fire_at > now {
                break;
            }
            self.queue.remove(&(fire_at, seq));

            let Some(task) = self.tasks.get_mut(&id) else {
                continue;
            };
            task.state = TaskState::Due;
            task.next_fire = fire_at + task.interval;
            self.queue.insert((task.next_fire, task.seq), id);

            match task.kind {
                TaskKind::Production(_) => due.production.push(id),
                TaskKind::Consumption(_) => due.consumption.push(id),
                TaskKind::Transfer(_) => due.transfer.push(id),
            }
        }
        due
    }

    /// Mark a due task as having executed this tick.
    pub fn note_fired(&mut self, id: TaskId) {
        if let Some(task) = self.tasks.get_mut(&id) {
            task.state = TaskState::Fired;
        }
    }

    /// Return every task to `Idle` at the end of the tick.
    pub fn end_tick(&mut self) {
        for task in self.tasks.values_mut() {
            task.state = TaskState::Idle;
        }
    }

    // -----------------------------------------------------------------------
    // Optimizer hooks
    // -----------------------------------------------------------------------

    /// Change a task's interval in place, re-anchoring its pending fire to
    /// the same schedule point: `next_fire - old + new`. Keeps the firing
    /// index in sync. Returns `None` when the task is unknown or the
    /// interval is unchanged.
    pub fn adjust_interval(
        &mut self,
        id: TaskId,
        new_interval: SimTime,
    ) -> Option<IntervalAdjustment> {
        let task = self.tasks.get_mut(&id)?;
        let old = task.interval;
        if new_interval == old || new_interval == 0 {
            return None;
        }
        self.queue.remove(&(task.next_fire, task.seq));
        task.next_fire = task.next_fire - old + new_interval;
        task.interval = new_interval;
        self.queue.insert((task.next_fire, task.seq), id);
        Some(IntervalAdjustment {
            old,
            new: new_interval,
        })
    }

    // -----------------------------------------------------------------------
    // Determinism
    // -----------------------------------------------------------------------

    /// Fold the schedule into a state hash (id order).
    pub fn hash_into(&self, hash: &mut StateHash) {
        for task in self.tasks.values() {
            hash.write_u64(task.id.0);
            hash.write_u64(task.next_fire);
            hash.write_u64(task.interval);
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::f64_to_fixed64 as fx;
    use crate::resource::ResourceType;
    use crate::task::{ConsumptionTask, ProductionTask, TransferTask};

    fn production_kind() -> TaskKind {
        TaskKind::Production(ProductionTask {
            resource: ResourceType::Minerals,
            amount_per_fire: fx(10.0),
            conditions: Vec::new(),
        })
    }

    fn consumption_kind() -> TaskKind {
        TaskKind::Consumption(ConsumptionTask {
            resource: ResourceType::Minerals,
            amount_per_fire: fx(5.0),
            required: false,
        })
    }

    fn transfer_kind() -> TaskKind {
        let mut sm = slotmap::SlotMap::<crate::id::NodeId, ()>::with_key();
        let a = sm.insert(());
        let b = sm.insert(());
        TaskKind::Transfer(TransferTask {
            source: a,
            target: b,
            entries: Vec::new(),
            connections: Vec::new(),
        })
    }

    // -----------------------------------------------------------------------
    // Test 1: first_fire_is_one_interval_after_registration
    // -----------------------------------------------------------------------
    #[test]
    fn first_fire_is_one_interval_after_registration() {
        let mut sched = Scheduler::new();
        sched.insert(TaskId(0), production_kind(), 10, 0);

        assert_eq!(sched.collect_due(9).total(), 0);
        let due = sched.collect_due(10);
        assert_eq!(due.production, vec![TaskId(0)]);
    }

    // -----------------------------------------------------------------------
    // Test 2: ascending_fire_time_then_registration_order
    // -----------------------------------------------------------------------
    #[test]
    fn ascending_fire_time_then_registration_order() {
        let mut sched = Scheduler::new();
        // Same kind so ordering is visible in one list. b fires earlier;
        // a and c tie and must come out in registration order.
        sched.insert(TaskId(0), production_kind(), 20, 0); // fires at 20
        sched.insert(TaskId(1), production_kind(), 10, 0); // fires at 10
        sched.insert(TaskId(2), production_kind(), 20, 0); // fires at 20

        let due = sched.collect_due(20);
        // TaskId(1) appears twice: at 10, then again in the tie at 20 where
        // its seq (1) still precedes TaskId(2)'s seq (2).
        assert_eq!(
            due.production,
            vec![TaskId(1), TaskId(0), TaskId(1), TaskId(2)]
        );
    }

    // -----------------------------------------------------------------------
    // Test 3: drift_free_catch_up
    // -----------------------------------------------------------------------
    #[test]
    fn drift_free_catch_up() {
        let mut sched = Scheduler::new();
        sched.insert(TaskId(0), production_kind(), 1000, 0);

        // Driver shows up late at 2500: nominal fires 1000 and 2000 both run.
        let due = sched.collect_due(2500);
        assert_eq!(due.production.len(), 2);
        // The next nominal fire stays on the grid at 3000, not 3500.
        assert_eq!(sched.task(TaskId(0)).unwrap().next_fire, 3000);
    }

    // -----------------------------------------------------------------------
    // Test 4: due_set_partitions_by_kind
    // -----------------------------------------------------------------------
    #[test]
    fn due_set_partitions_by_kind() {
        let mut sched = Scheduler::new();
        sched.insert(TaskId(0), consumption_kind(), 5, 0);
        sched.insert(TaskId(1), production_kind(), 5, 0);
        sched.insert(TaskId(2), transfer_kind(), 5, 0);

        let due = sched.collect_due(5);
        assert_eq!(due.production, vec![TaskId(1)]);
        assert_eq!(due.consumption, vec![TaskId(0)]);
        assert_eq!(due.transfer, vec![TaskId(2)]);
    }

    // -----------------------------------------------------------------------
    // Test 5: adjust_interval_reanchors_pending_fire
    // -----------------------------------------------------------------------
    #[test]
    fn adjust_interval_reanchors_pending_fire() {
        let mut sched = Scheduler::new();
        sched.insert(TaskId(0), production_kind(), 100, 0);
        assert_eq!(sched.task(TaskId(0)).unwrap().next_fire, 100);

        let adj = sched.adjust_interval(TaskId(0), 60).unwrap();
        assert_eq!(adj, IntervalAdjustment { old: 100, new: 60 });
        // Re-anchored to the registration point: fires at 60 now.
        assert_eq!(sched.task(TaskId(0)).unwrap().next_fire, 60);

        let due = sched.collect_due(60);
        assert_eq!(due.production, vec![TaskId(0)]);
        assert_eq!(sched.task(TaskId(0)).unwrap().next_fire, 120);
    }

    // -----------------------------------------------------------------------
    // Test 6: adjust_interval_unknown_or_noop
    // -----------------------------------------------------------------------
    #[test]
    fn adjust_interval_unknown_or_noop() {
        let mut sched = Scheduler::new();
        sched.insert(TaskId(0), production_kind(), 100, 0);
        assert!(sched.adjust_interval(TaskId(9), 50).is_none());
        assert!(sched.adjust_interval(TaskId(0), 100).is_none());
        assert!(sched.adjust_interval(TaskId(0), 0).is_none());
    }

    // -----------------------------------------------------------------------
    // Test 7: remove_drops_from_queue
    // -----------------------------------------------------------------------
    #[test]
    fn remove_drops_from_queue() {
        let mut sched = Scheduler::new();
        sched.insert(TaskId(0), production_kind(), 10, 0);
        sched.insert(TaskId(1), production_kind(), 10, 0);

        let removed = sched.remove(TaskId(0)).unwrap();
        assert!(matches!(removed.kind, TaskKind::Production(_)));
        assert!(sched.remove(TaskId(0)).is_none());

        let due = sched.collect_due(10);
        assert_eq!(due.production, vec![TaskId(1)]);
    }

    // -----------------------------------------------------------------------
    // Test 8: state_machine_cycles_back_to_idle
    // -----------------------------------------------------------------------
    #[test]
    fn state_machine_cycles_back_to_idle() {
        let mut sched = Scheduler::new();
        sched.insert(TaskId(0), production_kind(), 10, 0);
        assert_eq!(sched.task(TaskId(0)).unwrap().state, TaskState::Idle);

        sched.collect_due(10);
        assert_eq!(sched.task(TaskId(0)).unwrap().state, TaskState::Due);

        sched.note_fired(TaskId(0));
        assert_eq!(sched.task(TaskId(0)).unwrap().state, TaskState::Fired);

        sched.end_tick();
        assert_eq!(sched.task(TaskId(0)).unwrap().state, TaskState::Idle);
    }

    // -----------------------------------------------------------------------
    // Test 9: registration_at_later_effect_time
    // -----------------------------------------------------------------------
    #[test]
    fn registration_at_later_effect_time() {
        let mut sched = Scheduler::new();
        sched.insert(TaskId(0), production_kind(), 10, 50);
        assert_eq!(sched.collect_due(50).total(), 0);
        assert_eq!(sched.collect_due(60).production, vec![TaskId(0)]);
    }

    // -----------------------------------------------------------------------
    // Test 10: schedule_hash_tracks_intervals
    // -----------------------------------------------------------------------
    #[test]
    fn schedule_hash_tracks_intervals() {
        let mut a = Scheduler::new();
        let mut b = Scheduler::new();
        a.insert(TaskId(0), production_kind(), 10, 0);
        b.insert(TaskId(0), production_kind(), 10, 0);

        let mut ha = StateHash::new();
        let mut hb = StateHash::new();
        a.hash_into(&mut ha);
        b.hash_into(&mut hb);
        assert_eq!(ha.finish(), hb.finish());

        b.adjust_interval(TaskId(0), 5);
        let mut hb = StateHash::new();
        b.hash_into(&mut hb);
        assert_ne!(ha.finish(), hb.finish());
    }
}
