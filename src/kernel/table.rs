/*!
Process table and ready queue.

The table owns every descriptor ever created, bounded by the configured
capacity. Descriptors are never removed — a DEAD descriptor stays observable
so death-waiters can find it — so slot order is creation order and PIDs are
`slot + 1`. Lookups are the linear scans the small bound makes acceptable.

The ready queue holds PIDs only. FIFO by default; the priority scheduler
re-sorts it stably (ascending priority, lower value first) before dequeuing.
*/

use std::collections::VecDeque;

use super::process::{Pid, ProcState, Process};

/// Bounded, append-only collection of process descriptors.
pub struct ProcessTable {
    procs: Vec<Process>,
    capacity: usize,
}

impl ProcessTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            procs: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Descriptors created so far (dead ones included).
    #[inline]
    pub fn len(&self) -> usize {
        self.procs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.procs.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Create a descriptor for a program loaded at `pc`. Returns its PID, or
    /// `None` when the table is full.
    pub fn allocate(&mut self, pc: i32) -> Option<Pid> {
        if self.procs.len() >= self.capacity {
            return None;
        }
        let pid = self.procs.len() as Pid + 1;
        self.procs.push(Process::new(pid, pc));
        Some(pid)
    }

    /// Find a descriptor by PID.
    pub fn lookup(&self, pid: Pid) -> Option<&Process> {
        self.procs.iter().find(|p| p.pid() == pid)
    }

    pub fn lookup_mut(&mut self, pid: Pid) -> Option<&mut Process> {
        self.procs.iter_mut().find(|p| p.pid() == pid)
    }

    /// Mark `pid` DEAD. The descriptor stays in the table. Returns whether
    /// the PID named a descriptor.
    pub fn kill(&mut self, pid: Pid) -> bool {
        match self.lookup_mut(pid) {
            Some(p) => {
                p.set_state(ProcState::Dead);
                // The register write the original performed on the victim;
                // observable only through the table, never dispatched again.
                p.a = 0;
                true
            }
            None => false,
        }
    }

    /// Whether any descriptor is not DEAD.
    pub fn any_alive(&self) -> bool {
        self.procs.iter().any(|p| p.is_alive())
    }

    /// Descriptors in table (= PID) order.
    pub fn iter(&self) -> impl Iterator<Item = &Process> {
        self.procs.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Process> {
        self.procs.iter_mut()
    }
}

/// FIFO queue of runnable PIDs, disjoint from the running descriptor.
#[derive(Default)]
pub struct ReadyQueue {
    q: VecDeque<Pid>,
}

impl ReadyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.q.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.q.is_empty()
    }

    /// Enqueue at the tail.
    pub fn push(&mut self, pid: Pid) {
        self.q.push_back(pid);
    }

    /// Dequeue from the head.
    pub fn pop(&mut self) -> Option<Pid> {
        self.q.pop_front()
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.q.contains(&pid)
    }

    /// Drop `pid` from the queue wherever it sits (used when a queued
    /// process is killed).
    pub fn remove(&mut self, pid: Pid) {
        self.q.retain(|&p| p != pid);
    }

    /// Stable ascending sort by the given priority key; ties keep their
    /// current queue order.
    pub fn sort_by_priority<F: Fn(Pid) -> f64>(&mut self, priority_of: F) {
        self.q.make_contiguous().sort_by(|&a, &b| {
            priority_of(a)
                .partial_cmp(&priority_of(b))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pid> {
        self.q.iter()
    }
}
