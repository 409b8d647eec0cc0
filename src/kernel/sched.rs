/*!
Scheduler: picks the next current descriptor.

Three selectable policies share the same entry point, dispatched on the
config's tagged variant:

- Base: keep a RUNNING current; otherwise the first READY descriptor in
  table order. Ignores the quantum.
- RoundRobin: keep a RUNNING current while quantum remains; at quantum zero
  preempt to the tail of the FIFO queue and dispatch its head with a fresh
  quantum.
- PriorityAging: RoundRobin, except a preempted descriptor's priority is
  re-aged before requeueing and the queue is stably re-sorted (ascending
  priority, lower value wins) before each dequeue.

Postcondition, all policies: either there is no current descriptor, or the
current descriptor is RUNNING and absent from the ready queue.
*/

use log::warn;

use super::Kernel;
use super::process::{Pid, ProcState};

/// Scheduling policy, selected in `KernelConfig`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SchedPolicy {
    Base,
    RoundRobin,
    PriorityAging,
}

impl SchedPolicy {
    /// Short name used in logs and the metrics report file name.
    pub fn name(self) -> &'static str {
        match self {
            SchedPolicy::Base => "base",
            SchedPolicy::RoundRobin => "round_robin",
            SchedPolicy::PriorityAging => "priority_aging",
        }
    }

    /// Parse a command-line argument.
    pub fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "base" => Some(SchedPolicy::Base),
            "round-robin" | "round_robin" => Some(SchedPolicy::RoundRobin),
            "priority" | "priority_aging" => Some(SchedPolicy::PriorityAging),
            _ => None,
        }
    }
}

/// Priority aging applied when a descriptor leaves the CPU (preemption or
/// blocking): average the old priority with the consumed share of the
/// quantum. Consuming little pulls the value down (stronger priority).
pub(super) fn aged_priority(priority: f64, quantum_total: i32, quantum_remaining: i32) -> f64 {
    let consumed = (quantum_total - quantum_remaining) as f64 / quantum_total as f64;
    (priority + consumed) / 2.0
}

/// Phase 5 of interrupt service: choose the next current descriptor.
pub(super) fn select_next(k: &mut Kernel) {
    match k.config.policy {
        SchedPolicy::Base => select_base(k),
        SchedPolicy::RoundRobin => select_queued(k, false),
        SchedPolicy::PriorityAging => select_queued(k, true),
    }
}

fn current_running(k: &Kernel) -> Option<Pid> {
    let pid = k.current?;
    match k.table.lookup(pid) {
        Some(p) if p.state() == ProcState::Running => Some(pid),
        _ => None,
    }
}

fn select_base(k: &mut Kernel) {
    if current_running(k).is_some() {
        return;
    }
    let pick = k
        .table
        .iter()
        .find(|p| p.state() == ProcState::Ready)
        .map(|p| p.pid());
    match pick {
        Some(pid) => {
            k.ready.remove(pid);
            if let Some(p) = k.table.lookup_mut(pid) {
                p.set_state(ProcState::Running);
            }
            k.current = Some(pid);
        }
        None => k.current = None,
    }
}

fn select_queued(k: &mut Kernel, aging: bool) {
    if let Some(pid) = current_running(k) {
        if k.quantum > 0 {
            return;
        }
        // Quantum exhausted: preempt to the tail.
        if let Some(p) = k.table.lookup_mut(pid) {
            if aging {
                p.priority = aged_priority(p.priority, k.config.quantum, k.quantum);
            }
            p.set_state(ProcState::Ready);
            p.metrics.preemptions += 1;
            k.ready.push(pid);
        }
    }

    if aging {
        let table = &k.table;
        k.ready
            .sort_by_priority(|pid| table.lookup(pid).map(|p| p.priority).unwrap_or(f64::MAX));
    }

    loop {
        match k.ready.pop() {
            Some(pid) => match k.table.lookup_mut(pid) {
                Some(p) if p.state() == ProcState::Ready => {
                    p.set_state(ProcState::Running);
                    k.current = Some(pid);
                    k.quantum = k.config.quantum;
                    return;
                }
                _ => {
                    // A stale entry would break the single-runner invariant;
                    // drop it and keep looking.
                    warn!("scheduler: dropping stale ready-queue entry for pid {pid}");
                }
            },
            None => {
                k.current = None;
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_names_and_parsing() {
        assert_eq!(SchedPolicy::Base.name(), "base");
        assert_eq!(SchedPolicy::from_arg("round-robin"), Some(SchedPolicy::RoundRobin));
        assert_eq!(SchedPolicy::from_arg("priority"), Some(SchedPolicy::PriorityAging));
        assert_eq!(SchedPolicy::from_arg("fifo"), None);
    }

    #[test]
    fn aging_rewards_light_quantum_use() {
        // Preempted immediately: consumed 0 of the quantum.
        assert_eq!(aged_priority(0.5, 10, 10), 0.25);
        // Ran the full quantum.
        assert_eq!(aged_priority(0.5, 10, 0), 0.75);
        // Fixed point at half consumption.
        assert_eq!(aged_priority(0.5, 10, 5), 0.5);
    }
}
