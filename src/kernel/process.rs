/*!
Process descriptor: the kernel's record for one guest process.

A descriptor carries the saved registers, the lifecycle state, the blocking
reason (with the awaited PID when the reason is death-wait), the terminal
group the process does I/O on, the scheduling priority and the per-process
metrics. Descriptors reference each other only by PID; the process table
resolves them.

State transitions go through `set_state` so every entry into READY, RUNNING
or BLOCKED is counted for the metrics report. The blocking invariant is kept
by construction: only `block` sets a reason and only together with the
BLOCKED state; leaving BLOCKED always clears it.
*/

use crate::cpu::Mode;

/// Process identifier. Positive, unique, assigned in creation order.
pub type Pid = i32;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ProcState {
    Ready,
    Running,
    Blocked,
    Dead,
}

/// Why a BLOCKED descriptor is blocked.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BlockReason {
    None,
    /// Waiting for its terminal's keyboard to have input.
    ReadPending,
    /// Waiting for its terminal's screen to accept a word.
    WritePending,
    /// Waiting for another process to die.
    AwaitDeath,
}

/// Per-process metrics, accumulated by the kernel's metric-tick phase and
/// the counted state transitions.
#[derive(Clone, Debug, Default)]
pub struct ProcMetrics {
    /// Ticks from creation until death (stops accumulating once dead).
    pub return_time: i64,
    pub preemptions: i64,
    pub ready_entries: i64,
    pub running_entries: i64,
    pub blocked_entries: i64,
    pub ready_time: i64,
    pub running_time: i64,
    pub blocked_time: i64,
    /// ready_time / ready_entries, kept current at every metric tick.
    pub response_time: i64,
}

#[derive(Clone, Debug)]
pub struct Process {
    pid: Pid,
    pub(crate) pc: i32,
    pub(crate) a: i32,
    pub(crate) x: i32,
    mode: Mode,
    state: ProcState,
    reason: BlockReason,
    wait_target: Option<Pid>,
    terminal: usize,
    pub(crate) priority: f64,
    pub(crate) metrics: ProcMetrics,
}

impl Process {
    /// A new descriptor starts READY in user mode, with zeroed registers,
    /// priority 0.5, its terminal group derived from the PID, and the
    /// creation counted as the first READY entry.
    pub fn new(pid: Pid, pc: i32) -> Self {
        Self {
            pid,
            pc,
            a: 0,
            x: 0,
            mode: Mode::User,
            state: ProcState::Ready,
            reason: BlockReason::None,
            wait_target: None,
            terminal: ((pid - 1) % 4) as usize,
            priority: 0.5,
            metrics: ProcMetrics {
                ready_entries: 1,
                ..ProcMetrics::default()
            },
        }
    }

    #[inline]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    #[inline]
    pub fn state(&self) -> ProcState {
        self.state
    }

    #[inline]
    pub fn reason(&self) -> BlockReason {
        self.reason
    }

    #[inline]
    pub fn wait_target(&self) -> Option<Pid> {
        self.wait_target
    }

    /// Terminal group in 0..4.
    #[inline]
    pub fn terminal(&self) -> usize {
        self.terminal
    }

    #[inline]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        self.state != ProcState::Dead
    }

    /// Transition the lifecycle state, counting the entry. Leaving BLOCKED
    /// (or dying) clears the blocking reason and wait target.
    pub fn set_state(&mut self, state: ProcState) {
        if self.state == state {
            return;
        }
        self.state = state;
        match state {
            ProcState::Ready => self.metrics.ready_entries += 1,
            ProcState::Running => self.metrics.running_entries += 1,
            ProcState::Blocked => self.metrics.blocked_entries += 1,
            ProcState::Dead => {}
        }
        if state != ProcState::Blocked {
            self.reason = BlockReason::None;
            self.wait_target = None;
        }
    }

    /// Block with the given reason; for death-wait, `target` names the PID
    /// whose death is awaited.
    pub fn block(&mut self, reason: BlockReason, target: Option<Pid>) {
        debug_assert!(reason != BlockReason::None);
        self.set_state(ProcState::Blocked);
        self.reason = reason;
        self.wait_target = target;
    }

    /// Back to READY; the blocking reason and target are cleared.
    pub fn unblock(&mut self) {
        self.set_state(ProcState::Ready);
    }

    /// Credit `delta` ticks to this descriptor's current state. Dead
    /// descriptors accumulate nothing.
    pub fn credit_time(&mut self, delta: i64) {
        if self.state == ProcState::Dead {
            return;
        }
        self.metrics.return_time += delta;
        match self.state {
            ProcState::Ready => self.metrics.ready_time += delta,
            ProcState::Running => self.metrics.running_time += delta,
            ProcState::Blocked => self.metrics.blocked_time += delta,
            ProcState::Dead => {}
        }
        // ready_entries starts at 1, so the division is always defined.
        self.metrics.response_time = self.metrics.ready_time / self.metrics.ready_entries;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creation_defaults() {
        let p = Process::new(1, 100);
        assert_eq!(p.pid(), 1);
        assert_eq!(p.state(), ProcState::Ready);
        assert_eq!(p.reason(), BlockReason::None);
        assert_eq!(p.mode(), Mode::User);
        assert_eq!((p.pc, p.a, p.x), (100, 0, 0));
        assert_eq!(p.priority, 0.5);
        assert_eq!(p.metrics.ready_entries, 1);
    }

    #[test]
    fn terminal_group_follows_pid() {
        assert_eq!(Process::new(1, 0).terminal(), 0);
        assert_eq!(Process::new(2, 0).terminal(), 1);
        assert_eq!(Process::new(4, 0).terminal(), 3);
        assert_eq!(Process::new(5, 0).terminal(), 0);
        assert_eq!(Process::new(9, 0).terminal(), 0);
    }

    #[test]
    fn transitions_are_counted_once() {
        let mut p = Process::new(1, 0);
        p.set_state(ProcState::Running);
        p.set_state(ProcState::Running); // no-op
        p.set_state(ProcState::Ready);
        p.set_state(ProcState::Running);
        assert_eq!(p.metrics.running_entries, 2);
        assert_eq!(p.metrics.ready_entries, 2);
    }

    #[test]
    fn reason_is_none_unless_blocked() {
        let mut p = Process::new(3, 0);
        p.set_state(ProcState::Running);
        p.block(BlockReason::AwaitDeath, Some(1));
        assert_eq!(p.state(), ProcState::Blocked);
        assert_eq!(p.reason(), BlockReason::AwaitDeath);
        assert_eq!(p.wait_target(), Some(1));

        p.unblock();
        assert_eq!(p.reason(), BlockReason::None);
        assert_eq!(p.wait_target(), None);
        assert_eq!(p.metrics.blocked_entries, 1);

        p.block(BlockReason::ReadPending, None);
        p.set_state(ProcState::Dead);
        assert_eq!(p.reason(), BlockReason::None);
    }

    #[test]
    fn time_credit_follows_state_and_stops_at_death() {
        let mut p = Process::new(1, 0);
        p.credit_time(5); // ready
        p.set_state(ProcState::Running);
        p.credit_time(10);
        p.block(BlockReason::WritePending, None);
        p.credit_time(3);
        p.set_state(ProcState::Dead);
        p.credit_time(100);

        assert_eq!(p.metrics.ready_time, 5);
        assert_eq!(p.metrics.running_time, 10);
        assert_eq!(p.metrics.blocked_time, 3);
        assert_eq!(p.metrics.return_time, 18);
        assert_eq!(p.metrics.response_time, 5);
    }
}
