/*!
Blocked-set poller: phase 4 of every interrupt service.

Sweeps the process table in index order and applies the unblock rule for each
BLOCKED descriptor's reason:

- ReadPending: when the terminal's keyboard turns ready, pop one datum into
  the descriptor's A register and requeue it.
- WritePending: when the screen turns ready, perform the deferred write of
  the X register; on success A becomes 0 and the descriptor is requeued.
- AwaitDeath: when the awaited PID is observed DEAD, A becomes 0 and the
  descriptor is requeued. A target that cannot be found leaves the waiter
  blocked.

A descriptor is unblocked at most once per sweep; the sweep never blocks
anything.
*/

use log::debug;

use crate::bus;

use super::Kernel;
use super::process::{BlockReason, Pid, ProcState};

/// Sweep the table and unblock every descriptor whose condition now holds.
pub(super) fn poll(k: &mut Kernel) {
    // Snapshot the blocked set first; the sweep itself never blocks anyone,
    // so entries only need a state re-check before use.
    let blocked: Vec<Pid> = k
        .table
        .iter()
        .filter(|p| p.state() == ProcState::Blocked)
        .map(|p| p.pid())
        .collect();

    for pid in blocked {
        let Some(p) = k.table.lookup(pid) else {
            continue;
        };
        if p.state() != ProcState::Blocked {
            continue;
        }
        match p.reason() {
            BlockReason::ReadPending => check_read(k, pid),
            BlockReason::WritePending => check_write(k, pid),
            BlockReason::AwaitDeath => check_death(k, pid),
            BlockReason::None => {}
        }
    }
}

fn terminal_of(k: &Kernel, pid: Pid) -> Option<usize> {
    k.table.lookup(pid).map(|p| p.terminal())
}

fn check_read(k: &mut Kernel, pid: Pid) {
    let Some(group) = terminal_of(k, pid) else {
        return;
    };
    let Some(ready) = k.io_read(bus::keyboard_status_reg(group)) else {
        return;
    };
    if ready == 0 {
        return;
    }
    let Some(datum) = k.io_read(bus::keyboard_reg(group)) else {
        return;
    };
    if let Some(p) = k.table.lookup_mut(pid) {
        p.a = datum;
        p.unblock();
        k.ready.push(pid);
    }
}

fn check_write(k: &mut Kernel, pid: Pid) {
    let Some(group) = terminal_of(k, pid) else {
        return;
    };
    let Some(ready) = k.io_read(bus::screen_status_reg(group)) else {
        return;
    };
    if ready == 0 {
        return;
    }
    let Some(word) = k.table.lookup(pid).map(|p| p.x) else {
        return;
    };
    if !k.io_write(bus::screen_reg(group), word) {
        return;
    }
    if let Some(p) = k.table.lookup_mut(pid) {
        p.a = 0;
        p.unblock();
        k.ready.push(pid);
    }
}

fn check_death(k: &mut Kernel, pid: Pid) {
    let Some(target) = k.table.lookup(pid).and_then(|p| p.wait_target()) else {
        return;
    };
    match k.table.lookup(target).map(|t| t.state()) {
        Some(ProcState::Dead) => {
            if let Some(p) = k.table.lookup_mut(pid) {
                p.a = 0;
                p.unblock();
                k.ready.push(pid);
            }
        }
        Some(_) => {}
        None => debug!("pid {pid} awaits death of unknown pid {target}"),
    }
}
