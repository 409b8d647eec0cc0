/*!
System-call handlers.

A guest process traps with the call identifier in A and the argument in X;
the save phase has already copied both into the current descriptor, and the
dispatch phase will copy the result (written into the descriptor's A) back
out. The kernel never advances the guest PC; the CPU saved the post-TRAP
address.

Blocking calls do not suspend anything here: they flip the caller's state to
BLOCKED and return, and the scheduler phase running right after evicts the
caller from the CPU. The blocked-set poller finishes the interrupted
operation later.
*/

use log::{debug, error, info, warn};

use crate::bus;

use super::Kernel;
use super::process::{BlockReason, Pid};
use super::sched::aged_priority;

/// Guest-visible system-call identifiers.
pub mod sys {
    /// Read one datum from the caller's terminal keyboard into A.
    pub const READ: i32 = 1;
    /// Write X to the caller's terminal screen; A = 0 on completion.
    pub const WRITE: i32 = 2;
    /// Spawn the program named by the NUL-terminated string at guest
    /// address X; A = new PID on success.
    pub const SPAWN: i32 = 7;
    /// Kill PID X, or the caller itself when X = 0.
    pub const KILL: i32 = 8;
    /// Block until PID X dies; A = 0 when it has.
    pub const WAIT: i32 = 9;
}

/// Longest accepted spawn filename, terminator included.
const NAME_MAX: usize = 100;

/// Phase-3 handler for the SYSCALL interrupt.
pub(super) fn handle(k: &mut Kernel) {
    let Some(pid) = k.current else {
        error!("syscall interrupt with no current process");
        k.fatal = true;
        return;
    };
    let Some(id) = k.table.lookup(pid).map(|p| p.a) else {
        error!("syscall: current pid {pid} not in table");
        k.fatal = true;
        return;
    };
    match id {
        sys::READ => sys_read(k, pid),
        sys::WRITE => sys_write(k, pid),
        sys::SPAWN => sys_spawn(k, pid),
        sys::KILL => sys_kill(k, pid),
        sys::WAIT => sys_wait(k, pid),
        other => {
            error!("unknown syscall id {other} from pid {pid}");
            k.fatal = true;
        }
    }
}

/// Move the caller to BLOCKED, re-aging its priority with the share of the
/// quantum it consumed.
fn block_caller(k: &mut Kernel, pid: Pid, reason: BlockReason, target: Option<Pid>) {
    let (total, remaining) = (k.config.quantum, k.quantum);
    if let Some(p) = k.table.lookup_mut(pid) {
        p.priority = aged_priority(p.priority, total, remaining);
        p.block(reason, target);
    }
}

fn sys_read(k: &mut Kernel, pid: Pid) {
    let Some(group) = k.table.lookup(pid).map(|p| p.terminal()) else {
        return;
    };
    let Some(ready) = k.io_read(bus::keyboard_status_reg(group)) else {
        return;
    };
    if ready == 0 {
        block_caller(k, pid, BlockReason::ReadPending, None);
        return;
    }
    let Some(datum) = k.io_read(bus::keyboard_reg(group)) else {
        return;
    };
    if let Some(p) = k.table.lookup_mut(pid) {
        p.a = datum;
    }
}

fn sys_write(k: &mut Kernel, pid: Pid) {
    let Some((group, word)) = k.table.lookup(pid).map(|p| (p.terminal(), p.x)) else {
        return;
    };
    let Some(ready) = k.io_read(bus::screen_status_reg(group)) else {
        return;
    };
    if ready == 0 {
        block_caller(k, pid, BlockReason::WritePending, None);
        return;
    }
    if !k.io_write(bus::screen_reg(group), word) {
        return;
    }
    if let Some(p) = k.table.lookup_mut(pid) {
        p.a = 0;
    }
}

fn sys_spawn(k: &mut Kernel, pid: Pid) {
    let Some(addr) = k.table.lookup(pid).map(|p| p.x) else {
        return;
    };
    let Some(name) = copy_guest_string(k, addr) else {
        // Spawn failure leaves the caller's A untouched.
        debug!("spawn by pid {pid}: bad filename string at {addr}");
        return;
    };
    match k.create_process(&name) {
        Some(new_pid) => {
            info!("pid {pid} spawned '{name}' as pid {new_pid}");
            if let Some(p) = k.table.lookup_mut(pid) {
                p.a = new_pid;
            }
        }
        None => debug!("spawn of '{name}' by pid {pid} failed"),
    }
}

fn sys_kill(k: &mut Kernel, pid: Pid) {
    let Some(x) = k.table.lookup(pid).map(|p| p.x) else {
        return;
    };
    let target = if x == 0 { pid } else { x };
    if x < 0 || x > k.table.capacity() as i32 {
        if let Some(p) = k.table.lookup_mut(pid) {
            p.a = -1;
        }
        return;
    }
    kill_process(k, target);
}

/// Kill `target`: DEAD in the table, out of the ready queue. Missing PIDs
/// are logged and ignored.
pub(super) fn kill_process(k: &mut Kernel, target: Pid) {
    if k.table.kill(target) {
        info!("killed pid {target}");
        k.ready.remove(target);
    } else {
        warn!("kill: no such pid {target}");
    }
}

fn sys_wait(k: &mut Kernel, pid: Pid) {
    let Some(target) = k.table.lookup(pid).map(|p| p.x) else {
        return;
    };
    if target == pid || k.table.lookup(target).is_none() {
        if let Some(p) = k.table.lookup_mut(pid) {
            p.a = -1;
        }
        return;
    }
    block_caller(k, pid, BlockReason::AwaitDeath, Some(target));
}

/// Copy a NUL-terminated guest string of at most `NAME_MAX` bytes, rejecting
/// words outside byte range and missing terminators.
fn copy_guest_string(k: &Kernel, addr: i32) -> Option<String> {
    let mem = k.mem.borrow();
    let mut bytes = Vec::new();
    for offset in 0..NAME_MAX as i32 {
        let word = mem.read(addr + offset).ok()?;
        if !(0..=255).contains(&word) {
            return None;
        }
        if word == 0 {
            return String::from_utf8(bytes).ok();
        }
        bytes.push(word as u8);
    }
    // No terminator within the limit.
    None
}
