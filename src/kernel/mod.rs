/*!
Kernel: interrupt-driven control loop and its submodules.

Overview
- The kernel is entered exactly once per hardware event, through
  `Kernel::handle_interrupt`, with the IRQ identifier the trampoline passes
  along. Each entry runs a fixed sequence of phases; that ordering is the
  kernel's central contract:

  1. metric tick — credit elapsed ticks to global and per-process counters
  2. save — copy the interrupted PC/A/X from the save area into the
     current descriptor
  3. service — count the IRQ kind and run its handler (syscalls included)
  4. poll pending — sweep BLOCKED descriptors and unblock completions
  5. schedule — let the active policy pick the next current descriptor
  6. termination — when nothing is alive: disarm the timer, write the
     metrics report, tell the trampoline to park
  7. dispatch — place the chosen descriptor's registers in the save area

  Saving before servicing lets a syscall handler see trap-time registers;
  polling after servicing lets I/O finished by this very interrupt unblock a
  descriptor before this tick's scheduling decision.

Modules and responsibilities
- process: the per-process descriptor and its counted state transitions.
- table: bounded descriptor table and the FIFO ready queue.
- sched: the Base / RoundRobin / PriorityAging policies.
- pending: the blocked-set poller (phase 4).
- syscall: the system-call handlers (phase 3, SYSCALL kind).
- metrics: machine-wide counters and the end-of-run report.

Failure policy: a failing collaborator (memory, bus, loader) is logged and
latches the sticky `fatal` flag; the remaining phases still run, and the
dispatch phase then parks the CPU for good.
*/

pub mod metrics;
mod pending;
pub mod process;
pub mod sched;
pub mod syscall;
pub mod table;

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use log::{error, info, warn};

use crate::bus::{self, IoBus};
use crate::err::{self, MachineError};
use crate::irq::{self, Irq};
use crate::loader::ProgramLoader;
use crate::mem::Mem;

use metrics::KernelMetrics;
use process::{Pid, ProcState};
use sched::SchedPolicy;
use table::{ProcessTable, ReadyQueue};

/// Kernel tunables. The defaults mirror the course machine's constants.
#[derive(Clone, Debug)]
pub struct KernelConfig {
    /// Ticks between clock interrupts.
    pub interrupt_interval: i32,
    /// Process-table capacity.
    pub max_processes: usize,
    /// Clock interrupts a process may consume before preemption.
    pub quantum: i32,
    pub policy: SchedPolicy,
    /// Directory the metrics report is written into at termination.
    pub metrics_dir: PathBuf,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            interrupt_interval: 50,
            max_processes: 10,
            quantum: 10,
            policy: SchedPolicy::PriorityAging,
            metrics_dir: PathBuf::from("."),
        }
    }
}

/// The operating system proper. Owns the process table, ready queue and
/// metrics; shares memory and the I/O bus with the machine.
pub struct Kernel {
    mem: Rc<RefCell<Mem>>,
    io: Rc<RefCell<IoBus>>,
    loader: Box<dyn ProgramLoader>,
    config: KernelConfig,

    table: ProcessTable,
    ready: ReadyQueue,
    current: Option<Pid>,

    /// Remaining quantum of the current descriptor, in clock interrupts.
    quantum: i32,
    /// Previous instruction-clock reading; `None` until first observed.
    last_clock: Option<i64>,

    metrics: KernelMetrics,
    fatal: bool,
}

impl Kernel {
    /// Build the kernel: installs the interrupt-handler stub at its required
    /// address and arms the clock. Setup failures are latched in the fatal
    /// flag rather than returned, so the machine still constructs and parks
    /// on first dispatch.
    pub fn new(
        mem: Rc<RefCell<Mem>>,
        io: Rc<RefCell<IoBus>>,
        loader: Box<dyn ProgramLoader>,
        config: KernelConfig,
    ) -> Self {
        let mut k = Self {
            mem,
            io,
            loader,
            table: ProcessTable::new(config.max_processes),
            ready: ReadyQueue::new(),
            current: None,
            quantum: config.quantum,
            last_clock: None,
            metrics: KernelMetrics::new(),
            fatal: false,
            config,
        };

        match k.load_program("trata_int.maq") {
            Some(origin) if origin == irq::HANDLER_ADDR => {}
            Some(origin) => {
                error!(
                    "interrupt handler stub loaded at {origin}, expected {}",
                    irq::HANDLER_ADDR
                );
                k.fatal = true;
            }
            None => k.fatal = true,
        }

        k.io_write(bus::CLOCK_TIMER, k.config.interrupt_interval);
        k
    }

    /// The single kernel entry point: service one interrupt and decide
    /// whether the trampoline resumes a process (0) or parks the CPU (1).
    pub fn handle_interrupt(&mut self, irq: Irq) -> i32 {
        self.metric_tick();
        self.save_current();
        self.service(irq);
        pending::poll(self);
        sched::select_next(self);
        if !self.table.any_alive() {
            return self.shutdown();
        }
        self.dispatch()
    }

    // -------------- Phases --------------

    /// Phase 1: credit elapsed ticks to the global and per-process counters.
    fn metric_tick(&mut self) {
        let now = self.io.borrow().instructions();
        if let Some(prev) = self.last_clock {
            let delta = now - prev;
            self.metrics.total_time += delta;
            if self.current.is_none() {
                self.metrics.idle_time += delta;
            }
            for p in self.table.iter_mut() {
                p.credit_time(delta);
            }
        }
        self.last_clock = Some(now);
    }

    /// Phase 2: copy the trap-time registers into the current descriptor.
    fn save_current(&mut self) {
        let Some(pid) = self.current else {
            return;
        };
        let regs = (|| -> Result<(i32, i32, i32), MachineError> {
            let mem = self.mem.borrow();
            Ok((
                mem.read(irq::SAVE_PC)?,
                mem.read(irq::SAVE_A)?,
                mem.read(irq::SAVE_X)?,
            ))
        })();
        match regs {
            Ok((pc, a, x)) => {
                if let Some(p) = self.table.lookup_mut(pid) {
                    p.pc = pc;
                    p.a = a;
                    p.x = x;
                }
            }
            Err(e) => {
                error!("saving cpu state: {e}");
                self.fatal = true;
            }
        }
    }

    /// Phase 3: count and dispatch the IRQ kind.
    fn service(&mut self, irq: Irq) {
        self.metrics.irq_counts[irq.index()] += 1;
        match irq {
            Irq::Reset => self.on_reset(),
            Irq::CpuError => self.on_cpu_error(),
            Irq::Syscall => syscall::handle(self),
            Irq::Clock => self.on_clock(),
            Irq::Unknown(word) => {
                error!("cannot service unknown irq {word}");
                self.fatal = true;
            }
        }
    }

    /// Phase 7: hand the chosen descriptor's registers to the trampoline.
    fn dispatch(&mut self) -> i32 {
        let Some(pid) = self.current else {
            return 1;
        };
        if self.fatal {
            return 1;
        }
        let Some((pc, a, x)) = self.table.lookup(pid).map(|p| (p.pc, p.a, p.x)) else {
            error!("dispatch: current pid {pid} not in table");
            self.fatal = true;
            return 1;
        };
        let placed = (|| -> Result<(), MachineError> {
            let mut mem = self.mem.borrow_mut();
            mem.write(irq::SAVE_PC, pc)?;
            mem.write(irq::SAVE_A, a)?;
            mem.write(irq::SAVE_X, x)?;
            Ok(())
        })();
        match placed {
            Ok(()) => 0,
            Err(e) => {
                error!("restoring cpu state: {e}");
                self.fatal = true;
                1
            }
        }
    }

    /// Phase 6 tail: nothing is alive. Quiesce the clock, write the report,
    /// park for good.
    fn shutdown(&mut self) -> i32 {
        self.io_write(bus::CLOCK_TIMER, 0);
        self.io_write(bus::CLOCK_INTERRUPT, 0);
        match metrics::write_report_file(
            &self.config.metrics_dir,
            self.config.policy.name(),
            &self.metrics,
            &self.table,
        ) {
            Ok(()) => info!(
                "metrics report written to {}",
                self.config.metrics_dir.display()
            ),
            Err(e) => error!("could not write metrics report: {e}"),
        }
        info!("all processes are dead; parking the machine");
        1
    }

    // -------------- IRQ handlers --------------

    /// One-shot power-on: place init and make it the running process.
    fn on_reset(&mut self) {
        let Some(origin) = self.load_program("init.maq") else {
            self.fatal = true;
            return;
        };
        if origin != irq::INIT_ADDR {
            error!("init loaded at {origin}, expected {}", irq::INIT_ADDR);
            self.fatal = true;
            return;
        }
        match self.table.allocate(origin) {
            Some(pid) => {
                if let Some(p) = self.table.lookup_mut(pid) {
                    p.set_state(ProcState::Running);
                }
                self.current = Some(pid);
                info!("init process created as pid {pid}");
            }
            None => {
                error!("process table full at reset");
                self.fatal = true;
            }
        }
    }

    /// Acknowledge the clock, rearm the timer, burn one quantum tick.
    fn on_clock(&mut self) {
        self.io_write(bus::CLOCK_INTERRUPT, 0);
        self.io_write(bus::CLOCK_TIMER, self.config.interrupt_interval);
        if self.quantum > 0 {
            self.quantum -= 1;
        }
    }

    /// A guest instruction faulted; the code sits in the save area.
    fn on_cpu_error(&mut self) {
        let code = self.mem.borrow().read(irq::SAVE_ERR).unwrap_or(-1);
        error!("cpu fault: {} (code {code})", err::fault_name(code));
        self.fatal = true;
    }

    // -------------- Collaborator helpers --------------

    /// Read a device register, absorbing failure into the fatal flag.
    fn io_read(&mut self, reg: i32) -> Option<i32> {
        match self.io.borrow_mut().read(reg) {
            Ok(word) => Some(word),
            Err(e) => {
                error!("i/o bus read of register {reg} failed: {e}");
                self.fatal = true;
                None
            }
        }
    }

    /// Write a device register, absorbing failure into the fatal flag.
    fn io_write(&mut self, reg: i32, word: i32) -> bool {
        match self.io.borrow_mut().write(reg, word) {
            Ok(()) => true,
            Err(e) => {
                error!("i/o bus write of register {reg} failed: {e}");
                self.fatal = true;
                false
            }
        }
    }

    /// Fetch a program image and place it in guest memory. Returns the load
    /// origin; a missing or unplaceable image is a per-call failure, not a
    /// machine failure (spawn just reports it to the caller).
    fn load_program(&mut self, name: &str) -> Option<i32> {
        let program = match self.loader.load(name) {
            Ok(p) => p,
            Err(e) => {
                warn!("cannot load '{name}': {e}");
                return None;
            }
        };
        match self
            .mem
            .borrow_mut()
            .load_slice(program.origin(), program.words())
        {
            Ok(()) => {
                info!(
                    "loaded '{name}' at {}..{}",
                    program.origin(),
                    program.end()
                );
                Some(program.origin())
            }
            Err(e) => {
                warn!("cannot place '{name}': {e}");
                None
            }
        }
    }

    /// Spawn path behind the spawn syscall: load, allocate, enqueue.
    fn create_process(&mut self, name: &str) -> Option<Pid> {
        let origin = self.load_program(name)?;
        match self.table.allocate(origin) {
            Some(pid) => {
                self.ready.push(pid);
                Some(pid)
            }
            None => {
                warn!("process table full, cannot spawn '{name}'");
                None
            }
        }
    }

    // -------------- Observers --------------

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn fatal(&self) -> bool {
        self.fatal
    }

    pub fn current(&self) -> Option<Pid> {
        self.current
    }

    pub fn table(&self) -> &ProcessTable {
        &self.table
    }

    pub fn ready_queue(&self) -> &ReadyQueue {
        &self.ready
    }

    pub fn metrics(&self) -> &KernelMetrics {
        &self.metrics
    }

    /// Remaining quantum, in clock interrupts.
    pub fn quantum_remaining(&self) -> i32 {
        self.quantum
    }
}
