/*!
Machine: wires the CPU, guest memory, the I/O bus and the kernel together
and owns the instruction loop.

Per-iteration order, mirroring how the hardware interleaves:
1. step the CPU one instruction (or observe that it is parked)
2. tick the bus — machine time advances even while the CPU is parked, which
   is what lets an idle kernel sleep until the next clock interrupt
3. if the CPU performed a controller call (KCALL), enter the kernel with the
   IRQ identifier and store the returned decision in A
4. if the clock has an unacknowledged interrupt, offer it to the CPU; it is
   taken only in user mode or while parked

The run ends when the CPU is parked and the clock can no longer wake it
(timer disarmed, nothing pending) — the kernel's termination path — when the
kernel latches its fatal flag (the kernel would otherwise park forever while
the timer keeps waking the CPU), when the instruction budget runs out, or on
a fault in kernel mode, which is not recoverable.
*/

use std::cell::RefCell;
use std::rc::Rc;

use log::{debug, error};

use crate::bus::IoBus;
use crate::cpu::{Cpu, StepOutcome};
use crate::err::MachineError;
use crate::irq::Irq;
use crate::kernel::{Kernel, KernelConfig};
use crate::loader::ProgramLoader;
use crate::mem::Mem;

/// How a bounded run ended.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// The machine parked with no way to wake up again.
    Finished,
    /// The kernel latched its fatal flag and will never dispatch again.
    KernelFailed,
    /// The instruction budget ran out first.
    BudgetExhausted,
}

pub struct Machine {
    cpu: Cpu,
    mem: Rc<RefCell<Mem>>,
    io: Rc<RefCell<IoBus>>,
    kernel: Kernel,
}

impl Machine {
    /// Assemble a machine around a program source and kernel tunables. The
    /// kernel installs its handler stub and arms the clock here; the first
    /// RESET is delivered by `run`.
    pub fn new(loader: Box<dyn ProgramLoader>, config: KernelConfig) -> Self {
        let mem = Rc::new(RefCell::new(Mem::new()));
        let io = Rc::new(RefCell::new(IoBus::new()));
        let kernel = Kernel::new(mem.clone(), io.clone(), loader, config);
        let cpu = Cpu::new(mem.clone());
        Self {
            cpu,
            mem,
            io,
            kernel,
        }
    }

    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    pub fn io(&self) -> &Rc<RefCell<IoBus>> {
        &self.io
    }

    pub fn mem(&self) -> &Rc<RefCell<Mem>> {
        &self.mem
    }

    /// Power on and run until the machine finishes or `budget` instructions
    /// have gone by. Call once per machine.
    pub fn run(&mut self, budget: u64) -> Result<RunOutcome, MachineError> {
        self.cpu.accept_irq(Irq::Reset)?;

        for _ in 0..budget {
            let outcome = match self.cpu.step() {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("cpu fault in kernel mode: {e}");
                    return Err(e);
                }
            };
            self.io.borrow_mut().tick();

            match outcome {
                StepOutcome::Ran => {}
                StepOutcome::KernelCall(word) => {
                    let decision = self.kernel.handle_interrupt(Irq::from_word(word));
                    self.cpu.set_a(decision);
                    if self.kernel.fatal() {
                        error!("kernel latched a fatal error; stopping the machine");
                        return Ok(RunOutcome::KernelFailed);
                    }
                }
                StepOutcome::Parked => {
                    if !self.wake_possible() {
                        debug!(
                            "machine finished after {} ticks",
                            self.io.borrow().instructions()
                        );
                        return Ok(RunOutcome::Finished);
                    }
                }
            }

            if self.io.borrow().clock_irq_pending() {
                self.cpu.accept_irq(Irq::Clock)?;
            }
        }
        Ok(RunOutcome::BudgetExhausted)
    }

    /// Whether anything can still wake a parked CPU.
    fn wake_possible(&self) -> bool {
        let io = self.io.borrow();
        io.clock_armed() || io.clock_irq_pending()
    }
}
