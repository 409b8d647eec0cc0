/*!
Simulated CPU: registers, instruction set, faults and interrupt entry.

Architectural state is three guest-word registers (PC, A, X), an execution
mode (kernel/user) and a halted flag. Instructions are one word of opcode,
with an immediate argument in the following word where the table in the
module docs of `lib.rs` calls for one.

Interrupts
- Accepting an interrupt copies PC/A/X, the fault code and the mode into the
  save area at fixed low addresses (`irq::SAVE_*`), loads the IRQ identifier
  into A, clears the halted flag and jumps to the handler stub in kernel
  mode. Interrupts are accepted only in user mode or while parked; kernel
  code is never preempted, which is what makes the kernel non-reentrant.
- RETI restores PC/A/X from the save area and drops back to user mode.
- A fault in user mode is delivered as the CPU_ERROR interrupt with its code
  in the save area. A fault in kernel mode is unrecoverable and surfaces as
  an error from `step`, stopping the machine.

Controller calls
- KCALL does not call into the kernel from here. `step` returns
  `StepOutcome::KernelCall(arg)` and the machine makes the call, writing the
  kernel's decision back into A. This keeps the CPU free of any kernel
  reference while preserving the arg-in-A, result-in-A contract of the
  handler stub.
*/

use std::cell::RefCell;
use std::rc::Rc;

use crate::err::MachineError;
use crate::irq::{self, Irq};
use crate::mem::Mem;

/// Opcode numbers. The immediate argument, for opcodes that take one, is the
/// word following the opcode.
pub mod opcode {
    pub const NOP: i32 = 0;
    pub const HALT: i32 = 1; // privileged: park the CPU
    pub const LDI: i32 = 2; // A = n
    pub const LDM: i32 = 3; // A = mem[e]
    pub const LDX: i32 = 4; // A = mem[e+X]
    pub const STM: i32 = 5; // mem[e] = A
    pub const STX: i32 = 6; // mem[e+X] = A
    pub const TAX: i32 = 7; // X = A
    pub const TXA: i32 = 8; // A = X
    pub const ADD: i32 = 9; // A += mem[e]
    pub const SUB: i32 = 10; // A -= mem[e]
    pub const MUL: i32 = 11; // A *= mem[e]
    pub const DIV: i32 = 12; // A /= mem[e]
    pub const MOD: i32 = 13; // A %= mem[e]
    pub const NEG: i32 = 14; // A = -A
    pub const JMP: i32 = 15; // PC = e
    pub const JZ: i32 = 16; // PC = e if A == 0
    pub const JNZ: i32 = 17; // PC = e if A != 0
    pub const TRAP: i32 = 18; // raise the syscall interrupt
    pub const KCALL: i32 = 19; // privileged: controller call
    pub const RETI: i32 = 20; // privileged: return from interrupt
}

/// Execution mode. The guest encoding matches the save-area MODE word.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    Kernel = 0,
    User = 1,
}

/// What a single `step` did.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// Executed one instruction.
    Ran,
    /// The CPU is parked (HALT executed, or it was already parked).
    Parked,
    /// KCALL executed: the machine must call the kernel with the argument
    /// and store the returned decision in A.
    KernelCall(i32),
}

pub struct Cpu {
    pc: i32,
    a: i32,
    x: i32,
    mode: Mode,
    halted: bool,
    mem: Rc<RefCell<Mem>>,
}

impl Cpu {
    /// A fresh CPU is parked in kernel mode, waiting for the RESET delivery.
    pub fn new(mem: Rc<RefCell<Mem>>) -> Self {
        Self {
            pc: 0,
            a: 0,
            x: 0,
            mode: Mode::Kernel,
            halted: true,
            mem,
        }
    }

    #[inline]
    pub fn pc(&self) -> i32 {
        self.pc
    }

    #[inline]
    pub fn a(&self) -> i32 {
        self.a
    }

    #[inline]
    pub fn x(&self) -> i32 {
        self.x
    }

    #[inline]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    #[inline]
    pub fn halted(&self) -> bool {
        self.halted
    }

    /// Store the kernel's decision after a `KernelCall` outcome.
    pub fn set_a(&mut self, value: i32) {
        self.a = value;
    }

    /// Deliver an external interrupt. Accepted only in user mode or while
    /// parked; returns whether it was taken.
    pub fn accept_irq(&mut self, irq: Irq) -> Result<bool, MachineError> {
        if self.mode == Mode::User || self.halted {
            self.enter_irq(irq, 0)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Execute one instruction (or report that the CPU is parked).
    ///
    /// A user-mode fault is converted into CPU_ERROR interrupt entry and the
    /// step still returns `Ok(Ran)`. A kernel-mode fault is returned as an
    /// error: the machine has no way to recover from a broken handler.
    pub fn step(&mut self) -> Result<StepOutcome, MachineError> {
        if self.halted {
            return Ok(StepOutcome::Parked);
        }
        let at = self.pc;
        match self.exec_one() {
            Ok(outcome) => Ok(outcome),
            Err(e) if self.mode == Mode::User => {
                self.pc = at;
                self.enter_irq(Irq::CpuError, e.fault_code())?;
                Ok(StepOutcome::Ran)
            }
            Err(e) => Err(e),
        }
    }

    fn exec_one(&mut self) -> Result<StepOutcome, MachineError> {
        use opcode::*;

        let op = self.load(self.pc)?;
        match op {
            NOP => self.pc += 1,
            HALT => {
                self.privileged(op)?;
                self.pc += 1;
                self.halted = true;
                return Ok(StepOutcome::Parked);
            }
            LDI => {
                self.a = self.arg()?;
                self.pc += 2;
            }
            LDM => {
                let e = self.arg()?;
                self.a = self.load(e)?;
                self.pc += 2;
            }
            LDX => {
                let e = self.arg()?;
                self.a = self.load(e.wrapping_add(self.x))?;
                self.pc += 2;
            }
            STM => {
                let e = self.arg()?;
                self.store(e, self.a)?;
                self.pc += 2;
            }
            STX => {
                let e = self.arg()?;
                self.store(e.wrapping_add(self.x), self.a)?;
                self.pc += 2;
            }
            TAX => {
                self.x = self.a;
                self.pc += 1;
            }
            TXA => {
                self.a = self.x;
                self.pc += 1;
            }
            ADD => {
                let e = self.arg()?;
                self.a = self.a.wrapping_add(self.load(e)?);
                self.pc += 2;
            }
            SUB => {
                let e = self.arg()?;
                self.a = self.a.wrapping_sub(self.load(e)?);
                self.pc += 2;
            }
            MUL => {
                let e = self.arg()?;
                self.a = self.a.wrapping_mul(self.load(e)?);
                self.pc += 2;
            }
            DIV => {
                let d = self.load_arg_operand()?;
                if d == 0 {
                    return Err(MachineError::DivideByZero);
                }
                self.a = self.a.wrapping_div(d);
                self.pc += 2;
            }
            MOD => {
                let d = self.load_arg_operand()?;
                if d == 0 {
                    return Err(MachineError::DivideByZero);
                }
                self.a = self.a.wrapping_rem(d);
                self.pc += 2;
            }
            NEG => {
                self.a = self.a.wrapping_neg();
                self.pc += 1;
            }
            JMP => self.pc = self.arg()?,
            JZ => {
                let e = self.arg()?;
                self.pc = if self.a == 0 { e } else { self.pc + 2 };
            }
            JNZ => {
                let e = self.arg()?;
                self.pc = if self.a != 0 { e } else { self.pc + 2 };
            }
            TRAP => {
                // The syscall instruction belongs to user code; the handler
                // stub has no business re-trapping.
                if self.mode == Mode::Kernel {
                    return Err(MachineError::InvalidOpcode(op));
                }
                self.pc += 1;
                self.enter_irq(Irq::Syscall, 0)?;
            }
            KCALL => {
                self.privileged(op)?;
                self.pc += 1;
                return Ok(StepOutcome::KernelCall(self.a));
            }
            RETI => {
                self.privileged(op)?;
                let mem = self.mem.borrow();
                self.pc = mem.read(irq::SAVE_PC)?;
                self.a = mem.read(irq::SAVE_A)?;
                self.x = mem.read(irq::SAVE_X)?;
                drop(mem);
                self.mode = Mode::User;
            }
            other => return Err(MachineError::InvalidOpcode(other)),
        }
        Ok(StepOutcome::Ran)
    }

    /// Save the interrupted context and jump to the handler stub.
    fn enter_irq(&mut self, irq: Irq, fault_code: i32) -> Result<(), MachineError> {
        {
            let mut mem = self.mem.borrow_mut();
            mem.write(irq::SAVE_PC, self.pc)?;
            mem.write(irq::SAVE_A, self.a)?;
            mem.write(irq::SAVE_X, self.x)?;
            mem.write(irq::SAVE_ERR, fault_code)?;
            mem.write(irq::SAVE_MODE, self.mode as i32)?;
        }
        self.a = irq.to_word();
        self.pc = irq::HANDLER_ADDR;
        self.mode = Mode::Kernel;
        self.halted = false;
        Ok(())
    }

    #[inline]
    fn privileged(&self, op: i32) -> Result<(), MachineError> {
        if self.mode == Mode::User {
            return Err(MachineError::PrivilegedOpcode(op));
        }
        Ok(())
    }

    #[inline]
    fn arg(&self) -> Result<i32, MachineError> {
        self.load(self.pc + 1)
    }

    /// Fetch the immediate argument and load the word it addresses.
    #[inline]
    fn load_arg_operand(&self) -> Result<i32, MachineError> {
        let e = self.arg()?;
        self.load(e)
    }

    #[inline]
    fn load(&self, addr: i32) -> Result<i32, MachineError> {
        self.mem.borrow().read(addr)
    }

    #[inline]
    fn store(&mut self, addr: i32, word: i32) -> Result<(), MachineError> {
        self.mem.borrow_mut().write(addr, word)
    }

    /// Force architectural state; test scaffolding only.
    #[cfg(test)]
    pub(crate) fn force(&mut self, pc: i32, a: i32, x: i32, mode: Mode, halted: bool) {
        self.pc = pc;
        self.a = a;
        self.x = x;
        self.mode = mode;
        self.halted = halted;
    }
}
