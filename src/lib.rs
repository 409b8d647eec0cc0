#![doc = r#"
sosim library crate.

An educational operating-system kernel on a simulated word-addressed
machine. The kernel is entered only through the interrupt trampoline: every
hardware event (reset, clock tick, CPU fault, syscall trap) funnels into one
entry point that saves the interrupted process, services the event, advances
pending I/O, schedules and dispatches.

Modules:
- bus: I/O bus façade dispatching device registers (terminals, clock)
- cpu: simulated CPU: registers, instruction set, faults, interrupt entry
- err: machine-wide error enum and guest fault codes
- irq: interrupt kinds and the save-area layout
- kernel: process table, ready queue, schedulers, syscalls, control loop
- loader: program images and the `.maq` text format
- machine: wires CPU/memory/bus/kernel and runs the instruction loop
- mem: word-addressed guest RAM

In tests, a guest-program assembler and canned demo images are available
under `crate::test_utils`.
"#]

// Simulated-machine collaborators
pub mod bus;
pub mod cpu;
pub mod err;
pub mod irq;
pub mod loader;
pub mod mem;

// The operating system and the machine that hosts it
pub mod kernel;
pub mod machine;

// Re-export commonly used types at the crate root for convenience.
pub use bus::IoBus;
pub use cpu::Cpu;
pub use err::MachineError;
pub use irq::Irq;
pub use kernel::sched::SchedPolicy;
pub use kernel::{Kernel, KernelConfig};
pub use loader::{FileLoader, MapLoader, Program, ProgramLoader};
pub use machine::{Machine, RunOutcome};
pub use mem::Mem;

// Shared test utilities (only compiled for tests)
#[cfg(test)]
pub mod test_utils;
