/*!
Machine-wide error type shared by memory, the I/O bus, the loader and the CPU.

Every collaborator surface returns `Result<_, MachineError>`. The kernel never
propagates these out of an interrupt service: per its error policy a failing
collaborator is logged and latches the sticky fatal flag, and the remaining
service phases still run.

Faults that the CPU raises in user mode are reported to the kernel through the
interrupt save area as small integer codes; `fault_code`/`fault_name` define
that encoding.
*/

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MachineError {
    #[error("invalid memory address {0}")]
    InvalidAddress(i32),

    #[error("invalid device register {0}")]
    InvalidRegister(i32),

    #[error("unsupported operation on device register {0}")]
    InvalidRegisterOp(i32),

    #[error("keyboard {0} has no pending input")]
    KeyboardEmpty(usize),

    #[error("screen {0} is busy")]
    ScreenBusy(usize),

    #[error("invalid opcode {0}")]
    InvalidOpcode(i32),

    #[error("privileged opcode {0} executed in user mode")]
    PrivilegedOpcode(i32),

    #[error("division by zero")]
    DivideByZero,

    #[error("program '{name}': {reason}")]
    BadProgram { name: String, reason: String },

    #[error("program '{name}': {source}")]
    ProgramIo {
        name: String,
        source: std::io::Error,
    },
}

impl MachineError {
    /// Encode this error as a guest-visible CPU fault code for the interrupt
    /// save area. Code 0 is reserved for "no fault".
    pub fn fault_code(&self) -> i32 {
        match self {
            MachineError::InvalidAddress(_) => 1,
            MachineError::InvalidOpcode(_) => 2,
            MachineError::PrivilegedOpcode(_) => 3,
            MachineError::DivideByZero => 4,
            _ => 5,
        }
    }
}

/// Human-readable name for a guest fault code found in the save area.
pub fn fault_name(code: i32) -> &'static str {
    match code {
        0 => "none",
        1 => "invalid address",
        2 => "invalid opcode",
        3 => "privileged opcode",
        4 => "division by zero",
        5 => "device error",
        _ => "unknown fault",
    }
}
