//! Shared test utilities: a tiny guest-program assembler and canned images.
//!
//! These helpers de-duplicate guest-program construction across the CPU,
//! kernel and machine tests. `Asm` is a chaining builder that emits opcode
//! words; `demo_loader` packages the same spawn/wait/kill demo that ships as
//! `.maq` files under `demos/`, so machine tests run it without touching the
//! file system.

#![allow(dead_code)]

use std::path::PathBuf;

use crate::cpu::opcode;
use crate::irq;
use crate::kernel::KernelConfig;
use crate::kernel::sched::SchedPolicy;
use crate::kernel::syscall::sys;
use crate::loader::{MapLoader, Program};

/// Chaining builder for guest program images.
pub struct Asm {
    origin: i32,
    words: Vec<i32>,
}

impl Asm {
    pub fn at(origin: i32) -> Self {
        Self {
            origin,
            words: Vec::new(),
        }
    }

    /// Address the next emitted word will occupy.
    pub fn here(&self) -> i32 {
        self.origin + self.words.len() as i32
    }

    fn push(mut self, word: i32) -> Self {
        self.words.push(word);
        self
    }

    pub fn nop(self) -> Self {
        self.push(opcode::NOP)
    }

    pub fn halt(self) -> Self {
        self.push(opcode::HALT)
    }

    pub fn ldi(self, n: i32) -> Self {
        self.push(opcode::LDI).push(n)
    }

    pub fn ldm(self, e: i32) -> Self {
        self.push(opcode::LDM).push(e)
    }

    pub fn stm(self, e: i32) -> Self {
        self.push(opcode::STM).push(e)
    }

    pub fn tax(self) -> Self {
        self.push(opcode::TAX)
    }

    pub fn txa(self) -> Self {
        self.push(opcode::TXA)
    }

    pub fn add(self, e: i32) -> Self {
        self.push(opcode::ADD).push(e)
    }

    pub fn sub(self, e: i32) -> Self {
        self.push(opcode::SUB).push(e)
    }

    pub fn div(self, e: i32) -> Self {
        self.push(opcode::DIV).push(e)
    }

    pub fn jmp(self, e: i32) -> Self {
        self.push(opcode::JMP).push(e)
    }

    pub fn jz(self, e: i32) -> Self {
        self.push(opcode::JZ).push(e)
    }

    pub fn jnz(self, e: i32) -> Self {
        self.push(opcode::JNZ).push(e)
    }

    pub fn trap(self) -> Self {
        self.push(opcode::TRAP)
    }

    /// Emit a full syscall: argument into X, identifier into A, TRAP.
    pub fn sys(self, id: i32, x: i32) -> Self {
        self.ldi(x).tax().ldi(id).trap()
    }

    /// Tight self-loop; keeps a dead process's PC somewhere harmless.
    pub fn spin(self) -> Self {
        let here = self.here();
        self.jmp(here)
    }

    /// Zero-fill up to `addr` (for placing data at a fixed address).
    pub fn pad_to(mut self, addr: i32) -> Self {
        assert!(addr >= self.here(), "pad_to target already passed");
        while self.here() < addr {
            self.words.push(0);
        }
        self
    }

    /// Emit a NUL-terminated byte string (one byte per word).
    pub fn str_data(mut self, s: &str) -> Self {
        for b in s.bytes() {
            self.words.push(b as i32);
        }
        self.words.push(0);
        self
    }

    pub fn build(self) -> Program {
        Program::new(self.origin, self.words)
    }
}

/// The interrupt-handler stub every kernel needs as `trata_int.maq`:
/// KCALL, park on a nonzero decision, otherwise return from interrupt.
pub fn handler_stub() -> Program {
    Asm::at(irq::HANDLER_ADDR)
        .push(opcode::KCALL)
        .jnz(irq::HANDLER_ADDR + 4)
        .push(opcode::RETI)
        .halt()
        .build()
}

/// init: spawn the child, wait for it, write "ok", die.
pub fn demo_init() -> Program {
    let name_addr = 140;
    Asm::at(irq::INIT_ADDR)
        .sys(sys::SPAWN, name_addr) // A becomes the child's pid
        .tax() // X = child pid
        .ldi(sys::WAIT)
        .trap()
        .sys(sys::WRITE, 111) // 'o'
        .sys(sys::WRITE, 107) // 'k'
        .sys(sys::KILL, 0)
        .spin()
        .pad_to(name_addr)
        .str_data("child.maq")
        .build()
}

/// child: write "hi", die.
pub fn demo_child() -> Program {
    Asm::at(300)
        .sys(sys::WRITE, 104) // 'h'
        .sys(sys::WRITE, 105) // 'i'
        .sys(sys::KILL, 0)
        .spin()
        .build()
}

/// Loader with the full demo program set.
pub fn demo_loader() -> MapLoader {
    let mut loader = MapLoader::new();
    loader.insert("trata_int.maq", handler_stub());
    loader.insert("init.maq", demo_init());
    loader.insert("child.maq", demo_child());
    loader
}

/// Kernel config pointing the metrics report at a per-test temp directory.
pub fn test_config(tag: &str, policy: SchedPolicy) -> KernelConfig {
    KernelConfig {
        policy,
        metrics_dir: metrics_dir(tag),
        ..KernelConfig::default()
    }
}

fn metrics_dir(tag: &str) -> PathBuf {
    std::env::temp_dir().join("sosim-tests").join(tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asm_emits_expected_words() {
        let p = Asm::at(100).ldi(7).tax().trap().build();
        assert_eq!(p.origin(), 100);
        assert_eq!(p.words(), &[opcode::LDI, 7, opcode::TAX, opcode::TRAP]);
    }

    #[test]
    fn pad_and_string_place_data() {
        let p = Asm::at(100).nop().pad_to(104).str_data("hi").build();
        assert_eq!(p.words(), &[opcode::NOP, 0, 0, 0, 104, 105, 0]);
        assert_eq!(p.end(), 107);
    }

    #[test]
    fn demo_init_keeps_its_name_table_in_place() {
        let p = demo_init();
        // The spawn argument points at the embedded "child.maq" string.
        let name_at = (140 - p.origin()) as usize;
        assert_eq!(p.words()[name_at], b'c' as i32);
        assert!(p.words().len() > name_at + 9);
    }
}
