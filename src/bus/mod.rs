/*!
I/O bus: façade and device submodules.

Overview
- The bus exposes one flat device-register space to the kernel and dispatches
  each access to the owning device. It also owns machine-time: `tick()` is
  called once per executed instruction and advances every device with a
  notion of time.

Register map
- 0..16: four terminal groups, group `g` at base `4*g` with offsets
  keyboard-data, keyboard-ready, screen-data, screen-ready.
- 16: clock instruction counter (read-only)
- 17: clock interrupt flag (write 0 to acknowledge)
- 18: clock countdown timer (write to arm, 0 to disarm)

Modules and responsibilities
- terminal: keyboard queue + ready bit, screen transcript + busy countdown.
- clock: monotonic tick counter, countdown timer, pending-interrupt flag.
*/

pub mod clock;
pub mod terminal;

pub use clock::Clock;
pub use terminal::Terminal;

use crate::err::MachineError;

/// Number of terminal groups on the bus.
pub const TERMINAL_GROUPS: usize = 4;

/// First register past the terminal window.
const TERMINAL_END: i32 = TERMINAL_GROUPS as i32 * terminal::GROUP_REGS;

/// Clock register addresses.
pub const CLOCK_INSTRUCTIONS: i32 = TERMINAL_END;
pub const CLOCK_INTERRUPT: i32 = TERMINAL_END + 1;
pub const CLOCK_TIMER: i32 = TERMINAL_END + 2;

/// Device register address for `group`'s keyboard data.
#[inline]
pub fn keyboard_reg(group: usize) -> i32 {
    group as i32 * terminal::GROUP_REGS + terminal::KEYBOARD
}

/// Device register address for `group`'s keyboard-ready bit.
#[inline]
pub fn keyboard_status_reg(group: usize) -> i32 {
    group as i32 * terminal::GROUP_REGS + terminal::KEYBOARD_STATUS
}

/// Device register address for `group`'s screen data.
#[inline]
pub fn screen_reg(group: usize) -> i32 {
    group as i32 * terminal::GROUP_REGS + terminal::SCREEN
}

/// Device register address for `group`'s screen-ready bit.
#[inline]
pub fn screen_status_reg(group: usize) -> i32 {
    group as i32 * terminal::GROUP_REGS + terminal::SCREEN_STATUS
}

/// The I/O bus: terminal groups plus the clock, behind one register space.
pub struct IoBus {
    terminals: Vec<Terminal>,
    clock: Clock,
}

impl Default for IoBus {
    fn default() -> Self {
        Self::new()
    }
}

impl IoBus {
    pub fn new() -> Self {
        Self {
            terminals: (0..TERMINAL_GROUPS).map(Terminal::new).collect(),
            clock: Clock::new(),
        }
    }

    /// Read a device register.
    pub fn read(&mut self, reg: i32) -> Result<i32, MachineError> {
        if (0..TERMINAL_END).contains(&reg) {
            let group = (reg / terminal::GROUP_REGS) as usize;
            return self.terminals[group].read_reg(reg % terminal::GROUP_REGS);
        }
        match reg {
            CLOCK_INSTRUCTIONS => Ok(self.clock.instructions() as i32),
            CLOCK_INTERRUPT => Ok(self.clock.irq_pending() as i32),
            CLOCK_TIMER => Err(MachineError::InvalidRegisterOp(reg)),
            _ => Err(MachineError::InvalidRegister(reg)),
        }
    }

    /// Write a device register.
    pub fn write(&mut self, reg: i32, word: i32) -> Result<(), MachineError> {
        if (0..TERMINAL_END).contains(&reg) {
            let group = (reg / terminal::GROUP_REGS) as usize;
            return self.terminals[group].write_reg(reg % terminal::GROUP_REGS, word);
        }
        match reg {
            CLOCK_INSTRUCTIONS => Err(MachineError::InvalidRegisterOp(reg)),
            CLOCK_INTERRUPT => {
                self.clock.set_irq_pending(word != 0);
                Ok(())
            }
            CLOCK_TIMER => self.clock.set_timer(word),
            _ => Err(MachineError::InvalidRegister(reg)),
        }
    }

    /// Advance machine time by one executed instruction.
    pub fn tick(&mut self) {
        self.clock.tick();
        for t in &mut self.terminals {
            t.tick();
        }
    }

    /// The monotonic instruction counter, unclamped.
    #[inline]
    pub fn instructions(&self) -> i64 {
        self.clock.instructions()
    }

    /// Whether the clock has an unacknowledged interrupt.
    #[inline]
    pub fn clock_irq_pending(&self) -> bool {
        self.clock.irq_pending()
    }

    /// Whether the clock can still raise an interrupt without kernel action.
    #[inline]
    pub fn clock_armed(&self) -> bool {
        self.clock.armed()
    }

    /// Direct access to a terminal group (input scripting, transcripts).
    pub fn terminal(&self, group: usize) -> &Terminal {
        &self.terminals[group]
    }

    pub fn terminal_mut(&mut self, group: usize) -> &mut Terminal {
        &mut self.terminals[group]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatches_terminal_registers() {
        let mut bus = IoBus::new();
        bus.terminal_mut(2).push_input(55);

        assert_eq!(bus.read(keyboard_status_reg(2)).unwrap(), 1);
        assert_eq!(bus.read(keyboard_reg(2)).unwrap(), 55);
        assert_eq!(bus.read(keyboard_status_reg(2)).unwrap(), 0);

        // Other groups are unaffected.
        assert_eq!(bus.read(keyboard_status_reg(0)).unwrap(), 0);
    }

    #[test]
    fn screen_write_and_busy_through_bus() {
        let mut bus = IoBus::new();
        bus.terminal_mut(1).set_write_delay(2);

        assert_eq!(bus.read(screen_status_reg(1)).unwrap(), 1);
        bus.write(screen_reg(1), 72).unwrap();
        assert_eq!(bus.read(screen_status_reg(1)).unwrap(), 0);

        bus.tick();
        bus.tick();
        assert_eq!(bus.read(screen_status_reg(1)).unwrap(), 1);
        assert_eq!(bus.terminal(1).output(), &[72]);
    }

    #[test]
    fn clock_registers() {
        let mut bus = IoBus::new();
        bus.write(CLOCK_TIMER, 2).unwrap();
        bus.tick();
        bus.tick();
        assert!(bus.clock_irq_pending());
        assert_eq!(bus.read(CLOCK_INTERRUPT).unwrap(), 1);
        assert_eq!(bus.read(CLOCK_INSTRUCTIONS).unwrap(), 2);

        bus.write(CLOCK_INTERRUPT, 0).unwrap();
        assert!(!bus.clock_irq_pending());
    }

    #[test]
    fn rejects_unmapped_and_read_only() {
        let mut bus = IoBus::new();
        assert!(matches!(bus.read(-1), Err(MachineError::InvalidRegister(-1))));
        assert!(matches!(bus.read(99), Err(MachineError::InvalidRegister(99))));
        assert!(bus.write(CLOCK_INSTRUCTIONS, 1).is_err());
        assert!(bus.read(CLOCK_TIMER).is_err());
    }
}
