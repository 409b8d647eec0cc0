/*!
Clock device: instruction counter, countdown timer and interrupt flag.

Registers (as mapped by the bus):
- INSTRUCTIONS (read-only): monotonic count of machine ticks since power-on.
  The kernel samples it at every interrupt to compute elapsed-time deltas.
- INTERRUPT: pending-interrupt flag. The timer raises it; the kernel
  acknowledges by writing 0.
- TIMER: countdown, in ticks, until the next interrupt. Writing a positive
  value (re)arms the timer; writing 0 disarms it.

The device ticks once per machine tick. When an armed countdown reaches zero
the pending flag is raised and the timer stays disarmed until the kernel
rearms it, so a slow kernel sees one interrupt, not a burst.
*/

use crate::err::MachineError;

#[derive(Debug, Default)]
pub struct Clock {
    instructions: i64,
    // Remaining ticks until the next interrupt; 0 = disarmed.
    timer: i32,
    irq_pending: bool,
}

impl Clock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Monotonic machine-tick count.
    #[inline]
    pub fn instructions(&self) -> i64 {
        self.instructions
    }

    #[inline]
    pub fn irq_pending(&self) -> bool {
        self.irq_pending
    }

    /// Whether a future interrupt can still fire without kernel action.
    #[inline]
    pub fn armed(&self) -> bool {
        self.timer > 0
    }

    /// Arm the countdown (`ticks` > 0) or disarm it (`ticks` = 0).
    pub fn set_timer(&mut self, ticks: i32) -> Result<(), MachineError> {
        if ticks < 0 {
            return Err(MachineError::InvalidRegisterOp(super::CLOCK_TIMER));
        }
        self.timer = ticks;
        Ok(())
    }

    /// Set or clear the pending flag; the kernel writes 0 to acknowledge.
    pub fn set_irq_pending(&mut self, pending: bool) {
        self.irq_pending = pending;
    }

    /// Advance one machine tick.
    pub fn tick(&mut self) {
        self.instructions += 1;
        if self.timer > 0 {
            self.timer -= 1;
            if self.timer == 0 {
                self.irq_pending = true;
            }
        }
    }
}
