/*!
Terminal device: one keyboard/screen pair per terminal group.

Behavior:
- The keyboard holds a queue of pending input words. The ready register is 1
  while the queue is non-empty; reading the data register pops the head.
  Reading with nothing pending is a device error (well-behaved guests and the
  kernel consult the ready register first).
- The screen appends written words to a transcript. A write makes the screen
  busy for `write_delay` machine ticks; while busy the ready register is 0 and
  further writes are device errors. A delay of 0 models an always-ready
  screen.

The bus ticks every terminal once per executed machine instruction, which is
what drives the busy countdown. Input arrives either from the embedding
program (`push_input`) before/while the machine runs, or from tests scripting
a scenario.
*/

use std::collections::VecDeque;

use crate::err::MachineError;

/// Register offsets within a terminal group.
pub const KEYBOARD: i32 = 0;
pub const KEYBOARD_STATUS: i32 = 1;
pub const SCREEN: i32 = 2;
pub const SCREEN_STATUS: i32 = 3;

/// Number of device registers per terminal group.
pub const GROUP_REGS: i32 = 4;

/// Default number of ticks a screen stays busy after a write.
pub const DEFAULT_WRITE_DELAY: u32 = 4;

#[derive(Debug)]
pub struct Terminal {
    // Identifies the group in error values and logs.
    group: usize,

    input: VecDeque<i32>,
    output: Vec<i32>,

    // Remaining busy ticks; 0 = screen ready.
    busy: u32,
    write_delay: u32,
}

impl Terminal {
    pub fn new(group: usize) -> Self {
        Self {
            group,
            input: VecDeque::new(),
            output: Vec::new(),
            busy: 0,
            write_delay: DEFAULT_WRITE_DELAY,
        }
    }

    /// Change the busy period applied after each screen write.
    pub fn set_write_delay(&mut self, ticks: u32) {
        self.write_delay = ticks;
    }

    /// Queue one word of keyboard input.
    pub fn push_input(&mut self, word: i32) {
        self.input.push_back(word);
    }

    /// Queue several words of keyboard input.
    pub fn push_input_all<I: IntoIterator<Item = i32>>(&mut self, words: I) {
        self.input.extend(words);
    }

    #[inline]
    pub fn keyboard_ready(&self) -> bool {
        !self.input.is_empty()
    }

    #[inline]
    pub fn screen_ready(&self) -> bool {
        self.busy == 0
    }

    /// Pop one word of pending input.
    pub fn read_keyboard(&mut self) -> Result<i32, MachineError> {
        self.input
            .pop_front()
            .ok_or(MachineError::KeyboardEmpty(self.group))
    }

    /// Append one word to the transcript and start the busy period.
    pub fn write_screen(&mut self, word: i32) -> Result<(), MachineError> {
        if !self.screen_ready() {
            return Err(MachineError::ScreenBusy(self.group));
        }
        self.output.push(word);
        self.busy = self.write_delay;
        Ok(())
    }

    /// Everything written to the screen so far, in order.
    pub fn output(&self) -> &[i32] {
        &self.output
    }

    /// Advance the busy countdown by one machine tick.
    #[inline]
    pub fn tick(&mut self) {
        self.busy = self.busy.saturating_sub(1);
    }

    /// Read one device register of this group.
    pub fn read_reg(&mut self, offset: i32) -> Result<i32, MachineError> {
        match offset {
            KEYBOARD => self.read_keyboard(),
            KEYBOARD_STATUS => Ok(self.keyboard_ready() as i32),
            SCREEN_STATUS => Ok(self.screen_ready() as i32),
            // The screen data register is write-only.
            _ => Err(MachineError::InvalidRegisterOp(
                self.group as i32 * GROUP_REGS + offset,
            )),
        }
    }

    /// Write one device register of this group.
    pub fn write_reg(&mut self, offset: i32, word: i32) -> Result<(), MachineError> {
        match offset {
            SCREEN => self.write_screen(word),
            _ => Err(MachineError::InvalidRegisterOp(
                self.group as i32 * GROUP_REGS + offset,
            )),
        }
    }
}
