/*!
Guest memory: a flat, word-addressed RAM.

The simulated machine addresses memory in `i32` words, not bytes. The low
addresses double as the interrupt save area (see `irq`), so address 0 is a
perfectly ordinary, writable location.

This module provides a small, hot-path-friendly API for reading and writing
words with bounds checking. It is shared by the CPU (fetch/load/store), the
kernel (save-area access, guest-string copies) and the loader (program
placement).
*/

use crate::err::MachineError;

/// Default memory size, in words.
pub const MEM_SIZE: usize = 10_000;

/// Word-addressed guest RAM.
///
/// All accesses are bounds-checked; an out-of-range address is a
/// `MachineError::InvalidAddress`, which the CPU surfaces to the kernel as a
/// fault when it happens on behalf of a guest instruction.
pub struct Mem {
    data: Vec<i32>,
}

impl Default for Mem {
    fn default() -> Self {
        Self::new()
    }
}

impl Mem {
    /// Create a RAM of the default size, initialized to 0.
    pub fn new() -> Self {
        Self::with_size(MEM_SIZE)
    }

    /// Create a RAM of `words` words, initialized to 0.
    pub fn with_size(words: usize) -> Self {
        Self {
            data: vec![0; words],
        }
    }

    /// Number of addressable words.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Clear all of memory to 0.
    pub fn reset(&mut self) {
        self.data.fill(0);
    }

    /// Read the word at `addr`.
    #[inline]
    pub fn read(&self, addr: i32) -> Result<i32, MachineError> {
        self.index(addr).map(|i| self.data[i])
    }

    /// Write `word` at `addr`.
    #[inline]
    pub fn write(&mut self, addr: i32, word: i32) -> Result<(), MachineError> {
        let i = self.index(addr)?;
        self.data[i] = word;
        Ok(())
    }

    /// Copy `words` into memory starting at `origin`. Used by program loading;
    /// fails without partial effect if the image does not fit.
    pub fn load_slice(&mut self, origin: i32, words: &[i32]) -> Result<(), MachineError> {
        let start = self.index(origin)?;
        let end = start
            .checked_add(words.len())
            .filter(|&e| e <= self.data.len())
            .ok_or(MachineError::InvalidAddress(origin + words.len() as i32))?;
        self.data[start..end].copy_from_slice(words);
        Ok(())
    }

    /// Expose the contents (read-only). Useful for diagnostics and tests.
    pub fn as_slice(&self) -> &[i32] {
        &self.data
    }

    #[inline]
    fn index(&self, addr: i32) -> Result<usize, MachineError> {
        if addr < 0 || addr as usize >= self.data.len() {
            return Err(MachineError::InvalidAddress(addr));
        }
        Ok(addr as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_and_init() {
        let m = Mem::new();
        assert_eq!(m.len(), MEM_SIZE);
        assert!(m.as_slice().iter().all(|&w| w == 0));
    }

    #[test]
    fn read_write_round_trip() {
        let mut m = Mem::with_size(64);
        m.write(0, -7).unwrap();
        m.write(63, 123).unwrap();
        assert_eq!(m.read(0).unwrap(), -7);
        assert_eq!(m.read(63).unwrap(), 123);
    }

    #[test]
    fn out_of_range_is_rejected() {
        let mut m = Mem::with_size(16);
        assert!(matches!(m.read(-1), Err(MachineError::InvalidAddress(-1))));
        assert!(matches!(m.read(16), Err(MachineError::InvalidAddress(16))));
        assert!(matches!(m.write(99, 1), Err(MachineError::InvalidAddress(99))));
    }

    #[test]
    fn load_slice_places_and_checks_bounds() {
        let mut m = Mem::with_size(16);
        m.load_slice(4, &[1, 2, 3]).unwrap();
        assert_eq!(&m.as_slice()[4..7], &[1, 2, 3]);

        // Overrunning image leaves memory untouched.
        let before = m.as_slice().to_vec();
        assert!(m.load_slice(14, &[9, 9, 9]).is_err());
        assert_eq!(m.as_slice(), &before[..]);
    }
}
