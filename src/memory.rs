use std::error::Error;
use std::fmt;

use crate::encoder::{to_octal, WORD_DIGITS};

/// Number of addressable 16-bit words.
pub const MEMORY_SIZE: usize = 2048;

/// Word-addressed main memory.
pub struct Memory {
    words: Box<[u16; MEMORY_SIZE]>,
}

impl Memory {
    pub fn new() -> Self {
        Memory {
            words: Box::new([0; MEMORY_SIZE]),
        }
    }

    pub fn read(&self, address: u16) -> Result<u16, MemoryError> {
        self.words
            .get(address as usize)
            .copied()
            .ok_or(MemoryError::AddressOutOfRange { address })
    }

    pub fn write(&mut self, address: u16, value: u16) -> Result<(), MemoryError> {
        let slot = self
            .words
            .get_mut(address as usize)
            .ok_or(MemoryError::AddressOutOfRange { address })?;
        *slot = value;
        Ok(())
    }

    /// Copy `(address, word)` pairs straight into memory.
    pub fn load(&mut self, image: &[(u16, u16)]) -> Result<(), MemoryError> {
        for &(address, value) in image {
            self.write(address, value)?;
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        self.words.fill(0);
    }

    pub fn words(&self) -> &[u16] {
        &self.words[..]
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let used = self.words.iter().filter(|&&word| word != 0).count();
        f.debug_struct("Memory").field("nonzero_words", &used).finish()
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MemoryError {
    AddressOutOfRange { address: u16 },
}

impl Error for MemoryError {}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryError::AddressOutOfRange { address } => write!(
                f,
                "Address {} is outside of memory (0..={})",
                to_octal(*address, WORD_DIGITS),
                to_octal((MEMORY_SIZE - 1) as u16, WORD_DIGITS),
            ),
        }
    }
}
