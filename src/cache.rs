//! Fully associative, write-through cache in front of [`Memory`].
//!
//! Lines are kept in insertion order and the oldest is evicted first. Hits do not reorder
//! lines, and a write to an address that is already cached updates the line in place.

use std::collections::VecDeque;

use crate::memory::{Memory, MemoryError};

pub const CACHE_LINES: usize = 16;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct CacheLine {
    /// Also serves as the tag.
    pub address: u16,
    pub value: u16,
}

/// How a read was served.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Access {
    Hit,
    /// Filled from memory, possibly evicting the oldest line.
    Miss { evicted: Option<CacheLine> },
}

#[derive(Debug)]
pub struct Cache {
    lines: VecDeque<CacheLine>,
    memory: Memory,
}

impl Cache {
    pub fn new(memory: Memory) -> Self {
        Cache {
            lines: VecDeque::with_capacity(CACHE_LINES),
            memory,
        }
    }

    pub fn read(&mut self, address: u16) -> Result<u16, MemoryError> {
        self.read_traced(address).map(|(value, _)| value)
    }

    pub fn read_traced(&mut self, address: u16) -> Result<(u16, Access), MemoryError> {
        if let Some(line) = self.line(address) {
            return Ok((line.value, Access::Hit));
        }
        let value = self.memory.read(address)?;
        let evicted = self.insert(CacheLine { address, value });
        Ok((value, Access::Miss { evicted }))
    }

    /// Write through to memory, then refresh the cache.
    ///
    /// Returns the line evicted to make room, if any.
    pub fn write(&mut self, address: u16, value: u16) -> Result<Option<CacheLine>, MemoryError> {
        self.memory.write(address, value)?;
        if let Some(line) = self.lines.iter_mut().find(|line| line.address == address) {
            line.value = value;
            return Ok(None);
        }
        Ok(self.insert(CacheLine { address, value }))
    }

    /// Empty the cache without touching memory.
    pub fn reset(&mut self) {
        self.lines.clear();
    }

    /// Oldest line first.
    pub fn lines(&self) -> impl Iterator<Item = &CacheLine> {
        self.lines.iter()
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    fn line(&self, address: u16) -> Option<&CacheLine> {
        self.lines.iter().find(|line| line.address == address)
    }

    fn insert(&mut self, line: CacheLine) -> Option<CacheLine> {
        let evicted = if self.lines.len() >= CACHE_LINES {
            self.lines.pop_front()
        } else {
            None
        };
        self.lines.push_back(line);
        evicted
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::new(Memory::new())
    }
}
