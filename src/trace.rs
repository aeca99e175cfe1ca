//! Defines the [`Trace`] trait, used to observe the machine while it runs.
//!
//! Tracing never affects execution. The engine reports what it does and carries on.

use crate::cache::CacheLine;
use crate::computer::Fault;
use crate::encoder::Instruction;

/// Something the machine did.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Event {
    /// Instruction word fetched from `pc`.
    Fetch { pc: u16, word: u16 },
    Decode { instruction: Instruction },
    /// About to execute, with the effective address if the format has one.
    Execute {
        instruction: Instruction,
        effective_address: Option<u16>,
    },
    CacheHit { address: u16 },
    CacheMiss { address: u16 },
    CacheEvict { line: CacheLine },
    MemoryWrite { address: u16, value: u16 },
    Output { device: u8, ch: char },
    /// `IN` found no input and will be retried.
    AwaitInput { register: u8 },
    Halt { pc: u16 },
    Fault { fault: Fault },
}

/// A sink for machine [`Event`]s.
pub trait Trace {
    fn event(&mut self, event: &Event);
}

/// An implementation of [`Trace`] that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTrace;

impl Trace for NoopTrace {
    #[inline]
    fn event(&mut self, _event: &Event) {}
}

/// Records every event.
impl Trace for Vec<Event> {
    fn event(&mut self, event: &Event) {
        self.push(*event);
    }
}

impl<T: ?Sized + Trace> Trace for &mut T {
    fn event(&mut self, event: &Event) {
        (**self).event(event);
    }
}

impl<T: ?Sized + Trace> Trace for Box<T> {
    fn event(&mut self, event: &Event) {
        (**self).event(event);
    }
}
