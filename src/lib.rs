//! Assembler and simulator for the C6461 instructional computer.

// Encoding
pub mod isa;
pub use isa::Opcode;
pub mod encoder;
pub use encoder::{decode, encode, encode_line, EncodeError, Instruction, Operands};

// Assembling
mod symbol;
pub use symbol::{Span, Symbol, SymbolTable};
pub mod assembler;
pub use assembler::{assemble, AsmError, Assembler, Assembly};
pub mod loader;
pub use loader::{parse_load_text, LoadError};

// Running
pub mod memory;
pub use memory::{Memory, MemoryError, MEMORY_SIZE};
pub mod cache;
pub use cache::{Cache, CacheLine, CACHE_LINES};
pub mod registers;
pub use registers::{ConditionCode, RegisterFile, RegisterName};
pub mod devices;
pub mod trace;
pub use trace::{Event, NoopTrace, Trace};
pub mod computer;
pub use computer::{Computer, Fault, State};

// Reporting
pub mod error;
pub mod output;

pub mod env;

/// Amount of lines to show as context, each side of focus line (line containing span).
pub const DIAGNOSTIC_CONTEXT_LINES: usize = 4;
