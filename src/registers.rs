use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;

bitflags! {
    /// Condition code bits. The bit number is the condition `JCC` tests.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct ConditionCode: u8 {
        const OVERFLOW = 1 << 0;
        const UNDERFLOW = 1 << 1;
        const DIVZERO = 1 << 2;
        const EQUAL = 1 << 3;
    }
}

impl ConditionCode {
    /// Test the condition numbered `bit` (0..=3).
    pub fn test(self, bit: u8) -> bool {
        (self.bits() >> bit) & 1 == 1
    }
}

/// Every register visible to the operator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegisterFile {
    /// Program counter
    pub pc: u16,
    /// Memory address register
    pub mar: u16,
    /// Memory buffer register
    pub mbr: u16,
    /// Instruction register
    pub ir: u16,
    /// Condition code
    pub cc: ConditionCode,
    /// General purpose registers R0-R3
    pub r: [u16; 4],
    /// Index registers X1-X3. Slot 0 exists so that the field value can index directly, but it
    /// is never read: index 0 means "no indexing".
    pub x: [u16; 4],
}

impl RegisterFile {
    pub fn new() -> Self {
        RegisterFile {
            pc: 0,
            mar: 0,
            mbr: 0,
            ir: 0,
            cc: ConditionCode::empty(),
            r: [0; 4],
            x: [0; 4],
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Contents of the index register selected by an IX field, or 0 for no indexing.
    pub fn index(&self, ix: u8) -> u16 {
        match ix {
            1..=3 => self.x[ix as usize],
            _ => 0,
        }
    }

    /// Register numbers are taken modulo 4.
    pub fn get(&self, name: RegisterName) -> u16 {
        match name {
            RegisterName::R(i) => self.r[(i & 0b11) as usize],
            RegisterName::X(i) => self.x[(i & 0b11) as usize],
            RegisterName::Pc => self.pc,
            RegisterName::Mar => self.mar,
            RegisterName::Mbr => self.mbr,
            RegisterName::Ir => self.ir,
        }
    }

    pub fn set(&mut self, name: RegisterName, value: u16) {
        let slot = match name {
            RegisterName::R(i) => &mut self.r[(i & 0b11) as usize],
            RegisterName::X(i) => &mut self.x[(i & 0b11) as usize],
            RegisterName::Pc => &mut self.pc,
            RegisterName::Mar => &mut self.mar,
            RegisterName::Mbr => &mut self.mbr,
            RegisterName::Ir => &mut self.ir,
        };
        *slot = value;
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

/// Name of a register that can be deposited into from the front panel.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RegisterName {
    /// R0-R3
    R(u8),
    /// X1-X3
    X(u8),
    Pc,
    Mar,
    Mbr,
    Ir,
}

impl FromStr for RegisterName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let name = match upper.as_str() {
            "R0" => RegisterName::R(0),
            "R1" => RegisterName::R(1),
            "R2" => RegisterName::R(2),
            "R3" => RegisterName::R(3),
            "X1" => RegisterName::X(1),
            "X2" => RegisterName::X(2),
            "X3" => RegisterName::X(3),
            "PC" => RegisterName::Pc,
            "MAR" => RegisterName::Mar,
            "MBR" => RegisterName::Mbr,
            "IR" => RegisterName::Ir,
            _ => return Err(format!("Unknown register '{}'", s)),
        };
        Ok(name)
    }
}

impl fmt::Display for RegisterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterName::R(i) => write!(f, "R{i}"),
            RegisterName::X(i) => write!(f, "X{i}"),
            RegisterName::Pc => f.write_str("PC"),
            RegisterName::Mar => f.write_str("MAR"),
            RegisterName::Mbr => f.write_str("MBR"),
            RegisterName::Ir => f.write_str("IR"),
        }
    }
}

/// Field extraction and packing for instruction words.
///
/// Bit 15 is the most significant bit. Several fields overlap because each instruction group
/// reuses the low bits differently; callers pick the fields their format defines.
pub mod field {
    pub const OPCODE_SHIFT: u16 = 10;
    pub const REGISTER_SHIFT: u16 = 8;
    pub const INDEX_SHIFT: u16 = 6;
    pub const INDIRECT_SHIFT: u16 = 5;
    pub const ARITH_LOGICAL_SHIFT: u16 = 7;
    pub const LEFT_RIGHT_SHIFT: u16 = 6;

    pub const OPCODE_MASK: u16 = 0o77;
    pub const REGISTER_MASK: u16 = 0b11;
    pub const INDEX_MASK: u16 = 0b11;
    pub const ADDRESS_MASK: u16 = 0b1_1111;
    pub const COUNT_MASK: u16 = 0b1111;

    /// Bits 15..10
    pub fn opcode(word: u16) -> u8 {
        ((word >> OPCODE_SHIFT) & OPCODE_MASK) as u8
    }

    /// Bits 9..8: R, Rx, or the condition number for `JCC`.
    pub fn register(word: u16) -> u8 {
        ((word >> REGISTER_SHIFT) & REGISTER_MASK) as u8
    }

    /// Bits 7..6: IX, or Ry for register-register instructions.
    pub fn index(word: u16) -> u8 {
        ((word >> INDEX_SHIFT) & INDEX_MASK) as u8
    }

    /// Bit 5
    pub fn indirect(word: u16) -> bool {
        (word >> INDIRECT_SHIFT) & 1 == 1
    }

    /// Bits 4..0: address, immediate, device id, or return code.
    pub fn address(word: u16) -> u8 {
        (word & ADDRESS_MASK) as u8
    }

    /// Bits 3..0: shift count or trap code.
    pub fn count(word: u16) -> u8 {
        (word & COUNT_MASK) as u8
    }

    /// Bit 6 of a shift instruction. Set means left.
    pub fn left(word: u16) -> bool {
        (word >> LEFT_RIGHT_SHIFT) & 1 == 1
    }

    /// Bit 7 of a shift instruction. Set means logical.
    pub fn logical(word: u16) -> bool {
        (word >> ARITH_LOGICAL_SHIFT) & 1 == 1
    }

    pub fn with_opcode(code: u8) -> u16 {
        (code as u16 & OPCODE_MASK) << OPCODE_SHIFT
    }

    pub fn with_register(r: u8) -> u16 {
        (r as u16 & REGISTER_MASK) << REGISTER_SHIFT
    }

    pub fn with_index(ix: u8) -> u16 {
        (ix as u16 & INDEX_MASK) << INDEX_SHIFT
    }

    pub fn with_indirect(indirect: bool) -> u16 {
        (indirect as u16) << INDIRECT_SHIFT
    }

    pub fn with_address(address: u8) -> u16 {
        address as u16 & ADDRESS_MASK
    }

    pub fn with_count(count: u8) -> u16 {
        count as u16 & COUNT_MASK
    }

    pub fn with_left(left: bool) -> u16 {
        (left as u16) << LEFT_RIGHT_SHIFT
    }

    pub fn with_logical(logical: bool) -> u16 {
        (logical as u16) << ARITH_LOGICAL_SHIFT
    }
}
