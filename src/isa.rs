use std::fmt;
use std::str::FromStr;

/// Operation codes of the C6461 instruction set.
///
/// Discriminants are the octal values from the ISA document and are packed into bits 15..10 of
/// every instruction word.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(u8)]
pub enum Opcode {
    Hlt = 0o00,
    Ldr = 0o01,
    Str = 0o02,
    Lda = 0o03,
    Amr = 0o04,
    Smr = 0o05,
    Air = 0o06,
    Sir = 0o07,
    Jz = 0o10,
    Jne = 0o11,
    Jcc = 0o12,
    Jma = 0o13,
    Jsr = 0o14,
    Rfs = 0o15,
    Sob = 0o16,
    Jge = 0o17,
    Trap = 0o30,
    Src = 0o31,
    Rrc = 0o32,
    Ldx = 0o41,
    Stx = 0o42,
    In = 0o61,
    Out = 0o62,
    Chk = 0o63,
    Mlt = 0o70,
    Dvd = 0o71,
    Trr = 0o72,
    And = 0o73,
    Orr = 0o74,
    Not = 0o75,
}

/// Bit layout shared by a group of instructions.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Format {
    /// `HLT`: opcode only.
    Halt,
    /// `TRAP code`: 4-bit trap code in bits 3..0.
    Trap,
    /// `op r, ix, address[, I]`
    Standard,
    /// `op ix, address[, I]`, register field unused.
    AddressOnly,
    /// `RFS [code]`: 5-bit return code.
    Return,
    /// `op r, immediate`
    Immediate,
    /// `op rx, ry`
    RegisterPair,
    /// `NOT rx`
    Unary,
    /// `op r, count, L/R, A/L`
    Shift,
    /// `op r, device`
    Io,
}

impl Format {
    /// Operand syntax, as shown in diagnostics.
    pub fn usage(self) -> &'static str {
        match self {
            Format::Halt => "no operands",
            Format::Trap => "code",
            Format::Standard => "r, ix, address[, I]",
            Format::AddressOnly => "ix, address[, I]",
            Format::Return => "[code]",
            Format::Immediate => "r, immediate",
            Format::RegisterPair => "rx, ry",
            Format::Unary => "rx",
            Format::Shift => "r, count, L/R, A/L",
            Format::Io => "r, device",
        }
    }
}

impl Opcode {
    pub const ALL: [Opcode; 30] = [
        Opcode::Hlt,
        Opcode::Ldr,
        Opcode::Str,
        Opcode::Lda,
        Opcode::Amr,
        Opcode::Smr,
        Opcode::Air,
        Opcode::Sir,
        Opcode::Jz,
        Opcode::Jne,
        Opcode::Jcc,
        Opcode::Jma,
        Opcode::Jsr,
        Opcode::Rfs,
        Opcode::Sob,
        Opcode::Jge,
        Opcode::Trap,
        Opcode::Src,
        Opcode::Rrc,
        Opcode::Ldx,
        Opcode::Stx,
        Opcode::In,
        Opcode::Out,
        Opcode::Chk,
        Opcode::Mlt,
        Opcode::Dvd,
        Opcode::Trr,
        Opcode::And,
        Opcode::Orr,
        Opcode::Not,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Opcode> {
        Self::ALL.into_iter().find(|op| op.code() == code)
    }

    /// Mnemonics are matched without regard to case.
    pub fn from_mnemonic(mnemonic: &str) -> Option<Opcode> {
        Self::ALL
            .into_iter()
            .find(|op| op.mnemonic().eq_ignore_ascii_case(mnemonic))
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Hlt => "HLT",
            Opcode::Ldr => "LDR",
            Opcode::Str => "STR",
            Opcode::Lda => "LDA",
            Opcode::Amr => "AMR",
            Opcode::Smr => "SMR",
            Opcode::Air => "AIR",
            Opcode::Sir => "SIR",
            Opcode::Jz => "JZ",
            Opcode::Jne => "JNE",
            Opcode::Jcc => "JCC",
            Opcode::Jma => "JMA",
            Opcode::Jsr => "JSR",
            Opcode::Rfs => "RFS",
            Opcode::Sob => "SOB",
            Opcode::Jge => "JGE",
            Opcode::Trap => "TRAP",
            Opcode::Src => "SRC",
            Opcode::Rrc => "RRC",
            Opcode::Ldx => "LDX",
            Opcode::Stx => "STX",
            Opcode::In => "IN",
            Opcode::Out => "OUT",
            Opcode::Chk => "CHK",
            Opcode::Mlt => "MLT",
            Opcode::Dvd => "DVD",
            Opcode::Trr => "TRR",
            Opcode::And => "AND",
            Opcode::Orr => "ORR",
            Opcode::Not => "NOT",
        }
    }

    pub fn format(self) -> Format {
        use Opcode::*;
        match self {
            Hlt => Format::Halt,
            Trap => Format::Trap,
            Ldr | Str | Lda | Amr | Smr | Jz | Jne | Jcc | Sob | Jge => Format::Standard,
            Jma | Jsr | Ldx | Stx => Format::AddressOnly,
            Rfs => Format::Return,
            Air | Sir => Format::Immediate,
            Mlt | Dvd | Trr | And | Orr => Format::RegisterPair,
            Not => Format::Unary,
            Src | Rrc => Format::Shift,
            In | Out | Chk => Format::Io,
        }
    }
}

/// Mnemonic for a raw opcode value, or `"UNKNOWN"`.
pub fn decode_name(code: u8) -> &'static str {
    Opcode::from_code(code).map_or("UNKNOWN", Opcode::mnemonic)
}

impl FromStr for Opcode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Opcode::from_mnemonic(s).ok_or(())
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}
