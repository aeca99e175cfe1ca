//! Two-way codec between assembly mnemonics and packed 16-bit instruction words.
//!
//! Both directions go through [`Instruction`], so the bit layout of every format lives in one
//! place ([`crate::registers::field`]) and the encoder and decoder cannot drift apart.

use std::error::Error;
use std::fmt;
use std::num::ParseIntError;

use crate::isa::{Format, Opcode};
use crate::registers::field;

/// Width of every address and word written to listing and load files.
pub const WORD_DIGITS: usize = 6;

/// Operand fields of a decoded instruction, by format.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Operands {
    /// `HLT`
    None,
    /// `TRAP` code or `RFS` return code.
    Code(u8),
    /// Standard and address-only formats. `r` is always 0 for the address-only format.
    Indexed {
        r: u8,
        ix: u8,
        indirect: bool,
        address: u8,
    },
    Immediate { r: u8, value: u8 },
    Pair { rx: u8, ry: u8 },
    Single { rx: u8 },
    Shift {
        r: u8,
        count: u8,
        left: bool,
        logical: bool,
    },
    Device { r: u8, device: u8 },
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Instruction {
    pub op: Opcode,
    pub operands: Operands,
}

impl Instruction {
    /// Validate operand count and field ranges for `mnemonic`.
    pub fn parse(mnemonic: &str, operands: &[i64]) -> Result<Self, EncodeError> {
        let op = Opcode::from_mnemonic(mnemonic).ok_or_else(|| EncodeError::UnknownOpcode {
            mnemonic: mnemonic.to_string(),
        })?;
        let mut args = OperandReader::new(op, operands);

        let operands = match op.format() {
            Format::Halt => Operands::None,
            Format::Trap => Operands::Code(args.take("code", 0o17)?),
            Format::Standard => Operands::Indexed {
                r: args.take("r", 3)?,
                ix: args.take("ix", 3)?,
                address: args.take("address", 31)?,
                indirect: args.optional("I", 1)? == Some(1),
            },
            Format::AddressOnly => Operands::Indexed {
                r: 0,
                ix: args.take("ix", 3)?,
                address: args.take("address", 31)?,
                indirect: args.optional("I", 1)? == Some(1),
            },
            Format::Return => Operands::Code(args.optional("code", 31)?.unwrap_or(0)),
            Format::Immediate => Operands::Immediate {
                r: args.take("r", 3)?,
                value: args.take("immediate", 31)?,
            },
            Format::RegisterPair => Operands::Pair {
                rx: args.take("rx", 3)?,
                ry: args.take("ry", 3)?,
            },
            Format::Unary => Operands::Single {
                rx: args.take("rx", 3)?,
            },
            Format::Shift => Operands::Shift {
                r: args.take("r", 3)?,
                count: args.take("count", 15)?,
                left: args.take("L/R", 1)? == 1,
                logical: args.take("A/L", 1)? == 1,
            },
            Format::Io => Operands::Device {
                r: args.take("r", 3)?,
                device: args.take("device", 31)?,
            },
        };
        args.finish()?;

        Ok(Instruction { op, operands })
    }

    pub fn encode(&self) -> u16 {
        let fields = match self.operands {
            Operands::None => 0,
            Operands::Code(code) if self.op == Opcode::Trap => field::with_count(code),
            Operands::Code(code) => field::with_address(code),
            Operands::Indexed {
                r,
                ix,
                indirect,
                address,
            } => {
                field::with_register(r)
                    | field::with_index(ix)
                    | field::with_indirect(indirect)
                    | field::with_address(address)
            }
            Operands::Immediate { r, value } => field::with_register(r) | field::with_address(value),
            Operands::Pair { rx, ry } => field::with_register(rx) | field::with_index(ry),
            Operands::Single { rx } => field::with_register(rx),
            Operands::Shift {
                r,
                count,
                left,
                logical,
            } => {
                field::with_register(r)
                    | field::with_logical(logical)
                    | field::with_left(left)
                    | field::with_count(count)
            }
            Operands::Device { r, device } => field::with_register(r) | field::with_address(device),
        };
        field::with_opcode(self.op.code()) | fields
    }

    /// Unused bits of the word are ignored.
    pub fn decode(word: u16) -> Result<Self, DecodeError> {
        let code = field::opcode(word);
        let op = Opcode::from_code(code).ok_or(DecodeError::UnknownOpcode { code })?;

        let operands = match op.format() {
            Format::Halt => Operands::None,
            Format::Trap => Operands::Code(field::count(word)),
            Format::Standard => Operands::Indexed {
                r: field::register(word),
                ix: field::index(word),
                indirect: field::indirect(word),
                address: field::address(word),
            },
            Format::AddressOnly => Operands::Indexed {
                r: 0,
                ix: field::index(word),
                indirect: field::indirect(word),
                address: field::address(word),
            },
            Format::Return => Operands::Code(field::address(word)),
            Format::Immediate => Operands::Immediate {
                r: field::register(word),
                value: field::address(word),
            },
            Format::RegisterPair => Operands::Pair {
                rx: field::register(word),
                ry: field::index(word),
            },
            Format::Unary => Operands::Single {
                rx: field::register(word),
            },
            Format::Shift => Operands::Shift {
                r: field::register(word),
                count: field::count(word),
                left: field::left(word),
                logical: field::logical(word),
            },
            Format::Io => Operands::Device {
                r: field::register(word),
                device: field::address(word),
            },
        };

        Ok(Instruction { op, operands })
    }
}

/// Renders as assembly source that [`encode_line`] accepts.
impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.op)?;
        match self.operands {
            Operands::None => Ok(()),
            Operands::Code(code) => write!(f, " {code}"),
            Operands::Indexed {
                r,
                ix,
                indirect,
                address,
            } => {
                if self.op.format() == Format::AddressOnly {
                    write!(f, " {ix},{address}")?;
                } else {
                    write!(f, " {r},{ix},{address}")?;
                }
                if indirect {
                    f.write_str(",1")?;
                }
                Ok(())
            }
            Operands::Immediate { r, value } => write!(f, " {r},{value}"),
            Operands::Pair { rx, ry } => write!(f, " {rx},{ry}"),
            Operands::Single { rx } => write!(f, " {rx}"),
            Operands::Shift {
                r,
                count,
                left,
                logical,
            } => write!(f, " {r},{count},{},{}", left as u8, logical as u8),
            Operands::Device { r, device } => write!(f, " {r},{device}"),
        }
    }
}

/// Walks the operand list of one instruction, checking each field as it goes.
struct OperandReader<'a> {
    op: Opcode,
    values: &'a [i64],
    next: usize,
}

impl<'a> OperandReader<'a> {
    fn new(op: Opcode, values: &'a [i64]) -> Self {
        OperandReader {
            op,
            values,
            next: 0,
        }
    }

    fn take(&mut self, field: &'static str, max: u8) -> Result<u8, EncodeError> {
        match self.optional(field, max)? {
            Some(value) => Ok(value),
            None => Err(self.malformed(Problem::Missing { field })),
        }
    }

    fn optional(&mut self, field: &'static str, max: u8) -> Result<Option<u8>, EncodeError> {
        let Some(&value) = self.values.get(self.next) else {
            return Ok(None);
        };
        self.next += 1;
        if (0..=max as i64).contains(&value) {
            Ok(Some(value as u8))
        } else {
            Err(self.malformed(Problem::OutOfRange { field, value, max }))
        }
    }

    fn finish(&self) -> Result<(), EncodeError> {
        if self.next < self.values.len() {
            return Err(self.malformed(Problem::TooMany {
                expected: self.next,
                found: self.values.len(),
            }));
        }
        Ok(())
    }

    fn malformed(&self, problem: Problem) -> EncodeError {
        EncodeError::MalformedOperands {
            mnemonic: self.op.mnemonic(),
            usage: self.op.format().usage(),
            problem,
        }
    }
}

/// Encode a mnemonic with already-numeric operands.
pub fn encode(mnemonic: &str, operands: &[i64]) -> Result<u16, EncodeError> {
    Instruction::parse(mnemonic, operands).map(|instr| instr.encode())
}

/// Encode one line of label-free, comment-free source such as `LDR 3,0,15` or `LDR 1,0,5 1`.
pub fn encode_line(text: &str) -> Result<u16, EncodeError> {
    let mut parts = tokens(text);
    let mnemonic = parts.next().ok_or(EncodeError::Empty)?;
    let operands = parts
        .map(|token| {
            token.parse::<i64>().map_err(|_| EncodeError::InvalidOperand {
                token: token.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    encode(mnemonic, &operands)
}

pub fn decode(word: u16) -> Result<Instruction, DecodeError> {
    Instruction::decode(word)
}

/// Split on commas and whitespace, dropping empty pieces.
pub fn tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
}

/// Zero-padded octal, e.g. `to_octal(16u16, 6) == "000020"`.
pub fn to_octal(value: impl Into<u32>, digits: usize) -> String {
    format!("{:0digits$o}", value.into())
}

/// Inverse of [`to_octal`] for 16-bit words.
pub fn parse_octal(text: &str) -> Result<u16, ParseIntError> {
    u16::from_str_radix(text.trim(), 8)
}

/// What was wrong with an operand list.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Problem {
    Missing { field: &'static str },
    TooMany { expected: usize, found: usize },
    OutOfRange { field: &'static str, value: i64, max: u8 },
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum EncodeError {
    UnknownOpcode {
        mnemonic: String,
    },
    MalformedOperands {
        mnemonic: &'static str,
        usage: &'static str,
        problem: Problem,
    },
    InvalidOperand {
        token: String,
    },
    Empty,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DecodeError {
    UnknownOpcode { code: u8 },
}

impl Error for EncodeError {}
impl Error for DecodeError {}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Problem::Missing { field } => write!(f, "missing operand `{}`", field),
            Problem::TooMany { expected, found } => {
                write!(f, "too many operands (expected {}, found {})", expected, found)
            }
            Problem::OutOfRange { field, value, max } => {
                write!(f, "operand `{}` is {} but must be 0..={}", field, value, max)
            }
        }
    }
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::UnknownOpcode { mnemonic } => write!(f, "Unknown opcode: {}", mnemonic),
            EncodeError::MalformedOperands {
                mnemonic,
                usage,
                problem,
            } => write!(f, "Malformed operands for {}: {} (usage: {} {})", mnemonic, problem, mnemonic, usage),
            EncodeError::InvalidOperand { token } => write!(f, "Invalid operand `{}`", token),
            EncodeError::Empty => write!(f, "No instruction to encode"),
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::UnknownOpcode { code } => {
                write!(f, "Unknown opcode {}", to_octal(*code, 2))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn octal(line: &str) -> String {
        to_octal(encode_line(line).unwrap(), WORD_DIGITS)
    }

    #[test]
    fn miscellaneous() {
        assert_eq!(octal("HLT"), "000000");
        assert_eq!(octal("TRAP 5"), "060005");
        assert_eq!(octal("TRAP 15"), "060017");
    }

    #[test]
    fn load_store() {
        assert_eq!(octal("LDR 3,0,15"), "003417");
        assert_eq!(octal("LDR 0,0,0"), "002000");
        assert_eq!(octal("LDR 1,2,10"), "002612");
        assert_eq!(octal("STR 2,1,5"), "005105");
        assert_eq!(octal("LDA 1,0,20"), "006424");
        assert_eq!(octal("LDX 1,7"), "102107");
        assert_eq!(octal("LDX 3,15"), "102317");
        assert_eq!(octal("STX 2,10"), "104212");
    }

    #[test]
    fn transfer() {
        assert_eq!(octal("JZ 0,0,5"), "020005");
        assert_eq!(octal("JZ 2,1,15"), "021117");
        assert_eq!(octal("JNE 1,0,10"), "022412");
        assert_eq!(octal("JCC 0,0,8"), "024010");
        assert_eq!(octal("JMA 1,20"), "026124");
        assert_eq!(octal("JSR 2,10"), "030212");
        assert_eq!(octal("RFS 10"), "032012");
        assert_eq!(octal("RFS"), "032000");
        assert_eq!(octal("SOB 3,0,5"), "035405");
        assert_eq!(octal("JGE 2,1,12"), "037114");
    }

    #[test]
    fn arithmetic() {
        assert_eq!(octal("AMR 1,0,15"), "010417");
        assert_eq!(octal("SMR 2,1,8"), "013110");
        assert_eq!(octal("AIR 3,10"), "015412");
        assert_eq!(octal("AIR 0,31"), "014037");
        assert_eq!(octal("SIR 1,5"), "016405");
    }

    #[test]
    fn register_to_register() {
        assert_eq!(octal("MLT 0,2"), "160200");
        assert_eq!(octal("MLT 2,0"), "161000");
        assert_eq!(octal("DVD 0,2"), "162200");
        assert_eq!(octal("TRR 1,3"), "164700");
        assert_eq!(octal("AND 2,1"), "167100");
        assert_eq!(octal("ORR 3,0"), "171400");
        assert_eq!(octal("NOT 2"), "173000");
    }

    #[test]
    fn shift_rotate() {
        assert_eq!(octal("SRC 1,4,1,0"), "062504");
        assert_eq!(octal("SRC 2,8,0,1"), "063210");
        assert_eq!(octal("RRC 3,2,1,1"), "065702");
        assert_eq!(octal("SRC 3,15,1,1"), "063717");
        assert_eq!(octal("RRC 0,15,0,0"), "064017");
    }

    #[test]
    fn io() {
        assert_eq!(octal("IN 0,0"), "142000");
        assert_eq!(octal("IN 2,31"), "143037");
        assert_eq!(octal("OUT 3,1"), "145401");
        assert_eq!(octal("CHK 1,2"), "146402");
    }

    #[test]
    fn indirect_flag() {
        assert_eq!(octal("LDR 1,0,5 1"), "002445");
        assert_eq!(octal("STR 2,1,10,1"), "005152");
        assert_eq!(octal("JMA 2,15 1"), "026257");
        assert_eq!(octal("JSR 0,31 1"), "030077");
    }

    #[test]
    fn unknown_mnemonic() {
        assert_eq!(
            encode_line("FOO 1,2"),
            Err(EncodeError::UnknownOpcode {
                mnemonic: "FOO".to_string()
            })
        );
    }

    #[test]
    fn malformed_operands() {
        let missing = encode_line("LDR 1,0").unwrap_err();
        assert!(matches!(
            missing,
            EncodeError::MalformedOperands {
                problem: Problem::Missing { field: "address" },
                ..
            }
        ));

        let extra = encode_line("NOT 1,2").unwrap_err();
        assert!(matches!(
            extra,
            EncodeError::MalformedOperands {
                problem: Problem::TooMany {
                    expected: 1,
                    found: 2
                },
                ..
            }
        ));

        let range = encode_line("AIR 0,32").unwrap_err();
        assert!(matches!(
            range,
            EncodeError::MalformedOperands {
                problem: Problem::OutOfRange {
                    field: "immediate",
                    value: 32,
                    max: 31
                },
                ..
            }
        ));

        assert!(encode_line("LDR 4,0,1").is_err());
        assert!(encode_line("LDR 1,0,1,2").is_err());
        assert!(encode("TRAP", &[16]).is_err());
        assert!(encode("AIR", &[0, -1]).is_err());
    }

    #[test]
    fn non_numeric_operand() {
        assert_eq!(
            encode_line("LDR 1,0,END"),
            Err(EncodeError::InvalidOperand {
                token: "END".to_string()
            })
        );
        assert_eq!(encode_line("   "), Err(EncodeError::Empty));
    }

    #[test]
    fn decode_fields() {
        let instr = decode(0o102107).unwrap();
        assert_eq!(instr.op, Opcode::Ldx);
        assert_eq!(
            instr.operands,
            Operands::Indexed {
                r: 0,
                ix: 1,
                indirect: false,
                address: 7
            }
        );
        assert_eq!(
            decode(0o040000),
            Err(DecodeError::UnknownOpcode { code: 0o20 })
        );
    }

    #[test]
    fn display_reparses() {
        for line in ["LDR 1,2,10,1", "LDX 2,7", "JSR 0,31,1", "RFS 4", "SRC 1,4,1,0", "HLT"] {
            let word = encode_line(line).unwrap();
            let text = decode(word).unwrap().to_string();
            assert_eq!(text, line);
            assert_eq!(encode_line(&text).unwrap(), word);
        }
    }

    #[test]
    fn octal_helpers() {
        assert_eq!(to_octal(16u16, 6), "000020");
        assert_eq!(to_octal(u16::MAX, 6), "177777");
        assert_eq!(parse_octal("000020"), Ok(16));
        assert!(parse_octal("8").is_err());
    }
}
