//! Two-pass assembler.
//!
//! Source grammar, one statement per line:
//!
//! ```text
//! [label:] (LOC <address> | Data <value-or-label> | <mnemonic> <operands>) [; comment]
//! ```
//!
//! The first pass assigns every label the location of its statement. The second pass resolves
//! label operands, encodes each statement and produces the listing and load output. Nothing is
//! produced unless the whole source assembles.

use std::error::Error;
use std::fmt;

use crate::encoder::{self, to_octal, EncodeError, Instruction, WORD_DIGITS};
use crate::memory::MEMORY_SIZE;
use crate::symbol::{Span, SymbolTable};

/// Assembler state for one run. Reset at the start of every [`Assembler::assemble`].
#[derive(Debug, Default)]
pub struct Assembler {
    symbols: SymbolTable,
    location: u16,
}

impl Assembler {
    pub fn new() -> Self {
        Assembler {
            symbols: SymbolTable::new(),
            location: 0,
        }
    }

    pub fn assemble(&mut self, src: &str) -> Result<Assembly, AsmError> {
        let lines = SourceLine::split(src);
        self.first_pass(&lines)?;
        self.second_pass(&lines)
    }

    /// Labels defined by the last run.
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    fn first_pass(&mut self, lines: &[SourceLine]) -> Result<(), AsmError> {
        self.symbols.clear();
        self.location = 0;

        for line in lines {
            let Some(parsed) = line.parse(self.location)? else {
                continue;
            };
            if let Some(label) = parsed.label {
                if let Err(first) = self.symbols.insert(label, self.location, line.number) {
                    return Err(line.error(
                        AsmErrorKind::DuplicateLabel {
                            name: label.to_string(),
                            first_line: first.line,
                        },
                        label,
                        self.location,
                    ));
                }
            }
            match parsed.statement {
                Statement::Loc(address) => self.location = address,
                Statement::Data(_) | Statement::Instruction { .. } => {
                    self.advance(line)?;
                }
            }
        }
        Ok(())
    }

    fn second_pass(&mut self, lines: &[SourceLine]) -> Result<Assembly, AsmError> {
        self.location = 0;
        let mut listing = Vec::new();
        let mut load = Vec::new();

        for line in lines {
            let Some(parsed) = line.parse(self.location)? else {
                continue;
            };
            let (word, kind) = match parsed.statement {
                Statement::Loc(address) => {
                    self.location = address;
                    listing.push(ListingLine {
                        location: None,
                        word: None,
                        source: line.trimmed().to_string(),
                        kind: LineKind::Loc,
                    });
                    continue;
                }
                Statement::Data(operand) => (self.data_value(line, operand)?, LineKind::Data),
                Statement::Instruction { mnemonic, operands } => (
                    self.instruction_word(line, mnemonic, &operands)?,
                    LineKind::Instruction,
                ),
            };

            let location = self.advance(line)?;
            listing.push(ListingLine {
                location: Some(location),
                word: Some(word),
                source: line.trimmed().to_string(),
                kind,
            });
            load.push(LoadLine {
                address: location,
                word,
            });
        }

        Ok(Assembly {
            symbols: self.symbols.clone(),
            listing,
            load,
        })
    }

    /// Claim the current location for a word and move past it.
    fn advance(&mut self, line: &SourceLine) -> Result<u16, AsmError> {
        let here = self.location;
        if here as usize >= MEMORY_SIZE {
            return Err(line.error(
                AsmErrorKind::AddressOutOfRange {
                    address: here as u32,
                },
                line.trimmed(),
                here,
            ));
        }
        self.location += 1;
        Ok(here)
    }

    fn data_value(&self, line: &SourceLine, operand: &str) -> Result<u16, AsmError> {
        if let Some(address) = self.symbols.get(operand) {
            return Ok(address);
        }
        match operand.parse::<i64>() {
            // Negative values are stored as two's complement
            Ok(value) if (-(1 << 15)..=u16::MAX as i64).contains(&value) => Ok(value as u16),
            _ => Err(self.bad_operand(line, operand)),
        }
    }

    fn instruction_word(
        &self,
        line: &SourceLine,
        mnemonic: &str,
        operands: &[&str],
    ) -> Result<u16, AsmError> {
        let values = operands
            .iter()
            .map(|&token| match self.symbols.get(token) {
                Some(address) => Ok(address as i64),
                None => token
                    .parse::<i64>()
                    .map_err(|_| self.bad_operand(line, token)),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Instruction::parse(mnemonic, &values)
            .map(|instr| instr.encode())
            .map_err(|err| {
                let part = match err {
                    EncodeError::UnknownOpcode { .. } => mnemonic,
                    _ => line.code().trim(),
                };
                line.error(AsmErrorKind::Encode(err), part, self.location)
            })
    }

    fn bad_operand(&self, line: &SourceLine, token: &str) -> AsmError {
        let kind = if is_label(token) {
            AsmErrorKind::UndefinedLabel {
                name: token.to_string(),
            }
        } else {
            AsmErrorKind::InvalidNumber {
                token: token.to_string(),
            }
        };
        line.error(kind, token, self.location)
    }
}

/// Assemble `src` with a fresh [`Assembler`].
pub fn assemble(src: &str) -> Result<Assembly, AsmError> {
    Assembler::new().assemble(src)
}

/// Output of a successful assembly.
#[derive(Clone, Debug)]
pub struct Assembly {
    pub symbols: SymbolTable,
    pub listing: Vec<ListingLine>,
    pub load: Vec<LoadLine>,
}

impl Assembly {
    /// One line per `LOC`, `Data` and instruction statement.
    pub fn listing_text(&self) -> String {
        self.listing.iter().map(|line| format!("{line}\n")).collect()
    }

    pub fn load_text(&self) -> String {
        self.load.iter().map(|line| format!("{line}\n")).collect()
    }

    /// `(address, word)` pairs in source order.
    pub fn image(&self) -> Vec<(u16, u16)> {
        self.load.iter().map(|line| (line.address, line.word)).collect()
    }

    /// Location of the first instruction, if any.
    pub fn entry_point(&self) -> Option<u16> {
        self.listing
            .iter()
            .find(|line| line.kind == LineKind::Instruction)
            .and_then(|line| line.location)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LineKind {
    Loc,
    Data,
    Instruction,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ListingLine {
    /// `None` for `LOC`, which emits no word.
    pub location: Option<u16>,
    pub word: Option<u16>,
    /// Trimmed source line, comment included.
    pub source: String,
    pub kind: LineKind,
}

impl fmt::Display for ListingLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.location, self.word) {
            (Some(location), Some(word)) => write!(
                f,
                "{} {} {}",
                to_octal(location, WORD_DIGITS),
                to_octal(word, WORD_DIGITS),
                self.source
            ),
            _ => f.write_str(&self.source),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct LoadLine {
    pub address: u16,
    pub word: u16,
}

impl fmt::Display for LoadLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}",
            to_octal(self.address, WORD_DIGITS),
            to_octal(self.word, WORD_DIGITS)
        )
    }
}

struct ParsedLine<'a> {
    label: Option<&'a str>,
    statement: Statement<'a>,
}

enum Statement<'a> {
    Loc(u16),
    Data(&'a str),
    Instruction {
        mnemonic: &'a str,
        operands: Vec<&'a str>,
    },
}

struct SourceLine<'a> {
    /// 1-based
    number: usize,
    /// Byte offset of the line in the whole source
    offs: usize,
    text: &'a str,
}

impl<'a> SourceLine<'a> {
    fn split(src: &'a str) -> Vec<Self> {
        let mut offs = 0;
        src.split('\n')
            .enumerate()
            .map(|(i, raw)| {
                let line = SourceLine {
                    number: i + 1,
                    offs,
                    text: raw.strip_suffix('\r').unwrap_or(raw),
                };
                offs += raw.len() + 1;
                line
            })
            .collect()
    }

    fn trimmed(&self) -> &'a str {
        self.text.trim()
    }

    /// Line without its comment.
    fn code(&self) -> &'a str {
        match self.text.find(';') {
            Some(i) => &self.text[..i],
            None => self.text,
        }
    }

    /// `None` for blank and comment-only lines.
    fn parse(&self, location: u16) -> Result<Option<ParsedLine<'a>>, AsmError> {
        let code = self.code();
        let (label, body) = match code.find(':') {
            Some(colon) => (Some(code[..colon].trim()), code[colon + 1..].trim()),
            None => (None, code.trim()),
        };

        if let Some(label) = label {
            if !is_label(label) {
                let kind = AsmErrorKind::InvalidLabel {
                    name: label.to_string(),
                };
                return Err(self.error(kind, label, location));
            }
            if body.is_empty() {
                let kind = AsmErrorKind::LabelWithoutStatement {
                    name: label.to_string(),
                };
                return Err(self.error(kind, label, location));
            }
        }

        let mut tokens = encoder::tokens(body);
        let Some(first) = tokens.next() else {
            if body.is_empty() {
                return Ok(None);
            }
            return Err(self.error(AsmErrorKind::Encode(EncodeError::Empty), body, location));
        };
        let operands: Vec<&'a str> = tokens.collect();

        let statement = if first.eq_ignore_ascii_case("LOC") {
            let operand = self.single_operand("LOC", first, &operands, location)?;
            let address = operand
                .parse::<u32>()
                .map_err(|_| {
                    let kind = AsmErrorKind::InvalidNumber {
                        token: operand.to_string(),
                    };
                    self.error(kind, operand, location)
                })?;
            if address as usize >= MEMORY_SIZE {
                return Err(self.error(AsmErrorKind::AddressOutOfRange { address }, operand, location));
            }
            Statement::Loc(address as u16)
        } else if first.eq_ignore_ascii_case("DATA") {
            Statement::Data(self.single_operand("Data", first, &operands, location)?)
        } else {
            Statement::Instruction {
                mnemonic: first,
                operands,
            }
        };

        Ok(Some(ParsedLine { label, statement }))
    }

    fn single_operand(
        &self,
        directive: &'static str,
        token: &'a str,
        operands: &[&'a str],
        location: u16,
    ) -> Result<&'a str, AsmError> {
        match operands {
            [operand] => Ok(*operand),
            [] => Err(self.error(AsmErrorKind::MissingOperand { directive }, token, location)),
            [_, extra, ..] => {
                let kind = AsmErrorKind::UnexpectedOperand {
                    token: extra.to_string(),
                };
                Err(self.error(kind, extra, location))
            }
        }
    }

    /// Span of `part`, which must be a slice of this line.
    fn span_of(&self, part: &str) -> Span {
        let start = part.as_ptr() as usize - self.text.as_ptr() as usize;
        if part.is_empty() {
            let trimmed = self.trimmed();
            let start = trimmed.as_ptr() as usize - self.text.as_ptr() as usize;
            return Span::new(self.offs + start, trimmed.len());
        }
        Span::new(self.offs + start, part.len())
    }

    fn error(&self, kind: AsmErrorKind, part: &str, location: u16) -> AsmError {
        AsmError {
            kind,
            line: self.number,
            location,
            text: self.trimmed().to_string(),
            span: self.span_of(part),
        }
    }
}

/// Identifier that is not a bare number.
fn is_label(token: &str) -> bool {
    let mut chars = token.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// An assembly failure with enough context to point at the offending source.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AsmError {
    pub kind: AsmErrorKind,
    /// 1-based source line
    pub line: usize,
    /// Location counter when the error was found
    pub location: u16,
    /// Trimmed source line
    pub text: String,
    /// Offending text, as byte offsets into the whole source
    pub span: Span,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum AsmErrorKind {
    MissingOperand { directive: &'static str },
    UnexpectedOperand { token: String },
    InvalidNumber { token: String },
    UndefinedLabel { name: String },
    DuplicateLabel { name: String, first_line: usize },
    InvalidLabel { name: String },
    LabelWithoutStatement { name: String },
    AddressOutOfRange { address: u32 },
    Encode(EncodeError),
}

impl AsmErrorKind {
    /// Diagnostic code.
    pub fn code(&self) -> &'static str {
        match self {
            AsmErrorKind::MissingOperand { .. } => "asm::missing_operand",
            AsmErrorKind::UnexpectedOperand { .. } => "asm::unexpected_operand",
            AsmErrorKind::InvalidNumber { .. } => "asm::bad_number",
            AsmErrorKind::UndefinedLabel { .. } => "asm::undefined_label",
            AsmErrorKind::DuplicateLabel { .. } => "asm::duplicate_label",
            AsmErrorKind::InvalidLabel { .. } => "asm::bad_label",
            AsmErrorKind::LabelWithoutStatement { .. } => "asm::lone_label",
            AsmErrorKind::AddressOutOfRange { .. } => "asm::address_range",
            AsmErrorKind::Encode(EncodeError::UnknownOpcode { .. }) => "encode::unknown_opcode",
            AsmErrorKind::Encode(_) => "encode::operands",
        }
    }

    pub fn help(&self) -> String {
        match self {
            AsmErrorKind::MissingOperand { directive } => {
                format!("{directive} takes exactly one operand")
            }
            AsmErrorKind::UnexpectedOperand { .. } => {
                "directives take exactly one operand".to_string()
            }
            AsmErrorKind::InvalidNumber { .. } => {
                "numbers are decimal; Data accepts -32768 to 65535".to_string()
            }
            AsmErrorKind::UndefinedLabel { .. } => {
                "labels are defined with `NAME:` at the start of a line".to_string()
            }
            AsmErrorKind::DuplicateLabel { first_line, .. } => {
                format!("rename one of the labels; the first is on line {first_line}")
            }
            AsmErrorKind::InvalidLabel { .. } => {
                "labels start with a letter or `_` and contain only letters, digits and `_`"
                    .to_string()
            }
            AsmErrorKind::LabelWithoutStatement { .. } => {
                "put an instruction or directive after the label on the same line".to_string()
            }
            AsmErrorKind::AddressOutOfRange { .. } => format!(
                "memory holds {} words; use a LOC between 0 and {}",
                MEMORY_SIZE,
                MEMORY_SIZE - 1
            ),
            AsmErrorKind::Encode(EncodeError::MalformedOperands { mnemonic, usage, .. }) => {
                format!("usage: {mnemonic} {usage}")
            }
            AsmErrorKind::Encode(_) => "check the list of available instructions".to_string(),
        }
    }
}

impl Error for AsmError {}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let location = to_octal(self.location, WORD_DIGITS);
        match &self.kind {
            AsmErrorKind::Encode(err) => write!(
                f,
                "Error encoding instruction at location {}: {} - {}",
                location, self.text, err
            ),
            kind => write!(
                f,
                "Error at location {} (line {}): {} - {}",
                location, self.line, self.text, kind
            ),
        }
    }
}

impl fmt::Display for AsmErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AsmErrorKind::MissingOperand { directive } => {
                write!(f, "{} directive requires an operand", directive)
            }
            AsmErrorKind::UnexpectedOperand { token } => write!(f, "Unexpected operand `{}`", token),
            AsmErrorKind::InvalidNumber { token } => write!(f, "Invalid number `{}`", token),
            AsmErrorKind::UndefinedLabel { name } => write!(f, "Undefined label `{}`", name),
            AsmErrorKind::DuplicateLabel { name, first_line } => write!(
                f,
                "Label `{}` is already defined on line {}",
                name, first_line
            ),
            AsmErrorKind::InvalidLabel { name } => write!(f, "Invalid label `{}`", name),
            AsmErrorKind::LabelWithoutStatement { name } => {
                write!(f, "Label `{}` is not followed by a statement", name)
            }
            AsmErrorKind::AddressOutOfRange { address } => {
                write!(f, "Location {} is outside of memory", to_octal(*address, WORD_DIGITS))
            }
            AsmErrorKind::Encode(err) => write!(f, "{}", err),
        }
    }
}
