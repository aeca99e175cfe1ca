use miette::{miette, LabeledSpan, Report, Severity};

use crate::assembler::{AsmError, AsmErrorKind};
use crate::computer::Fault;
use crate::encoder::{to_octal, EncodeError, WORD_DIGITS};
use crate::loader::{LoadError, LoadErrorKind};
use crate::registers::RegisterFile;
use crate::symbol::Span;

// Assembler errors

pub fn asm_report(err: &AsmError, src: &str) -> Report {
    let label = match &err.kind {
        AsmErrorKind::MissingOperand { .. } => "missing operand",
        AsmErrorKind::UnexpectedOperand { .. } => "unexpected operand",
        AsmErrorKind::InvalidNumber { .. } => "incorrect literal",
        AsmErrorKind::UndefinedLabel { .. } => "undefined label",
        AsmErrorKind::DuplicateLabel { .. } => "duplicate label",
        AsmErrorKind::InvalidLabel { .. } => "invalid label",
        AsmErrorKind::LabelWithoutStatement { .. } => "lone label",
        AsmErrorKind::AddressOutOfRange { .. } => "outside of memory",
        AsmErrorKind::Encode(EncodeError::UnknownOpcode { .. }) => "unknown mnemonic",
        AsmErrorKind::Encode(_) => "incorrect operands",
    };
    miette!(
        severity = Severity::Error,
        code = err.kind.code(),
        help = err.kind.help(),
        labels = labels(err.span, label),
        "{} (location {})",
        err.kind,
        to_octal(err.location, WORD_DIGITS),
    )
    .with_source_code(src.to_owned())
}

// Loader errors

pub fn load_report(err: &LoadError, src: &str) -> Report {
    let (code, help, label) = match &err.kind {
        LoadErrorKind::MissingWord => (
            "load::missing_word",
            "each line holds an octal address followed by an octal word",
            "incomplete line",
        ),
        LoadErrorKind::InvalidOctal { .. } => (
            "load::bad_octal",
            "values are octal, from 000000 to 177777",
            "not octal",
        ),
        LoadErrorKind::AddressOutOfRange { .. } => (
            "load::address_range",
            "addresses run from 000000 to 003777",
            "outside of memory",
        ),
    };
    miette!(
        severity = Severity::Error,
        code = code,
        help = help,
        labels = labels(err.span, label),
        "Invalid load file line {}",
        err.line,
    )
    .with_source_code(src.to_owned())
}

/// Nothing to point at for an empty span.
fn labels(span: Span, label: &str) -> Vec<LabeledSpan> {
    if span.is_empty() {
        return Vec::new();
    }
    vec![LabeledSpan::at(span, label)]
}

// Machine faults

pub fn fault_report(fault: &Fault, regs: &RegisterFile) -> Report {
    let (code, help) = match fault {
        Fault::UnknownOpcode { .. } => (
            "run::unknown_opcode",
            "the machine fetched a word that is not an instruction; check jumps and data placement",
        ),
        Fault::InvalidIndexRegister { .. } => (
            "run::index_register",
            "LDX and STX name an index register with IX, which must be 1, 2 or 3",
        ),
        Fault::InvalidRegisterPair { .. } => (
            "run::register_pair",
            "MLT and DVD write a register pair, so rx and ry must be R0 or R2",
        ),
        Fault::UnimplementedTrap { .. } => (
            "run::trap",
            "this machine has no trap table",
        ),
        Fault::Memory(_) => (
            "run::address_range",
            "effective addresses must stay within 000000 to 003777",
        ),
    };
    miette!(
        severity = Severity::Error,
        code = code,
        help = help,
        "Machine halted at {}: {}",
        to_octal(regs.mar, WORD_DIGITS),
        fault,
    )
}
