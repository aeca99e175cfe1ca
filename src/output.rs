use std::cell::RefCell;
use std::io::{stdout, Write};

use colored::{ColoredString, Colorize};

use crate::cache::CacheLine;
use crate::encoder::{to_octal, WORD_DIGITS};
use crate::registers::RegisterFile;
use crate::trace::{Event, Trace};

thread_local! {
    static IS_LINE_START: RefCell<bool> = const { RefCell::new(true) };
    static IS_MINIMAL: RefCell<bool> = const { RefCell::new(false) };
}

/// Minimal output drops colour and box drawing, for black-box tests.
pub fn set_minimal(new_value: bool) -> bool {
    if new_value {
        colored::control::set_override(false);
    }
    IS_MINIMAL.with(|value| value.replace(new_value))
}

pub fn is_minimal() -> bool {
    IS_MINIMAL.with(|value| *value.borrow())
}

fn set_line_start(new_value: bool) -> bool {
    IS_LINE_START.with(|value| value.replace(new_value))
}

fn is_line_start() -> bool {
    IS_LINE_START.with(|value| *value.borrow())
}

/// Printer output goes to stdout unchanged.
pub fn print_char(ch: char) {
    print!("{}", ch);
    let _ = stdout().flush();
    set_line_start(ch == '\n');
}

/// End a partial line of printer output before anything else is written.
pub fn start_new_line() {
    if !is_line_start() {
        print_char('\n');
    }
}

pub fn print_registers(regs: &RegisterFile) {
    let rows = (0..4)
        .map(|i| (format!("R{i}"), regs.r[i]))
        .chain((1..4).map(|i| (format!("X{i}"), regs.x[i])));

    if is_minimal() {
        for (name, value) in rows {
            eprintln!("{} {}", name, octal(value));
        }
        for (name, value) in [("PC", regs.pc), ("MAR", regs.mar), ("MBR", regs.mbr), ("IR", regs.ir)] {
            eprintln!("{} {}", name, octal(value));
        }
        eprintln!("CC {:04b}", regs.cc.bits());
        return;
    }

    let bar = "─".repeat(33);
    eprintln!("{}", format!("┌{bar}┐").dimmed());
    eprintln!(
        "{} {:<31} {}",
        "│".dimmed(),
        "     octal     int   uint  char".italic(),
        "│".dimmed()
    );
    for (name, value) in rows {
        eprintln!(
            "{} {:<3} {}  {:>6}  {:>5}  {}  {}",
            "│".dimmed(),
            name.bold(),
            octal(value),
            value as i16,
            value,
            char_display(value),
            "│".dimmed()
        );
    }
    eprintln!(
        "{} {:<3} {}      {:<3} {}      {}",
        "│".dimmed(),
        "PC".bold(),
        octal(regs.pc),
        "MAR".bold(),
        octal(regs.mar),
        "│".dimmed()
    );
    eprintln!(
        "{} {:<3} {}      {:<3} {}      {}",
        "│".dimmed(),
        "MBR".bold(),
        octal(regs.mbr),
        "IR".bold(),
        octal(regs.ir),
        "│".dimmed()
    );
    eprintln!(
        "{} {:<3} {:04b}                        {}",
        "│".dimmed(),
        "CC".bold(),
        regs.cc.bits(),
        "│".dimmed()
    );
    eprintln!("{}", format!("└{bar}┘").dimmed());
}

/// Oldest line first.
pub fn print_cache(lines: &[CacheLine]) {
    for (i, line) in lines.iter().enumerate() {
        if is_minimal() {
            eprintln!("{} {}", octal(line.address), octal(line.value));
        } else {
            eprintln!(
                "{:>12} {} {}",
                format!("#{i}").dimmed(),
                octal(line.address),
                octal(line.value)
            );
        }
    }
}

fn octal(value: u16) -> String {
    to_octal(value, WORD_DIGITS)
}

/// Three columns wide.
fn char_display(value: u16) -> ColoredString {
    match value {
        // ASCII control characters which are arbitrarily considered significant
        0x00 => "NUL".into(),
        0x08 => "BS ".into(),
        0x09 => "HT ".into(),
        0x0a => "LF ".into(),
        0x0d => "CR ".into(),
        0x1b => "ESC".into(),
        0x7f => "DEL".into(),

        0x20 => "[_]".into(),
        0x21..=0x7e => format!("{:<3}", value as u8 as char).into(),

        // Unimportant control characters
        0x00..=0x7f => "───".dimmed(),
        0x0080.. => "┄┄┄".dimmed(),
    }
}

/// Writes every machine event to stderr as a status line.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleTrace;

impl Trace for ConsoleTrace {
    fn event(&mut self, event: &Event) {
        let (left, right) = match event {
            Event::Fetch { pc, word } => ("Fetch".cyan(), format!("{} {}", octal(*pc), octal(*word))),
            Event::Decode { instruction } => ("Decode".cyan(), instruction.to_string()),
            Event::Execute {
                instruction,
                effective_address: Some(ea),
            } => (
                "Execute".green(),
                format!("{} (EA {})", instruction, octal(*ea)),
            ),
            Event::Execute { instruction, .. } => ("Execute".green(), instruction.to_string()),
            Event::CacheHit { address } => ("Cache hit".blue(), octal(*address)),
            Event::CacheMiss { address } => ("Cache miss".yellow(), octal(*address)),
            Event::CacheEvict { line } => (
                "Evict".yellow(),
                format!("{} {}", octal(line.address), octal(line.value)),
            ),
            Event::MemoryWrite { address, value } => {
                ("Write".blue(), format!("{} {}", octal(*address), octal(*value)))
            }
            Event::Output { device, ch } => {
                ("Output".green(), format!("{:?} to device {}", ch, device))
            }
            Event::AwaitInput { register } => {
                ("Waiting".yellow(), format!("for input into R{register}"))
            }
            Event::Halt { pc } => ("Halted".cyan(), format!("with PC {}", octal(*pc))),
            Event::Fault { fault } => ("Fault".red(), fault.to_string()),
        };
        start_new_line();
        eprintln!("{left:>12} {right}");
    }
}
