//! Character devices attached to the I/O instructions.

use std::collections::VecDeque;
use std::fmt;

pub const KEYBOARD: u8 = 0;
pub const PRINTER: u8 = 1;
pub const CARD_READER: u8 = 2;

/// Device 0. Characters queue up until an `IN` consumes them.
#[derive(Debug, Default)]
pub struct Keyboard {
    pending: VecDeque<char>,
}

impl Keyboard {
    pub fn try_read_char(&mut self) -> Option<char> {
        self.pending.pop_front()
    }

    pub fn push(&mut self, ch: char) {
        self.pending.push_back(ch);
    }

    pub fn push_str(&mut self, text: &str) {
        self.pending.extend(text.chars());
    }

    pub fn is_ready(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// Device 1. Keeps everything printed and forwards each character to an optional sink.
#[derive(Default)]
pub struct Printer {
    output: String,
    sink: Option<Box<dyn FnMut(char)>>,
}

impl Printer {
    pub fn print(&mut self, ch: char) {
        self.output.push(ch);
        if let Some(sink) = &mut self.sink {
            sink(ch);
        }
    }

    pub fn set_sink(&mut self, sink: impl FnMut(char) + 'static) {
        self.sink = Some(Box::new(sink));
    }

    pub fn output(&self) -> &str {
        &self.output
    }
}

impl fmt::Debug for Printer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Printer")
            .field("output", &self.output)
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

/// Device 2. A deck read one character at a time.
#[derive(Debug, Default)]
pub struct CardReader {
    deck: VecDeque<char>,
}

impl CardReader {
    pub fn load(&mut self, text: &str) {
        self.deck.extend(text.chars());
    }

    pub fn read(&mut self) -> Option<char> {
        self.deck.pop_front()
    }

    pub fn is_ready(&self) -> bool {
        !self.deck.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct Devices {
    pub keyboard: Keyboard,
    pub printer: Printer,
    pub card_reader: CardReader,
}

impl Devices {
    /// Status reported by `CHK`. Unknown devices are never ready.
    pub fn is_ready(&self, device: u8) -> bool {
        match device {
            KEYBOARD => self.keyboard.is_ready(),
            PRINTER => true,
            CARD_READER => self.card_reader.is_ready(),
            _ => false,
        }
    }
}
