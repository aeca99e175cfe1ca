//! The execution engine: fetch, decode and execute against the cache.

use std::error::Error;
use std::fmt;

use crate::cache::{Access, Cache, CacheLine};
use crate::devices::{Devices, CARD_READER, KEYBOARD, PRINTER};
use crate::encoder::{to_octal, DecodeError, Instruction, Operands};
use crate::isa::Opcode;
use crate::memory::{Memory, MemoryError};
use crate::registers::{ConditionCode, RegisterFile, RegisterName};
use crate::trace::{Event, NoopTrace, Trace};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum State {
    Running,
    Halted,
    /// `IN` from the keyboard found nothing to read. Holds the target register.
    AwaitingInput(u8),
}

/// A run-time error. The machine halts and stays inspectable.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Fault {
    UnknownOpcode { code: u8 },
    /// `LDX`/`STX` with IX 0.
    InvalidIndexRegister { op: Opcode },
    /// `MLT`/`DVD` with a register other than R0 or R2.
    InvalidRegisterPair { op: Opcode, rx: u8, ry: u8 },
    UnimplementedTrap { code: u8 },
    Memory(MemoryError),
}

impl From<MemoryError> for Fault {
    fn from(value: MemoryError) -> Self {
        Fault::Memory(value)
    }
}

impl Error for Fault {}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::UnknownOpcode { code } => write!(f, "Unknown opcode {}", to_octal(*code, 2)),
            Fault::InvalidIndexRegister { op } => {
                write!(f, "{} requires an index register between 1 and 3", op)
            }
            Fault::InvalidRegisterPair { op, rx, ry } => write!(
                f,
                "{} requires rx and ry to be 0 or 2, found {} and {}",
                op, rx, ry
            ),
            Fault::UnimplementedTrap { code } => write!(f, "Trap {} is not implemented", code),
            Fault::Memory(err) => write!(f, "{}", err),
        }
    }
}

/// Instruction fields flattened for dispatch.
#[derive(Clone, Copy, Default)]
struct Fields {
    r: u8,
    ix: u8,
    /// Address, immediate, device, code or count, depending on format
    value: u8,
    left: bool,
    logical: bool,
}

impl From<Operands> for Fields {
    fn from(operands: Operands) -> Self {
        let mut fields = Fields::default();
        match operands {
            Operands::None => {}
            Operands::Code(code) => fields.value = code,
            Operands::Indexed { r, ix, address, .. } => {
                fields.r = r;
                fields.ix = ix;
                fields.value = address;
            }
            Operands::Immediate { r, value } => {
                fields.r = r;
                fields.value = value;
            }
            Operands::Pair { rx, ry } => {
                fields.r = rx;
                fields.ix = ry;
            }
            Operands::Single { rx } => fields.r = rx,
            Operands::Shift {
                r,
                count,
                left,
                logical,
            } => {
                fields.r = r;
                fields.value = count;
                fields.left = left;
                fields.logical = logical;
            }
            Operands::Device { r, device } => {
                fields.r = r;
                fields.value = device;
            }
        }
        fields
    }
}

/// Registers, cache (and through it memory) and devices, driven one instruction at a time.
pub struct Computer<T: Trace = NoopTrace> {
    regs: RegisterFile,
    cache: Cache,
    devices: Devices,
    state: State,
    fault: Option<Fault>,
    steps: u64,
    trace: T,
}

impl Computer<NoopTrace> {
    pub fn new() -> Self {
        Self::with_trace(NoopTrace)
    }
}

impl Default for Computer<NoopTrace> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Trace> Computer<T> {
    /// Halted with empty memory until [`Computer::ipl`].
    pub fn with_trace(trace: T) -> Self {
        Computer {
            regs: RegisterFile::new(),
            cache: Cache::new(Memory::new()),
            devices: Devices::default(),
            state: State::Halted,
            fault: None,
            steps: 0,
            trace,
        }
    }

    /// Initial program load.
    ///
    /// Clears registers, cache and memory, writes `image` straight into memory and starts at
    /// `start`. Pending keyboard input and the card deck are kept.
    pub fn ipl(&mut self, image: &[(u16, u16)], start: u16) -> Result<(), MemoryError> {
        self.regs.reset();
        self.cache.reset();
        self.cache.memory_mut().reset();
        self.fault = None;
        self.steps = 0;
        self.state = State::Halted;

        self.cache.memory_mut().load(image)?;
        self.regs.pc = start;
        self.state = State::Running;
        Ok(())
    }

    /// Execute one instruction. Does nothing unless the machine is running.
    pub fn single_step(&mut self) -> State {
        if self.state != State::Running {
            return self.state;
        }
        self.steps += 1;
        if let Err(fault) = self.step() {
            self.fail(fault);
        }
        self.state
    }

    /// Step until halted or waiting for input.
    pub fn run(&mut self) -> State {
        while self.single_step() == State::Running {}
        self.state
    }

    /// Like [`Computer::run`], but gives up after `max_steps` instructions.
    pub fn run_limited(&mut self, max_steps: u64) -> State {
        for _ in 0..max_steps {
            if self.single_step() != State::Running {
                break;
            }
        }
        self.state
    }

    /// Deliver one keyboard character.
    ///
    /// If an `IN` is waiting, the character goes straight into its register and the machine
    /// moves past the `IN` and resumes `Running`. The caller decides when to step again.
    /// Otherwise the character is queued for a later `IN`.
    pub fn provide_input(&mut self, ch: char) {
        match self.state {
            State::AwaitingInput(r) => {
                self.regs.r[r as usize] = char_word(ch);
                self.regs.pc = self.regs.pc.wrapping_add(1);
                self.state = State::Running;
            }
            State::Running | State::Halted => self.devices.keyboard.push(ch),
        }
    }

    /// Called with every character sent to the printer.
    pub fn on_output(&mut self, sink: impl FnMut(char) + 'static) {
        self.devices.printer.set_sink(sink);
    }

    pub fn load_cards(&mut self, text: &str) {
        self.devices.card_reader.load(text);
    }

    // Front panel

    pub fn deposit(&mut self, name: RegisterName, value: u16) {
        self.regs.set(name, value);
    }

    /// MBR <- memory[MAR]
    pub fn load_memory(&mut self) -> Result<u16, MemoryError> {
        self.regs.mbr = self.read(self.regs.mar)?;
        Ok(self.regs.mbr)
    }

    pub fn load_memory_plus(&mut self) -> Result<u16, MemoryError> {
        let value = self.load_memory()?;
        self.regs.mar = self.regs.mar.wrapping_add(1);
        Ok(value)
    }

    /// memory[MAR] <- MBR
    pub fn store_memory(&mut self) -> Result<(), MemoryError> {
        self.write(self.regs.mar, self.regs.mbr)
    }

    pub fn store_memory_plus(&mut self) -> Result<(), MemoryError> {
        self.store_memory()?;
        self.regs.mar = self.regs.mar.wrapping_add(1);
        Ok(())
    }

    pub fn halt(&mut self) {
        self.stop();
    }

    pub fn cache_lines(&self) -> Vec<CacheLine> {
        self.cache.lines().copied().collect()
    }

    // Accessors

    pub fn state(&self) -> State {
        self.state
    }

    /// Why the machine halted, if it was not a `HLT`.
    pub fn fault(&self) -> Option<Fault> {
        self.fault
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.regs
    }

    pub fn memory(&self) -> &Memory {
        self.cache.memory()
    }

    pub fn devices(&self) -> &Devices {
        &self.devices
    }

    /// Everything printed since the last IPL.
    pub fn output(&self) -> &str {
        self.devices.printer.output()
    }

    /// Instructions started since the last IPL.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn trace(&self) -> &T {
        &self.trace
    }

    pub fn into_trace(self) -> T {
        self.trace
    }

    fn step(&mut self) -> Result<(), Fault> {
        // Fetch
        let pc = self.regs.pc;
        self.regs.mar = pc;
        let word = self.read(pc)?;
        self.regs.mbr = word;
        self.regs.ir = word;
        self.regs.pc = pc.wrapping_add(1);
        self.trace.event(&Event::Fetch { pc, word });

        // Decode
        let instruction = match Instruction::decode(word) {
            Ok(instruction) => instruction,
            Err(DecodeError::UnknownOpcode { code }) => return Err(Fault::UnknownOpcode { code }),
        };
        self.trace.event(&Event::Decode { instruction });

        // Execute
        let effective_address = self.effective_address(&instruction)?;
        self.trace.event(&Event::Execute {
            instruction,
            effective_address,
        });
        self.execute(
            instruction.op,
            Fields::from(instruction.operands),
            effective_address.unwrap_or(0),
        )
    }

    /// `address + X[ix]`, then one optional level of indirection.
    ///
    /// `LDX` and `STX` use IX to name the register they work on, so they are never indexed.
    fn effective_address(&mut self, instruction: &Instruction) -> Result<Option<u16>, Fault> {
        let Operands::Indexed {
            ix,
            indirect,
            address,
            ..
        } = instruction.operands
        else {
            return Ok(None);
        };

        let offset = match instruction.op {
            Opcode::Ldx | Opcode::Stx => 0,
            _ => self.regs.index(ix),
        };
        let mut ea = (address as u16).wrapping_add(offset);
        if indirect {
            ea = self.read(ea)?;
        }
        Ok(Some(ea))
    }

    fn execute(&mut self, op: Opcode, f: Fields, ea: u16) -> Result<(), Fault> {
        let r = f.r as usize;
        match op {
            Opcode::Hlt => self.stop(),

            // Load/store
            Opcode::Ldr => self.regs.r[r] = self.read(ea)?,
            Opcode::Str => self.write(ea, self.regs.r[r])?,
            Opcode::Lda => self.regs.r[r] = ea,
            Opcode::Ldx => {
                let ix = index_register(op, f.ix)?;
                self.regs.x[ix] = self.read(ea)?;
            }
            Opcode::Stx => {
                let ix = index_register(op, f.ix)?;
                self.write(ea, self.regs.x[ix])?;
            }

            // Transfer
            Opcode::Jz => self.branch_if(self.regs.r[r] == 0, ea),
            Opcode::Jne => self.branch_if(self.regs.r[r] != 0, ea),
            Opcode::Jcc => self.branch_if(self.regs.cc.test(f.r), ea),
            Opcode::Jma => self.regs.pc = ea,
            Opcode::Jsr => {
                self.regs.r[3] = self.regs.pc;
                self.regs.pc = ea;
            }
            Opcode::Rfs => {
                self.regs.r[0] = f.value as u16;
                self.regs.pc = self.regs.r[3];
            }
            Opcode::Sob => {
                let value = self.regs.r[r].wrapping_sub(1);
                self.regs.r[r] = value;
                self.branch_if(value as i16 > 0, ea);
            }
            Opcode::Jge => self.branch_if(self.regs.r[r] as i16 >= 0, ea),

            // Arithmetic
            Opcode::Amr => {
                let value = self.read(ea)?;
                self.regs.r[r] = self.regs.r[r].wrapping_add(value);
            }
            Opcode::Smr => {
                let value = self.read(ea)?;
                self.regs.r[r] = self.regs.r[r].wrapping_sub(value);
            }
            Opcode::Air => self.regs.r[r] = self.regs.r[r].wrapping_add(f.value as u16),
            Opcode::Sir => self.regs.r[r] = self.regs.r[r].wrapping_sub(f.value as u16),

            // Register to register
            Opcode::Mlt => self.multiply(f.r, f.ix)?,
            Opcode::Dvd => self.divide(f.r, f.ix)?,
            Opcode::Trr => {
                let equal = self.regs.r[r] == self.regs.r[f.ix as usize];
                self.regs.cc.set(ConditionCode::EQUAL, equal);
            }
            Opcode::And => self.regs.r[r] &= self.regs.r[f.ix as usize],
            Opcode::Orr => self.regs.r[r] |= self.regs.r[f.ix as usize],
            Opcode::Not => self.regs.r[r] = !self.regs.r[r],

            // Shift/rotate
            Opcode::Src => self.shift(r, f.value, f.left, f.logical),
            Opcode::Rrc => {
                let count = f.value as u32;
                self.regs.r[r] = if f.left {
                    self.regs.r[r].rotate_left(count)
                } else {
                    self.regs.r[r].rotate_right(count)
                };
            }

            // I/O
            Opcode::In => self.input(f.r, f.value),
            Opcode::Out => self.output_char(f.r, f.value),
            Opcode::Chk => self.regs.r[r] = self.devices.is_ready(f.value) as u16,

            Opcode::Trap => return Err(Fault::UnimplementedTrap { code: f.value }),
        }
        Ok(())
    }

    fn branch_if(&mut self, condition: bool, ea: u16) {
        if condition {
            self.regs.pc = ea;
        }
    }

    /// Signed 32-bit product, high half in `rx`, low half in `rx + 1`.
    fn multiply(&mut self, rx: u8, ry: u8) -> Result<(), Fault> {
        let (rx, ry) = register_pair(Opcode::Mlt, rx, ry)?;
        let product = self.regs.r[rx] as i16 as i32 * self.regs.r[ry] as i16 as i32;
        self.regs.r[rx] = (product >> 16) as u16;
        self.regs.r[rx + 1] = product as u16;
        if i16::try_from(product).is_err() {
            self.regs.cc |= ConditionCode::OVERFLOW;
        }
        Ok(())
    }

    /// Quotient in `rx`, remainder in `rx + 1`. A zero divisor only sets DIVZERO.
    fn divide(&mut self, rx: u8, ry: u8) -> Result<(), Fault> {
        let divisor = self.regs.r[ry as usize] as i16;
        if divisor == 0 {
            self.regs.cc |= ConditionCode::DIVZERO;
            return Ok(());
        }
        let (rx, _) = register_pair(Opcode::Dvd, rx, ry)?;
        let dividend = self.regs.r[rx] as i16;
        self.regs.r[rx] = dividend.wrapping_div(divisor) as u16;
        self.regs.r[rx + 1] = dividend.wrapping_rem(divisor) as u16;
        Ok(())
    }

    /// Bits shifted out to the left set OVERFLOW, to the right UNDERFLOW.
    fn shift(&mut self, r: usize, count: u8, left: bool, logical: bool) {
        if count == 0 {
            return;
        }
        let value = self.regs.r[r];
        let count = count as u32;
        let (result, lost, flag) = if left {
            (value << count, value >> (16 - count), ConditionCode::OVERFLOW)
        } else {
            let result = if logical {
                value >> count
            } else {
                ((value as i16) >> count) as u16
            };
            (result, value & ((1 << count) - 1), ConditionCode::UNDERFLOW)
        };
        self.regs.r[r] = result;
        if lost != 0 {
            self.regs.cc |= flag;
        }
    }

    fn input(&mut self, r: u8, device: u8) {
        match device {
            KEYBOARD => match self.devices.keyboard.try_read_char() {
                Some(ch) => self.regs.r[r as usize] = char_word(ch),
                None => {
                    // Retry this IN once input arrives
                    self.regs.pc = self.regs.pc.wrapping_sub(1);
                    self.state = State::AwaitingInput(r);
                    self.trace.event(&Event::AwaitInput { register: r });
                }
            },
            CARD_READER => {
                self.regs.r[r as usize] = self.devices.card_reader.read().map_or(0, char_word);
            }
            _ => {}
        }
    }

    fn output_char(&mut self, r: u8, device: u8) {
        if device != PRINTER {
            return;
        }
        let ch = (self.regs.r[r as usize] & 0xFF) as u8 as char;
        self.devices.printer.print(ch);
        self.trace.event(&Event::Output { device, ch });
    }

    fn read(&mut self, address: u16) -> Result<u16, MemoryError> {
        let (value, access) = self.cache.read_traced(address)?;
        match access {
            Access::Hit => self.trace.event(&Event::CacheHit { address }),
            Access::Miss { evicted } => {
                self.trace.event(&Event::CacheMiss { address });
                if let Some(line) = evicted {
                    self.trace.event(&Event::CacheEvict { line });
                }
            }
        }
        Ok(value)
    }

    fn write(&mut self, address: u16, value: u16) -> Result<(), MemoryError> {
        let evicted = self.cache.write(address, value)?;
        self.trace.event(&Event::MemoryWrite { address, value });
        if let Some(line) = evicted {
            self.trace.event(&Event::CacheEvict { line });
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.state = State::Halted;
        self.trace.event(&Event::Halt { pc: self.regs.pc });
    }

    fn fail(&mut self, fault: Fault) {
        self.state = State::Halted;
        self.fault = Some(fault);
        self.trace.event(&Event::Fault { fault });
    }
}

fn index_register(op: Opcode, ix: u8) -> Result<usize, Fault> {
    match ix {
        1..=3 => Ok(ix as usize),
        _ => Err(Fault::InvalidIndexRegister { op }),
    }
}

fn register_pair(op: Opcode, rx: u8, ry: u8) -> Result<(usize, usize), Fault> {
    match (rx, ry) {
        (0 | 2, 0 | 2) => Ok((rx as usize, ry as usize)),
        _ => Err(Fault::InvalidRegisterPair { op, rx, ry }),
    }
}

/// Low byte of a character, as read by `IN`.
fn char_word(ch: char) -> u16 {
    (ch as u32 & 0xFF) as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::assemble;
    use crate::encoder::encode_line;

    fn machine(src: &str) -> Computer {
        let asm = assemble(src).unwrap();
        let mut computer = Computer::new();
        computer
            .ipl(&asm.image(), asm.entry_point().unwrap_or(0))
            .unwrap();
        computer
    }

    fn word(line: &str) -> u16 {
        encode_line(line).unwrap()
    }

    #[test]
    fn effective_address() {
        let image = [
            (0, word("LDA 0,2,10")),
            (1, word("LDA 1,2,10,1")),
            (2, word("HLT")),
            (15, 42),
        ];
        let mut computer = Computer::new();
        computer.ipl(&image, 0).unwrap();
        computer.deposit(RegisterName::X(2), 5);

        assert_eq!(computer.run(), State::Halted);
        assert_eq!(computer.registers().r[0], 15);
        assert_eq!(computer.registers().r[1], 42);
        assert_eq!(computer.fault(), None);
    }

    #[test]
    fn fetch_updates_registers() {
        let mut computer = machine("LOC 6\nData 10\nData 3\nLDX 2,7\nHLT\n");
        assert_eq!(computer.registers().pc, 8);
        computer.deposit(RegisterName::X(2), 1);

        assert_eq!(computer.single_step(), State::Running);
        let regs = computer.registers();
        assert_eq!(regs.mar, 8);
        assert_eq!(regs.mbr, 0o102207);
        assert_eq!(regs.ir, 0o102207);
        assert_eq!(regs.pc, 9);
        // EA is 7, not 7 + X2
        assert_eq!(regs.x[2], 3);
    }

    #[test]
    fn ldx_indirect_ignores_index() {
        let mut computer = machine("LOC 6\nData 10\nP: Data 6\nLDX 2,P,1\nHLT\n");
        computer.deposit(RegisterName::X(2), 1);
        assert_eq!(computer.run(), State::Halted);
        // EA is M[7] = 6
        assert_eq!(computer.registers().x[2], 10);
    }

    #[test]
    fn indexing_applies_to_jumps() {
        let mut computer = machine("JMA 2,1\nHLT\nHLT\nHLT\nHLT\n");
        computer.deposit(RegisterName::X(2), 3);
        assert_eq!(computer.single_step(), State::Running);
        assert_eq!(computer.registers().pc, 4);
    }

    #[test]
    fn load_store() {
        let src = "LOC 6\nA: Data 9\nB: Data 0\nLDR 1,0,A\nAIR 1,1\nSTR 1,0,B\nSTX 1,B\nHLT\nData 0\n";
        let mut computer = machine(src);
        computer.deposit(RegisterName::X(1), 6);
        assert_eq!(computer.run(), State::Halted);
        assert_eq!(computer.registers().r[1], 10);
        // STX wrote X1 to B itself, not to B + X1
        assert_eq!(computer.memory().read(7), Ok(6));
        assert_eq!(computer.memory().read(13), Ok(0));
    }

    #[test]
    fn unknown_devices() {
        let mut computer = machine("IN 0,5\nOUT 0,7\nCHK 1,0\nCHK 2,0\nCHK 3,9\nHLT\n");
        computer.deposit(RegisterName::R(0), 0o101);
        computer.deposit(RegisterName::R(3), 7);

        computer.single_step();
        computer.single_step();
        assert_eq!(computer.state(), State::Running);
        assert_eq!(computer.registers().r[0], 0o101);
        assert_eq!(computer.registers().pc, 2);
        assert_eq!(computer.output(), "");

        computer.single_step();
        assert_eq!(computer.registers().r[1], 0);
        computer.provide_input('k');
        assert_eq!(computer.run(), State::Halted);
        assert_eq!(computer.registers().r[2], 1);
        assert_eq!(computer.registers().r[3], 0);
        assert_eq!(computer.fault(), None);
    }

    #[test]
    fn multiply() {
        let mut computer = machine("MLT 0,2\nHLT\n");
        computer.deposit(RegisterName::R(0), 3);
        computer.deposit(RegisterName::R(2), 4);
        computer.run();
        assert_eq!(computer.registers().r[0], 0);
        assert_eq!(computer.registers().r[1], 12);
        assert!(!computer.registers().cc.contains(ConditionCode::OVERFLOW));

        let mut computer = machine("MLT 0,2\nHLT\n");
        computer.deposit(RegisterName::R(0), 300);
        computer.deposit(RegisterName::R(2), 300);
        computer.run();
        assert_eq!(computer.registers().r[0], 1);
        assert_eq!(computer.registers().r[1], (90000 & 0xFFFF) as u16);
        assert!(computer.registers().cc.contains(ConditionCode::OVERFLOW));
    }

    #[test]
    fn multiply_negative() {
        let mut computer = machine("MLT 2,0\nHLT\n");
        computer.deposit(RegisterName::R(2), (-3i16) as u16);
        computer.deposit(RegisterName::R(0), 5);
        computer.run();
        assert_eq!(computer.registers().r[2], 0xFFFF);
        assert_eq!(computer.registers().r[3] as i16, -15);
    }

    #[test]
    fn divide() {
        let mut computer = machine("DVD 0,2\nHLT\n");
        computer.deposit(RegisterName::R(0), (-7i16) as u16);
        computer.deposit(RegisterName::R(2), 2);
        computer.run();
        assert_eq!(computer.registers().r[0] as i16, -3);
        assert_eq!(computer.registers().r[1] as i16, -1);
        assert!(computer.registers().cc.is_empty());
    }

    #[test]
    fn divide_by_zero() {
        let mut computer = machine("DVD 0,2\nHLT\n");
        computer.deposit(RegisterName::R(0), 7);
        computer.deposit(RegisterName::R(1), 9);
        computer.run();
        assert_eq!(computer.state(), State::Halted);
        assert_eq!(computer.fault(), None);
        assert!(computer.registers().cc.contains(ConditionCode::DIVZERO));
        assert_eq!(computer.registers().r[0], 7);
        assert_eq!(computer.registers().r[1], 9);
    }

    #[test]
    fn invalid_register_pair() {
        let mut computer = machine("MLT 1,2\nHLT\n");
        assert_eq!(computer.run(), State::Halted);
        assert_eq!(
            computer.fault(),
            Some(Fault::InvalidRegisterPair {
                op: Opcode::Mlt,
                rx: 1,
                ry: 2
            })
        );
    }

    #[test]
    fn compare_and_branch_on_condition() {
        let mut computer = machine("TRR 0,1\nJCC 3,0,EQ\nHLT\nEQ: AIR 2,1\nHLT\n");
        computer.run();
        assert_eq!(computer.registers().r[2], 1);
        assert!(computer.registers().cc.contains(ConditionCode::EQUAL));
    }

    #[test]
    fn subtract_one_and_branch() {
        let src = "LOC 10\nAIR 1,3\nLOOP: AIR 0,2\nSOB 1,0,LOOP\nHLT\n";
        let mut computer = machine(src);
        computer.run();
        assert_eq!(computer.registers().r[0], 6);
        assert_eq!(computer.registers().r[1], 0);
        assert_eq!(computer.registers().pc, 14);
    }

    #[test]
    fn conditional_jumps() {
        let src = "SIR 0,1\nJGE 0,0,BAD\nJZ 1,0,OK\nBAD: HLT\nOK: JNE 0,0,DONE\nHLT\nDONE: AIR 3,5\nHLT\n";
        let mut computer = machine(src);
        computer.run();
        assert_eq!(computer.registers().r[0], 0xFFFF);
        assert_eq!(computer.registers().r[3], 5);
    }

    #[test]
    fn subroutine_call() {
        let src = "LOC 10\nJSR 0,SUB\nHLT\nSUB: AIR 2,7\nRFS 4\n";
        let mut computer = machine(src);
        computer.run();
        let regs = computer.registers();
        assert_eq!(regs.r[2], 7);
        assert_eq!(regs.r[0], 4);
        assert_eq!(regs.r[3], 11);
        assert_eq!(regs.pc, 12);
    }

    #[test]
    fn logic() {
        let mut computer = machine("AND 0,1\nORR 2,1\nNOT 3\nHLT\n");
        computer.deposit(RegisterName::R(0), 0b1100);
        computer.deposit(RegisterName::R(1), 0b1010);
        computer.deposit(RegisterName::R(2), 0b0001);
        computer.run();
        assert_eq!(computer.registers().r, [0b1000, 0b1010, 0b1011, 0xFFFF]);
    }

    #[test]
    fn shifts() {
        let mut computer = machine("SRC 0,1,0,0\nSRC 1,1,0,1\nSRC 2,1,1,1\nSRC 3,0,1,1\nHLT\n");
        computer.deposit(RegisterName::R(0), 0x8000);
        computer.deposit(RegisterName::R(1), 0x8001);
        computer.deposit(RegisterName::R(2), 0x8000);
        computer.deposit(RegisterName::R(3), 0x1234);
        computer.run();
        assert_eq!(computer.registers().r, [0xC000, 0x4000, 0x0000, 0x1234]);
        assert_eq!(
            computer.registers().cc,
            ConditionCode::OVERFLOW | ConditionCode::UNDERFLOW
        );
    }

    #[test]
    fn shift_without_loss_keeps_flags_clear() {
        let mut computer = machine("SRC 0,4,1,0\nSRC 1,2,0,0\nHLT\n");
        computer.deposit(RegisterName::R(0), 0x0001);
        computer.deposit(RegisterName::R(1), 0x0004);
        computer.run();
        assert_eq!(computer.registers().r[0], 0x0010);
        assert_eq!(computer.registers().r[1], 0x0001);
        assert!(computer.registers().cc.is_empty());
    }

    #[test]
    fn rotates() {
        let mut computer = machine("RRC 0,1,1,0\nRRC 1,4,0,0\nHLT\n");
        computer.deposit(RegisterName::R(0), 0x8001);
        computer.deposit(RegisterName::R(1), 0x000F);
        computer.run();
        assert_eq!(computer.registers().r[0], 0x0003);
        assert_eq!(computer.registers().r[1], 0xF000);
    }

    #[test]
    fn input_waits_then_resumes() {
        let mut computer = machine("IN 1,0\nHLT\n");
        assert_eq!(computer.run(), State::AwaitingInput(1));
        assert_eq!(computer.registers().pc, 0);

        computer.provide_input('A');
        assert_eq!(computer.state(), State::Running);
        assert_eq!(computer.registers().r[1], 65);
        assert_eq!(computer.registers().pc, 1);

        assert_eq!(computer.run(), State::Halted);
        assert_eq!(computer.registers().r[1], 65);
    }

    #[test]
    fn queued_input() {
        let mut computer = machine("IN 0,0\nIN 2,0\nHLT\n");
        computer.provide_input('o');
        computer.provide_input('k');
        assert_eq!(computer.run(), State::Halted);
        assert_eq!(computer.registers().r[0], 'o' as u16);
        assert_eq!(computer.registers().r[2], 'k' as u16);
    }

    #[test]
    fn card_reader() {
        let mut computer = machine("CHK 3,2\nIN 0,2\nIN 1,2\nCHK 2,2\nHLT\n");
        computer.load_cards("7");
        computer.run();
        assert_eq!(computer.registers().r, ['7' as u16, 0, 0, 1]);
    }

    #[test]
    fn printer() {
        let src = "LOC 6\nH: Data 72\nI: Data 73\nLDR 0,0,H\nOUT 0,1\nLDR 0,0,I\nOUT 0,1\nCHK 1,1\nHLT\n";
        let mut computer = machine(src);
        computer.run();
        assert_eq!(computer.output(), "HI");
        assert_eq!(computer.registers().r[1], 1);
    }

    #[test]
    fn unknown_opcode_halts() {
        let mut computer = Computer::new();
        computer.ipl(&[(0, 0o040000)], 0).unwrap();
        assert_eq!(computer.single_step(), State::Halted);
        assert_eq!(computer.fault(), Some(Fault::UnknownOpcode { code: 0o20 }));
        // Still inspectable
        assert_eq!(computer.registers().ir, 0o040000);
        assert_eq!(computer.registers().pc, 1);
    }

    #[test]
    fn index_register_zero() {
        let mut computer = machine("LDX 0,7\nHLT\n");
        computer.run();
        assert_eq!(
            computer.fault(),
            Some(Fault::InvalidIndexRegister { op: Opcode::Ldx })
        );
    }

    #[test]
    fn trap_is_unimplemented() {
        let mut computer = machine("TRAP 3\n");
        computer.run();
        assert_eq!(computer.fault(), Some(Fault::UnimplementedTrap { code: 3 }));
    }

    #[test]
    fn address_out_of_range() {
        let mut computer = machine("LDR 0,1,31\nHLT\n");
        computer.deposit(RegisterName::X(1), 2040);
        computer.run();
        assert_eq!(
            computer.fault(),
            Some(Fault::Memory(MemoryError::AddressOutOfRange { address: 2071 }))
        );
    }

    #[test]
    fn running_off_the_end_faults() {
        let mut computer = Computer::new();
        computer.ipl(&[], 2047).unwrap();
        // 2047 holds 0, which is HLT
        assert_eq!(computer.run(), State::Halted);
        assert_eq!(computer.fault(), None);

        computer.ipl(&[(2047, word("AIR 0,1"))], 2047).unwrap();
        computer.run();
        assert!(matches!(computer.fault(), Some(Fault::Memory(_))));
    }

    #[test]
    fn stepping_a_halted_machine_does_nothing() {
        let mut computer = machine("HLT\n");
        computer.run();
        let pc = computer.registers().pc;
        assert_eq!(computer.single_step(), State::Halted);
        assert_eq!(computer.registers().pc, pc);
        assert_eq!(computer.steps(), 1);
    }

    #[test]
    fn run_limited_stops_loops() {
        let mut computer = machine("LOOP: JMA 0,LOOP\n");
        assert_eq!(computer.run_limited(50), State::Running);
        assert_eq!(computer.steps(), 50);
        computer.halt();
        assert_eq!(computer.state(), State::Halted);
    }

    #[test]
    fn front_panel() {
        let mut computer = Computer::new();
        computer.deposit(RegisterName::Mar, 100);
        computer.deposit(RegisterName::Mbr, 7);
        computer.store_memory_plus().unwrap();
        computer.deposit(RegisterName::Mbr, 8);
        computer.store_memory().unwrap();

        assert_eq!(computer.memory().read(100), Ok(7));
        assert_eq!(computer.memory().read(101), Ok(8));
        assert_eq!(computer.registers().mar, 101);

        computer.deposit(RegisterName::Mar, 100);
        assert_eq!(computer.load_memory_plus(), Ok(7));
        assert_eq!(computer.load_memory(), Ok(8));
        assert_eq!(computer.registers().mbr, 8);

        let lines: Vec<_> = computer.cache_lines().iter().map(|line| line.address).collect();
        assert_eq!(lines, vec![100, 101]);

        computer.deposit(RegisterName::Mar, 4000);
        assert!(computer.load_memory().is_err());
    }

    #[test]
    fn ipl_resets() {
        let mut computer = machine("AIR 0,5\nHLT\n");
        computer.run();
        computer.ipl(&[(3, word("HLT"))], 3).unwrap();
        assert_eq!(computer.registers().r[0], 0);
        assert_eq!(computer.registers().pc, 3);
        assert_eq!(computer.state(), State::Running);
        assert!(computer.cache_lines().is_empty());
        assert_eq!(computer.memory().read(0), Ok(0));
    }

    #[test]
    fn trace_events() {
        let mut computer = Computer::with_trace(Vec::<Event>::new());
        computer.ipl(&[(0, word("STR 0,0,5"))], 0).unwrap();
        computer.single_step();

        let instruction = Instruction::decode(word("STR 0,0,5")).unwrap();
        assert_eq!(
            computer.trace().as_slice(),
            &[
                Event::CacheMiss { address: 0 },
                Event::Fetch {
                    pc: 0,
                    word: word("STR 0,0,5")
                },
                Event::Decode { instruction },
                Event::Execute {
                    instruction,
                    effective_address: Some(5)
                },
                Event::MemoryWrite { address: 5, value: 0 },
            ]
        );
    }

    #[test]
    fn trace_faults_and_output() {
        let mut computer = Computer::with_trace(Vec::<Event>::new());
        computer.ipl(&[(0, word("OUT 0,1")), (1, 0o177777)], 0).unwrap();
        computer.deposit(RegisterName::R(0), 'z' as u16);
        computer.run();

        let events = computer.into_trace();
        assert!(events.contains(&Event::Output {
            device: 1,
            ch: 'z'
        }));
        assert_eq!(
            events.last(),
            Some(&Event::Fault {
                fault: Fault::UnknownOpcode { code: 0o77 }
            })
        );
    }
}
