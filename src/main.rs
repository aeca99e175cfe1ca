use std::fs;
use std::io::{stdin, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::Colorize;
use console::Term;
use hotwatch::notify::Event;
use hotwatch::{
    blocking::{Flow, Hotwatch},
    EventKind,
};
use miette::{bail, IntoDiagnostic, Result};

use c6461::encoder::{parse_octal, to_octal, WORD_DIGITS};
use c6461::{error, output};
use c6461::{Computer, NoopTrace, RegisterName, State, Trace};

/// Assembler and simulator for the C6461 instructional computer.
#[derive(Parser)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Quickly provide a `.asm` file to run
    path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Assemble a `.asm` file into listing and load files
    Assemble {
        /// `.asm` file to assemble
        name: PathBuf,
        /// Destination for the listing (defaults to `<name>.lst`)
        #[arg(short, long)]
        listing: Option<PathBuf>,
        /// Destination for the load file (defaults to `<name>.load`)
        #[arg(short = 'o', long)]
        load: Option<PathBuf>,
        /// Print the symbol table
        #[arg(short, long)]
        symbols: bool,
    },
    /// Check a `.asm` file without writing any output
    Check {
        /// File to check
        name: PathBuf,
    },
    /// Run a `.asm` file or a load file and print the final machine state
    Run {
        /// `.asm` source or octal load file
        name: PathBuf,
        /// Octal start address (defaults to the first instruction)
        #[arg(long, value_parser = octal_arg)]
        start: Option<u16>,
        /// Keyboard input queued before the program starts
        #[arg(short, long)]
        input: Option<String>,
        /// File whose characters are fed to the card reader
        #[arg(long)]
        cards: Option<PathBuf>,
        /// Deposit an octal value into a register after loading, e.g. `--set X1=000005`
        #[arg(long = "set", value_parser = deposit_arg)]
        deposits: Vec<(RegisterName, u16)>,
        /// Stop after this many instructions
        #[arg(long)]
        max_steps: Option<u64>,
        /// Print every machine event to stderr
        #[arg(short, long)]
        trace: bool,
        /// Print the cache contents when the machine stops
        #[arg(long)]
        cache: bool,
        /// Produce minimal output, suited for blackbox tests
        #[arg(short, long)]
        minimal: bool,
    },
    /// Disassemble an octal load file
    Disasm {
        /// Load file to disassemble
        name: PathBuf,
    },
    /// Place a watch on a `.asm` file to receive constant assembler updates
    Watch {
        /// `.asm` file to watch
        name: PathBuf,
    },
}

fn main() -> miette::Result<()> {
    use MsgColor::*;
    let args = Args::parse();
    c6461::env::init();

    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new() //
                .context_lines(c6461::DIAGNOSTIC_CONTEXT_LINES)
                .build(),
        )
    }))?;

    let Some(command) = args.command else {
        if let Some(path) = args.path {
            return run(&path, RunOptions::default());
        }
        println!("\n~ c6461 v{VERSION} ~");
        println!("{SHORT_INFO}");
        return Ok(());
    };

    match command {
        Command::Assemble {
            name,
            listing,
            load,
            symbols,
        } => {
            file_message(Green, "Assembling", &name);
            let src = fs::read_to_string(&name).into_diagnostic()?;
            let assembly = c6461::assemble(&src).map_err(|err| error::asm_report(&err, &src))?;

            let listing = listing.unwrap_or_else(|| name.with_extension("lst"));
            let load = load.unwrap_or_else(|| name.with_extension("load"));
            fs::write(&listing, assembly.listing_text()).into_diagnostic()?;
            fs::write(&load, assembly.load_text()).into_diagnostic()?;

            if symbols {
                for (label, symbol) in assembly.symbols.iter() {
                    println!("{:>12} {}", label, to_octal(symbol.address, WORD_DIGITS));
                }
            }

            let words = format!("{} words", assembly.load.len());
            message(Green, "Finished", &words);
            file_message(Green, "Saved", &listing);
            file_message(Green, "Saved", &load);
            Ok(())
        }
        Command::Check { name } => {
            file_message(Green, "Checking", &name);
            let src = fs::read_to_string(&name).into_diagnostic()?;
            c6461::assemble(&src).map_err(|err| error::asm_report(&err, &src))?;
            message(Green, "Success", "no errors found!");
            Ok(())
        }
        Command::Run {
            name,
            start,
            input,
            cards,
            deposits,
            max_steps,
            trace,
            cache,
            minimal,
        } => run(
            &name,
            RunOptions {
                start,
                input,
                cards,
                deposits,
                max_steps,
                trace,
                cache,
                minimal,
            },
        ),
        Command::Disasm { name } => {
            let src = fs::read_to_string(&name).into_diagnostic()?;
            let image = c6461::parse_load_text(&src).map_err(|err| error::load_report(&err, &src))?;
            for (address, word) in image {
                let text = match c6461::decode(word) {
                    Ok(instruction) => instruction.to_string(),
                    Err(_) => format!("Data {}", word),
                };
                println!(
                    "{} {} {}",
                    to_octal(address, WORD_DIGITS),
                    to_octal(word, WORD_DIGITS),
                    text
                );
            }
            Ok(())
        }
        Command::Watch { name } => watch(name),
    }
}

#[derive(Default)]
struct RunOptions {
    start: Option<u16>,
    input: Option<String>,
    cards: Option<PathBuf>,
    deposits: Vec<(RegisterName, u16)>,
    max_steps: Option<u64>,
    trace: bool,
    cache: bool,
    minimal: bool,
}

fn run(name: &Path, opts: RunOptions) -> Result<()> {
    output::set_minimal(opts.minimal);

    let (image, entry) = match name.extension().and_then(|ext| ext.to_str()) {
        Some("asm") => {
            file_message(MsgColor::Green, "Assembling", name);
            let src = fs::read_to_string(name).into_diagnostic()?;
            let assembly = c6461::assemble(&src).map_err(|err| error::asm_report(&err, &src))?;
            let entry = assembly.entry_point();
            (assembly.image(), entry)
        }
        Some(_) => {
            file_message(MsgColor::Green, "Loading", name);
            let src = fs::read_to_string(name).into_diagnostic()?;
            let image = c6461::parse_load_text(&src).map_err(|err| error::load_report(&err, &src))?;
            let entry = image.first().map(|&(address, _)| address);
            (image, entry)
        }
        None => bail!("File has no extension. Exiting..."),
    };
    let start = opts.start.or(entry).unwrap_or(0);

    let trace: Box<dyn Trace> = if opts.trace || c6461::env::is_trace_enabled() {
        Box::new(output::ConsoleTrace)
    } else {
        Box::new(NoopTrace)
    };
    let mut computer = Computer::with_trace(trace);
    computer.ipl(&image, start).into_diagnostic()?;
    computer.on_output(output::print_char);

    if let Some(text) = &opts.input {
        text.chars().for_each(|ch| computer.provide_input(ch));
    }
    if let Some(cards) = &opts.cards {
        computer.load_cards(&fs::read_to_string(cards).into_diagnostic()?);
    }
    for &(register, value) in &opts.deposits {
        computer.deposit(register, value);
    }

    let start = format!("from {}", to_octal(start, WORD_DIGITS));
    message(MsgColor::Green, "Running", &start);

    let max_steps = opts.max_steps.or_else(c6461::env::max_steps);
    loop {
        let state = match max_steps {
            Some(limit) => computer.run_limited(limit.saturating_sub(computer.steps())),
            None => computer.run(),
        };
        match state {
            State::Halted => break,
            State::AwaitingInput(_) => match read_input()? {
                Some(ch) => computer.provide_input(ch),
                None => {
                    output::start_new_line();
                    message(MsgColor::Red, "Stopped", "waiting for input at end of stdin");
                    break;
                }
            },
            State::Running => {
                output::start_new_line();
                let steps = format!("step limit of {} reached", computer.steps());
                message(MsgColor::Red, "Stopped", &steps);
                break;
            }
        }
    }
    output::start_new_line();

    output::print_registers(computer.registers());
    if opts.cache {
        output::print_cache(&computer.cache_lines());
    }
    if let Some(fault) = computer.fault() {
        return Err(error::fault_report(&fault, computer.registers()));
    }

    let steps = format!("{} instructions", computer.steps());
    message(MsgColor::Cyan, "Halted", &steps);
    file_message(MsgColor::Green, "Completed", name);
    Ok(())
}

fn watch(name: PathBuf) -> Result<()> {
    use MsgColor::*;
    if !name.exists() {
        bail!("File does not exist. Exiting...")
    }
    // Vim breaks if watching a single file
    let folder_path = match name.parent() {
        Some(pth) if pth.is_dir() => pth.to_path_buf(),
        _ => Path::new(".").to_path_buf(),
    };

    // Clear screen and move cursor to top left
    print!("\x1B[2J\x1B[2;1H");
    file_message(Green, "Watching", &name);
    message(Cyan, "Help", "press CTRL+C to exit");

    let mut watcher =
        Hotwatch::new_with_custom_delay(Duration::from_millis(500)).into_diagnostic()?;

    watcher
        .watch(folder_path, move |event: Event| match event.kind {
            // Watch remove for vim changes
            EventKind::Modify(_) | EventKind::Remove(_) => {
                print!("\x1B[2J\x1B[2;1H");
                file_message(Green, "Watching", &name);
                message(Green, "Re-checking", "file change detected");
                message(Cyan, "Help", "press CTRL+C to exit");

                sleep(Duration::from_millis(50));

                let src = match fs::read_to_string(&name) {
                    Ok(src) => src,
                    Err(e) => {
                        eprintln!("{e}. Exiting...");
                        return Flow::Exit;
                    }
                };
                match c6461::assemble(&src) {
                    Ok(assembly) => {
                        let words = format!("no errors found! ({} words)", assembly.load.len());
                        message(Green, "Success", &words);
                    }
                    Err(err) => println!("\n{:?}", error::asm_report(&err, &src)),
                }
                Flow::Continue
            }
            _ => Flow::Continue,
        })
        .into_diagnostic()?;
    watcher.run();
    Ok(())
}

/// One keyboard character, unbuffered when stdin is a terminal. `None` at end of input.
fn read_input() -> Result<Option<char>> {
    if stdin().is_terminal() {
        let term = Term::stdout();
        term.read_char().map(Some).into_diagnostic()
    } else {
        let mut buf = [0; 1];
        match stdin().read(&mut buf).into_diagnostic()? {
            0 => Ok(None),
            _ => Ok(Some(buf[0] as char)),
        }
    }
}

fn octal_arg(value: &str) -> std::result::Result<u16, String> {
    parse_octal(value).map_err(|e| format!("`{value}` is not an octal word: {e}"))
}

/// `NAME=OCTAL`
fn deposit_arg(value: &str) -> std::result::Result<(RegisterName, u16), String> {
    let (name, word) = value
        .split_once('=')
        .ok_or_else(|| format!("expected `REGISTER=VALUE`, found `{value}`"))?;
    Ok((name.parse()?, octal_arg(word)?))
}

#[allow(unused)]
enum MsgColor {
    Green,
    Cyan,
    Red,
}

fn file_message(color: MsgColor, left: &str, right: &Path) {
    let right = format!("target {}", right.display());
    message(color, left, &right);
}

fn message(color: MsgColor, left: &str, right: &str) {
    if output::is_minimal() {
        return;
    }
    let left = match color {
        MsgColor::Green => left.green(),
        MsgColor::Cyan => left.cyan(),
        MsgColor::Red => left.red(),
    };
    println!("{left:>12} {right}");
}

const SHORT_INFO: &str = r"
Assembler and simulator for the C6461 instructional computer.
Please use `-h` or `--help` to access the usage instructions and documentation.
";

const VERSION: &str = env!("CARGO_PKG_VERSION");
