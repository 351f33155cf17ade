//! LC-3 Emulator - CLI Entry Point
//!
//! Commands:
//! - `lc3-emu run <image>` - Load a memory image and run it until it halts
//! - `lc3-emu disasm <image>` - Disassemble a memory image
//!
//! Log verbosity is controlled with `RUST_LOG` (default `info`). Logs go to
//! stderr; program output and traces go to stdout.

use clap::{Parser, Subcommand};
use lc3::cpu::Snapshot;
use lc3::{LoadError, Machine, MachineState, StdConsole, TracedMachine};
use std::io;
use std::ops::{ControlFlow, Range};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "lc3-emu")]
#[command(version)]
#[command(about = "An emulator of the LC-3 16-bit teaching computer")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a memory image and run it until it halts
    Run {
        /// Raw little-endian memory image
        image: PathBuf,
        /// Word address the image is loaded at
        #[arg(long, default_value = "0", value_parser = parse_addr)]
        origin: u16,
        /// Initial program counter
        #[arg(short, long, default_value = "0x3000", value_parser = parse_addr)]
        start_addr: u16,
        /// Print every executed instruction
        #[arg(short, long)]
        trace: bool,
        /// Pause between traced instructions, in milliseconds
        #[arg(long, requires = "trace")]
        trace_delay_ms: Option<u64>,
        /// Stop after this many instructions
        #[arg(short, long)]
        max_cycles: Option<u64>,
        /// Print the final machine state as JSON
        #[arg(long)]
        dump_state: bool,
        /// Deliver keys as they are typed, without echo (terminal only)
        #[arg(long)]
        raw: bool,
    },
    /// Disassemble a memory image
    Disasm {
        /// Raw little-endian memory image
        image: PathBuf,
        /// Word address the image is loaded at
        #[arg(long, default_value = "0", value_parser = parse_addr)]
        origin: u16,
        /// First address to disassemble (default: the origin)
        #[arg(long, value_parser = parse_addr)]
        from: Option<u16>,
        /// Number of words to disassemble (default: to the end of the image)
        #[arg(short = 'n', long)]
        count: Option<usize>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            image,
            origin,
            start_addr,
            trace,
            trace_delay_ms,
            max_cycles,
            dump_state,
            raw,
        } => {
            let opts = RunOptions {
                origin,
                start_addr,
                trace,
                trace_delay: Duration::from_millis(trace_delay_ms.unwrap_or(0)),
                max_cycles: max_cycles.unwrap_or(u64::MAX),
                dump_state,
                raw,
            };
            run_image(&image, &opts);
        }
        Commands::Disasm { image, origin, from, count } => {
            disassemble_image(&image, origin, from, count);
        }
    }
}

struct RunOptions {
    origin: u16,
    start_addr: u16,
    trace: bool,
    trace_delay: Duration,
    max_cycles: u64,
    dump_state: bool,
    raw: bool,
}

fn run_image(path: &Path, opts: &RunOptions) {
    let bytes = read_image(path);

    let mut machine = Machine::new();
    match machine.load_image_at(opts.origin, &bytes) {
        Ok(written) => info!("{} bytes written", written),
        Err(LoadError::ShortWrite { written, .. }) => {
            info!("{} bytes written", written);
            warn!("input is too big, truncated to memory size");
        }
        Err(e) => {
            eprintln!("Failed to load image: {}", e);
            std::process::exit(1);
        }
    }

    if opts.raw {
        match StdConsole::raw() {
            Ok(console) => *machine.console_mut() = console,
            Err(e) => warn!("staying in line mode: {}", e),
        }
    }

    machine.initialize();
    machine.regs.pc = opts.start_addr;
    info!("starting VM (PC = x{:04X})", opts.start_addr);

    let result = if opts.trace {
        let delay = opts.trace_delay;
        let max_cycles = opts.max_cycles;
        let mut traced = TracedMachine::new(&mut machine, io::stdout());
        traced.run_with_observer(|m| {
            if m.cycles() >= max_cycles {
                return ControlFlow::Break(());
            }
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
            ControlFlow::Continue(())
        })
    } else {
        machine.run_limited(opts.max_cycles)
    };

    let snapshot = machine.snapshot();
    // Restores the terminal before anything else is printed.
    drop(machine);

    if let Err(e) = result {
        eprintln!("Execution stopped: {}", e);
        if opts.dump_state {
            print_state(&snapshot);
        }
        std::process::exit(1);
    }

    if snapshot.state == MachineState::Running || snapshot.cycles >= opts.max_cycles {
        warn!(
            "reached max cycles limit ({}), use --max-cycles to increase",
            opts.max_cycles
        );
    }
    info!("halted after {} cycles", snapshot.cycles);

    if opts.dump_state {
        print_state(&snapshot);
    }
}

fn print_state(snapshot: &Snapshot) {
    match serde_json::to_string_pretty(snapshot) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to serialize machine state: {}", e),
    }
}

fn disassemble_image(path: &Path, origin: u16, from: Option<u16>, count: Option<usize>) {
    let bytes = read_image(path);
    let words = image_words(&bytes);

    let from = from.unwrap_or(origin);
    let Some(range) = listing_range(words.len(), origin, from, count) else {
        eprintln!("Start address x{:04X} is before the image origin x{:04X}", from, origin);
        std::process::exit(1);
    };

    print!("{}", lc3::disassemble(&words[range], from));
}

/// Word indices of an image loaded at `origin` to list from address `from`,
/// clamped to the image. `None` if `from` precedes the image.
fn listing_range(len: usize, origin: u16, from: u16, count: Option<usize>) -> Option<Range<usize>> {
    let skip = from.checked_sub(origin)?;
    let start = usize::from(skip).min(len);
    let end = count.map_or(len, |n| start.saturating_add(n).min(len));
    Some(start..end)
}

fn read_image(path: &Path) -> Vec<u8> {
    match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Failed to read {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}

/// Pair up little-endian bytes into words. A trailing odd byte becomes the
/// low byte of a final word.
fn image_words(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair.get(1).copied().unwrap_or(0)]))
        .collect()
}

/// Parse an address written as `0x3000`, `x3000` or decimal.
fn parse_addr(s: &str) -> Result<u16, String> {
    let hex = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .or_else(|| s.strip_prefix('x'))
        .or_else(|| s.strip_prefix('X'));
    let parsed = match hex {
        Some(digits) => u16::from_str_radix(digits, 16),
        None => s.parse::<u16>(),
    };
    parsed.map_err(|e| format!("invalid address '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lc3::cpu::memory::USER_START;

    #[test]
    fn test_parse_addr() {
        assert_eq!(parse_addr("0x3000"), Ok(0x3000));
        assert_eq!(parse_addr("x3000"), Ok(0x3000));
        assert_eq!(parse_addr("XFFFF"), Ok(0xFFFF));
        assert_eq!(parse_addr("12288"), Ok(USER_START));
        assert!(parse_addr("0x10000").is_err());
        assert!(parse_addr("start").is_err());
    }

    #[test]
    fn test_image_words() {
        assert_eq!(image_words(&[0x02, 0xE0, 0x22]), vec![0xE002, 0x0022]);
        assert!(image_words(&[]).is_empty());
    }

    #[test]
    fn test_listing_range() {
        assert_eq!(listing_range(10, 0x3000, 0x3000, None), Some(0..10));
        assert_eq!(listing_range(10, 0x3000, 0x3004, Some(3)), Some(4..7));
        assert_eq!(listing_range(10, 0x3000, 0x3004, Some(usize::MAX)), Some(4..10));
        assert_eq!(listing_range(10, 0x3000, 0x4000, Some(2)), Some(10..10));
        assert_eq!(listing_range(10, 0x3000, 0x2FFF, None), None);
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from([
            "lc3-emu", "run", "hello.obj", "--start-addr", "x3000", "--trace", "--max-cycles", "10",
        ])
        .unwrap();
        match cli.command {
            Commands::Run { start_addr, trace, max_cycles, .. } => {
                assert_eq!(start_addr, 0x3000);
                assert!(trace);
                assert_eq!(max_cycles, Some(10));
            }
            Commands::Disasm { .. } => panic!("expected run"),
        }

        assert!(Cli::try_parse_from(["lc3-emu", "run", "a.obj", "--trace-delay-ms", "5"]).is_err());

        let cli = Cli::try_parse_from(["lc3-emu", "run", "a.obj", "--raw"]).unwrap();
        assert!(matches!(cli.command, Commands::Run { raw: true, trace: false, .. }));
    }
}
