use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use erc32_machine::{Machine, MachineConfig, RunOutcome};
use tracing_subscriber::EnvFilter;

/// Command-line driver for the ERC32 SPARC simulator.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// ROM image to load at address 0x00000000.
    #[arg(long)]
    rom: PathBuf,

    /// RAM size in bytes (256 KiB..=32 MiB, power of two).
    #[arg(long, default_value_t = 4 * 1024 * 1024)]
    ram_size: u32,

    /// ROM size in bytes (128 KiB..=8 MiB, power of two).
    #[arg(long, default_value_t = 1024 * 1024)]
    rom_size: u32,

    /// Use an 8-bit-wide ROM bus instead of 32-bit.
    #[arg(long)]
    rom8: bool,

    /// Disable ROM writes regardless of what the guest sets in MEMCFG.
    #[arg(long)]
    rom_write_protect: bool,

    /// Use the SPARClite RAM base (0x40000000) instead of the default.
    #[arg(long)]
    sparclite: bool,

    /// Backing file for UART A; defaults to the host's stdin/stdout.
    #[arg(long)]
    uart_a: Option<PathBuf>,

    /// Backing file for UART B; defaults to a permanently empty sink.
    #[arg(long)]
    uart_b: Option<PathBuf>,

    /// Clock frequency in MHz, used to derive RTC/GPT defaults.
    #[arg(long, default_value_t = 14)]
    freq_mhz: u32,

    /// Stop after this many simulated cycles even if the guest is still
    /// running.
    #[arg(long, default_value_t = u64::MAX)]
    max_cycles: u64,

    /// Diagnostic verbosity: repeat for more detail (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Never touch host terminal attributes; use for scripted/non-tty runs.
    #[arg(long)]
    batch: bool,
}

fn init_tracing(verbose_level: u8) {
    let default_directive = match verbose_level {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = MachineConfig {
        rom_size: args.rom_size,
        ram_size: args.ram_size,
        rom8_mode: args.rom8,
        rom_write_protect: args.rom_write_protect,
        sparclite_board: args.sparclite,
        uart_dev1: args.uart_a,
        uart_dev2: args.uart_b,
        freq_mhz: args.freq_mhz,
        verbose_level: args.verbose.min(3),
        raw_terminal: !args.batch,
    };

    let mut machine = Machine::new(config).context("failed to construct the ERC32 machine")?;
    machine
        .load_rom_file(&args.rom)
        .with_context(|| format!("failed to load ROM image {}", args.rom.display()))?;

    match machine.run_until(args.max_cycles)? {
        RunOutcome::CycleLimitReached => {
            tracing::info!(max_cycles = args.max_cycles, "cycle budget reached");
        }
        RunOutcome::Halted => {
            tracing::info!("machine halted");
        }
    }

    Ok(())
}
