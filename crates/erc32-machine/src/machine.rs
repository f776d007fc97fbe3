use std::path::Path;

use erc32_cpu::{CpuCore, StepOutcome};
use erc32_mec::{DeviceEvent, Mec};
use erc32_mem::{MemorySubsystem, RAM_BASE_DEFAULT, RAM_BASE_SPARCLITE};
use erc32_time::Scheduler;
use erc32_uart::UartMode;

use crate::config::MachineConfig;
use crate::host_uart::{HostFileBackend, StdioBackend, TerminalGuard};

#[derive(Debug, thiserror::Error)]
pub enum MachineError {
    #[error("could not bind UART to host file {path}: {source}")]
    UartBackend { path: std::path::PathBuf, #[source] source: std::io::Error },
    #[error("{0}")]
    QueueOverflow(#[from] erc32_time::QueueOverflow),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// `run_until`'s cycle budget was reached with the guest still running.
    CycleLimitReached,
    /// The processor entered SPARC error mode, or the MEC's MCR policy
    /// asked for a simulator-wide halt. Only a fresh [`Machine::reset`]
    /// clears this.
    Halted,
}

/// Owns every ERC32 component and the single event clock they share.
pub struct Machine {
    cpu: CpuCore,
    mem: MemorySubsystem<Mec>,
    scheduler: Scheduler<DeviceEvent>,
    halted: bool,
    _terminal_guard: Option<TerminalGuard>,
}

impl Machine {
    pub fn new(config: MachineConfig) -> Result<Self, MachineError> {
        let uart_a_mode = UartMode::Fast;
        let uart_b_mode = UartMode::Fast;

        let uart_a_backend: Box<dyn erc32_uart::UartBackend> = match &config.uart_dev1 {
            Some(path) => Box::new(open_host_file(path)?),
            None => Box::new(StdioBackend::new()),
        };
        let uart_b_backend: Box<dyn erc32_uart::UartBackend> = match &config.uart_dev2 {
            Some(path) => Box::new(open_host_file(path)?),
            None => Box::new(NullBackend),
        };

        let mec = Mec::new(
            uart_a_mode,
            uart_b_mode,
            uart_a_backend,
            uart_b_backend,
            config.rom8_mode,
            config.sparclite_board,
            config.rom_write_protect,
        );

        let ram_base = if config.sparclite_board { RAM_BASE_SPARCLITE } else { RAM_BASE_DEFAULT };
        let mem = MemorySubsystem::new(config.rom_size, config.ram_size, ram_base, mec);

        let scheduler = Scheduler::new();
        let cpu = CpuCore::new();

        let uses_stdio = config.uart_dev1.is_none();
        let terminal_guard =
            if config.raw_terminal && uses_stdio { Some(TerminalGuard::engage()) } else { None };

        let mut machine =
            Machine { cpu, mem, scheduler, halted: false, _terminal_guard: terminal_guard };
        machine.sync_mem_config();
        machine.arm_pending_events()?;
        Ok(machine)
    }

    /// Copies the MEC's wait-state, ROM-write-enable and write-protect-window
    /// settings into the memory subsystem's cached routing fields. The MEC
    /// computes these from guest-written registers (WCR, MEMCFG, SWPR/SEPR)
    /// on demand; [`erc32_mem::MemorySubsystem`] caches its own copies since
    /// they're consulted on every load/store, so a guest write to one of
    /// those registers only takes effect once this runs again.
    fn sync_mem_config(&mut self) {
        self.mem.set_wait_states(self.mem.mec.wait_states());
        self.mem.set_rom_write_enabled(self.mem.mec.rom_write_enabled());
        for index in 0..2 {
            let window = self.mem.mec.protect_window(index);
            self.mem.set_protect_window(index, window);
        }
    }

    /// Loads a raw ROM image (e.g. a flashed boot PROM) at offset 0.
    pub fn load_rom(&mut self, data: &[u8]) {
        self.mem.load_rom(data);
    }

    /// Reads `path` from the host filesystem and loads it as the ROM image.
    pub fn load_rom_file(&mut self, path: &Path) -> anyhow::Result<()> {
        let data = std::fs::read(path)
            .map_err(|e| anyhow::anyhow!("failed to read ROM image {}: {e}", path.display()))?;
        self.load_rom(&data);
        Ok(())
    }

    pub fn cpu(&self) -> &CpuCore {
        &self.cpu
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Software/watchdog reset: wipes CPU and MEC state but keeps ROM
    /// contents and host UART bindings, then re-arms startup events.
    pub fn reset(&mut self) -> Result<(), MachineError> {
        self.cpu.reset();
        self.mem.mec.reset();
        self.scheduler.cancel_all();
        self.halted = false;
        self.sync_mem_config();
        self.arm_pending_events()
    }

    fn arm_pending_events(&mut self) -> Result<(), MachineError> {
        for (event, delta) in self.mem.mec.take_pending_events() {
            self.scheduler.schedule(delta, event, 0)?;
        }
        Ok(())
    }

    /// Runs until the shared cycle counter reaches `target_cycle` or the
    /// machine halts, whichever comes first.
    pub fn run_until(&mut self, target_cycle: u64) -> Result<RunOutcome, MachineError> {
        if self.halted {
            return Ok(RunOutcome::Halted);
        }

        loop {
            if self.scheduler.now() >= target_cycle {
                return Ok(RunOutcome::CycleLimitReached);
            }

            self.cpu.inject_irq(self.mem.mec.ext_irl());
            let result = self.cpu.step_one(&mut self.mem);
            self.sync_mem_config();

            let deadline = self.scheduler.now().saturating_add(result.cycles as u64);
            let mut overflow = None;
            let mec = &mut self.mem.mec;
            self.scheduler.advance_to(deadline, |sched, scheduled| {
                mec.on_event(scheduled.kind);
                for (event, delta) in mec.take_pending_events() {
                    if let Err(e) = sched.schedule(delta, event, 0) {
                        overflow = Some(e);
                    }
                }
            });
            if let Some(e) = overflow {
                return Err(e.into());
            }

            if self.mem.mec.take_reset_request() {
                self.reset()?;
                continue;
            }
            if self.mem.mec.take_halt_request() || result.outcome == StepOutcome::ErrorMode {
                self.halted = true;
                return Ok(RunOutcome::Halted);
            }
        }
    }
}

struct NullBackend;
impl erc32_uart::UartBackend for NullBackend {
    fn try_read(&mut self) -> Option<u8> {
        None
    }
    fn write(&mut self, _byte: u8) {}
}

fn open_host_file(path: &Path) -> Result<HostFileBackend, MachineError> {
    HostFileBackend::open(path)
        .map_err(|source| MachineError::UartBackend { path: path.to_path_buf(), source })
}
