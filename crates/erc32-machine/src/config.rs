use std::path::PathBuf;

/// Options recognised at machine construction (spec.md §6's configuration
/// table). Everything else — wait states, write-protect windows, timer
/// reload values — is guest-configured at runtime through the MEC register
/// file and isn't part of this struct.
#[derive(Debug, Clone)]
pub struct MachineConfig {
    /// Power-of-two, 128 KiB..=8 MiB.
    pub rom_size: u32,
    /// Power-of-two, 256 KiB..=32 MiB.
    pub ram_size: u32,
    /// ROM bus width 8 vs 32; changes the computed ROM wait states.
    pub rom8_mode: bool,
    /// Disables ROM writes regardless of what the guest sets in MEMCFG.
    pub rom_write_protect: bool,
    /// Selects the alternate RAM base (`0x40000000`) used by SPARClite
    /// boards instead of the default `0x02000000`.
    pub sparclite_board: bool,
    /// Backing file for UART A; `None` binds it to host stdin/stdout.
    pub uart_dev1: Option<PathBuf>,
    /// Backing file for UART B; `None` leaves it permanently empty/sunk.
    pub uart_dev2: Option<PathBuf>,
    /// Divides real time into simulated cycles for RTC/GPT defaults.
    pub freq_mhz: u32,
    /// 0..3. Controls diagnostic printing only; never changes guest-visible
    /// behavior.
    pub verbose_level: u8,
    /// Put the host terminal into raw (non-canonical, no-echo) mode for the
    /// duration of [`crate::Machine::run_until`]. Disabled automatically
    /// when neither UART is bound to stdio.
    pub raw_terminal: bool,
}

impl Default for MachineConfig {
    /// Scenario S1: 4 MiB RAM, 1 MiB ROM, default board, UART A on stdio.
    fn default() -> Self {
        MachineConfig {
            rom_size: 1024 * 1024,
            ram_size: 4 * 1024 * 1024,
            rom8_mode: false,
            rom_write_protect: false,
            sparclite_board: false,
            uart_dev1: None,
            uart_dev2: None,
            freq_mhz: 14,
            verbose_level: 0,
            raw_terminal: true,
        }
    }
}
