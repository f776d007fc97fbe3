//! The ERC32 Memory and Environment Controller register window (spec.md
//! §4.4 and the register table in §6).
//!
//! `Mec` answers every 32-bit access inside the `0x01F80000..0x01F80100`
//! window by implementing [`erc32_mem::MecWindow`]. It owns the interrupt
//! priority encoder, the three timer channels and both UART channels, and
//! decodes the handful of control registers (MCR, MEMCFG, WCR, TCR, ERSR)
//! that give the other components their configuration. Like
//! `erc32-timers`/`erc32-uart`, it never holds a scheduler directly: writes
//! that must arm a device event are queued in `pending_events` for the
//! owning `Machine` to drain onto its single shared event queue.

use erc32_interrupts::InterruptController;
use erc32_mem::{asi, FaultKind, MecWindow, MemFault, ProtectWindow, MEC_BASE};
use erc32_timers::{PeriodicTimer, Watchdog};
use erc32_uart::{UartBackend, UartChannel, UartMode};

pub mod offset {
    pub const MCR: u32 = 0x000;
    pub const SFR: u32 = 0x004;
    pub const PWDR: u32 = 0x008;
    pub const MEMCFG: u32 = 0x010;
    pub const IOCR: u32 = 0x014;
    pub const WCR: u32 = 0x018;
    pub const SSA1: u32 = 0x020;
    pub const SEA1: u32 = 0x024;
    pub const SSA2: u32 = 0x028;
    pub const SEA2: u32 = 0x02C;
    pub const ISR: u32 = 0x044;
    pub const IPR: u32 = 0x048;
    pub const IMR: u32 = 0x04C;
    pub const ICR: u32 = 0x050;
    pub const IFR: u32 = 0x054;
    pub const WDOG: u32 = 0x060;
    pub const TRAPD: u32 = 0x064;
    pub const RTC_COUNTER_OR_RELOAD: u32 = 0x080;
    pub const RTC_SCALER: u32 = 0x084;
    pub const GPT_COUNTER_OR_RELOAD: u32 = 0x088;
    pub const GPT_SCALER: u32 = 0x08C;
    pub const TIMER_CTRL: u32 = 0x098;
    pub const SFSR: u32 = 0x0A0;
    pub const FFAR: u32 = 0x0A4;
    pub const ERSR: u32 = 0x0B0;
    pub const TCR: u32 = 0x0D0;
    pub const UARTA: u32 = 0x0E0;
    pub const UARTB: u32 = 0x0E4;
    pub const UART_CTRL: u32 = 0x0E8;
    pub const SIM_LOAD: u32 = 0x0F0;
    pub const SIM_RAM_SIZE: u32 = 0x0F4;
    pub const SIM_ROM_SIZE: u32 = 0x0F8;
}

pub mod mcr {
    pub const POWER_DOWN_ENABLE: u32 = 0x0001;
    pub const SOFTWARE_RESET_ENABLE: u32 = 0x0002;
    pub const BLOCK_PROTECT: u32 = 0x0008;
    pub const IU_ERROR_AS_INTERRUPT: u32 = 0x0020;
    pub const IU_ERROR_RESET: u32 = 0x0040;
    pub const IU_COMPARE_AS_INTERRUPT: u32 = 0x0200;
    pub const IU_COMPARE_RESET: u32 = 0x0400;
    pub const HW_ERROR_AS_INTERRUPT: u32 = 0x2000;
    pub const HW_ERROR_RESET: u32 = 0x4000;
    pub const FORCE_HW_ERROR: u32 = 0x8000;
    pub const WRITABLE_MASK: u32 = 0xFFFF;
}

pub mod ersr {
    pub const IU_ERROR: u32 = 0x0001;
    pub const IU_COMPARE_ERROR: u32 = 0x0004;
    pub const MEC_HW_ERROR: u32 = 0x0020;
    pub const HALTED: u32 = 0x2000;
    pub const WATCHDOG_RESET: u32 = 0x4000;
    pub const RESET: u32 = 0x8000;
}

/// Timer-control register bit layout (erc32.c `timer_ctrl`, offset 0x098).
mod tcr_bits {
    pub const GPT_CHAIN_RELOAD: u32 = 0x001;
    pub const GPT_RELOAD_NOW: u32 = 0x002;
    pub const GPT_ENABLE: u32 = 0x004;
    pub const RTC_CHAIN_RELOAD: u32 = 0x100;
    pub const RTC_RELOAD_NOW: u32 = 0x200;
    pub const RTC_ENABLE: u32 = 0x400;
}

/// A device-clock event this register file can own. `Machine` multiplexes
/// these (and CPU/user events) onto a single `erc32_time::Scheduler`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceEvent {
    Rtc,
    Gpt,
    Watchdog,
    UartATx,
    UartARx,
    UartAFastPoll,
    UartBTx,
    UartBRx,
    UartBFastPoll,
}

/// Hook for the `SIM_LOAD` pseudo-register: accumulates a filename byte at
/// a time, then triggers a load on read. Left unimplemented by design
/// (spec.md Non-goal ii) — `erc32-machine` may wire a real ELF loader here.
pub trait SimLoadCollector {
    fn load(&mut self, filename: &str) -> bool;
}

struct IrqSink<'a>(&'a mut InterruptController);
impl erc32_timers::InterruptSink for IrqSink<'_> {
    fn raise(&mut self, level: u8) {
        self.0.raise(level);
    }
}
impl erc32_uart::InterruptSink for IrqSink<'_> {
    fn raise(&mut self, level: u8) {
        self.0.raise(level);
    }
}

pub struct Mec {
    mcr: u32,
    iocr: u32,
    memcfg: u32,
    wcr: u32,
    ssa: [u32; 2],
    sea: [u32; 2],
    wpr: [u8; 2],
    sfsr: u32,
    ffar: u32,
    ersr: u32,
    tcr: u32,
    isr: u32,

    interrupts: InterruptController,
    rtc: PeriodicTimer,
    gpt: PeriodicTimer,
    watchdog: Watchdog,
    uart_a: UartChannel,
    uart_b: UartChannel,
    uart_a_mode: UartMode,
    uart_b_mode: UartMode,
    uart_a_backend: Box<dyn UartBackend>,
    uart_b_backend: Box<dyn UartBackend>,

    sim_load_name: Vec<u8>,
    sim_load_collector: Option<Box<dyn SimLoadCollector>>,

    rom8_mode: bool,
    sparclite_board: bool,
    rom_write_protect_config: bool,

    pending_events: Vec<(DeviceEvent, u64)>,
    pending_reset: bool,
    pending_halt: bool,
}

impl Mec {
    pub fn new(
        uart_a_mode: UartMode,
        uart_b_mode: UartMode,
        uart_a_backend: Box<dyn UartBackend>,
        uart_b_backend: Box<dyn UartBackend>,
        rom8_mode: bool,
        sparclite_board: bool,
        rom_write_protect_config: bool,
    ) -> Self {
        let mut mec = Mec {
            mcr: 0,
            iocr: 0,
            memcfg: 0,
            wcr: 0,
            ssa: [0; 2],
            sea: [0; 2],
            wpr: [0; 2],
            sfsr: 0,
            ffar: 0,
            ersr: 0,
            tcr: 0,
            isr: 0,
            interrupts: InterruptController::new(),
            rtc: PeriodicTimer::rtc(),
            gpt: PeriodicTimer::gpt(),
            watchdog: Watchdog::new(),
            uart_a: UartChannel::new(uart_a_mode, 4),
            uart_b: UartChannel::new(uart_b_mode, 5),
            uart_a_mode,
            uart_b_mode,
            uart_a_backend,
            uart_b_backend,
            sim_load_name: Vec::new(),
            sim_load_collector: None,
            rom8_mode,
            sparclite_board,
            rom_write_protect_config,
            pending_events: Vec::new(),
            pending_reset: false,
            pending_halt: false,
        };
        mec.reset();
        mec
    }

    pub fn set_sim_load_collector(&mut self, collector: Box<dyn SimLoadCollector>) {
        self.sim_load_collector = Some(collector);
    }

    /// Power-on/software reset (erc32.c `mec_reset` plus `reset()`'s
    /// unconditional `wdog_start()`/`uart_irq_start()`).
    ///
    /// `MEC_MEMCFG` is seeded with `(3 << 18) | (4 << 10)` rather than
    /// `mec_reset`'s bare `0x10000`, matching erc32.c's `boot_init` which
    /// overwrites it with exactly this value (1 MiB ROM / 4 MiB RAM) before
    /// handing control to the loaded program — the same default spec.md's
    /// scenario S1 requires.
    pub fn reset(&mut self) {
        self.mcr = 0x0000_0014;
        self.iocr = 0;
        self.wcr = u32::MAX;
        self.ssa = [0; 2];
        self.sea = [0; 2];
        self.wpr = [0; 2];
        self.sfsr = 0x078;
        self.ffar = 0;
        self.ersr = 0;
        self.tcr = 0;
        self.isr = 0;
        self.interrupts.reset();
        self.rtc = PeriodicTimer::rtc();
        self.gpt = PeriodicTimer::gpt();
        self.watchdog = Watchdog::new();
        self.uart_a.reset();
        self.uart_b.reset();
        self.sim_load_name.clear();
        self.pending_events.clear();
        self.pending_reset = false;
        self.pending_halt = false;

        let rom_idx = 3u32; // 128 KiB << 3 = 1 MiB
        let ram_idx = 4u32; // 256 KiB << 4 = 4 MiB
        self.memcfg = (rom_idx << 18) | (ram_idx << 10);
        self.decode_memcfg();
        self.decode_mcr();

        self.pending_events.push((DeviceEvent::Watchdog, self.watchdog.start()));
        self.arm_uart_startup(true);
        self.arm_uart_startup(false);
    }

    fn arm_uart_startup(&mut self, channel_a: bool) {
        let (mode, fast_ev, rx_ev) = if channel_a {
            (self.uart_a_mode, DeviceEvent::UartAFastPoll, DeviceEvent::UartARx)
        } else {
            (self.uart_b_mode, DeviceEvent::UartBFastPoll, DeviceEvent::UartBRx)
        };
        match mode {
            UartMode::Fast => self.pending_events.push((fast_ev, erc32_uart::FAST_POLL_CYCLES)),
            UartMode::Accurate => self.pending_events.push((rx_ev, erc32_uart::BYTE_RX_CYCLES)),
        }
    }

    pub fn ext_irl(&self) -> u8 {
        self.interrupts.ext_irl()
    }

    #[must_use]
    pub fn take_pending_events(&mut self) -> Vec<(DeviceEvent, u64)> {
        std::mem::take(&mut self.pending_events)
    }

    #[must_use]
    pub fn take_reset_request(&mut self) -> bool {
        std::mem::take(&mut self.pending_reset)
    }

    #[must_use]
    pub fn take_halt_request(&mut self) -> bool {
        std::mem::take(&mut self.pending_halt)
    }

    pub fn protect_window(&self, idx: usize) -> Option<ProtectWindow> {
        if self.wpr[idx] == 0 {
            return None;
        }
        Some(ProtectWindow {
            start_word: self.ssa[idx],
            end_word: self.sea[idx],
            supervisor_enabled: self.wpr[idx] & 0b10 != 0,
            user_enabled: self.wpr[idx] & 0b01 != 0,
            block_semantics: self.mcr & mcr::BLOCK_PROTECT != 0,
        })
    }

    pub fn wait_states(&self) -> erc32_mem::WaitStates {
        let ram_read = self.wcr & 3;
        let ram_write = (self.wcr >> 2) & 3;
        let mut rom_read = (self.wcr >> 4) & 0xF;
        if self.rom8_mode {
            if rom_read > 0 {
                rom_read -= 1;
            }
            rom_read = 5 + 4 * rom_read;
        }
        let rom_write = (self.wcr >> 8) & 0xF;
        erc32_mem::WaitStates {
            ram_read,
            ram_write,
            rom_read,
            rom_write,
        }
    }

    pub fn rom_write_enabled(&self) -> bool {
        !self.rom_write_protect_config
    }

    pub fn sim_ram_size(&self) -> u32 {
        (256 * 1024) << ((self.memcfg >> 10) & 7)
    }
    pub fn sim_rom_size(&self) -> u32 {
        (128 * 1024) << ((self.memcfg >> 18) & 7)
    }

    /// Dispatch a device event fired by the owning scheduler.
    pub fn on_event(&mut self, event: DeviceEvent) {
        let Mec {
            interrupts,
            rtc,
            gpt,
            watchdog,
            uart_a,
            uart_b,
            uart_a_backend,
            uart_b_backend,
            pending_events,
            pending_reset,
            ersr,
            ..
        } = self;
        let mut sink = IrqSink(interrupts);
        match event {
            DeviceEvent::Rtc => {
                if let Some(delta) = rtc.on_tick(&mut sink) {
                    pending_events.push((DeviceEvent::Rtc, delta));
                }
            }
            DeviceEvent::Gpt => {
                if let Some(delta) = gpt.on_tick(&mut sink) {
                    pending_events.push((DeviceEvent::Gpt, delta));
                }
            }
            DeviceEvent::Watchdog => {
                let (reset_now, rearm) = watchdog.on_tick(&mut sink);
                if reset_now {
                    *ersr = ersr::WATCHDOG_RESET | ersr::RESET;
                    *pending_reset = true;
                }
                if let Some(delta) = rearm {
                    pending_events.push((DeviceEvent::Watchdog, delta));
                }
            }
            DeviceEvent::UartATx => {
                if let Some(delta) = uart_a.tx_tick(uart_a_backend.as_mut(), &mut sink) {
                    pending_events.push((DeviceEvent::UartATx, delta));
                }
            }
            DeviceEvent::UartARx => {
                let delta = uart_a.rx_tick(uart_a_backend.as_mut(), &mut sink);
                pending_events.push((DeviceEvent::UartARx, delta));
            }
            DeviceEvent::UartAFastPoll => {
                let delta = uart_a.fast_poll(uart_a_backend.as_mut(), &mut sink);
                pending_events.push((DeviceEvent::UartAFastPoll, delta));
            }
            DeviceEvent::UartBTx => {
                if let Some(delta) = uart_b.tx_tick(uart_b_backend.as_mut(), &mut sink) {
                    pending_events.push((DeviceEvent::UartBTx, delta));
                }
            }
            DeviceEvent::UartBRx => {
                let delta = uart_b.rx_tick(uart_b_backend.as_mut(), &mut sink);
                pending_events.push((DeviceEvent::UartBRx, delta));
            }
            DeviceEvent::UartBFastPoll => {
                let delta = uart_b.fast_poll(uart_b_backend.as_mut(), &mut sink);
                pending_events.push((DeviceEvent::UartBFastPoll, delta));
            }
        }
    }

    fn decode_memcfg(&mut self) {
        if self.rom8_mode {
            self.memcfg &= !0x20000;
        } else {
            self.memcfg |= 0x20000;
        }
    }

    fn decode_mcr(&mut self) {
        if self.mcr & mcr::FORCE_HW_ERROR != 0 {
            self.ersr |= ersr::MEC_HW_ERROR;
            self.decode_ersr();
        }
    }

    /// erc32.c `decode_ersr`: for each latched error-status bit, escalate
    /// per the matching MCR policy pair — interrupt, reset, or halt.
    fn decode_ersr(&mut self) {
        self.escalate(
            ersr::IU_ERROR,
            mcr::IU_ERROR_AS_INTERRUPT,
            mcr::IU_ERROR_RESET,
        );
        self.escalate(
            ersr::IU_COMPARE_ERROR,
            mcr::IU_COMPARE_AS_INTERRUPT,
            mcr::IU_COMPARE_RESET,
        );
        self.escalate(
            ersr::MEC_HW_ERROR,
            mcr::HW_ERROR_AS_INTERRUPT,
            mcr::HW_ERROR_RESET,
        );
    }

    fn escalate(&mut self, latched_bit: u32, as_interrupt_bit: u32, reset_bit: u32) {
        if self.ersr & latched_bit == 0 {
            return;
        }
        if self.mcr & as_interrupt_bit != 0 {
            self.interrupts.raise(1);
        } else if self.mcr & reset_bit != 0 {
            self.ersr = ersr::RESET;
            self.pending_reset = true;
        } else {
            self.ersr |= ersr::HALTED;
            self.pending_halt = true;
        }
    }

    fn mecparerror(&mut self) {
        self.ersr |= ersr::MEC_HW_ERROR;
        self.decode_ersr();
    }

    /// Fault-status-register code for each [`FaultKind`], taken verbatim
    /// from erc32.c's `PROT_EXC`/`UIMP_ACC`/`MEC_ACC` constants. ROM writes
    /// made while disabled share `UIMP_ACC` with genuinely unimplemented
    /// addresses — the C original has no distinct code for it either.
    fn fault_code(kind: FaultKind) -> u32 {
        match kind {
            FaultKind::Protection => 0x3,
            FaultKind::UnimplementedAccess | FaultKind::RomWriteDisabled => 0x4,
            FaultKind::MecAccess => 0x6,
        }
    }

    fn set_sfsr(&mut self, fault: MemFault) {
        if fault.asi == asi::USER_DATA || fault.asi == asi::SUPERVISOR_DATA {
            self.ffar = fault.addr;
            let mut sfsr = Self::fault_code(fault.kind) << 3;
            if fault.write {
                sfsr |= 0x8000;
            }
            sfsr |= if fault.asi == asi::USER_DATA { 0x0004 } else { 0x1004 };
            self.sfsr = sfsr;
        }
    }
}

impl MecWindow for Mec {
    fn mec_read(&mut self, reg_offset: u32, asi_value: u8) -> Result<u32, MemFault> {
        use offset as off;
        let data = match reg_offset & 0xFC {
            off::MCR => self.mcr,
            off::MEMCFG => self.memcfg,
            off::IOCR => self.iocr,
            off::SSA1 => self.ssa[0] | ((self.wpr[0] as u32) << 23),
            off::SEA1 => self.sea[0],
            off::SSA2 => self.ssa[1] | ((self.wpr[1] as u32) << 23),
            off::SEA2 => self.sea[1],
            off::ISR => self.isr,
            off::IPR => self.interrupts.pending() as u32,
            off::IMR => self.interrupts.masked() as u32,
            off::IFR => self.interrupts.forced() as u32,
            off::RTC_COUNTER_OR_RELOAD => self.rtc.counter(),
            off::RTC_SCALER => self.rtc.scaler(),
            off::GPT_COUNTER_OR_RELOAD => self.gpt.counter(),
            off::GPT_SCALER => self.gpt.scaler(),
            off::SFSR => self.sfsr,
            off::FFAR => self.ffar,
            off::ERSR => self.ersr,
            off::TCR => self.tcr,
            off::UARTA | off::UARTB => {
                if asi_value != asi::SUPERVISOR_DATA {
                    return Err(self.mec_access_fault(reg_offset, asi_value, true));
                }
                if reg_offset & 0xFC == off::UARTA {
                    self.uart_a.read_data() as u32
                } else {
                    self.uart_b.read_data() as u32
                }
            }
            off::UART_CTRL => self.uart_status_word(),
            off::SIM_LOAD => self.trigger_sim_load() as u32,
            off::SIM_RAM_SIZE => self.sim_ram_size(),
            off::SIM_ROM_SIZE => self.sim_rom_size(),
            _ => {
                return Err(self.mec_access_fault(reg_offset, asi_value, true));
            }
        };
        Ok(data)
    }

    fn mec_write(&mut self, reg_offset: u32, asi_value: u8, data: u32) -> Result<(), MemFault> {
        use offset as off;
        match reg_offset & 0xFC {
            off::MCR => {
                self.mcr = data & mcr::WRITABLE_MASK;
                self.decode_mcr();
            }
            off::SFR => {
                if self.mcr & mcr::SOFTWARE_RESET_ENABLE != 0 {
                    self.ersr = ersr::WATCHDOG_RESET; // reuses the "reset issued" encoding (0x4000)
                    self.pending_reset = true;
                }
            }
            off::PWDR => {
                // power-down is surfaced to Machine via take_halt_request()
                // only when MCR enables it; the CPU's wait-for-irq loop
                // reads that flag, not this register directly.
                if self.mcr & mcr::POWER_DOWN_ENABLE != 0 {
                    self.pending_halt = true;
                }
            }
            off::MEMCFG => {
                if data & 0xC0E0_8000 != 0 {
                    self.mecparerror();
                }
                self.memcfg = data;
                self.decode_memcfg();
                if self.memcfg & 0xC0E0_8000 != 0 {
                    self.mecparerror();
                }
            }
            off::IOCR => {
                if data & 0xC0C0_C0C0 != 0 {
                    self.mecparerror();
                }
                self.iocr = data;
            }
            off::WCR => self.wcr = data,
            off::SSA1 => {
                if data & 0xFE00_0000 != 0 {
                    self.mecparerror();
                }
                self.ssa[0] = data & 0x007F_FFFF;
                self.wpr[0] = ((data >> 23) & 0x03) as u8;
            }
            off::SEA1 => {
                if data & 0xFF80_0000 != 0 {
                    self.mecparerror();
                }
                self.sea[0] = data & 0x007F_FFFF;
            }
            off::SSA2 => {
                if data & 0xFE00_0000 != 0 {
                    self.mecparerror();
                }
                self.ssa[1] = data & 0x007F_FFFF;
                self.wpr[1] = ((data >> 23) & 0x03) as u8;
            }
            off::SEA2 => {
                if data & 0xFF80_0000 != 0 {
                    self.mecparerror();
                }
                self.sea[1] = data & 0x007F_FFFF;
            }
            off::ISR => {
                if data & 0xFFFF_E000 != 0 {
                    self.mecparerror();
                }
                self.isr = data;
            }
            off::IMR => {
                if data & 0xFFFF_8001 != 0 {
                    self.mecparerror();
                }
                self.interrupts.set_mask((data & 0x7FFE) as u16);
            }
            off::ICR => {
                if data & 0xFFFF_0001 != 0 {
                    self.mecparerror();
                }
                self.interrupts.clear_pending((data & 0x0FFFE) as u16);
            }
            off::IFR => {
                if self.interrupts.test_mode() {
                    if data & 0xFFFF_0001 != 0 {
                        self.mecparerror();
                    }
                    self.interrupts.set_forced((data & 0xFFFE) as u16);
                }
            }
            off::WDOG => {
                let scaler = ((data >> 16) & 0xFF) as u8;
                let counter = (data & 0xFFFF) as u16;
                let reset_delay = (data >> 24) as u8;
                if let Some(delta) = self.watchdog.configure(scaler, counter, reset_delay) {
                    self.pending_events.push((DeviceEvent::Watchdog, delta));
                }
            }
            off::TRAPD => self.watchdog.disable_trap(),
            off::RTC_COUNTER_OR_RELOAD => self.rtc.set_reload(data),
            off::RTC_SCALER => {
                if data & 0xFFFF_FF00 != 0 {
                    self.mecparerror();
                }
                self.rtc.set_scaler(data);
            }
            off::GPT_COUNTER_OR_RELOAD => self.gpt.set_reload(data),
            off::GPT_SCALER => {
                if data & 0xFFFF_0000 != 0 {
                    self.mecparerror();
                }
                self.gpt.set_scaler(data);
            }
            off::TIMER_CTRL => {
                if data & 0xFFFF_F0F0 != 0 {
                    self.mecparerror();
                }
                if let Some(delta) = self.rtc.set_control(
                    data & tcr_bits::RTC_CHAIN_RELOAD != 0,
                    data & tcr_bits::RTC_RELOAD_NOW != 0,
                    data & tcr_bits::RTC_ENABLE != 0,
                ) {
                    self.pending_events.push((DeviceEvent::Rtc, delta));
                }
                if let Some(delta) = self.gpt.set_control(
                    data & tcr_bits::GPT_CHAIN_RELOAD != 0,
                    data & tcr_bits::GPT_RELOAD_NOW != 0,
                    data & tcr_bits::GPT_ENABLE != 0,
                ) {
                    self.pending_events.push((DeviceEvent::Gpt, delta));
                }
            }
            off::SFSR => {
                if data & 0xFFFF_0880 != 0 {
                    self.mecparerror();
                }
                self.sfsr = 0x78;
            }
            off::ERSR => {
                // erc32.c gates only the reserved-bit check on the 0x100000
                // debug bit; the register write itself is unconditional.
                if self.tcr & 0x10_0000 != 0 && data & 0xFFFF_EFC0 != 0 {
                    self.mecparerror();
                }
                self.ersr = data & 0x103F;
            }
            off::TCR => {
                if data & 0xFFE1_FFC0 != 0 {
                    self.mecparerror();
                }
                self.tcr = data & 0x1E_003F;
                self.interrupts.set_test_mode(self.tcr & 0x080000 != 0);
            }
            off::UARTA | off::UARTB => {
                if data & 0xFFFF_FF00 != 0 {
                    self.mecparerror();
                }
                let byte = data as u8;
                let (chan, backend, tx_ev): (&mut UartChannel, &mut dyn UartBackend, DeviceEvent) =
                    if reg_offset & 0xFC == off::UARTA {
                        (&mut self.uart_a, self.uart_a_backend.as_mut(), DeviceEvent::UartATx)
                    } else {
                        (&mut self.uart_b, self.uart_b_backend.as_mut(), DeviceEvent::UartBTx)
                    };
                if let Some(delta) = chan.write_data(byte, backend) {
                    self.pending_events.push((tx_ev, delta));
                }
            }
            off::UART_CTRL => {
                if data & 0xFF00_FF00 != 0 {
                    self.mecparerror();
                }
                if data & 0x0000_0001 != 0 {
                    self.uart_a.clear_status();
                }
                if data & 0x0001_0000 != 0 {
                    self.uart_b.clear_status();
                }
            }
            off::SIM_LOAD => self.sim_load_name.push(data as u8),
            _ => {
                return Err(self.mec_access_fault(reg_offset, asi_value, false));
            }
        }
        Ok(())
    }

    fn record_fault(&mut self, fault: MemFault) {
        self.set_sfsr(fault);
    }
}

impl Mec {
    /// `reg_offset` is the offset within the 256-byte MEC window; the
    /// fault's `addr` records the full system address so `mec_ffar` matches
    /// what RAM/ROM-level faults record.
    fn mec_access_fault(&self, reg_offset: u32, asi_value: u8, read: bool) -> MemFault {
        MemFault {
            kind: FaultKind::MecAccess,
            addr: MEC_BASE + reg_offset,
            asi: asi_value,
            write: !read,
        }
    }

    fn uart_status_word(&mut self) -> u32 {
        let a = self.uart_a.status();
        let b = self.uart_b.status();
        let mut word = 0u32;
        if a.data_ready {
            word |= 0x0000_0001;
        }
        if a.hold_empty {
            word |= 0x0000_0002;
        }
        if a.shift_empty {
            word |= 0x0000_0004;
        }
        if a.overrun {
            word |= 0x0000_0008;
        }
        if b.data_ready {
            word |= 0x0001_0000;
        }
        if b.hold_empty {
            word |= 0x0002_0000;
        }
        if b.shift_empty {
            word |= 0x0004_0000;
        }
        if b.overrun {
            word |= 0x0008_0000;
        }
        word
    }

    fn trigger_sim_load(&mut self) -> bool {
        let name = if self.sim_load_name.is_empty() {
            "simload".to_string()
        } else {
            String::from_utf8_lossy(&self.sim_load_name).into_owned()
        };
        let ok = self
            .sim_load_collector
            .as_mut()
            .map(|c| c.load(&name))
            .unwrap_or(false);
        self.sim_load_name.clear();
        ok
    }
}
