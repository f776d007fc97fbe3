//! UART A/B channels for the ERC32 MEC (spec.md §4.7).
//!
//! Two operating modes, both grounded on erc32.c:
//! - **Fast**: host I/O is serviced once per [`FAST_POLL_CYCLES`] by
//!   draining a bounded transmit buffer to the host and refilling a
//!   bounded receive buffer from it (erc32.c's `FAST_UART` path).
//! - **Accurate**: every byte costs [`BYTE_TX_CYCLES`]/[`BYTE_RX_CYCLES`]
//!   and is driven by a scheduled per-byte event (erc32.c's `uarta_tx`/
//!   `uartb_tx`/`uart_rx`).
//!
//! Like [`erc32_timers`], this crate stays scheduler-agnostic: channel
//! methods return `Option<u64>`/`u64` deltas for the caller to arm on its
//! own shared event queue rather than holding a `Scheduler` themselves.

use std::collections::VecDeque;

/// erc32.c `UART_FLUSH_TIME`: fast-mode host I/O polling interval.
pub const FAST_POLL_CYCLES: u64 = 3000;
/// erc32.c `UART_TX_TIME`: accurate-mode per-byte transmit cost.
pub const BYTE_TX_CYCLES: u64 = 1000;
/// erc32.c `UART_RX_TIME`: accurate-mode per-byte receive poll interval.
pub const BYTE_RX_CYCLES: u64 = 1000;
/// erc32.c `UARTBUF`: fast-mode staging buffer capacity.
pub const FAST_BUF_CAPACITY: usize = 1024;

/// Interrupt line a channel raises into. Channel A uses level 4, channel B
/// uses level 5; both share level 7 for overrun/framing errors.
pub trait InterruptSink {
    fn raise(&mut self, level: u8);
}

/// Host byte-stream binding for one UART channel (spec.md §4.7's "host
/// file-descriptor pair"). `erc32-machine` implements this over an actual
/// file or standard input/output; tests use an in-memory stub.
pub trait UartBackend {
    /// Non-blocking: `None` if no byte is currently available.
    fn try_read(&mut self) -> Option<u8>;
    /// Never blocks; a closed/broken backend silently discards.
    fn write(&mut self, byte: u8);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UartMode {
    Fast,
    Accurate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UartStatus {
    pub data_ready: bool,
    pub hold_empty: bool,
    pub shift_empty: bool,
    pub overrun: bool,
}

pub struct UartChannel {
    mode: UartMode,
    rx_irq: u8,
    tx_irq: u8,

    // accurate-mode register file
    hold: Option<u8>,
    shift_busy: bool,
    rx_data: Option<u8>,
    overrun: bool,

    // fast-mode staging buffers
    rx_buf: VecDeque<u8>,
    tx_buf: VecDeque<u8>,
}

impl UartChannel {
    pub fn new(mode: UartMode, irq_level: u8) -> Self {
        UartChannel {
            mode,
            rx_irq: irq_level,
            tx_irq: irq_level,
            hold: None,
            shift_busy: false,
            rx_data: None,
            overrun: false,
            rx_buf: VecDeque::new(),
            tx_buf: VecDeque::new(),
        }
    }

    pub fn reset(&mut self) {
        self.hold = None;
        self.shift_busy = false;
        self.rx_data = None;
        self.overrun = false;
        self.rx_buf.clear();
        self.tx_buf.clear();
    }

    pub fn status(&self) -> UartStatus {
        match self.mode {
            UartMode::Accurate => UartStatus {
                data_ready: self.rx_data.is_some(),
                hold_empty: self.hold.is_none(),
                shift_empty: !self.shift_busy,
                overrun: self.overrun,
            },
            UartMode::Fast => UartStatus {
                data_ready: !self.rx_buf.is_empty(),
                hold_empty: true,
                shift_empty: true,
                overrun: self.overrun,
            },
        }
    }

    /// Read the data register (MEC offset 0xE0/0xE4). Clears `data_ready`.
    /// Returns a defined "no data" pattern (`0`) with no status change if
    /// nothing was pending, matching spec.md §4.7's failure behaviour.
    pub fn read_data(&mut self) -> u8 {
        match self.mode {
            UartMode::Accurate => self.rx_data.take().unwrap_or(0),
            UartMode::Fast => self.rx_buf.pop_front().unwrap_or(0),
        }
    }

    /// Write-1-to-clear on the status register: clears the sticky overrun
    /// bit and re-arms the hold/shift-empty bits (erc32.c `UARTx_CLR`).
    pub fn clear_status(&mut self) {
        self.overrun = false;
        if self.mode == UartMode::Accurate {
            self.hold = None;
            self.shift_busy = false;
        }
    }

    /// Write the data register. In fast mode this stages the byte for the
    /// next poll (draining to the backend immediately if the stage buffer
    /// is full, mirroring erc32.c's `write_uart`). In accurate mode it
    /// either starts shifting immediately (if the shift register is free)
    /// or occupies the hold register; returns `Some(delta)` the first time
    /// a TX event must be armed.
    #[must_use]
    pub fn write_data(&mut self, byte: u8, backend: &mut dyn UartBackend) -> Option<u64> {
        match self.mode {
            UartMode::Fast => {
                if self.tx_buf.len() >= FAST_BUF_CAPACITY {
                    self.drain_tx(backend);
                }
                self.tx_buf.push_back(byte);
                None
            }
            UartMode::Accurate => {
                if !self.shift_busy {
                    self.shift_busy = true;
                    backend.write(byte);
                    Some(BYTE_TX_CYCLES)
                } else {
                    self.hold = Some(byte);
                    None
                }
            }
        }
    }

    /// Accurate-mode TX-complete event (erc32.c `uarta_tx`/`uartb_tx`):
    /// the shift register finished sending; if the hold register has a
    /// byte queued, move it into the shift register and arm another TX
    /// event, otherwise go idle. Always raises the TX interrupt line,
    /// since erc32.c calls `mec_irq` unconditionally at the end of both.
    #[must_use]
    pub fn tx_tick(&mut self, backend: &mut dyn UartBackend, sink: &mut dyn InterruptSink) -> Option<u64> {
        let rearm = if let Some(byte) = self.hold.take() {
            backend.write(byte);
            Some(BYTE_TX_CYCLES)
        } else {
            self.shift_busy = false;
            None
        };
        sink.raise(self.tx_irq);
        rearm
    }

    /// Accurate-mode periodic RX poll (erc32.c `uart_rx`): always
    /// reschedules itself every [`BYTE_RX_CYCLES`] regardless of whether a
    /// byte arrived.
    pub fn rx_tick(&mut self, backend: &mut dyn UartBackend, sink: &mut dyn InterruptSink) -> u64 {
        if let Some(byte) = backend.try_read() {
            if self.rx_data.is_some() {
                self.overrun = true;
                sink.raise(7);
            }
            self.rx_data = Some(byte);
            sink.raise(self.rx_irq);
        }
        BYTE_RX_CYCLES
    }

    /// Fast-mode periodic poll (erc32.c's `uart_intr`/`FAST_UART` read
    /// path): drains the transmit buffer to the host and refills the
    /// receive buffer up to [`FAST_BUF_CAPACITY`] bytes. Always
    /// reschedules every [`FAST_POLL_CYCLES`].
    pub fn fast_poll(&mut self, backend: &mut dyn UartBackend, sink: &mut dyn InterruptSink) -> u64 {
        self.drain_tx(backend);
        let mut received = false;
        while self.rx_buf.len() < FAST_BUF_CAPACITY {
            match backend.try_read() {
                Some(byte) => {
                    self.rx_buf.push_back(byte);
                    received = true;
                }
                None => break,
            }
        }
        if received {
            sink.raise(self.rx_irq);
        }
        FAST_POLL_CYCLES
    }

    fn drain_tx(&mut self, backend: &mut dyn UartBackend) {
        while let Some(byte) = self.tx_buf.pop_front() {
            backend.write(byte);
        }
    }
}
