//! RTC, GPT and watchdog timer channels (spec.md §4.6).
//!
//! Deliberately scheduler-agnostic: a channel only knows how to decode a
//! register write and how to react to its own prescaler expiring. It
//! reports "arm me again in N cycles" as a plain `Option<u64>` return value
//! rather than holding a scheduler handle, so the owning component (the MEC
//! register file) can multiplex RTC, GPT, watchdog and UART events onto one
//! shared `erc32_time::Scheduler` with a single combined event-kind enum,
//! matching spec.md §3's single monotonic event queue.

/// Where a timer delivers its interrupt. Kept separate from
/// `erc32-interrupts` so this crate doesn't need to depend on it; the
/// owning `erc32-mec` crate implements this over its own
/// `InterruptController`.
pub trait InterruptSink {
    fn raise(&mut self, level: u8);
}

/// RTC (level 13, 8-bit scaler) or GPT (level 12, 16-bit scaler). Both
/// registers share the same prescaler/counter/chain-reload shape in
/// erc32.c's `rtc_intr`/`gpt_intr`/`rtc_start`/`gpt_start`.
pub struct PeriodicTimer {
    irq_level: u8,
    scaler_mask: u32,
    reload: u32,
    counter: u32,
    scaler: u32,
    enabled: bool,
    chain_reload: bool,
}

impl PeriodicTimer {
    pub fn rtc() -> Self {
        PeriodicTimer {
            irq_level: 13,
            scaler_mask: 0x0000_00FF,
            reload: 0xFFFF_FFFF,
            counter: 0xFFFF_FFFF,
            scaler: 0xFF,
            enabled: false,
            chain_reload: false,
        }
    }

    pub fn gpt() -> Self {
        PeriodicTimer {
            irq_level: 12,
            scaler_mask: 0x0000_FFFF,
            reload: 0xFFFF_FFFF,
            counter: 0xFFFF_FFFF,
            scaler: 0xFFFF,
            enabled: false,
            chain_reload: false,
        }
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }
    pub fn reload(&self) -> u32 {
        self.reload
    }
    pub fn scaler(&self) -> u32 {
        self.scaler
    }
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_reload(&mut self, value: u32) {
        self.reload = value;
    }

    pub fn set_scaler(&mut self, value: u32) {
        self.scaler = value & self.scaler_mask;
    }

    fn arm_delta(&self) -> u64 {
        self.scaler as u64 + 1
    }

    /// Decode a write to the shared MEC timer-control register for this
    /// channel: `chain_reload`, an optional immediate counter reload, and
    /// the enable bit. Returns `Some(delta)` if the caller must (re)arm a
    /// scheduler event `delta` cycles out — i.e. the channel transitioned
    /// from disabled to enabled.
    #[must_use]
    pub fn set_control(&mut self, chain_reload: bool, reload_now: bool, enable: bool) -> Option<u64> {
        self.chain_reload = chain_reload;
        if reload_now {
            self.counter = self.reload;
        }
        let was_enabled = self.enabled;
        self.enabled = enable;
        if enable && !was_enabled {
            Some(self.arm_delta())
        } else {
            None
        }
    }

    /// The channel's prescaler expired. Returns `Some(delta)` to rearm the
    /// event, `None` if the channel is now idle.
    #[must_use]
    pub fn on_tick(&mut self, sink: &mut impl InterruptSink) -> Option<u64> {
        if self.counter == 0 {
            sink.raise(self.irq_level);
            if self.chain_reload {
                self.counter = self.reload;
            } else {
                self.enabled = false;
            }
        } else {
            self.counter -= 1;
        }
        if self.enabled {
            Some(self.arm_delta())
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WatchdogStatus {
    /// No WDOG register write has happened since reset; `TRAPD` still has
    /// an effect.
    Init,
    /// `TRAPD` was written while `Init`: the watchdog never runs.
    Disabled,
    /// Configured and ticking.
    Enabled,
    /// Was `Disabled` when its last scheduled tick fired; inert until
    /// reconfigured.
    Stopped,
}

/// Watchdog timer: 8-bit prescaler, 16-bit counter, one-shot disable latch.
///
/// Resolves spec.md §9's open question about `TRAPD` semantics: writing it
/// only has an effect while the watchdog is still in its post-reset `Init`
/// state (before the first WDOG configuration write) — exactly erc32.c's
/// `if (wdog_status == init)` guard. Writing `TRAPD` at any later point,
/// including after an underflow, is a silent no-op. This is a deliberate,
/// documented choice (see DESIGN.md) rather than a guess at a richer
/// "disable after N underflows" policy the hardware manual doesn't specify
/// either.
pub struct Watchdog {
    scaler: u8,
    counter: u16,
    reset_delay: u8,
    reset_pending: bool,
    status: WatchdogStatus,
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new()
    }
}

impl Watchdog {
    pub fn new() -> Self {
        Watchdog {
            scaler: 255,
            counter: 0xFFFF,
            reset_delay: 255,
            reset_pending: false,
            status: WatchdogStatus::Init,
        }
    }

    pub fn counter(&self) -> u16 {
        self.counter
    }

    fn arm_delta(&self) -> u64 {
        self.scaler as u64 + 1
    }

    /// Called once at machine reset: the watchdog always starts ticking
    /// immediately, independent of any register write (erc32.c `reset()`).
    /// Returns the delta the caller must arm a scheduler event at.
    #[must_use]
    pub fn start(&self) -> u64 {
        self.arm_delta()
    }

    /// Write to the WDOG control register (MEC offset 0x060). Returns
    /// `Some(delta)` if the caller must (re)arm an event, which happens
    /// only when restarting from `Stopped`.
    #[must_use]
    pub fn configure(&mut self, scaler: u8, counter: u16, reset_delay: u8) -> Option<u64> {
        self.scaler = scaler;
        self.counter = counter;
        self.reset_delay = reset_delay;
        self.reset_pending = false;
        let restart = self.status == WatchdogStatus::Stopped;
        self.status = WatchdogStatus::Enabled;
        if restart {
            Some(self.arm_delta())
        } else {
            None
        }
    }

    /// Write to the TRAPD register (MEC offset 0x064).
    pub fn disable_trap(&mut self) {
        if self.status == WatchdogStatus::Init {
            self.status = WatchdogStatus::Disabled;
        }
    }

    /// Fired when the prescaler expires. Returns `(reset_now, rearm_delta)`:
    /// `reset_now` is `true` if the watchdog must reset the whole
    /// simulator (caller resets every component and sets
    /// `mec_ersr.watchdog_reset`); `rearm_delta` is `Some` if another event
    /// must be scheduled.
    #[must_use]
    pub fn on_tick(&mut self, sink: &mut impl InterruptSink) -> (bool, Option<u64>) {
        if self.status == WatchdogStatus::Disabled {
            self.status = WatchdogStatus::Stopped;
            return (false, None);
        }
        if self.counter > 0 {
            self.counter -= 1;
            return (false, Some(self.arm_delta()));
        }
        if self.reset_pending {
            return (true, None);
        }
        sink.raise(15);
        self.reset_pending = true;
        self.counter = self.reset_delay as u16;
        (false, Some(self.arm_delta()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use erc32_time::Scheduler;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Kind {
        Rtc,
        Gpt,
        Watchdog,
    }

    #[derive(Default)]
    struct Recorder {
        raised: Vec<u8>,
    }
    impl InterruptSink for Recorder {
        fn raise(&mut self, level: u8) {
            self.raised.push(level);
        }
    }

    #[test]
    fn rtc_single_shot_fires_once() {
        let mut scheduler: Scheduler<Kind> = Scheduler::new();
        let mut rtc = PeriodicTimer::rtc();
        let mut sink = Recorder::default();

        rtc.set_scaler(0);
        rtc.set_reload(0);
        if let Some(delta) = rtc.set_control(false, true, true) {
            scheduler.schedule(delta, Kind::Rtc, 0).unwrap();
        }

        scheduler.advance_to(2, |sched, ev| {
            if ev.kind == Kind::Rtc {
                if let Some(delta) = rtc.on_tick(&mut sink) {
                    sched.schedule(delta, Kind::Rtc, 0).unwrap();
                }
            }
        });
        assert_eq!(sink.raised, vec![13]);

        scheduler.advance_to(4, |sched, ev| {
            if ev.kind == Kind::Rtc {
                if let Some(delta) = rtc.on_tick(&mut sink) {
                    sched.schedule(delta, Kind::Rtc, 0).unwrap();
                }
            }
        });
        assert_eq!(sink.raised, vec![13], "one-shot timer must not refire");
    }

    #[test]
    fn timer_law_chain_reload_fires_periodically() {
        let mut scheduler: Scheduler<Kind> = Scheduler::new();
        let mut gpt = PeriodicTimer::gpt();
        let mut sink = Recorder::default();

        let s = 2u32;
        let r = 3u32;
        gpt.set_scaler(s);
        gpt.set_reload(r);
        if let Some(delta) = gpt.set_control(true, true, true) {
            scheduler.schedule(delta, Kind::Gpt, 0).unwrap();
        }

        let period = (s as u64 + 1) * (r as u64 + 1);
        scheduler.advance_to(period * 4, |sched, ev| {
            if ev.kind == Kind::Gpt {
                if let Some(delta) = gpt.on_tick(&mut sink) {
                    sched.schedule(delta, Kind::Gpt, 0).unwrap();
                }
            }
        });
        assert_eq!(sink.raised, vec![12, 12, 12, 12]);
    }

    #[test]
    fn watchdog_resets_if_not_serviced() {
        let mut scheduler: Scheduler<Kind> = Scheduler::new();
        let mut wdog = Watchdog::new();
        let mut sink = Recorder::default();

        // mirrors erc32.c's reset(), which always starts the watchdog.
        scheduler.schedule(wdog.start(), Kind::Watchdog, 0).unwrap();
        let _ = wdog.configure(0, 1, 0);

        let mut reset_fired = false;
        scheduler.advance_to(10, |sched, ev| {
            if ev.kind == Kind::Watchdog && !reset_fired {
                let (reset, rearm) = wdog.on_tick(&mut sink);
                reset_fired = reset;
                if let Some(delta) = rearm {
                    sched.schedule(delta, Kind::Watchdog, 0).unwrap();
                }
            }
        });
        assert!(reset_fired);
        assert_eq!(sink.raised, vec![15]);
    }

    #[test]
    fn trap_disable_only_effective_before_first_configure() {
        let mut scheduler: Scheduler<Kind> = Scheduler::new();
        let mut wdog = Watchdog::new();
        let mut sink = Recorder::default();

        wdog.disable_trap();
        scheduler.schedule(wdog.start(), Kind::Watchdog, 0).unwrap();
        let _ = wdog.configure(0, 0, 0); // moves past Init
        wdog.disable_trap(); // no-op now

        let mut reset_fired = false;
        scheduler.advance_to(5, |sched, ev| {
            if ev.kind == Kind::Watchdog && !reset_fired {
                let (reset, rearm) = wdog.on_tick(&mut sink);
                reset_fired = reset;
                if let Some(delta) = rearm {
                    sched.schedule(delta, Kind::Watchdog, 0).unwrap();
                }
            }
        });
        assert!(
            reset_fired,
            "TRAPD written before Init ended should not suppress a later reset"
        );
    }
}
