use erc32_mem::{asi, MecWindow, MemFault, MemorySubsystem};

use crate::decode::{decode, AluOp, Decoded, LoadWidth, Operand, SpecialReg};
use crate::psr::{self, Icc, NWINDOWS};
use crate::trap::{self, TrapKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Executed,
    Trapped(TrapKind),
    /// A trap occurred with traps already disabled: the core halts until
    /// [`CpuCore::reset`] is called again (SPARC v8 §7.5.1 error mode).
    ErrorMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepResult {
    pub outcome: StepOutcome,
    pub cycles: u32,
}

/// SPARC v8 integer unit: register windows, PSR/WIM/TBR/Y, the decode and
/// execute loop, and trap delivery. Carries no scheduler of its own — every
/// [`StepResult`] reports the cycle cost for the caller (erc32-machine) to
/// apply to the shared time base.
#[derive(Debug, Clone)]
pub struct CpuCore {
    globals: [u32; 8],
    /// `windows[w][0..8]` are window `w`'s out registers, `windows[w][8..16]`
    /// its locals. Window `w`'s in registers alias window `(w+1)%N`'s outs.
    windows: [[u32; 16]; NWINDOWS as usize],
    psr: u32,
    wim: u32,
    tbr: u32,
    y: u32,
    pc: u32,
    npc: u32,
    pending_irq: u8,
    error_mode: bool,
}

impl Default for CpuCore {
    fn default() -> Self {
        let mut cpu = CpuCore {
            globals: [0; 8],
            windows: [[0; 16]; NWINDOWS as usize],
            psr: 0,
            wim: 0,
            tbr: 0,
            y: 0,
            pc: 0,
            npc: 4,
            pending_irq: 0,
            error_mode: false,
        };
        cpu.reset();
        cpu
    }
}

impl CpuCore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scenario S1: pc=0, npc=4, supervisor mode, traps and interrupts
    /// masked at reset, no window or trap state carried over.
    pub fn reset(&mut self) {
        self.globals = [0; 8];
        self.windows = [[0; 16]; NWINDOWS as usize];
        self.psr = psr::S;
        self.wim = 0;
        self.tbr = 0;
        self.y = 0;
        self.pc = 0;
        self.npc = 4;
        self.pending_irq = 0;
        self.error_mode = false;
    }

    pub fn pc(&self) -> u32 {
        self.pc
    }
    pub fn npc(&self) -> u32 {
        self.npc
    }
    pub fn psr(&self) -> u32 {
        self.psr
    }
    pub fn wim(&self) -> u32 {
        self.wim
    }
    pub fn tbr(&self) -> u32 {
        self.tbr
    }
    pub fn y(&self) -> u32 {
        self.y
    }
    pub fn is_halted(&self) -> bool {
        self.error_mode
    }

    /// Level 1-15, or 0 to deassert. The priority encoder (erc32-mec) is
    /// responsible for withdrawing a level once it has been acknowledged;
    /// this core never auto-clears a pending level on its own.
    pub fn inject_irq(&mut self, level: u8) {
        self.pending_irq = level;
    }

    pub fn read_reg(&self, n: u32) -> u32 {
        match n {
            0 => 0,
            1..=7 => self.globals[n as usize],
            8..=31 => self.windows[self.window_for(n)][((n - 8) % 24 % 16) as usize],
            _ => unreachable!(),
        }
    }

    fn write_reg(&mut self, n: u32, value: u32) {
        match n {
            0 => {}
            1..=7 => self.globals[n as usize] = value,
            8..=31 => {
                let w = self.window_for(n);
                self.windows[w][((n - 8) % 24 % 16) as usize] = value;
            }
            _ => unreachable!(),
        }
    }

    /// Out (8-15) and local (16-23) registers live in the current window;
    /// in registers (24-31) alias the next window's outs — `SAVE` decrements
    /// `CWP` to enter a new window, so the caller it left behind sits at
    /// `CWP+1`, and that is where the new window's ins are read from.
    fn window_for(&self, n: u32) -> usize {
        let cwp = psr::cwp(self.psr) as usize;
        if n <= 23 {
            cwp
        } else {
            (cwp + 1) % NWINDOWS as usize
        }
    }

    fn operand_value(&self, op: Operand) -> u32 {
        match op {
            Operand::Reg(r) => self.read_reg(r),
            Operand::Imm(i) => i as u32,
        }
    }

    fn data_asi(&self) -> u8 {
        if psr::supervisor(self.psr) {
            asi::SUPERVISOR_DATA
        } else {
            asi::USER_DATA
        }
    }

    /// Every physical cause erc32-mem can report — protection, unimplemented
    /// address, MEC access-size/ASI mismatch, ROM write-disabled — surfaces
    /// through the same SPARC data_access_exception trap; erc32-mec's SFSR
    /// is what records which one it actually was.
    fn fault_trap(_fault: MemFault) -> TrapKind {
        TrapKind::DataAccessException
    }

    /// Runs instructions until one doesn't execute normally (trap taken or
    /// error mode entered) or `max_steps` is exhausted, whichever first.
    pub fn run_until_event<M: MecWindow>(
        &mut self,
        mem: &mut MemorySubsystem<M>,
        max_steps: u64,
    ) -> StepResult {
        let mut total = 0u32;
        for _ in 0..max_steps {
            let r = self.step_one(mem);
            total = total.saturating_add(r.cycles);
            if r.outcome != StepOutcome::Executed {
                return StepResult { outcome: r.outcome, cycles: total };
            }
        }
        StepResult { outcome: StepOutcome::Executed, cycles: total }
    }

    pub fn step_one<M: MecWindow>(&mut self, mem: &mut MemorySubsystem<M>) -> StepResult {
        if self.error_mode {
            return StepResult { outcome: StepOutcome::ErrorMode, cycles: 0 };
        }

        if self.pending_irq > 0
            && psr::traps_enabled(self.psr)
            && (self.pending_irq == 15 || self.pending_irq > psr::pil(self.psr))
        {
            return self.enter_trap(TrapKind::InterruptLevel(self.pending_irq), 0);
        }

        let (word, fetch_cycles) = match mem.read(self.data_asi(), self.pc, 4) {
            Ok((v, c)) => (v as u32, c),
            Err(_fault) => return self.enter_trap(TrapKind::InstructionAccessException, 0),
        };
        if self.pc % 4 != 0 {
            return self.enter_trap(TrapKind::MemAddressNotAligned, fetch_cycles);
        }

        self.execute(decode(word), mem, fetch_cycles)
    }

    fn enter_trap(&mut self, kind: TrapKind, cycles: u32) -> StepResult {
        if !psr::traps_enabled(self.psr) {
            self.error_mode = true;
            return StepResult { outcome: StepOutcome::ErrorMode, cycles };
        }

        let old_psr = self.psr;
        let new_cwp = (psr::cwp(old_psr) + NWINDOWS - 1) % NWINDOWS;
        self.psr = psr::with_cwp(old_psr, new_cwp);
        self.write_reg(17, self.pc);
        self.write_reg(18, self.npc);

        let was_supervisor = psr::supervisor(old_psr);
        self.psr &= !(psr::S | psr::PS | psr::ET);
        self.psr |= psr::S;
        if was_supervisor {
            self.psr |= psr::PS;
        }

        self.tbr = trap::vector(self.tbr, kind);
        self.pc = self.tbr;
        self.npc = self.tbr.wrapping_add(4);

        StepResult { outcome: StepOutcome::Trapped(kind), cycles }
    }

    fn alu_result(op: AluOp, a: u32, b: u32) -> (u32, Icc) {
        match op {
            AluOp::Add => {
                let (result, carry) = a.overflowing_add(b);
                let (_, overflow) = (a as i32).overflowing_add(b as i32);
                (result, Icc { n: (result as i32) < 0, z: result == 0, v: overflow, c: carry })
            }
            AluOp::Sub => {
                let result = a.wrapping_sub(b);
                let (_, overflow) = (a as i32).overflowing_sub(b as i32);
                let carry = (a as u64) < (b as u64);
                (result, Icc { n: (result as i32) < 0, z: result == 0, v: overflow, c: carry })
            }
            AluOp::And | AluOp::Or | AluOp::Xor | AluOp::Andn | AluOp::Orn | AluOp::Xnor => {
                let result = match op {
                    AluOp::And => a & b,
                    AluOp::Or => a | b,
                    AluOp::Xor => a ^ b,
                    AluOp::Andn => a & !b,
                    AluOp::Orn => a | !b,
                    AluOp::Xnor => !(a ^ b),
                    _ => unreachable!(),
                };
                (result, Icc { n: (result as i32) < 0, z: result == 0, v: false, c: false })
            }
            AluOp::Sll => (a.wrapping_shl(b & 0x1F), psr::icc(0)),
            AluOp::Srl => (a.wrapping_shr(b & 0x1F), psr::icc(0)),
            AluOp::Sra => (((a as i32).wrapping_shr(b & 0x1F)) as u32, psr::icc(0)),
        }
    }

    fn execute<M: MecWindow>(
        &mut self,
        insn: Decoded,
        mem: &mut MemorySubsystem<M>,
        base_cycles: u32,
    ) -> StepResult {
        let pc = self.pc;
        let npc = self.npc;

        match insn {
            Decoded::Illegal | Decoded::Unimp => self.enter_trap(TrapKind::IllegalInstruction, base_cycles),

            Decoded::Sethi { rd, imm22 } => {
                self.write_reg(rd, imm22 << 10);
                self.advance(npc, npc.wrapping_add(4));
                StepResult { outcome: StepOutcome::Executed, cycles: base_cycles }
            }

            Decoded::Branch { annul, cond, disp22 } => {
                let taken = psr::test_cond(cond, psr::icc(self.psr));
                let target = pc.wrapping_add(disp22 as u32);
                if cond == 0x8 && annul {
                    // BA,a always annuls its delay slot.
                    self.advance(npc.wrapping_add(4), npc.wrapping_add(8));
                } else if taken {
                    self.advance(npc, target);
                } else if annul {
                    self.advance(npc.wrapping_add(4), npc.wrapping_add(8));
                } else {
                    self.advance(npc, npc.wrapping_add(4));
                }
                StepResult { outcome: StepOutcome::Executed, cycles: base_cycles }
            }

            Decoded::Call { disp30 } => {
                self.write_reg(15, pc);
                self.advance(npc, pc.wrapping_add(disp30 as u32));
                StepResult { outcome: StepOutcome::Executed, cycles: base_cycles }
            }

            Decoded::Alu { op, cc, rd, rs1, rs2 } => {
                let a = self.read_reg(rs1);
                let b = self.operand_value(rs2);
                let (result, icc) = Self::alu_result(op, a, b);
                self.write_reg(rd, result);
                if cc {
                    self.psr = psr::set_icc(self.psr, icc);
                }
                self.advance(npc, npc.wrapping_add(4));
                StepResult { outcome: StepOutcome::Executed, cycles: base_cycles }
            }

            Decoded::Rd { reg, rd } => {
                if reg != SpecialReg::Y && !psr::supervisor(self.psr) {
                    return self.enter_trap(TrapKind::PrivilegedInstruction, base_cycles);
                }
                let value = match reg {
                    SpecialReg::Y => self.y,
                    SpecialReg::Psr => self.psr,
                    SpecialReg::Wim => self.wim,
                    SpecialReg::Tbr => self.tbr,
                };
                self.write_reg(rd, value);
                self.advance(npc, npc.wrapping_add(4));
                StepResult { outcome: StepOutcome::Executed, cycles: base_cycles }
            }

            Decoded::Wr { reg, rs1, rs2 } => {
                if reg != SpecialReg::Y && !psr::supervisor(self.psr) {
                    return self.enter_trap(TrapKind::PrivilegedInstruction, base_cycles);
                }
                let value = self.read_reg(rs1) ^ self.operand_value(rs2);
                match reg {
                    SpecialReg::Y => self.y = value,
                    SpecialReg::Psr => self.psr = value,
                    SpecialReg::Wim => self.wim = value & ((1 << NWINDOWS) - 1),
                    SpecialReg::Tbr => self.tbr = value & 0xFFFF_F000,
                }
                self.advance(npc, npc.wrapping_add(4));
                StepResult { outcome: StepOutcome::Executed, cycles: base_cycles }
            }

            Decoded::Save { rd, rs1, rs2 } => {
                let sum = self.read_reg(rs1).wrapping_add(self.operand_value(rs2));
                let new_cwp = (psr::cwp(self.psr) + NWINDOWS - 1) % NWINDOWS;
                if self.wim & (1 << new_cwp) != 0 {
                    return self.enter_trap(TrapKind::WindowOverflow, base_cycles);
                }
                self.psr = psr::with_cwp(self.psr, new_cwp);
                self.write_reg(rd, sum);
                self.advance(npc, npc.wrapping_add(4));
                StepResult { outcome: StepOutcome::Executed, cycles: base_cycles }
            }

            Decoded::Restore { rd, rs1, rs2 } => {
                let sum = self.read_reg(rs1).wrapping_add(self.operand_value(rs2));
                let new_cwp = (psr::cwp(self.psr) + 1) % NWINDOWS;
                if self.wim & (1 << new_cwp) != 0 {
                    return self.enter_trap(TrapKind::WindowUnderflow, base_cycles);
                }
                self.psr = psr::with_cwp(self.psr, new_cwp);
                self.write_reg(rd, sum);
                self.advance(npc, npc.wrapping_add(4));
                StepResult { outcome: StepOutcome::Executed, cycles: base_cycles }
            }

            Decoded::Jmpl { rd, rs1, rs2 } => {
                let target = self.read_reg(rs1).wrapping_add(self.operand_value(rs2));
                if target % 4 != 0 {
                    return self.enter_trap(TrapKind::MemAddressNotAligned, base_cycles);
                }
                self.write_reg(rd, pc);
                self.advance(npc, target);
                StepResult { outcome: StepOutcome::Executed, cycles: base_cycles }
            }

            Decoded::Rett { rs1, rs2 } => {
                if !psr::supervisor(self.psr) {
                    return self.enter_trap(TrapKind::PrivilegedInstruction, base_cycles);
                }
                if psr::traps_enabled(self.psr) {
                    return self.enter_trap(TrapKind::IllegalInstruction, base_cycles);
                }
                let target = self.read_reg(rs1).wrapping_add(self.operand_value(rs2));
                if target % 4 != 0 {
                    return self.enter_trap(TrapKind::MemAddressNotAligned, base_cycles);
                }
                let new_cwp = (psr::cwp(self.psr) + 1) % NWINDOWS;
                if self.wim & (1 << new_cwp) != 0 {
                    return self.enter_trap(TrapKind::WindowUnderflow, base_cycles);
                }
                let restored_s = self.psr & psr::PS != 0;
                self.psr = psr::with_cwp(self.psr, new_cwp);
                self.psr &= !(psr::S | psr::ET);
                if restored_s {
                    self.psr |= psr::S;
                }
                self.psr |= psr::ET;
                self.advance(npc, target);
                StepResult { outcome: StepOutcome::Executed, cycles: base_cycles }
            }

            Decoded::Ticc { cond, rs1, rs2 } => {
                if psr::test_cond(cond, psr::icc(self.psr)) {
                    let sw = self.read_reg(rs1).wrapping_add(self.operand_value(rs2)) & 0x7F;
                    self.enter_trap(TrapKind::TrapInstruction(sw as u8), base_cycles)
                } else {
                    self.advance(npc, npc.wrapping_add(4));
                    StepResult { outcome: StepOutcome::Executed, cycles: base_cycles }
                }
            }

            Decoded::Load { width, rd, rs1, rs2 } => {
                let addr = self.read_reg(rs1).wrapping_add(self.operand_value(rs2));
                let size = match width {
                    LoadWidth::Byte | LoadWidth::UByte | LoadWidth::SByte => 1,
                    LoadWidth::Half | LoadWidth::UHalf | LoadWidth::SHalf => 2,
                    LoadWidth::Word => 4,
                    LoadWidth::DWord => 8,
                };
                if addr % size as u32 != 0 {
                    return self.enter_trap(TrapKind::MemAddressNotAligned, base_cycles);
                }
                let (raw, extra) = match mem.read(self.data_asi(), addr, size) {
                    Ok(v) => v,
                    Err(fault) => return self.enter_trap(Self::fault_trap(fault), base_cycles),
                };
                let value = match width {
                    LoadWidth::UByte | LoadWidth::Byte => raw as u8 as u32,
                    LoadWidth::SByte => (raw as u8 as i8) as i32 as u32,
                    LoadWidth::UHalf | LoadWidth::Half => raw as u16 as u32,
                    LoadWidth::SHalf => (raw as u16 as i16) as i32 as u32,
                    LoadWidth::Word => raw as u32,
                    LoadWidth::DWord => {
                        self.write_reg(rd | 1, raw as u32);
                        (raw >> 32) as u32
                    }
                };
                self.write_reg(rd, value);
                self.advance(npc, npc.wrapping_add(4));
                StepResult { outcome: StepOutcome::Executed, cycles: base_cycles + extra }
            }

            Decoded::Store { width, rd, rs1, rs2 } => {
                let addr = self.read_reg(rs1).wrapping_add(self.operand_value(rs2));
                let size = match width {
                    LoadWidth::Byte => 1,
                    LoadWidth::Half => 2,
                    LoadWidth::Word => 4,
                    LoadWidth::DWord => 8,
                    _ => unreachable!("decode never produces an unsigned/signed store width"),
                };
                if addr % size as u32 != 0 {
                    return self.enter_trap(TrapKind::MemAddressNotAligned, base_cycles);
                }
                let data = if size == 8 {
                    ((self.read_reg(rd) as u64) << 32) | self.read_reg(rd | 1) as u64
                } else {
                    self.read_reg(rd) as u64
                };
                let extra = match mem.write(self.data_asi(), addr, size, data) {
                    Ok(c) => c,
                    Err(fault) => return self.enter_trap(Self::fault_trap(fault), base_cycles),
                };
                self.advance(npc, npc.wrapping_add(4));
                StepResult { outcome: StepOutcome::Executed, cycles: base_cycles + extra }
            }
        }
    }

    fn advance(&mut self, new_pc: u32, new_npc: u32) {
        self.pc = new_pc;
        self.npc = new_npc;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use erc32_mem::{MemFault, RAM_BASE_DEFAULT, RAM_SIZE_MIN, ROM_SIZE_MIN};

    struct NoMec;
    impl MecWindow for NoMec {
        fn mec_read(&mut self, offset: u32, asi: u8) -> Result<u32, MemFault> {
            Err(MemFault {
                kind: erc32_mem::FaultKind::MecAccess,
                addr: offset,
                asi,
                write: false,
            })
        }
        fn mec_write(&mut self, offset: u32, asi: u8, _data: u32) -> Result<(), MemFault> {
            Err(MemFault {
                kind: erc32_mem::FaultKind::MecAccess,
                addr: offset,
                asi,
                write: true,
            })
        }
        fn record_fault(&mut self, _fault: MemFault) {}
    }

    fn harness() -> (CpuCore, MemorySubsystem<NoMec>) {
        let cpu = CpuCore::new();
        let mut mem = MemorySubsystem::new(ROM_SIZE_MIN, RAM_SIZE_MIN, RAM_BASE_DEFAULT, NoMec);
        mem.set_rom_write_enabled(true);
        (cpu, mem)
    }

    fn asm_at(mem: &mut MemorySubsystem<NoMec>, addr: u32, word: u32) {
        mem.write(asi::SUPERVISOR_DATA, addr, 4, word as u64).unwrap();
    }

    #[test]
    fn reset_matches_scenario_s1() {
        let cpu = CpuCore::new();
        assert_eq!(cpu.pc(), 0);
        assert_eq!(cpu.npc(), 4);
        assert!(psr::supervisor(cpu.psr()));
        assert!(!psr::traps_enabled(cpu.psr()));
    }

    #[test]
    fn add_sets_condition_codes() {
        let (mut cpu, mut mem) = harness();
        // add %g1, -1, %g1 ; rd=1 rs1=1 op3=add simm13=-1
        let word = (0b10 << 30) | (1 << 25) | (0x00 << 19) | (1 << 14) | (1 << 13) | 0x1FFF;
        asm_at(&mut mem, 0, word);
        let r = cpu.step_one(&mut mem);
        assert_eq!(r.outcome, StepOutcome::Executed);
        assert_eq!(cpu.read_reg(1), 0xFFFF_FFFF);
    }

    #[test]
    fn taken_branch_executes_delay_slot_then_jumps() {
        let (mut cpu, mut mem) = harness();
        // ba,a label (annulled, always-taken) with disp22 pointing 2 words ahead
        let disp_words = 2i32;
        let word = (0b00u32 << 30) | (1 << 29) | (0x8 << 25) | (0b010 << 22) | ((disp_words as u32) & 0x3F_FFFF);
        asm_at(&mut mem, 0, word);
        let r1 = cpu.step_one(&mut mem);
        assert_eq!(r1.outcome, StepOutcome::Executed);
        // BA,a annuls the delay slot: pc jumps straight to pc+4, skipping npc.
        assert_eq!(cpu.pc(), 4);
        assert_eq!(cpu.npc(), 8);
    }

    #[test]
    fn save_then_restore_round_trips_window_pointer() {
        let (mut cpu, mut mem) = harness();
        let initial_cwp = psr::cwp(cpu.psr());
        // save %sp, -96, %sp  (rd=rs1=14, simm13=-96)
        let save = (0b10 << 30) | (14 << 25) | (0x3C << 19) | (14 << 14) | (1 << 13) | ((-96i32 as u32) & 0x1FFF);
        asm_at(&mut mem, 0, save);
        cpu.step_one(&mut mem);
        assert_eq!(psr::cwp(cpu.psr()), (initial_cwp + NWINDOWS - 1) % NWINDOWS);

        // restore %sp, 96, %sp
        let restore = (0b10 << 30) | (14 << 25) | (0x3D << 19) | (14 << 14) | (1 << 13) | 96;
        asm_at(&mut mem, 4, restore);
        cpu.step_one(&mut mem);
        assert_eq!(psr::cwp(cpu.psr()), initial_cwp);
    }

    #[test]
    fn ticc_taken_enters_trap_and_saves_return_pc() {
        let (mut cpu, mut mem) = harness();
        // ta 1 (trap always, software trap 1): cond=0x8(BA) rs1=0 imm=1
        let word = (0b10 << 30) | (0x8 << 25) | (0x3A << 19) | (1 << 13) | 1;
        asm_at(&mut mem, 0, word);
        let r = cpu.step_one(&mut mem);
        match r.outcome {
            StepOutcome::Trapped(TrapKind::TrapInstruction(1)) => {}
            other => panic!("expected software trap 1, got {other:?}"),
        }
        assert_eq!(cpu.read_reg(17), 0); // saved pc
        assert_eq!(cpu.read_reg(18), 4); // saved npc
        assert!(psr::supervisor(cpu.psr()));
        assert!(!psr::traps_enabled(cpu.psr()));
    }

    #[test]
    fn trap_while_traps_disabled_enters_error_mode() {
        let (mut cpu, mut mem) = harness();
        // Two back-to-back `ta 1` instructions: the second trap fires with
        // ET already cleared by the first trap's entry.
        let ta1 = (0b10 << 30) | (0x8 << 25) | (0x3A << 19) | (1 << 13) | 1;
        asm_at(&mut mem, 0, ta1);
        asm_at(&mut mem, cpu.tbr().wrapping_add(4), ta1);
        cpu.step_one(&mut mem);
        let r = cpu.step_one(&mut mem);
        assert_eq!(r.outcome, StepOutcome::ErrorMode);
        assert!(cpu.is_halted());
    }

    #[test]
    fn external_interrupt_is_masked_below_pil() {
        let (mut cpu, mut mem) = harness();
        asm_at(&mut mem, 0, (0b00u32 << 30) | (1 << 25) | (0b100 << 22)); // sethi
        cpu.psr |= psr::ET | (5 << psr::PIL_SHIFT);
        cpu.inject_irq(3);
        let r = cpu.step_one(&mut mem);
        assert_eq!(r.outcome, StepOutcome::Executed, "level 3 must stay masked under pil=5");
    }

    #[test]
    fn external_interrupt_above_pil_is_taken() {
        let (mut cpu, mut mem) = harness();
        cpu.psr |= psr::ET;
        cpu.inject_irq(9);
        let r = cpu.step_one(&mut mem);
        assert_eq!(r.outcome, StepOutcome::Trapped(TrapKind::InterruptLevel(9)));
    }
}
