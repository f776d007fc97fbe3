//! SPARC v8 integer unit for the ERC32 core: register windows, the PSR/WIM/
//! TBR layout, instruction decode, and the trap delivery pipeline.
//!
//! This crate knows nothing about scheduling or devices. [`CpuCore::step_one`]
//! takes the memory subsystem it needs for the one instruction it executes
//! and returns a [`StepResult`] reporting the cycle cost; the caller
//! (erc32-machine) drives the shared time base and wires up interrupts via
//! [`CpuCore::inject_irq`].

pub mod cpu;
pub mod decode;
pub mod psr;
pub mod trap;

pub use cpu::{CpuCore, StepOutcome, StepResult};
pub use decode::{decode, AluOp, Decoded, LoadWidth, Operand, SpecialReg};
pub use trap::TrapKind;
