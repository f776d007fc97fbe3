//! The ERC32 board: wires the CPU, memory subsystem, MEC and host UART
//! bindings together behind a single [`Machine`] and drives the shared
//! cycle clock ([`erc32_time::Scheduler`]) that the device crates schedule
//! against.

pub mod config;
pub mod host_uart;
pub mod machine;

pub use config::MachineConfig;
pub use machine::{Machine, MachineError, RunOutcome};
