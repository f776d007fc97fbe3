//! Host byte-stream bindings for the two UART channels (spec.md §6 "Host
//! byte streams"): a file opened non-blocking, or process stdin/stdout when
//! no device path was configured. A closed/broken backend never panics or
//! propagates into the guest — `try_read` just returns `None` forever and
//! `write` silently drops the byte, matching the documented host-I/O-error
//! policy.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::Path;

use erc32_uart::UartBackend;

fn set_nonblocking(fd: RawFd) {
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL, 0);
        if flags >= 0 {
            libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
        }
    }
}

pub struct HostFileBackend {
    file: Option<File>,
}

impl HostFileBackend {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)?;
        Ok(HostFileBackend { file: Some(file) })
    }
}

impl UartBackend for HostFileBackend {
    fn try_read(&mut self) -> Option<u8> {
        let file = self.file.as_mut()?;
        let mut byte = [0u8; 1];
        match file.read(&mut byte) {
            Ok(1) => Some(byte[0]),
            _ => None,
        }
    }

    fn write(&mut self, byte: u8) {
        if let Some(file) = self.file.as_mut() {
            if file.write_all(&[byte]).is_err() {
                tracing::warn!("UART backing file write failed; treating as a silent sink");
                self.file = None;
            }
        }
    }
}

pub struct StdioBackend {
    stdin: Option<io::Stdin>,
    stdout: io::Stdout,
}

impl StdioBackend {
    pub fn new() -> Self {
        set_nonblocking(io::stdin().as_raw_fd());
        StdioBackend { stdin: Some(io::stdin()), stdout: io::stdout() }
    }
}

impl Default for StdioBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl UartBackend for StdioBackend {
    fn try_read(&mut self) -> Option<u8> {
        let stdin = self.stdin.as_mut()?;
        let mut byte = [0u8; 1];
        match stdin.read(&mut byte) {
            Ok(1) => Some(byte[0]),
            _ => None,
        }
    }

    fn write(&mut self, byte: u8) {
        let _ = self.stdout.write_all(&[byte]);
        let _ = self.stdout.flush();
    }
}

/// Switches the controlling terminal to non-canonical, no-echo mode for the
/// lifetime of the guard and restores the saved settings on drop, so a
/// guest UART reading raw keystrokes never fights the host line discipline.
pub struct TerminalGuard {
    saved: Option<termios::Termios>,
}

impl TerminalGuard {
    pub fn engage() -> Self {
        let fd = io::stdin().as_raw_fd();
        let saved = match termios::Termios::from_fd(fd) {
            Ok(saved) => saved,
            Err(_) => return TerminalGuard { saved: None },
        };
        let mut raw = saved;
        raw.c_lflag &= !(termios::ICANON | termios::ECHO);
        raw.c_cc[termios::VMIN] = 0;
        raw.c_cc[termios::VTIME] = 0;
        if termios::tcsetattr(fd, termios::TCSANOW, &raw).is_err() {
            return TerminalGuard { saved: None };
        }
        TerminalGuard { saved: Some(saved) }
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if let Some(saved) = &self.saved {
            let _ = termios::tcsetattr(io::stdin().as_raw_fd(), termios::TCSANOW, saved);
        }
    }
}
