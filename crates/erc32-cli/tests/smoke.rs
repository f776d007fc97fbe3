use std::io::Write;
use std::path::PathBuf;
use std::process::Command;

/// `sethi %hi(0), %g0` — the canonical SPARC v8 encoding of a NOP.
const NOP: u32 = 0b00 << 30 | 0b100 << 22;

/// Builds a tiny ROM image that parks each byte of `message` into the MEC's
/// UART A data register (`0x01F800E0`) one at a time, then spins forever.
fn rom_writing(message: &[u8]) -> Vec<u8> {
    let sethi = |rd: u32, imm22: u32| (0b00u32 << 30) | (rd << 25) | (0b100 << 22) | (imm22 & 0x3F_FFFF);
    let or_imm = |rd: u32, rs1: u32, simm13: u32| {
        (0b10u32 << 30) | (rd << 25) | (0x02 << 19) | (rs1 << 14) | (1 << 13) | (simm13 & 0x1FFF)
    };
    let st_word = |rd: u32, rs1: u32, simm13: u32| {
        (0b11u32 << 30) | (rd << 25) | (0x04 << 19) | (rs1 << 14) | (1 << 13) | (simm13 & 0x1FFF)
    };
    let ba_self = 0b00u32 << 30 | (0x8 << 25) | (0b010 << 22); // disp22 == 0

    let uart_a_addr: u32 = 0x01F800E0;
    let mut words = vec![sethi(1, uart_a_addr >> 10), or_imm(1, 1, uart_a_addr & 0x3FF)];
    for &byte in message {
        words.push(or_imm(16, 0, byte as u32)); // mov byte, %l0
        words.push(st_word(16, 1, 0)); // st %l0, [%g1]
    }
    words.push(ba_self);
    words.push(NOP); // delay slot / loop target

    let mut rom = Vec::new();
    for word in words {
        rom.extend_from_slice(&word.to_be_bytes());
    }
    rom
}

fn find_binary() -> PathBuf {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let target_dir = std::env::var_os("CARGO_TARGET_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| manifest_dir.join("../../target"));
    let exe_name = format!("erc32{}", std::env::consts::EXE_SUFFIX);
    let debug_exe = target_dir.join("debug").join(&exe_name);
    let release_exe = target_dir.join("release").join(&exe_name);
    if debug_exe.exists() {
        debug_exe
    } else if release_exe.exists() {
        release_exe
    } else {
        panic!("expected erc32 binary at {} or {}", debug_exe.display(), release_exe.display());
    }
}

#[test]
fn writes_boot_message_to_stdout() {
    let mut rom_file = tempfile::NamedTempFile::new().unwrap();
    rom_file.write_all(&rom_writing(b"OK")).unwrap();

    let output = Command::new(find_binary())
        .args([
            "--rom",
            rom_file.path().to_str().unwrap(),
            "--max-cycles",
            "20000",
            "--batch",
        ])
        .output()
        .expect("failed to run erc32 CLI");

    assert!(
        output.status.success(),
        "erc32 exited with {}\nstderr:\n{}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(
        output.stdout.windows(2).any(|w| w == b"OK"),
        "stdout did not contain the expected boot message.\nstdout:\n{:?}\nstderr:\n{}",
        output.stdout,
        String::from_utf8_lossy(&output.stderr)
    );
}
