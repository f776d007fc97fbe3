//! PSR (processor state register) field layout, SPARC v8 §4.2.

/// Condition-code bits, `psr[23:20]`.
pub const ICC_SHIFT: u32 = 20;
pub const ICC_N: u32 = 1 << 23;
pub const ICC_Z: u32 = 1 << 22;
pub const ICC_V: u32 = 1 << 21;
pub const ICC_C: u32 = 1 << 20;

pub const EC: u32 = 1 << 13;
pub const EF: u32 = 1 << 12;
pub const PIL_SHIFT: u32 = 8;
pub const PIL_MASK: u32 = 0xF << PIL_SHIFT;
pub const S: u32 = 1 << 7;
pub const PS: u32 = 1 << 6;
pub const ET: u32 = 1 << 5;
pub const CWP_MASK: u32 = 0x1F;

pub const IMPL_VER: u32 = 0xF000_0000; // impl/ver: ERC32 reports 0 for both.

/// Number of overlapping SPARC register windows ERC32 implements.
pub const NWINDOWS: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Icc {
    pub n: bool,
    pub z: bool,
    pub v: bool,
    pub c: bool,
}

pub fn icc(psr: u32) -> Icc {
    Icc {
        n: psr & ICC_N != 0,
        z: psr & ICC_Z != 0,
        v: psr & ICC_V != 0,
        c: psr & ICC_C != 0,
    }
}

pub fn set_icc(psr: u32, icc: Icc) -> u32 {
    let mut p = psr & !(ICC_N | ICC_Z | ICC_V | ICC_C);
    if icc.n {
        p |= ICC_N;
    }
    if icc.z {
        p |= ICC_Z;
    }
    if icc.v {
        p |= ICC_V;
    }
    if icc.c {
        p |= ICC_C;
    }
    p
}

pub fn cwp(psr: u32) -> u32 {
    psr & CWP_MASK
}

pub fn with_cwp(psr: u32, new_cwp: u32) -> u32 {
    (psr & !CWP_MASK) | (new_cwp % NWINDOWS)
}

pub fn supervisor(psr: u32) -> bool {
    psr & S != 0
}

pub fn traps_enabled(psr: u32) -> bool {
    psr & ET != 0
}

pub fn pil(psr: u32) -> u8 {
    ((psr & PIL_MASK) >> PIL_SHIFT) as u8
}

/// Evaluate one of the 16 `Bicc`/`Ticc` integer condition codes against the
/// current `icc` bits.
pub fn test_cond(cond: u32, icc: Icc) -> bool {
    match cond & 0xF {
        0x8 => true,                                   // BA / always
        0x0 => false,                                   // BN / never
        0x9 => !icc.z,                                  // BNE
        0x1 => icc.z,                                   // BE
        0xA => !(icc.z || (icc.n != icc.v)),            // BG
        0x2 => icc.z || (icc.n != icc.v),               // BLE
        0xB => !(icc.n != icc.v),                       // BGE
        0x3 => icc.n != icc.v,                          // BL
        0xC => !(icc.c || icc.z),                       // BGU
        0x4 => icc.c || icc.z,                          // BLEU
        0xD => !icc.c,                                  // BCC
        0x5 => icc.c,                                   // BCS
        0xE => !icc.n,                                  // BPOS
        0x6 => icc.n,                                   // BNEG
        0xF => !icc.v,                                  // BVC
        0x7 => icc.v,                                   // BVS
        _ => unreachable!(),
    }
}
