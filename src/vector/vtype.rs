// Vector typing state: element width, register grouping, rounding mode
//
// The same register bytes are reinterpreted at 8/16/32/64 bits depending on
// the selected width, so everything that depends on width hangs off `Sew`.

use std::fmt;

use crate::config::ELEN;

/// Selected (or effective) element width
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Sew {
    E8,
    E16,
    E32,
    E64,
}

impl Sew {
    pub const ALL: [Sew; 4] = [Sew::E8, Sew::E16, Sew::E32, Sew::E64];

    /// Decode the 3-bit `vsew` field of `vtype`
    pub fn from_vsew(vsew: u64) -> Option<Self> {
        match vsew {
            0 => Some(Self::E8),
            1 => Some(Self::E16),
            2 => Some(Self::E32),
            3 => Some(Self::E64),
            _ => None,
        }
    }

    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            8 => Some(Self::E8),
            16 => Some(Self::E16),
            32 => Some(Self::E32),
            64 => Some(Self::E64),
            _ => None,
        }
    }

    pub fn vsew(self) -> u64 {
        self as u64
    }

    pub fn bits(self) -> u32 {
        8 << self as u32
    }

    pub fn bytes(self) -> usize {
        1 << self as usize
    }

    /// log2 of the width in bytes
    pub fn shift(self) -> i8 {
        self as i8
    }

    /// All-ones value of this width
    pub fn mask(self) -> u64 {
        u64::MAX >> (64 - self.bits())
    }

    pub fn trunc(self, val: u64) -> u64 {
        val & self.mask()
    }

    pub fn sext(self, val: u64) -> i64 {
        match self {
            Self::E8 => val as u8 as i8 as i64,
            Self::E16 => val as u16 as i16 as i64,
            Self::E32 => val as u32 as i32 as i64,
            Self::E64 => val as i64,
        }
    }

    pub fn signed_max(self) -> i64 {
        i64::MAX >> (64 - self.bits())
    }

    pub fn signed_min(self) -> i64 {
        i64::MIN >> (64 - self.bits())
    }

    /// Double width, if it still fits in ELEN
    pub fn widen(self) -> Option<Self> {
        match self {
            Self::E8 => Some(Self::E16),
            Self::E16 => Some(Self::E32),
            Self::E32 => Some(Self::E64),
            Self::E64 => None,
        }
    }

    pub fn narrow(self) -> Option<Self> {
        match self {
            Self::E8 => None,
            Self::E16 => Some(Self::E8),
            Self::E32 => Some(Self::E16),
            Self::E64 => Some(Self::E32),
        }
    }
}

impl fmt::Display for Sew {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.bits())
    }
}

/// Register grouping multiplier (LMUL or an operand's EMUL)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Lmul {
    Mf8,
    Mf4,
    Mf2,
    M1,
    M2,
    M4,
    M8,
}

/// Effective grouping of one operand; same value space as LMUL
pub type Emul = Lmul;

impl Lmul {
    pub const ALL: [Lmul; 7] = [
        Lmul::Mf8,
        Lmul::Mf4,
        Lmul::Mf2,
        Lmul::M1,
        Lmul::M2,
        Lmul::M4,
        Lmul::M8,
    ];

    /// Decode the 3-bit `vlmul` field. Encoding 0b100 is reserved.
    pub fn from_vlmul(vlmul: u64) -> Option<Self> {
        match vlmul {
            0 => Some(Self::M1),
            1 => Some(Self::M2),
            2 => Some(Self::M4),
            3 => Some(Self::M8),
            5 => Some(Self::Mf8),
            6 => Some(Self::Mf4),
            7 => Some(Self::Mf2),
            _ => None,
        }
    }

    pub fn vlmul(self) -> u64 {
        (self.log2() as u64) & 0x7
    }

    pub fn log2(self) -> i8 {
        self as i8 - 3
    }

    /// `None` when the multiplier falls outside 1/8..=8
    pub fn from_log2(log2: i8) -> Option<Self> {
        match log2 {
            -3 => Some(Self::Mf8),
            -2 => Some(Self::Mf4),
            -1 => Some(Self::Mf2),
            0 => Some(Self::M1),
            1 => Some(Self::M2),
            2 => Some(Self::M4),
            3 => Some(Self::M8),
            _ => None,
        }
    }

    pub fn is_fractional(self) -> bool {
        self.log2() < 0
    }

    /// Whole registers occupied by one group (fractional groups occupy one)
    pub fn regs(self) -> usize {
        1 << self.log2().max(0)
    }

    /// Grouping of an operand with width `eew` under `sew`/`self`:
    /// EMUL = (EEW / SEW) * LMUL
    pub fn scaled(self, sew: Sew, eew: Sew) -> Option<Emul> {
        Self::from_log2(self.log2() + eew.shift() - sew.shift())
    }

    /// Maximum element count for elements of width `sew` in a `vlen`-bit machine
    pub fn vlmax(self, vlen: usize, sew: Sew) -> usize {
        let per_reg = vlen / sew.bits() as usize;
        let log2 = self.log2();
        if log2 >= 0 {
            per_reg << log2
        } else {
            per_reg >> -log2
        }
    }
}

impl fmt::Display for Lmul {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let log2 = self.log2();
        if log2 >= 0 {
            write!(f, "m{}", 1 << log2)
        } else {
            write!(f, "mf{}", 1 << -log2)
        }
    }
}

/// Fixed-point rounding mode (`vxrm`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Vxrm {
    /// Round to nearest, ties up
    #[default]
    Rnu,
    /// Round to nearest, ties to even
    Rne,
    /// Round down (truncate)
    Rdn,
    /// Round to odd ("jam")
    Rod,
}

impl Vxrm {
    pub const ALL: [Vxrm; 4] = [Vxrm::Rnu, Vxrm::Rne, Vxrm::Rdn, Vxrm::Rod];

    /// Decode the low two bits, as the `vxrm` CSR does on write
    pub fn from_bits(bits: u64) -> Self {
        match bits & 3 {
            0 => Self::Rnu,
            1 => Self::Rne,
            2 => Self::Rdn,
            _ => Self::Rod,
        }
    }

    pub fn bits(self) -> u64 {
        self as u64
    }
}

/// Decoded vtype fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vtype {
    pub sew: Sew,
    pub lmul: Lmul,
    pub vta: bool,
    pub vma: bool,
    pub vill: bool,
}

impl Default for Vtype {
    fn default() -> Self {
        VILL_TYPE
    }
}

const VILL_TYPE: Vtype = Vtype {
    sew: Sew::E8,
    lmul: Lmul::M1,
    vta: false,
    vma: false,
    vill: true,
};

impl Vtype {
    pub fn new(sew: Sew, lmul: Lmul) -> Self {
        Self {
            sew,
            lmul,
            vta: false,
            vma: false,
            vill: !Self::supported(sew, lmul),
        }
    }

    // Fractional LMUL must still hold one SEW element of an ELEN-wide slot
    fn supported(sew: Sew, lmul: Lmul) -> bool {
        let log2 = lmul.log2();
        log2 >= 0 || sew.bits() as usize <= ELEN >> -log2
    }

    pub fn decode(raw: u64) -> Self {
        if raw >> 63 != 0 || raw >> 8 != 0 {
            return VILL_TYPE;
        }
        let Some(sew) = Sew::from_vsew((raw >> 3) & 0x7) else {
            return VILL_TYPE;
        };
        let Some(lmul) = Lmul::from_vlmul(raw & 0x7) else {
            return VILL_TYPE;
        };
        if !Self::supported(sew, lmul) {
            return VILL_TYPE;
        }
        Vtype {
            sew,
            lmul,
            vta: (raw >> 6) & 1 != 0,
            vma: (raw >> 7) & 1 != 0,
            vill: false,
        }
    }

    pub fn encode(&self) -> u64 {
        if self.vill {
            return 1u64 << 63;
        }
        self.lmul.vlmul()
            | (self.sew.vsew() << 3)
            | ((self.vta as u64) << 6)
            | ((self.vma as u64) << 7)
    }

    pub fn vlmax(&self, vlen: usize) -> usize {
        if self.vill {
            return 0;
        }
        self.lmul.vlmax(vlen, self.sew)
    }
}

impl fmt::Display for Vtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.vill {
            return write!(f, "vill");
        }
        write!(
            f,
            "{},{},{},{}",
            self.sew,
            self.lmul,
            if self.vta { "ta" } else { "tu" },
            if self.vma { "ma" } else { "mu" }
        )
    }
}
