// Operand shape validation
//
// Every check here runs before the element loop starts, so a failure leaves
// the register file and typing state exactly as they were.

use super::vtype::{Emul, Sew, Vtype};
use crate::config::NUM_VREGS;

/// Architectural limit on registers touched by one segment access
pub const MAX_SEGMENT_REGS: usize = 8;

/// Reason an instruction's operand shape is illegal
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ShapeError {
    #[error("vtype is illegal (vill set)")]
    Vill,
    #[error("unsupported element width of {0} bits")]
    UnsupportedEew(u32),
    #[error("effective LMUL outside 1/8..=8")]
    IllegalEmul,
    #[error("v{reg} is not aligned to its {emul} register group")]
    Misaligned { reg: usize, emul: Emul },
    #[error("{fields} segment fields of {emul} exceed 8 registers")]
    SegmentTooLarge { fields: usize, emul: Emul },
    #[error("register group at v{reg} spanning {regs} registers wraps past v31")]
    GroupOverflow { reg: usize, regs: usize },
    #[error("invalid whole-register count {0}")]
    WholeRegCount(usize),
    #[error("masked destination v{0} overlaps the mask register v0")]
    MaskOverlap(usize),
    #[error("destination v{vd} overlaps source v{vs}")]
    SourceOverlap { vd: usize, vs: usize },
    #[error("extension factor {0} is not 2, 4 or 8")]
    ExtensionFactor(u32),
    #[error("instruction requires vstart == 0, found {0}")]
    VstartNotZero(usize),
}

/// Decode an element width given in bits
pub fn eew_from_bits(bits: u32) -> Result<Sew, ShapeError> {
    Sew::from_bits(bits).ok_or(ShapeError::UnsupportedEew(bits))
}

/// Instructions other than whole-register moves require a legal vtype
pub fn check_vtype(vtype: &Vtype) -> Result<(), ShapeError> {
    if vtype.vill {
        return Err(ShapeError::Vill);
    }
    Ok(())
}

/// Masked instructions that write elements may not write v0
pub fn check_mask_overlap(vd: usize, masked: bool) -> Result<(), ShapeError> {
    if masked && vd == 0 {
        return Err(ShapeError::MaskOverlap(vd));
    }
    Ok(())
}

/// Effective element width and grouping of one operand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shape {
    pub eew: Sew,
    pub emul: Emul,
}

impl Shape {
    pub fn new(eew: Sew, emul: Emul) -> Self {
        Self { eew, emul }
    }

    /// Shape of a same-width operand: EEW = SEW, EMUL = LMUL
    pub fn of(vtype: &Vtype) -> Self {
        Self::new(vtype.sew, vtype.lmul)
    }

    /// Shape of an operand with explicit width: EMUL = (EEW / SEW) * LMUL
    pub fn scaled(vtype: &Vtype, eew: Sew) -> Result<Self, ShapeError> {
        let emul = vtype
            .lmul
            .scaled(vtype.sew, eew)
            .ok_or(ShapeError::IllegalEmul)?;
        Ok(Self::new(eew, emul))
    }

    /// Double width and grouping (widening destination / wide source)
    pub fn widened(self) -> Result<Self, ShapeError> {
        let eew = self
            .eew
            .widen()
            .ok_or(ShapeError::UnsupportedEew(self.eew.bits() * 2))?;
        let emul = Emul::from_log2(self.emul.log2() + 1).ok_or(ShapeError::IllegalEmul)?;
        Ok(Self::new(eew, emul))
    }

    /// Divide width and grouping by `factor` (extension sources)
    pub fn divided(self, factor: u32) -> Result<Self, ShapeError> {
        let shift = match factor {
            2 => 1,
            4 => 2,
            8 => 3,
            _ => return Err(ShapeError::ExtensionFactor(factor)),
        };
        let eew_bits = self.eew.bits() >> shift;
        let eew = Sew::from_bits(eew_bits).ok_or(ShapeError::UnsupportedEew(eew_bits))?;
        let emul = Emul::from_log2(self.emul.log2() - shift as i8).ok_or(ShapeError::IllegalEmul)?;
        Ok(Self::new(eew, emul))
    }

    /// Register index must be a multiple of EMUL and the group must fit
    pub fn check(self, reg: usize) -> Result<(), ShapeError> {
        self.check_segment(reg, 1)
    }

    /// As [`Shape::check`] for `fields` consecutive groups (NF + 1)
    pub fn check_segment(self, reg: usize, fields: usize) -> Result<(), ShapeError> {
        let regs = self.emul.regs();
        if reg % regs != 0 {
            return Err(ShapeError::Misaligned {
                reg,
                emul: self.emul,
            });
        }
        if fields * regs > MAX_SEGMENT_REGS {
            return Err(ShapeError::SegmentTooLarge {
                fields,
                emul: self.emul,
            });
        }
        if reg + fields * regs > NUM_VREGS {
            return Err(ShapeError::GroupOverflow {
                reg,
                regs: fields * regs,
            });
        }
        Ok(())
    }

    /// Registers covered by one group of this shape
    pub fn regs(self) -> usize {
        self.emul.regs()
    }
}

/// Destination group must not overlap a source group that is read after
/// the destination is written (gather, slide-up, compress, iota)
pub fn check_no_overlap(vd: usize, vd_regs: usize, vs: usize, vs_regs: usize) -> Result<(), ShapeError> {
    if vd < vs + vs_regs && vs < vd + vd_regs {
        return Err(ShapeError::SourceOverlap { vd, vs });
    }
    Ok(())
}

/// Overlap between operands of different widths is legal only in the
/// highest-numbered part of a wider destination (source EMUL >= 1) or the
/// lowest-numbered part of a wider source
pub fn check_mixed_overlap(vd: usize, dst: Shape, vs: usize, src: Shape) -> Result<(), ShapeError> {
    let (dst_regs, src_regs) = (dst.regs(), src.regs());
    if vd >= vs + src_regs || vs >= vd + dst_regs {
        return Ok(());
    }
    let legal = if dst.eew > src.eew {
        !src.emul.is_fractional() && vs + src_regs == vd + dst_regs
    } else {
        vd == vs
    };
    if legal {
        Ok(())
    } else {
        Err(ShapeError::SourceOverlap { vd, vs })
    }
}

/// A one-register mask destination may share only the first register of a
/// source group; a higher register would be rewritten while elements of the
/// group it holds are still unread
pub fn check_mask_dest_overlap(vd: usize, vs: usize, vs_regs: usize) -> Result<(), ShapeError> {
    if vd != vs && vs < vd && vd < vs + vs_regs {
        return Err(ShapeError::SourceOverlap { vd, vs });
    }
    Ok(())
}

/// Whole-register transfers move 1, 2, 4 or 8 aligned registers
pub fn check_whole_regs(reg: usize, nr: usize) -> Result<(), ShapeError> {
    if !matches!(nr, 1 | 2 | 4 | 8) {
        return Err(ShapeError::WholeRegCount(nr));
    }
    if reg % nr != 0 {
        return Err(ShapeError::Misaligned {
            reg,
            emul: Emul::from_log2(nr.trailing_zeros() as i8).unwrap_or(Emul::M8),
        });
    }
    Ok(())
}
