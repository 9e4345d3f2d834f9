// Mask-producing instructions
//
// Results are one bit per element packed into a destination register. A
// destination byte is assembled in `MaskWriter` and stored when the loop
// moves past it, which zeroes it exactly once per instruction. A source
// group may share the destination only at its first register; elements in
// that register are read before the byte holding their result is stored.

use super::alu::CompareOp;
use super::arith::CarryOp;
use super::regfile::VectorRegFile;
use super::shape;
use super::{Operand, Progress, Trap, VectorUnit};

/// Packs mask bits for one instruction
pub(crate) struct MaskWriter {
    vd: usize,
    byte: Option<usize>,
    bits: u8,
}

impl MaskWriter {
    pub(crate) fn new(vd: usize) -> Self {
        Self {
            vd,
            byte: None,
            bits: 0,
        }
    }

    /// Record bit `idx`. Elements must arrive in increasing order.
    pub(crate) fn write(&mut self, vregs: &mut VectorRegFile, idx: usize, bit: bool) {
        let byte = idx / 8;
        if self.byte != Some(byte) {
            self.flush(vregs);
            // First touch of this byte: start from zero
            self.byte = Some(byte);
            self.bits = 0;
        }
        if bit {
            self.bits |= 1 << (idx % 8);
        }
    }

    pub(crate) fn flush(&mut self, vregs: &mut VectorRegFile) {
        if let Some(byte) = self.byte.take() {
            vregs.set_byte(self.vd, byte, self.bits);
        }
    }
}

/// Mask-register logical operations (vm<op>.mm)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskLogicOp {
    And,
    Nand,
    /// `vs2 & !vs1`
    AndNot,
    Xor,
    Or,
    Nor,
    /// `vs2 | !vs1`
    OrNot,
    Xnor,
}

impl MaskLogicOp {
    pub fn apply(self, a: bool, b: bool) -> bool {
        match self {
            Self::And => a & b,
            Self::Nand => !(a & b),
            Self::AndNot => a & !b,
            Self::Xor => a ^ b,
            Self::Or => a | b,
            Self::Nor => !(a | b),
            Self::OrNot => a | !b,
            Self::Xnor => !(a ^ b),
        }
    }
}

/// vmsbf / vmsif / vmsof
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetFirst {
    /// Set bits before the first set source bit
    Before,
    /// As `Before`, including the first set bit
    Including,
    /// Only the first set bit
    Only,
}

impl VectorUnit {
    // ========================================================================
    // Compare and carry-out
    // ========================================================================

    /// vmseq / vmsne / vmslt[u] / vmsle[u] / vmsgt[u]
    pub fn compare(&mut self, op: CompareOp, vd: usize, vs2: usize, rhs: Operand, masked: bool) -> Result<Progress, Trap> {
        let s = self.sew_shape()?;
        s.check(vs2)?;
        rhs.check(s)?;
        self.check_mask_sources(vd, vs2, rhs, s.regs())?;
        self.trace_entry(&op, vd);

        let sew = s.eew;
        let mut out = MaskWriter::new(vd);
        self.for_each_active_infallible(masked, |unit, i| {
            let a = unit.vregs.read_elem(vs2, sew, i);
            let b = rhs.read(&unit.vregs, sew, i);
            out.write(&mut unit.vregs, i, op.apply(a, b, sew));
        });
        out.flush(&mut self.vregs);
        Ok(Progress::Complete)
    }

    fn check_mask_sources(&self, vd: usize, vs2: usize, rhs: Operand, regs: usize) -> Result<(), Trap> {
        shape::check_mask_dest_overlap(vd, vs2, regs)?;
        if let Some(vs1) = rhs.vreg() {
            shape::check_mask_dest_overlap(vd, vs1, regs)?;
        }
        Ok(())
    }

    /// vmadc / vmsbc: carry (borrow) out of `vs2 +- rhs [+- v0[i]]`
    pub fn carry_out(&mut self, op: CarryOp, vd: usize, vs2: usize, rhs: Operand, carry_in: bool) -> Result<Progress, Trap> {
        let s = self.sew_shape()?;
        s.check(vs2)?;
        rhs.check(s)?;
        self.check_mask_sources(vd, vs2, rhs, s.regs())?;
        self.trace_entry(&op, vd);

        let sew = s.eew;
        let mut out = MaskWriter::new(vd);
        self.for_each_active_infallible(false, |unit, i| {
            let a = sew.trunc(unit.vregs.read_elem(vs2, sew, i)) as u128;
            let b = sew.trunc(rhs.read(&unit.vregs, sew, i)) as u128;
            let c = (carry_in && unit.vregs.mask_bit(0, i)) as u128;
            let bit = match op {
                CarryOp::Adc => (a + b + c) >> sew.bits() != 0,
                CarryOp::Sbc => a < b + c,
            };
            out.write(&mut unit.vregs, i, bit);
        });
        out.flush(&mut self.vregs);
        Ok(Progress::Complete)
    }

    // ========================================================================
    // Mask-register operations
    // ========================================================================

    /// vmand.mm and friends: `vd = op(vs2, vs1)` bitwise over `vl` bits
    pub fn mask_logical(&mut self, op: MaskLogicOp, vd: usize, vs2: usize, vs1: usize) -> Result<Progress, Trap> {
        shape::check_vtype(&self.csrs.vtype)?;
        self.trace_entry(&op, vd);
        let mut out = MaskWriter::new(vd);
        self.for_each_active_infallible(false, |unit, i| {
            let bit = op.apply(unit.vregs.mask_bit(vs2, i), unit.vregs.mask_bit(vs1, i));
            out.write(&mut unit.vregs, i, bit);
        });
        out.flush(&mut self.vregs);
        Ok(Progress::Complete)
    }

    /// vcpop.m: number of active set bits in `vs2`
    pub fn cpop(&self, vs2: usize, masked: bool) -> Result<u64, Trap> {
        shape::check_vtype(&self.csrs.vtype)?;
        self.require_vstart_zero()?;
        let count = (0..self.csrs.vl)
            .filter(|&i| self.elem_active(masked, i) && self.vregs.mask_bit(vs2, i))
            .count();
        Ok(count as u64)
    }

    /// vfirst.m: index of the first active set bit in `vs2`, or -1
    pub fn first(&self, vs2: usize, masked: bool) -> Result<i64, Trap> {
        shape::check_vtype(&self.csrs.vtype)?;
        self.require_vstart_zero()?;
        let found = (0..self.csrs.vl).find(|&i| self.elem_active(masked, i) && self.vregs.mask_bit(vs2, i));
        Ok(found.map_or(-1, |i| i as i64))
    }

    /// vmsbf.m / vmsif.m / vmsof.m
    pub fn set_first(&mut self, kind: SetFirst, vd: usize, vs2: usize, masked: bool) -> Result<Progress, Trap> {
        shape::check_vtype(&self.csrs.vtype)?;
        self.require_vstart_zero()?;
        shape::check_no_overlap(vd, 1, vs2, 1)?;
        shape::check_mask_overlap(vd, masked)?;
        self.trace_entry(&kind, vd);

        let mut seen = false;
        let mut out = MaskWriter::new(vd);
        self.for_each_active_infallible(masked, |unit, i| {
            let src = unit.vregs.mask_bit(vs2, i);
            let bit = match kind {
                SetFirst::Before => !seen && !src,
                SetFirst::Including => !seen,
                SetFirst::Only => !seen && src,
            };
            seen |= src;
            out.write(&mut unit.vregs, i, bit);
        });
        out.flush(&mut self.vregs);
        Ok(Progress::Complete)
    }

    /// viota.m: `vd[i]` = number of active set bits of `vs2` below `i`
    pub fn iota(&mut self, vd: usize, vs2: usize, masked: bool) -> Result<Progress, Trap> {
        let s = self.sew_shape()?;
        self.require_vstart_zero()?;
        s.check(vd)?;
        shape::check_no_overlap(vd, s.regs(), vs2, 1)?;
        shape::check_mask_overlap(vd, masked)?;
        self.trace_entry(&format_args!("viota"), vd);

        let sew = s.eew;
        let mut count = 0u64;
        self.for_each_active_infallible(masked, |unit, i| {
            let bit = unit.vregs.mask_bit(vs2, i);
            unit.vregs.write_elem(vd, sew, i, count);
            count += bit as u64;
        });
        Ok(Progress::Complete)
    }

    /// vid.v: `vd[i] = i`
    pub fn vid(&mut self, vd: usize, masked: bool) -> Result<Progress, Trap> {
        let s = self.sew_shape()?;
        s.check(vd)?;
        shape::check_mask_overlap(vd, masked)?;
        self.trace_entry(&format_args!("vid"), vd);
        let sew = s.eew;
        self.for_each_active_infallible(masked, |unit, i| {
            unit.vregs.write_elem(vd, sew, i, i as u64);
        });
        Ok(Progress::Complete)
    }
}
