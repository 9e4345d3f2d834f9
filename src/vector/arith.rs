// Element loops for integer and fixed-point arithmetic
//
// Operand widths are resolved and validated once; the loop then reads,
// applies the selected operator, and writes each active element.

use super::alu::{FixedPointState, MulAddOp, NarrowingOp, WideningOp};
use super::shape;
use super::{BinaryOp, Operand, Progress, Trap, VectorUnit};

/// Add/subtract with the carry or borrow taken from `v0`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarryOp {
    /// vadc: `vs2 + rhs + v0[i]`
    Adc,
    /// vsbc: `vs2 - rhs - v0[i]`
    Sbc,
}

impl VectorUnit {
    /// Same-width `vop.vv` / `vop.vx` / `vop.vi`
    pub fn binary(&mut self, op: BinaryOp, vd: usize, vs2: usize, rhs: Operand, masked: bool) -> Result<Progress, Trap> {
        let s = self.sew_shape()?;
        s.check(vd)?;
        s.check(vs2)?;
        rhs.check(s)?;
        shape::check_mask_overlap(vd, masked)?;
        self.trace_entry(&op, vd);

        let sew = s.eew;
        self.for_each_active_infallible(masked, |unit, i| {
            let a = unit.vregs.read_elem(vs2, sew, i);
            let b = rhs.read(&unit.vregs, sew, i);
            let mut fx = FixedPointState {
                vxrm: unit.csrs.vxrm,
                vxsat: &mut unit.csrs.vxsat,
            };
            let result = op.apply(a, b, sew, &mut fx);
            unit.vregs.write_elem(vd, sew, i, result);
        });
        Ok(Progress::Complete)
    }

    /// vmacc / vnmsac / vmadd / vnmsub: `vs1` is a register or `rs1`
    pub fn mul_add(&mut self, op: MulAddOp, vd: usize, vs1: Operand, vs2: usize, masked: bool) -> Result<Progress, Trap> {
        let s = self.sew_shape()?;
        s.check(vd)?;
        s.check(vs2)?;
        vs1.check(s)?;
        shape::check_mask_overlap(vd, masked)?;
        self.trace_entry(&op, vd);

        let sew = s.eew;
        self.for_each_active_infallible(masked, |unit, i| {
            let acc = unit.vregs.read_elem(vd, sew, i);
            let a = vs1.read(&unit.vregs, sew, i);
            let b = unit.vregs.read_elem(vs2, sew, i);
            unit.vregs.write_elem(vd, sew, i, op.apply(acc, a, b, sew));
        });
        Ok(Progress::Complete)
    }

    /// Widening `vw*.vv` / `.vx` / `.wv` / `.wx` and `vwmacc*`
    pub fn widening(&mut self, op: WideningOp, vd: usize, vs2: usize, rhs: Operand, masked: bool) -> Result<Progress, Trap> {
        let s = self.sew_shape()?;
        let wide = s.widened()?;
        wide.check(vd)?;
        if op.wide_source() {
            wide.check(vs2)?;
        } else {
            s.check(vs2)?;
            shape::check_mixed_overlap(vd, wide, vs2, s)?;
        }
        rhs.check(s)?;
        if let Some(vs1) = rhs.vreg() {
            shape::check_mixed_overlap(vd, wide, vs1, s)?;
        }
        shape::check_mask_overlap(vd, masked)?;
        self.trace_entry(&op, vd);

        let (sew, wsew) = (s.eew, wide.eew);
        let src_sew = if op.wide_source() { wsew } else { sew };
        self.for_each_active_infallible(masked, |unit, i| {
            let a = unit.vregs.read_elem(vs2, src_sew, i);
            let b = rhs.read(&unit.vregs, sew, i);
            let acc = if op.accumulates() {
                unit.vregs.read_elem(vd, wsew, i)
            } else {
                0
            };
            unit.vregs.write_elem(vd, wsew, i, op.apply(a, b, acc, sew));
        });
        Ok(Progress::Complete)
    }

    /// Narrowing `vn*.wv` / `.wx` / `.wi`: 2*SEW source, SEW destination
    pub fn narrowing(&mut self, op: NarrowingOp, vd: usize, vs2: usize, rhs: Operand, masked: bool) -> Result<Progress, Trap> {
        let s = self.sew_shape()?;
        let wide = s.widened()?;
        s.check(vd)?;
        wide.check(vs2)?;
        rhs.check(s)?;
        shape::check_mixed_overlap(vd, s, vs2, wide)?;
        shape::check_mask_overlap(vd, masked)?;
        self.trace_entry(&op, vd);

        let (sew, wsew) = (s.eew, wide.eew);
        self.for_each_active_infallible(masked, |unit, i| {
            let src = unit.vregs.read_elem(vs2, wsew, i);
            let shift = rhs.read(&unit.vregs, sew, i);
            let result = op.apply(src, shift, sew, unit.csrs.vxrm);
            unit.vregs.write_elem(vd, sew, i, result);
        });
        Ok(Progress::Complete)
    }

    /// vzext.vf2/4/8 and vsext.vf2/4/8
    pub fn extend(&mut self, vd: usize, vs2: usize, factor: u32, signed: bool, masked: bool) -> Result<Progress, Trap> {
        let dst = self.sew_shape()?;
        let src = dst.divided(factor)?;
        dst.check(vd)?;
        src.check(vs2)?;
        shape::check_mixed_overlap(vd, dst, vs2, src)?;
        shape::check_mask_overlap(vd, masked)?;
        self.trace_entry(&format_args!("{}ext.vf{factor}", if signed { 's' } else { 'z' }), vd);

        let (sew, src_eew) = (dst.eew, src.eew);
        self.for_each_active_infallible(masked, |unit, i| {
            let val = unit.vregs.read_elem(vs2, src_eew, i);
            let val = if signed {
                src_eew.sext(val) as u64
            } else {
                val
            };
            unit.vregs.write_elem(vd, sew, i, val);
        });
        Ok(Progress::Complete)
    }

    /// vadc.vvm / vsbc.vvm and their `.vxm` / `.vim` forms; `v0` supplies
    /// the carry, so every element is processed and `vd` may not be v0
    pub fn add_with_carry(&mut self, op: CarryOp, vd: usize, vs2: usize, rhs: Operand) -> Result<Progress, Trap> {
        let s = self.sew_shape()?;
        s.check(vd)?;
        s.check(vs2)?;
        rhs.check(s)?;
        shape::check_mask_overlap(vd, true)?;
        self.trace_entry(&op, vd);

        let sew = s.eew;
        self.for_each_active_infallible(false, |unit, i| {
            let a = unit.vregs.read_elem(vs2, sew, i);
            let b = rhs.read(&unit.vregs, sew, i);
            let carry = unit.vregs.mask_bit(0, i) as u64;
            let result = match op {
                CarryOp::Adc => a.wrapping_add(b).wrapping_add(carry),
                CarryOp::Sbc => a.wrapping_sub(b).wrapping_sub(carry),
            };
            unit.vregs.write_elem(vd, sew, i, sew.trunc(result));
        });
        Ok(Progress::Complete)
    }
}
