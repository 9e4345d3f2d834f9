// Permutations: gather, slides, merge/move, compress
//
// Sources read at an index other than the element being written must not
// share registers with the destination, otherwise a later element would see
// an already overwritten value.

use super::shape::{self, Shape};
use super::vtype::Sew;
use super::{Operand, Progress, Trap, VectorRegFile, VectorUnit};

impl VectorUnit {
    // ========================================================================
    // Gather
    // ========================================================================

    /// vrgather.vv / .vx / .vi: `vd[i] = vs2[index[i]]`, 0 when the index is
    /// at or beyond VLMAX
    pub fn gather(&mut self, vd: usize, vs2: usize, index: Operand, masked: bool) -> Result<Progress, Trap> {
        let s = self.sew_shape()?;
        s.check(vd)?;
        s.check(vs2)?;
        index.check(s)?;
        shape::check_no_overlap(vd, s.regs(), vs2, s.regs())?;
        if let Some(vs1) = index.vreg() {
            shape::check_no_overlap(vd, s.regs(), vs1, s.regs())?;
        }
        shape::check_mask_overlap(vd, masked)?;
        self.trace_entry(&format_args!("vrgather"), vd);
        self.gather_with(vd, vs2, s.eew, masked, move |vregs, sew, i| match index {
            Operand::Vector(vs1) => vregs.read_elem(vs1, sew, i),
            // The scalar index is used at full width
            Operand::Scalar(x) => x,
        })
    }

    /// vrgatherei16.vv: indices are always 16 bits wide
    pub fn gather_ei16(&mut self, vd: usize, vs2: usize, vs1: usize, masked: bool) -> Result<Progress, Trap> {
        let s = self.sew_shape()?;
        let idx_shape = Shape::scaled(&self.csrs.vtype, Sew::E16)?;
        s.check(vd)?;
        s.check(vs2)?;
        idx_shape.check(vs1)?;
        shape::check_no_overlap(vd, s.regs(), vs2, s.regs())?;
        shape::check_no_overlap(vd, s.regs(), vs1, idx_shape.regs())?;
        shape::check_mask_overlap(vd, masked)?;
        self.trace_entry(&format_args!("vrgatherei16"), vd);
        self.gather_with(vd, vs2, s.eew, masked, move |vregs, _, i| vregs.read_elem(vs1, Sew::E16, i))
    }

    fn gather_with<F>(&mut self, vd: usize, vs2: usize, sew: Sew, masked: bool, index: F) -> Result<Progress, Trap>
    where
        F: Fn(&VectorRegFile, Sew, usize) -> u64,
    {
        let vlmax = self.vlmax() as u64;
        self.for_each_active_infallible(masked, |unit, i| {
            let idx = index(&unit.vregs, sew, i);
            let val = if idx < vlmax {
                unit.vregs.read_elem(vs2, sew, idx as usize)
            } else {
                0
            };
            unit.vregs.write_elem(vd, sew, i, val);
        });
        Ok(Progress::Complete)
    }

    // ========================================================================
    // Slides
    // ========================================================================

    fn check_slide(&self, vd: usize, vs2: usize, masked: bool, up: bool) -> Result<Sew, Trap> {
        let s = self.sew_shape()?;
        s.check(vd)?;
        s.check(vs2)?;
        if up {
            shape::check_no_overlap(vd, s.regs(), vs2, s.regs())?;
        }
        shape::check_mask_overlap(vd, masked)?;
        Ok(s.eew)
    }

    /// vslideup.vx / .vi: `vd[i] = vs2[i - amount]` for `i >= amount`;
    /// elements below `amount` are left untouched
    pub fn slide_up(&mut self, vd: usize, vs2: usize, amount: u64, masked: bool) -> Result<Progress, Trap> {
        let sew = self.check_slide(vd, vs2, masked, true)?;
        self.trace_entry(&format_args!("vslideup by {amount}"), vd);
        self.for_each_active_infallible(masked, |unit, i| {
            if (i as u64) < amount {
                return;
            }
            let val = unit.vregs.read_elem(vs2, sew, i - amount as usize);
            unit.vregs.write_elem(vd, sew, i, val);
        });
        Ok(Progress::Complete)
    }

    /// vslidedown.vx / .vi: `vd[i] = vs2[i + amount]`, 0 past VLMAX
    pub fn slide_down(&mut self, vd: usize, vs2: usize, amount: u64, masked: bool) -> Result<Progress, Trap> {
        let sew = self.check_slide(vd, vs2, masked, false)?;
        self.trace_entry(&format_args!("vslidedown by {amount}"), vd);
        let vlmax = self.vlmax() as u64;
        self.for_each_active_infallible(masked, |unit, i| {
            let val = match (i as u64).checked_add(amount) {
                Some(src) if src < vlmax => unit.vregs.read_elem(vs2, sew, src as usize),
                _ => 0,
            };
            unit.vregs.write_elem(vd, sew, i, val);
        });
        Ok(Progress::Complete)
    }

    /// vslide1up.vx: `vd[0] = x`, `vd[i] = vs2[i - 1]`
    pub fn slide1_up(&mut self, vd: usize, vs2: usize, x: u64, masked: bool) -> Result<Progress, Trap> {
        let sew = self.check_slide(vd, vs2, masked, true)?;
        self.trace_entry(&format_args!("vslide1up"), vd);
        self.for_each_active_infallible(masked, |unit, i| {
            let val = if i == 0 {
                x
            } else {
                unit.vregs.read_elem(vs2, sew, i - 1)
            };
            unit.vregs.write_elem(vd, sew, i, val);
        });
        Ok(Progress::Complete)
    }

    /// vslide1down.vx: `vd[vl-1] = x`, `vd[i] = vs2[i + 1]`
    pub fn slide1_down(&mut self, vd: usize, vs2: usize, x: u64, masked: bool) -> Result<Progress, Trap> {
        let sew = self.check_slide(vd, vs2, masked, false)?;
        self.trace_entry(&format_args!("vslide1down"), vd);
        let last = self.csrs.vl.saturating_sub(1);
        self.for_each_active_infallible(masked, |unit, i| {
            let val = if i == last {
                x
            } else {
                unit.vregs.read_elem(vs2, sew, i + 1)
            };
            unit.vregs.write_elem(vd, sew, i, val);
        });
        Ok(Progress::Complete)
    }

    // ========================================================================
    // Merge and move
    // ========================================================================

    /// vmerge.vvm / .vxm / .vim: `vd[i] = v0[i] ? rhs[i] : vs2[i]`
    pub fn merge(&mut self, vd: usize, vs2: usize, rhs: Operand) -> Result<Progress, Trap> {
        let s = self.sew_shape()?;
        s.check(vd)?;
        s.check(vs2)?;
        rhs.check(s)?;
        shape::check_mask_overlap(vd, true)?;
        self.trace_entry(&format_args!("vmerge"), vd);
        let sew = s.eew;
        self.for_each_active_infallible(false, |unit, i| {
            let val = if unit.vregs.mask_bit(0, i) {
                rhs.read(&unit.vregs, sew, i)
            } else {
                unit.vregs.read_elem(vs2, sew, i)
            };
            unit.vregs.write_elem(vd, sew, i, val);
        });
        Ok(Progress::Complete)
    }

    /// vmv.v.v / .v.x / .v.i
    pub fn move_vector(&mut self, vd: usize, src: Operand) -> Result<Progress, Trap> {
        let s = self.sew_shape()?;
        s.check(vd)?;
        src.check(s)?;
        self.trace_entry(&format_args!("vmv.v"), vd);
        let sew = s.eew;
        self.for_each_active_infallible(false, |unit, i| {
            let val = src.read(&unit.vregs, sew, i);
            unit.vregs.write_elem(vd, sew, i, val);
        });
        Ok(Progress::Complete)
    }

    /// vmv.x.s: element 0 of `vs2`, sign-extended; ignores `vl`
    pub fn move_to_scalar(&self, vs2: usize) -> Result<u64, Trap> {
        shape::check_vtype(&self.csrs.vtype)?;
        let sew = self.csrs.vtype.sew;
        Ok(sew.sext(self.vregs.read_elem(vs2, sew, 0)) as u64)
    }

    /// vmv.s.x: `vd[0] = x` when `vstart < vl`
    pub fn move_from_scalar(&mut self, vd: usize, x: u64) -> Result<Progress, Trap> {
        shape::check_vtype(&self.csrs.vtype)?;
        self.trace_entry(&format_args!("vmv.s.x"), vd);
        if self.csrs.vstart < self.csrs.vl {
            self.vregs.write_elem(vd, self.csrs.vtype.sew, 0, x);
        }
        self.csrs.vstart = 0;
        Ok(Progress::Complete)
    }

    /// vmv<nr>r.v: copy `nr` whole registers regardless of vtype
    pub fn move_whole(&mut self, vd: usize, vs2: usize, nr: usize) -> Result<Progress, Trap> {
        shape::check_whole_regs(vd, nr)?;
        shape::check_whole_regs(vs2, nr)?;
        self.trace_entry(&format_args!("vmv{nr}r"), vd);
        let vlenb = self.vregs.vlenb();
        let start = self.csrs.vstart.min(nr * vlenb);
        if start == 0 {
            self.vregs.copy_regs(vd, vs2, nr);
        } else {
            for i in start..nr * vlenb {
                let b = self.vregs.byte(vs2, i);
                self.vregs.set_byte(vd, i, b);
            }
        }
        self.csrs.vstart = 0;
        Ok(Progress::Complete)
    }

    // ========================================================================
    // Compress
    // ========================================================================

    /// vcompress.vm: pack the elements of `vs2` selected by mask `vs1` into
    /// the low elements of `vd`
    pub fn compress(&mut self, vd: usize, vs2: usize, vs1: usize) -> Result<Progress, Trap> {
        let s = self.sew_shape()?;
        self.require_vstart_zero()?;
        s.check(vd)?;
        s.check(vs2)?;
        shape::check_no_overlap(vd, s.regs(), vs2, s.regs())?;
        shape::check_no_overlap(vd, s.regs(), vs1, 1)?;
        self.trace_entry(&format_args!("vcompress"), vd);
        let sew = s.eew;
        let mut packed = 0;
        self.for_each_active_infallible(false, |unit, i| {
            if unit.vregs.mask_bit(vs1, i) {
                let val = unit.vregs.read_elem(vs2, sew, i);
                unit.vregs.write_elem(vd, sew, packed, val);
                packed += 1;
            }
        });
        Ok(Progress::Complete)
    }
}
