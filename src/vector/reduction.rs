// Integer reductions
//
// The accumulator is seeded from element 0 of `vs1`, every active element of
// `vs2` from `vstart` to `vl` is folded in order, and the result lands in
// element 0 of `vd`. With `vl == 0` nothing is written.

use super::shape::ShapeError;
use super::vtype::Sew;
use super::{Progress, Trap, VectorUnit};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReductionOp {
    Sum,
    And,
    Or,
    Xor,
    Minu,
    Min,
    Maxu,
    Max,
}

impl ReductionOp {
    pub fn apply(self, acc: u64, val: u64, sew: Sew) -> u64 {
        let (acc, val) = (sew.trunc(acc), sew.trunc(val));
        let result = match self {
            Self::Sum => acc.wrapping_add(val),
            Self::And => acc & val,
            Self::Or => acc | val,
            Self::Xor => acc ^ val,
            Self::Minu => acc.min(val),
            Self::Min => sew.sext(acc).min(sew.sext(val)) as u64,
            Self::Maxu => acc.max(val),
            Self::Max => sew.sext(acc).max(sew.sext(val)) as u64,
        };
        sew.trunc(result)
    }
}

/// vwredsumu / vwredsum: sum into a 2*SEW accumulator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WideningReduction {
    Sumu,
    Sum,
}

impl VectorUnit {
    /// vred<op>.vs: `vd[0] = fold(op, vs1[0], vs2[*])`
    pub fn reduce(&mut self, op: ReductionOp, vd: usize, vs2: usize, vs1: usize, masked: bool) -> Result<Progress, Trap> {
        let s = self.sew_shape()?;
        s.check(vs2)?;
        self.trace_entry(&op, vd);
        let sew = s.eew;
        self.fold(vd, vs1, sew, masked, |unit, acc, i| {
            op.apply(acc, unit.vregs.read_elem(vs2, sew, i), sew)
        });
        Ok(Progress::Complete)
    }

    /// vwredsum[u].vs: SEW elements of `vs2` extended and summed at 2*SEW
    pub fn widening_reduce(&mut self, op: WideningReduction, vd: usize, vs2: usize, vs1: usize, masked: bool) -> Result<Progress, Trap> {
        let s = self.sew_shape()?;
        s.check(vs2)?;
        let sew = s.eew;
        let wide = sew
            .widen()
            .ok_or(ShapeError::UnsupportedEew(sew.bits() * 2))?;
        self.trace_entry(&op, vd);
        self.fold(vd, vs1, wide, masked, |unit, acc, i| {
            let val = unit.vregs.read_elem(vs2, sew, i);
            let val = match op {
                WideningReduction::Sumu => val,
                WideningReduction::Sum => sew.sext(val) as u64,
            };
            wide.trunc(acc.wrapping_add(val))
        });
        Ok(Progress::Complete)
    }

    /// Shared seed/fold/write-back at accumulator width `acc_sew`
    fn fold<F>(&mut self, vd: usize, vs1: usize, acc_sew: Sew, masked: bool, mut step: F)
    where
        F: FnMut(&Self, u64, usize) -> u64,
    {
        if self.csrs.vl == 0 {
            self.csrs.vstart = 0;
            return;
        }
        let mut acc = self.vregs.read_elem(vs1, acc_sew, 0);
        self.for_each_active_infallible(masked, |unit, i| {
            acc = step(unit, acc, i);
        });
        self.vregs.write_elem(vd, acc_sew, 0, acc);
    }
}
