// Per-element integer operators
//
// Each operator is selected once per instruction and applied to every active
// element. Operands arrive as raw u64 carriers; results are truncated to the
// destination width.

use super::fixed_point;
use super::vtype::{Sew, Vxrm};

/// Rounding mode in effect plus the sticky saturation flag
pub struct FixedPointState<'a> {
    pub vxrm: Vxrm,
    pub vxsat: &'a mut bool,
}

// ============================================================================
// Same-width binary operators
// ============================================================================

/// `vd[i] = op(vs2[i], vs1[i] | rs1 | imm)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    /// Reverse subtract: `rhs - vs2`
    Rsub,
    And,
    Or,
    Xor,
    Sll,
    Srl,
    Sra,
    Minu,
    Min,
    Maxu,
    Max,
    Mul,
    Mulh,
    Mulhu,
    Mulhsu,
    Divu,
    Div,
    Remu,
    Rem,
    Saddu,
    Sadd,
    Ssubu,
    Ssub,
    Aaddu,
    Aadd,
    Asubu,
    Asub,
    Smul,
    Ssrl,
    Ssra,
}

impl BinaryOp {
    pub fn apply(self, a: u64, b: u64, sew: Sew, fx: &mut FixedPointState<'_>) -> u64 {
        let (a, b) = (sew.trunc(a), sew.trunc(b));
        let shamt = b & (sew.bits() as u64 - 1);
        let result = match self {
            Self::Add => a.wrapping_add(b),
            Self::Sub => a.wrapping_sub(b),
            Self::Rsub => b.wrapping_sub(a),
            Self::And => a & b,
            Self::Or => a | b,
            Self::Xor => a ^ b,
            Self::Sll => a << shamt,
            Self::Srl => a >> shamt,
            Self::Sra => (sew.sext(a) >> shamt) as u64,
            Self::Minu => a.min(b),
            Self::Min => sew.sext(a).min(sew.sext(b)) as u64,
            Self::Maxu => a.max(b),
            Self::Max => sew.sext(a).max(sew.sext(b)) as u64,
            Self::Mul => a.wrapping_mul(b),
            Self::Mulh => mulh(a, b, sew),
            Self::Mulhu => mulhu(a, b, sew),
            Self::Mulhsu => mulhsu(a, b, sew),
            Self::Divu => divu(a, b, sew),
            Self::Div => div(a, b, sew),
            Self::Remu => remu(a, b, sew),
            Self::Rem => rem(a, b, sew),
            Self::Saddu => fixed_point::saddu(a, b, sew, fx.vxsat),
            Self::Sadd => fixed_point::sadd(a, b, sew, fx.vxsat),
            Self::Ssubu => fixed_point::ssubu(a, b, sew, fx.vxsat),
            Self::Ssub => fixed_point::ssub(a, b, sew, fx.vxsat),
            Self::Aaddu => fixed_point::aaddu(a, b, sew, fx.vxrm),
            Self::Aadd => fixed_point::aadd(a, b, sew, fx.vxrm),
            Self::Asubu => fixed_point::asubu(a, b, sew, fx.vxrm),
            Self::Asub => fixed_point::asub(a, b, sew, fx.vxrm),
            Self::Smul => fixed_point::smul(a, b, sew, fx.vxrm, fx.vxsat),
            Self::Ssrl => fixed_point::ssrl(a, b, sew, fx.vxrm),
            Self::Ssra => fixed_point::ssra(a, b, sew, fx.vxrm),
        };
        sew.trunc(result)
    }
}

// ============================================================================
// Multiply-high
//
// Widths up to 32 bits multiply exactly in 64 bits. The 64-bit tier splits
// each operand into 32-bit halves and accumulates the partial products.
// ============================================================================

fn mulhu64(a: u64, b: u64) -> u64 {
    const LO: u64 = 0xFFFF_FFFF;
    let (a_lo, a_hi) = (a & LO, a >> 32);
    let (b_lo, b_hi) = (b & LO, b >> 32);
    let ll = a_lo * b_lo;
    let lh = a_lo * b_hi;
    let hl = a_hi * b_lo;
    let hh = a_hi * b_hi;
    let mid = (ll >> 32) + (lh & LO) + (hl & LO);
    hh + (lh >> 32) + (hl >> 32) + (mid >> 32)
}

/// Unsigned full multiply, high half
pub fn mulhu(a: u64, b: u64, sew: Sew) -> u64 {
    match sew {
        Sew::E64 => mulhu64(a, b),
        _ => (sew.trunc(a) * sew.trunc(b)) >> sew.bits(),
    }
}

/// Signed full multiply, high half
pub fn mulh(a: u64, b: u64, sew: Sew) -> u64 {
    match sew {
        // Correct the unsigned high half for each negative operand
        Sew::E64 => {
            let mut hi = mulhu64(a, b);
            if (a as i64) < 0 {
                hi = hi.wrapping_sub(b);
            }
            if (b as i64) < 0 {
                hi = hi.wrapping_sub(a);
            }
            hi
        }
        _ => sew.trunc((sew.sext(a) * sew.sext(b) >> sew.bits()) as u64),
    }
}

/// Signed (vs2) by unsigned (vs1) multiply, high half
pub fn mulhsu(a: u64, b: u64, sew: Sew) -> u64 {
    match sew {
        Sew::E64 => {
            let hi = mulhu64(a, b);
            if (a as i64) < 0 {
                hi.wrapping_sub(b)
            } else {
                hi
            }
        }
        _ => sew.trunc((sew.sext(a) * sew.trunc(b) as i64 >> sew.bits()) as u64),
    }
}

// ============================================================================
// Division with RISC-V zero/overflow results
// ============================================================================

pub fn divu(a: u64, b: u64, sew: Sew) -> u64 {
    let (a, b) = (sew.trunc(a), sew.trunc(b));
    if b == 0 {
        sew.mask()
    } else {
        a / b
    }
}

/// Signed division; MIN / -1 wraps to MIN
pub fn div(a: u64, b: u64, sew: Sew) -> u64 {
    let (sa, sb) = (sew.sext(a), sew.sext(b));
    if sb == 0 {
        sew.mask()
    } else if sa == sew.signed_min() && sb == -1 {
        sew.trunc(a)
    } else {
        sew.trunc((sa / sb) as u64)
    }
}

pub fn remu(a: u64, b: u64, sew: Sew) -> u64 {
    let (a, b) = (sew.trunc(a), sew.trunc(b));
    if b == 0 {
        a
    } else {
        a % b
    }
}

pub fn rem(a: u64, b: u64, sew: Sew) -> u64 {
    let (sa, sb) = (sew.sext(a), sew.sext(b));
    if sb == 0 {
        sew.trunc(a)
    } else if sa == sew.signed_min() && sb == -1 {
        0
    } else {
        sew.trunc((sa % sb) as u64)
    }
}

// ============================================================================
// Multiply-accumulate: the destination is also an operand
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MulAddOp {
    /// `vd = vs1 * vs2 + vd`
    Macc,
    /// `vd = -(vs1 * vs2) + vd`
    Nmsac,
    /// `vd = vs1 * vd + vs2`
    Madd,
    /// `vd = -(vs1 * vd) + vs2`
    Nmsub,
}

impl MulAddOp {
    pub fn apply(self, vd: u64, vs1: u64, vs2: u64, sew: Sew) -> u64 {
        let result = match self {
            Self::Macc => vs1.wrapping_mul(vs2).wrapping_add(vd),
            Self::Nmsac => vd.wrapping_sub(vs1.wrapping_mul(vs2)),
            Self::Madd => vs1.wrapping_mul(vd).wrapping_add(vs2),
            Self::Nmsub => vs2.wrapping_sub(vs1.wrapping_mul(vd)),
        };
        sew.trunc(result)
    }
}

// ============================================================================
// Widening: SEW operands, 2*SEW result
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WideningOp {
    Addu,
    Add,
    Subu,
    Sub,
    /// `.w` forms: vs2 is already 2*SEW
    AdduW,
    AddW,
    SubuW,
    SubW,
    Mulu,
    Mul,
    /// vs2 signed, vs1 unsigned
    Mulsu,
    Maccu,
    Macc,
    /// vs1 signed, vs2 unsigned
    Maccsu,
    /// vs1 unsigned, vs2 signed
    Maccus,
}

impl WideningOp {
    /// vs2 is read at 2*SEW
    pub fn wide_source(self) -> bool {
        matches!(self, Self::AdduW | Self::AddW | Self::SubuW | Self::SubW)
    }

    /// Reads the 2*SEW destination as an accumulator
    pub fn accumulates(self) -> bool {
        matches!(self, Self::Maccu | Self::Macc | Self::Maccsu | Self::Maccus)
    }

    /// `a` is vs2, `b` is vs1 or the scalar, `acc` the current destination.
    /// The result is truncated to `sew * 2`.
    pub fn apply(self, a: u64, b: u64, acc: u64, sew: Sew) -> u64 {
        let wide = sew.widen().unwrap_or(Sew::E64);
        let zx = |v: u64| sew.trunc(v);
        let sx = |v: u64| sew.sext(v) as u64;
        let wzx = |v: u64| wide.trunc(v);
        let wsx = |v: u64| wide.sext(v) as u64;
        let result = match self {
            Self::Addu => zx(a).wrapping_add(zx(b)),
            Self::Add => sx(a).wrapping_add(sx(b)),
            Self::Subu => zx(a).wrapping_sub(zx(b)),
            Self::Sub => sx(a).wrapping_sub(sx(b)),
            Self::AdduW => wzx(a).wrapping_add(zx(b)),
            Self::AddW => wsx(a).wrapping_add(sx(b)),
            Self::SubuW => wzx(a).wrapping_sub(zx(b)),
            Self::SubW => wsx(a).wrapping_sub(sx(b)),
            Self::Mulu => zx(a).wrapping_mul(zx(b)),
            Self::Mul => sx(a).wrapping_mul(sx(b)),
            Self::Mulsu => sx(a).wrapping_mul(zx(b)),
            Self::Maccu => zx(b).wrapping_mul(zx(a)).wrapping_add(acc),
            Self::Macc => sx(b).wrapping_mul(sx(a)).wrapping_add(acc),
            Self::Maccsu => sx(b).wrapping_mul(zx(a)).wrapping_add(acc),
            Self::Maccus => zx(b).wrapping_mul(sx(a)).wrapping_add(acc),
        };
        wide.trunc(result)
    }
}

// ============================================================================
// Narrowing: 2*SEW source, SEW result
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NarrowingOp {
    Srl,
    Sra,
    Clipu,
    Clip,
}

impl NarrowingOp {
    /// `wide` is the 2*SEW source; `shift` is masked to `2*SEW - 1`
    pub fn apply(self, wide: u64, shift: u64, sew: Sew, vxrm: Vxrm) -> u64 {
        let src = sew.widen().unwrap_or(Sew::E64);
        let shamt = shift & (src.bits() as u64 - 1);
        let result = match self {
            Self::Srl => src.trunc(wide) >> shamt,
            Self::Sra => (src.sext(wide) >> shamt) as u64,
            Self::Clipu => fixed_point::nclipu(wide, shift, sew, vxrm),
            Self::Clip => fixed_point::nclip(wide, shift, sew, vxrm),
        };
        sew.trunc(result)
    }
}

// ============================================================================
// Integer compare
// ============================================================================

/// Comparison of `vs2[i]` against `vs1[i] | rs1 | imm`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Ltu,
    Lt,
    Leu,
    Le,
    Gtu,
    Gt,
}

impl CompareOp {
    pub fn apply(self, a: u64, b: u64, sew: Sew) -> bool {
        let (ua, ub) = (sew.trunc(a), sew.trunc(b));
        let (sa, sb) = (sew.sext(a), sew.sext(b));
        match self {
            Self::Eq => ua == ub,
            Self::Ne => ua != ub,
            Self::Ltu => ua < ub,
            Self::Lt => sa < sb,
            Self::Leu => ua <= ub,
            Self::Le => sa <= sb,
            Self::Gtu => ua > ub,
            Self::Gt => sa > sb,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(op: BinaryOp, a: u64, b: u64, sew: Sew) -> u64 {
        let mut sat = false;
        let mut fx = FixedPointState {
            vxrm: Vxrm::Rnu,
            vxsat: &mut sat,
        };
        op.apply(a, b, sew, &mut fx)
    }

    #[test]
    fn wraparound_and_shifts() {
        for sew in Sew::ALL {
            assert_eq!(apply(BinaryOp::Add, sew.mask(), 1, sew), 0);
            assert_eq!(apply(BinaryOp::Sub, 0, 1, sew), sew.mask());
            assert_eq!(apply(BinaryOp::Rsub, 1, 0, sew), sew.mask());
            // Shift amount masked to SEW-1
            assert_eq!(apply(BinaryOp::Sll, 1, sew.bits() as u64 + 1, sew), 2);
            assert_eq!(
                apply(BinaryOp::Sra, sew.trunc(sew.signed_min() as u64), sew.bits() as u64 - 1, sew),
                sew.mask()
            );
            assert_eq!(apply(BinaryOp::Srl, sew.mask(), sew.bits() as u64 - 1, sew), 1);
        }
    }

    #[test]
    fn min_max_signedness() {
        assert_eq!(apply(BinaryOp::Minu, 0xFF, 0x01, Sew::E8), 0x01);
        assert_eq!(apply(BinaryOp::Min, 0xFF, 0x01, Sew::E8), 0xFF);
        assert_eq!(apply(BinaryOp::Maxu, 0x8000, 0x7FFF, Sew::E16), 0x8000);
        assert_eq!(apply(BinaryOp::Max, 0x8000, 0x7FFF, Sew::E16), 0x7FFF);
        // Scalar operands are truncated to SEW before comparing
        assert_eq!(apply(BinaryOp::Minu, 0x10, u64::MAX, Sew::E8), 0x10);
    }

    #[test]
    fn mul_high_matches_wide_reference() {
        let samples = [
            0u64,
            1,
            2,
            0x7F,
            0x80,
            0xFF,
            0x7FFF,
            0x8000_0001,
            0xDEAD_BEEF_CAFE_BABE,
            i64::MAX as u64,
            i64::MIN as u64,
            u64::MAX,
        ];
        for sew in Sew::ALL {
            let bits = sew.bits();
            for &a in &samples {
                for &b in &samples {
                    let (ua, ub) = (sew.trunc(a) as u128, sew.trunc(b) as u128);
                    let (sa, sb) = (sew.sext(a) as i128, sew.sext(b) as i128);
                    let want_u = sew.trunc((ua * ub >> bits) as u64);
                    let want_s = sew.trunc((sa * sb >> bits) as u64);
                    let want_su = sew.trunc((sa * ub as i128 >> bits) as u64);
                    assert_eq!(mulhu(a, b, sew), want_u, "mulhu {sew} {a:#x} {b:#x}");
                    assert_eq!(mulh(a, b, sew), want_s, "mulh {sew} {a:#x} {b:#x}");
                    assert_eq!(mulhsu(a, b, sew), want_su, "mulhsu {sew} {a:#x} {b:#x}");
                }
            }
        }
    }

    #[test]
    fn division_edge_cases() {
        for sew in Sew::ALL {
            let min = sew.trunc(sew.signed_min() as u64);
            let neg1 = sew.mask();
            assert_eq!(divu(12345, 0, sew), sew.mask());
            assert_eq!(div(7, 0, sew), neg1);
            assert_eq!(div(min, neg1, sew), min);
            assert_eq!(remu(0x55, 0, sew), 0x55);
            assert_eq!(rem(min, 0, sew), min);
            assert_eq!(rem(min, neg1, sew), 0);
        }
        assert_eq!(div(i32::MIN as u32 as u64, u32::MAX as u64, Sew::E32), 0x8000_0000);
        assert_eq!(rem(i32::MIN as u32 as u64, u32::MAX as u64, Sew::E32), 0);
        // Signed division truncates toward zero, remainder takes the dividend's sign
        assert_eq!(div(0xF9, 2, Sew::E8), 0xFD); // -7 / 2 = -3
        assert_eq!(rem(0xF9, 2, Sew::E8), 0xFF); // -7 % 2 = -1
    }

    #[test]
    fn fixed_point_ops_set_vxsat() {
        let mut sat = false;
        let mut fx = FixedPointState {
            vxrm: Vxrm::Rdn,
            vxsat: &mut sat,
        };
        assert_eq!(BinaryOp::Saddu.apply(0x10, 0x20, Sew::E8, &mut fx), 0x30);
        assert_eq!(BinaryOp::Aaddu.apply(0xFF, 0xFF, Sew::E8, &mut fx), 0xFF);
        assert!(!*fx.vxsat);
        assert_eq!(BinaryOp::Saddu.apply(0xFF, 0x01, Sew::E8, &mut fx), 0xFF);
        assert!(sat);
    }

    #[test]
    fn multiply_accumulate() {
        assert_eq!(MulAddOp::Macc.apply(10, 3, 4, Sew::E8), 22);
        assert_eq!(MulAddOp::Nmsac.apply(10, 3, 4, Sew::E8), 0xFE);
        assert_eq!(MulAddOp::Madd.apply(10, 3, 4, Sew::E8), 34);
        assert_eq!(MulAddOp::Nmsub.apply(10, 3, 4, Sew::E8), 0xE6);
        assert_eq!(MulAddOp::Macc.apply(0, 0x80, 2, Sew::E8), 0);
    }

    #[test]
    fn widening_signedness() {
        assert_eq!(WideningOp::Addu.apply(0xFF, 0xFF, 0, Sew::E8), 0x1FE);
        assert_eq!(WideningOp::Add.apply(0xFF, 0xFF, 0, Sew::E8), 0xFFFE);
        assert_eq!(WideningOp::Subu.apply(0, 1, 0, Sew::E16), 0xFFFF_FFFF);
        assert_eq!(WideningOp::AddW.apply(0xFFFF, 0x01, 0, Sew::E8), 0);
        assert_eq!(WideningOp::AdduW.apply(0xFFFF, 0x01, 0, Sew::E8), 0);
        assert_eq!(WideningOp::SubuW.apply(0x100, 0x01, 0, Sew::E8), 0xFF);
        assert_eq!(WideningOp::Mulu.apply(0xFFFF_FFFF, 0xFFFF_FFFF, 0, Sew::E32), 0xFFFF_FFFE_0000_0001);
        assert_eq!(WideningOp::Mul.apply(0xFF, 0xFF, 0, Sew::E8), 1);
        assert_eq!(WideningOp::Mulsu.apply(0xFF, 0xFF, 0, Sew::E8), 0xFF01); // -1 * 255
        assert_eq!(WideningOp::Maccsu.apply(0xFF, 0xFF, 1, Sew::E8), 0xFF02); // -1 * 255 + 1
        assert_eq!(WideningOp::Maccus.apply(0xFF, 0x02, 0, Sew::E8), 0xFFFE); // 2 * -1
        assert!(WideningOp::SubW.wide_source());
        assert!(WideningOp::Macc.accumulates());
        assert!(!WideningOp::Mul.accumulates());
    }

    #[test]
    fn narrowing_shifts() {
        assert_eq!(NarrowingOp::Srl.apply(0x1234, 4, Sew::E8, Vxrm::Rnu), 0x23);
        assert_eq!(NarrowingOp::Sra.apply(0x8000, 15, Sew::E8, Vxrm::Rnu), 0xFF);
        // Shift masked to 2*SEW - 1
        assert_eq!(NarrowingOp::Srl.apply(0x8000, 16 + 15, Sew::E8, Vxrm::Rnu), 0x01);
        assert_eq!(NarrowingOp::Clipu.apply(0x1238, 4, Sew::E8, Vxrm::Rnu), 0x24);
    }

    #[test]
    fn compares() {
        assert!(CompareOp::Ltu.apply(1, 0xFF, Sew::E8));
        assert!(!CompareOp::Lt.apply(1, 0xFF, Sew::E8));
        assert!(CompareOp::Gt.apply(1, 0xFF, Sew::E8));
        assert!(CompareOp::Le.apply(0xFF, 0xFF, Sew::E8));
        assert!(CompareOp::Eq.apply(0x1FF, 0xFF, Sew::E8));
        assert!(CompareOp::Ne.apply(0, 1, Sew::E64));
        assert!(CompareOp::Gtu.apply(u64::MAX, 0, Sew::E64));
        assert!(CompareOp::Leu.apply(3, 3, Sew::E16));
    }
}
