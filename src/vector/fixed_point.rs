// Fixed-point helpers: rounding shifts, saturation, averaging
//
// Element values travel as u64 with the active width alongside; double-width
// intermediates of 64-bit operations use the native 128-bit integers.

use super::vtype::{Sew, Vxrm};

/// Rounding right shift: `(v >> d) + r`, with the increment `r` chosen by
/// the `vxrm` mode from the bits shifted out.
pub trait RoundOff: Copy {
    fn roundoff(self, d: u32, rm: Vxrm) -> Self;
}

macro_rules! impl_roundoff {
    ($($t:ty),*) => {$(
        impl RoundOff for $t {
            #[inline]
            fn roundoff(self, d: u32, rm: Vxrm) -> Self {
                debug_assert!(d < <$t>::BITS);
                if d == 0 {
                    return self;
                }
                let bit = |n: u32| (self >> n) & 1 != 0;
                let any_below = |n: u32| self & (1 as $t).wrapping_shl(n).wrapping_sub(1) != 0;
                let r = match rm {
                    Vxrm::Rnu => bit(d - 1),
                    Vxrm::Rne => bit(d - 1) && (bit(d) || any_below(d - 1)),
                    Vxrm::Rdn => false,
                    Vxrm::Rod => !bit(d) && any_below(d),
                };
                (self >> d).wrapping_add(r as $t)
            }
        }
    )*};
}

impl_roundoff!(u8, u16, u32, u64, u128, i8, i16, i32, i64, i128);

// ============================================================================
// Saturating add/sub
// ============================================================================

/// Saturating unsigned add
pub fn saddu(a: u64, b: u64, sew: Sew, vxsat: &mut bool) -> u64 {
    let a = sew.trunc(a);
    let sum = sew.trunc(a.wrapping_add(b));
    // Wrapped iff the result fell below an operand
    if sum < a {
        *vxsat = true;
        sew.mask()
    } else {
        sum
    }
}

/// Saturating signed add
pub fn sadd(a: u64, b: u64, sew: Sew, vxsat: &mut bool) -> u64 {
    let (sa, sb) = (sew.sext(a), sew.sext(b));
    let sum = sew.sext(a.wrapping_add(b));
    if (sa < 0) == (sb < 0) && (sum < 0) != (sa < 0) {
        *vxsat = true;
        signed_bound(sa, sew)
    } else {
        sew.trunc(sum as u64)
    }
}

/// Saturating unsigned subtract
pub fn ssubu(a: u64, b: u64, sew: Sew, vxsat: &mut bool) -> u64 {
    let (a, b) = (sew.trunc(a), sew.trunc(b));
    if a < b {
        *vxsat = true;
        0
    } else {
        a - b
    }
}

/// Saturating signed subtract
pub fn ssub(a: u64, b: u64, sew: Sew, vxsat: &mut bool) -> u64 {
    let (sa, sb) = (sew.sext(a), sew.sext(b));
    let diff = sew.sext(a.wrapping_sub(b));
    if (sa < 0) != (sb < 0) && (diff < 0) != (sa < 0) {
        *vxsat = true;
        signed_bound(sa, sew)
    } else {
        sew.trunc(diff as u64)
    }
}

// SIGNED_MAX + (a < 0): MAX for positive overflow, wraps to MIN for negative
fn signed_bound(a: i64, sew: Sew) -> u64 {
    sew.trunc((sew.signed_max() as u64).wrapping_add((a < 0) as u64))
}

fn clamp_signed(v: i128, sew: Sew, vxsat: &mut bool) -> u64 {
    let (min, max) = (sew.signed_min() as i128, sew.signed_max() as i128);
    let clamped = if v > max {
        *vxsat = true;
        max
    } else if v < min {
        *vxsat = true;
        min
    } else {
        v
    };
    sew.trunc(clamped as u64)
}

// ============================================================================
// Averaging add/sub: exact double-width result, rounding shift by one
// ============================================================================

pub fn aaddu(a: u64, b: u64, sew: Sew, rm: Vxrm) -> u64 {
    let sum = sew.trunc(a) as u128 + sew.trunc(b) as u128;
    sew.trunc(sum.roundoff(1, rm) as u64)
}

pub fn aadd(a: u64, b: u64, sew: Sew, rm: Vxrm) -> u64 {
    let sum = sew.sext(a) as i128 + sew.sext(b) as i128;
    sew.trunc(sum.roundoff(1, rm) as u64)
}

pub fn asubu(a: u64, b: u64, sew: Sew, rm: Vxrm) -> u64 {
    let diff = (sew.trunc(a) as u128).wrapping_sub(sew.trunc(b) as u128);
    sew.trunc(diff.roundoff(1, rm) as u64)
}

pub fn asub(a: u64, b: u64, sew: Sew, rm: Vxrm) -> u64 {
    let diff = sew.sext(a) as i128 - sew.sext(b) as i128;
    sew.trunc(diff.roundoff(1, rm) as u64)
}

// ============================================================================
// Fractional multiply and scaling shifts
// ============================================================================

/// vsmul: signed saturating fractional multiply,
/// `clip(roundoff_signed(a * b, SEW - 1))`
pub fn smul(a: u64, b: u64, sew: Sew, rm: Vxrm, vxsat: &mut bool) -> u64 {
    let product = sew.sext(a) as i128 * sew.sext(b) as i128;
    clamp_signed(product.roundoff(sew.bits() - 1, rm), sew, vxsat)
}

/// vssrl: scaling shift right logical with rounding
pub fn ssrl(a: u64, shift: u64, sew: Sew, rm: Vxrm) -> u64 {
    let shift = (shift & (sew.bits() as u64 - 1)) as u32;
    sew.trunc(a).roundoff(shift, rm)
}

/// vssra: scaling shift right arithmetic with rounding
pub fn ssra(a: u64, shift: u64, sew: Sew, rm: Vxrm) -> u64 {
    let shift = (shift & (sew.bits() as u64 - 1)) as u32;
    sew.trunc(sew.sext(a).roundoff(shift, rm) as u64)
}

/// vnclipu: rounding shift of the 2*SEW source, narrowed to `sew` by
/// truncation
pub fn nclipu(wide: u64, shift: u64, sew: Sew, rm: Vxrm) -> u64 {
    let wide_sew = sew.widen().unwrap_or(Sew::E64);
    sew.trunc(ssrl(wide, shift, wide_sew, rm))
}

/// vnclip: signed counterpart of [`nclipu`]
pub fn nclip(wide: u64, shift: u64, sew: Sew, rm: Vxrm) -> u64 {
    let wide_sew = sew.widen().unwrap_or(Sew::E64);
    sew.trunc(ssra(wide, shift, wide_sew, rm))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundoff_modes() {
        assert_eq!(0b1011u8.roundoff(1, Vxrm::Rne), 0b110);
        assert_eq!(0b1010u8.roundoff(1, Vxrm::Rdn), 0b101);
        assert_eq!(0b1011u8.roundoff(1, Vxrm::Rnu), 0b110);
        assert_eq!(0b1011u8.roundoff(1, Vxrm::Rod), 0b101);
        // Tie with even result stays put under rne, rounds up under rnu
        assert_eq!(0b1001u8.roundoff(1, Vxrm::Rne), 0b100);
        assert_eq!(0b1001u8.roundoff(1, Vxrm::Rnu), 0b101);
        // Above the midpoint always rounds up under rne
        assert_eq!(0b1011u8.roundoff(2, Vxrm::Rne), 0b11);
        // rod sets the LSB when anything was shifted out
        assert_eq!(0b1100u8.roundoff(1, Vxrm::Rod), 0b110);
        assert_eq!(0b1101u8.roundoff(2, Vxrm::Rod), 0b11);
        assert_eq!(0b1110u8.roundoff(2, Vxrm::Rod), 0b11);
        for rm in Vxrm::ALL {
            assert_eq!(0xABu8.roundoff(0, rm), 0xAB);
        }
    }

    #[test]
    fn roundoff_all_widths_agree() {
        let v = 0b1_0110_1101u64;
        for rm in Vxrm::ALL {
            for d in 1..8 {
                let want = v.roundoff(d, rm);
                assert_eq!((v as u16).roundoff(d, rm) as u64, want);
                assert_eq!((v as u32).roundoff(d, rm) as u64, want);
                assert_eq!((v as u128).roundoff(d, rm) as u64, want);
            }
        }
        // Signed values round on their two's-complement bits
        assert_eq!((-3i8).roundoff(1, Vxrm::Rnu), -1);
        assert_eq!((-3i8).roundoff(1, Vxrm::Rdn), -2);
        assert_eq!((-3i8).roundoff(1, Vxrm::Rne), -2);
        assert_eq!((-5i128).roundoff(1, Vxrm::Rne), -2);
        assert_eq!(((1i128 << 100) + (1 << 63)).roundoff(64, Vxrm::Rnu), (1 << 36) + 1);
    }

    #[test]
    fn saturating_add_unsigned() {
        let mut sat = false;
        assert_eq!(saddu(0xFF, 0x01, Sew::E8, &mut sat), 0xFF);
        assert!(sat);
        let mut sat = false;
        assert_eq!(saddu(0x10, 0x20, Sew::E8, &mut sat), 0x30);
        assert!(!sat);
        for sew in Sew::ALL {
            let mut sat = false;
            assert_eq!(saddu(sew.mask(), 2, sew, &mut sat), sew.mask());
            assert!(sat);
        }
    }

    #[test]
    fn saturating_add_signed() {
        for sew in Sew::ALL {
            let max = sew.signed_max() as u64;
            let min = sew.trunc(sew.signed_min() as u64);
            let mut sat = false;
            assert_eq!(sadd(max, 1, sew, &mut sat), sew.trunc(max));
            assert!(sat);
            let mut sat = false;
            assert_eq!(sadd(min, sew.mask(), sew, &mut sat), min);
            assert!(sat);
            let mut sat = false;
            assert_eq!(sadd(min, 1, sew, &mut sat), min + 1);
            assert!(!sat);
        }
    }

    #[test]
    fn saturating_sub() {
        let mut sat = false;
        assert_eq!(ssubu(3, 5, Sew::E16, &mut sat), 0);
        assert!(sat);
        let mut sat = false;
        assert_eq!(ssub(0x80, 1, Sew::E8, &mut sat), 0x80);
        assert!(sat);
        let mut sat = false;
        assert_eq!(ssub(0x7F, 0xFF, Sew::E8, &mut sat), 0x7F);
        assert!(sat);
        let mut sat = false;
        assert_eq!(ssub(5, 7, Sew::E32, &mut sat), 0xFFFF_FFFE);
        assert!(!sat);
    }

    #[test]
    fn averaging() {
        // (255 + 1) / 2 computed without overflow
        assert_eq!(aaddu(0xFF, 0x01, Sew::E8, Vxrm::Rdn), 0x80);
        assert_eq!(aaddu(u64::MAX, u64::MAX, Sew::E64, Vxrm::Rnu), u64::MAX);
        assert_eq!(aaddu(1, 2, Sew::E8, Vxrm::Rnu), 2);
        assert_eq!(aaddu(1, 2, Sew::E8, Vxrm::Rdn), 1);
        assert_eq!(aadd(0x80, 0x80, Sew::E8, Vxrm::Rdn), 0x80); // -128
        assert_eq!(aadd(0xFF, 0xFE, Sew::E8, Vxrm::Rne), 0xFE); // (-3)/2 -> -2
        assert_eq!(asubu(0, 1, Sew::E8, Vxrm::Rdn), 0xFF);
        assert_eq!(asub(0x7F, 0x80, Sew::E8, Vxrm::Rdn), 0x7F);
        assert_eq!(asub(5, 2, Sew::E32, Vxrm::Rnu), 2);
    }

    #[test]
    fn fractional_multiply() {
        for sew in Sew::ALL {
            let min = sew.trunc(sew.signed_min() as u64);
            let mut sat = false;
            assert_eq!(smul(min, min, sew, Vxrm::Rnu, &mut sat), sew.signed_max() as u64);
            assert!(sat);
        }
        // 0.5 * 0.5 = 0.25 in Q7
        let mut sat = false;
        assert_eq!(smul(0x40, 0x40, Sew::E8, Vxrm::Rnu, &mut sat), 0x20);
        assert!(!sat);
        // -0.5 * 0.5 = -0.25
        assert_eq!(smul(0xC0, 0x40, Sew::E8, Vxrm::Rnu, &mut sat), 0xE0);
    }

    #[test]
    fn scaling_shifts() {
        assert_eq!(ssrl(0b1011, 1, Sew::E8, Vxrm::Rne), 0b110);
        assert_eq!(ssrl(0xFF, 9, Sew::E8, Vxrm::Rdn), 0x7F); // shift masked to 1
        assert_eq!(ssra(0x80, 7, Sew::E8, Vxrm::Rdn), 0xFF);
        assert_eq!(ssra(0xF0, 4, Sew::E8, Vxrm::Rnu), 0xFF);
        assert_eq!(ssra(u64::MAX, 63, Sew::E64, Vxrm::Rnu), 0);
    }

    #[test]
    fn narrowing_clip_truncates() {
        // 0x1234 >> 4 = 0x123 (round bit 0b0100 >> 3 = 0), truncated to 0x23
        assert_eq!(nclipu(0x1234, 4, Sew::E8, Vxrm::Rnu), 0x23);
        assert_eq!(nclipu(0x1238, 4, Sew::E8, Vxrm::Rnu), 0x24);
        // Shift masked to 2*SEW-1
        assert_eq!(nclipu(0x8000, 31, Sew::E8, Vxrm::Rdn), 0x01);
        assert_eq!(nclip(0xFF00, 8, Sew::E8, Vxrm::Rdn), 0xFF);
        assert_eq!(nclip(0xFFFF_FFFF_8000_0000, 16, Sew::E32, Vxrm::Rdn), 0xFFFF_8000);
    }
}
