// Vector loads and stores
//
// Element-granular accesses (unit-stride, strided, indexed, segmented) move
// whole elements; whole-register and mask accesses move bytes. Either way
// `vstart` names the first unit not yet transferred whenever a fault
// escapes, so re-executing the instruction picks up exactly there.

use super::shape::{self, Shape, ShapeError, MAX_SEGMENT_REGS};
use super::vtype::Sew;
use super::{Progress, Trap, VectorUnit};
use crate::memory::{Memory, MemoryFault};

/// Address generation for element-granular accesses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrMode {
    /// Consecutive elements of width `eew`
    UnitStride { eew: Sew },
    /// Element `i` at `base + i * stride` (stride may be negative or zero)
    Strided { eew: Sew, stride: i64 },
    /// Element `i` at `base + vs2[i]`, offsets read at `index_eew`; data
    /// elements use SEW
    Indexed { index: usize, index_eew: Sew, ordered: bool },
}

/// One element-granular vector memory instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemOp {
    /// `vd` for loads, `vs3` for stores
    pub vreg: usize,
    pub base: u64,
    pub mode: AddrMode,
    /// Segment fields per element (NF + 1)
    pub fields: usize,
    pub masked: bool,
}

impl MemOp {
    pub fn unit(vreg: usize, base: u64, eew: Sew) -> Self {
        Self {
            vreg,
            base,
            mode: AddrMode::UnitStride { eew },
            fields: 1,
            masked: false,
        }
    }

    pub fn strided(vreg: usize, base: u64, eew: Sew, stride: i64) -> Self {
        Self {
            mode: AddrMode::Strided { eew, stride },
            ..Self::unit(vreg, base, eew)
        }
    }

    pub fn indexed(vreg: usize, base: u64, index: usize, index_eew: Sew, ordered: bool) -> Self {
        Self {
            mode: AddrMode::Indexed {
                index,
                index_eew,
                ordered,
            },
            ..Self::unit(vreg, base, index_eew)
        }
    }

    pub fn segments(self, fields: usize) -> Self {
        Self { fields, ..self }
    }

    pub fn masked(self, masked: bool) -> Self {
        Self { masked, ..self }
    }
}

/// Validated layout of a `MemOp` against the current vtype
#[derive(Debug, Clone, Copy)]
struct Layout {
    data: Shape,
    fields: usize,
}

impl VectorUnit {
    fn mem_layout(&self, op: &MemOp, is_load: bool) -> Result<Layout, ShapeError> {
        shape::check_vtype(&self.csrs.vtype)?;
        let vtype = &self.csrs.vtype;
        let data = match op.mode {
            AddrMode::UnitStride { eew } | AddrMode::Strided { eew, .. } => Shape::scaled(vtype, eew)?,
            AddrMode::Indexed {
                index, index_eew, ..
            } => {
                let index_shape = Shape::scaled(vtype, index_eew)?;
                index_shape.check(index)?;
                let data = Shape::of(vtype);
                if is_load && op.fields > 1 {
                    // Segment loads may not write over their own offsets
                    shape::check_no_overlap(op.vreg, op.fields * data.regs(), index, index_shape.regs())?;
                } else if is_load {
                    shape::check_mixed_overlap(op.vreg, data, index, index_shape)?;
                }
                data
            }
        };
        if op.fields == 0 || op.fields > MAX_SEGMENT_REGS {
            return Err(ShapeError::SegmentTooLarge {
                fields: op.fields,
                emul: data.emul,
            });
        }
        data.check_segment(op.vreg, op.fields)?;
        if is_load {
            shape::check_mask_overlap(op.vreg, op.masked)?;
        }
        Ok(Layout {
            data,
            fields: op.fields,
        })
    }

    /// Address of field `field` of element `idx`
    fn element_addr(&self, op: &MemOp, layout: &Layout, idx: usize, field: usize) -> u64 {
        let bytes = layout.data.eew.bytes() as u64;
        let field_off = field as u64 * bytes;
        match op.mode {
            AddrMode::UnitStride { .. } => {
                let slot = (idx * layout.fields + field) as u64;
                op.base.wrapping_add(slot * bytes)
            }
            AddrMode::Strided { stride, .. } => op
                .base
                .wrapping_add((idx as i64).wrapping_mul(stride) as u64)
                .wrapping_add(field_off),
            AddrMode::Indexed {
                index, index_eew, ..
            } => {
                let offset = self.vregs.read_elem(index, index_eew, idx);
                op.base.wrapping_add(offset).wrapping_add(field_off)
            }
        }
    }

    /// Load every field of element `idx`, committing to registers only once
    /// all of them succeeded
    fn load_element<M: Memory>(&mut self, mem: &mut M, op: &MemOp, layout: &Layout, idx: usize) -> Result<(), MemoryFault> {
        let Layout { data, fields } = *layout;
        let mut buf = [0u64; MAX_SEGMENT_REGS];
        for (field, slot) in buf.iter_mut().enumerate().take(fields) {
            let addr = self.element_addr(op, layout, idx, field);
            *slot = mem.load(addr, data.eew)?;
        }
        for (field, &val) in buf.iter().enumerate().take(fields) {
            self.vregs.write_seg(op.vreg, field, data.emul, data.eew, idx, val);
        }
        Ok(())
    }

    // ========================================================================
    // Element-granular loads and stores
    // ========================================================================

    /// vle / vlse / vluxei / vloxei and their segment forms
    pub fn load<M: Memory>(&mut self, mem: &mut M, op: &MemOp) -> Result<Progress, Trap> {
        let layout = self.mem_layout(op, true)?;
        self.trace_entry(op, op.vreg);
        self.for_each_active(op.masked, |unit, idx| {
            unit.load_element(mem, op, &layout, idx)
                .map_err(|fault| Trap::MemoryFault { fault, element: idx })
        })?;
        Ok(Progress::Complete)
    }

    /// vse / vsse / vsuxei / vsoxei and their segment forms
    pub fn store<M: Memory>(&mut self, mem: &mut M, op: &MemOp) -> Result<Progress, Trap> {
        let layout = self.mem_layout(op, false)?;
        self.trace_entry(op, op.vreg);
        let Layout { data, fields } = layout;
        self.for_each_active(op.masked, |unit, idx| {
            for field in 0..fields {
                let addr = unit.element_addr(op, &layout, idx, field);
                let val = unit.vregs.read_seg(op.vreg, field, data.emul, data.eew, idx);
                mem.store(addr, data.eew, val)
                    .map_err(|fault| Trap::MemoryFault { fault, element: idx })?;
            }
            Ok(())
        })?;
        Ok(Progress::Complete)
    }

    /// Fault-only-first unit-stride load (vle<eew>ff, vlseg<nf>e<eew>ff).
    ///
    /// A fault on the first active element of this execution (counting from
    /// `vstart`) traps like any other load. A fault after at least one
    /// element has loaded is absorbed: `vl` shrinks to the faulting index
    /// and the instruction completes.
    pub fn load_first_fault<M: Memory>(&mut self, mem: &mut M, vd: usize, base: u64, eew: Sew, fields: usize, masked: bool) -> Result<Progress, Trap> {
        let op = MemOp::unit(vd, base, eew).segments(fields).masked(masked);
        let layout = self.mem_layout(&op, true)?;
        self.trace_entry(&op, vd);
        let vl = self.csrs.vl;
        let mut first = true;
        for idx in self.csrs.vstart..vl {
            if !self.elem_active(masked, idx) {
                continue;
            }
            self.csrs.vstart = idx;
            match self.load_element(mem, &op, &layout, idx) {
                Ok(()) => first = false,
                Err(fault) if first => {
                    log::debug!("fault-only-first: trap on first loaded element {idx}: {fault}");
                    return Err(Trap::MemoryFault { fault, element: idx });
                }
                Err(fault) => {
                    log::debug!("fault-only-first: vl {vl} -> {idx} ({fault})");
                    self.csrs.vl = idx;
                    self.csrs.vstart = 0;
                    return Ok(Progress::Truncated { vl: idx });
                }
            }
        }
        self.csrs.vstart = 0;
        Ok(Progress::Complete)
    }

    // ========================================================================
    // Byte-granular transfers: vstart counts bytes
    // ========================================================================

    fn load_bytes<M: Memory>(&mut self, mem: &mut M, vd: usize, base: u64, len: usize) -> Result<Progress, Trap> {
        for i in self.csrs.vstart..len {
            self.csrs.vstart = i;
            let val = mem
                .load(base.wrapping_add(i as u64), Sew::E8)
                .map_err(|fault| Trap::MemoryFault { fault, element: i })?;
            self.vregs.set_byte(vd, i, val as u8);
        }
        self.csrs.vstart = 0;
        Ok(Progress::Complete)
    }

    fn store_bytes<M: Memory>(&mut self, mem: &mut M, vs3: usize, base: u64, len: usize) -> Result<Progress, Trap> {
        for i in self.csrs.vstart..len {
            self.csrs.vstart = i;
            mem.store(base.wrapping_add(i as u64), Sew::E8, self.vregs.byte(vs3, i) as u64)
                .map_err(|fault| Trap::MemoryFault { fault, element: i })?;
        }
        self.csrs.vstart = 0;
        Ok(Progress::Complete)
    }

    /// vl<nr>re<eew>.v: `nr` whole registers regardless of vtype
    pub fn load_whole<M: Memory>(&mut self, mem: &mut M, vd: usize, base: u64, nr: usize) -> Result<Progress, Trap> {
        shape::check_whole_regs(vd, nr)?;
        self.trace_entry(&format_args!("vl{nr}r"), vd);
        let len = nr * self.vregs.vlenb();
        self.load_bytes(mem, vd, base, len)
    }

    /// vs<nr>r.v
    pub fn store_whole<M: Memory>(&mut self, mem: &mut M, vs3: usize, base: u64, nr: usize) -> Result<Progress, Trap> {
        shape::check_whole_regs(vs3, nr)?;
        self.trace_entry(&format_args!("vs{nr}r"), vs3);
        let len = nr * self.vregs.vlenb();
        self.store_bytes(mem, vs3, base, len)
    }

    /// vlm.v: `ceil(vl / 8)` mask bytes
    pub fn load_mask<M: Memory>(&mut self, mem: &mut M, vd: usize, base: u64) -> Result<Progress, Trap> {
        shape::check_vtype(&self.csrs.vtype)?;
        self.trace_entry(&format_args!("vlm"), vd);
        let len = self.csrs.vl.div_ceil(8);
        self.load_bytes(mem, vd, base, len)
    }

    /// vsm.v
    pub fn store_mask<M: Memory>(&mut self, mem: &mut M, vs3: usize, base: u64) -> Result<Progress, Trap> {
        shape::check_vtype(&self.csrs.vtype)?;
        self.trace_entry(&format_args!("vsm"), vs3);
        let len = self.csrs.vl.div_ceil(8);
        self.store_bytes(mem, vs3, base, len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VectorConfig;
    use crate::memory::{Access, Ram};
    use crate::vector::{Lmul, Vtype};

    const BASE: u64 = 0x1000;

    fn setup(sew: Sew, lmul: Lmul, vl: u64) -> (VectorUnit, Ram) {
        let mut unit = VectorUnit::new(VectorConfig::default());
        unit.configure(vl, Vtype::new(sew, lmul));
        let mut ram = Ram::new(BASE, 0x1000);
        let bytes: Vec<u8> = (0..=255u8).collect();
        ram.load_bytes(BASE, &bytes).unwrap();
        (unit, ram)
    }

    #[test]
    fn unit_stride_load_store() {
        let (mut v, mut ram) = setup(Sew::E32, Lmul::M1, 4);
        v.load(&mut ram, &MemOp::unit(1, BASE, Sew::E32)).unwrap();
        assert_eq!(v.vregs.read_elem(1, Sew::E32, 1), 0x0706_0504);
        v.store(&mut ram, &MemOp::unit(1, BASE + 0x100, Sew::E32)).unwrap();
        assert_eq!(ram.bytes(BASE + 0x100, 16).unwrap(), ram.bytes(BASE, 16).unwrap());
    }

    #[test]
    fn eew_differs_from_sew() {
        // SEW=32, LMUL=1 with EEW=8 gives EMUL=1/4
        let (mut v, mut ram) = setup(Sew::E32, Lmul::M1, 4);
        v.load(&mut ram, &MemOp::unit(3, BASE + 4, Sew::E8)).unwrap();
        assert_eq!(v.vregs.read_elem(3, Sew::E8, 0), 4);
        assert_eq!(v.vregs.read_elem(3, Sew::E8, 3), 7);
        assert_eq!(v.vregs.read_elem(3, Sew::E8, 4), 0);
    }

    #[test]
    fn strided_negative_stride() {
        let (mut v, mut ram) = setup(Sew::E16, Lmul::M1, 3);
        v.load(&mut ram, &MemOp::strided(2, BASE + 0x20, Sew::E16, -8)).unwrap();
        assert_eq!(v.vregs.read_elem(2, Sew::E16, 0), 0x2120);
        assert_eq!(v.vregs.read_elem(2, Sew::E16, 1), 0x1918);
        assert_eq!(v.vregs.read_elem(2, Sew::E16, 2), 0x1110);
    }

    #[test]
    fn indexed_uses_sew_for_data() {
        let (mut v, mut ram) = setup(Sew::E16, Lmul::M1, 3);
        for (i, off) in [0x40u64, 0x02, 0x10].iter().enumerate() {
            v.vregs.write_elem(8, Sew::E8, i, *off);
        }
        v.load(&mut ram, &MemOp::indexed(4, BASE, 8, Sew::E8, false)).unwrap();
        assert_eq!(v.vregs.read_elem(4, Sew::E16, 0), 0x4140);
        assert_eq!(v.vregs.read_elem(4, Sew::E16, 1), 0x0302);
        assert_eq!(v.vregs.read_elem(4, Sew::E16, 2), 0x1110);
    }

    #[test]
    fn segment_load_deinterleaves() {
        let (mut v, mut ram) = setup(Sew::E8, Lmul::M1, 4);
        v.load(&mut ram, &MemOp::unit(4, BASE, Sew::E8).segments(3)).unwrap();
        for i in 0..4 {
            assert_eq!(v.vregs.read_elem(4, Sew::E8, i), 3 * i as u64);
            assert_eq!(v.vregs.read_elem(5, Sew::E8, i), 3 * i as u64 + 1);
            assert_eq!(v.vregs.read_elem(6, Sew::E8, i), 3 * i as u64 + 2);
        }
        v.store(&mut ram, &MemOp::unit(4, BASE + 0x200, Sew::E8).segments(3)).unwrap();
        assert_eq!(ram.bytes(BASE + 0x200, 12).unwrap(), ram.bytes(BASE, 12).unwrap());
    }

    #[test]
    fn strided_segment_fields_are_adjacent() {
        let (mut v, mut ram) = setup(Sew::E16, Lmul::M1, 2);
        v.load(&mut ram, &MemOp::strided(8, BASE, Sew::E16, 0x10).segments(2)).unwrap();
        assert_eq!(v.vregs.read_elem(8, Sew::E16, 1), 0x1110);
        assert_eq!(v.vregs.read_elem(9, Sew::E16, 1), 0x1312);
    }

    #[test]
    fn fault_pins_vstart_and_resume_completes() {
        let (mut v, mut ram) = setup(Sew::E32, Lmul::M2, 8);
        ram.inject_fault(BASE + 20..BASE + 24);
        let trap = v.load(&mut ram, &MemOp::unit(2, BASE, Sew::E32)).unwrap_err();
        assert_eq!(
            trap,
            Trap::MemoryFault {
                fault: MemoryFault::PageFault {
                    addr: BASE + 20,
                    access: Access::Load
                },
                element: 5
            }
        );
        assert_eq!(v.vstart(), 5);
        assert_eq!(v.vregs.read_elem(2, Sew::E32, 4), 0x1312_1110);
        assert_eq!(v.vregs.read_elem(2, Sew::E32, 5), 0);
        ram.clear_faults();
        v.load(&mut ram, &MemOp::unit(2, BASE, Sew::E32)).unwrap();
        assert_eq!(v.vstart(), 0);
        assert_eq!(v.vregs.read_elem(2, Sew::E32, 7), 0x1F1E_1D1C);
    }

    #[test]
    fn resumed_store_skips_completed_elements() {
        let (mut v, mut ram) = setup(Sew::E8, Lmul::M1, 8);
        v.vregs.reg_mut(1).fill(0xAA);
        v.csrs.vstart = 6;
        v.store(&mut ram, &MemOp::unit(1, BASE, Sew::E8)).unwrap();
        assert_eq!(ram.bytes(BASE, 8).unwrap(), &[0, 1, 2, 3, 4, 5, 0xAA, 0xAA]);
    }

    #[test]
    fn fault_only_first_truncates() {
        let (mut v, mut ram) = setup(Sew::E16, Lmul::M1, 8);
        ram.inject_fault(BASE + 6..BASE + 8);
        let progress = v.load_first_fault(&mut ram, 1, BASE, Sew::E16, 1, false).unwrap();
        assert_eq!(progress, Progress::Truncated { vl: 3 });
        assert_eq!(v.vl(), 3);
        assert_eq!(v.vstart(), 0);
        assert_eq!(v.vregs.read_elem(1, Sew::E16, 2), 0x0504);
        assert_eq!(v.vregs.read_elem(1, Sew::E16, 3), 0);
    }

    #[test]
    fn fault_only_first_traps_on_element_zero() {
        let (mut v, mut ram) = setup(Sew::E8, Lmul::M1, 8);
        ram.inject_fault(BASE..BASE + 1);
        let trap = v.load_first_fault(&mut ram, 1, BASE, Sew::E8, 1, false).unwrap_err();
        assert_eq!(trap.cause(), 13);
        assert_eq!(v.vl(), 8);
    }

    #[test]
    fn fault_only_first_skips_masked_off_faulting_element() {
        let (mut v, mut ram) = setup(Sew::E8, Lmul::M1, 4);
        ram.inject_fault(BASE + 2..BASE + 3);
        v.vregs.set_byte(0, 0, 0b1011);
        let progress = v.load_first_fault(&mut ram, 1, BASE, Sew::E8, 1, true).unwrap();
        assert_eq!(progress, Progress::Complete);
        assert_eq!(v.vl(), 4);
        assert_eq!(v.vregs.read_elem(1, Sew::E8, 3), 3);
    }

    #[test]
    fn fault_only_first_traps_when_nothing_loaded_yet() {
        // Element 0 masked off, so element 1 is the first access
        let (mut v, mut ram) = setup(Sew::E8, Lmul::M1, 8);
        ram.inject_fault(BASE + 1..BASE + 2);
        v.vregs.set_byte(0, 0, 0b1111_1110);
        v.vregs.write_elem(1, Sew::E8, 1, 0xAA);
        let trap = v.load_first_fault(&mut ram, 1, BASE, Sew::E8, 1, true).unwrap_err();
        assert!(matches!(trap, Trap::MemoryFault { element: 1, .. }));
        assert_eq!(v.vl(), 8);
        assert_eq!(v.vstart(), 1);
        assert_eq!(v.vregs.read_elem(1, Sew::E8, 1), 0xAA);
    }

    #[test]
    fn fault_only_first_resume_traps_on_first_element() {
        let (mut v, mut ram) = setup(Sew::E8, Lmul::M1, 8);
        ram.inject_fault(BASE + 3..BASE + 4);
        v.csrs.vstart = 3;
        let trap = v.load_first_fault(&mut ram, 1, BASE, Sew::E8, 1, false).unwrap_err();
        assert!(matches!(trap, Trap::MemoryFault { element: 3, .. }));
        assert_eq!(v.vl(), 8);
        assert_eq!(v.vstart(), 3);

        // Resuming past a loaded element truncates instead
        v.csrs.vstart = 2;
        let progress = v.load_first_fault(&mut ram, 1, BASE, Sew::E8, 1, false).unwrap();
        assert_eq!(progress, Progress::Truncated { vl: 3 });
        assert_eq!(v.vregs.read_elem(1, Sew::E8, 2), 2);
    }

    #[test]
    fn whole_register_and_mask_transfers() {
        let (mut v, mut ram) = setup(Sew::E64, Lmul::M1, 2);
        v.load_whole(&mut ram, 2, BASE, 2).unwrap();
        assert_eq!(v.vregs.byte(3, 0), 16);
        assert_eq!(v.vregs.byte(3, 15), 31);
        v.configure(11, Vtype::new(Sew::E8, Lmul::M1));
        v.load_mask(&mut ram, 0, BASE + 0x80).unwrap();
        assert_eq!(v.vregs.byte(0, 1), 0x81);
        assert_eq!(v.vregs.byte(0, 2), 0);
        v.store_mask(&mut ram, 0, BASE + 0x300).unwrap();
        assert_eq!(ram.bytes(BASE + 0x300, 3).unwrap(), &[0x80, 0x81, 0]);
    }

    #[test]
    fn whole_register_resume_counts_bytes() {
        let (mut v, mut ram) = setup(Sew::E8, Lmul::M1, 1);
        ram.inject_fault(BASE + 20..BASE + 21);
        let err = v.load_whole(&mut ram, 4, BASE, 2).unwrap_err();
        assert!(matches!(err, Trap::MemoryFault { element: 20, .. }));
        assert_eq!(v.vstart(), 20);
        ram.clear_faults();
        v.load_whole(&mut ram, 4, BASE, 2).unwrap();
        assert_eq!(v.vregs.byte(5, 15), 31);
        assert_eq!(v.vstart(), 0);
    }

    #[test]
    fn illegal_shapes_touch_nothing() {
        let (mut v, mut ram) = setup(Sew::E8, Lmul::M8, 16);
        let before = v.vregs.clone();
        // EEW=64 with SEW=8, LMUL=8 needs EMUL=64
        let err = v.load(&mut ram, &MemOp::unit(0, BASE, Sew::E64)).unwrap_err();
        assert_eq!(err, Trap::IllegalInstruction(ShapeError::IllegalEmul));
        // Misaligned group
        let err = v.load(&mut ram, &MemOp::unit(3, BASE, Sew::E8)).unwrap_err();
        assert!(matches!(err, Trap::IllegalInstruction(ShapeError::Misaligned { .. })));
        // Masked load into v0
        v.configure(4, Vtype::new(Sew::E8, Lmul::M1));
        let err = v.load(&mut ram, &MemOp::unit(0, BASE, Sew::E8).masked(true)).unwrap_err();
        assert_eq!(err, Trap::IllegalInstruction(ShapeError::MaskOverlap(0)));
        assert_eq!(v.vregs.reg(0), before.reg(0));
        assert_eq!(v.vregs.reg(3), before.reg(3));
        assert!(v.load_whole(&mut ram, 1, BASE, 2).is_err());
    }
}
