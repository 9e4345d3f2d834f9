// RISC-V Vector Extension (V) execution engine
//
// One `VectorUnit` holds the register file and typing state of a single hart.
// Every instruction validates operand shapes first, then walks elements from
// `vstart` to `vl`, and returns `Ok(Progress)` or `Err(Trap)` for the
// surrounding dispatch loop to act on.

pub mod alu;
pub mod arith;
pub mod fixed_point;
pub mod mask;
pub mod mem;
pub mod permute;
pub mod reduction;
pub mod regfile;
pub mod shape;
pub mod vtype;

use crate::config::VectorConfig;
use crate::memory::MemoryFault;

pub use alu::{BinaryOp, CompareOp, MulAddOp, NarrowingOp, WideningOp};
pub use regfile::VectorRegFile;
pub use shape::{Shape, ShapeError};
pub use vtype::{Emul, Lmul, Sew, Vtype, Vxrm};

/// Vector CSR state consumed and updated by every instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorCsrs {
    pub vtype: Vtype,
    pub vl: usize,
    pub vstart: usize,
    pub vxrm: Vxrm,
    /// Sticky; only cleared by an explicit CSR write
    pub vxsat: bool,
}

impl Default for VectorCsrs {
    fn default() -> Self {
        Self {
            vtype: Vtype::default(),
            vl: 0,
            vstart: 0,
            vxrm: Vxrm::default(),
            vxsat: false,
        }
    }
}

/// How an instruction finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// All elements up to `vl` were processed and `vstart` is back to 0
    Complete,
    /// A fault-only-first load stopped early and shortened `vl`
    Truncated { vl: usize },
}

/// Synchronous exception raised by a vector instruction.
///
/// Illegal shapes are detected before any element is touched. Memory faults
/// leave `vstart` at `element` so re-executing the instruction resumes there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Trap {
    #[error("illegal instruction: {0}")]
    IllegalInstruction(#[from] ShapeError),
    #[error("element {element}: {fault}")]
    MemoryFault { fault: MemoryFault, element: usize },
}

impl Trap {
    /// RISC-V exception cause code
    pub fn cause(&self) -> u64 {
        match self {
            Self::IllegalInstruction(_) => 2,
            Self::MemoryFault { fault, .. } => fault.cause(),
        }
    }

    /// Trap value: the faulting address, or 0
    pub fn tval(&self) -> u64 {
        match self {
            Self::IllegalInstruction(_) => 0,
            Self::MemoryFault { fault, .. } => fault.addr(),
        }
    }
}

/// Second source of an arithmetic instruction: a vector register (`.vv`) or
/// a scalar already sign-extended from `rs1` or the immediate (`.vx`/`.vi`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Vector(usize),
    Scalar(u64),
}

impl Operand {
    /// Element `idx` at width `eew`, or the scalar untruncated
    pub fn read(self, vregs: &VectorRegFile, eew: Sew, idx: usize) -> u64 {
        match self {
            Self::Vector(reg) => vregs.read_elem(reg, eew, idx),
            Self::Scalar(val) => val,
        }
    }

    pub fn vreg(self) -> Option<usize> {
        match self {
            Self::Vector(reg) => Some(reg),
            Self::Scalar(_) => None,
        }
    }

    /// Shape-check the register operand, if there is one
    pub(crate) fn check(self, shape: Shape) -> Result<(), ShapeError> {
        match self {
            Self::Vector(reg) => shape.check(reg),
            Self::Scalar(_) => Ok(()),
        }
    }
}

/// Vector execution context for one hart
#[derive(Clone)]
pub struct VectorUnit {
    config: VectorConfig,
    pub vregs: VectorRegFile,
    pub csrs: VectorCsrs,
}

impl VectorUnit {
    pub fn new(config: VectorConfig) -> Self {
        Self {
            config,
            vregs: VectorRegFile::new(&config),
            csrs: VectorCsrs::default(),
        }
    }

    pub fn config(&self) -> &VectorConfig {
        &self.config
    }

    pub fn vtype(&self) -> Vtype {
        self.csrs.vtype
    }

    pub fn vl(&self) -> usize {
        self.csrs.vl
    }

    pub fn vstart(&self) -> usize {
        self.csrs.vstart
    }

    /// VLMAX for the current vtype (0 when vill)
    pub fn vlmax(&self) -> usize {
        self.csrs.vtype.vlmax(self.config.vlen())
    }

    // ========================================================================
    // Configuration (vsetvl / vsetvli / vsetivli)
    // ========================================================================

    /// Decode `raw` as a vtype and set `vl = min(avl, VLMAX)`. Returns the new
    /// `vl` (the value written to `rd`).
    pub fn vsetvl(&mut self, avl: u64, raw: u64) -> u64 {
        self.configure(avl, Vtype::decode(raw))
    }

    /// As [`VectorUnit::vsetvl`] with an already decoded vtype. `avl` of
    /// `u64::MAX` selects VLMAX (the `rs1 = x0, rd != x0` form).
    pub fn configure(&mut self, avl: u64, vtype: Vtype) -> u64 {
        self.csrs.vstart = 0;
        if vtype.vill {
            log::debug!("vsetvl: vill (avl={avl})");
            self.csrs.vtype = Vtype::default();
            self.csrs.vl = 0;
            return 0;
        }
        let vlmax = vtype.vlmax(self.config.vlen()) as u64;
        let vl = if avl == u64::MAX { vlmax } else { avl.min(vlmax) };
        self.csrs.vtype = vtype;
        self.csrs.vl = vl as usize;
        log::debug!("vsetvl: {vtype} avl={avl} vl={vl} vlmax={vlmax}");
        vl
    }

    // ========================================================================
    // Element loop
    // ========================================================================

    /// Mask test for element `idx`; unmasked instructions see every element
    /// as active
    pub fn elem_active(&self, masked: bool, idx: usize) -> bool {
        !masked || self.vregs.mask_bit(0, idx)
    }

    /// Run `f` on each active element in `vstart..vl`.
    ///
    /// `vstart` tracks the element in flight, so when `f` fails it is left
    /// pointing at the element that must be retried. On success it resets
    /// to 0.
    pub(crate) fn for_each_active<F>(&mut self, masked: bool, mut f: F) -> Result<(), Trap>
    where
        F: FnMut(&mut Self, usize) -> Result<(), Trap>,
    {
        let vl = self.csrs.vl;
        for idx in self.csrs.vstart..vl {
            if !self.elem_active(masked, idx) {
                continue;
            }
            self.csrs.vstart = idx;
            if let Err(trap) = f(self, idx) {
                log::debug!("trap at element {idx} (vl={vl}): {trap}");
                return Err(trap);
            }
        }
        self.csrs.vstart = 0;
        Ok(())
    }

    /// As [`VectorUnit::for_each_active`] for element bodies that cannot fault
    pub(crate) fn for_each_active_infallible<F>(&mut self, masked: bool, mut f: F)
    where
        F: FnMut(&mut Self, usize),
    {
        let vl = self.csrs.vl;
        for idx in self.csrs.vstart..vl {
            if self.elem_active(masked, idx) {
                f(self, idx);
            }
        }
        self.csrs.vstart = 0;
    }

    pub(crate) fn trace_entry(&self, what: &dyn std::fmt::Debug, vd: usize) {
        log::trace!(
            "{what:?} v{vd}: {} vl={} vstart={}",
            self.csrs.vtype,
            self.csrs.vl,
            self.csrs.vstart
        );
    }

    /// Legal vtype and same-width shape, the prerequisite of nearly every
    /// arithmetic instruction
    pub(crate) fn sew_shape(&self) -> Result<Shape, ShapeError> {
        shape::check_vtype(&self.csrs.vtype)?;
        Ok(Shape::of(&self.csrs.vtype))
    }

    pub(crate) fn require_vstart_zero(&self) -> Result<(), ShapeError> {
        match self.csrs.vstart {
            0 => Ok(()),
            n => Err(ShapeError::VstartNotZero(n)),
        }
    }
}
