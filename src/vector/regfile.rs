use super::vtype::{Emul, Sew};
use crate::config::{VectorConfig, NUM_VREGS};

/// Vector register file: 32 registers × VLENB bytes each, stored contiguously
/// so a register group is just a longer byte range.
#[derive(Clone)]
pub struct VectorRegFile {
    vlenb: usize,
    data: Vec<u8>,
}

impl VectorRegFile {
    pub fn new(config: &VectorConfig) -> Self {
        Self {
            vlenb: config.vlenb(),
            data: vec![0; NUM_VREGS * config.vlenb()],
        }
    }

    pub fn vlenb(&self) -> usize {
        self.vlenb
    }

    /// Byte offset of element `idx` of field `field` of the group at `reg`.
    ///
    /// Field `fi` of a segmented operand lives in the group starting at
    /// `reg + fi * emul.regs()`. No bounds check happens here; callers
    /// validate operand shapes before touching elements.
    pub fn element_offset(&self, reg: usize, field: usize, emul: Emul, eew: Sew, idx: usize) -> usize {
        (reg + field * emul.regs()) * self.vlenb + idx * eew.bytes()
    }

    /// Read field `field` of element `idx`, zero-extended to 64 bits
    pub fn read_seg(&self, reg: usize, field: usize, emul: Emul, eew: Sew, idx: usize) -> u64 {
        let off = self.element_offset(reg, field, emul, eew, idx);
        let n = eew.bytes();
        let mut buf = [0u8; 8];
        buf[..n].copy_from_slice(&self.data[off..off + n]);
        u64::from_le_bytes(buf)
    }

    /// Write the low `eew` bits of `val` into field `field` of element `idx`
    pub fn write_seg(&mut self, reg: usize, field: usize, emul: Emul, eew: Sew, idx: usize, val: u64) {
        let off = self.element_offset(reg, field, emul, eew, idx);
        let n = eew.bytes();
        self.data[off..off + n].copy_from_slice(&val.to_le_bytes()[..n]);
    }

    /// Read element `idx` of the register group starting at `reg`.
    /// Groups larger than one register span consecutive registers.
    pub fn read_elem(&self, reg: usize, eew: Sew, idx: usize) -> u64 {
        self.read_seg(reg, 0, Emul::M1, eew, idx)
    }

    /// Write element `idx` of the register group starting at `reg`.
    pub fn write_elem(&mut self, reg: usize, eew: Sew, idx: usize, val: u64) {
        self.write_seg(reg, 0, Emul::M1, eew, idx, val)
    }

    /// Byte `idx` of the group starting at `reg`
    pub fn byte(&self, reg: usize, idx: usize) -> u8 {
        self.data[reg * self.vlenb + idx]
    }

    pub fn set_byte(&mut self, reg: usize, idx: usize, val: u8) {
        self.data[reg * self.vlenb + idx] = val;
    }

    /// Raw bytes of a single register
    pub fn reg(&self, reg: usize) -> &[u8] {
        &self.data[reg * self.vlenb..(reg + 1) * self.vlenb]
    }

    pub fn reg_mut(&mut self, reg: usize) -> &mut [u8] {
        &mut self.data[reg * self.vlenb..(reg + 1) * self.vlenb]
    }

    /// Copy `nr` whole registers from `src` to `dst`
    pub fn copy_regs(&mut self, dst: usize, src: usize, nr: usize) {
        let len = nr * self.vlenb;
        self.data
            .copy_within(src * self.vlenb..src * self.vlenb + len, dst * self.vlenb);
    }

    /// Mask bit for element idx of mask register `reg`
    pub fn mask_bit(&self, reg: usize, idx: usize) -> bool {
        (self.byte(reg, idx / 8) >> (idx % 8)) & 1 != 0
    }

    /// Set mask bit for element idx in register `reg`
    pub fn set_mask_bit(&mut self, reg: usize, idx: usize, val: bool) {
        let byte = self.byte(reg, idx / 8);
        let bit = 1u8 << (idx % 8);
        self.set_byte(reg, idx / 8, if val { byte | bit } else { byte & !bit });
    }
}
