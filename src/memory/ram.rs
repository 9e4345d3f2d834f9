use std::ops::Range;

use super::{Access, Memory, MemoryFault};
use crate::vector::Sew;

/// Simple RAM backed by a Vec<u8>, mapped at `base`.
///
/// Address windows registered with [`Ram::inject_fault`] report a page fault
/// on any access that touches them, which is how tests and scripts simulate
/// partially mapped memory.
pub struct Ram {
    base: u64,
    data: Vec<u8>,
    faults: Vec<Range<u64>>,
}

impl Ram {
    pub fn new(base: u64, size: usize) -> Self {
        Self {
            base,
            data: vec![0; size],
            faults: Vec::new(),
        }
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Make every access touching `range` fault
    pub fn inject_fault(&mut self, range: Range<u64>) {
        log::debug!("RAM: fault window {:#x}..{:#x}", range.start, range.end);
        self.faults.push(range);
    }

    pub fn clear_faults(&mut self) {
        self.faults.clear();
    }

    /// Copy `data` into RAM at `addr`, bypassing fault windows
    pub fn load_bytes(&mut self, addr: u64, data: &[u8]) -> Result<(), MemoryFault> {
        let off = self.offset(addr, data.len(), Access::Store)?;
        self.data[off..off + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Borrow `len` bytes at `addr`, bypassing fault windows
    pub fn bytes(&self, addr: u64, len: usize) -> Result<&[u8], MemoryFault> {
        let off = self.offset(addr, len, Access::Load)?;
        Ok(&self.data[off..off + len])
    }

    fn offset(&self, addr: u64, len: usize, access: Access) -> Result<usize, MemoryFault> {
        let fault = MemoryFault::AccessFault { addr, access };
        let off = addr.checked_sub(self.base).ok_or(fault)?;
        let off = usize::try_from(off).map_err(|_| fault)?;
        match off.checked_add(len) {
            Some(end) if end <= self.data.len() => Ok(off),
            _ => Err(fault),
        }
    }

    fn check(&self, addr: u64, len: usize, access: Access) -> Result<usize, MemoryFault> {
        let end = addr.wrapping_add(len as u64);
        if self
            .faults
            .iter()
            .any(|w| addr < w.end && w.start < end)
        {
            return Err(MemoryFault::PageFault { addr, access });
        }
        self.offset(addr, len, access)
    }
}

impl Memory for Ram {
    fn load(&mut self, addr: u64, width: Sew) -> Result<u64, MemoryFault> {
        let n = width.bytes();
        let off = self.check(addr, n, Access::Load)?;
        let mut buf = [0u8; 8];
        buf[..n].copy_from_slice(&self.data[off..off + n]);
        Ok(u64::from_le_bytes(buf))
    }

    fn store(&mut self, addr: u64, width: Sew, val: u64) -> Result<(), MemoryFault> {
        let n = width.bytes();
        let off = self.check(addr, n, Access::Store)?;
        self.data[off..off + n].copy_from_slice(&val.to_le_bytes()[..n]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn little_endian_widths() {
        let mut ram = Ram::new(0x1000, 64);
        ram.store(0x1000, Sew::E64, 0x0102_0304_0506_0708).unwrap();
        assert_eq!(ram.load(0x1000, Sew::E8).unwrap(), 0x08);
        assert_eq!(ram.load(0x1000, Sew::E16).unwrap(), 0x0708);
        assert_eq!(ram.load(0x1004, Sew::E32).unwrap(), 0x0102_0304);
        ram.store(0x1001, Sew::E8, 0xFFFF).unwrap();
        assert_eq!(ram.load(0x1000, Sew::E16).unwrap(), 0xFF08);
    }

    #[test]
    fn out_of_bounds_is_access_fault() {
        let mut ram = Ram::new(0x1000, 16);
        assert_eq!(
            ram.load(0x0FFF, Sew::E8),
            Err(MemoryFault::AccessFault {
                addr: 0x0FFF,
                access: Access::Load
            })
        );
        assert!(ram.load(0x100C, Sew::E32).is_ok());
        assert!(ram.load(0x100D, Sew::E32).is_err());
    }

    #[test]
    fn injected_window_page_faults() {
        let mut ram = Ram::new(0, 64);
        ram.inject_fault(16..32);
        assert!(ram.load(12, Sew::E32).is_ok());
        assert_eq!(
            ram.store(14, Sew::E32, 0),
            Err(MemoryFault::PageFault {
                addr: 14,
                access: Access::Store
            })
        );
        // Raw access ignores fault windows
        assert!(ram.bytes(16, 4).is_ok());
        ram.clear_faults();
        assert!(ram.load(16, Sew::E64).is_ok());
    }
}
