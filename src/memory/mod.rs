pub mod ram;

use crate::vector::Sew;

pub use ram::Ram;

/// Direction of a memory access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Load,
    Store,
}

/// Synchronous fault reported by a [`Memory`] implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MemoryFault {
    #[error("{access:?} access fault at {addr:#x}")]
    AccessFault { addr: u64, access: Access },
    #[error("{access:?} page fault at {addr:#x}")]
    PageFault { addr: u64, access: Access },
    #[error("misaligned {access:?} at {addr:#x}")]
    Misaligned { addr: u64, access: Access },
}

impl MemoryFault {
    pub fn addr(&self) -> u64 {
        match *self {
            Self::AccessFault { addr, .. }
            | Self::PageFault { addr, .. }
            | Self::Misaligned { addr, .. } => addr,
        }
    }

    pub fn access(&self) -> Access {
        match *self {
            Self::AccessFault { access, .. }
            | Self::PageFault { access, .. }
            | Self::Misaligned { access, .. } => access,
        }
    }

    /// RISC-V exception cause code for this fault
    pub fn cause(&self) -> u64 {
        match (self, self.access()) {
            (Self::Misaligned { .. }, Access::Load) => 4,
            (Self::AccessFault { .. }, Access::Load) => 5,
            (Self::Misaligned { .. }, Access::Store) => 6,
            (Self::AccessFault { .. }, Access::Store) => 7,
            (Self::PageFault { .. }, Access::Load) => 13,
            (Self::PageFault { .. }, Access::Store) => 15,
        }
    }
}

/// Virtual memory as seen by the vector unit.
///
/// Every access either completes or reports a [`MemoryFault`]; nothing is
/// raised behind the caller's back. The engine decides per instruction
/// whether a fault becomes a trap (ordinary loads and stores) or is absorbed
/// (fault-only-first loads past element 0).
pub trait Memory {
    /// Load `width` bits from `addr`, zero-extended to 64 bits
    fn load(&mut self, addr: u64, width: Sew) -> Result<u64, MemoryFault>;

    /// Store the low `width` bits of `val` at `addr`
    fn store(&mut self, addr: u64, width: Sew, val: u64) -> Result<(), MemoryFault>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cause_codes() {
        let ld = Access::Load;
        let st = Access::Store;
        assert_eq!(MemoryFault::Misaligned { addr: 0, access: ld }.cause(), 4);
        assert_eq!(MemoryFault::AccessFault { addr: 0, access: ld }.cause(), 5);
        assert_eq!(MemoryFault::AccessFault { addr: 0, access: st }.cause(), 7);
        assert_eq!(MemoryFault::PageFault { addr: 0, access: ld }.cause(), 13);
        assert_eq!(MemoryFault::PageFault { addr: 0, access: st }.cause(), 15);
    }

    #[test]
    fn fault_accessors() {
        let f = MemoryFault::PageFault {
            addr: 0x1234,
            access: Access::Store,
        };
        assert_eq!(f.addr(), 0x1234);
        assert_eq!(f.access(), Access::Store);
    }
}
