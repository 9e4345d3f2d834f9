/// Number of architectural vector registers
pub const NUM_VREGS: usize = 32;
/// Maximum element width in bits
pub const ELEN: usize = 64;
/// Default VLEN in bits
pub const DEFAULT_VLEN: usize = 128;

const MAX_VLEN: usize = 65536;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("VLEN must be a power of two, got {0}")]
    NotPowerOfTwo(usize),
    #[error("VLEN {vlen} outside supported range 64..=65536")]
    OutOfRange { vlen: usize },
}

/// Static shape of the vector unit, fixed for the lifetime of a hart context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorConfig {
    vlen: usize,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            vlen: DEFAULT_VLEN,
        }
    }
}

impl VectorConfig {
    pub fn new(vlen: usize) -> Result<Self, ConfigError> {
        if !vlen.is_power_of_two() {
            return Err(ConfigError::NotPowerOfTwo(vlen));
        }
        if !(ELEN..=MAX_VLEN).contains(&vlen) {
            return Err(ConfigError::OutOfRange { vlen });
        }
        Ok(Self { vlen })
    }

    /// VLEN in bits
    pub fn vlen(&self) -> usize {
        self.vlen
    }

    /// VLEN in bytes
    pub fn vlenb(&self) -> usize {
        self.vlen / 8
    }
}
