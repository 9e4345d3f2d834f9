pub mod config;
pub mod memory;
pub mod script;
pub mod vector;

pub use config::VectorConfig;
pub use memory::{Memory, MemoryFault, Ram};
pub use vector::{Progress, Trap, VectorUnit};
