use std::path::PathBuf;

use crate::state::Address;

pub type Result<T> = std::result::Result<T, Chip8Error>;

/// Failures surfaced by the interpreter core.
///
/// Unknown opcodes are deliberately absent: they execute as no-ops.
#[derive(Debug, thiserror::Error)]
pub enum Chip8Error {
    #[error("Stack overflow: subroutine calls nested deeper than {} levels", crate::state::STACK_SIZE)]
    StackOverflow,

    #[error("Stack underflow: attempted to return from a subroutine with empty call stack")]
    StackUnderflow,

    #[error("Memory access out of bounds at address {address:#06X}")]
    MemoryOutOfBounds { address: usize },

    #[error("Program counter out of bounds: {pc:#06X}")]
    ProgramCounterOutOfBounds { pc: Address },

    #[error("ROM is too large ({size} bytes), max size is {max_size} bytes")]
    RomTooLarge { size: usize, max_size: usize },

    #[error("Failed to read ROM {}", path.display())]
    RomRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
