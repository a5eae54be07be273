pub mod display;
pub mod error;
pub mod instruction;
pub mod interpreter;
pub mod state;

pub use error::{Chip8Error, Result};
pub use interpreter::{Interpreter, Status};
pub use state::{Config, Key};
