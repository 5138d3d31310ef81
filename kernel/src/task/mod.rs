//! Task stacks and the image a new task starts from.

pub mod context;
pub mod stack;

pub use context::{initialise_stack, InitialFrame};
pub use stack::{minimal_stack_size, TaskStack};
