//! The instruction model: a navigable, position-stable representation of
//! method bodies that survives round-trip serialization

mod code;
mod instruction;
mod visitor;

pub use code::*;
pub use instruction::*;
pub use visitor::*;
