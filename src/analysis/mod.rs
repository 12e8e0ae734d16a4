//! The method analyzer: abstract symbolic execution of method bodies
//!
//! No concrete values are computed. Instead every reachable instruction gets,
//! per control-flow reach, a [`Frame`] describing the operand stack and local
//! variable table as typed symbolic slots, wired into a producer/consumer
//! data-flow graph.

mod analyzer;
mod frame;
mod state;
mod value;

pub use analyzer::*;
pub use frame::*;
pub use state::*;
pub use value::*;
