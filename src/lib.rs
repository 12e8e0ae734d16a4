//! Symbolic data-flow analysis and manipulation of JVM class files
//!
//! Two tightly coupled subsystems make up the crate:
//!
//!   - the **instruction model** ([`code`], [`pool`], [`class_file`]): a
//!     navigable in-memory representation of classes and their method
//!     bodies that survives round-trip serialization
//!   - the **method analyzer** ([`analysis`]): an abstract interpreter that
//!     walks every reachable instruction along all control-flow edges,
//!     maintains a symbolic operand stack and local variable table, and
//!     emits per-instruction typed frames wired into a producer/consumer
//!     data-flow graph
//!
//! No concrete values are ever computed; the analyzer is the foundation
//! deobfuscators, decompilers, remappers, and optimizers build on.
//!
//! ### Analyzing a method
//!
//! ```
//! use classflow::analysis::{FrameKind, MethodAnalyzer, Value};
//! use classflow::code::opcodes::*;
//! use classflow::code::Instruction;
//! use classflow::pool::Method;
//! use classflow::{Descriptor, MethodAccessFlags, MethodDescriptor};
//!
//! # fn main() -> Result<(), classflow::Error> {
//! // static int add(int a, int b) { return a + b; }
//! let mut method = Method::new(
//!     "demo/Adder",
//!     MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
//!     "add",
//!     MethodDescriptor::parse("(II)I")?,
//! );
//! method.code.push(Instruction::Var { op: ILOAD, index: 0 });
//! method.code.push(Instruction::Var { op: ILOAD, index: 1 });
//! method.code.push(Instruction::Simple { op: IADD });
//! method.code.push(Instruction::Simple { op: IRETURN });
//!
//! let result = MethodAnalyzer::analyze(&method)?;
//! assert_eq!(result.max_stack, 2);
//! assert_eq!(result.max_locals, 2);
//!
//! // the addition left one int on the stack and consumed both loads
//! let (_, add) = result
//!     .frames()
//!     .find(|(_, frame)| frame.kind == FrameKind::Math)
//!     .unwrap();
//! assert_eq!(add.stack, vec![Value::Integer]);
//! assert_eq!(add.writes.len(), 2);
//! # Ok(())
//! # }
//! ```
//!
//! ### Loading classes
//!
//! Class bytes enter through a [`pool::ClassPool`], which parses them into
//! the model and, once [`pool::ClassPool::init`] has run, carries the
//! subtype graph between its members. [`class_file::write_class`] re-emits
//! a class as bytes.

mod access_flags;
mod descriptors;
mod errors;

pub mod analysis;
pub mod class_file;
pub mod code;
pub mod pool;

pub use access_flags::*;
pub use descriptors::*;
pub use errors::*;
