//! Reading and writing the on-disk class file format
//!
//! The format itself is the one defined by the JVM specification; this
//! module moves between it and the instruction model in
//! [`crate::code`]/[`crate::pool`].

mod constants;
mod reader;
mod serialize;
mod writer;

pub use constants::*;
pub use reader::*;
pub use serialize::*;
pub use writer::*;
