use crate::class_file::Serialize;
use bitflags::bitflags;
use byteorder::WriteBytesExt;
use std::io::Result;

// Bit values come from the access_flags tables of JVMS §4.1 (classes),
// §4.5 (fields), and §4.6 (methods). Each set only carries the bits that
// mean something for its member kind, so the same value can name different
// flags in different sets (0x0040 is VOLATILE on a field, BRIDGE on a
// method).
bitflags! {
    /// `access_flags` of a class or interface
    pub struct ClassAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const FINAL = 0x0010;
        /// Historical `invokespecial` dispatch marker; always set by modern
        /// compilers
        const SUPER = 0x0020;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
        const MODULE = 0x8000;
    }

    /// `access_flags` of a field
    pub struct FieldAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const VOLATILE = 0x0040;
        const TRANSIENT = 0x0080;
        const SYNTHETIC = 0x1000;
        const ENUM = 0x4000;
    }

    /// `access_flags` of a method
    pub struct MethodAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const SYNCHRONIZED = 0x0020;
        const BRIDGE = 0x0040;
        const VARARGS = 0x0080;
        const NATIVE = 0x0100;
        const ABSTRACT = 0x0400;
        const STRICT = 0x0800;
        const SYNTHETIC = 0x1000;
    }
}

// All three sets hit the wire as their raw 16-bit value
macro_rules! serialize_as_bits {
    ($($flags:ty),* $(,)?) => {
        $(
            impl Serialize for $flags {
                fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
                    self.bits().serialize(writer)
                }
            }
        )*
    };
}

serialize_as_bits!(ClassAccessFlags, FieldAccessFlags, MethodAccessFlags);
