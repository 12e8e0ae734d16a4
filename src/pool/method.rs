use crate::access_flags::MethodAccessFlags;
use crate::code::Code;
use crate::descriptors::{Descriptor, MethodDescriptor};
use crate::pool::ClassRef;

/// A method of a [`crate::pool::Class`]
///
/// Abstract and native methods have an empty [`Code`].
#[derive(Clone, PartialEq, Debug)]
pub struct Method {
    /// Internal name of the owning class
    pub owner: String,
    pub access: MethodAccessFlags,
    pub name: String,
    pub descriptor: MethodDescriptor,

    /// Classes named by the `Exceptions` (throws clause) attribute
    pub exceptions: Vec<ClassRef>,
    pub code: Code,
}

impl Method {
    pub fn new(
        owner: impl Into<String>,
        access: MethodAccessFlags,
        name: impl Into<String>,
        descriptor: MethodDescriptor,
    ) -> Method {
        Method {
            owner: owner.into(),
            access,
            name: name.into(),
            descriptor,
            exceptions: vec![],
            code: Code::new(),
        }
    }

    /// The descriptor string, e.g. `(IJ)Ljava/lang/String;`
    pub fn descriptor_string(&self) -> String {
        self.descriptor.render()
    }

    pub fn is_static(&self) -> bool {
        self.access.contains(MethodAccessFlags::STATIC)
    }

    pub fn is_abstract(&self) -> bool {
        self.access.contains(MethodAccessFlags::ABSTRACT)
    }

    pub fn is_native(&self) -> bool {
        self.access.contains(MethodAccessFlags::NATIVE)
    }
}
