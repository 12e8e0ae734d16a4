use crate::access_flags::ClassAccessFlags;
use crate::descriptors::{FieldType, MethodDescriptor};
use crate::pool::{ClassId, ClassRef, Field, Method};

/// A class held by a [`crate::pool::ClassPool`]
#[derive(Clone, Debug)]
pub struct Class {
    /// Internal (slash-separated) name
    pub name: String,

    /// `SourceFile` attribute, when present
    pub source: Option<String>,
    pub access: ClassAccessFlags,
    pub major: u16,
    pub minor: u16,

    /// Superclass; `None` only for `java/lang/Object` itself
    pub superclass: Option<ClassRef>,
    pub interfaces: Vec<ClassRef>,

    /// Classes in the same pool whose superclass is this one; populated by
    /// [`crate::pool::ClassPool::init`]
    pub children: Vec<ClassId>,

    /// Classes in the same pool that list this interface; populated by
    /// [`crate::pool::ClassPool::init`]
    pub implementers: Vec<ClassId>,

    pub methods: Vec<Method>,
    pub fields: Vec<Field>,
}

impl Class {
    pub fn new(name: impl Into<String>, access: ClassAccessFlags, major: u16) -> Class {
        Class {
            name: name.into(),
            source: None,
            access,
            major,
            minor: 0,
            superclass: Some(ClassRef::new("java/lang/Object")),
            interfaces: vec![],
            children: vec![],
            implementers: vec![],
            methods: vec![],
            fields: vec![],
        }
    }

    pub fn is_interface(&self) -> bool {
        self.access.contains(ClassAccessFlags::INTERFACE)
    }

    /// Find a method by name and descriptor
    pub fn method(&self, name: &str, descriptor: &MethodDescriptor) -> Option<&Method> {
        self.methods
            .iter()
            .find(|method| method.name == name && method.descriptor == *descriptor)
    }

    /// Find a field by name and descriptor
    pub fn field(&self, name: &str, descriptor: &FieldType) -> Option<&Field> {
        self.fields
            .iter()
            .find(|field| field.name == name && field.descriptor == *descriptor)
    }

    /// Add a method, wiring its back-reference to this class
    pub fn add_method(&mut self, mut method: Method) {
        method.owner = self.name.clone();
        self.methods.push(method);
    }
}
