use crate::descriptors::{Descriptor, FieldType, MethodDescriptor};
use crate::pool::{ClassId, ClassPool};
use std::cell::Cell;
use std::fmt;

/// Named handle to a class, resolved lazily against a [`ClassPool`]
///
/// References into runtime/library classes are expected to stay unresolved
/// forever; nothing downstream may depend on resolution succeeding.
#[derive(Clone)]
pub struct ClassRef {
    /// Internal class name, or an array descriptor for array classes
    pub name: String,
    resolved: Cell<Option<ClassId>>,
}

impl ClassRef {
    pub fn new(name: impl Into<String>) -> ClassRef {
        ClassRef {
            name: name.into(),
            resolved: Cell::new(None),
        }
    }

    /// Locate the target class in the pool, caching the link
    pub fn resolve(&self, pool: &ClassPool) -> Option<ClassId> {
        if let Some(id) = self.resolved.get() {
            return Some(id);
        }
        let found = pool.get_id(&self.name);
        if let Some(id) = found {
            self.resolved.set(Some(id));
        }
        found
    }
}

impl PartialEq for ClassRef {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for ClassRef {}

impl fmt::Debug for ClassRef {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.name)
    }
}

/// Named handle to a field
#[derive(Clone)]
pub struct FieldRef {
    pub owner: String,
    pub name: String,
    pub descriptor: FieldType,
    resolved: Cell<Option<(ClassId, usize)>>,
}

impl FieldRef {
    pub fn new(
        owner: impl Into<String>,
        name: impl Into<String>,
        descriptor: FieldType,
    ) -> FieldRef {
        FieldRef {
            owner: owner.into(),
            name: name.into(),
            descriptor,
            resolved: Cell::new(None),
        }
    }

    /// Locate the target field, caching `(owning class, field position)`
    pub fn resolve(&self, pool: &ClassPool) -> Option<(ClassId, usize)> {
        if let Some(link) = self.resolved.get() {
            return Some(link);
        }
        let class_id = pool.get_id(&self.owner)?;
        let class = pool.class(class_id)?;
        let position = class
            .fields
            .iter()
            .position(|field| field.name == self.name && field.descriptor == self.descriptor)?;
        self.resolved.set(Some((class_id, position)));
        Some((class_id, position))
    }
}

impl PartialEq for FieldRef {
    fn eq(&self, other: &Self) -> bool {
        self.owner == other.owner && self.name == other.name && self.descriptor == other.descriptor
    }
}

impl Eq for FieldRef {}

impl fmt::Debug for FieldRef {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "{}.{}:{}",
            self.owner,
            self.name,
            self.descriptor.render()
        )
    }
}

/// Named handle to a method
#[derive(Clone)]
pub struct MethodRef {
    pub owner: String,
    pub name: String,
    pub descriptor: MethodDescriptor,
    resolved: Cell<Option<(ClassId, usize)>>,
}

impl MethodRef {
    pub fn new(
        owner: impl Into<String>,
        name: impl Into<String>,
        descriptor: MethodDescriptor,
    ) -> MethodRef {
        MethodRef {
            owner: owner.into(),
            name: name.into(),
            descriptor,
            resolved: Cell::new(None),
        }
    }

    /// Locate the target method, caching `(owning class, method position)`
    pub fn resolve(&self, pool: &ClassPool) -> Option<(ClassId, usize)> {
        if let Some(link) = self.resolved.get() {
            return Some(link);
        }
        let class_id = pool.get_id(&self.owner)?;
        let class = pool.class(class_id)?;
        let position = class
            .methods
            .iter()
            .position(|method| method.name == self.name && method.descriptor == self.descriptor)?;
        self.resolved.set(Some((class_id, position)));
        Some((class_id, position))
    }
}

impl PartialEq for MethodRef {
    fn eq(&self, other: &Self) -> bool {
        self.owner == other.owner && self.name == other.name && self.descriptor == other.descriptor
    }
}

impl Eq for MethodRef {}

impl fmt::Debug for MethodRef {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "{}.{}:{}",
            self.owner,
            self.name,
            self.descriptor.render()
        )
    }
}
