use crate::access_flags::FieldAccessFlags;
use crate::code::ConstantValue;
use crate::descriptors::FieldType;

/// A field of a [`crate::pool::Class`]
#[derive(Clone, PartialEq, Debug)]
pub struct Field {
    pub access: FieldAccessFlags,
    pub name: String,
    pub descriptor: FieldType,

    /// `ConstantValue` initializer, present on some `static final` fields
    pub constant_value: Option<ConstantValue>,
}

impl Field {
    pub fn new(access: FieldAccessFlags, name: impl Into<String>, descriptor: FieldType) -> Field {
        Field {
            access,
            name: name.into(),
            descriptor,
            constant_value: None,
        }
    }

    pub fn is_static(&self) -> bool {
        self.access.contains(FieldAccessFlags::STATIC)
    }
}
