use crate::descriptors::{BaseType, Descriptor, FieldType};

/// Symbolic type of one stack or local-variable slot
///
/// These are the verification types of JVMS §4.10.1.2 with owned
/// descriptors. `boolean`/`byte`/`char`/`short` all collapse to [`Value::Integer`]
/// per the usual VM conventions. `long` and `double` are wide: the slot after
/// them holds an explicit [`Value::Top`] marker.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Value {
    /// Placeholder: the second half of a wide value, or an untouched local
    Top,
    Integer,
    Float,
    Long,
    Double,
    Null,
    /// `this` before `<init>` has run; carries the owner's internal name
    UninitializedThis(String),
    /// Initialized reference; carries an internal name or array descriptor
    Object(String),
    /// Result of `new` before `<init>` has run; carries the internal name
    Uninitialized(String),
}

impl Value {
    /// Does this value occupy two slots?
    pub fn is_wide(&self) -> bool {
        matches!(self, Value::Long | Value::Double)
    }

    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            Value::Null
                | Value::UninitializedThis(_)
                | Value::Object(_)
                | Value::Uninitialized(_)
        )
    }

    /// Collapse a declared type into its slot value
    pub fn of(field_type: &FieldType) -> Value {
        match field_type {
            FieldType::Base(BaseType::Int)
            | FieldType::Base(BaseType::Char)
            | FieldType::Base(BaseType::Short)
            | FieldType::Base(BaseType::Byte)
            | FieldType::Base(BaseType::Boolean) => Value::Integer,
            FieldType::Base(BaseType::Float) => Value::Float,
            FieldType::Base(BaseType::Long) => Value::Long,
            FieldType::Base(BaseType::Double) => Value::Double,
            FieldType::Object(name) => Value::Object(name.clone()),
            FieldType::Array(_) => Value::Object(field_type.render()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn collapsing() {
        assert_eq!(Value::of(&FieldType::BOOLEAN), Value::Integer);
        assert_eq!(Value::of(&FieldType::BYTE), Value::Integer);
        assert_eq!(Value::of(&FieldType::CHAR), Value::Integer);
        assert_eq!(Value::of(&FieldType::SHORT), Value::Integer);
        assert_eq!(Value::of(&FieldType::INT), Value::Integer);
        assert_eq!(Value::of(&FieldType::LONG), Value::Long);
        assert_eq!(
            Value::of(&FieldType::object("java/lang/String")),
            Value::Object("java/lang/String".to_string())
        );
        assert_eq!(
            Value::of(&FieldType::array(FieldType::INT)),
            Value::Object("[I".to_string())
        );
    }

    #[test]
    fn widths() {
        assert!(Value::Long.is_wide());
        assert!(Value::Double.is_wide());
        assert!(!Value::Integer.is_wide());
        assert!(!Value::Object("java/lang/Object".to_string()).is_wide());
    }
}
