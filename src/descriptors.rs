use std::io::{Error, ErrorKind, Result};
use std::str::Chars;

/// Slot widths of values (wide primitives take two slots)
pub trait Width {
    fn width(&self) -> usize;
}

fn bad_input(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::InvalidInput, message.into())
}

fn cut_short(message: &str) -> Error {
    Error::new(ErrorKind::UnexpectedEof, message)
}

/// Conversion between descriptor strings and their typed form
///
/// Descriptors nest: `[[J` wraps a primitive, `(ILfoo/Bar;)V` embeds field
/// types. The parsing side therefore works over a shared [`Chars`] cursor
/// that each component advances past its own portion; the string-level
/// [`Descriptor::parse`] entry point wraps that cursor and insists the input
/// is consumed completely.
pub trait Descriptor: Sized {
    /// Append this descriptor's textual form to `out`
    fn render_to(&self, out: &mut String);

    /// Read one descriptor from the cursor, leaving the rest in place
    fn parse_from(source: &mut Chars) -> Result<Self>;

    /// The descriptor as a fresh string
    fn render(&self) -> String {
        let mut out = String::new();
        self.render_to(&mut out);
        out
    }

    /// Parse a whole string as exactly one descriptor
    fn parse(source: &str) -> Result<Self> {
        let mut chars = source.chars();
        let parsed = Self::parse_from(&mut chars)?;
        let rest = chars.as_str();
        if rest.is_empty() {
            Ok(parsed)
        } else {
            Err(bad_input(format!(
                "trailing characters '{}' after descriptor",
                rest
            )))
        }
    }
}

/// The eight primitive types
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BaseType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
}

impl BaseType {
    /// The one-character descriptor of this primitive
    pub fn descriptor_char(self) -> char {
        match self {
            BaseType::Byte => 'B',
            BaseType::Char => 'C',
            BaseType::Double => 'D',
            BaseType::Float => 'F',
            BaseType::Int => 'I',
            BaseType::Long => 'J',
            BaseType::Short => 'S',
            BaseType::Boolean => 'Z',
        }
    }

    /// Inverse of [`BaseType::descriptor_char`]
    pub fn from_descriptor_char(c: char) -> Option<BaseType> {
        Some(match c {
            'B' => BaseType::Byte,
            'C' => BaseType::Char,
            'D' => BaseType::Double,
            'F' => BaseType::Float,
            'I' => BaseType::Int,
            'J' => BaseType::Long,
            'S' => BaseType::Short,
            'Z' => BaseType::Boolean,
            _ => return None,
        })
    }
}

impl Width for BaseType {
    fn width(&self) -> usize {
        match self {
            BaseType::Long | BaseType::Double => 2,
            _ => 1,
        }
    }
}

impl Descriptor for BaseType {
    fn render_to(&self, out: &mut String) {
        out.push(self.descriptor_char());
    }

    fn parse_from(source: &mut Chars) -> Result<Self> {
        match source.next() {
            Some(c) => BaseType::from_descriptor_char(c)
                .ok_or_else(|| bad_input(format!("'{}' is not a primitive type", c))),
            None => Err(cut_short(
                "descriptor ended where a primitive type was expected",
            )),
        }
    }
}

/// Type of a field, argument, or local variable
///
/// Class names are stored in internal (slash-separated) form.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum FieldType {
    Base(BaseType),
    Object(String),
    Array(Box<FieldType>),
}

impl FieldType {
    /// Wrap `element` in one array dimension
    pub fn array(element: FieldType) -> FieldType {
        FieldType::Array(Box::new(element))
    }

    /// Reference type for a class, by internal name
    pub fn object(class_name: impl Into<String>) -> FieldType {
        FieldType::Object(class_name.into())
    }

    pub const INT: FieldType = FieldType::Base(BaseType::Int);
    pub const LONG: FieldType = FieldType::Base(BaseType::Long);
    pub const FLOAT: FieldType = FieldType::Base(BaseType::Float);
    pub const DOUBLE: FieldType = FieldType::Base(BaseType::Double);
    pub const CHAR: FieldType = FieldType::Base(BaseType::Char);
    pub const SHORT: FieldType = FieldType::Base(BaseType::Short);
    pub const BYTE: FieldType = FieldType::Base(BaseType::Byte);
    pub const BOOLEAN: FieldType = FieldType::Base(BaseType::Boolean);
}

impl Width for FieldType {
    fn width(&self) -> usize {
        match self {
            FieldType::Base(base_type) => base_type.width(),
            FieldType::Object(_) | FieldType::Array(_) => 1,
        }
    }
}

impl Descriptor for FieldType {
    fn render_to(&self, out: &mut String) {
        match self {
            FieldType::Base(base_type) => base_type.render_to(out),
            FieldType::Object(class_name) => {
                out.push('L');
                out.push_str(class_name);
                out.push(';');
            }
            FieldType::Array(element) => {
                out.push('[');
                element.render_to(out);
            }
        }
    }

    fn parse_from(source: &mut Chars) -> Result<Self> {
        match source.clone().next() {
            Some('L') => {
                let _ = source.next();
                let mut class_name = String::new();
                loop {
                    match source.next() {
                        Some(';') => return Ok(FieldType::Object(class_name)),
                        Some(c) => class_name.push(c),
                        None => {
                            return Err(bad_input(format!(
                                "class name 'L{}' never terminated by ';'",
                                class_name
                            )))
                        }
                    }
                }
            }
            Some('[') => {
                let _ = source.next();
                Ok(FieldType::array(FieldType::parse_from(source)?))
            }
            Some(c) if BaseType::from_descriptor_char(c).is_some() => {
                BaseType::parse_from(source).map(FieldType::Base)
            }
            Some(c) => Err(bad_input(format!("'{}' cannot start a field type", c))),
            None => Err(cut_short("descriptor ended where a field type was expected")),
        }
    }
}

/// Parameter and return types of a method
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct MethodDescriptor {
    pub parameters: Vec<FieldType>,

    /// `None` renders as `V`: the method returns `void`
    pub return_type: Option<FieldType>,
}

impl MethodDescriptor {
    /// How many local-variable slots the parameters occupy on entry
    ///
    /// Wide primitives count twice, an instance receiver counts one more;
    /// the format caps this at 255.
    pub fn parameter_length(&self, has_this_param: bool) -> usize {
        let mut len = if has_this_param { 1 } else { 0 };
        for parameter in &self.parameters {
            len += parameter.width();
        }
        len
    }
}

impl Descriptor for MethodDescriptor {
    fn render_to(&self, out: &mut String) {
        out.push('(');
        for parameter in &self.parameters {
            parameter.render_to(out);
        }
        out.push(')');
        match &self.return_type {
            Some(typ) => typ.render_to(out),
            None => out.push('V'),
        }
    }

    fn parse_from(source: &mut Chars) -> Result<Self> {
        if source.next() != Some('(') {
            return Err(bad_input("method descriptor must open with '('"));
        }

        let mut parameters = vec![];
        loop {
            match source.clone().next() {
                Some(')') => {
                    let _ = source.next();
                    break;
                }
                Some(_) => parameters.push(FieldType::parse_from(source)?),
                None => return Err(cut_short("method descriptor missing ')'")),
            }
        }

        let return_type = if source.clone().next() == Some('V') {
            let _ = source.next();
            None
        } else {
            Some(FieldType::parse_from(source)?)
        };

        Ok(MethodDescriptor {
            parameters,
            return_type,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fmt::Debug;

    fn check<T: Descriptor + Debug + Eq>(text: &str, value: T) {
        assert_eq!(value.render(), text);
        assert_eq!(T::parse(text).unwrap(), value);
    }

    #[test]
    fn base_types() {
        check("B", BaseType::Byte);
        check("C", BaseType::Char);
        check("D", BaseType::Double);
        check("F", BaseType::Float);
        check("I", BaseType::Int);
        check("J", BaseType::Long);
        check("S", BaseType::Short);
        check("Z", BaseType::Boolean);
    }

    #[test]
    fn descriptor_chars_invert() {
        for c in "BCDFIJSZ".chars() {
            let base_type = BaseType::from_descriptor_char(c).unwrap();
            assert_eq!(base_type.descriptor_char(), c);
        }
        assert_eq!(BaseType::from_descriptor_char('V'), None);
        assert_eq!(BaseType::from_descriptor_char('L'), None);
    }

    #[test]
    fn field_types() {
        check("I", FieldType::INT);
        check("Ljava/lang/Object;", FieldType::object("java/lang/Object"));
        check(
            "[[[D",
            FieldType::array(FieldType::array(FieldType::array(FieldType::DOUBLE))),
        );
        check(
            "[Ljava/lang/String;",
            FieldType::array(FieldType::object("java/lang/String")),
        );
    }

    #[test]
    fn method_descriptors() {
        check(
            "(IDLjava/lang/CharSequence;)Ljava/lang/Object;",
            MethodDescriptor {
                parameters: vec![
                    FieldType::INT,
                    FieldType::DOUBLE,
                    FieldType::object("java/lang/CharSequence"),
                ],
                return_type: Some(FieldType::object("java/lang/Object")),
            },
        );
        check(
            "()V",
            MethodDescriptor {
                parameters: vec![],
                return_type: None,
            },
        );
    }

    #[test]
    fn parameter_lengths() {
        let descriptor = MethodDescriptor::parse("(IJLjava/lang/String;D)V").unwrap();
        assert_eq!(descriptor.parameter_length(false), 6);
        assert_eq!(descriptor.parameter_length(true), 7);
    }

    #[test]
    fn rejects_leftover_input() {
        assert!(FieldType::parse("II").is_err());
        assert!(MethodDescriptor::parse("()VV").is_err());
    }

    #[test]
    fn rejects_truncated_input() {
        assert!(FieldType::parse("Ljava/lang/Object").is_err());
        assert!(MethodDescriptor::parse("(I").is_err());
        assert!(MethodDescriptor::parse("(").is_err());
    }
}
