use crate::class_file::{ByteReader, Serialize};
use crate::code::{BootstrapMethod, ConstantValue, Handle};
use crate::descriptors::Width;
use crate::errors::Error;
use byteorder::WriteBytesExt;
use std::collections::HashMap;
use std::io::Write;

/// Index into a class file constant pool
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct ConstantIndex(pub u16);

impl Serialize for ConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

/// Constants as they appear in the constant pool, with nested references
/// already resolved to indices
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.4
#[derive(Debug, Clone)]
pub enum Constant {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(ConstantIndex),
    String(ConstantIndex),
    FieldRef {
        class: ConstantIndex,
        name_and_type: ConstantIndex,
    },
    /// Combines `Methodref` and `InterfaceMethodref`
    MethodRef {
        class: ConstantIndex,
        name_and_type: ConstantIndex,
        is_interface: bool,
    },
    NameAndType {
        name: ConstantIndex,
        descriptor: ConstantIndex,
    },
    MethodHandle {
        kind: u8,
        member: ConstantIndex,
    },
    MethodType(ConstantIndex),
    InvokeDynamic {
        bootstrap_method: u16,
        name_and_type: ConstantIndex,
    },
}

/// Long and double entries take two slots
impl Width for Constant {
    fn width(&self) -> usize {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }
}

impl Serialize for Constant {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            Constant::Utf8(string) => {
                1u8.serialize(writer)?;
                let bytes = string.as_bytes();
                (bytes.len() as u16).serialize(writer)?;
                writer.write_all(bytes)?;
            }
            Constant::Integer(integer) => {
                3u8.serialize(writer)?;
                integer.serialize(writer)?;
            }
            Constant::Float(float) => {
                4u8.serialize(writer)?;
                float.serialize(writer)?;
            }
            Constant::Long(long) => {
                5u8.serialize(writer)?;
                long.serialize(writer)?;
            }
            Constant::Double(double) => {
                6u8.serialize(writer)?;
                double.serialize(writer)?;
            }
            Constant::Class(name) => {
                7u8.serialize(writer)?;
                name.serialize(writer)?;
            }
            Constant::String(utf8) => {
                8u8.serialize(writer)?;
                utf8.serialize(writer)?;
            }
            Constant::FieldRef {
                class,
                name_and_type,
            } => {
                9u8.serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => {
                let tag: u8 = if *is_interface { 11 } else { 10 };
                tag.serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::NameAndType { name, descriptor } => {
                12u8.serialize(writer)?;
                name.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::MethodHandle { kind, member } => {
                15u8.serialize(writer)?;
                kind.serialize(writer)?;
                member.serialize(writer)?;
            }
            Constant::MethodType(descriptor) => {
                16u8.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::InvokeDynamic {
                bootstrap_method,
                name_and_type,
            } => {
                18u8.serialize(writer)?;
                bootstrap_method.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
        };
        Ok(())
    }
}

/// Class file constants pool builder
///
/// The pool is append only: constants are interned on first request and
/// every later request returns the cached index. Bootstrap methods (for
/// `invokedynamic`) get interned here too, since their arguments live in the
/// constant pool.
#[derive(Default)]
pub struct ConstantsPool {
    constants: Vec<Constant>,
    next: u16,

    utf8s: HashMap<String, ConstantIndex>,
    classes: HashMap<String, ConstantIndex>,
    strings: HashMap<ConstantIndex, ConstantIndex>,
    integers: HashMap<i32, ConstantIndex>,
    floats: HashMap<u32, ConstantIndex>,
    longs: HashMap<i64, ConstantIndex>,
    doubles: HashMap<u64, ConstantIndex>,
    name_and_types: HashMap<(ConstantIndex, ConstantIndex), ConstantIndex>,
    field_refs: HashMap<(ConstantIndex, ConstantIndex), ConstantIndex>,
    method_refs: HashMap<(ConstantIndex, ConstantIndex, bool), ConstantIndex>,
    method_handles: HashMap<(u8, ConstantIndex), ConstantIndex>,
    method_types: HashMap<ConstantIndex, ConstantIndex>,
    invoke_dynamics: HashMap<(u16, ConstantIndex), ConstantIndex>,

    bootstrap_methods: Vec<(ConstantIndex, Vec<ConstantIndex>)>,
    bootstrap_map: HashMap<(ConstantIndex, Vec<ConstantIndex>), u16>,
}

impl ConstantsPool {
    /// Make a fresh empty constants pool
    pub fn new() -> ConstantsPool {
        ConstantsPool {
            next: 1,
            ..ConstantsPool::default()
        }
    }

    /// Push a constant into the pool, provided there is space for it
    ///
    /// The largest valid index is 65535, indexing starts at 1, and long and
    /// double constants take two slots.
    fn push_constant(&mut self, constant: Constant) -> Result<ConstantIndex, Error> {
        let offset = self.next;
        let width = constant.width() as u16;
        if offset.checked_add(width).is_none() {
            return Err(Error::ConstantPoolOverflow { offset });
        }
        self.next = offset + width;
        self.constants.push(constant);
        Ok(ConstantIndex(offset))
    }

    /// Number of pool slots in use plus one (the value of the class file's
    /// `constant_pool_count` field)
    pub fn count(&self) -> u16 {
        self.next
    }

    pub fn get_utf8(&mut self, utf8: &str) -> Result<ConstantIndex, Error> {
        if let Some(index) = self.utf8s.get(utf8) {
            return Ok(*index);
        }
        let index = self.push_constant(Constant::Utf8(utf8.to_string()))?;
        self.utf8s.insert(utf8.to_string(), index);
        Ok(index)
    }

    pub fn get_class(&mut self, name: &str) -> Result<ConstantIndex, Error> {
        if let Some(index) = self.classes.get(name) {
            return Ok(*index);
        }
        let utf8 = self.get_utf8(name)?;
        let index = self.push_constant(Constant::Class(utf8))?;
        self.classes.insert(name.to_string(), index);
        Ok(index)
    }

    pub fn get_string(&mut self, value: &str) -> Result<ConstantIndex, Error> {
        let utf8 = self.get_utf8(value)?;
        if let Some(index) = self.strings.get(&utf8) {
            return Ok(*index);
        }
        let index = self.push_constant(Constant::String(utf8))?;
        self.strings.insert(utf8, index);
        Ok(index)
    }

    pub fn get_integer(&mut self, value: i32) -> Result<ConstantIndex, Error> {
        if let Some(index) = self.integers.get(&value) {
            return Ok(*index);
        }
        let index = self.push_constant(Constant::Integer(value))?;
        self.integers.insert(value, index);
        Ok(index)
    }

    pub fn get_float(&mut self, value: f32) -> Result<ConstantIndex, Error> {
        let bits = value.to_bits();
        if let Some(index) = self.floats.get(&bits) {
            return Ok(*index);
        }
        let index = self.push_constant(Constant::Float(value))?;
        self.floats.insert(bits, index);
        Ok(index)
    }

    pub fn get_long(&mut self, value: i64) -> Result<ConstantIndex, Error> {
        if let Some(index) = self.longs.get(&value) {
            return Ok(*index);
        }
        let index = self.push_constant(Constant::Long(value))?;
        self.longs.insert(value, index);
        Ok(index)
    }

    pub fn get_double(&mut self, value: f64) -> Result<ConstantIndex, Error> {
        let bits = value.to_bits();
        if let Some(index) = self.doubles.get(&bits) {
            return Ok(*index);
        }
        let index = self.push_constant(Constant::Double(value))?;
        self.doubles.insert(bits, index);
        Ok(index)
    }

    pub fn get_name_and_type(
        &mut self,
        name: &str,
        descriptor: &str,
    ) -> Result<ConstantIndex, Error> {
        let name = self.get_utf8(name)?;
        let descriptor = self.get_utf8(descriptor)?;
        if let Some(index) = self.name_and_types.get(&(name, descriptor)) {
            return Ok(*index);
        }
        let index = self.push_constant(Constant::NameAndType { name, descriptor })?;
        self.name_and_types.insert((name, descriptor), index);
        Ok(index)
    }

    pub fn get_field_ref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<ConstantIndex, Error> {
        let class = self.get_class(owner)?;
        let name_and_type = self.get_name_and_type(name, descriptor)?;
        if let Some(index) = self.field_refs.get(&(class, name_and_type)) {
            return Ok(*index);
        }
        let index = self.push_constant(Constant::FieldRef {
            class,
            name_and_type,
        })?;
        self.field_refs.insert((class, name_and_type), index);
        Ok(index)
    }

    pub fn get_method_ref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
        is_interface: bool,
    ) -> Result<ConstantIndex, Error> {
        let class = self.get_class(owner)?;
        let name_and_type = self.get_name_and_type(name, descriptor)?;
        if let Some(index) = self.method_refs.get(&(class, name_and_type, is_interface)) {
            return Ok(*index);
        }
        let index = self.push_constant(Constant::MethodRef {
            class,
            name_and_type,
            is_interface,
        })?;
        self.method_refs
            .insert((class, name_and_type, is_interface), index);
        Ok(index)
    }

    pub fn get_method_handle(&mut self, handle: &Handle) -> Result<ConstantIndex, Error> {
        // kinds 1-4 reference fields, the rest reference methods
        let member = if handle.kind <= 4 {
            self.get_field_ref(&handle.owner, &handle.name, &handle.descriptor)?
        } else {
            self.get_method_ref(
                &handle.owner,
                &handle.name,
                &handle.descriptor,
                handle.interface,
            )?
        };
        if let Some(index) = self.method_handles.get(&(handle.kind, member)) {
            return Ok(*index);
        }
        let index = self.push_constant(Constant::MethodHandle {
            kind: handle.kind,
            member,
        })?;
        self.method_handles.insert((handle.kind, member), index);
        Ok(index)
    }

    pub fn get_method_type(&mut self, descriptor: &str) -> Result<ConstantIndex, Error> {
        let utf8 = self.get_utf8(descriptor)?;
        if let Some(index) = self.method_types.get(&utf8) {
            return Ok(*index);
        }
        let index = self.push_constant(Constant::MethodType(utf8))?;
        self.method_types.insert(utf8, index);
        Ok(index)
    }

    /// Intern any loadable constant
    pub fn get_constant_value(&mut self, value: &ConstantValue) -> Result<ConstantIndex, Error> {
        match value {
            ConstantValue::Integer(integer) => self.get_integer(*integer),
            ConstantValue::Long(long) => self.get_long(*long),
            ConstantValue::Float(float) => self.get_float(*float),
            ConstantValue::Double(double) => self.get_double(*double),
            ConstantValue::String(string) => self.get_string(string),
            ConstantValue::Class(name) => self.get_class(name),
            ConstantValue::MethodHandle(handle) => self.get_method_handle(handle),
            ConstantValue::MethodType(descriptor) => self.get_method_type(descriptor),
        }
    }

    /// Intern a bootstrap method, returning its index into the
    /// `BootstrapMethods` attribute
    pub fn get_bootstrap_method(&mut self, bootstrap: &BootstrapMethod) -> Result<u16, Error> {
        let handle = self.get_method_handle(&bootstrap.handle)?;
        let arguments = bootstrap
            .arguments
            .iter()
            .map(|argument| self.get_constant_value(argument))
            .collect::<Result<Vec<_>, _>>()?;
        let key = (handle, arguments);
        if let Some(index) = self.bootstrap_map.get(&key) {
            return Ok(*index);
        }
        let index = self.bootstrap_methods.len() as u16;
        self.bootstrap_methods.push(key.clone());
        self.bootstrap_map.insert(key, index);
        Ok(index)
    }

    pub fn get_invoke_dynamic(
        &mut self,
        bootstrap_method: u16,
        name: &str,
        descriptor: &str,
    ) -> Result<ConstantIndex, Error> {
        let name_and_type = self.get_name_and_type(name, descriptor)?;
        if let Some(index) = self.invoke_dynamics.get(&(bootstrap_method, name_and_type)) {
            return Ok(*index);
        }
        let index = self.push_constant(Constant::InvokeDynamic {
            bootstrap_method,
            name_and_type,
        })?;
        self.invoke_dynamics
            .insert((bootstrap_method, name_and_type), index);
        Ok(index)
    }

    /// Rows of the `BootstrapMethods` attribute, in interning order
    pub fn bootstrap_methods(&self) -> &[(ConstantIndex, Vec<ConstantIndex>)] {
        &self.bootstrap_methods
    }

    /// Serialize `constant_pool_count` followed by every entry
    pub fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.next.serialize(writer)?;
        for constant in &self.constants {
            constant.serialize(writer)?;
        }
        Ok(())
    }
}

/// A constant pool as parsed from class bytes
///
/// Entry zero and the slot after each long/double hold [`PoolItem::Padding`]
/// so that raw indices line up.
pub struct ParsedPool {
    items: Vec<PoolItem>,
}

#[derive(Debug, Clone)]
pub enum PoolItem {
    Padding,
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(u16),
    String(u16),
    FieldRef { class: u16, name_and_type: u16 },
    MethodRef { class: u16, name_and_type: u16, is_interface: bool },
    NameAndType { name: u16, descriptor: u16 },
    MethodHandle { kind: u8, member: u16 },
    MethodType(u16),
    InvokeDynamic { bootstrap_method: u16, name_and_type: u16 },
}

impl ParsedPool {
    /// Read `constant_pool_count` and the entries that follow it
    pub fn read(reader: &mut ByteReader) -> Result<ParsedPool, Error> {
        let count = reader.u16()? as usize;
        let mut items = Vec::with_capacity(count);
        items.push(PoolItem::Padding);
        while items.len() < count {
            let tag = reader.u8()?;
            let item = match tag {
                1 => {
                    let length = reader.u16()? as usize;
                    let bytes = reader.bytes(length)?;
                    // TODO: decode modified UTF-8 surrogate pairs
                    let string = String::from_utf8_lossy(bytes).into_owned();
                    PoolItem::Utf8(string)
                }
                3 => PoolItem::Integer(reader.i32()?),
                4 => PoolItem::Float(reader.f32()?),
                5 => PoolItem::Long(reader.i64()?),
                6 => PoolItem::Double(reader.f64()?),
                7 => PoolItem::Class(reader.u16()?),
                8 => PoolItem::String(reader.u16()?),
                9 => PoolItem::FieldRef {
                    class: reader.u16()?,
                    name_and_type: reader.u16()?,
                },
                10 | 11 => PoolItem::MethodRef {
                    class: reader.u16()?,
                    name_and_type: reader.u16()?,
                    is_interface: tag == 11,
                },
                12 => PoolItem::NameAndType {
                    name: reader.u16()?,
                    descriptor: reader.u16()?,
                },
                15 => PoolItem::MethodHandle {
                    kind: reader.u8()?,
                    member: reader.u16()?,
                },
                16 => PoolItem::MethodType(reader.u16()?),
                18 => PoolItem::InvokeDynamic {
                    bootstrap_method: reader.u16()?,
                    name_and_type: reader.u16()?,
                },
                other => {
                    return Err(Error::ClassFormat(format!(
                        "unsupported constant pool tag {}",
                        other
                    )))
                }
            };
            let wide = matches!(item, PoolItem::Long(_) | PoolItem::Double(_));
            items.push(item);
            if wide {
                items.push(PoolItem::Padding);
            }
        }
        Ok(ParsedPool { items })
    }

    fn item(&self, index: u16) -> Result<&PoolItem, Error> {
        match self.items.get(index as usize) {
            Some(PoolItem::Padding) | None => Err(Error::ClassFormat(format!(
                "invalid constant pool index {}",
                index
            ))),
            Some(item) => Ok(item),
        }
    }

    pub fn utf8(&self, index: u16) -> Result<&str, Error> {
        match self.item(index)? {
            PoolItem::Utf8(string) => Ok(string),
            other => Err(Error::ClassFormat(format!(
                "constant {} is {:?}, expected Utf8",
                index, other
            ))),
        }
    }

    pub fn class_name(&self, index: u16) -> Result<&str, Error> {
        match self.item(index)? {
            PoolItem::Class(name) => self.utf8(*name),
            other => Err(Error::ClassFormat(format!(
                "constant {} is {:?}, expected Class",
                index, other
            ))),
        }
    }

    pub fn name_and_type(&self, index: u16) -> Result<(&str, &str), Error> {
        match self.item(index)? {
            PoolItem::NameAndType { name, descriptor } => {
                Ok((self.utf8(*name)?, self.utf8(*descriptor)?))
            }
            other => Err(Error::ClassFormat(format!(
                "constant {} is {:?}, expected NameAndType",
                index, other
            ))),
        }
    }

    /// Owner, name, and descriptor of a `Fieldref`
    pub fn field_ref(&self, index: u16) -> Result<(&str, &str, &str), Error> {
        match self.item(index)? {
            PoolItem::FieldRef {
                class,
                name_and_type,
            } => {
                let owner = self.class_name(*class)?;
                let (name, descriptor) = self.name_and_type(*name_and_type)?;
                Ok((owner, name, descriptor))
            }
            other => Err(Error::ClassFormat(format!(
                "constant {} is {:?}, expected Fieldref",
                index, other
            ))),
        }
    }

    /// Owner, name, descriptor, and interface flag of a `Methodref`
    pub fn method_ref(&self, index: u16) -> Result<(&str, &str, &str, bool), Error> {
        match self.item(index)? {
            PoolItem::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => {
                let owner = self.class_name(*class)?;
                let (name, descriptor) = self.name_and_type(*name_and_type)?;
                Ok((owner, name, descriptor, *is_interface))
            }
            other => Err(Error::ClassFormat(format!(
                "constant {} is {:?}, expected Methodref",
                index, other
            ))),
        }
    }

    pub fn invoke_dynamic(&self, index: u16) -> Result<(u16, &str, &str), Error> {
        match self.item(index)? {
            PoolItem::InvokeDynamic {
                bootstrap_method,
                name_and_type,
            } => {
                let (name, descriptor) = self.name_and_type(*name_and_type)?;
                Ok((*bootstrap_method, name, descriptor))
            }
            other => Err(Error::ClassFormat(format!(
                "constant {} is {:?}, expected InvokeDynamic",
                index, other
            ))),
        }
    }

    pub fn method_handle(&self, index: u16) -> Result<Handle, Error> {
        match self.item(index)? {
            PoolItem::MethodHandle { kind, member } => {
                let (owner, name, descriptor, interface) = if *kind <= 4 {
                    let (owner, name, descriptor) = self.field_ref(*member)?;
                    (owner, name, descriptor, false)
                } else {
                    self.method_ref(*member)?
                };
                Ok(Handle {
                    kind: *kind,
                    owner: owner.to_string(),
                    name: name.to_string(),
                    descriptor: descriptor.to_string(),
                    interface,
                })
            }
            other => Err(Error::ClassFormat(format!(
                "constant {} is {:?}, expected MethodHandle",
                index, other
            ))),
        }
    }

    /// Any loadable constant (the operand space of `ldc`, `ldc2_w`, bootstrap
    /// arguments, and `ConstantValue` attributes)
    pub fn constant_value(&self, index: u16) -> Result<ConstantValue, Error> {
        match self.item(index)? {
            PoolItem::Integer(integer) => Ok(ConstantValue::Integer(*integer)),
            PoolItem::Float(float) => Ok(ConstantValue::Float(*float)),
            PoolItem::Long(long) => Ok(ConstantValue::Long(*long)),
            PoolItem::Double(double) => Ok(ConstantValue::Double(*double)),
            PoolItem::String(utf8) => Ok(ConstantValue::String(self.utf8(*utf8)?.to_string())),
            PoolItem::Class(name) => Ok(ConstantValue::Class(self.utf8(*name)?.to_string())),
            PoolItem::MethodHandle { .. } => {
                Ok(ConstantValue::MethodHandle(self.method_handle(index)?))
            }
            PoolItem::MethodType(descriptor) => {
                Ok(ConstantValue::MethodType(self.utf8(*descriptor)?.to_string()))
            }
            other => Err(Error::ClassFormat(format!(
                "constant {} is {:?}, not loadable",
                index, other
            ))),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn interning_is_stable() {
        let mut pool = ConstantsPool::new();
        let a = pool.get_utf8("hello").unwrap();
        let b = pool.get_utf8("hello").unwrap();
        assert_eq!(a, b);

        let class_a = pool.get_class("java/lang/String").unwrap();
        let class_b = pool.get_class("java/lang/String").unwrap();
        assert_eq!(class_a, class_b);
        assert_ne!(a, class_a);
    }

    #[test]
    fn wide_constants_take_two_slots() {
        let mut pool = ConstantsPool::new();
        let long = pool.get_long(42).unwrap();
        let next = pool.get_integer(7).unwrap();
        assert_eq!(long.0 + 2, next.0);
        assert_eq!(pool.count(), next.0 + 1);
    }

    #[test]
    fn write_then_parse() {
        let mut pool = ConstantsPool::new();
        let utf8 = pool.get_utf8("name").unwrap();
        let class = pool.get_class("a/B").unwrap();
        let long = pool.get_long(-1).unwrap();
        let field = pool.get_field_ref("a/B", "f", "I").unwrap();

        let mut buffer = vec![];
        pool.serialize(&mut buffer).unwrap();

        let mut reader = ByteReader::new(&buffer);
        let parsed = ParsedPool::read(&mut reader).unwrap();
        assert_eq!(parsed.utf8(utf8.0).unwrap(), "name");
        assert_eq!(parsed.class_name(class.0).unwrap(), "a/B");
        assert!(matches!(
            parsed.constant_value(long.0).unwrap(),
            ConstantValue::Long(-1)
        ));
        assert_eq!(parsed.field_ref(field.0).unwrap(), ("a/B", "f", "I"));
        // the padding slot after the long is not addressable
        assert!(parsed.item(long.0 + 1).is_err());
        assert!(parsed.utf8(0).is_err());
    }
}
