use crate::access_flags::{ClassAccessFlags, FieldAccessFlags, MethodAccessFlags};
use crate::class_file::{ByteReader, ParsedPool};
use crate::code::opcodes::*;
use crate::code::{BootstrapMethod, Code, ExceptionHandler, Instruction};
use crate::descriptors::{Descriptor, FieldType, MethodDescriptor};
use crate::errors::Error;
use crate::pool::{Class, ClassRef, Field, FieldRef, Method, MethodRef};
use std::collections::{HashMap, HashSet};

/// Parse class bytes into the instruction model
pub fn read_class(bytes: &[u8]) -> Result<Class, Error> {
    let mut reader = ByteReader::new(bytes);
    if reader.u32()? != 0xCAFEBABE {
        return Err(Error::ClassFormat("missing 0xCAFEBABE magic".to_string()));
    }
    let minor = reader.u16()?;
    let major = reader.u16()?;
    let pool = ParsedPool::read(&mut reader)?;

    let access = ClassAccessFlags::from_bits_truncate(reader.u16()?);
    let name = pool.class_name(reader.u16()?)?.to_string();
    let super_index = reader.u16()?;
    let superclass = if super_index == 0 {
        None
    } else {
        Some(ClassRef::new(pool.class_name(super_index)?))
    };
    let interface_count = reader.u16()?;
    let mut interfaces = Vec::with_capacity(interface_count as usize);
    for _ in 0..interface_count {
        interfaces.push(ClassRef::new(pool.class_name(reader.u16()?)?));
    }

    // `invokedynamic` operands point into the BootstrapMethods class
    // attribute, which the format places after the members; scan ahead for it
    let members_start = reader.position();
    let bootstraps = prescan_bootstrap_methods(&mut reader, &pool)?;
    reader.seek(members_start);

    let mut class = Class::new(name, access, major);
    class.minor = minor;
    class.superclass = superclass;
    class.interfaces = interfaces;

    let field_count = reader.u16()?;
    for _ in 0..field_count {
        class.fields.push(read_field(&mut reader, &pool)?);
    }

    let method_count = reader.u16()?;
    for _ in 0..method_count {
        let method = read_method(&mut reader, &pool, &bootstraps, &class.name)?;
        class.methods.push(method);
    }

    let attribute_count = reader.u16()?;
    for _ in 0..attribute_count {
        let attribute_name = pool.utf8(reader.u16()?)?;
        let length = reader.u32()? as usize;
        match attribute_name {
            "SourceFile" => class.source = Some(pool.utf8(reader.u16()?)?.to_string()),
            "BootstrapMethods" => reader.skip(length)?,
            other => {
                log::debug!("skipping class attribute {}", other);
                reader.skip(length)?;
            }
        }
    }

    Ok(class)
}

/// Skip over fields and methods to parse the `BootstrapMethods` attribute
fn prescan_bootstrap_methods(
    reader: &mut ByteReader,
    pool: &ParsedPool,
) -> Result<Vec<BootstrapMethod>, Error> {
    for _ in 0..2 {
        let member_count = reader.u16()?;
        for _ in 0..member_count {
            reader.skip(6)?;
            skip_attributes(reader)?;
        }
    }

    let attribute_count = reader.u16()?;
    for _ in 0..attribute_count {
        let attribute_name = pool.utf8(reader.u16()?)?;
        let length = reader.u32()? as usize;
        if attribute_name != "BootstrapMethods" {
            reader.skip(length)?;
            continue;
        }
        let count = reader.u16()?;
        let mut bootstraps = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let handle = pool.method_handle(reader.u16()?)?;
            let argument_count = reader.u16()?;
            let mut arguments = Vec::with_capacity(argument_count as usize);
            for _ in 0..argument_count {
                arguments.push(pool.constant_value(reader.u16()?)?);
            }
            bootstraps.push(BootstrapMethod { handle, arguments });
        }
        return Ok(bootstraps);
    }
    Ok(vec![])
}

fn skip_attributes(reader: &mut ByteReader) -> Result<(), Error> {
    let count = reader.u16()?;
    for _ in 0..count {
        reader.skip(2)?;
        let length = reader.u32()? as usize;
        reader.skip(length)?;
    }
    Ok(())
}

fn parse_field_type(descriptor: &str) -> Result<FieldType, Error> {
    FieldType::parse(descriptor)
        .map_err(|err| Error::ClassFormat(format!("bad field descriptor '{}': {}", descriptor, err)))
}

fn parse_method_descriptor(descriptor: &str) -> Result<MethodDescriptor, Error> {
    MethodDescriptor::parse(descriptor).map_err(|err| {
        Error::ClassFormat(format!("bad method descriptor '{}': {}", descriptor, err))
    })
}

fn read_field(reader: &mut ByteReader, pool: &ParsedPool) -> Result<Field, Error> {
    let access = FieldAccessFlags::from_bits_truncate(reader.u16()?);
    let name = pool.utf8(reader.u16()?)?.to_string();
    let descriptor = parse_field_type(pool.utf8(reader.u16()?)?)?;
    let mut field = Field::new(access, name, descriptor);

    let attribute_count = reader.u16()?;
    for _ in 0..attribute_count {
        let attribute_name = pool.utf8(reader.u16()?)?;
        let length = reader.u32()? as usize;
        match attribute_name {
            "ConstantValue" => field.constant_value = Some(pool.constant_value(reader.u16()?)?),
            other => {
                log::debug!("skipping field attribute {}", other);
                reader.skip(length)?;
            }
        }
    }
    Ok(field)
}

fn read_method(
    reader: &mut ByteReader,
    pool: &ParsedPool,
    bootstraps: &[BootstrapMethod],
    owner: &str,
) -> Result<Method, Error> {
    let access = MethodAccessFlags::from_bits_truncate(reader.u16()?);
    let name = pool.utf8(reader.u16()?)?.to_string();
    let descriptor = parse_method_descriptor(pool.utf8(reader.u16()?)?)?;
    let mut method = Method::new(owner, access, name, descriptor);

    let attribute_count = reader.u16()?;
    for _ in 0..attribute_count {
        let attribute_name = pool.utf8(reader.u16()?)?;
        let length = reader.u32()? as usize;
        match attribute_name {
            "Code" => method.code = read_code(reader, pool, bootstraps)?,
            "Exceptions" => {
                let count = reader.u16()?;
                for _ in 0..count {
                    method
                        .exceptions
                        .push(ClassRef::new(pool.class_name(reader.u16()?)?));
                }
            }
            other => {
                log::debug!("skipping method attribute {}", other);
                reader.skip(length)?;
            }
        }
    }
    Ok(method)
}

struct RawHandler {
    start: u16,
    end: u16,
    handler: u16,
    catch_type: Option<String>,
}

fn read_code(
    reader: &mut ByteReader,
    pool: &ParsedPool,
    bootstraps: &[BootstrapMethod],
) -> Result<Code, Error> {
    let max_stack = reader.u16()?;
    let max_locals = reader.u16()?;
    let code_length = reader.u32()? as usize;
    let code_bytes = reader.bytes(code_length)?;

    let handler_count = reader.u16()?;
    let mut raw_handlers = Vec::with_capacity(handler_count as usize);
    for _ in 0..handler_count {
        let start = reader.u16()?;
        let end = reader.u16()?;
        let handler = reader.u16()?;
        let catch_index = reader.u16()?;
        let catch_type = if catch_index == 0 {
            None
        } else {
            Some(pool.class_name(catch_index)?.to_string())
        };
        raw_handlers.push(RawHandler {
            start,
            end,
            handler,
            catch_type,
        });
    }

    let mut line_numbers: Vec<(u16, u16)> = vec![];
    let attribute_count = reader.u16()?;
    for _ in 0..attribute_count {
        let attribute_name = pool.utf8(reader.u16()?)?;
        let length = reader.u32()? as usize;
        match attribute_name {
            "LineNumberTable" => {
                let count = reader.u16()?;
                for _ in 0..count {
                    let start_pc = reader.u16()?;
                    let line = reader.u16()?;
                    line_numbers.push((start_pc, line));
                }
            }
            other => {
                log::debug!("skipping code attribute {}", other);
                reader.skip(length)?;
            }
        }
    }

    decode_code(
        code_bytes,
        pool,
        bootstraps,
        max_stack,
        max_locals,
        raw_handlers,
        line_numbers,
    )
}

fn u8_at(bytes: &[u8], at: usize) -> Result<u8, Error> {
    bytes
        .get(at)
        .copied()
        .ok_or_else(|| Error::ClassFormat(format!("truncated instruction at offset {}", at)))
}

fn u16_at(bytes: &[u8], at: usize) -> Result<u16, Error> {
    Ok(((u8_at(bytes, at)? as u16) << 8) | u8_at(bytes, at + 1)? as u16)
}

fn i16_at(bytes: &[u8], at: usize) -> Result<i16, Error> {
    Ok(u16_at(bytes, at)? as i16)
}

fn i32_at(bytes: &[u8], at: usize) -> Result<i32, Error> {
    Ok(((u16_at(bytes, at)? as u32) << 16 | u16_at(bytes, at + 2)? as u32) as i32)
}

/// Absolute offset of a relative branch operand
fn branch_target(opcode_at: usize, relative: i64) -> Result<usize, Error> {
    let target = opcode_at as i64 + relative;
    if target < 0 {
        return Err(Error::ClassFormat(format!(
            "branch target {} before start of code",
            target
        )));
    }
    Ok(target as usize)
}

/// Size of the instruction at `at`, plus the raw offsets it jumps to
fn scan_insn(bytes: &[u8], at: usize) -> Result<(usize, Vec<usize>), Error> {
    let op = u8_at(bytes, at)?;
    let plain = |size: usize| Ok((size, vec![]));
    match op {
        0..=15 | 26..=53 | 59..=131 | 133..=152 | 172..=177 | ARRAYLENGTH | ATHROW
        | MONITORENTER | MONITOREXIT => plain(1),
        BIPUSH | LDC | NEWARRAY => plain(2),
        SIPUSH | LDC_W | LDC2_W => plain(3),
        ILOAD..=ALOAD | ISTORE..=ASTORE | RET => plain(2),
        IINC => plain(3),
        WIDE => {
            let sub = u8_at(bytes, at + 1)?;
            match sub {
                IINC => plain(6),
                ILOAD..=ALOAD | ISTORE..=ASTORE | RET => plain(4),
                other => Err(Error::ClassFormat(format!(
                    "invalid wide prefix target {}",
                    other
                ))),
            }
        }
        IFEQ..=JSR | IFNULL | IFNONNULL => {
            let target = branch_target(at, i16_at(bytes, at + 1)? as i64)?;
            Ok((3, vec![target]))
        }
        GOTO_W | JSR_W => {
            let target = branch_target(at, i32_at(bytes, at + 1)? as i64)?;
            Ok((5, vec![target]))
        }
        TABLESWITCH => {
            let padding = (4 - (at + 1) % 4) % 4;
            let mut cursor = at + 1 + padding;
            let mut targets = vec![branch_target(at, i32_at(bytes, cursor)? as i64)?];
            let low = i32_at(bytes, cursor + 4)?;
            let high = i32_at(bytes, cursor + 8)?;
            if high < low {
                return Err(Error::ClassFormat(format!(
                    "tableswitch bounds {}..{} are inverted",
                    low, high
                )));
            }
            cursor += 12;
            for _ in low..=high {
                targets.push(branch_target(at, i32_at(bytes, cursor)? as i64)?);
                cursor += 4;
            }
            Ok((cursor - at, targets))
        }
        LOOKUPSWITCH => {
            let padding = (4 - (at + 1) % 4) % 4;
            let mut cursor = at + 1 + padding;
            let mut targets = vec![branch_target(at, i32_at(bytes, cursor)? as i64)?];
            let pair_count = i32_at(bytes, cursor + 4)?;
            if pair_count < 0 {
                return Err(Error::ClassFormat(format!(
                    "lookupswitch has {} pairs",
                    pair_count
                )));
            }
            cursor += 8;
            for _ in 0..pair_count {
                targets.push(branch_target(at, i32_at(bytes, cursor + 4)? as i64)?);
                cursor += 8;
            }
            Ok((cursor - at, targets))
        }
        GETSTATIC..=INVOKESTATIC | NEW | ANEWARRAY | CHECKCAST | INSTANCEOF => plain(3),
        INVOKEINTERFACE | INVOKEDYNAMIC => plain(5),
        MULTIANEWARRAY => plain(4),
        other => Err(Error::UnknownOpcode(other)),
    }
}

/// Decode the instruction at `at`, minting labels for its branch targets
fn decode_insn(
    bytes: &[u8],
    at: usize,
    pool: &ParsedPool,
    bootstraps: &[BootstrapMethod],
    code: &mut Code,
) -> Result<Instruction, Error> {
    let op = u8_at(bytes, at)?;
    let insn = match op {
        0..=15
        | IALOAD..=SALOAD
        | IASTORE..=SASTORE
        | POP..=SWAP
        | IADD..=LXOR
        | I2L..=DCMPG
        | IRETURN..=RETURN
        | ARRAYLENGTH
        | ATHROW
        | MONITORENTER
        | MONITOREXIT => Instruction::Simple { op },
        BIPUSH => Instruction::Int {
            op,
            operand: u8_at(bytes, at + 1)? as i8 as i32,
        },
        SIPUSH => Instruction::Int {
            op,
            operand: i16_at(bytes, at + 1)? as i32,
        },
        NEWARRAY => Instruction::Int {
            op,
            operand: u8_at(bytes, at + 1)? as i32,
        },
        LDC => Instruction::Ldc {
            constant: pool.constant_value(u8_at(bytes, at + 1)? as u16)?,
        },
        LDC_W | LDC2_W => Instruction::Ldc {
            constant: pool.constant_value(u16_at(bytes, at + 1)?)?,
        },
        ILOAD..=ALOAD | ISTORE..=ASTORE | RET => Instruction::Var {
            op,
            index: u8_at(bytes, at + 1)? as u16,
        },
        ILOAD_0..=45 => Instruction::Var {
            op: ILOAD + (op - ILOAD_0) / 4,
            index: ((op - ILOAD_0) % 4) as u16,
        },
        ISTORE_0..=78 => Instruction::Var {
            op: ISTORE + (op - ISTORE_0) / 4,
            index: ((op - ISTORE_0) % 4) as u16,
        },
        IINC => Instruction::Inc {
            index: u8_at(bytes, at + 1)? as u16,
            delta: u8_at(bytes, at + 2)? as i8 as i16,
        },
        WIDE => {
            let sub = u8_at(bytes, at + 1)?;
            let index = u16_at(bytes, at + 2)?;
            if sub == IINC {
                Instruction::Inc {
                    index,
                    delta: i16_at(bytes, at + 4)?,
                }
            } else {
                Instruction::Var { op: sub, index }
            }
        }
        IFEQ..=JSR | IFNULL | IFNONNULL => {
            let target = branch_target(at, i16_at(bytes, at + 1)? as i64)?;
            Instruction::Jump {
                op,
                target: code.get_or_create_label(target as u32),
            }
        }
        GOTO_W | JSR_W => {
            let target = branch_target(at, i32_at(bytes, at + 1)? as i64)?;
            Instruction::Jump {
                op: if op == GOTO_W { GOTO } else { JSR },
                target: code.get_or_create_label(target as u32),
            }
        }
        TABLESWITCH => {
            let padding = (4 - (at + 1) % 4) % 4;
            let mut cursor = at + 1 + padding;
            let default_offset = branch_target(at, i32_at(bytes, cursor)? as i64)?;
            let default = code.get_or_create_label(default_offset as u32);
            let min = i32_at(bytes, cursor + 4)?;
            let max = i32_at(bytes, cursor + 8)?;
            cursor += 12;
            let mut targets = vec![];
            for _ in min..=max {
                let target = branch_target(at, i32_at(bytes, cursor)? as i64)?;
                targets.push(code.get_or_create_label(target as u32));
                cursor += 4;
            }
            Instruction::TableSwitch {
                min,
                max,
                default,
                targets,
            }
        }
        LOOKUPSWITCH => {
            let padding = (4 - (at + 1) % 4) % 4;
            let mut cursor = at + 1 + padding;
            let default_offset = branch_target(at, i32_at(bytes, cursor)? as i64)?;
            let default = code.get_or_create_label(default_offset as u32);
            let pair_count = i32_at(bytes, cursor + 4)?;
            cursor += 8;
            let mut pairs = vec![];
            for _ in 0..pair_count {
                let key = i32_at(bytes, cursor)?;
                let target = branch_target(at, i32_at(bytes, cursor + 4)? as i64)?;
                pairs.push((key, code.get_or_create_label(target as u32)));
                cursor += 8;
            }
            Instruction::LookupSwitch { default, pairs }
        }
        GETSTATIC..=PUTFIELD => {
            let (owner, name, descriptor) = pool.field_ref(u16_at(bytes, at + 1)?)?;
            Instruction::Field {
                op,
                field: FieldRef::new(owner, name, parse_field_type(descriptor)?),
            }
        }
        INVOKEVIRTUAL..=INVOKEINTERFACE => {
            let (owner, name, descriptor, interface) = pool.method_ref(u16_at(bytes, at + 1)?)?;
            Instruction::Method {
                op,
                method: MethodRef::new(owner, name, parse_method_descriptor(descriptor)?),
                interface,
            }
        }
        INVOKEDYNAMIC => {
            let (bootstrap_index, name, descriptor) = pool.invoke_dynamic(u16_at(bytes, at + 1)?)?;
            let bootstrap = bootstraps.get(bootstrap_index as usize).ok_or_else(|| {
                Error::ClassFormat(format!(
                    "invokedynamic references bootstrap method {} of {}",
                    bootstrap_index,
                    bootstraps.len()
                ))
            })?;
            Instruction::InvokeDynamic {
                name: name.to_string(),
                descriptor: parse_method_descriptor(descriptor)?,
                bootstrap: bootstrap.clone(),
            }
        }
        NEW | ANEWARRAY | CHECKCAST | INSTANCEOF => Instruction::Type {
            op,
            class: ClassRef::new(pool.class_name(u16_at(bytes, at + 1)?)?),
        },
        MULTIANEWARRAY => Instruction::MultiANewArray {
            descriptor: pool.class_name(u16_at(bytes, at + 1)?)?.to_string(),
            dimensions: u8_at(bytes, at + 3)?,
        },
        other => return Err(Error::UnknownOpcode(other)),
    };
    Ok(insn)
}

fn decode_code(
    bytes: &[u8],
    pool: &ParsedPool,
    bootstraps: &[BootstrapMethod],
    max_stack: u16,
    max_locals: u16,
    raw_handlers: Vec<RawHandler>,
    line_numbers: Vec<(u16, u16)>,
) -> Result<Code, Error> {
    // Pass 1: every offset that needs a label marker
    let mut targets: HashSet<usize> = HashSet::new();
    let mut offset = 0;
    while offset < bytes.len() {
        let (size, insn_targets) = scan_insn(bytes, offset)?;
        targets.extend(insn_targets);
        offset += size;
    }
    for handler in &raw_handlers {
        targets.insert(handler.start as usize);
        targets.insert(handler.end as usize);
        targets.insert(handler.handler as usize);
    }
    let mut line_map: HashMap<usize, Vec<u16>> = HashMap::new();
    for (start_pc, line) in line_numbers {
        targets.insert(start_pc as usize);
        line_map.entry(start_pc as usize).or_default().push(line);
    }

    // Pass 2: materialize labels and instructions in offset order
    let mut code = Code::new();
    code.max_stack = max_stack;
    code.max_locals = max_locals;
    let emit_markers = |code: &mut Code, offset: usize| {
        if targets.contains(&offset) {
            let label = code.get_or_create_label(offset as u32);
            code.push(Instruction::Label(label));
        }
        if let Some(lines) = line_map.get(&offset) {
            for line in lines {
                let start = code.get_or_create_label(offset as u32);
                code.push(Instruction::LineNumber { line: *line, start });
            }
        }
    };

    let mut offset = 0;
    while offset < bytes.len() {
        emit_markers(&mut code, offset);
        let (size, _) = scan_insn(bytes, offset)?;
        let insn = decode_insn(bytes, offset, pool, bootstraps, &mut code)?;
        code.push(insn);
        offset += size;
    }
    emit_markers(&mut code, bytes.len());

    for handler in raw_handlers {
        let start = code.get_or_create_label(handler.start as u32);
        let end = code.get_or_create_label(handler.end as u32);
        let target = code.get_or_create_label(handler.handler as u32);
        code.handlers.push(ExceptionHandler {
            start,
            end,
            handler: target,
            catch_type: handler.catch_type.map(ClassRef::new),
        });
    }

    Ok(code)
}
