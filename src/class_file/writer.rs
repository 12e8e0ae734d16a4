use crate::class_file::{ConstantIndex, ConstantsPool, Serialize};
use crate::code::opcodes::*;
use crate::code::{
    Code, CodeVisitor, ExceptionHandler, InsnId, Instruction, LabelId,
};
use crate::descriptors::Descriptor;
use crate::errors::Error;
use crate::pool::Class;
use byteorder::WriteBytesExt;
use std::collections::HashMap;
use std::io::Write;

/// A named attribute with opaque contents
struct Attribute {
    name: ConstantIndex,
    info: Vec<u8>,
}

impl Serialize for Attribute {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.name.serialize(writer)?;
        (self.info.len() as u32).serialize(writer)?;
        writer.write_all(&self.info)
    }
}

/// Re-emit a class from the instruction model as class file bytes
///
/// The output is canonically equivalent to what was parsed: the instruction
/// sequence, exception table order, and declared max-stack/max-locals are
/// preserved exactly. Instructions are re-narrowed to their short encodings
/// where possible.
pub fn write_class(class: &Class) -> Result<Vec<u8>, Error> {
    let mut constants = ConstantsPool::new();

    let this_class = constants.get_class(&class.name)?;
    let super_class = match &class.superclass {
        Some(superclass) => constants.get_class(&superclass.name)?.0,
        None => 0,
    };
    let interfaces: Vec<u16> = class
        .interfaces
        .iter()
        .map(|interface| constants.get_class(&interface.name).map(|index| index.0))
        .collect::<Result<_, _>>()?;

    // Members are buffered before the header because encoding them interns
    // constants
    let mut member_bytes: Vec<u8> = vec![];
    (class.fields.len() as u16).serialize(&mut member_bytes)?;
    for field in &class.fields {
        field.access.serialize(&mut member_bytes)?;
        constants.get_utf8(&field.name)?.serialize(&mut member_bytes)?;
        constants
            .get_utf8(&field.descriptor.render())?
            .serialize(&mut member_bytes)?;

        let mut attributes: Vec<Attribute> = vec![];
        if let Some(value) = &field.constant_value {
            let value_index = constants.get_constant_value(value)?;
            let mut info = vec![];
            value_index.serialize(&mut info)?;
            attributes.push(Attribute {
                name: constants.get_utf8("ConstantValue")?,
                info,
            });
        }
        attributes.serialize(&mut member_bytes)?;
    }

    (class.methods.len() as u16).serialize(&mut member_bytes)?;
    for method in &class.methods {
        method.access.serialize(&mut member_bytes)?;
        constants.get_utf8(&method.name)?.serialize(&mut member_bytes)?;
        constants
            .get_utf8(&method.descriptor.render())?
            .serialize(&mut member_bytes)?;

        let mut attributes: Vec<Attribute> = vec![];
        if !method.is_abstract() && !method.is_native() {
            attributes.push(Attribute {
                name: constants.get_utf8("Code")?,
                info: encode_code(&method.code, &mut constants)?,
            });
        }
        if !method.exceptions.is_empty() {
            let mut info = vec![];
            (method.exceptions.len() as u16).serialize(&mut info)?;
            for exception in &method.exceptions {
                constants.get_class(&exception.name)?.serialize(&mut info)?;
            }
            attributes.push(Attribute {
                name: constants.get_utf8("Exceptions")?,
                info,
            });
        }
        attributes.serialize(&mut member_bytes)?;
    }

    let mut class_attributes: Vec<Attribute> = vec![];
    if let Some(source) = &class.source {
        let mut info = vec![];
        constants.get_utf8(source)?.serialize(&mut info)?;
        class_attributes.push(Attribute {
            name: constants.get_utf8("SourceFile")?,
            info,
        });
    }
    if !constants.bootstrap_methods().is_empty() {
        let name = constants.get_utf8("BootstrapMethods")?;
        let rows = constants.bootstrap_methods().to_vec();
        let mut info = vec![];
        (rows.len() as u16).serialize(&mut info)?;
        for (handle, arguments) in rows {
            handle.serialize(&mut info)?;
            (arguments.len() as u16).serialize(&mut info)?;
            for argument in arguments {
                argument.serialize(&mut info)?;
            }
        }
        class_attributes.push(Attribute { name, info });
    }

    let mut bytes: Vec<u8> = vec![];
    0xCAFEBABEu32.serialize(&mut bytes)?;
    class.minor.serialize(&mut bytes)?;
    class.major.serialize(&mut bytes)?;
    constants.serialize(&mut bytes)?;
    class.access.serialize(&mut bytes)?;
    this_class.serialize(&mut bytes)?;
    super_class.serialize(&mut bytes)?;
    interfaces.serialize(&mut bytes)?;
    bytes.extend_from_slice(&member_bytes);
    class_attributes.serialize(&mut bytes)?;
    Ok(bytes)
}

/// Size of an instruction encoded at `offset`, interning `ldc` constants so
/// their index width is known
fn encoded_size(
    insn: &Instruction,
    offset: usize,
    constants: &mut ConstantsPool,
    ldc_indices: &mut HashMap<usize, ConstantIndex>,
    position: usize,
) -> Result<usize, Error> {
    let size = match insn {
        Instruction::Label(_) | Instruction::LineNumber { .. } => 0,
        Instruction::Simple { .. } => 1,
        Instruction::Int { op, .. } => match *op {
            BIPUSH | NEWARRAY => 2,
            _ => 3,
        },
        Instruction::Ldc { constant } => {
            let index = constants.get_constant_value(constant)?;
            ldc_indices.insert(position, index);
            if constant.is_wide() || index.0 > u8::MAX as u16 {
                3
            } else {
                2
            }
        }
        Instruction::Var { op, index } => {
            if *index <= 3 && *op != RET {
                1
            } else if *index <= u8::MAX as u16 {
                2
            } else {
                4
            }
        }
        Instruction::Inc { index, delta } => {
            if *index <= u8::MAX as u16 && (i8::MIN as i16..=i8::MAX as i16).contains(delta) {
                3
            } else {
                6
            }
        }
        Instruction::Jump { .. } => 3,
        Instruction::TableSwitch { targets, .. } => {
            let padding = (4 - (offset + 1) % 4) % 4;
            1 + padding + 12 + 4 * targets.len()
        }
        Instruction::LookupSwitch { pairs, .. } => {
            let padding = (4 - (offset + 1) % 4) % 4;
            1 + padding + 8 + 8 * pairs.len()
        }
        Instruction::Type { .. } | Instruction::Field { .. } => 3,
        Instruction::Method { op, .. } => {
            if *op == INVOKEINTERFACE {
                5
            } else {
                3
            }
        }
        Instruction::InvokeDynamic { .. } => 5,
        Instruction::MultiANewArray { .. } => 4,
    };
    Ok(size)
}

/// Encode a method body into the contents of a `Code` attribute
fn encode_code(code: &Code, constants: &mut ConstantsPool) -> Result<Vec<u8>, Error> {
    code.label_positions()?;

    // Sizing pass: fix every instruction's offset so branches can be encoded
    let mut insn_offsets: Vec<usize> = Vec::with_capacity(code.len());
    let mut label_offsets: HashMap<LabelId, usize> = HashMap::new();
    let mut ldc_indices: HashMap<usize, ConstantIndex> = HashMap::new();
    let mut offset = 0;
    for (id, insn) in code.iter() {
        insn_offsets.push(offset);
        if let Instruction::Label(label) = insn {
            label_offsets.insert(*label, offset);
        }
        offset += encoded_size(insn, offset, constants, &mut ldc_indices, id.position())?;
    }
    if offset > u16::MAX as usize {
        return Err(Error::MethodCodeOverflow(offset));
    }

    let mut encoder = CodeEncoder {
        constants,
        insn_offsets,
        label_offsets,
        ldc_indices,
        buffer: vec![],
        exception_table: vec![],
        handler_count: 0,
        line_table: vec![],
        maxs: (0, 0),
        error: None,
    };
    code.accept(&mut encoder);
    if let Some(error) = encoder.error {
        return Err(error);
    }

    let mut info: Vec<u8> = vec![];
    encoder.maxs.0.serialize(&mut info)?;
    encoder.maxs.1.serialize(&mut info)?;
    (encoder.buffer.len() as u32).serialize(&mut info)?;
    info.extend_from_slice(&encoder.buffer);
    encoder.handler_count.serialize(&mut info)?;
    info.extend_from_slice(&encoder.exception_table);

    let mut attributes: Vec<Attribute> = vec![];
    if !encoder.line_table.is_empty() {
        let mut line_info = vec![];
        (encoder.line_table.len() as u16).serialize(&mut line_info)?;
        for (start_pc, line) in &encoder.line_table {
            start_pc.serialize(&mut line_info)?;
            line.serialize(&mut line_info)?;
        }
        attributes.push(Attribute {
            name: encoder.constants.get_utf8("LineNumberTable")?,
            info: line_info,
        });
    }
    attributes.serialize(&mut info)?;
    Ok(info)
}

/// Emission pass: a [`CodeVisitor`] that writes the bytecode array, the
/// exception table, and the line number table
struct CodeEncoder<'a> {
    constants: &'a mut ConstantsPool,
    insn_offsets: Vec<usize>,
    label_offsets: HashMap<LabelId, usize>,
    ldc_indices: HashMap<usize, ConstantIndex>,
    buffer: Vec<u8>,
    exception_table: Vec<u8>,
    handler_count: u16,
    line_table: Vec<(u16, u16)>,
    maxs: (u16, u16),
    error: Option<Error>,
}

impl CodeEncoder<'_> {
    fn label_offset(&self, label: LabelId) -> Result<usize, Error> {
        self.label_offsets.get(&label).copied().ok_or_else(|| {
            Error::MalformedCode(format!("label {:?} is referenced but not placed", label))
        })
    }

    fn branch_delta(&self, from: usize, label: LabelId) -> Result<i16, Error> {
        let to = self.label_offset(label)?;
        i16::try_from(to as i64 - from as i64)
            .map_err(|_| Error::JumpOffsetOverflow { from, to })
    }

    fn encode_insn(&mut self, id: InsnId, insn: &Instruction) -> Result<(), Error> {
        let offset = self.insn_offsets[id.position()];
        match insn {
            Instruction::Label(_) => (),
            Instruction::LineNumber { line, start } => {
                let start_pc = self.label_offset(*start)? as u16;
                self.line_table.push((start_pc, *line));
            }
            Instruction::Simple { op } => self.buffer.push(*op),
            Instruction::Int { op, operand } => {
                self.buffer.push(*op);
                match *op {
                    BIPUSH => (*operand as i8).serialize(&mut self.buffer)?,
                    NEWARRAY => (*operand as u8).serialize(&mut self.buffer)?,
                    _ => (*operand as i16).serialize(&mut self.buffer)?,
                }
            }
            Instruction::Ldc { constant } => {
                let index = self.ldc_indices[&id.position()];
                if constant.is_wide() {
                    self.buffer.push(LDC2_W);
                    index.serialize(&mut self.buffer)?;
                } else if index.0 > u8::MAX as u16 {
                    self.buffer.push(LDC_W);
                    index.serialize(&mut self.buffer)?;
                } else {
                    self.buffer.push(LDC);
                    self.buffer.push(index.0 as u8);
                }
            }
            Instruction::Var { op, index } => {
                if *index <= 3 && *op != RET {
                    let base = match *op {
                        ILOAD..=ALOAD => ILOAD_0 + (*op - ILOAD) * 4,
                        _ => ISTORE_0 + (*op - ISTORE) * 4,
                    };
                    self.buffer.push(base + *index as u8);
                } else if *index <= u8::MAX as u16 {
                    self.buffer.push(*op);
                    self.buffer.push(*index as u8);
                } else {
                    self.buffer.push(WIDE);
                    self.buffer.push(*op);
                    index.serialize(&mut self.buffer)?;
                }
            }
            Instruction::Inc { index, delta } => {
                if *index <= u8::MAX as u16
                    && (i8::MIN as i16..=i8::MAX as i16).contains(delta)
                {
                    self.buffer.push(IINC);
                    self.buffer.push(*index as u8);
                    (*delta as i8).serialize(&mut self.buffer)?;
                } else {
                    self.buffer.push(WIDE);
                    self.buffer.push(IINC);
                    index.serialize(&mut self.buffer)?;
                    delta.serialize(&mut self.buffer)?;
                }
            }
            Instruction::Jump { op, target } => {
                let delta = self.branch_delta(offset, *target)?;
                self.buffer.push(*op);
                delta.serialize(&mut self.buffer)?;
            }
            Instruction::TableSwitch {
                min,
                max,
                default,
                targets,
            } => {
                let default_offset = self.label_offset(*default)? as i64;
                let mut relative_targets = Vec::with_capacity(targets.len());
                for target in targets {
                    relative_targets.push((self.label_offset(*target)? as i64 - offset as i64) as i32);
                }
                self.buffer.push(TABLESWITCH);
                let padding = (4 - (offset + 1) % 4) % 4;
                for _ in 0..padding {
                    self.buffer.push(0);
                }
                ((default_offset - offset as i64) as i32).serialize(&mut self.buffer)?;
                min.serialize(&mut self.buffer)?;
                max.serialize(&mut self.buffer)?;
                for relative in relative_targets {
                    relative.serialize(&mut self.buffer)?;
                }
            }
            Instruction::LookupSwitch { default, pairs } => {
                let default_offset = self.label_offset(*default)? as i64;
                let mut relative_pairs = Vec::with_capacity(pairs.len());
                for (key, target) in pairs {
                    relative_pairs.push((*key, (self.label_offset(*target)? as i64 - offset as i64) as i32));
                }
                self.buffer.push(LOOKUPSWITCH);
                let padding = (4 - (offset + 1) % 4) % 4;
                for _ in 0..padding {
                    self.buffer.push(0);
                }
                ((default_offset - offset as i64) as i32).serialize(&mut self.buffer)?;
                (relative_pairs.len() as i32).serialize(&mut self.buffer)?;
                for (key, relative) in relative_pairs {
                    key.serialize(&mut self.buffer)?;
                    relative.serialize(&mut self.buffer)?;
                }
            }
            Instruction::Type { op, class } => {
                let index = self.constants.get_class(&class.name)?;
                self.buffer.push(*op);
                index.serialize(&mut self.buffer)?;
            }
            Instruction::Field { op, field } => {
                let index = self.constants.get_field_ref(
                    &field.owner,
                    &field.name,
                    &field.descriptor.render(),
                )?;
                self.buffer.push(*op);
                index.serialize(&mut self.buffer)?;
            }
            Instruction::Method {
                op,
                method,
                interface,
            } => {
                let index = self.constants.get_method_ref(
                    &method.owner,
                    &method.name,
                    &method.descriptor.render(),
                    *interface,
                )?;
                self.buffer.push(*op);
                index.serialize(&mut self.buffer)?;
                if *op == INVOKEINTERFACE {
                    let count = method.descriptor.parameter_length(true) as u8;
                    self.buffer.push(count);
                    self.buffer.push(0);
                }
            }
            Instruction::InvokeDynamic {
                name,
                descriptor,
                bootstrap,
            } => {
                let bootstrap_index = self.constants.get_bootstrap_method(bootstrap)?;
                let index = self.constants.get_invoke_dynamic(
                    bootstrap_index,
                    name,
                    &descriptor.render(),
                )?;
                self.buffer.push(INVOKEDYNAMIC);
                index.serialize(&mut self.buffer)?;
                self.buffer.push(0);
                self.buffer.push(0);
            }
            Instruction::MultiANewArray {
                descriptor,
                dimensions,
            } => {
                let index = self.constants.get_class(descriptor)?;
                self.buffer.push(MULTIANEWARRAY);
                index.serialize(&mut self.buffer)?;
                self.buffer.push(*dimensions);
            }
        }
        Ok(())
    }
}

impl CodeVisitor for CodeEncoder<'_> {
    fn visit_exception_handler(&mut self, handler: &ExceptionHandler) {
        if self.error.is_some() {
            return;
        }
        let encode = |encoder: &mut Self| -> Result<(), Error> {
            let start = encoder.label_offset(handler.start)? as u16;
            let end = encoder.label_offset(handler.end)? as u16;
            let target = encoder.label_offset(handler.handler)? as u16;
            let catch_type = match &handler.catch_type {
                Some(class) => encoder.constants.get_class(&class.name)?.0,
                None => 0,
            };
            start.serialize(&mut encoder.exception_table)?;
            end.serialize(&mut encoder.exception_table)?;
            target.serialize(&mut encoder.exception_table)?;
            catch_type.serialize(&mut encoder.exception_table)?;
            encoder.handler_count += 1;
            Ok(())
        };
        if let Err(error) = encode(self) {
            self.error = Some(error);
        }
    }

    fn visit_insn(&mut self, id: InsnId, insn: &Instruction) {
        if self.error.is_some() {
            return;
        }
        if let Err(error) = self.encode_insn(id, insn) {
            self.error = Some(error);
        }
    }

    fn visit_maxs(&mut self, max_stack: u16, max_locals: u16) {
        self.maxs = (max_stack, max_locals);
    }
}
