use crate::descriptors::{BaseType, MethodDescriptor};
use crate::pool::{ClassRef, FieldRef, MethodRef};
use std::fmt;

/// Raw opcode values
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-6.html#jvms-6.5
#[allow(missing_docs)]
pub mod opcodes {
    pub const NOP: u8 = 0;
    pub const ACONST_NULL: u8 = 1;
    pub const ICONST_M1: u8 = 2;
    pub const ICONST_0: u8 = 3;
    pub const ICONST_1: u8 = 4;
    pub const ICONST_2: u8 = 5;
    pub const ICONST_3: u8 = 6;
    pub const ICONST_4: u8 = 7;
    pub const ICONST_5: u8 = 8;
    pub const LCONST_0: u8 = 9;
    pub const LCONST_1: u8 = 10;
    pub const FCONST_0: u8 = 11;
    pub const FCONST_1: u8 = 12;
    pub const FCONST_2: u8 = 13;
    pub const DCONST_0: u8 = 14;
    pub const DCONST_1: u8 = 15;
    pub const BIPUSH: u8 = 16;
    pub const SIPUSH: u8 = 17;
    pub const LDC: u8 = 18;
    pub const LDC_W: u8 = 19;
    pub const LDC2_W: u8 = 20;
    pub const ILOAD: u8 = 21;
    pub const LLOAD: u8 = 22;
    pub const FLOAD: u8 = 23;
    pub const DLOAD: u8 = 24;
    pub const ALOAD: u8 = 25;
    pub const ILOAD_0: u8 = 26;
    pub const LLOAD_0: u8 = 30;
    pub const FLOAD_0: u8 = 34;
    pub const DLOAD_0: u8 = 38;
    pub const ALOAD_0: u8 = 42;
    pub const IALOAD: u8 = 46;
    pub const LALOAD: u8 = 47;
    pub const FALOAD: u8 = 48;
    pub const DALOAD: u8 = 49;
    pub const AALOAD: u8 = 50;
    pub const BALOAD: u8 = 51;
    pub const CALOAD: u8 = 52;
    pub const SALOAD: u8 = 53;
    pub const ISTORE: u8 = 54;
    pub const LSTORE: u8 = 55;
    pub const FSTORE: u8 = 56;
    pub const DSTORE: u8 = 57;
    pub const ASTORE: u8 = 58;
    pub const ISTORE_0: u8 = 59;
    pub const LSTORE_0: u8 = 63;
    pub const FSTORE_0: u8 = 67;
    pub const DSTORE_0: u8 = 71;
    pub const ASTORE_0: u8 = 75;
    pub const IASTORE: u8 = 79;
    pub const LASTORE: u8 = 80;
    pub const FASTORE: u8 = 81;
    pub const DASTORE: u8 = 82;
    pub const AASTORE: u8 = 83;
    pub const BASTORE: u8 = 84;
    pub const CASTORE: u8 = 85;
    pub const SASTORE: u8 = 86;
    pub const POP: u8 = 87;
    pub const POP2: u8 = 88;
    pub const DUP: u8 = 89;
    pub const DUP_X1: u8 = 90;
    pub const DUP_X2: u8 = 91;
    pub const DUP2: u8 = 92;
    pub const DUP2_X1: u8 = 93;
    pub const DUP2_X2: u8 = 94;
    pub const SWAP: u8 = 95;
    pub const IADD: u8 = 96;
    pub const LADD: u8 = 97;
    pub const FADD: u8 = 98;
    pub const DADD: u8 = 99;
    pub const ISUB: u8 = 100;
    pub const LSUB: u8 = 101;
    pub const FSUB: u8 = 102;
    pub const DSUB: u8 = 103;
    pub const IMUL: u8 = 104;
    pub const LMUL: u8 = 105;
    pub const FMUL: u8 = 106;
    pub const DMUL: u8 = 107;
    pub const IDIV: u8 = 108;
    pub const LDIV: u8 = 109;
    pub const FDIV: u8 = 110;
    pub const DDIV: u8 = 111;
    pub const IREM: u8 = 112;
    pub const LREM: u8 = 113;
    pub const FREM: u8 = 114;
    pub const DREM: u8 = 115;
    pub const INEG: u8 = 116;
    pub const LNEG: u8 = 117;
    pub const FNEG: u8 = 118;
    pub const DNEG: u8 = 119;
    pub const ISHL: u8 = 120;
    pub const LSHL: u8 = 121;
    pub const ISHR: u8 = 122;
    pub const LSHR: u8 = 123;
    pub const IUSHR: u8 = 124;
    pub const LUSHR: u8 = 125;
    pub const IAND: u8 = 126;
    pub const LAND: u8 = 127;
    pub const IOR: u8 = 128;
    pub const LOR: u8 = 129;
    pub const IXOR: u8 = 130;
    pub const LXOR: u8 = 131;
    pub const IINC: u8 = 132;
    pub const I2L: u8 = 133;
    pub const I2F: u8 = 134;
    pub const I2D: u8 = 135;
    pub const L2I: u8 = 136;
    pub const L2F: u8 = 137;
    pub const L2D: u8 = 138;
    pub const F2I: u8 = 139;
    pub const F2L: u8 = 140;
    pub const F2D: u8 = 141;
    pub const D2I: u8 = 142;
    pub const D2L: u8 = 143;
    pub const D2F: u8 = 144;
    pub const I2B: u8 = 145;
    pub const I2C: u8 = 146;
    pub const I2S: u8 = 147;
    pub const LCMP: u8 = 148;
    pub const FCMPL: u8 = 149;
    pub const FCMPG: u8 = 150;
    pub const DCMPL: u8 = 151;
    pub const DCMPG: u8 = 152;
    pub const IFEQ: u8 = 153;
    pub const IFNE: u8 = 154;
    pub const IFLT: u8 = 155;
    pub const IFGE: u8 = 156;
    pub const IFGT: u8 = 157;
    pub const IFLE: u8 = 158;
    pub const IF_ICMPEQ: u8 = 159;
    pub const IF_ICMPNE: u8 = 160;
    pub const IF_ICMPLT: u8 = 161;
    pub const IF_ICMPGE: u8 = 162;
    pub const IF_ICMPGT: u8 = 163;
    pub const IF_ICMPLE: u8 = 164;
    pub const IF_ACMPEQ: u8 = 165;
    pub const IF_ACMPNE: u8 = 166;
    pub const GOTO: u8 = 167;
    pub const JSR: u8 = 168;
    pub const RET: u8 = 169;
    pub const TABLESWITCH: u8 = 170;
    pub const LOOKUPSWITCH: u8 = 171;
    pub const IRETURN: u8 = 172;
    pub const LRETURN: u8 = 173;
    pub const FRETURN: u8 = 174;
    pub const DRETURN: u8 = 175;
    pub const ARETURN: u8 = 176;
    pub const RETURN: u8 = 177;
    pub const GETSTATIC: u8 = 178;
    pub const PUTSTATIC: u8 = 179;
    pub const GETFIELD: u8 = 180;
    pub const PUTFIELD: u8 = 181;
    pub const INVOKEVIRTUAL: u8 = 182;
    pub const INVOKESPECIAL: u8 = 183;
    pub const INVOKESTATIC: u8 = 184;
    pub const INVOKEINTERFACE: u8 = 185;
    pub const INVOKEDYNAMIC: u8 = 186;
    pub const NEW: u8 = 187;
    pub const NEWARRAY: u8 = 188;
    pub const ANEWARRAY: u8 = 189;
    pub const ARRAYLENGTH: u8 = 190;
    pub const ATHROW: u8 = 191;
    pub const CHECKCAST: u8 = 192;
    pub const INSTANCEOF: u8 = 193;
    pub const MONITORENTER: u8 = 194;
    pub const MONITOREXIT: u8 = 195;
    pub const WIDE: u8 = 196;
    pub const MULTIANEWARRAY: u8 = 197;
    pub const IFNULL: u8 = 198;
    pub const IFNONNULL: u8 = 199;
    pub const GOTO_W: u8 = 200;
    pub const JSR_W: u8 = 201;
}

#[rustfmt::skip]
const MNEMONICS: [&str; 202] = [
    "nop", "aconst_null", "iconst_m1", "iconst_0", "iconst_1", "iconst_2",
    "iconst_3", "iconst_4", "iconst_5", "lconst_0", "lconst_1", "fconst_0",
    "fconst_1", "fconst_2", "dconst_0", "dconst_1", "bipush", "sipush", "ldc",
    "ldc_w", "ldc2_w", "iload", "lload", "fload", "dload", "aload", "iload_0",
    "iload_1", "iload_2", "iload_3", "lload_0", "lload_1", "lload_2",
    "lload_3", "fload_0", "fload_1", "fload_2", "fload_3", "dload_0",
    "dload_1", "dload_2", "dload_3", "aload_0", "aload_1", "aload_2",
    "aload_3", "iaload", "laload", "faload", "daload", "aaload", "baload",
    "caload", "saload", "istore", "lstore", "fstore", "dstore", "astore",
    "istore_0", "istore_1", "istore_2", "istore_3", "lstore_0", "lstore_1",
    "lstore_2", "lstore_3", "fstore_0", "fstore_1", "fstore_2", "fstore_3",
    "dstore_0", "dstore_1", "dstore_2", "dstore_3", "astore_0", "astore_1",
    "astore_2", "astore_3", "iastore", "lastore", "fastore", "dastore",
    "aastore", "bastore", "castore", "sastore", "pop", "pop2", "dup",
    "dup_x1", "dup_x2", "dup2", "dup2_x1", "dup2_x2", "swap", "iadd", "ladd",
    "fadd", "dadd", "isub", "lsub", "fsub", "dsub", "imul", "lmul", "fmul",
    "dmul", "idiv", "ldiv", "fdiv", "ddiv", "irem", "lrem", "frem", "drem",
    "ineg", "lneg", "fneg", "dneg", "ishl", "lshl", "ishr", "lshr", "iushr",
    "lushr", "iand", "land", "ior", "lor", "ixor", "lxor", "iinc", "i2l",
    "i2f", "i2d", "l2i", "l2f", "l2d", "f2i", "f2l", "f2d", "d2i", "d2l",
    "d2f", "i2b", "i2c", "i2s", "lcmp", "fcmpl", "fcmpg", "dcmpl", "dcmpg",
    "ifeq", "ifne", "iflt", "ifge", "ifgt", "ifle", "if_icmpeq", "if_icmpne",
    "if_icmplt", "if_icmpge", "if_icmpgt", "if_icmple", "if_acmpeq",
    "if_acmpne", "goto", "jsr", "ret", "tableswitch", "lookupswitch",
    "ireturn", "lreturn", "freturn", "dreturn", "areturn", "return",
    "getstatic", "putstatic", "getfield", "putfield", "invokevirtual",
    "invokespecial", "invokestatic", "invokeinterface", "invokedynamic",
    "new", "newarray", "anewarray", "arraylength", "athrow", "checkcast",
    "instanceof", "monitorenter", "monitorexit", "wide", "multianewarray",
    "ifnull", "ifnonnull", "goto_w", "jsr_w",
];

/// Mnemonic of an opcode, or `"<unknown>"` outside the documented range
pub fn mnemonic(opcode: u8) -> &'static str {
    MNEMONICS
        .get(opcode as usize)
        .copied()
        .unwrap_or("<unknown>")
}

/// `newarray` operand codes
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-6.html#jvms-6.5.newarray
pub fn base_type_from_array_code(code: u8) -> Option<BaseType> {
    match code {
        4 => Some(BaseType::Boolean),
        5 => Some(BaseType::Char),
        6 => Some(BaseType::Float),
        7 => Some(BaseType::Double),
        8 => Some(BaseType::Byte),
        9 => Some(BaseType::Short),
        10 => Some(BaseType::Int),
        11 => Some(BaseType::Long),
        _ => None,
    }
}

/// Operand code of a primitive type for `newarray`
pub fn array_code_of_base_type(base_type: BaseType) -> u8 {
    match base_type {
        BaseType::Boolean => 4,
        BaseType::Char => 5,
        BaseType::Float => 6,
        BaseType::Double => 7,
        BaseType::Byte => 8,
        BaseType::Short => 9,
        BaseType::Int => 10,
        BaseType::Long => 11,
    }
}

/// Canonical label for a jump target or exception boundary
///
/// Labels are minted by [`crate::code::Code::get_or_create_label`]; the inner
/// id reflects allocation order within one method.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelId(pub(crate) u32);

impl LabelId {
    pub fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for LabelId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_fmt(format_args!("L{}", self.0))
    }
}

/// A loadable constant, as pushed by `ldc`-family instructions or stored as a
/// field initializer
#[derive(Clone, PartialEq, Debug)]
pub enum ConstantValue {
    Integer(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    /// Internal class name or array descriptor
    Class(String),
    MethodHandle(Handle),
    /// Method descriptor string
    MethodType(String),
}

impl ConstantValue {
    /// Does this constant occupy two slots when loaded?
    pub fn is_wide(&self) -> bool {
        matches!(self, ConstantValue::Long(_) | ConstantValue::Double(_))
    }
}

/// A `CONSTANT_MethodHandle` reference
#[derive(Clone, PartialEq, Debug)]
pub struct Handle {
    /// Reference kind tag (`REF_getField` = 1 .. `REF_invokeInterface` = 9)
    pub kind: u8,
    pub owner: String,
    pub name: String,
    pub descriptor: String,
    pub interface: bool,
}

/// Bootstrap method of an `invokedynamic` call site
#[derive(Clone, PartialEq, Debug)]
pub struct BootstrapMethod {
    pub handle: Handle,
    pub arguments: Vec<ConstantValue>,
}

/// One instruction of a method body
///
/// Short encodings collapse into their general form: `iload_2` is
/// `Var { op: ILOAD, index: 2 }`, `ldc_w`/`ldc2_w` are `Ldc`, and the `wide`
/// prefix disappears into 16-bit indices. The serializer picks the narrow
/// encodings back.
///
/// [`Instruction::Label`] and [`Instruction::LineNumber`] are
/// position-preserving pseudo-instructions: they emit no bytecode themselves.
#[derive(Clone, PartialEq, Debug)]
pub enum Instruction {
    /// Zero-operand instruction
    Simple { op: u8 },
    /// `bipush`, `sipush`, `newarray`
    Int { op: u8, operand: i32 },
    /// `ldc` family
    Ldc { constant: ConstantValue },
    /// Load or store of a local variable slot
    Var { op: u8, index: u16 },
    /// `iinc`
    Inc { index: u16, delta: i16 },
    /// Conditional branches, `goto`, `jsr`
    Jump { op: u8, target: LabelId },
    TableSwitch {
        min: i32,
        max: i32,
        default: LabelId,
        targets: Vec<LabelId>,
    },
    LookupSwitch {
        default: LabelId,
        pairs: Vec<(i32, LabelId)>,
    },
    /// `new`, `anewarray`, `checkcast`, `instanceof`
    Type { op: u8, class: ClassRef },
    /// Field access
    Field { op: u8, field: FieldRef },
    /// Method invocation (everything except `invokedynamic`)
    Method {
        op: u8,
        method: MethodRef,
        interface: bool,
    },
    InvokeDynamic {
        name: String,
        descriptor: MethodDescriptor,
        bootstrap: BootstrapMethod,
    },
    MultiANewArray { descriptor: String, dimensions: u8 },
    /// Pseudo-instruction marking a jump target or exception boundary
    Label(LabelId),
    /// Pseudo-instruction carrying debug line info for the code at `start`
    LineNumber { line: u16, start: LabelId },
}

impl Instruction {
    /// The raw opcode, or `-1` for pseudo-instructions
    pub fn opcode(&self) -> i16 {
        match self {
            Instruction::Simple { op }
            | Instruction::Int { op, .. }
            | Instruction::Var { op, .. }
            | Instruction::Jump { op, .. }
            | Instruction::Type { op, .. }
            | Instruction::Field { op, .. }
            | Instruction::Method { op, .. } => *op as i16,
            Instruction::Ldc { .. } => opcodes::LDC as i16,
            Instruction::Inc { .. } => opcodes::IINC as i16,
            Instruction::TableSwitch { .. } => opcodes::TABLESWITCH as i16,
            Instruction::LookupSwitch { .. } => opcodes::LOOKUPSWITCH as i16,
            Instruction::InvokeDynamic { .. } => opcodes::INVOKEDYNAMIC as i16,
            Instruction::MultiANewArray { .. } => opcodes::MULTIANEWARRAY as i16,
            Instruction::Label(_) | Instruction::LineNumber { .. } => -1,
        }
    }

    /// Is this a position-preserving pseudo-instruction?
    pub fn is_pseudo(&self) -> bool {
        matches!(
            self,
            Instruction::Label(_) | Instruction::LineNumber { .. }
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn mnemonics() {
        assert_eq!(mnemonic(opcodes::NOP), "nop");
        assert_eq!(mnemonic(opcodes::ILOAD), "iload");
        assert_eq!(mnemonic(opcodes::TABLESWITCH), "tableswitch");
        assert_eq!(mnemonic(opcodes::JSR_W), "jsr_w");
        assert_eq!(mnemonic(250), "<unknown>");
    }

    #[test]
    fn array_codes() {
        for base_type in [
            BaseType::Boolean,
            BaseType::Char,
            BaseType::Float,
            BaseType::Double,
            BaseType::Byte,
            BaseType::Short,
            BaseType::Int,
            BaseType::Long,
        ] {
            let code = array_code_of_base_type(base_type);
            assert_eq!(base_type_from_array_code(code), Some(base_type));
        }
        assert_eq!(base_type_from_array_code(3), None);
        assert_eq!(base_type_from_array_code(12), None);
    }

    #[test]
    fn pseudo_opcodes() {
        assert_eq!(Instruction::Label(LabelId(0)).opcode(), -1);
        assert_eq!(Instruction::Simple { op: opcodes::NOP }.opcode(), 0);
        assert!(Instruction::Label(LabelId(3)).is_pseudo());
    }
}
