//! End to end: bytes into the pool, hierarchy init, analysis of a parsed
//! method

use classflow::analysis::{FrameKind, MethodAnalyzer, Value};
use classflow::class_file::write_class;
use classflow::code::opcodes::*;
use classflow::code::Instruction;
use classflow::pool::{Class, ClassPool, ClassRef, Method};
use classflow::{ClassAccessFlags, Descriptor, MethodAccessFlags, MethodDescriptor};

fn class_with_scale() -> Class {
    let mut class = Class::new(
        "demo/Scale",
        ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
        52,
    );
    class.superclass = Some(ClassRef::new("demo/Base"));

    let mut scale = Method::new(
        "demo/Scale",
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        "scale",
        MethodDescriptor::parse("(JI)J").unwrap(),
    );
    {
        let code = &mut scale.code;
        code.push(Instruction::Var { op: LLOAD, index: 0 });
        code.push(Instruction::Var { op: ILOAD, index: 2 });
        code.push(Instruction::Simple { op: I2L });
        code.push(Instruction::Simple { op: LMUL });
        code.push(Instruction::Simple { op: LRETURN });
        code.max_stack = 4;
        code.max_locals = 3;
    }
    class.methods.push(scale);
    class
}

#[test]
fn parsed_methods_analyze() {
    let bytes = write_class(&class_with_scale()).unwrap();

    let mut pool = ClassPool::new();
    let base = Class::new("demo/Base", ClassAccessFlags::PUBLIC, 52);
    let base_id = pool.add_class(base).unwrap();
    let scale_id = pool.add(&bytes).unwrap();
    pool.init();

    // hierarchy links resolved during init
    assert_eq!(pool.class(base_id).unwrap().children, vec![scale_id]);
    assert_eq!(
        pool.common_super_class("demo/Scale", "demo/Base"),
        "demo/Base"
    );

    let class = pool.class(scale_id).unwrap();
    let method = class
        .method("scale", &MethodDescriptor::parse("(JI)J").unwrap())
        .unwrap();
    let result = MethodAnalyzer::analyze(method).unwrap();

    // long argument + int argument + conversion + multiply
    assert_eq!(result.max_stack, 4);
    assert_eq!(result.max_locals, 3);

    let (multiply_id, multiply) = result
        .frames()
        .find(|(_, frame)| frame.opcode == LMUL as i16)
        .unwrap();
    assert_eq!(multiply.kind, FrameKind::Math);
    assert_eq!(multiply.stack, vec![Value::Long, Value::Top]);
    assert_eq!(multiply.writes.len(), 2);
    assert!(!result.is_constant(multiply_id));
}
