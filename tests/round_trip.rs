//! Round-trip the instruction model through class file bytes and back

use classflow::class_file::write_class;
use classflow::code::opcodes::*;
use classflow::code::{Code, ConstantValue, ExceptionHandler, Handle, Instruction, LabelId};
use classflow::pool::{Class, ClassPool, ClassRef, Field, FieldRef, Method, MethodRef};
use classflow::{
    ClassAccessFlags, Descriptor, FieldAccessFlags, FieldType, MethodAccessFlags, MethodDescriptor,
};

/// Render a method body position-independently: pseudo-instructions are
/// dropped and every label becomes the index of the real instruction it
/// precedes
fn canonical(code: &Code) -> Vec<String> {
    let positions = code.label_positions().unwrap();

    let mut real_index = Vec::with_capacity(code.len());
    let mut count = 0usize;
    for (_, insn) in code.iter() {
        real_index.push(count);
        if !insn.is_pseudo() {
            count += 1;
        }
    }
    let resolve = |label: &LabelId| -> usize {
        let position = positions[label].position();
        real_index.get(position).copied().unwrap_or(count)
    };

    let mut rendered = vec![];
    for (_, insn) in code.iter() {
        match insn {
            Instruction::Label(_) | Instruction::LineNumber { .. } => (),
            Instruction::Jump { op, target } => {
                rendered.push(format!("jump {} -> {}", op, resolve(target)))
            }
            Instruction::TableSwitch {
                min,
                max,
                default,
                targets,
            } => {
                let targets: Vec<usize> = targets.iter().map(|t| resolve(t)).collect();
                rendered.push(format!(
                    "tableswitch {}..{} default {} targets {:?}",
                    min,
                    max,
                    resolve(default),
                    targets
                ));
            }
            Instruction::LookupSwitch { default, pairs } => {
                let pairs: Vec<(i32, usize)> =
                    pairs.iter().map(|(key, t)| (*key, resolve(t))).collect();
                rendered.push(format!(
                    "lookupswitch default {} pairs {:?}",
                    resolve(default),
                    pairs
                ));
            }
            other => rendered.push(format!("{:?}", other)),
        }
    }
    rendered
}

fn canonical_handlers(code: &Code) -> Vec<(usize, usize, usize, Option<String>)> {
    let positions = code.label_positions().unwrap();
    let mut real_index = Vec::with_capacity(code.len());
    let mut count = 0usize;
    for (_, insn) in code.iter() {
        real_index.push(count);
        if !insn.is_pseudo() {
            count += 1;
        }
    }
    let resolve = |label: &LabelId| -> usize {
        let position = positions[label].position();
        real_index.get(position).copied().unwrap_or(count)
    };
    code.handlers
        .iter()
        .map(|handler| {
            (
                resolve(&handler.start),
                resolve(&handler.end),
                resolve(&handler.handler),
                handler.catch_type.as_ref().map(|c| c.name.clone()),
            )
        })
        .collect()
}

fn canonical_lines(code: &Code) -> Vec<(u16, usize)> {
    let positions = code.label_positions().unwrap();
    let mut real_index = Vec::with_capacity(code.len());
    let mut count = 0usize;
    for (_, insn) in code.iter() {
        real_index.push(count);
        if !insn.is_pseudo() {
            count += 1;
        }
    }
    let mut lines = vec![];
    for (_, insn) in code.iter() {
        if let Instruction::LineNumber { line, start } = insn {
            let position = positions[start].position();
            lines.push((*line, real_index.get(position).copied().unwrap_or(count)));
        }
    }
    lines
}

fn sample_class() -> Class {
    let mut class = Class::new(
        "demo/Widget",
        ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER | ClassAccessFlags::ABSTRACT,
        52,
    );
    class.source = Some("Widget.java".to_string());
    class.interfaces = vec![ClassRef::new("java/io/Serializable")];

    let mut counter = Field::new(
        FieldAccessFlags::PRIVATE | FieldAccessFlags::STATIC | FieldAccessFlags::FINAL,
        "SEED",
        FieldType::LONG,
    );
    counter.constant_value = Some(ConstantValue::Long(0x1234_5678_9abc));
    class.fields.push(counter);
    class
        .fields
        .push(Field::new(FieldAccessFlags::PRIVATE, "name", FieldType::object("java/lang/String")));

    // an instance method exercising most operand shapes
    let mut describe = Method::new(
        "demo/Widget",
        MethodAccessFlags::PUBLIC,
        "describe",
        MethodDescriptor::parse("(I)Ljava/lang/String;").unwrap(),
    );
    describe.exceptions = vec![ClassRef::new("java/io/IOException")];
    {
        let code = &mut describe.code;
        let try_start = code.fresh_label();
        let try_end = code.fresh_label();
        let catch = code.fresh_label();
        let small = code.fresh_label();
        let done = code.fresh_label();

        code.push(Instruction::Label(try_start));
        code.push(Instruction::LineNumber {
            line: 17,
            start: try_start,
        });
        code.push(Instruction::Var { op: ALOAD, index: 0 });
        code.push(Instruction::Field {
            op: GETFIELD,
            field: FieldRef::new("demo/Widget", "name", FieldType::object("java/lang/String")),
        });
        code.push(Instruction::Var { op: ASTORE, index: 2 });
        code.push(Instruction::Label(try_end));
        code.push(Instruction::Var { op: ILOAD, index: 1 });
        code.push(Instruction::Int {
            op: BIPUSH,
            operand: 10,
        });
        code.push(Instruction::Jump {
            op: IF_ICMPLT,
            target: small,
        });
        code.push(Instruction::Ldc {
            constant: ConstantValue::String("big".to_string()),
        });
        code.push(Instruction::Jump {
            op: GOTO,
            target: done,
        });
        code.push(Instruction::Label(small));
        code.push(Instruction::Ldc {
            constant: ConstantValue::String("small".to_string()),
        });
        code.push(Instruction::Label(done));
        code.push(Instruction::Simple { op: ARETURN });
        code.push(Instruction::Label(catch));
        code.push(Instruction::Simple { op: POP });
        code.push(Instruction::Ldc {
            constant: ConstantValue::String("?".to_string()),
        });
        code.push(Instruction::Simple { op: ARETURN });
        code.handlers.push(ExceptionHandler {
            start: try_start,
            end: try_end,
            handler: catch,
            catch_type: Some(ClassRef::new("java/lang/RuntimeException")),
        });
        code.max_stack = 2;
        code.max_locals = 3;
    }
    class.methods.push(describe);

    // a static method exercising wide encodings, switches, and arrays
    let mut crunch = Method::new(
        "demo/Widget",
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        "crunch",
        MethodDescriptor::parse("(I)[Ljava/lang/Object;").unwrap(),
    );
    {
        let code = &mut crunch.code;
        let case_a = code.fresh_label();
        let fallback = code.fresh_label();

        code.push(Instruction::Var { op: ILOAD, index: 0 });
        code.push(Instruction::Var {
            op: ISTORE,
            index: 300,
        });
        code.push(Instruction::Inc {
            index: 300,
            delta: -200,
        });
        code.push(Instruction::Var {
            op: ILOAD,
            index: 300,
        });
        code.push(Instruction::LookupSwitch {
            default: fallback,
            pairs: vec![(-1, case_a), (7, case_a)],
        });
        code.push(Instruction::Label(case_a));
        code.push(Instruction::Ldc {
            constant: ConstantValue::Double(2.5),
        });
        code.push(Instruction::Simple { op: POP2 });
        code.push(Instruction::Label(fallback));
        code.push(Instruction::Int {
            op: SIPUSH,
            operand: 300,
        });
        code.push(Instruction::Type {
            op: ANEWARRAY,
            class: ClassRef::new("java/lang/Object"),
        });
        code.push(Instruction::Simple { op: ARETURN });
        code.max_stack = 2;
        code.max_locals = 302;
    }
    class.methods.push(crunch);

    // an invokedynamic call site with its bootstrap method
    let mut lambda = Method::new(
        "demo/Widget",
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        "supplier",
        MethodDescriptor::parse("()Ljava/lang/Runnable;").unwrap(),
    );
    {
        let code = &mut lambda.code;
        code.push(Instruction::InvokeDynamic {
            name: "run".to_string(),
            descriptor: MethodDescriptor::parse("()Ljava/lang/Runnable;").unwrap(),
            bootstrap: classflow::code::BootstrapMethod {
                handle: Handle {
                    kind: 6,
                    owner: "java/lang/invoke/LambdaMetafactory".to_string(),
                    name: "metafactory".to_string(),
                    descriptor: "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodHandle;Ljava/lang/invoke/MethodType;)Ljava/lang/invoke/CallSite;".to_string(),
                    interface: false,
                },
                arguments: vec![
                    ConstantValue::MethodType("()V".to_string()),
                    ConstantValue::MethodHandle(Handle {
                        kind: 6,
                        owner: "demo/Widget".to_string(),
                        name: "lambda$supplier$0".to_string(),
                        descriptor: "()V".to_string(),
                        interface: false,
                    }),
                    ConstantValue::MethodType("()V".to_string()),
                ],
            },
        });
        code.push(Instruction::Simple { op: ARETURN });
        code.max_stack = 1;
        code.max_locals = 0;
    }
    class.methods.push(lambda);

    // an abstract method carries no code
    let ponder = Method::new(
        "demo/Widget",
        MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT,
        "ponder",
        MethodDescriptor::parse("()V").unwrap(),
    );
    class.methods.push(ponder);

    // a constructor touching objects and calls
    let mut init = Method::new(
        "demo/Widget",
        MethodAccessFlags::PUBLIC,
        "<init>",
        MethodDescriptor::parse("(Ljava/lang/String;)V").unwrap(),
    );
    {
        let code = &mut init.code;
        code.push(Instruction::Var { op: ALOAD, index: 0 });
        code.push(Instruction::Method {
            op: INVOKESPECIAL,
            method: MethodRef::new(
                "java/lang/Object",
                "<init>",
                MethodDescriptor::parse("()V").unwrap(),
            ),
            interface: false,
        });
        code.push(Instruction::Var { op: ALOAD, index: 0 });
        code.push(Instruction::Var { op: ALOAD, index: 1 });
        code.push(Instruction::Field {
            op: PUTFIELD,
            field: FieldRef::new("demo/Widget", "name", FieldType::object("java/lang/String")),
        });
        code.push(Instruction::Simple { op: RETURN });
        code.max_stack = 2;
        code.max_locals = 2;
    }
    class.methods.push(init);

    class
}

#[test]
fn model_survives_serialization() {
    let original = sample_class();
    let bytes = write_class(&original).unwrap();

    let mut pool = ClassPool::new();
    let id = pool.add(&bytes).unwrap();
    let parsed = pool.class(id).unwrap();

    assert_eq!(parsed.name, original.name);
    assert_eq!(parsed.access, original.access);
    assert_eq!(parsed.major, original.major);
    assert_eq!(parsed.source, original.source);
    assert_eq!(
        parsed.superclass.as_ref().map(|c| c.name.as_str()),
        Some("java/lang/Object")
    );
    assert_eq!(parsed.interfaces, original.interfaces);

    assert_eq!(parsed.fields.len(), original.fields.len());
    for (parsed_field, original_field) in parsed.fields.iter().zip(&original.fields) {
        assert_eq!(parsed_field, original_field);
    }

    assert_eq!(parsed.methods.len(), original.methods.len());
    for (parsed_method, original_method) in parsed.methods.iter().zip(&original.methods) {
        assert_eq!(parsed_method.name, original_method.name);
        assert_eq!(parsed_method.access, original_method.access);
        assert_eq!(
            parsed_method.descriptor_string(),
            original_method.descriptor_string()
        );
        assert_eq!(parsed_method.exceptions, original_method.exceptions);
        assert_eq!(parsed_method.owner, "demo/Widget");

        // declared capacities survive exactly
        assert_eq!(parsed_method.code.max_stack, original_method.code.max_stack);
        assert_eq!(
            parsed_method.code.max_locals,
            original_method.code.max_locals
        );

        assert_eq!(canonical(&parsed_method.code), canonical(&original_method.code));
        assert_eq!(
            canonical_handlers(&parsed_method.code),
            canonical_handlers(&original_method.code)
        );
        assert_eq!(
            canonical_lines(&parsed_method.code),
            canonical_lines(&original_method.code)
        );
    }
}

#[test]
fn second_generation_bytes_are_a_fixed_point() {
    let original = sample_class();
    let first = write_class(&original).unwrap();

    let mut pool = ClassPool::new();
    let id = pool.add(&first).unwrap();
    let second = write_class(pool.class(id).unwrap()).unwrap();

    let mut pool = ClassPool::new();
    let id = pool.add(&second).unwrap();
    let third = write_class(pool.class(id).unwrap()).unwrap();

    assert_eq!(second, third);
}

#[test]
fn navigation_matches_positions_after_parsing() {
    let original = sample_class();
    let bytes = write_class(&original).unwrap();
    let mut pool = ClassPool::new();
    let id = pool.add(&bytes).unwrap();
    let parsed = pool.class(id).unwrap();

    for method in &parsed.methods {
        let code = &method.code;
        for (id, insn) in code.iter() {
            assert_eq!(code.get(id), Some(insn));
            if let Some(prev) = code.prev(id) {
                assert_eq!(code.next(prev), Some(id));
            }
            if let Some(next) = code.next(id) {
                assert_eq!(code.prev(next), Some(id));
            }
        }
    }
}
