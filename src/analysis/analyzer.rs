use crate::analysis::{Frame, FrameId, FrameKind, LocalTable, OperandStack, Slot, Value};
use crate::code::opcodes::*;
use crate::code::{base_type_from_array_code, ConstantValue, InsnId, Instruction, LabelId};
use crate::descriptors::{Descriptor, FieldType, Width};
use crate::errors::Error;
use crate::pool::Method;
use std::collections::{HashMap, HashSet};

/// Everything one analysis run produced: the frame arena, the per-instruction
/// frame lists, and the observed stack/local maxima
///
/// One instruction gets one frame per *reach*: every distinct control-flow
/// path that arrives at it records its own symbolic state, in exploration
/// order.
#[derive(Default)]
pub struct AnalyzerResult {
    frames: Vec<Frame>,
    by_insn: HashMap<usize, Vec<FrameId>>,
    pub max_stack: u16,
    pub max_locals: u16,
}

impl AnalyzerResult {
    pub fn frame(&self, id: FrameId) -> &Frame {
        &self.frames[id.0]
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// All frames, in creation order
    pub fn frames(&self) -> impl Iterator<Item = (FrameId, &Frame)> {
        self.frames
            .iter()
            .enumerate()
            .map(|(index, frame)| (FrameId(index), frame))
    }

    /// Frames recorded for one instruction, in exploration order
    pub fn frames_at(&self, insn: InsnId) -> &[FrameId] {
        self.by_insn
            .get(&insn.0)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Is the value this frame produced derivable purely from compile-time
    /// constants through side-effect-free operations?
    ///
    /// Memoized; a frame that depends on itself through a loop is not
    /// constant.
    pub fn is_constant(&self, id: FrameId) -> bool {
        if let Some(known) = self.frames[id.0].constant.get() {
            return known;
        }

        let mut visiting: HashSet<FrameId> = HashSet::new();
        let mut work: Vec<(FrameId, bool)> = vec![(id, false)];
        while let Some((frame_id, expanded)) = work.pop() {
            let frame = &self.frames[frame_id.0];
            if frame.constant.get().is_some() {
                continue;
            }
            if expanded {
                visiting.remove(&frame_id);
                let all_constant = frame
                    .writes
                    .iter()
                    .all(|write| self.frames[write.0].constant.get().unwrap_or(false));
                frame.constant.set(Some(all_constant));
                continue;
            }
            if frame.kind.is_constant_source() {
                frame.constant.set(Some(true));
                continue;
            }
            if !frame.kind.is_value_pure() || frame.writes.is_empty() {
                frame.constant.set(Some(false));
                continue;
            }
            if !visiting.insert(frame_id) {
                // reached through its own dependency cycle
                frame.constant.set(Some(false));
                continue;
            }
            work.push((frame_id, true));
            for write in &frame.writes {
                if self.frames[write.0].constant.get().is_none() {
                    work.push((*write, false));
                }
            }
        }

        self.frames[id.0].constant.get().unwrap_or(false)
    }

    fn reserve(&self) -> FrameId {
        FrameId(self.frames.len())
    }

    fn record(
        &mut self,
        position: usize,
        mut frame: Frame,
        consumed: Vec<Option<FrameId>>,
        stack: &OperandStack,
        locals: &LocalTable,
    ) -> FrameId {
        let id = self.reserve();
        // consumed slots arrive in pop order; writes keep stack order
        for producer in consumed.iter().rev().flatten() {
            frame.writes.push(*producer);
            self.frames[producer.0].reads.push(id);
        }
        frame.stack = stack.snapshot();
        frame.locals = locals.snapshot();
        self.frames.push(frame);
        self.by_insn.entry(position).or_default().push(id);
        self.max_stack = self.max_stack.max(stack.len() as u16);
        self.max_locals = self.max_locals.max(locals.len() as u16);
        id
    }
}

/// What an executed instruction does to control flow
enum Flow {
    /// Fall through to the next instruction
    Continue,
    /// Return or throw: this path is done
    Stop,
    /// Transfer to the labels (plus fallthrough for conditionals)
    Branch {
        targets: Vec<LabelId>,
        fallthrough: bool,
    },
}

/// The abstract interpreter
///
/// Walks every reachable instruction of a method along all control-flow
/// edges, maintaining a symbolic [`OperandStack`] and [`LocalTable`], and
/// emits one [`Frame`] per reach wired into the producer/consumer graph.
pub struct MethodAnalyzer;

impl MethodAnalyzer {
    /// Analyze one method
    ///
    /// Abstract and native methods produce an empty result. Structural
    /// failures abort the analysis of this method only; no partial frames
    /// survive an error.
    pub fn analyze(method: &Method) -> Result<AnalyzerResult, Error> {
        let mut result = AnalyzerResult::default();
        if method.is_abstract() || method.is_native() {
            return Ok(result);
        }
        let code = &method.code;

        // Refuse subroutines before touching any state, so a method using
        // them never yields partial frames
        for (_, insn) in code.iter() {
            match insn {
                Instruction::Jump { op: JSR, .. } => return Err(Error::UnsupportedOpcode(JSR)),
                Instruction::Var { op: RET, .. } => return Err(Error::UnsupportedOpcode(RET)),
                _ => (),
            }
        }

        let first = code.first().ok_or(Error::FallOffEnd)?;
        let label_positions = code.label_positions()?;

        // Which exception table entries protect each instruction, in table
        // order
        let mut protectors: Vec<Vec<usize>> = vec![vec![]; code.len()];
        for (index, handler) in code.handlers.iter().enumerate() {
            let start = label_positions[&handler.start].position();
            let end = label_positions[&handler.end].position().min(code.len());
            for covered in &mut protectors[start..end.max(start)] {
                covered.push(index);
            }
        }

        // Seed the local variable table from the receiver and arguments
        let mut locals = LocalTable::new();
        if !method.is_static() {
            let id = result.reserve();
            result.frames.push(Frame::new(-1, FrameKind::Argument { index: 0 }));
            let mut slot = Slot::new(Value::UninitializedThis(method.owner.clone()), Some(id));
            slot.is_this = true;
            locals.push(slot);
        }
        for parameter in &method.descriptor.parameters {
            let index = locals.len() as u16;
            let id = result.reserve();
            result
                .frames
                .push(Frame::new(-1, FrameKind::Argument { index }));
            let slot = Slot::new(Value::of(parameter), Some(id));
            if parameter.width() == 2 {
                let marker = Slot::top(slot.producer);
                locals.push(slot);
                locals.push(marker);
            } else {
                locals.push(slot);
            }
        }

        let edge_budget = code.len() * code.len() + code.len() + 64;
        let mut visited: HashSet<(usize, usize)> = HashSet::new();
        let mut worklist: Vec<(usize, OperandStack, LocalTable)> =
            vec![(first.position(), OperandStack::new(), locals)];

        while let Some((mut position, mut stack, mut locals)) = worklist.pop() {
            loop {
                if worklist.len() > edge_budget {
                    log::error!(
                        "analysis of {}.{}{} exhausted its budget",
                        method.owner,
                        method.name,
                        method.descriptor_string()
                    );
                    return Err(Error::AnalysisFailed {
                        method: format!("{}.{}", method.owner, method.name),
                        max_stack: code.max_stack,
                    });
                }

                let insn = code.get(InsnId(position)).ok_or(Error::FallOffEnd)?;
                let flow = execute_insn(insn, position, &mut stack, &mut locals, &mut result)?;

                // Exception edges out of this instruction
                for &index in &protectors[position] {
                    let handler = &code.handlers[index];
                    let target = label_positions[&handler.handler].position();
                    if visited.insert((position, target)) {
                        let caught = handler
                            .catch_type
                            .as_ref()
                            .map(|class| class.name.clone())
                            .unwrap_or_else(|| "java/lang/Throwable".to_string());
                        let mut handler_stack = OperandStack::new();
                        handler_stack.push(Slot::new(Value::Object(caught), None));
                        worklist.push((target, handler_stack, locals.clone()));
                    }
                }

                match flow {
                    Flow::Stop => break,
                    Flow::Continue => {
                        if position + 1 >= code.len() {
                            return Err(Error::FallOffEnd);
                        }
                        position += 1;
                    }
                    Flow::Branch {
                        targets,
                        fallthrough,
                    } => {
                        let mut successors: Vec<usize> = vec![];
                        for target in targets {
                            successors.push(label_positions[&target].position());
                        }
                        if fallthrough {
                            if position + 1 >= code.len() {
                                return Err(Error::FallOffEnd);
                            }
                            successors.push(position + 1);
                        }
                        let new_edges: Vec<usize> = successors
                            .into_iter()
                            .filter(|target| visited.insert((position, *target)))
                            .collect();
                        for &target in new_edges.iter().rev() {
                            worklist.push((target, stack.clone(), locals.clone()));
                        }
                        break;
                    }
                }
            }
        }

        Ok(result)
    }
}

/// Copy of a slot with this frame as the new producer
fn reproduce(slot: &Slot, id: FrameId) -> Slot {
    Slot {
        value: slot.value.clone(),
        producer: Some(id),
        is_this: slot.is_this,
        initialized: slot.initialized,
    }
}

/// Element type pushed by `aaload` given the array's descriptor
fn array_element(descriptor: &str) -> Value {
    let element = match descriptor.strip_prefix('[') {
        Some(element) => element,
        None => return Value::Object("java/lang/Object".to_string()),
    };
    if let Some(name) = element.strip_prefix('L').and_then(|e| e.strip_suffix(';')) {
        Value::Object(name.to_string())
    } else if element.starts_with('[') {
        Value::Object(element.to_string())
    } else {
        Value::Object("java/lang/Object".to_string())
    }
}

/// Array descriptor pushed by `anewarray` for the given element class
fn array_of(class_name: &str) -> String {
    if class_name.starts_with('[') {
        format!("[{}", class_name)
    } else {
        format!("[L{};", class_name)
    }
}

/// Execute one instruction against the symbolic state, recording its frame
fn execute_insn(
    insn: &Instruction,
    position: usize,
    stack: &mut OperandStack,
    locals: &mut LocalTable,
    result: &mut AnalyzerResult,
) -> Result<Flow, Error> {
    if insn.is_pseudo() {
        return Ok(Flow::Continue);
    }

    let opcode = insn.opcode();
    let op = opcode as u8;
    let id = result.reserve();
    let mut consumed: Vec<Option<FrameId>> = vec![];
    let mut flow = Flow::Continue;

    let kind = match insn {
        Instruction::Simple { .. } => match op {
            NOP => FrameKind::Nop,
            ACONST_NULL => {
                stack.push(Slot::new(Value::Null, Some(id)));
                FrameKind::Ldc
            }
            ICONST_M1..=ICONST_5 => {
                stack.push(Slot::new(Value::Integer, Some(id)));
                FrameKind::Ldc
            }
            LCONST_0 | LCONST_1 => {
                stack.push_wide(Slot::new(Value::Long, Some(id)));
                FrameKind::Ldc
            }
            FCONST_0..=FCONST_2 => {
                stack.push(Slot::new(Value::Float, Some(id)));
                FrameKind::Ldc
            }
            DCONST_0 | DCONST_1 => {
                stack.push_wide(Slot::new(Value::Double, Some(id)));
                FrameKind::Ldc
            }

            IALOAD | BALOAD | CALOAD | SALOAD => {
                let index = stack.pop(op)?;
                let array = stack.pop(op)?;
                consumed.push(index.producer);
                consumed.push(array.producer);
                stack.push(Slot::new(Value::Integer, Some(id)));
                FrameKind::ArrayLoad
            }
            LALOAD => {
                let index = stack.pop(op)?;
                let array = stack.pop(op)?;
                consumed.push(index.producer);
                consumed.push(array.producer);
                stack.push_wide(Slot::new(Value::Long, Some(id)));
                FrameKind::ArrayLoad
            }
            FALOAD => {
                let index = stack.pop(op)?;
                let array = stack.pop(op)?;
                consumed.push(index.producer);
                consumed.push(array.producer);
                stack.push(Slot::new(Value::Float, Some(id)));
                FrameKind::ArrayLoad
            }
            DALOAD => {
                let index = stack.pop(op)?;
                let array = stack.pop(op)?;
                consumed.push(index.producer);
                consumed.push(array.producer);
                stack.push_wide(Slot::new(Value::Double, Some(id)));
                FrameKind::ArrayLoad
            }
            AALOAD => {
                let index = stack.pop(op)?;
                let array = stack.pop(op)?;
                consumed.push(index.producer);
                consumed.push(array.producer);
                let element = match &array.value {
                    Value::Object(descriptor) => array_element(descriptor),
                    _ => Value::Object("java/lang/Object".to_string()),
                };
                stack.push(Slot::new(element, Some(id)));
                FrameKind::ArrayLoad
            }

            IASTORE | FASTORE | AASTORE | BASTORE | CASTORE | SASTORE => {
                let value = stack.pop(op)?;
                let index = stack.pop(op)?;
                let array = stack.pop(op)?;
                consumed.push(value.producer);
                consumed.push(index.producer);
                consumed.push(array.producer);
                FrameKind::ArrayStore
            }
            LASTORE | DASTORE => {
                let value = stack.pop_wide(op)?;
                let index = stack.pop(op)?;
                let array = stack.pop(op)?;
                consumed.push(value.producer);
                consumed.push(index.producer);
                consumed.push(array.producer);
                FrameKind::ArrayStore
            }

            POP => {
                let slot = stack.pop(op)?;
                consumed.push(slot.producer);
                FrameKind::Pop
            }
            POP2 => {
                if stack.top_is_wide() {
                    let slot = stack.pop_wide(op)?;
                    consumed.push(slot.producer);
                } else {
                    let first = stack.pop(op)?;
                    let second = stack.pop(op)?;
                    consumed.push(first.producer);
                    consumed.push(second.producer);
                }
                FrameKind::Pop
            }

            DUP => {
                let slot = stack.pop(op)?;
                consumed.push(slot.producer);
                stack.push(reproduce(&slot, id));
                stack.push(reproduce(&slot, id));
                FrameKind::Dup
            }
            DUP_X1 => {
                let first = stack.pop(op)?;
                let second = stack.pop(op)?;
                consumed.push(first.producer);
                consumed.push(second.producer);
                stack.push(reproduce(&first, id));
                stack.push(reproduce(&second, id));
                stack.push(reproduce(&first, id));
                FrameKind::Dup
            }
            DUP_X2 => {
                let first = stack.pop(op)?;
                consumed.push(first.producer);
                if stack.top_is_wide() {
                    let second = stack.pop_wide(op)?;
                    consumed.push(second.producer);
                    stack.push(reproduce(&first, id));
                    stack.push_wide(reproduce(&second, id));
                    stack.push(reproduce(&first, id));
                } else {
                    let second = stack.pop(op)?;
                    let third = stack.pop(op)?;
                    consumed.push(second.producer);
                    consumed.push(third.producer);
                    stack.push(reproduce(&first, id));
                    stack.push(reproduce(&third, id));
                    stack.push(reproduce(&second, id));
                    stack.push(reproduce(&first, id));
                }
                FrameKind::Dup
            }
            DUP2 => {
                if stack.top_is_wide() {
                    let slot = stack.pop_wide(op)?;
                    consumed.push(slot.producer);
                    stack.push_wide(reproduce(&slot, id));
                    stack.push_wide(reproduce(&slot, id));
                } else {
                    let first = stack.pop(op)?;
                    let second = stack.pop(op)?;
                    consumed.push(first.producer);
                    consumed.push(second.producer);
                    stack.push(reproduce(&second, id));
                    stack.push(reproduce(&first, id));
                    stack.push(reproduce(&second, id));
                    stack.push(reproduce(&first, id));
                }
                FrameKind::Dup
            }
            DUP2_X1 => {
                if stack.top_is_wide() {
                    let first = stack.pop_wide(op)?;
                    let second = stack.pop(op)?;
                    consumed.push(first.producer);
                    consumed.push(second.producer);
                    stack.push_wide(reproduce(&first, id));
                    stack.push(reproduce(&second, id));
                    stack.push_wide(reproduce(&first, id));
                } else {
                    let first = stack.pop(op)?;
                    let second = stack.pop(op)?;
                    let third = stack.pop(op)?;
                    consumed.push(first.producer);
                    consumed.push(second.producer);
                    consumed.push(third.producer);
                    stack.push(reproduce(&second, id));
                    stack.push(reproduce(&first, id));
                    stack.push(reproduce(&third, id));
                    stack.push(reproduce(&second, id));
                    stack.push(reproduce(&first, id));
                }
                FrameKind::Dup
            }
            DUP2_X2 => {
                if stack.top_is_wide() {
                    let first = stack.pop_wide(op)?;
                    consumed.push(first.producer);
                    if stack.top_is_wide() {
                        let second = stack.pop_wide(op)?;
                        consumed.push(second.producer);
                        stack.push_wide(reproduce(&first, id));
                        stack.push_wide(reproduce(&second, id));
                        stack.push_wide(reproduce(&first, id));
                    } else {
                        let second = stack.pop(op)?;
                        let third = stack.pop(op)?;
                        consumed.push(second.producer);
                        consumed.push(third.producer);
                        stack.push_wide(reproduce(&first, id));
                        stack.push(reproduce(&third, id));
                        stack.push(reproduce(&second, id));
                        stack.push_wide(reproduce(&first, id));
                    }
                } else {
                    let first = stack.pop(op)?;
                    let second = stack.pop(op)?;
                    consumed.push(first.producer);
                    consumed.push(second.producer);
                    if stack.top_is_wide() {
                        let third = stack.pop_wide(op)?;
                        consumed.push(third.producer);
                        stack.push(reproduce(&second, id));
                        stack.push(reproduce(&first, id));
                        stack.push_wide(reproduce(&third, id));
                        stack.push(reproduce(&second, id));
                        stack.push(reproduce(&first, id));
                    } else {
                        let third = stack.pop(op)?;
                        let fourth = stack.pop(op)?;
                        consumed.push(third.producer);
                        consumed.push(fourth.producer);
                        stack.push(reproduce(&second, id));
                        stack.push(reproduce(&first, id));
                        stack.push(reproduce(&fourth, id));
                        stack.push(reproduce(&third, id));
                        stack.push(reproduce(&second, id));
                        stack.push(reproduce(&first, id));
                    }
                }
                FrameKind::Dup
            }
            SWAP => {
                let first = stack.pop(op)?;
                let second = stack.pop(op)?;
                consumed.push(first.producer);
                consumed.push(second.producer);
                stack.push(reproduce(&first, id));
                stack.push(reproduce(&second, id));
                FrameKind::Swap
            }

            IADD | ISUB | IMUL | IDIV | IREM | ISHL | ISHR | IUSHR | IAND | IOR | IXOR => {
                let right = stack.pop(op)?;
                let left = stack.pop(op)?;
                consumed.push(right.producer);
                consumed.push(left.producer);
                stack.push(Slot::new(Value::Integer, Some(id)));
                FrameKind::Math
            }
            LADD | LSUB | LMUL | LDIV | LREM | LAND | LOR | LXOR => {
                let right = stack.pop_wide(op)?;
                let left = stack.pop_wide(op)?;
                consumed.push(right.producer);
                consumed.push(left.producer);
                stack.push_wide(Slot::new(Value::Long, Some(id)));
                FrameKind::Math
            }
            LSHL | LSHR | LUSHR => {
                let shift = stack.pop(op)?;
                let value = stack.pop_wide(op)?;
                consumed.push(shift.producer);
                consumed.push(value.producer);
                stack.push_wide(Slot::new(Value::Long, Some(id)));
                FrameKind::Math
            }
            FADD | FSUB | FMUL | FDIV | FREM => {
                let right = stack.pop(op)?;
                let left = stack.pop(op)?;
                consumed.push(right.producer);
                consumed.push(left.producer);
                stack.push(Slot::new(Value::Float, Some(id)));
                FrameKind::Math
            }
            DADD | DSUB | DMUL | DDIV | DREM => {
                let right = stack.pop_wide(op)?;
                let left = stack.pop_wide(op)?;
                consumed.push(right.producer);
                consumed.push(left.producer);
                stack.push_wide(Slot::new(Value::Double, Some(id)));
                FrameKind::Math
            }
            INEG => {
                let slot = stack.pop(op)?;
                consumed.push(slot.producer);
                stack.push(Slot::new(Value::Integer, Some(id)));
                FrameKind::Math
            }
            LNEG => {
                let slot = stack.pop_wide(op)?;
                consumed.push(slot.producer);
                stack.push_wide(Slot::new(Value::Long, Some(id)));
                FrameKind::Math
            }
            FNEG => {
                let slot = stack.pop(op)?;
                consumed.push(slot.producer);
                stack.push(Slot::new(Value::Float, Some(id)));
                FrameKind::Math
            }
            DNEG => {
                let slot = stack.pop_wide(op)?;
                consumed.push(slot.producer);
                stack.push_wide(Slot::new(Value::Double, Some(id)));
                FrameKind::Math
            }

            I2L => {
                let slot = stack.pop(op)?;
                consumed.push(slot.producer);
                stack.push_wide(Slot::new(Value::Long, Some(id)));
                FrameKind::Math
            }
            I2F => {
                let slot = stack.pop(op)?;
                consumed.push(slot.producer);
                stack.push(Slot::new(Value::Float, Some(id)));
                FrameKind::Math
            }
            I2D => {
                let slot = stack.pop(op)?;
                consumed.push(slot.producer);
                stack.push_wide(Slot::new(Value::Double, Some(id)));
                FrameKind::Math
            }
            L2I => {
                let slot = stack.pop_wide(op)?;
                consumed.push(slot.producer);
                stack.push(Slot::new(Value::Integer, Some(id)));
                FrameKind::Math
            }
            L2F => {
                let slot = stack.pop_wide(op)?;
                consumed.push(slot.producer);
                stack.push(Slot::new(Value::Float, Some(id)));
                FrameKind::Math
            }
            L2D => {
                let slot = stack.pop_wide(op)?;
                consumed.push(slot.producer);
                stack.push_wide(Slot::new(Value::Double, Some(id)));
                FrameKind::Math
            }
            F2I => {
                let slot = stack.pop(op)?;
                consumed.push(slot.producer);
                stack.push(Slot::new(Value::Integer, Some(id)));
                FrameKind::Math
            }
            F2L => {
                let slot = stack.pop(op)?;
                consumed.push(slot.producer);
                stack.push_wide(Slot::new(Value::Long, Some(id)));
                FrameKind::Math
            }
            F2D => {
                let slot = stack.pop(op)?;
                consumed.push(slot.producer);
                stack.push_wide(Slot::new(Value::Double, Some(id)));
                FrameKind::Math
            }
            D2I => {
                let slot = stack.pop_wide(op)?;
                consumed.push(slot.producer);
                stack.push(Slot::new(Value::Integer, Some(id)));
                FrameKind::Math
            }
            D2L => {
                let slot = stack.pop_wide(op)?;
                consumed.push(slot.producer);
                stack.push_wide(Slot::new(Value::Long, Some(id)));
                FrameKind::Math
            }
            D2F => {
                let slot = stack.pop_wide(op)?;
                consumed.push(slot.producer);
                stack.push(Slot::new(Value::Float, Some(id)));
                FrameKind::Math
            }
            I2B | I2C | I2S => {
                let slot = stack.pop(op)?;
                consumed.push(slot.producer);
                stack.push(Slot::new(Value::Integer, Some(id)));
                FrameKind::Math
            }

            LCMP => {
                let right = stack.pop_wide(op)?;
                let left = stack.pop_wide(op)?;
                consumed.push(right.producer);
                consumed.push(left.producer);
                stack.push(Slot::new(Value::Integer, Some(id)));
                FrameKind::Math
            }
            FCMPL | FCMPG => {
                let right = stack.pop(op)?;
                let left = stack.pop(op)?;
                consumed.push(right.producer);
                consumed.push(left.producer);
                stack.push(Slot::new(Value::Integer, Some(id)));
                FrameKind::Math
            }
            DCMPL | DCMPG => {
                let right = stack.pop_wide(op)?;
                let left = stack.pop_wide(op)?;
                consumed.push(right.producer);
                consumed.push(left.producer);
                stack.push(Slot::new(Value::Integer, Some(id)));
                FrameKind::Math
            }

            IRETURN | FRETURN | ARETURN => {
                let slot = stack.pop(op)?;
                consumed.push(slot.producer);
                flow = Flow::Stop;
                FrameKind::Return
            }
            LRETURN | DRETURN => {
                let slot = stack.pop_wide(op)?;
                consumed.push(slot.producer);
                flow = Flow::Stop;
                FrameKind::Return
            }
            RETURN => {
                flow = Flow::Stop;
                FrameKind::Return
            }

            ARRAYLENGTH => {
                let array = stack.pop(op)?;
                consumed.push(array.producer);
                stack.push(Slot::new(Value::Integer, Some(id)));
                FrameKind::ArrayLength
            }
            ATHROW => {
                let throwable = stack.pop(op)?;
                consumed.push(throwable.producer);
                flow = Flow::Stop;
                FrameKind::Throw
            }
            MONITORENTER | MONITOREXIT => {
                let object = stack.pop(op)?;
                consumed.push(object.producer);
                FrameKind::Monitor
            }

            other => return Err(Error::UnknownOpcode(other)),
        },

        Instruction::Int { operand, .. } => match op {
            BIPUSH | SIPUSH => {
                stack.push(Slot::new(Value::Integer, Some(id)));
                FrameKind::Ldc
            }
            NEWARRAY => {
                let base = base_type_from_array_code(*operand as u8).ok_or_else(|| {
                    Error::MalformedCode(format!("invalid newarray type code {}", operand))
                })?;
                let length = stack.pop(op)?;
                consumed.push(length.producer);
                let descriptor = FieldType::array(FieldType::Base(base)).render();
                stack.push(Slot::new(Value::Object(descriptor), Some(id)));
                FrameKind::NewArray
            }
            other => return Err(Error::UnknownOpcode(other)),
        },

        Instruction::Ldc { constant } => {
            match constant {
                ConstantValue::Integer(_) => stack.push(Slot::new(Value::Integer, Some(id))),
                ConstantValue::Float(_) => stack.push(Slot::new(Value::Float, Some(id))),
                ConstantValue::Long(_) => stack.push_wide(Slot::new(Value::Long, Some(id))),
                ConstantValue::Double(_) => stack.push_wide(Slot::new(Value::Double, Some(id))),
                ConstantValue::String(_) => stack.push(Slot::new(
                    Value::Object("java/lang/String".to_string()),
                    Some(id),
                )),
                ConstantValue::Class(_) => stack.push(Slot::new(
                    Value::Object("java/lang/Class".to_string()),
                    Some(id),
                )),
                ConstantValue::MethodHandle(_) => stack.push(Slot::new(
                    Value::Object("java/lang/invoke/MethodHandle".to_string()),
                    Some(id),
                )),
                ConstantValue::MethodType(_) => stack.push(Slot::new(
                    Value::Object("java/lang/invoke/MethodType".to_string()),
                    Some(id),
                )),
            }
            FrameKind::Ldc
        }

        Instruction::Var { index, .. } => {
            let index = *index as usize;
            match op {
                ILOAD | FLOAD | ALOAD => {
                    locals.ensure(index);
                    let local = locals.get(index).expect("ensured local").clone();
                    consumed.push(local.producer);
                    let value = match op {
                        ILOAD => Value::Integer,
                        FLOAD => Value::Float,
                        _ => local.value.clone(),
                    };
                    let mut slot = reproduce(&local, id);
                    slot.value = value;
                    stack.push(slot);
                }
                LLOAD | DLOAD => {
                    locals.ensure(index + 1);
                    let local = locals.get(index).expect("ensured local").clone();
                    consumed.push(local.producer);
                    let value = if op == LLOAD { Value::Long } else { Value::Double };
                    let mut slot = reproduce(&local, id);
                    slot.value = value;
                    stack.push_wide(slot);
                }
                ISTORE | FSTORE | ASTORE => {
                    let popped = stack.pop(op)?;
                    consumed.push(popped.producer);
                    locals.set(index, reproduce(&popped, id));
                }
                LSTORE | DSTORE => {
                    let popped = stack.pop_wide(op)?;
                    consumed.push(popped.producer);
                    locals.set_wide(index, reproduce(&popped, id));
                }
                other => return Err(Error::UnknownOpcode(other)),
            }
            FrameKind::Local {
                index: index as u16,
            }
        }

        Instruction::Inc { index, .. } => {
            let index = *index as usize;
            locals.ensure(index);
            consumed.push(locals.get(index).expect("ensured local").producer);
            locals.set(index, Slot::new(Value::Integer, Some(id)));
            FrameKind::Local {
                index: index as u16,
            }
        }

        Instruction::Jump { target, .. } => {
            match op {
                IFEQ..=IFLE | IFNULL | IFNONNULL => {
                    let slot = stack.pop(op)?;
                    consumed.push(slot.producer);
                }
                IF_ICMPEQ..=IF_ACMPNE => {
                    let right = stack.pop(op)?;
                    let left = stack.pop(op)?;
                    consumed.push(right.producer);
                    consumed.push(left.producer);
                }
                GOTO => (),
                other => return Err(Error::UnknownOpcode(other)),
            }
            flow = Flow::Branch {
                targets: vec![*target],
                fallthrough: op != GOTO,
            };
            FrameKind::Jump
        }

        Instruction::TableSwitch {
            default, targets, ..
        } => {
            let key = stack.pop(op)?;
            consumed.push(key.producer);
            let mut successors = targets.clone();
            successors.push(*default);
            flow = Flow::Branch {
                targets: successors,
                fallthrough: false,
            };
            FrameKind::Switch
        }
        Instruction::LookupSwitch { default, pairs } => {
            let key = stack.pop(op)?;
            consumed.push(key.producer);
            let mut successors: Vec<LabelId> = pairs.iter().map(|(_, label)| *label).collect();
            successors.push(*default);
            flow = Flow::Branch {
                targets: successors,
                fallthrough: false,
            };
            FrameKind::Switch
        }

        Instruction::Type { class, .. } => match op {
            NEW => {
                let mut slot = Slot::new(Value::Uninitialized(class.name.clone()), Some(id));
                slot.initialized = false;
                stack.push(slot);
                FrameKind::New
            }
            ANEWARRAY => {
                let length = stack.pop(op)?;
                consumed.push(length.producer);
                stack.push(Slot::new(Value::Object(array_of(&class.name)), Some(id)));
                FrameKind::NewArray
            }
            CHECKCAST => {
                let slot = stack.pop(op)?;
                consumed.push(slot.producer);
                let value = if slot.value == Value::Null {
                    Value::Null
                } else {
                    Value::Object(class.name.clone())
                };
                stack.push(Slot::new(value, Some(id)));
                FrameKind::CheckCast
            }
            INSTANCEOF => {
                let slot = stack.pop(op)?;
                consumed.push(slot.producer);
                stack.push(Slot::new(Value::Integer, Some(id)));
                FrameKind::InstanceOf
            }
            other => return Err(Error::UnknownOpcode(other)),
        },

        Instruction::Field { field, .. } => {
            let wide = field.descriptor.width() == 2;
            match op {
                GETSTATIC => {
                    let slot = Slot::new(Value::of(&field.descriptor), Some(id));
                    if wide {
                        stack.push_wide(slot);
                    } else {
                        stack.push(slot);
                    }
                }
                PUTSTATIC => {
                    let value = if wide {
                        stack.pop_wide(op)?
                    } else {
                        stack.pop(op)?
                    };
                    consumed.push(value.producer);
                }
                GETFIELD => {
                    let object = stack.pop(op)?;
                    consumed.push(object.producer);
                    let slot = Slot::new(Value::of(&field.descriptor), Some(id));
                    if wide {
                        stack.push_wide(slot);
                    } else {
                        stack.push(slot);
                    }
                }
                PUTFIELD => {
                    let value = if wide {
                        stack.pop_wide(op)?
                    } else {
                        stack.pop(op)?
                    };
                    let object = stack.pop(op)?;
                    consumed.push(value.producer);
                    consumed.push(object.producer);
                }
                other => return Err(Error::UnknownOpcode(other)),
            }
            FrameKind::Field
        }

        Instruction::Method { method, .. } => {
            for parameter in method.descriptor.parameters.iter().rev() {
                let argument = if parameter.width() == 2 {
                    stack.pop_wide(op)?
                } else {
                    stack.pop(op)?
                };
                consumed.push(argument.producer);
            }
            if op != INVOKESTATIC {
                let receiver = stack.pop(op)?;
                consumed.push(receiver.producer);
                if op == INVOKESPECIAL && method.name == "<init>" {
                    initialize_receiver(&receiver, stack, locals);
                }
            }
            if let Some(return_type) = &method.descriptor.return_type {
                let slot = Slot::new(Value::of(return_type), Some(id));
                if return_type.width() == 2 {
                    stack.push_wide(slot);
                } else {
                    stack.push(slot);
                }
            }
            FrameKind::Method
        }

        Instruction::InvokeDynamic { descriptor, .. } => {
            for parameter in descriptor.parameters.iter().rev() {
                let argument = if parameter.width() == 2 {
                    stack.pop_wide(op)?
                } else {
                    stack.pop(op)?
                };
                consumed.push(argument.producer);
            }
            if let Some(return_type) = &descriptor.return_type {
                let slot = Slot::new(Value::of(return_type), Some(id));
                if return_type.width() == 2 {
                    stack.push_wide(slot);
                } else {
                    stack.push(slot);
                }
            }
            FrameKind::Method
        }

        Instruction::MultiANewArray {
            descriptor,
            dimensions,
        } => {
            for _ in 0..*dimensions {
                let length = stack.pop(op)?;
                consumed.push(length.producer);
            }
            stack.push(Slot::new(Value::Object(descriptor.clone()), Some(id)));
            FrameKind::MultiANewArray
        }

        Instruction::Label(_) | Instruction::LineNumber { .. } => unreachable!("pseudo handled"),
    };

    let frame = Frame::new(opcode, kind);
    result.record(position, frame, consumed, stack, locals);
    Ok(flow)
}

/// After `invokespecial <init>`, the receiver and every alias of it become
/// initialized
fn initialize_receiver(receiver: &Slot, stack: &mut OperandStack, locals: &mut LocalTable) {
    let initialized_value = match &receiver.value {
        Value::Uninitialized(name) => Value::Object(name.clone()),
        Value::UninitializedThis(name) => Value::Object(name.clone()),
        _ => return,
    };
    let matches_receiver =
        |slot: &Slot| slot.value == receiver.value && slot.producer == receiver.producer;
    for slot in stack.slots_mut() {
        if matches_receiver(slot) {
            slot.value = initialized_value.clone();
            slot.initialized = true;
        }
    }
    for slot in locals.slots_mut() {
        if matches_receiver(slot) {
            slot.value = initialized_value.clone();
            slot.initialized = true;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::access_flags::MethodAccessFlags;
    use crate::code::{Code, ExceptionHandler};
    use crate::descriptors::MethodDescriptor;
    use crate::pool::ClassRef;

    fn static_method(descriptor: &str, build: impl FnOnce(&mut Code)) -> Method {
        let mut method = Method::new(
            "test/Sample",
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            "run",
            MethodDescriptor::parse(descriptor).unwrap(),
        );
        build(&mut method.code);
        method
    }

    /// The structural invariants every result must satisfy
    fn check_invariants(result: &AnalyzerResult) {
        for (id, frame) in result.frames() {
            assert!(frame.stack.len() <= result.max_stack as usize);
            assert!(frame.locals.len() <= result.max_locals as usize);

            // wide values are followed by their marker slot
            for snapshot in [&frame.stack, &frame.locals] {
                for (index, value) in snapshot.iter().enumerate() {
                    if value.is_wide() {
                        assert_eq!(snapshot.get(index + 1), Some(&Value::Top));
                    }
                }
            }

            for write in &frame.writes {
                assert!(result.frame(*write).reads.contains(&id));
            }
            for read in &frame.reads {
                assert!(result.frame(*read).writes.contains(&id));
            }

            if result.is_constant(id) {
                assert!(frame.kind.is_constant_source() || frame.kind.is_value_pure());
                for write in &frame.writes {
                    assert!(result.is_constant(*write));
                }
            }
        }
    }

    #[test]
    fn straight_line_addition() {
        let method = static_method("(II)I", |code| {
            code.push(Instruction::Var { op: ILOAD, index: 0 });
            code.push(Instruction::Var { op: ILOAD, index: 1 });
            code.push(Instruction::Simple { op: IADD });
            code.push(Instruction::Simple { op: IRETURN });
        });
        let result = MethodAnalyzer::analyze(&method).unwrap();
        check_invariants(&result);

        assert_eq!(result.max_stack, 2);
        assert_eq!(result.max_locals, 2);

        let load_0 = result.frames_at(InsnId(0))[0];
        let load_1 = result.frames_at(InsnId(1))[0];
        let add = result.frames_at(InsnId(2))[0];
        let ret = result.frames_at(InsnId(3))[0];

        assert_eq!(result.frame(load_0).kind, FrameKind::Local { index: 0 });
        assert_eq!(result.frame(load_0).stack, vec![Value::Integer]);
        assert_eq!(
            result.frame(load_1).stack,
            vec![Value::Integer, Value::Integer]
        );
        assert_eq!(result.frame(add).kind, FrameKind::Math);
        assert_eq!(result.frame(add).stack, vec![Value::Integer]);
        assert_eq!(result.frame(add).writes, vec![load_0, load_1]);
        assert_eq!(result.frame(ret).kind, FrameKind::Return);

        // arguments are not constant, so neither is the addition
        assert!(!result.is_constant(add));

        // each argument slot has a synthetic producer
        assert!(result.frame(load_0).writes.len() == 1);
        assert!(result
            .frame(result.frame(load_0).writes[0])
            .is_synthetic());
    }

    #[test]
    fn wide_identity() {
        let method = static_method("(J)J", |code| {
            code.push(Instruction::Var { op: LLOAD, index: 0 });
            code.push(Instruction::Simple { op: LRETURN });
        });
        let result = MethodAnalyzer::analyze(&method).unwrap();
        check_invariants(&result);

        assert_eq!(result.max_stack, 2);
        assert_eq!(result.max_locals, 2);
        let load = result.frames_at(InsnId(0))[0];
        assert_eq!(result.frame(load).stack, vec![Value::Long, Value::Top]);
        assert_eq!(result.frame(load).locals, vec![Value::Long, Value::Top]);
    }

    #[test]
    fn goto_has_no_fallthrough() {
        let method = static_method("()V", |code| {
            let label = code.fresh_label();
            code.push(Instruction::Jump {
                op: GOTO,
                target: label,
            });
            code.push(Instruction::Label(label));
            code.push(Instruction::Simple { op: RETURN });
        });
        let result = MethodAnalyzer::analyze(&method).unwrap();
        check_invariants(&result);

        // one path, two frames: the goto and the return
        assert_eq!(result.frame_count(), 2);
        assert_eq!(result.frames_at(InsnId(0)).len(), 1);
        assert_eq!(result.frames_at(InsnId(2)).len(), 1);
    }

    #[test]
    fn both_branch_reaches_are_recorded() {
        let method = static_method("(I)I", |code| {
            let else_branch = code.fresh_label();
            let join = code.fresh_label();
            code.push(Instruction::Var { op: ILOAD, index: 0 });
            code.push(Instruction::Jump {
                op: IFEQ,
                target: else_branch,
            });
            code.push(Instruction::Simple { op: ICONST_0 });
            code.push(Instruction::Jump {
                op: GOTO,
                target: join,
            });
            code.push(Instruction::Label(else_branch));
            code.push(Instruction::Simple { op: ICONST_1 });
            code.push(Instruction::Label(join));
            code.push(Instruction::Simple { op: IRETURN });
        });
        let result = MethodAnalyzer::analyze(&method).unwrap();
        check_invariants(&result);

        // the return is reached once per branch, with distinct producers
        let returns = result.frames_at(InsnId(7));
        assert_eq!(returns.len(), 2);
        let first_writes = &result.frame(returns[0]).writes;
        let second_writes = &result.frame(returns[1]).writes;
        assert_eq!(first_writes.len(), 1);
        assert_eq!(second_writes.len(), 1);
        assert_ne!(first_writes[0], second_writes[0]);

        // both reaching states carried one int
        let else_const = result.frames_at(InsnId(5))[0];
        let then_const = result.frames_at(InsnId(2))[0];
        assert_eq!(result.frame(else_const).stack, vec![Value::Integer]);
        assert_eq!(result.frame(then_const).stack, vec![Value::Integer]);
    }

    #[test]
    fn handler_receives_the_caught_value() {
        let method = static_method("(Ljava/lang/Object;)Ljava/lang/Object;", |code| {
            let try_start = code.fresh_label();
            let try_end = code.fresh_label();
            let catch = code.fresh_label();
            code.push(Instruction::Label(try_start));
            code.push(Instruction::Var { op: ALOAD, index: 0 });
            code.push(Instruction::Var { op: ASTORE, index: 1 });
            code.push(Instruction::Label(try_end));
            code.push(Instruction::Var { op: ALOAD, index: 1 });
            code.push(Instruction::Simple { op: ARETURN });
            code.push(Instruction::Label(catch));
            code.push(Instruction::Var { op: ALOAD, index: 1 });
            code.push(Instruction::Simple { op: ARETURN });
            code.handlers.push(ExceptionHandler {
                start: try_start,
                end: try_end,
                handler: catch,
                catch_type: Some(ClassRef::new("java/lang/Throwable")),
            });
        });
        let result = MethodAnalyzer::analyze(&method).unwrap();
        check_invariants(&result);

        let store = result.frames_at(InsnId(2))[0];
        let handler_loads = result.frames_at(InsnId(7));
        assert!(!handler_loads.is_empty());

        // every handler entry starts from a fresh stack holding the throwable
        for load in handler_loads {
            let frame = result.frame(*load);
            assert_eq!(
                frame.stack.first(),
                Some(&Value::Object("java/lang/Throwable".to_string()))
            );
        }
        // the reach that entered after the store reads the stored local
        assert!(handler_loads
            .iter()
            .any(|load| result.frame(*load).writes.contains(&store)));
    }

    #[test]
    fn subroutines_are_refused() {
        let method = static_method("()V", |code| {
            let label = code.fresh_label();
            code.push(Instruction::Jump {
                op: JSR,
                target: label,
            });
            code.push(Instruction::Label(label));
            code.push(Instruction::Simple { op: RETURN });
        });
        assert!(matches!(
            MethodAnalyzer::analyze(&method),
            Err(Error::UnsupportedOpcode(JSR))
        ));

        let method = static_method("()V", |code| {
            code.push(Instruction::Var { op: RET, index: 1 });
            code.push(Instruction::Simple { op: RETURN });
        });
        assert!(matches!(
            MethodAnalyzer::analyze(&method),
            Err(Error::UnsupportedOpcode(RET))
        ));
    }

    #[test]
    fn abstract_and_native_are_empty() {
        let mut method = static_method("()V", |_| ());
        method.access = MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT;
        let result = MethodAnalyzer::analyze(&method).unwrap();
        assert!(result.is_empty());
        assert_eq!(result.max_stack, 0);

        let mut method = static_method("()V", |_| ());
        method.access =
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC | MethodAccessFlags::NATIVE;
        assert!(MethodAnalyzer::analyze(&method).unwrap().is_empty());
    }

    #[test]
    fn constant_propagation() {
        let method = static_method("()I", |code| {
            code.push(Instruction::Simple { op: ICONST_2 });
            code.push(Instruction::Var { op: ISTORE, index: 0 });
            code.push(Instruction::Var { op: ILOAD, index: 0 });
            code.push(Instruction::Int {
                op: BIPUSH,
                operand: 40,
            });
            code.push(Instruction::Simple { op: IADD });
            code.push(Instruction::Simple { op: IRETURN });
        });
        let result = MethodAnalyzer::analyze(&method).unwrap();
        check_invariants(&result);

        let constant = result.frames_at(InsnId(0))[0];
        let store = result.frames_at(InsnId(1))[0];
        let load = result.frames_at(InsnId(2))[0];
        let push = result.frames_at(InsnId(3))[0];
        let add = result.frames_at(InsnId(4))[0];
        let ret = result.frames_at(InsnId(5))[0];

        assert!(result.is_constant(constant));
        assert!(result.is_constant(store));
        assert!(result.is_constant(load));
        assert!(result.is_constant(push));
        assert!(result.is_constant(add));
        // returns are not value producers
        assert!(!result.is_constant(ret));
    }

    #[test]
    fn loop_carried_values_are_not_constant() {
        // int i = 0; while (...) i = i + 1;
        let method = static_method("(I)V", |code| {
            let head = code.fresh_label();
            let exit = code.fresh_label();
            code.push(Instruction::Simple { op: ICONST_0 });
            code.push(Instruction::Var { op: ISTORE, index: 1 });
            code.push(Instruction::Label(head));
            code.push(Instruction::Var { op: ILOAD, index: 1 });
            code.push(Instruction::Jump {
                op: IFEQ,
                target: exit,
            });
            code.push(Instruction::Var { op: ILOAD, index: 1 });
            code.push(Instruction::Simple { op: ICONST_1 });
            code.push(Instruction::Simple { op: IADD });
            code.push(Instruction::Var { op: ISTORE, index: 1 });
            code.push(Instruction::Jump {
                op: GOTO,
                target: head,
            });
            code.push(Instruction::Label(exit));
            code.push(Instruction::Simple { op: RETURN });
        });
        let result = MethodAnalyzer::analyze(&method).unwrap();
        check_invariants(&result);

        // constness queries over every frame of the loop body must terminate
        for (id, _) in result.frames() {
            let _ = result.is_constant(id);
        }
        // the loaded counter on the back-edge reach flows from the store, not
        // straight from a constant
        let reaches = result.frames_at(InsnId(3));
        assert_eq!(reaches.len(), 2);
        let store = result.frames_at(InsnId(8))[0];
        assert!(result.frame(reaches[1]).writes.contains(&store));
    }

    #[test]
    fn switch_explores_every_arm() {
        let method = static_method("(I)I", |code| {
            let zero = code.fresh_label();
            let one = code.fresh_label();
            let fallback = code.fresh_label();
            code.push(Instruction::Var { op: ILOAD, index: 0 });
            code.push(Instruction::TableSwitch {
                min: 0,
                max: 1,
                default: fallback,
                targets: vec![zero, one],
            });
            code.push(Instruction::Label(zero));
            code.push(Instruction::Simple { op: ICONST_0 });
            code.push(Instruction::Simple { op: IRETURN });
            code.push(Instruction::Label(one));
            code.push(Instruction::Simple { op: ICONST_1 });
            code.push(Instruction::Simple { op: IRETURN });
            code.push(Instruction::Label(fallback));
            code.push(Instruction::Simple { op: ICONST_M1 });
            code.push(Instruction::Simple { op: IRETURN });
        });
        let result = MethodAnalyzer::analyze(&method).unwrap();
        check_invariants(&result);

        let switch = result.frames_at(InsnId(1))[0];
        assert_eq!(result.frame(switch).kind, FrameKind::Switch);
        assert_eq!(result.frame(switch).stack, Vec::<Value>::new());
        for arm in [3, 6, 9] {
            assert_eq!(result.frames_at(InsnId(arm)).len(), 1);
        }
    }

    #[test]
    fn constructor_initializes_aliases() {
        let method = static_method("()Ljava/lang/Object;", |code| {
            code.push(Instruction::Type {
                op: NEW,
                class: ClassRef::new("java/lang/Object"),
            });
            code.push(Instruction::Simple { op: DUP });
            code.push(Instruction::Method {
                op: INVOKESPECIAL,
                method: crate::pool::MethodRef::new(
                    "java/lang/Object",
                    "<init>",
                    MethodDescriptor::parse("()V").unwrap(),
                ),
                interface: false,
            });
            code.push(Instruction::Simple { op: ARETURN });
        });
        let result = MethodAnalyzer::analyze(&method).unwrap();
        check_invariants(&result);

        let allocation = result.frames_at(InsnId(0))[0];
        assert_eq!(
            result.frame(allocation).stack,
            vec![Value::Uninitialized("java/lang/Object".to_string())]
        );
        let invoke = result.frames_at(InsnId(2))[0];
        assert_eq!(
            result.frame(invoke).stack,
            vec![Value::Object("java/lang/Object".to_string())]
        );
    }

    #[test]
    fn stack_shape_violations() {
        // popping an empty stack
        let method = static_method("()V", |code| {
            code.push(Instruction::Simple { op: POP });
            code.push(Instruction::Simple { op: RETURN });
        });
        assert!(matches!(
            MethodAnalyzer::analyze(&method),
            Err(Error::StackUnderflow { opcode: POP })
        ));

        // returning an int as a long
        let method = static_method("()J", |code| {
            code.push(Instruction::Simple { op: ICONST_0 });
            code.push(Instruction::Simple { op: LRETURN });
        });
        assert!(matches!(
            MethodAnalyzer::analyze(&method),
            Err(Error::WideMismatch { opcode: LRETURN })
        ));

        // swapping with a wide value on top
        let method = static_method("()V", |code| {
            code.push(Instruction::Simple { op: ICONST_0 });
            code.push(Instruction::Simple { op: LCONST_0 });
            code.push(Instruction::Simple { op: SWAP });
            code.push(Instruction::Simple { op: RETURN });
        });
        assert!(matches!(
            MethodAnalyzer::analyze(&method),
            Err(Error::WideMismatch { opcode: SWAP })
        ));
    }

    #[test]
    fn falling_off_the_end_fails() {
        let method = static_method("()V", |code| {
            code.push(Instruction::Simple { op: ICONST_0 });
            code.push(Instruction::Simple { op: POP });
        });
        assert!(matches!(
            MethodAnalyzer::analyze(&method),
            Err(Error::FallOffEnd)
        ));
    }

    #[test]
    fn unknown_opcodes_fail() {
        let method = static_method("()V", |code| {
            code.push(Instruction::Simple { op: 203 });
        });
        assert!(matches!(
            MethodAnalyzer::analyze(&method),
            Err(Error::UnknownOpcode(203))
        ));
    }

    #[test]
    fn results_are_deterministic() {
        let build = || {
            static_method("(I)I", |code| {
                let else_branch = code.fresh_label();
                let join = code.fresh_label();
                code.push(Instruction::Var { op: ILOAD, index: 0 });
                code.push(Instruction::Jump {
                    op: IFEQ,
                    target: else_branch,
                });
                code.push(Instruction::Simple { op: ICONST_0 });
                code.push(Instruction::Jump {
                    op: GOTO,
                    target: join,
                });
                code.push(Instruction::Label(else_branch));
                code.push(Instruction::Simple { op: ICONST_1 });
                code.push(Instruction::Label(join));
                code.push(Instruction::Simple { op: IRETURN });
            })
        };
        let first = MethodAnalyzer::analyze(&build()).unwrap();
        let second = MethodAnalyzer::analyze(&build()).unwrap();

        assert_eq!(first.max_stack, second.max_stack);
        assert_eq!(first.max_locals, second.max_locals);
        assert_eq!(first.frame_count(), second.frame_count());
        for ((id_a, frame_a), (id_b, frame_b)) in first.frames().zip(second.frames()) {
            assert_eq!(id_a, id_b);
            assert_eq!(frame_a, frame_b);
        }
        for position in 0..8 {
            assert_eq!(
                first.frames_at(InsnId(position)),
                second.frames_at(InsnId(position))
            );
        }
    }

    #[test]
    fn instance_receiver_is_uninitialized_this() {
        let mut method = static_method("()V", |code| {
            code.push(Instruction::Var { op: ALOAD, index: 0 });
            code.push(Instruction::Simple { op: POP });
            code.push(Instruction::Simple { op: RETURN });
        });
        method.access = MethodAccessFlags::PUBLIC;

        let result = MethodAnalyzer::analyze(&method).unwrap();
        check_invariants(&result);
        let load = result.frames_at(InsnId(0))[0];
        assert_eq!(
            result.frame(load).stack,
            vec![Value::UninitializedThis("test/Sample".to_string())]
        );
        assert_eq!(result.max_locals, 1);
    }
}
