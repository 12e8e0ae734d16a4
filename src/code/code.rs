use crate::code::{CodeVisitor, Instruction, LabelId};
use crate::errors::Error;
use crate::pool::ClassRef;
use std::collections::HashMap;
use std::fmt;

/// Handle to an instruction inside one method's [`Code`]
///
/// The inner value is the instruction's position in the sequence. Positions
/// are stable under append; [`Code::insert`] shifts the positions of
/// everything behind the insertion point.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InsnId(pub(crate) usize);

impl InsnId {
    /// Position of the instruction in its method
    pub fn position(self) -> usize {
        self.0
    }
}

impl fmt::Debug for InsnId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_fmt(format_args!("insn#{}", self.0))
    }
}

/// One protected region of a method's exception table
///
/// The region covers instructions in `[start, end)`; `handler` is where
/// control resumes with the thrown value on an otherwise empty stack. A
/// missing `catch_type` catches everything (`finally` blocks compile to
/// this).
#[derive(Clone, PartialEq, Debug)]
pub struct ExceptionHandler {
    pub start: LabelId,
    pub end: LabelId,
    pub handler: LabelId,
    pub catch_type: Option<ClassRef>,
}

/// Body of a method: an ordered instruction sequence plus its exception
/// table and stack/local capacity hints
///
/// The sequence is navigable in both directions from any [`InsnId`] handle.
/// Exception handlers keep their source order; nested try/catch resolution
/// depends on it.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct Code {
    insns: Vec<Instruction>,
    labels: HashMap<u32, LabelId>,
    next_label: u32,
    pub handlers: Vec<ExceptionHandler>,
    pub max_stack: u16,
    pub max_locals: u16,
}

impl Code {
    pub fn new() -> Code {
        Code::default()
    }

    /// Number of instructions (pseudo-instructions included)
    pub fn len(&self) -> usize {
        self.insns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insns.is_empty()
    }

    /// Append an instruction and return its handle
    pub fn push(&mut self, insn: Instruction) -> InsnId {
        self.insns.push(insn);
        InsnId(self.insns.len() - 1)
    }

    /// Insert an instruction at a position, shifting everything behind it
    pub fn insert(&mut self, at: InsnId, insn: Instruction) -> InsnId {
        self.insns.insert(at.0, insn);
        at
    }

    pub fn get(&self, id: InsnId) -> Option<&Instruction> {
        self.insns.get(id.0)
    }

    /// First instruction of the method, if any
    pub fn first(&self) -> Option<InsnId> {
        if self.insns.is_empty() {
            None
        } else {
            Some(InsnId(0))
        }
    }

    /// Predecessor in the sequence
    pub fn prev(&self, id: InsnId) -> Option<InsnId> {
        if id.0 == 0 || id.0 > self.insns.len() {
            None
        } else {
            Some(InsnId(id.0 - 1))
        }
    }

    /// Successor in the sequence
    pub fn next(&self, id: InsnId) -> Option<InsnId> {
        if id.0 + 1 < self.insns.len() {
            Some(InsnId(id.0 + 1))
        } else {
            None
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (InsnId, &Instruction)> {
        self.insns
            .iter()
            .enumerate()
            .map(|(position, insn)| (InsnId(position), insn))
    }

    /// Canonical label for a raw label value, minting a fresh id on first
    /// sight
    ///
    /// Raw values are arbitrary (the class reader uses bytecode offsets);
    /// ids count up in allocation order.
    pub fn get_or_create_label(&mut self, raw: u32) -> LabelId {
        if let Some(label) = self.labels.get(&raw) {
            *label
        } else {
            let label = LabelId(self.next_label);
            self.next_label += 1;
            self.labels.insert(raw, label);
            label
        }
    }

    /// How many labels this method has minted
    pub fn label_count(&self) -> u32 {
        self.next_label
    }

    /// Mint a label with a fresh raw value (for programmatic construction)
    pub fn fresh_label(&mut self) -> LabelId {
        let mut raw = self.next_label;
        while self.labels.contains_key(&raw) {
            raw += 1;
        }
        self.get_or_create_label(raw)
    }

    /// Map every label to the position of its [`Instruction::Label`] marker
    ///
    /// Fails with [`Error::MalformedCode`] if any label referenced by a
    /// jump, switch, exception handler, or line number is not placed in
    /// this method.
    pub fn label_positions(&self) -> Result<HashMap<LabelId, InsnId>, Error> {
        let mut positions = HashMap::new();
        for (id, insn) in self.iter() {
            if let Instruction::Label(label) = insn {
                positions.insert(*label, id);
            }
        }

        let mut check = |label: LabelId| -> Result<(), Error> {
            if positions.contains_key(&label) {
                Ok(())
            } else {
                Err(Error::MalformedCode(format!(
                    "label {:?} is referenced but not placed",
                    label
                )))
            }
        };

        for (_, insn) in self.iter() {
            match insn {
                Instruction::Jump { target, .. } => check(*target)?,
                Instruction::TableSwitch {
                    default, targets, ..
                } => {
                    check(*default)?;
                    for target in targets {
                        check(*target)?;
                    }
                }
                Instruction::LookupSwitch { default, pairs } => {
                    check(*default)?;
                    for (_, target) in pairs {
                        check(*target)?;
                    }
                }
                Instruction::LineNumber { start, .. } => check(*start)?,
                _ => (),
            }
        }
        for handler in &self.handlers {
            check(handler.start)?;
            check(handler.end)?;
            check(handler.handler)?;
        }

        Ok(positions)
    }

    /// Walk a visitor over the body: exception handlers first, then the
    /// instruction sequence, closing with the capacity hints
    pub fn accept<V: CodeVisitor>(&self, visitor: &mut V) {
        for handler in &self.handlers {
            visitor.visit_exception_handler(handler);
        }
        for (id, insn) in self.iter() {
            visitor.visit_insn(id, insn);
        }
        visitor.visit_maxs(self.max_stack, self.max_locals);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::code::opcodes::*;

    #[test]
    fn navigation() {
        let mut code = Code::new();
        let a = code.push(Instruction::Var { op: ILOAD, index: 0 });
        let b = code.push(Instruction::Var { op: ILOAD, index: 1 });
        let c = code.push(Instruction::Simple { op: IADD });

        assert_eq!(code.first(), Some(a));
        assert_eq!(code.next(a), Some(b));
        assert_eq!(code.prev(b), Some(a));
        assert_eq!(code.next(c), None);
        assert_eq!(code.prev(a), None);

        for (id, _) in code.iter() {
            if let Some(prev) = code.prev(id) {
                assert_eq!(code.next(prev), Some(id));
            }
            if let Some(next) = code.next(id) {
                assert_eq!(code.prev(next), Some(id));
            }
            assert_eq!(code.get(id), code.iter().nth(id.position()).map(|(_, i)| i));
        }
    }

    #[test]
    fn label_allocation_order() {
        let mut code = Code::new();
        let l9 = code.get_or_create_label(9);
        let l2 = code.get_or_create_label(2);
        assert_eq!(l9.id(), 0);
        assert_eq!(l2.id(), 1);
        assert_eq!(code.get_or_create_label(9), l9);
        assert_eq!(code.label_count(), 2);
    }

    #[test]
    fn missing_label_is_malformed() {
        let mut code = Code::new();
        let target = code.get_or_create_label(0);
        code.push(Instruction::Jump { op: GOTO, target });
        assert!(matches!(
            code.label_positions(),
            Err(Error::MalformedCode(_))
        ));

        code.push(Instruction::Label(target));
        assert!(code.label_positions().is_ok());
    }

    #[test]
    fn insert_shifts_positions() {
        let mut code = Code::new();
        code.push(Instruction::Var { op: ILOAD, index: 0 });
        let end = code.push(Instruction::Simple { op: IRETURN });
        code.insert(end, Instruction::Simple { op: INEG });

        let opcodes: Vec<i16> = code.iter().map(|(_, insn)| insn.opcode()).collect();
        assert_eq!(opcodes, vec![ILOAD as i16, INEG as i16, IRETURN as i16]);
    }
}
