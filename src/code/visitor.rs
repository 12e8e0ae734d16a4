use crate::code::{ExceptionHandler, InsnId, Instruction};

/// Consumer of a method body's event stream
///
/// [`crate::code::Code::accept`] drives one of these over a body in
/// re-serialization order: the exception table first (source order), then
/// every instruction including the [`Instruction::Label`] and
/// [`Instruction::LineNumber`] pseudo-instructions, then the capacity hints.
pub trait CodeVisitor {
    fn visit_exception_handler(&mut self, handler: &ExceptionHandler);

    fn visit_insn(&mut self, id: InsnId, insn: &Instruction);

    fn visit_maxs(&mut self, max_stack: u16, max_locals: u16);
}
