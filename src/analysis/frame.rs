use crate::analysis::Value;
use std::cell::Cell;
use std::fmt;

/// Identifier of a frame inside one [`crate::analysis::AnalyzerResult`]
///
/// The producer/consumer graph is threaded through these identifiers rather
/// than owning references, so loops in the method (which make the graph
/// cyclic) need no special ownership treatment.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub(crate) usize);

impl fmt::Debug for FrameId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_fmt(format_args!("frame#{}", self.0))
    }
}

/// What family of instruction a frame records
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FrameKind {
    Nop,
    /// Synthetic producer of a seeded argument slot
    Argument { index: u16 },
    Ldc,
    Local { index: u16 },
    ArrayLoad,
    ArrayStore,
    Pop,
    Dup,
    Swap,
    Math,
    Jump,
    Switch,
    Return,
    Field,
    Method,
    New,
    NewArray,
    ArrayLength,
    Throw,
    CheckCast,
    InstanceOf,
    Monitor,
    MultiANewArray,
}

impl FrameKind {
    /// Does this kind push a value derived from compile-time constants
    /// regardless of its inputs?
    pub(crate) fn is_constant_source(self) -> bool {
        matches!(self, FrameKind::Ldc)
    }

    /// Does this kind transform values without side effects, so constness
    /// propagates through it?
    pub(crate) fn is_value_pure(self) -> bool {
        matches!(
            self,
            FrameKind::Math
                | FrameKind::Local { .. }
                | FrameKind::Dup
                | FrameKind::Swap
                | FrameKind::CheckCast
        )
    }
}

/// One reach of one instruction: the symbolic machine state after executing
/// it, wired into the data-flow graph
///
/// `writes` are the frames that produced the values this frame consumed;
/// `reads` are the frames that later consumed a value this frame produced.
/// An instruction reached along several control-flow paths gets one frame
/// per reach.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Raw opcode, or `-1` for synthetic frames (seeded arguments)
    pub opcode: i16,
    pub kind: FrameKind,

    /// Operand stack after this instruction, bottom to top
    pub stack: Vec<Value>,

    /// Local variable table after this instruction
    pub locals: Vec<Value>,

    pub writes: Vec<FrameId>,
    pub reads: Vec<FrameId>,

    /// Memoized constness; computed on demand because the graph is still
    /// growing while frames are constructed
    pub(crate) constant: Cell<Option<bool>>,
}

impl Frame {
    pub(crate) fn new(opcode: i16, kind: FrameKind) -> Frame {
        Frame {
            opcode,
            kind,
            stack: vec![],
            locals: vec![],
            writes: vec![],
            reads: vec![],
            constant: Cell::new(None),
        }
    }

    /// Synthetic frames record no instruction
    pub fn is_synthetic(&self) -> bool {
        self.opcode < 0
    }
}

impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        self.opcode == other.opcode
            && self.kind == other.kind
            && self.stack == other.stack
            && self.locals == other.locals
            && self.writes == other.writes
            && self.reads == other.reads
    }
}

impl Eq for Frame {}
