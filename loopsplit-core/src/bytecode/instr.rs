//! Instruction Data Model
//!
//! A method body is a sequence of [`Instruction`]s plus a try-catch table.
//! Vertex identity in the splitter's digraph is an [`InstrId`], a stable
//! handle assigned once at creation and never reused or renumbered — even
//! though the instruction's *position* in the method shifts as clones and
//! gotos are spliced in. Positions are a derived, on-demand concept (see
//! [`Method::index_of`]); identity is not.

use smallvec::SmallVec;

/// A JVM bytecode label, the only thing a branch or a try-catch boundary
/// ever refers to. Distinct from [`InstrId`]: a label is a value carried by
/// an instruction's operand, while an `InstrId` is the instruction itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelId(pub u32);

/// Stable identity of one instruction within a [`Method`]. Vertex type used
/// throughout [`crate::splitter`] and [`crate::bytecode::cfg`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrId(pub u32);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    LocalIndex(u16),
    ConstPoolIndex(u16),
    Immediate(i32),
    IncrementLocal { index: u16, delta: i16 },
    /// `invokeinterface`'s constant-pool index plus its argument-word count.
    InterfaceCall { index: u16, count: u8 },
    /// `multianewarray`'s constant-pool index plus its dimension count.
    MultiArray { index: u16, dimensions: u8 },
    None,
}

/// A decoded bytecode opcode. Control-flow-relevant opcodes get their own
/// variant so the CFG builder and instruction cloner can pattern-match on
/// them directly; everything else falls into `Generic`, carrying its raw
/// opcode byte and operand so it round-trips losslessly through the class
/// writer without this crate needing to understand its semantics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Opcode {
    Nop,
    /// Any of `ireturn`/`lreturn`/`freturn`/`dreturn`/`areturn`/`return` —
    /// the six JVM return opcodes differ only in the type popped off the
    /// stack, so the raw byte is carried through rather than modeled as six
    /// separate variants.
    Return { opcode: u8 },
    AThrow,
    Goto(LabelId),
    /// Any of the sixteen `if*`/`if_icmp*`/`if_acmp*` conditional branches.
    /// Falls through to the next instruction when the condition is false.
    IfCond { opcode: u8, target: LabelId },
    TableSwitch {
        default: LabelId,
        low: i32,
        targets: SmallVec<[LabelId; 4]>,
    },
    LookupSwitch {
        default: LabelId,
        pairs: SmallVec<[(i32, LabelId); 4]>,
    },
    /// Any non-branching opcode, carried verbatim.
    Generic { opcode: u8, operand: Operand },
}

impl Opcode {
    /// True if control never falls through to the next instruction.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Opcode::Return { .. }
                | Opcode::AThrow
                | Opcode::Goto(_)
                | Opcode::TableSwitch { .. }
                | Opcode::LookupSwitch { .. }
        )
    }

    /// Every label this opcode can jump to.
    pub fn branch_targets(&self) -> SmallVec<[LabelId; 4]> {
        match self {
            Opcode::Goto(l) | Opcode::IfCond { target: l, .. } => SmallVec::from_slice(&[*l]),
            Opcode::TableSwitch { default, targets, .. } => {
                let mut v = targets.clone();
                v.push(*default);
                v
            }
            Opcode::LookupSwitch { default, pairs } => {
                let mut v: SmallVec<[LabelId; 4]> = pairs.iter().map(|(_, l)| *l).collect();
                v.push(*default);
                v
            }
            _ => SmallVec::new(),
        }
    }

    pub(crate) fn remap_labels(&mut self, remap: impl Fn(LabelId) -> LabelId) {
        match self {
            Opcode::Goto(l) => *l = remap(*l),
            Opcode::IfCond { target, .. } => *target = remap(*target),
            Opcode::TableSwitch { default, targets, .. } => {
                *default = remap(*default);
                for t in targets.iter_mut() {
                    *t = remap(*t);
                }
            }
            Opcode::LookupSwitch { default, pairs } => {
                *default = remap(*default);
                for (_, t) in pairs.iter_mut() {
                    *t = remap(*t);
                }
            }
            Opcode::Generic { .. } | Opcode::Nop | Opcode::Return { .. } | Opcode::AThrow => {}
        }
    }
}

/// One CFG vertex. `Label` and `LineNumber` markers carry no runtime effect
/// but still occupy a slot — they are valid jump targets and valid try-catch
/// boundaries, exactly like a real opcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsnKind {
    Label(LabelId),
    LineNumber(u32),
    Op(Opcode),
}

#[derive(Debug, Clone)]
pub struct Instruction {
    pub kind: InsnKind,
}

impl Instruction {
    pub fn label(id: LabelId) -> Self {
        Instruction { kind: InsnKind::Label(id) }
    }

    pub fn goto(target: LabelId) -> Self {
        Instruction { kind: InsnKind::Op(Opcode::Goto(target)) }
    }

    pub fn is_terminator(&self) -> bool {
        match &self.kind {
            InsnKind::Op(op) => op.is_terminator(),
            _ => false,
        }
    }

    pub fn branch_targets(&self) -> SmallVec<[LabelId; 4]> {
        match &self.kind {
            InsnKind::Op(op) => op.branch_targets(),
            _ => SmallVec::new(),
        }
    }

    pub fn label_id(&self) -> Option<LabelId> {
        match &self.kind {
            InsnKind::Label(id) => Some(*id),
            _ => None,
        }
    }

    /// Deep-clones this instruction, rewriting any embedded label through
    /// `remap` (used by the instruction cloner to retarget branches that
    /// point at other instructions inside the same clone batch).
    pub fn clone_remapped(&self, remap: impl Fn(LabelId) -> LabelId) -> Self {
        let mut cloned = self.clone();
        if let InsnKind::Label(id) = &mut cloned.kind {
            *id = remap(*id);
        } else if let InsnKind::Op(op) = &mut cloned.kind {
            op.remap_labels(remap);
        }
        cloned
    }
}

/// A single try-catch table entry. `start`/`end`/`handler` are instruction
/// handles, not positions — a caught range is `start_index <= index(i) <
/// end_index` where `index` is the instruction's current position (see
/// [`Method::index_of`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TryCatchEntry {
    pub start: InstrId,
    pub end: InstrId,
    pub handler: InstrId,
    pub exception_type: Option<String>,
}
