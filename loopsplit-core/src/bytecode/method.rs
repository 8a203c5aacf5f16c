//! Method Body
//!
//! Holds a method's instructions the way the splitter needs them: a stable
//! identity per instruction ([`InstrId`]) decoupled from its position in the
//! execution order. Inserting a goto in the middle of a long method would be
//! an O(n) shift either way; keeping identity separate from position means
//! the shift only ever touches `order`, never invalidates an `InstrId` a
//! caller is still holding.

use std::collections::HashMap;

use super::instr::{Instruction, InstrId, LabelId};

#[derive(Debug, Clone, Default)]
pub struct Method {
    storage: Vec<Instruction>,
    order: Vec<InstrId>,
    next_label: u32,
}

impl Method {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        let order = (0..instructions.len() as u32).map(InstrId).collect();
        let next_label = instructions
            .iter()
            .filter_map(|i| i.label_id())
            .map(|l| l.0 + 1)
            .max()
            .unwrap_or(0);
        Method { storage: instructions, order, next_label }
    }

    pub fn order(&self) -> &[InstrId] {
        &self.order
    }

    pub fn get(&self, id: InstrId) -> &Instruction {
        &self.storage[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: InstrId) -> &mut Instruction {
        &mut self.storage[id.0 as usize]
    }

    /// Position of `id` in the current execution order. `O(n)`; callers that
    /// need many lookups should build a position map via [`Self::positions`].
    pub fn index_of(&self, id: InstrId) -> usize {
        self.order
            .iter()
            .position(|&x| x == id)
            .unwrap_or_else(|| panic!("instruction {id:?} is not in the method's order"))
    }

    /// A position map for every instruction currently in the method. Build
    /// once per pass rather than calling `index_of` in a loop.
    pub fn positions(&self) -> HashMap<InstrId, usize> {
        self.order.iter().enumerate().map(|(i, &id)| (id, i)).collect()
    }

    /// The instruction at a given position, if any (positions past the end
    /// of the method have none).
    pub fn at(&self, pos: usize) -> Option<InstrId> {
        self.order.get(pos).copied()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn alloc(&mut self, insn: Instruction) -> InstrId {
        let id = InstrId(self.storage.len() as u32);
        self.storage.push(insn);
        id
    }

    pub fn append(&mut self, insn: Instruction) -> InstrId {
        let id = self.alloc(insn);
        self.order.push(id);
        id
    }

    pub fn insert_before(&mut self, anchor: InstrId, insn: Instruction) -> InstrId {
        let id = self.alloc(insn);
        let pos = self.index_of(anchor);
        self.order.insert(pos, id);
        id
    }

    pub fn insert_after(&mut self, anchor: InstrId, insn: Instruction) -> InstrId {
        let id = self.alloc(insn);
        let pos = self.index_of(anchor);
        self.order.insert(pos + 1, id);
        id
    }

    pub fn label_positions(&self) -> HashMap<LabelId, InstrId> {
        self.order
            .iter()
            .filter_map(|&id| self.get(id).label_id().map(|lid| (lid, id)))
            .collect()
    }

    pub fn fresh_label(&mut self) -> LabelId {
        let id = LabelId(self.next_label);
        self.next_label += 1;
        id
    }

    /// Consumes `self`, returning the instructions in their final execution
    /// order — what a [`crate::resolve::MethodSink`] writes back.
    pub fn into_ordered_instructions(self) -> Vec<Instruction> {
        self.order.into_iter().map(|id| self.storage[id.0 as usize].clone()).collect()
    }
}
