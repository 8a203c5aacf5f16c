//! CFG Builder
//!
//! Builds the normal (fall-through + jump) and exception (try-catch
//! coverage) edge sets for a [`Method`] in a single linear scan, the way a
//! bytecode verifier does it — no fixpoint iteration needed, since every
//! edge is determined directly by an instruction's kind or by a try-catch
//! entry's covered range.
//!
//! Edges are kept in two separate sets rather than unioned up front, because
//! the instruction cloner treats them differently (phase 3 rewires only
//! normal entry edges; phases 6/7 handle exception edges on their own).
//! [`MethodCfg::combined_successors`]/`combined_predecessors` union them for
//! callers (the splitter) that don't care about the distinction.

use std::collections::HashMap;

use smallvec::SmallVec;

use super::instr::{InstrId, TryCatchEntry};
use super::method::Method;

#[derive(Debug, Clone, Default)]
pub struct MethodCfg {
    normal_succ: HashMap<InstrId, SmallVec<[InstrId; 2]>>,
    normal_pred: HashMap<InstrId, SmallVec<[InstrId; 2]>>,
    catch_succ: HashMap<InstrId, SmallVec<[InstrId; 2]>>,
    catch_pred: HashMap<InstrId, SmallVec<[InstrId; 2]>>,
    /// Cleared the moment any edge is found to target a vertex at or before
    /// its source's position. A method that never trips this has no
    /// back edges at all and cannot be irreducible — the splitter can be
    /// skipped entirely.
    guaranteed_acyclic: bool,
}

fn push(map: &mut HashMap<InstrId, SmallVec<[InstrId; 2]>>, key: InstrId, value: InstrId) {
    let entry = map.entry(key).or_default();
    if !entry.contains(&value) {
        entry.push(value);
    }
}

impl MethodCfg {
    pub fn build(method: &Method, try_catch: &[TryCatchEntry]) -> Self {
        let mut cfg = MethodCfg { guaranteed_acyclic: true, ..Default::default() };
        let order = method.order();
        let positions = method.positions();

        for (i, &id) in order.iter().enumerate() {
            let insn = method.get(id);
            if !insn.is_terminator() {
                if let Some(&next) = order.get(i + 1) {
                    push(&mut cfg.normal_succ, id, next);
                    push(&mut cfg.normal_pred, next, id);
                }
            }
            for target_label in insn.branch_targets() {
                if let Some(&target) = method.label_positions().get(&target_label) {
                    push(&mut cfg.normal_succ, id, target);
                    push(&mut cfg.normal_pred, target, id);
                    if positions[&target] <= i {
                        cfg.guaranteed_acyclic = false;
                    }
                }
            }
        }

        for entry in try_catch {
            let start = positions[&entry.start];
            let end = positions[&entry.end];
            for &covered in &order[start..end.min(order.len())] {
                push(&mut cfg.catch_succ, covered, entry.handler);
                push(&mut cfg.catch_pred, entry.handler, covered);
            }
        }

        cfg
    }

    pub fn guaranteed_acyclic(&self) -> bool {
        self.guaranteed_acyclic
    }

    pub fn successors(&self, v: InstrId) -> &[InstrId] {
        self.normal_succ.get(&v).map(|s| s.as_slice()).unwrap_or(&[])
    }

    pub fn predecessors(&self, v: InstrId) -> &[InstrId] {
        self.normal_pred.get(&v).map(|s| s.as_slice()).unwrap_or(&[])
    }

    pub fn catch_successors(&self, v: InstrId) -> &[InstrId] {
        self.catch_succ.get(&v).map(|s| s.as_slice()).unwrap_or(&[])
    }

    pub fn catch_predecessors(&self, v: InstrId) -> &[InstrId] {
        self.catch_pred.get(&v).map(|s| s.as_slice()).unwrap_or(&[])
    }

    pub fn combined_successors(&self, v: InstrId) -> Vec<InstrId> {
        let mut out: Vec<InstrId> = self.successors(v).to_vec();
        for &w in self.catch_successors(v) {
            if !out.contains(&w) {
                out.push(w);
            }
        }
        out
    }

    pub fn combined_predecessors(&self, v: InstrId) -> Vec<InstrId> {
        let mut out: Vec<InstrId> = self.predecessors(v).to_vec();
        for &w in self.catch_predecessors(v) {
            if !out.contains(&w) {
                out.push(w);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::instr::{InsnKind, Instruction, LabelId, Opcode};

    fn op(opcode: Opcode) -> Instruction {
        Instruction { kind: InsnKind::Op(opcode) }
    }

    #[test]
    fn straight_line_method_is_guaranteed_acyclic() {
        let method = Method::new(vec![op(Opcode::Nop), op(Opcode::Nop), op(Opcode::Return { opcode: 177 })]);
        let cfg = MethodCfg::build(&method, &[]);
        assert!(cfg.guaranteed_acyclic());
        let (a, b, c) = (method.at(0).unwrap(), method.at(1).unwrap(), method.at(2).unwrap());
        assert_eq!(cfg.successors(a), &[b]);
        assert_eq!(cfg.successors(b), &[c]);
        assert!(cfg.successors(c).is_empty());
    }

    #[test]
    fn backward_jump_clears_guaranteed_acyclic() {
        let l0 = LabelId(0);
        let method = Method::new(vec![
            Instruction::label(l0),
            op(Opcode::Nop),
            op(Opcode::Goto(l0)),
        ]);
        let cfg = MethodCfg::build(&method, &[]);
        assert!(!cfg.guaranteed_acyclic());
        let (label, goto) = (method.at(0).unwrap(), method.at(2).unwrap());
        assert!(cfg.predecessors(label).contains(&goto));
    }

    #[test]
    fn try_catch_range_adds_catch_edges_for_every_covered_instruction() {
        let method = Method::new(vec![op(Opcode::Nop), op(Opcode::Nop), op(Opcode::Return { opcode: 177 }), op(Opcode::Return { opcode: 177 })]);
        let (start, mid, end, handler) =
            (method.at(0).unwrap(), method.at(1).unwrap(), method.at(2).unwrap(), method.at(3).unwrap());
        let try_catch = vec![TryCatchEntry {
            start,
            end,
            handler,
            exception_type: Some("java/lang/Exception".into()),
        }];
        let cfg = MethodCfg::build(&method, &try_catch);
        // the range is a half-open [start, end), so `end` itself isn't covered.
        assert_eq!(cfg.catch_successors(start), &[handler]);
        assert_eq!(cfg.catch_successors(mid), &[handler]);
        assert!(cfg.catch_successors(end).is_empty());
        assert!(cfg.catch_predecessors(handler).contains(&start));
        assert!(cfg.catch_predecessors(handler).contains(&mid));
    }

    #[test]
    fn combined_successors_union_normal_and_catch_without_duplicates() {
        let method = Method::new(vec![op(Opcode::Nop), op(Opcode::Return { opcode: 177 })]);
        let (start, handler) = (method.at(0).unwrap(), method.at(1).unwrap());
        let try_catch =
            vec![TryCatchEntry { start, end: handler, handler, exception_type: None }];
        let cfg = MethodCfg::build(&method, &try_catch);
        let combined = cfg.combined_successors(start);
        assert_eq!(combined.len(), combined.iter().collect::<std::collections::HashSet<_>>().len());
        assert!(combined.contains(&handler));
    }
}
