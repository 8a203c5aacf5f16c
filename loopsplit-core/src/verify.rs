//! Baseline Structural Verifier
//!
//! A `Verifier` implementation that needs nothing beyond the method body
//! itself: it checks that every branch and every try-catch boundary
//! resolves to a real instruction, that try-catch ranges are non-empty and
//! forward, and — the property this whole crate exists to establish — that
//! the resulting CFG is reducible. A driver with a full classpath available
//! can layer a stricter [`crate::resolve::Verifier`] on top (real bytecode
//! verification rules), but this one requires no external state and is what
//! [`crate::bytecode::transform::transform_method`] is exercised against in
//! this crate's own tests.

use std::collections::HashMap;

use crate::bytecode::cfg::MethodCfg;
use crate::bytecode::instr::{Instruction, InstrId, TryCatchEntry};
use crate::bytecode::method::Method;
use crate::digraph::RootedDigraph;
use crate::error::LoopSplitError;
use crate::resolve::Verifier;
use crate::splitter::split_irreducible_loops;

pub struct StructuralVerifier;

struct ReadOnlyGraph<'a> {
    method: &'a Method,
    cfg: &'a MethodCfg,
}

impl RootedDigraph for ReadOnlyGraph<'_> {
    type Vertex = InstrId;

    fn root(&self) -> InstrId {
        self.method.at(0).expect("method has at least one instruction")
    }

    fn vertices(&self) -> Vec<InstrId> {
        self.method.order().to_vec()
    }

    fn successors(&self, v: InstrId) -> Vec<InstrId> {
        self.cfg.combined_successors(v)
    }

    fn predecessors(&self, v: InstrId) -> Vec<InstrId> {
        self.cfg.combined_predecessors(v)
    }
}

impl Verifier for StructuralVerifier {
    fn verify(
        &mut self,
        instructions: &[Instruction],
        try_catch: &[TryCatchEntry],
    ) -> Result<(), LoopSplitError> {
        if instructions.is_empty() {
            return Err(LoopSplitError::VerificationFailed(
                "method body has no instructions".into(),
            ));
        }

        let method = Method::new(instructions.to_vec());
        let positions: HashMap<InstrId, usize> = method.positions();

        for insn in instructions {
            for target in insn.branch_targets() {
                if !method.label_positions().contains_key(&target) {
                    return Err(LoopSplitError::VerificationFailed(format!(
                        "branch target {target:?} does not resolve to any instruction"
                    )));
                }
            }
        }

        for t in try_catch {
            let start = *positions.get(&t.start).ok_or_else(|| {
                LoopSplitError::VerificationFailed("try-catch start is not in the method".into())
            })?;
            let end = *positions.get(&t.end).ok_or_else(|| {
                LoopSplitError::VerificationFailed("try-catch end is not in the method".into())
            })?;
            if start >= end {
                return Err(LoopSplitError::InvalidTryCatchRange { start, end });
            }
            if !positions.contains_key(&t.handler) {
                return Err(LoopSplitError::VerificationFailed(
                    "try-catch handler is not in the method".into(),
                ));
            }
        }

        let cfg = MethodCfg::build(&method, try_catch);
        if !cfg.guaranteed_acyclic() {
            let mut graph = ReadOnlyGraph { method: &method, cfg: &cfg };
            let cloned = split_irreducible_loops(&mut graph, |_, _, _, _| {
                Err(LoopSplitError::VerificationFailed(
                    "method is still irreducible: a read-only verification pass found a region \
                     with more than one predecessor, which would require cloning to resolve"
                        .into(),
                ))
            });
            match cloned {
                Ok(0) => {}
                Ok(_) => unreachable!("the read-only callback always errors before a clone completes"),
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }
}
