//! Top-level method transform: builds the CFG, runs the splitter with the
//! instruction cloner as its duplication callback, re-verifies the result is
//! actually reducible, and hands the rewritten body to a [`MethodSink`].

use crate::error::LoopSplitError;
use crate::resolve::{MethodSink, MethodSource, Verifier};
use crate::splitter::split_irreducible_loops;
use crate::stats::TransformStats;

use super::cloner::clone_region;
use super::graph::MethodGraph;
use super::instr::{InstrId, TryCatchEntry};
use super::method::Method;

/// Eliminates irreducible loops from `source`'s method body and writes the
/// result to `sink`. A no-op (aside from the verifier pass) when the method
/// was already reducible.
pub fn transform_method(
    source: &impl MethodSource,
    sink: &mut impl MethodSink,
    verifier: &mut impl Verifier,
) -> Result<TransformStats, LoopSplitError> {
    let instructions = source.instructions();
    let try_catch = source.try_catch_table();
    let original_instruction_count = instructions.len();
    let original_try_catch_count = try_catch.len();

    let method = Method::new(instructions);
    let mut graph = MethodGraph::new(method, try_catch);

    let was_already_acyclic = graph.cfg.guaranteed_acyclic();
    let mut regions_cloned_total = 0usize;

    if !was_already_acyclic {
        regions_cloned_total += split_irreducible_loops(&mut graph, clone_region)?;

        if regions_cloned_total > 0 {
            let cloned_again = split_irreducible_loops(&mut graph, clone_region)?;
            if cloned_again > 0 {
                return Err(LoopSplitError::StillIrreducible(format!(
                    "{}: still found {cloned_again} region(s) needing duplication on the re-verification pass",
                    source.name()
                )));
            }
        }
    }

    // `graph.try_catch` entries still carry the `InstrId`s assigned at
    // allocation time, which say nothing about final execution order once
    // clones and inserted gotos have shifted everything around. Every caller
    // on the other side of `MethodSink`/`Verifier` only ever sees the
    // instructions as a plain `Vec`, so rewrite each entry's `start`/`end`/
    // `handler` to the position they land on in that vec — from here out,
    // an `InstrId` in a `TryCatchEntry` *is* an index into `final_instructions`.
    let positions = graph.method.positions();
    let remap = |id: InstrId| -> InstrId { InstrId(positions[&id] as u32) };
    let final_try_catch: Vec<TryCatchEntry> = graph
        .try_catch
        .iter()
        .map(|t| TryCatchEntry {
            start: remap(t.start),
            end: remap(t.end),
            handler: remap(t.handler),
            exception_type: t.exception_type.clone(),
        })
        .collect();
    let final_instructions = graph.method.into_ordered_instructions();

    verifier.verify(&final_instructions, &final_try_catch)?;

    let stats = TransformStats {
        original_instruction_count,
        final_instruction_count: final_instructions.len(),
        regions_cloned: regions_cloned_total,
        try_catch_entries_added: final_try_catch.len().saturating_sub(original_try_catch_count),
        was_already_acyclic,
    };

    sink.replace(final_instructions, final_try_catch);

    Ok(stats)
}
