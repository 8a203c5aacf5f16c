//! Instruction Cloner
//!
//! The duplication callback the splitter invokes for every extra
//! predecessor of an irreducible region. Given the set of instructions being
//! duplicated (`toClone`) and the predecessor receiving this particular copy
//! (`ownedBy`), it runs seven ordered phases:
//!
//! 1. build a fresh label for every cloned label instruction
//! 2. clone the instructions themselves, in their original relative order
//! 3. rewire entry edges from `ownedBy` so they target the clones
//! 4. patch fall-throughs that used to connect two now-separated clones
//! 5. patch fall-throughs that used to leave the cloned set
//! 6. split try-catch entries whose handler was cloned but whose range only
//!    partially overlaps `ownedBy`
//! 7. clone try-catch entries that cover `toClone`
//!
//! Order matters: phase 3 must see the *original* predecessor/successor
//! edges, so it runs before anything in phases 4-5 changes adjacency: the
//! graph's `cfg` is deliberately left stale (built once, before this
//! callback runs) until [`MethodGraph::reset_edges`] is called at the very
//! end.

use std::collections::HashMap;

use super::graph::MethodGraph;
use super::instr::{InsnKind, Instruction, InstrId, LabelId, TryCatchEntry};
use crate::digraph::{InsertionLocation, VertexSink};
use crate::error::LoopSplitError;

fn add_instruction(
    graph: &mut MethodGraph,
    sink: &mut dyn VertexSink<InstrId>,
    insn: Instruction,
    location: InsertionLocation<InstrId>,
) -> InstrId {
    let id = match location {
        InsertionLocation::Append => graph.method.append(insn),
        InsertionLocation::Before(anchor) => graph.method.insert_before(anchor, insn),
        InsertionLocation::After(anchor) => graph.method.insert_after(anchor, insn),
    };
    sink.add_vertex(id, location);
    id
}

/// Finds (or lazily creates) a label sitting immediately before `anchor`,
/// returning the label instruction's id. If `anchor` is itself a label,
/// it's reused directly rather than inserting a redundant one.
fn label_before(
    graph: &mut MethodGraph,
    sink: &mut dyn VertexSink<InstrId>,
    anchor: InstrId,
    cache: &mut HashMap<InstrId, InstrId>,
) -> InstrId {
    if graph.method.get(anchor).label_id().is_some() {
        return anchor;
    }
    if let Some(&existing) = cache.get(&anchor) {
        return existing;
    }
    let lid = graph.method.fresh_label();
    let id = add_instruction(graph, sink, Instruction::label(lid), InsertionLocation::Before(anchor));
    cache.insert(anchor, id);
    id
}

/// Mirror of [`label_before`] for the "one past the end" boundary a phase-5
/// goto or a phase-7 try-catch end needs. Appends a brand-new label at the
/// end of the method when `anchor` is the method's last instruction.
fn label_after(
    graph: &mut MethodGraph,
    sink: &mut dyn VertexSink<InstrId>,
    anchor: InstrId,
    cache: &mut HashMap<InstrId, InstrId>,
) -> InstrId {
    if let Some(&existing) = cache.get(&anchor) {
        return existing;
    }
    let pos = graph.method.index_of(anchor);
    let id = if let Some(next) = graph.method.at(pos + 1) {
        if graph.method.get(next).label_id().is_some() {
            next
        } else {
            let lid = graph.method.fresh_label();
            add_instruction(graph, sink, Instruction::label(lid), InsertionLocation::Before(next))
        }
    } else {
        let lid = graph.method.fresh_label();
        add_instruction(graph, sink, Instruction::label(lid), InsertionLocation::Append)
    };
    cache.insert(anchor, id);
    id
}

/// The seven-phase duplication callback, bound as the `clone_region`
/// argument to [`crate::splitter::split_irreducible_loops`] when splitting a
/// [`MethodGraph`].
pub fn clone_region(
    graph: &mut MethodGraph,
    to_clone: &[InstrId],
    owned_by: &[InstrId],
    sink: &mut dyn VertexSink<InstrId>,
) -> Result<(), LoopSplitError> {
    let positions = graph.method.positions();
    let mut ordered_to_clone = to_clone.to_vec();
    ordered_to_clone.sort_by_key(|v| positions[v]);

    let label_positions = graph.method.label_positions();
    let to_clone_set: std::collections::HashSet<InstrId> = to_clone.iter().copied().collect();
    let owned_by_set: std::collections::HashSet<InstrId> = owned_by.iter().copied().collect();

    // Phase 1: a fresh label for every cloned label instruction.
    let mut label_map: HashMap<LabelId, LabelId> = HashMap::new();
    for &x in &ordered_to_clone {
        if let Some(old) = graph.method.get(x).label_id() {
            label_map.insert(old, graph.method.fresh_label());
        }
    }
    let remap = |lid: LabelId, label_map: &HashMap<LabelId, LabelId>| -> LabelId {
        // Only labels that belong to a cloned instruction are remapped;
        // everything else still refers to the original, shared target
        // (duplication callback guarantee #2).
        if let Some(owner) = label_positions.get(&lid) {
            if to_clone_set.contains(owner) {
                return label_map[&lid];
            }
        }
        lid
    };

    // Phase 2: clone the instructions, in original relative order.
    let mut clones: HashMap<InstrId, InstrId> = HashMap::new();
    for &x in &ordered_to_clone {
        let cloned = graph.method.get(x).clone_remapped(|l| remap(l, &label_map));
        let x_clone = add_instruction(graph, sink, cloned, InsertionLocation::Append);
        clones.insert(x, x_clone);
    }

    let mut label_cache: HashMap<InstrId, InstrId> = HashMap::new();

    // Phase 3: rewire entry edges. For every predecessor of a cloned vertex
    // that belongs to `ownedBy`, either retarget its existing jump or, if it
    // relied on fall-through, insert a goto.
    for &x in &ordered_to_clone {
        let x_clone = clones[&x];
        let preds: Vec<InstrId> = graph.cfg.predecessors(x).to_vec();
        for p in preds {
            if !owned_by_set.contains(&p) {
                continue;
            }
            let entry_label = label_before(graph, sink, x_clone, &mut label_cache);
            let entry_lid = graph
                .method
                .get(entry_label)
                .label_id()
                .expect("label_before always returns a label instruction");

            let targets_x = graph
                .method
                .get(p)
                .branch_targets()
                .iter()
                .any(|&lid| label_positions.get(&lid) == Some(&x));

            if targets_x {
                let insn = graph.method.get_mut(p);
                if let InsnKind::Op(op) = &mut insn.kind {
                    op.remap_labels(|lid| {
                        if label_positions.get(&lid) == Some(&x) { entry_lid } else { lid }
                    });
                }
            } else {
                add_instruction(
                    graph,
                    sink,
                    Instruction::goto(entry_lid),
                    InsertionLocation::After(p),
                );
            }
        }
    }

    // Phase 4: fall-throughs that used to connect two clones, now possibly
    // separated by the entry-label insertions phase 3 made.
    for window in ordered_to_clone.windows(2) {
        let (x, y) = (window[0], window[1]);
        if positions[&y] != positions[&x] + 1 {
            continue;
        }
        if graph.method.get(x).is_terminator() {
            continue;
        }
        let (x_clone, y_clone) = (clones[&x], clones[&y]);
        if graph.method.index_of(y_clone) == graph.method.index_of(x_clone) + 1 {
            continue;
        }
        let label = label_before(graph, sink, y_clone, &mut label_cache);
        let lid = graph.method.get(label).label_id().unwrap();
        add_instruction(graph, sink, Instruction::goto(lid), InsertionLocation::After(x_clone));
    }

    // Phase 5: fall-throughs that used to leave the cloned set entirely.
    for &x in &ordered_to_clone {
        if graph.method.get(x).is_terminator() {
            continue;
        }
        let succs: Vec<InstrId> = graph.cfg.successors(x).to_vec();
        for y in succs {
            if to_clone_set.contains(&y) || positions.get(&y) != Some(&(positions[&x] + 1)) {
                continue;
            }
            let label = label_before(graph, sink, y, &mut label_cache);
            let lid = graph.method.get(label).label_id().unwrap();
            add_instruction(graph, sink, Instruction::goto(lid), InsertionLocation::After(clones[&x]));
        }
    }

    // Phase 6: split try-catch entries whose handler was cloned but whose
    // covered range only partially overlaps `ownedBy`. Positions are
    // refreshed here: phases 3-5 may have inserted labels/gotos that shift
    // everything after them, so the pre-clone snapshot is stale by now.
    let positions = graph.method.positions();
    if !owned_by.is_empty() {
        let owned_positions: Vec<usize> = owned_by.iter().map(|v| positions[v]).collect();
        let owned_start = *owned_positions.iter().min().unwrap();
        let owned_end = *owned_positions.iter().max().unwrap() + 1;

        let mut indices: Vec<usize> = (0..graph.try_catch.len()).collect();
        indices.sort_by_key(|&i| std::cmp::Reverse(positions[&graph.try_catch[i].start]));

        let mut label_cache6: HashMap<InstrId, InstrId> = HashMap::new();
        for i in indices {
            let handler = graph.try_catch[i].handler;
            let Some(&cloned_handler) = clones.get(&handler) else { continue };

            let (ts, te) = (
                positions.get(&graph.try_catch[i].start).copied().unwrap_or_else(|| graph.method.index_of(graph.try_catch[i].start)),
                positions.get(&graph.try_catch[i].end).copied().unwrap_or_else(|| graph.method.index_of(graph.try_catch[i].end)),
            );

            if owned_start <= ts && te <= owned_end {
                // Case A: ownedBy wholly contains the try range.
                graph.try_catch[i].handler = cloned_handler;
            } else if owned_end <= ts || owned_start >= te {
                // Case B: disjoint, nothing to do.
            } else if owned_start <= ts && owned_end < te {
                // Case C: ownedBy covers the start, ends inside T.
                let boundary = if owned_end < graph.method.len() {
                    let at = graph.method.at(owned_end).unwrap();
                    label_before(graph, sink, at, &mut label_cache6)
                } else {
                    label_after(graph, sink, graph.method.at(graph.method.len() - 1).unwrap(), &mut label_cache6)
                };
                let tail = TryCatchEntry {
                    start: boundary,
                    end: graph.try_catch[i].end,
                    handler: graph.try_catch[i].handler,
                    exception_type: graph.try_catch[i].exception_type.clone(),
                };
                graph.try_catch[i].end = boundary;
                graph.try_catch[i].handler = cloned_handler;
                graph.try_catch.push(tail);
            } else if ts < owned_start && te <= owned_end {
                // Case D: ownedBy starts inside T, covers through T's end.
                let at = graph.method.at(owned_start).unwrap();
                let boundary = label_before(graph, sink, at, &mut label_cache6);
                let head = TryCatchEntry {
                    start: graph.try_catch[i].start,
                    end: boundary,
                    handler: graph.try_catch[i].handler,
                    exception_type: graph.try_catch[i].exception_type.clone(),
                };
                graph.try_catch[i].start = boundary;
                graph.try_catch[i].handler = cloned_handler;
                graph.try_catch.push(head);
            } else {
                // Case E: ownedBy is strictly interior to T.
                let start_at = graph.method.at(owned_start).unwrap();
                let start_boundary = label_before(graph, sink, start_at, &mut label_cache6);
                let end_boundary = if owned_end < graph.method.len() {
                    let at = graph.method.at(owned_end).unwrap();
                    label_before(graph, sink, at, &mut label_cache6)
                } else {
                    label_after(graph, sink, graph.method.at(graph.method.len() - 1).unwrap(), &mut label_cache6)
                };
                let head = TryCatchEntry {
                    start: graph.try_catch[i].start,
                    end: start_boundary,
                    handler: graph.try_catch[i].handler,
                    exception_type: graph.try_catch[i].exception_type.clone(),
                };
                let tail = TryCatchEntry {
                    start: end_boundary,
                    end: graph.try_catch[i].end,
                    handler: graph.try_catch[i].handler,
                    exception_type: graph.try_catch[i].exception_type.clone(),
                };
                graph.try_catch[i].start = start_boundary;
                graph.try_catch[i].end = end_boundary;
                graph.try_catch[i].handler = cloned_handler;
                graph.try_catch.push(head);
                graph.try_catch.push(tail);
            }
        }
    }

    // Phase 7: clone try-catch entries that cover `toClone`. Refreshed again:
    // phase 6 may have inserted its own boundary labels.
    let positions = graph.method.positions();
    {
        let clone_start = *ordered_to_clone.iter().map(|v| positions[v]).collect::<Vec<_>>().iter().min().unwrap();
        let clone_end = *ordered_to_clone.iter().map(|v| positions[v]).collect::<Vec<_>>().iter().max().unwrap() + 1;

        let mut label_cache7: HashMap<InstrId, InstrId> = HashMap::new();
        let original_count = graph.try_catch.len();
        for i in 0..original_count {
            let t = graph.try_catch[i].clone();
            let ts = positions[&t.start];
            let te = positions[&t.end];
            if te <= clone_start || ts >= clone_end {
                continue;
            }
            let lo = ts.max(clone_start);
            let hi = te.min(clone_end);
            let first_orig = ordered_to_clone
                .iter()
                .copied()
                .find(|v| positions[v] >= lo)
                .expect("non-empty overlap implies a covered vertex");
            let last_orig = ordered_to_clone
                .iter()
                .rev()
                .copied()
                .find(|v| positions[v] < hi)
                .expect("non-empty overlap implies a covered vertex");

            let start_marker = clones[&first_orig];
            let end_marker = label_after(graph, sink, clones[&last_orig], &mut label_cache7);
            let handler = clones.get(&t.handler).copied().unwrap_or(t.handler);

            graph.try_catch.push(TryCatchEntry {
                start: start_marker,
                end: end_marker,
                handler,
                exception_type: t.exception_type,
            });
        }
    }

    graph.reset_edges();

    for t in &graph.try_catch {
        let start = graph.method.index_of(t.start);
        let end = graph.method.index_of(t.end);
        if start >= end {
            return Err(LoopSplitError::InvalidTryCatchRange { start, end });
        }
    }

    Ok(())
}
