//! Region Splitter
//!
//! Implements the classical T1/T2/T3 interval-reduction algorithm (Aho,
//! Sethi & Ullman, *Compilers: Principles, Techniques, and Tools*, §9.7.6)
//! as a node-splitting pass: T1 removes self-loops, T2 merges single-entry
//! chains, and T3 duplicates a node with more than one predecessor so that
//! one predecessor keeps the original and every other predecessor gets its
//! own private clone. Run to a fixpoint, this eliminates every irreducible
//! region without changing program semantics.
//!
//! The splitter never touches the caller's vertex type beyond calling
//! [`RootedDigraph`] methods and invoking the supplied duplication callback.
//! All region bookkeeping (which vertices belong to which region, and the
//! region-level predecessor/successor sets) is private state local to a
//! single [`split_irreducible_loops`] call.

use std::collections::HashMap;
use std::hash::Hash;

use crate::digraph::{InsertionLocation, Recorder, RootedDigraph, VertexSink};
use crate::error::LoopSplitError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct RegionId(usize);

struct Region<V> {
    members: Vec<V>,
    preds: Vec<RegionId>,
    succs: Vec<RegionId>,
    alive: bool,
}

fn push_dedup<T: Eq>(v: &mut Vec<T>, item: T) {
    if !v.contains(&item) {
        v.push(item);
    }
}

struct Regions<V> {
    regions: Vec<Region<V>>,
    owner: HashMap<V, RegionId>,
}

impl<V: Copy + Eq + Hash> Regions<V> {
    fn alive_ids(&self) -> Vec<RegionId> {
        (0..self.regions.len())
            .map(RegionId)
            .filter(|id| self.regions[id.0].alive)
            .collect()
    }

    fn alive_count(&self) -> usize {
        self.regions.iter().filter(|r| r.alive).count()
    }

    fn any_has_preds(&self) -> bool {
        self.regions.iter().any(|r| r.alive && !r.preds.is_empty())
    }

    fn new_region(&mut self, preds: Vec<RegionId>, succs: Vec<RegionId>) -> RegionId {
        let id = RegionId(self.regions.len());
        self.regions.push(Region {
            members: Vec::new(),
            preds,
            succs,
            alive: true,
        });
        id
    }

    fn region_of(&self, v: V) -> RegionId {
        *self
            .owner
            .get(&v)
            .unwrap_or_else(|| panic!("vertex not owned by any region"))
    }
}

/// Runs T1/T2/T3 to a fixpoint over `graph`, invoking `clone_region` once per
/// extra predecessor of every irreducible region it finds. Returns the
/// number of extra-predecessor clones performed (`0` means the graph was
/// already reducible). `clone_region` receives the mutable graph, the set of
/// vertices being duplicated (`toClone`), the set of vertices belonging to
/// the predecessor that is receiving this particular clone (`ownedBy`), and
/// a sink to report every vertex it adds, tagged with where it belongs.
pub fn split_irreducible_loops<G, F>(
    graph: &mut G,
    mut clone_region: F,
) -> Result<usize, LoopSplitError>
where
    G: RootedDigraph,
    F: FnMut(
        &mut G,
        &[G::Vertex],
        &[G::Vertex],
        &mut dyn VertexSink<G::Vertex>,
    ) -> Result<(), LoopSplitError>,
{
    let mut regions: Regions<G::Vertex> = Regions {
        regions: Vec::new(),
        owner: HashMap::new(),
    };

    let vertices = graph.vertices();
    for &v in &vertices {
        let id = regions.new_region(Vec::new(), Vec::new());
        regions.regions[id.0].members.push(v);
        regions.owner.insert(v, id);
    }
    for &v in &vertices {
        let r = regions.region_of(v);
        for w in graph.successors(v) {
            let rw = regions.region_of(w);
            if rw != r {
                push_dedup(&mut regions.regions[r.0].succs, rw);
            }
        }
        for w in graph.predecessors(v) {
            let rw = regions.region_of(w);
            if rw != r {
                push_dedup(&mut regions.regions[r.0].preds, rw);
            }
        }
    }

    let mut regions_cloned = 0usize;

    loop {
        if regions.alive_count() <= 1 || !regions.any_has_preds() {
            break;
        }

        let t1 = apply_t1(&mut regions);
        let t2 = apply_t2(&mut regions);

        if !t1 && !t2 {
            let cloned = apply_t3(graph, &mut regions, &mut clone_region)?;
            if cloned == 0 {
                // No region has more than one predecessor, yet termination
                // conditions above did not fire. Nothing more to do.
                break;
            }
            regions_cloned += cloned;
        }
    }

    Ok(regions_cloned)
}

/// T1: drop self-loops. A region that lists itself as its own predecessor
/// (and, symmetrically, its own successor) has that edge removed.
fn apply_t1<V: Copy + Eq + Hash>(regions: &mut Regions<V>) -> bool {
    let mut changed = false;
    for id in regions.alive_ids() {
        if regions.regions[id.0].preds.contains(&id) {
            regions.regions[id.0].preds.retain(|&p| p != id);
            regions.regions[id.0].succs.retain(|&s| s != id);
            changed = true;
        }
    }
    changed
}

/// T2: a region with exactly one predecessor (other than itself) is folded
/// into that predecessor. Member lists concatenate; the predecessor's
/// successor/predecessor sets absorb the merged region's.
fn apply_t2<V: Copy + Eq + Hash>(regions: &mut Regions<V>) -> bool {
    let mut changed = false;
    for id in regions.alive_ids() {
        if !regions.regions[id.0].alive {
            continue;
        }
        let preds = regions.regions[id.0].preds.clone();
        if preds.len() != 1 || preds[0] == id {
            continue;
        }
        let p = preds[0];
        if !regions.regions[p.0].alive {
            continue;
        }

        let members = std::mem::take(&mut regions.regions[id.0].members);
        for m in &members {
            regions.owner.insert(*m, p);
        }
        regions.regions[p.0].members.extend(members);

        regions.regions[p.0].succs.retain(|&s| s != id);
        let succs = regions.regions[id.0].succs.clone();
        for s in succs {
            if s != p && s != id {
                push_dedup(&mut regions.regions[p.0].succs, s);
            }
            if s != id {
                let spreds = &mut regions.regions[s.0].preds;
                spreds.retain(|&x| x != id);
                push_dedup(spreds, p);
            }
        }

        regions.regions[id.0].alive = false;
        changed = true;
    }
    changed
}

/// T3: pick the region with the smallest `(extra_preds) * |members|` weight
/// (ties broken by ascending region creation order, i.e. whichever region
/// was formed first), keep its first predecessor as the owner of the
/// original, and give every other predecessor its own freshly cloned copy
/// via `clone_region`.
fn apply_t3<G, F>(
    graph: &mut G,
    regions: &mut Regions<G::Vertex>,
    clone_region: &mut F,
) -> Result<usize, LoopSplitError>
where
    G: RootedDigraph,
    F: FnMut(
        &mut G,
        &[G::Vertex],
        &[G::Vertex],
        &mut dyn VertexSink<G::Vertex>,
    ) -> Result<(), LoopSplitError>,
{
    let candidate = regions
        .alive_ids()
        .into_iter()
        .filter(|id| regions.regions[id.0].preds.len() >= 2)
        .min_by_key(|id| {
            let r = &regions.regions[id.0];
            ((r.preds.len() - 1) * r.members.len(), id.0)
        });

    let Some(r_id) = candidate else {
        return Ok(0);
    };

    let preds = regions.regions[r_id.0].preds.clone();
    let to_clone = regions.regions[r_id.0].members.clone();
    let r_succs = regions.regions[r_id.0].succs.clone();

    for &p in &preds[1..] {
        let owned_by = regions.regions[p.0].members.clone();
        let new_id = regions.new_region(vec![p], r_succs.clone());

        let mut recorder = Recorder::new();
        clone_region(graph, &to_clone, &owned_by, &mut recorder)?;
        for (v, loc) in recorder.emitted {
            let target = match loc {
                InsertionLocation::Append => new_id,
                InsertionLocation::Before(anchor) | InsertionLocation::After(anchor) => {
                    *regions.owner.get(&anchor).ok_or_else(|| {
                        LoopSplitError::UnknownAnchor(format!("{anchor:?}"))
                    })?
                }
            };
            regions.regions[target.0].members.push(v);
            regions.owner.insert(v, target);
        }

        regions.regions[p.0].succs.retain(|&s| s != r_id);
        push_dedup(&mut regions.regions[p.0].succs, new_id);
        regions.regions[r_id.0].preds.retain(|&x| x != p);
        for &s in &r_succs {
            push_dedup(&mut regions.regions[s.0].preds, new_id);
        }
    }

    check_consistency(graph, regions)?;

    Ok(preds.len() - 1)
}

/// Verifies, for every alive region, that the set of regions reachable by one
/// hop from its members equals its recorded successor set (and symmetrically
/// for predecessors). This is the splitter's defense against a duplication
/// callback that failed to honor its edge-preservation guarantees: any
/// divergence between the bookkeeping and the real, freshly mutated graph
/// surfaces here instead of silently producing a wrong CFG.
fn check_consistency<G: RootedDigraph>(
    graph: &G,
    regions: &Regions<G::Vertex>,
) -> Result<(), LoopSplitError> {
    for id in regions.alive_ids() {
        let region = &regions.regions[id.0];
        let mut seen_succs = Vec::new();
        let mut seen_preds = Vec::new();
        for &v in &region.members {
            for w in graph.successors(v) {
                let rw = regions.region_of(w);
                if rw != id {
                    push_dedup(&mut seen_succs, rw);
                }
            }
            for w in graph.predecessors(v) {
                let rw = regions.region_of(w);
                if rw != id {
                    push_dedup(&mut seen_preds, rw);
                }
            }
        }
        for s in &seen_succs {
            if !region.succs.contains(s) {
                return Err(LoopSplitError::InvariantViolation(format!(
                    "region gained an untracked successor edge to region {}",
                    s.0
                )));
            }
        }
        for p in &seen_preds {
            if !region.preds.contains(p) {
                return Err(LoopSplitError::InvariantViolation(format!(
                    "region gained an untracked predecessor edge from region {}",
                    p.0
                )));
            }
        }
        for s in &region.succs {
            if !seen_succs.contains(s) {
                return Err(LoopSplitError::InvariantViolation(format!(
                    "region still records a stale successor edge to region {}",
                    s.0
                )));
            }
        }
        for p in &region.preds {
            if !seen_preds.contains(p) {
                return Err(LoopSplitError::InvariantViolation(format!(
                    "region still records a stale predecessor edge from region {}",
                    p.0
                )));
            }
        }
    }
    Ok(())
}
