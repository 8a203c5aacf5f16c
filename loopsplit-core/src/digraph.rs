//! Rooted Digraph Abstraction
//!
//! The splitter in [`crate::splitter`] works over any type implementing
//! [`RootedDigraph`]. Vertices are opaque, `Copy` handles — for the JVM
//! instruction cloner these are [`crate::bytecode::InstrId`]s; the fuzz
//! harness in the test suite uses plain `u32`s.

use std::fmt::Debug;
use std::hash::Hash;

/// A directed graph with a single distinguished root, queried live by the
/// splitter both to seed its region bookkeeping and, after every node-split
/// step, to check that region-level edges still agree with the real
/// vertex-level edges the duplication callback produced.
pub trait RootedDigraph {
    type Vertex: Copy + Eq + Hash + Debug;

    /// The entry vertex. Never a member of any cycle by construction (no
    /// edges target it other than ones introduced by pathological input).
    fn root(&self) -> Self::Vertex;

    /// All vertices currently in the graph.
    fn vertices(&self) -> Vec<Self::Vertex>;

    /// Current successors of `v`. Must reflect any mutation performed by a
    /// duplication callback that ran before this call.
    fn successors(&self, v: Self::Vertex) -> Vec<Self::Vertex>;

    /// Current predecessors of `v`.
    fn predecessors(&self, v: Self::Vertex) -> Vec<Self::Vertex>;
}

/// Where a new vertex introduced by a duplication callback should be routed
/// within the splitter's region bookkeeping. This is the entire contract
/// between a [`crate::splitter::DuplicationCallback`] and the splitter: the
/// callback performs the real graph mutation and reports back one of these
/// three locations per vertex it adds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertionLocation<V> {
    /// Route into the region containing `anchor`.
    Before(V),
    /// Route into the region containing `anchor`.
    After(V),
    /// Route into the freshly created region for the predecessor currently
    /// being split off.
    Append,
}

/// Sink a duplication callback reports newly created vertices to. The
/// splitter supplies the implementation (a simple recorder); callbacks never
/// construct one themselves.
pub trait VertexSink<V> {
    fn add_vertex(&mut self, vertex: V, location: InsertionLocation<V>);
}

pub(crate) struct Recorder<V> {
    pub(crate) emitted: Vec<(V, InsertionLocation<V>)>,
}

impl<V> Recorder<V> {
    pub(crate) fn new() -> Self {
        Recorder { emitted: Vec::new() }
    }
}

impl<V> VertexSink<V> for Recorder<V> {
    fn add_vertex(&mut self, vertex: V, location: InsertionLocation<V>) {
        self.emitted.push((vertex, location));
    }
}
