//! Glues [`Method`], its try-catch table, and its [`MethodCfg`] into the one
//! type the generic splitter operates on. The CFG is rebuilt once per
//! [`crate::splitter::split_irreducible_loops`] invocation's T3 step (by the
//! instruction cloner, at the end of its seven phases) rather than kept live
//! across every single instruction insertion — maintaining live edges
//! through each of the cloner's intermediate mutations would mean
//! re-deriving fall-through edges on every `append`, for no benefit, since
//! nothing reads them until the cloner is done.

use crate::digraph::RootedDigraph;

use super::cfg::MethodCfg;
use super::instr::{InstrId, TryCatchEntry};
use super::method::Method;

pub struct MethodGraph {
    pub method: Method,
    pub try_catch: Vec<TryCatchEntry>,
    pub cfg: MethodCfg,
}

impl MethodGraph {
    pub fn new(method: Method, try_catch: Vec<TryCatchEntry>) -> Self {
        let cfg = MethodCfg::build(&method, &try_catch);
        MethodGraph { method, try_catch, cfg }
    }

    /// Recomputes `cfg` from the current instruction order and try-catch
    /// table. Must be called by a duplication callback before it returns
    /// control to the splitter, so the splitter's post-T3 consistency check
    /// sees live edges.
    pub fn reset_edges(&mut self) {
        self.cfg = MethodCfg::build(&self.method, &self.try_catch);
    }
}

impl RootedDigraph for MethodGraph {
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
