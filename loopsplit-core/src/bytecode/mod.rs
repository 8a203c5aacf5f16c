//! JVM bytecode specialization of the generic splitter: the instruction
//! data model, the CFG builder, the seven-phase instruction cloner, and the
//! top-level per-method transform.

pub mod cfg;
pub mod cloner;
pub mod graph;
pub mod instr;
pub mod method;
pub mod transform;
