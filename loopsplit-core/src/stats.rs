//! Transform Statistics
//!
//! Mirrors the teacher's `PipelineStats`: a plain, serializable summary a
//! driver can log, fold into a report, or compare across a batch of files.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformStats {
    /// Instructions in the method body before any splitting.
    pub original_instruction_count: usize,
    /// Instructions in the method body after splitting (original plus all
    /// clones and inserted gotos/labels).
    pub final_instruction_count: usize,
    /// How many regions were cloned across every T3 step.
    pub regions_cloned: usize,
    /// How many try-catch entries were split or cloned as a side effect.
    pub try_catch_entries_added: usize,
    /// `true` if the CFG builder's linear scan found no back edge at all,
    /// meaning the splitter never had to run.
    pub was_already_acyclic: bool,
}
