//! External-Interface Traits
//!
//! This crate never touches a `.class` file or a `.jar` directly — that's
//! [`loopsplit-cli`]'s job. Everything the core transform needs from the
//! outside world crosses one of these four trait boundaries, so the
//! algorithm in [`crate::bytecode::transform`] is fully exercised by plain
//! in-memory fixtures in tests, with no filesystem or classpath involved.

use crate::bytecode::instr::{Instruction, TryCatchEntry};
use crate::error::LoopSplitError;

/// Supplies one method body to transform.
pub trait MethodSource {
    fn instructions(&self) -> Vec<Instruction>;
    fn try_catch_table(&self) -> Vec<TryCatchEntry>;
    /// Human-readable label for error messages and logging, e.g.
    /// `com/example/Foo.bar(I)V`.
    fn name(&self) -> String;
}

/// Receives the transformed method body.
pub trait MethodSink {
    fn replace(&mut self, instructions: Vec<Instruction>, try_catch: Vec<TryCatchEntry>);
}

/// Answers the handful of questions the try-catch machinery needs about
/// exception-class hierarchy. A driver backed by a real classpath can
/// implement this with a cache over loaded class files; the core crate only
/// ever asks it whether one exception type is assignable to another.
pub trait TypeResolver {
    /// Is every instance of `sub` also an instance of `sup`? `sup = None`
    /// means "catches everything" (a bare `catch` / `finally` handler).
    fn is_assignable(&mut self, sub: &str, sup: Option<&str>) -> Result<bool, LoopSplitError>;
}

/// Checks that a transformed method body is still well-formed. The core
/// crate runs a structural self-check after every transform (instruction
/// graph reducible, try-catch ranges valid); a driver with access to a full
/// classpath can plug in a stricter implementation (the JVM's own bytecode
/// verifier rules) via this trait without the core crate depending on it.
pub trait Verifier {
    fn verify(
        &mut self,
        instructions: &[Instruction],
        try_catch: &[TryCatchEntry],
    ) -> Result<(), LoopSplitError>;
}

/// A [`TypeResolver`] that never unifies two distinct exception types beyond
/// textual equality. Correct wherever handler-type reasoning isn't needed
/// (the splitter only special-cases the resolver when deciding whether two
/// overlapping catch ranges can be merged after splitting, which non-core
/// callers frequently don't need).
pub struct NoopTypeResolver;

impl TypeResolver for NoopTypeResolver {
    fn is_assignable(&mut self, sub: &str, sup: Option<&str>) -> Result<bool, LoopSplitError> {
        Ok(match sup {
            None => true,
            Some(sup) => sub == sup,
        })
    }
}
