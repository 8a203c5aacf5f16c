//! Hand-rolled JVM Class File Codec
//!
//! This crate never pulls in a general bytecode-manipulation library: the
//! transform only ever needs to decode one method's `Code` attribute, hand
//! it to [`loopsplit_core`], and write back whatever came out, so a
//! dedicated reader built the same way the core crate reads a classfile's
//! own binary container (see `cursor.rs`) is the more direct fit.

pub mod class;
pub mod code;
pub mod cursor;
pub mod pool;

use anyhow::Result;

use loopsplit_core::bytecode::instr::{Instruction, TryCatchEntry};
use loopsplit_core::resolve::{MethodSink, MethodSource};

use class::{decode_method_code, replace_method_code, ClassFile, CodeAttribute, Method};

/// Bridges one method of a parsed [`ClassFile`] to the core crate's
/// [`MethodSource`]/[`MethodSink`] traits. Built once per method that has a
/// `Code` attribute; [`Self::apply`] writes the (possibly unchanged) result
/// back into the owning method, so it never needs to keep borrowing the
/// class the method came from.
pub struct ClassMethodAdapter {
    qualified_name: String,
    original: CodeAttribute,
}

impl ClassMethodAdapter {
    pub fn new(class: &ClassFile, method: &Method) -> Result<Option<Self>> {
        let Some(original) = decode_method_code(method, class.code_attribute_name())? else {
            return Ok(None);
        };
        let qualified_name = format!(
            "{}.{}",
            class.this_class_name().unwrap_or("<unknown>"),
            class.method_name(method).unwrap_or_else(|_| "<unknown>".into())
        );
        Ok(Some(ClassMethodAdapter { qualified_name, original }))
    }

    /// Writes `instructions`/`try_catch` into `method`'s `Code` attribute.
    pub fn apply(
        &self,
        method: &mut Method,
        instructions: Vec<Instruction>,
        try_catch: Vec<TryCatchEntry>,
    ) -> Result<()> {
        replace_method_code(method, &self.original, &instructions, &try_catch)
    }
}

impl MethodSource for ClassMethodAdapter {
    fn instructions(&self) -> Vec<Instruction> {
        self.original.decoded.instructions.clone()
    }

    fn try_catch_table(&self) -> Vec<TryCatchEntry> {
        self.original.decoded.try_catch.clone()
    }

    fn name(&self) -> String {
        self.qualified_name.clone()
    }
}

/// Captures a transform's output so the caller can feed it to
/// [`ClassMethodAdapter::apply`] afterward — `transform_method` needs a
/// `&mut` sink for its whole call, which would otherwise alias `method`
/// while `ClassMethodAdapter` is still borrowing it immutably via `class`.
#[derive(Default)]
pub struct CapturedMethodSink {
    pub instructions: Vec<Instruction>,
    pub try_catch: Vec<TryCatchEntry>,
}

impl MethodSink for CapturedMethodSink {
    fn replace(&mut self, instructions: Vec<Instruction>, try_catch: Vec<TryCatchEntry>) {
        self.instructions = instructions;
        self.try_catch = try_catch;
    }
}
