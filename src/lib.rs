//! Crate root: wires together the compilation pipeline.
//!
//! The stages are small and run strictly one after another over the whole
//! input:
//! - `tokenizer` performs lexical analysis and produces a flat token stream.
//! - `parser` owns all syntactic knowledge and returns the statement tree.
//! - `scope` maps variable names to stack slots while code is generated.
//! - `codegen` lowers the tree into AArch64 assembly for a `target`.
//! - `driver` reads sources, writes outputs and runs the system toolchain.
//! - `error` centralises reporting utilities shared by the other modules.
//!
//! All state lives in values created per call, so independent compilations
//! never interfere with each other.

pub mod ast;
pub mod driver;
pub mod error;
pub mod parser;
pub mod scope;
pub mod target;
pub mod tokenizer;

mod codegen;

pub use codegen::generate;
pub use error::{CompileError, CompileResult};
pub use target::Target;

/// Knobs for a single compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileOptions {
  pub target: Target,
  /// Maximum number of variables alive at the same time.
  pub frame_slots: usize,
}

impl Default for CompileOptions {
  fn default() -> Self {
    Self {
      target: Target::host(),
      frame_slots: scope::DEFAULT_FRAME_SLOTS,
    }
  }
}

/// Compile a source string into AArch64 assembly.
pub fn generate_assembly(source: &str, options: &CompileOptions) -> CompileResult<String> {
  let tokens = tokenizer::tokenize(source)?;
  let program = parser::parse(tokens, source)?;
  codegen::generate(&program, source, options)
}
