//! Shared error utilities used across the compilation pipeline.
//!
//! Every phase returns a [`CompileResult`]. Source-level diagnostics carry the
//! position of the offending token plus a rendered excerpt of the line with a
//! caret under the column, in the spirit of chibicc's `error_at`.

use std::io;
use std::path::PathBuf;

use snafu::Snafu;

use crate::tokenizer::Position;

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CompileError {
  #[snafu(display("{pos}: lexical error: {message}\n{excerpt}"))]
  Lexical {
    pos: Position,
    message: String,
    excerpt: String,
  },

  #[snafu(display("{pos}: syntax error: {message}\n{excerpt}"))]
  Syntax {
    pos: Position,
    message: String,
    excerpt: String,
  },

  #[snafu(display("{pos}: error: {message}\n{excerpt}"))]
  Semantic {
    pos: Position,
    message: String,
    excerpt: String,
  },

  #[snafu(display("failed to read '{}': {source}", path.display()))]
  ReadSource { path: PathBuf, source: io::Error },

  #[snafu(display("failed to write '{}': {source}", path.display()))]
  WriteOutput { path: PathBuf, source: io::Error },

  #[snafu(display("{tool}: {message}"))]
  Toolchain { tool: String, message: String },
}

impl CompileError {
  pub fn lexical(source: &str, pos: Position, message: impl Into<String>) -> Self {
    Self::Lexical {
      pos,
      message: message.into(),
      excerpt: excerpt(source, pos),
    }
  }

  pub fn syntax(source: &str, pos: Position, message: impl Into<String>) -> Self {
    Self::Syntax {
      pos,
      message: message.into(),
      excerpt: excerpt(source, pos),
    }
  }

  pub fn semantic(source: &str, pos: Position, message: impl Into<String>) -> Self {
    Self::Semantic {
      pos,
      message: message.into(),
      excerpt: excerpt(source, pos),
    }
  }

  /// Source position of the diagnostic, if it originated from the program text.
  pub fn position(&self) -> Option<Position> {
    match self {
      Self::Lexical { pos, .. } | Self::Syntax { pos, .. } | Self::Semantic { pos, .. } => {
        Some(*pos)
      }
      _ => None,
    }
  }
}

/// Render the line at `pos` with a caret under its column.
///
/// Positions past the end of the text (the `Eof` token) point just after the
/// last line.
fn excerpt(source: &str, pos: Position) -> String {
  let text = source
    .lines()
    .nth(pos.line.saturating_sub(1))
    .unwrap_or_default();
  let gutter = pos.line.to_string();
  let marker = format!("{}^", " ".repeat(pos.column.saturating_sub(1)));
  format!(
    "{gutter} | {text}\n{pad} | {marker}",
    pad = " ".repeat(gutter.len())
  )
}
