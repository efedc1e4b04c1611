//! Lexically scoped symbol table with a bounded slot budget.
//!
//! Every variable gets one 16-byte slot below the frame base. Slots are handed
//! out downward from a cursor; leaving a scope releases its slots and moves the
//! cursor back, so offsets are only reused once their owner is gone.

use std::collections::HashMap;

use log::trace;
use snafu::{Snafu, ensure};

/// Bytes reserved per variable. Keeps `sp` 16-byte aligned on AArch64.
pub const SLOT_SIZE: i64 = 16;

/// Number of live variable slots allowed when nothing else is configured.
pub const DEFAULT_FRAME_SLOTS: usize = 8;

#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum ScopeError {
  #[snafu(display("use of undeclared variable '{name}'"))]
  Undeclared { name: String },

  #[snafu(display(
    "cannot allocate '{name}': all {slots} variable slots of the frame are in use"
  ))]
  FrameExhausted { name: String, slots: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
  pub name: String,
  /// Signed displacement from the frame base; always negative.
  pub offset: i64,
}

/// Result of [`ScopeStack::declare`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
  pub symbol: Symbol,
  /// `true` when a new slot was allocated, `false` for a redeclaration.
  pub fresh: bool,
}

#[derive(Debug, Default)]
struct Scope {
  /// Declaration order, so slots are released last-in first-out.
  symbols: Vec<Symbol>,
  index: HashMap<String, usize>,
  /// Allocation cursor when the scope was entered.
  saved_cursor: i64,
}

#[derive(Debug)]
pub struct ScopeStack {
  scopes: Vec<Scope>,
  cursor: i64,
  frame_slots: usize,
}

impl ScopeStack {
  pub fn new(frame_slots: usize) -> Self {
    Self {
      scopes: Vec::new(),
      cursor: 0,
      frame_slots,
    }
  }

  pub fn enter_scope(&mut self) {
    self.scopes.push(Scope {
      saved_cursor: self.cursor,
      ..Scope::default()
    });
    trace!("enter scope #{}", self.scopes.len());
  }

  /// Declare `name` in the innermost scope.
  ///
  /// Redeclaring a name already present in that scope returns the existing
  /// slot. Outer scopes are not consulted; see [`ScopeStack::resolve_or_declare`].
  ///
  /// # Panics
  ///
  /// Panics if no scope has been entered.
  pub fn declare(&mut self, name: &str) -> Result<Declaration, ScopeError> {
    let live = self.live_slots();
    let cursor = self.cursor;
    let scope = self
      .scopes
      .last_mut()
      .expect("declare called outside of any scope");

    if let Some(&i) = scope.index.get(name) {
      return Ok(Declaration {
        symbol: scope.symbols[i].clone(),
        fresh: false,
      });
    }

    ensure!(
      live < self.frame_slots,
      FrameExhaustedSnafu {
        name,
        slots: self.frame_slots,
      }
    );

    let symbol = Symbol {
      name: name.to_string(),
      offset: cursor - SLOT_SIZE,
    };
    scope.index.insert(symbol.name.clone(), scope.symbols.len());
    scope.symbols.push(symbol.clone());
    self.cursor = symbol.offset;
    trace!("declare '{}' at offset {}", symbol.name, symbol.offset);

    Ok(Declaration {
      symbol,
      fresh: true,
    })
  }

  /// Nearest enclosing declaration of `name`.
  pub fn lookup(&self, name: &str) -> Result<&Symbol, ScopeError> {
    self
      .scopes
      .iter()
      .rev()
      .find_map(|scope| scope.index.get(name).map(|&i| &scope.symbols[i]))
      .ok_or_else(|| ScopeError::Undeclared {
        name: name.to_string(),
      })
  }

  /// Assignment target resolution: reuse the nearest visible slot, otherwise
  /// declare the name in the innermost scope.
  pub fn resolve_or_declare(&mut self, name: &str) -> Result<Declaration, ScopeError> {
    match self.lookup(name) {
      Ok(symbol) => Ok(Declaration {
        symbol: symbol.clone(),
        fresh: false,
      }),
      Err(_) => self.declare(name),
    }
  }

  /// Pop the innermost scope, returning its symbols in release order (most
  /// recent first). The caller emits one reclaim per returned symbol.
  ///
  /// # Panics
  ///
  /// Panics if no scope has been entered.
  pub fn exit_scope(&mut self) -> Vec<Symbol> {
    let scope = self
      .scopes
      .pop()
      .expect("exit_scope called without a matching enter_scope");
    self.cursor = scope.saved_cursor;
    trace!(
      "exit scope #{}, releasing {} slots",
      self.scopes.len() + 1,
      scope.symbols.len()
    );
    scope.symbols.into_iter().rev().collect()
  }

  /// Number of currently allocated slots across all scopes.
  pub fn live_slots(&self) -> usize {
    (-self.cursor / SLOT_SIZE) as usize
  }

  /// Current allocation cursor (lowest allocated offset, or 0).
  pub fn cursor(&self) -> i64 {
    self.cursor
  }
}

impl Default for ScopeStack {
  fn default() -> Self {
    Self::new(DEFAULT_FRAME_SLOTS)
  }
}
