//! Code generation: lower the syntax tree into AArch64 assembly.
//!
//! The emitter is a stack machine over two registers. Every expression leaves
//! its value in `x0`; a binary operator parks its left operand on the machine
//! stack while the right one is computed, then pops it into `x1`. Variables
//! live on the same stack in 16-byte slots reserved when first assigned and
//! released when their block ends.
//!
//! Because `sp` moves with every push, the generator tracks how far it sits
//! below the frame base (`sp` at entry) and addresses a slot at frame offset
//! `o` as `[sp, #(o - sp)]`.

use log::debug;

use crate::CompileOptions;
use crate::ast::{BinaryOp, CompareOp, Node};
use crate::error::{CompileError, CompileResult};
use crate::scope::{SLOT_SIZE, ScopeError, ScopeStack};
use crate::target::Target;
use crate::tokenizer::Position;

/// Largest scaled unsigned offset an 8-byte `ldr`/`str` can encode.
const MAX_SLOT_DISPLACEMENT: i64 = 32760;

/// Emit a complete program for `root`.
pub fn generate(root: &Node, source: &str, options: &CompileOptions) -> CompileResult<String> {
  let mut generator = Generator::new(source, options);
  generator.prologue();
  generator.emit_node(root)?;
  generator.epilogue();

  debug!(
    "generated {} bytes of assembly, {} if-labels",
    generator.asm.len(),
    generator.labels
  );
  Ok(generator.asm)
}

/// Per-compilation state. Nothing here outlives a single `generate` call.
struct Generator<'a> {
  source: &'a str,
  target: Target,
  asm: String,
  /// Simulated stack pointer, in bytes relative to the frame base (<= 0).
  sp: i64,
  /// Next free if-label index.
  labels: usize,
  scopes: ScopeStack,
  /// Join labels of the `if`s currently being emitted, innermost last.
  joins: Vec<usize>,
}

impl<'a> Generator<'a> {
  fn new(source: &'a str, options: &CompileOptions) -> Self {
    Self {
      source,
      target: options.target,
      asm: String::new(),
      sp: 0,
      labels: 0,
      scopes: ScopeStack::new(options.frame_slots),
      joins: Vec::new(),
    }
  }

  fn emit(&mut self, instruction: &str) {
    self.asm.push('\t');
    self.asm.push_str(instruction);
    self.asm.push('\n');
  }

  fn emit_label(&mut self, label: &str) {
    self.asm.push_str(label);
    self.asm.push_str(":\n");
  }

  fn prologue(&mut self) {
    let entry = self.target.entry_label();
    self.asm.push_str(".text\n");
    self.asm.push_str(&format!(".global {entry}\n"));
    self.asm.push_str(".align 2\n\n");
    self.emit_label(entry);
  }

  /// The exit status is whatever the last statement left in `x0`.
  fn epilogue(&mut self) {
    debug_assert_eq!(self.sp, 0, "stack must be back at the frame base");
    for instruction in self.target.exit_sequence() {
      self.emit(instruction);
    }
  }

  fn semantic(&self, pos: Position, message: impl Into<String>) -> CompileError {
    CompileError::semantic(self.source, pos, message)
  }

  fn scope_error(&self, pos: Position, err: ScopeError) -> CompileError {
    self.semantic(pos, err.to_string())
  }

  fn push(&mut self) {
    self.emit("str x0, [sp, #-16]!");
    self.sp -= 16;
  }

  fn pop(&mut self) {
    self.emit("ldr x1, [sp], #16");
    self.sp += 16;
  }

  /// `sp`-relative displacement of the slot at frame offset `offset`.
  fn slot(&self, offset: i64, pos: Position) -> CompileResult<i64> {
    let displacement = offset - self.sp;
    if displacement > MAX_SLOT_DISPLACEMENT {
      return Err(self.semantic(
        pos,
        format!(
          "variable is {displacement} bytes above the stack pointer, beyond the \
           {MAX_SLOT_DISPLACEMENT}-byte reach of a load or store"
        ),
      ));
    }
    Ok(displacement)
  }

  fn enter_scope(&mut self) {
    self.scopes.enter_scope();
  }

  /// Leave the innermost scope, giving its slots back to the stack.
  fn exit_scope(&mut self) {
    for _ in self.scopes.exit_scope() {
      self.emit(&format!("add sp, sp, #{SLOT_SIZE}"));
      self.sp += SLOT_SIZE;
    }
    debug_assert_eq!(self.sp, self.scopes.cursor());
  }

  fn emit_node(&mut self, node: &Node) -> CompileResult<()> {
    match node {
      Node::Root { statements } => {
        self.enter_scope();
        for stmt in statements {
          self.emit_node(stmt)?;
        }
        self.exit_scope();
      }
      Node::Block { statements } => {
        self.enter_scope();
        for stmt in statements {
          self.emit_node(stmt)?;
        }
        self.exit_scope();
        if let Some(&join) = self.joins.last() {
          self.emit(&format!("b _endif{join}"));
        }
      }
      Node::Number { value } => self.load_immediate(*value),
      Node::Boolean { value } => {
        let value = i64::from(*value);
        self.emit(&format!("mov x0, #{value}"));
      }
      Node::Identifier { name, pos } => {
        let offset = self
          .scopes
          .lookup(name)
          .map(|symbol| symbol.offset)
          .map_err(|err| self.scope_error(*pos, err))?;
        let displacement = self.slot(offset, *pos)?;
        self.emit(&format!("ldr x0, [sp, #{displacement}]"));
      }
      Node::Assignment { name, value, pos } => {
        self.emit_node(value)?;
        let declaration = self
          .scopes
          .resolve_or_declare(name)
          .map_err(|err| self.scope_error(*pos, err))?;
        if declaration.fresh {
          self.emit(&format!("sub sp, sp, #{SLOT_SIZE}"));
          self.sp -= SLOT_SIZE;
        }
        let displacement = self.slot(declaration.symbol.offset, *pos)?;
        self.emit(&format!("str x0, [sp, #{displacement}]"));
      }
      Node::BinaryOperator { op, lhs, rhs } => {
        self.emit_operands(lhs, rhs)?;
        let instruction = match op {
          BinaryOp::Add => "add x0, x1, x0",
          BinaryOp::Sub => "sub x0, x1, x0",
          BinaryOp::Mul => "mul x0, x1, x0",
          BinaryOp::Div => "sdiv x0, x1, x0",
        };
        self.emit(instruction);
      }
      Node::ConditionOperator { lhs, rhs, .. } => {
        // Flags only; the consuming `if` picks the branch.
        self.emit_operands(lhs, rhs)?;
        self.emit("cmp x1, x0");
      }
      Node::If {
        condition,
        then_block,
        else_branch,
      } => self.emit_if(condition, then_block, else_branch.as_deref())?,
      Node::Else { block } => self.emit_node(block)?,
      Node::Directive { name, body, pos } => {
        if name != "asm" {
          return Err(self.semantic(*pos, format!("unsupported directive '#{name}'")));
        }
        // Passed through untouched; the assembler is the only validator.
        for line in body.children() {
          match line {
            Node::String { text } => self.emit(text),
            other => {
              return Err(self.semantic(
                *pos,
                format!("unexpected {} inside #asm", other.kind_name()),
              ));
            }
          }
        }
      }
      Node::String { .. } => {}
    }
    Ok(())
  }

  /// Left operand in `x1`, right operand in `x0`.
  fn emit_operands(&mut self, lhs: &Node, rhs: &Node) -> CompileResult<()> {
    self.emit_node(lhs)?;
    self.push();
    self.emit_node(rhs)?;
    self.pop();
    Ok(())
  }

  fn emit_if(
    &mut self,
    condition: &Node,
    then_block: &Node,
    else_branch: Option<&Node>,
  ) -> CompileResult<()> {
    let label = self.labels;
    self.labels += 1;

    self.emit_node(condition)?;
    match condition {
      Node::ConditionOperator { op, pos, .. } => {
        let Some(code) = branch_if_false(*op) else {
          return Err(self.semantic(
            *pos,
            format!("unsupported condition operator '{}'", op.symbol()),
          ));
        };
        self.emit(&format!("b.{code} _else{label}"));
      }
      Node::Boolean { .. } => {
        self.emit("cmp x0, #1");
        self.emit(&format!("b.ne _else{label}"));
      }
      _ => {
        self.emit("cmp x0, #0");
        self.emit(&format!("b.eq _else{label}"));
      }
    }

    self.joins.push(label);
    self.emit_label(&format!("_if{label}"));
    self.emit_node(then_block)?;
    // Always emitted so the guard above has a target even without `else`.
    self.emit_label(&format!("_else{label}"));
    if let Some(else_branch) = else_branch {
      self.emit_node(else_branch)?;
    }
    self.joins.pop();
    self.emit_label(&format!("_endif{label}"));
    Ok(())
  }

  /// `mov` takes a 16-bit immediate; wider literals are built 16 bits at a time.
  fn load_immediate(&mut self, value: i64) {
    if (0..=0xFFFF).contains(&value) {
      self.emit(&format!("mov x0, #{value}"));
      return;
    }
    let bits = value as u64;
    self.emit(&format!("movz x0, #{}", bits & 0xFFFF));
    for shift in [16, 32, 48] {
      let chunk = (bits >> shift) & 0xFFFF;
      if chunk != 0 {
        self.emit(&format!("movk x0, #{chunk}, lsl #{shift}"));
      }
    }
  }
}

/// Condition code under which the `then` block is skipped.
fn branch_if_false(op: CompareOp) -> Option<&'static str> {
  match op {
    CompareOp::Eq => Some("ne"),
    CompareOp::Ne | CompareOp::Lt | CompareOp::Gt | CompareOp::Le | CompareOp::Ge => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::parser::parse;
  use crate::tokenizer::tokenize;

  fn options() -> CompileOptions {
    CompileOptions {
      target: Target::Linux,
      ..CompileOptions::default()
    }
  }

  fn compile(source: &str) -> CompileResult<String> {
    let root = parse(tokenize(source)?, source)?;
    generate(&root, source, &options())
  }

  /// Instruction and label lines between the entry label and the exit sequence.
  fn body(source: &str) -> Vec<String> {
    let asm = compile(source).unwrap();
    let lines: Vec<String> = asm.lines().map(|line| line.trim().to_string()).collect();
    let start = lines.iter().position(|line| line == "_start:").unwrap() + 1;
    let end = lines.len() - Target::Linux.exit_sequence().len();
    lines[start..end].to_vec()
  }

  #[test]
  fn program_layout() {
    let asm = compile("x = 5").unwrap();
    let expected = "\
.text
.global _start
.align 2

_start:
\tmov x0, #5
\tsub sp, sp, #16
\tstr x0, [sp, #0]
\tadd sp, sp, #16
\tmov x8, #93
\tsvc #0
";
    assert_eq!(asm, expected);
  }

  #[test]
  fn macos_entry_and_exit() {
    let root = parse(tokenize("").unwrap(), "").unwrap();
    let options = CompileOptions {
      target: Target::MacOs,
      ..CompileOptions::default()
    };
    let asm = generate(&root, "", &options).unwrap();
    assert!(asm.contains(".global _main\n"));
    assert!(asm.ends_with("_main:\n\tmov x16, #1\n\tsvc #0x80\n"));
  }

  #[test]
  fn reference_reads_the_slot_it_was_stored_to() {
    assert_eq!(
      body("x = 5\ny = x + 1"),
      vec![
        "mov x0, #5",
        "sub sp, sp, #16",
        "str x0, [sp, #0]",
        "ldr x0, [sp, #0]",
        "str x0, [sp, #-16]!",
        "mov x0, #1",
        "ldr x1, [sp], #16",
        "add x0, x1, x0",
        "sub sp, sp, #16",
        "str x0, [sp, #0]",
        "add sp, sp, #16",
        "add sp, sp, #16",
      ]
    );
  }

  #[test]
  fn slot_displacement_follows_pushes() {
    // `a` lives at frame offset -16; with one temporary pushed sp is at -32.
    let lines = body("a = 1\nb = 2 + a");
    assert!(lines.contains(&"ldr x0, [sp, #16]".to_string()), "{lines:?}");
  }

  #[test]
  fn reassignment_reuses_slot() {
    let lines = body("x = 1\nx = 2");
    assert_eq!(lines.iter().filter(|l| *l == "sub sp, sp, #16").count(), 1);
    assert_eq!(lines.iter().filter(|l| *l == "str x0, [sp, #0]").count(), 2);
  }

  #[test]
  fn operators_combine_left_and_right() {
    let lines = body("x = 7 - 2 * 3 / 1");
    let ops: Vec<_> = lines
      .iter()
      .filter(|l| l.ends_with("x1, x0"))
      .cloned()
      .collect();
    assert_eq!(
      ops,
      vec!["mul x0, x1, x0", "sdiv x0, x1, x0", "sub x0, x1, x0"]
    );
  }

  #[test]
  fn wide_literals_use_movk() {
    let lines = body("x = 305419896");
    assert_eq!(lines[0], "movz x0, #22136");
    assert_eq!(lines[1], "movk x0, #4660, lsl #16");
  }

  #[test]
  fn if_without_else_still_guards() {
    assert_eq!(
      body("if (true) { x = 1 }"),
      vec![
        "mov x0, #1",
        "cmp x0, #1",
        "b.ne _else0",
        "_if0:",
        "mov x0, #1",
        "sub sp, sp, #16",
        "str x0, [sp, #0]",
        "add sp, sp, #16",
        "b _endif0",
        "_else0:",
        "_endif0:",
      ]
    );
  }

  #[test]
  fn equality_condition_branches_on_ne() {
    let lines = body("a = 1\nif (a == 1) { b = 2 } else { b = 3 }");
    let control: Vec<_> = lines
      .iter()
      .filter(|l| l.starts_with('b') || l.starts_with('_') || l.starts_with("cmp"))
      .cloned()
      .collect();
    assert_eq!(
      control,
      vec![
        "cmp x1, x0",
        "b.ne _else0",
        "_if0:",
        "b _endif0",
        "_else0:",
        "b _endif0",
        "_endif0:",
      ]
    );
  }

  #[test]
  fn non_boolean_condition_tests_for_zero() {
    let lines = body("a = 3\nif (a) { a = 0 }");
    assert!(lines.windows(2).any(|w| w == ["cmp x0, #0", "b.eq _else0"]));
  }

  #[test]
  fn sibling_and_nested_ifs_get_distinct_labels() {
    let source = "\
if (true) { if (false) { x = 1 } }
if (true) { y = 2 }";
    let lines = body(source);
    let labels: Vec<_> = lines.iter().filter(|l| l.ends_with(':')).cloned().collect();
    assert_eq!(
      labels,
      vec![
        "_if0:", "_if1:", "_else1:", "_endif1:", "_else0:", "_endif0:", "_if2:", "_else2:",
        "_endif2:",
      ]
    );
    // The inner block jumps to its own join, the outer block to the outer one.
    let jumps: Vec<_> = lines.iter().filter(|l| l.starts_with("b _")).cloned().collect();
    assert_eq!(jumps, vec!["b _endif1", "b _endif0", "b _endif2"]);
  }

  #[test]
  fn block_variables_are_released_before_the_jump() {
    let lines = body("if (true) { a = 1 b = 2 }");
    let jump = lines.iter().position(|l| l == "b _endif0").unwrap();
    assert_eq!(lines[jump - 2..jump], ["add sp, sp, #16", "add sp, sp, #16"]);
  }

  #[test]
  fn assignment_in_block_updates_outer_variable() {
    let lines = body("x = 1\nif (true) { x = 2 }\ny = x");
    // Only x and y ever get a slot.
    assert_eq!(lines.iter().filter(|l| *l == "sub sp, sp, #16").count(), 2);
  }

  #[test]
  fn block_scoped_name_is_gone_after_the_block() {
    let err = compile("if (true) { t = 1 }\nx = t").unwrap_err();
    assert!(matches!(err, CompileError::Semantic { .. }));
    assert!(err.to_string().contains("undeclared variable 't'"), "{err}");
    assert_eq!(err.position(), Some(Position::new(2, 5)));
  }

  #[test]
  fn unsupported_condition_operator() {
    let err = compile("a = 1\nif (a < 2) { a = 3 }").unwrap_err();
    assert!(matches!(err, CompileError::Semantic { .. }));
    assert!(err.to_string().contains("unsupported condition operator '<'"));
  }

  #[test]
  fn frame_budget_overflow_is_an_error() {
    let source = "a = 1 b = 2 c = 3";
    let root = parse(tokenize(source).unwrap(), source).unwrap();
    let options = CompileOptions {
      target: Target::Linux,
      frame_slots: 2,
    };
    let err = generate(&root, source, &options).unwrap_err();
    assert!(err.to_string().contains("all 2 variable slots"), "{err}");
  }

  #[test]
  fn slot_out_of_load_store_reach_is_an_error() {
    let mut source: String = (0..2050).map(|i| format!("v{i} = 1\n")).collect();
    source.push_str("z = v0");
    let root = parse(tokenize(&source).unwrap(), &source).unwrap();
    let options = CompileOptions {
      target: Target::Linux,
      frame_slots: 4096,
    };
    let err = generate(&root, &source, &options).unwrap_err();
    assert!(matches!(err, CompileError::Semantic { .. }));
    assert!(err.to_string().contains("32760-byte reach"), "{err}");
    assert_eq!(err.position(), Some(Position::new(2051, 5)));
  }

  #[test]
  fn deepest_reachable_slot_still_compiles() {
    // 2048 live slots put `v0` exactly 32752 bytes above `sp`.
    let mut source: String = (0..2048).map(|i| format!("v{i} = 1\n")).collect();
    source.push_str("v2047 = v0");
    let root = parse(tokenize(&source).unwrap(), &source).unwrap();
    let options = CompileOptions {
      target: Target::Linux,
      frame_slots: 4096,
    };
    let asm = generate(&root, &source, &options).unwrap();
    assert!(asm.contains("\tldr x0, [sp, #32752]\n"));
  }

  #[test]
  fn asm_lines_are_verbatim() {
    assert_eq!(
      body("#asm {\n    mov x0, #42\n  svc #0x80 // raw\n}"),
      vec!["mov x0, #42", "svc #0x80 // raw"]
    );
  }

  #[test]
  fn comparison_as_value_only_sets_flags() {
    let lines = body("x = 1 == 1");
    assert!(lines.contains(&"cmp x1, x0".to_string()));
    assert!(!lines.iter().any(|l| l.starts_with("b")));
  }
}
