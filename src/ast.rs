//! Syntax tree produced by the parser.
//!
//! Every node kind is a variant of the closed [`Node`] enum carrying only the
//! fields it needs. Children are owned through `Box`/`Vec`, so the tree has no
//! sharing and no back-pointers.

use std::fmt;

use crate::tokenizer::Position;

/// Arithmetic operators, all left-associative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
  Add,
  Sub,
  Mul,
  Div,
}

impl BinaryOp {
  pub fn symbol(self) -> &'static str {
    match self {
      BinaryOp::Add => "+",
      BinaryOp::Sub => "-",
      BinaryOp::Mul => "*",
      BinaryOp::Div => "/",
    }
  }
}

/// Comparison operators. Only the parser accepts all of them; branch lowering
/// is defined for `==` alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
  Eq,
  Ne,
  Lt,
  Gt,
  Le,
  Ge,
}

impl CompareOp {
  pub fn symbol(self) -> &'static str {
    match self {
      CompareOp::Eq => "==",
      CompareOp::Ne => "!=",
      CompareOp::Lt => "<",
      CompareOp::Gt => ">",
      CompareOp::Le => "<=",
      CompareOp::Ge => ">=",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
  /// Top-level statements in source order.
  Root { statements: Vec<Node> },
  Number { value: i64 },
  Boolean { value: bool },
  Identifier { name: String, pos: Position },
  Assignment {
    name: String,
    value: Box<Node>,
    pos: Position,
  },
  BinaryOperator {
    op: BinaryOp,
    lhs: Box<Node>,
    rhs: Box<Node>,
  },
  ConditionOperator {
    op: CompareOp,
    lhs: Box<Node>,
    rhs: Box<Node>,
    pos: Position,
  },
  /// `then_block` is always a `Block`; `else_branch`, when present, an `Else`.
  If {
    condition: Box<Node>,
    then_block: Box<Node>,
    else_branch: Option<Box<Node>>,
  },
  Else { block: Box<Node> },
  Block { statements: Vec<Node> },
  /// `#name { ... }`; the body is a `Block` of `String` lines.
  Directive {
    name: String,
    body: Box<Node>,
    pos: Position,
  },
  String { text: String },
}

impl Node {
  pub fn number(value: i64) -> Self {
    Self::Number { value }
  }

  pub fn boolean(value: bool) -> Self {
    Self::Boolean { value }
  }

  pub fn identifier(name: impl Into<String>, pos: Position) -> Self {
    Self::Identifier {
      name: name.into(),
      pos,
    }
  }

  pub fn assignment(name: impl Into<String>, value: Node, pos: Position) -> Self {
    Self::Assignment {
      name: name.into(),
      value: Box::new(value),
      pos,
    }
  }

  pub fn binary(op: BinaryOp, lhs: Node, rhs: Node) -> Self {
    Self::BinaryOperator {
      op,
      lhs: Box::new(lhs),
      rhs: Box::new(rhs),
    }
  }

  pub fn condition(op: CompareOp, lhs: Node, rhs: Node, pos: Position) -> Self {
    Self::ConditionOperator {
      op,
      lhs: Box::new(lhs),
      rhs: Box::new(rhs),
      pos,
    }
  }

  pub fn if_else(condition: Node, then_block: Node, else_block: Option<Node>) -> Self {
    Self::If {
      condition: Box::new(condition),
      then_block: Box::new(then_block),
      else_branch: else_block.map(|block| {
        Box::new(Self::Else {
          block: Box::new(block),
        })
      }),
    }
  }

  pub fn block(statements: Vec<Node>) -> Self {
    Self::Block { statements }
  }

  pub fn directive(name: impl Into<String>, lines: Vec<String>, pos: Position) -> Self {
    let body = lines.into_iter().map(|text| Self::String { text }).collect();
    Self::Directive {
      name: name.into(),
      body: Box::new(Self::block(body)),
      pos,
    }
  }

  /// Name of the node kind, used in tree dumps and diagnostics.
  pub fn kind_name(&self) -> &'static str {
    match self {
      Node::Root { .. } => "Root",
      Node::Number { .. } => "Number",
      Node::Boolean { .. } => "Boolean",
      Node::Identifier { .. } => "Identifier",
      Node::Assignment { .. } => "Assignment",
      Node::BinaryOperator { .. } => "BinaryOperator",
      Node::ConditionOperator { .. } => "ConditionOperator",
      Node::If { .. } => "If",
      Node::Else { .. } => "Else",
      Node::Block { .. } => "Block",
      Node::Directive { .. } => "Directive",
      Node::String { .. } => "String",
    }
  }

  /// Direct children in evaluation order.
  pub fn children(&self) -> Vec<&Node> {
    match self {
      Node::Root { statements } | Node::Block { statements } => statements.iter().collect(),
      Node::Number { .. } | Node::Boolean { .. } | Node::Identifier { .. } | Node::String { .. } => {
        Vec::new()
      }
      Node::Assignment { value, .. } => vec![value.as_ref()],
      Node::BinaryOperator { lhs, rhs, .. } | Node::ConditionOperator { lhs, rhs, .. } => {
        vec![lhs.as_ref(), rhs.as_ref()]
      }
      Node::If {
        condition,
        then_block,
        else_branch,
      } => {
        let mut children = vec![condition.as_ref(), then_block.as_ref()];
        children.extend(else_branch.as_deref());
        children
      }
      Node::Else { block } => vec![block.as_ref()],
      Node::Directive { body, .. } => vec![body.as_ref()],
    }
  }

  fn label(&self) -> String {
    match self {
      Node::Number { value } => value.to_string(),
      Node::Boolean { value } => value.to_string(),
      Node::Identifier { name, .. } | Node::Assignment { name, .. } => name.clone(),
      Node::BinaryOperator { op, .. } => op.symbol().to_string(),
      Node::ConditionOperator { op, .. } => op.symbol().to_string(),
      Node::Directive { name, .. } => name.clone(),
      Node::String { text } => format!("{text:?}"),
      _ => String::new(),
    }
  }

  fn fmt_tree(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
    write!(f, "{:indent$}{}", "", self.kind_name(), indent = depth * 2)?;
    let label = self.label();
    if label.is_empty() {
      writeln!(f)?;
    } else {
      writeln!(f, ": {label}")?;
    }
    for child in self.children() {
      child.fmt_tree(f, depth + 1)?;
    }
    Ok(())
  }
}

/// Indented tree dump, one node per line.
impl fmt::Display for Node {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    self.fmt_tree(f, 0)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn tree_dump_indents_children() {
    let pos = Position::new(1, 1);
    let root = Node::Root {
      statements: vec![
        Node::assignment(
          "a",
          Node::binary(BinaryOp::Add, Node::number(1), Node::identifier("b", pos)),
          pos,
        ),
        Node::if_else(
          Node::boolean(true),
          Node::block(vec![]),
          Some(Node::block(vec![])),
        ),
      ],
    };
    let expected = "\
Root
  Assignment: a
    BinaryOperator: +
      Number: 1
      Identifier: b
  If
    Boolean: true
    Block
    Else
      Block
";
    assert_eq!(root.to_string(), expected);
  }

  #[test]
  fn directive_wraps_lines_in_block() {
    let node = Node::directive("asm", vec!["nop".into()], Position::new(1, 1));
    let Node::Directive { body, .. } = &node else {
      panic!("expected a directive");
    };
    assert_eq!(
      **body,
      Node::block(vec![Node::String {
        text: "nop".into()
      }])
    );
  }
}
