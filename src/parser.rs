//! Recursive-descent parser producing the statement tree.
//!
//! The expression grammar is a precedence-climbing ladder of helpers, tightest
//! binding first: `parse_factor` → `parse_term` (`*`, `/`) → `parse_expr`
//! (`+`, `-`, then comparisons). Comparisons take a single term on their right
//! and each further comparison wraps everything parsed so far, so
//! `a == b == c` is `(a == b) == c`.
//!
//! Statements are assignments, `if`/`else` and `#asm` directives. There is no
//! recovery: the first mismatch aborts the parse.

use log::debug;

use crate::ast::{BinaryOp, CompareOp, Node};
use crate::error::{CompileError, CompileResult};
use crate::tokenizer::{Token, TokenKind};

/// Parse a whole program into a `Root` node.
pub fn parse(tokens: Vec<Token>, source: &str) -> CompileResult<Node> {
  let mut stream = TokenStream::new(tokens, source);
  let mut statements = Vec::new();

  while !stream.is_eof() {
    statements.push(parse_stmt(&mut stream)?);
  }

  debug!("parsed {} top-level statements", statements.len());
  Ok(Node::Root { statements })
}

fn parse_stmt(stream: &mut TokenStream) -> CompileResult<Node> {
  match (stream.peek(0).kind, stream.peek(1).kind) {
    (TokenKind::Ident, TokenKind::Assign) => parse_assignment(stream),
    (TokenKind::If, _) => parse_if(stream),
    (TokenKind::Asm, _) => parse_directive(stream),
    _ => {
      let token = stream.peek(0);
      Err(stream.error_at(&token, format!("{} was not expected here", token.kind)))
    }
  }
}

fn parse_assignment(stream: &mut TokenStream) -> CompileResult<Node> {
  let target = stream.advance();
  stream.advance(); // '='
  let value = parse_expr(stream)?;
  Ok(Node::assignment(target.text, value, target.pos))
}

fn parse_if(stream: &mut TokenStream) -> CompileResult<Node> {
  stream.advance(); // 'if'
  stream.expect(TokenKind::LParen, "'(' after 'if'")?;
  let condition = parse_expr(stream)?;
  stream.expect(TokenKind::RParen, "')' to close the if condition")?;

  stream.expect(TokenKind::LBrace, "'{' after the if condition")?;
  let then_block = parse_block_body(stream)?;

  // Only an `else` directly after the closing brace belongs to this `if`.
  let else_block = if stream.matches(TokenKind::Else) {
    stream.expect(TokenKind::LBrace, "'{' after 'else'")?;
    Some(parse_block_body(stream)?)
  } else {
    None
  };

  Ok(Node::if_else(condition, then_block, else_block))
}

/// Statements up to and including the closing `}`; the `{` is already consumed.
fn parse_block_body(stream: &mut TokenStream) -> CompileResult<Node> {
  let mut statements = Vec::new();
  while !stream.matches(TokenKind::RBrace) {
    if stream.is_eof() {
      let token = stream.peek(0);
      return Err(stream.error_at(&token, "expected '}' to close the block, but got EOF"));
    }
    statements.push(parse_stmt(stream)?);
  }
  Ok(Node::block(statements))
}

fn parse_directive(stream: &mut TokenStream) -> CompileResult<Node> {
  let directive = stream.advance();
  stream.expect(TokenKind::LBrace, "'{' after #asm")?;

  let mut lines = Vec::new();
  while stream.peek(0).kind == TokenKind::Str {
    lines.push(stream.advance().text);
  }
  stream.expect(TokenKind::RBrace, "'}' to close the #asm block")?;

  Ok(Node::directive("asm", lines, directive.pos))
}

fn parse_expr(stream: &mut TokenStream) -> CompileResult<Node> {
  let mut node = parse_term(stream)?;

  loop {
    let op = match stream.peek(0).kind {
      TokenKind::Plus => BinaryOp::Add,
      TokenKind::Minus => BinaryOp::Sub,
      _ => break,
    };
    stream.advance();
    let rhs = parse_term(stream)?;
    node = Node::binary(op, node, rhs);
  }

  loop {
    let op = match stream.peek(0).kind {
      TokenKind::EqEq => CompareOp::Eq,
      TokenKind::NotEq => CompareOp::Ne,
      TokenKind::Lt => CompareOp::Lt,
      TokenKind::Gt => CompareOp::Gt,
      TokenKind::Le => CompareOp::Le,
      TokenKind::Ge => CompareOp::Ge,
      _ => break,
    };
    let pos = stream.advance().pos;
    let rhs = parse_term(stream)?;
    node = Node::condition(op, node, rhs, pos);
  }

  Ok(node)
}

fn parse_term(stream: &mut TokenStream) -> CompileResult<Node> {
  let mut node = parse_factor(stream)?;

  loop {
    let op = match stream.peek(0).kind {
      TokenKind::Star => BinaryOp::Mul,
      TokenKind::Slash => BinaryOp::Div,
      _ => break,
    };
    stream.advance();
    let rhs = parse_factor(stream)?;
    node = Node::binary(op, node, rhs);
  }

  Ok(node)
}

fn parse_factor(stream: &mut TokenStream) -> CompileResult<Node> {
  let token = stream.peek(0);
  match token.kind {
    TokenKind::Int => {
      let value = token
        .text
        .parse::<i64>()
        .map_err(|err| stream.error_at(&token, format!("invalid number: {err}")))?;
      stream.advance();
      Ok(Node::number(value))
    }
    TokenKind::Ident => {
      let token = stream.advance();
      Ok(Node::identifier(token.text, token.pos))
    }
    TokenKind::Bool => {
      let value = token.text == "true";
      stream.advance();
      Ok(Node::boolean(value))
    }
    TokenKind::LParen => {
      let open = stream.advance();
      let inner = parse_expr(stream)?;
      if !stream.matches(TokenKind::RParen) {
        let found = stream.peek(0);
        return Err(stream.error_at(
          &found,
          format!(
            "unmatched parenthesis opened at {}: expected ')', but got {}",
            open.pos, found.kind
          ),
        ));
      }
      Ok(inner)
    }
    _ => Err(stream.error_at(
      &token,
      format!("expected an expression, but got {}", token.kind),
    )),
  }
}

/// Lightweight cursor over the token vector.
///
/// The cursor only moves forward. Looking past the end yields the trailing
/// `Eof` token, so lookahead never fails.
struct TokenStream<'a> {
  tokens: Vec<Token>,
  source: &'a str,
  pos: usize,
}

impl<'a> TokenStream<'a> {
  /// Take ownership of the token stream; the parser will advance `pos` as it consumes input.
  fn new(mut tokens: Vec<Token>, source: &'a str) -> Self {
    if tokens.last().is_none_or(|token| token.kind != TokenKind::Eof) {
      let pos = tokens.last().map(|token| token.pos).unwrap_or_default();
      tokens.push(Token::new(TokenKind::Eof, "", pos));
    }
    Self {
      tokens,
      source,
      pos: 0,
    }
  }

  /// Token `ahead` positions past the cursor without consuming anything.
  fn peek(&self, ahead: usize) -> Token {
    let last = self.tokens.len() - 1;
    self.tokens[(self.pos + ahead).min(last)].clone()
  }

  fn advance(&mut self) -> Token {
    let token = self.peek(0);
    if self.pos < self.tokens.len() - 1 {
      self.pos += 1;
    }
    token
  }

  /// Consume the current token if it has the given kind.
  fn matches(&mut self, kind: TokenKind) -> bool {
    if self.peek(0).kind == kind {
      self.advance();
      return true;
    }
    false
  }

  fn expect(&mut self, kind: TokenKind, what: &str) -> CompileResult<Token> {
    let token = self.peek(0);
    if token.kind == kind {
      return Ok(self.advance());
    }
    Err(self.error_at(&token, format!("expected {what}, but got {}", token.kind)))
  }

  fn is_eof(&self) -> bool {
    self.peek(0).kind == TokenKind::Eof
  }

  fn error_at(&self, token: &Token, message: impl Into<String>) -> CompileError {
    CompileError::syntax(self.source, token.pos, message)
  }
}
