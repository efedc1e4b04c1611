//! Lexical analysis: turns the raw input string into a vector of tokens.
//!
//! The tokenizer knows nothing about semantics beyond recognising keywords,
//! operators and literals. Two-character operators are matched with one byte
//! of lookahead before falling back to the single-character form. The body of
//! an `#asm` directive is not tokenized at all: each of its lines is handed
//! through as an opaque string token.

use std::fmt;

use log::debug;

use crate::error::{CompileError, CompileResult};

/// 1-based line and column of a token's first character.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Position {
  pub line: usize,
  pub column: usize,
}

impl Position {
  pub fn new(line: usize, column: usize) -> Self {
    Self { line, column }
  }
}

impl fmt::Display for Position {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.line, self.column)
  }
}

/// Kinds of tokens recognised by the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
  Int,
  Ident,
  Bool,
  Str,
  If,
  Else,
  Asm,
  Assign,
  Plus,
  Minus,
  Star,
  Slash,
  EqEq,
  NotEq,
  Lt,
  Gt,
  Le,
  Ge,
  LParen,
  RParen,
  LBrace,
  RBrace,
  Eof,
}

impl fmt::Display for TokenKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      TokenKind::Int => "number",
      TokenKind::Ident => "identifier",
      TokenKind::Bool => "boolean",
      TokenKind::Str => "string",
      TokenKind::If => "if",
      TokenKind::Else => "else",
      TokenKind::Asm => "#asm",
      TokenKind::Assign => "=",
      TokenKind::Plus => "+",
      TokenKind::Minus => "-",
      TokenKind::Star => "*",
      TokenKind::Slash => "/",
      TokenKind::EqEq => "==",
      TokenKind::NotEq => "!=",
      TokenKind::Lt => "<",
      TokenKind::Gt => ">",
      TokenKind::Le => "<=",
      TokenKind::Ge => ">=",
      TokenKind::LParen => "(",
      TokenKind::RParen => ")",
      TokenKind::LBrace => "{",
      TokenKind::RBrace => "}",
      TokenKind::Eof => "EOF",
    };
    write!(f, "'{name}'")
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
  pub kind: TokenKind,
  /// Literal text for numbers, identifiers, booleans and strings; empty otherwise.
  pub text: String,
  pub pos: Position,
}

impl Token {
  pub fn new(kind: TokenKind, text: impl Into<String>, pos: Position) -> Self {
    Self {
      kind,
      text: text.into(),
      pos,
    }
  }
}

impl fmt::Display for Token {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.text.is_empty() {
      write!(f, "{} {}", self.pos, self.kind)
    } else {
      write!(f, "{} {} {}", self.pos, self.kind, self.text)
    }
  }
}

/// Lex the input into a flat vector of tokens terminated by an `Eof` marker.
pub fn tokenize(input: &str) -> CompileResult<Vec<Token>> {
  let mut lexer = Lexer::new(input);
  let tokens = lexer.run()?;
  debug!("tokenized {} bytes into {} tokens", input.len(), tokens.len());
  Ok(tokens)
}

/// Byte cursor that keeps line/column in step with the offset.
struct Lexer<'a> {
  input: &'a str,
  bytes: &'a [u8],
  i: usize,
  line: usize,
  column: usize,
  tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
  fn new(input: &'a str) -> Self {
    Self {
      input,
      bytes: input.as_bytes(),
      i: 0,
      line: 1,
      column: 1,
      tokens: Vec::new(),
    }
  }

  fn pos(&self) -> Position {
    Position::new(self.line, self.column)
  }

  fn peek_byte(&self, ahead: usize) -> Option<u8> {
    self.bytes.get(self.i + ahead).copied()
  }

  fn bump(&mut self) {
    if let Some(c) = self.peek_byte(0) {
      self.i += 1;
      if c == b'\n' {
        self.line += 1;
        self.column = 1;
      } else if c & 0xC0 != 0x80 {
        // Continuation bytes of a multi-byte character share its column.
        self.column += 1;
      }
    }
  }

  fn bump_while(&mut self, pred: impl Fn(u8) -> bool) -> &'a str {
    let input = self.input;
    let start = self.i;
    while self.peek_byte(0).is_some_and(&pred) {
      self.bump();
    }
    &input[start..self.i]
  }

  fn push(&mut self, kind: TokenKind, text: impl Into<String>, pos: Position) {
    self.tokens.push(Token::new(kind, text, pos));
  }

  /// Consume `len` bytes of punctuation and record it.
  fn punct(&mut self, kind: TokenKind, len: usize) {
    let pos = self.pos();
    for _ in 0..len {
      self.bump();
    }
    self.push(kind, "", pos);
  }

  fn error(&self, pos: Position, message: impl Into<String>) -> CompileError {
    CompileError::lexical(self.input, pos, message)
  }

  fn run(&mut self) -> CompileResult<Vec<Token>> {
    while let Some(c) = self.peek_byte(0) {
      let pos = self.pos();

      if c.is_ascii_whitespace() {
        self.bump();
        continue;
      }

      if c == b'/' && self.peek_byte(1) == Some(b'/') {
        self.bump_while(|b| b != b'\n');
        continue;
      }

      if c.is_ascii_alphabetic() {
        let word = self.bump_while(|b| b.is_ascii_alphanumeric());
        let kind = match word {
          "true" | "false" => TokenKind::Bool,
          "if" => TokenKind::If,
          "else" => TokenKind::Else,
          _ => TokenKind::Ident,
        };
        let text = if matches!(kind, TokenKind::Bool | TokenKind::Ident) {
          word
        } else {
          ""
        };
        self.push(kind, text, pos);
        continue;
      }

      if c.is_ascii_digit() {
        let digits = self.bump_while(|b| b.is_ascii_digit());
        digits
          .parse::<i64>()
          .map_err(|err| self.error(pos, format!("invalid number '{digits}': {err}")))?;
        self.push(TokenKind::Int, digits, pos);
        continue;
      }

      match c {
        b'"' => self.string()?,
        b'#' => self.directive()?,
        b'=' => match self.peek_byte(1) {
          Some(b'=') => self.punct(TokenKind::EqEq, 2),
          _ => self.punct(TokenKind::Assign, 1),
        },
        b'!' => match self.peek_byte(1) {
          Some(b'=') => self.punct(TokenKind::NotEq, 2),
          _ => return Err(self.error(pos, "expected '=' after '!'")),
        },
        b'<' => match self.peek_byte(1) {
          Some(b'=') => self.punct(TokenKind::Le, 2),
          _ => self.punct(TokenKind::Lt, 1),
        },
        b'>' => match self.peek_byte(1) {
          Some(b'=') => self.punct(TokenKind::Ge, 2),
          _ => self.punct(TokenKind::Gt, 1),
        },
        b'+' => self.punct(TokenKind::Plus, 1),
        b'-' => self.punct(TokenKind::Minus, 1),
        b'*' => self.punct(TokenKind::Star, 1),
        b'/' => self.punct(TokenKind::Slash, 1),
        b'(' => self.punct(TokenKind::LParen, 1),
        b')' => self.punct(TokenKind::RParen, 1),
        b'{' => self.punct(TokenKind::LBrace, 1),
        b'}' => self.punct(TokenKind::RBrace, 1),
        _ => {
          let invalid = self.input[self.i..].chars().next().unwrap_or('\0');
          return Err(self.error(pos, format!("unrecognized character '{invalid}'")));
        }
      }
    }

    let eof = self.pos();
    self.push(TokenKind::Eof, "", eof);
    Ok(std::mem::take(&mut self.tokens))
  }

  fn string(&mut self) -> CompileResult<()> {
    let pos = self.pos();
    self.bump();
    let text = self.bump_while(|b| b != b'"');
    if self.peek_byte(0).is_none() {
      return Err(self.error(pos, "unterminated string literal"));
    }
    self.bump();
    self.push(TokenKind::Str, text, pos);
    Ok(())
  }

  fn directive(&mut self) -> CompileResult<()> {
    let pos = self.pos();
    self.bump();
    let name = self.bump_while(|b| b.is_ascii_alphanumeric());
    if name != "asm" {
      return Err(self.error(pos, format!("unsupported compiler directive '#{name}'")));
    }
    self.push(TokenKind::Asm, "", pos);
    self.raw_block()
  }

  /// Lex the `{ ... }` body of `#asm`, one `Str` token per non-empty line.
  fn raw_block(&mut self) -> CompileResult<()> {
    self.bump_while(|b| b.is_ascii_whitespace());
    if self.peek_byte(0) != Some(b'{') {
      let pos = self.pos();
      return Err(self.error(pos, "expected '{' after #asm"));
    }
    self.punct(TokenKind::LBrace, 1);

    let mut depth = 0usize;
    let mut line_start = self.i;
    let mut line_pos = self.pos();
    // Braces after `//` on a raw line are commentary.
    let mut in_comment = false;

    loop {
      let Some(c) = self.peek_byte(0) else {
        let pos = self.pos();
        return Err(self.error(pos, "unterminated #asm block"));
      };

      match c {
        b'\n' => {}
        _ if in_comment => {
          self.bump();
          continue;
        }
        b'/' if self.peek_byte(1) == Some(b'/') => in_comment = true,
        _ => {}
      }

      match c {
        b'{' => depth += 1,
        b'}' if depth > 0 => depth -= 1,
        b'}' => {
          self.raw_line(line_start, line_pos);
          self.punct(TokenKind::RBrace, 1);
          return Ok(());
        }
        b'\n' => {
          self.raw_line(line_start, line_pos);
          self.bump();
          in_comment = false;
          line_start = self.i;
          line_pos = self.pos();
          continue;
        }
        _ => {}
      }
      self.bump();
    }
  }

  fn raw_line(&mut self, start: usize, start_pos: Position) {
    let input = self.input;
    let raw = &input[start..self.i];
    let text = raw.trim();
    if text.is_empty() {
      return;
    }
    let indent = raw.len() - raw.trim_start().len();
    let pos = Position::new(start_pos.line, start_pos.column + indent);
    self.push(TokenKind::Str, text, pos);
  }
}
