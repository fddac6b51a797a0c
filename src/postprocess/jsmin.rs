//! Byte level JavaScript minifier after Douglas Crockford's JSMin.
//!
//! Comments and insignificant whitespace are removed. String, template and regular expression
//! literals are copied untouched. Line feeds are kept where dropping them could change how
//! automatic semicolon insertion reads the program.

use crate::error::{BundlingError, BundlingResult, MinifyError, MinifyErrorKind};

use super::{ProcessingStatus, Processor, ids};

const EOF: i32 = -1;
const BOM_LEAD: i32 = 0xEF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Action {
  /// Output `a`, copy `b` to `a`, read the next `b`.
  OutputA,
  /// Copy `b` to `a`, read the next `b`.
  DeleteA,
  /// Read the next `b`.
  DeleteB,
}

struct JsMin<'a> {
  input: &'a [u8],
  position: usize,
  out: Vec<u8>,
  a: i32,
  b: i32,
  lookahead: i32,
  x: i32,
  y: i32,
  line: usize,
  column: usize,
}

/// Minify `source`.
pub fn minify(source: &str) -> Result<String, MinifyError> {
  let mut jsmin = JsMin::new(source.as_bytes());
  jsmin.run()?;
  Ok(String::from_utf8_lossy(&jsmin.out).into_owned())
}

impl<'a> JsMin<'a> {
  fn new(input: &'a [u8]) -> Self {
    Self {
      input,
      position: 0,
      out: Vec::with_capacity(input.len()),
      a: EOF,
      b: EOF,
      lookahead: EOF,
      x: EOF,
      y: EOF,
      line: 1,
      column: 0,
    }
  }

  fn error(&self, kind: MinifyErrorKind) -> MinifyError {
    MinifyError {
      kind,
      byte_index: self.position.saturating_sub(1),
      line: self.line,
      column: self.column,
    }
  }

  fn read(&mut self) -> i32 {
    let Some(&byte) = self.input.get(self.position) else {
      return EOF;
    };
    self.position += 1;
    if byte == b'\n' {
      self.line += 1;
      self.column = 0;
    } else {
      self.column += 1;
    }
    i32::from(byte)
  }

  /// Next character with control characters folded to a space and `\r` to `\n`.
  /// Tabs survive inside literals.
  fn get(&mut self, in_literal: bool) -> i32 {
    let mut c = self.lookahead;
    self.lookahead = EOF;
    if c == EOF {
      c = self.read();
    }
    if c >= i32::from(b' ') || c == i32::from(b'\n') || c == EOF || (in_literal && c == i32::from(b'\t')) {
      return c;
    }
    if c == i32::from(b'\r') {
      return i32::from(b'\n');
    }
    i32::from(b' ')
  }

  fn peek(&mut self) -> i32 {
    self.lookahead = self.get(false);
    self.lookahead
  }

  /// Next character, skipping comments. A block comment reads as a single space.
  fn next(&mut self) -> Result<i32, MinifyError> {
    let mut c = self.get(false);
    if c == i32::from(b'/') {
      match self.peek() {
        c2 if c2 == i32::from(b'/') => loop {
          c = self.get(false);
          if c <= i32::from(b'\n') {
            break;
          }
        },
        c2 if c2 == i32::from(b'*') => {
          self.get(false);
          loop {
            match self.get(false) {
              star if star == i32::from(b'*') => {
                if self.peek() == i32::from(b'/') {
                  self.get(false);
                  c = i32::from(b' ');
                  break;
                }
              }
              EOF => return Err(self.error(MinifyErrorKind::UnterminatedComment)),
              _ => {}
            }
          }
        }
        _ => {}
      }
    }
    self.y = self.x;
    self.x = c;
    Ok(c)
  }

  fn write(&mut self, c: i32) {
    if let Ok(byte) = u8::try_from(c) {
      self.out.push(byte);
    }
  }

  fn action(&mut self, action: Action) -> Result<(), MinifyError> {
    if action <= Action::OutputA {
      self.write(self.a);
      if (self.y == i32::from(b'\n') || self.y == i32::from(b' '))
        && is_arithmetic(self.a)
        && is_arithmetic(self.b)
      {
        self.write(self.y);
      }
    }

    if action <= Action::DeleteA {
      self.a = self.b;
      if is_quote(self.a) {
        self.copy_string()?;
      }
    }

    self.b = self.next()?;
    if self.b == i32::from(b'/') && precedes_regexp(self.a) {
      self.copy_regexp()?;
      self.b = self.next()?;
    }
    Ok(())
  }

  fn copy_string(&mut self) -> Result<(), MinifyError> {
    let quote = self.b;
    loop {
      self.write(self.a);
      self.a = self.get(true);
      if self.a == quote {
        break;
      }
      if self.a == i32::from(b'\\') {
        self.write(self.a);
        self.a = self.get(true);
      } else if self.a == i32::from(b'\n') && quote != i32::from(b'`') {
        return Err(self.error(MinifyErrorKind::UnterminatedString));
      }
      if self.a == EOF {
        return Err(self.error(MinifyErrorKind::UnterminatedString));
      }
    }
    Ok(())
  }

  fn copy_regexp(&mut self) -> Result<(), MinifyError> {
    self.write(self.a);
    if self.a == i32::from(b'/') || self.a == i32::from(b'*') {
      self.write(i32::from(b' '));
    }
    self.write(self.b);
    loop {
      self.a = self.get(false);
      if self.a == i32::from(b'[') {
        loop {
          self.write(self.a);
          self.a = self.get(false);
          if self.a == i32::from(b']') {
            break;
          }
          if self.a == i32::from(b'\\') {
            self.write(self.a);
            self.a = self.get(false);
          }
          if self.a <= i32::from(b'\n') {
            return Err(self.error(MinifyErrorKind::UnterminatedRegExp));
          }
        }
      } else if self.a == i32::from(b'/') {
        let following = self.peek();
        if following == i32::from(b'/') || following == i32::from(b'*') {
          return Err(self.error(MinifyErrorKind::UnterminatedRegExp));
        }
        break;
      } else if self.a == i32::from(b'\\') {
        self.write(self.a);
        self.a = self.get(false);
      }
      if self.a <= i32::from(b'\n') {
        return Err(self.error(MinifyErrorKind::UnterminatedRegExp));
      }
      self.write(self.a);
    }
    Ok(())
  }

  fn run(&mut self) -> Result<(), MinifyError> {
    if self.peek() == BOM_LEAD {
      self.get(false);
      self.get(false);
      self.get(false);
    }
    self.a = i32::from(b' ');
    self.action(Action::DeleteB)?;

    while self.a != EOF {
      let action = match self.a {
        space if space == i32::from(b' ') => {
          if is_alphanum(self.b) {
            Action::OutputA
          } else {
            Action::DeleteA
          }
        }
        newline if newline == i32::from(b'\n') => match self.b {
          b if is_one_of(b, b"{[(+-!~") => Action::OutputA,
          b if b == i32::from(b' ') => Action::DeleteB,
          b if is_alphanum(b) => Action::OutputA,
          _ => Action::DeleteA,
        },
        a => match self.b {
          b if b == i32::from(b' ') => {
            if is_alphanum(a) {
              Action::OutputA
            } else {
              Action::DeleteB
            }
          }
          b if b == i32::from(b'\n') => {
            if is_one_of(a, b"}])+-\"'`") || is_alphanum(a) {
              Action::OutputA
            } else {
              Action::DeleteB
            }
          }
          _ => Action::OutputA,
        },
      };
      self.action(action)?;
    }
    Ok(())
  }
}

fn is_one_of(c: i32, set: &[u8]) -> bool {
  u8::try_from(c).is_ok_and(|byte| set.contains(&byte))
}

fn is_alphanum(c: i32) -> bool {
  match u8::try_from(c) {
    Ok(byte) => byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b'$' | b'\\') || byte > 126,
    Err(_) => false,
  }
}

fn is_arithmetic(c: i32) -> bool {
  is_one_of(c, b"+-*/")
}

fn is_quote(c: i32) -> bool {
  is_one_of(c, b"'\"`")
}

/// Characters after which a `/` opens a regular expression. A `/` after `}` or `;` is division.
fn precedes_regexp(c: i32) -> bool {
  is_one_of(c, b"(,=:[!&|?+-~*/{\n")
}

/// `JSMin` processor.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsMinProcessor;

impl Processor for JsMinProcessor {
  fn id(&self) -> &str {
    ids::JSMIN
  }

  fn apply(&self, status: &mut ProcessingStatus<'_>, content: String) -> BundlingResult<String> {
    minify(&content).map_err(|source| BundlingError::Minify {
      path: status.current_path().to_string(),
      source,
    })
  }
}
