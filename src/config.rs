//! # Configuration document model and parser.
//!
//! The configuration file declares independent processes, each an ordered
//! chain of statements:
//!
//! ```text
//! # interfaces come up in order, go down in reverse
//! process lan {
//!     net.backend.waitdevice("eth0");
//!     net.up("eth0") dev;
//!     var("10.0.0.1") addr;
//!     net.ipv4.addr(dev.name, addr);
//! }
//! ```
//!
//! A statement is a dotted module-type name, a parenthesized argument list,
//! an optional local name, and a semicolon. Arguments are either double-quoted
//! string literals or dotted name sequences: the first token names an earlier
//! statement in the same process, the remaining tokens (joined with `.`) form
//! the variable path resolved against it at each advance. `#` starts a line
//! comment.
//!
//! Parsing produces a plain [`Document`] tree; module-type lookup and
//! argument construction happen later, at template load
//! ([`StatementTemplate::load`](crate::engine::StatementTemplate::load)).
//! Parse errors carry the 1-based line of the offending token.

use crate::error::LoadError;

/// A parsed configuration document: the ordered list of declared processes.
#[derive(Debug, Clone)]
pub struct Document {
    /// Declared processes, in file order.
    pub processes: Vec<ProcessDecl>,
}

/// One `process name { ... }` block.
#[derive(Debug, Clone)]
pub struct ProcessDecl {
    /// Process name.
    pub name: String,
    /// Statements, in declaration order.
    pub statements: Vec<StatementDecl>,
}

/// One statement within a process.
#[derive(Debug, Clone)]
pub struct StatementDecl {
    /// Module-type token sequence (`net.ipv4.addr` → `["net","ipv4","addr"]`).
    pub module: Vec<String>,
    /// Arguments, in declaration order.
    pub args: Vec<ArgDecl>,
    /// Optional local name; absent means the statement is unreferenceable.
    pub name: Option<String>,
    /// Line the statement starts on, for load diagnostics.
    pub line: usize,
}

/// One argument node.
#[derive(Debug, Clone)]
pub enum ArgDecl {
    /// A string literal.
    Str(String),
    /// A variable reference: first token is the target statement name, the
    /// remaining tokens form the dotted path.
    Ref(Vec<String>),
}

/// Parses a configuration document.
pub fn parse(input: &str) -> Result<Document, LoadError> {
    let tokens = lex(input)?;
    Parser { tokens, pos: 0 }.document()
}

// ---- Lexer ----

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Ident(String),
    Str(String),
    LBrace,
    RBrace,
    LParen,
    RParen,
    Comma,
    Semi,
    Dot,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    line: usize,
}

fn lex(input: &str) -> Result<Vec<Token>, LoadError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    let mut line = 1;

    while let Some(&c) = chars.peek() {
        match c {
            '\n' => {
                line += 1;
                chars.next();
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            '#' => {
                while let Some(&c) = chars.peek() {
                    if c == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            '{' | '}' | '(' | ')' | ',' | ';' | '.' => {
                chars.next();
                let kind = match c {
                    '{' => TokenKind::LBrace,
                    '}' => TokenKind::RBrace,
                    '(' => TokenKind::LParen,
                    ')' => TokenKind::RParen,
                    ',' => TokenKind::Comma,
                    ';' => TokenKind::Semi,
                    _ => TokenKind::Dot,
                };
                tokens.push(Token { kind, line });
            }
            '"' => {
                chars.next();
                let start_line = line;
                let mut s = String::new();
                loop {
                    match chars.next() {
                        None => {
                            return Err(LoadError::Parse {
                                line: start_line,
                                message: "unterminated string literal".into(),
                            });
                        }
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some('"') => s.push('"'),
                            Some('\\') => s.push('\\'),
                            Some('n') => s.push('\n'),
                            Some('t') => s.push('\t'),
                            other => {
                                return Err(LoadError::Parse {
                                    line: start_line,
                                    message: format!("bad escape {other:?} in string literal"),
                                });
                            }
                        },
                        Some('\n') => {
                            line += 1;
                            s.push('\n');
                        }
                        Some(c) => s.push(c),
                    }
                }
                tokens.push(Token {
                    kind: TokenKind::Str(s),
                    line: start_line,
                });
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut s = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        s.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token {
                    kind: TokenKind::Ident(s),
                    line,
                });
            }
            c => {
                return Err(LoadError::Parse {
                    line,
                    message: format!("unexpected character {c:?}"),
                });
            }
        }
    }

    Ok(tokens)
}

// ---- Parser ----

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn document(mut self) -> Result<Document, LoadError> {
        let mut processes = Vec::new();
        while self.peek().is_some() {
            processes.push(self.process()?);
        }
        Ok(Document { processes })
    }

    fn process(&mut self) -> Result<ProcessDecl, LoadError> {
        let kw = self.ident("'process'")?;
        if kw != "process" {
            return Err(self.err_prev(format!("expected 'process', found '{kw}'")));
        }
        let name = self.ident("process name")?;
        self.expect(TokenKind::LBrace, "'{'")?;

        let mut statements = Vec::new();
        loop {
            match self.peek() {
                Some(TokenKind::RBrace) => {
                    self.pos += 1;
                    break;
                }
                Some(_) => statements.push(self.statement()?),
                None => return Err(self.err_eof("'}'")),
            }
        }

        Ok(ProcessDecl { name, statements })
    }

    fn statement(&mut self) -> Result<StatementDecl, LoadError> {
        let line = self.current_line();
        let module = self.dotted("module type")?;
        self.expect(TokenKind::LParen, "'('")?;

        let mut args = Vec::new();
        if self.peek() != Some(&TokenKind::RParen) {
            loop {
                args.push(self.arg()?);
                match self.peek() {
                    Some(TokenKind::Comma) => {
                        self.pos += 1;
                    }
                    Some(TokenKind::RParen) => break,
                    _ => return Err(self.err_here("',' or ')'")),
                }
            }
        }
        self.expect(TokenKind::RParen, "')'")?;

        let name = match self.peek() {
            Some(TokenKind::Ident(_)) => Some(self.ident("statement name")?),
            _ => None,
        };
        self.expect(TokenKind::Semi, "';'")?;

        Ok(StatementDecl {
            module,
            args,
            name,
            line,
        })
    }

    fn arg(&mut self) -> Result<ArgDecl, LoadError> {
        match self.peek() {
            Some(TokenKind::Str(_)) => {
                let Some(TokenKind::Str(s)) = self.next_kind() else {
                    unreachable!()
                };
                Ok(ArgDecl::Str(s))
            }
            Some(TokenKind::Ident(_)) => Ok(ArgDecl::Ref(self.dotted("variable reference")?)),
            _ => Err(self.err_here("argument (string literal or variable reference)")),
        }
    }

    /// `ident ('.' ident)*`
    fn dotted(&mut self, what: &str) -> Result<Vec<String>, LoadError> {
        let mut parts = vec![self.ident(what)?];
        while self.peek() == Some(&TokenKind::Dot) {
            self.pos += 1;
            parts.push(self.ident("name after '.'")?);
        }
        Ok(parts)
    }

    fn ident(&mut self, what: &str) -> Result<String, LoadError> {
        match self.next_kind() {
            Some(TokenKind::Ident(s)) => Ok(s),
            Some(_) => Err(self.err_prev(format!("expected {what}"))),
            None => Err(self.err_eof(what)),
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<(), LoadError> {
        match self.next_kind() {
            Some(k) if k == kind => Ok(()),
            Some(_) => Err(self.err_prev(format!("expected {what}"))),
            None => Err(self.err_eof(what)),
        }
    }

    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn next_kind(&mut self) -> Option<TokenKind> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t.map(|t| t.kind)
    }

    fn current_line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(1, |t| t.line)
    }

    fn err_here(&self, what: &str) -> LoadError {
        LoadError::Parse {
            line: self.current_line(),
            message: format!("expected {what}"),
        }
    }

    fn err_prev(&self, message: String) -> LoadError {
        let line = self.tokens.get(self.pos.saturating_sub(1)).map_or(1, |t| t.line);
        LoadError::Parse { line, message }
    }

    fn err_eof(&self, what: &str) -> LoadError {
        LoadError::Parse {
            line: self.tokens.last().map_or(1, |t| t.line),
            message: format!("unexpected end of input, expected {what}"),
        }
    }
}
