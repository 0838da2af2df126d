//! Recursive-descent parser (spec §4.1.2) turning a preprocessed byte
//! stream into a [`Config`] AST.

use crate::error::{ConfigError, Diagnostics, DiagnosticKind, Severity};

use super::ast::{Class, Config, Definition, Expr, Variable};
use super::lineref::Lineref;

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Str(String),
    Int(i32),
    Float(f32),
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Colon,
    Semi,
    Comma,
    Eq,
    PlusEq,
    Eof,
}

struct Lexer<'a> {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    _src: &'a str,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            chars: src.chars().collect(),
            pos: 0,
            line: 1,
            _src: src,
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek_char() {
            if c.is_whitespace() {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn next_token(&mut self) -> Result<(Tok, u32), ConfigError> {
        self.skip_ws();
        let line = self.line;
        let Some(c) = self.peek_char() else {
            return Ok((Tok::Eof, line));
        };

        match c {
            '{' => {
                self.bump();
                Ok((Tok::LBrace, line))
            }
            '}' => {
                self.bump();
                Ok((Tok::RBrace, line))
            }
            '[' => {
                self.bump();
                Ok((Tok::LBracket, line))
            }
            ']' => {
                self.bump();
                Ok((Tok::RBracket, line))
            }
            ':' => {
                self.bump();
                Ok((Tok::Colon, line))
            }
            ';' => {
                self.bump();
                Ok((Tok::Semi, line))
            }
            ',' => {
                self.bump();
                Ok((Tok::Comma, line))
            }
            '+' if self.chars.get(self.pos + 1) == Some(&'=') => {
                self.bump();
                self.bump();
                Ok((Tok::PlusEq, line))
            }
            '=' => {
                self.bump();
                Ok((Tok::Eq, line))
            }
            '"' => {
                self.bump();
                let mut s = String::new();
                loop {
                    match self.bump() {
                        None => {
                            return Err(ConfigError::Syntax {
                                file: String::new(),
                                line,
                                column: 0,
                                message: "unterminated string literal".to_string(),
                            });
                        }
                        Some('"') => {
                            if self.peek_char() == Some('"') {
                                self.bump();
                                s.push('"');
                                continue;
                            }
                            break;
                        }
                        Some(ch) => s.push(ch),
                    }
                }
                Ok((Tok::Str(s), line))
            }
            c if c.is_ascii_digit() || (c == '-' && self.looks_like_number()) => {
                let start = self.pos;
                if c == '-' {
                    self.bump();
                }
                let mut has_dot = false;
                let mut has_exp = false;
                while let Some(nc) = self.peek_char() {
                    if nc.is_ascii_digit() {
                        self.bump();
                    } else if nc == '.' && !has_dot {
                        has_dot = true;
                        self.bump();
                    } else if (nc == 'e' || nc == 'E') && !has_exp {
                        has_exp = true;
                        self.bump();
                        if matches!(self.peek_char(), Some('+') | Some('-')) {
                            self.bump();
                        }
                    } else {
                        break;
                    }
                }
                let text: String = self.chars[start..self.pos].iter().collect();
                if has_dot || has_exp {
                    let value: f32 = text.parse().map_err(|_| ConfigError::Syntax {
                        file: String::new(),
                        line,
                        column: 0,
                        message: format!("invalid float literal `{text}`"),
                    })?;
                    Ok((Tok::Float(value), line))
                } else {
                    let value: i32 = text.parse().map_err(|_| ConfigError::Syntax {
                        file: String::new(),
                        line,
                        column: 0,
                        message: format!("invalid integer literal `{text}`"),
                    })?;
                    Ok((Tok::Int(value), line))
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = self.pos;
                while let Some(nc) = self.peek_char() {
                    if nc.is_alphanumeric() || nc == '_' {
                        self.bump();
                    } else {
                        break;
                    }
                }
                let text: String = self.chars[start..self.pos].iter().collect();
                Ok((Tok::Ident(text), line))
            }
            other => Err(ConfigError::Syntax {
                file: String::new(),
                line,
                column: 0,
                message: format!("unexpected character `{other}`"),
            }),
        }
    }

    fn looks_like_number(&self) -> bool {
        self.chars
            .get(self.pos + 1)
            .map(|c| c.is_ascii_digit() || *c == '.')
            .unwrap_or(false)
    }
}

pub struct Parser<'a, 'd> {
    lexer: Lexer<'a>,
    current: (Tok, u32),
    file: String,
    diagnostics: &'d mut Diagnostics,
}

impl<'a, 'd> Parser<'a, 'd> {
    pub fn new(src: &'a str, file: impl Into<String>, diagnostics: &'d mut Diagnostics) -> Result<Self, ConfigError> {
        let mut lexer = Lexer::new(src);
        let current = lexer.next_token()?;
        Ok(Self {
            lexer,
            current,
            file: file.into(),
            diagnostics,
        })
    }

    fn err(&self, line: u32, message: impl Into<String>) -> ConfigError {
        ConfigError::Syntax {
            file: self.file.clone(),
            line,
            column: 0,
            message: message.into(),
        }
    }

    fn advance(&mut self) -> Result<(Tok, u32), ConfigError> {
        let next = self.lexer.next_token()?;
        Ok(std::mem::replace(&mut self.current, next))
    }

    fn expect(&mut self, tok: &Tok) -> Result<(), ConfigError> {
        if std::mem::discriminant(&self.current.0) == std::mem::discriminant(tok) {
            self.advance()?;
            Ok(())
        } else {
            Err(self.err(
                self.current.1,
                format!("expected {tok:?}, found {:?}", self.current.0),
            ))
        }
    }

    pub fn parse_config(mut self) -> Result<Config, ConfigError> {
        let mut root = Class::default();
        while self.current.0 != Tok::Eof {
            let def = self.parse_definition()?;
            insert_definition(&mut root, def, &self.file)?;
        }
        Ok(Config { root })
    }

    fn parse_definition(&mut self) -> Result<Definition, ConfigError> {
        match &self.current.0 {
            Tok::Ident(kw) if kw == "class" => self.parse_class(),
            Tok::Ident(kw) if kw == "delete" => {
                self.advance()?;
                let name = self.expect_ident()?;
                self.expect(&Tok::Semi)?;
                Ok(Definition::DeleteClass(name))
            }
            Tok::Ident(_) => {
                let def = self.parse_assignment()?;
                self.expect(&Tok::Semi)?;
                Ok(def)
            }
            other => Err(self.err(self.current.1, format!("unexpected token {other:?}"))),
        }
    }

    fn expect_ident(&mut self) -> Result<String, ConfigError> {
        match &self.current.0 {
            Tok::Ident(name) => {
                let name = name.clone();
                self.advance()?;
                Ok(name)
            }
            other => Err(self.err(self.current.1, format!("expected identifier, found {other:?}"))),
        }
    }

    fn parse_class(&mut self) -> Result<Definition, ConfigError> {
        self.advance()?; // 'class'
        let name = self.expect_ident()?;

        let parent = if self.current.0 == Tok::Colon {
            self.advance()?;
            Some(self.expect_ident()?)
        } else {
            None
        };

        if self.current.0 == Tok::Semi {
            self.advance()?;
            return Ok(Definition::ExternClass(name));
        }

        self.expect(&Tok::LBrace)?;
        let mut class = Class::new(name, parent);
        while self.current.0 != Tok::RBrace {
            if self.current.0 == Tok::Eof {
                return Err(self.err(self.current.1, "unexpected end of input inside class body"));
            }
            let def = self.parse_definition()?;
            insert_definition(&mut class, def, &self.file)?;
        }
        self.advance()?; // '}'
        self.expect(&Tok::Semi)?;
        Ok(Definition::Class(class))
    }

    fn parse_assignment(&mut self) -> Result<Definition, ConfigError> {
        let name = self.expect_ident()?;
        let is_array_form = self.current.0 == Tok::LBracket;
        if is_array_form {
            self.advance()?;
            self.expect(&Tok::RBracket)?;
        }

        let is_append = match &self.current.0 {
            Tok::Eq => {
                self.advance()?;
                false
            }
            Tok::PlusEq => {
                self.advance()?;
                true
            }
            other => return Err(self.err(self.current.1, format!("expected `=` or `+=`, found {other:?}"))),
        };

        let value = self.parse_expression()?;
        Ok(Definition::Variable(Variable {
            name,
            value,
            is_append,
        }))
    }

    fn parse_expression(&mut self) -> Result<Expr, ConfigError> {
        match &self.current.0 {
            Tok::LBrace => self.parse_array(),
            Tok::Str(_) => self.parse_string_chain(),
            Tok::Int(v) => {
                let v = *v;
                self.advance()?;
                Ok(Expr::Int(v))
            }
            Tok::Float(v) => {
                let v = *v;
                self.advance()?;
                Ok(Expr::Float(v))
            }
            Tok::Ident(name) => {
                // Unquoted identifier where a string is expected (spec §4.1.2).
                let name = name.clone();
                let line = self.current.1;
                self.diagnostics.push_at(
                    DiagnosticKind::UnquotedString,
                    Severity::Warning,
                    Some(self.file.clone()),
                    Some(line),
                    format!("unquoted string `{name}`"),
                );
                self.advance()?;
                Ok(Expr::String(name))
            }
            other => Err(self.err(self.current.1, format!("unexpected token in expression: {other:?}"))),
        }
    }

    fn parse_string_chain(&mut self) -> Result<Expr, ConfigError> {
        let mut out = String::new();
        loop {
            match &self.current.0 {
                Tok::Str(s) => {
                    out.push_str(s);
                    self.advance()?;
                }
                _ => break,
            }
            // Adjacent string literals (separated only by whitespace/newlines
            // in the source) concatenate into one logical string.
            if !matches!(self.current.0, Tok::Str(_)) {
                break;
            }
        }
        Ok(Expr::String(out))
    }

    fn parse_array(&mut self) -> Result<Expr, ConfigError> {
        self.advance()?; // '{'
        let mut items = Vec::new();
        if self.current.0 != Tok::RBrace {
            loop {
                items.push(self.parse_expression()?);
                if self.current.0 == Tok::Comma {
                    self.advance()?;
                    continue;
                }
                break;
            }
        }
        self.expect(&Tok::RBrace)?;
        Ok(Expr::Array(items))
    }
}

fn insert_definition(class: &mut Class, def: Definition, file: &str) -> Result<(), ConfigError> {
    if let Definition::Class(c) = &def {
        if class.definitions.iter().any(|d| matches!(d, Definition::Class(existing) if existing.name.eq_ignore_ascii_case(&c.name)))
        {
            return Err(ConfigError::Syntax {
                file: file.to_string(),
                line: 0,
                column: 0,
                message: format!("duplicate class name `{}` within parent", c.name),
            });
        }
    }
    class.definitions.push(def);
    Ok(())
}

/// Parses a preprocessed config source into an AST, reporting any
/// muteable diagnostics (e.g. `unquoted-string`) through `diagnostics`.
pub fn parse_config(src: &str, file: impl Into<String>, diagnostics: &mut Diagnostics) -> Result<Config, ConfigError> {
    Parser::new(src, file, diagnostics)?.parse_config()
}

/// Parses while threading a [`Lineref`] is not required by the parser
/// itself (it operates purely on preprocessed text); callers that need
/// original-source diagnostics resolve preprocessed line numbers through
/// the lineref returned by the preprocessor.
pub fn resolve_original_line(lineref: &Lineref, preprocessed_line: u32) -> Option<(u32, u32)> {
    lineref.resolve(preprocessed_line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_class() {
        let mut diags = Diagnostics::new();
        let cfg = parse_config("class A { value = 3; };", "test", &mut diags).unwrap();
        let a = cfg.root.find_class("A").unwrap();
        let v = a.find_variable("value").unwrap();
        assert_eq!(v.value, Expr::Int(3));
    }

    #[test]
    fn parses_inheritance_and_arrays() {
        let mut diags = Diagnostics::new();
        let cfg = parse_config(
            "class Base { values[] = {1, 2, 3}; }; class Derived: Base { values[] += {4}; };",
            "test",
            &mut diags,
        )
        .unwrap();
        let derived = cfg.root.find_class("Derived").unwrap();
        assert_eq!(derived.parent.as_deref(), Some("Base"));
        let v = derived.find_variable("values").unwrap();
        assert!(v.is_append);
        assert_eq!(v.value, Expr::Array(vec![Expr::Int(4)]));
    }

    #[test]
    fn extern_and_delete_sentinels() {
        let mut diags = Diagnostics::new();
        let cfg = parse_config("class Foo; delete Bar;", "test", &mut diags).unwrap();
        assert!(matches!(cfg.root.definitions[0], Definition::ExternClass(ref n) if n == "Foo"));
        assert!(matches!(cfg.root.definitions[1], Definition::DeleteClass(ref n) if n == "Bar"));
    }

    #[test]
    fn string_concatenation_and_unquoted() {
        let mut diags = Diagnostics::new();
        let cfg = parse_config("a = \"foo\" \"bar\"; b = Unquoted;", "test", &mut diags).unwrap();
        let a = cfg.root.find_variable("a").unwrap();
        assert_eq!(a.value, Expr::String("foobar".to_string()));
        let b = cfg.root.find_variable("b").unwrap();
        assert_eq!(b.value, Expr::String("Unquoted".to_string()));
        assert_eq!(diags.iter().filter(|d| d.kind == DiagnosticKind::UnquotedString).count(), 1);
    }
}
