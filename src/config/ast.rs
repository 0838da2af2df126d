//! The config AST (spec §3): classes, definitions, and tagged expressions.
//!
//! `Class` and `Definition` nest recursively by value: `Definition::Class`
//! holds a `Class` directly, and each `Class` owns a `Vec<Definition>` of
//! its own members. There is no arena or index table. Rapify (§4.1.3) walks
//! this tree directly and patches nested-class byte offsets in place once
//! each child body has been written.

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int(i32),
    Float(f32),
    String(String),
    Array(Vec<Expr>),
}

impl Expr {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Expr::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Expr::Float(f) => Some(*f),
            Expr::Int(i) => Some(*i as f32),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Expr::Int(i) => Some(*i),
            Expr::Float(f) => Some(*f as i32),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Expr]> {
        match self {
            Expr::Array(items) => Some(items),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub value: Expr,
    /// `+=` array-append assignment rather than plain `=`.
    pub is_append: bool,
}

/// One member of a class body. Extern declarations (`class Foo;`) and
/// delete sentinels (`delete Foo;`) are distinct from a populated class
/// body, matching the rapifier's distinct tag bytes (3 and 4) for them.
#[derive(Debug, Clone, PartialEq)]
pub enum Definition {
    Variable(Variable),
    Class(Class),
    ExternClass(String),
    DeleteClass(String),
}

/// A class body: an optional parent name and an ordered sequence of
/// definitions. Class names are case-preserving but must be unique
/// case-insensitively within one parent (enforced by the parser).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Class {
    pub name: String,
    pub parent: Option<String>,
    pub definitions: Vec<Definition>,
}

impl Class {
    pub fn new(name: impl Into<String>, parent: Option<String>) -> Self {
        Self {
            name: name.into(),
            parent,
            definitions: Vec::new(),
        }
    }

    pub fn find_class(&self, name: &str) -> Option<&Class> {
        self.definitions.iter().find_map(|d| match d {
            Definition::Class(c) if c.name.eq_ignore_ascii_case(name) => Some(c),
            _ => None,
        })
    }

    pub fn find_variable(&self, name: &str) -> Option<&Variable> {
        self.definitions.iter().find_map(|d| match d {
            Definition::Variable(v) if v.name.eq_ignore_ascii_case(name) => Some(v),
            _ => None,
        })
    }
}

/// A parsed config: the anonymous root class body.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Config {
    pub root: Class,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }
}
