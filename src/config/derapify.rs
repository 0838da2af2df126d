//! Binary → AST decode, AST → text rendering, and the inheritance-aware
//! path query API (spec §4.1.4).

use std::f32::consts::PI;
use std::io::{Cursor, Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::ConfigError;
use crate::utils::{format_roundtrip_f32, read_compressed_int, read_cstring};

use super::ast::{Class, Config, Definition, Expr, Variable};

const MAGIC: &[u8; 4] = b"\0raP";

/// Decodes a rapified binary container back into an AST.
pub fn derapify_bytes(bytes: &[u8]) -> Result<Config, ConfigError> {
    let mut cursor = Cursor::new(bytes);
    let mut magic = [0u8; 4];
    cursor.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(ConfigError::BadMagic);
    }
    cursor.seek(SeekFrom::Start(16))?;
    let mut root = read_class_body(&mut cursor)?;
    root.name.clear();
    Ok(Config { root })
}

fn read_class_body<R: Read + Seek>(r: &mut R) -> Result<Class, ConfigError> {
    let parent_name = read_cstring(r)?;
    let parent = if parent_name.is_empty() { None } else { Some(parent_name) };
    let count = read_compressed_int(r)?;

    let mut definitions = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let tag = r.read_u8()?;
        match tag {
            0 => {
                let name = read_cstring(r)?;
                let offset = r.read_u32::<LittleEndian>()?;
                let resume = r.stream_position()?;
                r.seek(SeekFrom::Start(offset as u64))?;
                let mut child = read_class_body(r)?;
                child.name = name;
                r.seek(SeekFrom::Start(resume))?;
                definitions.push(Definition::Class(child));
            }
            1 => {
                let subtag = r.read_u8()?;
                let name = read_cstring(r)?;
                let value = match subtag {
                    0 => Expr::String(read_cstring(r)?),
                    1 => Expr::Float(r.read_f32::<LittleEndian>()?),
                    2 => Expr::Int(r.read_i32::<LittleEndian>()?),
                    _ => {
                        return Err(ConfigError::Syntax {
                            file: String::new(),
                            line: 0,
                            column: 0,
                            message: format!("unknown scalar subtag {subtag}"),
                        });
                    }
                };
                definitions.push(Definition::Variable(Variable {
                    name,
                    value,
                    is_append: false,
                }));
            }
            2 => {
                let name = read_cstring(r)?;
                let value = read_array_expr(r)?;
                definitions.push(Definition::Variable(Variable {
                    name,
                    value,
                    is_append: false,
                }));
            }
            3 => {
                let name = read_cstring(r)?;
                definitions.push(Definition::ExternClass(name));
            }
            4 => {
                let name = read_cstring(r)?;
                definitions.push(Definition::DeleteClass(name));
            }
            5 => {
                let _marker = r.read_u32::<LittleEndian>()?;
                let name = read_cstring(r)?;
                let value = read_array_expr(r)?;
                definitions.push(Definition::Variable(Variable {
                    name,
                    value,
                    is_append: true,
                }));
            }
            other => {
                return Err(ConfigError::Syntax {
                    file: String::new(),
                    line: 0,
                    column: 0,
                    message: format!("unknown member tag {other}"),
                });
            }
        }
    }

    Ok(Class {
        name: String::new(),
        parent,
        definitions,
    })
}

fn read_array_expr<R: Read + Seek>(r: &mut R) -> Result<Expr, ConfigError> {
    let count = read_compressed_int(r)?;
    let mut items = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let tag = r.read_u8()?;
        let item = match tag {
            0 => Expr::String(read_cstring(r)?),
            1 => Expr::Float(r.read_f32::<LittleEndian>()?),
            2 => Expr::Int(r.read_i32::<LittleEndian>()?),
            3 => read_array_expr(r)?,
            other => {
                return Err(ConfigError::Syntax {
                    file: String::new(),
                    line: 0,
                    column: 0,
                    message: format!("unknown array element tag {other}"),
                });
            }
        };
        items.push(item);
    }
    Ok(Expr::Array(items))
}

/// Renders an AST back to canonical text: two-space indentation per level,
/// escaped strings, and round-trippable float formatting.
pub fn to_text(config: &Config) -> String {
    let mut out = String::new();
    for def in &config.root.definitions {
        render_definition(def, 0, &mut out);
    }
    out
}

fn indent(level: usize, out: &mut String) {
    for _ in 0..level {
        out.push_str("  ");
    }
}

fn render_definition(def: &Definition, level: usize, out: &mut String) {
    indent(level, out);
    match def {
        Definition::Variable(var) => {
            out.push_str(&var.name);
            if matches!(var.value, Expr::Array(_)) {
                out.push_str("[]");
            }
            out.push_str(if var.is_append { " += " } else { " = " });
            render_expr(&var.value, out);
            out.push_str(";\n");
        }
        Definition::ExternClass(name) => {
            out.push_str("class ");
            out.push_str(name);
            out.push_str(";\n");
        }
        Definition::DeleteClass(name) => {
            out.push_str("delete ");
            out.push_str(name);
            out.push_str(";\n");
        }
        Definition::Class(class) => {
            out.push_str("class ");
            out.push_str(&class.name);
            if let Some(parent) = &class.parent {
                out.push_str(": ");
                out.push_str(parent);
            }
            out.push_str(" {\n");
            for child in &class.definitions {
                render_definition(child, level + 1, out);
            }
            indent(level, out);
            out.push_str("};\n");
        }
    }
}

fn render_expr(expr: &Expr, out: &mut String) {
    match expr {
        Expr::Int(v) => out.push_str(&v.to_string()),
        Expr::Float(v) => out.push_str(&format_roundtrip_f32(*v)),
        Expr::String(s) => {
            out.push('"');
            out.push_str(&s.replace('"', "\"\""));
            out.push('"');
        }
        Expr::Array(items) => {
            out.push('{');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                render_expr(item, out);
            }
            out.push('}');
        }
    }
}

/// Resolves a named class within the closest enclosing scope first,
/// falling back to outer scopes — the same rule `find_parent` in the
/// original tool applies when a class's parent lives in a containing
/// scope rather than alongside it.
fn resolve_named_class<'a>(scopes: &[&'a Class], name: &str) -> Option<&'a Class> {
    scopes.iter().rev().find_map(|scope| scope.find_class(name))
}

fn split_path(path: &str) -> Vec<String> {
    path.split(">>").map(|s| s.trim().to_string()).collect()
}

/// Navigates a `CfgFoo >> Bar` style path to the terminal class (all
/// segments are class names).
pub fn find_class_path<'a>(root: &'a Class, path: &str) -> Option<&'a Class> {
    let segments = split_path(path);
    let mut current = root;
    for seg in &segments {
        current = current.find_class(seg)?;
    }
    Some(current)
}

fn seek_value_with_inheritance<'a>(class: &'a Class, scopes: &[&'a Class], value_name: &str) -> Option<&'a Expr> {
    if let Some(var) = class.find_variable(value_name) {
        return Some(&var.value);
    }
    let parent_name = class.parent.as_ref()?;
    let parent_class = resolve_named_class(scopes, parent_name)?;
    seek_value_with_inheritance(parent_class, scopes, value_name)
}

/// Looks up `CfgFoo >> Bar >> value`: all but the last segment are class
/// names, the last is a variable name. Missing values fall back through
/// the class's parent chain (and the parents of containing classes,
/// recursively). Returns `None` if the path genuinely doesn't resolve —
/// a distinct outcome from a read/type failure, which is surfaced by the
/// typed `read_*` helpers below as `Err`.
pub fn seek_config_value<'a>(root: &'a Class, path: &str) -> Option<&'a Expr> {
    let segments = split_path(path);
    let (class_path, value_name) = segments.split_at(segments.len().saturating_sub(1));
    let value_name = value_name.first()?;

    let mut scopes: Vec<&Class> = vec![root];
    let mut current = root;
    for seg in class_path {
        let next = current.find_class(seg)?;
        scopes.push(current);
        current = next;
    }
    seek_value_with_inheritance(current, &scopes, value_name)
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReadError {
    NotFound,
    WrongType,
}

pub fn read_string(root: &Class, path: &str) -> Result<String, ReadError> {
    match seek_config_value(root, path) {
        Some(Expr::String(s)) => Ok(s.clone()),
        Some(_) => Err(ReadError::WrongType),
        None => Err(ReadError::NotFound),
    }
}

pub fn read_int(root: &Class, path: &str) -> Result<i32, ReadError> {
    match seek_config_value(root, path) {
        Some(Expr::Int(v)) => Ok(*v),
        Some(_) => Err(ReadError::WrongType),
        None => Err(ReadError::NotFound),
    }
}

/// Reads a float. Integer values are silently widened. A string matching
/// `^\s*rad\s+<number>$` is parsed and converted from radians to degrees.
pub fn read_float(root: &Class, path: &str) -> Result<f32, ReadError> {
    match seek_config_value(root, path) {
        Some(Expr::Float(v)) => Ok(*v),
        Some(Expr::Int(v)) => Ok(*v as f32),
        Some(Expr::String(s)) => {
            let trimmed = s.trim();
            let lower = trimmed.to_ascii_lowercase();
            let rest = lower.strip_prefix("rad").ok_or(ReadError::WrongType)?;
            let rest = rest.trim_start();
            let value: f32 = rest.parse().map_err(|_| ReadError::WrongType)?;
            Ok(value * (180.0 / PI))
        }
        Some(_) => Err(ReadError::WrongType),
        None => Err(ReadError::NotFound),
    }
}

pub fn read_string_array(root: &Class, path: &str) -> Result<Vec<String>, ReadError> {
    match seek_config_value(root, path) {
        Some(Expr::Array(items)) => items
            .iter()
            .map(|e| e.as_str().map(str::to_string).ok_or(ReadError::WrongType))
            .collect(),
        Some(_) => Err(ReadError::WrongType),
        None => Err(ReadError::NotFound),
    }
}

pub fn read_class_names(root: &Class, path: &str) -> Result<Vec<String>, ReadError> {
    let class = if path.is_empty() {
        Some(root)
    } else {
        find_class_path(root, path)
    };
    let class = class.ok_or(ReadError::NotFound)?;
    Ok(class
        .definitions
        .iter()
        .filter_map(|d| match d {
            Definition::Class(c) => Some(c.name.clone()),
            _ => None,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parser::parse_config;
    use crate::error::Diagnostics;
    use crate::config::rapify::rapify_config;

    #[test]
    fn bad_magic_is_rejected() {
        let err = derapify_bytes(b"xxxx").unwrap_err();
        assert!(matches!(err, ConfigError::BadMagic));
    }

    #[test]
    fn rapify_derapify_roundtrip_text() {
        let source = "class A {\n  value = 3;\n};\n";
        let cfg = parse_config(source, "test", &mut Diagnostics::new()).unwrap();
        let bytes = rapify_config(&cfg).unwrap();
        let decoded = derapify_bytes(&bytes).unwrap();
        let text = to_text(&decoded);
        let reparsed = parse_config(&text, "test", &mut Diagnostics::new()).unwrap();
        assert_eq!(reparsed, cfg);
    }

    #[test]
    fn rapify_byte_identical_after_derapify_roundtrip() {
        let source = "class A { value = 3; nested[] = {1,2,\"s\"}; };";
        let cfg = parse_config(source, "test", &mut Diagnostics::new()).unwrap();
        let bytes = rapify_config(&cfg).unwrap();
        let decoded = derapify_bytes(&bytes).unwrap();
        let bytes2 = rapify_config(&decoded).unwrap();
        assert_eq!(bytes, bytes2);
    }

    #[test]
    fn path_lookup_with_inheritance() {
        let cfg = parse_config("class Base { v = 7; }; class Derived : Base {};", "test", &mut Diagnostics::new()).unwrap();
        let bytes = rapify_config(&cfg).unwrap();
        let decoded = derapify_bytes(&bytes).unwrap();
        let v = read_int(&decoded.root, "Derived >> v").unwrap();
        assert_eq!(v, 7);
    }

    #[test]
    fn rad_string_converted_to_degrees() {
        let cfg = parse_config("class A { angle = \"rad 3.14159265\"; };", "test", &mut Diagnostics::new()).unwrap();
        let v = read_float(&cfg.root, "A >> angle").unwrap();
        assert!((v - 180.0).abs() < 0.01);
    }

    #[test]
    fn missing_path_is_distinct_from_wrong_type() {
        let cfg = parse_config("class A { v = 1; };", "test", &mut Diagnostics::new()).unwrap();
        assert_eq!(read_string(&cfg.root, "A >> missing"), Err(ReadError::NotFound));
        assert_eq!(read_string(&cfg.root, "A >> v"), Err(ReadError::WrongType));
    }
}
