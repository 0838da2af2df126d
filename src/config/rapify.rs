//! AST → binary ("rapified") encoding (spec §4.1.3).

use std::io::{self, Cursor, Seek, SeekFrom, Write};

use byteorder::{LittleEndian, WriteBytesExt};

use crate::utils::{write_compressed_int, write_cstring};

use super::ast::{Class, Config, Definition, Expr};

const MAGIC: &[u8; 4] = b"\0raP";

/// Rapifies a parsed config into its binary container.
pub fn rapify_config(config: &Config) -> io::Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    buf.write_all(MAGIC)?;
    buf.write_all(&[0, 0, 0, 0, 8, 0, 0, 0])?;
    let enum_offset_pos = buf.position();
    buf.write_u32::<LittleEndian>(0)?; // placeholder, patched below

    rapify_class_body(&config.root, &mut buf)?;

    let enum_offset = buf.position() as u32;
    buf.write_u32::<LittleEndian>(0)?; // empty enum table

    let end = buf.position();
    buf.seek(SeekFrom::Start(enum_offset_pos))?;
    buf.write_u32::<LittleEndian>(enum_offset)?;
    buf.seek(SeekFrom::Start(end))?;

    Ok(buf.into_inner())
}

fn rapify_class_body(class: &Class, out: &mut Cursor<Vec<u8>>) -> io::Result<()> {
    match &class.parent {
        Some(parent) => write_cstring(out, parent)?,
        None => out.write_all(&[0])?,
    }

    write_compressed_int(out, class.definitions.len() as u32)?;

    // First pass: write each member, leaving a 4-byte placeholder offset for
    // nested non-empty class bodies (patched once the child body is known).
    let mut patch_positions: Vec<(u64, &Class)> = Vec::new();
    for def in &class.definitions {
        match def {
            Definition::Variable(var) => rapify_variable(var, out)?,
            Definition::ExternClass(name) => {
                out.write_all(&[3])?;
                write_cstring(out, name)?;
            }
            Definition::DeleteClass(name) => {
                out.write_all(&[4])?;
                write_cstring(out, name)?;
            }
            Definition::Class(child) => {
                // Tag 0: nested class body. A 4-byte placeholder offset is
                // patched below once the child body has been emitted.
                out.write_all(&[0])?;
                write_cstring(out, &child.name)?;
                patch_positions.push((out.position(), child));
                out.write_u32::<LittleEndian>(0)?;
            }
        }
    }

    // Second pass: emit each nested class body in order, patching its
    // forward offset placeholder once we know where the body landed.
    for (patch_pos, child) in patch_positions {
        let body_offset = out.position() as u32;
        let end = out.position();
        out.seek(SeekFrom::Start(patch_pos))?;
        out.write_u32::<LittleEndian>(body_offset)?;
        out.seek(SeekFrom::Start(end))?;
        rapify_class_body(child, out)?;
    }

    Ok(())
}

fn rapify_variable(var: &super::ast::Variable, out: &mut Cursor<Vec<u8>>) -> io::Result<()> {
    if var.is_append {
        out.write_all(&[5])?;
        out.write_u32::<LittleEndian>(1)?;
    } else {
        let tag = if matches!(var.value, Expr::Array(_)) { 2 } else { 1 };
        out.write_all(&[tag])?;
        if tag == 1 {
            let subtag = match &var.value {
                Expr::String(_) => 0,
                Expr::Float(_) => 1,
                Expr::Int(_) => 2,
                Expr::Array(_) => unreachable!(),
            };
            out.write_all(&[subtag])?;
        }
    }
    write_cstring(out, &var.name)?;
    rapify_expression(&var.value, out)?;
    Ok(())
}

fn rapify_expression(expr: &Expr, out: &mut Cursor<Vec<u8>>) -> io::Result<()> {
    match expr {
        Expr::Int(v) => out.write_i32::<LittleEndian>(*v),
        Expr::Float(v) => out.write_f32::<LittleEndian>(*v),
        Expr::String(s) => write_cstring(out, s),
        Expr::Array(items) => {
            write_compressed_int(out, items.len() as u32)?;
            for item in items {
                let tag: u8 = match item {
                    Expr::String(_) => 0,
                    Expr::Float(_) => 1,
                    Expr::Int(_) => 2,
                    Expr::Array(_) => 3,
                };
                out.write_all(&[tag])?;
                rapify_expression(item, out)?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parser::parse_config;
    use crate::error::Diagnostics;

    #[test]
    fn rapify_emits_magic_and_is_nonempty() {
        let cfg = parse_config("class A { value = 3; };", "test", &mut Diagnostics::new()).unwrap();
        let bytes = rapify_config(&cfg).unwrap();
        assert_eq!(&bytes[0..4], MAGIC);
        assert!(bytes.len() > 16);
    }
}
