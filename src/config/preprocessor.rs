//! Recursive-descent-adjacent macro preprocessor for the config language
//! (spec §4.1.1): directives, object-/function-like macros, stringize (`#`)
//! and token concatenation (`##`), comment stripping with line-count
//! preservation, and `$PBOPREFIX$`-aware include resolution.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::error::{ConfigError, Diagnostics, DiagnosticKind, Severity};

use super::lineref::Lineref;

/// A resolver for `#include` targets: given the requested target and the
/// logical path of the including file, returns the included file's own
/// logical path and source text, or reports the target as missing.
///
/// This is the seam the spec carves out for filesystem access so the
/// preprocessor itself stays testable with an in-memory implementation.
pub trait IncludeResolver {
    fn resolve(&self, target: &str, including_file: &str) -> Result<(String, String), ConfigError>;
}

/// An in-memory resolver, primarily for tests: a flat map of logical path
/// to source text. Relative includes are joined against the including
/// file's directory (backslash-delimited); absolute includes (leading
/// backslash) are looked up directly.
#[derive(Debug, Default, Clone)]
pub struct MemoryResolver {
    files: HashMap<String, String>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<String>, contents: impl Into<String>) -> Self {
        self.files
            .insert(crate::utils::normalize_backslashes(&path.into()), contents.into());
        self
    }
}

impl IncludeResolver for MemoryResolver {
    fn resolve(&self, target: &str, including_file: &str) -> Result<(String, String), ConfigError> {
        let target_norm = crate::utils::normalize_backslashes(target);
        let logical = if target_norm.starts_with('\\') {
            target_norm.trim_start_matches('\\').to_string()
        } else {
            let dir = including_file.rsplit_once('\\').map(|(d, _)| d).unwrap_or("");
            if dir.is_empty() {
                target_norm.clone()
            } else {
                format!("{dir}\\{target_norm}")
            }
        };
        match self.files.get(&logical) {
            Some(contents) => Ok((logical, contents.clone())),
            None => Err(ConfigError::IncludeNotFound {
                target: target.to_string(),
                from: including_file.to_string(),
            }),
        }
    }
}

/// A filesystem-backed resolver honoring `$PBOPREFIX$` markers for
/// absolute (leading-backslash) include targets, and plain relative
/// joins for relative ones.
pub struct FilesystemResolver {
    roots: Vec<PathBuf>,
    /// Resolved absolute-include targets, shared without locking so
    /// concurrent preprocessing of sibling files (spec §5, batch macro
    /// expansion) doesn't serialize on include resolution.
    cache: DashMap<String, PathBuf>,
}

impl FilesystemResolver {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            cache: DashMap::new(),
        }
    }

    fn find_prefix_marker(dir: &Path) -> Option<PathBuf> {
        let marker = dir.join("$PBOPREFIX$");
        if marker.is_file() { Some(marker) } else { None }
    }

    fn resolve_absolute(&self, requested_norm: &str) -> Option<(String, PathBuf)> {
        if let Some(cached) = self.cache.get(requested_norm) {
            return std::fs::read_to_string(cached.value())
                .ok()
                .map(|_| (requested_norm.to_string(), cached.value().clone()));
        }

        let relative = requested_norm.trim_start_matches('\\').replace('\\', "/");
        for root in &self.roots {
            let candidate = root.join(&relative);
            if !candidate.is_file() {
                continue;
            }
            let mut dir = candidate.parent().map(Path::to_path_buf);
            while let Some(d) = dir {
                if let Some(marker) = Self::find_prefix_marker(&d) {
                    let Ok(prefix_raw) = std::fs::read_to_string(&marker) else {
                        break;
                    };
                    let prefix = crate::utils::normalize_backslashes(prefix_raw.trim());
                    let suffix = candidate
                        .strip_prefix(&d)
                        .ok()
                        .map(|p| p.to_string_lossy().replace('/', "\\"))
                        .unwrap_or_default();
                    let prefix_trimmed = prefix.trim_end_matches('\\');
                    let full = format!("{prefix_trimmed}\\{suffix}");
                    if full == requested_norm {
                        self.cache.insert(requested_norm.to_string(), candidate.clone());
                        return Some((requested_norm.to_string(), candidate));
                    }
                    break;
                }
                if d == *root {
                    break;
                }
                dir = d.parent().map(Path::to_path_buf);
            }
        }
        None
    }
}

impl IncludeResolver for FilesystemResolver {
    fn resolve(&self, target: &str, including_file: &str) -> Result<(String, String), ConfigError> {
        let target_norm = crate::utils::normalize_backslashes(target);
        if target_norm.starts_with('\\') {
            match self.resolve_absolute(&target_norm) {
                Some((logical, path)) => {
                    let contents = std::fs::read_to_string(&path)?;
                    Ok((logical, contents))
                }
                None => Err(ConfigError::IncludeNotFound {
                    target: target.to_string(),
                    from: including_file.to_string(),
                }),
            }
        } else {
            let including_path = Path::new(including_file);
            let dir = including_path.parent().unwrap_or_else(|| Path::new(""));
            let candidate = dir.join(target_norm.replace('\\', "/"));
            let contents = std::fs::read_to_string(&candidate).map_err(|_| ConfigError::IncludeNotFound {
                target: target.to_string(),
                from: including_file.to_string(),
            })?;
            Ok((candidate.to_string_lossy().replace('/', "\\"), contents))
        }
    }
}

#[derive(Debug, Clone)]
struct MacroDef {
    params: Option<Vec<String>>,
    body: String,
}

#[derive(Debug, Clone)]
enum BodyTok {
    Ident(String),
    Stringize(String),
    Concat,
    Text(String),
}

fn tokenize_body(body: &str) -> Vec<BodyTok> {
    let chars: Vec<char> = body.chars().collect();
    let mut i = 0;
    let mut toks = Vec::new();
    while i < chars.len() {
        if chars[i] == '#' && chars.get(i + 1) == Some(&'#') {
            toks.push(BodyTok::Concat);
            i += 2;
        } else if chars[i] == '#' {
            i += 1;
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            toks.push(BodyTok::Stringize(chars[start..i].iter().collect()));
        } else if chars[i].is_alphabetic() || chars[i] == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            toks.push(BodyTok::Ident(chars[start..i].iter().collect()));
        } else {
            let start = i;
            while i < chars.len() && chars[i] != '#' && !chars[i].is_alphabetic() && chars[i] != '_' {
                i += 1;
            }
            toks.push(BodyTok::Text(chars[start..i].iter().collect()));
        }
    }
    toks
}

/// Splits a function-macro call's argument list on top-level commas
/// (parens balanced), e.g. `a, f(b,c), d` -> `["a", "f(b,c)", "d"]`.
fn split_args(s: &str) -> Vec<String> {
    if s.trim().is_empty() {
        return Vec::new();
    }
    let mut args = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for c in s.chars() {
        match c {
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth -= 1;
                current.push(c);
            }
            ',' if depth == 0 => {
                args.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    args.push(current.trim().to_string());
    args
}

/// Finds the span of a balanced-parenthesis argument list starting right
/// after `name` at `start` in `line`, e.g. for `FOO(a,b) rest`, returns the
/// byte range of `(a,b)` including parens.
fn find_call_args(line: &str, start: usize) -> Option<(usize, usize)> {
    let bytes = line.as_bytes();
    if bytes.get(start) != Some(&b'(') {
        return None;
    }
    let mut depth = 0i32;
    for (offset, &b) in bytes[start..].iter().enumerate() {
        if b == b'(' {
            depth += 1;
        } else if b == b')' {
            depth -= 1;
            if depth == 0 {
                return Some((start, start + offset + 1));
            }
        }
    }
    None
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Macro-expands a single logical line, using `stack` to suppress
/// re-entrant expansion of a macro already being expanded.
fn expand_line(
    line: &str,
    macros: &FxHashMap<String, MacroDef>,
    stack: &mut Vec<String>,
    diags: &mut Diagnostics,
    file: &str,
    lineno: u32,
) -> Result<String, ConfigError> {
    let chars: Vec<char> = line.chars().collect();
    let mut out = String::new();
    let mut i = 0;
    while i < chars.len() {
        if chars[i].is_alphabetic() || chars[i] == '_' {
            let start = i;
            while i < chars.len() && is_ident_char(chars[i]) {
                i += 1;
            }
            let ident: String = chars[start..i].iter().collect();

            if stack.iter().any(|m| m == &ident) {
                // Already expanding this macro: emit verbatim to terminate recursion.
                out.push_str(&ident);
                continue;
            }

            let Some(def) = macros.get(&ident) else {
                out.push_str(&ident);
                continue;
            };

            match &def.params {
                None => {
                    stack.push(ident.clone());
                    let expanded = expand_line(&def.body, macros, stack, diags, file, lineno)?;
                    stack.pop();
                    out.push_str(&expanded);
                }
                Some(params) => {
                    // Must be followed (modulo spaces) by `(`.
                    let mut j = i;
                    while j < chars.len() && chars[j] == ' ' {
                        j += 1;
                    }
                    if chars.get(j) != Some(&'(') {
                        out.push_str(&ident);
                        continue;
                    }
                    let rest: String = chars[j..].iter().collect();
                    let Some((a, b)) = find_call_args(&rest, 0) else {
                        out.push_str(&ident);
                        continue;
                    };
                    let args_src = &rest[a + 1..b - 1];
                    let raw_args = split_args(args_src);

                    stack.push(ident.clone());
                    let mut arg_map: FxHashMap<String, String> = FxHashMap::default();
                    for (pi, pname) in params.iter().enumerate() {
                        let raw = raw_args.get(pi).cloned().unwrap_or_default();
                        let expanded_arg = expand_line(&raw, macros, stack, diags, file, lineno)?;
                        arg_map.insert(pname.clone(), expanded_arg);
                    }

                    let substituted = substitute_body(&def.body, params, &raw_args, &arg_map, diags, file, lineno)?;
                    let expanded = expand_line(&substituted, macros, stack, diags, file, lineno)?;
                    stack.pop();
                    out.push_str(&expanded);

                    // Advance past the consumed call in the outer line.
                    let consumed_in_rest = b;
                    i = j + consumed_in_rest;
                }
            }
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    Ok(out)
}

fn substitute_body(
    body: &str,
    params: &[String],
    raw_args: &[String],
    arg_map: &FxHashMap<String, String>,
    diags: &mut Diagnostics,
    file: &str,
    lineno: u32,
) -> Result<String, ConfigError> {
    let toks = tokenize_body(body);
    if matches!(toks.first(), Some(BodyTok::Concat)) || matches!(toks.last(), Some(BodyTok::Concat)) {
        diags.push_at(
            DiagnosticKind::ExcessiveConcatenation,
            Severity::Warning,
            Some(file.to_string()),
            Some(lineno),
            "leading or trailing ## in macro body",
        );
    }

    let mut out = String::new();
    for tok in &toks {
        match tok {
            BodyTok::Ident(name) => {
                if let Some(expanded) = arg_map.get(name) {
                    out.push_str(expanded);
                } else {
                    out.push_str(name);
                }
            }
            BodyTok::Stringize(name) => {
                if let Some(pos) = params.iter().position(|p| p == name) {
                    let raw = raw_args.get(pos).map(String::as_str).unwrap_or("");
                    out.push('"');
                    out.push_str(raw);
                    out.push('"');
                } else {
                    return Err(ConfigError::BadStringize { token: name.clone() });
                }
            }
            BodyTok::Concat => {}
            BodyTok::Text(text) => out.push_str(text),
        }
    }
    Ok(out)
}

/// Strips `//` and `/* */` comments. When `preserve_lines` is true (the
/// default), stripped text is replaced by equivalent runs of spaces and
/// newlines so downstream line numbers stay aligned with the source.
fn strip_comments(text: &str, preserve_lines: bool) -> String {
    let mut out = String::with_capacity(text.len());
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    let mut in_string = false;
    while i < chars.len() {
        let c = chars[i];
        if in_string {
            out.push(c);
            if c == '"' {
                if chars.get(i + 1) == Some(&'"') {
                    out.push('"');
                    i += 2;
                    continue;
                }
                in_string = false;
            }
            i += 1;
            continue;
        }
        if c == '"' {
            in_string = true;
            out.push(c);
            i += 1;
        } else if c == '/' && chars.get(i + 1) == Some(&'/') {
            while i < chars.len() && chars[i] != '\n' {
                if preserve_lines {
                    out.push(' ');
                }
                i += 1;
            }
        } else if c == '/' && chars.get(i + 1) == Some(&'*') {
            i += 2;
            while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                if chars[i] == '\n' {
                    if preserve_lines {
                        out.push('\n');
                    }
                } else if preserve_lines {
                    out.push(' ');
                }
                i += 1;
            }
            i += 2; // skip `*/`
        } else {
            out.push(c);
            i += 1;
        }
    }
    out
}

/// Joins backslash-newline continuations into single logical lines,
/// returning the joined lines plus, for each, the count of original
/// source lines it consumed.
fn join_continuations(text: &str) -> Vec<(String, u32)> {
    let mut result = Vec::new();
    let mut pending = String::new();
    let mut consumed = 0u32;
    for raw_line in text.split('\n') {
        consumed += 1;
        let line = raw_line.strip_suffix('\r').unwrap_or(raw_line);
        if let Some(stripped) = line.strip_suffix('\\') {
            pending.push_str(stripped);
            pending.push('\n');
            continue;
        }
        pending.push_str(line);
        result.push((std::mem::take(&mut pending), consumed));
        consumed = 0;
    }
    if !pending.is_empty() || consumed > 0 {
        result.push((pending, consumed.max(1)));
    }
    result
}

/// Output of [`Preprocessor::preprocess`]: the preprocessed byte stream
/// plus the line-number mapping used for diagnostics.
pub struct PreprocessOutput {
    pub text: String,
    pub lineref: Lineref,
    pub file_table: Vec<String>,
}

pub struct Preprocessor<'a> {
    resolver: &'a dyn IncludeResolver,
    preserve_lines: bool,
    macros: FxHashMap<String, MacroDef>,
    file_table: Vec<String>,
}

impl<'a> Preprocessor<'a> {
    pub fn new(resolver: &'a dyn IncludeResolver) -> Self {
        Self {
            resolver,
            preserve_lines: true,
            macros: FxHashMap::default(),
            file_table: Vec::new(),
        }
    }

    pub fn preserve_lines(mut self, value: bool) -> Self {
        self.preserve_lines = value;
        self
    }

    pub fn preprocess(
        mut self,
        root_logical_path: &str,
        root_source: &str,
        diags: &mut Diagnostics,
    ) -> Result<PreprocessOutput, ConfigError> {
        let mut lineref = Lineref::new();
        let mut out = String::new();
        let mut include_stack = Vec::new();
        self.process_file(
            root_logical_path,
            root_source,
            &mut out,
            &mut lineref,
            &mut include_stack,
            diags,
        )?;
        Ok(PreprocessOutput {
            text: out,
            lineref,
            file_table: self.file_table,
        })
    }

    fn file_index(&mut self, logical_path: &str) -> u32 {
        if let Some(pos) = self.file_table.iter().position(|p| p == logical_path) {
            pos as u32
        } else {
            self.file_table.push(logical_path.to_string());
            (self.file_table.len() - 1) as u32
        }
    }

    fn process_file(
        &mut self,
        logical_path: &str,
        source: &str,
        out: &mut String,
        lineref: &mut Lineref,
        include_stack: &mut Vec<String>,
        diags: &mut Diagnostics,
    ) -> Result<(), ConfigError> {
        if include_stack.iter().any(|p| p == logical_path) {
            let mut stack_display = include_stack.clone();
            stack_display.push(logical_path.to_string());
            return Err(ConfigError::CircularInclude {
                stack: stack_display.join(" -> "),
            });
        }
        include_stack.push(logical_path.to_string());
        let file_index = self.file_index(logical_path);

        let stripped = strip_comments(source, self.preserve_lines);
        let logical_lines = join_continuations(&stripped);

        let mut cond_stack: Vec<(bool, bool)> = Vec::new(); // (branch_taken_ever, currently_active_parent)
        let mut defined_with_undef: rustc_hash::FxHashSet<String> = rustc_hash::FxHashSet::default();

        let mut batch: Vec<(String, u32)> = Vec::new();

        macro_rules! flush_batch {
            () => {
                if !batch.is_empty() {
                    self.flush_batch(&batch, out, lineref, file_index, diags)?;
                    batch.clear();
                }
            };
        }

        let mut line_no = 0u32;
        for (logical_line, consumed) in &logical_lines {
            line_no += consumed;
            let active = cond_stack.iter().all(|(_, active)| *active);
            let trimmed = logical_line.trim_start();

            if let Some(rest) = trimmed.strip_prefix('#') {
                flush_batch!();
                let rest = rest.trim_start();
                self.handle_directive(
                    rest,
                    active,
                    logical_path,
                    line_no,
                    out,
                    lineref,
                    include_stack,
                    diags,
                    &mut cond_stack,
                    &mut defined_with_undef,
                )?;
                continue;
            }

            if !active {
                continue;
            }
            batch.push((logical_line.clone(), line_no));
        }
        flush_batch!();

        if !cond_stack.is_empty() {
            return Err(ConfigError::UnmatchedEndif {
                file: logical_path.to_string(),
            });
        }

        include_stack.pop();
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_directive(
        &mut self,
        directive: &str,
        active: bool,
        logical_path: &str,
        line_no: u32,
        out: &mut String,
        lineref: &mut Lineref,
        include_stack: &mut Vec<String>,
        diags: &mut Diagnostics,
        cond_stack: &mut Vec<(bool, bool)>,
        defined_with_undef: &mut rustc_hash::FxHashSet<String>,
    ) -> Result<(), ConfigError> {
        let (keyword, rest) = directive.split_once(char::is_whitespace).unwrap_or((directive, ""));
        let rest = rest.trim();

        match keyword {
            "ifdef" => {
                let defined = self.macros.contains_key(rest);
                let parent_active = cond_stack.iter().all(|(_, a)| *a);
                cond_stack.push((defined, parent_active && defined));
            }
            "ifndef" => {
                let defined = !self.macros.contains_key(rest);
                let parent_active = cond_stack.iter().all(|(_, a)| *a);
                cond_stack.push((defined, parent_active && defined));
            }
            "else" => {
                if let Some((taken, _)) = cond_stack.last_mut() {
                    let parent_active = cond_stack[..cond_stack.len() - 1]
                        .iter()
                        .all(|(_, a)| *a);
                    let new_active = parent_active && !*taken;
                    let len = cond_stack.len();
                    cond_stack[len - 1] = (*taken || new_active, new_active);
                } else {
                    return Err(ConfigError::MalformedDirective {
                        file: logical_path.to_string(),
                        line: line_no,
                        directive: "else".to_string(),
                    });
                }
            }
            "endif" => {
                if cond_stack.pop().is_none() {
                    return Err(ConfigError::UnmatchedEndif {
                        file: logical_path.to_string(),
                    });
                }
            }
            _ if !active => {
                // Directives other than conditional structure are ignored
                // inside an inactive branch.
            }
            "include" => {
                let target = rest.trim_matches(|c| c == '"' || c == '<' || c == '>').to_string();
                let (child_logical, child_source) = self.resolver.resolve(&target, logical_path)?;
                self.process_file(&child_logical, &child_source, out, lineref, include_stack, diags)?;
            }
            "define" => {
                let Some((name, def)) = parse_define(rest) else {
                    return Err(ConfigError::MalformedDirective {
                        file: logical_path.to_string(),
                        line: line_no,
                        directive: "define".to_string(),
                    });
                };
                if self.macros.contains_key(&name) && !defined_with_undef.contains(&name) {
                    diags.push_at(
                        DiagnosticKind::RedefinitionWithoutUndef,
                        Severity::Warning,
                        Some(logical_path.to_string()),
                        Some(line_no),
                        format!("redefinition of `{name}` without intervening #undef"),
                    );
                }
                defined_with_undef.remove(&name);
                self.macros.insert(name, def);
            }
            "undef" => {
                self.macros.remove(rest);
                defined_with_undef.insert(rest.to_string());
            }
            _ => {
                return Err(ConfigError::MalformedDirective {
                    file: logical_path.to_string(),
                    line: line_no,
                    directive: keyword.to_string(),
                });
            }
        }

        // Directive lines are invisible in the output but still occupy a
        // line slot so lineref stays aligned with the source; `include`
        // is the exception since the included content is spliced in at
        // exactly this position instead.
        if keyword != "include" {
            out.push('\n');
            lineref.push(self.file_index(logical_path), line_no);
        }
        Ok(())
    }

    fn flush_batch(
        &self,
        batch: &[(String, u32)],
        out: &mut String,
        lineref: &mut Lineref,
        file_index: u32,
        diags: &mut Diagnostics,
    ) -> Result<(), ConfigError> {
        // Independent line expansions may run in parallel; output order is
        // preserved because results are collected positionally.
        let results: Vec<(Result<String, ConfigError>, Vec<crate::error::Diagnostic>)> = batch
            .par_iter()
            .map(|(line, lineno)| {
                let mut stack = Vec::new();
                let mut local_diags = Diagnostics::new();
                let r = expand_line(line, &self.macros, &mut stack, &mut local_diags, "", *lineno);
                let collected: Vec<_> = local_diags.iter().cloned().collect();
                (r, collected)
            })
            .collect();

        for ((_, lineno), (result, collected)) in batch.iter().zip(results) {
            for d in collected {
                diags.push_at(d.kind, d.severity, d.file, d.line, d.message);
            }
            let expanded = result?;
            out.push_str(&expanded);
            out.push('\n');
            lineref.push(file_index, *lineno);
        }
        Ok(())
    }
}

fn parse_define(rest: &str) -> Option<(String, MacroDef)> {
    let bytes = rest.as_bytes();
    let mut i = 0;
    while i < bytes.len() && (bytes[i] as char).is_alphanumeric() || bytes.get(i) == Some(&b'_') {
        i += 1;
    }
    if i == 0 {
        return None;
    }
    let name = rest[..i].to_string();
    if bytes.get(i) == Some(&b'(') {
        let (a, b) = find_call_args(rest, i)?;
        let params_src = &rest[a + 1..b - 1];
        let params: Vec<String> = split_args(params_src).into_iter().filter(|p| !p.is_empty()).collect();
        let body = rest[b..].trim_start().to_string();
        Some((
            name,
            MacroDef {
                params: Some(params),
                body,
            },
        ))
    } else {
        let body = rest[i..].trim_start().to_string();
        Some((
            name,
            MacroDef {
                params: None,
                body,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_macro_expansion() {
        let resolver = MemoryResolver::new();
        let mut diags = Diagnostics::new();
        let preproc = Preprocessor::new(&resolver);
        let out = preproc
            .preprocess("src", "#define FOO(x) \"x\"\nFOO(bar)\n", &mut diags)
            .unwrap();
        assert_eq!(out.text, "\n\"bar\"\n");
    }

    #[test]
    fn stringize_and_concat() {
        let resolver = MemoryResolver::new();
        let mut diags = Diagnostics::new();
        let preproc = Preprocessor::new(&resolver);
        let out = preproc
            .preprocess(
                "src",
                "#define GLUE(a,b) a##b\n#define QUOTE(a) #a\nGLUE(fo,o)\nQUOTE(bar)\n",
                &mut diags,
            )
            .unwrap();
        assert_eq!(out.text, "\n\nfoo\n\"bar\"\n");
    }

    #[test]
    fn ifdef_skips_inactive_branch() {
        let resolver = MemoryResolver::new();
        let mut diags = Diagnostics::new();
        let preproc = Preprocessor::new(&resolver);
        let out = preproc
            .preprocess("src", "#define FOO\n#ifdef FOO\nyes\n#else\nno\n#endif\n", &mut diags)
            .unwrap();
        assert_eq!(out.text, "\n\nyes\n\n\n");
    }

    #[test]
    fn include_from_memory_resolver() {
        let resolver = MemoryResolver::new().with_file("inc.hpp", "included\n");
        let mut diags = Diagnostics::new();
        let preproc = Preprocessor::new(&resolver);
        let out = preproc
            .preprocess("main.hpp", "#include \"inc.hpp\"\nafter\n", &mut diags)
            .unwrap();
        assert_eq!(out.text, "included\nafter\n");
    }

    #[test]
    fn circular_include_is_fatal() {
        let resolver = MemoryResolver::new().with_file("a.hpp", "#include \"b.hpp\"\n").with_file("b.hpp", "#include \"a.hpp\"\n");
        let mut diags = Diagnostics::new();
        let preproc = Preprocessor::new(&resolver);
        let err = preproc.preprocess("a.hpp", "#include \"b.hpp\"\n", &mut diags);
        assert!(err.is_err());
    }
}
