//! ESM to registry-factory lowering.
//!
//! The SWC backend leaves module syntax intact; this pass rewrites top-level
//! `import`/`export` statements into the `require`/`exports` forms a
//! registry factory executes. Input is SWC codegen output, which emits each
//! import/export statement on a single line, so the rewrite is
//! line-oriented. Export bindings are accumulated and emitted at the end of
//! the module body so a factory's hoisted declarations exist before they are
//! attached to `exports`.
//!
//! An unrecognized top-level form is a hard error: a bundle that cannot
//! execute must never be emitted, and the compile pass as a whole aborts.

use std::fmt;

/// Error raised for a module form the lowering cannot express.
#[derive(Debug, Clone)]
pub struct LowerError {
    pub message: String,
}

impl LowerError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for LowerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for LowerError {}

/// Quote a module specifier (or any string) as a JS string literal.
pub(crate) fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{value}\""))
}

/// Lower one transpiled module body to `require`/`exports` form.
pub fn lower_module(source: &str) -> Result<String, LowerError> {
    let mut out = String::with_capacity(source.len() + 128);
    let mut pending_exports: Vec<String> = Vec::new();
    let mut reexport_count = 0usize;

    for line in source.lines() {
        let trimmed = line.trim_start();

        if trimmed.starts_with("import ")
            || trimmed.starts_with("import\"")
            || trimmed.starts_with("import'")
        {
            out.push_str(&rewrite_import(trimmed)?);
            out.push('\n');
        } else if trimmed.starts_with("export ") {
            let rewrite = rewrite_export(trimmed, &mut reexport_count)?;
            if let Some(inline) = rewrite.inline {
                out.push_str(&inline);
                out.push('\n');
            }
            pending_exports.extend(rewrite.pending);
        } else {
            out.push_str(line);
            out.push('\n');
        }
    }

    for stmt in pending_exports {
        out.push_str(&stmt);
        out.push('\n');
    }

    Ok(out)
}

/// Pull a quoted specifier off the front of `rest`, returning it and
/// requiring nothing but whitespace/';' to follow.
fn parse_specifier(rest: &str) -> Result<String, LowerError> {
    let rest = rest.trim();
    let quote = rest
        .chars()
        .next()
        .filter(|c| *c == '\'' || *c == '"')
        .ok_or_else(|| LowerError::new(format!("expected module specifier near: {rest}")))?;
    let body = &rest[1..];
    let end = body
        .find(quote)
        .ok_or_else(|| LowerError::new(format!("unterminated module specifier: {rest}")))?;
    Ok(body[..end].to_string())
}

/// Rewrite one `import …` statement into `require` form.
fn rewrite_import(stmt: &str) -> Result<String, LowerError> {
    let rest = stmt
        .strip_prefix("import")
        .expect("caller matched the prefix")
        .trim_start();

    // Side-effect import: `import "./setup";`
    if rest.starts_with('\'') || rest.starts_with('"') {
        let spec = parse_specifier(rest)?;
        return Ok(format!("require({});", js_string(&spec)));
    }

    let from_idx = rest
        .find(" from ")
        .ok_or_else(|| LowerError::new(format!("unsupported import form: {stmt}")))?;
    let clause = rest[..from_idx].trim();
    let spec = js_string(&parse_specifier(&rest[from_idx + 6..])?);

    let mut bindings: Vec<String> = Vec::new();
    let mut remaining = clause;

    // Optional default binding first: `React` in `React, { useState }`.
    if !remaining.starts_with('{') && !remaining.starts_with('*') {
        let end = remaining
            .find(',')
            .unwrap_or(remaining.len());
        let name = remaining[..end].trim();
        if name.is_empty() {
            return Err(LowerError::new(format!("unsupported import form: {stmt}")));
        }
        // Default-import interop: prefer `.default`, fall back to the
        // exports object itself for host externals.
        bindings.push(format!(
            "const {name} = require({spec}).default || require({spec});"
        ));
        remaining = remaining[end..].trim_start_matches(',').trim();
    }

    if let Some(ns) = remaining.strip_prefix("* as ") {
        let name = ns.trim();
        bindings.push(format!("const {name} = require({spec});"));
    } else if remaining.starts_with('{') {
        let end = remaining
            .find('}')
            .ok_or_else(|| LowerError::new(format!("unsupported import form: {stmt}")))?;
        let names = remaining[1..end].trim();
        if !names.is_empty() {
            // `{ jsx as _jsx }` becomes destructuring `{ jsx: _jsx }`.
            let destructure = names.replace(" as ", ": ");
            bindings.push(format!("const {{ {destructure} }} = require({spec});"));
        } else {
            bindings.push(format!("require({spec});"));
        }
    } else if !remaining.is_empty() {
        return Err(LowerError::new(format!("unsupported import form: {stmt}")));
    }

    Ok(bindings.join("\n"))
}

struct ExportRewrite {
    inline: Option<String>,
    pending: Vec<String>,
}

impl ExportRewrite {
    fn inline(line: String) -> Self {
        Self {
            inline: Some(line),
            pending: Vec::new(),
        }
    }

    fn with_pending(line: Option<String>, pending: Vec<String>) -> Self {
        Self {
            inline: line,
            pending,
        }
    }
}

/// Rewrite one `export …` statement.
fn rewrite_export(stmt: &str, reexport_count: &mut usize) -> Result<ExportRewrite, LowerError> {
    let rest = stmt
        .strip_prefix("export")
        .expect("caller matched the prefix")
        .trim_start();

    if let Some(default_rest) = rest.strip_prefix("default ") {
        return rewrite_default_export(default_rest.trim_start());
    }

    // `export * from "./mod";`
    if let Some(star_rest) = rest.strip_prefix('*') {
        let from_rest = star_rest
            .trim_start()
            .strip_prefix("from")
            .ok_or_else(|| LowerError::new(format!("unsupported export form: {stmt}")))?;
        let spec = js_string(&parse_specifier(from_rest)?);
        let binding = fresh_reexport(reexport_count);
        let inline = format!("const {binding} = require({spec});");
        let pending = vec![format!(
            "for (const __k of Object.keys({binding})) {{ if (__k !== \"default\" && !(__k in exports)) exports[__k] = {binding}[__k]; }}"
        )];
        return Ok(ExportRewrite::with_pending(Some(inline), pending));
    }

    // `export { a, b as c }` with or without a `from` clause.
    if let Some(brace_rest) = rest.strip_prefix('{') {
        let end = brace_rest
            .find('}')
            .ok_or_else(|| LowerError::new(format!("unsupported export form: {stmt}")))?;
        let names: Vec<&str> = brace_rest[..end]
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        let after = brace_rest[end + 1..].trim();

        if let Some(from_rest) = after.strip_prefix("from") {
            let spec = js_string(&parse_specifier(from_rest)?);
            let binding = fresh_reexport(reexport_count);
            let inline = format!("const {binding} = require({spec});");
            let pending = names
                .iter()
                .map(|name| {
                    let (source, exported) = split_alias(name);
                    format!("exports.{exported} = {binding}.{source};")
                })
                .collect();
            return Ok(ExportRewrite::with_pending(Some(inline), pending));
        }

        let pending = names
            .iter()
            .map(|name| {
                let (source, exported) = split_alias(name);
                format!("exports.{exported} = {source};")
            })
            .collect();
        return Ok(ExportRewrite::with_pending(None, pending));
    }

    // `export <declaration>`: the declaration stays, the binding is
    // attached to `exports` at the end of the module body.
    for keyword in ["const ", "let ", "var "] {
        if let Some(decl) = rest.strip_prefix(keyword) {
            let names = declarator_names(decl)
                .ok_or_else(|| LowerError::new(format!("unsupported export form: {stmt}")))?;
            let pending = names
                .iter()
                .map(|name| format!("exports.{name} = {name};"))
                .collect();
            return Ok(ExportRewrite::with_pending(
                Some(format!("{keyword}{decl}")),
                pending,
            ));
        }
    }

    for keyword in ["function ", "async function ", "class "] {
        if let Some(decl) = rest.strip_prefix(keyword) {
            let name = leading_identifier(decl)
                .ok_or_else(|| LowerError::new(format!("unsupported export form: {stmt}")))?;
            return Ok(ExportRewrite::with_pending(
                Some(format!("{keyword}{decl}")),
                vec![format!("exports.{name} = {name};")],
            ));
        }
    }

    Err(LowerError::new(format!("unsupported export form: {stmt}")))
}

fn rewrite_default_export(rest: &str) -> Result<ExportRewrite, LowerError> {
    for keyword in ["function", "async function", "class"] {
        let Some(decl) = rest.strip_prefix(keyword).filter(|d| d.starts_with([' ', '('])) else {
            continue;
        };
        let name = leading_identifier(decl.trim_start())
            // `export default class extends Base {` has no name either.
            .filter(|name| *name != "extends");
        if let Some(name) = name {
            // Named declaration: keep it (hoisting intact), export at end.
            return Ok(ExportRewrite::with_pending(
                Some(format!("{keyword}{decl}")),
                vec![format!("exports.default = {name};")],
            ));
        }
        // Anonymous: the declaration becomes an assignment expression,
        // which is free to continue across the following lines.
        return Ok(ExportRewrite::inline(format!(
            "exports.default = {keyword}{decl}"
        )));
    }

    Ok(ExportRewrite::inline(format!("exports.default = {rest}")))
}

/// `a` -> (`a`, `a`); `a as b` -> (`a`, `b`).
fn split_alias(name: &str) -> (&str, &str) {
    match name.split_once(" as ") {
        Some((source, exported)) => (source.trim(), exported.trim()),
        None => (name, name),
    }
}

fn fresh_reexport(count: &mut usize) -> String {
    let binding = format!("__reexport{count}");
    *count += 1;
    binding
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Leading identifier of a declaration tail (`App() {` -> `App`).
fn leading_identifier(decl: &str) -> Option<&str> {
    let end = decl.find(|c: char| !is_ident_char(c)).unwrap_or(decl.len());
    if end == 0 {
        return None;
    }
    let candidate = &decl[..end];
    candidate.chars().next().filter(|c| !c.is_numeric())?;
    Some(candidate)
}

/// Names declared by `const a = …, b = …` — commas are split only at
/// bracket depth zero and outside string literals so `const x = [1, 2]`
/// yields a single declarator.
fn declarator_names(decl: &str) -> Option<Vec<String>> {
    let mut names = Vec::new();
    let mut depth = 0i32;
    let mut in_string: Option<char> = None;
    let mut start = 0usize;

    let bytes = decl.char_indices().collect::<Vec<_>>();
    let mut i = 0;
    while i < bytes.len() {
        let (idx, c) = bytes[i];
        if let Some(quote) = in_string {
            if c == '\\' {
                i += 2;
                continue;
            }
            if c == quote {
                in_string = None;
            }
        } else {
            match c {
                '\'' | '"' | '`' => in_string = Some(c),
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => depth -= 1,
                ',' if depth == 0 => {
                    names.push(leading_identifier(decl[start..idx].trim_start())?.to_string());
                    start = idx + 1;
                }
                _ => {}
            }
        }
        i += 1;
    }
    names.push(leading_identifier(decl[start..].trim_start())?.to_string());
    Some(names)
}
