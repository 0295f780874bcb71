//! Outline of Rust design documents.
//!
//! Parses a source file with `syn` and keeps its top-level item structure:
//! item kind, name, visibility, doc-comment presence and line span, plus the
//! root crate of every top-level `use` and `extern crate`.

use proc_macro2::Span;
use serde::{Deserialize, Serialize};
use syn::spanned::Spanned;

/// A syntax error with its 1-based position.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{line}:{col}: {message}")]
pub struct SyntaxError {
    pub message: String,
    pub line: u32,
    pub col: u32,
}

impl From<syn::Error> for SyntaxError {
    fn from(err: syn::Error) -> Self {
        let start = err.span().start();
        Self {
            message: err.to_string(),
            // End-of-input errors carry a call-site span with line 0.
            line: (start.line as u32).max(1),
            col: start.column as u32 + 1,
        }
    }
}

/// Kind of a top-level item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Function,
    Struct,
    Enum,
    Union,
    Trait,
    Module,
    Const,
    Static,
    TypeAlias,
}

/// A top-level item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineItem {
    pub kind: ItemKind,
    pub name: String,
    /// Plain `pub` visibility (restricted visibility is not public).
    pub public: bool,
    /// Carries an outer doc comment.
    pub documented: bool,
    /// First line of the item, attributes and doc comments included.
    pub start_line: u32,
    pub end_line: u32,
}

impl OutlineItem {
    pub fn line_count(&self) -> u32 {
        self.end_line.saturating_sub(self.start_line) + 1
    }
}

/// Root of a top-level `use` or `extern crate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Import {
    pub root: String,
    pub line: u32,
}

/// Parsed outline of a design document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceOutline {
    pub items: Vec<OutlineItem>,
    pub imports: Vec<Import>,
}

impl SourceOutline {
    pub fn functions(&self) -> impl Iterator<Item = &OutlineItem> {
        self.items.iter().filter(|i| i.kind == ItemKind::Function)
    }

    pub fn public_functions(&self) -> impl Iterator<Item = &OutlineItem> {
        self.functions().filter(|i| i.public)
    }
}

/// Parse the outline of a Rust source document.
pub fn parse_outline(source: &str) -> Result<SourceOutline, SyntaxError> {
    let file = syn::parse_file(source)?;
    let mut outline = SourceOutline::default();

    for item in &file.items {
        let (kind, ident, vis, attrs) = match item {
            syn::Item::Fn(f) => (ItemKind::Function, &f.sig.ident, &f.vis, &f.attrs),
            syn::Item::Struct(s) => (ItemKind::Struct, &s.ident, &s.vis, &s.attrs),
            syn::Item::Enum(e) => (ItemKind::Enum, &e.ident, &e.vis, &e.attrs),
            syn::Item::Union(u) => (ItemKind::Union, &u.ident, &u.vis, &u.attrs),
            syn::Item::Trait(t) => (ItemKind::Trait, &t.ident, &t.vis, &t.attrs),
            syn::Item::Mod(m) => (ItemKind::Module, &m.ident, &m.vis, &m.attrs),
            syn::Item::Const(c) => (ItemKind::Const, &c.ident, &c.vis, &c.attrs),
            syn::Item::Static(s) => (ItemKind::Static, &s.ident, &s.vis, &s.attrs),
            syn::Item::Type(t) => (ItemKind::TypeAlias, &t.ident, &t.vis, &t.attrs),
            syn::Item::Use(u) => {
                let line = line_of(u.use_token.span);
                let mut roots = Vec::new();
                use_roots(&u.tree, &mut roots);
                outline
                    .imports
                    .extend(roots.into_iter().map(|root| Import { root, line }));
                continue;
            }
            syn::Item::ExternCrate(e) => {
                outline.imports.push(Import {
                    root: e.ident.to_string(),
                    line: line_of(e.extern_token.span),
                });
                continue;
            }
            _ => continue,
        };

        let span = item.span();
        outline.items.push(OutlineItem {
            kind,
            name: ident.to_string(),
            public: matches!(vis, syn::Visibility::Public(_)),
            documented: attrs
                .iter()
                .any(|a| matches!(a.style, syn::AttrStyle::Outer) && a.path().is_ident("doc")),
            start_line: line_of(span),
            end_line: span.end().line as u32,
        });
    }
    Ok(outline)
}

fn line_of(span: Span) -> u32 {
    span.start().line as u32
}

/// First path segment of every import in `tree`; groups contribute one root
/// per member.
fn use_roots(tree: &syn::UseTree, roots: &mut Vec<String>) {
    match tree {
        syn::UseTree::Path(p) => roots.push(p.ident.to_string()),
        syn::UseTree::Name(n) => roots.push(n.ident.to_string()),
        syn::UseTree::Rename(r) => roots.push(r.ident.to_string()),
        syn::UseTree::Glob(_) => {}
        syn::UseTree::Group(g) => {
            for member in &g.items {
                use_roots(member, roots);
            }
        }
    }
}
